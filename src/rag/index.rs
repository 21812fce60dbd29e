use serde::Serialize;

use crate::error::RagError;

/// One retrieved chunk and its squared Euclidean distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub text: String,
    /// Lower is closer.
    pub score: f32,
}

#[derive(Debug)]
struct IndexEntry {
    text: String,
    vector: Vec<f32>,
}

/// Immutable snapshot of (chunk text, vector) pairs with exact k-NN search.
///
/// There is no way to mutate a built index; a refresh builds a new one. Search is
/// a full scan, which keeps the ranking exact and reproducible for the corpus
/// sizes involved (tables × sampled rows).
#[derive(Debug)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
}

impl VectorIndex {
    /// Build a snapshot. Every vector must share the first vector's dimension.
    pub fn build(chunks: Vec<(String, Vec<f32>)>) -> Result<Self, RagError> {
        let dimension = match chunks.first() {
            Some((_, vector)) => vector.len(),
            None => return Err(RagError::EmptyCorpus("no chunks to index".into())),
        };

        let mut entries = Vec::with_capacity(chunks.len());
        for (text, vector) in chunks {
            if vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            entries.push(IndexEntry { text, vector });
        }

        Ok(Self { entries, dimension })
    }

    /// The `k` entries nearest to `vector`, closest first.
    ///
    /// Equal distances keep insertion order. A `k` larger than the index returns
    /// every entry.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, squared_distance(vector, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                text: self.entries[i].text.clone(),
                score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Chunk texts in insertion order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.text.as_str())
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
