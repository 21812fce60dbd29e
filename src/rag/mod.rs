pub mod chunker;
pub mod embeddings;
pub mod index;
pub mod refresh;
pub mod retriever;
pub mod sampler;
pub mod setup;

use std::path::PathBuf;

/// Embedding dimension for the bge-small-en-v1.5 model.
pub const EMBEDDING_DIM: usize = 384;

/// Where the ONNX model is cached, read from the environment.
///
/// fastembed's own default is `.fastembed_cache` in CWD, which would download the
/// model again next to every database; see [`resolve_cache_dir`] for the order.
pub fn model_cache_dir() -> PathBuf {
    resolve_cache_dir(
        std::env::var_os("FASTEMBED_CACHE_DIR").map(PathBuf::from),
        std::env::var_os("XDG_CACHE_HOME").map(PathBuf::from),
        home_dir(),
    )
}

/// Cache directory precedence:
/// 1. `fastembed_cache` (`FASTEMBED_CACHE_DIR`, fastembed's own convention), as is
/// 2. `<xdg_cache>/tablerag/models`
/// 3. `<home>/.cache/tablerag/models`
/// 4. `.fastembed_cache` in CWD
pub fn resolve_cache_dir(
    fastembed_cache: Option<PathBuf>,
    xdg_cache: Option<PathBuf>,
    home: Option<PathBuf>,
) -> PathBuf {
    if let Some(dir) = fastembed_cache {
        return dir;
    }
    if let Some(xdg) = xdg_cache {
        return xdg.join("tablerag").join("models");
    }
    if let Some(home) = home {
        return home.join(".cache").join("tablerag").join("models");
    }
    PathBuf::from(".fastembed_cache")
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Option<PathBuf> {
        Some(PathBuf::from(s))
    }

    #[test]
    fn test_fastembed_dir_wins_and_is_used_as_is() {
        let dir = resolve_cache_dir(p("/models"), p("/xdg"), p("/home/ada"));
        assert_eq!(dir, PathBuf::from("/models"));
    }

    #[test]
    fn test_xdg_cache_beats_home() {
        let dir = resolve_cache_dir(None, p("/xdg"), p("/home/ada"));
        assert_eq!(dir, PathBuf::from("/xdg/tablerag/models"));
    }

    #[test]
    fn test_home_fallback() {
        let dir = resolve_cache_dir(None, None, p("/home/ada"));
        assert_eq!(dir, PathBuf::from("/home/ada/.cache/tablerag/models"));
    }

    #[test]
    fn test_cwd_fallback_without_any_location() {
        assert_eq!(
            resolve_cache_dir(None, None, None),
            PathBuf::from(".fastembed_cache")
        );
    }
}
