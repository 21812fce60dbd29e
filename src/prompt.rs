use serde::Serialize;

use crate::error::RagError;
use crate::types::StructuredSummary;

/// Instruction sent ahead of every question.
pub const SYSTEM_PROMPT: &str =
    "You are a database assistant. Provide concise answers based on the given data.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged message for the external model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// JSON text for the summary message. A failed summary becomes an error object
/// so the rest of the prompt still goes out.
fn summary_json(summary: &Result<StructuredSummary, RagError>) -> String {
    match summary {
        // Serialized directly so table order survives.
        Ok(summary) => serde_json::to_string(summary)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string()),
        Err(e) => serde_json::json!({ "error": e.to_string(), "kind": e.kind() }).to_string(),
    }
}

/// Ordered messages: system instruction, database info, retrieved context, question.
pub fn build_messages(
    summary: &Result<StructuredSummary, RagError>,
    context: &str,
    query: &str,
) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(format!("Database info: {}", summary_json(summary))),
        Message::user(format!("Context: {context}")),
        Message::user(query),
    ]
}
