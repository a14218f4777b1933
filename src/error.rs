// ⚠️ Error Taxonomy
// Every failure the engine can report, split by who can recover from it

use crate::record::RecordId;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// LOAD ERRORS (fatal, never a partial load)
// ============================================================================

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read input: {0}")]
    Read(#[source] std::io::Error),

    #[error("dataset has no header row")]
    MissingHeader,

    #[error("required column '{column}' not found in header")]
    MissingColumn { column: String },

    /// `line` is the 1-based line in the file (header is line 1)
    #[error("line {line}, column '{column}': {reason}")]
    InvalidField {
        line: u64,
        column: String,
        reason: String,
    },

    #[error("line {line}: id {id} appears more than once")]
    DuplicateId { line: u64, id: RecordId },

    /// `column` names the first missing (or unreadable) field when known
    #[error("line {line}{}: malformed CSV row: {source}", column_label(.column))]
    Csv {
        line: u64,
        column: Option<String>,
        #[source]
        source: csv::Error,
    },
}

fn column_label(column: &Option<String>) -> String {
    match column {
        Some(name) => format!(", column '{}'", name),
        None => String::new(),
    }
}

// ============================================================================
// MUTATION ERRORS (recoverable, nothing applied)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &str, reason: impl Into<String>) -> Self {
        ValidationError {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record {id} not found")]
pub struct NotFoundError {
    pub id: RecordId,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to serialize dataset: {0}")]
    Serialize(String),

    #[error("failed to {stage} {path}: {source}")]
    Io {
        stage: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Anything the Mutation Service can hand back to a caller
#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("no record ids left after {last}")]
    IdsExhausted { last: RecordId },
}

// ============================================================================
// CONFIGURATION ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid option {option}: {reason}")]
    Invalid { option: &'static str, reason: String },
}
