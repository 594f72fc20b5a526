//! Error types for the extraction pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The entity stream could not deliver the next entity.
    #[error("Entity source error: {0}")]
    Source(String),

    /// The class hierarchy lookup failed.
    #[error("Class hierarchy resolution failed for Q{class_id}: {message}")]
    Resolution { class_id: u64, message: String },

    /// Spill, merge or write failure inside a sorted sink.
    #[error("Sort error in '{category}': {message}")]
    Sort { category: String, message: String },

    /// A staged output could not be moved to its final path.
    #[error("Publish error for {path}: {message}")]
    Publish { path: String, message: String },

    /// Records were sent to a sink that no longer accepts them.
    #[error("Sink '{0}' is closed")]
    SinkClosed(String),

    /// The run was cancelled before its sinks finished.
    #[error("Run aborted")]
    Aborted,

    #[error("Invalid dump path: {0}")]
    InvalidDump(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ExtractError {
    /// Stable error code, used in logs and the CLI exit message.
    pub fn code(&self) -> &'static str {
        match self {
            ExtractError::Source(_) | ExtractError::InvalidDump(_) => "SOURCE_ERROR",
            ExtractError::Resolution { .. } | ExtractError::Http(_) => "RESOLUTION_ERROR",
            ExtractError::Sort { .. } | ExtractError::Serialization(_) => "SORT_ERROR",
            ExtractError::Publish { .. } => "PUBLISH_ERROR",
            ExtractError::SinkClosed(_) | ExtractError::Aborted => "SINK_CLOSED",
            _ => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn sort(category: &str, err: impl std::fmt::Display) -> Self {
        ExtractError::Sort {
            category: category.to_string(),
            message: err.to_string(),
        }
    }

    /// A copy of a recorded sink failure, reported again on repeated calls.
    pub(crate) fn replay(&self, category: &str) -> Self {
        match self {
            ExtractError::Sort { category, message } => ExtractError::Sort {
                category: category.clone(),
                message: message.clone(),
            },
            ExtractError::Publish { path, message } => ExtractError::Publish {
                path: path.clone(),
                message: message.clone(),
            },
            ExtractError::SinkClosed(name) => ExtractError::SinkClosed(name.clone()),
            ExtractError::Aborted => ExtractError::Aborted,
            other => ExtractError::sort(category, other),
        }
    }
}
