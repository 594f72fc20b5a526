//! Error types for the file server

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking directory scan did not complete.
    #[error("Scan task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
