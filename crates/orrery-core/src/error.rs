//! Error types for orrery-core.

use thiserror::Error;

/// Result type for orrery-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orrery-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to parse cell source.
    #[error("parse error: {0}")]
    Parse(String),

    /// Dependency graph violation (duplicate definition or cycle).
    #[error("{0}")]
    Graph(#[from] crate::graph::GraphError),

    /// Cell not found.
    #[error("cell not found: {0}")]
    CellNotFound(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IPC communication error with the worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Execution error.
    #[error("execution error: {0}")]
    Execution(String),

    /// Execution was interrupted by user request.
    #[error("execution interrupted")]
    Interrupted,
}
