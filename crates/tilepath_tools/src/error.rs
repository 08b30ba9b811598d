//! Error types for the tools.

use std::path::PathBuf;

use thiserror::Error;
use tilepath_core::error::PathError;

/// Result type alias using [`ToolError`].
pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors raised while loading scenarios or writing reports.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A file could not be read or written.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A scenario file is not valid RON.
    #[error("Failed to parse scenario '{}': {message}", path.display())]
    Scenario {
        /// File involved.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The scenario's map or config was rejected by the core.
    #[error(transparent)]
    Path(#[from] PathError),

    /// A report could not be serialized.
    #[error("Failed to write report: {0}")]
    Report(#[from] serde_json::Error),
}
