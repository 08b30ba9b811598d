//! Error types for the pathfinding core.

use thiserror::Error;

use crate::coords::WorldPoint;

/// Result type alias using [`PathError`].
pub type Result<T> = std::result::Result<T, PathError>;

/// Top-level error type for the pathfinding core.
///
/// Route requests never surface these to the movement system directly; the
/// façade logs them and reports [`crate::service::RouteOutcome::Failed`].
#[derive(Debug, Error)]
pub enum PathError {
    /// Origin or destination lies outside the map.
    #[error("Route endpoint ({}, {}) is off the map", .0.x, .0.y)]
    OffMap(WorldPoint),

    /// Origin and destination are the same point.
    #[error("Route origin and destination are identical: ({}, {})", .0.x, .0.y)]
    SameEndpoints(WorldPoint),

    /// Path reconstruction stepped off the map.
    #[error("Path reconstruction left the map at ({}, {})", .0.x, .0.y)]
    ReconstructOffMap(WorldPoint),

    /// Path reconstruction did not reach the search start.
    #[error("Path reconstruction exceeded {limit} points without reaching the start")]
    ReconstructLoop {
        /// Maximum number of points allowed.
        limit: usize,
    },

    /// An ASCII map could not be parsed.
    #[error("Map parse error at row {row}, column {column}: {message}")]
    MapParse {
        /// Zero-based row.
        row: usize,
        /// Zero-based column.
        column: usize,
        /// What went wrong.
        message: String,
    },

    /// Failed to read or parse a configuration file.
    #[error("Failed to load config '{path}': {message}")]
    Config {
        /// Path to the file that failed to load.
        path: String,
        /// Error message.
        message: String,
    },

    /// The background worker thread could not be started.
    #[error("Failed to spawn pathfinding worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

