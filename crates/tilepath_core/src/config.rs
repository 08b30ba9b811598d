//! Pathfinder configuration.
//!
//! Loaded from RON files by the tools. All fields have defaults, so an empty
//! `PathfindingConfig()` is a valid config.
//!
//! # Example RON
//!
//! ```ron
//! PathfindingConfig(
//!     context_cache_capacity: 30,
//!     danger_cost_factor: 5,
//!     worker_mode: Threaded,
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PathError, Result};

/// Default number of search contexts kept warm.
pub const DEFAULT_CONTEXT_CACHE_CAPACITY: usize = 30;

/// Default cost multiplier for tiles under threat.
pub const DEFAULT_DANGER_COST_FACTOR: u32 = 5;

/// Where queued path jobs run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerMode {
    /// A dedicated background thread runs jobs in submission order.
    #[default]
    Threaded,
    /// Jobs run on the submitting thread as soon as they are queued.
    Inline,
}

/// Tunables for the pathfinding service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfindingConfig {
    /// Maximum number of cached search contexts.
    pub context_cache_capacity: usize,
    /// Step cost multiplier applied when entering a dangerous tile.
    pub danger_cost_factor: u32,
    /// Threaded or inline job execution.
    pub worker_mode: WorkerMode,
}

impl Default for PathfindingConfig {
    fn default() -> Self {
        Self {
            context_cache_capacity: DEFAULT_CONTEXT_CACHE_CAPACITY,
            danger_cost_factor: DEFAULT_DANGER_COST_FACTOR,
            worker_mode: WorkerMode::Threaded,
        }
    }
}

impl PathfindingConfig {
    /// Config that runs jobs inline, for deterministic single-threaded use.
    #[must_use]
    pub fn inline() -> Self {
        Self {
            worker_mode: WorkerMode::Inline,
            ..Self::default()
        }
    }

    /// Parse a config from RON text.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source).map_err(|e| PathError::Config {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        config.validated("<inline>")
    }

    /// Load a config from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let source = std::fs::read_to_string(path).map_err(|e| PathError::Config {
            path: display.clone(),
            message: e.to_string(),
        })?;
        let config: Self = ron::from_str(&source).map_err(|e| PathError::Config {
            path: display.clone(),
            message: e.to_string(),
        })?;
        config.validated(&display)
    }

    fn validated(self, path: &str) -> Result<Self> {
        if self.context_cache_capacity == 0 {
            return Err(PathError::Config {
                path: path.into(),
                message: "context_cache_capacity must be at least 1".into(),
            });
        }
        if self.danger_cost_factor == 0 {
            return Err(PathError::Config {
                path: path.into(),
                message: "danger_cost_factor must be at least 1".into(),
            });
        }
        Ok(self)
    }
}
