//! # Tilepath Core
//!
//! Incremental, cached A* pathfinding for tile-based games.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO outside config loading
//! - No randomness
//! - No floating-point math (distances are scaled integers)
//!
//! so that every peer of a lock-step game computes identical routes from
//! identical world state.
//!
//! ## Crate Structure
//!
//! - [`blocking`] - Per-tick blocking snapshots and their checksums
//! - [`context`] - Reusable search contexts and their LRU cache
//! - [`astar`] - The search itself, with sub-tile refinement
//! - [`route`] - Context reuse and path reconstruction
//! - [`service`] - The request/poll façade over the background worker
//! - [`world`] - The world interface the pathfinder reads

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod area;
pub mod astar;
pub mod blocking;
pub mod config;
pub mod context;
pub mod coords;
pub mod error;
pub mod job;
pub mod math;
pub mod route;
pub mod service;
mod worker;
pub mod world;

pub use worker::WORKER_THREAD_NAME;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::area::NonBlockingArea;
    pub use crate::blocking::{BlockingKey, BlockingMap, BlockingMapBuilder, BlockingMapTable};
    pub use crate::config::{PathfindingConfig, WorkerMode};
    pub use crate::coords::{TileCoord, WorldPoint, TILE_UNITS};
    pub use crate::error::{PathError, Result};
    pub use crate::job::{PathJob, PathResult, RequesterId, RouteStatus};
    pub use crate::route::{Pathfinder, RouteAttempt, SearchStatus};
    pub use crate::service::{PathfindingService, Route, RouteOutcome, RouteRequest};
    pub use crate::world::{MoveType, PathWorld, PlayerId, Propulsion, Terrain, TileGrid};
}
