//! # Tilepath Development Tools
//!
//! Command-line helpers for working on the pathfinder:
//! - Scenario runner (RON map + requests in, JSON report out)
//! - Blocking map checksums for desync hunting

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod error;
pub mod scenario;
