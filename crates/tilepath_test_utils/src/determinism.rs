//! Determinism testing utilities.
//!
//! Lock-step games run the pathfinder on every peer and rely on each peer
//! producing the same waypoints from the same world. This module runs the
//! same batch of route requests several times, in sequence or in parallel
//! threads, and compares hashes of the outcomes.
//!
//! # Sources of divergence
//!
//! - **Floating-point math**: distances and estimates are scaled integers.
//! - **Hash iteration order**: nothing that affects a route iterates a hash
//!   map; the open set breaks ties on coordinates.
//! - **Cache state**: a repeated request gets identical waypoints, but a
//!   context warmed by requests from other origins may pick a different
//!   equal-cost path. [`find_first_cache_divergence`] compares a warm service
//!   against a cold one request by request.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use tilepath_core::prelude::*;

/// A map and the requests to run against it, in order.
#[derive(Debug, Clone)]
pub struct RouteBatch {
    /// World to route on.
    pub world: TileGrid,
    /// Requests, issued in order and each awaited before the next.
    pub requests: Vec<RouteRequest>,
}

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of requests per run.
    pub requests: usize,
}

impl DeterminismResult {
    fn from_hashes(hashes: Vec<u64>, requests: usize) -> Self {
        Self {
            is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
            hashes,
            requests,
        }
    }

    /// Get all unique hashes (should be 1 for deterministic routing).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Routing is non-deterministic!\n\
                 Runs: {}\n\
                 Requests: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.requests,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run every request of `batch` on a fresh service and collect the outcomes.
///
/// # Panics
///
/// Panics if the service cannot start.
#[must_use]
pub fn run_batch(batch: &RouteBatch, config: &PathfindingConfig) -> Vec<RouteOutcome> {
    let mut service = match PathfindingService::new(config.clone()) {
        Ok(service) => service,
        Err(err) => panic!("pathfinding service failed to start: {err}"),
    };
    tracing::debug!(
        requests = batch.requests.len(),
        mode = ?config.worker_mode,
        "running route batch"
    );
    batch
        .requests
        .iter()
        .map(|request| service.wait_route(&batch.world, request))
        .collect()
}

/// Hash a list of outcomes.
#[must_use]
pub fn outcomes_hash(outcomes: &[RouteOutcome]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for outcome in outcomes {
        match outcome {
            RouteOutcome::Ok(route) => {
                0u8.hash(&mut hasher);
                route.path.hash(&mut hasher);
            }
            RouteOutcome::Partial(route) => {
                1u8.hash(&mut hasher);
                route.path.hash(&mut hasher);
            }
            RouteOutcome::Failed => 2u8.hash(&mut hasher),
            RouteOutcome::Waiting => 3u8.hash(&mut hasher),
        }
    }
    hasher.finish()
}

/// Run `batch` `runs` times in sequence and compare outcome hashes.
///
/// # Example
///
/// ```ignore
/// use tilepath_test_utils::determinism::{verify_determinism, RouteBatch};
///
/// let result = verify_determinism(3, &PathfindingConfig::inline(), || batch());
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<F>(runs: usize, config: &PathfindingConfig, setup: F) -> DeterminismResult
where
    F: Fn() -> RouteBatch,
{
    let mut requests = 0;
    let hashes = (0..runs)
        .map(|_| {
            let batch = setup();
            requests = batch.requests.len();
            outcomes_hash(&run_batch(&batch, config))
        })
        .collect();
    DeterminismResult::from_hashes(hashes, requests)
}

/// Run `batch` on `runs` scoped threads at once and compare outcome hashes.
///
/// Catches divergence that only shows up under thread scheduling, such as
/// results leaking between requesters.
pub fn run_parallel_batches<F>(runs: usize, config: &PathfindingConfig, setup: F) -> DeterminismResult
where
    F: Fn() -> RouteBatch + Sync,
{
    let batch_len = setup().requests.len();
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..runs)
            .map(|_| s.spawn(|| outcomes_hash(&run_batch(&setup(), config))))
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(u64::MAX))
            .collect()
    });
    DeterminismResult::from_hashes(hashes, batch_len)
}

/// Index of the first request whose outcome from a warm service differs from
/// a cold one in status or endpoint tiles.
///
/// The warm service keeps its context cache across the whole batch; the cold
/// side resets before every request.
pub fn find_first_cache_divergence(batch: &RouteBatch) -> Option<usize> {
    let config = PathfindingConfig::inline();
    let mut warm = PathfindingService::new(config.clone()).ok()?;
    let mut cold = PathfindingService::new(config).ok()?;

    batch.requests.iter().position(|request| {
        cold.reset();
        let a = warm.wait_route(&batch.world, request);
        let b = cold.wait_route(&batch.world, request);
        !same_shape(&a, &b)
    })
}

/// True if both outcomes have the same status and endpoint tiles.
#[must_use]
pub fn same_shape(a: &RouteOutcome, b: &RouteOutcome) -> bool {
    let ends = |route: &Route| {
        (
            route.path.first().map(|p| p.tile()),
            route.path.last().map(|p| p.tile()),
        )
    };
    match (a, b) {
        (RouteOutcome::Ok(x), RouteOutcome::Ok(y))
        | (RouteOutcome::Partial(x), RouteOutcome::Partial(y)) => ends(x) == ends(y),
        (RouteOutcome::Failed, RouteOutcome::Failed)
        | (RouteOutcome::Waiting, RouteOutcome::Waiting) => true,
        _ => false,
    }
}

/// Proptest strategies for pathfinding inputs.
pub mod strategies {
    use proptest::prelude::*;
    use tilepath_core::prelude::*;

    /// A tile inside a `width` × `height` map.
    pub fn arb_tile(width: i32, height: i32) -> impl Strategy<Value = TileCoord> {
        (0..width, 0..height).prop_map(|(x, y)| TileCoord::new(x, y))
    }

    /// A tile offset in any direction, up to a few map widths away.
    pub fn arb_tile_delta() -> impl Strategy<Value = TileCoord> {
        (-500i32..500, -500i32..500).prop_map(|(x, y)| TileCoord::new(x, y))
    }

    /// A land propulsion.
    pub fn arb_land_propulsion() -> impl Strategy<Value = Propulsion> {
        prop_oneof![
            Just(Propulsion::Wheeled),
            Just(Propulsion::HalfTracked),
            Just(Propulsion::Tracked),
            Just(Propulsion::Legged),
        ]
    }

    /// ASCII rows of land with scattered cliffs.
    ///
    /// `density` is the chance, in percent, of a tile being a cliff.
    pub fn arb_map_rows(
        width: usize,
        height: usize,
        density: u32,
    ) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec(
            proptest::collection::vec(0u32..100, width).prop_map(move |cells| {
                cells
                    .into_iter()
                    .map(|roll| if roll < density { '#' } else { '.' })
                    .collect::<String>()
            }),
            height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{open_grid, request, wall_with_gap};

    fn mixed_batch() -> RouteBatch {
        RouteBatch {
            world: wall_with_gap(16, 16, 8, 3),
            requests: vec![
                request(1, TileCoord::new(0, 0), TileCoord::new(15, 15)),
                request(2, TileCoord::new(2, 12), TileCoord::new(15, 15)),
                request(3, TileCoord::new(14, 1), TileCoord::new(1, 14)),
                request(1, TileCoord::new(4, 4), TileCoord::new(12, 2)),
            ],
        }
    }

    #[test]
    fn test_sequential_runs_match() {
        let result = verify_determinism(3, &PathfindingConfig::inline(), mixed_batch);
        assert_eq!(result.requests, 4);
        result.assert_deterministic();
    }

    #[test]
    fn test_threaded_worker_matches_inline() {
        let inline = outcomes_hash(&run_batch(&mixed_batch(), &PathfindingConfig::inline()));
        let threaded = outcomes_hash(&run_batch(&mixed_batch(), &PathfindingConfig::default()));
        assert_eq!(inline, threaded);
    }

    #[test]
    fn test_parallel_runs_match() {
        run_parallel_batches(4, &PathfindingConfig::default(), mixed_batch).assert_deterministic();
    }

    #[test]
    fn test_no_cache_divergence_on_open_map() {
        let batch = RouteBatch {
            world: open_grid(12, 12),
            requests: (0..6)
                .map(|i| request(i, TileCoord::new(i as i32, 0), TileCoord::new(11, 11)))
                .collect(),
        };
        assert_eq!(find_first_cache_divergence(&batch), None);
    }

    #[test]
    fn test_same_shape() {
        let route = |tiles: &[(i32, i32)]| Route {
            path: tiles.iter().map(|&(x, y)| TileCoord::new(x, y).center()).collect(),
            destination: WorldPoint::default(),
        };
        let a = RouteOutcome::Ok(route(&[(0, 0), (1, 1), (2, 2)]));
        let b = RouteOutcome::Ok(route(&[(0, 0), (1, 0), (2, 1), (2, 2)]));
        let c = RouteOutcome::Partial(route(&[(0, 0), (2, 2)]));
        assert!(same_shape(&a, &b));
        assert!(!same_shape(&a, &c));
        assert!(same_shape(&RouteOutcome::Failed, &RouteOutcome::Failed));
    }
}
