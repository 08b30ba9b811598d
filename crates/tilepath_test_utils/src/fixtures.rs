//! Test fixtures and helpers.
//!
//! Maps, jobs and services in the shapes the tests keep needing.

use std::sync::{Arc, Once};

use tilepath_core::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install a tracing subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
/// Filtered by `RUST_LOG`, silent by default.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Build a grid from ASCII rows. See [`TileGrid::from_rows`] for the legend.
///
/// # Panics
///
/// Panics if the rows do not parse; fixtures are expected to be valid.
#[must_use]
pub fn grid(rows: &[&str]) -> TileGrid {
    match TileGrid::from_rows(rows) {
        Ok(grid) => grid,
        Err(err) => panic!("invalid fixture map: {err}"),
    }
}

/// An all-land grid.
#[must_use]
pub fn open_grid(width: i32, height: i32) -> TileGrid {
    TileGrid::new(width, height)
}

/// A grid with a cliff wall down `column`, open only at `gap_row`.
#[must_use]
pub fn wall_with_gap(width: i32, height: i32, column: i32, gap_row: i32) -> TileGrid {
    let mut grid = TileGrid::new(width, height);
    for y in (0..height).filter(|&y| y != gap_row) {
        grid.set_terrain(TileCoord::new(column, y), Terrain::Cliff);
    }
    grid
}

/// A grid with a cliff wall right across `column`.
#[must_use]
pub fn split_grid(width: i32, height: i32, column: i32) -> TileGrid {
    wall_with_gap(width, height, column, -1)
}

/// Blocking map for player 0 moving with `propulsion` on `grid`.
#[must_use]
pub fn blocking_map(grid: &TileGrid, propulsion: Propulsion) -> Arc<BlockingMap> {
    let key = BlockingKey::new(grid.game_time(), 0, propulsion, MoveType::Move);
    Arc::new(BlockingMap::from_world(grid, key))
}

/// A wheeled job between two tile centres.
#[must_use]
pub fn job(map: &Arc<BlockingMap>, requester: RequesterId, from: TileCoord, to: TileCoord) -> PathJob {
    PathJob::new(
        requester,
        from.center(),
        to.center(),
        Propulsion::Wheeled,
        Arc::clone(map),
    )
}

/// A wheeled move request between two tile centres.
#[must_use]
pub fn request(requester: RequesterId, from: TileCoord, to: TileCoord) -> RouteRequest {
    RouteRequest::new(requester, from.center(), to.center(), Propulsion::Wheeled)
}

/// A service that runs jobs on the calling thread.
///
/// # Panics
///
/// Never in practice; inline services spawn no thread.
#[must_use]
pub fn inline_service() -> PathfindingService {
    match PathfindingService::new(PathfindingConfig::inline()) {
        Ok(service) => service,
        Err(err) => panic!("inline service failed to start: {err}"),
    }
}

/// Every tile of `path`, in order.
#[must_use]
pub fn path_tiles(path: &[WorldPoint]) -> Vec<TileCoord> {
    path.iter().map(|p| p.tile()).collect()
}

/// True if consecutive waypoints never skip over a tile.
#[must_use]
pub fn is_contiguous(path: &[WorldPoint]) -> bool {
    path.windows(2).all(|pair| {
        let (a, b) = (pair[0].tile(), pair[1].tile());
        (a.x - b.x).abs() <= 1 && (a.y - b.y).abs() <= 1
    })
}
