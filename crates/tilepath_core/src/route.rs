//! Route orchestration: context reuse, search and path reconstruction.
//!
//! A [`Pathfinder`] owns the context cache and turns [`PathJob`]s into
//! [`PathResult`]s. It is not thread-safe on its own; the worker thread owns
//! one exclusively.
//!
//! New searches run from the origin toward the destination. Once a path has
//! been found, the context is re-seeded as a search rooted at the destination
//! so that later requests toward the same destination, from any origin, can
//! continue the existing search instead of starting over. A successful new
//! search is answered from that re-seeded context too, so asking twice gives
//! the same waypoints.

use crate::area::NonBlockingArea;
use crate::astar;
use crate::config::PathfindingConfig;
use crate::context::{ContextCache, PathContext};
use crate::coords::{world_coord, TileCoord, WorldPoint, TILE_UNITS};
use crate::error::{PathError, Result};
use crate::job::{PathJob, PathResult, RouteStatus};
use crate::world::Propulsion;

/// Raw outcome of a search, before the caller's preferences are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// The destination was reached.
    Ok,
    /// The destination is unreachable; the path ends at the nearest tile.
    Nearest,
    /// No path could be produced.
    Failed,
}

/// Path produced by [`Pathfinder::route`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAttempt {
    /// Search status.
    pub status: SearchStatus,
    /// Waypoints in travel order.
    pub path: Vec<WorldPoint>,
}

impl RouteAttempt {
    const fn failed() -> Self {
        Self {
            status: SearchStatus::Failed,
            path: Vec::new(),
        }
    }
}

/// Single-threaded route engine with a warm context cache.
#[derive(Debug)]
pub struct Pathfinder {
    contexts: ContextCache,
}

impl Pathfinder {
    /// Create a pathfinder with an empty cache sized by `config`.
    #[must_use]
    pub fn new(config: &PathfindingConfig) -> Self {
        Self {
            contexts: ContextCache::new(
                config.context_cache_capacity.max(1),
                config.danger_cost_factor.max(1),
            ),
        }
    }

    /// The context cache.
    #[must_use]
    pub const fn contexts(&self) -> &ContextCache {
        &self.contexts
    }

    /// Drop every cached context.
    pub fn reset(&mut self) {
        tracing::debug!(contexts = self.contexts.len(), "path contexts cleared");
        self.contexts.clear();
    }

    /// Compute a route for `job` and apply its fallback rules.
    ///
    /// `Nearest` becomes [`RouteStatus::Partial`] only if the job accepts it.
    /// A failed search for a lifting, non-transporter unit becomes a direct
    /// flight to the destination.
    pub fn execute(&mut self, job: &PathJob) -> PathResult {
        let attempt = self.route(job);
        let result = finish(job, attempt);
        tracing::debug!(
            requester = job.requester,
            status = ?result.status,
            waypoints = result.path.len(),
            "path job finished"
        );
        result
    }

    /// Find a path from `job.origin` to `job.destination`.
    pub fn route(&mut self, job: &PathJob) -> RouteAttempt {
        let map = &job.blocking_map;
        let tile_orig = job.origin.tile();
        let tile_dest = job.destination.tile();
        let area = job.dst_area;

        let reused = self.find_reusable(job, tile_orig, tile_dest, area);
        let must_reverse = reused.is_none();
        let (index, end) = if let Some(index) = reused {
            tracing::trace!(requester = job.requester, slot = index, "path context reused");
            (index, tile_orig)
        } else {
            let index = self.contexts.acquire();
            let ctx = self.contexts.get_mut(index);
            astar::init_context(ctx, std::sync::Arc::clone(map), tile_orig, tile_orig, tile_dest, area);
            let end = astar::explore(ctx, tile_dest).unwrap_or(tile_orig);
            ctx.nearest = end;
            tracing::trace!(
                requester = job.requester,
                slot = index,
                reached = end == tile_dest,
                "path context searched"
            );
            (index, end)
        };

        let ctx = self.contexts.get_mut(index);
        let status = if ctx.nearest == tile_dest {
            SearchStatus::Ok
        } else {
            SearchStatus::Nearest
        };

        let mut path = match reconstruct(ctx, end) {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(requester = job.requester, error = %err, "path reconstruction failed");
                return RouteAttempt::failed();
            }
        };

        if status == SearchStatus::Ok {
            // The destination end is still a tile centre; use the exact point.
            let exact = if must_reverse {
                path.first_mut()
            } else {
                path.last_mut()
            };
            if let Some(point) = exact {
                *point = job.destination;
            }
        }

        if must_reverse {
            path.reverse();
            if !ctx.is_blocked(tile_orig) {
                // Keep the context rooted at the destination for later reuse.
                let nearest = ctx.nearest;
                astar::init_context(ctx, std::sync::Arc::clone(map), tile_dest, nearest, tile_orig, area);
                // Answer from the re-rooted search, as a repeated request would.
                if status == SearchStatus::Ok && astar::explore(ctx, tile_orig) == Some(tile_orig) {
                    match reconstruct(ctx, tile_orig) {
                        Ok(mut rerooted) => {
                            if let Some(point) = rerooted.last_mut() {
                                *point = job.destination;
                            }
                            path = rerooted;
                        }
                        Err(err) => {
                            tracing::debug!(requester = job.requester, error = %err, "keeping forward path");
                        }
                    }
                }
            }
        }

        self.contexts.touch(index);
        RouteAttempt { status, path }
    }

    /// Most recently used context rooted at `tile_dest` that reaches
    /// `tile_orig`, exploring further where needed.
    fn find_reusable(
        &mut self,
        job: &PathJob,
        tile_orig: TileCoord,
        tile_dest: TileCoord,
        area: NonBlockingArea,
    ) -> Option<usize> {
        for index in self.contexts.mru_order() {
            let ctx = self.contexts.get_mut(index);
            if !ctx.matches(&job.blocking_map, tile_dest, area) {
                continue;
            }
            if ctx.is_visited(tile_orig) {
                return Some(index);
            }
            astar::reestimate(ctx, tile_orig);
            if astar::explore(ctx, tile_orig) == Some(tile_orig) {
                return Some(index);
            }
            tracing::trace!(slot = index, "cached context does not reach origin");
        }
        None
    }
}

/// Apply the job's fallback rules to a raw search outcome.
fn finish(job: &PathJob, attempt: RouteAttempt) -> PathResult {
    let (status, path) = match attempt.status {
        SearchStatus::Ok => (RouteStatus::Ok, attempt.path),
        SearchStatus::Nearest if job.accept_nearest => (RouteStatus::Partial, attempt.path),
        SearchStatus::Nearest => (RouteStatus::Failed, Vec::new()),
        SearchStatus::Failed
            if job.propulsion == Propulsion::Lift && !job.transporter =>
        {
            (RouteStatus::Ok, vec![job.destination])
        }
        SearchStatus::Failed => (RouteStatus::Failed, Vec::new()),
    };

    PathResult {
        requester: job.requester,
        status,
        destination: path.last().copied().unwrap_or(job.destination),
        path,
        original_destination: job.destination,
    }
}

/// Walk the back-offsets from `end` to the context's start.
///
/// Returns waypoints from `end` toward the start. Each step moves back by
/// twice the stored offset, then snaps to the tile centre on any axis whose
/// neighbouring tile blocks, so waypoints keep clear of walls.
///
/// # Errors
///
/// Fails if a waypoint leaves the map, or if more waypoints than tiles are
/// produced.
pub fn reconstruct(ctx: &PathContext, end: TileCoord) -> Result<Vec<WorldPoint>> {
    let (width, height) = ctx
        .blocking_map
        .as_ref()
        .map_or((0, 0), |map| (map.width(), map.height()));
    let limit = (width.max(0) as usize) * (height.max(0) as usize);

    let mut path = Vec::new();
    let mut p = end.center();
    loop {
        if !p.on_map(width, height) {
            return Err(PathError::ReconstructOffMap(p));
        }
        if path.len() >= limit {
            return Err(PathError::ReconstructLoop { limit });
        }
        path.push(p);

        let (dx, dy) = ctx
            .explored(p.tile())
            .map_or((0, 0), |tile| (i32::from(tile.dx), i32::from(tile.dy)));
        let mut next = WorldPoint::new(p.x - dx * 2, p.y - dy * 2);
        let next_tile = next.tile();
        let x_side = if next.x - world_coord(next_tile.x) > TILE_UNITS / 2 { 1 } else { -1 };
        let y_side = if next.y - world_coord(next_tile.y) > TILE_UNITS / 2 { 1 } else { -1 };
        if ctx.is_blocked(next_tile.offset(x_side, 0)) {
            next.x = next_tile.center().x;
        }
        if ctx.is_blocked(next_tile.offset(0, y_side)) {
            next.y = next_tile.center().y;
        }

        if p.tile() == ctx.tile_s || p == next {
            break;
        }
        p = next;
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::blocking::{BlockingKey, BlockingMap, BlockingMapBuilder};
    use crate::world::MoveType;

    fn map_with(width: i32, height: i32, blocked: &[(i32, i32)]) -> Arc<BlockingMap> {
        let key = BlockingKey::new(0, 0, Propulsion::Wheeled, MoveType::Move);
        let mut builder = BlockingMapBuilder::new(key, width, height);
        for &(x, y) in blocked {
            builder.block(TileCoord::new(x, y));
        }
        Arc::new(builder.build())
    }

    fn job(map: &Arc<BlockingMap>, from: TileCoord, to: TileCoord) -> PathJob {
        PathJob {
            requester: 1,
            origin: from.center(),
            destination: to.center() + WorldPoint::new(10, -20),
            propulsion: Propulsion::Wheeled,
            move_type: MoveType::Move,
            owner: 0,
            accept_nearest: true,
            transporter: false,
            dst_area: NonBlockingArea::EMPTY,
            blocking_map: Arc::clone(map),
            ticket: 0,
        }
    }

    fn pathfinder() -> Pathfinder {
        Pathfinder::new(&PathfindingConfig::inline())
    }

    fn assert_contiguous(path: &[WorldPoint]) {
        for pair in path.windows(2) {
            let (a, b) = (pair[0].tile(), pair[1].tile());
            assert!(
                (a.x - b.x).abs() <= 1 && (a.y - b.y).abs() <= 1,
                "waypoints {a:?} -> {b:?} skip a tile"
            );
        }
    }

    #[test]
    fn test_open_diagonal_route() {
        let map = map_with(10, 10, &[]);
        let job = job(&map, TileCoord::new(0, 0), TileCoord::new(9, 9));
        let attempt = pathfinder().route(&job);

        assert_eq!(attempt.status, SearchStatus::Ok);
        assert_eq!(attempt.path.len(), 10);
        assert_eq!(attempt.path[0], TileCoord::new(0, 0).center());
        assert_eq!(attempt.path.last(), Some(&job.destination));
        for (i, point) in attempt.path.iter().enumerate().take(9) {
            assert_eq!(point.tile(), TileCoord::new(i as i32, i as i32));
        }
    }

    #[test]
    fn test_context_is_rerooted_at_destination() {
        let map = map_with(10, 10, &[]);
        let mut pf = pathfinder();
        pf.route(&job(&map, TileCoord::new(0, 0), TileCoord::new(9, 9)));

        assert_eq!(pf.contexts().len(), 1);
        let ctx = pf.contexts().get(pf.contexts().mru_order()[0]);
        assert_eq!(ctx.start(), TileCoord::new(9, 9));
        assert_eq!(ctx.nearest(), TileCoord::new(9, 9));
    }

    #[test]
    fn test_second_origin_reuses_context() {
        let map = map_with(10, 10, &[]);
        let mut pf = pathfinder();
        pf.route(&job(&map, TileCoord::new(0, 0), TileCoord::new(9, 9)));

        let second = job(&map, TileCoord::new(0, 9), TileCoord::new(9, 9));
        let attempt = pf.route(&second);
        assert_eq!(pf.contexts().len(), 1);
        assert_eq!(attempt.status, SearchStatus::Ok);
        assert_eq!(attempt.path[0].tile(), TileCoord::new(0, 9));
        assert_eq!(attempt.path.last(), Some(&second.destination));
        assert_contiguous(&attempt.path);
    }

    #[test]
    fn test_wall_gap_route() {
        let blocked: Vec<_> = (1..10).map(|y| (5, y)).collect();
        let map = map_with(10, 10, &blocked);
        let job = job(&map, TileCoord::new(0, 9), TileCoord::new(9, 9));
        let attempt = pathfinder().route(&job);

        assert_eq!(attempt.status, SearchStatus::Ok);
        assert!(attempt.path.iter().any(|p| p.tile() == TileCoord::new(5, 0)));
        assert!(attempt.path.iter().all(|p| !map.is_blocked(p.tile())));
        assert_contiguous(&attempt.path);
    }

    #[test]
    fn test_unreachable_route_is_nearest() {
        let blocked: Vec<_> = (0..6).map(|y| (3, y)).collect();
        let map = map_with(6, 6, &blocked);
        let job = job(&map, TileCoord::new(0, 2), TileCoord::new(5, 2));
        let attempt = pathfinder().route(&job);

        assert_eq!(attempt.status, SearchStatus::Nearest);
        assert_eq!(attempt.path.first().map(|p| p.tile()), Some(TileCoord::new(0, 2)));
        assert_eq!(attempt.path.last(), Some(&TileCoord::new(2, 2).center()));
    }

    #[test]
    fn test_finish_applies_fallbacks() {
        let map = map_with(4, 4, &[]);
        let mut job = job(&map, TileCoord::new(0, 0), TileCoord::new(3, 3));
        let partial = RouteAttempt {
            status: SearchStatus::Nearest,
            path: vec![TileCoord::new(0, 0).center(), TileCoord::new(1, 1).center()],
        };

        let result = finish(&job, partial.clone());
        assert_eq!(result.status, RouteStatus::Partial);
        assert_eq!(result.destination, TileCoord::new(1, 1).center());
        assert_eq!(result.original_destination, job.destination);

        job.accept_nearest = false;
        let result = finish(&job, partial);
        assert_eq!(result.status, RouteStatus::Failed);
        assert!(result.path.is_empty());

        job.propulsion = Propulsion::Lift;
        let result = finish(&job, RouteAttempt::failed());
        assert_eq!(result.status, RouteStatus::Ok);
        assert_eq!(result.path, vec![job.destination]);

        job.transporter = true;
        assert_eq!(finish(&job, RouteAttempt::failed()).status, RouteStatus::Failed);
    }

    #[test]
    fn test_fresh_caches_agree() {
        let blocked = [(3, 3), (3, 4), (4, 3), (6, 1), (6, 2)];
        let map = map_with(10, 10, &blocked);
        let job = job(&map, TileCoord::new(1, 8), TileCoord::new(8, 1));

        let mut pf = pathfinder();
        let first = pf.route(&job);
        pf.reset();
        assert!(pf.contexts().is_empty());
        let second = pf.route(&job);
        let third = pathfinder().route(&job);
        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_reconstruct_rejects_unassigned_context() {
        let ctx = PathContext::new(5);
        assert!(matches!(
            reconstruct(&ctx, TileCoord::new(0, 0)),
            Err(PathError::ReconstructOffMap(_))
        ));
    }
}
