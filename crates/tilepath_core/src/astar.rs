//! Incremental A* over a [`PathContext`].
//!
//! Distances are integers scaled so that a straight step costs
//! [`STRAIGHT_COST`] and a diagonal step [`DIAGONAL_COST`]. When a tile is
//! reached from two neighbouring directions the search interpolates between
//! them, so recorded distances approach true Euclidean distance and the stored
//! back-offsets point along any-angle lines instead of 45° zigzags.
//!
//! A context can be explored repeatedly toward different targets. Call
//! [`reestimate`] before exploring toward a new target so that the open set is
//! ordered by estimates to that target.

use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::area::NonBlockingArea;
use crate::blocking::BlockingMap;
use crate::context::{ExploredTile, PathContext, PathNode};
use crate::coords::TileCoord;
use crate::math::i_hypot;

/// Cost of a straight step.
pub const STRAIGHT_COST: u32 = 140;

/// Cost of a diagonal step. Close to `140·√2`.
pub const DIAGONAL_COST: u32 = 198;

/// Weight of the shorter axis in [`estimate_rough`].
const ROUGH_MINOR_COST: u32 = DIAGONAL_COST - STRAIGHT_COST;

/// Back-offset magnitude of a straight step, in 1/64 tile units.
const STEP_UNITS: i32 = 64;

/// Largest gradient `x` for which [`GRADIENT_Y`] has an entry.
pub const MAX_GRADIENT_X: i32 = 98;

/// `GRADIENT_Y[x] = round(sqrt(140² − x²))`.
///
/// Given how much further one neighbour is than the other, gives the remaining
/// perpendicular distance to a point reached from both.
pub const GRADIENT_Y: [u8; 99] = [
    140, 140, 140, 140, 140, 140, 140, 140, 140, 140, 140, 140, 139, 139, 139, 139, 139, 139,
    139, 139, 139, 138, 138, 138, 138, 138, 138, 137, 137, 137, 137, 137, 136, 136, 136, 136,
    135, 135, 135, 134, 134, 134, 134, 133, 133, 133, 132, 132, 132, 131, 131, 130, 130, 130,
    129, 129, 128, 128, 127, 127, 126, 126, 126, 125, 125, 124, 123, 123, 122, 122, 121, 121,
    120, 119, 119, 118, 118, 117, 116, 116, 115, 114, 113, 113, 112, 111, 110, 110, 109, 108,
    107, 106, 106, 105, 104, 103, 102, 101, 100,
];

/// Direction offsets for 8-directional movement.
///
/// Odd indices are diagonals; the orthogonals either side of diagonal `d` are
/// at `(d + 1) % 8` and `(d + 7) % 8`.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),   // East
    (1, 1),   // Southeast
    (0, 1),   // South
    (-1, 1),  // Southwest
    (-1, 0),  // West
    (-1, -1), // Northwest
    (0, -1),  // North
    (1, -1),  // Northeast
];

/// Cheap octile step estimate between two tiles.
#[inline]
#[must_use]
pub fn estimate_rough(a: TileCoord, b: TileCoord) -> u32 {
    let dx = a.x.abs_diff(b.x);
    let dy = a.y.abs_diff(b.y);
    dx.min(dy) * ROUGH_MINOR_COST + dx.max(dy) * STRAIGHT_COST
}

/// Euclidean distance estimate between two tiles, rounded down.
///
/// Never exceeds [`estimate_rough`] for the same pair.
#[inline]
#[must_use]
pub fn estimate_precise(a: TileCoord, b: TileCoord) -> u32 {
    let step = STRAIGHT_COST as i32;
    i_hypot((a.x - b.x) * step, (a.y - b.y) * step)
}

/// Reset `ctx` for a new search and seed it with a single node.
///
/// `tile_s` identifies the context; `real_start` is where exploring begins,
/// which differs from `tile_s` when a reversed context is seeded from the
/// nearest reachable tile.
pub fn init_context(
    ctx: &mut PathContext,
    blocking_map: Arc<BlockingMap>,
    tile_s: TileCoord,
    real_start: TileCoord,
    target: TileCoord,
    dst_ignore: NonBlockingArea,
) {
    ctx.assign(blocking_map, tile_s, dst_ignore);
    generate_node(ctx, target, real_start, 0, real_start);
}

/// Recompute every open node's estimate toward `target` and reorder the open
/// set.
pub fn reestimate(ctx: &mut PathContext, target: TileCoord) {
    let mut nodes = std::mem::take(&mut ctx.nodes).into_vec();
    for node in &mut nodes {
        node.est = node.dist.wrapping_add(estimate_precise(node.coord, target));
    }
    ctx.nodes = BinaryHeap::from(nodes);
}

/// Explore from the open set until `target` is closed or the set is empty.
///
/// Returns `target` if it was reached, otherwise the closed tile with the
/// smallest remaining estimate. Returns `None` when the open set was already
/// empty and nothing new was closed.
pub fn explore(ctx: &mut PathContext, target: TileCoord) -> Option<TileCoord> {
    let mut nearest = None;
    let mut nearest_remaining = u32::MAX;
    let mut found = false;

    while !found {
        let Some(node) = ctx.nodes.pop() else {
            break;
        };
        let Some(index) = ctx.index(node.coord) else {
            continue;
        };
        if ctx.map[index].visited {
            continue;
        }
        ctx.map[index].visited = true;

        let remaining = node.est.wrapping_sub(node.dist);
        if remaining < nearest_remaining {
            nearest = Some(node.coord);
            nearest_remaining = remaining;
        }
        if node.coord == target {
            nearest = Some(node.coord);
            found = true;
        }

        // The target's neighbours are still pushed so a later search from
        // this context finds a consistent frontier.
        expand_neighbors(ctx, &node, target);
    }

    nearest
}

/// Push every passable neighbour of `node`.
fn expand_neighbors(ctx: &mut PathContext, node: &PathNode, target: TileCoord) {
    let here = node.coord;
    let ignore_corners = ctx.exception_area().is_nonblocking(here);

    for (dir, &(dx, dy)) in DIRECTIONS.iter().enumerate() {
        if dir % 2 == 1 && !ignore_corners {
            // No squeezing between a blocker and the step's corner
            let (ax, ay) = DIRECTIONS[(dir + 1) % 8];
            let (bx, by) = DIRECTIONS[(dir + 7) % 8];
            if ctx.is_blocked(here.offset(ax, ay)) || ctx.is_blocked(here.offset(bx, by)) {
                continue;
            }
        }

        let next = here.offset(dx, dy);
        if ctx.is_blocked(next) {
            continue;
        }
        generate_node(ctx, target, next, node.dist, here);
    }
}

/// Offer `pos`, reached from `prev_pos`, to the open set.
///
/// If `pos` already has a better or equal entry in this iteration nothing
/// changes. When `pos` was previously reached from a direction adjacent to the
/// current one, the distance is refined by interpolating between both
/// predecessors.
pub(crate) fn generate_node(
    ctx: &mut PathContext,
    target: TileCoord,
    pos: TileCoord,
    prev_dist: u32,
    prev_pos: TileCoord,
) {
    let Some(index) = ctx.index(pos) else {
        tracing::warn!(x = pos.x, y = pos.y, "path node off the map");
        return;
    };

    let cost_factor = if ctx.is_dangerous(pos) {
        ctx.danger_cost_factor
    } else {
        1
    };
    let mut dist = prev_dist.wrapping_add(estimate_rough(prev_pos, pos).wrapping_mul(cost_factor));
    let mut est = dist.wrapping_add(estimate_precise(pos, target));
    let mut delta = (
        (pos.x - prev_pos.x) * STEP_UNITS,
        (pos.y - prev_pos.y) * STEP_UNITS,
    );
    let is_diagonal = delta.0 != 0 && delta.1 != 0;

    let iteration = ctx.iteration;
    let explored = ctx.map[index];
    if explored.iteration == iteration {
        if explored.visited {
            return;
        }

        let mut delta_a = delta;
        let mut delta_b = (i32::from(explored.dx), i32::from(explored.dy));
        let spread = (delta_a.0 - delta_b.0).abs() + (delta_a.1 - delta_b.1).abs();
        if spread == STEP_UNITS {
            // Reached from two adjacent directions: interpolate
            let (own_step, other_step) = if is_diagonal {
                (DIAGONAL_COST, STRAIGHT_COST)
            } else {
                (STRAIGHT_COST, DIAGONAL_COST)
            };
            let mut dist_a = dist.wrapping_sub(own_step.wrapping_mul(cost_factor));
            let mut dist_b = explored.dist.wrapping_sub(other_step.wrapping_mul(cost_factor));
            if !is_diagonal {
                std::mem::swap(&mut dist_a, &mut dist_b);
                std::mem::swap(&mut delta_a, &mut delta_b);
            }

            let gradient_x = (dist_b.wrapping_sub(dist_a) as i32) / cost_factor as i32;
            if gradient_x > 0 && gradient_x <= MAX_GRADIENT_X {
                let gradient_y = i32::from(GRADIENT_Y[gradient_x as usize]);
                let dist_p = (gradient_y as u32)
                    .wrapping_mul(cost_factor)
                    .wrapping_add(dist_b);
                est = est.wrapping_sub(dist.wrapping_sub(dist_p));
                dist = dist_p;
                delta = (
                    (delta_a.0 * gradient_x + delta_b.0 * (gradient_y - gradient_x)) / gradient_y,
                    (delta_a.1 * gradient_x + delta_b.1 * (gradient_y - gradient_x)) / gradient_y,
                );
            }
        }

        if explored.dist <= dist {
            return;
        }
    }

    ctx.map[index] = ExploredTile {
        iteration,
        dx: delta.0 as i8,
        dy: delta.1 as i8,
        dist,
        visited: false,
    };
    ctx.nodes.push(PathNode {
        coord: pos,
        dist,
        est,
    });
}
