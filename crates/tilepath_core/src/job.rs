//! Path jobs and their results.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::area::NonBlockingArea;
use crate::blocking::BlockingMap;
use crate::coords::WorldPoint;
use crate::world::{MoveType, PlayerId, Propulsion};

/// Identifies the entity a route is computed for.
///
/// Each requester has at most one job or unclaimed result in flight.
pub type RequesterId = u64;

/// Result status reported to the movement system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStatus {
    /// The route reaches the destination.
    Ok,
    /// The destination is unreachable; the route ends at the nearest
    /// reachable tile.
    Partial,
    /// No usable route.
    Failed,
}

/// A queued route computation.
///
/// Carries everything the worker needs, including a shared handle to the
/// blocking map captured when the job was submitted.
#[derive(Debug, Clone)]
pub struct PathJob {
    /// Entity the route is for.
    pub requester: RequesterId,
    /// Start position, already moved off blocking tiles.
    pub origin: WorldPoint,
    /// Goal position, already moved off blocking tiles unless it targets a
    /// structure.
    pub destination: WorldPoint,
    /// Locomotion class of the unit.
    pub propulsion: Propulsion,
    /// Movement intent.
    pub move_type: MoveType,
    /// Owner of the unit.
    pub owner: PlayerId,
    /// Accept a route to the nearest reachable tile.
    pub accept_nearest: bool,
    /// The unit carries other units.
    pub transporter: bool,
    /// Footprint that never blocks this search.
    pub dst_area: NonBlockingArea,
    /// Blocking snapshot for this job.
    pub blocking_map: Arc<BlockingMap>,
    pub(crate) ticket: u64,
}

/// Outcome of a [`PathJob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    /// Entity the route is for.
    pub requester: RequesterId,
    /// Result status.
    pub status: RouteStatus,
    /// Waypoints in travel order. Empty when the job failed.
    pub path: Vec<WorldPoint>,
    /// Final waypoint, or the requested destination if there is none.
    pub destination: WorldPoint,
    /// The destination the job was submitted with. Used to spot stale
    /// results after the requester changes its mind.
    pub original_destination: WorldPoint,
}

impl PathJob {
    /// A job that moves like the blocking map's owner and accepts partial
    /// routes.
    #[must_use]
    pub fn new(
        requester: RequesterId,
        origin: WorldPoint,
        destination: WorldPoint,
        propulsion: Propulsion,
        blocking_map: Arc<BlockingMap>,
    ) -> Self {
        let key = *blocking_map.key();
        Self {
            requester,
            origin,
            destination,
            propulsion,
            move_type: key.move_type,
            owner: key.player,
            accept_nearest: true,
            transporter: false,
            dst_area: NonBlockingArea::EMPTY,
            blocking_map,
            ticket: 0,
        }
    }

    /// Let the search pass through `area`.
    #[must_use]
    pub fn with_area(mut self, area: NonBlockingArea) -> Self {
        self.dst_area = area;
        self
    }
}

impl PathResult {
    /// A failed result for `job`.
    pub(crate) fn failed(job: &PathJob) -> Self {
        Self {
            requester: job.requester,
            status: RouteStatus::Failed,
            path: Vec::new(),
            destination: job.destination,
            original_destination: job.destination,
        }
    }
}
