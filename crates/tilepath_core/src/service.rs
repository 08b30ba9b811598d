//! Route request façade.
//!
//! [`PathfindingService`] is what the movement system talks to. Requests are
//! validated and turned into [`PathJob`]s on the calling thread, run on the
//! worker, and picked up by polling: call [`PathfindingService::request_route`]
//! once per tick with the unit's current orders until it stops returning
//! [`RouteOutcome::Waiting`].
//!
//! ```no_run
//! use tilepath_core::prelude::*;
//!
//! let world = TileGrid::new(16, 16);
//! let mut service = PathfindingService::new(PathfindingConfig::default())?;
//! let request = RouteRequest::new(
//!     1,
//!     TileCoord::new(1, 1).center(),
//!     TileCoord::new(14, 12).center(),
//!     Propulsion::Wheeled,
//! );
//! match service.wait_route(&world, &request) {
//!     RouteOutcome::Ok(route) => println!("{} waypoints", route.path.len()),
//!     other => println!("no route: {other:?}"),
//! }
//! # Ok::<(), tilepath_core::error::PathError>(())
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::area::NonBlockingArea;
use crate::blocking::{BlockingKey, BlockingMapTable};
use crate::config::{PathfindingConfig, WorkerMode};
use crate::coords::WorldPoint;
use crate::error::{PathError, Result};
use crate::job::{PathJob, PathResult, RequesterId, RouteStatus};
use crate::route::Pathfinder;
use crate::world::{find_nonblocking_position, MoveType, PathWorld, PlayerId, Propulsion};
use crate::worker::{run_item, JobQueue, Poll, Worker};

/// A route request from the movement system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Entity the route is for.
    pub requester: RequesterId,
    /// Current position.
    pub origin: WorldPoint,
    /// Desired position.
    pub destination: WorldPoint,
    /// Locomotion class.
    pub propulsion: Propulsion,
    /// Movement intent.
    #[serde(default)]
    pub move_type: MoveType,
    /// Owner of the unit.
    #[serde(default)]
    pub player: PlayerId,
    /// Accept a route to the nearest reachable tile.
    #[serde(default = "default_accept_nearest")]
    pub accept_nearest: bool,
    /// The unit carries other units.
    #[serde(default)]
    pub transporter: bool,
}

const fn default_accept_nearest() -> bool {
    true
}

impl RouteRequest {
    /// A plain move order for player 0 that accepts partial routes.
    #[must_use]
    pub const fn new(
        requester: RequesterId,
        origin: WorldPoint,
        destination: WorldPoint,
        propulsion: Propulsion,
    ) -> Self {
        Self {
            requester,
            origin,
            destination,
            propulsion,
            move_type: MoveType::Move,
            player: 0,
            accept_nearest: true,
            transporter: false,
        }
    }

    /// Set the owning player.
    #[must_use]
    pub const fn with_player(mut self, player: PlayerId) -> Self {
        self.player = player;
        self
    }

    /// Set the movement intent.
    #[must_use]
    pub const fn with_move_type(mut self, move_type: MoveType) -> Self {
        self.move_type = move_type;
        self
    }

    /// Report unreachable destinations as failures instead of partial routes.
    #[must_use]
    pub const fn rejecting_nearest(mut self) -> Self {
        self.accept_nearest = false;
        self
    }

    /// Mark the unit as a transporter.
    #[must_use]
    pub const fn as_transporter(mut self) -> Self {
        self.transporter = true;
        self
    }
}

/// A computed route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Waypoints in travel order.
    pub path: Vec<WorldPoint>,
    /// Final waypoint.
    pub destination: WorldPoint,
}

/// Answer to a route request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteOutcome {
    /// The route reaches the destination.
    Ok(Route),
    /// The destination is unreachable; the route ends as close as possible.
    Partial(Route),
    /// No route. Also returned for invalid requests.
    Failed,
    /// The route is being computed; ask again next tick.
    Waiting,
}

impl RouteOutcome {
    /// The route, if there is one.
    #[must_use]
    pub const fn route(&self) -> Option<&Route> {
        match self {
            Self::Ok(route) | Self::Partial(route) => Some(route),
            Self::Failed | Self::Waiting => None,
        }
    }

    fn from_result(result: PathResult) -> Self {
        let route = Route {
            path: result.path,
            destination: result.destination,
        };
        match result.status {
            RouteStatus::Ok => Self::Ok(route),
            RouteStatus::Partial => Self::Partial(route),
            RouteStatus::Failed => Self::Failed,
        }
    }
}

/// Request endpoints after moving them off blocking tiles.
#[derive(Debug, Clone, Copy)]
struct Endpoints {
    origin: WorldPoint,
    destination: WorldPoint,
    dst_area: NonBlockingArea,
}

enum Executor {
    /// Held for its `Drop`, which stops and joins the thread.
    Threaded { _worker: Worker },
    Inline(Box<Pathfinder>),
}

/// Asynchronous pathfinding front end.
///
/// Owns the blocking map table (used on the calling thread) and either a
/// background worker or an inline pathfinder. Dropping the service stops the
/// worker.
pub struct PathfindingService {
    config: PathfindingConfig,
    blocking_maps: BlockingMapTable,
    queue: Arc<JobQueue>,
    executor: Executor,
}

impl std::fmt::Debug for PathfindingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathfindingService")
            .field("config", &self.config)
            .field("blocking_maps", &self.blocking_maps.len())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl PathfindingService {
    /// Start the service.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::WorkerSpawn`] if the worker thread cannot be
    /// started.
    pub fn new(config: PathfindingConfig) -> Result<Self> {
        let queue = Arc::new(JobQueue::new());
        let pathfinder = Pathfinder::new(&config);
        let executor = match config.worker_mode {
            WorkerMode::Threaded => Executor::Threaded {
                _worker: Worker::spawn(Arc::clone(&queue), pathfinder)?,
            },
            WorkerMode::Inline => Executor::Inline(Box::new(pathfinder)),
        };
        tracing::info!(
            mode = ?config.worker_mode,
            contexts = config.context_cache_capacity,
            "pathfinding service started"
        );
        Ok(Self {
            config,
            blocking_maps: BlockingMapTable::new(),
            queue,
            executor,
        })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &PathfindingConfig {
        &self.config
    }

    /// Blocking maps cached for the current tick.
    #[must_use]
    pub const fn blocking_maps(&self) -> &BlockingMapTable {
        &self.blocking_maps
    }

    /// Ask for a route, or collect one asked for earlier.
    ///
    /// Returns [`RouteOutcome::Waiting`] while the job is queued or running.
    /// A finished result for a different destination than `request` asks for
    /// is discarded and a new job is submitted.
    pub fn request_route<W: PathWorld + ?Sized>(
        &mut self,
        world: &W,
        request: &RouteRequest,
    ) -> RouteOutcome {
        let endpoints = match prepare(world, request) {
            Ok(endpoints) => endpoints,
            Err(err) => {
                tracing::warn!(requester = request.requester, error = %err, "route request rejected");
                return RouteOutcome::Failed;
            }
        };

        match self.queue.poll(request.requester) {
            Poll::Ready(result) if result.original_destination == endpoints.destination => {
                return RouteOutcome::from_result(result);
            }
            Poll::Ready(_) => {
                tracing::debug!(requester = request.requester, "stale route discarded");
            }
            Poll::Pending { destination } if destination == endpoints.destination => {
                return RouteOutcome::Waiting;
            }
            Poll::Pending { .. } => {
                tracing::debug!(requester = request.requester, "pending route superseded");
            }
            Poll::Empty => {}
        }

        self.submit(world, request, endpoints);
        RouteOutcome::Waiting
    }

    /// Like [`Self::request_route`], but blocks until the route is ready.
    pub fn wait_route<W: PathWorld + ?Sized>(
        &mut self,
        world: &W,
        request: &RouteRequest,
    ) -> RouteOutcome {
        match self.request_route(world, request) {
            RouteOutcome::Waiting => {}
            outcome => return outcome,
        }
        self.queue
            .wait_ready(request.requester)
            .map_or(RouteOutcome::Failed, RouteOutcome::from_result)
    }

    /// Drop any queued job or unclaimed result for `requester`.
    ///
    /// A job already running still finishes, but its result is discarded.
    pub fn cancel(&self, requester: RequesterId) -> bool {
        self.queue.cancel(requester)
    }

    /// Forget every cached blocking map and search context, e.g. after
    /// loading a new map.
    pub fn reset(&mut self) {
        self.blocking_maps.clear();
        self.queue.submit_reset();
        self.run_inline();
    }

    /// Number of jobs waiting to run.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Jobs and unclaimed results held for `requester`. Never more than one.
    #[must_use]
    pub fn pending_entries(&self, requester: RequesterId) -> usize {
        self.queue.entries_for(requester)
    }

    fn submit<W: PathWorld + ?Sized>(
        &mut self,
        world: &W,
        request: &RouteRequest,
        endpoints: Endpoints,
    ) {
        let key = BlockingKey::new(
            world.game_time(),
            request.player,
            request.propulsion,
            request.move_type,
        );
        let blocking_map = self.blocking_maps.get_or_build(world, key);
        let mut job = PathJob::new(
            request.requester,
            endpoints.origin,
            endpoints.destination,
            request.propulsion,
            blocking_map,
        )
        .with_area(endpoints.dst_area);
        // The table may hand back an equivalent map built for another player
        job.move_type = request.move_type;
        job.owner = request.player;
        job.accept_nearest = request.accept_nearest;
        job.transporter = request.transporter;
        self.queue.submit(job);
        self.run_inline();
    }

    fn run_inline(&mut self) {
        if let Executor::Inline(pathfinder) = &mut self.executor {
            while let Some(item) = self.queue.try_next_item() {
                run_item(&self.queue, pathfinder, item);
            }
        }
    }
}

/// Validate `request` and move its endpoints off blocking tiles.
///
/// Endpoints are nudged as if every structure blocks, so a unit standing in
/// an open gate is moved out of it. The destination stays put when it lies
/// on a structure; the structure's footprint becomes the search's exception
/// area instead.
fn prepare<W: PathWorld + ?Sized>(world: &W, request: &RouteRequest) -> Result<Endpoints> {
    for point in [request.origin, request.destination] {
        if !world.world_on_map(point) {
            return Err(PathError::OffMap(point));
        }
    }

    let adjust = |point| {
        find_nonblocking_position(
            world,
            point,
            request.propulsion,
            request.player,
            MoveType::Block,
        )
    };
    let origin = adjust(request.origin);
    let structure = world.structure_footprint(request.destination.tile());
    let destination = match structure {
        Some(_) => request.destination,
        None => adjust(request.destination),
    };
    if origin == destination {
        return Err(PathError::SameEndpoints(origin));
    }

    Ok(Endpoints {
        origin,
        destination,
        dst_area: structure.unwrap_or(NonBlockingArea::EMPTY),
    })
}
