//! Background job queue.
//!
//! A single worker thread drains a FIFO of [`PathJob`]s and stores each
//! result in a per-requester slot. The simulation thread submits jobs and
//! polls the slots; it never blocks on the worker unless it asks to.
//!
//! # At most one job per requester
//!
//! Each requester owns one slot. Submitting a job for a requester removes any
//! queued job and unclaimed result it already has and stamps the new job with
//! a fresh ticket. A job that was already running when it was superseded
//! still finishes, but its result is only stored if the slot still carries
//! the same ticket, so it is silently dropped.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use rustc_hash::FxHashMap;

use crate::coords::WorldPoint;
use crate::error::Result;
use crate::job::{PathJob, PathResult, RequesterId};
use crate::route::Pathfinder;

/// Name of the background thread.
pub const WORKER_THREAD_NAME: &str = "tilepath-worker";

/// A unit of work for the pathfinding thread.
#[derive(Debug)]
pub(crate) enum WorkItem {
    /// Compute a route.
    Route(PathJob),
    /// Drop every cached search context.
    Reset,
}

/// State of a requester's slot.
#[derive(Debug)]
enum SlotState {
    Queued { destination: WorldPoint },
    Computing { ticket: u64, destination: WorldPoint },
    Ready(PathResult),
}

impl SlotState {
    fn destination(&self) -> WorldPoint {
        match self {
            Self::Queued { destination } | Self::Computing { destination, .. } => *destination,
            Self::Ready(result) => result.original_destination,
        }
    }
}

/// What a requester has in flight.
#[derive(Debug)]
pub(crate) enum Poll {
    /// Nothing queued, running or ready.
    Empty,
    /// A job toward `destination` is queued or running.
    Pending { destination: WorldPoint },
    /// A finished result, now removed from the store.
    Ready(PathResult),
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    slots: FxHashMap<RequesterId, SlotState>,
    next_ticket: u64,
    shutdown: bool,
}

impl QueueState {
    fn remove_requester(&mut self, requester: RequesterId) -> bool {
        let before = self.items.len();
        self.items
            .retain(|item| !matches!(item, WorkItem::Route(job) if job.requester == requester));
        let removed_slot = self.slots.remove(&requester).is_some();
        removed_slot || self.items.len() != before
    }
}

/// Shared queue and result store.
#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    state: Mutex<QueueState>,
    work_available: Condvar,
    result_ready: Condvar,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock leaves the queue structurally
        // intact, so keep going with whatever state is there.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `job`, replacing anything its requester already has in flight.
    pub(crate) fn submit(&self, mut job: PathJob) {
        let mut state = self.lock();
        state.remove_requester(job.requester);
        state.next_ticket += 1;
        job.ticket = state.next_ticket;
        state.slots.insert(
            job.requester,
            SlotState::Queued {
                destination: job.destination,
            },
        );
        tracing::trace!(
            requester = job.requester,
            ticket = job.ticket,
            queued = state.items.len() + 1,
            "path job queued"
        );
        state.items.push_back(WorkItem::Route(job));
        drop(state);
        self.work_available.notify_one();
    }

    /// Queue a context cache reset behind any jobs already queued.
    pub(crate) fn submit_reset(&self) {
        self.lock().items.push_back(WorkItem::Reset);
        self.work_available.notify_one();
    }

    /// Remove any job or result for `requester`.
    pub(crate) fn cancel(&self, requester: RequesterId) -> bool {
        let removed = self.lock().remove_requester(requester);
        if removed {
            self.result_ready.notify_all();
        }
        removed
    }

    /// Check `requester`'s slot, taking the result if one is ready.
    pub(crate) fn poll(&self, requester: RequesterId) -> Poll {
        let mut state = self.lock();
        match state.slots.remove(&requester) {
            None => Poll::Empty,
            Some(SlotState::Ready(result)) => Poll::Ready(result),
            Some(pending) => {
                let destination = pending.destination();
                state.slots.insert(requester, pending);
                Poll::Pending { destination }
            }
        }
    }

    /// Block until `requester`'s result is ready and take it.
    ///
    /// Returns `None` if the requester has nothing in flight, or its job is
    /// cancelled while waiting.
    pub(crate) fn wait_ready(&self, requester: RequesterId) -> Option<PathResult> {
        let mut state = self.lock();
        loop {
            match state.slots.remove(&requester) {
                None => return None,
                Some(SlotState::Ready(result)) => return Some(result),
                Some(pending) => {
                    state.slots.insert(requester, pending);
                }
            }
            if state.shutdown {
                return None;
            }
            state = self
                .result_ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Next item, marking route jobs as running. Blocks while the queue is
    /// empty; returns `None` once shut down.
    fn next_item(&self) -> Option<WorkItem> {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(item) = Self::take_front(&mut state) {
                return Some(item);
            }
            state = self
                .work_available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Next item without blocking.
    pub(crate) fn try_next_item(&self) -> Option<WorkItem> {
        Self::take_front(&mut self.lock())
    }

    fn take_front(state: &mut QueueState) -> Option<WorkItem> {
        let item = state.items.pop_front()?;
        if let WorkItem::Route(job) = &item {
            if let Some(slot) = state.slots.get_mut(&job.requester) {
                *slot = SlotState::Computing {
                    ticket: job.ticket,
                    destination: job.destination,
                };
            }
        }
        Some(item)
    }

    /// Store `result` for the job stamped `ticket`, unless it was superseded.
    fn complete(&self, ticket: u64, result: PathResult) {
        let mut state = self.lock();
        let requester = result.requester;
        let current = matches!(
            state.slots.get(&requester),
            Some(SlotState::Computing { ticket: running, .. }) if *running == ticket
        );
        if current {
            state.slots.insert(requester, SlotState::Ready(result));
            drop(state);
            self.result_ready.notify_all();
        } else {
            tracing::trace!(requester, ticket, "superseded path result dropped");
        }
    }

    /// Number of queued items, excluding the one being computed.
    pub(crate) fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Queued jobs plus running jobs plus unclaimed results for `requester`.
    pub(crate) fn entries_for(&self, requester: RequesterId) -> usize {
        let state = self.lock();
        let queued = state
            .items
            .iter()
            .filter(|item| matches!(item, WorkItem::Route(job) if job.requester == requester))
            .count();
        let in_slot = matches!(
            state.slots.get(&requester),
            Some(SlotState::Computing { .. } | SlotState::Ready(_))
        );
        queued + usize::from(in_slot)
    }

    fn shutdown(&self) {
        self.lock().shutdown = true;
        self.work_available.notify_all();
        self.result_ready.notify_all();
    }
}

/// Run one work item against `pathfinder` and store its result.
///
/// A job that panics is reported as failed and the context cache, which may
/// be half-updated, is dropped.
pub(crate) fn run_item(queue: &JobQueue, pathfinder: &mut Pathfinder, item: WorkItem) {
    match item {
        WorkItem::Route(job) => {
            if complete_guarded(queue, &job, || pathfinder.execute(&job)) {
                pathfinder.reset();
            }
        }
        WorkItem::Reset => pathfinder.reset(),
    }
}

/// Store the result of `compute` for `job`, or a failed result if it panics.
/// Returns true if it panicked.
fn complete_guarded<F>(queue: &JobQueue, job: &PathJob, compute: F) -> bool
where
    F: FnOnce() -> PathResult,
{
    match panic::catch_unwind(AssertUnwindSafe(compute)) {
        Ok(result) => {
            queue.complete(job.ticket, result);
            false
        }
        Err(_) => {
            tracing::error!(requester = job.requester, ticket = job.ticket, "path job panicked");
            queue.complete(job.ticket, PathResult::failed(job));
            true
        }
    }
}

/// Handle to the background pathfinding thread.
///
/// Dropping the handle stops the thread after its current job and joins it.
#[derive(Debug)]
pub(crate) struct Worker {
    queue: Arc<JobQueue>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn the worker. It owns `pathfinder` for its whole life.
    pub(crate) fn spawn(queue: Arc<JobQueue>, mut pathfinder: Pathfinder) -> Result<Self> {
        let thread_queue = Arc::clone(&queue);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                tracing::debug!("pathfinding worker started");
                while let Some(item) = thread_queue.next_item() {
                    run_item(&thread_queue, &mut pathfinder, item);
                }
                tracing::debug!("pathfinding worker stopped");
            })?;
        Ok(Self {
            queue,
            handle: Some(handle),
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.queue.shutdown();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("pathfinding worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::NonBlockingArea;
    use crate::blocking::{BlockingKey, BlockingMapBuilder};
    use crate::config::PathfindingConfig;
    use crate::coords::TileCoord;
    use crate::job::RouteStatus;
    use crate::world::{MoveType, Propulsion};

    fn job(requester: RequesterId, dest: TileCoord) -> PathJob {
        let key = BlockingKey::new(0, 0, Propulsion::Wheeled, MoveType::Move);
        PathJob {
            requester,
            origin: TileCoord::new(0, 0).center(),
            destination: dest.center(),
            propulsion: Propulsion::Wheeled,
            move_type: MoveType::Move,
            owner: 0,
            accept_nearest: true,
            transporter: false,
            dst_area: NonBlockingArea::EMPTY,
            blocking_map: Arc::new(BlockingMapBuilder::new(key, 8, 8).build()),
            ticket: 0,
        }
    }

    fn drain(queue: &JobQueue, pathfinder: &mut Pathfinder) {
        while let Some(item) = queue.try_next_item() {
            run_item(queue, pathfinder, item);
        }
    }

    #[test]
    fn test_resubmission_keeps_one_entry() {
        let queue = JobQueue::new();
        for x in 1..6 {
            queue.submit(job(5, TileCoord::new(x, 3)));
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.entries_for(5), 1);
        assert!(matches!(
            queue.poll(5),
            Poll::Pending { destination } if destination == TileCoord::new(5, 3).center()
        ));
    }

    #[test]
    fn test_jobs_run_in_submission_order() {
        let queue = JobQueue::new();
        queue.submit(job(1, TileCoord::new(3, 3)));
        queue.submit(job(2, TileCoord::new(4, 4)));
        let order: Vec<_> = std::iter::from_fn(|| queue.try_next_item())
            .map(|item| match item {
                WorkItem::Route(job) => job.requester,
                WorkItem::Reset => 0,
            })
            .collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_result_is_claimed_once() {
        let queue = JobQueue::new();
        let mut pathfinder = Pathfinder::new(&PathfindingConfig::inline());
        queue.submit(job(7, TileCoord::new(6, 6)));
        drain(&queue, &mut pathfinder);

        assert_eq!(queue.entries_for(7), 1);
        match queue.poll(7) {
            Poll::Ready(result) => assert_eq!(result.status, RouteStatus::Ok),
            other => panic!("expected a result, got {other:?}"),
        }
        assert!(matches!(queue.poll(7), Poll::Empty));
        assert_eq!(queue.entries_for(7), 0);
    }

    #[test]
    fn test_superseded_result_is_dropped() {
        let queue = JobQueue::new();
        let mut pathfinder = Pathfinder::new(&PathfindingConfig::inline());
        queue.submit(job(3, TileCoord::new(6, 6)));
        let Some(WorkItem::Route(running)) = queue.try_next_item() else {
            panic!("expected a route job");
        };
        // The requester changes its mind while the first job runs
        queue.submit(job(3, TileCoord::new(2, 6)));
        let stale = pathfinder.execute(&running);
        queue.complete(running.ticket, stale);
        assert!(matches!(queue.poll(3), Poll::Pending { .. }));

        drain(&queue, &mut pathfinder);
        match queue.poll(3) {
            Poll::Ready(result) => {
                assert_eq!(result.original_destination, TileCoord::new(2, 6).center());
            }
            other => panic!("expected a result, got {other:?}"),
        }
    }

    #[test]
    fn test_cancel() {
        let queue = JobQueue::new();
        queue.submit(job(4, TileCoord::new(6, 6)));
        assert!(queue.cancel(4));
        assert!(!queue.cancel(4));
        assert_eq!(queue.len(), 0);
        assert!(queue.wait_ready(4).is_none());
    }

    #[test]
    fn test_reset_clears_contexts_in_order() {
        let queue = JobQueue::new();
        let mut pathfinder = Pathfinder::new(&PathfindingConfig::inline());
        queue.submit(job(1, TileCoord::new(6, 6)));
        queue.submit_reset();
        drain(&queue, &mut pathfinder);
        assert!(pathfinder.contexts().is_empty());
        assert!(matches!(queue.poll(1), Poll::Ready(_)));
    }

    #[test]
    fn test_worker_thread_completes_jobs() {
        let queue = Arc::new(JobQueue::new());
        let pathfinder = Pathfinder::new(&PathfindingConfig::default());
        let worker = Worker::spawn(Arc::clone(&queue), pathfinder).unwrap();

        queue.submit(job(9, TileCoord::new(7, 2)));
        let result = queue.wait_ready(9).expect("worker should produce a result");
        assert_eq!(result.status, RouteStatus::Ok);
        assert_eq!(result.destination, TileCoord::new(7, 2).center());
        drop(worker);
    }

    #[test]
    fn test_panicking_job_completes_as_failed() {
        let queue = JobQueue::new();
        queue.submit(job(1, TileCoord::new(5, 5)));
        let Some(WorkItem::Route(running)) = queue.try_next_item() else {
            panic!("expected a route job");
        };

        let panicked = complete_guarded(&queue, &running, || panic!("search exploded"));
        assert!(panicked);
        let result = queue.wait_ready(1).expect("slot should be released");
        assert_eq!(result.status, RouteStatus::Failed);
        assert!(result.path.is_empty());
        assert_eq!(result.destination, TileCoord::new(5, 5).center());
    }

    #[test]
    fn test_shutdown_releases_waiters() {
        let queue = Arc::new(JobQueue::new());
        queue.submit(job(2, TileCoord::new(3, 3)));
        queue.shutdown();
        assert!(queue.wait_ready(2).is_none());
    }
}
