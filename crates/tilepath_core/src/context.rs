//! Reusable search state.
//!
//! A [`PathContext`] holds one directional A* search: the explored-tile memo
//! leading back to its fixed tile, and the open set at the edge of the
//! explored region. Contexts are kept in an LRU [`ContextCache`] so that later
//! requests toward the same fixed tile can continue the search instead of
//! starting cold.
//!
//! Resetting a context does not clear its grid. Every memo entry carries the
//! iteration stamp it was written in, and entries with an old stamp are
//! treated as unexplored.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::area::NonBlockingArea;
use crate::blocking::BlockingMap;
use crate::coords::TileCoord;

/// Stamp value that no live context iteration ever uses.
const STALE_ITERATION: u16 = u16::MAX;

/// Per-tile search memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExploredTile {
    /// Context iteration that wrote this entry.
    pub iteration: u16,
    /// X offset back toward the predecessor, in 1/64 tile units.
    pub dx: i8,
    /// Y offset back toward the predecessor, in 1/64 tile units.
    pub dy: i8,
    /// Best known distance from the context's start.
    pub dist: u32,
    /// True once the tile has been popped from the open set.
    pub visited: bool,
}

impl Default for ExploredTile {
    fn default() -> Self {
        Self {
            iteration: STALE_ITERATION,
            dx: 0,
            dy: 0,
            dist: 0,
            visited: false,
        }
    }
}

/// A frontier node in the open set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathNode {
    /// Tile of this node.
    pub coord: TileCoord,
    /// Distance travelled from the context's start.
    pub dist: u32,
    /// `dist` plus the estimate to the current target.
    pub est: u32,
}

impl PathNode {
    /// Sort key. The smallest key is popped first.
    #[inline]
    const fn key(&self) -> (u32, u32, i32, i32) {
        (self.est, self.dist, self.coord.x, self.coord.y)
    }
}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest key is on top.
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One reusable, directional search instance.
#[derive(Debug)]
pub struct PathContext {
    /// Fixed tile of the search. Either the route origin or destination.
    pub(crate) tile_s: TileCoord,
    /// Game time of the blocking map the context was built against.
    pub(crate) game_time: u32,
    /// Nearest reachable tile to the target of the first search.
    pub(crate) nearest: TileCoord,
    /// Edge of the explored region.
    pub(crate) nodes: BinaryHeap<PathNode>,
    /// Explored-tile memo, row-major.
    pub(crate) map: Vec<ExploredTile>,
    /// Current stamp; memo entries with another stamp are unexplored.
    pub(crate) iteration: u16,
    pub(crate) blocking_map: Option<Arc<BlockingMap>>,
    /// Tiles that never block for this search.
    pub(crate) dst_ignore: NonBlockingArea,
    pub(crate) danger_cost_factor: u32,
    width: i32,
    height: i32,
}

impl PathContext {
    /// Create an unassigned context.
    #[must_use]
    pub fn new(danger_cost_factor: u32) -> Self {
        Self {
            tile_s: TileCoord::default(),
            game_time: 0,
            nearest: TileCoord::default(),
            nodes: BinaryHeap::new(),
            map: Vec::new(),
            iteration: 0,
            blocking_map: None,
            dst_ignore: NonBlockingArea::EMPTY,
            danger_cost_factor,
            width: 0,
            height: 0,
        }
    }

    /// Fixed tile of the search.
    #[must_use]
    pub const fn start(&self) -> TileCoord {
        self.tile_s
    }

    /// Nearest reachable tile found by the first search from this context.
    #[must_use]
    pub const fn nearest(&self) -> TileCoord {
        self.nearest
    }

    /// Current iteration stamp.
    #[must_use]
    pub const fn iteration(&self) -> u16 {
        self.iteration
    }

    /// Number of nodes in the open set.
    #[must_use]
    pub fn open_len(&self) -> usize {
        self.nodes.len()
    }

    /// The exception area of the search.
    #[must_use]
    pub const fn exception_area(&self) -> NonBlockingArea {
        self.dst_ignore
    }

    #[inline]
    pub(crate) fn index(&self, tile: TileCoord) -> Option<usize> {
        tile.on_map(self.width, self.height)
            .then(|| (tile.y as usize) * (self.width as usize) + (tile.x as usize))
    }

    /// True if `tile` blocks this search.
    ///
    /// The exception area wins over the blocking map; off-map tiles block.
    #[inline]
    #[must_use]
    pub fn is_blocked(&self, tile: TileCoord) -> bool {
        if self.dst_ignore.is_nonblocking(tile) {
            return false;
        }
        self.blocking_map
            .as_ref()
            .map_or(true, |map| map.is_blocked(tile))
    }

    /// True if `tile` is under threat for this search.
    #[inline]
    #[must_use]
    pub fn is_dangerous(&self, tile: TileCoord) -> bool {
        self.blocking_map
            .as_ref()
            .is_some_and(|map| map.is_dangerous(tile))
    }

    /// Memo entry for `tile` if it was written in the current iteration.
    #[must_use]
    pub fn explored(&self, tile: TileCoord) -> Option<&ExploredTile> {
        self.index(tile)
            .map(|i| &self.map[i])
            .filter(|e| e.iteration == self.iteration)
    }

    /// True if `tile` has been closed in the current iteration.
    #[must_use]
    pub fn is_visited(&self, tile: TileCoord) -> bool {
        self.explored(tile).is_some_and(|e| e.visited)
    }

    /// Best known distance to `tile` in the current iteration.
    #[must_use]
    pub fn distance_to(&self, tile: TileCoord) -> Option<u32> {
        self.explored(tile).map(|e| e.dist)
    }

    /// True if this context was built for the given map, fixed tile and
    /// exception area.
    #[must_use]
    pub fn matches(
        &self,
        blocking_map: &Arc<BlockingMap>,
        tile_s: TileCoord,
        dst_ignore: NonBlockingArea,
    ) -> bool {
        let Some(own) = &self.blocking_map else {
            return false;
        };
        self.game_time == blocking_map.key().game_time
            && Arc::ptr_eq(own, blocking_map)
            && self.tile_s == tile_s
            && self.dst_ignore == dst_ignore
    }

    /// Reset the context for a new search without clearing its grid.
    pub fn assign(
        &mut self,
        blocking_map: Arc<BlockingMap>,
        tile_s: TileCoord,
        dst_ignore: NonBlockingArea,
    ) {
        let (width, height) = (blocking_map.width(), blocking_map.height());
        self.game_time = blocking_map.key().game_time;
        self.blocking_map = Some(blocking_map);
        self.tile_s = tile_s;
        self.dst_ignore = dst_ignore;
        self.nodes.clear();

        self.iteration = self.iteration.wrapping_add(1);
        if self.iteration == STALE_ITERATION {
            // Every stamp may now be present in the grid, so wipe it.
            self.map.clear();
            self.iteration = 0;
        }

        if width != self.width || height != self.height {
            self.map.clear();
            self.width = width;
            self.height = height;
        }
        self.map
            .resize((width as usize) * (height as usize), ExploredTile::default());
    }

    #[cfg(test)]
    pub(crate) fn set_iteration(&mut self, iteration: u16) {
        self.iteration = iteration;
    }
}

#[derive(Debug)]
struct CacheSlot {
    context: PathContext,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU cache of search contexts.
///
/// Contexts live in a slab and are ordered by an intrusive doubly linked list
/// of slab indices. Once full, the least recently used context is handed out
/// again to be reset in place, keeping its grid allocation.
#[derive(Debug)]
pub struct ContextCache {
    slots: Vec<CacheSlot>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
    danger_cost_factor: u32,
}

impl ContextCache {
    /// Create an empty cache.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize, danger_cost_factor: u32) -> Self {
        assert!(capacity > 0, "ContextCache capacity must be positive");
        Self {
            slots: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            capacity,
            danger_cost_factor,
        }
    }

    /// Number of contexts currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the cache holds no contexts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum number of contexts.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot indices from most to least recently used.
    #[must_use]
    pub fn mru_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.slots.len());
        let mut cursor = self.head;
        while let Some(index) = cursor {
            order.push(index);
            cursor = self.slots[index].next;
        }
        order
    }

    /// The context in slot `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> &PathContext {
        &self.slots[index].context
    }

    /// The context in slot `index`, mutably.
    pub fn get_mut(&mut self, index: usize) -> &mut PathContext {
        &mut self.slots[index].context
    }

    /// Slot to (re)initialise for a new search.
    ///
    /// Grows the cache while below capacity; otherwise returns the least
    /// recently used slot. The slot keeps its LRU position until
    /// [`Self::touch`] is called.
    pub fn acquire(&mut self) -> usize {
        if self.slots.len() < self.capacity {
            let index = self.slots.len();
            self.slots.push(CacheSlot {
                context: PathContext::new(self.danger_cost_factor),
                prev: None,
                next: None,
            });
            self.push_back(index);
            return index;
        }
        // Full caches always have a tail.
        self.tail.unwrap_or(0)
    }

    /// Mark slot `index` as most recently used.
    pub fn touch(&mut self, index: usize) {
        if self.head == Some(index) {
            return;
        }
        self.unlink(index);
        self.push_front(index);
    }

    /// Drop every context.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = None;
        self.tail = None;
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = (self.slots[index].prev, self.slots[index].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[index].prev = None;
        self.slots[index].next = None;
    }

    fn push_front(&mut self, index: usize) {
        self.slots[index].prev = None;
        self.slots[index].next = self.head;
        match self.head {
            Some(h) => self.slots[h].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    fn push_back(&mut self, index: usize) {
        self.slots[index].next = None;
        self.slots[index].prev = self.tail;
        match self.tail {
            Some(t) => self.slots[t].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
    }
}
