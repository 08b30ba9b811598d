//! Per-tick blocking maps.
//!
//! A [`BlockingMap`] is an immutable snapshot of which tiles stop a given
//! (propulsion, player, move type) combination at one game time, plus an
//! optional map of tiles under threat. Building one is O(W·H), so the
//! [`BlockingMapTable`] shares each map between every job issued in the same
//! tick and drops them all when game time advances.
//!
//! # Determinism
//!
//! Each built map emits a checksum on the `tilepath::sync` tracing target.
//! Peers in a lockstep game compare these lines to find the first tick at
//! which their world views diverged.

use std::sync::Arc;

use fixedbitset::FixedBitSet;

use crate::coords::TileCoord;
use crate::world::{MoveType, PathWorld, PlayerId, Propulsion, PropulsionDomain};

/// Identity of a blocking configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockingKey {
    /// Game time the map was built for.
    pub game_time: u32,
    /// Owner of the units using the map.
    pub player: PlayerId,
    /// Locomotion class.
    pub propulsion: Propulsion,
    /// Movement intent.
    pub move_type: MoveType,
}

impl BlockingKey {
    /// Create a key.
    #[must_use]
    pub const fn new(
        game_time: u32,
        player: PlayerId,
        propulsion: Propulsion,
        move_type: MoveType,
    ) -> Self {
        Self {
            game_time,
            player,
            propulsion,
            move_type,
        }
    }

    /// True if two keys produce the same base blocking bitmap.
    ///
    /// Propulsions in the same domain block identically. Aircraft ignore
    /// structures and terrain, so player and move type do not matter for
    /// them; every other domain must match both exactly.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        if self.game_time != other.game_time {
            return false;
        }
        let domain = self.propulsion.domain();
        if domain != other.propulsion.domain() {
            return false;
        }
        if domain == PropulsionDomain::Air {
            return true;
        }
        self.player == other.player && self.move_type == other.move_type
    }
}

/// Whether a map for `key` needs a danger layer.
///
/// Only AI players avoid threatened tiles, and only when not attacking.
#[must_use]
pub fn wants_danger_map<W: PathWorld + ?Sized>(world: &W, key: &BlockingKey) -> bool {
    !world.is_human_player(key.player) && key.move_type == MoveType::Move
}

/// Immutable per-tile blocking snapshot.
#[derive(Debug)]
pub struct BlockingMap {
    key: BlockingKey,
    width: i32,
    height: i32,
    blocked: FixedBitSet,
    dangerous: FixedBitSet,
    danger_layer: bool,
    checksum: u32,
    danger_checksum: u32,
}

impl BlockingMap {
    /// Build a map by querying `world` for every tile.
    #[must_use]
    pub fn from_world<W: PathWorld + ?Sized>(world: &W, key: BlockingKey) -> Self {
        let mut builder = BlockingMapBuilder::new(key, world.width(), world.height());
        builder.fill_blocked(|tile| {
            world.is_base_blocking(tile, key.propulsion, key.player, key.move_type)
        });
        if wants_danger_map(world, &key) {
            builder.fill_dangerous(|tile| world.is_threatened(tile, key.player));
        }
        builder.build()
    }

    /// The configuration this map was built for.
    #[must_use]
    pub const fn key(&self) -> &BlockingKey {
        &self.key
    }

    /// Map width in tiles.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Map height in tiles.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    #[inline]
    fn index(&self, tile: TileCoord) -> Option<usize> {
        tile.on_map(self.width, self.height)
            .then(|| (tile.y as usize) * (self.width as usize) + (tile.x as usize))
    }

    /// True if `tile` blocks. Tiles off the map always block.
    #[inline]
    #[must_use]
    pub fn is_blocked(&self, tile: TileCoord) -> bool {
        self.index(tile).map_or(true, |i| self.blocked.contains(i))
    }

    /// True if `tile` is under threat. Always false without a danger layer.
    #[inline]
    #[must_use]
    pub fn is_dangerous(&self, tile: TileCoord) -> bool {
        self.has_danger_map() && self.index(tile).is_some_and(|i| self.dangerous.contains(i))
    }

    /// True if the map carries a danger layer.
    #[must_use]
    pub const fn has_danger_map(&self) -> bool {
        self.danger_layer
    }

    /// Sync checksum of the blocked layer.
    #[must_use]
    pub const fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Sync checksum of the danger layer (0 when there is none).
    #[must_use]
    pub const fn danger_checksum(&self) -> u32 {
        self.danger_checksum
    }

    /// True if this map can stand in for a freshly built map for `key`.
    fn serves(&self, key: &BlockingKey, wants_danger: bool) -> bool {
        if !self.key.is_equivalent(key) {
            return false;
        }
        // Aircraft share the base layer across players; the danger layer is
        // per player and must still line up.
        if self.key.propulsion.domain() == PropulsionDomain::Air {
            return self.has_danger_map() == wants_danger
                && (!wants_danger || self.key.player == key.player);
        }
        true
    }
}

/// Builder for [`BlockingMap`]. The map is frozen by [`Self::build`].
#[derive(Debug)]
pub struct BlockingMapBuilder {
    key: BlockingKey,
    width: i32,
    height: i32,
    blocked: FixedBitSet,
    dangerous: Option<FixedBitSet>,
}

impl BlockingMapBuilder {
    /// Start a map of `width` × `height` tiles with nothing blocked.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is not positive.
    #[must_use]
    pub fn new(key: BlockingKey, width: i32, height: i32) -> Self {
        assert!(width > 0 && height > 0, "BlockingMap dimensions must be positive");
        let tile_count = (width as usize) * (height as usize);
        Self {
            key,
            width,
            height,
            blocked: FixedBitSet::with_capacity(tile_count),
            dangerous: None,
        }
    }

    fn tiles(&self) -> impl Iterator<Item = TileCoord> {
        let width = self.width;
        (0..self.height).flat_map(move |y| (0..width).map(move |x| TileCoord::new(x, y)))
    }

    /// Set the blocked layer from a per-tile predicate.
    pub fn fill_blocked(&mut self, mut is_blocked: impl FnMut(TileCoord) -> bool) -> &mut Self {
        for (i, tile) in self.tiles().enumerate() {
            self.blocked.set(i, is_blocked(tile));
        }
        self
    }

    /// Mark a single tile as blocked.
    pub fn block(&mut self, tile: TileCoord) -> &mut Self {
        if tile.on_map(self.width, self.height) {
            let i = (tile.y as usize) * (self.width as usize) + (tile.x as usize);
            self.blocked.insert(i);
        }
        self
    }

    /// Add a danger layer from a per-tile predicate.
    pub fn fill_dangerous(
        &mut self,
        mut is_dangerous: impl FnMut(TileCoord) -> bool,
    ) -> &mut Self {
        let tile_count = self.blocked.len();
        let mut dangerous = FixedBitSet::with_capacity(tile_count);
        for (i, tile) in self.tiles().enumerate() {
            dangerous.set(i, is_dangerous(tile));
        }
        self.dangerous = Some(dangerous);
        self
    }

    /// Freeze the map and compute its checksums.
    #[must_use]
    pub fn build(&mut self) -> BlockingMap {
        let blocked = std::mem::take(&mut self.blocked);
        let danger_layer = self.dangerous.is_some();
        let dangerous = self.dangerous.take().unwrap_or_default();

        let mut factor = 0u32;
        let checksum = fold_checksum(&blocked, &mut factor);
        let danger_checksum = fold_checksum(&dangerous, &mut factor);

        BlockingMap {
            key: self.key,
            width: self.width,
            height: self.height,
            blocked,
            dangerous,
            danger_layer,
            checksum,
            danger_checksum,
        }
    }
}

/// Fold tile bits into a checksum, continuing the `factor` sequence.
///
/// `factor` advances as `3·factor + 1` per tile; set tiles xor it in.
fn fold_checksum(bits: &FixedBitSet, factor: &mut u32) -> u32 {
    let mut checksum = 0u32;
    for i in 0..bits.len() {
        *factor = factor.wrapping_mul(3).wrapping_add(1);
        if bits.contains(i) {
            checksum ^= *factor;
        }
    }
    checksum
}

/// Cache of blocking maps for the current game time.
#[derive(Debug, Default)]
pub struct BlockingMapTable {
    game_time: Option<u32>,
    maps: Vec<Arc<BlockingMap>>,
}

impl BlockingMapTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the map for `key`, building it on first request this tick.
    pub fn get_or_build<W: PathWorld + ?Sized>(
        &mut self,
        world: &W,
        key: BlockingKey,
    ) -> Arc<BlockingMap> {
        if self.game_time != Some(key.game_time) {
            // New tick, maps from the previous one describe a stale world.
            self.game_time = Some(key.game_time);
            self.maps.clear();
        }

        let wants_danger = wants_danger_map(world, &key);
        if let Some(map) = self.maps.iter().find(|m| m.serves(&key, wants_danger)) {
            tracing::debug!(
                target: "tilepath::sync",
                game_time = key.game_time,
                propulsion = ?key.propulsion,
                player = key.player,
                move_type = ?key.move_type,
                "blocking map cached"
            );
            return Arc::clone(map);
        }

        let map = Arc::new(BlockingMap::from_world(world, key));
        tracing::debug!(
            target: "tilepath::sync",
            game_time = key.game_time,
            propulsion = ?key.propulsion,
            player = key.player,
            move_type = ?key.move_type,
            checksum = format_args!("{:08X}", map.checksum()),
            danger_checksum = format_args!("{:08X}", map.danger_checksum()),
            "blocking map built"
        );
        self.maps.push(Arc::clone(&map));
        map
    }

    /// Number of maps cached for the current tick.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// True if no maps are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Drop every cached map.
    pub fn clear(&mut self) {
        self.game_time = None;
        self.maps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Terrain, TileGrid};

    fn key(game_time: u32, player: PlayerId, propulsion: Propulsion, move_type: MoveType) -> BlockingKey {
        BlockingKey::new(game_time, player, propulsion, move_type)
    }

    #[test]
    fn test_equivalence_rules() {
        let wheels = key(1, 0, Propulsion::Wheeled, MoveType::Move);
        let tracks = key(1, 0, Propulsion::Tracked, MoveType::Move);
        assert!(wheels.is_equivalent(&tracks));

        // Different player, move type, domain or time
        assert!(!wheels.is_equivalent(&key(1, 1, Propulsion::Wheeled, MoveType::Move)));
        assert!(!wheels.is_equivalent(&key(1, 0, Propulsion::Wheeled, MoveType::Attack)));
        assert!(!wheels.is_equivalent(&key(1, 0, Propulsion::Hover, MoveType::Move)));
        assert!(!wheels.is_equivalent(&key(2, 0, Propulsion::Wheeled, MoveType::Move)));

        // Aircraft ignore player and move type
        let vtol = key(1, 0, Propulsion::Lift, MoveType::Move);
        assert!(vtol.is_equivalent(&key(1, 3, Propulsion::Lift, MoveType::Block)));
    }

    #[test]
    fn test_from_world_reads_blocking_and_danger() {
        let mut grid = TileGrid::new(4, 3);
        grid.set_terrain(TileCoord::new(1, 1), Terrain::Water);
        grid.set_threat(TileCoord::new(2, 2), 0, true);

        let map = BlockingMap::from_world(&grid, key(0, 0, Propulsion::Wheeled, MoveType::Move));
        assert!(map.is_blocked(TileCoord::new(1, 1)));
        assert!(!map.is_blocked(TileCoord::new(0, 0)));
        assert!(map.is_blocked(TileCoord::new(-1, 0)));
        assert!(map.is_blocked(TileCoord::new(4, 0)));
        assert!(map.has_danger_map());
        assert!(map.is_dangerous(TileCoord::new(2, 2)));
        assert!(!map.is_dangerous(TileCoord::new(1, 2)));
    }

    #[test]
    fn test_no_danger_map_for_humans_or_attacks() {
        let mut grid = TileGrid::new(4, 4);
        grid.set_threat(TileCoord::new(2, 2), 0, true);
        grid.set_human(1, true);
        grid.set_threat(TileCoord::new(2, 2), 1, true);

        let attack = BlockingMap::from_world(&grid, key(0, 0, Propulsion::Wheeled, MoveType::Attack));
        assert!(!attack.has_danger_map());
        assert!(!attack.is_dangerous(TileCoord::new(2, 2)));

        let human = BlockingMap::from_world(&grid, key(0, 1, Propulsion::Wheeled, MoveType::Move));
        assert!(!human.has_danger_map());
        assert_eq!(human.danger_checksum(), 0);
    }

    #[test]
    fn test_checksum_fold() {
        // Factors run 1, 4, 13, 40, ...; set bits xor them in.
        let k = key(0, 0, Propulsion::Wheeled, MoveType::Move);
        let mut builder = BlockingMapBuilder::new(k, 2, 2);
        builder.block(TileCoord::new(1, 0)).block(TileCoord::new(1, 1));
        let map = builder.build();
        assert_eq!(map.checksum(), 4 ^ 40);

        let mut builder = BlockingMapBuilder::new(k, 2, 1);
        builder.fill_dangerous(|t| t.x == 0);
        let map = builder.build();
        assert_eq!(map.checksum(), 0);
        // Danger layer continues the factor sequence: 13, 40
        assert_eq!(map.danger_checksum(), 13);
    }

    #[test]
    fn test_checksum_is_reproducible() {
        let mut grid = TileGrid::new(16, 16);
        for i in 0..16 {
            grid.set_terrain(TileCoord::new(i, (i * 7) % 16), Terrain::Cliff);
        }
        let k = key(9, 0, Propulsion::Tracked, MoveType::Move);
        let a = BlockingMap::from_world(&grid, k);
        let b = BlockingMap::from_world(&grid.clone(), k);
        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), 0);
    }

    #[test]
    fn test_table_shares_maps_within_a_tick() {
        let grid = TileGrid::new(8, 8);
        let mut table = BlockingMapTable::new();

        let a = table.get_or_build(&grid, key(0, 0, Propulsion::Wheeled, MoveType::Move));
        let b = table.get_or_build(&grid, key(0, 0, Propulsion::Legged, MoveType::Move));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);

        let c = table.get_or_build(&grid, key(0, 0, Propulsion::Hover, MoveType::Move));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_table_drops_maps_when_time_advances() {
        let mut grid = TileGrid::new(8, 8);
        let mut table = BlockingMapTable::new();
        let k0 = key(0, 0, Propulsion::Wheeled, MoveType::Move);
        let a = table.get_or_build(&grid, k0);

        grid.advance_time(1);
        let k1 = key(1, 0, Propulsion::Wheeled, MoveType::Move);
        let b = table.get_or_build(&grid, k1);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
        assert_eq!(b.key().game_time, 1);
    }

    #[test]
    fn test_air_maps_keep_danger_layers_apart() {
        let mut grid = TileGrid::new(4, 4);
        grid.set_threat(TileCoord::new(1, 1), 2, true);
        grid.set_human(0, true);
        let mut table = BlockingMapTable::new();

        let human = table.get_or_build(&grid, key(0, 0, Propulsion::Lift, MoveType::Move));
        let human_attack = table.get_or_build(&grid, key(0, 0, Propulsion::Lift, MoveType::Attack));
        assert!(Arc::ptr_eq(&human, &human_attack));

        let ai = table.get_or_build(&grid, key(0, 2, Propulsion::Lift, MoveType::Move));
        assert!(!Arc::ptr_eq(&human, &ai));
        assert!(ai.is_dangerous(TileCoord::new(1, 1)));

        let other_ai = table.get_or_build(&grid, key(0, 3, Propulsion::Lift, MoveType::Move));
        assert!(!Arc::ptr_eq(&ai, &other_ai));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_table_clear() {
        let grid = TileGrid::new(4, 4);
        let mut table = BlockingMapTable::new();
        table.get_or_build(&grid, key(0, 0, Propulsion::Wheeled, MoveType::Move));
        table.clear();
        assert!(table.is_empty());
    }
}
