//! The game world as seen by the pathfinder.
//!
//! Terrain storage, structure placement and threat tracking belong to the
//! surrounding game. The pathfinder only reads them through [`PathWorld`].
//! [`TileGrid`] is a self-contained implementation used by the tools, the
//! tests and headless scenarios.

use fixedbitset::FixedBitSet;
use serde::{Deserialize, Serialize};

use crate::area::NonBlockingArea;
use crate::coords::{TileCoord, WorldPoint, TILE_UNITS};
use crate::error::{PathError, Result};

/// Player index. Players are numbered from zero.
pub type PlayerId = u8;

/// Number of players a [`TileGrid`] can track.
pub const MAX_PLAYERS: usize = 32;

/// Locomotion class of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Propulsion {
    /// Wheeled ground vehicle.
    Wheeled,
    /// Half-tracked ground vehicle.
    HalfTracked,
    /// Tracked ground vehicle.
    Tracked,
    /// Walking unit.
    Legged,
    /// Hovercraft, crosses land and water.
    Hover,
    /// Aircraft (VTOL).
    Lift,
    /// Boat.
    Propellor,
}

/// Blocking class shared by propulsions that are stopped by the same tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropulsionDomain {
    /// Stopped by water and cliffs.
    Land,
    /// Flies over everything on the map.
    Air,
    /// Stopped by land and cliffs.
    Water,
    /// Crosses land and water, stopped by cliffs.
    Amphibious,
}

impl Propulsion {
    /// The blocking domain of this propulsion.
    #[must_use]
    pub const fn domain(self) -> PropulsionDomain {
        match self {
            Self::Wheeled | Self::HalfTracked | Self::Tracked | Self::Legged => {
                PropulsionDomain::Land
            }
            Self::Hover => PropulsionDomain::Amphibious,
            Self::Lift => PropulsionDomain::Air,
            Self::Propellor => PropulsionDomain::Water,
        }
    }
}

/// What a unit intends to do along the route, which decides which
/// structures it may pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoveType {
    /// Plain movement. Passes through allied gates, nothing else.
    #[default]
    Move,
    /// Attack-move. Only allied structures block; enemy ones get shot.
    Attack,
    /// Every structure blocks, including open gates.
    Block,
}

/// Read-only view of the world consumed by the pathfinder.
///
/// Implementations must be deterministic: every peer in a networked game
/// must answer identically for identical game state.
pub trait PathWorld {
    /// Map width in tiles.
    fn width(&self) -> i32;

    /// Map height in tiles.
    fn height(&self) -> i32;

    /// Current game time. Blocking maps are cached per game time.
    fn game_time(&self) -> u32;

    /// True if `tile` blocks a unit with the given propulsion, owner and
    /// move type. Tiles outside the map always block.
    fn is_base_blocking(
        &self,
        tile: TileCoord,
        propulsion: Propulsion,
        player: PlayerId,
        move_type: MoveType,
    ) -> bool;

    /// True if `tile` is under enemy threat for `player`.
    fn is_threatened(&self, tile: TileCoord, player: PlayerId) -> bool;

    /// True if `player` is controlled by a human.
    fn is_human_player(&self, player: PlayerId) -> bool;

    /// Footprint of the structure covering `tile`, if any.
    fn structure_footprint(&self, _tile: TileCoord) -> Option<NonBlockingArea> {
        None
    }

    /// True if `point` lies on the map.
    fn world_on_map(&self, point: WorldPoint) -> bool {
        point.on_map(self.width(), self.height())
    }
}

/// Move `pos` off a blocking tile.
///
/// If the tile under `pos` blocks, picks the non-blocking tile of its 3×3
/// neighbourhood whose centre is nearest to `pos` and clamps `pos` into it.
/// Returns `pos` unchanged when it is not blocked or nothing nearby is free.
#[must_use]
pub fn find_nonblocking_position<W: PathWorld + ?Sized>(
    world: &W,
    pos: WorldPoint,
    propulsion: Propulsion,
    player: PlayerId,
    move_type: MoveType,
) -> WorldPoint {
    let centre = pos.tile();
    if !world.is_base_blocking(centre, propulsion, player, move_type) {
        return pos;
    }

    let mut best_tile = centre;
    let mut best_dist_sq = i64::MAX;
    for dy in -1..=1 {
        for dx in -1..=1 {
            let tile = centre.offset(dx, dy);
            let dist_sq = tile.center().distance_squared(pos);
            if dist_sq < best_dist_sq
                && !world.is_base_blocking(tile, propulsion, player, move_type)
            {
                best_tile = tile;
                best_dist_sq = dist_sq;
            }
        }
    }

    let min = best_tile.origin();
    let max = min + WorldPoint::new(TILE_UNITS - 1, TILE_UNITS - 1);
    WorldPoint::new(pos.x.clamp(min.x, max.x), pos.y.clamp(min.y, max.y))
}

/// Terrain type of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Terrain {
    /// Dry land.
    #[default]
    Land,
    /// Open water.
    Water,
    /// Impassable for everything except aircraft.
    Cliff,
}

/// A structure occupying one or more tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    /// Owning player.
    pub owner: PlayerId,
    /// Gates let allied units through during plain movement.
    pub gate: bool,
    /// Tiles covered by the structure.
    pub footprint: NonBlockingArea,
}

/// Tile map implementing [`PathWorld`].
#[derive(Debug, Clone)]
pub struct TileGrid {
    width: i32,
    height: i32,
    game_time: u32,
    terrain: Vec<Terrain>,
    features: FixedBitSet,
    structures: Vec<Option<Structure>>,
    /// Per-tile bitmask of players for whom the tile is threatened.
    threat: Vec<u32>,
    /// Per-player bitmask of allies. Every player is allied with itself.
    alliances: [u32; MAX_PLAYERS],
    human_players: u32,
}

impl TileGrid {
    /// Create an all-land grid with no structures.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is not positive.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        assert!(width > 0, "TileGrid width must be positive");
        assert!(height > 0, "TileGrid height must be positive");

        let tile_count = (width as usize) * (height as usize);
        let mut alliances = [0u32; MAX_PLAYERS];
        for (player, mask) in alliances.iter_mut().enumerate() {
            *mask = 1 << player;
        }

        Self {
            width,
            height,
            game_time: 0,
            terrain: vec![Terrain::Land; tile_count],
            features: FixedBitSet::with_capacity(tile_count),
            structures: vec![None; tile_count],
            threat: vec![0; tile_count],
            alliances,
            human_players: 0,
        }
    }

    /// Build a grid from ASCII rows, top row first.
    ///
    /// | Symbol | Tile |
    /// |--------|------|
    /// | `.` | land |
    /// | `~` | water |
    /// | `#` | cliff |
    /// | `T` | land with a blocking feature |
    /// | `!` | land threatened for player 0 |
    /// | `B` | 1×1 structure owned by player 1 |
    /// | `G` | 1×1 gate owned by player 0 |
    ///
    /// # Errors
    ///
    /// Returns [`PathError::MapParse`] for an empty map, ragged rows or an
    /// unknown symbol.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let width = rows.first().map_or(0, |r| r.as_ref().chars().count());
        if width == 0 {
            return Err(PathError::MapParse {
                row: 0,
                column: 0,
                message: "map has no tiles".into(),
            });
        }

        let mut grid = Self::new(width as i32, rows.len() as i32);
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() != width {
                return Err(PathError::MapParse {
                    row: y,
                    column: 0,
                    message: format!("expected {width} columns"),
                });
            }
            for (x, symbol) in row.chars().enumerate() {
                let tile = TileCoord::new(x as i32, y as i32);
                match symbol {
                    '.' => {}
                    '~' => {
                        grid.set_terrain(tile, Terrain::Water);
                    }
                    '#' => {
                        grid.set_terrain(tile, Terrain::Cliff);
                    }
                    'T' => {
                        grid.set_feature(tile, true);
                    }
                    '!' => {
                        grid.set_threat(tile, 0, true);
                    }
                    'B' => {
                        grid.place_structure(NonBlockingArea::from_footprint(tile, 1, 1), 1, false);
                    }
                    'G' => {
                        grid.place_structure(NonBlockingArea::from_footprint(tile, 1, 1), 0, true);
                    }
                    other => {
                        return Err(PathError::MapParse {
                            row: y,
                            column: x,
                            message: format!("unknown symbol '{other}'"),
                        });
                    }
                }
            }
        }
        Ok(grid)
    }

    #[inline]
    fn index(&self, tile: TileCoord) -> Option<usize> {
        tile.on_map(self.width, self.height)
            .then(|| (tile.y as usize) * (self.width as usize) + (tile.x as usize))
    }

    /// Set the game time reported to the pathfinder.
    pub fn set_game_time(&mut self, game_time: u32) {
        self.game_time = game_time;
    }

    /// Advance the game time by `ticks`.
    pub fn advance_time(&mut self, ticks: u32) {
        self.game_time = self.game_time.wrapping_add(ticks);
    }

    /// Terrain at `tile`, or `None` off the map.
    #[must_use]
    pub fn terrain(&self, tile: TileCoord) -> Option<Terrain> {
        self.index(tile).map(|i| self.terrain[i])
    }

    /// Set terrain at `tile`. Returns `false` if off the map.
    pub fn set_terrain(&mut self, tile: TileCoord, terrain: Terrain) -> bool {
        match self.index(tile) {
            Some(i) => {
                self.terrain[i] = terrain;
                true
            }
            None => false,
        }
    }

    /// Place or remove a blocking feature (tree, boulder, wreck).
    pub fn set_feature(&mut self, tile: TileCoord, present: bool) -> bool {
        match self.index(tile) {
            Some(i) => {
                self.features.set(i, present);
                true
            }
            None => false,
        }
    }

    /// Place a structure covering `footprint`.
    ///
    /// Returns `false` without changing anything if the footprint is empty,
    /// leaves the map or overlaps another structure.
    pub fn place_structure(&mut self, footprint: NonBlockingArea, owner: PlayerId, gate: bool) -> bool {
        if !footprint.is_valid() {
            return false;
        }
        let Some(indices) = footprint
            .tiles()
            .map(|t| self.index(t).filter(|&i| self.structures[i].is_none()))
            .collect::<Option<Vec<_>>>()
        else {
            return false;
        };

        let structure = Structure {
            owner,
            gate,
            footprint,
        };
        for i in indices {
            self.structures[i] = Some(structure);
        }
        true
    }

    /// Structure covering `tile`, if any.
    #[must_use]
    pub fn structure_at(&self, tile: TileCoord) -> Option<Structure> {
        self.index(tile).and_then(|i| self.structures[i])
    }

    /// Mark `tile` as threatened (or not) for `player`.
    pub fn set_threat(&mut self, tile: TileCoord, player: PlayerId, threatened: bool) -> bool {
        let Some(i) = self.index(tile) else {
            return false;
        };
        let bit = player_bit(player);
        if threatened {
            self.threat[i] |= bit;
        } else {
            self.threat[i] &= !bit;
        }
        true
    }

    /// Make two players allies of each other.
    pub fn set_alliance(&mut self, a: PlayerId, b: PlayerId) {
        self.alliances[usize::from(a) % MAX_PLAYERS] |= player_bit(b);
        self.alliances[usize::from(b) % MAX_PLAYERS] |= player_bit(a);
    }

    /// True if `a` and `b` are the same player or allied.
    #[must_use]
    pub fn is_allied(&self, a: PlayerId, b: PlayerId) -> bool {
        self.alliances[usize::from(a) % MAX_PLAYERS] & player_bit(b) != 0
    }

    /// Mark `player` as human-controlled (or AI).
    pub fn set_human(&mut self, player: PlayerId, human: bool) {
        if human {
            self.human_players |= player_bit(player);
        } else {
            self.human_players &= !player_bit(player);
        }
    }
}

#[inline]
const fn player_bit(player: PlayerId) -> u32 {
    1 << (player as u32 % MAX_PLAYERS as u32)
}

impl PathWorld for TileGrid {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn game_time(&self) -> u32 {
        self.game_time
    }

    fn is_base_blocking(
        &self,
        tile: TileCoord,
        propulsion: Propulsion,
        player: PlayerId,
        move_type: MoveType,
    ) -> bool {
        let Some(i) = self.index(tile) else {
            return true;
        };

        let domain = propulsion.domain();
        if domain == PropulsionDomain::Air {
            return false;
        }

        let terrain_blocks = match (self.terrain[i], domain) {
            (Terrain::Cliff, _) => true,
            (Terrain::Water, PropulsionDomain::Land) => true,
            (Terrain::Land, PropulsionDomain::Water) => true,
            _ => false,
        };
        if terrain_blocks || self.features.contains(i) {
            return true;
        }

        match self.structures[i] {
            None => false,
            Some(s) => match move_type {
                MoveType::Move => !(s.gate && self.is_allied(s.owner, player)),
                MoveType::Attack => self.is_allied(s.owner, player),
                MoveType::Block => true,
            },
        }
    }

    fn is_threatened(&self, tile: TileCoord, player: PlayerId) -> bool {
        self.index(tile)
            .is_some_and(|i| self.threat[i] & player_bit(player) != 0)
    }

    fn is_human_player(&self, player: PlayerId) -> bool {
        self.human_players & player_bit(player) != 0
    }

    fn structure_footprint(&self, tile: TileCoord) -> Option<NonBlockingArea> {
        self.structure_at(tile).map(|s| s.footprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHEELS: Propulsion = Propulsion::Wheeled;

    #[test]
    fn test_domains() {
        assert_eq!(Propulsion::Tracked.domain(), PropulsionDomain::Land);
        assert_eq!(Propulsion::Hover.domain(), PropulsionDomain::Amphibious);
        assert_eq!(Propulsion::Lift.domain(), PropulsionDomain::Air);
        assert_eq!(Propulsion::Propellor.domain(), PropulsionDomain::Water);
    }

    #[test]
    fn test_off_map_blocks_everything() {
        let grid = TileGrid::new(4, 4);
        for prop in [WHEELS, Propulsion::Lift, Propulsion::Hover] {
            assert!(grid.is_base_blocking(TileCoord::new(-1, 0), prop, 0, MoveType::Move));
            assert!(grid.is_base_blocking(TileCoord::new(4, 0), prop, 0, MoveType::Move));
        }
        assert!(!grid.is_base_blocking(TileCoord::new(3, 3), WHEELS, 0, MoveType::Move));
    }

    #[test]
    fn test_terrain_rules_per_domain() {
        let mut grid = TileGrid::new(4, 4);
        let water = TileCoord::new(1, 1);
        let cliff = TileCoord::new(2, 2);
        grid.set_terrain(water, Terrain::Water);
        grid.set_terrain(cliff, Terrain::Cliff);
        let land = TileCoord::new(0, 0);

        let blocks = |tile, prop| grid.is_base_blocking(tile, prop, 0, MoveType::Move);

        assert!(blocks(water, WHEELS));
        assert!(!blocks(water, Propulsion::Hover));
        assert!(!blocks(water, Propulsion::Propellor));
        assert!(blocks(land, Propulsion::Propellor));
        assert!(blocks(cliff, Propulsion::Hover));
        assert!(!blocks(cliff, Propulsion::Lift));
    }

    #[test]
    fn test_structure_rules_per_move_type() {
        let mut grid = TileGrid::new(6, 6);
        let wall = NonBlockingArea::from_footprint(TileCoord::new(1, 1), 1, 1);
        let gate = NonBlockingArea::from_footprint(TileCoord::new(3, 3), 1, 1);
        assert!(grid.place_structure(wall, 0, false));
        assert!(grid.place_structure(gate, 0, true));

        let wall_tile = TileCoord::new(1, 1);
        let gate_tile = TileCoord::new(3, 3);

        // Own gate is open for plain movement, enemy gate is not
        assert!(!grid.is_base_blocking(gate_tile, WHEELS, 0, MoveType::Move));
        assert!(grid.is_base_blocking(gate_tile, WHEELS, 1, MoveType::Move));
        assert!(grid.is_base_blocking(gate_tile, WHEELS, 0, MoveType::Block));

        // Attack-move is blocked by friendly structures only
        assert!(grid.is_base_blocking(wall_tile, WHEELS, 0, MoveType::Attack));
        assert!(!grid.is_base_blocking(wall_tile, WHEELS, 1, MoveType::Attack));

        grid.set_alliance(0, 1);
        assert!(!grid.is_base_blocking(gate_tile, WHEELS, 1, MoveType::Move));
    }

    #[test]
    fn test_place_structure_rejects_overlap_and_off_map() {
        let mut grid = TileGrid::new(5, 5);
        let a = NonBlockingArea::from_footprint(TileCoord::new(1, 1), 2, 2);
        let b = NonBlockingArea::from_footprint(TileCoord::new(2, 2), 2, 2);
        let off = NonBlockingArea::from_footprint(TileCoord::new(4, 4), 2, 2);
        assert!(grid.place_structure(a, 0, false));
        assert!(!grid.place_structure(b, 0, false));
        assert!(!grid.place_structure(off, 0, false));
        assert_eq!(grid.structure_footprint(TileCoord::new(2, 2)), Some(a));
    }

    #[test]
    fn test_threat_and_humans() {
        let mut grid = TileGrid::new(3, 3);
        let tile = TileCoord::new(1, 1);
        grid.set_threat(tile, 2, true);
        assert!(grid.is_threatened(tile, 2));
        assert!(!grid.is_threatened(tile, 1));
        grid.set_threat(tile, 2, false);
        assert!(!grid.is_threatened(tile, 2));

        grid.set_human(0, true);
        assert!(grid.is_human_player(0));
        assert!(!grid.is_human_player(1));
    }

    #[test]
    fn test_find_nonblocking_position_fast_path() {
        let grid = TileGrid::new(5, 5);
        let pos = WorldPoint::new(200, 300);
        assert_eq!(
            find_nonblocking_position(&grid, pos, WHEELS, 0, MoveType::Move),
            pos
        );
    }

    #[test]
    fn test_find_nonblocking_position_moves_to_nearest_free_tile() {
        let mut grid = TileGrid::new(5, 5);
        grid.set_terrain(TileCoord::new(2, 2), Terrain::Cliff);
        grid.set_terrain(TileCoord::new(1, 2), Terrain::Cliff);

        // Near the right edge of tile (2, 2): (3, 2) is closest and free.
        let pos = WorldPoint::new(2 * 128 + 120, 2 * 128 + 64);
        let moved = find_nonblocking_position(&grid, pos, WHEELS, 0, MoveType::Move);
        assert_eq!(moved.tile(), TileCoord::new(3, 2));
        assert_eq!(moved, WorldPoint::new(3 * 128, 2 * 128 + 64));
    }

    #[test]
    fn test_find_nonblocking_position_fully_enclosed() {
        let mut grid = TileGrid::new(3, 3);
        for y in 0..3 {
            for x in 0..3 {
                grid.set_terrain(TileCoord::new(x, y), Terrain::Water);
            }
        }
        let pos = TileCoord::new(1, 1).center();
        assert_eq!(
            find_nonblocking_position(&grid, pos, WHEELS, 0, MoveType::Move),
            pos
        );
    }

    #[test]
    fn test_from_rows_legend() {
        let grid = TileGrid::from_rows(&[".~#", "T!B", "G.."]).unwrap();
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.terrain(TileCoord::new(1, 0)), Some(Terrain::Water));
        assert_eq!(grid.terrain(TileCoord::new(2, 0)), Some(Terrain::Cliff));
        assert!(grid.is_base_blocking(TileCoord::new(0, 1), Propulsion::Wheeled, 0, MoveType::Move));
        assert!(grid.is_threatened(TileCoord::new(1, 1), 0));
        assert!(!grid.is_threatened(TileCoord::new(1, 1), 1));
        assert_eq!(grid.structure_at(TileCoord::new(2, 1)).map(|s| s.owner), Some(1));
        assert!(grid.structure_at(TileCoord::new(0, 2)).is_some_and(|s| s.gate));
    }

    #[test]
    fn test_from_rows_rejects_bad_input() {
        let empty: [&str; 0] = [];
        assert!(TileGrid::from_rows(&empty).is_err());
        let ragged = TileGrid::from_rows(&["...", ".."]).unwrap_err();
        assert!(matches!(ragged, PathError::MapParse { row: 1, .. }));
        let unknown = TileGrid::from_rows(&["..?"]).unwrap_err();
        assert!(matches!(unknown, PathError::MapParse { row: 0, column: 2, .. }));
    }
}
