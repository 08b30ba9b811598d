//! Tile and world coordinates.
//!
//! World positions use [`TILE_UNITS`] units per tile so that waypoints can sit
//! anywhere inside a tile. Conversions floor toward negative infinity, so
//! negative world positions map to negative (off-map) tiles.

use serde::{Deserialize, Serialize};

/// Number of bits in [`TILE_UNITS`].
pub const TILE_SHIFT: u32 = 7;

/// World units per tile edge.
pub const TILE_UNITS: i32 = 1 << TILE_SHIFT;

/// Integer tile-grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TileCoord {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl TileCoord {
    /// Create a tile coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// World position of this tile's top-left corner.
    #[must_use]
    pub const fn origin(self) -> WorldPoint {
        WorldPoint::new(world_coord(self.x), world_coord(self.y))
    }

    /// World position of this tile's centre.
    #[must_use]
    pub const fn center(self) -> WorldPoint {
        WorldPoint::new(
            world_coord(self.x) + TILE_UNITS / 2,
            world_coord(self.y) + TILE_UNITS / 2,
        )
    }

    /// Offset this coordinate by `(dx, dy)` tiles.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// True if the tile lies inside a `width` × `height` map.
    #[must_use]
    pub const fn on_map(self, width: i32, height: i32) -> bool {
        self.x >= 0 && self.y >= 0 && self.x < width && self.y < height
    }
}

/// A position in world units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WorldPoint {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
}

impl WorldPoint {
    /// Create a world position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The tile containing this position.
    #[must_use]
    pub const fn tile(self) -> TileCoord {
        TileCoord::new(map_coord(self.x), map_coord(self.y))
    }

    /// True if the position lies inside a `width` × `height` tile map.
    #[must_use]
    pub const fn on_map(self, width: i32, height: i32) -> bool {
        self.tile().on_map(width, height)
    }

    /// Squared distance to `other`.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> i64 {
        let dx = i64::from(self.x - other.x);
        let dy = i64::from(self.y - other.y);
        dx * dx + dy * dy
    }
}

impl std::ops::Add for WorldPoint {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for WorldPoint {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Convert a world coordinate to a tile coordinate.
#[inline]
#[must_use]
pub const fn map_coord(world: i32) -> i32 {
    world >> TILE_SHIFT
}

/// Convert a tile coordinate to the world coordinate of its low edge.
#[inline]
#[must_use]
pub const fn world_coord(tile: i32) -> i32 {
    tile << TILE_SHIFT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_to_tile_conversion() {
        assert_eq!(WorldPoint::new(0, 0).tile(), TileCoord::new(0, 0));
        assert_eq!(WorldPoint::new(127, 127).tile(), TileCoord::new(0, 0));
        assert_eq!(WorldPoint::new(128, 300).tile(), TileCoord::new(1, 2));

        // Negative positions floor to off-map tiles
        assert_eq!(WorldPoint::new(-1, 0).tile(), TileCoord::new(-1, 0));
    }

    #[test]
    fn test_tile_center() {
        assert_eq!(TileCoord::new(0, 0).center(), WorldPoint::new(64, 64));
        assert_eq!(TileCoord::new(3, 1).center(), WorldPoint::new(448, 192));
        assert_eq!(TileCoord::new(3, 1).center().tile(), TileCoord::new(3, 1));
    }

    #[test]
    fn test_on_map() {
        assert!(TileCoord::new(0, 0).on_map(10, 10));
        assert!(TileCoord::new(9, 9).on_map(10, 10));
        assert!(!TileCoord::new(10, 9).on_map(10, 10));
        assert!(!TileCoord::new(0, -1).on_map(10, 10));
        assert!(!WorldPoint::new(1280, 0).on_map(10, 10));
    }

    #[test]
    fn test_tile_ordering_is_lexicographic() {
        assert!(TileCoord::new(1, 9) < TileCoord::new(2, 0));
        assert!(TileCoord::new(2, 0) < TileCoord::new(2, 1));
    }
}
