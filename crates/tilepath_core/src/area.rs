//! Rectangular regions that never block movement.
//!
//! When a unit is sent to a structure (to build, repair or attack it), the
//! structure's own footprint must not stop the search from reaching it.

use serde::{Deserialize, Serialize};

use crate::coords::TileCoord;

/// Half-open tile rectangle `[x1, x2) × [y1, y2)` that overrides blocking.
///
/// The default area is empty and overrides nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NonBlockingArea {
    x1: i32,
    x2: i32,
    y1: i32,
    y2: i32,
}

impl NonBlockingArea {
    /// The empty area.
    pub const EMPTY: Self = Self {
        x1: 0,
        x2: 0,
        y1: 0,
        y2: 0,
    };

    /// Area covering a footprint of `width` × `height` tiles whose top-left
    /// tile is `origin`.
    #[must_use]
    pub const fn from_footprint(origin: TileCoord, width: i32, height: i32) -> Self {
        Self {
            x1: origin.x,
            x2: origin.x + width,
            y1: origin.y,
            y2: origin.y + height,
        }
    }

    /// True if the area covers at least one tile.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }

    /// True if `tile` is inside the area.
    #[inline]
    #[must_use]
    pub const fn is_nonblocking(&self, tile: TileCoord) -> bool {
        tile.x >= self.x1 && tile.x < self.x2 && tile.y >= self.y1 && tile.y < self.y2
    }

    /// Every tile in the area, row by row.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> {
        let (x1, x2) = (self.x1, self.x2);
        (self.y1..self.y2).flat_map(move |y| (x1..x2).map(move |x| TileCoord::new(x, y)))
    }
}
