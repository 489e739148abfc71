//! Tile coordinates and quadtree navigation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Edge length of a single tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Cells per side of a generation grid (the 3x3 neighborhood).
pub const GRID_DIM: u32 = 3;

/// Edge length of a full generation grid in pixels.
pub const GRID_SIZE: u32 = TILE_SIZE * GRID_DIM;

/// A coordinate in the tile pyramid: zoom level plus grid indices.
///
/// Level 0 is a single tile covering the whole map; each level down
/// quadruples the grid, so `x` and `y` range over `0..2^z`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles per side at a zoom level.
    pub fn extent(z: u8) -> u64 {
        1u64 << z
    }

    /// Validate against the configured maximum zoom.
    pub fn validate(&self, max_zoom: u8) -> crate::Result<()> {
        if self.z > max_zoom {
            return Err(crate::Error::InvalidCoordinate(format!(
                "zoom {} exceeds maximum {max_zoom}",
                self.z
            )));
        }
        let extent = Self::extent(self.z);
        if u64::from(self.x) >= extent || u64::from(self.y) >= extent {
            return Err(crate::Error::InvalidCoordinate(format!(
                "({}, {}) outside the {extent}x{extent} grid at zoom {}",
                self.x, self.y, self.z
            )));
        }
        Ok(())
    }

    /// The parent tile one zoom level up, or None at the root.
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            return None;
        }
        Some(TileCoord::new(self.z - 1, self.x / 2, self.y / 2))
    }

    /// The four child tiles one zoom level down, row-major.
    pub fn children(&self) -> [TileCoord; 4] {
        let (z, x, y) = (self.z + 1, self.x * 2, self.y * 2);
        [
            TileCoord::new(z, x, y),
            TileCoord::new(z, x + 1, y),
            TileCoord::new(z, x, y + 1),
            TileCoord::new(z, x + 1, y + 1),
        ]
    }

    /// Which of the parent's quadrants this tile fills, as (col, row).
    pub fn quadrant(&self) -> (u32, u32) {
        (self.x % 2, self.y % 2)
    }

    /// Offset within the current zoom level. None when the result would
    /// fall outside the grid.
    pub fn offset(&self, dx: i64, dy: i64) -> Option<TileCoord> {
        let extent = Self::extent(self.z) as i64;
        let x = i64::from(self.x) + dx;
        let y = i64::from(self.y) + dy;
        if x < 0 || y < 0 || x >= extent || y >= extent {
            return None;
        }
        Some(TileCoord::new(self.z, x as u32, y as u32))
    }

    /// The 3x3 neighborhood centered on this tile, row-major, including
    /// the center and diagonals. Cells outside the grid are omitted, so
    /// corner tiles yield 4 coordinates and edge tiles 6.
    pub fn neighborhood(&self) -> Vec<TileCoord> {
        let mut cells = Vec::with_capacity(9);
        for dy in -1..=1 {
            for dx in -1..=1 {
                if let Some(cell) = self.offset(dx, dy) {
                    cells.push(cell);
                }
            }
        }
        cells
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

impl fmt::Debug for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TileCoord({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_child_roundtrip() {
        let coord = TileCoord::new(3, 5, 6);
        let parent = coord.parent().unwrap();
        assert_eq!(parent, TileCoord::new(2, 2, 3));
        assert!(parent.children().contains(&coord));
    }

    #[test]
    fn test_root_has_no_parent() {
        assert!(TileCoord::new(0, 0, 0).parent().is_none());
    }

    #[test]
    fn test_children_cover_distinct_quadrants() {
        let children = TileCoord::new(1, 1, 0).children();
        let quadrants: Vec<_> = children.iter().map(|c| c.quadrant()).collect();
        assert_eq!(quadrants, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn test_neighborhood_interior() {
        let cells = TileCoord::new(3, 4, 4).neighborhood();
        assert_eq!(cells.len(), 9);
        assert!(cells.contains(&TileCoord::new(3, 3, 3)));
        assert!(cells.contains(&TileCoord::new(3, 5, 5)));
    }

    #[test]
    fn test_neighborhood_clipped_at_corner() {
        let cells = TileCoord::new(2, 0, 0).neighborhood();
        assert_eq!(cells.len(), 4);
        assert!(cells.iter().all(|c| c.x <= 1 && c.y <= 1));
    }

    #[test]
    fn test_validate_bounds() {
        assert!(TileCoord::new(2, 3, 3).validate(2).is_ok());
        assert!(TileCoord::new(3, 0, 0).validate(2).is_err());
        assert!(TileCoord::new(2, 4, 0).validate(2).is_err());
    }
}
