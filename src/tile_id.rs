//! Tile identifiers for the symbol pipeline
//!
//! Canonical ids address a tile in the quad-tree. Overscaled ids additionally
//! carry the display zoom (which may exceed the source max zoom) and the world
//! copy the tile belongs to.

use std::fmt;

/// Tile address in the quad-tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalTileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl CanonicalTileId {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Get the parent tile at the next lower zoom
    pub fn parent(self) -> Option<CanonicalTileId> {
        if self.z == 0 {
            None
        } else {
            Some(CanonicalTileId::new(self.z - 1, self.x / 2, self.y / 2))
        }
    }

    /// Get the four child tiles at the next higher zoom
    pub fn children(self) -> [CanonicalTileId; 4] {
        let z = self.z + 1;
        let x = self.x * 2;
        let y = self.y * 2;
        [
            CanonicalTileId::new(z, x, y),
            CanonicalTileId::new(z, x + 1, y),
            CanonicalTileId::new(z, x, y + 1),
            CanonicalTileId::new(z, x + 1, y + 1),
        ]
    }

    /// Number of tiles along one axis at this zoom
    pub fn world_size(self) -> f64 {
        2f64.powi(self.z as i32)
    }
}

impl fmt::Display for CanonicalTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Tile as displayed: possibly overscaled past the source max zoom, in a world copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverscaledTileId {
    pub overscaled_z: u8,
    pub wrap: i32,
    pub canonical: CanonicalTileId,
}

impl OverscaledTileId {
    pub fn new(overscaled_z: u8, wrap: i32, z: u8, x: u32, y: u32) -> Self {
        debug_assert!(overscaled_z >= z);
        Self {
            overscaled_z,
            wrap,
            canonical: CanonicalTileId::new(z, x, y),
        }
    }

    /// Ratio between display zoom and data zoom
    pub fn overscale_factor(&self) -> f64 {
        2f64.powi(self.overscaled_z as i32 - self.canonical.z as i32)
    }

    /// The id this tile has at another display zoom
    pub fn scaled_to(&self, target_z: u8) -> OverscaledTileId {
        if target_z <= self.canonical.z {
            let shift = self.canonical.z - target_z;
            OverscaledTileId::new(
                target_z,
                self.wrap,
                target_z,
                self.canonical.x >> shift,
                self.canonical.y >> shift,
            )
        } else {
            OverscaledTileId::new(
                target_z,
                self.wrap,
                self.canonical.z,
                self.canonical.x,
                self.canonical.y,
            )
        }
    }

    /// Whether this tile covers part of `parent` at a higher display zoom
    pub fn is_child_of(&self, parent: &OverscaledTileId) -> bool {
        if parent.wrap != self.wrap {
            return false;
        }
        if parent.overscaled_z == 0 {
            return true;
        }
        let shift = self.canonical.z.saturating_sub(parent.canonical.z);
        parent.overscaled_z < self.overscaled_z
            && parent.canonical.x == self.canonical.x >> shift
            && parent.canonical.y == self.canonical.y >> shift
    }

    /// Same tile in another world copy
    pub fn unwrap_to(&self, wrap: i32) -> OverscaledTileId {
        OverscaledTileId {
            overscaled_z: self.overscaled_z,
            wrap,
            canonical: self.canonical,
        }
    }

    /// Parent at the next lower display zoom
    pub fn parent(&self) -> Option<OverscaledTileId> {
        if self.overscaled_z == 0 {
            return None;
        }
        Some(self.scaled_to(self.overscaled_z - 1))
    }
}

impl fmt::Display for OverscaledTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}w{}", self.canonical, self.overscaled_z, self.wrap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_parent_children() {
        let tile = CanonicalTileId::new(3, 5, 6);
        assert_eq!(tile.parent(), Some(CanonicalTileId::new(2, 2, 3)));
        assert!(tile.children().iter().all(|c| c.parent() == Some(tile)));
        assert_eq!(CanonicalTileId::new(0, 0, 0).parent(), None);
    }

    #[test]
    fn test_scaled_to() {
        let tile = OverscaledTileId::new(6, 0, 6, 40, 20);
        let parent = tile.scaled_to(4);
        assert_eq!(parent.canonical, CanonicalTileId::new(4, 10, 5));
        let over = tile.scaled_to(8);
        assert_eq!(over.overscaled_z, 8);
        assert_eq!(over.canonical, tile.canonical);
        assert_eq!(over.overscale_factor(), 4.0);
    }

    #[test]
    fn test_is_child_of() {
        let parent = OverscaledTileId::new(4, 0, 4, 10, 5);
        let child = OverscaledTileId::new(5, 0, 5, 21, 11);
        assert!(child.is_child_of(&parent));
        assert!(!parent.is_child_of(&child));
        assert!(!child.unwrap_to(1).is_child_of(&parent));
        let overscaled = OverscaledTileId::new(6, 0, 4, 10, 5);
        assert!(overscaled.is_child_of(&parent));
    }
}
