//! Core types shared by the symbol placement pipeline.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Tile coordinate extent of feature geometry.
pub const EXTENT: f32 = 8192.0;

/// Glyph metrics are expressed for a font rendered at this size.
pub const ONE_EM: f32 = 24.0;

/// How a new collision entry treats entries already in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapMode {
    #[default]
    Never,
    Always,
    Cooperative,
}

impl OverlapMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "never" => Some(OverlapMode::Never),
            "always" => Some(OverlapMode::Always),
            "cooperative" => Some(OverlapMode::Cooperative),
            _ => None,
        }
    }

    /// Whether an entry with mode `self` may overlap an existing entry with mode `existing`.
    pub fn allows(self, existing: OverlapMode) -> bool {
        match self {
            OverlapMode::Always => true,
            OverlapMode::Never => false,
            OverlapMode::Cooperative => existing != OverlapMode::Never,
        }
    }
}

/// Where a label sits relative to its anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextAnchor {
    #[default]
    Center,
    Left,
    Right,
    Top,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl TextAnchor {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "center" => TextAnchor::Center,
            "left" => TextAnchor::Left,
            "right" => TextAnchor::Right,
            "top" => TextAnchor::Top,
            "bottom" => TextAnchor::Bottom,
            "top-left" => TextAnchor::TopLeft,
            "top-right" => TextAnchor::TopRight,
            "bottom-left" => TextAnchor::BottomLeft,
            "bottom-right" => TextAnchor::BottomRight,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            TextAnchor::Center => "center",
            TextAnchor::Left => "left",
            TextAnchor::Right => "right",
            TextAnchor::Top => "top",
            TextAnchor::Bottom => "bottom",
            TextAnchor::TopLeft => "top-left",
            TextAnchor::TopRight => "top-right",
            TextAnchor::BottomLeft => "bottom-left",
            TextAnchor::BottomRight => "bottom-right",
        }
    }

    /// Horizontal and vertical alignment factors in `[0, 1]`.
    pub fn alignment(&self) -> (f32, f32) {
        let horizontal = match self {
            TextAnchor::Right | TextAnchor::TopRight | TextAnchor::BottomRight => 1.0,
            TextAnchor::Left | TextAnchor::TopLeft | TextAnchor::BottomLeft => 0.0,
            _ => 0.5,
        };
        let vertical = match self {
            TextAnchor::Bottom | TextAnchor::BottomLeft | TextAnchor::BottomRight => 1.0,
            TextAnchor::Top | TextAnchor::TopLeft | TextAnchor::TopRight => 0.0,
            _ => 0.5,
        };
        (horizontal, vertical)
    }

    /// Justification implied by `text-justify: auto`.
    pub fn justification(&self) -> TextJustify {
        match self {
            TextAnchor::Right | TextAnchor::TopRight | TextAnchor::BottomRight => TextJustify::Right,
            TextAnchor::Left | TextAnchor::TopLeft | TextAnchor::BottomLeft => TextJustify::Left,
            _ => TextJustify::Center,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextJustify {
    Auto,
    Left,
    #[default]
    Center,
    Right,
}

impl TextJustify {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "auto" => Some(TextJustify::Auto),
            "left" => Some(TextJustify::Left),
            "center" => Some(TextJustify::Center),
            "right" => Some(TextJustify::Right),
            _ => None,
        }
    }

    /// Fraction of the line's slack placed before it.
    pub fn factor(&self) -> f32 {
        match self {
            TextJustify::Left => 0.0,
            TextJustify::Right => 1.0,
            TextJustify::Center | TextJustify::Auto => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolPlacement {
    #[default]
    Point,
    Line,
    LineCenter,
}

impl SymbolPlacement {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "point" => Some(SymbolPlacement::Point),
            "line" => Some(SymbolPlacement::Line),
            "line-center" => Some(SymbolPlacement::LineCenter),
            _ => None,
        }
    }
}

/// Label anchor in tile units. `segment` is the index of the line segment
/// the anchor lies on, absent for point anchors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub point: Vec2,
    pub angle: f32,
    pub segment: Option<usize>,
}

impl Anchor {
    pub fn new(point: Vec2, angle: f32, segment: Option<usize>) -> Self {
        Self {
            point,
            angle,
            segment,
        }
    }

    pub fn point(point: Vec2) -> Self {
        Self::new(point, 0.0, None)
    }

    pub(crate) fn rounded(mut self) -> Self {
        self.point = self.point.round();
        self
    }
}

/// Axis-aligned box around a tile-space anchor. Offsets are in tile units
/// and scale to screen pixels with the tile's pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionBox {
    pub anchor: Vec2,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl CollisionBox {
    pub fn new(anchor: Vec2, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            anchor,
            x1,
            y1,
            x2,
            y2,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Circle in tile units used for line label footprints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionCircle {
    pub center: Vec2,
    pub radius: f32,
}

/// Tag stored with every grid entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollisionKey {
    pub bucket_instance_id: u32,
    pub feature_index: u32,
    pub collision_group_id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_rules() {
        assert!(OverlapMode::Always.allows(OverlapMode::Never));
        assert!(!OverlapMode::Never.allows(OverlapMode::Cooperative));
        assert!(OverlapMode::Cooperative.allows(OverlapMode::Cooperative));
        assert!(!OverlapMode::Cooperative.allows(OverlapMode::Never));
        assert!(OverlapMode::Cooperative.allows(OverlapMode::Always));
        assert!(!OverlapMode::Never.allows(OverlapMode::Always));
    }

    #[test]
    fn test_anchor_alignment() {
        assert_eq!(TextAnchor::Center.alignment(), (0.5, 0.5));
        assert_eq!(TextAnchor::TopLeft.alignment(), (0.0, 0.0));
        assert_eq!(TextAnchor::BottomRight.alignment(), (1.0, 1.0));
        assert_eq!(TextAnchor::from_name("bottom"), Some(TextAnchor::Bottom));
        assert_eq!(TextAnchor::Left.justification(), TextJustify::Left);
    }

    #[test]
    fn test_overlap_mode_deserialize() {
        let mode: OverlapMode = serde_json::from_str("\"cooperative\"").unwrap();
        assert_eq!(mode, OverlapMode::Cooperative);
    }
}
