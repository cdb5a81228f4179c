//! Symbol labels: collision detection, bucket construction, cross-tile
//! identity and time-sliced placement with fading.
//!
//! Provides:
//! - `GridIndex` and `CollisionIndex` for screen-space collision tests
//! - `SymbolBucket` for per-tile label candidates (shaping, anchors, boxes)
//! - `CrossTileSymbolIndex` for stable label identity across tiles
//! - `Placement` and `PausablePlacement` for placement passes and opacities

pub mod anchors;
pub mod collision_index;
pub mod cross_tile;
pub mod grid;
pub mod pausable;
pub mod placement;
pub mod projection;
pub mod shaping;
pub mod symbol_bucket;
pub mod types;

pub use anchors::{check_max_angle, get_anchors, get_center_anchor, LabelExtent};
pub use collision_index::{CollisionConfig, CollisionIndex, PlacedBox, PlacedCircles, PlacementContext};
pub use cross_tile::{CrossTileIdGenerator, CrossTileSymbolIndex, CrossTileSymbolLayerIndex, TileLayerIndex};
pub use grid::GridIndex;
pub use pausable::{Clock, PausablePlacement, SystemClock};
pub use placement::{
    CollisionGroup, CollisionGroups, JointOpacityState, JointPlacement, OpacityState, PlacedSymbol, Placement,
    PlacementConfig, SymbolLayerTiles, TileBucket, VariableOffset,
};
pub use projection::{LabelProjector, ScreenTransform};
pub use shaping::{
    shape_icon, shape_text, GlyphMetrics, GlyphProvider, ImageMetrics, ImageProvider, PositionedIcon, Shaping,
    ShapingOptions, TextTransform,
};
pub use symbol_bucket::{BucketParameters, SymbolBucket, SymbolInstance, SymbolLayout};
pub use types::{
    Anchor, CollisionBox, CollisionCircle, CollisionKey, OverlapMode, SymbolPlacement, TextAnchor, TextJustify,
    EXTENT, ONE_EM,
};
