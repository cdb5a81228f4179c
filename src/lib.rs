//! mapstyle: style expressions and symbol placement for vector map rendering.
//!
//! Two subsystems:
//! - [`style`] parses and evaluates style expressions and layer properties
//!   (constants, zoom functions, data-driven values, transitions, cross-fades).
//! - [`labels`] builds symbol buckets from tile features and places them
//!   against a screen-space collision index, fading labels in and out as the
//!   camera moves.

pub mod error;
pub mod labels;
pub mod style;
pub mod tile_id;

pub use error::{PlacementError, StyleError, StyleResult};
pub use tile_id::{CanonicalTileId, OverscaledTileId};
