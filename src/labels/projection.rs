//! Tile-to-screen projection for collision detection.

use glam::{Mat4, Vec2, Vec4};
use serde::{Deserialize, Serialize};

use crate::labels::types::EXTENT;
use crate::tile_id::OverscaledTileId;

/// Camera state a placement pass runs against. The host owns camera math and
/// supplies a tile-to-clip matrix per tile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenTransform {
    pub width: f32,
    pub height: f32,
    pub zoom: f64,
    /// Distance from the camera to the screen center in pixels.
    pub camera_to_center_distance: f32,
}

impl ScreenTransform {
    pub fn new(width: f32, height: f32, zoom: f64) -> Self {
        Self {
            width,
            height,
            zoom,
            camera_to_center_distance: height * 1.5,
        }
    }

    /// Matrix for a flat, unpitched view: tile unit `p` lands at screen pixel
    /// `origin + p * pixels_per_unit` with a perspective ratio of exactly 1.
    pub fn tile_matrix(&self, origin: Vec2, pixels_per_unit: f32) -> Mat4 {
        let w = self.camera_to_center_distance;
        Mat4::from_cols(
            Vec4::new(2.0 * pixels_per_unit / self.width * w, 0.0, 0.0, 0.0),
            Vec4::new(0.0, -2.0 * pixels_per_unit / self.height * w, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(
                w * (2.0 * origin.x / self.width - 1.0),
                w * (1.0 - 2.0 * origin.y / self.height),
                0.0,
                w,
            ),
        )
    }
}

/// Screen position (in padded grid space) plus perspective scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub point: Vec2,
    pub perspective_ratio: f32,
    pub signed_distance_from_camera: f32,
}

/// Projects tile-space points into the padded collision grid.
#[derive(Debug, Clone, Copy)]
pub struct LabelProjector {
    transform: ScreenTransform,
    padding: f32,
}

impl LabelProjector {
    pub fn new(transform: ScreenTransform, padding: f32) -> Self {
        Self { transform, padding }
    }

    pub fn transform(&self) -> &ScreenTransform {
        &self.transform
    }

    /// Project a tile point. Points behind the camera get a perspective ratio of 0.
    pub fn project(&self, pos_matrix: &Mat4, point: Vec2) -> ProjectedPoint {
        let clip = *pos_matrix * Vec4::new(point.x, point.y, 0.0, 1.0);
        let w = clip.w;

        // NDC x: -1..1 -> 0..width, NDC y flips so +1 is the top edge
        let screen = if w.abs() > f32::EPSILON {
            Vec2::new(
                (clip.x / w + 1.0) * 0.5 * self.transform.width,
                (1.0 - clip.y / w) * 0.5 * self.transform.height,
            )
        } else {
            Vec2::splat(f32::NAN)
        };

        let ratio = if w > 0.0 {
            (0.5 + 0.5 * self.transform.camera_to_center_distance / w).clamp(0.0, 4.0)
        } else {
            0.0
        };

        ProjectedPoint {
            point: screen + Vec2::splat(self.padding),
            perspective_ratio: ratio,
            signed_distance_from_camera: w,
        }
    }
}

/// Convert a screen pixel length to tile units at `zoom`.
pub fn pixels_to_tile_units(tile: &OverscaledTileId, pixels: f32, zoom: f64) -> f32 {
    let scale = 2f64.powf(zoom - tile.overscaled_z as f64) as f32;
    pixels * EXTENT / (512.0 * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_flat_tile_matrix() {
        let transform = ScreenTransform::new(800.0, 600.0, 10.0);
        let projector = LabelProjector::new(transform, 100.0);
        let matrix = transform.tile_matrix(Vec2::new(10.0, 20.0), 0.5);
        let projected = projector.project(&matrix, Vec2::new(100.0, 200.0));
        assert!((projected.point.x - 160.0).abs() < 1e-3);
        assert!((projected.point.y - 220.0).abs() < 1e-3);
        assert!((projected.perspective_ratio - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_behind_camera() {
        let transform = ScreenTransform::new(800.0, 600.0, 10.0);
        let projector = LabelProjector::new(transform, 0.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 10.0), Vec3::Y);
        let projection = Mat4::perspective_rh(1.0, 800.0 / 600.0, 0.1, 100.0);
        let view_proj = projection * view;

        let projected = projector.project(&view_proj, Vec2::new(0.0, 0.0));
        assert!(projected.signed_distance_from_camera < 0.0);
        assert_eq!(projected.perspective_ratio, 0.0);
    }

    #[test]
    fn test_pixels_to_tile_units() {
        let tile = OverscaledTileId::new(3, 0, 3, 1, 1);
        assert!((pixels_to_tile_units(&tile, 1.0, 3.0) - 16.0).abs() < 1e-5);
        assert!((pixels_to_tile_units(&tile, 1.0, 4.0) - 8.0).abs() < 1e-5);
    }
}
