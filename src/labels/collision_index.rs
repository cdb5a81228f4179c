//! Screen-space collision index for one placement pass.
//!
//! Holds two grids: entries that block later symbols, and entries placed with
//! `*-ignore-placement` that only answer rendered-symbol queries. Grid space
//! is the viewport extended by `viewport_padding` on every side.

use std::collections::{BTreeMap, BTreeSet};

use glam::{Mat4, Vec2};
use serde::{Deserialize, Serialize};

use crate::labels::grid::GridIndex;
use crate::labels::projection::{LabelProjector, ScreenTransform};
use crate::labels::types::{CollisionBox, CollisionCircle, CollisionKey, OverlapMode};

/// Collision grid tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Grid cell edge in pixels.
    pub cell_size: f32,
    /// Margin around the viewport in pixels.
    pub viewport_padding: f32,
    /// Entries whose perspective ratio is below this are rejected.
    pub perspective_ratio_cutoff: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            cell_size: 25.0,
            viewport_padding: 100.0,
            perspective_ratio_cutoff: 0.6,
        }
    }
}

/// Result of [`CollisionIndex::place_collision_box`]. `bbox` is `None` when
/// the box was rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedBox {
    pub bbox: Option<[f32; 4]>,
    pub offscreen: bool,
    pub occluded: bool,
    /// The projected box is at least as large as the grid and can never fit.
    pub oversized: bool,
}

impl PlacedBox {
    pub fn placeable(&self) -> bool {
        self.bbox.is_some()
    }

    fn rejected(occluded: bool) -> Self {
        Self {
            bbox: None,
            offscreen: false,
            occluded,
            oversized: false,
        }
    }
}

/// Result of [`CollisionIndex::place_collision_circles`]. Circles are
/// `[x, y, radius]` in grid space and empty when placement failed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlacedCircles {
    pub circles: Vec<[f32; 3]>,
    pub offscreen: bool,
    pub collision_detected: bool,
}

/// Inputs shared by the box and circle placement calls of one symbol.
#[derive(Clone, Copy)]
pub struct PlacementContext<'a> {
    pub pos_matrix: &'a Mat4,
    /// Tile units to screen pixels at perspective ratio 1.
    pub text_pixel_ratio: f32,
    /// Translation in tile units.
    pub translation: Vec2,
    pub predicate: Option<&'a dyn Fn(&CollisionKey) -> bool>,
}

#[derive(Debug, Clone)]
pub struct CollisionIndex {
    grid: GridIndex<CollisionKey>,
    ignored_grid: GridIndex<CollisionKey>,
    projector: LabelProjector,
    config: CollisionConfig,
    screen_right_boundary: f32,
    screen_bottom_boundary: f32,
    grid_right_boundary: f32,
    grid_bottom_boundary: f32,
}

impl CollisionIndex {
    pub fn new(transform: ScreenTransform, config: CollisionConfig) -> Self {
        let padding = config.viewport_padding;
        let grid_width = transform.width + 2.0 * padding;
        let grid_height = transform.height + 2.0 * padding;

        Self {
            grid: GridIndex::new(grid_width, grid_height, config.cell_size),
            ignored_grid: GridIndex::new(grid_width, grid_height, config.cell_size),
            projector: LabelProjector::new(transform, padding),
            config,
            screen_right_boundary: transform.width + padding,
            screen_bottom_boundary: transform.height + padding,
            grid_right_boundary: grid_width,
            grid_bottom_boundary: grid_height,
        }
    }

    pub fn transform(&self) -> &ScreenTransform {
        self.projector.transform()
    }

    pub fn config(&self) -> &CollisionConfig {
        &self.config
    }

    /// Grid dimensions in pixels.
    pub fn grid_size(&self) -> Vec2 {
        Vec2::new(self.grid_right_boundary, self.grid_bottom_boundary)
    }

    /// Project `collision_box`, shifted by `shift` tile units, and test it
    /// against the grid. Nothing is inserted.
    pub fn place_collision_box(
        &self,
        collision_box: &CollisionBox,
        overlap: OverlapMode,
        shift: Vec2,
        ctx: &PlacementContext<'_>,
    ) -> PlacedBox {
        let projected = self
            .projector
            .project(ctx.pos_matrix, collision_box.anchor + ctx.translation);
        let tile_to_viewport = ctx.text_pixel_ratio * projected.perspective_ratio;

        let x1 = projected.point.x + (collision_box.x1 + shift.x) * tile_to_viewport;
        let y1 = projected.point.y + (collision_box.y1 + shift.y) * tile_to_viewport;
        let x2 = projected.point.x + (collision_box.x2 + shift.x) * tile_to_viewport;
        let y2 = projected.point.y + (collision_box.y2 + shift.y) * tile_to_viewport;

        if x2 - x1 >= self.grid_right_boundary || y2 - y1 >= self.grid_bottom_boundary {
            return PlacedBox {
                oversized: true,
                ..PlacedBox::rejected(false)
            };
        }
        let occluded = projected.perspective_ratio < self.config.perspective_ratio_cutoff;
        if occluded || !self.is_inside_grid(x1, y1, x2, y2) {
            return PlacedBox::rejected(occluded);
        }
        if overlap != OverlapMode::Always && self.grid.hit_test(x1, y1, x2, y2, overlap, ctx.predicate) {
            return PlacedBox::rejected(false);
        }

        PlacedBox {
            bbox: Some([x1, y1, x2, y2]),
            offscreen: self.is_offscreen(x1, y1, x2, y2),
            occluded: false,
            oversized: false,
        }
    }

    /// Project line label circles and test each against the grid.
    pub fn place_collision_circles(
        &self,
        circles: &[CollisionCircle],
        overlap: OverlapMode,
        ctx: &PlacementContext<'_>,
    ) -> PlacedCircles {
        let mut placed = Vec::with_capacity(circles.len());
        let mut entirely_offscreen = true;
        let mut in_grid = false;
        let mut min_ratio = f32::INFINITY;

        for circle in circles {
            let projected = self.projector.project(ctx.pos_matrix, circle.center + ctx.translation);
            min_ratio = min_ratio.min(projected.perspective_ratio);
            let radius = circle.radius * ctx.text_pixel_ratio * projected.perspective_ratio;
            let Vec2 { x, y } = projected.point;

            entirely_offscreen &= self.is_offscreen(x - radius, y - radius, x + radius, y + radius);
            in_grid |= self.is_inside_grid(x - radius, y - radius, x + radius, y + radius);

            if overlap != OverlapMode::Always
                && self.grid.hit_test_circle(x, y, radius, overlap, ctx.predicate)
            {
                return PlacedCircles {
                    circles: Vec::new(),
                    offscreen: false,
                    collision_detected: true,
                };
            }
            placed.push([x, y, radius]);
        }

        if !in_grid || min_ratio < self.config.perspective_ratio_cutoff {
            placed.clear();
        }
        PlacedCircles {
            circles: placed,
            offscreen: entirely_offscreen,
            collision_detected: false,
        }
    }

    pub fn insert_collision_box(
        &mut self,
        bbox: [f32; 4],
        overlap: OverlapMode,
        ignore_placement: bool,
        key: CollisionKey,
    ) {
        let grid = if ignore_placement {
            &mut self.ignored_grid
        } else {
            &mut self.grid
        };
        grid.insert(key, overlap, bbox[0], bbox[1], bbox[2], bbox[3]);
    }

    pub fn insert_collision_circles(
        &mut self,
        circles: &[[f32; 3]],
        overlap: OverlapMode,
        ignore_placement: bool,
        key: CollisionKey,
    ) {
        let grid = if ignore_placement {
            &mut self.ignored_grid
        } else {
            &mut self.grid
        };
        for [x, y, radius] in circles {
            grid.insert_circle(key, overlap, *x, *y, *radius);
        }
    }

    /// Features whose placed boxes intersect a screen-space polygon (or a
    /// single point), grouped by bucket instance.
    pub fn query_rendered_symbols(&self, geometry: &[Vec2]) -> BTreeMap<u32, Vec<u32>> {
        let mut result: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        if geometry.is_empty() || (self.grid.keys_len() == 0 && self.ignored_grid.keys_len() == 0) {
            return result;
        }

        let padding = Vec2::splat(self.config.viewport_padding);
        let query: Vec<Vec2> = geometry.iter().map(|p| *p + padding).collect();
        let min = query.iter().fold(Vec2::splat(f32::INFINITY), |acc, p| acc.min(*p));
        let max = query.iter().fold(Vec2::splat(f32::NEG_INFINITY), |acc, p| acc.max(*p));

        let hits = self
            .grid
            .query(min.x, min.y, max.x, max.y)
            .into_iter()
            .chain(self.ignored_grid.query(min.x, min.y, max.x, max.y));

        let mut seen = BTreeSet::new();
        for hit in hits {
            let key = hit.key;
            if seen.contains(&(key.bucket_instance_id, key.feature_index)) {
                continue;
            }
            let [x1, y1, x2, y2] = hit.bbox;
            let corners = [
                Vec2::new(x1, y1),
                Vec2::new(x2, y1),
                Vec2::new(x2, y2),
                Vec2::new(x1, y2),
            ];
            if !polygon_intersects_polygon(&query, &corners) {
                continue;
            }
            seen.insert((key.bucket_instance_id, key.feature_index));
            result
                .entry(key.bucket_instance_id)
                .or_default()
                .push(key.feature_index);
        }
        result
    }

    fn is_offscreen(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        let padding = self.config.viewport_padding;
        x2 < padding || x1 >= self.screen_right_boundary || y2 < padding || y1 > self.screen_bottom_boundary
    }

    fn is_inside_grid(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        x2 >= 0.0 && x1 < self.grid_right_boundary && y2 >= 0.0 && y1 < self.grid_bottom_boundary
    }
}

fn polygon_intersects_polygon(a: &[Vec2], b: &[Vec2]) -> bool {
    if a.iter().any(|p| polygon_contains_point(b, *p)) {
        return true;
    }
    if b.iter().any(|p| polygon_contains_point(a, *p)) {
        return true;
    }
    lines_intersect(a, b)
}

fn polygon_contains_point(ring: &[Vec2], p: Vec2) -> bool {
    let mut inside = false;
    let mut j = ring.len().wrapping_sub(1);
    for i in 0..ring.len() {
        let p1 = ring[i];
        let p2 = ring[j];
        if (p1.y > p.y) != (p2.y > p.y) && p.x < (p2.x - p1.x) * (p.y - p1.y) / (p2.y - p1.y) + p1.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn lines_intersect(a: &[Vec2], b: &[Vec2]) -> bool {
    for i in 0..a.len().saturating_sub(1) {
        for j in 0..b.len().saturating_sub(1) {
            if segments_intersect(a[i], a[i + 1], b[j], b[j + 1]) {
                return true;
            }
        }
    }
    false
}

fn segments_intersect(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2) -> bool {
    let ccw = |p: Vec2, q: Vec2, r: Vec2| (r.y - p.y) * (q.x - p.x) > (q.y - p.y) * (r.x - p.x);
    ccw(a0, b0, b1) != ccw(a1, b0, b1) && ccw(a0, a1, b0) != ccw(a0, a1, b1)
}
