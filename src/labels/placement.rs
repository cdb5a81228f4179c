//! Symbol placement: decides which labels show for one camera position and
//! turns successive placements into fading opacities.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use glam::{Mat4, Vec2};
use serde::{Deserialize, Serialize};

use crate::error::PlacementError;
use crate::labels::collision_index::{CollisionConfig, CollisionIndex, PlacedBox, PlacementContext};
use crate::labels::projection::{pixels_to_tile_units, ScreenTransform};
use crate::labels::symbol_bucket::{SymbolBucket, SymbolInstance, SymbolLayout};
use crate::labels::types::{CollisionBox, CollisionKey, OverlapMode, TextAnchor, TextJustify};
use crate::tile_id::OverscaledTileId;

/// Placement tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Fade-in/out duration in milliseconds.
    pub fade_duration: f64,
    /// Whether symbols of different sources collide with each other.
    pub cross_source_collisions: bool,
    /// Work budget per `continue_placement` call, in milliseconds.
    pub time_budget_ms: f64,
    /// Ignore the budget and place everything in one call.
    pub force_full_placement: bool,
    /// Fraction of `symbol-spacing` within which same-text line labels are dropped.
    pub repeat_distance_factor: f32,
    pub collision: CollisionConfig,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            fade_duration: 300.0,
            cross_source_collisions: true,
            time_budget_ms: 2.0,
            force_full_placement: false,
            repeat_distance_factor: 0.5,
            collision: CollisionConfig::default(),
        }
    }
}

/// Opacity of one symbol part and whether it is fading in or out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpacityState {
    pub opacity: f64,
    pub placed: bool,
}

impl OpacityState {
    pub fn new(prev: Option<&OpacityState>, increment: f64, placed: bool, skip_fade: bool) -> Self {
        let opacity = match prev {
            Some(prev) => {
                let delta = if prev.placed { increment } else { -increment };
                (prev.opacity + delta).clamp(0.0, 1.0)
            }
            None if skip_fade && placed => 1.0,
            None => 0.0,
        };
        Self { opacity, placed }
    }

    pub fn is_hidden(&self) -> bool {
        self.opacity == 0.0 && !self.placed
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointOpacityState {
    pub text: OpacityState,
    pub icon: OpacityState,
}

impl JointOpacityState {
    pub fn new(
        prev: Option<&JointOpacityState>,
        increment: f64,
        placed_text: bool,
        placed_icon: bool,
        skip_fade: bool,
    ) -> Self {
        Self {
            text: OpacityState::new(prev.map(|p| &p.text), increment, placed_text, skip_fade),
            icon: OpacityState::new(prev.map(|p| &p.icon), increment, placed_icon, skip_fade),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.text.is_hidden() && self.icon.is_hidden()
    }
}

/// Outcome of placing one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointPlacement {
    pub text: bool,
    pub icon: bool,
    /// Show or hide immediately instead of fading.
    pub skip_fade: bool,
}

/// The anchor a variable-anchor label was placed with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableOffset {
    /// Offset for the anchor in shaping units.
    pub text_offset: Vec2,
    /// Text box size in tile units.
    pub width: f32,
    pub height: f32,
    pub anchor: TextAnchor,
    pub text_box_scale: f32,
    /// Anchor used by the previous placement, for animating the move.
    pub prev_anchor: Option<TextAnchor>,
}

impl VariableOffset {
    /// Shift from the centered text box to the placed one, in tile units.
    pub fn shift(&self) -> Vec2 {
        variable_layout_shift(self.anchor, self.width, self.height, self.text_offset, self.text_box_scale)
    }
}

fn variable_layout_shift(anchor: TextAnchor, width: f32, height: f32, offset: Vec2, text_box_scale: f32) -> Vec2 {
    let (horizontal, vertical) = anchor.alignment();
    Vec2::new(
        -(horizontal - 0.5) * width + offset.x * text_box_scale,
        -(vertical - 0.5) * height + offset.y * text_box_scale,
    )
}

/// Symbols of different sources only collide within their group unless
/// cross-source collisions are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionGroup {
    /// 0 is the shared group that collides with everything.
    pub id: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CollisionGroups {
    cross_source_collisions: bool,
    max_group_id: u32,
    groups: HashMap<String, CollisionGroup>,
}

impl CollisionGroups {
    pub fn new(cross_source_collisions: bool) -> Self {
        Self {
            cross_source_collisions,
            ..Self::default()
        }
    }

    pub fn get(&mut self, source_id: &str) -> CollisionGroup {
        if self.cross_source_collisions {
            return CollisionGroup { id: 0 };
        }
        if let Some(group) = self.groups.get(source_id) {
            return *group;
        }
        self.max_group_id += 1;
        let group = CollisionGroup { id: self.max_group_id };
        self.groups.insert(source_id.to_string(), group);
        group
    }
}

/// A symbol bucket of one tile, with the matrix projecting its tile units to clip space.
#[derive(Debug, Clone)]
pub struct TileBucket {
    pub pos_matrix: Mat4,
    pub bucket: SymbolBucket,
}

/// All tiles of one symbol layer for a placement pass.
#[derive(Debug, Clone)]
pub struct SymbolLayerTiles {
    pub layer_id: String,
    pub source_id: String,
    /// `text-translate` in pixels.
    pub text_translate: Vec2,
    /// `icon-translate` in pixels.
    pub icon_translate: Vec2,
    pub minzoom: Option<f64>,
    /// Exclusive.
    pub maxzoom: Option<f64>,
    pub tiles: Vec<TileBucket>,
}

impl SymbolLayerTiles {
    pub fn new(layer_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            source_id: source_id.into(),
            text_translate: Vec2::ZERO,
            icon_translate: Vec2::ZERO,
            minzoom: None,
            maxzoom: None,
            tiles: Vec::new(),
        }
    }

    pub fn with_tile(mut self, pos_matrix: Mat4, bucket: SymbolBucket) -> Self {
        self.tiles.push(TileBucket { pos_matrix, bucket });
        self
    }

    pub fn buckets_mut(&mut self) -> impl Iterator<Item = &mut SymbolBucket> {
        self.tiles.iter_mut().map(|t| &mut t.bucket)
    }

    pub fn in_zoom_range(&self, zoom: f64) -> bool {
        self.minzoom.map_or(true, |min| min <= zoom) && self.maxzoom.map_or(true, |max| zoom < max)
    }
}

/// A run of symbols in one tile placed as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketPart {
    pub tile_index: usize,
    pub sort_key: f64,
    pub range: Range<usize>,
}

/// Enough to map query hits back to tiles after placement.
#[derive(Debug, Clone, PartialEq)]
pub struct RetainedQueryData {
    pub bucket_instance_id: u32,
    pub tile: OverscaledTileId,
    pub layer_id: String,
}

/// Render-facing state of one symbol after a committed placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedSymbol {
    pub cross_tile_id: u32,
    pub feature_index: u32,
    pub text: OpacityState,
    pub icon: OpacityState,
    /// Fully faded out and not placed; may be skipped when drawing.
    pub hidden: bool,
    /// Another tile already shows this symbol.
    pub duplicate: bool,
    pub anchor: Option<TextAnchor>,
    /// Variable-anchor shift in tile units.
    pub shift: Vec2,
    pub justification: TextJustify,
}

/// Per-bucket values shared by all symbols of a part.
struct PartContext<'a> {
    layout: &'a SymbolLayout,
    pos_matrix: &'a Mat4,
    text_pixel_ratio: f32,
    text_translation: Vec2,
    icon_translation: Vec2,
    group: CollisionGroup,
    bucket_instance_id: u32,
    always_show_text: bool,
    always_show_icon: bool,
    just_reloaded: bool,
}

/// One placement generation.
#[derive(Debug)]
pub struct Placement {
    transform: ScreenTransform,
    config: PlacementConfig,
    collision_index: CollisionIndex,
    placements: HashMap<u32, JointPlacement>,
    opacities: HashMap<u32, JointOpacityState>,
    variable_offsets: HashMap<u32, VariableOffset>,
    commit_time: f64,
    prev_zoom_adjustment: f64,
    last_placement_change_time: Option<f64>,
    zoom_at_last_recency_check: f64,
    stale: bool,
    retained_query_data: HashMap<u32, RetainedQueryData>,
    collision_groups: CollisionGroups,
    prev_placement: Option<Box<Placement>>,
}

impl Placement {
    /// Start a placement. Only one previous generation is kept.
    pub fn new(transform: ScreenTransform, config: PlacementConfig, prev: Option<Placement>) -> Self {
        let prev_placement = prev.map(|mut p| {
            p.prev_placement = None;
            Box::new(p)
        });
        Self {
            transform,
            config,
            collision_index: CollisionIndex::new(transform, config.collision),
            placements: HashMap::new(),
            opacities: HashMap::new(),
            variable_offsets: HashMap::new(),
            commit_time: 0.0,
            prev_zoom_adjustment: 0.0,
            last_placement_change_time: None,
            zoom_at_last_recency_check: transform.zoom,
            stale: false,
            retained_query_data: HashMap::new(),
            collision_groups: CollisionGroups::new(config.cross_source_collisions),
            prev_placement,
        }
    }

    pub fn transform(&self) -> &ScreenTransform {
        &self.transform
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn collision_index(&self) -> &CollisionIndex {
        &self.collision_index
    }

    pub fn placement(&self, cross_tile_id: u32) -> Option<&JointPlacement> {
        self.placements.get(&cross_tile_id)
    }

    pub fn opacity(&self, cross_tile_id: u32) -> Option<&JointOpacityState> {
        self.opacities.get(&cross_tile_id)
    }

    pub fn variable_offset(&self, cross_tile_id: u32) -> Option<&VariableOffset> {
        self.variable_offsets.get(&cross_tile_id)
    }

    pub fn retained_query_data(&self, bucket_instance_id: u32) -> Option<&RetainedQueryData> {
        self.retained_query_data.get(&bucket_instance_id)
    }

    /// Split a tile's bucket into parts. With `sort_across_tiles` each run of
    /// equal sort key becomes its own part so parts of all tiles can be
    /// interleaved by key.
    pub fn bucket_parts(
        &mut self,
        parts: &mut Vec<BucketPart>,
        layer: &SymbolLayerTiles,
        tile_index: usize,
        sort_across_tiles: bool,
    ) {
        let Some(tile) = layer.tiles.get(tile_index) else {
            return;
        };
        let bucket = &tile.bucket;
        self.retained_query_data.insert(
            bucket.bucket_instance_id,
            RetainedQueryData {
                bucket_instance_id: bucket.bucket_instance_id,
                tile: bucket.tile,
                layer_id: layer.layer_id.clone(),
            },
        );

        if sort_across_tiles {
            parts.extend(bucket.sort_key_ranges().into_iter().map(|(sort_key, range)| BucketPart {
                tile_index,
                sort_key,
                range,
            }));
        } else {
            parts.push(BucketPart {
                tile_index,
                sort_key: 0.0,
                range: 0..bucket.symbol_instances.len(),
            });
        }
    }

    /// Place the symbols of one part, skipping ids in `seen` (already placed
    /// from another tile of the same layer).
    pub fn place_layer_bucket_part(
        &mut self,
        layer: &mut SymbolLayerTiles,
        part: &BucketPart,
        seen: &mut HashSet<u32>,
    ) -> Result<(), PlacementError> {
        let group = self.collision_groups.get(&layer.source_id);
        let zoom = self.transform.zoom;
        let SymbolLayerTiles {
            text_translate,
            icon_translate,
            tiles,
            ..
        } = layer;
        let Some(TileBucket { pos_matrix, bucket }) = tiles.get_mut(part.tile_index) else {
            return Ok(());
        };
        if bucket.bucket_instance_id == 0 {
            return Err(PlacementError::UnassignedBucketId(bucket.tile.to_string()));
        }

        let units_per_pixel = pixels_to_tile_units(&bucket.tile, 1.0, zoom);
        let layout = bucket.layout.clone();
        let text_always = layout.text_overlap == OverlapMode::Always;
        let icon_always = layout.icon_overlap == OverlapMode::Always;
        let ctx = PartContext {
            layout: &layout,
            pos_matrix,
            text_pixel_ratio: 1.0 / bucket.tile_pixel_ratio,
            text_translation: *text_translate * units_per_pixel,
            icon_translation: *icon_translate * units_per_pixel,
            group,
            bucket_instance_id: bucket.bucket_instance_id,
            always_show_text: text_always && (icon_always || !bucket.has_icon_data() || layout.icon_optional),
            always_show_icon: icon_always && (text_always || !bucket.has_text_data() || layout.text_optional),
            just_reloaded: bucket.just_reloaded,
        };
        let holding_for_fade = bucket.holding_for_fade;

        let end = part.range.end.min(bucket.symbol_instances.len());
        for index in part.range.start..end {
            let symbol = &mut bucket.symbol_instances[index];
            if symbol.cross_tile_id == 0 {
                return Err(PlacementError::UnassignedCrossTileId(index));
            }
            if seen.contains(&symbol.cross_tile_id) {
                continue;
            }
            if holding_for_fade {
                // a parent tile may still hold the visible copy, so don't mark it seen
                self.placements.insert(
                    symbol.cross_tile_id,
                    JointPlacement {
                        text: false,
                        icon: false,
                        skip_fade: false,
                    },
                );
                continue;
            }
            self.place_symbol(symbol, &ctx);
            seen.insert(symbol.cross_tile_id);
        }

        log::trace!(
            "placed {}..{} of bucket {} ({})",
            part.range.start,
            end,
            bucket.bucket_instance_id,
            bucket.tile
        );
        bucket.just_reloaded = false;
        Ok(())
    }

    /// Place every tile of `layer` in one go.
    pub fn place_layer(&mut self, layer: &mut SymbolLayerTiles) -> Result<(), PlacementError> {
        let sort_across_tiles = layer.tiles.iter().any(|t| t.bucket.layout.sort_by_key);
        let mut parts = Vec::new();
        for tile_index in 0..layer.tiles.len() {
            self.bucket_parts(&mut parts, layer, tile_index, sort_across_tiles);
        }
        if sort_across_tiles {
            sort_parts(&mut parts);
        }
        let mut seen = HashSet::new();
        for part in &parts {
            self.place_layer_bucket_part(layer, part, &mut seen)?;
        }
        Ok(())
    }

    fn place_symbol(&mut self, symbol: &mut SymbolInstance, ctx: &PartContext<'_>) {
        let cross_tile_id = symbol.cross_tile_id;
        if symbol.unplaceable {
            self.placements.insert(
                cross_tile_id,
                JointPlacement {
                    text: false,
                    icon: false,
                    skip_fade: true,
                },
            );
            return;
        }

        let layout = ctx.layout;
        let predicate_group = ctx.group.id;
        let predicate = move |key: &CollisionKey| key.collision_group_id == predicate_group;
        let predicate: Option<&dyn Fn(&CollisionKey) -> bool> = if predicate_group == 0 { None } else { Some(&predicate) };
        let text_ctx = PlacementContext {
            pos_matrix: ctx.pos_matrix,
            text_pixel_ratio: ctx.text_pixel_ratio,
            translation: ctx.text_translation,
            predicate,
        };
        let icon_ctx = PlacementContext {
            translation: ctx.icon_translation,
            ..text_ctx
        };

        let mut place_text = false;
        let mut place_icon = false;
        let mut offscreen = true;
        let mut text_placed_box: Option<PlacedBox> = None;

        if let Some(text_box) = &symbol.text_box {
            let placed = if symbol.variable_offsets.is_empty() {
                self.collision_index
                    .place_collision_box(text_box, layout.text_overlap, Vec2::ZERO, &text_ctx)
            } else {
                self.place_variable_text(symbol, text_box, layout.text_overlap, &text_ctx)
            };
            place_text = placed.placeable();
            offscreen = placed.offscreen;
            text_placed_box = Some(placed);
        }

        let mut circles = None;
        if !symbol.text_circles.is_empty() {
            let placed = self
                .collision_index
                .place_collision_circles(&symbol.text_circles, layout.text_overlap, &text_ctx);
            place_text = layout.text_overlap == OverlapMode::Always
                || (!placed.circles.is_empty() && !placed.collision_detected);
            offscreen &= placed.offscreen;
            circles = (!placed.offscreen).then_some(placed.circles);
        }

        let mut icon_placed_box: Option<PlacedBox> = None;
        if let Some(icon_box) = &symbol.icon_box {
            let placed = self
                .collision_index
                .place_collision_box(icon_box, layout.icon_overlap, Vec2::ZERO, &icon_ctx);
            place_icon = placed.placeable();
            offscreen &= placed.offscreen;
            icon_placed_box = Some(placed);
        }

        let icon_without_text = layout.text_optional || !symbol.has_text();
        let text_without_icon = layout.icon_optional || !symbol.has_icon();
        if !icon_without_text && !text_without_icon {
            place_text = place_text && place_icon;
            place_icon = place_text;
        } else if !text_without_icon {
            place_text = place_icon && place_text;
        } else if !icon_without_text {
            place_icon = place_icon && place_text;
        }

        let key = CollisionKey {
            bucket_instance_id: ctx.bucket_instance_id,
            feature_index: symbol.feature_index,
            collision_group_id: ctx.group.id,
        };
        // offscreen boxes are shown but never take a collision slot
        if place_text {
            if let Some(bbox) = text_placed_box.filter(|p| !p.offscreen).and_then(|p| p.bbox) {
                self.collision_index
                    .insert_collision_box(bbox, layout.text_overlap, layout.text_ignore_placement, key);
            }
            if let Some(circles) = &circles {
                self.collision_index.insert_collision_circles(
                    circles,
                    layout.text_overlap,
                    layout.text_ignore_placement,
                    key,
                );
            }
        }
        if place_icon {
            if let Some(bbox) = icon_placed_box.filter(|p| !p.offscreen).and_then(|p| p.bbox) {
                self.collision_index
                    .insert_collision_box(bbox, layout.icon_overlap, layout.icon_ignore_placement, key);
            }
        }

        let show_text = place_text || ctx.always_show_text;
        let show_icon = place_icon || ctx.always_show_icon;
        let text_oversized = text_placed_box.map_or(false, |p| p.oversized);
        let icon_oversized = icon_placed_box.map_or(false, |p| p.oversized);
        let unfittable = (text_oversized && !layout.text_optional) || (icon_oversized && !layout.icon_optional);
        if unfittable && !show_text && !show_icon {
            log::debug!("symbol {cross_tile_id} can never fit and stays hidden");
            symbol.unplaceable = true;
        }

        self.placements.insert(
            cross_tile_id,
            JointPlacement {
                text: show_text,
                icon: show_icon,
                skip_fade: offscreen || ctx.just_reloaded || symbol.unplaceable,
            },
        );
    }

    /// Try each variable anchor, the previously used one first: a pass that
    /// never overlaps, then (unless the layer itself is `never`) a pass with
    /// the layer's overlap mode. Returns the last attempt when none fits.
    fn place_variable_text(
        &mut self,
        symbol: &SymbolInstance,
        text_box: &CollisionBox,
        text_overlap: OverlapMode,
        ctx: &PlacementContext<'_>,
    ) -> PlacedBox {
        let cross_tile_id = symbol.cross_tile_id;
        let mut candidates = symbol.variable_offsets.clone();
        let prev_offset = self
            .prev_placement
            .as_ref()
            .and_then(|prev| prev.variable_offsets.get(&cross_tile_id));
        if let Some(prev) = prev_offset {
            if let Some(position) = candidates.iter().position(|(anchor, _)| *anchor == prev.anchor) {
                let first = candidates.remove(position);
                candidates.insert(0, first);
            }
        }
        let prev_anchor = self.prev_placement.as_ref().and_then(|prev| {
            let shown = prev.placements.get(&cross_tile_id).map_or(false, |p| p.text);
            prev.variable_offsets.get(&cross_tile_id).filter(|_| shown).map(|o| o.anchor)
        });

        let width = text_box.width();
        let height = text_box.height();
        let attempts = if text_overlap == OverlapMode::Never {
            candidates.len()
        } else {
            candidates.len() * 2
        };

        let mut last = None;
        for i in 0..attempts {
            let (anchor, offset) = candidates[i % candidates.len()];
            let overlap = if i >= candidates.len() { text_overlap } else { OverlapMode::Never };
            let shift = variable_layout_shift(anchor, width, height, offset, symbol.text_box_scale);
            let placed = self.collision_index.place_collision_box(text_box, overlap, shift, ctx);
            if placed.placeable() {
                self.variable_offsets.insert(
                    cross_tile_id,
                    VariableOffset {
                        text_offset: offset,
                        width,
                        height,
                        anchor,
                        text_box_scale: symbol.text_box_scale,
                        prev_anchor,
                    },
                );
                return placed;
            }
            last = Some(placed);
        }
        last.unwrap_or(PlacedBox {
            bbox: None,
            offscreen: false,
            occluded: false,
            oversized: false,
        })
    }

    /// Turn placements into opacities, continuing fades from the previous
    /// generation, which is released afterwards.
    pub fn commit(&mut self, now: f64) {
        self.commit_time = now;
        self.zoom_at_last_recency_check = self.transform.zoom;

        let prev = self.prev_placement.take();
        let prev = prev.as_deref();
        self.prev_zoom_adjustment = prev.map_or(0.0, |p| p.zoom_adjustment(self.transform.zoom));
        let increment = prev.map_or(1.0, |p| p.symbol_fade_change(now));

        let empty_opacities = HashMap::new();
        let prev_opacities = prev.map_or(&empty_opacities, |p| &p.opacities);
        let mut placement_changed = false;

        for (&id, placement) in &self.placements {
            let state = match prev_opacities.get(&id) {
                Some(prev_opacity) => {
                    placement_changed |=
                        placement.text != prev_opacity.text.placed || placement.icon != prev_opacity.icon.placed;
                    JointOpacityState::new(Some(prev_opacity), increment, placement.text, placement.icon, false)
                }
                None => {
                    placement_changed |= placement.text || placement.icon;
                    JointOpacityState::new(None, increment, placement.text, placement.icon, placement.skip_fade)
                }
            };
            self.opacities.insert(id, state);
        }

        // symbols that dropped out of this placement keep fading out
        for (&id, prev_opacity) in prev_opacities {
            if self.opacities.contains_key(&id) {
                continue;
            }
            let state = JointOpacityState::new(Some(prev_opacity), increment, false, false, false);
            if !state.is_hidden() {
                self.opacities.insert(id, state);
                placement_changed |= prev_opacity.text.placed || prev_opacity.icon.placed;
            }
        }

        if let Some(prev) = prev {
            for (&id, offset) in &prev.variable_offsets {
                let visible = self.opacities.get(&id).map_or(false, |o| !o.is_hidden());
                if visible && !self.variable_offsets.contains_key(&id) {
                    self.variable_offsets.insert(id, *offset);
                }
            }
        }

        if placement_changed {
            self.last_placement_change_time = Some(now);
        } else if self.last_placement_change_time.is_none() {
            self.last_placement_change_time = Some(prev.and_then(|p| p.last_placement_change_time).unwrap_or(now));
        }

        log::debug!(
            "committed placement at {now}: {} symbols, {} opacities, changed: {placement_changed}",
            self.placements.len(),
            self.opacities.len()
        );
    }

    /// Opacity change accumulated since this placement was committed.
    pub fn symbol_fade_change(&self, now: f64) -> f64 {
        if self.config.fade_duration == 0.0 {
            1.0
        } else {
            (now - self.commit_time) / self.config.fade_duration + self.prev_zoom_adjustment
        }
    }

    /// Zooming out speeds up fades so old labels clear faster.
    pub fn zoom_adjustment(&self, zoom: f64) -> f64 {
        ((self.transform.zoom - zoom) / 1.5).max(0.0)
    }

    pub fn has_transitions(&self, now: f64) -> bool {
        self.stale
            || self
                .last_placement_change_time
                .map_or(false, |t| now - t < self.config.fade_duration)
    }

    /// Whether this placement is recent enough to skip a new one.
    pub fn still_recent(&mut self, now: f64, zoom: f64) -> bool {
        let duration_adjustment = if self.zoom_at_last_recency_check == zoom {
            1.0 - self.zoom_adjustment(zoom)
        } else {
            1.0
        };
        self.zoom_at_last_recency_check = zoom;
        self.commit_time + self.config.fade_duration * duration_adjustment > now
    }

    pub fn set_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Features whose placed symbols intersect a screen polygon, by bucket instance id.
    pub fn query_rendered_symbols(&self, geometry: &[Vec2]) -> std::collections::BTreeMap<u32, Vec<u32>> {
        self.collision_index.query_rendered_symbols(geometry)
    }

    /// Opacities for every symbol of `bucket`. `seen` is shared by the
    /// buckets of one layer; a symbol already output by another tile comes
    /// back as a hidden duplicate.
    pub fn update_bucket_opacities(&mut self, bucket: &SymbolBucket, seen: &mut HashSet<u32>) -> Vec<PlacedSymbol> {
        let layout = &bucket.layout;
        let text_always = layout.text_overlap == OverlapMode::Always;
        let icon_always = layout.icon_overlap == OverlapMode::Always;
        let duplicate_state = JointOpacityState::new(None, 0.0, false, false, true);
        let default_state = JointOpacityState::new(
            None,
            0.0,
            text_always && (icon_always || !bucket.has_icon_data() || layout.icon_optional),
            icon_always && (text_always || !bucket.has_text_data() || layout.text_optional),
            true,
        );

        let mut placed = Vec::with_capacity(bucket.symbol_instances.len());
        for symbol in &bucket.symbol_instances {
            let id = symbol.cross_tile_id;
            let duplicate = !seen.insert(id);
            let state = if duplicate {
                duplicate_state
            } else {
                *self.opacities.entry(id).or_insert(default_state)
            };

            let offset = if duplicate { None } else { self.variable_offsets.get(&id) };
            let anchor = offset.map(|o| o.anchor);
            let justification = match (symbol.justification, anchor) {
                (TextJustify::Auto, Some(anchor)) => anchor.justification(),
                (TextJustify::Auto, None) => TextJustify::Center,
                (justify, _) => justify,
            };

            placed.push(PlacedSymbol {
                cross_tile_id: id,
                feature_index: symbol.feature_index,
                text: state.text,
                icon: state.icon,
                hidden: state.is_hidden(),
                duplicate,
                anchor,
                shift: offset.map_or(Vec2::ZERO, VariableOffset::shift),
                justification,
            });
        }
        placed
    }

    /// [`Placement::update_bucket_opacities`] for every tile of a layer.
    pub fn update_layer_opacities(&mut self, layer: &SymbolLayerTiles) -> Vec<Vec<PlacedSymbol>> {
        let mut seen = HashSet::new();
        layer
            .tiles
            .iter()
            .map(|tile| self.update_bucket_opacities(&tile.bucket, &mut seen))
            .collect()
    }
}

/// Stable sort of parts by key.
pub(crate) fn sort_parts(parts: &mut [BucketPart]) {
    parts.sort_by(|a, b| a.sort_key.partial_cmp(&b.sort_key).unwrap_or(std::cmp::Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::symbol_bucket::SymbolInstance;
    use crate::labels::types::{Anchor, CollisionCircle, SymbolPlacement};

    pub(crate) fn layout() -> SymbolLayout {
        SymbolLayout {
            placement: SymbolPlacement::Point,
            text_overlap: OverlapMode::Never,
            icon_overlap: OverlapMode::Never,
            text_ignore_placement: false,
            icon_ignore_placement: false,
            text_optional: false,
            icon_optional: false,
            variable_anchors: Vec::new(),
            sort_by_key: false,
        }
    }

    pub(crate) fn text_symbol(id: u32, x: f32, y: f32, half: f32) -> SymbolInstance {
        SymbolInstance {
            anchor: Anchor::point(Vec2::new(x, y)),
            feature_index: id,
            key: format!("label-{id}"),
            cross_tile_id: id,
            sort_key: 0.0,
            text_box: Some(CollisionBox::new(Vec2::new(x, y), -half, -half / 2.0, half, half / 2.0)),
            text_circles: Vec::new(),
            icon_box: None,
            text_box_scale: 1.0,
            variable_offsets: Vec::new(),
            justification: TextJustify::Center,
            shaping: None,
            icon: None,
            unplaceable: false,
        }
    }

    pub(crate) fn bucket(symbols: Vec<SymbolInstance>) -> SymbolBucket {
        SymbolBucket {
            layer_id: "labels".into(),
            source_id: "source".into(),
            tile: OverscaledTileId::new(0, 0, 0, 0, 0),
            bucket_instance_id: 1,
            symbol_instances: symbols,
            layout: layout(),
            tile_pixel_ratio: 1.0,
            just_reloaded: false,
            holding_for_fade: false,
        }
    }

    fn setup(symbols: Vec<SymbolInstance>) -> (ScreenTransform, SymbolLayerTiles) {
        let transform = ScreenTransform::new(800.0, 600.0, 0.0);
        let matrix = transform.tile_matrix(Vec2::ZERO, 1.0);
        let layer = SymbolLayerTiles::new("labels", "source").with_tile(matrix, bucket(symbols));
        (transform, layer)
    }

    fn config() -> PlacementConfig {
        PlacementConfig {
            fade_duration: 100.0,
            ..PlacementConfig::default()
        }
    }

    #[test]
    fn test_overlapping_symbols_first_wins() {
        let (transform, mut layer) = setup(vec![
            text_symbol(1, 100.0, 100.0, 20.0),
            text_symbol(2, 105.0, 100.0, 20.0),
            text_symbol(3, 400.0, 300.0, 20.0),
        ]);
        let mut placement = Placement::new(transform, config(), None);
        placement.place_layer(&mut layer).unwrap();

        assert!(placement.placement(1).unwrap().text);
        assert!(!placement.placement(2).unwrap().text);
        assert!(placement.placement(3).unwrap().text);
    }

    #[test]
    fn test_unassigned_ids_are_errors() {
        let (transform, mut layer) = setup(vec![text_symbol(0, 100.0, 100.0, 20.0)]);
        let mut placement = Placement::new(transform, config(), None);
        assert_eq!(placement.place_layer(&mut layer), Err(PlacementError::UnassignedCrossTileId(0)));

        layer.tiles[0].bucket.bucket_instance_id = 0;
        assert!(matches!(
            placement.place_layer(&mut layer),
            Err(PlacementError::UnassignedBucketId(_))
        ));
    }

    #[test]
    fn test_fade_in_and_out() {
        let (transform, mut layer) = setup(vec![text_symbol(1, 100.0, 100.0, 20.0)]);
        let mut first = Placement::new(transform, config(), None);
        first.place_layer(&mut layer).unwrap();
        first.commit(0.0);
        let state = first.opacity(1).unwrap();
        assert_eq!(state.text.opacity, 0.0);
        assert!(state.text.placed);
        assert!(first.has_transitions(50.0));
        assert!(!first.has_transitions(150.0));

        let mut second = Placement::new(transform, config(), Some(first));
        second.place_layer(&mut layer).unwrap();
        second.commit(50.0);
        assert!((second.opacity(1).unwrap().text.opacity - 0.5).abs() < 1e-9);

        // symbol disappears from the data: it keeps fading out
        let (_, mut empty) = setup(Vec::new());
        let mut third = Placement::new(transform, config(), Some(second));
        third.place_layer(&mut empty).unwrap();
        third.commit(75.0);
        let state = third.opacity(1).unwrap();
        assert!(!state.text.placed);
        assert!((state.text.opacity - 0.75).abs() < 1e-9);

        let mut fourth = Placement::new(transform, config(), Some(third));
        fourth.commit(200.0);
        assert!(fourth.opacity(1).is_none());
    }

    #[test]
    fn test_just_reloaded_skips_fade() {
        let (transform, mut layer) = setup(vec![text_symbol(1, 100.0, 100.0, 20.0)]);
        layer.tiles[0].bucket.just_reloaded = true;
        let mut placement = Placement::new(transform, config(), None);
        placement.place_layer(&mut layer).unwrap();
        assert!(!layer.tiles[0].bucket.just_reloaded);
        placement.commit(0.0);
        assert_eq!(placement.opacity(1).unwrap().text.opacity, 1.0);
    }

    #[test]
    fn test_optional_icon() {
        let mut blocker = text_symbol(1, 100.0, 100.0, 20.0);
        blocker.key = "blocker".into();
        let mut symbol = text_symbol(2, 300.0, 100.0, 20.0);
        // icon collides with the blocker, text does not
        symbol.icon_box = Some(CollisionBox::new(Vec2::new(300.0, 100.0), -210.0, -5.0, -180.0, 5.0));

        let (transform, mut layer) = setup(vec![blocker.clone(), symbol.clone()]);
        let mut placement = Placement::new(transform, config(), None);
        placement.place_layer(&mut layer).unwrap();
        assert_eq!(
            placement.placement(2),
            Some(&JointPlacement {
                text: false,
                icon: false,
                skip_fade: false
            })
        );

        let (transform, mut layer) = setup(vec![blocker, symbol]);
        layer.tiles[0].bucket.layout.icon_optional = true;
        let mut placement = Placement::new(transform, config(), None);
        placement.place_layer(&mut layer).unwrap();
        let joint = placement.placement(2).unwrap();
        assert!(joint.text);
        assert!(!joint.icon);
    }

    #[test]
    fn test_variable_anchor_fallback() {
        let blocker = text_symbol(1, 200.0, 100.0, 20.0);
        // bottom anchor puts the box at y 105..125, overlapping the blocker; top gives 125..145
        let mut symbol = text_symbol(2, 200.0, 125.0, 20.0);
        symbol.variable_offsets = vec![(TextAnchor::Bottom, Vec2::ZERO), (TextAnchor::Top, Vec2::ZERO)];

        let (transform, mut layer) = setup(vec![blocker, symbol]);
        let mut placement = Placement::new(transform, config(), None);
        placement.place_layer(&mut layer).unwrap();

        assert!(placement.placement(2).unwrap().text);
        let offset = placement.variable_offset(2).unwrap();
        assert_eq!(offset.anchor, TextAnchor::Top);
        assert_eq!(offset.shift(), Vec2::new(0.0, 10.0));

        placement.commit(0.0);
        let mut seen = HashSet::new();
        let placed = placement.update_bucket_opacities(&layer.tiles[0].bucket, &mut seen);
        assert_eq!(placed[1].anchor, Some(TextAnchor::Top));
        assert_eq!(placed[1].justification, TextJustify::Center);
    }

    #[test]
    fn test_previous_anchor_is_tried_first() {
        let mut symbol = text_symbol(1, 200.0, 200.0, 20.0);
        symbol.variable_offsets = vec![(TextAnchor::Left, Vec2::ZERO), (TextAnchor::Right, Vec2::ZERO)];
        let (transform, mut layer) = setup(vec![symbol]);

        let mut first = Placement::new(transform, config(), None);
        first.place_layer(&mut layer).unwrap();
        assert_eq!(first.variable_offset(1).unwrap().anchor, TextAnchor::Left);
        first.variable_offsets.get_mut(&1).unwrap().anchor = TextAnchor::Right;
        first.commit(0.0);

        let mut second = Placement::new(transform, config(), Some(first));
        second.place_layer(&mut layer).unwrap();
        let offset = second.variable_offset(1).unwrap();
        assert_eq!(offset.anchor, TextAnchor::Right);
        assert_eq!(offset.prev_anchor, Some(TextAnchor::Right));
    }

    #[test]
    fn test_oversized_symbol_stays_hidden() {
        let symbol = text_symbol(1, 400.0, 300.0, 2000.0);
        let (transform, mut layer) = setup(vec![symbol]);
        let mut placement = Placement::new(transform, config(), None);
        placement.place_layer(&mut layer).unwrap();
        assert!(layer.tiles[0].bucket.symbol_instances[0].is_unplaceable());
        assert_eq!(
            placement.placement(1),
            Some(&JointPlacement {
                text: false,
                icon: false,
                skip_fade: true
            })
        );
    }

    #[test]
    fn test_line_label_circles() {
        let mut symbol = text_symbol(1, 100.0, 100.0, 0.0);
        symbol.text_box = None;
        symbol.text_circles = (0..4)
            .map(|i| CollisionCircle {
                center: Vec2::new(100.0 + i as f32 * 10.0, 100.0),
                radius: 5.0,
            })
            .collect();
        let mut second = symbol.clone();
        second.cross_tile_id = 2;
        second.feature_index = 2;

        let (transform, mut layer) = setup(vec![symbol, second]);
        let mut placement = Placement::new(transform, config(), None);
        placement.place_layer(&mut layer).unwrap();
        assert!(placement.placement(1).unwrap().text);
        assert!(!placement.placement(2).unwrap().text);

        let hits = placement.query_rendered_symbols(&[Vec2::new(110.0, 100.0)]);
        assert_eq!(hits.get(&1), Some(&vec![1]));
    }

    #[test]
    fn test_offscreen_symbols_take_no_slot() {
        // both boxes sit in the padding left of the viewport and overlap each other
        let (transform, mut layer) = setup(vec![
            text_symbol(1, -60.0, 100.0, 20.0),
            text_symbol(2, -55.0, 100.0, 20.0),
        ]);
        let mut placement = Placement::new(transform, config(), None);
        placement.place_layer(&mut layer).unwrap();

        for id in [1, 2] {
            let joint = placement.placement(id).unwrap();
            assert!(joint.text, "symbol {id}");
            assert!(joint.skip_fade, "symbol {id}");
        }
        assert!(placement.query_rendered_symbols(&[Vec2::new(-60.0, 100.0)]).is_empty());
    }

    #[test]
    fn test_collision_groups_per_source() {
        let mut groups = CollisionGroups::new(false);
        let a = groups.get("a");
        assert_eq!(a.id, 1);
        assert_eq!(groups.get("b").id, 2);
        assert_eq!(groups.get("a"), a);
        assert_eq!(CollisionGroups::new(true).get("a").id, 0);
    }

    #[test]
    fn test_duplicates_across_tiles() {
        let transform = ScreenTransform::new(800.0, 600.0, 0.0);
        let matrix = transform.tile_matrix(Vec2::ZERO, 1.0);
        let mut other = bucket(vec![text_symbol(1, 100.0, 100.0, 20.0)]);
        other.bucket_instance_id = 2;
        let mut layer = SymbolLayerTiles::new("labels", "source")
            .with_tile(matrix, bucket(vec![text_symbol(1, 100.0, 100.0, 20.0)]))
            .with_tile(matrix, other);

        let mut placement = Placement::new(transform, config(), None);
        placement.place_layer(&mut layer).unwrap();
        placement.commit(0.0);
        let placed = placement.update_layer_opacities(&layer);
        assert!(!placed[0][0].duplicate);
        assert!(placed[1][0].duplicate);
        assert!(placed[1][0].hidden);
    }

    #[test]
    fn test_still_recent_and_stale() {
        let (transform, _) = setup(Vec::new());
        let mut placement = Placement::new(transform, config(), None);
        placement.commit(1000.0);
        assert!(placement.still_recent(1050.0, 0.0));
        assert!(!placement.still_recent(1200.0, 0.0));
        assert!(!placement.has_transitions(2000.0));
        placement.set_stale();
        assert!(placement.has_transitions(2000.0));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: PlacementConfig = serde_json::from_str(r#"{"fade_duration": 0}"#).unwrap();
        assert_eq!(config.fade_duration, 0.0);
        assert_eq!(config.time_budget_ms, 2.0);
        assert_eq!(config.collision.cell_size, 25.0);
        let placement = Placement::new(ScreenTransform::new(10.0, 10.0, 0.0), config, None);
        assert_eq!(placement.symbol_fade_change(123.0), 1.0);
    }
}
