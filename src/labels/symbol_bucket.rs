//! Per-tile symbol buckets: layout evaluation, shaping, anchors and
//! collision geometry for every label candidate of one layer in one tile.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

use glam::Vec2;

use crate::error::StyleResult;
use crate::labels::anchors::{get_anchors, get_center_anchor, point_along_line, LabelExtent};
use crate::labels::shaping::{
    shape_icon, shape_text, GlyphProvider, ImageProvider, PositionedIcon, Shaping, ShapingOptions,
    TextTransform,
};
use crate::labels::types::{
    Anchor, CollisionBox, CollisionCircle, OverlapMode, SymbolPlacement, TextAnchor, TextJustify,
    EXTENT, ONE_EM,
};
use crate::style::expression::{EvaluationContext, Feature, GeometryType, GlobalProperties};
use crate::style::function::FeatureFilter;
use crate::style::properties::{EvaluatedSet, EvaluationParameters};
use crate::style::types::StyleLayer;
use crate::style::value::{Formatted, Padding, Value};
use crate::tile_id::OverscaledTileId;

/// Vertical distance from the top of a line box to the glyph baseline, in shaping units.
const BASELINE_OFFSET: f32 = 7.0;

/// Placement-relevant layout values that are constant across a bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolLayout {
    pub placement: SymbolPlacement,
    pub text_overlap: OverlapMode,
    pub icon_overlap: OverlapMode,
    pub text_ignore_placement: bool,
    pub icon_ignore_placement: bool,
    pub text_optional: bool,
    pub icon_optional: bool,
    pub variable_anchors: Vec<TextAnchor>,
    /// Symbols are ordered by `symbol-sort-key` across tiles.
    pub sort_by_key: bool,
}

impl SymbolLayout {
    pub fn from_evaluated(layout: &EvaluatedSet) -> Self {
        let flag = |name: &str| layout.constant(name).as_bool().unwrap_or(false);
        let placement = layout
            .constant("symbol-placement")
            .as_str()
            .and_then(SymbolPlacement::from_name)
            .unwrap_or_default();
        let variable_anchors = layout
            .constant("text-variable-anchor")
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().and_then(TextAnchor::from_name))
                    .collect()
            })
            .unwrap_or_default();
        let has_sort_key = layout
            .get("symbol-sort-key")
            .map_or(false, |v| !v.is_constant() || !v.constant_or(Value::Null).is_null());
        let viewport_y = layout.constant("symbol-z-order").as_str() == Some("viewport-y");

        Self {
            placement,
            text_overlap: overlap_mode(layout, "text-overlap", "text-allow-overlap"),
            icon_overlap: overlap_mode(layout, "icon-overlap", "icon-allow-overlap"),
            text_ignore_placement: flag("text-ignore-placement"),
            icon_ignore_placement: flag("icon-ignore-placement"),
            text_optional: flag("text-optional"),
            icon_optional: flag("icon-optional"),
            variable_anchors,
            sort_by_key: has_sort_key && !viewport_y,
        }
    }
}

/// `*-overlap` wins when set; otherwise `*-allow-overlap` maps to always/never.
fn overlap_mode(layout: &EvaluatedSet, overlap: &str, allow_overlap: &str) -> OverlapMode {
    if let Some(mode) = layout.constant(overlap).as_str().and_then(OverlapMode::from_name) {
        return mode;
    }
    if layout.constant(allow_overlap).as_bool().unwrap_or(false) {
        OverlapMode::Always
    } else {
        OverlapMode::Never
    }
}

/// One label candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInstance {
    pub anchor: Anchor,
    pub feature_index: u32,
    /// Text (or icon name) used to match the symbol across tiles.
    pub key: String,
    /// Stable identity across tiles; 0 until assigned by the cross-tile index.
    pub cross_tile_id: u32,
    pub sort_key: f64,
    pub text_box: Option<CollisionBox>,
    pub text_circles: Vec<CollisionCircle>,
    pub icon_box: Option<CollisionBox>,
    /// Shaping units to tile units for text.
    pub text_box_scale: f32,
    /// Offset in shaping units for each `text-variable-anchor` candidate.
    pub variable_offsets: Vec<(TextAnchor, Vec2)>,
    /// `Auto` only with variable anchors, where the placed anchor decides.
    pub justification: TextJustify,
    pub shaping: Option<Shaping>,
    pub icon: Option<PositionedIcon>,
    /// Set once a placement finds the symbol can never fit the grid.
    pub(crate) unplaceable: bool,
}

impl SymbolInstance {
    pub fn has_text(&self) -> bool {
        self.text_box.is_some() || !self.text_circles.is_empty()
    }

    pub fn has_icon(&self) -> bool {
        self.icon_box.is_some()
    }

    pub fn is_unplaceable(&self) -> bool {
        self.unplaceable
    }
}

/// Inputs describing where and how a bucket is built.
#[derive(Debug, Clone)]
pub struct BucketParameters {
    pub tile: OverscaledTileId,
    pub layer_id: String,
    pub source_id: String,
    /// Zoom at which layout properties are evaluated.
    pub zoom: f64,
    /// Same-text line labels closer than this fraction of `symbol-spacing` are dropped.
    pub repeat_distance_factor: f32,
    pub available_images: HashSet<String>,
}

impl BucketParameters {
    pub fn new(tile: OverscaledTileId, layer_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            tile,
            layer_id: layer_id.into(),
            source_id: source_id.into(),
            zoom: tile.overscaled_z as f64,
            repeat_distance_factor: 0.5,
            available_images: HashSet::new(),
        }
    }

    pub fn with_available_images(mut self, images: HashSet<String>) -> Self {
        self.available_images = images;
        self
    }

    pub fn with_repeat_distance_factor(mut self, factor: f32) -> Self {
        self.repeat_distance_factor = factor;
        self
    }
}

/// Symbols of one layer in one tile.
#[derive(Debug, Clone)]
pub struct SymbolBucket {
    pub layer_id: String,
    pub source_id: String,
    pub tile: OverscaledTileId,
    /// Assigned by the cross-tile index; 0 until then.
    pub bucket_instance_id: u32,
    pub symbol_instances: Vec<SymbolInstance>,
    pub layout: SymbolLayout,
    /// Tile units per CSS pixel at the tile's own zoom.
    pub tile_pixel_ratio: f32,
    /// Freshly built buckets show their symbols without fading in.
    pub just_reloaded: bool,
    /// Set while a parent tile is still shown in place of this one.
    pub holding_for_fade: bool,
}

/// Per-feature layout values resolved once and shared by all of its anchors.
struct FeatureLayout {
    text: Option<Formatted>,
    icon: Option<PositionedIcon>,
    icon_name: Option<String>,
    font_scale: f32,
    icon_scale: f32,
    text_padding: f32,
    icon_padding: Padding,
    text_rotate: f32,
    text_anchor: TextAnchor,
    justify: TextJustify,
    text_offset: Vec2,
    radial_offset: f32,
    max_width: f32,
    line_height: f32,
    letter_spacing: f32,
    font_stack: String,
    sort_key: f64,
}

struct Builder<'a> {
    layout: &'a EvaluatedSet,
    flags: &'a SymbolLayout,
    glyphs: &'a dyn GlyphProvider,
    images: &'a dyn ImageProvider,
    params: &'a BucketParameters,
    tile_pixel_ratio: f32,
    compare_text: HashMap<String, Vec<Vec2>>,
    instances: Vec<SymbolInstance>,
}

impl SymbolBucket {
    /// Build a bucket from decoded features. `layout` is the layer's layout
    /// set evaluated at the tile zoom.
    pub fn build(
        features: &[Feature],
        layout: &EvaluatedSet,
        filter: Option<&FeatureFilter>,
        glyphs: &dyn GlyphProvider,
        images: &dyn ImageProvider,
        params: &BucketParameters,
    ) -> SymbolBucket {
        let flags = SymbolLayout::from_evaluated(layout);
        let tile_pixel_ratio = EXTENT / (512.0 * params.tile.overscale_factor() as f32);
        let mut builder = Builder {
            layout,
            flags: &flags,
            glyphs,
            images,
            params,
            tile_pixel_ratio,
            compare_text: HashMap::new(),
            instances: Vec::new(),
        };

        let globals = GlobalProperties::at_zoom(params.zoom);
        for (index, feature) in features.iter().enumerate() {
            let ctx = EvaluationContext::new(globals)
                .with_feature(feature)
                .with_canonical(params.tile.canonical)
                .with_available_images(&params.available_images);
            if filter.map_or(false, |f| !f.matches(&ctx)) {
                continue;
            }
            builder.add_feature(feature, index as u32, &ctx);
        }

        let mut symbol_instances = builder.instances;
        if flags.sort_by_key {
            symbol_instances.sort_by(|a, b| a.sort_key.partial_cmp(&b.sort_key).unwrap_or(Ordering::Equal));
        }

        log::debug!(
            "built symbol bucket {}@{} with {} symbols",
            params.layer_id,
            params.tile.canonical,
            symbol_instances.len()
        );

        SymbolBucket {
            layer_id: params.layer_id.clone(),
            source_id: params.source_id.clone(),
            tile: params.tile,
            bucket_instance_id: 0,
            symbol_instances,
            layout: flags,
            tile_pixel_ratio,
            just_reloaded: true,
            holding_for_fade: false,
        }
    }

    /// Compile `layer`'s layout and filter, then build.
    pub fn from_layer(
        layer: &StyleLayer,
        features: &[Feature],
        glyphs: &dyn GlyphProvider,
        images: &dyn ImageProvider,
        params: &BucketParameters,
    ) -> StyleResult<SymbolBucket> {
        let layout = layer
            .layout_properties()?
            .possibly_evaluate(&EvaluationParameters::new(params.zoom));
        let filter = layer.feature_filter()?;
        Ok(SymbolBucket::build(features, &layout, Some(&filter), glyphs, images, params))
    }

    pub fn has_text_data(&self) -> bool {
        self.symbol_instances.iter().any(SymbolInstance::has_text)
    }

    pub fn has_icon_data(&self) -> bool {
        self.symbol_instances.iter().any(SymbolInstance::has_icon)
    }

    /// Contiguous runs of equal sort key, in instance order.
    pub fn sort_key_ranges(&self) -> Vec<(f64, Range<usize>)> {
        let mut ranges: Vec<(f64, Range<usize>)> = Vec::new();
        for (i, symbol) in self.symbol_instances.iter().enumerate() {
            match ranges.last_mut() {
                Some((key, range)) if *key == symbol.sort_key => range.end = i + 1,
                _ => ranges.push((symbol.sort_key, i..i + 1)),
            }
        }
        ranges
    }
}

impl Builder<'_> {
    fn add_feature(&mut self, feature: &Feature, feature_index: u32, ctx: &EvaluationContext) {
        let Some(values) = self.feature_layout(ctx) else {
            return;
        };
        let lines: Vec<Vec<Vec2>> = feature
            .geometry
            .iter()
            .map(|ring| ring.iter().map(|p| p.as_vec2()).collect())
            .collect();

        let spacing = self.layout.constant("symbol-spacing").as_f64().unwrap_or(250.0) as f32;
        let max_angle = (self.layout.constant("text-max-angle").as_f64().unwrap_or(45.0) as f32).to_radians();

        match self.flags.placement {
            SymbolPlacement::Point => {
                for point in point_anchors(feature.geometry_type, &lines) {
                    let anchor = Anchor::point(point);
                    self.add_symbol(&values, anchor, None, feature_index);
                }
            }
            SymbolPlacement::Line | SymbolPlacement::LineCenter => {
                if feature.geometry_type == GeometryType::Point {
                    return;
                }
                let shaping = values.text.as_ref().and_then(|text| self.shape(text, &values, TextAnchor::Center, Vec2::ZERO, 0.0));
                let shaped_length = shaping
                    .as_ref()
                    .map_or(0.0, Shaping::width)
                    .max(values.icon.map_or(0.0, |icon| icon.right - icon.left));
                let extent = LabelExtent::new(
                    shaped_length,
                    ONE_EM,
                    self.tile_pixel_ratio * values.font_scale,
                    shaping.is_some(),
                );
                let symbol_min_distance = spacing * self.tile_pixel_ratio;
                let repeat_distance = symbol_min_distance * self.params.repeat_distance_factor;

                for line in &lines {
                    let anchors = if self.flags.placement == SymbolPlacement::Line {
                        get_anchors(
                            line,
                            symbol_min_distance,
                            max_angle,
                            &extent,
                            ONE_EM,
                            self.params.tile.overscale_factor() as f32,
                            EXTENT,
                        )
                    } else {
                        get_center_anchor(line, max_angle, &extent).into_iter().collect()
                    };
                    for anchor in anchors {
                        if let Some(shaping) = &shaping {
                            if self.anchor_is_too_close(&shaping.text, repeat_distance, anchor.point) {
                                continue;
                            }
                        }
                        self.add_symbol(&values, anchor, Some(line.as_slice()), feature_index);
                    }
                }
            }
        }
    }

    fn feature_layout(&self, ctx: &EvaluationContext) -> Option<FeatureLayout> {
        let layout = self.layout;
        let number = |name: &str, fallback: f64| layout.evaluate(name, ctx).as_f64().unwrap_or(fallback) as f32;
        let pair = |name: &str| {
            layout
                .evaluate(name, ctx)
                .as_number_array()
                .filter(|v| v.len() == 2)
                .map_or(Vec2::ZERO, |v| Vec2::new(v[0] as f32, v[1] as f32))
        };

        let transform = layout
            .evaluate("text-transform", ctx)
            .as_str()
            .map(TextTransform::from_name)
            .unwrap_or_default();
        let text = match layout.evaluate("text-field", ctx) {
            Value::Formatted(formatted) => Some(formatted),
            Value::String(s) => Some(Formatted::from_string(s)),
            _ => None,
        }
        .map(|f| transform.apply_formatted(&f))
        .filter(|f| !f.is_empty());

        let icon_name = match layout.evaluate("icon-image", ctx) {
            Value::ResolvedImage(image) => Some(image.name),
            Value::String(name) if !name.is_empty() => Some(name),
            _ => None,
        };
        let icon_anchor = layout
            .evaluate("icon-anchor", ctx)
            .as_str()
            .and_then(TextAnchor::from_name)
            .unwrap_or_default();
        let icon = icon_name
            .as_deref()
            .and_then(|name| self.images.image(name))
            .map(|image| shape_icon(image, pair("icon-offset"), icon_anchor));

        if text.is_none() && icon.is_none() {
            return None;
        }

        let text_anchor = layout
            .evaluate("text-anchor", ctx)
            .as_str()
            .and_then(TextAnchor::from_name)
            .unwrap_or_default();
        let justify = layout
            .evaluate("text-justify", ctx)
            .as_str()
            .and_then(TextJustify::from_name)
            .unwrap_or_default();
        let font_stack = match layout.evaluate("text-font", ctx) {
            Value::Array(fonts) => fonts.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(","),
            _ => String::new(),
        };
        let icon_padding = Padding::parse(&layout.evaluate("icon-padding", ctx)).unwrap_or_else(|| Padding::uniform(2.0));
        let max_width = if self.flags.placement == SymbolPlacement::Point {
            number("text-max-width", 10.0) * ONE_EM
        } else {
            0.0
        };

        Some(FeatureLayout {
            text,
            icon,
            icon_name,
            font_scale: number("text-size", 16.0) / ONE_EM,
            icon_scale: number("icon-size", 1.0),
            text_padding: number("text-padding", 2.0),
            icon_padding,
            text_rotate: number("text-rotate", 0.0),
            text_anchor,
            justify,
            text_offset: pair("text-offset") * ONE_EM,
            radial_offset: number("text-radial-offset", 0.0) * ONE_EM,
            max_width,
            line_height: number("text-line-height", 1.2) * ONE_EM,
            letter_spacing: number("text-letter-spacing", 0.0) * ONE_EM,
            font_stack,
            sort_key: layout.evaluate("symbol-sort-key", ctx).as_f64().unwrap_or(0.0),
        })
    }

    fn shape(
        &self,
        text: &Formatted,
        values: &FeatureLayout,
        anchor: TextAnchor,
        translate: Vec2,
        max_width: f32,
    ) -> Option<Shaping> {
        let options = ShapingOptions {
            max_width,
            line_height: values.line_height,
            justify: values.justify,
            anchor,
            spacing: values.letter_spacing,
            translate,
        };
        shape_text(text, self.glyphs, self.images, &values.font_stack, &options)
    }

    fn add_symbol(&mut self, values: &FeatureLayout, anchor: Anchor, line: Option<&[Vec2]>, feature_index: u32) {
        let p = anchor.point;
        if p.x < 0.0 || p.x >= EXTENT || p.y < 0.0 || p.y >= EXTENT {
            return;
        }

        let text_box_scale = self.tile_pixel_ratio * values.font_scale;
        let text_padding = values.text_padding * self.tile_pixel_ratio;
        let variable = !self.flags.variable_anchors.is_empty() && line.is_none();

        let (shaping, justification) = match &values.text {
            Some(text) if variable => (
                self.shape(text, values, TextAnchor::Center, Vec2::ZERO, values.max_width),
                values.justify,
            ),
            Some(text) => {
                let (anchor_name, translate) = if line.is_some() {
                    (TextAnchor::Center, Vec2::ZERO)
                } else if values.radial_offset != 0.0 {
                    (values.text_anchor, radial_offset(values.text_anchor, values.radial_offset))
                } else {
                    (values.text_anchor, values.text_offset)
                };
                let justification = match values.justify {
                    TextJustify::Auto => anchor_name.justification(),
                    other => other,
                };
                (self.shape(text, values, anchor_name, translate, values.max_width), justification)
            }
            None => (None, TextJustify::Center),
        };

        let mut text_box = None;
        let mut text_circles = Vec::new();
        if let Some(shaping) = &shaping {
            match line {
                Some(line) => {
                    text_circles = line_circles(line, &anchor, shaping, text_box_scale, text_padding);
                    if text_circles.is_empty() {
                        return;
                    }
                }
                None => {
                    text_box = Some(box_from_bounds(
                        p,
                        [shaping.left, shaping.top, shaping.right, shaping.bottom],
                        text_box_scale,
                        Padding::uniform(text_padding as f64),
                        values.text_rotate,
                    ));
                }
            }
        }

        let icon_box_scale = self.tile_pixel_ratio * values.icon_scale;
        let icon_padding = Padding {
            top: values.icon_padding.top * self.tile_pixel_ratio as f64,
            right: values.icon_padding.right * self.tile_pixel_ratio as f64,
            bottom: values.icon_padding.bottom * self.tile_pixel_ratio as f64,
            left: values.icon_padding.left * self.tile_pixel_ratio as f64,
        };
        let icon_box = values.icon.map(|icon| {
            box_from_bounds(p, [icon.left, icon.top, icon.right, icon.bottom], icon_box_scale, icon_padding, 0.0)
        });

        if text_box.is_none() && text_circles.is_empty() && icon_box.is_none() {
            return;
        }

        let variable_offsets = if variable {
            self.flags
                .variable_anchors
                .iter()
                .map(|&a| {
                    let offset = if values.radial_offset != 0.0 {
                        radial_offset(a, values.radial_offset)
                    } else {
                        text_offset(a, values.text_offset)
                    };
                    (a, offset)
                })
                .collect()
        } else {
            Vec::new()
        };

        let key = match &values.text {
            Some(text) => text.to_string(),
            None => values.icon_name.clone().unwrap_or_default(),
        };

        self.instances.push(SymbolInstance {
            anchor,
            feature_index,
            key,
            cross_tile_id: 0,
            sort_key: values.sort_key,
            text_box,
            text_circles,
            icon_box,
            text_box_scale,
            variable_offsets,
            justification,
            shaping,
            icon: values.icon,
            unplaceable: false,
        });
    }

    /// Records the anchor unless a same-text anchor lies within `repeat_distance`.
    fn anchor_is_too_close(&mut self, text: &str, repeat_distance: f32, point: Vec2) -> bool {
        let anchors = self.compare_text.entry(text.to_string()).or_default();
        if anchors.iter().rev().any(|other| point.distance(*other) < repeat_distance) {
            return true;
        }
        anchors.push(point);
        false
    }
}

/// Anchor points for point placement: every point of point features, the
/// first vertex of lines, and the centroid of each exterior polygon ring.
fn point_anchors(geometry_type: GeometryType, lines: &[Vec<Vec2>]) -> Vec<Vec2> {
    match geometry_type {
        GeometryType::Point => lines.iter().flatten().copied().collect(),
        GeometryType::LineString => lines.iter().filter_map(|l| l.first().copied()).collect(),
        GeometryType::Polygon => {
            let exteriors: Vec<&Vec<Vec2>> = lines.iter().filter(|r| signed_area(r) > 0.0).collect();
            let rings: Vec<&Vec<Vec2>> = if exteriors.is_empty() {
                lines.iter().take(1).collect()
            } else {
                exteriors
            };
            rings.into_iter().filter_map(|r| ring_centroid(r)).collect()
        }
        GeometryType::Unknown => Vec::new(),
    }
}

fn signed_area(ring: &[Vec2]) -> f32 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    (0..n)
        .map(|i| {
            let a = ring[i];
            let b = ring[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum::<f32>()
        / 2.0
}

fn ring_centroid(ring: &[Vec2]) -> Option<Vec2> {
    if ring.is_empty() {
        return None;
    }
    let area = signed_area(ring);
    if area.abs() < f32::EPSILON {
        return Some(ring.iter().copied().sum::<Vec2>() / ring.len() as f32);
    }
    let n = ring.len();
    let mut c = Vec2::ZERO;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let cross = a.x * b.y - b.x * a.y;
        c += (a + b) * cross;
    }
    Some((c / (6.0 * area)).round())
}

/// Box around `anchor` from shaped bounds `[left, top, right, bottom]`.
/// Padding is in tile units; rotation is in degrees.
fn box_from_bounds(anchor: Vec2, bounds: [f32; 4], scale: f32, padding: Padding, rotate: f32) -> CollisionBox {
    let mut x1 = bounds[0] * scale - padding.left as f32;
    let mut y1 = bounds[1] * scale - padding.top as f32;
    let mut x2 = bounds[2] * scale + padding.right as f32;
    let mut y2 = bounds[3] * scale + padding.bottom as f32;

    if rotate != 0.0 {
        let radians = rotate.to_radians();
        let rotation = Vec2::from_angle(radians);
        let corners = [
            Vec2::new(x1, y1),
            Vec2::new(x2, y1),
            Vec2::new(x1, y2),
            Vec2::new(x2, y2),
        ]
        .map(|c| rotation.rotate(c));
        x1 = corners.iter().map(|c| c.x).fold(f32::INFINITY, f32::min);
        y1 = corners.iter().map(|c| c.y).fold(f32::INFINITY, f32::min);
        x2 = corners.iter().map(|c| c.x).fold(f32::NEG_INFINITY, f32::max);
        y2 = corners.iter().map(|c| c.y).fold(f32::NEG_INFINITY, f32::max);
    }

    CollisionBox::new(anchor, x1, y1, x2, y2)
}

/// Circles covering a line label's footprint, centred on the line. Empty
/// when the label runs off the line.
fn line_circles(line: &[Vec2], anchor: &Anchor, shaping: &Shaping, scale: f32, padding: f32) -> Vec<CollisionCircle> {
    let label_length = shaping.width() * scale;
    let box_size = shaping.height() * scale + 2.0 * padding;
    if box_size <= 0.0 {
        return Vec::new();
    }
    let step = box_size / 2.0;
    let count = ((label_length / step).floor() as usize).max(1);
    let spacing = label_length / count as f32;

    let mut circles = Vec::with_capacity(count);
    for i in 0..count {
        let distance = -label_length / 2.0 + (i as f32 + 0.5) * spacing;
        let Some(center) = point_along_line(line, anchor, distance) else {
            return Vec::new();
        };
        circles.push(CollisionCircle {
            center,
            radius: box_size / 2.0,
        });
    }
    circles
}

/// Offset for `anchor` from `text-radial-offset`, in shaping units.
pub fn radial_offset(anchor: TextAnchor, radial: f32) -> Vec2 {
    let radial = radial.max(0.0);
    let hypotenuse = radial / std::f32::consts::SQRT_2;
    let y = match anchor {
        TextAnchor::TopRight | TextAnchor::TopLeft => hypotenuse - BASELINE_OFFSET,
        TextAnchor::BottomRight | TextAnchor::BottomLeft => -hypotenuse + BASELINE_OFFSET,
        TextAnchor::Bottom => -radial + BASELINE_OFFSET,
        TextAnchor::Top => radial - BASELINE_OFFSET,
        _ => 0.0,
    };
    let x = match anchor {
        TextAnchor::TopRight | TextAnchor::BottomRight => -hypotenuse,
        TextAnchor::TopLeft | TextAnchor::BottomLeft => hypotenuse,
        TextAnchor::Left => radial,
        TextAnchor::Right => -radial,
        _ => 0.0,
    };
    Vec2::new(x, y)
}

/// Offset for a variable `anchor` from `text-offset`: magnitudes are kept,
/// directions follow the anchor.
pub fn text_offset(anchor: TextAnchor, offset: Vec2) -> Vec2 {
    let offset = offset.abs();
    let y = match anchor {
        TextAnchor::TopRight | TextAnchor::TopLeft | TextAnchor::Top => offset.y - BASELINE_OFFSET,
        TextAnchor::BottomRight | TextAnchor::BottomLeft | TextAnchor::Bottom => -offset.y + BASELINE_OFFSET,
        _ => 0.0,
    };
    let x = match anchor {
        TextAnchor::TopRight | TextAnchor::BottomRight | TextAnchor::Right => -offset.x,
        TextAnchor::TopLeft | TextAnchor::BottomLeft | TextAnchor::Left => offset.x,
        _ => 0.0,
    };
    Vec2::new(x, y)
}
