//! Text and icon shaping against externally supplied metrics.
//!
//! Glyph rasterization lives outside this crate; shaping only needs advances,
//! so glyph and image metrics are read through [`GlyphProvider`] and
//! [`ImageProvider`].

use std::collections::HashMap;

use glam::Vec2;

use crate::labels::types::{TextAnchor, TextJustify, ONE_EM};
use crate::style::value::Formatted;

/// Baseline offset of the first line in shaping units.
const SHAPING_DEFAULT_OFFSET: f32 = -17.0;

/// Metrics for a single glyph at [`ONE_EM`] size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphMetrics {
    /// Horizontal advance after this glyph.
    pub advance: f32,
    pub width: f32,
    pub height: f32,
    pub left: f32,
    pub top: f32,
}

impl GlyphMetrics {
    pub fn with_advance(advance: f32) -> Self {
        Self {
            advance,
            width: advance,
            height: ONE_EM,
            ..Default::default()
        }
    }
}

pub trait GlyphProvider {
    /// Metrics of `c` in the comma-joined `font_stack`, if the glyph exists.
    fn glyph(&self, font_stack: &str, c: char) -> Option<GlyphMetrics>;
}

impl<F> GlyphProvider for F
where
    F: Fn(&str, char) -> Option<GlyphMetrics>,
{
    fn glyph(&self, font_stack: &str, c: char) -> Option<GlyphMetrics> {
        self(font_stack, c)
    }
}

/// Size of a sprite image in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMetrics {
    pub width: f32,
    pub height: f32,
    pub pixel_ratio: f32,
}

impl ImageMetrics {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            pixel_ratio: 1.0,
        }
    }

    /// Size in CSS pixels.
    pub fn display_size(&self) -> Vec2 {
        Vec2::new(self.width, self.height) / self.pixel_ratio.max(f32::EPSILON)
    }
}

pub trait ImageProvider {
    fn image(&self, name: &str) -> Option<ImageMetrics>;
}

impl ImageProvider for HashMap<String, ImageMetrics> {
    fn image(&self, name: &str) -> Option<ImageMetrics> {
        self.get(name).copied()
    }
}

/// `text-transform` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextTransform {
    #[default]
    None,
    Uppercase,
    Lowercase,
}

impl TextTransform {
    pub fn from_name(name: &str) -> Self {
        match name {
            "uppercase" => TextTransform::Uppercase,
            "lowercase" => TextTransform::Lowercase,
            _ => TextTransform::None,
        }
    }

    pub fn apply(&self, text: &str) -> String {
        match self {
            TextTransform::None => text.to_string(),
            TextTransform::Uppercase => text.to_uppercase(),
            TextTransform::Lowercase => text.to_lowercase(),
        }
    }

    /// Apply to every text section, leaving image sections alone.
    pub fn apply_formatted(&self, formatted: &Formatted) -> Formatted {
        let mut out = formatted.clone();
        if *self != TextTransform::None {
            for section in &mut out.sections {
                section.text = self.apply(&section.text);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionedGlyph {
    pub glyph: char,
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub font_stack: String,
    pub section_index: usize,
    /// Set for inline images inside formatted text.
    pub image: Option<String>,
}

/// Shaped text block. Bounds are in shaping units relative to the anchor
/// and include the text translation; glyph positions do not.
#[derive(Debug, Clone, PartialEq)]
pub struct Shaping {
    pub positioned_glyphs: Vec<PositionedGlyph>,
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
    pub line_count: usize,
    pub text: String,
}

impl Shaping {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapingOptions {
    /// Wrap width in shaping units; 0 disables wrapping.
    pub max_width: f32,
    pub line_height: f32,
    pub justify: TextJustify,
    pub anchor: TextAnchor,
    /// Extra advance after every glyph.
    pub spacing: f32,
    pub translate: Vec2,
}

impl Default for ShapingOptions {
    fn default() -> Self {
        Self {
            max_width: 10.0 * ONE_EM,
            line_height: 1.2 * ONE_EM,
            justify: TextJustify::Center,
            anchor: TextAnchor::Center,
            spacing: 0.0,
            translate: Vec2::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
struct ShapingItem {
    ch: char,
    section_index: usize,
    scale: f32,
    advance: f32,
    font_stack: String,
    image: Option<String>,
}

impl ShapingItem {
    fn is_break_opportunity(&self) -> bool {
        self.image.is_none() && self.ch.is_whitespace()
    }
}

/// Lay out `text` into lines, justify each line and align the block to
/// the anchor. Returns `None` when no glyph could be positioned.
pub fn shape_text(
    text: &Formatted,
    glyphs: &dyn GlyphProvider,
    images: &dyn ImageProvider,
    default_font: &str,
    options: &ShapingOptions,
) -> Option<Shaping> {
    let mut logical_lines: Vec<Vec<ShapingItem>> = vec![Vec::new()];
    for (section_index, section) in text.sections.iter().enumerate() {
        let scale = section.scale.unwrap_or(1.0) as f32;
        let font_stack = section.font_stack.as_deref().unwrap_or(default_font);

        if let Some(image) = &section.image {
            if images.image(&image.name).is_some() {
                push_item(&mut logical_lines, ShapingItem {
                    ch: '\u{FFFC}',
                    section_index,
                    scale,
                    advance: ONE_EM * scale,
                    font_stack: font_stack.to_string(),
                    image: Some(image.name.clone()),
                });
            }
            continue;
        }

        for ch in section.text.chars() {
            if ch == '\n' {
                logical_lines.push(Vec::new());
                continue;
            }
            let Some(metrics) = glyphs.glyph(font_stack, ch) else {
                continue;
            };
            push_item(&mut logical_lines, ShapingItem {
                ch,
                section_index,
                scale,
                advance: metrics.advance * scale + options.spacing,
                font_stack: font_stack.to_string(),
                image: None,
            });
        }
    }

    let lines: Vec<Vec<ShapingItem>> = logical_lines
        .into_iter()
        .flat_map(|line| break_line(line, options.max_width))
        .collect();

    let (horizontal_align, vertical_align) = options.anchor.alignment();
    let justify = match options.justify {
        TextJustify::Auto => options.anchor.justification(),
        other => other,
    }
    .factor();

    let mut positioned = Vec::new();
    let mut max_line_length: f32 = 0.0;
    let mut y = SHAPING_DEFAULT_OFFSET;

    for line in &lines {
        let line_start = positioned.len();
        let mut x = 0.0;
        for item in line {
            positioned.push(PositionedGlyph {
                glyph: item.ch,
                x,
                y,
                scale: item.scale,
                font_stack: item.font_stack.clone(),
                section_index: item.section_index,
                image: item.image.clone(),
            });
            x += item.advance;
        }

        if !line.is_empty() {
            let line_length = x - options.spacing;
            max_line_length = max_line_length.max(line_length);
            for glyph in &mut positioned[line_start..] {
                glyph.x -= line_length * justify;
            }
        }
        y += options.line_height;
    }

    if positioned.is_empty() {
        return None;
    }

    let line_count = lines.len();
    let shift_x = (justify - horizontal_align) * max_line_length;
    let shift_y = (-vertical_align * line_count as f32 + 0.5) * options.line_height;
    for glyph in &mut positioned {
        glyph.x += shift_x;
        glyph.y += shift_y;
    }

    let height = line_count as f32 * options.line_height;
    let top = options.translate.y - vertical_align * height;
    let left = options.translate.x - horizontal_align * max_line_length;

    Some(Shaping {
        positioned_glyphs: positioned,
        top,
        bottom: top + height,
        left,
        right: left + max_line_length,
        line_count,
        text: text.to_string(),
    })
}

fn push_item(lines: &mut [Vec<ShapingItem>], item: ShapingItem) {
    if let Some(line) = lines.last_mut() {
        line.push(item);
    }
}

/// Greedy wrap at whitespace. The whitespace a line breaks on is dropped.
fn break_line(items: Vec<ShapingItem>, max_width: f32) -> Vec<Vec<ShapingItem>> {
    if max_width <= 0.0 {
        return vec![items];
    }

    let mut lines = Vec::new();
    let mut current: Vec<ShapingItem> = Vec::new();
    let mut width = 0.0;
    let mut last_break: Option<usize> = None;

    for item in items {
        if width + item.advance > max_width && !item.is_break_opportunity() {
            if let Some(index) = last_break.take() {
                let rest = current.split_off(index + 1);
                current.pop();
                lines.push(std::mem::take(&mut current));
                width = rest.iter().map(|i| i.advance).sum();
                current = rest;
            }
        }
        if item.is_break_opportunity() {
            last_break = Some(current.len());
        }
        width += item.advance;
        current.push(item);
    }
    lines.push(current);
    lines
}

/// Icon bounds relative to its anchor, in CSS pixels before `icon-size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedIcon {
    pub image: ImageMetrics,
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

pub fn shape_icon(image: ImageMetrics, offset: Vec2, anchor: TextAnchor) -> PositionedIcon {
    let (horizontal_align, vertical_align) = anchor.alignment();
    let size = image.display_size();
    let left = offset.x - size.x * horizontal_align;
    let top = offset.y - size.y * vertical_align;
    PositionedIcon {
        image,
        top,
        bottom: top + size.y,
        left,
        right: left + size.x,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::value::FormattedSection;

    fn glyphs(_font: &str, c: char) -> Option<GlyphMetrics> {
        match c {
            ' ' => Some(GlyphMetrics::with_advance(5.0)),
            '#' => None,
            _ => Some(GlyphMetrics::with_advance(10.0)),
        }
    }

    fn no_images() -> HashMap<String, ImageMetrics> {
        HashMap::new()
    }

    fn options(anchor: TextAnchor, justify: TextJustify) -> ShapingOptions {
        ShapingOptions {
            max_width: 0.0,
            line_height: ONE_EM,
            justify,
            anchor,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_line_centered() {
        let text = Formatted::from_string("abc");
        let shaping = shape_text(&text, &glyphs, &no_images(), "Noto", &options(TextAnchor::Center, TextJustify::Center)).unwrap();
        assert_eq!(shaping.line_count, 1);
        assert_eq!((shaping.left, shaping.right), (-15.0, 15.0));
        assert_eq!((shaping.top, shaping.bottom), (-12.0, 12.0));
        let xs: Vec<f32> = shaping.positioned_glyphs.iter().map(|g| g.x).collect();
        assert_eq!(xs, vec![-15.0, -5.0, 5.0]);
        assert_eq!(shaping.positioned_glyphs[0].y, -17.0);
        assert_eq!(shaping.text, "abc");
    }

    #[test]
    fn test_anchor_alignment() {
        let text = Formatted::from_string("ab");
        let shaping = shape_text(&text, &glyphs, &no_images(), "Noto", &options(TextAnchor::TopLeft, TextJustify::Auto)).unwrap();
        assert_eq!((shaping.left, shaping.right), (0.0, 20.0));
        assert_eq!((shaping.top, shaping.bottom), (0.0, 24.0));
        assert_eq!(shaping.positioned_glyphs[0].x, 0.0);
    }

    #[test]
    fn test_wrapping_and_justification() {
        let text = Formatted::from_string("aaa bb");
        let opts = ShapingOptions {
            max_width: 35.0,
            ..options(TextAnchor::Center, TextJustify::Left)
        };
        let shaping = shape_text(&text, &glyphs, &no_images(), "Noto", &opts).unwrap();
        assert_eq!(shaping.line_count, 2);
        assert_eq!(shaping.width(), 30.0);
        assert_eq!(shaping.height(), 48.0);
        // left-justified lines start at the same x
        let first = &shaping.positioned_glyphs[0];
        let second_line = &shaping.positioned_glyphs[3];
        assert_eq!(second_line.glyph, 'b');
        assert_eq!(first.x, second_line.x);
        assert_eq!(second_line.y - first.y, ONE_EM);
    }

    #[test]
    fn test_missing_glyphs_and_sections() {
        assert!(shape_text(&Formatted::from_string("##"), &glyphs, &no_images(), "Noto", &ShapingOptions::default()).is_none());

        let mut big = FormattedSection::text("b");
        big.scale = Some(2.0);
        big.font_stack = Some("Bold".into());
        let text = Formatted {
            sections: vec![FormattedSection::text("a"), big],
        };
        let shaping = shape_text(&text, &glyphs, &no_images(), "Noto", &options(TextAnchor::Left, TextJustify::Left)).unwrap();
        assert_eq!(shaping.width(), 30.0);
        assert_eq!(shaping.positioned_glyphs[1].font_stack, "Bold");
        assert_eq!(shaping.positioned_glyphs[1].section_index, 1);
    }

    #[test]
    fn test_shape_icon() {
        let image = ImageMetrics {
            width: 40.0,
            height: 20.0,
            pixel_ratio: 2.0,
        };
        let icon = shape_icon(image, Vec2::new(1.0, 0.0), TextAnchor::Bottom);
        assert_eq!((icon.left, icon.right), (-9.0, 11.0));
        assert_eq!((icon.top, icon.bottom), (-10.0, 0.0));
    }

    #[test]
    fn test_text_transform() {
        assert_eq!(TextTransform::from_name("uppercase").apply("Main St"), "MAIN ST");
        let formatted = TextTransform::Lowercase.apply_formatted(&Formatted::from_string("ABC"));
        assert_eq!(formatted.to_string(), "abc");
    }
}
