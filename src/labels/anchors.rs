//! Candidate anchors along lines for `line` and `line-center` placement.

use std::collections::VecDeque;
use std::f32::consts::PI;

use glam::Vec2;

use crate::labels::types::Anchor;

/// Label dimensions driving anchor selection, in tile units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelExtent {
    /// Length of the shaped label along the line, before scaling.
    pub shaped_length: f32,
    /// Scale from shaping units to tile units.
    pub box_scale: f32,
    /// Window over which turning angles are summed; 0 disables the check.
    pub angle_window: f32,
}

impl LabelExtent {
    /// `glyph_size` is the em size in shaping units. Icon-only and
    /// zero-length labels skip the angle check.
    pub fn new(shaped_length: f32, glyph_size: f32, box_scale: f32, has_text: bool) -> Self {
        Self {
            shaped_length,
            box_scale,
            angle_window: if has_text && shaped_length > 0.0 {
                3.0 / 5.0 * glyph_size * box_scale
            } else {
                0.0
            },
        }
    }

    pub fn length(&self) -> f32 {
        self.shaped_length * self.box_scale
    }
}

pub fn line_length(line: &[Vec2]) -> f32 {
    line.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Angle of the direction from `from` to `to`.
fn angle_to(from: Vec2, to: Vec2) -> f32 {
    (to.y - from.y).atan2(to.x - from.x)
}

/// Anchors every `spacing` tile units along `line`.
///
/// Lines that start on the tile edge continue from a neighbouring tile and
/// are offset by half the spacing so labels line up across the seam. A line
/// with no valid anchor falls back to a single anchor at its midpoint.
pub fn get_anchors(
    line: &[Vec2],
    spacing: f32,
    max_angle: f32,
    label: &LabelExtent,
    glyph_size: f32,
    overscaling: f32,
    tile_extent: f32,
) -> Vec<Anchor> {
    let Some(first) = line.first() else {
        return Vec::new();
    };
    let label_length = label.length();
    let is_line_continued =
        first.x == 0.0 || first.x == tile_extent || first.y == 0.0 || first.y == tile_extent;

    let mut spacing = spacing;
    if spacing - label_length < spacing / 4.0 {
        spacing = label_length + spacing / 4.0;
    }
    if spacing <= 0.0 {
        return Vec::new();
    }

    let fixed_extra_offset = glyph_size * 2.0;
    let offset = if is_line_continued {
        (spacing / 2.0 * overscaling) % spacing
    } else {
        ((label.shaped_length / 2.0 + fixed_extra_offset) * label.box_scale * overscaling) % spacing
    };

    let resample = Resample {
        line,
        spacing,
        angle_window: label.angle_window,
        max_angle,
        label_length,
        is_line_continued,
        tile_extent,
    };
    resample.run(offset, false)
}

struct Resample<'a> {
    line: &'a [Vec2],
    spacing: f32,
    angle_window: f32,
    max_angle: f32,
    label_length: f32,
    is_line_continued: bool,
    tile_extent: f32,
}

impl Resample<'_> {
    fn run(&self, offset: f32, place_at_middle: bool) -> Vec<Anchor> {
        let half_label = self.label_length / 2.0;
        let total = line_length(self.line);
        let mut distance = 0.0;
        let mut marked = offset - self.spacing;
        let mut anchors = Vec::new();

        for (i, pair) in self.line.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            let segment = a.distance(b);
            let angle = angle_to(a, b);

            while marked + self.spacing < distance + segment {
                marked += self.spacing;
                let t = (marked - distance) / segment;
                let p = a.lerp(b, t);

                if p.x >= 0.0
                    && p.x < self.tile_extent
                    && p.y >= 0.0
                    && p.y < self.tile_extent
                    && marked - half_label >= 0.0
                    && marked + half_label <= total
                {
                    let anchor = Anchor::new(p, angle, Some(i)).rounded();
                    if self.angle_window == 0.0
                        || check_max_angle(self.line, &anchor, self.label_length, self.angle_window, self.max_angle)
                    {
                        anchors.push(anchor);
                    }
                }
            }
            distance += segment;
        }

        if !place_at_middle && anchors.is_empty() && !self.is_line_continued {
            return self.run(distance / 2.0, true);
        }
        anchors
    }
}

/// Single anchor at the middle of the line, if the label fits there.
pub fn get_center_anchor(line: &[Vec2], max_angle: f32, label: &LabelExtent) -> Option<Anchor> {
    let label_length = label.length();
    let center = line_length(line) / 2.0;
    let mut prev = 0.0;

    for (i, pair) in line.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let segment = a.distance(b);
        if prev + segment > center {
            let t = (center - prev) / segment;
            let anchor = Anchor::new(a.lerp(b, t), angle_to(a, b), Some(i)).rounded();
            let fits = label.angle_window == 0.0
                || check_max_angle(line, &anchor, label_length, label.angle_window, max_angle);
            return fits.then_some(anchor);
        }
        prev += segment;
    }
    None
}

/// Whether the summed turning angle within any `window` of the label's span
/// stays under `max_angle`. Labels running off either end of the line fail.
pub fn check_max_angle(line: &[Vec2], anchor: &Anchor, label_length: f32, window: f32, max_angle: f32) -> bool {
    let Some(segment) = anchor.segment else {
        return true;
    };
    if label_length <= 0.0 {
        return true;
    }

    // walk back to the segment where the label starts
    let mut p = anchor.point;
    let mut index = segment as isize + 1;
    let mut anchor_distance = 0.0;
    while anchor_distance > -label_length / 2.0 {
        index -= 1;
        if index < 0 {
            return false;
        }
        anchor_distance -= line[index as usize].distance(p);
        p = line[index as usize];
    }

    let mut index = index as usize;
    let Some(&following) = line.get(index + 1) else {
        return false;
    };
    anchor_distance += line[index].distance(following);
    index += 1;

    let mut recent: VecDeque<(f32, f32)> = VecDeque::new();
    let mut recent_angle_delta = 0.0;

    while anchor_distance < label_length / 2.0 {
        let prev = line[index - 1];
        let current = line[index];
        let Some(&next) = line.get(index + 1) else {
            return false;
        };

        let delta = angle_to(current, prev) - angle_to(next, current);
        let delta = ((delta + 3.0 * PI).rem_euclid(PI * 2.0) - PI).abs();

        recent.push_back((anchor_distance, delta));
        recent_angle_delta += delta;

        while let Some(&(distance, old_delta)) = recent.front() {
            if anchor_distance - distance > window {
                recent_angle_delta -= old_delta;
                recent.pop_front();
            } else {
                break;
            }
        }

        if recent_angle_delta > max_angle {
            return false;
        }

        index += 1;
        anchor_distance += current.distance(next);
    }
    true
}

/// Point `distance` tile units from `anchor` along the line (negative walks backwards).
pub fn point_along_line(line: &[Vec2], anchor: &Anchor, distance: f32) -> Option<Vec2> {
    let segment = anchor.segment?;
    if distance >= 0.0 {
        let mut remaining = distance;
        let mut from = anchor.point;
        for to in line.iter().skip(segment + 1) {
            let length = from.distance(*to);
            if remaining <= length {
                return Some(if length > 0.0 { from.lerp(*to, remaining / length) } else { from });
            }
            remaining -= length;
            from = *to;
        }
    } else {
        let mut remaining = -distance;
        let mut from = anchor.point;
        for to in line.iter().take(segment + 1).rev() {
            let length = from.distance(*to);
            if remaining <= length {
                return Some(if length > 0.0 { from.lerp(*to, remaining / length) } else { from });
            }
            remaining -= length;
            from = *to;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_line() -> Vec<Vec2> {
        (0..10).map(|i| Vec2::new(1000.0 + i as f32 * 500.0, 2000.0)).collect()
    }

    fn extent(length: f32) -> LabelExtent {
        LabelExtent::new(length, 24.0, 1.0, true)
    }

    #[test]
    fn test_anchors_spaced_along_line() {
        let line = straight_line();
        let anchors = get_anchors(&line, 1000.0, PI / 4.0, &extent(200.0), 24.0, 1.0, 8192.0);
        assert!(anchors.len() >= 3);
        for pair in anchors.windows(2) {
            assert!((pair[1].point.x - pair[0].point.x - 1000.0).abs() <= 1.0);
        }
        // first anchor sits at (half label + 2 em) along the line
        assert!((anchors[0].point.x - (1000.0 + 148.0)).abs() <= 1.0);
        assert!(anchors.iter().all(|a| a.point.y == 2000.0 && a.angle == 0.0));
    }

    #[test]
    fn test_continued_line_offset() {
        let line: Vec<Vec2> = (0..5).map(|i| Vec2::new(i as f32 * 1000.0, 100.0)).collect();
        let anchors = get_anchors(&line, 1000.0, PI / 4.0, &extent(100.0), 24.0, 1.0, 8192.0);
        assert!((anchors[0].point.x - 500.0).abs() <= 1.0);
    }

    #[test]
    fn test_short_line_falls_back_to_middle() {
        let line = vec![Vec2::new(100.0, 100.0), Vec2::new(400.0, 100.0)];
        let anchors = get_anchors(&line, 5000.0, PI / 4.0, &extent(280.0), 24.0, 1.0, 8192.0);
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].point, Vec2::new(250.0, 100.0));
    }

    #[test]
    fn test_label_longer_than_line() {
        let line = vec![Vec2::new(100.0, 100.0), Vec2::new(200.0, 100.0)];
        assert!(get_anchors(&line, 500.0, PI / 4.0, &extent(300.0), 24.0, 1.0, 8192.0).is_empty());
        assert!(get_center_anchor(&line, PI / 4.0, &extent(300.0)).is_none());
    }

    #[test]
    fn test_center_anchor() {
        let line = vec![Vec2::new(0.0, 0.0), Vec2::new(100.0, 0.0), Vec2::new(100.0, 300.0)];
        let anchor = get_center_anchor(&line, PI, &extent(50.0)).unwrap();
        assert_eq!(anchor.point, Vec2::new(100.0, 100.0));
        assert_eq!(anchor.segment, Some(1));
        assert!((anchor.angle - PI / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_max_angle_rejects_sharp_turns() {
        let line = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(100.0, 0.0),
            Vec2::new(100.0, 100.0),
            Vec2::new(200.0, 100.0),
        ];
        let anchor = Anchor::new(Vec2::new(100.0, 50.0), PI / 2.0, Some(1));
        assert!(!check_max_angle(&line, &anchor, 150.0, 100.0, PI / 4.0));
        assert!(check_max_angle(&line, &anchor, 150.0, 100.0, PI * 1.5));
        assert!(check_max_angle(&line, &anchor, 40.0, 100.0, PI / 4.0));
    }

    #[test]
    fn test_anchor_on_last_segment() {
        let line = vec![Vec2::new(100.0, 4000.0), Vec2::new(4000.0, 4000.0), Vec2::new(8000.0, 4100.0)];
        let near_end = Anchor::new(Vec2::new(7990.0, 4099.75), 0.025, Some(1));
        assert!(check_max_angle(&line, &near_end, 0.0, 14.4, PI / 4.0));
        // a label running past the final vertex does not fit
        assert!(!check_max_angle(&line, &near_end, 100.0, 14.4, PI / 4.0));

        let empty = LabelExtent::new(0.0, 24.0, 1.0, true);
        assert_eq!(empty.angle_window, 0.0);
        let anchors = get_anchors(&line, 250.0, PI / 4.0, &empty, 24.0, 1.0, 8192.0);
        assert!(!anchors.is_empty());
        assert!(anchors.iter().any(|a| a.segment == Some(1)));
    }

    #[test]
    fn test_point_along_line() {
        let line = vec![Vec2::new(0.0, 0.0), Vec2::new(100.0, 0.0), Vec2::new(100.0, 100.0)];
        let anchor = Anchor::new(Vec2::new(50.0, 0.0), 0.0, Some(0));
        assert_eq!(point_along_line(&line, &anchor, 70.0), Some(Vec2::new(100.0, 20.0)));
        assert_eq!(point_along_line(&line, &anchor, -50.0), Some(Vec2::new(0.0, 0.0)));
        assert_eq!(point_along_line(&line, &anchor, -60.0), None);
        assert_eq!(point_along_line(&line, &anchor, 200.0), None);
    }
}
