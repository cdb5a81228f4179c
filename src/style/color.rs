//! Color parsing and perceptual color spaces.
//!
//! Colors are stored premultiplied in 0..1. CSS parsing accepts hex,
//! `rgb()`/`rgba()`, `hsl()`/`hsla()` and a set of named colors. Lab (D50)
//! and HCL conversions back the `interpolate-lab` / `interpolate-hcl`
//! operators.

use std::f64::consts::PI;
use std::fmt;

/// An RGBA color with premultiplied components in 0..1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

/// A color in CIE Lab space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabColor {
    pub l: f64,
    pub a: f64,
    pub b: f64,
    pub alpha: f64,
}

/// A color in HCL (polar Lab) space. `h` is NaN for achromatic colors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HclColor {
    pub h: f64,
    pub c: f64,
    pub l: f64,
    pub alpha: f64,
}

impl Color {
    pub const BLACK: Color = Color::premultiplied(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::premultiplied(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Color = Color::premultiplied(0.0, 0.0, 0.0, 0.0);

    /// Build from already-premultiplied components.
    pub const fn premultiplied(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Build from straight (non-premultiplied) components in 0..1.
    pub fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self {
            r: r * a,
            g: g * a,
            b: b * a,
            a,
        }
    }

    /// Parse a CSS color string.
    pub fn parse(s: &str) -> Option<Color> {
        parse_color_string(s).map(|[r, g, b, a]| Color::new(r, g, b, a))
    }

    /// Straight components in 0..1.
    pub fn to_straight(&self) -> [f64; 4] {
        if self.a == 0.0 {
            return [0.0, 0.0, 0.0, 0.0];
        }
        [self.r / self.a, self.g / self.a, self.b / self.a, self.a]
    }

    /// Straight components with r, g, b in 0..255, as returned by `to-rgba`.
    pub fn to_rgba(&self) -> [f64; 4] {
        let [r, g, b, a] = self.to_straight();
        [r * 255.0, g * 255.0, b * 255.0, a]
    }

    /// Premultiplied components as `f32`, the form uploaded to shaders.
    pub fn to_array_f32(&self) -> [f32; 4] {
        [self.r as f32, self.g as f32, self.b as f32, self.a as f32]
    }

    pub fn to_lab(&self) -> LabColor {
        let [r, g, b, alpha] = self.to_straight();
        let r = rgb_to_xyz(r);
        let g = rgb_to_xyz(g);
        let b = rgb_to_xyz(b);
        let y = xyz_to_lab((0.2225045 * r + 0.7168786 * g + 0.0606169 * b) / YN);
        let (x, z) = if r == g && g == b {
            (y, y)
        } else {
            (
                xyz_to_lab((0.4360747 * r + 0.3850649 * g + 0.1430804 * b) / XN),
                xyz_to_lab((0.0139322 * r + 0.0971045 * g + 0.7141733 * b) / ZN),
            )
        };
        let l = 116.0 * y - 16.0;
        LabColor {
            l: if l < 0.0 { 0.0 } else { l },
            a: 500.0 * (x - y),
            b: 200.0 * (y - z),
            alpha,
        }
    }

    pub fn from_lab(lab: LabColor) -> Color {
        let y = (lab.l + 16.0) / 116.0;
        let x = if lab.a.is_nan() { y } else { y + lab.a / 500.0 };
        let z = if lab.b.is_nan() { y } else { y - lab.b / 200.0 };
        let y = YN * lab_to_xyz(y);
        let x = XN * lab_to_xyz(x);
        let z = ZN * lab_to_xyz(z);
        Color::new(
            xyz_to_rgb(3.1338561 * x - 1.6168667 * y - 0.4906146 * z),
            xyz_to_rgb(-0.9787684 * x + 1.9161415 * y + 0.0334540 * z),
            xyz_to_rgb(0.0719453 * x - 0.2289914 * y + 1.4052427 * z),
            lab.alpha,
        )
    }

    pub fn to_hcl(&self) -> HclColor {
        let lab = self.to_lab();
        let c = (lab.a * lab.a + lab.b * lab.b).sqrt();
        let h = if (c * 10000.0).round() != 0.0 {
            let h = lab.b.atan2(lab.a) * RAD2DEG;
            if h < 0.0 {
                h + 360.0
            } else {
                h
            }
        } else {
            f64::NAN
        };
        HclColor {
            h,
            c,
            l: lab.l,
            alpha: lab.alpha,
        }
    }

    pub fn from_hcl(hcl: HclColor) -> Color {
        let h = if hcl.h.is_nan() { 0.0 } else { hcl.h * DEG2RAD };
        Color::from_lab(LabColor {
            l: hcl.l,
            a: h.cos() * hcl.c,
            b: h.sin() * hcl.c,
            alpha: hcl.alpha,
        })
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.to_straight();
        write!(
            f,
            "rgba({},{},{},{})",
            (r * 255.0).round(),
            (g * 255.0).round(),
            (b * 255.0).round(),
            crate::style::value::format_number(a)
        )
    }
}

const XN: f64 = 0.96422;
const YN: f64 = 1.0;
const ZN: f64 = 0.82521;
const T0: f64 = 4.0 / 29.0;
const T1: f64 = 6.0 / 29.0;
const T2: f64 = 3.0 * T1 * T1;
const T3: f64 = T1 * T1 * T1;
const DEG2RAD: f64 = PI / 180.0;
const RAD2DEG: f64 = 180.0 / PI;

fn xyz_to_lab(t: f64) -> f64 {
    if t > T3 {
        t.powf(1.0 / 3.0)
    } else {
        t / T2 + T0
    }
}

fn lab_to_xyz(t: f64) -> f64 {
    if t > T1 {
        t * t * t
    } else {
        T2 * (t - T0)
    }
}

fn xyz_to_rgb(x: f64) -> f64 {
    if x <= 0.0031308 {
        12.92 * x
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

fn rgb_to_xyz(x: f64) -> f64 {
    if x <= 0.04045 {
        x / 12.92
    } else {
        ((x + 0.055) / 1.055).powf(2.4)
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Interpolate premultiplied components directly.
pub fn interpolate_rgb(from: &Color, to: &Color, t: f64) -> Color {
    Color::premultiplied(
        lerp(from.r, to.r, t),
        lerp(from.g, to.g, t),
        lerp(from.b, to.b, t),
        lerp(from.a, to.a, t),
    )
}

pub fn interpolate_lab(from: &Color, to: &Color, t: f64) -> Color {
    let a = from.to_lab();
    let b = to.to_lab();
    Color::from_lab(LabColor {
        l: lerp(a.l, b.l, t),
        a: lerp(a.a, b.a, t),
        b: lerp(a.b, b.b, t),
        alpha: lerp(a.alpha, b.alpha, t),
    })
}

/// Interpolate in HCL along the shortest hue arc.
pub fn interpolate_hcl(from: &Color, to: &Color, t: f64) -> Color {
    let a = from.to_hcl();
    let b = to.to_hcl();
    let mut chroma = lerp(a.c, b.c, t);
    let hue = if !a.h.is_nan() && !b.h.is_nan() {
        let mut d = b.h - a.h;
        if b.h > a.h && d > 180.0 {
            d -= 360.0;
        } else if b.h < a.h && a.h - b.h > 180.0 {
            d += 360.0;
        }
        a.h + t * d
    } else if !a.h.is_nan() {
        if b.l == 1.0 || b.l == 0.0 {
            chroma = a.c;
        }
        a.h
    } else if !b.h.is_nan() {
        if a.l == 1.0 || a.l == 0.0 {
            chroma = b.c;
        }
        b.h
    } else {
        f64::NAN
    };
    Color::from_hcl(HclColor {
        h: hue,
        c: chroma,
        l: lerp(a.l, b.l, t),
        alpha: lerp(a.alpha, b.alpha, t),
    })
}

/// Parse a CSS color string to straight RGBA in 0..1.
pub fn parse_color_string(s: &str) -> Option<[f64; 4]> {
    let s = s.trim();

    if s.starts_with('#') {
        return parse_hex_color(s);
    }
    if s.starts_with("rgb") {
        return parse_rgb_color(s);
    }
    if s.starts_with("hsl") {
        return parse_hsl_color(s);
    }

    named_color(&s.to_lowercase())
}

fn named_color(name: &str) -> Option<[f64; 4]> {
    let rgb: [u8; 3] = match name {
        "transparent" => return Some([0.0, 0.0, 0.0, 0.0]),
        "black" => [0, 0, 0],
        "white" => [255, 255, 255],
        "red" => [255, 0, 0],
        "green" => [0, 128, 0],
        "lime" => [0, 255, 0],
        "blue" => [0, 0, 255],
        "navy" => [0, 0, 128],
        "yellow" => [255, 255, 0],
        "cyan" | "aqua" => [0, 255, 255],
        "magenta" | "fuchsia" => [255, 0, 255],
        "gray" | "grey" => [128, 128, 128],
        "silver" => [192, 192, 192],
        "maroon" => [128, 0, 0],
        "olive" => [128, 128, 0],
        "purple" => [128, 0, 128],
        "teal" => [0, 128, 128],
        "orange" => [255, 165, 0],
        "pink" => [255, 192, 203],
        "brown" => [165, 42, 42],
        "gold" => [255, 215, 0],
        "beige" => [245, 245, 220],
        "tan" => [210, 180, 140],
        "salmon" => [250, 128, 114],
        "coral" => [255, 127, 80],
        "khaki" => [240, 230, 140],
        "indigo" => [75, 0, 130],
        "violet" => [238, 130, 238],
        "lightgray" | "lightgrey" => [211, 211, 211],
        "darkgray" | "darkgrey" => [169, 169, 169],
        "lightblue" => [173, 216, 230],
        "darkblue" => [0, 0, 139],
        "lightgreen" => [144, 238, 144],
        "darkgreen" => [0, 100, 0],
        "steelblue" => [70, 130, 180],
        "skyblue" => [135, 206, 235],
        "forestgreen" => [34, 139, 34],
        "crimson" => [220, 20, 60],
        "ivory" => [255, 255, 240],
        "lavender" => [230, 230, 250],
        "whitesmoke" => [245, 245, 245],
        "gainsboro" => [220, 220, 220],
        "dimgray" | "dimgrey" => [105, 105, 105],
        "slategray" | "slategrey" => [112, 128, 144],
        "wheat" => [245, 222, 179],
        _ => return None,
    };
    Some([
        rgb[0] as f64 / 255.0,
        rgb[1] as f64 / 255.0,
        rgb[2] as f64 / 255.0,
        1.0,
    ])
}

fn parse_hex_color(s: &str) -> Option<[f64; 4]> {
    let hex = s.trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>, doubled: bool| -> Option<f64> {
        let digits = &hex[range];
        let value = if doubled {
            u8::from_str_radix(&digits.repeat(2), 16).ok()?
        } else {
            u8::from_str_radix(digits, 16).ok()?
        };
        Some(value as f64 / 255.0)
    };
    match hex.len() {
        3 => Some([channel(0..1, true)?, channel(1..2, true)?, channel(2..3, true)?, 1.0]),
        4 => Some([
            channel(0..1, true)?,
            channel(1..2, true)?,
            channel(2..3, true)?,
            channel(3..4, true)?,
        ]),
        6 => Some([channel(0..2, false)?, channel(2..4, false)?, channel(4..6, false)?, 1.0]),
        8 => Some([
            channel(0..2, false)?,
            channel(2..4, false)?,
            channel(4..6, false)?,
            channel(6..8, false)?,
        ]),
        _ => None,
    }
}

fn function_args<'a>(s: &'a str, names: &[&str]) -> Option<Vec<&'a str>> {
    let mut inner = None;
    for name in names {
        if let Some(rest) = s.strip_prefix(name) {
            if let Some(rest) = rest.trim_start().strip_prefix('(') {
                inner = rest.strip_suffix(')');
                break;
            }
        }
    }
    let parts: Vec<&str> = inner?.split(',').map(|p| p.trim()).collect();
    if parts.len() < 3 || parts.len() > 4 {
        return None;
    }
    Some(parts)
}

fn parse_alpha(part: Option<&&str>) -> Option<f64> {
    match part {
        None => Some(1.0),
        Some(p) => {
            let a = if let Some(pct) = p.strip_suffix('%') {
                pct.parse::<f64>().ok()? / 100.0
            } else {
                p.parse::<f64>().ok()?
            };
            Some(a.clamp(0.0, 1.0))
        }
    }
}

fn parse_rgb_color(s: &str) -> Option<[f64; 4]> {
    let parts = function_args(s, &["rgba", "rgb"])?;

    let percent = parts[0].ends_with('%');
    let mut rgb = [0.0; 3];
    for (i, part) in parts.iter().take(3).enumerate() {
        // Mixing percentages and integers is invalid CSS
        if part.ends_with('%') != percent {
            return None;
        }
        let v: f64 = part.trim_end_matches('%').parse().ok()?;
        rgb[i] = if percent { v / 100.0 } else { v / 255.0 }.clamp(0.0, 1.0);
    }

    let a = parse_alpha(parts.get(3))?;
    Some([rgb[0], rgb[1], rgb[2], a])
}

fn parse_hsl_color(s: &str) -> Option<[f64; 4]> {
    let parts = function_args(s, &["hsla", "hsl"])?;

    let h: f64 = parts[0].parse().ok()?;
    let s_val: f64 = parts[1].strip_suffix('%')?.parse::<f64>().ok()? / 100.0;
    let l: f64 = parts[2].strip_suffix('%')?.parse::<f64>().ok()? / 100.0;
    let a = parse_alpha(parts.get(3))?;

    let h = (((h % 360.0) + 360.0) % 360.0) / 360.0;
    let (r, g, b) = hsl_to_rgb(h, s_val.clamp(0.0, 1.0), l.clamp(0.0, 1.0));
    Some([r, g, b, a])
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 0.5 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: [f64; 4], b: [f64; 4], eps: f64) {
        for i in 0..4 {
            assert!((a[i] - b[i]).abs() < eps, "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn test_parse_hex_colors() {
        assert_eq!(parse_hex_color("#fff"), Some([1.0, 1.0, 1.0, 1.0]));
        assert_eq!(parse_hex_color("#000"), Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(parse_hex_color("#ff0000"), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(parse_hex_color("#00ff00ff"), Some([0.0, 1.0, 0.0, 1.0]));
        assert_eq!(parse_hex_color("#12345"), None);
    }

    #[test]
    fn test_parse_rgb_colors() {
        let rgba = parse_rgb_color("rgb(255, 0, 0)").unwrap();
        assert_close(rgba, [1.0, 0.0, 0.0, 1.0], 1e-9);

        let rgba = parse_rgb_color("rgba(0, 255, 0, 0.5)").unwrap();
        assert_close(rgba, [0.0, 1.0, 0.0, 0.5], 1e-9);

        assert!(parse_rgb_color("rgb(100%, 0, 0)").is_none());
    }

    #[test]
    fn test_parse_hsl() {
        let rgba = parse_color_string("hsl(120, 100%, 50%)").unwrap();
        assert_close(rgba, [0.0, 1.0, 0.0, 1.0], 1e-9);
    }

    #[test]
    fn test_premultiplied_storage() {
        let c = Color::parse("rgba(255, 0, 0, 0.5)").unwrap();
        assert!((c.r - 0.5).abs() < 1e-9);
        assert!((c.a - 0.5).abs() < 1e-9);
        assert_eq!(c.to_string(), "rgba(255,0,0,0.5)");
    }

    #[test]
    fn test_lab_roundtrip_simple() {
        let c = Color::parse("#3388cc").unwrap();
        let back = Color::from_lab(c.to_lab());
        assert_close(back.to_straight(), c.to_straight(), 1.0 / 255.0);
    }

    #[test]
    fn test_hcl_hue_shortest_arc() {
        // red (h ~ 40) to magenta (h ~ 328): shortest arc crosses 0
        let red = Color::parse("red").unwrap();
        let magenta = Color::parse("magenta").unwrap();
        let mid = interpolate_hcl(&red, &magenta, 0.5).to_hcl();
        assert!(mid.h < 40.0 || mid.h > 328.0);
    }

    #[test]
    fn test_gray_has_no_hue() {
        let gray = Color::parse("gray").unwrap();
        assert!(gray.to_hcl().h.is_nan());
    }
}
