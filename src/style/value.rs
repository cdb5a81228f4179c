//! Runtime values produced by style expressions.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

use crate::style::collator::Collator;
use crate::style::color::Color;
use crate::style::expression::types::Type;

/// Feature properties and feature-state maps.
pub type PropertyMap = BTreeMap<String, Value>;

/// A value computed by an expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Color(Color),
    Array(Vec<Value>),
    Object(PropertyMap),
    Formatted(Formatted),
    Padding(Padding),
    ResolvedImage(ResolvedImage),
    Collator(Collator),
}

impl Value {
    /// Convert a JSON literal. Strings stay strings; color parsing happens
    /// only where a color is expected.
    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null | Value::Collator(_) => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Color(c) => JsonValue::String(c.to_string()),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => JsonValue::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Formatted(f) => JsonValue::String(f.to_string()),
            Value::Padding(p) => JsonValue::Array(p.to_array().iter().map(|v| number_to_json(*v)).collect()),
            Value::ResolvedImage(img) => JsonValue::String(img.name.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<&Color> {
        match self {
            Value::Color(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric array, or `None` if any item is not a number.
    pub fn as_number_array(&self) -> Option<Vec<f64>> {
        self.as_array()?.iter().map(Value::as_f64).collect()
    }

    /// String conversion used by `to-string`, `concat` and `format`.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Color(c) => c.to_string(),
            Value::Formatted(f) => f.to_string(),
            Value::Padding(p) => {
                let parts: Vec<String> = p.to_array().iter().map(|v| format_number(*v)).collect();
                format!("[{}]", parts.join(","))
            }
            Value::ResolvedImage(img) => img.name.clone(),
            Value::Array(_) | Value::Object(_) | Value::Collator(_) => {
                let mut out = String::new();
                write_json(self, &mut out);
                out
            }
        }
    }

    /// Truthiness used by `to-boolean`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Numeric conversion used by `to-number`; NaN when not convertible.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return 0.0;
                }
                match trimmed {
                    "Infinity" | "+Infinity" => f64::INFINITY,
                    "-Infinity" => f64::NEG_INFINITY,
                    _ if trimmed.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => {
                        f64::NAN
                    }
                    _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
                }
            }
            _ => f64::NAN,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

/// Runtime type of a value, as reported by `typeof` and used by assertions.
pub fn type_of(value: &Value) -> Type {
    match value {
        Value::Null => Type::Null,
        Value::Bool(_) => Type::Boolean,
        Value::Number(_) => Type::Number,
        Value::String(_) => Type::String,
        Value::Color(_) => Type::Color,
        Value::Object(_) => Type::Object,
        Value::Formatted(_) => Type::Formatted,
        Value::Padding(_) => Type::Padding,
        Value::ResolvedImage(_) => Type::ResolvedImage,
        Value::Collator(_) => Type::Collator,
        Value::Array(items) => {
            let mut item_type: Option<Type> = None;
            for item in items {
                let t = type_of(item);
                match &item_type {
                    None => item_type = Some(t),
                    // Nested arrays never unify; their item type degrades to value
                    Some(existing) if *existing == t && !matches!(t, Type::Array { .. }) => {}
                    Some(_) => {
                        item_type = Some(Type::Value);
                        break;
                    }
                }
            }
            Type::array_n(item_type.unwrap_or(Type::Value), items.len())
        }
    }
}

/// Integral values serialize without a fractional part; non-finite ones as null.
fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < 9007199254740992.0 {
        return JsonValue::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Format a number the way JavaScript's `String(n)` does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if !(1e-6..1e21).contains(&abs) {
        let s = format!("{:e}", n);
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        };
    }
    format!("{}", n)
}

fn write_json(value: &Value, out: &mut String) {
    match value {
        Value::Null | Value::Collator(_) => out.push_str("null"),
        Value::Number(n) if !n.is_finite() => out.push_str("null"),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String(k.clone()).to_string());
                out.push(':');
                write_json(v, out);
            }
            out.push('}');
        }
        Value::String(s) => out.push_str(&JsonValue::String(s.clone()).to_string()),
        other => {
            let text = other.to_display_string();
            match other {
                Value::Bool(_) | Value::Number(_) | Value::Padding(_) => out.push_str(&text),
                _ => out.push_str(&JsonValue::String(text).to_string()),
            }
        }
    }
}

/// Padding in pixels, following CSS shorthand order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Padding {
    pub fn uniform(v: f64) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    /// Parse from a number or a 1 to 4 element number array.
    pub fn parse(value: &Value) -> Option<Padding> {
        match value {
            Value::Padding(p) => Some(*p),
            Value::Number(n) => Some(Padding::uniform(*n)),
            Value::Array(_) => {
                let values = value.as_number_array()?;
                let (top, right, bottom, left) = match values.as_slice() {
                    [a] => (*a, *a, *a, *a),
                    [a, b] => (*a, *b, *a, *b),
                    [a, b, c] => (*a, *b, *c, *b),
                    [a, b, c, d] => (*a, *b, *c, *d),
                    _ => return None,
                };
                Some(Padding {
                    top,
                    right,
                    bottom,
                    left,
                })
            }
            _ => None,
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.top, self.right, self.bottom, self.left]
    }

    pub fn interpolate(from: &Padding, to: &Padding, t: f64) -> Padding {
        let lerp = |a: f64, b: f64| a + (b - a) * t;
        Padding {
            top: lerp(from.top, to.top),
            right: lerp(from.right, to.right),
            bottom: lerp(from.bottom, to.bottom),
            left: lerp(from.left, to.left),
        }
    }
}

/// Image reference with its availability at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub name: String,
    pub available: bool,
}

impl ResolvedImage {
    /// `None` for the empty name.
    pub fn from_name(name: &str) -> Option<ResolvedImage> {
        if name.is_empty() {
            return None;
        }
        Some(ResolvedImage {
            name: name.to_string(),
            available: false,
        })
    }
}

/// One run of formatted text, optionally replaced by an inline image.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedSection {
    pub text: String,
    pub image: Option<ResolvedImage>,
    pub scale: Option<f64>,
    /// Comma-joined font stack.
    pub font_stack: Option<String>,
    pub text_color: Option<Color>,
}

impl FormattedSection {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
            scale: None,
            font_stack: None,
            text_color: None,
        }
    }
}

/// Rich text produced by `format` or coerced from a string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Formatted {
    pub sections: Vec<FormattedSection>,
}

impl Formatted {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self {
            sections: vec![FormattedSection::text(s)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections
            .iter()
            .all(|s| s.text.is_empty() && s.image.as_ref().map_or(true, |img| img.name.is_empty()))
    }
}

impl fmt::Display for Formatted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in &self.sections {
            f.write_str(&section.text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_number_like_js() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
    }

    #[test]
    fn test_type_of_arrays() {
        let v = Value::from_json(&json!([1, 2, 3]));
        assert_eq!(type_of(&v), Type::array_n(Type::Number, 3));
        let v = Value::from_json(&json!([1, "a"]));
        assert_eq!(type_of(&v), Type::array_n(Type::Value, 2));
        let v = Value::from_json(&json!([]));
        assert_eq!(type_of(&v), Type::array_n(Type::Value, 0));
    }

    #[test]
    fn test_display_string() {
        assert_eq!(Value::Null.to_display_string(), "");
        assert_eq!(Value::from_json(&json!([1, "a", null])).to_display_string(), "[1,\"a\",null]");
        assert_eq!(Value::from_json(&json!({"b": 2})).to_display_string(), "{\"b\":2}");
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::from("  12.5 ").to_number(), 12.5);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("12px").to_number().is_nan());
        assert_eq!(Value::Bool(true).to_number(), 1.0);
    }

    #[test]
    fn test_padding_shorthand() {
        let p = Padding::parse(&Value::from_json(&json!([1, 2, 3]))).unwrap();
        assert_eq!(p.to_array(), [1.0, 2.0, 3.0, 2.0]);
        assert!(Padding::parse(&Value::from_json(&json!([1, 2, 3, 4, 5]))).is_none());
        assert_eq!(Padding::parse(&Value::Number(2.0)), Some(Padding::uniform(2.0)));
    }

    #[test]
    fn test_formatted_empty() {
        assert!(Formatted::from_string("").is_empty());
        assert!(!Formatted::from_string("a").is_empty());
        assert_eq!(Formatted::from_string("abc").to_string(), "abc");
    }
}
