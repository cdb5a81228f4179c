//! Property reference: type, default and expression support for each style property.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::{json, Value as JsonValue};

use crate::style::color::Color;
use crate::style::expression::Type;
use crate::style::value::{Formatted, Padding, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Layout,
    Paint,
}

/// Declared value type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Number,
    String,
    Boolean,
    Color,
    Enum,
    Array,
    Formatted,
    ResolvedImage,
    Padding,
}

/// How a property may vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// Zoom-dependent only.
    DataConstant,
    /// Zoom- and feature-dependent.
    DataDriven,
    /// Zoom-dependent, rendered by cross-fading between integer zooms.
    CrossFaded,
    CrossFadedDataDriven,
    /// Neither zoom- nor feature-dependent.
    Constant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpecification {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub value_type: ValueType,
    pub default: Option<JsonValue>,
    pub property_type: PropertyType,
    pub interpolated: bool,
    pub transition: bool,
    /// Allowed values for enums, and for arrays of enums.
    pub values: Option<&'static [&'static str]>,
    /// Item type for arrays.
    pub item_type: Option<ValueType>,
    pub length: Option<usize>,
    /// Whether plain string values may contain `{field}` tokens.
    pub tokens: bool,
}

impl PropertySpecification {
    fn new(name: &'static str, kind: PropertyKind, value_type: ValueType, property_type: PropertyType) -> Self {
        Self {
            name,
            kind,
            value_type,
            default: None,
            property_type,
            interpolated: false,
            transition: false,
            values: None,
            item_type: None,
            length: None,
            tokens: false,
        }
    }

    fn default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }

    fn interpolated(mut self) -> Self {
        self.interpolated = true;
        self
    }

    fn transition(mut self) -> Self {
        self.transition = true;
        self
    }

    fn values(mut self, values: &'static [&'static str]) -> Self {
        self.values = Some(values);
        self
    }

    fn tokens(mut self) -> Self {
        self.tokens = true;
        self
    }

    fn array_of(mut self, item: ValueType, length: Option<usize>) -> Self {
        self.item_type = Some(item);
        self.length = length;
        self
    }

    pub fn supports_zoom_expression(&self) -> bool {
        self.property_type != PropertyType::Constant
    }

    pub fn supports_property_expression(&self) -> bool {
        matches!(
            self.property_type,
            PropertyType::DataDriven | PropertyType::CrossFadedDataDriven
        )
    }

    pub fn supports_interpolation(&self) -> bool {
        self.interpolated
    }

    pub fn is_cross_faded(&self) -> bool {
        matches!(
            self.property_type,
            PropertyType::CrossFaded | PropertyType::CrossFadedDataDriven
        )
    }

    /// Expected expression type.
    pub fn expected_type(&self) -> Type {
        fn scalar(t: ValueType) -> Type {
            match t {
                ValueType::Number => Type::Number,
                ValueType::String | ValueType::Enum => Type::String,
                ValueType::Boolean => Type::Boolean,
                ValueType::Color => Type::Color,
                ValueType::Formatted => Type::Formatted,
                ValueType::ResolvedImage => Type::ResolvedImage,
                ValueType::Padding => Type::Padding,
                ValueType::Array => Type::Value,
            }
        }
        match self.value_type {
            ValueType::Array => Type::Array {
                item: Box::new(self.item_type.map_or(Type::Value, scalar)),
                n: self.length,
            },
            other => scalar(other),
        }
    }

    /// Default as a runtime value; null when the property has none.
    pub fn default_value(&self) -> Value {
        let Some(default) = &self.default else {
            return Value::Null;
        };
        match self.value_type {
            ValueType::Color => default
                .as_str()
                .and_then(Color::parse)
                .map(Value::Color)
                .unwrap_or(Value::Null),
            ValueType::Padding => Padding::parse(&Value::from_json(default))
                .map(Value::Padding)
                .unwrap_or(Value::Null),
            ValueType::Formatted => {
                Value::Formatted(Formatted::from_string(default.as_str().unwrap_or_default()))
            }
            _ => Value::from_json(default),
        }
    }
}

const ANCHORS: &[&str] = &[
    "center",
    "left",
    "right",
    "top",
    "bottom",
    "top-left",
    "top-right",
    "bottom-left",
    "bottom-right",
];
const ALIGNMENTS: &[&str] = &["map", "viewport", "auto"];
const TRANSLATE_ANCHORS: &[&str] = &["map", "viewport"];
const OVERLAP_MODES: &[&str] = &["never", "always", "cooperative"];

fn build_table() -> HashMap<&'static str, PropertySpecification> {
    use PropertyKind::{Layout, Paint};
    use PropertyType::{Constant, CrossFaded, CrossFadedDataDriven, DataConstant, DataDriven};
    use ValueType as V;
    let p = PropertySpecification::new;

    let specs = vec![
        p("visibility", Layout, V::Enum, Constant)
            .values(&["visible", "none"])
            .default(json!("visible")),
        // symbol layout
        p("symbol-placement", Layout, V::Enum, DataConstant)
            .values(&["point", "line", "line-center"])
            .default(json!("point")),
        p("symbol-spacing", Layout, V::Number, DataConstant).default(json!(250)).interpolated(),
        p("symbol-avoid-edges", Layout, V::Boolean, DataConstant).default(json!(false)),
        p("symbol-sort-key", Layout, V::Number, DataDriven),
        p("symbol-z-order", Layout, V::Enum, DataConstant)
            .values(&["auto", "viewport-y", "source"])
            .default(json!("auto")),
        p("icon-allow-overlap", Layout, V::Boolean, DataConstant).default(json!(false)),
        p("icon-overlap", Layout, V::Enum, DataConstant).values(OVERLAP_MODES),
        p("icon-ignore-placement", Layout, V::Boolean, DataConstant).default(json!(false)),
        p("icon-optional", Layout, V::Boolean, DataConstant).default(json!(false)),
        p("icon-rotation-alignment", Layout, V::Enum, DataConstant)
            .values(ALIGNMENTS)
            .default(json!("auto")),
        p("icon-size", Layout, V::Number, DataDriven).default(json!(1)).interpolated(),
        p("icon-text-fit", Layout, V::Enum, DataConstant)
            .values(&["none", "width", "height", "both"])
            .default(json!("none")),
        p("icon-text-fit-padding", Layout, V::Array, DataConstant)
            .array_of(V::Number, Some(4))
            .default(json!([0, 0, 0, 0]))
            .interpolated(),
        p("icon-image", Layout, V::ResolvedImage, DataDriven).tokens(),
        p("icon-rotate", Layout, V::Number, DataDriven).default(json!(0)).interpolated(),
        p("icon-padding", Layout, V::Padding, DataDriven).default(json!([2])).interpolated(),
        p("icon-keep-upright", Layout, V::Boolean, DataConstant).default(json!(false)),
        p("icon-offset", Layout, V::Array, DataDriven)
            .array_of(V::Number, Some(2))
            .default(json!([0, 0]))
            .interpolated(),
        p("icon-anchor", Layout, V::Enum, DataDriven).values(ANCHORS).default(json!("center")),
        p("icon-pitch-alignment", Layout, V::Enum, DataConstant)
            .values(ALIGNMENTS)
            .default(json!("auto")),
        p("text-pitch-alignment", Layout, V::Enum, DataConstant)
            .values(ALIGNMENTS)
            .default(json!("auto")),
        p("text-rotation-alignment", Layout, V::Enum, DataConstant)
            .values(&["map", "viewport", "viewport-glyph", "auto"])
            .default(json!("auto")),
        p("text-field", Layout, V::Formatted, DataDriven).default(json!("")).tokens(),
        p("text-font", Layout, V::Array, DataDriven)
            .array_of(V::String, None)
            .default(json!(["Open Sans Regular", "Arial Unicode MS Regular"])),
        p("text-size", Layout, V::Number, DataDriven).default(json!(16)).interpolated(),
        p("text-max-width", Layout, V::Number, DataDriven).default(json!(10)).interpolated(),
        p("text-line-height", Layout, V::Number, DataConstant).default(json!(1.2)).interpolated(),
        p("text-letter-spacing", Layout, V::Number, DataDriven).default(json!(0)).interpolated(),
        p("text-justify", Layout, V::Enum, DataDriven)
            .values(&["auto", "left", "center", "right"])
            .default(json!("center")),
        p("text-radial-offset", Layout, V::Number, DataDriven).default(json!(0)).interpolated(),
        p("text-variable-anchor", Layout, V::Array, DataConstant)
            .array_of(V::Enum, None)
            .values(ANCHORS),
        p("text-anchor", Layout, V::Enum, DataDriven).values(ANCHORS).default(json!("center")),
        p("text-max-angle", Layout, V::Number, DataConstant).default(json!(45)).interpolated(),
        p("text-writing-mode", Layout, V::Array, DataConstant)
            .array_of(V::Enum, None)
            .values(&["horizontal", "vertical"]),
        p("text-rotate", Layout, V::Number, DataDriven).default(json!(0)).interpolated(),
        p("text-padding", Layout, V::Number, DataConstant).default(json!(2)).interpolated(),
        p("text-keep-upright", Layout, V::Boolean, DataConstant).default(json!(true)),
        p("text-transform", Layout, V::Enum, DataDriven)
            .values(&["none", "uppercase", "lowercase"])
            .default(json!("none")),
        p("text-offset", Layout, V::Array, DataDriven)
            .array_of(V::Number, Some(2))
            .default(json!([0, 0]))
            .interpolated(),
        p("text-allow-overlap", Layout, V::Boolean, DataConstant).default(json!(false)),
        p("text-overlap", Layout, V::Enum, DataConstant).values(OVERLAP_MODES),
        p("text-ignore-placement", Layout, V::Boolean, DataConstant).default(json!(false)),
        p("text-optional", Layout, V::Boolean, DataConstant).default(json!(false)),
        // symbol paint
        p("icon-opacity", Paint, V::Number, DataDriven).default(json!(1)).interpolated().transition(),
        p("icon-color", Paint, V::Color, DataDriven).default(json!("#000000")).interpolated().transition(),
        p("icon-halo-color", Paint, V::Color, DataDriven)
            .default(json!("rgba(0, 0, 0, 0)"))
            .interpolated()
            .transition(),
        p("icon-halo-width", Paint, V::Number, DataDriven).default(json!(0)).interpolated().transition(),
        p("icon-halo-blur", Paint, V::Number, DataDriven).default(json!(0)).interpolated().transition(),
        p("icon-translate", Paint, V::Array, DataConstant)
            .array_of(V::Number, Some(2))
            .default(json!([0, 0]))
            .interpolated()
            .transition(),
        p("icon-translate-anchor", Paint, V::Enum, DataConstant)
            .values(TRANSLATE_ANCHORS)
            .default(json!("map")),
        p("text-opacity", Paint, V::Number, DataDriven).default(json!(1)).interpolated().transition(),
        p("text-color", Paint, V::Color, DataDriven).default(json!("#000000")).interpolated().transition(),
        p("text-halo-color", Paint, V::Color, DataDriven)
            .default(json!("rgba(0, 0, 0, 0)"))
            .interpolated()
            .transition(),
        p("text-halo-width", Paint, V::Number, DataDriven).default(json!(0)).interpolated().transition(),
        p("text-halo-blur", Paint, V::Number, DataDriven).default(json!(0)).interpolated().transition(),
        p("text-translate", Paint, V::Array, DataConstant)
            .array_of(V::Number, Some(2))
            .default(json!([0, 0]))
            .interpolated()
            .transition(),
        p("text-translate-anchor", Paint, V::Enum, DataConstant)
            .values(TRANSLATE_ANCHORS)
            .default(json!("map")),
        // line
        p("line-cap", Layout, V::Enum, DataConstant)
            .values(&["butt", "round", "square"])
            .default(json!("butt")),
        p("line-join", Layout, V::Enum, DataDriven)
            .values(&["bevel", "round", "miter"])
            .default(json!("miter")),
        p("line-miter-limit", Layout, V::Number, DataConstant).default(json!(2)).interpolated(),
        p("line-round-limit", Layout, V::Number, DataConstant).default(json!(1.05)).interpolated(),
        p("line-sort-key", Layout, V::Number, DataDriven),
        p("line-opacity", Paint, V::Number, DataDriven).default(json!(1)).interpolated().transition(),
        p("line-color", Paint, V::Color, DataDriven).default(json!("#000000")).interpolated().transition(),
        p("line-translate", Paint, V::Array, DataConstant)
            .array_of(V::Number, Some(2))
            .default(json!([0, 0]))
            .interpolated()
            .transition(),
        p("line-translate-anchor", Paint, V::Enum, DataConstant)
            .values(TRANSLATE_ANCHORS)
            .default(json!("map")),
        p("line-width", Paint, V::Number, DataDriven).default(json!(1)).interpolated().transition(),
        p("line-gap-width", Paint, V::Number, DataDriven).default(json!(0)).interpolated().transition(),
        p("line-offset", Paint, V::Number, DataDriven).default(json!(0)).interpolated().transition(),
        p("line-blur", Paint, V::Number, DataDriven).default(json!(0)).interpolated().transition(),
        p("line-dasharray", Paint, V::Array, CrossFaded)
            .array_of(V::Number, None)
            .transition(),
        p("line-pattern", Paint, V::ResolvedImage, CrossFadedDataDriven).transition(),
        // fill
        p("fill-sort-key", Layout, V::Number, DataDriven),
        p("fill-antialias", Paint, V::Boolean, DataConstant).default(json!(true)),
        p("fill-opacity", Paint, V::Number, DataDriven).default(json!(1)).interpolated().transition(),
        p("fill-color", Paint, V::Color, DataDriven).default(json!("#000000")).interpolated().transition(),
        p("fill-outline-color", Paint, V::Color, DataDriven).interpolated().transition(),
        p("fill-translate", Paint, V::Array, DataConstant)
            .array_of(V::Number, Some(2))
            .default(json!([0, 0]))
            .interpolated()
            .transition(),
        p("fill-translate-anchor", Paint, V::Enum, DataConstant)
            .values(TRANSLATE_ANCHORS)
            .default(json!("map")),
        p("fill-pattern", Paint, V::ResolvedImage, CrossFadedDataDriven).transition(),
        // circle
        p("circle-sort-key", Layout, V::Number, DataDriven),
        p("circle-radius", Paint, V::Number, DataDriven).default(json!(5)).interpolated().transition(),
        p("circle-color", Paint, V::Color, DataDriven).default(json!("#000000")).interpolated().transition(),
        p("circle-blur", Paint, V::Number, DataDriven).default(json!(0)).interpolated().transition(),
        p("circle-opacity", Paint, V::Number, DataDriven).default(json!(1)).interpolated().transition(),
        p("circle-translate", Paint, V::Array, DataConstant)
            .array_of(V::Number, Some(2))
            .default(json!([0, 0]))
            .interpolated()
            .transition(),
        p("circle-translate-anchor", Paint, V::Enum, DataConstant)
            .values(TRANSLATE_ANCHORS)
            .default(json!("map")),
        p("circle-pitch-scale", Paint, V::Enum, DataConstant)
            .values(TRANSLATE_ANCHORS)
            .default(json!("map")),
        p("circle-pitch-alignment", Paint, V::Enum, DataConstant)
            .values(TRANSLATE_ANCHORS)
            .default(json!("viewport")),
        p("circle-stroke-width", Paint, V::Number, DataDriven).default(json!(0)).interpolated().transition(),
        p("circle-stroke-color", Paint, V::Color, DataDriven)
            .default(json!("#000000"))
            .interpolated()
            .transition(),
        p("circle-stroke-opacity", Paint, V::Number, DataDriven).default(json!(1)).interpolated().transition(),
        // background
        p("background-color", Paint, V::Color, DataConstant)
            .default(json!("#000000"))
            .interpolated()
            .transition(),
        p("background-pattern", Paint, V::ResolvedImage, CrossFaded).transition(),
        p("background-opacity", Paint, V::Number, DataConstant).default(json!(1)).interpolated().transition(),
    ];

    specs.into_iter().map(|spec| (spec.name, spec)).collect()
}

fn table() -> &'static HashMap<&'static str, PropertySpecification> {
    static TABLE: OnceLock<HashMap<&'static str, PropertySpecification>> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

/// Look up a property by name.
pub fn property_spec(name: &str) -> Option<&'static PropertySpecification> {
    table().get(name)
}

/// Names of every property of `kind` whose name starts with `prefix`.
pub fn property_names(kind: PropertyKind, prefix: &str) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = table()
        .values()
        .filter(|spec| spec.kind == kind && spec.name.starts_with(prefix))
        .map(|spec| spec.name)
        .collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_types() {
        assert_eq!(property_spec("text-size").unwrap().expected_type(), Type::Number);
        assert_eq!(property_spec("text-anchor").unwrap().expected_type(), Type::String);
        assert_eq!(
            property_spec("text-offset").unwrap().expected_type(),
            Type::array_n(Type::Number, 2)
        );
        assert_eq!(
            property_spec("text-font").unwrap().expected_type(),
            Type::array(Type::String)
        );
    }

    #[test]
    fn test_defaults() {
        assert_eq!(property_spec("text-size").unwrap().default_value(), Value::Number(16.0));
        assert_eq!(
            property_spec("text-color").unwrap().default_value(),
            Value::Color(Color::BLACK)
        );
        assert_eq!(
            property_spec("icon-padding").unwrap().default_value(),
            Value::Padding(Padding::uniform(2.0))
        );
        assert_eq!(property_spec("icon-image").unwrap().default_value(), Value::Null);
    }

    #[test]
    fn test_expression_support() {
        let spacing = property_spec("symbol-spacing").unwrap();
        assert!(spacing.supports_zoom_expression());
        assert!(!spacing.supports_property_expression());
        let visibility = property_spec("visibility").unwrap();
        assert!(!visibility.supports_zoom_expression());
        assert!(property_spec("line-dasharray").unwrap().is_cross_faded());
    }

    #[test]
    fn test_property_names_by_prefix() {
        let names = property_names(PropertyKind::Paint, "text-");
        assert!(names.contains(&"text-color"));
        assert!(!names.contains(&"text-size"));
    }
}
