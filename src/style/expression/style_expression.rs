//! Compiled property expressions: defaults, enum checks and zoom classification.

use std::cell::RefCell;
use std::collections::HashSet;

use serde_json::Value as JsonValue;

use super::interpolate::{self, Interpolation};
use super::parser::{ParsingContext, TypeAnnotation};
use super::{
    is_feature_constant, is_global_property_constant, is_state_constant, Builtin, EvalResult,
    EvaluationContext, EvaluationError, Expression, ParseError,
};
use crate::style::spec::{PropertySpecification, ValueType};
use crate::style::value::Value;

const ZOOM_CURVE_PLACEMENT: &str =
    "\"zoom\" expression may only be used as input to a top-level \"step\" or \"interpolate\" expression.";
const ZOOM_CURVE_UNIQUE: &str =
    "Only one zoom-based \"step\" or \"interpolate\" subexpression may be used in an expression.";

/// A compiled expression bound to the property it styles.
///
/// Evaluation errors fall back to the property default and are logged once
/// per distinct message.
#[derive(Debug)]
pub struct StyleExpression {
    expression: Expression,
    default: Value,
    enum_values: Option<&'static [&'static str]>,
    warnings: RefCell<HashSet<String>>,
}

impl StyleExpression {
    pub fn new(expression: Expression, spec: Option<&PropertySpecification>) -> Self {
        Self {
            expression,
            default: spec.map(PropertySpecification::default_value).unwrap_or_default(),
            enum_values: spec
                .filter(|spec| spec.value_type == ValueType::Enum)
                .and_then(|spec| spec.values),
            warnings: RefCell::new(HashSet::new()),
        }
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn is_state_dependent(&self) -> bool {
        !is_state_constant(&self.expression)
    }

    pub fn evaluate_without_error_handling(&self, ctx: &EvaluationContext) -> EvalResult {
        self.expression.evaluate(ctx)
    }

    pub fn evaluate(&self, ctx: &EvaluationContext) -> Value {
        match self.checked(ctx) {
            Ok(Value::Null) => self.default.clone(),
            Ok(Value::Number(n)) if n.is_nan() => self.default.clone(),
            Ok(value) => value,
            Err(err) => {
                if self.warnings.borrow_mut().insert(err.0.clone()) {
                    log::warn!("{}", err);
                }
                self.default.clone()
            }
        }
    }

    fn checked(&self, ctx: &EvaluationContext) -> EvalResult {
        let value = self.expression.evaluate(ctx)?;
        let Some(allowed) = self.enum_values else {
            return Ok(value);
        };
        match &value {
            Value::Null => Ok(value),
            Value::Number(n) if n.is_nan() => Ok(value),
            Value::String(s) if allowed.contains(&s.as_str()) => Ok(value),
            other => Err(EvaluationError::new(format!(
                "Expected value to be one of {}, but found {} instead.",
                allowed
                    .iter()
                    .map(|v| format!("\"{}\"", v))
                    .collect::<Vec<_>>()
                    .join(", "),
                other.to_json()
            ))),
        }
    }
}

/// Compile `json` against an optional property specification.
pub fn create_expression(
    json: &JsonValue,
    spec: Option<&PropertySpecification>,
) -> Result<StyleExpression, Vec<ParseError>> {
    let ctx = ParsingContext::new(spec.map(PropertySpecification::expected_type));
    let annotation = spec
        .filter(|spec| spec.value_type == ValueType::String)
        .map(|_| TypeAnnotation::Coerce);
    match ctx.parse(json, annotation) {
        Some(expr) if !ctx.has_errors() => Ok(StyleExpression::new(expr, spec)),
        _ => Err(ctx.errors()),
    }
}

/// How a property expression depends on zoom and feature data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionKind {
    Constant,
    Source,
    Camera,
    Composite,
}

#[derive(Debug)]
pub struct StylePropertyExpression {
    kind: ExpressionKind,
    expression: StyleExpression,
    zoom_stops: Vec<f64>,
    interpolation: Option<Interpolation>,
}

impl StylePropertyExpression {
    pub fn kind(&self) -> ExpressionKind {
        self.kind
    }

    pub fn style_expression(&self) -> &StyleExpression {
        &self.expression
    }

    pub fn expression(&self) -> &Expression {
        self.expression.expression()
    }

    /// Stop inputs of the top-level zoom curve; empty for zoom-constant kinds.
    pub fn zoom_stops(&self) -> &[f64] {
        &self.zoom_stops
    }

    pub fn interpolation(&self) -> Option<&Interpolation> {
        self.interpolation.as_ref()
    }

    pub fn is_feature_constant(&self) -> bool {
        matches!(self.kind, ExpressionKind::Constant | ExpressionKind::Camera)
    }

    pub fn is_zoom_constant(&self) -> bool {
        matches!(self.kind, ExpressionKind::Constant | ExpressionKind::Source)
    }

    pub fn is_state_dependent(&self) -> bool {
        self.expression.is_state_dependent()
    }

    pub fn evaluate(&self, ctx: &EvaluationContext) -> Value {
        self.expression.evaluate(ctx)
    }

    pub fn evaluate_without_error_handling(&self, ctx: &EvaluationContext) -> EvalResult {
        self.expression.evaluate_without_error_handling(ctx)
    }

    /// Position of `input` between two zoom stops; 0 for step curves.
    pub fn interpolation_factor(&self, input: f64, lower: f64, upper: f64) -> f64 {
        match &self.interpolation {
            Some(interpolation) => {
                interpolate::interpolation_factor(interpolation, input, lower, upper)
            }
            None => 0.0,
        }
    }
}

/// Compile `json` for a property, checking its zoom and data dependencies.
pub fn create_property_expression(
    json: &JsonValue,
    spec: &PropertySpecification,
) -> Result<StylePropertyExpression, Vec<ParseError>> {
    let expression = create_expression(json, Some(spec))?;
    let parsed = expression.expression();

    let feature_constant = is_feature_constant(parsed);
    if !feature_constant && !spec.supports_property_expression() {
        return Err(vec![ParseError::new("", "data expressions not supported")]);
    }

    let zoom_constant = is_global_property_constant(parsed, &["zoom"]);
    if !zoom_constant && !spec.supports_zoom_expression() {
        return Err(vec![ParseError::new("", "zoom expressions not supported")]);
    }

    let curve = find_zoom_curve(parsed).map_err(|err| vec![err])?;
    let Some(curve) = curve else {
        if !zoom_constant {
            return Err(vec![ParseError::new("", ZOOM_CURVE_PLACEMENT)]);
        }
        let kind = if feature_constant {
            ExpressionKind::Constant
        } else {
            ExpressionKind::Source
        };
        return Ok(StylePropertyExpression {
            kind,
            expression,
            zoom_stops: Vec::new(),
            interpolation: None,
        });
    };

    let (zoom_stops, interpolation) = match curve {
        Expression::Interpolate {
            interpolation,
            stops,
            ..
        } => {
            if !spec.supports_interpolation() {
                return Err(vec![ParseError::new(
                    "",
                    "\"interpolate\" expressions cannot be used with this property",
                )]);
            }
            (stops.iter().map(|(label, _)| *label).collect(), Some(*interpolation))
        }
        Expression::Step { stops, .. } => (stops.iter().map(|(label, _)| *label).collect(), None),
        _ => (Vec::new(), None),
    };

    let kind = if feature_constant {
        ExpressionKind::Camera
    } else {
        ExpressionKind::Composite
    };
    Ok(StylePropertyExpression {
        kind,
        expression,
        zoom_stops,
        interpolation,
    })
}

fn is_zoom_input(input: &Expression) -> bool {
    matches!(
        input,
        Expression::Compound {
            op: Builtin::Zoom,
            ..
        }
    )
}

/// Locate the single top-level `step`/`interpolate` whose input is `["zoom"]`.
pub fn find_zoom_curve(expr: &Expression) -> Result<Option<&Expression>, ParseError> {
    let mut result: Result<Option<&Expression>, ParseError> = match expr {
        Expression::Let { result, .. } => find_zoom_curve(result),
        Expression::Coalesce { args, .. } => {
            let mut found = Ok(None);
            for arg in args {
                found = find_zoom_curve(arg);
                if !matches!(found, Ok(None)) {
                    break;
                }
            }
            found
        }
        Expression::Step { input, .. } | Expression::Interpolate { input, .. }
            if is_zoom_input(input) =>
        {
            Ok(Some(expr))
        }
        _ => Ok(None),
    };

    if result.is_err() {
        return result;
    }

    expr.each_child(&mut |child| {
        match find_zoom_curve(child) {
            Err(err) => result = Err(err),
            Ok(Some(found)) => match result {
                Ok(None) => result = Err(ParseError::new("", ZOOM_CURVE_PLACEMENT)),
                Ok(Some(current)) if !std::ptr::eq(current, found) => {
                    result = Err(ParseError::new("", ZOOM_CURVE_UNIQUE))
                }
                _ => {}
            },
            Ok(None) => {}
        }
    });

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::color::Color;
    use crate::style::expression::{Feature, GeometryType, GlobalProperties};
    use crate::style::spec::property_spec;
    use crate::style::value::PropertyMap;
    use serde_json::json;

    fn spec(name: &str) -> &'static PropertySpecification {
        property_spec(name).unwrap()
    }

    fn messages(result: Result<StylePropertyExpression, Vec<ParseError>>) -> Vec<String> {
        match result {
            Ok(_) => panic!("expected errors"),
            Err(errors) => errors.into_iter().map(|e| e.message).collect(),
        }
    }

    #[test]
    fn test_classification() {
        let constant = create_property_expression(&json!(["+", 1, 2]), spec("text-size")).unwrap();
        assert_eq!(constant.kind(), ExpressionKind::Constant);

        let source = create_property_expression(&json!(["get", "size"]), spec("text-size")).unwrap();
        assert_eq!(source.kind(), ExpressionKind::Source);

        let camera = create_property_expression(
            &json!(["interpolate", ["linear"], ["zoom"], 0, 10, 10, 20]),
            spec("text-size"),
        )
        .unwrap();
        assert_eq!(camera.kind(), ExpressionKind::Camera);
        assert_eq!(camera.zoom_stops(), &[0.0, 10.0]);
        assert!((camera.interpolation_factor(5.0, 0.0, 10.0) - 0.5).abs() < 1e-9);

        let composite = create_property_expression(
            &json!(["step", ["zoom"], ["get", "a"], 10, ["get", "b"]]),
            spec("text-size"),
        )
        .unwrap();
        assert_eq!(composite.kind(), ExpressionKind::Composite);
        assert_eq!(composite.interpolation_factor(5.0, 0.0, 10.0), 0.0);
    }

    #[test]
    fn test_zoom_curve_must_be_top_level() {
        let errors = messages(create_property_expression(
            &json!(["+", 1, ["interpolate", ["linear"], ["zoom"], 0, 1, 10, 2]]),
            spec("text-size"),
        ));
        assert_eq!(errors, vec![ZOOM_CURVE_PLACEMENT.to_string()]);

        let errors = messages(create_property_expression(&json!(["zoom"]), spec("text-size")));
        assert_eq!(errors, vec![ZOOM_CURVE_PLACEMENT.to_string()]);
    }

    #[test]
    fn test_zoom_curve_inside_let_and_coalesce() {
        let via_let = create_property_expression(
            &json!(["let", "a", 1, ["interpolate", ["linear"], ["zoom"], 0, ["var", "a"], 10, 2]]),
            spec("text-size"),
        )
        .unwrap();
        assert_eq!(via_let.kind(), ExpressionKind::Camera);

        let via_coalesce = create_property_expression(
            &json!(["coalesce", ["step", ["zoom"], 1, 5, 2], 0]),
            spec("text-size"),
        )
        .unwrap();
        assert_eq!(via_coalesce.zoom_stops()[1], 5.0);
    }

    #[test]
    fn test_property_support_checks() {
        let errors = messages(create_property_expression(
            &json!(["get", "spacing"]),
            spec("symbol-spacing"),
        ));
        assert_eq!(errors, vec!["data expressions not supported".to_string()]);

        let errors = messages(create_property_expression(
            &json!(["step", ["zoom"], "visible", 5, "none"]),
            spec("visibility"),
        ));
        assert_eq!(errors, vec!["zoom expressions not supported".to_string()]);

        let errors = messages(create_property_expression(
            &json!(["interpolate", ["linear"], ["zoom"], 0, "a", 10, "b"]),
            spec("text-anchor"),
        ));
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_evaluate_falls_back_to_default() {
        let expr = create_expression(&json!(["get", "size"]), Some(spec("text-size"))).unwrap();
        let feature = Feature::new(GeometryType::Point, PropertyMap::new());
        let ctx = EvaluationContext::new(GlobalProperties::at_zoom(1.0)).with_feature(&feature);
        assert_eq!(expr.evaluate(&ctx), Value::Number(16.0));

        let mut props = PropertyMap::new();
        props.insert("size".into(), Value::String("big".into()));
        let feature = Feature::new(GeometryType::Point, props);
        let ctx = EvaluationContext::new(GlobalProperties::at_zoom(1.0)).with_feature(&feature);
        assert!(expr.evaluate_without_error_handling(&ctx).is_err());
        assert_eq!(expr.evaluate(&ctx), Value::Number(16.0));
        assert_eq!(expr.warnings.borrow().len(), 1);
        expr.evaluate(&ctx);
        assert_eq!(expr.warnings.borrow().len(), 1);
    }

    #[test]
    fn test_enum_values_checked() {
        let expr = create_expression(&json!(["get", "anchor"]), Some(spec("text-anchor"))).unwrap();
        let mut props = PropertyMap::new();
        props.insert("anchor".into(), Value::String("middle".into()));
        let feature = Feature::new(GeometryType::Point, props);
        let ctx = EvaluationContext::default().with_feature(&feature);
        let err = expr.checked(&ctx).unwrap_err();
        assert!(err.0.starts_with("Expected value to be one of \"center\", \"left\""));
        assert!(err.0.ends_with("but found \"middle\" instead."));
        assert_eq!(expr.evaluate(&ctx), Value::String("center".into()));
    }

    #[test]
    fn test_color_default() {
        let expr = create_expression(&json!(["get", "c"]), Some(spec("text-color"))).unwrap();
        let feature = Feature::default();
        let ctx = EvaluationContext::default().with_feature(&feature);
        assert_eq!(expr.evaluate(&ctx), Value::Color(Color::BLACK));
    }
}
