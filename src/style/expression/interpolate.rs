//! `step` and `interpolate`: stop parsing, stop lookup and value blending.

use serde_json::Value as JsonValue;

use super::parser::ParsingContext;
use super::types::{check_subtype, Type};
use super::{EvalResult, EvaluationContext, EvaluationError, Expression};
use crate::style::color::{interpolate_hcl, interpolate_lab, interpolate_rgb};
use crate::style::value::{Padding, Value};

/// Shape of the curve between two stops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interpolation {
    Linear,
    Exponential { base: f64 },
    CubicBezier { x1: f64, y1: f64, x2: f64, y2: f64 },
}

/// Color space colors are blended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationOperator {
    Rgb,
    Hcl,
    Lab,
}

impl InterpolationOperator {
    pub fn name(&self) -> &'static str {
        match self {
            InterpolationOperator::Rgb => "interpolate",
            InterpolationOperator::Hcl => "interpolate-hcl",
            InterpolationOperator::Lab => "interpolate-lab",
        }
    }
}

/// Cubic bezier easing with fixed endpoints (0,0) and (1,1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitBezier {
    cx: f64,
    bx: f64,
    ax: f64,
    cy: f64,
    by: f64,
    ay: f64,
}

impl UnitBezier {
    pub fn new(p1x: f64, p1y: f64, p2x: f64, p2y: f64) -> Self {
        let cx = 3.0 * p1x;
        let bx = 3.0 * (p2x - p1x) - cx;
        let cy = 3.0 * p1y;
        let by = 3.0 * (p2y - p1y) - cy;
        Self {
            cx,
            bx,
            ax: 1.0 - cx - bx,
            cy,
            by,
            ay: 1.0 - cy - by,
        }
    }

    fn sample_x(&self, t: f64) -> f64 {
        ((self.ax * t + self.bx) * t + self.cx) * t
    }

    fn sample_y(&self, t: f64) -> f64 {
        ((self.ay * t + self.by) * t + self.cy) * t
    }

    fn sample_derivative_x(&self, t: f64) -> f64 {
        (3.0 * self.ax * t + 2.0 * self.bx) * t + self.cx
    }

    fn solve_x(&self, x: f64, epsilon: f64) -> f64 {
        if x < 0.0 {
            return 0.0;
        }
        if x > 1.0 {
            return 1.0;
        }

        // Newton's method first, bisection as a fallback
        let mut t = x;
        for _ in 0..8 {
            let x2 = self.sample_x(t) - x;
            if x2.abs() < epsilon {
                return t;
            }
            let d2 = self.sample_derivative_x(t);
            if d2.abs() < 1e-6 {
                break;
            }
            t -= x2 / d2;
        }

        let (mut t0, mut t1) = (0.0, 1.0);
        t = x;
        for _ in 0..20 {
            let x2 = self.sample_x(t);
            if (x2 - x).abs() < epsilon {
                break;
            }
            if x > x2 {
                t0 = t;
            } else {
                t1 = t;
            }
            t = (t1 - t0) * 0.5 + t0;
        }
        t
    }

    /// Eased progress for linear progress `x`.
    pub fn solve(&self, x: f64) -> f64 {
        self.sample_y(self.solve_x(x, 1e-6))
    }
}

/// Progress between two stops; `base` 1 is linear.
pub fn exponential_interpolation(input: f64, base: f64, lower: f64, upper: f64) -> f64 {
    let difference = upper - lower;
    let progress = input - lower;
    if difference == 0.0 {
        0.0
    } else if base == 1.0 {
        progress / difference
    } else {
        (base.powf(progress) - 1.0) / (base.powf(difference) - 1.0)
    }
}

/// Interpolation factor in 0..1 for `input` between `lower` and `upper`.
pub fn interpolation_factor(interpolation: &Interpolation, input: f64, lower: f64, upper: f64) -> f64 {
    match interpolation {
        Interpolation::Linear => exponential_interpolation(input, 1.0, lower, upper),
        Interpolation::Exponential { base } => exponential_interpolation(input, *base, lower, upper),
        Interpolation::CubicBezier { x1, y1, x2, y2 } => UnitBezier::new(*x1, *y1, *x2, *y2)
            .solve(exponential_interpolation(input, 1.0, lower, upper)),
    }
}

/// Index of the last stop whose label is <= `input`.
pub fn find_stop_less_than_or_equal_to(labels: &[f64], input: f64) -> Result<usize, EvaluationError> {
    let last = labels.len() as isize - 1;
    let mut lower: isize = 0;
    let mut upper = last;
    while lower <= upper {
        let current = (lower + upper) / 2;
        let value = labels[current as usize];
        if value <= input {
            if current == last || input < labels[current as usize + 1] {
                return Ok(current as usize);
            }
            lower = current + 1;
        } else if value > input {
            upper = current - 1;
        } else {
            return Err(EvaluationError::new("Input is not a number."));
        }
    }
    Ok(0)
}

/// Blend two outputs. Colors use the operator's color space.
pub fn interpolate_value(
    operator: InterpolationOperator,
    from: &Value,
    to: &Value,
    t: f64,
) -> Option<Value> {
    match (from, to) {
        (Value::Number(a), Value::Number(b)) => Some(Value::Number(a + (b - a) * t)),
        (Value::Color(a), Value::Color(b)) => Some(Value::Color(match operator {
            InterpolationOperator::Rgb => interpolate_rgb(a, b, t),
            InterpolationOperator::Hcl => interpolate_hcl(a, b, t),
            InterpolationOperator::Lab => interpolate_lab(a, b, t),
        })),
        (Value::Padding(a), Value::Padding(b)) => Some(Value::Padding(Padding::interpolate(a, b, t))),
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => a
            .iter()
            .zip(b)
            .map(|(x, y)| match (x, y) {
                (Value::Number(x), Value::Number(y)) => Some(Value::Number(x + (y - x) * t)),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        _ => None,
    }
}

fn output_type_for(ctx: &ParsingContext) -> Option<Type> {
    ctx.expected_type()
        .filter(|t| **t != Type::Value)
        .cloned()
}

fn check_stop_arguments(args: &[JsonValue], ctx: &ParsingContext) -> Option<()> {
    if args.len() - 1 < 4 {
        return ctx.error(format!(
            "Expected at least 4 arguments, but found only {}.",
            args.len() - 1
        ));
    }
    if (args.len() - 1) % 2 != 0 {
        return ctx.error("Expected an even number of arguments.");
    }
    Some(())
}

/// Parse one label/output pair, enforcing literal, ascending labels.
#[allow(clippy::too_many_arguments)]
fn parse_stop(
    op: &str,
    label: Option<&JsonValue>,
    value: &JsonValue,
    label_key: usize,
    value_key: usize,
    stops: &[(f64, Expression)],
    output_type: &mut Option<Type>,
    ctx: &ParsingContext,
) -> Option<(f64, Expression)> {
    let label = match label {
        None => f64::NEG_INFINITY,
        Some(json) => match json.as_f64() {
            Some(label) => label,
            None => {
                return ctx.error_at(
                    format!(
                        "Input/output pairs for \"{}\" expressions must be defined using literal numeric values (not computed expressions) for the input values.",
                        op
                    ),
                    &[label_key],
                )
            }
        },
    };
    if let Some((previous, _)) = stops.last() {
        if *previous >= label {
            return ctx.error_at(
                format!(
                    "Input/output pairs for \"{}\" expressions must be arranged with input values in strictly ascending order.",
                    op
                ),
                &[label_key],
            );
        }
    }
    let parsed = ctx.parse_at(value, value_key, output_type.clone())?;
    if output_type.is_none() {
        *output_type = Some(parsed.ty());
    }
    Some((label, parsed))
}

pub(crate) fn parse_step(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    check_stop_arguments(args, ctx)?;
    let input = ctx.parse_at(&args[1], 1, Some(Type::Number))?;

    let mut output_type = output_type_for(ctx);
    let mut stops: Vec<(f64, Expression)> = Vec::new();
    let mut i = 1;
    while i < args.len() {
        let label = if i == 1 { None } else { Some(&args[i]) };
        let stop = parse_stop("step", label, &args[i + 1], i, i + 1, &stops, &mut output_type, ctx)?;
        stops.push(stop);
        i += 2;
    }

    Some(Expression::Step {
        ty: output_type.unwrap_or(Type::Value),
        input: Box::new(input),
        stops,
    })
}

fn parse_interpolation_type(json: &JsonValue, ctx: &ParsingContext) -> Option<Interpolation> {
    let items = match json {
        JsonValue::Array(items) if !items.is_empty() => items,
        _ => return ctx.error_at("Expected an interpolation type expression.", &[1]),
    };
    match items[0].as_str() {
        Some("linear") => Some(Interpolation::Linear),
        Some("exponential") => match items.get(1).and_then(JsonValue::as_f64) {
            Some(base) => Some(Interpolation::Exponential { base }),
            None => ctx.error_at("Exponential interpolation requires a numeric base.", &[1, 1]),
        },
        Some("cubic-bezier") => {
            let points: Option<Vec<f64>> = items[1..]
                .iter()
                .map(|p| p.as_f64().filter(|v| (0.0..=1.0).contains(v)))
                .collect();
            match points.as_deref() {
                Some(&[x1, y1, x2, y2]) => Some(Interpolation::CubicBezier { x1, y1, x2, y2 }),
                _ => ctx.error_at(
                    "Cubic bezier interpolation requires four numeric arguments with values between 0 and 1.",
                    &[1],
                ),
            }
        }
        _ => {
            let name = match &items[0] {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            ctx.error_at(format!("Unknown interpolation type {}", name), &[1, 0])
        }
    }
}

pub(crate) fn parse_interpolate(op: &str, args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    let operator = match op {
        "interpolate-hcl" => InterpolationOperator::Hcl,
        "interpolate-lab" => InterpolationOperator::Lab,
        _ => InterpolationOperator::Rgb,
    };
    let interpolation = match args.get(1) {
        Some(json) => parse_interpolation_type(json, ctx)?,
        None => return ctx.error_at("Expected an interpolation type expression.", &[1]),
    };

    check_stop_arguments(args, ctx)?;
    let input = ctx.parse_at(&args[2], 2, Some(Type::Number))?;

    let mut output_type = if operator != InterpolationOperator::Rgb {
        Some(Type::Color)
    } else {
        output_type_for(ctx)
    };

    let rest = &args[3..];
    let mut stops: Vec<(f64, Expression)> = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        let stop = parse_stop(
            op,
            Some(&rest[i]),
            &rest[i + 1],
            i + 3,
            i + 4,
            &stops,
            &mut output_type,
            ctx,
        )?;
        stops.push(stop);
        i += 2;
    }

    let ty = output_type.unwrap_or(Type::Value);
    let interpolatable = [
        Type::Number,
        Type::Color,
        Type::Padding,
        Type::array(Type::Number),
    ]
    .iter()
    .any(|target| check_subtype(target, &ty).is_none());
    if !interpolatable {
        return ctx.error(format!("Type {} is not interpolatable.", ty));
    }

    Some(Expression::Interpolate {
        ty,
        operator,
        interpolation,
        input: Box::new(input),
        stops,
    })
}

fn eval_input(input: &Expression, ctx: &EvaluationContext) -> Result<f64, EvaluationError> {
    match input.evaluate(ctx)? {
        Value::Number(n) => Ok(n),
        _ => Err(EvaluationError::new("Input is not a number.")),
    }
}

/// Locate the stop bracket for `value`: `Ok(Err(i))` when clamped to stop `i`.
fn locate(labels: &[f64], value: f64) -> Result<Result<usize, usize>, EvaluationError> {
    let last = labels.len() - 1;
    if value <= labels[0] {
        return Ok(Err(0));
    }
    if value >= labels[last] {
        return Ok(Err(last));
    }
    find_stop_less_than_or_equal_to(labels, value).map(Ok)
}

pub(crate) fn evaluate_step(
    input: &Expression,
    stops: &[(f64, Expression)],
    ctx: &EvaluationContext,
) -> EvalResult {
    if stops.len() == 1 {
        return stops[0].1.evaluate(ctx);
    }
    let value = eval_input(input, ctx)?;
    let labels: Vec<f64> = stops.iter().map(|(label, _)| *label).collect();
    let index = match locate(&labels, value)? {
        Ok(i) | Err(i) => i,
    };
    stops[index].1.evaluate(ctx)
}

pub(crate) fn evaluate_interpolate(
    operator: InterpolationOperator,
    interpolation: &Interpolation,
    input: &Expression,
    stops: &[(f64, Expression)],
    ctx: &EvaluationContext,
) -> EvalResult {
    if stops.len() == 1 {
        return stops[0].1.evaluate(ctx);
    }
    let value = eval_input(input, ctx)?;
    let labels: Vec<f64> = stops.iter().map(|(label, _)| *label).collect();
    let index = match locate(&labels, value)? {
        Err(clamped) => return stops[clamped].1.evaluate(ctx),
        Ok(i) => i,
    };

    let (lower, upper) = (labels[index], labels[index + 1]);
    let t = interpolation_factor(interpolation, value, lower, upper);
    let output_lower = stops[index].1.evaluate(ctx)?;
    let output_upper = stops[index + 1].1.evaluate(ctx)?;
    interpolate_value(operator, &output_lower, &output_upper, t).ok_or_else(|| {
        EvaluationError::new(format!(
            "Cannot interpolate between {} and {}.",
            output_lower.to_display_string(),
            output_upper.to_display_string()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::color::Color;
    use crate::style::expression::{parse_expression, GlobalProperties};
    use serde_json::json;

    fn at_zoom(json: JsonValue, zoom: f64) -> Value {
        let expr = parse_expression(&json, None).expect("compiles");
        expr.evaluate(&EvaluationContext::new(GlobalProperties::at_zoom(zoom)))
            .expect("evaluates")
    }

    #[test]
    fn test_linear_between_stops() {
        let expr = json!(["interpolate", ["linear"], ["zoom"], 5, 1, 10, 2]);
        assert_eq!(at_zoom(expr.clone(), 7.5), Value::Number(1.5));
        assert_eq!(at_zoom(expr.clone(), 0.0), Value::Number(1.0));
        assert_eq!(at_zoom(expr, 20.0), Value::Number(2.0));
    }

    #[test]
    fn test_exponential_factor() {
        assert_eq!(exponential_interpolation(5.0, 2.0, 0.0, 10.0), 31.0 / 1023.0);
        assert_eq!(exponential_interpolation(3.0, 2.0, 3.0, 3.0), 0.0);
    }

    #[test]
    fn test_step_selects_lower_stop() {
        let expr = json!(["step", ["zoom"], "a", 5, "b", 10, "c"]);
        assert_eq!(at_zoom(expr.clone(), 4.9), Value::from("a"));
        assert_eq!(at_zoom(expr.clone(), 5.0), Value::from("b"));
        assert_eq!(at_zoom(expr, 12.0), Value::from("c"));
    }

    #[test]
    fn test_find_stop_rejects_nan() {
        assert!(find_stop_less_than_or_equal_to(&[0.0, 1.0, 2.0], f64::NAN).is_err());
        assert_eq!(find_stop_less_than_or_equal_to(&[0.0, 1.0, 2.0], 1.5).unwrap(), 1);
    }

    #[test]
    fn test_stop_order_errors() {
        let errors = parse_expression(&json!(["step", ["zoom"], 0, 5, 1, 3, 2]), None).unwrap_err();
        assert_eq!(errors[0].key, "[5]");
        assert!(errors[0].message.contains("strictly ascending order"));
        let errors = parse_expression(
            &json!(["interpolate", ["linear"], ["zoom"], ["get", "x"], 1, 3, 2]),
            None,
        )
        .unwrap_err();
        assert_eq!(errors[0].key, "[3]");
    }

    #[test]
    fn test_interpolation_type_errors() {
        let errors =
            parse_expression(&json!(["interpolate", ["exponential", "x"], ["zoom"], 0, 0, 1, 1]), None)
                .unwrap_err();
        assert_eq!(errors[0].key, "[1][1]");
        let errors =
            parse_expression(&json!(["interpolate", ["cubic-bezier", 0, 0, 2, 1], ["zoom"], 0, 0, 1, 1]), None)
                .unwrap_err();
        assert_eq!(errors[0].key, "[1]");
        let errors = parse_expression(&json!(["interpolate", ["smooth"], ["zoom"], 0, 0, 1, 1]), None)
            .unwrap_err();
        assert_eq!(errors[0].message, "Unknown interpolation type smooth");
        assert_eq!(errors[0].key, "[1][0]");
    }

    #[test]
    fn test_strings_are_not_interpolatable() {
        let errors =
            parse_expression(&json!(["interpolate", ["linear"], ["zoom"], 0, "a", 1, "b"]), None)
                .unwrap_err();
        assert_eq!(errors[0].message, "Type string is not interpolatable.");
    }

    #[test]
    fn test_color_interpolation() {
        let expr = parse_expression(
            &json!(["interpolate", ["linear"], ["zoom"], 0, "black", 10, "white"]),
            Some(Type::Color),
        )
        .unwrap();
        let mid = expr
            .evaluate(&EvaluationContext::new(GlobalProperties::at_zoom(5.0)))
            .unwrap();
        match mid {
            Value::Color(c) => {
                assert!((c.r - 0.5).abs() < 1e-9);
                assert_eq!(c.a, 1.0);
            }
            other => panic!("expected color, got {:?}", other),
        }
        let lab = at_zoom(
            json!(["interpolate-lab", ["linear"], ["zoom"], 0, "red", 10, "red"]),
            5.0,
        );
        match lab {
            Value::Color(c) => {
                let red = Color::new(1.0, 0.0, 0.0, 1.0);
                assert!((c.r - red.r).abs() < 1e-6);
                assert!(c.g.abs() < 1e-6);
            }
            other => panic!("expected color, got {:?}", other),
        }
    }

    #[test]
    fn test_unit_bezier_endpoints() {
        let ease = UnitBezier::new(0.42, 0.0, 0.58, 1.0);
        assert!(ease.solve(0.0).abs() < 1e-6);
        assert!((ease.solve(1.0) - 1.0).abs() < 1e-6);
        assert!((ease.solve(0.5) - 0.5).abs() < 1e-3);
    }
}
