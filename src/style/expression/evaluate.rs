//! Evaluation of compiled expressions.

use std::cmp::Ordering;

use super::definitions::{evaluate_builtin, validate_rgba};
use super::interpolate::{evaluate_interpolate, evaluate_step};
use super::types::{check_subtype, Type, TypeKind};
use super::within::evaluate_within;
use super::{
    ComparisonOp, EvalResult, EvaluationContext, EvaluationError, Expression,
    FormatSectionExpression, MatchKey,
};
use crate::style::collator::Collator;
use crate::style::color::Color;
use crate::style::value::{
    format_number, type_of, Formatted, FormattedSection, Padding, ResolvedImage, Value,
};

impl Expression {
    /// Evaluate against `ctx`.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> EvalResult {
        match self {
            Expression::Literal { value, .. } => Ok(value.clone()),
            Expression::Let { result, .. } => result.evaluate(ctx),
            Expression::Var { bound, .. } => bound.evaluate(ctx),
            Expression::Assertion { ty, args } => evaluate_assertion(ty, args, ctx),
            Expression::Coercion { ty, args } => evaluate_coercion(ty, args, ctx),
            Expression::At { index, input, .. } => evaluate_at(index, input, ctx),
            Expression::In { needle, haystack } => evaluate_in(needle, haystack, ctx),
            Expression::IndexOf {
                needle,
                haystack,
                from_index,
            } => evaluate_index_of(needle, haystack, from_index.as_deref(), ctx),
            Expression::Slice {
                input, begin, end, ..
            } => evaluate_slice(input, begin, end.as_deref(), ctx),
            Expression::Length(input) => match input.evaluate(ctx)? {
                Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
                Value::Array(items) => Ok(Value::Number(items.len() as f64)),
                other => Err(EvaluationError::new(format!(
                    "Expected value to be of type string or array, but found {} instead.",
                    type_of(&other)
                ))),
            },
            Expression::Match {
                input_type,
                input,
                cases,
                outputs,
                otherwise,
                ..
            } => {
                let value = input.evaluate(ctx)?;
                let key = match (&value, input_type) {
                    (Value::Number(n), Type::Number) if n.fract() == 0.0 => {
                        Some(MatchKey::Int(*n as i64))
                    }
                    (Value::String(s), Type::String) => Some(MatchKey::Str(s.clone())),
                    _ => None,
                };
                match key.and_then(|k| cases.get(&k)) {
                    Some(&index) => outputs[index].evaluate(ctx),
                    None => otherwise.evaluate(ctx),
                }
            }
            Expression::Case {
                branches,
                otherwise,
                ..
            } => {
                for (test, output) in branches {
                    if test.evaluate(ctx)? == Value::Bool(true) {
                        return output.evaluate(ctx);
                    }
                }
                otherwise.evaluate(ctx)
            }
            Expression::Coalesce { args, .. } => evaluate_coalesce(args, ctx),
            Expression::Step { input, stops, .. } => evaluate_step(input, stops, ctx),
            Expression::Interpolate {
                operator,
                interpolation,
                input,
                stops,
                ..
            } => evaluate_interpolate(*operator, interpolation, input, stops, ctx),
            Expression::Comparison {
                op,
                lhs,
                rhs,
                collator,
                has_untyped_argument,
            } => evaluate_comparison(*op, lhs, rhs, collator.as_deref(), *has_untyped_argument, ctx),
            Expression::All(args) => {
                for arg in args {
                    if arg.evaluate(ctx)? != Value::Bool(true) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expression::Any(args) => {
                for arg in args {
                    if arg.evaluate(ctx)? == Value::Bool(true) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expression::Collator {
                case_sensitive,
                diacritic_sensitive,
                locale,
            } => {
                let locale = match locale {
                    Some(locale) => match locale.evaluate(ctx)? {
                        Value::String(s) => Some(s),
                        _ => None,
                    },
                    None => None,
                };
                Ok(Value::Collator(Collator::new(
                    case_sensitive.evaluate(ctx)?.is_truthy(),
                    diacritic_sensitive.evaluate(ctx)?.is_truthy(),
                    locale,
                )))
            }
            Expression::Format(sections) => evaluate_format(sections, ctx),
            Expression::Image(name) => {
                let name = name.evaluate(ctx)?.to_display_string();
                Ok(match ResolvedImage::from_name(&name) {
                    Some(mut image) => {
                        image.available = ctx
                            .available_images
                            .map_or(false, |images| images.contains(&name));
                        Value::ResolvedImage(image)
                    }
                    None => Value::Null,
                })
            }
            Expression::NumberFormat {
                number,
                currency,
                min_fraction_digits,
                max_fraction_digits,
                ..
            } => {
                let value = match number.evaluate(ctx)? {
                    Value::Number(n) => n,
                    other => return Err(type_mismatch(&Type::Number, &other)),
                };
                let optional_string = |e: &Option<Box<Expression>>| -> Result<Option<String>, EvaluationError> {
                    match e {
                        Some(e) => Ok(e.evaluate(ctx)?.as_str().map(str::to_string)),
                        None => Ok(None),
                    }
                };
                let optional_number = |e: &Option<Box<Expression>>| -> Result<Option<f64>, EvaluationError> {
                    match e {
                        Some(e) => Ok(e.evaluate(ctx)?.as_f64()),
                        None => Ok(None),
                    }
                };
                // only the default locale is supported; `locale` is kept for serialization
                Ok(Value::String(format_localized_number(
                    value,
                    optional_string(currency)?.as_deref(),
                    optional_number(min_fraction_digits)?,
                    optional_number(max_fraction_digits)?,
                )))
            }
            Expression::Within(geometry) => Ok(Value::Bool(evaluate_within(geometry, ctx))),
            Expression::Compound { op, args, .. } => evaluate_builtin(*op, args, ctx),
        }
    }
}

fn type_mismatch(expected: &Type, value: &Value) -> EvaluationError {
    EvaluationError::new(format!(
        "Expected value to be of type {}, but found {} instead.",
        expected,
        type_of(value)
    ))
}

fn evaluate_assertion(ty: &Type, args: &[Expression], ctx: &EvaluationContext) -> EvalResult {
    let mut last = Value::Null;
    for arg in args {
        let value = arg.evaluate(ctx)?;
        if check_subtype(ty, &type_of(&value)).is_none() {
            return Ok(value);
        }
        last = value;
    }
    Err(type_mismatch(ty, &last))
}

fn describe_input(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_json().to_string(),
    }
}

fn evaluate_coercion(ty: &Type, args: &[Expression], ctx: &EvaluationContext) -> EvalResult {
    match ty.kind() {
        TypeKind::Boolean => Ok(Value::Bool(args[0].evaluate(ctx)?.is_truthy())),
        TypeKind::Color => {
            let mut input = Value::Null;
            let mut error = None;
            for arg in args {
                input = arg.evaluate(ctx)?;
                error = None;
                match &input {
                    Value::Color(c) => return Ok(Value::Color(*c)),
                    Value::String(s) => {
                        if let Some(c) = Color::parse(s) {
                            return Ok(Value::Color(c));
                        }
                    }
                    Value::Array(items) => {
                        if items.len() < 3 || items.len() > 4 {
                            error = Some(format!(
                                "Invalid rbga value {}: expected an array containing either three or four numeric values.",
                                input.to_json()
                            ));
                        } else {
                            error = validate_rgba(&items[0], &items[1], &items[2], items.get(3));
                        }
                        if error.is_none() {
                            let channel = |i: usize| items[i].as_f64().unwrap_or(0.0);
                            let alpha = items.get(3).and_then(Value::as_f64).unwrap_or(1.0);
                            return Ok(Value::Color(Color::new(
                                channel(0) / 255.0,
                                channel(1) / 255.0,
                                channel(2) / 255.0,
                                alpha,
                            )));
                        }
                    }
                    _ => {}
                }
            }
            Err(EvaluationError::new(error.unwrap_or_else(|| {
                format!("Could not parse color from value '{}'", describe_input(&input))
            })))
        }
        TypeKind::Padding => {
            let mut input = Value::Null;
            for arg in args {
                input = arg.evaluate(ctx)?;
                if let Some(padding) = Padding::parse(&input) {
                    return Ok(Value::Padding(padding));
                }
            }
            Err(EvaluationError::new(format!(
                "Could not parse padding from value '{}'",
                describe_input(&input)
            )))
        }
        TypeKind::Number => {
            let mut value = Value::Null;
            for arg in args {
                value = arg.evaluate(ctx)?;
                if value.is_null() {
                    return Ok(Value::Number(0.0));
                }
                let n = value.to_number();
                if !n.is_nan() {
                    return Ok(Value::Number(n));
                }
            }
            Err(EvaluationError::new(format!(
                "Could not convert {} to number.",
                value.to_json()
            )))
        }
        TypeKind::Formatted => match args[0].evaluate(ctx)? {
            Value::Formatted(f) => Ok(Value::Formatted(f)),
            other => Ok(Value::Formatted(Formatted::from_string(
                other.to_display_string(),
            ))),
        },
        TypeKind::ResolvedImage => {
            let name = args[0].evaluate(ctx)?.to_display_string();
            Ok(ResolvedImage::from_name(&name)
                .map(Value::ResolvedImage)
                .unwrap_or(Value::Null))
        }
        _ => Ok(Value::String(args[0].evaluate(ctx)?.to_display_string())),
    }
}

fn evaluate_at(index: &Expression, input: &Expression, ctx: &EvaluationContext) -> EvalResult {
    let index = match index.evaluate(ctx)? {
        Value::Number(n) => n,
        other => return Err(type_mismatch(&Type::Number, &other)),
    };
    let items = match input.evaluate(ctx)? {
        Value::Array(items) => items,
        other => return Err(type_mismatch(&Type::array(Type::Value), &other)),
    };
    if index < 0.0 {
        return Err(EvaluationError::new(format!(
            "Array index out of bounds: {} < 0.",
            format_number(index)
        )));
    }
    if index >= items.len() as f64 {
        return Err(EvaluationError::new(format!(
            "Array index out of bounds: {} > {}.",
            format_number(index),
            items.len() as i64 - 1
        )));
    }
    if index.fract() != 0.0 {
        return Err(EvaluationError::new(format!(
            "Array index must be an integer, but found {} instead.",
            format_number(index)
        )));
    }
    Ok(items[index as usize].clone())
}

fn check_needle(needle: &Value) -> Result<(), EvaluationError> {
    match needle {
        Value::Bool(_) | Value::String(_) | Value::Number(_) | Value::Null => Ok(()),
        other => Err(EvaluationError::new(format!(
            "Expected first argument to be of type boolean, string, number or null, but found {} instead.",
            type_of(other)
        ))),
    }
}

fn haystack_error(haystack: &Value) -> EvaluationError {
    EvaluationError::new(format!(
        "Expected second argument to be of type array or string, but found {} instead.",
        type_of(haystack)
    ))
}

/// String form of a needle when searching inside a string.
fn needle_text(needle: &Value) -> String {
    match needle {
        Value::Null => "null".to_string(),
        other => other.to_display_string(),
    }
}

fn evaluate_in(needle: &Expression, haystack: &Expression, ctx: &EvaluationContext) -> EvalResult {
    let needle = needle.evaluate(ctx)?;
    let haystack = haystack.evaluate(ctx)?;
    if !haystack.is_truthy() {
        return Ok(Value::Bool(false));
    }
    check_needle(&needle)?;
    match &haystack {
        Value::String(s) => Ok(Value::Bool(s.contains(&needle_text(&needle)))),
        Value::Array(items) => Ok(Value::Bool(items.contains(&needle))),
        other => Err(haystack_error(other)),
    }
}

fn evaluate_index_of(
    needle: &Expression,
    haystack: &Expression,
    from_index: Option<&Expression>,
    ctx: &EvaluationContext,
) -> EvalResult {
    let needle = needle.evaluate(ctx)?;
    let haystack = haystack.evaluate(ctx)?;
    check_needle(&needle)?;
    let from = match from_index {
        Some(e) => e.evaluate(ctx)?.as_f64().unwrap_or(0.0),
        None => 0.0,
    };
    let found = match &haystack {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let needle: Vec<char> = needle_text(&needle).chars().collect();
            let start = from.max(0.0) as usize;
            (start..=chars.len().saturating_sub(needle.len()))
                .find(|&i| chars.len() >= needle.len() && chars[i..i + needle.len()] == needle[..])
        }
        Value::Array(items) => {
            let start = if from < 0.0 {
                (items.len() as f64 + from).max(0.0) as usize
            } else {
                from as usize
            };
            items
                .iter()
                .enumerate()
                .skip(start)
                .find(|(_, item)| **item == needle)
                .map(|(i, _)| i)
        }
        other => return Err(haystack_error(other)),
    };
    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
}

/// Resolve a JavaScript-style slice bound against `len`.
fn slice_bound(bound: f64, len: usize) -> usize {
    let len_f = len as f64;
    let resolved = if bound < 0.0 { len_f + bound } else { bound };
    resolved.clamp(0.0, len_f) as usize
}

fn evaluate_slice(
    input: &Expression,
    begin: &Expression,
    end: Option<&Expression>,
    ctx: &EvaluationContext,
) -> EvalResult {
    let input = input.evaluate(ctx)?;
    let begin = begin.evaluate(ctx)?.as_f64().unwrap_or(0.0);
    let end = match end {
        Some(e) => e.evaluate(ctx)?.as_f64(),
        None => None,
    };
    match &input {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let start = slice_bound(begin, chars.len());
            let stop = end.map_or(chars.len(), |e| slice_bound(e, chars.len()));
            Ok(Value::String(if start < stop {
                chars[start..stop].iter().collect()
            } else {
                String::new()
            }))
        }
        Value::Array(items) => {
            let start = slice_bound(begin, items.len());
            let stop = end.map_or(items.len(), |e| slice_bound(e, items.len()));
            Ok(Value::Array(if start < stop {
                items[start..stop].to_vec()
            } else {
                Vec::new()
            }))
        }
        other => Err(EvaluationError::new(format!(
            "Expected first argument to be of type array or string, but found {} instead.",
            type_of(other)
        ))),
    }
}

fn evaluate_coalesce(args: &[Expression], ctx: &EvaluationContext) -> EvalResult {
    let mut requested_image: Option<String> = None;
    for (i, arg) in args.iter().enumerate() {
        let mut result = arg.evaluate(ctx)?;
        if let Value::ResolvedImage(image) = &result {
            if !image.available {
                if requested_image.is_none() {
                    requested_image = Some(image.name.clone());
                }
                result = Value::Null;
                if i == args.len() - 1 {
                    if let Some(name) = requested_image.take() {
                        result = Value::ResolvedImage(ResolvedImage {
                            name,
                            available: false,
                        });
                    }
                }
            }
        }
        if !result.is_null() {
            return Ok(result);
        }
    }
    Ok(Value::Null)
}

fn compare_ordering(op: ComparisonOp, ordering: Option<Ordering>) -> bool {
    match (op, ordering) {
        (ComparisonOp::Equal, Some(o)) => o == Ordering::Equal,
        (ComparisonOp::NotEqual, Some(o)) => o != Ordering::Equal,
        (ComparisonOp::NotEqual, None) => true,
        (ComparisonOp::Less, Some(o)) => o == Ordering::Less,
        (ComparisonOp::Greater, Some(o)) => o == Ordering::Greater,
        (ComparisonOp::LessOrEqual, Some(o)) => o != Ordering::Greater,
        (ComparisonOp::GreaterOrEqual, Some(o)) => o != Ordering::Less,
        (_, None) => false,
    }
}

fn compare_basic(op: ComparisonOp, lhs: &Value, rhs: &Value) -> bool {
    if op.is_equality() {
        let equal = lhs == rhs;
        return if op == ComparisonOp::Equal { equal } else { !equal };
    }
    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    compare_ordering(op, ordering)
}

fn evaluate_comparison(
    op: ComparisonOp,
    lhs: &Expression,
    rhs: &Expression,
    collator: Option<&Expression>,
    has_untyped_argument: bool,
    ctx: &EvaluationContext,
) -> EvalResult {
    let lhs = lhs.evaluate(ctx)?;
    let rhs = rhs.evaluate(ctx)?;

    if !op.is_equality() && has_untyped_argument {
        let (lt, rt) = (type_of(&lhs), type_of(&rhs));
        if lt.kind() != rt.kind() || !matches!(lt, Type::String | Type::Number) {
            return Err(EvaluationError::new(format!(
                "Expected arguments for \"{}\" to be (string, string) or (number, number), but found ({}, {}) instead.",
                op.name(),
                lt.kind_name(),
                rt.kind_name()
            )));
        }
    }

    let Some(collator) = collator else {
        return Ok(Value::Bool(compare_basic(op, &lhs, &rhs)));
    };
    let (Value::String(a), Value::String(b)) = (&lhs, &rhs) else {
        // Untyped equality falls back when either side is not a string
        return Ok(Value::Bool(compare_basic(op, &lhs, &rhs)));
    };
    let collator = match collator.evaluate(ctx)? {
        Value::Collator(c) => c,
        other => return Err(type_mismatch(&Type::Collator, &other)),
    };
    Ok(Value::Bool(compare_ordering(op, Some(collator.compare(a, b)))))
}

fn evaluate_format(sections: &[FormatSectionExpression], ctx: &EvaluationContext) -> EvalResult {
    let mut evaluated = Vec::with_capacity(sections.len());
    for section in sections {
        let content = section.content.evaluate(ctx)?;
        if let Value::ResolvedImage(image) = content {
            evaluated.push(FormattedSection {
                text: String::new(),
                image: Some(image),
                scale: None,
                font_stack: None,
                text_color: None,
            });
            continue;
        }
        let scale = match &section.scale {
            Some(e) => e.evaluate(ctx)?.as_f64(),
            None => None,
        };
        let font_stack = match &section.font {
            Some(e) => e.evaluate(ctx)?.as_array().map(|fonts| {
                fonts
                    .iter()
                    .map(Value::to_display_string)
                    .collect::<Vec<_>>()
                    .join(",")
            }),
            None => None,
        };
        let text_color = match &section.text_color {
            Some(e) => e.evaluate(ctx)?.as_color().copied(),
            None => None,
        };
        evaluated.push(FormattedSection {
            text: content.to_display_string(),
            image: None,
            scale,
            font_stack,
            text_color,
        });
    }
    Ok(Value::Formatted(Formatted {
        sections: evaluated,
    }))
}

fn currency_symbol(code: &str) -> String {
    match code {
        "USD" => "$".to_string(),
        "EUR" => "€".to_string(),
        "GBP" => "£".to_string(),
        "JPY" => "¥".to_string(),
        other => format!("{} ", other),
    }
}

/// Format with thousands grouping. Locale-specific separators are not applied.
fn format_localized_number(
    value: f64,
    currency: Option<&str>,
    min_fraction_digits: Option<f64>,
    max_fraction_digits: Option<f64>,
) -> String {
    if !value.is_finite() {
        return format_number(value);
    }
    let default_max = if currency.is_some() { 2 } else { 3 };
    let default_min = if currency.is_some() { 2 } else { 0 };
    let min = min_fraction_digits.map_or(default_min, |v| v.max(0.0) as usize);
    let max = max_fraction_digits
        .map_or(default_max, |v| v.max(0.0) as usize)
        .max(min);

    let fixed = format!("{:.*}", max, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), f.to_string()),
        None => (fixed.clone(), String::new()),
    };
    let mut frac = frac_part;
    while frac.len() > min && frac.ends_with('0') {
        frac.pop();
    }

    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    if value < 0.0 && (grouped.chars().any(|c| c != '0' && c != ',') || frac.chars().any(|c| c != '0')) {
        out.push('-');
    }
    if let Some(code) = currency {
        out.push_str(&currency_symbol(code));
    }
    out.push_str(&grouped);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(&frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::expression::{parse_expression, Feature, GeometryType};
    use crate::style::value::PropertyMap;
    use serde_json::{json, Value as JsonValue};
    use std::collections::HashSet;

    fn eval(json: JsonValue) -> EvalResult {
        parse_expression(&json, None)
            .expect("compiles")
            .evaluate(&EvaluationContext::default())
    }

    fn eval_with(json: JsonValue, props: JsonValue) -> EvalResult {
        let properties = match Value::from_json(&props) {
            Value::Object(map) => map,
            _ => PropertyMap::new(),
        };
        let feature = Feature::new(GeometryType::Point, properties);
        parse_expression(&json, None)
            .expect("compiles")
            .evaluate(&EvaluationContext::default().with_feature(&feature))
    }

    #[test]
    fn test_match_falls_back_on_type_mismatch() {
        let expr = json!(["match", ["get", "k"], ["a", "b"], 1, "c", 2, 0]);
        assert_eq!(eval_with(expr.clone(), json!({"k": "b"})).unwrap(), Value::Number(1.0));
        assert_eq!(eval_with(expr.clone(), json!({"k": "c"})).unwrap(), Value::Number(2.0));
        assert_eq!(eval_with(expr, json!({"k": 1})).unwrap(), Value::Number(0.0));
    }

    #[test]
    fn test_at_errors() {
        let err = eval_with(json!(["at", ["get", "i"], ["literal", [1, 2]]]), json!({"i": 2})).unwrap_err();
        assert_eq!(err.0, "Array index out of bounds: 2 > 1.");
        let err = eval_with(json!(["at", ["get", "i"], ["literal", [1, 2]]]), json!({"i": 0.5})).unwrap_err();
        assert_eq!(err.0, "Array index must be an integer, but found 0.5 instead.");
        let err = eval_with(json!(["at", ["get", "i"], ["literal", [1, 2]]]), json!({"i": -1})).unwrap_err();
        assert_eq!(err.0, "Array index out of bounds: -1 < 0.");
    }

    #[test]
    fn test_in_and_index_of() {
        assert_eq!(eval(json!(["in", "b", "abc"])).unwrap(), Value::Bool(true));
        assert_eq!(eval(json!(["in", 2, ["literal", [1, 2]]])).unwrap(), Value::Bool(true));
        assert_eq!(eval_with(json!(["in", "x", ["get", "missing"]]), json!({})).unwrap(), Value::Bool(false));
        assert_eq!(eval(json!(["index-of", "c", "abcabc", 3])).unwrap(), Value::Number(5.0));
        assert_eq!(eval(json!(["index-of", "z", "abc"])).unwrap(), Value::Number(-1.0));
        assert_eq!(eval(json!(["index-of", 1, ["literal", [1, 2, 1]], -1])).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_slice_negative_bounds() {
        assert_eq!(eval(json!(["slice", "abcdef", -3])).unwrap(), Value::from("def"));
        assert_eq!(eval(json!(["slice", "abcdef", 1, -1])).unwrap(), Value::from("bcde"));
        assert_eq!(
            eval(json!(["slice", ["literal", [1, 2, 3]], 1])).unwrap(),
            Value::from_json(&json!([2, 3]))
        );
    }

    #[test]
    fn test_assertion_failure_message() {
        let err = eval_with(json!(["number", ["get", "x"]]), json!({"x": "a"})).unwrap_err();
        assert_eq!(err.0, "Expected value to be of type number, but found string instead.");
        assert_eq!(
            eval_with(json!(["number", ["get", "x"], ["get", "y"]]), json!({"x": "a", "y": 3})).unwrap(),
            Value::Number(3.0)
        );
    }

    #[test]
    fn test_coercions() {
        assert_eq!(eval(json!(["to-number", "12"])).unwrap(), Value::Number(12.0));
        assert_eq!(eval(json!(["to-number", null])).unwrap(), Value::Number(0.0));
        assert_eq!(eval(json!(["to-boolean", ""])).unwrap(), Value::Bool(false));
        assert_eq!(eval(json!(["to-string", ["literal", [1, 2]]])).unwrap(), Value::from("[1,2]"));
        let err = parse_expression(&json!(["to-number", "abc"]), None).unwrap_err();
        assert_eq!(err[0].message, "Could not convert \"abc\" to number.");
        let err = parse_expression(&json!(["to-color", ["literal", [1, 2]]]), None).unwrap_err();
        assert!(err[0].message.starts_with("Invalid rbga value [1,2]"));
        match eval(json!(["to-color", ["literal", [255, 0, 0, 0.5]]])).unwrap() {
            Value::Color(c) => assert_eq!(c.to_rgba(), [255.0, 0.0, 0.0, 0.5]),
            other => panic!("expected color, got {:?}", other),
        }
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval(json!(["<", 1, 2])).unwrap(), Value::Bool(true));
        assert_eq!(eval(json!(["==", "a", "a"])).unwrap(), Value::Bool(true));
        let err = eval_with(json!(["<", ["get", "a"], ["get", "b"]]), json!({"a": 1, "b": "x"})).unwrap_err();
        assert_eq!(
            err.0,
            "Expected arguments for \"<\" to be (string, string) or (number, number), but found (number, string) instead."
        );
        assert_eq!(
            eval(json!(["==", "Ab", "ab", ["collator", {"case-sensitive": false}]])).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_coalesce_skips_missing_images() {
        let images: HashSet<String> = ["b".to_string()].into_iter().collect();
        let expr = parse_expression(&json!(["coalesce", ["image", "a"], ["image", "b"]]), None).unwrap();
        let ctx = EvaluationContext::default().with_available_images(&images);
        match expr.evaluate(&ctx).unwrap() {
            Value::ResolvedImage(img) => {
                assert_eq!(img.name, "b");
                assert!(img.available);
            }
            other => panic!("expected image, got {:?}", other),
        }
        let none: HashSet<String> = HashSet::new();
        let ctx = EvaluationContext::default().with_available_images(&none);
        match expr.evaluate(&ctx).unwrap() {
            Value::ResolvedImage(img) => {
                assert_eq!(img.name, "a");
                assert!(!img.available);
            }
            other => panic!("expected image, got {:?}", other),
        }
    }

    #[test]
    fn test_format_sections() {
        let value = eval(json!([
            "format",
            "Big",
            {"font-scale": 1.5, "text-font": ["literal", ["Open Sans", "Arial"]]},
            " small"
        ]))
        .unwrap();
        match value {
            Value::Formatted(f) => {
                assert_eq!(f.sections.len(), 2);
                assert_eq!(f.sections[0].scale, Some(1.5));
                assert_eq!(f.sections[0].font_stack.as_deref(), Some("Open Sans,Arial"));
                assert_eq!(f.to_string(), "Big small");
            }
            other => panic!("expected formatted, got {:?}", other),
        }
    }

    #[test]
    fn test_number_format() {
        assert_eq!(format_localized_number(1234567.891, None, None, None), "1,234,567.891");
        assert_eq!(format_localized_number(3.5, Some("USD"), None, None), "$3.50");
        assert_eq!(format_localized_number(-0.0001, None, None, Some(2.0)), "0");
        assert_eq!(format_localized_number(12.0, None, Some(1.0), None), "12.0");

        // a requested locale falls back to the default separators
        let expr = json!(["number-format", 1234.5, {"locale": "de-DE"}]);
        assert_eq!(eval(expr).unwrap(), Value::String("1,234.5".into()));
    }

    #[test]
    fn test_let_binding_reuses_value() {
        assert_eq!(
            eval_with(json!(["let", "x", ["get", "n"], ["*", ["var", "x"], ["var", "x"]]]), json!({"n": 3})).unwrap(),
            Value::Number(9.0)
        );
    }
}
