//! Legacy `{"stops": ...}` functions, token strings and filters, rewritten as expressions.

use serde_json::{json, Map, Value as JsonValue};

use crate::error::{StyleError, StyleResult};
use crate::style::expression::parser::ParsingContext;
use crate::style::expression::{EvaluationContext, ParseError, StyleExpression, Type};
use crate::style::spec::{PropertySpecification, ValueType};
use crate::style::value::Value;

/// Legacy functions are JSON objects.
pub fn is_function(json: &JsonValue) -> bool {
    json.is_object()
}

fn literal(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Array(_) | JsonValue::Object(_) => json!(["literal", value]),
        other => other.clone(),
    }
}

fn function_type<'a>(parameters: &'a Map<String, JsonValue>, spec: &PropertySpecification) -> &'a str {
    match parameters.get("type").and_then(JsonValue::as_str) {
        Some(ty) => ty,
        None if spec.interpolated => "exponential",
        None => "interval",
    }
}

fn interpolate_operator(parameters: &Map<String, JsonValue>) -> &'static str {
    match parameters.get("colorSpace").and_then(JsonValue::as_str) {
        Some("hcl") => "interpolate-hcl",
        Some("lab") => "interpolate-lab",
        _ => "interpolate",
    }
}

fn interpolation_curve(parameters: &Map<String, JsonValue>) -> JsonValue {
    match parameters.get("base").and_then(JsonValue::as_f64) {
        Some(base) if base != 1.0 => json!(["exponential", base]),
        _ => json!(["linear"]),
    }
}

fn append_stop_pair(curve: &mut Vec<JsonValue>, input: JsonValue, output: JsonValue, is_step: bool) {
    // duplicate stop inputs are dropped
    if curve.len() > 3 && curve[curve.len() - 2] == input {
        return;
    }
    // a step curve's first input is implied
    if !(is_step && curve.len() == 2) {
        curve.push(input);
    }
    curve.push(output);
}

fn fixup_degenerate_step_curve(curve: &mut Vec<JsonValue>) {
    if curve.len() == 3 && curve[0] == "step" {
        let output = curve[2].clone();
        curve.push(json!(0));
        curve.push(output);
    }
}

fn fallback(parameters: &Map<String, JsonValue>, spec: &PropertySpecification) -> JsonValue {
    match parameters.get("default") {
        Some(default) => literal(default),
        None if spec.value_type == ValueType::ResolvedImage => json!(""),
        None => JsonValue::Null,
    }
}

fn with_number_default(parameters: &Map<String, JsonValue>, get: &JsonValue, curve: JsonValue) -> JsonValue {
    match parameters.get("default") {
        None => curve,
        Some(default) => json!([
            "case",
            ["==", ["typeof", get], "number"],
            curve,
            literal(default)
        ]),
    }
}

/// Rewrite a legacy function object as an equivalent expression.
pub fn convert_function(parameters: &JsonValue, spec: &PropertySpecification) -> StyleResult<JsonValue> {
    let params = parameters
        .as_object()
        .ok_or_else(|| StyleError::invalid(format!("{}: function must be an object", spec.name)))?;

    let Some(stops) = params.get("stops") else {
        return Ok(convert_identity_function(params, spec));
    };
    let stops = stops
        .as_array()
        .filter(|stops| !stops.is_empty())
        .ok_or_else(|| StyleError::invalid(format!("{}: function stops must be a non-empty array", spec.name)))?;

    let mut pairs = Vec::with_capacity(stops.len());
    for stop in stops {
        match stop.as_array().map(Vec::as_slice) {
            Some([input, output]) => pairs.push((input.clone(), output.clone())),
            _ => {
                return Err(StyleError::invalid(format!(
                    "{}: each stop must be an array of two values",
                    spec.name
                )))
            }
        }
    }

    let zoom_and_feature_dependent = pairs[0].0.is_object();
    let feature_dependent = zoom_and_feature_dependent || params.contains_key("property");
    let zoom_dependent = zoom_and_feature_dependent || !feature_dependent;

    let pairs: Vec<(JsonValue, JsonValue)> = pairs
        .into_iter()
        .map(|(input, output)| {
            let output = match output.as_str() {
                Some(s) if !feature_dependent && spec.tokens => convert_token_string(s),
                _ => literal(&output),
            };
            (input, output)
        })
        .collect();

    if zoom_and_feature_dependent {
        convert_zoom_and_property_function(params, spec, pairs)
    } else if zoom_dependent {
        convert_zoom_function(params, spec, pairs)
    } else {
        convert_property_function(params, spec, pairs)
    }
}

fn convert_identity_function(params: &Map<String, JsonValue>, spec: &PropertySpecification) -> JsonValue {
    let property = params.get("property").cloned().unwrap_or(JsonValue::Null);
    let get = json!(["get", property]);
    let Some(default) = params.get("default") else {
        return if spec.value_type == ValueType::String {
            json!(["string", get])
        } else {
            get
        };
    };
    match spec.value_type {
        ValueType::Enum => {
            let values: Vec<&str> = spec.values.unwrap_or_default().to_vec();
            json!(["match", get, values, get, default])
        }
        ValueType::Color => json!(["to-color", get, literal(default)]),
        ValueType::Number => json!(["number", get, literal(default)]),
        ValueType::String => json!(["string", get, literal(default)]),
        ValueType::Boolean => json!(["boolean", get, literal(default)]),
        ValueType::Array => {
            let item = match spec.item_type {
                Some(ValueType::Number) => "number",
                Some(ValueType::Boolean) => "boolean",
                _ => "string",
            };
            match spec.length {
                Some(n) => json!(["array", item, n, get, literal(default)]),
                None => json!(["array", item, get, literal(default)]),
            }
        }
        ValueType::Formatted | ValueType::ResolvedImage | ValueType::Padding => {
            json!(["coalesce", get, literal(default)])
        }
    }
}

fn convert_zoom_function(
    params: &Map<String, JsonValue>,
    spec: &PropertySpecification,
    stops: Vec<(JsonValue, JsonValue)>,
) -> StyleResult<JsonValue> {
    let (mut curve, is_step) = match function_type(params, spec) {
        "interval" => (vec![json!("step"), json!(["zoom"])], true),
        "exponential" => (
            vec![
                json!(interpolate_operator(params)),
                interpolation_curve(params),
                json!(["zoom"]),
            ],
            false,
        ),
        other => {
            return Err(StyleError::invalid(format!(
                "{}: unknown zoom function type \"{}\"",
                spec.name, other
            )))
        }
    };
    for (input, output) in stops {
        append_stop_pair(&mut curve, input, output, is_step);
    }
    fixup_degenerate_step_curve(&mut curve);
    Ok(JsonValue::Array(curve))
}

fn convert_property_function(
    params: &Map<String, JsonValue>,
    spec: &PropertySpecification,
    stops: Vec<(JsonValue, JsonValue)>,
) -> StyleResult<JsonValue> {
    let property = params.get("property").cloned().unwrap_or(JsonValue::Null);
    let get = json!(["get", property]);
    match function_type(params, spec) {
        "categorical" if stops[0].0.is_boolean() => {
            let mut curve = vec![json!("case")];
            for (input, output) in stops {
                curve.push(json!(["==", get, input]));
                curve.push(output);
            }
            curve.push(fallback(params, spec));
            Ok(JsonValue::Array(curve))
        }
        "categorical" => {
            let mut curve = vec![json!("match"), get];
            for (input, output) in stops {
                append_stop_pair(&mut curve, input, output, false);
            }
            curve.push(fallback(params, spec));
            Ok(JsonValue::Array(curve))
        }
        "interval" => {
            let mut curve = vec![json!("step"), json!(["number", get])];
            for (input, output) in stops {
                append_stop_pair(&mut curve, input, output, true);
            }
            fixup_degenerate_step_curve(&mut curve);
            Ok(with_number_default(params, &get, JsonValue::Array(curve)))
        }
        "exponential" => {
            let mut curve = vec![
                json!(interpolate_operator(params)),
                interpolation_curve(params),
                json!(["number", get]),
            ];
            for (input, output) in stops {
                append_stop_pair(&mut curve, input, output, false);
            }
            Ok(with_number_default(params, &get, JsonValue::Array(curve)))
        }
        other => Err(StyleError::invalid(format!(
            "{}: unknown property function type \"{}\"",
            spec.name, other
        ))),
    }
}

fn convert_zoom_and_property_function(
    params: &Map<String, JsonValue>,
    spec: &PropertySpecification,
    stops: Vec<(JsonValue, JsonValue)>,
) -> StyleResult<JsonValue> {
    let mut by_zoom: Vec<(JsonValue, Vec<(JsonValue, JsonValue)>)> = Vec::new();
    for (input, output) in stops {
        let zoom = input.get("zoom").cloned().unwrap_or(JsonValue::Null);
        let value = input.get("value").cloned().unwrap_or(JsonValue::Null);
        match by_zoom.iter_mut().find(|(z, _)| *z == zoom) {
            Some((_, group)) => group.push((value, output)),
            None => by_zoom.push((zoom, vec![(value, output)])),
        }
    }

    let mut feature_params = Map::new();
    for key in ["type", "property", "default"] {
        if let Some(value) = params.get(key) {
            feature_params.insert(key.to_string(), value.clone());
        }
    }

    let is_step = !spec.interpolated;
    let mut curve = if is_step {
        vec![json!("step"), json!(["zoom"])]
    } else {
        vec![json!(interpolate_operator(params)), json!(["linear"]), json!(["zoom"])]
    };
    for (zoom, group) in by_zoom {
        let output = convert_property_function(&feature_params, spec, group)?;
        append_stop_pair(&mut curve, zoom, output, is_step);
    }
    fixup_degenerate_step_curve(&mut curve);
    Ok(JsonValue::Array(curve))
}

/// Rewrite `"{field} text"` as a `concat` of `get` lookups.
///
/// Strings without tokens are returned unchanged.
pub fn convert_token_string(s: &str) -> JsonValue {
    let mut parts = vec![json!("concat")];
    let mut pos = 0;
    let mut search = 0;
    while let Some(offset) = s[search..].find('{') {
        let open = search + offset;
        let rest = &s[open + 1..];
        match rest.find(|c| c == '{' || c == '}') {
            Some(end) if end > 0 && rest.as_bytes()[end] == b'}' => {
                let text = &s[pos..open];
                if !text.is_empty() {
                    parts.push(json!(text));
                }
                parts.push(json!(["get", &rest[..end]]));
                pos = open + end + 2;
                search = pos;
            }
            _ => search = open + 1,
        }
    }

    if parts.len() == 1 {
        return json!(s);
    }
    if pos < s.len() {
        parts.push(json!(&s[pos..]));
    } else if parts.len() == 2 {
        return json!(["to-string", parts[1]]);
    }
    JsonValue::Array(parts)
}

/// Whether a filter is written in expression syntax.
pub fn is_expression_filter(filter: &JsonValue) -> bool {
    let items = match filter {
        JsonValue::Bool(_) => return true,
        JsonValue::Array(items) if !items.is_empty() => items,
        _ => return false,
    };
    match items[0].as_str() {
        Some("has") => items.len() >= 2 && items[1] != "$id" && items[1] != "$type",
        Some("in") => items.len() >= 3 && (!items[1].is_string() || items[2].is_array()),
        Some("!in" | "!has" | "none") => false,
        Some("==" | "!=" | ">" | ">=" | "<" | "<=") => {
            items.len() != 3 || items[1].is_array() || items[2].is_array()
        }
        Some("any" | "all") => items[1..]
            .iter()
            .all(|f| is_expression_filter(f) || f.is_boolean()),
        _ => true,
    }
}

fn filter_getter(property: &str) -> JsonValue {
    match property {
        "$type" => json!(["geometry-type"]),
        "$id" => json!(["id"]),
        _ => json!(["get", property]),
    }
}

fn convert_comparison(op: &str, property: &str, value: &JsonValue) -> JsonValue {
    let get = filter_getter(property);
    if property != "$id" && property != "$type" && value.is_null() {
        match op {
            "==" => return json!(["all", ["has", property], ["==", get, null]]),
            "!=" => return json!(["any", ["!", ["has", property]], ["!=", get, null]]),
            _ => {}
        }
    }
    json!([op, get, value])
}

fn convert_in(property: &str, values: &[JsonValue], negate: bool) -> JsonValue {
    if values.is_empty() {
        return json!(negate);
    }
    let get = filter_getter(property);
    let mut out = vec![json!(if negate { "all" } else { "any" })];
    let op = if negate { "!=" } else { "==" };
    out.extend(values.iter().map(|value| json!([op, get, value])));
    JsonValue::Array(out)
}

fn convert_has(property: &str) -> JsonValue {
    match property {
        "$type" => json!(true),
        "$id" => json!(["!=", ["id"], null]),
        _ => json!(["has", property]),
    }
}

/// Rewrite a legacy filter (`["==", "class", "road"]`) as an expression.
pub fn convert_filter(filter: &JsonValue) -> JsonValue {
    let Some(items) = filter.as_array() else {
        return json!(true);
    };
    let op = items.first().and_then(JsonValue::as_str).unwrap_or_default();
    if items.len() <= 1 {
        return json!(op != "any");
    }
    let property = items[1].as_str().unwrap_or_default();
    let nested = |filters: &[JsonValue]| filters.iter().map(convert_filter).collect::<Vec<_>>();
    match op {
        "==" | "!=" | "<" | ">" | "<=" | ">=" => {
            convert_comparison(op, property, items.get(2).unwrap_or(&JsonValue::Null))
        }
        "any" | "all" => {
            let mut out = vec![json!(op)];
            out.extend(nested(&items[1..]));
            JsonValue::Array(out)
        }
        "none" => {
            let mut out = vec![json!("all")];
            out.extend(nested(&items[1..]).into_iter().map(|f| json!(["!", f])));
            JsonValue::Array(out)
        }
        "in" => convert_in(property, &items[2..], false),
        "!in" => convert_in(property, &items[2..], true),
        "has" => convert_has(property),
        "!has" => json!(["!", convert_has(property)]),
        _ => json!(true),
    }
}

/// A compiled layer filter. An absent filter matches every feature.
#[derive(Debug, Default)]
pub struct FeatureFilter {
    expression: Option<StyleExpression>,
}

impl FeatureFilter {
    pub fn new(filter: Option<&JsonValue>) -> Result<Self, Vec<ParseError>> {
        let Some(filter) = filter.filter(|f| !f.is_null()) else {
            return Ok(Self::default());
        };
        let json = if is_expression_filter(filter) {
            filter.clone()
        } else {
            convert_filter(filter)
        };
        let ctx = ParsingContext::new(Some(Type::Boolean));
        match ctx.parse(&json, None) {
            Some(expr) if !ctx.has_errors() => Ok(Self {
                expression: Some(StyleExpression::new(expr, None)),
            }),
            _ => Err(ctx.errors()),
        }
    }

    pub fn matches(&self, ctx: &EvaluationContext) -> bool {
        match &self.expression {
            Some(expression) => expression.evaluate(ctx) == Value::Bool(true),
            None => true,
        }
    }
}
