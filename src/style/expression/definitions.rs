//! Builtin compound operators: signatures, overload resolution and evaluation.

use serde_json::Value as JsonValue;

use super::parser::ParsingContext;
use super::types::Type;
use super::{EvalResult, EvaluationContext, EvaluationError, Expression};
use crate::style::color::Color;
use crate::style::value::{type_of, PropertyMap, Value};

/// Operators evaluated by a plain function of their arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Error,
    TypeOf,
    ToRgba,
    Rgb,
    Rgba,
    Has,
    Get,
    FeatureState,
    Properties,
    GeometryType,
    Id,
    Zoom,
    HeatmapDensity,
    LineProgress,
    Accumulated,
    Add,
    Multiply,
    Subtract,
    Divide,
    Modulo,
    Power,
    E,
    Pi,
    Ln2,
    Sqrt,
    Log10,
    Ln,
    Log2,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Min,
    Max,
    Round,
    Abs,
    Ceil,
    Floor,
    Not,
    IsSupportedScript,
    Upcase,
    Downcase,
    Concat,
    ResolvedLocale,
}

/// Parameter list of one overload.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Fixed(Vec<Type>),
    Varargs(Type),
}

impl Params {
    fn describe(&self) -> String {
        match self {
            Params::Fixed(types) => {
                let names: Vec<String> = types.iter().map(|t| t.to_string()).collect();
                format!("({})", names.join(", "))
            }
            Params::Varargs(ty) => format!("({}...)", ty),
        }
    }

    fn param(&self, i: usize) -> Type {
        match self {
            Params::Fixed(types) => types.get(i).cloned().unwrap_or(Type::Value),
            Params::Varargs(ty) => ty.clone(),
        }
    }
}

const ALL: [Builtin; 46] = [
    Builtin::Error,
    Builtin::TypeOf,
    Builtin::ToRgba,
    Builtin::Rgb,
    Builtin::Rgba,
    Builtin::Has,
    Builtin::Get,
    Builtin::FeatureState,
    Builtin::Properties,
    Builtin::GeometryType,
    Builtin::Id,
    Builtin::Zoom,
    Builtin::HeatmapDensity,
    Builtin::LineProgress,
    Builtin::Accumulated,
    Builtin::Add,
    Builtin::Multiply,
    Builtin::Subtract,
    Builtin::Divide,
    Builtin::Modulo,
    Builtin::Power,
    Builtin::E,
    Builtin::Pi,
    Builtin::Ln2,
    Builtin::Sqrt,
    Builtin::Log10,
    Builtin::Ln,
    Builtin::Log2,
    Builtin::Sin,
    Builtin::Cos,
    Builtin::Tan,
    Builtin::Asin,
    Builtin::Acos,
    Builtin::Atan,
    Builtin::Min,
    Builtin::Max,
    Builtin::Round,
    Builtin::Abs,
    Builtin::Ceil,
    Builtin::Floor,
    Builtin::Not,
    Builtin::IsSupportedScript,
    Builtin::Upcase,
    Builtin::Downcase,
    Builtin::Concat,
    Builtin::ResolvedLocale,
];

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        ALL.iter().copied().find(|b| b.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Error => "error",
            Builtin::TypeOf => "typeof",
            Builtin::ToRgba => "to-rgba",
            Builtin::Rgb => "rgb",
            Builtin::Rgba => "rgba",
            Builtin::Has => "has",
            Builtin::Get => "get",
            Builtin::FeatureState => "feature-state",
            Builtin::Properties => "properties",
            Builtin::GeometryType => "geometry-type",
            Builtin::Id => "id",
            Builtin::Zoom => "zoom",
            Builtin::HeatmapDensity => "heatmap-density",
            Builtin::LineProgress => "line-progress",
            Builtin::Accumulated => "accumulated",
            Builtin::Add => "+",
            Builtin::Multiply => "*",
            Builtin::Subtract => "-",
            Builtin::Divide => "/",
            Builtin::Modulo => "%",
            Builtin::Power => "^",
            Builtin::E => "e",
            Builtin::Pi => "pi",
            Builtin::Ln2 => "ln2",
            Builtin::Sqrt => "sqrt",
            Builtin::Log10 => "log10",
            Builtin::Ln => "ln",
            Builtin::Log2 => "log2",
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::Asin => "asin",
            Builtin::Acos => "acos",
            Builtin::Atan => "atan",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Round => "round",
            Builtin::Abs => "abs",
            Builtin::Ceil => "ceil",
            Builtin::Floor => "floor",
            Builtin::Not => "!",
            Builtin::IsSupportedScript => "is-supported-script",
            Builtin::Upcase => "upcase",
            Builtin::Downcase => "downcase",
            Builtin::Concat => "concat",
            Builtin::ResolvedLocale => "resolved-locale",
        }
    }

    pub fn result_type(&self) -> Type {
        match self {
            Builtin::Error => Type::Error,
            Builtin::TypeOf
            | Builtin::GeometryType
            | Builtin::Upcase
            | Builtin::Downcase
            | Builtin::Concat
            | Builtin::ResolvedLocale => Type::String,
            Builtin::ToRgba => Type::array_n(Type::Number, 4),
            Builtin::Rgb | Builtin::Rgba => Type::Color,
            Builtin::Has | Builtin::Not | Builtin::IsSupportedScript => Type::Boolean,
            Builtin::Get | Builtin::FeatureState | Builtin::Id => Type::Value,
            Builtin::Properties => Type::Object,
            _ => Type::Number,
        }
    }

    pub fn overloads(&self) -> Vec<Params> {
        use Params::{Fixed, Varargs};
        let n = || Type::Number;
        match self {
            Builtin::Error => vec![Fixed(vec![Type::String])],
            Builtin::TypeOf => vec![Fixed(vec![Type::Value])],
            Builtin::ToRgba => vec![Fixed(vec![Type::Color])],
            Builtin::Rgb => vec![Fixed(vec![n(), n(), n()])],
            Builtin::Rgba => vec![Fixed(vec![n(), n(), n(), n()])],
            Builtin::Has | Builtin::Get => vec![
                Fixed(vec![Type::String]),
                Fixed(vec![Type::String, Type::Object]),
            ],
            Builtin::FeatureState => vec![Fixed(vec![Type::String])],
            Builtin::Properties
            | Builtin::GeometryType
            | Builtin::Id
            | Builtin::Zoom
            | Builtin::HeatmapDensity
            | Builtin::LineProgress
            | Builtin::Accumulated
            | Builtin::E
            | Builtin::Pi
            | Builtin::Ln2 => vec![Fixed(vec![])],
            Builtin::Add | Builtin::Multiply | Builtin::Min | Builtin::Max => vec![Varargs(n())],
            Builtin::Subtract => vec![Fixed(vec![n(), n()]), Fixed(vec![n()])],
            Builtin::Divide | Builtin::Modulo | Builtin::Power => vec![Fixed(vec![n(), n()])],
            Builtin::Sqrt
            | Builtin::Log10
            | Builtin::Ln
            | Builtin::Log2
            | Builtin::Sin
            | Builtin::Cos
            | Builtin::Tan
            | Builtin::Asin
            | Builtin::Acos
            | Builtin::Atan
            | Builtin::Round
            | Builtin::Abs
            | Builtin::Ceil
            | Builtin::Floor => vec![Fixed(vec![n()])],
            Builtin::Not => vec![Fixed(vec![Type::Boolean])],
            Builtin::IsSupportedScript | Builtin::Upcase | Builtin::Downcase => {
                vec![Fixed(vec![Type::String])]
            }
            Builtin::Concat => vec![Varargs(Type::Value)],
            Builtin::ResolvedLocale => vec![Fixed(vec![Type::Collator])],
        }
    }
}

/// Resolve the overload of `op` that type-checks against `args`.
pub(crate) fn parse_compound(
    op: Builtin,
    args: &[JsonValue],
    ctx: &ParsingContext,
) -> Option<Expression> {
    let arg_count = args.len() - 1;
    let available = op.overloads();
    let overloads: Vec<&Params> = available
        .iter()
        .filter(|params| match params {
            Params::Fixed(types) => types.len() == arg_count,
            Params::Varargs(_) => true,
        })
        .collect();

    let mut last_ctx: Option<ParsingContext> = None;
    for params in &overloads {
        let signature_ctx = ctx.fork();
        let mut parsed_args = Vec::with_capacity(arg_count);
        for (i, arg) in args.iter().enumerate().skip(1) {
            match signature_ctx.parse_at(arg, i, Some(params.param(i - 1))) {
                Some(parsed) => parsed_args.push(parsed),
                None => break,
            }
        }
        if parsed_args.len() == arg_count {
            for (i, arg) in parsed_args.iter().enumerate() {
                signature_ctx
                    .concat(Some(i + 1), None, None)
                    .check_subtype(&params.param(i), &arg.ty());
            }
            if !signature_ctx.has_errors() {
                return Some(Expression::Compound {
                    op,
                    ty: op.result_type(),
                    args: parsed_args,
                });
            }
        }
        last_ctx = Some(signature_ctx);
    }

    if overloads.len() == 1 {
        if let Some(signature_ctx) = last_ctx {
            ctx.extend_errors(signature_ctx.errors());
        }
        return None;
    }

    let described: Vec<String> = if overloads.is_empty() {
        available.iter().map(Params::describe).collect()
    } else {
        overloads.iter().map(|p| p.describe()).collect()
    };
    let mut actual = Vec::with_capacity(arg_count);
    for (i, arg) in args.iter().enumerate().skip(1) {
        actual.push(ctx.parse_at(arg, i, None)?.ty().to_string());
    }
    ctx.error(format!(
        "Expected arguments of type {}, but found ({}) instead.",
        described.join(" | "),
        actual.join(", ")
    ))
}

/// Range check shared by `rgb`, `rgba` and color coercion.
pub(crate) fn validate_rgba(r: &Value, g: &Value, b: &Value, a: Option<&Value>) -> Option<String> {
    let in_range = |v: &Value, max: f64| matches!(v, Value::Number(n) if *n >= 0.0 && *n <= max);
    let describe = |values: &[&Value]| {
        values
            .iter()
            .map(|v| v.to_display_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    if !(in_range(r, 255.0) && in_range(g, 255.0) && in_range(b, 255.0)) {
        let listed = match a {
            Some(a @ Value::Number(_)) => describe(&[r, g, b, a]),
            _ => describe(&[r, g, b]),
        };
        return Some(format!(
            "Invalid rgba value [{}]: 'r', 'g', and 'b' must be between 0 and 255.",
            listed
        ));
    }
    match a {
        None => None,
        Some(a) if in_range(a, 1.0) => None,
        Some(a) => Some(format!(
            "Invalid rgba value [{}]: 'a' must be between 0 and 1.",
            describe(&[r, g, b, a])
        )),
    }
}

/// Whether `c` belongs to a script that shapes right to left.
pub fn is_rtl_char(c: char) -> bool {
    matches!(c as u32,
        0x0590..=0x05FF
        | 0x0600..=0x06FF
        | 0x0700..=0x074F
        | 0x0750..=0x077F
        | 0x0780..=0x07BF
        | 0x07C0..=0x07FF
        | 0x08A0..=0x08FF
        | 0xFB1D..=0xFB4F
        | 0xFB50..=0xFDFF
        | 0xFE70..=0xFEFF)
}

fn type_error(expected: &str, value: &Value) -> EvaluationError {
    EvaluationError::new(format!(
        "Expected value to be of type {}, but found {} instead.",
        expected,
        type_of(value)
    ))
}

fn eval_number(arg: &Expression, ctx: &EvaluationContext) -> Result<f64, EvaluationError> {
    match arg.evaluate(ctx)? {
        Value::Number(n) => Ok(n),
        other => Err(type_error("number", &other)),
    }
}

fn eval_string(arg: &Expression, ctx: &EvaluationContext) -> Result<String, EvaluationError> {
    match arg.evaluate(ctx)? {
        Value::String(s) => Ok(s),
        other => Err(type_error("string", &other)),
    }
}

fn eval_numbers(args: &[Expression], ctx: &EvaluationContext) -> Result<Vec<f64>, EvaluationError> {
    args.iter().map(|arg| eval_number(arg, ctx)).collect()
}

fn unary(args: &[Expression], ctx: &EvaluationContext, f: fn(f64) -> f64) -> EvalResult {
    match args.first() {
        Some(arg) => Ok(Value::Number(f(eval_number(arg, ctx)?))),
        None => Err(EvaluationError::new("Expected one argument.")),
    }
}

fn binary(args: &[Expression], ctx: &EvaluationContext, f: fn(f64, f64) -> f64) -> EvalResult {
    match args {
        [lhs, rhs] => Ok(Value::Number(f(eval_number(lhs, ctx)?, eval_number(rhs, ctx)?))),
        _ => Err(EvaluationError::new("Expected two arguments.")),
    }
}

fn evaluate_rgba(args: &[Expression], ctx: &EvaluationContext) -> EvalResult {
    let values = args
        .iter()
        .map(|arg| arg.evaluate(ctx))
        .collect::<Result<Vec<_>, _>>()?;
    let [r, g, b] = match values.get(..3) {
        Some([r, g, b]) => [r, g, b],
        _ => return Err(EvaluationError::new("Expected three or four arguments.")),
    };
    let a = values.get(3);
    if let Some(error) = validate_rgba(r, g, b, a) {
        return Err(EvaluationError::new(error));
    }
    let channel = |v: &Value| v.as_f64().unwrap_or(0.0);
    let alpha = a.and_then(Value::as_f64).unwrap_or(1.0);
    Ok(Value::Color(Color::new(
        channel(r) / 255.0,
        channel(g) / 255.0,
        channel(b) / 255.0,
        alpha,
    )))
}

/// Fold that propagates NaN, unlike `f64::min` and `f64::max`.
fn fold_nan(values: Vec<f64>, init: f64, f: fn(f64, f64) -> f64) -> f64 {
    values.into_iter().fold(init, |acc, v| {
        if acc.is_nan() || v.is_nan() {
            f64::NAN
        } else {
            f(acc, v)
        }
    })
}

fn lookup(key: &str, object: Option<&PropertyMap>) -> Value {
    object.and_then(|map| map.get(key)).cloned().unwrap_or(Value::Null)
}

/// Evaluate a builtin against already type-checked arguments.
pub(crate) fn evaluate_builtin(
    op: Builtin,
    args: &[Expression],
    ctx: &EvaluationContext,
) -> EvalResult {
    match op {
        Builtin::Error => Err(EvaluationError::new(eval_string(&args[0], ctx)?)),
        Builtin::TypeOf => Ok(Value::String(type_of(&args[0].evaluate(ctx)?).to_string())),
        Builtin::ToRgba => match args[0].evaluate(ctx)? {
            Value::Color(c) => Ok(Value::Array(
                c.to_rgba().iter().map(|v| Value::Number(*v)).collect(),
            )),
            other => Err(type_error("color", &other)),
        },
        Builtin::Rgb | Builtin::Rgba => evaluate_rgba(args, ctx),
        Builtin::Has | Builtin::Get => {
            let key = eval_string(&args[0], ctx)?;
            let explicit;
            let object = if args.len() == 2 {
                explicit = match args[1].evaluate(ctx)? {
                    Value::Object(map) => map,
                    other => return Err(type_error("object", &other)),
                };
                Some(&explicit)
            } else {
                ctx.properties()
            };
            if op == Builtin::Has {
                Ok(Value::Bool(object.map_or(false, |map| map.contains_key(&key))))
            } else {
                Ok(lookup(&key, object))
            }
        }
        Builtin::FeatureState => {
            let key = eval_string(&args[0], ctx)?;
            Ok(lookup(&key, ctx.feature_state))
        }
        Builtin::Properties => Ok(Value::Object(
            ctx.properties().cloned().unwrap_or_default(),
        )),
        Builtin::GeometryType => Ok(ctx
            .feature
            .map(|f| Value::String(f.geometry_type.name().to_string()))
            .unwrap_or(Value::Null)),
        Builtin::Id => Ok(ctx
            .feature
            .and_then(|f| f.id.clone())
            .unwrap_or(Value::Null)),
        Builtin::Zoom => Ok(Value::Number(ctx.globals.zoom)),
        Builtin::HeatmapDensity => Ok(Value::Number(ctx.globals.heatmap_density.unwrap_or(0.0))),
        Builtin::LineProgress => Ok(Value::Number(ctx.globals.line_progress.unwrap_or(0.0))),
        Builtin::Accumulated => Ok(ctx
            .globals
            .accumulated
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        Builtin::Add => Ok(Value::Number(eval_numbers(args, ctx)?.iter().sum())),
        Builtin::Multiply => Ok(Value::Number(eval_numbers(args, ctx)?.iter().product())),
        Builtin::Subtract => match args {
            [only] => Ok(Value::Number(-eval_number(only, ctx)?)),
            _ => binary(args, ctx, |a, b| a - b),
        },
        Builtin::Divide => binary(args, ctx, |a, b| a / b),
        Builtin::Modulo => binary(args, ctx, |a, b| a % b),
        Builtin::Power => binary(args, ctx, f64::powf),
        Builtin::E => Ok(Value::Number(std::f64::consts::E)),
        Builtin::Pi => Ok(Value::Number(std::f64::consts::PI)),
        Builtin::Ln2 => Ok(Value::Number(std::f64::consts::LN_2)),
        Builtin::Sqrt => unary(args, ctx, f64::sqrt),
        Builtin::Log10 => unary(args, ctx, f64::log10),
        Builtin::Ln => unary(args, ctx, f64::ln),
        Builtin::Log2 => unary(args, ctx, f64::log2),
        Builtin::Sin => unary(args, ctx, f64::sin),
        Builtin::Cos => unary(args, ctx, f64::cos),
        Builtin::Tan => unary(args, ctx, f64::tan),
        Builtin::Asin => unary(args, ctx, f64::asin),
        Builtin::Acos => unary(args, ctx, f64::acos),
        Builtin::Atan => unary(args, ctx, f64::atan),
        Builtin::Min => Ok(Value::Number(fold_nan(eval_numbers(args, ctx)?, f64::INFINITY, f64::min))),
        Builtin::Max => Ok(Value::Number(fold_nan(eval_numbers(args, ctx)?, f64::NEG_INFINITY, f64::max))),
        // Half away from zero
        Builtin::Round => unary(args, ctx, f64::round),
        Builtin::Abs => unary(args, ctx, f64::abs),
        Builtin::Ceil => unary(args, ctx, f64::ceil),
        Builtin::Floor => unary(args, ctx, f64::floor),
        Builtin::Not => match args[0].evaluate(ctx)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(type_error("boolean", &other)),
        },
        Builtin::IsSupportedScript => {
            let text = eval_string(&args[0], ctx)?;
            let supported = ctx.globals.rtl_text_supported || !text.chars().any(is_rtl_char);
            Ok(Value::Bool(supported))
        }
        Builtin::Upcase => Ok(Value::String(eval_string(&args[0], ctx)?.to_uppercase())),
        Builtin::Downcase => Ok(Value::String(eval_string(&args[0], ctx)?.to_lowercase())),
        Builtin::Concat => {
            let mut out = String::new();
            for arg in args {
                out.push_str(&arg.evaluate(ctx)?.to_display_string());
            }
            Ok(Value::String(out))
        }
        Builtin::ResolvedLocale => match args[0].evaluate(ctx)? {
            Value::Collator(collator) => Ok(Value::String(collator.resolved_locale())),
            other => Err(type_error("collator", &other)),
        },
    }
}
