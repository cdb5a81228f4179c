//! Compiles JSON expressions into typed [`Expression`] trees.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value as JsonValue};

use super::definitions::{parse_compound, Builtin};
use super::interpolate::{parse_interpolate, parse_step};
use super::types::{check_subtype, is_valid_type, Type, TypeKind};
use super::within::parse_within;
use super::{
    is_feature_constant, is_global_property_constant, ComparisonOp, EvaluationContext,
    Expression, FormatSectionExpression, MatchKey, ParseError,
};
use crate::style::value::{type_of, Value};

/// Largest integer exactly representable as an f64.
pub const MAX_SAFE_INTEGER: f64 = 9007199254740991.0;

/// How a node whose type is looser than expected gets reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeAnnotation {
    Assert,
    Coerce,
    Omit,
}

/// Variables bound by enclosing `let` expressions.
#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<Rc<Scope>>,
    bindings: HashMap<String, Rc<Expression>>,
}

impl Scope {
    fn get(&self, name: &str) -> Option<Rc<Expression>> {
        match self.bindings.get(name) {
            Some(bound) => Some(Rc::clone(bound)),
            None => self.parent.as_ref().and_then(|parent| parent.get(name)),
        }
    }
}

/// Parser state for one position in the JSON tree.
///
/// Child contexts share the error list with their parent, so errors found
/// anywhere surface from the root.
#[derive(Debug, Clone)]
pub struct ParsingContext {
    key: String,
    scope: Rc<Scope>,
    expected: Option<Type>,
    errors: Rc<RefCell<Vec<ParseError>>>,
}

impl ParsingContext {
    pub fn new(expected: Option<Type>) -> Self {
        Self {
            key: String::new(),
            scope: Rc::new(Scope::default()),
            expected,
            errors: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn expected_type(&self) -> Option<&Type> {
        self.expected.as_ref()
    }

    pub fn errors(&self) -> Vec<ParseError> {
        self.errors.borrow().clone()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.borrow().is_empty()
    }

    /// Child context for argument `index`.
    pub fn concat(
        &self,
        index: Option<usize>,
        expected: Option<Type>,
        bindings: Option<Vec<(String, Rc<Expression>)>>,
    ) -> ParsingContext {
        let key = match index {
            Some(i) => format!("{}[{}]", self.key, i),
            None => self.key.clone(),
        };
        let scope = match bindings {
            Some(bindings) => Rc::new(Scope {
                parent: Some(Rc::clone(&self.scope)),
                bindings: bindings.into_iter().collect(),
            }),
            None => Rc::clone(&self.scope),
        };
        ParsingContext {
            key,
            scope,
            expected,
            errors: Rc::clone(&self.errors),
        }
    }

    /// Same position and scope, no expected type, separate error list.
    pub(crate) fn fork(&self) -> ParsingContext {
        ParsingContext {
            key: self.key.clone(),
            scope: Rc::clone(&self.scope),
            expected: None,
            errors: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Record an error at this context's key. Always returns `None`.
    pub fn error<T>(&self, message: impl Into<String>) -> Option<T> {
        self.error_at(message, &[])
    }

    /// Record an error at a sub-key of this context.
    pub fn error_at<T>(&self, message: impl Into<String>, keys: &[usize]) -> Option<T> {
        let mut key = self.key.clone();
        for k in keys {
            key.push_str(&format!("[{}]", k));
        }
        self.errors.borrow_mut().push(ParseError::new(key, message));
        None
    }

    /// Record and return a subtype mismatch, if any.
    pub fn check_subtype(&self, expected: &Type, actual: &Type) -> Option<String> {
        let error = check_subtype(expected, actual);
        if let Some(message) = &error {
            self.error::<()>(message.clone());
        }
        error
    }

    pub(crate) fn extend_errors(&self, errors: Vec<ParseError>) {
        self.errors.borrow_mut().extend(errors);
    }

    /// Parse argument `index` with an expected type.
    pub fn parse_at(
        &self,
        json: &JsonValue,
        index: usize,
        expected: Option<Type>,
    ) -> Option<Expression> {
        self.concat(Some(index), expected, None).parse(json, None)
    }

    /// Parse argument `index` with extra bindings and an explicit annotation mode.
    pub fn parse_with(
        &self,
        json: &JsonValue,
        index: usize,
        expected: Option<Type>,
        bindings: Option<Vec<(String, Rc<Expression>)>>,
        annotation: Option<TypeAnnotation>,
    ) -> Option<Expression> {
        self.concat(Some(index), expected, bindings)
            .parse(json, annotation)
    }

    /// Parse `json` at this context's position.
    pub fn parse(&self, json: &JsonValue, annotation: Option<TypeAnnotation>) -> Option<Expression> {
        let items = match json {
            JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::String(_) => {
                let wrapped = JsonValue::Array(vec![JsonValue::from("literal"), json.clone()]);
                return self.parse(&wrapped, annotation);
            }
            JsonValue::Object(_) => {
                return self.error("Bare objects invalid. Use [\"literal\", {...}] instead.");
            }
            JsonValue::Array(items) => items,
        };

        let Some(first) = items.first() else {
            return self.error(
                "Expected an array with at least one element. If you wanted a literal array, use [\"literal\", []].",
            );
        };
        let Some(op) = first.as_str() else {
            return self.error_at(
                format!(
                    "Expression name must be a string, but found {} instead. If you wanted a literal array, use [\"literal\", [...]].",
                    json_type_name(first)
                ),
                &[0],
            );
        };

        let mut parsed = parse_operator(op, items, self)?;

        if let Some(expected) = &self.expected {
            let actual = parsed.ty();
            let annotate = |parsed: Expression, default: TypeAnnotation| {
                match annotation.unwrap_or(default) {
                    TypeAnnotation::Assert => Expression::Assertion {
                        ty: expected.clone(),
                        args: vec![parsed],
                    },
                    TypeAnnotation::Coerce => Expression::Coercion {
                        ty: expected.clone(),
                        args: vec![parsed],
                    },
                    TypeAnnotation::Omit => parsed,
                }
            };
            match (expected.kind(), actual.kind()) {
                (
                    TypeKind::String
                    | TypeKind::Number
                    | TypeKind::Boolean
                    | TypeKind::Object
                    | TypeKind::Array,
                    TypeKind::Value,
                ) => parsed = annotate(parsed, TypeAnnotation::Assert),
                (
                    TypeKind::Color | TypeKind::Formatted | TypeKind::ResolvedImage,
                    TypeKind::Value | TypeKind::String,
                ) => parsed = annotate(parsed, TypeAnnotation::Coerce),
                (TypeKind::Padding, TypeKind::Value | TypeKind::Number | TypeKind::Array) => {
                    parsed = annotate(parsed, TypeAnnotation::Coerce)
                }
                _ => {
                    if self.check_subtype(expected, &actual).is_some() {
                        return None;
                    }
                }
            }
        }

        // Fold constant subtrees into literals
        if !matches!(parsed, Expression::Literal { .. })
            && parsed.ty() != Type::ResolvedImage
            && is_constant(&parsed)
        {
            let ctx = EvaluationContext::default();
            match parsed.evaluate(&ctx) {
                Ok(value) => {
                    parsed = Expression::Literal {
                        ty: parsed.ty(),
                        value,
                    }
                }
                Err(e) => return self.error(e.0),
            }
        }

        Some(parsed)
    }

    fn lookup(&self, name: &str) -> Option<Rc<Expression>> {
        self.scope.get(name)
    }
}

/// Compile `json`, returning the expression or every error found.
pub fn parse_expression(
    json: &JsonValue,
    expected: Option<Type>,
) -> Result<Expression, Vec<ParseError>> {
    let ctx = ParsingContext::new(expected);
    match ctx.parse(json, None) {
        Some(expr) if !ctx.has_errors() => Ok(expr),
        _ => Err(ctx.errors()),
    }
}

fn is_constant(expr: &Expression) -> bool {
    match expr {
        Expression::Var { bound, .. } => return is_constant(bound),
        Expression::Compound {
            op: Builtin::Error,
            ..
        }
        | Expression::Collator { .. }
        | Expression::Within(_) => return false,
        _ => {}
    }
    let is_annotation = matches!(
        expr,
        Expression::Assertion { .. } | Expression::Coercion { .. }
    );
    let mut children_constant = true;
    expr.each_child(&mut |child| {
        if !children_constant {
            return;
        }
        children_constant = if is_annotation {
            is_constant(child)
        } else {
            matches!(child, Expression::Literal { .. })
        };
    });
    children_constant
        && is_feature_constant(expr)
        && is_global_property_constant(
            expr,
            &[
                "zoom",
                "heatmap-density",
                "line-progress",
                "accumulated",
                "is-supported-script",
            ],
        )
}

/// JavaScript `typeof` names, which error messages report.
pub(crate) fn json_type_name(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => "object",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
    }
}

const SPECIAL_FORMS: &[&str] = &[
    "literal",
    "let",
    "var",
    "array",
    "boolean",
    "number",
    "string",
    "object",
    "to-boolean",
    "to-color",
    "to-number",
    "to-string",
    "at",
    "in",
    "index-of",
    "slice",
    "length",
    "match",
    "case",
    "coalesce",
    "step",
    "interpolate",
    "interpolate-hcl",
    "interpolate-lab",
    "all",
    "any",
    "collator",
    "format",
    "image",
    "number-format",
    "within",
];

/// Whether `op` names an expression operator.
pub fn is_expression_name(op: &str) -> bool {
    SPECIAL_FORMS.contains(&op) || ComparisonOp::from_name(op).is_some() || Builtin::from_name(op).is_some()
}

/// Whether `json` is written in expression syntax rather than as a plain value.
pub fn is_expression(json: &JsonValue) -> bool {
    match json.as_array().and_then(|items| items.first()) {
        Some(JsonValue::String(op)) => is_expression_name(op),
        _ => false,
    }
}

fn parse_operator(op: &str, args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    match op {
        "literal" => parse_literal(args, ctx),
        "let" => parse_let(args, ctx),
        "var" => parse_var(args, ctx),
        "array" | "boolean" | "number" | "string" | "object" => parse_assertion(op, args, ctx),
        "to-boolean" | "to-color" | "to-number" | "to-string" => parse_coercion(op, args, ctx),
        "at" => parse_at_index(args, ctx),
        "in" => parse_in(args, ctx),
        "index-of" => parse_index_of(args, ctx),
        "slice" => parse_slice(args, ctx),
        "length" => parse_length(args, ctx),
        "match" => parse_match(args, ctx),
        "case" => parse_case(args, ctx),
        "coalesce" => parse_coalesce(args, ctx),
        "step" => parse_step(args, ctx),
        "interpolate" | "interpolate-hcl" | "interpolate-lab" => parse_interpolate(op, args, ctx),
        "all" | "any" => parse_boolean_reduction(op, args, ctx),
        "collator" => parse_collator(args, ctx),
        "format" => parse_format(args, ctx),
        "image" => parse_image(args, ctx),
        "number-format" => parse_number_format(args, ctx),
        "within" => parse_within(args, ctx),
        _ => {
            if let Some(cmp) = ComparisonOp::from_name(op) {
                return parse_comparison(cmp, args, ctx);
            }
            match Builtin::from_name(op) {
                Some(builtin) => parse_compound(builtin, args, ctx),
                None => ctx.error_at(
                    format!(
                        "Unknown expression \"{}\". If you wanted a literal array, use [\"literal\", [...]].",
                        op
                    ),
                    &[0],
                ),
            }
        }
    }
}

fn parse_literal(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() != 2 {
        return ctx.error(format!(
            "'literal' expression requires exactly one argument, but found {} instead.",
            args.len() - 1
        ));
    }
    let value = Value::from_json(&args[1]);
    let mut ty = type_of(&value);
    if matches!(ty, Type::Array { n: Some(0), .. }) {
        if let Some(expected @ Type::Array { n, .. }) = ctx.expected_type() {
            if n.is_none() || *n == Some(0) {
                ty = expected.clone();
            }
        }
    }
    Some(Expression::Literal { ty, value })
}

fn is_valid_variable_name(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_let(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() < 4 {
        return ctx.error(format!(
            "Expected at least 3 arguments, but found {} instead.",
            args.len() - 1
        ));
    }
    let mut bindings = Vec::new();
    let mut i = 1;
    while i < args.len() - 1 {
        let Some(name) = args[i].as_str() else {
            return ctx.error_at(
                format!(
                    "Expected string, but found {} instead.",
                    json_type_name(&args[i])
                ),
                &[i],
            );
        };
        if !is_valid_variable_name(name) {
            return ctx.error_at(
                "Variable names must contain only alphanumeric characters or '_'.",
                &[i],
            );
        }
        let value = ctx.parse_at(&args[i + 1], i + 1, None)?;
        bindings.push((name.to_string(), Rc::new(value)));
        i += 2;
    }
    let last = args.len() - 1;
    let result = ctx.parse_with(
        &args[last],
        last,
        ctx.expected_type().cloned(),
        Some(bindings.clone()),
        None,
    )?;
    Some(Expression::Let {
        bindings,
        result: Box::new(result),
    })
}

fn parse_var(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    let name = match args {
        [_, JsonValue::String(name)] => name,
        _ => return ctx.error("'var' expression requires exactly one string literal argument."),
    };
    match ctx.lookup(name) {
        Some(bound) => Some(Expression::Var {
            name: name.clone(),
            bound,
        }),
        None => ctx.error_at(
            format!(
                "Unknown variable \"{0}\". Make sure \"{0}\" has been bound in an enclosing \"let\" expression before using it.",
                name
            ),
            &[1],
        ),
    }
}

fn parse_assertion(op: &str, args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() < 2 {
        return ctx.error("Expected at least one argument.");
    }
    let mut i = 1;
    let ty = match op {
        "array" => {
            let mut item = Type::Value;
            if args.len() > 2 {
                item = match args[1].as_str() {
                    Some("string") => Type::String,
                    Some("number") => Type::Number,
                    Some("boolean") => Type::Boolean,
                    _ => {
                        return ctx.error_at(
                            "The item type argument of \"array\" must be one of string, number, boolean",
                            &[1],
                        )
                    }
                };
                i += 1;
            }
            let mut n = None;
            if args.len() > 3 {
                match &args[2] {
                    JsonValue::Null => {}
                    JsonValue::Number(num) => match num.as_f64() {
                        Some(v) if v >= 0.0 && v.fract() == 0.0 => n = Some(v as usize),
                        _ => {
                            return ctx.error_at(
                                "The length argument to \"array\" must be a positive integer literal",
                                &[2],
                            )
                        }
                    },
                    _ => {
                        return ctx.error_at(
                            "The length argument to \"array\" must be a positive integer literal",
                            &[2],
                        )
                    }
                }
                i += 1;
            }
            Type::Array {
                item: Box::new(item),
                n,
            }
        }
        "boolean" => Type::Boolean,
        "number" => Type::Number,
        "string" => Type::String,
        _ => Type::Object,
    };
    let mut parsed = Vec::new();
    while i < args.len() {
        parsed.push(ctx.parse_at(&args[i], i, Some(Type::Value))?);
        i += 1;
    }
    Some(Expression::Assertion { ty, args: parsed })
}

fn parse_coercion(op: &str, args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() < 2 {
        return ctx.error("Expected at least one argument.");
    }
    if (op == "to-boolean" || op == "to-string") && args.len() != 2 {
        return ctx.error("Expected one argument.");
    }
    let ty = match op {
        "to-boolean" => Type::Boolean,
        "to-color" => Type::Color,
        "to-number" => Type::Number,
        _ => Type::String,
    };
    let mut parsed = Vec::new();
    for (i, arg) in args.iter().enumerate().skip(1) {
        parsed.push(ctx.parse_at(arg, i, Some(Type::Value))?);
    }
    Some(Expression::Coercion { ty, args: parsed })
}

fn parse_at_index(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() != 3 {
        return ctx.error(format!(
            "Expected 2 arguments, but found {} instead.",
            args.len() - 1
        ));
    }
    let index = ctx.parse_at(&args[1], 1, Some(Type::Number));
    let item = ctx.expected_type().cloned().unwrap_or(Type::Value);
    let input = ctx.parse_at(&args[2], 2, Some(Type::array(item)));
    let (index, input) = (index?, input?);
    let ty = input.ty().item_type().cloned().unwrap_or(Type::Value);
    Some(Expression::At {
        ty,
        index: Box::new(index),
        input: Box::new(input),
    })
}

const NEEDLE_KINDS: [TypeKind; 5] = [
    TypeKind::Boolean,
    TypeKind::String,
    TypeKind::Number,
    TypeKind::Null,
    TypeKind::Value,
];
const HAYSTACK_KINDS: [TypeKind; 3] = [TypeKind::String, TypeKind::Array, TypeKind::Value];

fn check_needle_and_haystack(
    needle: &Expression,
    haystack: &Expression,
    ctx: &ParsingContext,
) -> Option<()> {
    if !is_valid_type(&needle.ty(), &NEEDLE_KINDS) {
        return ctx.error(format!(
            "Expected first argument to be of type boolean, string, number or null, but found {} instead",
            needle.ty()
        ));
    }
    if !is_valid_type(&haystack.ty(), &HAYSTACK_KINDS) {
        return ctx.error(format!(
            "Expected second argument to be of type array or string, but found {} instead",
            haystack.ty()
        ));
    }
    Some(())
}

fn parse_in(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() != 3 {
        return ctx.error(format!(
            "Expected 2 arguments, but found {} instead.",
            args.len() - 1
        ));
    }
    let needle = ctx.parse_at(&args[1], 1, Some(Type::Value));
    let haystack = ctx.parse_at(&args[2], 2, Some(Type::Value));
    let (needle, haystack) = (needle?, haystack?);
    check_needle_and_haystack(&needle, &haystack, ctx)?;
    Some(Expression::In {
        needle: Box::new(needle),
        haystack: Box::new(haystack),
    })
}

fn parse_index_of(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() <= 2 || args.len() >= 5 {
        return ctx.error(format!(
            "Expected 3 or 4 arguments, but found {} instead.",
            args.len() - 1
        ));
    }
    let needle = ctx.parse_at(&args[1], 1, Some(Type::Value));
    let haystack = ctx.parse_at(&args[2], 2, Some(Type::Value));
    let (needle, haystack) = (needle?, haystack?);
    check_needle_and_haystack(&needle, &haystack, ctx)?;
    let from_index = if args.len() == 4 {
        Some(Box::new(ctx.parse_at(&args[3], 3, Some(Type::Number))?))
    } else {
        None
    };
    Some(Expression::IndexOf {
        needle: Box::new(needle),
        haystack: Box::new(haystack),
        from_index,
    })
}

fn parse_slice(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() <= 2 || args.len() >= 5 {
        return ctx.error(format!(
            "Expected 3 or 4 arguments, but found {} instead.",
            args.len() - 1
        ));
    }
    let input = ctx.parse_at(&args[1], 1, Some(Type::Value));
    let begin = ctx.parse_at(&args[2], 2, Some(Type::Number));
    let (input, begin) = (input?, begin?);
    let input_ty = input.ty();
    if !is_valid_type(&input_ty, &HAYSTACK_KINDS) {
        return ctx.error(format!(
            "Expected first argument to be of type array or string, but found {} instead",
            input_ty
        ));
    }
    let end = if args.len() == 4 {
        Some(Box::new(ctx.parse_at(&args[3], 3, Some(Type::Number))?))
    } else {
        None
    };
    // Slicing changes the length, so only the item type survives
    let ty = match input_ty {
        Type::Array { item, .. } => Type::Array { item, n: None },
        other => other,
    };
    Some(Expression::Slice {
        ty,
        input: Box::new(input),
        begin: Box::new(begin),
        end,
    })
}

fn parse_length(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() != 2 {
        return ctx.error(format!(
            "Expected 1 argument, but found {} instead.",
            args.len() - 1
        ));
    }
    let input = ctx.parse_at(&args[1], 1, None)?;
    if !is_valid_type(&input.ty(), &HAYSTACK_KINDS) {
        return ctx.error(format!(
            "Expected argument of type string or array, but found {} instead.",
            input.ty()
        ));
    }
    Some(Expression::Length(Box::new(input)))
}

/// Output type to enforce on branches: the expected type unless it is `value`.
fn branch_output_type(ctx: &ParsingContext) -> Option<Type> {
    ctx.expected_type()
        .filter(|t| **t != Type::Value)
        .cloned()
}

fn parse_match(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() < 5 {
        return ctx.error(format!(
            "Expected at least 4 arguments, but found only {}.",
            args.len() - 1
        ));
    }
    if args.len() % 2 != 1 {
        return ctx.error("Expected an even number of arguments.");
    }

    let mut input_type: Option<Type> = None;
    let mut output_type = branch_output_type(ctx);
    let mut cases = HashMap::new();
    let mut outputs = Vec::new();

    let mut i = 2;
    while i < args.len() - 1 {
        let labels: Vec<&JsonValue> = match &args[i] {
            JsonValue::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let label_ctx = ctx.concat(Some(i), None, None);
        if labels.is_empty() {
            return label_ctx.error("Expected at least one branch label.");
        }
        for label in labels {
            let (key, label_type) = match label {
                JsonValue::Number(num) => {
                    let v = num.as_f64().unwrap_or(f64::NAN);
                    if v.abs() > MAX_SAFE_INTEGER {
                        return label_ctx.error(format!(
                            "Branch labels must be integers no larger than {}.",
                            MAX_SAFE_INTEGER as i64
                        ));
                    }
                    if v.fract() != 0.0 {
                        return label_ctx.error("Numeric branch labels must be integer values.");
                    }
                    (MatchKey::Int(v as i64), Type::Number)
                }
                JsonValue::String(s) => (MatchKey::Str(s.clone()), Type::String),
                _ => return label_ctx.error("Branch labels must be numbers or strings."),
            };
            match &input_type {
                None => input_type = Some(label_type),
                Some(t) => {
                    if label_ctx.check_subtype(t, &label_type).is_some() {
                        return None;
                    }
                }
            }
            if cases.contains_key(&key) {
                return label_ctx.error("Branch labels must be unique.");
            }
            cases.insert(key, outputs.len());
        }

        let result = ctx.parse_at(&args[i + 1], i + 1, output_type.clone())?;
        if output_type.is_none() {
            output_type = Some(result.ty());
        }
        outputs.push(result);
        i += 2;
    }

    let input = ctx.parse_at(&args[1], 1, Some(Type::Value))?;
    let last = args.len() - 1;
    let otherwise = ctx.parse_at(&args[last], last, output_type.clone())?;

    let input_type = input_type.unwrap_or(Type::Value);
    if input.ty() != Type::Value
        && ctx
            .concat(Some(1), None, None)
            .check_subtype(&input_type, &input.ty())
            .is_some()
    {
        return None;
    }

    Some(Expression::Match {
        ty: output_type.unwrap_or(Type::Value),
        input_type,
        input: Box::new(input),
        cases,
        outputs,
        otherwise: Box::new(otherwise),
    })
}

fn parse_case(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() < 4 {
        return ctx.error(format!(
            "Expected at least 3 arguments, but found only {}.",
            args.len() - 1
        ));
    }
    if args.len() % 2 != 0 {
        return ctx.error("Expected an odd number of arguments.");
    }
    let mut output_type = branch_output_type(ctx);
    let mut branches = Vec::new();
    let mut i = 1;
    while i < args.len() - 1 {
        let test = ctx.parse_at(&args[i], i, Some(Type::Boolean))?;
        let result = ctx.parse_at(&args[i + 1], i + 1, output_type.clone())?;
        if output_type.is_none() {
            output_type = Some(result.ty());
        }
        branches.push((test, result));
        i += 2;
    }
    let last = args.len() - 1;
    let otherwise = ctx.parse_at(&args[last], last, output_type.clone())?;
    Some(Expression::Case {
        ty: output_type.unwrap_or(Type::Value),
        branches,
        otherwise: Box::new(otherwise),
    })
}

fn parse_coalesce(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() < 2 {
        return ctx.error("Expected at least one argument.");
    }
    let expected = ctx.expected_type().cloned();
    let mut output_type = branch_output_type(ctx);
    let mut parsed = Vec::new();
    for (i, arg) in args.iter().enumerate().skip(1) {
        let expr = ctx.parse_with(
            arg,
            i,
            output_type.clone(),
            None,
            Some(TypeAnnotation::Omit),
        )?;
        if output_type.is_none() {
            output_type = Some(expr.ty());
        }
        parsed.push(expr);
    }
    let needs_annotation = expected.as_ref().map_or(false, |expected| {
        parsed
            .iter()
            .any(|arg| check_subtype(expected, &arg.ty()).is_some())
    });
    let ty = if needs_annotation {
        Type::Value
    } else {
        output_type.unwrap_or(Type::Value)
    };
    Some(Expression::Coalesce { ty, args: parsed })
}

fn is_comparable(op: ComparisonOp, ty: &Type) -> bool {
    if op.is_equality() {
        is_valid_type(
            ty,
            &[
                TypeKind::String,
                TypeKind::Number,
                TypeKind::Boolean,
                TypeKind::Null,
                TypeKind::Value,
            ],
        )
    } else {
        is_valid_type(ty, &[TypeKind::String, TypeKind::Number, TypeKind::Value])
    }
}

fn parse_comparison(op: ComparisonOp, args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() != 3 && args.len() != 4 {
        return ctx.error("Expected two or three arguments.");
    }
    let mut lhs = ctx.parse_at(&args[1], 1, Some(Type::Value))?;
    if !is_comparable(op, &lhs.ty()) {
        return ctx.error_at(
            format!(
                "\"{}\" comparisons are not supported for type '{}'.",
                op.name(),
                lhs.ty()
            ),
            &[1],
        );
    }
    let mut rhs = ctx.parse_at(&args[2], 2, Some(Type::Value))?;
    if !is_comparable(op, &rhs.ty()) {
        return ctx.error_at(
            format!(
                "\"{}\" comparisons are not supported for type '{}'.",
                op.name(),
                rhs.ty()
            ),
            &[2],
        );
    }

    let (lt, rt) = (lhs.ty(), rhs.ty());
    if lt.kind() != rt.kind() && lt != Type::Value && rt != Type::Value {
        return ctx.error(format!("Cannot compare types '{}' and '{}'.", lt, rt));
    }

    if !op.is_equality() {
        if lt == Type::Value && rt != Type::Value {
            lhs = Expression::Assertion {
                ty: rt.clone(),
                args: vec![lhs],
            };
        } else if lt != Type::Value && rt == Type::Value {
            rhs = Expression::Assertion {
                ty: lt.clone(),
                args: vec![rhs],
            };
        }
    }

    let collator = if args.len() == 4 {
        let (lt, rt) = (lhs.ty(), rhs.ty());
        if lt != Type::String && rt != Type::String && lt != Type::Value && rt != Type::Value {
            return ctx.error("Cannot use collator to compare non-string types.");
        }
        Some(Box::new(ctx.parse_at(&args[3], 3, Some(Type::Collator))?))
    } else {
        None
    };

    let has_untyped_argument = lhs.ty() == Type::Value || rhs.ty() == Type::Value;
    Some(Expression::Comparison {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        collator,
        has_untyped_argument,
    })
}

fn parse_boolean_reduction(op: &str, args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() < 2 {
        return ctx.error("Expected at least one argument.");
    }
    let mut parsed = Vec::new();
    for (i, arg) in args.iter().enumerate().skip(1) {
        parsed.push(ctx.parse_at(arg, i, Some(Type::Boolean))?);
    }
    Some(if op == "all" {
        Expression::All(parsed)
    } else {
        Expression::Any(parsed)
    })
}

fn options_object<'a>(json: &'a JsonValue) -> Option<&'a Map<String, JsonValue>> {
    match json {
        JsonValue::Object(map) => Some(map),
        _ => None,
    }
}

/// Option value if present and not null.
fn option<'a>(options: &'a Map<String, JsonValue>, name: &str) -> Option<&'a JsonValue> {
    options.get(name).filter(|v| !v.is_null())
}

fn parse_collator(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() != 2 {
        return ctx.error("Expected one argument.");
    }
    let Some(options) = options_object(&args[1]) else {
        return ctx.error("Collator options argument must be an object.");
    };
    let falsy = JsonValue::Bool(false);
    let case_sensitive = ctx.parse_at(
        option(options, "case-sensitive").unwrap_or(&falsy),
        1,
        Some(Type::Boolean),
    )?;
    let diacritic_sensitive = ctx.parse_at(
        option(options, "diacritic-sensitive").unwrap_or(&falsy),
        1,
        Some(Type::Boolean),
    )?;
    let locale = match option(options, "locale") {
        Some(locale) => Some(Box::new(ctx.parse_at(locale, 1, Some(Type::String))?)),
        None => None,
    };
    Some(Expression::Collator {
        case_sensitive: Box::new(case_sensitive),
        diacritic_sensitive: Box::new(diacritic_sensitive),
        locale,
    })
}

fn parse_format(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() < 2 {
        return ctx.error("Expected at least one argument.");
    }
    if let JsonValue::Object(_) = &args[1] {
        return ctx.error("First argument must be an image or text section.");
    }

    let mut sections: Vec<FormatSectionExpression> = Vec::new();
    let mut next_may_be_options = false;
    for arg in &args[1..] {
        if let (true, JsonValue::Object(options)) = (next_may_be_options, arg) {
            next_may_be_options = false;
            let scale = match option(options, "font-scale") {
                Some(v) => Some(ctx.parse_at(v, 1, Some(Type::Number))?),
                None => None,
            };
            let font = match option(options, "text-font") {
                Some(v) => Some(ctx.parse_at(v, 1, Some(Type::array(Type::String)))?),
                None => None,
            };
            let text_color = match option(options, "text-color") {
                Some(v) => Some(ctx.parse_at(v, 1, Some(Type::Color))?),
                None => None,
            };
            if let Some(last) = sections.last_mut() {
                last.scale = scale;
                last.font = font;
                last.text_color = text_color;
            }
        } else {
            let content = ctx.parse_at(arg, 1, Some(Type::Value))?;
            if !is_valid_type(
                &content.ty(),
                &[
                    TypeKind::String,
                    TypeKind::Value,
                    TypeKind::Null,
                    TypeKind::ResolvedImage,
                ],
            ) {
                return ctx.error(
                    "Formatted text type must be 'string', 'value', 'image' or 'null'.",
                );
            }
            next_may_be_options = true;
            sections.push(FormatSectionExpression {
                content,
                scale: None,
                font: None,
                text_color: None,
            });
        }
    }
    Some(Expression::Format(sections))
}

fn parse_image(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() != 2 {
        return ctx.error("Expected two arguments.");
    }
    match ctx.parse_at(&args[1], 1, Some(Type::String)) {
        Some(name) => Some(Expression::Image(Box::new(name))),
        None => ctx.error("No image name provided."),
    }
}

fn parse_number_format(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() != 3 {
        return ctx.error("Expected two arguments.");
    }
    let number = ctx.parse_at(&args[1], 1, Some(Type::Number))?;
    let Some(options) = options_object(&args[2]) else {
        return ctx.error("NumberFormat options argument must be an object.");
    };
    let parse_option = |name: &str, ty: Type| -> Result<Option<Box<Expression>>, ()> {
        match option(options, name) {
            Some(v) => ctx
                .parse_at(v, 1, Some(ty))
                .map(|e| Some(Box::new(e)))
                .ok_or(()),
            None => Ok(None),
        }
    };
    let locale = parse_option("locale", Type::String).ok()?;
    let currency = parse_option("currency", Type::String).ok()?;
    let min_fraction_digits = parse_option("min-fraction-digits", Type::Number).ok()?;
    let max_fraction_digits = parse_option("max-fraction-digits", Type::Number).ok()?;
    Some(Expression::NumberFormat {
        number: Box::new(number),
        locale,
        currency,
        min_fraction_digits,
        max_fraction_digits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn errors_of(json: JsonValue, expected: Option<Type>) -> Vec<ParseError> {
        match parse_expression(&json, expected) {
            Ok(expr) => panic!("expected errors, got {:?}", expr),
            Err(errors) => errors,
        }
    }

    #[test]
    fn test_literal_promotion_and_folding() {
        let expr = parse_expression(&json!(["+", 1, 2]), None).unwrap();
        assert_eq!(
            expr,
            Expression::Literal {
                ty: Type::Number,
                value: Value::Number(3.0)
            }
        );
    }

    #[test]
    fn test_empty_array_error() {
        let errors = errors_of(json!([]), None);
        assert_eq!(
            errors[0].message,
            "Expected an array with at least one element. If you wanted a literal array, use [\"literal\", []]."
        );
    }

    #[test]
    fn test_unknown_expression_keyed_at_name() {
        let errors = errors_of(json!(["+", 1, ["nope"]]), None);
        assert_eq!(errors[0].key, "[2][0]");
        assert!(errors[0].message.starts_with("Unknown expression \"nope\""));
    }

    #[test]
    fn test_non_string_name() {
        let errors = errors_of(json!([1, 2]), None);
        assert_eq!(errors[0].key, "[0]");
        assert!(errors[0].message.contains("found number instead"));
    }

    #[test]
    fn test_bare_object_rejected() {
        let errors = errors_of(json!({"a": 1}), None);
        assert_eq!(errors[0].message, "Bare objects invalid. Use [\"literal\", {...}] instead.");
    }

    #[test]
    fn test_color_literal_is_coerced() {
        let expr = parse_expression(&json!("red"), Some(Type::Color)).unwrap();
        match expr {
            Expression::Literal { ty, value } => {
                assert_eq!(ty, Type::Color);
                assert!(matches!(value, Value::Color(_)));
            }
            other => panic!("expected literal, got {:?}", other),
        }
        let errors = errors_of(json!("not-a-color"), Some(Type::Color));
        assert_eq!(errors[0].message, "Could not parse color from value 'not-a-color'");
    }

    #[test]
    fn test_value_gets_assertion() {
        let expr = parse_expression(&json!(["get", "x"]), Some(Type::Number)).unwrap();
        assert!(matches!(expr, Expression::Assertion { ty: Type::Number, .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let errors = errors_of(json!("abc"), Some(Type::Number));
        assert_eq!(errors[0].message, "Expected number but found string instead.");
    }

    #[test]
    fn test_let_and_var() {
        let expr = parse_expression(&json!(["let", "a", 2, ["*", ["var", "a"], ["get", "n"]]]), None)
            .unwrap();
        assert_eq!(expr.ty(), Type::Number);
        let errors = errors_of(json!(["var", "missing"]), None);
        assert_eq!(errors[0].key, "[1]");
        let errors = errors_of(json!(["let", "a-b", 1, 2]), None);
        assert_eq!(
            errors[0].message,
            "Variable names must contain only alphanumeric characters or '_'."
        );
    }

    #[test]
    fn test_match_label_errors() {
        let errors = errors_of(json!(["match", ["get", "x"], 1.5, "a", "b"]), None);
        assert_eq!(errors[0].message, "Numeric branch labels must be integer values.");
        let errors = errors_of(json!(["match", ["get", "x"], [1, 1], "a", "b"]), None);
        assert_eq!(errors[0].message, "Branch labels must be unique.");
        let errors = errors_of(json!(["match", ["get", "x"], [], "a", "b"]), None);
        assert_eq!(errors[0].message, "Expected at least one branch label.");
        let errors = errors_of(json!(["match", ["get", "x"], "a", 1, "b", 2]), None);
        assert_eq!(errors[0].message, "Expected an even number of arguments.");
    }

    #[test]
    fn test_comparison_type_errors() {
        let errors = errors_of(json!(["==", 1, "a"]), None);
        assert_eq!(errors[0].message, "Cannot compare types 'number' and 'string'.");
        let errors = errors_of(json!(["<", true, 1]), None);
        assert_eq!(errors[0].key, "[1]");
        assert_eq!(
            errors[0].message,
            "\"<\" comparisons are not supported for type 'boolean'."
        );
    }

    #[test]
    fn test_coalesce_type_widening() {
        let expr = parse_expression(&json!(["coalesce", ["get", "a"], 1]), Some(Type::Number))
            .unwrap();
        assert_eq!(expr.ty(), Type::Number);
    }

    #[test]
    fn test_empty_literal_array_takes_expected_type() {
        let expr =
            parse_expression(&json!(["literal", []]), Some(Type::array(Type::String))).unwrap();
        assert_eq!(expr.ty(), Type::array(Type::String));
    }

    #[test]
    fn test_array_assertion_arguments() {
        let errors = errors_of(json!(["array", "color", ["get", "x"]]), None);
        assert_eq!(errors[0].key, "[1]");
        let expr = parse_expression(&json!(["array", "number", 2, ["get", "x"]]), None).unwrap();
        assert_eq!(expr.ty(), Type::array_n(Type::Number, 2));
    }

    #[test]
    fn test_is_expression() {
        assert!(is_expression(&json!(["get", "name"])));
        assert!(is_expression(&json!(["==", 1, 1])));
        assert!(!is_expression(&json!(["Open Sans Regular"])));
        assert!(!is_expression(&json!([0, 1])));
        assert!(!is_expression(&json!("text")));
    }
}
