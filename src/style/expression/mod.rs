//! Typed style expressions.
//!
//! JSON expressions are compiled once by [`parser::ParsingContext`] into an
//! [`Expression`] tree that carries its static [`Type`], then evaluated per
//! feature against an [`EvaluationContext`].

pub mod definitions;
pub mod evaluate;
pub mod interpolate;
pub mod parser;
pub mod style_expression;
pub mod types;
pub mod within;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use glam::IVec2;

use crate::style::value::{FormattedSection, PropertyMap, Value};
use crate::tile_id::CanonicalTileId;

pub use definitions::Builtin;
pub use interpolate::{Interpolation, InterpolationOperator};
pub use parser::{is_expression, parse_expression, ParsingContext};
pub use style_expression::{
    create_expression, create_property_expression, ExpressionKind, StyleExpression,
    StylePropertyExpression,
};
pub use types::Type;
pub use within::WithinGeometry;

/// A compile error, located by its path into the JSON expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Path such as `[2][1]`; empty for the root.
    pub key: String,
    pub message: String,
}

impl ParseError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.key, self.message)
        }
    }
}

impl std::error::Error for ParseError {}

/// A runtime failure while evaluating an expression.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EvaluationError(pub String);

impl EvaluationError {
    pub fn new(msg: impl Into<String>) -> Self {
        EvaluationError(msg.into())
    }
}

pub type EvalResult = Result<Value, EvaluationError>;

/// Camera and render state visible to expressions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalProperties {
    pub zoom: f64,
    pub heatmap_density: Option<f64>,
    pub line_progress: Option<f64>,
    pub accumulated: Option<f64>,
    /// Whether right-to-left shaping is available, for `is-supported-script`.
    pub rtl_text_supported: bool,
}

impl GlobalProperties {
    pub fn at_zoom(zoom: f64) -> Self {
        Self {
            zoom,
            ..Default::default()
        }
    }
}

impl Default for GlobalProperties {
    fn default() -> Self {
        Self {
            zoom: 0.0,
            heatmap_density: None,
            line_progress: None,
            accumulated: None,
            rtl_text_supported: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryType {
    #[default]
    Unknown,
    Point,
    LineString,
    Polygon,
}

impl GeometryType {
    pub fn name(&self) -> &'static str {
        match self {
            GeometryType::Unknown => "Unknown",
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::Polygon => "Polygon",
        }
    }
}

/// A vector tile feature. Geometry is in tile units (0..8192).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feature {
    pub geometry_type: GeometryType,
    pub id: Option<Value>,
    pub properties: PropertyMap,
    pub geometry: Vec<Vec<IVec2>>,
}

impl Feature {
    pub fn new(geometry_type: GeometryType, properties: PropertyMap) -> Self {
        Self {
            geometry_type,
            id: None,
            properties,
            geometry: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_geometry(mut self, geometry: Vec<Vec<IVec2>>) -> Self {
        self.geometry = geometry;
        self
    }
}

/// Everything an expression can read during evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationContext<'a> {
    pub globals: GlobalProperties,
    pub feature: Option<&'a Feature>,
    pub feature_state: Option<&'a PropertyMap>,
    pub available_images: Option<&'a HashSet<String>>,
    pub formatted_section: Option<&'a FormattedSection>,
    pub canonical: Option<CanonicalTileId>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(globals: GlobalProperties) -> Self {
        Self {
            globals,
            ..Default::default()
        }
    }

    pub fn with_feature(mut self, feature: &'a Feature) -> Self {
        self.feature = Some(feature);
        self
    }

    pub fn with_feature_state(mut self, state: &'a PropertyMap) -> Self {
        self.feature_state = Some(state);
        self
    }

    pub fn with_available_images(mut self, images: &'a HashSet<String>) -> Self {
        self.available_images = Some(images);
        self
    }

    pub fn with_formatted_section(mut self, section: &'a FormattedSection) -> Self {
        self.formatted_section = Some(section);
        self
    }

    pub fn with_canonical(mut self, canonical: CanonicalTileId) -> Self {
        self.canonical = Some(canonical);
        self
    }

    pub(crate) fn properties(&self) -> Option<&'a PropertyMap> {
        self.feature.map(|f| &f.properties)
    }
}

/// Label of a `match` branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchKey {
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl ComparisonOp {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "==" => ComparisonOp::Equal,
            "!=" => ComparisonOp::NotEqual,
            "<" => ComparisonOp::Less,
            ">" => ComparisonOp::Greater,
            "<=" => ComparisonOp::LessOrEqual,
            ">=" => ComparisonOp::GreaterOrEqual,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ComparisonOp::Equal => "==",
            ComparisonOp::NotEqual => "!=",
            ComparisonOp::Less => "<",
            ComparisonOp::Greater => ">",
            ComparisonOp::LessOrEqual => "<=",
            ComparisonOp::GreaterOrEqual => ">=",
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, ComparisonOp::Equal | ComparisonOp::NotEqual)
    }
}

/// One section of a `format` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSectionExpression {
    pub content: Expression,
    pub scale: Option<Expression>,
    pub font: Option<Expression>,
    pub text_color: Option<Expression>,
}

/// A compiled expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal {
        ty: Type,
        value: Value,
    },
    Let {
        bindings: Vec<(String, Rc<Expression>)>,
        result: Box<Expression>,
    },
    Var {
        name: String,
        bound: Rc<Expression>,
    },
    Assertion {
        ty: Type,
        args: Vec<Expression>,
    },
    Coercion {
        ty: Type,
        args: Vec<Expression>,
    },
    At {
        ty: Type,
        index: Box<Expression>,
        input: Box<Expression>,
    },
    In {
        needle: Box<Expression>,
        haystack: Box<Expression>,
    },
    IndexOf {
        needle: Box<Expression>,
        haystack: Box<Expression>,
        from_index: Option<Box<Expression>>,
    },
    Slice {
        ty: Type,
        input: Box<Expression>,
        begin: Box<Expression>,
        end: Option<Box<Expression>>,
    },
    Length(Box<Expression>),
    Match {
        ty: Type,
        input_type: Type,
        input: Box<Expression>,
        cases: HashMap<MatchKey, usize>,
        outputs: Vec<Expression>,
        otherwise: Box<Expression>,
    },
    Case {
        ty: Type,
        branches: Vec<(Expression, Expression)>,
        otherwise: Box<Expression>,
    },
    Coalesce {
        ty: Type,
        args: Vec<Expression>,
    },
    /// Stops are `(label, output)`; the first label is negative infinity.
    Step {
        ty: Type,
        input: Box<Expression>,
        stops: Vec<(f64, Expression)>,
    },
    Interpolate {
        ty: Type,
        operator: InterpolationOperator,
        interpolation: Interpolation,
        input: Box<Expression>,
        stops: Vec<(f64, Expression)>,
    },
    Comparison {
        op: ComparisonOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        collator: Option<Box<Expression>>,
        has_untyped_argument: bool,
    },
    All(Vec<Expression>),
    Any(Vec<Expression>),
    Collator {
        case_sensitive: Box<Expression>,
        diacritic_sensitive: Box<Expression>,
        locale: Option<Box<Expression>>,
    },
    Format(Vec<FormatSectionExpression>),
    Image(Box<Expression>),
    NumberFormat {
        number: Box<Expression>,
        locale: Option<Box<Expression>>,
        currency: Option<Box<Expression>>,
        min_fraction_digits: Option<Box<Expression>>,
        max_fraction_digits: Option<Box<Expression>>,
    },
    Within(WithinGeometry),
    Compound {
        op: Builtin,
        ty: Type,
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn literal(value: Value) -> Self {
        let ty = crate::style::value::type_of(&value);
        Expression::Literal { ty, value }
    }

    /// Static result type.
    pub fn ty(&self) -> Type {
        match self {
            Expression::Literal { ty, .. }
            | Expression::Assertion { ty, .. }
            | Expression::Coercion { ty, .. }
            | Expression::At { ty, .. }
            | Expression::Slice { ty, .. }
            | Expression::Match { ty, .. }
            | Expression::Case { ty, .. }
            | Expression::Coalesce { ty, .. }
            | Expression::Step { ty, .. }
            | Expression::Interpolate { ty, .. }
            | Expression::Compound { ty, .. } => ty.clone(),
            Expression::Let { result, .. } => result.ty(),
            Expression::Var { bound, .. } => bound.ty(),
            Expression::In { .. }
            | Expression::Comparison { .. }
            | Expression::All(_)
            | Expression::Any(_)
            | Expression::Within(_) => Type::Boolean,
            Expression::IndexOf { .. } | Expression::Length(_) => Type::Number,
            Expression::Collator { .. } => Type::Collator,
            Expression::Format(_) => Type::Formatted,
            Expression::Image(_) => Type::ResolvedImage,
            Expression::NumberFormat { .. } => Type::String,
        }
    }

    /// Visit direct children in argument order.
    pub fn each_child<'e>(&'e self, f: &mut dyn FnMut(&'e Expression)) {
        match self {
            Expression::Literal { .. } | Expression::Var { .. } | Expression::Within(_) => {}
            Expression::Let { bindings, result } => {
                for (_, bound) in bindings {
                    f(bound);
                }
                f(result);
            }
            Expression::Assertion { args, .. }
            | Expression::Coercion { args, .. }
            | Expression::Coalesce { args, .. }
            | Expression::All(args)
            | Expression::Any(args)
            | Expression::Compound { args, .. } => args.iter().for_each(f),
            Expression::At { index, input, .. } => {
                f(index);
                f(input);
            }
            Expression::In { needle, haystack } => {
                f(needle);
                f(haystack);
            }
            Expression::IndexOf {
                needle,
                haystack,
                from_index,
            } => {
                f(needle);
                f(haystack);
                if let Some(from) = from_index {
                    f(from);
                }
            }
            Expression::Slice {
                input, begin, end, ..
            } => {
                f(input);
                f(begin);
                if let Some(end) = end {
                    f(end);
                }
            }
            Expression::Length(input) | Expression::Image(input) => f(input),
            Expression::Match {
                input,
                outputs,
                otherwise,
                ..
            } => {
                f(input);
                outputs.iter().for_each(&mut *f);
                f(otherwise);
            }
            Expression::Case {
                branches,
                otherwise,
                ..
            } => {
                for (test, output) in branches {
                    f(test);
                    f(output);
                }
                f(otherwise);
            }
            Expression::Step { input, stops, .. } | Expression::Interpolate { input, stops, .. } => {
                f(input);
                for (_, output) in stops {
                    f(output);
                }
            }
            Expression::Comparison {
                lhs, rhs, collator, ..
            } => {
                f(lhs);
                f(rhs);
                if let Some(collator) = collator {
                    f(collator);
                }
            }
            Expression::Collator {
                case_sensitive,
                diacritic_sensitive,
                locale,
            } => {
                f(case_sensitive);
                f(diacritic_sensitive);
                if let Some(locale) = locale {
                    f(locale);
                }
            }
            Expression::Format(sections) => {
                for section in sections {
                    f(&section.content);
                    for option in [&section.scale, &section.font, &section.text_color]
                        .into_iter()
                        .flatten()
                    {
                        f(option);
                    }
                }
            }
            Expression::NumberFormat {
                number,
                locale,
                currency,
                min_fraction_digits,
                max_fraction_digits,
            } => {
                f(number);
                for option in [locale, currency, min_fraction_digits, max_fraction_digits]
                    .into_iter()
                    .flatten()
                {
                    f(option);
                }
            }
        }
    }

    /// Whether every possible output is known at compile time to be non-null.
    pub fn output_defined(&self) -> bool {
        match self {
            Expression::Literal { .. } | Expression::Within(_) => true,
            Expression::Let { result, .. } => result.output_defined(),
            Expression::Assertion { args, .. } | Expression::Coalesce { args, .. } => {
                args.iter().all(Expression::output_defined)
            }
            Expression::Step { stops, .. } | Expression::Interpolate { stops, .. } => {
                stops.iter().all(|(_, output)| output.output_defined())
            }
            Expression::Match {
                outputs, otherwise, ..
            } => outputs.iter().all(Expression::output_defined) && otherwise.output_defined(),
            Expression::Case {
                branches,
                otherwise,
                ..
            } => {
                branches.iter().all(|(_, output)| output.output_defined())
                    && otherwise.output_defined()
            }
            _ => false,
        }
    }

    /// Name of the compound operator, if this node is one.
    pub fn builtin(&self) -> Option<Builtin> {
        match self {
            Expression::Compound { op, .. } => Some(*op),
            _ => None,
        }
    }
}

/// Whether the expression reads no feature data.
pub fn is_feature_constant(expr: &Expression) -> bool {
    if let Expression::Compound { op, args, .. } = expr {
        match op {
            Builtin::Get | Builtin::Has if args.len() == 1 => return false,
            Builtin::FeatureState
            | Builtin::Properties
            | Builtin::GeometryType
            | Builtin::Id => return false,
            _ => {}
        }
    }
    if let Expression::Within(_) = expr {
        return false;
    }
    let mut result = true;
    expr.each_child(&mut |child| {
        if result && !is_feature_constant(child) {
            result = false;
        }
    });
    result
}

/// Whether the expression reads no feature state.
pub fn is_state_constant(expr: &Expression) -> bool {
    if let Expression::Compound {
        op: Builtin::FeatureState,
        ..
    } = expr
    {
        return false;
    }
    let mut result = true;
    expr.each_child(&mut |child| {
        if result && !is_state_constant(child) {
            result = false;
        }
    });
    result
}

/// Whether the expression reads none of the named global properties.
pub fn is_global_property_constant(expr: &Expression, properties: &[&str]) -> bool {
    if let Expression::Compound { op, .. } = expr {
        if properties.contains(&op.name()) {
            return false;
        }
    }
    let mut result = true;
    expr.each_child(&mut |child| {
        if result && !is_global_property_constant(child, properties) {
            result = false;
        }
    });
    result
}
