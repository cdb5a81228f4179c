//! Style expressions and the property evaluation pipeline.
//!
//! Style documents are parsed into [`StyleSpec`]; each layer's paint and
//! layout blocks compile into [`PropertySet`]s whose values are expressions
//! from [`expression`], evaluated per camera and per feature.

pub mod collator;
pub mod color;
pub mod expression;
pub mod function;
pub mod parser;
pub mod properties;
pub mod spec;
pub mod types;
pub mod value;

pub use collator::Collator;
pub use color::Color;
pub use expression::{
    create_expression, create_property_expression, EvaluationContext, Expression, Feature,
    GeometryType, GlobalProperties, StyleExpression, StylePropertyExpression,
};
pub use function::FeatureFilter;
pub use parser::{parse_style, parse_style_str};
pub use properties::{
    EvaluatedSet, EvaluationParameters, PossiblyEvaluatedPropertyValue, PropertySet,
    PropertyValue, TransitionOptions, ZoomHistory,
};
pub use spec::{property_spec, PropertySpecification};
pub use types::{LayerType, StyleLayer, StyleSpec};
pub use value::{Formatted, Padding, PropertyMap, ResolvedImage, Value};
