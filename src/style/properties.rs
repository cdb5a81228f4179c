//! Property evaluation pipeline.
//!
//! A raw style value is compiled into a [`PropertyValue`], wrapped with its
//! transition into a [`TransitionablePropertyValue`], chained to the value it
//! replaces as a [`TransitioningPropertyValue`], and finally reduced against
//! the camera into a [`PossiblyEvaluatedPropertyValue`] that is either a
//! constant or still waits for a feature.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{StyleError, StyleResult};
use crate::style::color::Color;
use crate::style::expression::interpolate::interpolate_value;
use crate::style::expression::{
    create_property_expression, is_expression, EvaluationContext, Expression, ExpressionKind,
    GlobalProperties, InterpolationOperator, StylePropertyExpression,
};
use crate::style::function::{convert_function, convert_token_string, is_function};
use crate::style::spec::{property_names, property_spec, PropertyKind, PropertySpecification, PropertyType, ValueType};
use crate::style::types::LayerType;
use crate::style::value::{Formatted, FormattedSection, Padding, ResolvedImage, Value};

/// Timing of a property transition, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionOptions {
    pub duration: f64,
    pub delay: f64,
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self {
            duration: 300.0,
            delay: 0.0,
        }
    }
}

/// Tracks integer zoom crossings so cross-faded properties know which way the camera moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomHistory {
    pub last_zoom: f64,
    pub last_floor_zoom: f64,
    pub last_integer_zoom: f64,
    pub last_integer_zoom_time: f64,
    first: bool,
}

impl Default for ZoomHistory {
    fn default() -> Self {
        Self {
            last_zoom: 0.0,
            last_floor_zoom: 0.0,
            last_integer_zoom: 0.0,
            last_integer_zoom_time: 0.0,
            first: true,
        }
    }
}

impl ZoomHistory {
    /// Record the zoom at time `now`. Returns whether the zoom changed.
    pub fn update(&mut self, zoom: f64, now: f64) -> bool {
        let floor = zoom.floor();
        if self.first {
            self.first = false;
            self.last_integer_zoom = floor;
            self.last_integer_zoom_time = 0.0;
            self.last_zoom = zoom;
            self.last_floor_zoom = floor;
            return true;
        }

        if self.last_floor_zoom > floor {
            self.last_integer_zoom = floor + 1.0;
            self.last_integer_zoom_time = now;
        } else if self.last_floor_zoom < floor {
            self.last_integer_zoom = floor;
            self.last_integer_zoom_time = now;
        }

        if zoom != self.last_zoom {
            self.last_zoom = zoom;
            self.last_floor_zoom = floor;
            return true;
        }
        false
    }
}

/// Scales and mix factor for drawing a cross-faded pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossfadeParameters {
    pub from_scale: f64,
    pub to_scale: f64,
    pub t: f64,
}

/// Camera and clock state for one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationParameters {
    pub zoom: f64,
    pub now: f64,
    pub fade_duration: f64,
    pub zoom_history: ZoomHistory,
    pub transition: TransitionOptions,
}

impl EvaluationParameters {
    pub fn new(zoom: f64) -> Self {
        Self {
            zoom,
            now: 0.0,
            fade_duration: 0.0,
            zoom_history: ZoomHistory::default(),
            transition: TransitionOptions::default(),
        }
    }

    pub fn with_now(mut self, now: f64) -> Self {
        self.now = now;
        self
    }

    pub fn with_fade_duration(mut self, fade_duration: f64) -> Self {
        self.fade_duration = fade_duration;
        self
    }

    pub fn with_zoom_history(mut self, zoom_history: ZoomHistory) -> Self {
        self.zoom_history = zoom_history;
        self
    }

    pub fn with_transition(mut self, transition: TransitionOptions) -> Self {
        self.transition = transition;
        self
    }

    /// Same clock and history, different zoom.
    pub fn at_zoom(&self, zoom: f64) -> Self {
        Self { zoom, ..*self }
    }

    pub fn globals(&self) -> GlobalProperties {
        GlobalProperties::at_zoom(self.zoom)
    }

    pub fn crossfading_factor(&self) -> f64 {
        if self.fade_duration == 0.0 {
            1.0
        } else {
            ((self.now - self.zoom_history.last_integer_zoom_time) / self.fade_duration).min(1.0)
        }
    }

    pub fn crossfade_parameters(&self) -> CrossfadeParameters {
        let fraction = self.zoom - self.zoom.floor();
        let t = self.crossfading_factor();
        if self.zoom > self.zoom_history.last_integer_zoom {
            CrossfadeParameters {
                from_scale: 2.0,
                to_scale: 1.0,
                t: fraction + (1.0 - fraction) * t,
            }
        } else {
            CrossfadeParameters {
                from_scale: 0.5,
                to_scale: 1.0,
                t: 1.0 - (1.0 - t) * fraction,
            }
        }
    }
}

/// Cubic ease-in-out used for property transitions.
pub fn ease_cubic_in_out(t: f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    if t >= 1.0 {
        return 1.0;
    }
    let t2 = t * t;
    let t3 = t2 * t;
    4.0 * if t < 0.5 { t3 } else { 3.0 * (t - t2) + t3 - 0.75 }
}

/// The two zoom-adjacent values a cross-faded property blends between.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossFaded {
    pub from: Value,
    pub to: Value,
}

fn calculate_cross_faded(min: Value, mid: Value, max: Value, parameters: &EvaluationParameters) -> CrossFaded {
    if parameters.zoom > parameters.zoom_history.last_integer_zoom {
        CrossFaded { from: min, to: mid }
    } else {
        CrossFaded { from: max, to: mid }
    }
}

/// A property value reduced to either a constant or a compiled expression.
#[derive(Debug, Clone)]
pub enum PropertyExpression {
    Constant(Value),
    Expression(Rc<StylePropertyExpression>),
}

impl PropertyExpression {
    pub fn kind(&self) -> ExpressionKind {
        match self {
            PropertyExpression::Constant(_) => ExpressionKind::Constant,
            PropertyExpression::Expression(expr) => expr.kind(),
        }
    }

    /// Evaluate with camera state only.
    pub fn evaluate(&self, parameters: &EvaluationParameters) -> Value {
        match self {
            PropertyExpression::Constant(value) => value.clone(),
            PropertyExpression::Expression(expr) => {
                expr.evaluate(&EvaluationContext::new(parameters.globals()))
            }
        }
    }
}

fn compile(json: &JsonValue, spec: &PropertySpecification) -> StyleResult<PropertyExpression> {
    create_property_expression(json, spec)
        .map(|expr| PropertyExpression::Expression(Rc::new(expr)))
        .map_err(|errors| StyleError::expression(spec.name, errors))
}

fn constant_value(json: &JsonValue, spec: &PropertySpecification) -> StyleResult<Value> {
    let invalid = || StyleError::invalid(format!("{}: invalid value {}", spec.name, json));
    Ok(match spec.value_type {
        ValueType::Color => Value::Color(json.as_str().and_then(Color::parse).ok_or_else(invalid)?),
        ValueType::Padding => Value::Padding(Padding::parse(&Value::from_json(json)).ok_or_else(invalid)?),
        ValueType::Formatted => match json {
            JsonValue::String(s) => Value::Formatted(Formatted::from_string(s.as_str())),
            other => Value::Formatted(Formatted::from_string(Value::from_json(other).to_display_string())),
        },
        ValueType::ResolvedImage => json
            .as_str()
            .and_then(ResolvedImage::from_name)
            .map(Value::ResolvedImage)
            .unwrap_or(Value::Null),
        _ => Value::from_json(json),
    })
}

/// Compile a raw style value for `spec`: functions, expressions, token strings or constants.
pub fn normalize_property_expression(
    json: &JsonValue,
    spec: &PropertySpecification,
) -> StyleResult<PropertyExpression> {
    if is_function(json) {
        return compile(&convert_function(json, spec)?, spec);
    }
    if is_expression(json) {
        return compile(json, spec);
    }
    if let (true, Some(s)) = (spec.tokens, json.as_str()) {
        let converted = convert_token_string(s);
        if !converted.is_string() {
            return compile(&converted, spec);
        }
    }
    Ok(PropertyExpression::Constant(constant_value(json, spec)?))
}

/// A compiled value for one property; `None` means the default applies.
#[derive(Debug, Clone)]
pub struct PropertyValue {
    spec: &'static PropertySpecification,
    value: Option<JsonValue>,
    expression: PropertyExpression,
}

impl PropertyValue {
    pub fn new(spec: &'static PropertySpecification, value: Option<JsonValue>) -> StyleResult<Self> {
        let expression = match &value {
            Some(json) => normalize_property_expression(json, spec)?,
            None => PropertyExpression::Constant(spec.default_value()),
        };
        Ok(Self {
            spec,
            value,
            expression,
        })
    }

    /// The value of an unset property.
    pub fn undefined(spec: &'static PropertySpecification) -> Self {
        Self {
            spec,
            value: None,
            expression: PropertyExpression::Constant(spec.default_value()),
        }
    }

    pub fn spec(&self) -> &'static PropertySpecification {
        self.spec
    }

    pub fn value(&self) -> Option<&JsonValue> {
        self.value.as_ref()
    }

    pub fn expression(&self) -> &PropertyExpression {
        &self.expression
    }

    pub fn is_data_driven(&self) -> bool {
        matches!(
            self.expression.kind(),
            ExpressionKind::Source | ExpressionKind::Composite
        )
    }

    pub fn possibly_evaluate(&self, parameters: &EvaluationParameters) -> PossiblyEvaluatedPropertyValue {
        let kind = self.expression.kind();
        let evaluated = match self.spec.property_type {
            PropertyType::Constant | PropertyType::DataConstant => {
                PossiblyEvaluated::Constant(self.expression.evaluate(parameters))
            }
            PropertyType::DataDriven => match (&self.expression, kind) {
                (PropertyExpression::Expression(expr), ExpressionKind::Source) => {
                    PossiblyEvaluated::Source(Rc::clone(expr))
                }
                (PropertyExpression::Expression(expr), ExpressionKind::Composite) => {
                    PossiblyEvaluated::Composite(Rc::clone(expr))
                }
                _ => PossiblyEvaluated::Constant(self.expression.evaluate(parameters)),
            },
            PropertyType::CrossFaded => {
                if self.value.is_none() {
                    PossiblyEvaluated::Constant(Value::Null)
                } else if kind == ExpressionKind::Constant {
                    let constant = self.expression.evaluate(parameters);
                    PossiblyEvaluated::CrossFaded(calculate_cross_faded(
                        constant.clone(),
                        constant.clone(),
                        constant,
                        parameters,
                    ))
                } else {
                    let z = parameters.zoom;
                    PossiblyEvaluated::CrossFaded(calculate_cross_faded(
                        self.expression.evaluate(&parameters.at_zoom((z - 1.0).floor())),
                        self.expression.evaluate(&parameters.at_zoom(z.floor())),
                        self.expression.evaluate(&parameters.at_zoom((z + 1.0).floor())),
                        parameters,
                    ))
                }
            }
            PropertyType::CrossFadedDataDriven => match (&self.expression, kind) {
                _ if self.value.is_none() => PossiblyEvaluated::Constant(Value::Null),
                (PropertyExpression::Expression(expr), ExpressionKind::Source) => {
                    PossiblyEvaluated::Source(Rc::clone(expr))
                }
                (PropertyExpression::Expression(expr), ExpressionKind::Composite) => {
                    PossiblyEvaluated::Composite(Rc::clone(expr))
                }
                (_, ExpressionKind::Camera) => {
                    let z = parameters.zoom;
                    PossiblyEvaluated::CrossFaded(calculate_cross_faded(
                        self.expression.evaluate(&parameters.at_zoom(z - 1.0)),
                        self.expression.evaluate(&parameters.at_zoom(z)),
                        self.expression.evaluate(&parameters.at_zoom(z + 1.0)),
                        parameters,
                    ))
                }
                _ => {
                    let constant = self.expression.evaluate(parameters);
                    PossiblyEvaluated::CrossFaded(calculate_cross_faded(
                        constant.clone(),
                        constant.clone(),
                        constant,
                        parameters,
                    ))
                }
            },
        };
        PossiblyEvaluatedPropertyValue {
            spec: self.spec,
            value: evaluated,
            parameters: *parameters,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PossiblyEvaluated {
    Constant(Value),
    CrossFaded(CrossFaded),
    /// Depends on feature data only.
    Source(Rc<StylePropertyExpression>),
    /// Depends on zoom and feature data.
    Composite(Rc<StylePropertyExpression>),
}

/// A property value after camera evaluation.
#[derive(Debug, Clone)]
pub struct PossiblyEvaluatedPropertyValue {
    spec: &'static PropertySpecification,
    value: PossiblyEvaluated,
    parameters: EvaluationParameters,
}

impl PossiblyEvaluatedPropertyValue {
    pub fn constant(spec: &'static PropertySpecification, value: Value, parameters: EvaluationParameters) -> Self {
        Self {
            spec,
            value: PossiblyEvaluated::Constant(value),
            parameters,
        }
    }

    pub fn spec(&self) -> &'static PropertySpecification {
        self.spec
    }

    pub fn value(&self) -> &PossiblyEvaluated {
        &self.value
    }

    pub fn is_constant(&self) -> bool {
        matches!(
            self.value,
            PossiblyEvaluated::Constant(_) | PossiblyEvaluated::CrossFaded(_)
        )
    }

    pub fn constant_or(&self, fallback: Value) -> Value {
        match &self.value {
            PossiblyEvaluated::Constant(value) => value.clone(),
            _ => fallback,
        }
    }

    fn context<'a>(&self, ctx: &EvaluationContext<'a>, zoom: f64) -> EvaluationContext<'a> {
        let mut ctx = *ctx;
        ctx.globals.zoom = zoom;
        ctx
    }

    /// Evaluate for the feature in `ctx` at the zoom this value was evaluated for.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Value {
        match &self.value {
            PossiblyEvaluated::Constant(value) => value.clone(),
            PossiblyEvaluated::CrossFaded(cross_faded) => cross_faded.to.clone(),
            PossiblyEvaluated::Source(expr) | PossiblyEvaluated::Composite(expr) => {
                expr.evaluate(&self.context(ctx, self.parameters.zoom))
            }
        }
    }

    /// Evaluate a cross-faded property for the feature in `ctx`.
    pub fn evaluate_cross_faded(&self, ctx: &EvaluationContext) -> Option<CrossFaded> {
        match &self.value {
            PossiblyEvaluated::Constant(Value::Null) => None,
            PossiblyEvaluated::Constant(value) => Some(CrossFaded {
                from: value.clone(),
                to: value.clone(),
            }),
            PossiblyEvaluated::CrossFaded(cross_faded) => Some(cross_faded.clone()),
            PossiblyEvaluated::Source(expr) => {
                let value = expr.evaluate(&self.context(ctx, self.parameters.zoom));
                Some(calculate_cross_faded(
                    value.clone(),
                    value.clone(),
                    value,
                    &self.parameters,
                ))
            }
            PossiblyEvaluated::Composite(expr) => {
                let z = self.parameters.zoom.floor();
                Some(calculate_cross_faded(
                    expr.evaluate(&self.context(ctx, z - 1.0)),
                    expr.evaluate(&self.context(ctx, z)),
                    expr.evaluate(&self.context(ctx, z + 1.0)),
                    &self.parameters,
                ))
            }
        }
    }

    /// Blend two camera-constant values; anything else keeps `self`.
    pub fn interpolate(&self, to: &PossiblyEvaluatedPropertyValue, t: f64) -> Self {
        match (&self.value, &to.value) {
            (PossiblyEvaluated::Constant(Value::Null), _) | (_, PossiblyEvaluated::Constant(Value::Null)) => {
                Self::constant(self.spec, Value::Null, to.parameters)
            }
            (PossiblyEvaluated::Constant(a), PossiblyEvaluated::Constant(b)) => {
                match interpolate_value(InterpolationOperator::Rgb, a, b, t) {
                    Some(value) => Self::constant(self.spec, value, to.parameters),
                    None => self.clone(),
                }
            }
            _ => self.clone(),
        }
    }
}

/// A property value together with its own transition override.
#[derive(Debug, Clone)]
pub struct TransitionablePropertyValue {
    pub value: PropertyValue,
    pub transition: Option<TransitionOptions>,
}

impl TransitionablePropertyValue {
    pub fn transitioned(
        &self,
        parameters: &EvaluationParameters,
        prior: Option<TransitioningPropertyValue>,
    ) -> TransitioningPropertyValue {
        TransitioningPropertyValue::new(
            self.value.clone(),
            prior,
            self.transition.unwrap_or(parameters.transition),
            parameters.now,
        )
    }
}

/// A value that may still be blending in from the value it replaced.
#[derive(Debug, Clone)]
pub struct TransitioningPropertyValue {
    value: PropertyValue,
    prior: Option<Box<TransitioningPropertyValue>>,
    begin: f64,
    end: f64,
}

impl TransitioningPropertyValue {
    pub fn new(
        value: PropertyValue,
        prior: Option<TransitioningPropertyValue>,
        transition: TransitionOptions,
        now: f64,
    ) -> Self {
        let begin = now + transition.delay;
        let end = begin + transition.duration;
        let animates = value.spec.transition && (transition.delay > 0.0 || transition.duration > 0.0);
        Self {
            value,
            prior: prior.filter(|_| animates).map(Box::new),
            begin,
            end,
        }
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    pub fn is_transitioning(&self) -> bool {
        self.prior.is_some()
    }

    /// Evaluate at `parameters.now`, dropping the prior once the transition has ended.
    pub fn possibly_evaluate(&mut self, parameters: &EvaluationParameters) -> PossiblyEvaluatedPropertyValue {
        let now = parameters.now;
        let final_value = self.value.possibly_evaluate(parameters);
        let Some(prior) = self.prior.as_mut() else {
            return final_value;
        };
        if now > self.end || self.value.is_data_driven() {
            self.prior = None;
            return final_value;
        }
        let prior_value = prior.possibly_evaluate(parameters);
        if now < self.begin {
            return prior_value;
        }
        let t = (now - self.begin) / (self.end - self.begin);
        prior_value.interpolate(&final_value, ease_cubic_in_out(t))
    }
}

/// Every paint or layout property of one layer, keyed by name.
#[derive(Debug, Clone)]
pub struct PropertySet {
    kind: PropertyKind,
    values: BTreeMap<&'static str, TransitionablePropertyValue>,
}

impl PropertySet {
    pub fn new(kind: PropertyKind, layer_type: LayerType) -> Self {
        let mut names: Vec<&'static str> = layer_type
            .property_prefixes()
            .iter()
            .flat_map(|prefix| property_names(kind, prefix))
            .collect();
        if kind == PropertyKind::Layout {
            names.push("visibility");
        }
        let values = names
            .into_iter()
            .filter_map(property_spec)
            .map(|spec| {
                let value = TransitionablePropertyValue {
                    value: PropertyValue::undefined(spec),
                    transition: None,
                };
                (spec.name, value)
            })
            .collect();
        Self { kind, values }
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name).map(|v| &v.value)
    }

    pub fn get_value(&self, name: &str) -> Option<&JsonValue> {
        self.get(name).and_then(PropertyValue::value)
    }

    /// Compile and store a value; `None` restores the default.
    pub fn set_value(&mut self, name: &str, value: Option<JsonValue>) -> StyleResult<()> {
        let entry = self
            .values
            .get_mut(name)
            .ok_or_else(|| StyleError::UnknownProperty(name.to_string()))?;
        entry.value = PropertyValue::new(entry.value.spec, value)?;
        Ok(())
    }

    pub fn get_transition(&self, name: &str) -> Option<TransitionOptions> {
        self.values.get(name).and_then(|v| v.transition)
    }

    pub fn set_transition(&mut self, name: &str, transition: TransitionOptions) -> StyleResult<()> {
        let entry = self
            .values
            .get_mut(name)
            .ok_or_else(|| StyleError::UnknownProperty(name.to_string()))?;
        entry.transition = Some(transition);
        Ok(())
    }

    /// Start transitions from `prior` (the previous transitioned state) at `parameters.now`.
    pub fn transitioned(
        &self,
        parameters: &EvaluationParameters,
        prior: Option<TransitioningSet>,
    ) -> TransitioningSet {
        let mut prior = prior.map(|set| set.values).unwrap_or_default();
        let values = self
            .values
            .iter()
            .map(|(name, value)| (*name, value.transitioned(parameters, prior.remove(name))))
            .collect();
        TransitioningSet { values }
    }

    /// Evaluate without transitions, as layout properties are.
    pub fn possibly_evaluate(&self, parameters: &EvaluationParameters) -> EvaluatedSet {
        let values = self
            .values
            .iter()
            .map(|(name, value)| (*name, value.value.possibly_evaluate(parameters)))
            .collect();
        EvaluatedSet { values }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransitioningSet {
    values: BTreeMap<&'static str, TransitioningPropertyValue>,
}

impl TransitioningSet {
    pub fn get(&self, name: &str) -> Option<&TransitioningPropertyValue> {
        self.values.get(name)
    }

    pub fn has_transition(&self) -> bool {
        self.values.values().any(TransitioningPropertyValue::is_transitioning)
    }

    pub fn possibly_evaluate(&mut self, parameters: &EvaluationParameters) -> EvaluatedSet {
        let values = self
            .values
            .iter_mut()
            .map(|(name, value)| (*name, value.possibly_evaluate(parameters)))
            .collect();
        EvaluatedSet { values }
    }
}

/// Camera-evaluated values of a property set.
#[derive(Debug, Clone, Default)]
pub struct EvaluatedSet {
    values: BTreeMap<&'static str, PossiblyEvaluatedPropertyValue>,
}

impl EvaluatedSet {
    pub fn get(&self, name: &str) -> Option<&PossiblyEvaluatedPropertyValue> {
        self.values.get(name)
    }

    /// Shorthand for a camera-constant value, falling back to the property default.
    pub fn constant(&self, name: &str) -> Value {
        match self.values.get(name) {
            Some(value) => value.constant_or(value.spec.default_value()),
            None => property_spec(name).map(|s| s.default_value()).unwrap_or_default(),
        }
    }

    /// Evaluate `name` for a feature, falling back to the property default.
    pub fn evaluate(&self, name: &str, ctx: &EvaluationContext) -> Value {
        match self.values.get(name) {
            Some(value) => value.evaluate(ctx),
            None => property_spec(name).map(|s| s.default_value()).unwrap_or_default(),
        }
    }
}

/// `text-color` as seen by one formatted section: a section color wins over the layer value.
#[derive(Debug, Clone)]
pub struct FormatSectionOverride {
    default: PossiblyEvaluatedPropertyValue,
}

impl FormatSectionOverride {
    pub fn new(default: PossiblyEvaluatedPropertyValue) -> Self {
        Self { default }
    }

    pub fn has_override(section: &FormattedSection) -> bool {
        section.text_color.is_some()
    }

    pub fn evaluate(&self, ctx: &EvaluationContext) -> Value {
        if let Some(color) = ctx.formatted_section.and_then(|section| section.text_color) {
            return Value::Color(color);
        }
        if ctx.feature.is_some() {
            return self.default.evaluate(ctx);
        }
        self.default.spec.default_value()
    }
}

fn sections_override(sections: &[FormattedSection]) -> bool {
    sections.iter().any(FormatSectionOverride::has_override)
}

fn expression_overrides(expr: &Expression) -> bool {
    match expr {
        Expression::Literal {
            value: Value::Formatted(formatted),
            ..
        } => sections_override(&formatted.sections),
        Expression::Format(sections) => sections.iter().any(|s| s.text_color.is_some()),
        _ => {
            let mut found = false;
            expr.each_child(&mut |child| found = found || expression_overrides(child));
            found
        }
    }
}

/// Whether a `text-field` value sets `text-color` on any formatted section.
pub fn has_paint_overrides(text_field: &PropertyValue) -> bool {
    match text_field.expression() {
        PropertyExpression::Constant(Value::Formatted(formatted)) => sections_override(&formatted.sections),
        PropertyExpression::Constant(_) => false,
        PropertyExpression::Expression(expr) => expression_overrides(expr.expression()),
    }
}
