//! Style document parsing and per-layer property compilation.

use std::fs;
use std::path::Path;

use crate::error::{StyleError, StyleResult};
use crate::style::function::FeatureFilter;
use crate::style::properties::{PropertySet, TransitionOptions};
use crate::style::spec::PropertyKind;
use crate::style::types::{LayerType, StyleLayer, StyleSpec};

const TRANSITION_SUFFIX: &str = "-transition";

/// Parse a style JSON file.
pub fn parse_style(path: &Path) -> StyleResult<StyleSpec> {
    let content = fs::read_to_string(path)?;
    parse_style_str(&content)
}

/// Parse a style from a JSON string.
pub fn parse_style_str(json: &str) -> StyleResult<StyleSpec> {
    let spec: StyleSpec = serde_json::from_str(json)?;
    validate_style(&spec)?;
    Ok(spec)
}

fn validate_style(spec: &StyleSpec) -> StyleResult<()> {
    if spec.version != 8 {
        return Err(StyleError::Invalid(format!(
            "Unsupported style version: {} (expected 8)",
            spec.version
        )));
    }
    let mut seen = std::collections::HashSet::new();
    for layer in &spec.layers {
        if !seen.insert(layer.id.as_str()) {
            return Err(StyleError::Invalid(format!("Duplicate layer id \"{}\"", layer.id)));
        }
    }
    Ok(())
}

impl StyleSpec {
    pub fn layers_by_type(&self, layer_type: LayerType) -> Vec<&StyleLayer> {
        self.layers
            .iter()
            .filter(|l| l.layer_type == layer_type)
            .collect()
    }

    pub fn symbol_layers(&self) -> Vec<&StyleLayer> {
        self.layers_by_type(LayerType::Symbol)
    }

    pub fn layer_by_id(&self, id: &str) -> Option<&StyleLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layers_for_source_layer(&self, source_layer: &str) -> Vec<&StyleLayer> {
        self.layers
            .iter()
            .filter(|l| l.source_layer.as_deref() == Some(source_layer))
            .collect()
    }
}

impl StyleLayer {
    /// Visible unless layout `visibility` is `"none"`.
    pub fn is_visible(&self) -> bool {
        self.layout.get("visibility").and_then(|v| v.as_str()) != Some("none")
    }

    pub fn in_zoom_range(&self, zoom: f64) -> bool {
        let min_ok = self.minzoom.map(|z| zoom >= z).unwrap_or(true);
        let max_ok = self.maxzoom.map(|z| zoom < z).unwrap_or(true);
        min_ok && max_ok
    }

    /// Compile the layout block.
    pub fn layout_properties(&self) -> StyleResult<PropertySet> {
        let mut set = PropertySet::new(PropertyKind::Layout, self.layer_type);
        for (name, value) in &self.layout {
            set.set_value(name, Some(value.clone()))?;
        }
        Ok(set)
    }

    /// Compile the paint block, including `<name>-transition` entries.
    pub fn paint_properties(&self) -> StyleResult<PropertySet> {
        let mut set = PropertySet::new(PropertyKind::Paint, self.layer_type);
        for (name, value) in &self.paint {
            match name.strip_suffix(TRANSITION_SUFFIX) {
                Some(property) => {
                    let transition: TransitionOptions = serde_json::from_value(value.clone())?;
                    set.set_transition(property, transition)?;
                }
                None => set.set_value(name, Some(value.clone()))?,
            }
        }
        Ok(set)
    }

    pub fn feature_filter(&self) -> StyleResult<FeatureFilter> {
        FeatureFilter::new(self.filter.as_ref())
            .map_err(|errors| StyleError::expression(format!("{}.filter", self.id), errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::expression::{EvaluationContext, Feature, GeometryType};
    use crate::style::value::{PropertyMap, Value};
    use serde_json::json;

    fn minimal_style_json() -> &'static str {
        r##"{"version":8,"name":"Test Style","sources":{},"layers":[{"id":"background","type":"background","paint":{"background-color":"#f0f0f0"}},{"id":"roads","type":"line","source":"composite","source-layer":"road","paint":{"line-color":"#ffffff","line-width":2,"line-color-transition":{"duration":500}},"filter":["==","class","motorway"]},{"id":"labels","type":"symbol","source":"composite","source-layer":"place_label","layout":{"text-field":"{name}","text-size":14},"paint":{"text-color":"#333333","text-halo-color":"#ffffff","text-halo-width":1.5}},{"id":"hidden-layer","type":"fill","source":"composite","source-layer":"landuse","layout":{"visibility":"none"}}]}"##
    }

    #[test]
    fn test_parse_minimal_style() {
        let spec = parse_style_str(minimal_style_json()).unwrap();
        assert_eq!(spec.version, 8);
        assert_eq!(spec.name, "Test Style");
        assert_eq!(spec.layers.len(), 4);
        assert_eq!(spec.symbol_layers().len(), 1);
        assert_eq!(spec.layers_for_source_layer("road").len(), 1);
    }

    #[test]
    fn test_layer_visibility() {
        let spec = parse_style_str(minimal_style_json()).unwrap();
        assert!(spec.layer_by_id("roads").unwrap().is_visible());
        assert!(!spec.layer_by_id("hidden-layer").unwrap().is_visible());
    }

    #[test]
    fn test_paint_properties_with_transition() {
        let spec = parse_style_str(minimal_style_json()).unwrap();
        let paint = spec.layer_by_id("roads").unwrap().paint_properties().unwrap();
        assert_eq!(paint.get_value("line-width"), Some(&json!(2)));
        let transition = paint.get_transition("line-color").unwrap();
        assert_eq!(transition.duration, 500.0);
        assert_eq!(transition.delay, 0.0);
    }

    #[test]
    fn test_layout_properties() {
        let spec = parse_style_str(minimal_style_json()).unwrap();
        let layout = spec.layer_by_id("labels").unwrap().layout_properties().unwrap();
        assert!(layout.get("text-field").unwrap().is_data_driven());
        assert_eq!(layout.get_value("text-size"), Some(&json!(14)));
    }

    #[test]
    fn test_legacy_filter_compiles() {
        let spec = parse_style_str(minimal_style_json()).unwrap();
        let filter = spec.layer_by_id("roads").unwrap().feature_filter().unwrap();
        let mut props = PropertyMap::new();
        props.insert("class".into(), Value::from("motorway"));
        let feature = Feature::new(GeometryType::LineString, props);
        assert!(filter.matches(&EvaluationContext::default().with_feature(&feature)));
    }

    #[test]
    fn test_invalid_styles() {
        assert!(parse_style_str(r#"{"version": 7, "layers": []}"#).is_err());
        let duplicate = r#"{"version": 8, "layers": [{"id": "a", "type": "fill"}, {"id": "a", "type": "line"}]}"#;
        assert!(matches!(parse_style_str(duplicate), Err(StyleError::Invalid(_))));
    }

    #[test]
    fn test_bad_property_reports_name() {
        let spec = parse_style_str(
            r#"{"version": 8, "layers": [{"id": "a", "type": "symbol", "layout": {"text-size": ["get"]}}]}"#,
        )
        .unwrap();
        let err = spec.layers[0].layout_properties().unwrap_err();
        assert!(err.to_string().starts_with("text-size: "));
    }
}
