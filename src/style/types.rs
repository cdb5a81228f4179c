//! Style document types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Complete style document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleSpec {
    /// Style version (always 8).
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub layers: Vec<StyleLayer>,
    /// Data sources (informational, not parsed in detail).
    #[serde(default)]
    pub sources: JsonValue,
    #[serde(default)]
    pub sprite: Option<String>,
    /// Glyphs URL template.
    #[serde(default)]
    pub glyphs: Option<String>,
    /// Global property transition.
    #[serde(default)]
    pub transition: Option<crate::style::properties::TransitionOptions>,
}

fn default_version() -> u32 {
    8
}

/// A single style layer. Paint and layout values stay raw JSON until compiled
/// into a [`crate::style::properties::PropertySet`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleLayer {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "source-layer")]
    #[serde(default)]
    pub source_layer: Option<String>,
    #[serde(default)]
    pub paint: Map<String, JsonValue>,
    #[serde(default)]
    pub layout: Map<String, JsonValue>,
    /// Expression or legacy filter.
    #[serde(default)]
    pub filter: Option<JsonValue>,
    #[serde(default)]
    pub minzoom: Option<f64>,
    #[serde(default)]
    pub maxzoom: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Fill,
    Line,
    Symbol,
    Background,
    Circle,
    Raster,
    Hillshade,
    #[serde(other)]
    Unknown,
}

impl LayerType {
    /// Name prefixes of the paint and layout properties this layer type owns.
    pub fn property_prefixes(&self) -> &'static [&'static str] {
        match self {
            LayerType::Fill => &["fill-"],
            LayerType::Line => &["line-"],
            LayerType::Symbol => &["symbol-", "icon-", "text-"],
            LayerType::Background => &["background-"],
            LayerType::Circle => &["circle-"],
            LayerType::Raster | LayerType::Hillshade | LayerType::Unknown => &[],
        }
    }
}
