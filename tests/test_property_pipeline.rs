// tests/test_property_pipeline.rs
// Style document to evaluated layer properties
// Parses a style, compiles layout/paint blocks and evaluates them per zoom and per feature
//
// RELEVANT FILES: src/style/parser.rs, src/style/properties.rs, src/style/function.rs

#[cfg(test)]
mod property_pipeline_tests {
    use mapstyle::style::{
        parse_style_str, Color, EvaluationContext, EvaluationParameters, Feature, GeometryType, PropertyMap, Value,
    };
    use mapstyle::StyleError;

    const STYLE: &str = r##"{
        "version": 8,
        "name": "pipeline",
        "sources": {},
        "layers": [
            {
                "id": "roads",
                "type": "line",
                "source": "streets",
                "source-layer": "road",
                "filter": ["==", "class", "motorway"],
                "paint": {
                    "line-color": "#ff0000",
                    "line-width": {"base": 2, "stops": [[10, 1], [14, 9]]},
                    "line-opacity": ["*", ["get", "weight"], 0.5]
                }
            },
            {
                "id": "places",
                "type": "symbol",
                "source": "streets",
                "source-layer": "place",
                "minzoom": 4,
                "layout": {
                    "text-field": "{name}",
                    "text-size": ["interpolate", ["linear"], ["zoom"], 4, 10, 12, 20],
                    "text-anchor": ["get", "anchor"]
                }
            }
        ]
    }"##;

    fn feature(properties: &[(&str, Value)]) -> Feature {
        let map: PropertyMap = properties.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
        Feature::new(GeometryType::LineString, map)
    }

    #[test]
    fn zoom_functions_evaluate_per_camera() {
        let style = parse_style_str(STYLE).expect("style parses");
        let roads = style.layer_by_id("roads").expect("roads layer");
        let paint = roads.paint_properties().expect("paint compiles");

        let low = paint.possibly_evaluate(&EvaluationParameters::new(8.0));
        assert_eq!(low.constant("line-width"), Value::Number(1.0));
        let high = paint.possibly_evaluate(&EvaluationParameters::new(16.0));
        assert_eq!(high.constant("line-width"), Value::Number(9.0));
        assert_eq!(high.constant("line-color"), Value::from(Color::new(1.0, 0.0, 0.0, 1.0)));

        // unset properties take their defaults
        assert_eq!(high.constant("line-blur"), Value::Number(0.0));
    }

    #[test]
    fn data_driven_values_read_feature_properties() {
        let style = parse_style_str(STYLE).expect("style parses");
        let paint = style.layer_by_id("roads").expect("roads").paint_properties().expect("paint");
        let evaluated = paint.possibly_evaluate(&EvaluationParameters::new(12.0));

        let opacity = evaluated.get("line-opacity").expect("line-opacity is set");
        assert!(!opacity.is_constant());

        let heavy = feature(&[("weight", Value::Number(1.6))]);
        let ctx = EvaluationContext::new(EvaluationParameters::new(12.0).globals()).with_feature(&heavy);
        assert_eq!(evaluated.evaluate("line-opacity", &ctx), Value::Number(0.8));
    }

    #[test]
    fn runtime_errors_substitute_defaults() {
        let style = parse_style_str(STYLE).expect("style parses");
        let places = style.layer_by_id("places").expect("places layer");
        let layout = places.layout_properties().expect("layout compiles");
        let evaluated = layout.possibly_evaluate(&EvaluationParameters::new(8.0));

        assert_eq!(evaluated.constant("text-size"), Value::Number(15.0));

        // a missing or invalid anchor falls back to "center"
        let bare = feature(&[]);
        let ctx = EvaluationContext::new(EvaluationParameters::new(8.0).globals()).with_feature(&bare);
        assert_eq!(evaluated.evaluate("text-anchor", &ctx), Value::from("center"));

        let odd = feature(&[("anchor", Value::from("sideways"))]);
        let ctx = EvaluationContext::new(EvaluationParameters::new(8.0).globals()).with_feature(&odd);
        assert_eq!(evaluated.evaluate("text-anchor", &ctx), Value::from("center"));

        let named = feature(&[("name", Value::from("Lisbon"))]);
        let ctx = EvaluationContext::new(EvaluationParameters::new(8.0).globals()).with_feature(&named);
        assert_eq!(evaluated.evaluate("text-field", &ctx).to_display_string(), "Lisbon");
    }

    #[test]
    fn filters_and_zoom_ranges_apply() {
        let style = parse_style_str(STYLE).expect("style parses");
        let roads = style.layer_by_id("roads").expect("roads");
        let filter = roads.feature_filter().expect("filter compiles");

        let motorway = feature(&[("class", Value::from("motorway"))]);
        let lane = feature(&[("class", Value::from("service"))]);
        let globals = EvaluationParameters::new(10.0).globals();
        assert!(filter.matches(&EvaluationContext::new(globals).with_feature(&motorway)));
        assert!(!filter.matches(&EvaluationContext::new(globals).with_feature(&lane)));

        let places = style.layer_by_id("places").expect("places");
        assert!(!places.in_zoom_range(3.0));
        assert!(places.in_zoom_range(4.0));
        assert_eq!(style.symbol_layers().len(), 1);
    }

    #[test]
    fn invalid_documents_are_rejected() {
        let wrong_version = r#"{"version": 7, "sources": {}, "layers": []}"#;
        assert!(matches!(parse_style_str(wrong_version), Err(StyleError::Invalid(_))));

        let bad_value = r#"{"version": 8, "sources": {}, "layers": [
            {"id": "a", "type": "line", "paint": {"line-width": ["interpolate", ["linear"], ["zoom"], 5, 1, 3, 2]}}
        ]}"#;
        let style = parse_style_str(bad_value).expect("values compile lazily");
        assert!(style.layer_by_id("a").expect("layer").paint_properties().is_err());
    }
}
