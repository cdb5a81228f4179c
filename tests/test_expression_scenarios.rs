// tests/test_expression_scenarios.rs
// End-to-end expression scenarios through the public API
// Covers match/interpolate results, parse idempotence, stop ordering and monotonic curves
//
// RELEVANT FILES: src/style/expression/parser.rs, src/style/expression/evaluate.rs,
// src/style/expression/interpolate.rs

#[cfg(test)]
mod expression_scenario_tests {
    use mapstyle::style::{
        create_expression, EvaluationContext, Feature, GeometryType, GlobalProperties, PropertyMap, Value,
    };
    use serde_json::json;

    fn feature(properties: &[(&str, Value)]) -> Feature {
        let mut map = PropertyMap::new();
        for (key, value) in properties {
            map.insert((*key).to_string(), value.clone());
        }
        Feature::new(GeometryType::Point, map)
    }

    fn eval(expression: &serde_json::Value, zoom: f64, feature: &Feature) -> Value {
        let compiled = create_expression(expression, None).expect("expression compiles");
        let ctx = EvaluationContext::new(GlobalProperties::at_zoom(zoom)).with_feature(feature);
        compiled.evaluate(&ctx)
    }

    #[test]
    fn match_picks_branch_by_label() {
        let expression = json!([
            "match", ["get", "class"],
            ["motorway", "trunk"], "major",
            ["residential"], "minor",
            "other"
        ]);
        let cases = [("trunk", "major"), ("residential", "minor"), ("footway", "other")];
        for (class, expected) in cases {
            let f = feature(&[("class", Value::from(class))]);
            assert_eq!(eval(&expression, 0.0, &f), Value::from(expected), "class {class}");
        }
    }

    #[test]
    fn linear_zoom_interpolation_is_exact() {
        let expression = json!(["interpolate", ["linear"], ["zoom"], 5, 1, 10, 2]);
        let f = feature(&[]);
        assert_eq!(eval(&expression, 7.5, &f), Value::Number(1.5));
        assert_eq!(eval(&expression, 0.0, &f), Value::Number(1.0));
        assert_eq!(eval(&expression, 20.0, &f), Value::Number(2.0));
    }

    #[test]
    fn reparsing_gives_identical_results() {
        let expression = json!([
            "case",
            ["has", "rank"], ["to-string", ["*", ["to-number", ["get", "rank"]], ["^", 2, ["zoom"]]]],
            ["concat", ["upcase", ["get", "name"]], "!"]
        ]);
        let first = create_expression(&expression, None).expect("compiles");
        let second = create_expression(&expression, None).expect("compiles");

        let features = [
            feature(&[("rank", Value::Number(3.0))]),
            feature(&[("rank", Value::from("0.125"))]),
            feature(&[("name", Value::from("oak"))]),
        ];
        for f in &features {
            for zoom in [0.0, 3.3, 12.0] {
                let ctx = EvaluationContext::new(GlobalProperties::at_zoom(zoom)).with_feature(f);
                let a = first.evaluate(&ctx);
                let b = second.evaluate(&ctx);
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn unordered_stops_are_rejected() {
        let bad = [
            json!(["interpolate", ["linear"], ["zoom"], 10, 1, 5, 2]),
            json!(["interpolate", ["linear"], ["zoom"], 5, 1, 5, 2]),
            json!(["step", ["zoom"], 0, 8, 1, 4, 2]),
        ];
        for expression in &bad {
            assert!(create_expression(expression, None).is_err(), "{expression}");
        }
    }

    #[test]
    fn interpolation_is_monotonic() {
        let curves = [
            json!(["interpolate", ["linear"], ["zoom"], 0, 0, 10, 5, 20, 100]),
            json!(["interpolate", ["exponential", 0.5], ["zoom"], 0, 0, 10, 5, 20, 100]),
            json!(["interpolate", ["exponential", 2.5], ["zoom"], 0, 0, 10, 5, 20, 100]),
            json!(["interpolate", ["cubic-bezier", 0.1, 0.9, 0.8, 0.2], ["zoom"], 0, 0, 10, 5, 20, 100]),
        ];
        let f = feature(&[]);
        for curve in &curves {
            let mut previous = f64::NEG_INFINITY;
            for step in 0..=220 {
                let zoom = step as f64 * 0.1;
                let value = eval(curve, zoom, &f).as_f64().expect("number output");
                assert!(value >= previous - 1e-9, "{curve} decreased at zoom {zoom}");
                previous = value;
            }
        }
    }

    #[test]
    fn runtime_errors_fall_back_to_default() {
        let expression = json!(["at", 5, ["literal", [1, 2]]]);
        let f = feature(&[]);
        assert_eq!(eval(&expression, 0.0, &f), Value::Null);
    }
}
