//! `within`: whether a point or line feature lies inside GeoJSON polygons.
//!
//! Polygons are projected into the world-space tile coordinates of the
//! evaluated tile (zoom `z`, extent 8192), so feature geometry can be tested
//! without unprojecting it.

use glam::DVec2;
use serde_json::Value as JsonValue;

use super::parser::ParsingContext;
use super::{EvaluationContext, Expression, GeometryType};
use crate::tile_id::CanonicalTileId;

const EXTENT: f64 = 8192.0;

type Ring = Vec<DVec2>;
type Polygon = Vec<Ring>;

/// Polygons in longitude/latitude, flattened to a multipolygon.
#[derive(Debug, Clone, PartialEq)]
pub struct WithinGeometry {
    polygons: Vec<Polygon>,
}

impl WithinGeometry {
    pub fn polygons(&self) -> usize {
        self.polygons.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct BBox {
    min: DVec2,
    max: DVec2,
}

impl BBox {
    fn empty() -> Self {
        Self {
            min: DVec2::splat(f64::INFINITY),
            max: DVec2::splat(f64::NEG_INFINITY),
        }
    }

    fn extend(&mut self, p: DVec2) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Strict containment of `self` in `outer`.
    fn within(&self, outer: &BBox) -> bool {
        self.min.x > outer.min.x
            && self.max.x < outer.max.x
            && self.min.y > outer.min.y
            && self.max.y < outer.max.y
    }
}

fn parse_ring(json: &JsonValue) -> Option<Ring> {
    json.as_array()?
        .iter()
        .map(|coord| {
            let pair = coord.as_array()?;
            Some(DVec2::new(pair.first()?.as_f64()?, pair.get(1)?.as_f64()?))
        })
        .collect()
}

fn parse_polygon(json: &JsonValue) -> Option<Polygon> {
    json.as_array()?.iter().map(parse_ring).collect()
}

/// Polygons of a Polygon or MultiPolygon geometry object; empty for other types.
fn geometry_polygons(geometry: &JsonValue) -> Option<Vec<Polygon>> {
    let coordinates = geometry.get("coordinates");
    match geometry.get("type").and_then(JsonValue::as_str) {
        Some("Polygon") => Some(vec![parse_polygon(coordinates?)?]),
        Some("MultiPolygon") => coordinates?
            .as_array()?
            .iter()
            .map(parse_polygon)
            .collect(),
        _ => Some(Vec::new()),
    }
}

fn parse_geojson(json: &JsonValue) -> Option<Vec<Polygon>> {
    let polygons = match json.get("type").and_then(JsonValue::as_str)? {
        "FeatureCollection" => {
            let mut all = Vec::new();
            for feature in json.get("features")?.as_array()? {
                all.extend(geometry_polygons(feature.get("geometry")?)?);
            }
            all
        }
        "Feature" => geometry_polygons(json.get("geometry")?)?,
        "Polygon" | "MultiPolygon" => geometry_polygons(json)?,
        _ => return None,
    };
    if polygons.is_empty() {
        None
    } else {
        Some(polygons)
    }
}

pub(crate) fn parse_within(args: &[JsonValue], ctx: &ParsingContext) -> Option<Expression> {
    if args.len() != 2 {
        return ctx.error(format!(
            "'within' expression requires exactly one argument, but found {} instead.",
            args.len() - 1
        ));
    }
    match parse_geojson(&args[1]) {
        Some(polygons) => Some(Expression::Within(WithinGeometry { polygons })),
        None => ctx.error(
            "'within' expression requires valid geojson object that contains polygon geometry type.",
        ),
    }
}

fn mercator_x(lng: f64) -> f64 {
    (180.0 + lng) / 360.0
}

fn mercator_y(lat: f64) -> f64 {
    (180.0
        - (180.0 / std::f64::consts::PI
            * (std::f64::consts::PI / 4.0 + lat * std::f64::consts::PI / 360.0)
                .tan()
                .ln()))
        / 360.0
}

fn tile_coordinates(lnglat: DVec2, canonical: CanonicalTileId) -> DVec2 {
    let tiles = canonical.world_size();
    DVec2::new(
        (mercator_x(lnglat.x) * tiles * EXTENT).round(),
        (mercator_y(lnglat.y) * tiles * EXTENT).round(),
    )
}

fn on_boundary(p: DVec2, p1: DVec2, p2: DVec2) -> bool {
    let a = p - p1;
    let b = p - p2;
    a.perp_dot(b) == 0.0 && a.x * b.x <= 0.0 && a.y * b.y <= 0.0
}

fn ray_intersect(p: DVec2, p1: DVec2, p2: DVec2) -> bool {
    ((p1.y > p.y) != (p2.y > p.y)) && (p.x < (p2.x - p1.x) * (p.y - p1.y) / (p2.y - p1.y) + p1.x)
}

/// Ray casting; points on an edge are outside.
fn point_within_polygon(point: DVec2, polygon: &Polygon) -> bool {
    let mut inside = false;
    for ring in polygon {
        for edge in ring.windows(2) {
            if on_boundary(point, edge[0], edge[1]) {
                return false;
            }
            if ray_intersect(point, edge[0], edge[1]) {
                inside = !inside;
            }
        }
    }
    inside
}

/// Whether `p1` and `p2` lie strictly on different sides of `q1 -> q2`.
fn two_sided(p1: DVec2, p2: DVec2, q1: DVec2, q2: DVec2) -> bool {
    let edge = q2 - q1;
    let det1 = (p1 - q1).perp_dot(edge);
    let det2 = (p2 - q1).perp_dot(edge);
    (det1 > 0.0 && det2 < 0.0) || (det1 < 0.0 && det2 > 0.0)
}

fn line_intersect_line(a: DVec2, b: DVec2, c: DVec2, d: DVec2) -> bool {
    // Parallel segments never cross when a and b are both inside
    if (d - c).perp_dot(b - a) == 0.0 {
        return false;
    }
    two_sided(a, b, c, d) && two_sided(c, d, a, b)
}

fn line_intersect_polygon(p1: DVec2, p2: DVec2, polygon: &Polygon) -> bool {
    polygon.iter().any(|ring| {
        ring.windows(2)
            .any(|edge| line_intersect_line(p1, p2, edge[0], edge[1]))
    })
}

fn line_within_polygon(line: &[DVec2], polygon: &Polygon) -> bool {
    line.iter().all(|p| point_within_polygon(*p, polygon))
        && !line
            .windows(2)
            .any(|segment| line_intersect_polygon(segment[0], segment[1], polygon))
}

fn project_polygons(polygons: &[Polygon], bbox: &mut BBox, canonical: CanonicalTileId) -> Vec<Polygon> {
    polygons
        .iter()
        .map(|polygon| {
            polygon
                .iter()
                .map(|ring| {
                    ring.iter()
                        .map(|coord| {
                            let p = tile_coordinates(*coord, canonical);
                            bbox.extend(p);
                            p
                        })
                        .collect()
                })
                .collect()
        })
        .collect()
}

/// Shift `p` by a world width when that brings it next to the polygons.
fn update_point(p: &mut DVec2, bbox: &mut BBox, poly_bbox: &BBox, world_size: f64) {
    if p.x < poly_bbox.min.x || p.x > poly_bbox.max.x {
        let half = world_size * 0.5;
        let mut shift = if p.x - poly_bbox.min.x > half {
            -world_size
        } else if poly_bbox.min.x - p.x > half {
            world_size
        } else {
            0.0
        };
        if shift == 0.0 {
            shift = if p.x - poly_bbox.max.x > half {
                -world_size
            } else if poly_bbox.max.x - p.x > half {
                world_size
            } else {
                0.0
            };
        }
        p.x += shift;
    }
    bbox.extend(*p);
}

fn tile_points(
    geometry: &[Vec<glam::IVec2>],
    bbox: &mut BBox,
    poly_bbox: &BBox,
    canonical: CanonicalTileId,
) -> Vec<DVec2> {
    let world_size = canonical.world_size() * EXTENT;
    let shift = DVec2::new(canonical.x as f64 * EXTENT, canonical.y as f64 * EXTENT);
    let mut points = Vec::new();
    for part in geometry {
        for point in part {
            let mut p = point.as_dvec2() + shift;
            update_point(&mut p, bbox, poly_bbox, world_size);
            points.push(p);
        }
    }
    points
}

fn tile_lines(
    geometry: &[Vec<glam::IVec2>],
    bbox: &mut BBox,
    poly_bbox: &BBox,
    canonical: CanonicalTileId,
) -> Vec<Vec<DVec2>> {
    let world_size = canonical.world_size() * EXTENT;
    let shift = DVec2::new(canonical.x as f64 * EXTENT, canonical.y as f64 * EXTENT);
    let mut lines: Vec<Vec<DVec2>> = geometry
        .iter()
        .map(|line| {
            line.iter()
                .map(|point| {
                    let p = point.as_dvec2() + shift;
                    bbox.extend(p);
                    p
                })
                .collect()
        })
        .collect();
    // Lines spanning more than half the world are left unshifted
    if bbox.max.x - bbox.min.x <= world_size / 2.0 {
        *bbox = BBox::empty();
        for line in &mut lines {
            for p in line.iter_mut() {
                update_point(p, bbox, poly_bbox, world_size);
            }
        }
    }
    lines
}

pub(crate) fn evaluate_within(geometry: &WithinGeometry, ctx: &EvaluationContext) -> bool {
    let (Some(feature), Some(canonical)) = (ctx.feature, ctx.canonical) else {
        return false;
    };
    let mut poly_bbox = BBox::empty();
    let polygons = project_polygons(&geometry.polygons, &mut poly_bbox, canonical);
    match feature.geometry_type {
        GeometryType::Point => {
            let mut point_bbox = BBox::empty();
            let points = tile_points(&feature.geometry, &mut point_bbox, &poly_bbox, canonical);
            if !point_bbox.within(&poly_bbox) {
                return false;
            }
            points
                .iter()
                .all(|p| polygons.iter().any(|polygon| point_within_polygon(*p, polygon)))
        }
        GeometryType::LineString => {
            let mut line_bbox = BBox::empty();
            let lines = tile_lines(&feature.geometry, &mut line_bbox, &poly_bbox, canonical);
            if !line_bbox.within(&poly_bbox) {
                return false;
            }
            lines
                .iter()
                .all(|line| polygons.iter().any(|polygon| line_within_polygon(line, polygon)))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::expression::{parse_expression, Feature};
    use crate::style::value::{PropertyMap, Value};
    use glam::IVec2;
    use serde_json::json;

    fn square() -> JsonValue {
        json!({
            "type": "Polygon",
            "coordinates": [[[-10, -10], [10, -10], [10, 10], [-10, 10], [-10, -10]]]
        })
    }

    #[test]
    fn test_point_inside_and_outside() {
        let expr = parse_expression(&json!(["within", square()]), None).unwrap();
        // z0 tile covers the world; the origin maps to the tile center
        let canonical = CanonicalTileId::new(0, 0, 0);
        let inside = Feature::new(GeometryType::Point, PropertyMap::new())
            .with_geometry(vec![vec![IVec2::new(4096, 4096)]]);
        let outside = Feature::new(GeometryType::Point, PropertyMap::new())
            .with_geometry(vec![vec![IVec2::new(100, 100)]]);
        let ctx = EvaluationContext::default().with_canonical(canonical);
        assert_eq!(
            expr.evaluate(&ctx.with_feature(&inside)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            expr.evaluate(&ctx.with_feature(&outside)).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_line_crossing_edge_is_outside() {
        let expr = parse_expression(&json!(["within", square()]), None).unwrap();
        let canonical = CanonicalTileId::new(0, 0, 0);
        let inner = Feature::new(GeometryType::LineString, PropertyMap::new())
            .with_geometry(vec![vec![IVec2::new(4050, 4096), IVec2::new(4140, 4096)]]);
        let crossing = Feature::new(GeometryType::LineString, PropertyMap::new())
            .with_geometry(vec![vec![IVec2::new(4096, 4096), IVec2::new(6000, 4096)]]);
        let ctx = EvaluationContext::default().with_canonical(canonical);
        assert_eq!(expr.evaluate(&ctx.with_feature(&inner)).unwrap(), Value::Bool(true));
        assert_eq!(expr.evaluate(&ctx.with_feature(&crossing)).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_requires_canonical_tile() {
        let expr = parse_expression(&json!(["within", square()]), None).unwrap();
        let point = Feature::new(GeometryType::Point, PropertyMap::new())
            .with_geometry(vec![vec![IVec2::new(4096, 4096)]]);
        let ctx = EvaluationContext::default().with_feature(&point);
        assert_eq!(expr.evaluate(&ctx).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_rejects_non_polygon_geojson() {
        let errors = parse_expression(
            &json!(["within", {"type": "Point", "coordinates": [0, 0]}]),
            None,
        )
        .unwrap_err();
        assert_eq!(
            errors[0].message,
            "'within' expression requires valid geojson object that contains polygon geometry type."
        );
        let geometry = parse_geojson(&json!({
            "type": "FeatureCollection",
            "features": [{"type": "Feature", "geometry": square()}]
        }))
        .unwrap();
        assert_eq!(geometry.len(), 1);
    }
}
