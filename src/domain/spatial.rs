//! Pure spatial join and geometry validation. No I/O, no reprojection.

use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{Area, BoundingRect, CoordsIter, Geometry, Intersects, LineString, Polygon, Rect, Relate};

use super::{DomainError, Feature, Predicate};

/// Count distinct query features matching at least one target under `predicate`.
///
/// Target bounding boxes are computed once and used as a prefilter. Every
/// query geometry is validated strictly (including ring self-intersection);
/// targets get the structural checks only, since layers can be very large.
pub fn count_matches(
    query: &[Feature],
    targets: &[Feature],
    predicate: Predicate,
) -> Result<usize, DomainError> {
    for (i, f) in query.iter().enumerate() {
        validate(&f.geometry, true)
            .map_err(|e| DomainError::Geometry(format!("query feature {}: {}", i, e)))?;
    }

    let mut indexed: Vec<(Rect<f64>, &Geometry<f64>)> = Vec::with_capacity(targets.len());
    for (i, f) in targets.iter().enumerate() {
        validate(&f.geometry, false)
            .map_err(|e| DomainError::Geometry(format!("layer feature {}: {}", i, e)))?;
        if let Some(rect) = f.geometry.bounding_rect() {
            indexed.push((rect, &f.geometry));
        }
    }

    let matched = query
        .iter()
        .filter(|q| {
            let Some(q_rect) = q.geometry.bounding_rect() else {
                return false;
            };
            indexed
                .iter()
                .filter(|(rect, _)| rect.intersects(&q_rect))
                .any(|(_, target)| satisfies(&q.geometry, target, predicate))
        })
        .count();
    Ok(matched)
}

fn satisfies(query: &Geometry<f64>, target: &Geometry<f64>, predicate: Predicate) -> bool {
    match predicate {
        Predicate::Intersects => query.intersects(target),
        Predicate::Within => query.relate(target).is_within(),
    }
}

/// Structural validity: finite coordinates, rings of at least four positions,
/// non-zero polygon area. `strict` also rejects self-intersecting rings.
pub fn validate(geometry: &Geometry<f64>, strict: bool) -> Result<(), String> {
    if geometry
        .coords_iter()
        .any(|c| !c.x.is_finite() || !c.y.is_finite())
    {
        return Err("non-finite coordinate".to_string());
    }
    match geometry {
        Geometry::Polygon(p) => validate_polygon(p, strict),
        Geometry::MultiPolygon(mp) => mp.iter().try_for_each(|p| validate_polygon(p, strict)),
        Geometry::GeometryCollection(gc) => gc.iter().try_for_each(|g| validate(g, strict)),
        Geometry::LineString(ls) if ls.0.len() < 2 => {
            Err("linestring with fewer than 2 positions".to_string())
        }
        _ => Ok(()),
    }
}

fn validate_polygon(polygon: &Polygon<f64>, strict: bool) -> Result<(), String> {
    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
        if ring.0.len() < 4 {
            return Err(format!("degenerate ring with {} positions", ring.0.len()));
        }
        if strict && ring_self_intersects(ring) {
            return Err("self-intersecting ring".to_string());
        }
    }
    if polygon.unsigned_area() == 0.0 {
        return Err("zero-area polygon".to_string());
    }
    Ok(())
}

/// Proper crossings or collinear overlaps of non-zero length between ring segments.
/// Repeated consecutive vertices are valid and collapsed first.
fn ring_self_intersects(ring: &LineString<f64>) -> bool {
    let mut coords = ring.0.clone();
    coords.dedup();
    let segments: Vec<_> = LineString::new(coords).lines().collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 1)..n {
            // Touching at a shared vertex is tolerated; crossings and overlaps are not.
            match line_intersection(segments[i], segments[j]) {
                Some(LineIntersection::SinglePoint { is_proper: true, .. }) => return true,
                Some(LineIntersection::Collinear { intersection }) => {
                    if intersection.start != intersection.end {
                        return true;
                    }
                }
                _ => {}
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Point, polygon};

    fn square(x0: f64, y0: f64, size: f64) -> Feature {
        Feature::new(polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ])
    }

    #[test]
    fn test_inside_matches_both_predicates() {
        let query = vec![square(1.0, 1.0, 1.0)];
        let targets = vec![square(0.0, 0.0, 10.0)];
        assert_eq!(count_matches(&query, &targets, Predicate::Within).unwrap(), 1);
        assert_eq!(count_matches(&query, &targets, Predicate::Intersects).unwrap(), 1);
    }

    #[test]
    fn test_disjoint_matches_nothing() {
        let query = vec![square(100.0, 100.0, 1.0)];
        let targets = vec![square(0.0, 0.0, 10.0), square(20.0, 20.0, 5.0)];
        assert_eq!(count_matches(&query, &targets, Predicate::Intersects).unwrap(), 0);
    }

    #[test]
    fn test_overlap_intersects_but_not_within() {
        let query = vec![square(8.0, 8.0, 5.0)];
        let targets = vec![square(0.0, 0.0, 10.0)];
        assert_eq!(count_matches(&query, &targets, Predicate::Intersects).unwrap(), 1);
        assert_eq!(count_matches(&query, &targets, Predicate::Within).unwrap(), 0);
    }

    #[test]
    fn test_counts_query_side_rows_not_pairs() {
        // One query feature hits three overlapping targets: counted once.
        let query = vec![square(1.0, 1.0, 1.0), square(50.0, 50.0, 1.0)];
        let targets = vec![
            square(0.0, 0.0, 10.0),
            square(0.5, 0.5, 5.0),
            square(0.0, 0.0, 3.0),
        ];
        let n = count_matches(&query, &targets, Predicate::Intersects).unwrap();
        assert_eq!(n, 1);
        assert!(n <= query.len());
    }

    #[test]
    fn test_point_within_polygon() {
        let query = vec![Feature::new(Point::new(2.0, 2.0))];
        let targets = vec![square(0.0, 0.0, 10.0)];
        assert_eq!(count_matches(&query, &targets, Predicate::Within).unwrap(), 1);
    }

    #[test]
    fn test_self_intersecting_query_is_error() {
        // Bow-tie ring.
        let bowtie = Feature::new(polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ]);
        let targets = vec![square(0.0, 0.0, 10.0)];
        let err = count_matches(&[bowtie], &targets, Predicate::Intersects).unwrap_err();
        assert!(matches!(err, DomainError::Geometry(_)));
    }

    #[test]
    fn test_repeated_vertex_is_valid() {
        let parcel = Feature::new(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]);
        let targets = vec![square(-1.0, -1.0, 5.0)];
        assert_eq!(count_matches(&[parcel], &targets, Predicate::Intersects).unwrap(), 1);
    }

    #[test]
    fn test_backtracking_spike_is_error() {
        // (2,0) -> (3,0) -> (2,0) folds back over itself.
        let spike: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 3.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ]
        .into();
        assert_eq!(validate(&spike, true), Err("self-intersecting ring".to_string()));
    }

    #[test]
    fn test_degenerate_target_is_error() {
        let flat = Feature::new(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 0.0),
        ]);
        let query = vec![square(0.0, 0.0, 1.0)];
        let err = count_matches(&query, &[flat], Predicate::Intersects).unwrap_err();
        assert!(err.to_string().contains("zero-area"));
    }

    #[test]
    fn test_non_finite_rejected() {
        let g: Geometry<f64> = Point::new(f64::NAN, 1.0).into();
        assert!(validate(&g, true).is_err());
    }
}
