use std::collections::HashSet;

use saturn_core::frame::PointF;
use saturn_core::stack::triangulation::orientation;
use saturn_core::stack::Triangulation;

fn pts(coords: &[(f64, f64)]) -> Vec<PointF> {
    coords.iter().map(|&(x, y)| PointF::new(x, y)).collect()
}

fn circumcircle_empty(tri: &Triangulation) -> bool {
    let p = tri.points();
    tri.triangles().iter().all(|t| {
        let (a, b, c) = (p[t.v[0]], p[t.v[1]], p[t.v[2]]);
        let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        let a2 = a.x * a.x + a.y * a.y;
        let b2 = b.x * b.x + b.y * b.y;
        let c2 = c.x * c.x + c.y * c.y;
        let cx = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
        let cy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
        let r2 = (a.x - cx).powi(2) + (a.y - cy).powi(2);
        p.iter()
            .enumerate()
            .filter(|(i, _)| !t.v.contains(i))
            .all(|(_, q)| (q.x - cx).powi(2) + (q.y - cy).powi(2) >= r2 - 1e-6)
    })
}

#[test]
fn test_single_triangle() {
    let tri = Triangulation::build(&pts(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)])).unwrap();
    assert_eq!(tri.triangles().len(), 1);
    assert_eq!(tri.edges().len(), 3);
}

#[test]
fn test_too_few_points() {
    assert!(Triangulation::build(&pts(&[(0.0, 0.0), (1.0, 1.0)])).is_err());
}

#[test]
fn test_square_with_centre() {
    let tri = Triangulation::build(&pts(&[
        (0.0, 0.0),
        (20.0, 0.0),
        (0.0, 20.0),
        (20.0, 20.0),
        (10.0, 10.0),
    ]))
    .unwrap();
    assert_eq!(tri.triangles().len(), 4);
    assert_eq!(tri.edges().len(), 8);
    // Every triangle touches the centre point.
    assert!(tri.triangles().iter().all(|t| t.v.contains(&4)));
}

#[test]
fn test_triangles_wind_consistently() {
    let points = pts(&[
        (0.0, 0.0),
        (30.0, 0.0),
        (60.0, 0.0),
        (0.0, 30.0),
        (27.0, 33.0),
        (60.0, 30.0),
        (0.0, 60.0),
        (30.0, 60.0),
        (60.0, 60.0),
    ]);
    let tri = Triangulation::build(&points).unwrap();
    for t in tri.triangles() {
        let area = orientation(points[t.v[0]], points[t.v[1]], points[t.v[2]]);
        assert!(area > 0.0);
    }
    assert!(circumcircle_empty(&tri));
}

#[test]
fn test_triangles_cover_convex_hull() {
    let points = pts(&[
        (0.0, 0.0),
        (40.0, 0.0),
        (40.0, 30.0),
        (0.0, 30.0),
        (12.0, 9.0),
        (31.0, 17.0),
        (18.0, 24.0),
    ]);
    let tri = Triangulation::build(&points).unwrap();
    let area: f64 = tri
        .triangles()
        .iter()
        .map(|t| orientation(points[t.v[0]], points[t.v[1]], points[t.v[2]]).abs() / 2.0)
        .sum();
    assert!((area - 1200.0).abs() < 1e-6);
    assert!(circumcircle_empty(&tri));
}

#[test]
fn test_duplicate_points_ignored() {
    let tri = Triangulation::build(&pts(&[
        (0.0, 0.0),
        (10.0, 0.0),
        (0.0, 10.0),
        (10.0, 0.0),
    ]))
    .unwrap();
    assert_eq!(tri.points().len(), 4);
    assert_eq!(tri.triangles().len(), 1);
    let used: HashSet<usize> = tri.triangles().iter().flat_map(|t| t.v).collect();
    assert!(!used.contains(&3));
}
