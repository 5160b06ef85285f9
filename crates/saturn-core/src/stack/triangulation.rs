//! Delaunay triangulation (Bowyer–Watson) of reference points.

use crate::error::{Result, SaturnError};
use crate::frame::PointF;

/// Triangle as indices into the triangulated point list, counter-clockwise
/// in image coordinates (x right, y down).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Triangle {
    pub v: [usize; 3],
}

#[derive(Clone, Debug)]
pub struct Triangulation {
    points: Vec<PointF>,
    triangles: Vec<Triangle>,
}

/// Working triangle with cached circumcircle.
#[derive(Clone, Copy)]
struct Cell {
    v: [usize; 3],
    cx: f64,
    cy: f64,
    r2: f64,
}

impl Triangulation {
    /// Triangulate `points`. Duplicate points are kept in the list but take
    /// no part in any triangle.
    pub fn build(points: &[PointF]) -> Result<Self> {
        if points.len() < 3 {
            return Err(SaturnError::InvalidParameters(format!(
                "Triangulation needs at least 3 points, got {}",
                points.len()
            )));
        }

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let span = (max_x - min_x).max(max_y - min_y).max(1.0);
        let mid_x = (min_x + max_x) / 2.0;
        let mid_y = (min_y + max_y) / 2.0;

        // Super-triangle vertices follow the real points.
        let n = points.len();
        let mut all: Vec<PointF> = points.to_vec();
        all.push(PointF::new(mid_x - 100.0 * span, mid_y - span));
        all.push(PointF::new(mid_x, mid_y + 100.0 * span));
        all.push(PointF::new(mid_x + 100.0 * span, mid_y - span));

        let mut cells: Vec<Cell> = Vec::new();
        cells.extend(make_cell(&all, [n, n + 1, n + 2]));

        for (i, p) in points.iter().enumerate() {
            if points[..i]
                .iter()
                .any(|q| (q.x - p.x).abs() < 1e-9 && (q.y - p.y).abs() < 1e-9)
            {
                continue;
            }

            let mut boundary: Vec<[usize; 2]> = Vec::new();
            cells.retain(|c| {
                let dx = p.x - c.cx;
                let dy = p.y - c.cy;
                if dx * dx + dy * dy < c.r2 {
                    for e in [[c.v[0], c.v[1]], [c.v[1], c.v[2]], [c.v[2], c.v[0]]] {
                        // An edge shared by two removed triangles is interior.
                        if let Some(pos) = boundary
                            .iter()
                            .position(|b| (b[0] == e[1] && b[1] == e[0]) || *b == e)
                        {
                            boundary.swap_remove(pos);
                        } else {
                            boundary.push(e);
                        }
                    }
                    false
                } else {
                    true
                }
            });

            for e in boundary {
                cells.extend(make_cell(&all, [e[0], e[1], i]));
            }
        }

        let triangles = cells
            .into_iter()
            .filter(|c| c.v.iter().all(|&v| v < n))
            .map(|c| Triangle { v: c.v })
            .collect();

        Ok(Self {
            points: points.to_vec(),
            triangles,
        })
    }

    pub fn points(&self) -> &[PointF] {
        &self.points
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Unique undirected edges, for drawing.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<(usize, usize)> = self
            .triangles
            .iter()
            .flat_map(|t| {
                [(t.v[0], t.v[1]), (t.v[1], t.v[2]), (t.v[2], t.v[0])]
                    .map(|(a, b)| (a.min(b), a.max(b)))
            })
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }
}

/// Twice the signed area; positive when `a, b, c` turn counter-clockwise
/// on screen (y pointing down).
pub fn orientation(a: PointF, b: PointF, c: PointF) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Build a cell with consistent winding; `None` for collinear vertices.
fn make_cell(points: &[PointF], mut v: [usize; 3]) -> Option<Cell> {
    let (a, b, c) = (points[v[0]], points[v[1]], points[v[2]]);
    let cross = orientation(a, b, c);
    if cross.abs() < 1e-12 {
        return None;
    }
    if cross < 0.0 {
        v.swap(1, 2);
    }

    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    let a2 = a.x * a.x + a.y * a.y;
    let b2 = b.x * b.x + b.y * b.y;
    let c2 = c.x * c.x + c.y * c.y;
    let cx = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
    let cy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
    let r2 = (a.x - cx).powi(2) + (a.y - cy).powi(2);

    Some(Cell { v, cx, cy, r2 })
}
