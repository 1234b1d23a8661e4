//! Chamber areas: exact values from the arc geometry, and sampled polygons with gradients.

use nalgebra::{DVector, Vector2};

use crate::arc::{ArcView, PointPartial};
use crate::geometry::{circular_cap_area, signed_polygon_area};
use crate::topology::{Chamber, Topology};

/// Exact area enclosed by a chamber's boundary arcs.
///
/// The polygon through the boundary's vertices is corrected by the circular cap between each
/// arc and its chord, counted positive for arcs traversed in their own (clockwise) direction.
pub fn exact_chamber_area(topology: &Topology, chamber: &Chamber, x: &DVector<f64>) -> f64 {
    let mut corners = Vec::with_capacity(chamber.boundary.len() + 1);
    let mut caps = 0.0;
    for segment in &chamber.boundary {
        let view = ArcView::read(&topology.arcs[segment.arc], x);
        let (entry, sign) = if segment.forward {
            (0.0, 1.0)
        } else {
            (1.0, -1.0)
        };
        corners.push(view.point_at(entry));
        caps += sign * circular_cap_area(view.sweep, view.radius);
    }
    if chamber.open {
        if let Some(segment) = chamber.boundary.last() {
            let view = ArcView::read(&topology.arcs[segment.arc], x);
            corners.push(view.point_at(if segment.forward { 1.0 } else { 0.0 }));
        }
    }
    (signed_polygon_area(&corners) - caps).abs()
}

/// Boundary polygon of a chamber with the partial derivatives of every vertex.
#[derive(Debug, Clone)]
pub struct SampledBoundary {
    pub points: Vec<Vector2<f64>>,
    pub partials: Vec<Vec<PointPartial>>,
}

/// Samples `points_per_arc` points along each boundary arc, following the traversal direction.
///
/// Each arc contributes its entry point but not its exit point, which is the next arc's
/// entry. An open boundary additionally receives its final exit point.
pub fn sample_chamber(
    topology: &Topology,
    chamber: &Chamber,
    x: &DVector<f64>,
    points_per_arc: usize,
) -> SampledBoundary {
    let capacity = chamber.boundary.len() * points_per_arc + 1;
    let mut boundary = SampledBoundary {
        points: Vec::with_capacity(capacity),
        partials: Vec::with_capacity(capacity),
    };
    let mut push = |view: &ArcView, s: f64| {
        boundary.points.push(view.point_at(s));
        boundary.partials.push(view.point_partials(s));
    };
    for segment in &chamber.boundary {
        let view = ArcView::read(&topology.arcs[segment.arc], x);
        for j in 0..points_per_arc {
            let t = j as f64 / points_per_arc as f64;
            push(&view, if segment.forward { t } else { 1.0 - t });
        }
    }
    if chamber.open {
        if let Some(segment) = chamber.boundary.last() {
            let view = ArcView::read(&topology.arcs[segment.arc], x);
            push(&view, if segment.forward { 1.0 } else { 0.0 });
        }
    }
    boundary
}

/// Unsigned shoelace area of a sampled boundary and its gradient over the whole state.
pub fn polygon_area_with_gradient(
    boundary: &SampledBoundary,
    dimension: usize,
) -> (f64, DVector<f64>) {
    let n = boundary.points.len();
    let mut twice_signed = 0.0;
    let mut gradient = DVector::zeros(dimension);
    for i in 0..n {
        let j = (i + 1) % n;
        let p = boundary.points[i];
        let q = boundary.points[j];
        twice_signed += p.x * q.y - p.y * q.x;
        for partial in &boundary.partials[i] {
            gradient[partial.var] += partial.dx * q.y - partial.dy * q.x;
        }
        for partial in &boundary.partials[j] {
            gradient[partial.var] += partial.dy * p.x - partial.dx * p.y;
        }
    }
    let scale = if twice_signed >= 0.0 { 0.5 } else { -0.5 };
    gradient *= scale;
    ((twice_signed / 2.0).abs(), gradient)
}
