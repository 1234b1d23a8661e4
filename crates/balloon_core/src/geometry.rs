//! Plane geometry helpers used to bootstrap and measure the membrane stack.
//!
//! All angles follow the stack's clockwise convention: an angle `a` around a center `c`
//! designates the point `c + r·(-cos a, sin a)`, so `0` points along negative x and the
//! angle grows clockwise.

use nalgebra::Vector2;
use std::f64::consts::TAU;

/// Center of the circle of radius `r` passing through `p1` and `p2`.
///
/// Of the two candidate centers, the one on the side selected by the sign of the half-chord's
/// x-component is returned (its y-component breaks the tie for a vertical chord). For the
/// stack's layout (anchors and joints ordered right to left along each level) this is the
/// center below the chord. Swapping the arguments flips the half-chord and the tie-break
/// together, so the result does not depend on argument order.
///
/// Returns `None` when the points coincide, when `r` is shorter than half the chord, or when
/// any input is not finite.
pub fn circle_center(p1: &Vector2<f64>, p2: &Vector2<f64>, r: f64) -> Option<Vector2<f64>> {
    if !(r.is_finite() && p1.iter().chain(p2.iter()).all(|v| v.is_finite())) {
        return None;
    }
    let half = (p1 - p2) / 2.0;
    let half_len = half.norm();
    if half_len == 0.0 || r < half_len {
        return None;
    }
    let positive = half.x > 0.0 || (half.x == 0.0 && half.y > 0.0);
    let perp = if positive {
        Vector2::new(half.y, -half.x)
    } else {
        Vector2::new(-half.y, half.x)
    };
    let offset = (r * r - half_len * half_len).sqrt();
    Some(p2 + half + perp * (offset / half_len))
}

/// Angle in `[0, 2π)` swept clockwise from `a` to `b`.
pub fn clockwise_angle(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    let dot = a.dot(b);
    let det = a.perp(b);
    let angle = -det.atan2(dot);
    if angle < 0.0 {
        angle + TAU
    } else {
        angle
    }
}

/// Unsigned area of the triangle spanned by two vectors sharing an origin.
pub fn triangle_area(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    0.5 * a.perp(b).abs()
}

/// Area of the circular sector with opening `angle` and radius `r`.
pub fn circular_segment_area(angle: f64, r: f64) -> f64 {
    angle / 2.0 * r * r
}

/// Area between an arc of opening `angle` and its chord.
///
/// Equals the sector area minus the signed triangle `½r² sin(angle)`, which keeps the result
/// correct for openings beyond π.
pub fn circular_cap_area(angle: f64, r: f64) -> f64 {
    circular_segment_area(angle, r) - 0.5 * r * r * angle.sin()
}

/// Point at `angle` on the circle of the given radius around `center`.
pub fn point_from_polar(angle: f64, radius: f64, center: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(-angle.cos(), angle.sin()) * radius + center
}

/// Wraps an angle into `[0, 2π)`, negative inputs included.
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Sum of two angles wrapped into `[0, 2π)`.
pub fn add_angles(a: f64, b: f64) -> f64 {
    normalize_angle(a + b)
}

/// Signed shoelace area of a closed polygon (counter-clockwise positive).
pub fn signed_polygon_area(points: &[Vector2<f64>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        twice += p.perp(&q);
    }
    twice / 2.0
}
