//! Evaluation of a single arc at a state vector: angles, points and their gradients.

use nalgebra::{DVector, Vector2};
use std::f64::consts::FRAC_PI_2;

use crate::topology::{Arc, ArcKind};

/// Angle of the bottom pole: straight below the center.
pub const POLE_ANGLE: f64 = 3.0 * FRAC_PI_2;

/// Derivative of a point coordinate pair with respect to one unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPartial {
    pub var: usize,
    pub dx: f64,
    pub dy: f64,
}

/// An arc's unknowns read out of a state vector.
#[derive(Debug, Clone, Copy)]
pub struct ArcView<'a> {
    pub arc: &'a Arc,
    pub sweep: f64,
    pub radius: f64,
    pub center: Vector2<f64>,
    anchor_angle: f64,
}

impl<'a> ArcView<'a> {
    pub fn read(arc: &'a Arc, x: &DVector<f64>) -> Self {
        let vars = &arc.vars;
        let anchor_angle = match vars.start_angle {
            Some(index) => x[index],
            None => POLE_ANGLE,
        };
        Self {
            arc,
            sweep: x[vars.sweep],
            radius: x[vars.radius],
            center: Vector2::new(x[vars.center_x], x[vars.center_y]),
            anchor_angle,
        }
    }

    /// dθ/dφ at parameter `s`.
    pub fn sweep_factor(&self, s: f64) -> f64 {
        match self.arc.kind {
            ArcKind::PoleEnd => s - 1.0,
            ArcKind::Free | ArcKind::PoleStart => s,
        }
    }

    pub fn angle_at(&self, s: f64) -> f64 {
        self.anchor_angle + self.sweep_factor(s) * self.sweep
    }

    /// Angle of the arc's start point; the arc then runs clockwise over `sweep`.
    pub fn start_angle(&self) -> f64 {
        self.angle_at(0.0)
    }

    pub fn point_at(&self, s: f64) -> Vector2<f64> {
        let theta = self.angle_at(s);
        Vector2::new(
            self.center.x - self.radius * theta.cos(),
            self.center.y + self.radius * theta.sin(),
        )
    }

    /// Direction `(sin θ, cos θ)` of the tension at parameter `s`.
    pub fn tangent_at(&self, s: f64) -> Vector2<f64> {
        let theta = self.angle_at(s);
        Vector2::new(theta.sin(), theta.cos())
    }

    /// Partial derivatives of `point_at(s)` with respect to the arc's unknowns.
    pub fn point_partials(&self, s: f64) -> Vec<PointPartial> {
        let vars = &self.arc.vars;
        let theta = self.angle_at(s);
        let (sin, cos) = theta.sin_cos();
        // d(point)/dθ
        let dx_dtheta = self.radius * sin;
        let dy_dtheta = self.radius * cos;
        let factor = self.sweep_factor(s);

        let mut partials = Vec::with_capacity(5);
        partials.push(PointPartial {
            var: vars.center_x,
            dx: 1.0,
            dy: 0.0,
        });
        partials.push(PointPartial {
            var: vars.center_y,
            dx: 0.0,
            dy: 1.0,
        });
        partials.push(PointPartial {
            var: vars.radius,
            dx: -cos,
            dy: sin,
        });
        partials.push(PointPartial {
            var: vars.sweep,
            dx: dx_dtheta * factor,
            dy: dy_dtheta * factor,
        });
        if let Some(alpha) = vars.start_angle {
            partials.push(PointPartial {
                var: alpha,
                dx: dx_dtheta,
                dy: dy_dtheta,
            });
        }
        partials
    }

    /// `n` points evenly spaced from the start to the end of the arc, both included.
    pub fn sample(&self, n: usize) -> Vec<Vector2<f64>> {
        match n {
            0 => Vec::new(),
            1 => vec![self.point_at(0.0)],
            _ => (0..n)
                .map(|i| self.point_at(i as f64 / (n - 1) as f64))
                .collect(),
        }
    }
}
