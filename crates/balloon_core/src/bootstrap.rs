//! Turns user parameters into derived reference quantities and an initial state vector.
//!
//! The stack is walked top down. Each level's circle passes through the two points it hangs
//! from (the anchors for the top level, the joints of the level above otherwise); the user's
//! first and middle sweeps locate the level's own joints on that circle, and the last sweep
//! closes the level. The bottom circle is hung from the lowest joints and split at its pole.

use log::debug;
use nalgebra::{DVector, Vector2};

use crate::area::exact_chamber_area;
use crate::geometry::{
    add_angles, circle_center, circular_segment_area, clockwise_angle, point_from_polar,
    triangle_area,
};
use crate::error::{SolveError, SolveResult};
use crate::parameters::UserParameters;
use crate::topology::{Anchor, Topology};

/// Reference quantities shared by every evaluation of one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedParameters {
    pub user: UserParameters,
    /// Unstretched sweep of each arc.
    pub reference_sweeps: Vec<f64>,
    /// Unstretched radius of each arc.
    pub reference_radii: Vec<f64>,
    /// Chamber areas of the reference shape, top to bottom, bounded by the actual arcs.
    pub reference_areas: Vec<f64>,
    /// Chamber areas with every interior membrane replaced by its chord, summed from center
    /// triangles and circular sectors of each level's own circle.
    ///
    /// An interior arc's cap moves from the chamber above it to the one below, so the total
    /// matches `reference_areas` while individual chambers do not.
    pub chord_areas: Vec<f64>,
    pub target_pressures: Vec<f64>,
}

impl DerivedParameters {
    /// Unstretched length `r₀·φ₀` of an arc.
    pub fn reference_length(&self, arc: usize) -> f64 {
        self.reference_radii[arc] * self.reference_sweeps[arc]
    }

    pub fn anchor(&self, anchor: Anchor) -> Vector2<f64> {
        let [x, y] = match anchor {
            Anchor::A => self.user.anchor_a,
            Anchor::B => self.user.anchor_b,
        };
        Vector2::new(x, y)
    }
}

/// Everything a solve needs before the first Newton step.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub topology: Topology,
    pub derived: DerivedParameters,
    pub initial_state: DVector<f64>,
}

struct LevelCircle {
    center: Vector2<f64>,
    radius: f64,
    left: Vector2<f64>,
    right: Vector2<f64>,
}

fn hang_circle(
    right: &Vector2<f64>,
    left: &Vector2<f64>,
    radius: f64,
    what: &str,
) -> SolveResult<Vector2<f64>> {
    circle_center(right, left, radius).ok_or_else(|| {
        SolveError::Configuration(format!(
            "Cannot hang the {what} circle of radius {radius} between ({:.4}, {:.4}) and \
             ({:.4}, {:.4}): the radius must be at least half their distance ({:.4}).",
            right.x,
            right.y,
            left.x,
            left.y,
            (right - left).norm() / 2.0
        ))
    })
}

pub fn bootstrap(params: &UserParameters) -> SolveResult<Bootstrap> {
    params.validate()?;
    let topology = Topology::stacked(params.chamber_count())?;
    let arc_count = topology.arcs.len();
    let mut x = DVector::zeros(topology.dimension);
    let mut reference_sweeps = vec![0.0; arc_count];
    let mut reference_radii = vec![0.0; arc_count];
    let mut chord_areas = Vec::with_capacity(topology.chambers.len());

    let mut write_arc = |x: &mut DVector<f64>,
                         arc: usize,
                         sweep: f64,
                         circle: &LevelCircle,
                         alpha: f64| {
        let vars = &topology.arcs[arc].vars;
        x[vars.sweep] = sweep;
        x[vars.radius] = circle.radius;
        x[vars.center_x] = circle.center.x;
        x[vars.center_y] = circle.center.y;
        if let Some(index) = vars.start_angle {
            x[index] = alpha;
        }
        reference_sweeps[arc] = sweep;
        reference_radii[arc] = circle.radius;
    };

    let negative_x = Vector2::new(-1.0, 0.0);
    let mut entry_left = Vector2::new(params.anchor_a[0], params.anchor_a[1]);
    let mut entry_right = Vector2::new(params.anchor_b[0], params.anchor_b[1]);
    for (index, (level, arcs)) in params.levels.iter().zip(&topology.levels).enumerate() {
        let what = if index == 0 {
            "top level".to_string()
        } else {
            format!("level {index}")
        };
        let center = hang_circle(&entry_right, &entry_left, level.radius, &what)?;
        let first_alpha = clockwise_angle(&negative_x, &(entry_left - center));
        let middle_alpha = add_angles(first_alpha, level.first_sweep);
        let last_alpha = add_angles(middle_alpha, level.middle_sweep);
        let circle = LevelCircle {
            center,
            radius: level.radius,
            left: point_from_polar(middle_alpha, level.radius, &center),
            right: point_from_polar(last_alpha, level.radius, &center),
        };
        let last_sweep = clockwise_angle(&(circle.right - center), &(entry_right - center));
        chord_areas.push(
            circular_segment_area(level.first_sweep, level.radius)
                + circular_segment_area(last_sweep, level.radius)
                + triangle_area(&(circle.left - center), &(circle.right - center))
                + triangle_area(&(entry_left - center), &(entry_right - center)),
        );
        debug!(
            "{what}: center ({:.6}, {:.6}), start angles {:.6} {:.6} {:.6}, closing sweep {:.6}",
            center.x, center.y, first_alpha, middle_alpha, last_alpha, last_sweep
        );

        write_arc(&mut x, arcs.first, level.first_sweep, &circle, first_alpha);
        write_arc(&mut x, arcs.middle, level.middle_sweep, &circle, middle_alpha);
        write_arc(&mut x, arcs.last, last_sweep, &circle, last_alpha);
        entry_left = circle.left;
        entry_right = circle.right;
    }

    let radius = params.bottom.radius;
    let center = hang_circle(&entry_right, &entry_left, radius, "bottom level")?;
    let pole = center - Vector2::new(0.0, radius);
    let left_sweep = clockwise_angle(&(entry_left - center), &(pole - center));
    let right_sweep = clockwise_angle(&(pole - center), &(entry_right - center));
    chord_areas.push(
        circular_segment_area(add_angles(left_sweep, right_sweep), radius)
            + triangle_area(&(entry_right - center), &(entry_left - center)),
    );
    let bottom = LevelCircle {
        center,
        radius,
        left: entry_left,
        right: entry_right,
    };
    write_arc(&mut x, topology.bottom.left, left_sweep, &bottom, 0.0);
    write_arc(&mut x, topology.bottom.right, right_sweep, &bottom, 0.0);
    x[topology.bottom_offset] = center.x;

    let target_pressures = params.target_pressures();
    for (chamber, pressure) in topology.chambers.iter().zip(&target_pressures) {
        x[chamber.pressure] = *pressure;
    }

    if !x.iter().all(|v| v.is_finite()) {
        return Err(SolveError::configuration(
            "The initial shape contains non-finite values.",
        ));
    }

    let reference_areas: Vec<f64> = topology
        .chambers
        .iter()
        .map(|chamber| exact_chamber_area(&topology, chamber, &x))
        .collect();
    debug!("Reference areas {reference_areas:?}, chord-closed areas {chord_areas:?}");

    let derived = DerivedParameters {
        user: params.clone(),
        reference_sweeps,
        reference_radii,
        reference_areas,
        chord_areas,
        target_pressures,
    };

    Ok(Bootstrap {
        topology,
        derived,
        initial_state: x,
    })
}
