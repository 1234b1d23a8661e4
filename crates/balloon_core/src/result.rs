//! Presentation-ready view of a state vector.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::arc::ArcView;
use crate::area::exact_chamber_area;
use crate::bootstrap::{Bootstrap, DerivedParameters};
use crate::equilibrium::{EquilibriumOutcome, SolveStatus};
use crate::parameters::PressureLaw;
use crate::topology::Topology;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcShape {
    pub name: String,
    pub level: usize,
    pub sweep: f64,
    pub radius: f64,
    pub center: [f64; 2],
    /// Angle of the start point; the arc runs clockwise from here over `sweep`.
    pub start_angle: f64,
    pub start: [f64; 2],
    pub end: [f64; 2],
}

impl ArcShape {
    /// `n` points from start to end for drawing.
    pub fn sample(&self, n: usize) -> Vec<[f64; 2]> {
        let step = if n > 1 { self.sweep / (n - 1) as f64 } else { 0.0 };
        (0..n)
            .map(|i| {
                let theta = self.start_angle + step * i as f64;
                [
                    self.center[0] - self.radius * theta.cos(),
                    self.center[1] + self.radius * theta.sin(),
                ]
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChamberShape {
    pub name: String,
    pub pressure: f64,
    pub area: f64,
    pub reference_area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointPosition {
    pub label: String,
    pub position: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumShape {
    pub law: PressureLaw,
    pub status: SolveStatus,
    pub iterations: usize,
    pub residual_norm: f64,
    pub arcs: Vec<ArcShape>,
    pub chambers: Vec<ChamberShape>,
    pub joints: Vec<JointPosition>,
    pub state: Vec<f64>,
}

impl EquilibriumShape {
    pub fn is_converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    pub fn arc(&self, name: &str) -> Option<&ArcShape> {
        self.arcs.iter().find(|arc| arc.name == name)
    }

    pub fn chamber(&self, name: &str) -> Option<&ChamberShape> {
        self.chambers.iter().find(|chamber| chamber.name == name)
    }

    pub fn joint(&self, label: &str) -> Option<[f64; 2]> {
        self.joints
            .iter()
            .find(|joint| joint.label == label)
            .map(|joint| joint.position)
    }
}

fn to_array(v: nalgebra::Vector2<f64>) -> [f64; 2] {
    [v.x, v.y]
}

/// Maps a state vector onto named arcs, chambers and joints.
pub fn project_state(
    topology: &Topology,
    derived: &DerivedParameters,
    x: &DVector<f64>,
    law: PressureLaw,
    status: SolveStatus,
    iterations: usize,
    residual_norm: f64,
) -> EquilibriumShape {
    let arcs = topology
        .arcs
        .iter()
        .map(|arc| {
            let view = ArcView::read(arc, x);
            ArcShape {
                name: arc.name.clone(),
                level: arc.level,
                sweep: view.sweep,
                radius: view.radius,
                center: to_array(view.center),
                start_angle: view.start_angle(),
                start: to_array(view.point_at(0.0)),
                end: to_array(view.point_at(1.0)),
            }
        })
        .collect();

    let chambers = topology
        .chambers
        .iter()
        .zip(&derived.reference_areas)
        .map(|(chamber, reference_area)| ChamberShape {
            name: chamber.name.clone(),
            pressure: x[chamber.pressure],
            area: exact_chamber_area(topology, chamber, x),
            reference_area: *reference_area,
        })
        .collect();

    let joints = topology
        .vertices
        .iter()
        .filter_map(|vertex| {
            let end = vertex.ends.first()?;
            let view = ArcView::read(&topology.arcs[end.arc], x);
            Some(JointPosition {
                label: vertex.label.clone(),
                position: to_array(view.point_at(end.end.parameter())),
            })
        })
        .collect();

    EquilibriumShape {
        law,
        status,
        iterations,
        residual_norm,
        arcs,
        chambers,
        joints,
        state: x.iter().copied().collect(),
    }
}

pub fn project_outcome(
    boot: &Bootstrap,
    law: PressureLaw,
    outcome: &EquilibriumOutcome,
) -> EquilibriumShape {
    project_state(
        &boot.topology,
        &boot.derived,
        &outcome.state,
        law,
        outcome.status,
        outcome.iterations,
        outcome.residual_norm,
    )
}

impl Bootstrap {
    /// The initial guess as a shape, for drawing next to the solution.
    ///
    /// The residual norm is NaN: nothing has been evaluated yet.
    pub fn initial_shape(&self) -> EquilibriumShape {
        project_state(
            &self.topology,
            &self.derived,
            &self.initial_state,
            PressureLaw::Isobaric,
            SolveStatus::NotSolved,
            0,
            f64::NAN,
        )
    }
}
