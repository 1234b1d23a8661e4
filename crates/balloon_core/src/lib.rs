//! Static equilibrium of a stack of pressurized membrane balloons.
//!
//! The stack hangs between two fixed anchors. Every membrane is a circular arc, every level is
//! a chamber bounded by arcs, and the bottom chamber closes at a pole on the vertical axis. The
//! solver finds arc radii, sweeps and centers (plus chamber pressures) such that:
//! - each membrane keeps its reference length,
//! - neighbouring arcs meet at their joints,
//! - membrane tensions `Δp·r` balance at every joint and at the pole,
//! - chamber pressures follow the chosen [`PressureLaw`].
//!
//! Key components:
//! - **Parameters**: [`UserParameters`] and [`SolverSettings`], both serde-friendly.
//! - **Topology**: the arc graph and unknown layout for any number of levels.
//! - **Systems**: [`equations::IsobaricSystem`] and [`adiabatic::AdiabaticSystem`], both
//!   implementing [`EquationSystem`] with analytic Jacobians.
//! - **Driver**: [`equilibrium::NewtonDriver`], a steppable damped Newton iteration.
//! - **Worker**: [`worker::SolveWorker`], a background thread that coalesces requests.

pub mod adiabatic;
pub mod arc;
pub mod area;
pub mod bootstrap;
pub mod diagnostics;
pub mod equations;
pub mod equilibrium;
pub mod error;
pub mod geometry;
pub mod parameters;
pub mod result;
pub mod solve;
pub mod topology;
pub mod traits;
pub mod worker;

pub use equilibrium::{NewtonSettings, SolveStatus};
pub use error::{SolveError, SolveResult};
pub use parameters::{
    BottomParameters, LevelParameters, PressureLaw, SolverSettings, UserParameters,
};
pub use result::{ArcShape, ChamberShape, EquilibriumShape, JointPosition};
pub use solve::{prepare, solve_adiabatic, solve_isobaric, solve_with};
pub use traits::EquationSystem;
