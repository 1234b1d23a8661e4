//! User-facing inputs of a solve and the solver's tuning knobs.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::equilibrium::NewtonSettings;
use crate::error::{SolveError, SolveResult};

/// A level hung from the joints (or anchors) above it.
///
/// The first and middle sweeps are chosen by the user; the last sweep follows from closing the
/// level onto its right-hand entry point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelParameters {
    pub radius: f64,
    pub pressure: f64,
    pub first_sweep: f64,
    pub middle_sweep: f64,
}

/// The lowest level, closed by two arcs meeting at the pole.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BottomParameters {
    pub radius: f64,
    pub pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserParameters {
    pub anchor_a: [f64; 2],
    pub anchor_b: [f64; 2],
    /// Levels above the bottom one, top first.
    pub levels: Vec<LevelParameters>,
    pub bottom: BottomParameters,
    /// Pressure acting on the right-hand outer membranes.
    pub contact_pressure: f64,
    /// Pressure acting on the left-hand outer membranes (gauge zero by default).
    #[serde(default)]
    pub ambient_pressure: f64,
    /// Exponent `k` of the adiabatic law `p·S^k = p₀·S₀^k`.
    #[serde(default = "default_polytropic_exponent")]
    pub polytropic_exponent: f64,
}

fn default_polytropic_exponent() -> f64 {
    1.0
}

impl Default for UserParameters {
    /// Two-level stack used as the reference configuration.
    fn default() -> Self {
        Self {
            anchor_a: [0.482, 1.4],
            anchor_b: [0.28, 0.85],
            levels: vec![LevelParameters {
                radius: 0.5,
                pressure: 20000.0,
                first_sweep: 3.129,
                middle_sweep: 1.162,
            }],
            bottom: BottomParameters {
                radius: 0.35,
                pressure: 6500.0,
            },
            contact_pressure: 1500.0,
            ambient_pressure: 0.0,
            polytropic_exponent: default_polytropic_exponent(),
        }
    }
}

impl UserParameters {
    /// Three-level stack: the reference configuration with an extra level inserted.
    pub fn three_level() -> Self {
        Self {
            levels: vec![
                LevelParameters {
                    radius: 0.5,
                    pressure: 20000.0,
                    first_sweep: 3.129,
                    middle_sweep: 1.162,
                },
                LevelParameters {
                    radius: 0.35,
                    pressure: 6500.0,
                    first_sweep: 1.8,
                    middle_sweep: 1.0,
                },
            ],
            bottom: BottomParameters {
                radius: 0.2,
                pressure: 3000.0,
            },
            contact_pressure: 1000.0,
            ..Self::default()
        }
    }

    pub fn chamber_count(&self) -> usize {
        self.levels.len() + 1
    }

    /// Target pressure of each chamber, top to bottom.
    pub fn target_pressures(&self) -> Vec<f64> {
        self.levels
            .iter()
            .map(|level| level.pressure)
            .chain(std::iter::once(self.bottom.pressure))
            .collect()
    }

    pub fn validate(&self) -> SolveResult<()> {
        if self.levels.is_empty() {
            return Err(SolveError::configuration(
                "At least one level above the bottom one is required.",
            ));
        }
        if !self
            .anchor_a
            .iter()
            .chain(self.anchor_b.iter())
            .all(|v| v.is_finite())
        {
            return Err(SolveError::configuration("Anchor coordinates must be finite."));
        }
        for (index, level) in self.levels.iter().enumerate() {
            check_radius(level.radius, &format!("level {index}"))?;
            check_pressure(level.pressure, &format!("level {index}"))?;
            check_sweep(level.first_sweep, &format!("level {index} first"))?;
            check_sweep(level.middle_sweep, &format!("level {index} middle"))?;
        }
        check_radius(self.bottom.radius, "bottom level")?;
        check_pressure(self.bottom.pressure, "bottom level")?;
        check_pressure(self.contact_pressure, "contact")?;
        check_pressure(self.ambient_pressure, "ambient")?;
        if !(self.polytropic_exponent.is_finite() && self.polytropic_exponent >= 0.0) {
            return Err(SolveError::configuration(format!(
                "polytropic_exponent must be finite and non-negative, got {}.",
                self.polytropic_exponent
            )));
        }
        Ok(())
    }
}

fn check_radius(radius: f64, what: &str) -> SolveResult<()> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(SolveError::configuration(format!(
            "The {what} radius must be positive, got {radius}."
        )))
    }
}

fn check_pressure(pressure: f64, what: &str) -> SolveResult<()> {
    if pressure.is_finite() {
        Ok(())
    } else {
        Err(SolveError::configuration(format!(
            "The {what} pressure must be finite."
        )))
    }
}

fn check_sweep(sweep: f64, what: &str) -> SolveResult<()> {
    if sweep.is_finite() && sweep > 0.0 && sweep < TAU {
        Ok(())
    } else {
        Err(SolveError::configuration(format!(
            "The {what} sweep must lie in (0, 2π), got {sweep}."
        )))
    }
}

/// Which pressure law closes the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureLaw {
    /// Every chamber holds its target pressure.
    Isobaric,
    /// Chamber pressure follows the enclosed area through `p·S^k = p₀·S₀^k`.
    Adiabatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    pub newton: NewtonSettings,
    /// Samples per bounding arc when measuring chamber areas in adiabatic mode.
    pub points_per_arc: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            newton: NewtonSettings::default(),
            points_per_arc: 32,
        }
    }
}
