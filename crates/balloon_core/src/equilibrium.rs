//! Newton iteration driver with a backtracking line search.
//!
//! The driver is a small state machine so that callers can either run it to completion
//! ([`solve_equilibrium`]) or advance it in batches ([`NewtonDriver::step`]) and report progress
//! in between.

use anyhow::anyhow;
use log::{debug, info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{SolveError, SolveResult};
use crate::traits::EquationSystem;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    /// Fraction of the Newton step tried first.
    pub damping: f64,
    pub tolerance: f64,
    /// Smallest step fraction the line search will try before accepting it anyway.
    pub min_step: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            damping: 1.0,
            tolerance: 1e-7,
            min_step: 1e-4,
        }
    }
}

impl NewtonSettings {
    pub fn validate(&self) -> SolveResult<()> {
        if self.max_steps == 0 {
            return Err(SolveError::configuration("max_steps must be greater than zero."));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(SolveError::configuration("damping must lie in (0, 1]."));
        }
        if !(self.tolerance > 0.0) {
            return Err(SolveError::configuration("tolerance must be positive."));
        }
        if !(self.min_step > 0.0 && self.min_step <= self.damping) {
            return Err(SolveError::configuration(
                "min_step must be positive and no larger than damping.",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverPhase {
    Initialized,
    Iterating,
    Converged,
    MaxIterationsReached,
    NumericalFailure,
}

impl DriverPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DriverPhase::Converged
                | DriverPhase::MaxIterationsReached
                | DriverPhase::NumericalFailure
        )
    }
}

/// How a finished solve ended; both outcomes carry a usable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged,
    MaxIterationsReached,
    /// A shape that never went through the driver, such as the initial guess.
    NotSolved,
}

#[derive(Debug, Clone)]
pub struct EquilibriumOutcome {
    pub state: DVector<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
    pub status: SolveStatus,
}

#[derive(Debug)]
pub struct NewtonDriver<S: EquationSystem> {
    system: S,
    settings: NewtonSettings,
    state: DVector<f64>,
    residual: DVector<f64>,
    residual_norm: f64,
    best_state: DVector<f64>,
    best_norm: f64,
    iterations: usize,
    phase: DriverPhase,
    failure: Option<String>,
}

impl<S: EquationSystem> NewtonDriver<S> {
    pub fn new(
        system: S,
        initial_guess: DVector<f64>,
        settings: NewtonSettings,
    ) -> SolveResult<Self> {
        settings.validate()?;
        let dim = system.dimension();
        if dim == 0 {
            return Err(SolveError::configuration("System has zero dimension."));
        }
        if initial_guess.len() != dim {
            return Err(SolveError::configuration(format!(
                "Initial guess dimension mismatch. Expected {}, got {}.",
                dim,
                initial_guess.len()
            )));
        }

        let mut residual = DVector::zeros(dim);
        let evaluated = system.residual(&initial_guess, &mut residual);
        let failure_of = |message: String| SolveError::NumericalFailure {
            message,
            iterations: 0,
            state: initial_guess.iter().copied().collect(),
        };
        if let Err(err) = evaluated {
            return Err(failure_of(format!("Residual failed: {err}")));
        }
        let residual_norm = residual.norm();
        if !residual_norm.is_finite() {
            return Err(failure_of("Initial residual is not finite.".to_string()));
        }

        Ok(Self {
            system,
            settings,
            best_state: initial_guess.clone(),
            best_norm: residual_norm,
            state: initial_guess,
            residual,
            residual_norm,
            iterations: 0,
            phase: DriverPhase::Initialized,
            failure: None,
        })
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn residual_norm(&self) -> f64 {
        self.residual_norm
    }

    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    pub fn settings(&self) -> &NewtonSettings {
        &self.settings
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    fn failure(&self) -> SolveError {
        SolveError::NumericalFailure {
            message: self
                .failure
                .clone()
                .unwrap_or_else(|| "Newton solver failed.".to_string()),
            iterations: self.iterations,
            state: self.state.iter().copied().collect(),
        }
    }

    fn fail(&mut self, message: String) -> SolveError {
        warn!("Newton iteration {} failed: {}", self.iterations, message);
        self.failure = Some(message);
        self.phase = DriverPhase::NumericalFailure;
        self.failure()
    }

    /// Advances by at most one Newton iteration and returns the resulting phase.
    ///
    /// Terminal phases are sticky: once reached, further calls return them unchanged
    /// (a numerical failure is returned as the same error again).
    pub fn step(&mut self) -> SolveResult<DriverPhase> {
        match self.phase {
            DriverPhase::Converged | DriverPhase::MaxIterationsReached => return Ok(self.phase),
            DriverPhase::NumericalFailure => return Err(self.failure()),
            DriverPhase::Initialized | DriverPhase::Iterating => {}
        }

        if self.residual_norm <= self.settings.tolerance {
            info!(
                "Newton solver converged in {} iterations (‖F(x)‖ = {:e}).",
                self.iterations, self.residual_norm
            );
            self.phase = DriverPhase::Converged;
            return Ok(self.phase);
        }
        if self.iterations >= self.settings.max_steps {
            warn!(
                "Newton solver reached {} iterations without converging (best ‖F(x)‖ = {:e}).",
                self.settings.max_steps, self.best_norm
            );
            self.phase = DriverPhase::MaxIterationsReached;
            return Ok(self.phase);
        }
        self.phase = DriverPhase::Iterating;

        let jacobian = match self.system.jacobian(&self.state) {
            Ok(jacobian) => jacobian,
            Err(err) => return Err(self.fail(format!("Jacobian failed: {err}"))),
        };
        if !jacobian.iter().all(|v| v.is_finite()) {
            return Err(self.fail("Jacobian contains non-finite entries.".to_string()));
        }
        let delta = match jacobian
            .lu()
            .solve(&self.residual)
            .ok_or_else(|| anyhow!("Jacobian is singular."))
        {
            Ok(delta) => delta,
            Err(err) => return Err(self.fail(err.to_string())),
        };
        if !delta.iter().all(|v| v.is_finite()) {
            return Err(self.fail("Newton step is not finite.".to_string()));
        }

        let mut lambda = self.settings.damping;
        let mut candidate_residual = DVector::zeros(self.residual.len());
        let (candidate, candidate_norm) = loop {
            let candidate = &self.state - &delta * lambda;
            if let Err(err) = self.system.residual(&candidate, &mut candidate_residual) {
                return Err(self.fail(format!("Residual failed: {err}")));
            }
            let norm = candidate_residual.norm();
            if norm.is_finite() && norm < (1.0 - 1e-4 * lambda) * self.residual_norm {
                break (candidate, norm);
            }
            if lambda * 0.5 < self.settings.min_step {
                if !norm.is_finite() {
                    return Err(
                        self.fail("Residual is not finite along the Newton step.".to_string())
                    );
                }
                warn!("Line search bottomed out at step fraction {lambda:e}; accepting.");
                break (candidate, norm);
            }
            lambda *= 0.5;
        };

        self.state = candidate;
        self.residual = candidate_residual;
        self.residual_norm = candidate_norm;
        self.iterations += 1;
        debug!(
            "Newton iteration {}: ‖F(x)‖ = {:e}, step fraction {}",
            self.iterations, self.residual_norm, lambda
        );
        if self.residual_norm < self.best_norm {
            self.best_norm = self.residual_norm;
            self.best_state = self.state.clone();
        }
        if self.residual_norm <= self.settings.tolerance {
            info!(
                "Newton solver converged in {} iterations (‖F(x)‖ = {:e}).",
                self.iterations, self.residual_norm
            );
            self.phase = DriverPhase::Converged;
        }
        Ok(self.phase)
    }

    /// Steps until a terminal phase is reached.
    pub fn run(&mut self) -> SolveResult<DriverPhase> {
        loop {
            let phase = self.step()?;
            if phase.is_terminal() {
                return Ok(phase);
            }
        }
    }

    /// Result of a finished run; `None` while iterating or after a failure.
    ///
    /// At the iteration cap the best state seen is reported rather than the last one.
    pub fn outcome(&self) -> Option<EquilibriumOutcome> {
        match self.phase {
            DriverPhase::Converged => Some(EquilibriumOutcome {
                state: self.state.clone(),
                residual_norm: self.residual_norm,
                iterations: self.iterations,
                status: SolveStatus::Converged,
            }),
            DriverPhase::MaxIterationsReached => Some(EquilibriumOutcome {
                state: self.best_state.clone(),
                residual_norm: self.best_norm,
                iterations: self.iterations,
                status: SolveStatus::MaxIterationsReached,
            }),
            _ => None,
        }
    }
}

pub fn solve_equilibrium<S: EquationSystem>(
    system: S,
    initial_guess: DVector<f64>,
    settings: NewtonSettings,
) -> SolveResult<EquilibriumOutcome> {
    let mut driver = NewtonDriver::new(system, initial_guess, settings)?;
    driver.run()?;
    driver
        .outcome()
        .ok_or_else(|| driver.failure())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use nalgebra::DMatrix;

    fn assert_err_contains<T: std::fmt::Debug>(result: SolveResult<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    /// F(x) = x² − c, componentwise.
    #[derive(Debug)]
    struct Squares {
        c: Vec<f64>,
    }

    impl EquationSystem for Squares {
        fn dimension(&self) -> usize {
            self.c.len()
        }

        fn residual(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<()> {
            for i in 0..self.c.len() {
                out[i] = x[i] * x[i] - self.c[i];
            }
            Ok(())
        }

        fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>> {
            Ok(DMatrix::from_diagonal(&x.map(|v| 2.0 * v)))
        }
    }

    #[test]
    fn converges_on_a_smooth_system() {
        let system = Squares { c: vec![2.0, 9.0] };
        let outcome = solve_equilibrium(
            system,
            DVector::from_vec(vec![1.0, 1.0]),
            NewtonSettings::default(),
        )
        .expect("solve");
        assert_eq!(outcome.status, SolveStatus::Converged);
        assert!((outcome.state[0] - 2.0_f64.sqrt()).abs() < 1e-9);
        assert!((outcome.state[1] - 3.0).abs() < 1e-9);
        assert!(outcome.residual_norm <= 1e-7);
    }

    #[test]
    fn already_converged_guess_takes_no_iterations() {
        let system = Squares { c: vec![4.0] };
        let mut driver =
            NewtonDriver::new(system, DVector::from_vec(vec![2.0]), NewtonSettings::default())
                .expect("driver");
        assert_eq!(driver.phase(), DriverPhase::Initialized);
        assert_eq!(driver.step().expect("step"), DriverPhase::Converged);
        assert_eq!(driver.iterations(), 0);
        assert_eq!(driver.step().expect("step"), DriverPhase::Converged);
    }

    #[test]
    fn singular_jacobian_is_a_numerical_failure() {
        let system = Squares { c: vec![-1.0] };
        let result = solve_equilibrium(
            system,
            DVector::from_vec(vec![0.0]),
            NewtonSettings::default(),
        );
        let err = result.expect_err("expected failure");
        assert!(format!("{err}").contains("Jacobian is singular"));
        assert_eq!(err.last_state(), Some(&[0.0][..]));
    }

    #[test]
    fn failure_is_sticky() {
        let system = Squares { c: vec![-1.0] };
        let mut driver =
            NewtonDriver::new(system, DVector::from_vec(vec![0.0]), NewtonSettings::default())
                .expect("driver");
        assert!(driver.step().is_err());
        assert_eq!(driver.phase(), DriverPhase::NumericalFailure);
        assert_err_contains(driver.step(), "Jacobian is singular");
        assert!(driver.outcome().is_none());
    }

    #[test]
    fn iteration_cap_reports_the_best_state() {
        let system = Squares { c: vec![2.0] };
        let settings = NewtonSettings {
            max_steps: 2,
            ..NewtonSettings::default()
        };
        let outcome =
            solve_equilibrium(system, DVector::from_vec(vec![100.0]), settings).expect("solve");
        assert_eq!(outcome.status, SolveStatus::MaxIterationsReached);
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.residual_norm > settings.tolerance);
        let x = outcome.state[0];
        assert!((x * x - 2.0 - outcome.residual_norm).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_settings_and_guesses() {
        let settings = NewtonSettings {
            max_steps: 0,
            ..NewtonSettings::default()
        };
        assert_err_contains(
            NewtonDriver::new(Squares { c: vec![1.0] }, DVector::from_vec(vec![1.0]), settings),
            "max_steps must be greater than zero",
        );
        let settings = NewtonSettings {
            tolerance: 0.0,
            ..NewtonSettings::default()
        };
        assert_err_contains(
            NewtonDriver::new(Squares { c: vec![1.0] }, DVector::from_vec(vec![1.0]), settings),
            "tolerance must be positive",
        );
        assert_err_contains(
            NewtonDriver::new(
                Squares { c: vec![1.0] },
                DVector::from_vec(vec![1.0, 2.0]),
                NewtonSettings::default(),
            ),
            "Initial guess dimension mismatch",
        );
        assert_err_contains(
            NewtonDriver::new(
                Squares { c: vec![1.0] },
                DVector::from_vec(vec![f64::NAN]),
                NewtonSettings::default(),
            ),
            "Initial residual is not finite",
        );
    }
}
