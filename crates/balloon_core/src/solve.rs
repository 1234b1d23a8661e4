//! Public entry points: parameters in, named shape out.

use anyhow::Result;
use log::info;
use nalgebra::{DMatrix, DVector};

use crate::adiabatic::AdiabaticSystem;
use crate::bootstrap::{bootstrap, Bootstrap};
use crate::equations::IsobaricSystem;
use crate::equilibrium::{solve_equilibrium, NewtonDriver};
use crate::error::{SolveError, SolveResult};
use crate::parameters::{PressureLaw, SolverSettings, UserParameters};
use crate::result::{project_outcome, EquilibriumShape};
use crate::traits::EquationSystem;

/// Either pressure law behind one type, for callers that pick the law at runtime.
#[derive(Debug, Clone)]
pub enum MembraneSystem {
    Isobaric(IsobaricSystem),
    Adiabatic(AdiabaticSystem),
}

impl MembraneSystem {
    pub fn new(boot: &Bootstrap, law: PressureLaw, settings: &SolverSettings) -> SolveResult<Self> {
        Ok(match law {
            PressureLaw::Isobaric => MembraneSystem::Isobaric(IsobaricSystem::from_bootstrap(boot)),
            PressureLaw::Adiabatic => MembraneSystem::Adiabatic(
                AdiabaticSystem::from_bootstrap(boot, settings.points_per_arc)
                    .map_err(|err| SolveError::configuration(err.to_string()))?,
            ),
        })
    }

    pub fn law(&self) -> PressureLaw {
        match self {
            MembraneSystem::Isobaric(_) => PressureLaw::Isobaric,
            MembraneSystem::Adiabatic(_) => PressureLaw::Adiabatic,
        }
    }
}

impl EquationSystem for MembraneSystem {
    fn dimension(&self) -> usize {
        match self {
            MembraneSystem::Isobaric(system) => system.dimension(),
            MembraneSystem::Adiabatic(system) => system.dimension(),
        }
    }

    fn residual(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<()> {
        match self {
            MembraneSystem::Isobaric(system) => system.residual(x, out),
            MembraneSystem::Adiabatic(system) => system.residual(x, out),
        }
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>> {
        match self {
            MembraneSystem::Isobaric(system) => system.jacobian(x),
            MembraneSystem::Adiabatic(system) => system.jacobian(x),
        }
    }
}

/// Builds the reference shape and a driver positioned at it, without iterating.
pub fn prepare(
    params: &UserParameters,
    law: PressureLaw,
    settings: &SolverSettings,
) -> SolveResult<(Bootstrap, NewtonDriver<MembraneSystem>)> {
    let boot = bootstrap(params)?;
    let system = MembraneSystem::new(&boot, law, settings)?;
    let driver = NewtonDriver::new(system, boot.initial_state.clone(), settings.newton)?;
    Ok((boot, driver))
}

pub fn solve_with(
    params: &UserParameters,
    law: PressureLaw,
    settings: &SolverSettings,
) -> SolveResult<EquilibriumShape> {
    let boot = bootstrap(params)?;
    let system = MembraneSystem::new(&boot, law, settings)?;
    let outcome = solve_equilibrium(system, boot.initial_state.clone(), settings.newton)?;
    info!(
        "{:?} solve of a {}-chamber stack finished as {:?} after {} iterations.",
        law,
        params.chamber_count(),
        outcome.status,
        outcome.iterations
    );
    Ok(project_outcome(&boot, law, &outcome))
}

/// Equilibrium with every chamber held at its target pressure.
pub fn solve_isobaric(params: &UserParameters) -> SolveResult<EquilibriumShape> {
    solve_with(params, PressureLaw::Isobaric, &SolverSettings::default())
}

/// Equilibrium with chamber pressures following `p·S^k = p₀·S₀^k`.
pub fn solve_adiabatic(params: &UserParameters) -> SolveResult<EquilibriumShape> {
    solve_with(params, PressureLaw::Adiabatic, &SolverSettings::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::ArcView;
    use crate::area::{polygon_area_with_gradient, sample_chamber};
    use crate::equilibrium::{NewtonSettings, SolveStatus};

    const EPS: f64 = 1e-6;

    fn assert_closed_and_inextensible(params: &UserParameters, shape: &EquilibriumShape) {
        let boot = bootstrap(params).expect("bootstrap");
        let x = DVector::from_vec(shape.state.clone());
        for group in &boot.topology.length_groups {
            let (length, reference) = group.iter().fold((0.0, 0.0), |(l, r), &arc| {
                let vars = &boot.topology.arcs[arc].vars;
                (l + x[vars.radius] * x[vars.sweep], r + boot.derived.reference_length(arc))
            });
            assert!((length - reference).abs() < EPS, "length group {group:?}");
        }
        for vertex in &boot.topology.vertices {
            let points: Vec<_> = vertex
                .ends
                .iter()
                .map(|end| {
                    ArcView::read(&boot.topology.arcs[end.arc], &x).point_at(end.end.parameter())
                })
                .collect();
            for point in &points[1..] {
                assert!((point - points[0]).norm() < EPS, "vertex {}", vertex.label);
            }
        }
    }

    #[test]
    fn two_level_isobaric_scenario_converges() {
        let params = UserParameters::default();
        let shape = solve_isobaric(&params).expect("solve");
        assert!(shape.is_converged());
        assert!(shape.residual_norm < 1e-7);
        assert!(shape.iterations <= 20);
        for arc in &shape.arcs {
            assert!(arc.radius > 0.0 && arc.radius < 1.0, "{} radius {}", arc.name, arc.radius);
        }
        let expected = [
            ("AD", 0.4862236514008383),
            ("CB", 0.5820076686296207),
            ("DC", 0.7845179177251653),
            ("ED", 0.3153708986200035),
            ("EC", 0.40998216820600464),
        ];
        for (name, radius) in expected {
            let arc = shape.arc(name).expect("arc");
            assert!((arc.radius - radius).abs() < 1e-6, "{name}: {}", arc.radius);
        }
        assert!((shape.chamber("top").expect("top").pressure - 20000.0).abs() < 1e-6);
        assert_closed_and_inextensible(&params, &shape);

        let a = shape.joint("A").expect("A");
        assert!((a[0] - 0.482).abs() < EPS && (a[1] - 1.4).abs() < EPS);
    }

    #[test]
    fn three_level_isobaric_scenario_converges() {
        let params = UserParameters::three_level();
        let shape = solve_isobaric(&params).expect("solve");
        assert!(shape.is_converged());
        assert_eq!(shape.state.len(), 40);
        assert_eq!(shape.arcs.len(), 8);
        assert_eq!(shape.chambers.len(), 3);
        assert!((shape.arc("FE").expect("FE").radius - 0.6344626010513225).abs() < 1e-6);
        assert!((shape.arc("GE").expect("GE").radius - 0.2532269209910691).abs() < 1e-6);
        assert_closed_and_inextensible(&params, &shape);
    }

    #[test]
    fn solving_twice_gives_identical_results() {
        let params = UserParameters::default();
        let first = solve_isobaric(&params).expect("solve");
        let second = solve_isobaric(&params).expect("solve");
        assert_eq!(first.state, second.state);
        assert_eq!(first.iterations, second.iterations);
    }

    #[test]
    fn zero_exponent_reproduces_the_isobaric_solution() {
        let mut params = UserParameters::default();
        params.polytropic_exponent = 0.0;
        let isobaric = solve_isobaric(&params).expect("isobaric");
        let adiabatic = solve_adiabatic(&params).expect("adiabatic");
        assert!(adiabatic.is_converged());
        for (a, b) in isobaric.state.iter().zip(&adiabatic.state) {
            assert!((a - b).abs() < 1e-9 * b.abs().max(1.0));
        }
    }

    #[test]
    fn unit_exponent_conserves_pressure_times_area() {
        for params in [UserParameters::default(), UserParameters::three_level()] {
            let settings = SolverSettings::default();
            let shape = solve_with(&params, PressureLaw::Adiabatic, &settings).expect("adiabatic");
            assert!(shape.is_converged());
            assert_closed_and_inextensible(&params, &shape);

            let boot = bootstrap(&params).expect("bootstrap");
            let x = DVector::from_vec(shape.state.clone());
            for (index, chamber) in boot.topology.chambers.iter().enumerate() {
                let sampled = sample_chamber(&boot.topology, chamber, &x, settings.points_per_arc);
                let (area, _) = polygon_area_with_gradient(&sampled, boot.topology.dimension);
                let conserved =
                    boot.derived.target_pressures[index] * boot.derived.reference_areas[index];
                let pressure = x[chamber.pressure];
                assert!((pressure * area - conserved).abs() < EPS);
                // The sampled area sits slightly below the exact one, so pressures only
                // approximate their targets.
                let target = boot.derived.target_pressures[index];
                assert!(((pressure - target) / target).abs() < 0.05, "{}", chamber.name);
            }

            let isobaric = solve_isobaric(&params).expect("isobaric");
            for (adiabatic_arc, isobaric_arc) in shape.arcs.iter().zip(&isobaric.arcs) {
                assert!((adiabatic_arc.radius - isobaric_arc.radius).abs() < 0.05);
            }
        }
    }

    #[test]
    fn polytropic_exponent_is_conserved_at_convergence() {
        for mut params in [UserParameters::default(), UserParameters::three_level()] {
            params.polytropic_exponent = 1.4;
            let settings = SolverSettings::default();
            let shape = solve_with(&params, PressureLaw::Adiabatic, &settings).expect("adiabatic");
            assert!(shape.is_converged());
            assert!(shape.iterations <= 20);
            assert_closed_and_inextensible(&params, &shape);

            let boot = bootstrap(&params).expect("bootstrap");
            let x = DVector::from_vec(shape.state.clone());
            for (index, chamber) in boot.topology.chambers.iter().enumerate() {
                let sampled = sample_chamber(&boot.topology, chamber, &x, settings.points_per_arc);
                let (area, _) = polygon_area_with_gradient(&sampled, boot.topology.dimension);
                let conserved = boot.derived.target_pressures[index]
                    * boot.derived.reference_areas[index].powf(1.4);
                let current = x[chamber.pressure] * area.powf(1.4);
                assert!((current - conserved).abs() < EPS, "{}", chamber.name);
            }
        }
    }

    #[test]
    fn iteration_cap_returns_a_usable_shape() {
        let settings = SolverSettings {
            newton: NewtonSettings {
                max_steps: 2,
                ..NewtonSettings::default()
            },
            ..SolverSettings::default()
        };
        let shape = solve_with(&UserParameters::default(), PressureLaw::Isobaric, &settings)
            .expect("capped solve");
        assert_eq!(shape.status, SolveStatus::MaxIterationsReached);
        assert_eq!(shape.iterations, 2);
        assert!(shape.residual_norm > 1e-7);
        assert_eq!(shape.arcs.len(), 5);
    }

    #[test]
    fn infeasible_geometry_is_a_configuration_error() {
        let mut params = UserParameters::default();
        params.levels[0].radius = 0.2;
        let err = solve_isobaric(&params).expect_err("expected error");
        assert!(matches!(err, SolveError::Configuration(_)), "{err}");
        assert!(err.last_state().is_none());
    }

    #[test]
    fn adiabatic_rejects_coarse_sampling() {
        let settings = SolverSettings {
            points_per_arc: 1,
            ..SolverSettings::default()
        };
        let err = solve_with(&UserParameters::default(), PressureLaw::Adiabatic, &settings)
            .expect_err("expected error");
        assert!(format!("{err}").contains("points_per_arc"));
    }

    #[test]
    fn prepared_driver_can_be_stepped() {
        let (boot, mut driver) = prepare(
            &UserParameters::default(),
            PressureLaw::Isobaric,
            &SolverSettings::default(),
        )
        .expect("prepare");
        assert_eq!(driver.system().law(), PressureLaw::Isobaric);
        let start = driver.residual_norm();
        driver.step().expect("step");
        assert!(driver.residual_norm() < start);
        driver.run().expect("run");
        let outcome = driver.outcome().expect("outcome");
        let shape = project_outcome(&boot, PressureLaw::Isobaric, &outcome);
        assert!(shape.is_converged());
    }
}
