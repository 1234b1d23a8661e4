//! Residual and analytic Jacobian of the membrane equations.
//!
//! Rows are generated by walking the arc graph in a fixed order:
//!
//! 1. inextensibility, one row per length group (`Σ r·φ − Σ r₀·φ₀`);
//! 2. continuity, two rows per anchor and per non-reference arc end at a joint, one row
//!    (vertical only) at the pole;
//! 3. steadiness, two rows per joint (`Σ ±T·(sin θ, cos θ)` with `T = Δp·r`) and one scalar
//!    row at the pole (`Σ ±T`);
//! 4. one pressure row per chamber, supplied by the active pressure law.
//!
//! Every family writes its residual value and its Jacobian triplets together, so sign
//! conventions cannot drift apart between the two.

use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::convert::serial::convert_coo_dense;
use nalgebra_sparse::CooMatrix;

use crate::arc::{ArcView, PointPartial};
use crate::bootstrap::{Bootstrap, DerivedParameters};
use crate::topology::{ArcEndRef, PressureDomain, Topology, VertexKind};
use crate::traits::EquationSystem;

/// Residual vector and sparse Jacobian triplets built row by row.
pub(crate) struct Assembly {
    residual: DVector<f64>,
    jacobian: CooMatrix<f64>,
    row: usize,
}

impl Assembly {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            residual: DVector::zeros(dimension),
            jacobian: CooMatrix::new(dimension, dimension),
            row: 0,
        }
    }

    /// Starts the next row with the given residual value and returns its index.
    pub(crate) fn push_row(&mut self, value: f64) -> usize {
        let row = self.row;
        self.residual[row] = value;
        self.row += 1;
        row
    }

    pub(crate) fn add(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.jacobian.push(row, col, value);
        }
    }

    pub(crate) fn rows(&self) -> usize {
        self.row
    }

    pub(crate) fn into_residual(self) -> DVector<f64> {
        self.residual
    }

    /// Densifies the triplets; repeated entries are summed.
    pub(crate) fn into_jacobian(self) -> DMatrix<f64> {
        convert_coo_dense(&self.jacobian)
    }
}

/// Pressure acting on `domain` and the unknown it comes from, if any.
pub(crate) fn domain_pressure(
    topology: &Topology,
    derived: &DerivedParameters,
    x: &DVector<f64>,
    domain: PressureDomain,
) -> (f64, Option<usize>) {
    match domain {
        PressureDomain::Ambient => (derived.user.ambient_pressure, None),
        PressureDomain::Contact => (derived.user.contact_pressure, None),
        PressureDomain::Chamber(index) => {
            let var = topology.chambers[index].pressure;
            (x[var], Some(var))
        }
    }
}

fn end_view<'a>(topology: &'a Topology, x: &DVector<f64>, end: &ArcEndRef) -> (ArcView<'a>, f64) {
    (ArcView::read(&topology.arcs[end.arc], x), end.end.parameter())
}

fn push_inextensibility(
    topology: &Topology,
    derived: &DerivedParameters,
    x: &DVector<f64>,
    asm: &mut Assembly,
) {
    for group in &topology.length_groups {
        let mut value = 0.0;
        for &arc in group {
            let vars = &topology.arcs[arc].vars;
            value += x[vars.radius] * x[vars.sweep] - derived.reference_length(arc);
        }
        let row = asm.push_row(value);
        for &arc in group {
            let vars = &topology.arcs[arc].vars;
            asm.add(row, vars.radius, x[vars.sweep]);
            asm.add(row, vars.sweep, x[vars.radius]);
        }
    }
}

fn add_point_partials(
    asm: &mut Assembly,
    rows: (usize, usize),
    partials: &[PointPartial],
    sign: f64,
) {
    for partial in partials {
        asm.add(rows.0, partial.var, sign * partial.dx);
        asm.add(rows.1, partial.var, sign * partial.dy);
    }
}

fn push_continuity(
    topology: &Topology,
    derived: &DerivedParameters,
    x: &DVector<f64>,
    asm: &mut Assembly,
) {
    for vertex in &topology.vertices {
        let Some(reference) = vertex.ends.first() else {
            continue;
        };
        let (view, s) = end_view(topology, x, reference);
        let point = view.point_at(s);
        let partials = view.point_partials(s);
        match vertex.kind {
            VertexKind::Anchor(anchor) => {
                let target = derived.anchor(anchor);
                let rows = (asm.push_row(point.x - target.x), asm.push_row(point.y - target.y));
                add_point_partials(asm, rows, &partials, 1.0);
            }
            VertexKind::Joint => {
                for other in &vertex.ends[1..] {
                    let (other_view, t) = end_view(topology, x, other);
                    let other_point = other_view.point_at(t);
                    let rows = (
                        asm.push_row(point.x - other_point.x),
                        asm.push_row(point.y - other_point.y),
                    );
                    add_point_partials(asm, rows, &partials, 1.0);
                    add_point_partials(asm, rows, &other_view.point_partials(t), -1.0);
                }
            }
            VertexKind::Pole => {
                // Both pole arcs share center-x and the pole angle, so only heights can differ.
                for other in &vertex.ends[1..] {
                    let (other_view, t) = end_view(topology, x, other);
                    let row = asm.push_row(point.y - other_view.point_at(t).y);
                    for partial in &partials {
                        asm.add(row, partial.var, partial.dy);
                    }
                    for partial in other_view.point_partials(t) {
                        asm.add(row, partial.var, -partial.dy);
                    }
                }
            }
        }
    }
}

fn push_steadiness(
    topology: &Topology,
    derived: &DerivedParameters,
    x: &DVector<f64>,
    asm: &mut Assembly,
) {
    for vertex in &topology.vertices {
        match vertex.kind {
            VertexKind::Anchor(_) => {}
            VertexKind::Joint => {
                let mut value_x = 0.0;
                let mut value_y = 0.0;
                let mut terms = Vec::new();
                for end in &vertex.ends {
                    let (view, s) = end_view(topology, x, end);
                    let sign = end.end.tension_sign();
                    let (inner, inner_var) = domain_pressure(topology, derived, x, view.arc.inner);
                    let (outer, outer_var) = domain_pressure(topology, derived, x, view.arc.outer);
                    let delta = inner - outer;
                    let tension = sign * delta * view.radius;
                    let tangent = view.tangent_at(s);
                    let (sin, cos) = (tangent.x, tangent.y);
                    value_x += tension * sin;
                    value_y += tension * cos;
                    terms.push((view, s, sign, delta, tension, sin, cos, inner_var, outer_var));
                }
                let rows = (asm.push_row(value_x), asm.push_row(value_y));
                for (view, s, sign, delta, tension, sin, cos, inner_var, outer_var) in terms {
                    let vars = &view.arc.vars;
                    asm.add(rows.0, vars.radius, sign * delta * sin);
                    asm.add(rows.1, vars.radius, sign * delta * cos);
                    // d(sin θ)/dθ = cos θ, d(cos θ)/dθ = −sin θ
                    let factor = view.sweep_factor(s);
                    asm.add(rows.0, vars.sweep, tension * cos * factor);
                    asm.add(rows.1, vars.sweep, -tension * sin * factor);
                    if let Some(alpha) = vars.start_angle {
                        asm.add(rows.0, alpha, tension * cos);
                        asm.add(rows.1, alpha, -tension * sin);
                    }
                    let arm = sign * view.radius;
                    if let Some(var) = inner_var {
                        asm.add(rows.0, var, arm * sin);
                        asm.add(rows.1, var, arm * cos);
                    }
                    if let Some(var) = outer_var {
                        asm.add(rows.0, var, -arm * sin);
                        asm.add(rows.1, var, -arm * cos);
                    }
                }
            }
            VertexKind::Pole => {
                let mut value = 0.0;
                let mut terms = Vec::with_capacity(vertex.ends.len());
                for end in &vertex.ends {
                    let arc = &topology.arcs[end.arc];
                    let sign = end.end.tension_sign();
                    let (inner, inner_var) = domain_pressure(topology, derived, x, arc.inner);
                    let (outer, outer_var) = domain_pressure(topology, derived, x, arc.outer);
                    let radius = x[arc.vars.radius];
                    value += sign * (inner - outer) * radius;
                    terms.push((arc, sign, inner - outer, radius, inner_var, outer_var));
                }
                let row = asm.push_row(value);
                for (arc, sign, delta, radius, inner_var, outer_var) in terms {
                    asm.add(row, arc.vars.radius, sign * delta);
                    if let Some(var) = inner_var {
                        asm.add(row, var, sign * radius);
                    }
                    if let Some(var) = outer_var {
                        asm.add(row, var, -sign * radius);
                    }
                }
            }
        }
    }
}

/// Writes every row except the pressure law rows.
pub(crate) fn assemble_membrane(
    topology: &Topology,
    derived: &DerivedParameters,
    x: &DVector<f64>,
) -> Result<Assembly> {
    if x.len() != topology.dimension {
        bail!(
            "State dimension mismatch. Expected {}, got {}.",
            topology.dimension,
            x.len()
        );
    }
    let mut asm = Assembly::new(topology.dimension);
    push_inextensibility(topology, derived, x, &mut asm);
    push_continuity(topology, derived, x, &mut asm);
    push_steadiness(topology, derived, x, &mut asm);
    Ok(asm)
}

/// Membrane equations closed by `p − p_target = 0` for every chamber.
#[derive(Debug, Clone)]
pub struct IsobaricSystem {
    topology: Topology,
    derived: DerivedParameters,
}

impl IsobaricSystem {
    pub fn new(topology: Topology, derived: DerivedParameters) -> Self {
        Self { topology, derived }
    }

    pub fn from_bootstrap(boot: &Bootstrap) -> Self {
        Self::new(boot.topology.clone(), boot.derived.clone())
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn derived(&self) -> &DerivedParameters {
        &self.derived
    }

    fn assemble(&self, x: &DVector<f64>) -> Result<Assembly> {
        let mut asm = assemble_membrane(&self.topology, &self.derived, x)?;
        for (chamber, target) in self.topology.chambers.iter().zip(&self.derived.target_pressures) {
            let row = asm.push_row(x[chamber.pressure] - target);
            asm.add(row, chamber.pressure, 1.0);
        }
        debug_assert_eq!(asm.rows(), self.topology.dimension);
        Ok(asm)
    }
}

impl EquationSystem for IsobaricSystem {
    fn dimension(&self) -> usize {
        self.topology.dimension
    }

    fn residual(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<()> {
        *out = self.assemble(x)?.into_residual();
        Ok(())
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>> {
        Ok(self.assemble(x)?.into_jacobian())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arc::ArcView;
    use crate::bootstrap::bootstrap;
    use crate::diagnostics::check_jacobian;
    use crate::parameters::UserParameters;
    use crate::topology::Vertex;
    use nalgebra::Vector2;

    /// Deterministic off-equilibrium state near `x`.
    pub(crate) fn perturbed(boot: &Bootstrap) -> DVector<f64> {
        let mut x = boot.initial_state.clone();
        for (j, value) in x.iter_mut().enumerate() {
            *value += 0.01 * (3.0 * j as f64 + 1.0).sin();
        }
        for chamber in &boot.topology.chambers {
            x[chamber.pressure] *= 1.0 + 0.05 * (chamber.pressure as f64 + 2.0).sin();
        }
        x
    }

    #[test]
    fn bootstrap_state_only_violates_force_balance() {
        let boot = bootstrap(&UserParameters::default()).expect("bootstrap");
        let system = IsobaricSystem::from_bootstrap(&boot);
        let mut residual = DVector::zeros(system.dimension());
        system
            .residual(&boot.initial_state, &mut residual)
            .expect("residual");

        // Rows 17..22 are the steadiness rows of C, D and the pole.
        for (row, value) in residual.iter().enumerate() {
            if (17..22).contains(&row) {
                continue;
            }
            assert!(value.abs() < 1e-9, "row {row} = {value}");
        }
        let expected = [-3174.98, -77.46, 4127.48, 100.70, -525.0];
        for (offset, want) in expected.iter().enumerate() {
            let got = residual[17 + offset];
            assert!((got - want).abs() < 0.01, "row {}: {got} vs {want}", 17 + offset);
        }
    }

    #[test]
    fn steadiness_rows_match_hand_written_balance() {
        let boot = bootstrap(&UserParameters::default()).expect("bootstrap");
        let system = IsobaricSystem::from_bootstrap(&boot);
        let x = perturbed(&boot);
        let mut residual = DVector::zeros(system.dimension());
        system.residual(&x, &mut residual).expect("residual");

        // Hand-written balance at C and D of the two-level stack.
        let (p_top, p_bot, p_ac) = (x[22], x[23], 1500.0);
        let pole = crate::arc::POLE_ANGLE;
        let at_d_x = -p_top * x[1] * (x[4] + x[0]).sin()
            + (p_top - p_bot) * x[11] * x[14].sin()
            + p_bot * x[16] * (pole - x[15]).sin();
        let at_c_y = (p_top - p_ac) * x[6] * x[9].cos()
            - (p_top - p_bot) * x[11] * (x[14] + x[10]).cos()
            - (p_bot - p_ac) * x[19] * (pole + x[18]).cos();
        let at_pole = (p_bot - p_ac) * x[19] - p_bot * x[16];
        assert!((residual[19] - at_d_x).abs() < 1e-9);
        assert!((residual[18] - at_c_y).abs() < 1e-9);
        assert!((residual[21] - at_pole).abs() < 1e-9);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        for params in [UserParameters::default(), UserParameters::three_level()] {
            let boot = bootstrap(&params).expect("bootstrap");
            let system = IsobaricSystem::from_bootstrap(&boot);
            for x in [boot.initial_state.clone(), perturbed(&boot)] {
                let check = check_jacobian(&system, &x, 0.05).expect("jacobian check");
                assert!(
                    check.mismatches.is_empty(),
                    "{} levels: {:?}",
                    params.chamber_count(),
                    check.mismatches
                );
            }
        }
    }

    /// Signed tension and force vector contributed by each arc end at a vertex.
    fn end_forces(
        system: &IsobaricSystem,
        x: &DVector<f64>,
        vertex: &Vertex,
    ) -> Vec<(usize, f64, Vector2<f64>)> {
        let topology = system.topology();
        vertex
            .ends
            .iter()
            .map(|end| {
                let arc = &topology.arcs[end.arc];
                let view = ArcView::read(arc, x);
                let (inner, _) = domain_pressure(topology, system.derived(), x, arc.inner);
                let (outer, _) = domain_pressure(topology, system.derived(), x, arc.outer);
                let tension = end.end.tension_sign() * (inner - outer) * view.radius;
                (end.arc, tension, view.tangent_at(end.end.parameter()) * tension)
            })
            .collect()
    }

    #[test]
    fn raising_a_chamber_pressure_shifts_the_balance_at_its_joints() {
        let boot = bootstrap(&UserParameters::default()).expect("bootstrap");
        let system = IsobaricSystem::from_bootstrap(&boot);
        let topology = system.topology();
        let bottom = PressureDomain::Chamber(1);
        let before = boot.initial_state.clone();
        let mut after = before.clone();
        after[topology.chambers[1].pressure] += 1000.0;

        let mut residual_before = DVector::zeros(system.dimension());
        let mut residual_after = DVector::zeros(system.dimension());
        system.residual(&before, &mut residual_before).expect("residual");
        system.residual(&after, &mut residual_after).expect("residual");

        let balance_rows: usize = topology
            .vertices
            .iter()
            .map(|vertex| match vertex.kind {
                VertexKind::Anchor(_) => 0,
                VertexKind::Joint => 2,
                VertexKind::Pole => 1,
            })
            .sum();
        let mut row = topology.dimension - topology.chambers.len() - balance_rows;
        let mut checked = 0;
        for vertex in &topology.vertices {
            let width = match vertex.kind {
                VertexKind::Anchor(_) => continue,
                VertexKind::Joint => 2,
                VertexKind::Pole => 1,
            };
            let terms_before = end_forces(&system, &before, vertex);
            let terms_after = end_forces(&system, &after, vertex);
            for (terms, residual) in [
                (&terms_before, &residual_before),
                (&terms_after, &residual_after),
            ] {
                if width == 2 {
                    let total = terms
                        .iter()
                        .fold(Vector2::<f64>::zeros(), |sum, (_, _, force)| sum + force);
                    assert!((total.x - residual[row]).abs() < 1e-9, "{} x", vertex.label);
                    assert!((total.y - residual[row + 1]).abs() < 1e-9, "{} y", vertex.label);
                } else {
                    let total: f64 = terms.iter().map(|(_, tension, _)| tension).sum();
                    assert!((total - residual[row]).abs() < 1e-9, "{}", vertex.label);
                }
            }

            for ((arc, t0, _), (_, t1, _)) in terms_before.iter().zip(&terms_after) {
                let arc = &topology.arcs[*arc];
                let name = &arc.name;
                if arc.inner == bottom {
                    assert!(t1.abs() > t0.abs(), "{} at {}", name, vertex.label);
                    checked += 1;
                } else if arc.outer == bottom {
                    assert!(t1.abs() < t0.abs(), "{} at {}", name, vertex.label);
                    checked += 1;
                } else {
                    assert_eq!(t0, t1, "{} at {}", name, vertex.label);
                }
            }
            if width == 2 {
                let shift = (row..row + width)
                    .map(|r| (residual_after[r] - residual_before[r]).abs())
                    .fold(0.0, f64::max);
                assert!(shift > 1.0, "balance at {} did not move", vertex.label);
            }
            row += width;
        }
        // C, D and the pole each see two of DC, ED and EC; the pole pair cancels in sum.
        assert_eq!(checked, 6);
    }

    #[test]
    fn rejects_state_of_the_wrong_size() {
        let boot = bootstrap(&UserParameters::default()).expect("bootstrap");
        let system = IsobaricSystem::from_bootstrap(&boot);
        let err = system
            .jacobian(&DVector::zeros(3))
            .expect_err("expected error");
        assert!(format!("{err}").contains("State dimension mismatch"));
    }
}
