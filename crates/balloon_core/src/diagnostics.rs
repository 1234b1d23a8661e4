//! Development aids: finite-difference Jacobians and plain-text dumps of matrices and states.

use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::io::{self, Write};

use crate::traits::EquationSystem;

/// Central-difference Jacobian with per-column steps `relative_step·max(1, |x_j|)`.
pub fn finite_difference_jacobian<S: EquationSystem>(
    system: &S,
    x: &DVector<f64>,
    relative_step: f64,
) -> Result<DMatrix<f64>> {
    let dim = system.dimension();
    if x.len() != dim {
        bail!("State dimension mismatch. Expected {}, got {}.", dim, x.len());
    }
    if !(relative_step > 0.0) {
        bail!("relative_step must be positive.");
    }
    let mut estimate = DMatrix::zeros(dim, dim);
    let mut plus = DVector::zeros(dim);
    let mut minus = DVector::zeros(dim);
    let mut shifted = x.clone();
    for j in 0..dim {
        let h = relative_step * x[j].abs().max(1.0);
        shifted[j] = x[j] + h;
        system.residual(&shifted, &mut plus)?;
        shifted[j] = x[j] - h;
        system.residual(&shifted, &mut minus)?;
        shifted[j] = x[j];
        estimate.set_column(j, &((&plus - &minus) / (2.0 * h)));
    }
    Ok(estimate)
}

#[derive(Debug, Clone, Serialize)]
pub struct JacobianMismatch {
    pub row: usize,
    pub col: usize,
    pub analytic: f64,
    pub estimate: f64,
}

#[derive(Debug, Clone)]
pub struct JacobianCheck {
    pub analytic: DMatrix<f64>,
    pub estimate: DMatrix<f64>,
    /// Largest relative error among the entries compared relatively.
    pub max_relative_error: f64,
    pub mismatches: Vec<JacobianMismatch>,
}

/// Compares the analytic Jacobian against central differences.
///
/// Entries larger than `1e-6` of their row's largest analytic entry must agree within
/// `relative_tolerance`; smaller ones only need a difference estimate below `1e-4` of that
/// row scale, since rows mix unknowns of very different magnitudes (angles and pressures).
pub fn check_jacobian<S: EquationSystem>(
    system: &S,
    x: &DVector<f64>,
    relative_tolerance: f64,
) -> Result<JacobianCheck> {
    let analytic = system.jacobian(x)?;
    let estimate = finite_difference_jacobian(system, x, 1e-6)?;
    let mut max_relative_error: f64 = 0.0;
    let mut mismatches = Vec::new();
    for row in 0..analytic.nrows() {
        let scale = analytic.row(row).amax();
        for col in 0..analytic.ncols() {
            let a = analytic[(row, col)];
            let e = estimate[(row, col)];
            let ok = if a.abs() > 1e-6 * scale {
                let relative = (e - a).abs() / a.abs().max(e.abs());
                max_relative_error = max_relative_error.max(relative);
                relative <= relative_tolerance
            } else {
                e.abs() <= 1e-4 * scale + 1e-9
            };
            if !ok {
                mismatches.push(JacobianMismatch {
                    row,
                    col,
                    analytic: a,
                    estimate: e,
                });
            }
        }
    }
    Ok(JacobianCheck {
        analytic,
        estimate,
        max_relative_error,
        mismatches,
    })
}

/// Writes a matrix one row per line, entries as `%3.3f`.
pub fn write_matrix<W: Write>(writer: &mut W, matrix: &DMatrix<f64>) -> io::Result<()> {
    for row in matrix.row_iter() {
        let line: Vec<String> = row.iter().map(|v| format!("{v:3.3}")).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    Ok(())
}

/// Dumps `analytic − estimate` of a Jacobian check.
pub fn write_jacobian_difference<W: Write>(
    writer: &mut W,
    check: &JacobianCheck,
) -> io::Result<()> {
    write_matrix(writer, &(&check.analytic - &check.estimate))
}

/// Writes a state vector one value per line.
pub fn write_state<W: Write>(writer: &mut W, state: &[f64]) -> io::Result<()> {
    for value in state {
        writeln!(writer, "{value}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// F(x) = (x0² − x1, x0·x1 − 2) with a deliberately wrong ∂F1/∂x1 when `broken`.
    struct Toy {
        broken: bool,
    }

    impl EquationSystem for Toy {
        fn dimension(&self) -> usize {
            2
        }

        fn residual(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<()> {
            out[0] = x[0] * x[0] - x[1];
            out[1] = x[0] * x[1] - 2.0;
            Ok(())
        }

        fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>> {
            let d11 = if self.broken { 2.0 * x[0] } else { x[0] };
            Ok(DMatrix::from_row_slice(2, 2, &[2.0 * x[0], -1.0, x[1], d11]))
        }
    }

    #[test]
    fn check_accepts_a_correct_jacobian() {
        let x = DVector::from_vec(vec![1.5, -0.5]);
        let check = check_jacobian(&Toy { broken: false }, &x, 1e-6).expect("check");
        assert!(check.mismatches.is_empty(), "{:?}", check.mismatches);
        assert!(check.max_relative_error < 1e-6);
    }

    #[test]
    fn check_reports_a_wrong_entry() {
        let x = DVector::from_vec(vec![1.5, -0.5]);
        let check = check_jacobian(&Toy { broken: true }, &x, 0.05).expect("check");
        assert_eq!(check.mismatches.len(), 1);
        assert_eq!((check.mismatches[0].row, check.mismatches[0].col), (1, 1));
    }

    #[test]
    fn dumps_are_plain_text() {
        let x = DVector::from_vec(vec![1.0, 2.0]);
        let check = check_jacobian(&Toy { broken: true }, &x, 0.05).expect("check");
        let mut buffer = Vec::new();
        write_jacobian_difference(&mut buffer, &check).expect("write");
        let text = String::from_utf8(buffer).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].split_whitespace().last(), Some("1.000"));

        let mut buffer = Vec::new();
        write_state(&mut buffer, &[0.5, 20000.0]).expect("write");
        assert_eq!(String::from_utf8(buffer).expect("utf8"), "0.5\n20000\n");
    }

    #[test]
    fn rejects_mismatched_state() {
        let x = DVector::from_vec(vec![1.0]);
        let err = finite_difference_jacobian(&Toy { broken: false }, &x, 1e-6).expect_err("error");
        assert!(format!("{err}").contains("State dimension mismatch"));
    }
}
