use anyhow::Result;
use nalgebra::{DMatrix, DVector};

/// A square nonlinear system `F(x) = 0` with an analytic Jacobian.
///
/// Implementors only describe the equations; the Newton driver owns the iteration state.
pub trait EquationSystem {
    /// Number of unknowns, which is also the number of equations.
    fn dimension(&self) -> usize;

    /// Evaluate the residual F(x) and write into `out`.
    fn residual(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<()>;

    /// Compute the Jacobian ∂F/∂x at `x`.
    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>>;
}

impl<S: EquationSystem + ?Sized> EquationSystem for &S {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn residual(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<()> {
        (**self).residual(x, out)
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>> {
        (**self).jacobian(x)
    }
}
