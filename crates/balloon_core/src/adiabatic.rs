//! Adiabatic closure: each chamber's pressure follows its enclosed area.
//!
//! The pressure row of chamber `i` reads `p₀·S₀^k − p·S^k = 0`, where `S` is the area of the
//! chamber boundary sampled at `points_per_arc` points per arc and `S₀` is the exact area of
//! the reference shape.

use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};

use crate::area::{polygon_area_with_gradient, sample_chamber};
use crate::bootstrap::{Bootstrap, DerivedParameters};
use crate::equations::{assemble_membrane, Assembly};
use crate::topology::Topology;
use crate::traits::EquationSystem;

#[derive(Debug, Clone)]
pub struct AdiabaticSystem {
    topology: Topology,
    derived: DerivedParameters,
    exponent: f64,
    points_per_arc: usize,
}

impl AdiabaticSystem {
    pub fn new(
        topology: Topology,
        derived: DerivedParameters,
        points_per_arc: usize,
    ) -> Result<Self> {
        if points_per_arc < 2 {
            bail!("points_per_arc must be at least 2, got {points_per_arc}.");
        }
        let exponent = derived.user.polytropic_exponent;
        Ok(Self {
            topology,
            derived,
            exponent,
            points_per_arc,
        })
    }

    pub fn from_bootstrap(boot: &Bootstrap, points_per_arc: usize) -> Result<Self> {
        Self::new(boot.topology.clone(), boot.derived.clone(), points_per_arc)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Sampled area of every chamber at `x`, top to bottom.
    pub fn chamber_areas(&self, x: &DVector<f64>) -> Vec<f64> {
        self.topology
            .chambers
            .iter()
            .map(|chamber| {
                let boundary = sample_chamber(&self.topology, chamber, x, self.points_per_arc);
                polygon_area_with_gradient(&boundary, self.topology.dimension).0
            })
            .collect()
    }

    fn assemble(&self, x: &DVector<f64>) -> Result<Assembly> {
        let mut asm = assemble_membrane(&self.topology, &self.derived, x)?;
        let k = self.exponent;
        for (index, chamber) in self.topology.chambers.iter().enumerate() {
            let boundary = sample_chamber(&self.topology, chamber, x, self.points_per_arc);
            let (area, gradient) = polygon_area_with_gradient(&boundary, self.topology.dimension);
            let pressure = x[chamber.pressure];
            let reference = self.derived.target_pressures[index]
                * self.derived.reference_areas[index].powf(k);
            let row = asm.push_row(reference - pressure * area.powf(k));
            // ∂/∂x (−p·S^k) = −p·k·S^(k−1)·∂S/∂x
            let scale = -pressure * k * area.powf(k - 1.0);
            for (var, value) in gradient.iter().enumerate() {
                asm.add(row, var, scale * value);
            }
            asm.add(row, chamber.pressure, -area.powf(k));
        }
        Ok(asm)
    }
}

impl EquationSystem for AdiabaticSystem {
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
