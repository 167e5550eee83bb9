//! Soft-Coulomb interaction kernels on the model grid

extern crate nalgebra as na;

use super::grid::Grid;
use crate::error::ScfError;
use na::{DMatrix, DVector};
use std::str::FromStr;

/// How distances are measured between grid points
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoulombBoundary {
    /// Nearest periodic image
    Periodic,
    /// Isolated cell: no images, plain |x − x'|
    Truncated,
}

impl FromStr for CoulombBoundary {
    type Err = ScfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "periodic" => Ok(Self::Periodic),
            "truncated" | "isolated" => Ok(Self::Truncated),
            _ => Err(ScfError::InvalidConfig(format!(
                "unknown coulomb boundary `{}` (expected `periodic` or `truncated`)",
                s
            ))),
        }
    }
}

/// 1 / √(d² + a²)
#[inline]
pub fn soft_coulomb(d: f64, softening: f64) -> f64 {
    1.0 / (d * d + softening * softening).sqrt()
}

pub fn distance(grid: &Grid, boundary: CoulombBoundary, a: f64, b: f64) -> f64 {
    match boundary {
        CoulombBoundary::Periodic => grid.min_image(a, b),
        CoulombBoundary::Truncated => (a - b).abs(),
    }
}

/// Precomputed electron-electron kernel w_ij = soft_coulomb(d_ij)
#[derive(Clone, Debug)]
pub struct CoulombKernel {
    kernel: DMatrix<f64>,
    dx: f64,
    softening: f64,
    boundary: CoulombBoundary,
}

impl CoulombKernel {
    pub fn new(grid: &Grid, softening: f64, boundary: CoulombBoundary) -> Self {
        let n = grid.points();
        let kernel = DMatrix::from_fn(n, n, |i, j| {
            let d = distance(grid, boundary, grid.coordinate(i), grid.coordinate(j));
            soft_coulomb(d, softening)
        });
        CoulombKernel {
            kernel,
            dx: grid.dx(),
            softening,
            boundary,
        }
    }

    pub fn softening(&self) -> f64 {
        self.softening
    }

    pub fn boundary(&self) -> CoulombBoundary {
        self.boundary
    }

    /// V_H(x) = ∫ w(x − x') n(x') dx'
    pub fn hartree_potential(&self, n_total: &DVector<f64>) -> DVector<f64> {
        &self.kernel * n_total * self.dx
    }

    /// E_H = ½ ∫ n V_H
    pub fn hartree_energy(&self, n_total: &DVector<f64>, v_hartree: &DVector<f64>) -> f64 {
        0.5 * n_total.dot(v_hartree) * self.dx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kernel_is_symmetric_and_peaked() {
        let grid = Grid::new(12, 6.0).unwrap();
        let k = CoulombKernel::new(&grid, 1.0, CoulombBoundary::Periodic);
        assert_eq!(k.kernel.clone().transpose(), k.kernel);
        assert_relative_eq!(k.kernel[(3, 3)], 1.0);
        assert!(k.kernel[(0, 1)] > k.kernel[(0, 6)]);
        // periodic images: first and last point are neighbours
        assert_relative_eq!(k.kernel[(0, 11)], k.kernel[(0, 1)]);
    }

    #[test]
    fn test_truncated_has_no_images() {
        let grid = Grid::new(12, 6.0).unwrap();
        let k = CoulombKernel::new(&grid, 1.0, CoulombBoundary::Truncated);
        assert!(k.kernel[(0, 11)] < k.kernel[(0, 1)]);
    }

    #[test]
    fn test_hartree_energy_positive() {
        let grid = Grid::new(16, 8.0).unwrap();
        let k = CoulombKernel::new(&grid, 1.0, CoulombBoundary::Periodic);
        let n = DVector::from_element(16, 0.25);
        let v = k.hartree_potential(&n);
        assert!(k.hartree_energy(&n, &v) > 0.0);
    }
}
