//! Uniform one-dimensional real-space grid

extern crate nalgebra as na;

use crate::error::ScfError;
use na::{DMatrix, DVector};
use std::f64::consts::PI;

/// Periodic grid of `points` samples over `[0, length)`
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    points: usize,
    length: f64,
}

impl Grid {
    pub fn new(points: usize, length: f64) -> Result<Self, ScfError> {
        if points < 3 {
            return Err(ScfError::InvalidConfig(format!(
                "grid needs at least 3 points, got {}",
                points
            )));
        }
        if !(length.is_finite() && length > 0.0) {
            return Err(ScfError::InvalidConfig(format!(
                "grid length must be positive, got {}",
                length
            )));
        }
        Ok(Grid { points, length })
    }

    pub fn points(&self) -> usize {
        self.points
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Grid spacing, also the volume element
    pub fn dx(&self) -> f64 {
        self.length / self.points as f64
    }

    pub fn coordinate(&self, i: usize) -> f64 {
        i as f64 * self.dx()
    }

    /// Distance between two positions, folded back into the cell
    pub fn min_image(&self, a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(self.length);
        d.min(self.length - d)
    }

    /// Kinetic operator -½∇² from the periodic three-point stencil
    pub fn kinetic_matrix(&self) -> DMatrix<f64> {
        let n = self.points;
        let h2 = self.dx() * self.dx();
        let mut t = DMatrix::zeros(n, n);
        for i in 0..n {
            t[(i, i)] += 1.0 / h2;
            t[(i, (i + 1) % n)] += -0.5 / h2;
            t[(i, (i + n - 1) % n)] += -0.5 / h2;
        }
        t
    }

    /// Periodic forward-difference gradient
    pub fn gradient(&self, f: &DVector<f64>) -> DVector<f64> {
        let n = self.points;
        let dx = self.dx();
        DVector::from_fn(n, |i, _| (f[(i + 1) % n] - f[i]) / dx)
    }

    /// Orthonormal (Euclidean) set of the lowest grid harmonics:
    /// 1, cos(kx), sin(kx), cos(2kx), ...
    pub fn harmonic_guess(&self, n_bands: usize) -> DMatrix<f64> {
        let n = self.points;
        let c0 = 1.0 / (n as f64).sqrt();
        let c = (2.0 / n as f64).sqrt();
        DMatrix::from_fn(n, n_bands, |i, b| {
            if b == 0 {
                return c0;
            }
            let k = ((b + 1) / 2) as f64;
            let phase = 2.0 * PI * k * i as f64 / n as f64;
            if b % 2 == 1 {
                c * phase.cos()
            } else {
                c * phase.sin()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rejects_degenerate_grid() {
        assert!(Grid::new(2, 1.0).is_err());
        assert!(Grid::new(16, 0.0).is_err());
        assert!(Grid::new(16, 10.0).is_ok());
    }

    #[test]
    fn test_kinetic_matrix_annihilates_constant() {
        let grid = Grid::new(16, 8.0).unwrap();
        let t = grid.kinetic_matrix();
        let ones = DVector::from_element(16, 1.0);
        assert!((&t * ones).amax() < 1e-12);
        assert!(t.clone().transpose() == t);
    }

    #[test]
    fn test_harmonic_guess_is_orthonormal() {
        let grid = Grid::new(32, 10.0).unwrap();
        let psi = grid.harmonic_guess(6);
        let overlap = psi.transpose() * &psi;
        assert!(overlap.is_identity(1e-12));
    }

    #[test]
    fn test_min_image_distance() {
        let grid = Grid::new(10, 10.0).unwrap();
        assert_relative_eq!(grid.min_image(1.0, 9.0), 2.0, epsilon = 1e-12);
        assert_relative_eq!(grid.min_image(3.0, 4.5), 1.5, epsilon = 1e-12);
    }
}
