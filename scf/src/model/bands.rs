//! Band minimization at a fixed Hamiltonian
//!
//! A locally optimal block iteration: each step performs Rayleigh–Ritz in
//! span{ψ, Hψ − ψΛ, ψ_prev}, orthonormalized by Householder QR, and keeps
//! the lowest `m` Ritz vectors. The band energy Σ ε_b never increases from one
//! step to the next because the trial space always contains the current bands.

extern crate nalgebra as na;

use crate::scf_impl::BandReport;
use na::{DMatrix, DVector};
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandMinimizerParams {
    pub max_iterations: usize,
    /// Largest residual column norm accepted as converged
    pub tolerance: f64,
}

impl Default for BandMinimizerParams {
    fn default() -> Self {
        BandMinimizerParams {
            max_iterations: 100,
            tolerance: 1e-7,
        }
    }
}

/// Bands of one quantum number
#[derive(Clone, Debug)]
pub struct Bands {
    /// Orthonormal columns, one per band
    pub wavefunctions: DMatrix<f64>,
    pub eigenvalues: DVector<f64>,
}

/// Lowest `m` Ritz pairs of `h` in the span of `basis`
fn rayleigh_ritz(h: &DMatrix<f64>, basis: DMatrix<f64>, m: usize) -> Bands {
    let q = basis.qr().q();
    let hs = q.transpose() * h * &q;
    let hs = (&hs + hs.transpose()) * 0.5;
    let eig = hs.symmetric_eigen();

    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
    order.truncate(m);

    let eigenvalues = DVector::from_iterator(m, order.iter().map(|&i| eig.eigenvalues[i]));
    let vectors = eig.eigenvectors.select_columns(&order);
    Bands {
        wavefunctions: q * vectors,
        eigenvalues,
    }
}

/// Residual R = Hψ − ψΛ and its largest column norm
fn residual(h: &DMatrix<f64>, bands: &Bands) -> (DMatrix<f64>, f64) {
    let mut r = h * &bands.wavefunctions;
    for (b, mut col) in r.column_iter_mut().enumerate() {
        col.axpy(-bands.eigenvalues[b], &bands.wavefunctions.column(b), 1.0);
    }
    let norm = r
        .column_iter()
        .map(|c| c.norm())
        .fold(0.0_f64, f64::max);
    (r, norm)
}

/// Minimizes the lowest `psi0.ncols()` bands of the symmetric matrix `h`.
///
/// Falls back to dense diagonalization when the grid is too small for a
/// three-block trial space.
pub fn minimize_bands(
    h: &DMatrix<f64>,
    psi0: &DMatrix<f64>,
    params: &BandMinimizerParams,
) -> (Bands, BandReport) {
    let n = h.nrows();
    let m = psi0.ncols();

    if m == 0 {
        let bands = Bands {
            wavefunctions: DMatrix::zeros(n, 0),
            eigenvalues: DVector::zeros(0),
        };
        let report = BandReport {
            converged: true,
            iterations: 0,
            residual_norm: 0.0,
        };
        return (bands, report);
    }

    if 3 * m > n {
        let bands = rayleigh_ritz(h, DMatrix::identity(n, n), m);
        let (_, residual_norm) = residual(h, &bands);
        let report = BandReport {
            converged: true,
            iterations: 1,
            residual_norm,
        };
        return (bands, report);
    }

    let mut bands = rayleigh_ritz(h, psi0.clone(), m);
    let mut previous: Option<DMatrix<f64>> = None;

    for iteration in 0..params.max_iterations {
        let (r, residual_norm) = residual(h, &bands);
        trace!(
            "band iteration {:>3}: sum(eps) = {:.12}, |R|max = {:.3e}",
            iteration,
            bands.eigenvalues.sum(),
            residual_norm
        );
        if residual_norm < params.tolerance {
            let report = BandReport {
                converged: true,
                iterations: iteration,
                residual_norm,
            };
            return (bands, report);
        }

        let blocks = if previous.is_some() { 3 } else { 2 };
        let mut basis = DMatrix::zeros(n, blocks * m);
        basis.columns_mut(0, m).copy_from(&bands.wavefunctions);
        basis.columns_mut(m, m).copy_from(&r);
        if let Some(prev) = previous.as_ref() {
            basis.columns_mut(2 * m, m).copy_from(prev);
        }

        let next = rayleigh_ritz(h, basis, m);
        previous = Some(std::mem::replace(&mut bands, next).wavefunctions);
    }

    let (_, residual_norm) = residual(h, &bands);
    let report = BandReport {
        converged: residual_norm < params.tolerance,
        iterations: params.max_iterations,
        residual_norm,
    };
    (bands, report)
}
