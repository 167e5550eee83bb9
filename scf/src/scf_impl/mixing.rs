//! Density / potential mixing: plain damping and residual minimization (DIIS)
//!
//! DIIS here follows the overlap-eigenvector formulation: `c` is the
//! eigenvector of the residual overlap matrix B_ij = <r_i|r_j> with the
//! smallest eigenvalue (the unit coefficient vector of least residual norm),
//! rescaled so that Σ c_j = 1. The new variable is Σ_j c_j x_j.

extern crate nalgebra as na;

use super::history::HistoryBuffer;
use crate::error::ScfError;
use crate::field::{FieldSet, MixedVariable};
use na::{DMatrix, DVector};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Smallest |Σ c_j| accepted when normalizing DIIS coefficients
pub const DIIS_NORM_EPS: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MixingMethod {
    Plain,
    Diis,
}

impl FromStr for MixingMethod {
    type Err = ScfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "linear" => Ok(Self::Plain),
            "diis" | "pulay" => Ok(Self::Diis),
            _ => Err(ScfError::UnknownMixingMethod(s.to_string())),
        }
    }
}

impl fmt::Display for MixingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixingMethod::Plain => write!(f, "plain"),
            MixingMethod::Diis => write!(f, "diis"),
        }
    }
}

/// Which quantity defines the Hamiltonian between iterations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MixedQuantity {
    Density,
    Potential,
}

impl FromStr for MixedQuantity {
    type Err = ScfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "density" => Ok(Self::Density),
            "potential" => Ok(Self::Potential),
            _ => Err(ScfError::UnknownMixedQuantity(s.to_string())),
        }
    }
}

impl fmt::Display for MixedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixedQuantity::Density => write!(f, "density"),
            MixedQuantity::Potential => write!(f, "potential"),
        }
    }
}

/// What a call to [`Mixer::mix`] actually did
#[derive(Debug, Clone, PartialEq)]
pub enum MixOutcome {
    /// Plain damping was requested
    Plain,
    /// DIIS window not yet full; plain damping against the latest snapshot
    Bootstrap { ndim: usize },
    /// DIIS extrapolation over a full window
    Diis {
        weights: Vec<f64>,
        residual_norm: f64,
        extrapolated_residual_norm: f64,
    },
    /// DIIS coefficients could not be normalized; plain damping used instead
    Fallback { norm: f64 },
    /// No snapshot to mix against
    Skipped,
}

/// Plain linear damping, in place: `current ← f·current + (1 − f)·previous`.
pub fn mix_plain(current: &mut MixedVariable, previous: &MixedVariable, fraction: f64) {
    current.blend(previous, fraction);
}

/// Index of the smallest eigenvalue, ignoring NaNs
pub fn min_eigenvalue_index(eigenvalues: &DVector<f64>) -> Option<usize> {
    eigenvalues
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}

/// DIIS coefficients from a symmetric residual overlap matrix.
///
/// Returns `Err(norm)` when the minimal eigenvector sums to (numerically)
/// zero and therefore cannot be rescaled onto Σ c = 1.
pub fn diis_weights(overlap: &DMatrix<f64>) -> Result<Vec<f64>, f64> {
    let eig = overlap.clone().symmetric_eigen();
    let idx = min_eigenvalue_index(&eig.eigenvalues).ok_or(f64::NAN)?;
    let evec = eig.eigenvectors.column(idx);

    let norm: f64 = evec.iter().sum();
    if !norm.is_finite() || norm.abs() < DIIS_NORM_EPS {
        return Err(norm);
    }
    debug!("DIIS minimal eigenvalue {:.6e}, normalization {:.6}", eig.eigenvalues[idx], norm);
    Ok(evec.iter().map(|c| c / norm).collect())
}

/// Produces the next trial variable from the current one and its history.
///
/// Under DIIS the extrapolation only starts once the residual window holds
/// `history` entries; until then plain damping is used. A window of one
/// entry never extrapolates: with `history == 1` every step is plain
/// damping, since a single-vector combination would just return the
/// previous input.
///
/// Fields handed to [`Mixer::mix`] are full-grid and identical on every
/// process, so the mixer performs no reductions of its own.
#[derive(Debug, Clone)]
pub struct Mixer {
    method: MixingMethod,
    fraction: f64,
    history: HistoryBuffer,
}

impl Mixer {
    pub fn new(method: MixingMethod, history: usize, fraction: f64) -> Self {
        Mixer {
            method,
            fraction,
            history: HistoryBuffer::new(history, method == MixingMethod::Diis),
        }
    }

    pub fn method(&self) -> MixingMethod {
        self.method
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn evict_if_full(&mut self) -> bool {
        self.history.evict_if_full()
    }

    pub fn record_variable(&mut self, variable: &MixedVariable) {
        self.history.record_variable(variable);
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Mix `current` (the freshly computed variable) in place
    pub fn mix(&mut self, current: &mut MixedVariable) -> MixOutcome {
        match self.method {
            MixingMethod::Plain => match self.history.latest_variable() {
                Some(previous) => {
                    mix_plain(current, previous, self.fraction);
                    MixOutcome::Plain
                }
                None => MixOutcome::Skipped,
            },
            MixingMethod::Diis => self.mix_diis(current),
        }
    }

    fn mix_diis(&mut self, current: &mut MixedVariable) -> MixOutcome {
        let residual = match self.history.latest_variable() {
            Some(previous) => current.primary.difference(&previous.primary),
            None => return MixOutcome::Skipped,
        };
        self.history.record_residual(&residual);

        let ndim = self.history.residual_count();
        if ndim < self.history.capacity() || ndim < 2 {
            if let Some(previous) = self.history.latest_variable() {
                mix_plain(current, previous, self.fraction);
            }
            return MixOutcome::Bootstrap { ndim };
        }

        let weights = match diis_weights(&self.history.overlap().active()) {
            Ok(w) => w,
            Err(norm) => {
                warn!(
                    "DIIS coefficients not normalizable (sum = {:.3e}); using plain mixing this iteration",
                    norm
                );
                if let Some(previous) = self.history.latest_variable() {
                    mix_plain(current, previous, self.fraction);
                }
                return MixOutcome::Fallback { norm };
            }
        };

        let variables = self.history.variables();
        let residuals = self.history.residuals();
        // pair the newest snapshots with the newest residuals
        let k = variables.len().min(ndim);
        current.assign_weighted_sum(&variables[variables.len() - k..], &weights[ndim - k..]);

        let residual_norm = residuals[ndim - 1].norm_squared().sqrt();
        let extrapolated_residual_norm = FieldSet::weighted_sum(residuals.iter(), &weights)
            .map(|r| r.norm_squared().sqrt())
            .unwrap_or(f64::NAN);

        info!(
            "DIIS: {} vectors, electron check {:.6}, residual {:.6e} -> {:.6e}",
            ndim,
            current.primary.integral(0),
            residual_norm,
            extrapolated_residual_norm
        );

        MixOutcome::Diis {
            weights,
            residual_norm,
            extrapolated_residual_norm,
        }
    }
}
