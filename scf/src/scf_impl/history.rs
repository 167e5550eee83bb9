//! Fixed-capacity history of mixed variables and residuals

extern crate nalgebra as na;

use crate::field::{FieldSet, MixedVariable};
use na::DMatrix;
use tracing::debug;

/// Symmetric matrix of residual inner products, `overlap(i, j) = <r_i|r_j>`.
///
/// Storage is allocated once at full capacity; `dim` tracks how many
/// rows/columns are currently in use.
#[derive(Debug, Clone)]
pub struct ResidualOverlap {
    data: DMatrix<f64>,
    dim: usize,
}

impl ResidualOverlap {
    pub fn new(capacity: usize) -> Self {
        ResidualOverlap {
            data: DMatrix::zeros(capacity, capacity),
            dim: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    /// Writes both (i, j) and (j, i)
    fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[(i, j)] = value;
        self.data[(j, i)] = value;
    }

    /// Leading `dim × dim` block
    pub fn active(&self) -> DMatrix<f64> {
        self.data.view((0, 0), (self.dim, self.dim)).clone_owned()
    }

    pub fn is_symmetric(&self) -> bool {
        (0..self.dim).all(|i| (0..i).all(|j| self.data[(i, j)] == self.data[(j, i)]))
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.dim = 0;
    }
}

/// Past variable snapshots and past residuals.
///
/// When either list reaches `capacity` the window is restarted from scratch
/// rather than slid, so an overlap matrix never mixes residuals from two
/// different windows.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    clear_residuals: bool,
    variables: Vec<MixedVariable>,
    residuals: Vec<FieldSet>,
    overlap: ResidualOverlap,
}

impl HistoryBuffer {
    /// `clear_residuals` selects whether eviction also drops residuals and
    /// the overlap matrix (required by residual minimization).
    pub fn new(capacity: usize, clear_residuals: bool) -> Self {
        HistoryBuffer {
            capacity,
            clear_residuals,
            variables: Vec::with_capacity(capacity),
            residuals: Vec::with_capacity(capacity),
            overlap: ResidualOverlap::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.variables.len()
    }

    pub fn residual_count(&self) -> usize {
        self.residuals.len()
    }

    pub fn is_full(&self) -> bool {
        self.variables.len() >= self.capacity || self.residuals.len() >= self.capacity
    }

    pub fn evict_if_full(&mut self) -> bool {
        if !self.is_full() {
            return false;
        }
        self.variables.clear();
        if self.clear_residuals {
            self.residuals.clear();
            self.overlap.clear();
        }
        debug!("Mixing history full ({} entries), restarting window", self.capacity);
        true
    }

    pub fn record_variable(&mut self, variable: &MixedVariable) {
        self.variables.push(variable.clone());
    }

    /// Appends a residual and fills in the newest overlap row/column.
    ///
    /// Residuals are full-grid fields, identical on every process, so the
    /// inner products are already global and are stored as computed.
    pub fn record_residual(&mut self, residual: &FieldSet) {
        if self.residuals.len() >= self.capacity {
            // residual history outlived its window without an eviction
            self.residuals.clear();
            self.overlap.clear();
        }
        self.residuals.push(residual.clone());

        let ndim = self.residuals.len();
        let newest = &self.residuals[ndim - 1];
        let overlaps: Vec<f64> = self.residuals.iter().map(|r| r.dot(newest)).collect();

        self.overlap.dim = ndim;
        for (j, value) in overlaps.into_iter().enumerate() {
            self.overlap.set(j, ndim - 1, value);
        }
    }

    pub fn latest_variable(&self) -> Option<&MixedVariable> {
        self.variables.last()
    }

    pub fn variables(&self) -> &[MixedVariable] {
        &self.variables
    }

    pub fn residuals(&self) -> &[FieldSet] {
        &self.residuals
    }

    pub fn overlap(&self) -> &ResidualOverlap {
        &self.overlap
    }

    pub fn clear(&mut self) {
        self.variables.clear();
        self.residuals.clear();
        self.overlap.clear();
    }
}
