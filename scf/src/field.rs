//! Scalar grid fields and the SCF mixed variable
//!
//! A [`FieldSet`] is one real-space scalar field per spin channel together with
//! the volume element of the grid it lives on. All inner products and integrals
//! are weighted by that volume element so that they do not depend on grid
//! resolution.

extern crate nalgebra as na;

use na::DVector;

/// One scalar field per spin channel on a common grid
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    channels: Vec<DVector<f64>>,
    dv: f64,
}

impl FieldSet {
    pub fn zeros(n_channels: usize, n_points: usize, dv: f64) -> Self {
        FieldSet {
            channels: vec![DVector::zeros(n_points); n_channels],
            dv,
        }
    }

    pub fn from_channels(channels: Vec<DVector<f64>>, dv: f64) -> Self {
        debug_assert!(
            channels.windows(2).all(|w| w[0].len() == w[1].len()),
            "all channels must share one grid"
        );
        FieldSet { channels, dv }
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn n_points(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Volume element of the underlying grid
    pub fn dv(&self) -> f64 {
        self.dv
    }

    pub fn channel(&self, s: usize) -> &DVector<f64> {
        &self.channels[s]
    }

    pub fn channel_mut(&mut self, s: usize) -> &mut DVector<f64> {
        &mut self.channels[s]
    }

    pub fn channels(&self) -> &[DVector<f64>] {
        &self.channels
    }

    /// ∫ f_s dV for a single channel
    pub fn integral(&self, s: usize) -> f64 {
        self.channels[s].sum() * self.dv
    }

    /// Sum of the integrals over all channels
    pub fn total_integral(&self) -> f64 {
        self.channels.iter().map(|c| c.sum()).sum::<f64>() * self.dv
    }

    /// Grid-weighted inner product summed over spin channels:
    /// Σ_s ∫ a_s b_s dV
    pub fn dot(&self, other: &FieldSet) -> f64 {
        debug_assert_eq!(self.n_channels(), other.n_channels());
        self.channels
            .iter()
            .zip(other.channels.iter())
            .map(|(a, b)| a.dot(b))
            .sum::<f64>()
            * self.dv
    }

    pub fn norm_squared(&self) -> f64 {
        self.dot(self)
    }

    /// Field-wise difference `self - other`
    pub fn difference(&self, other: &FieldSet) -> FieldSet {
        debug_assert_eq!(self.n_channels(), other.n_channels());
        let channels = self
            .channels
            .iter()
            .zip(other.channels.iter())
            .map(|(a, b)| a - b)
            .collect();
        FieldSet {
            channels,
            dv: self.dv,
        }
    }

    /// In-place linear interpolation: `self ← fraction·self + (1 − fraction)·previous`
    pub fn blend(&mut self, previous: &FieldSet, fraction: f64) {
        debug_assert_eq!(self.n_channels(), previous.n_channels());
        for (current, prev) in self.channels.iter_mut().zip(previous.channels.iter()) {
            current.axpy(1.0 - fraction, prev, fraction);
        }
    }

    /// `self ← self + alpha·x`
    pub fn add_scaled(&mut self, alpha: f64, x: &FieldSet) {
        debug_assert_eq!(self.n_channels(), x.n_channels());
        for (y, xs) in self.channels.iter_mut().zip(x.channels.iter()) {
            y.axpy(alpha, xs, 1.0);
        }
    }

    pub fn fill_zero(&mut self) {
        for c in self.channels.iter_mut() {
            c.fill(0.0);
        }
    }

    /// Σ_j w_j f_j over a non-empty sequence of compatible field sets
    pub fn weighted_sum<'a, I>(fields: I, weights: &[f64]) -> Option<FieldSet>
    where
        I: IntoIterator<Item = &'a FieldSet>,
    {
        let mut iter = fields.into_iter().zip(weights.iter());
        let (first, &w0) = iter.next()?;
        let mut acc = first.clone();
        for c in acc.channels.iter_mut() {
            *c *= w0;
        }
        for (f, &w) in iter {
            acc.add_scaled(w, f);
        }
        Some(acc)
    }

    pub fn is_finite(&self) -> bool {
        self.channels
            .iter()
            .all(|c| c.iter().all(|v| v.is_finite()))
    }
}

/// The quantity that defines the Kohn-Sham Hamiltonian between SCF iterations.
///
/// `primary` holds the electron density (or the local self-consistent
/// potential), one field per spin channel. `kinetic` carries the
/// kinetic-energy density (or its potential) when the functional needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedVariable {
    pub primary: FieldSet,
    pub kinetic: Option<FieldSet>,
}

impl MixedVariable {
    pub fn new(primary: FieldSet, kinetic: Option<FieldSet>) -> Self {
        MixedVariable { primary, kinetic }
    }

    pub fn n_channels(&self) -> usize {
        self.primary.n_channels()
    }

    pub fn has_kinetic(&self) -> bool {
        self.kinetic.is_some()
    }

    /// Blend every field, companion included, toward `previous`
    pub fn blend(&mut self, previous: &MixedVariable, fraction: f64) {
        self.primary.blend(&previous.primary, fraction);
        if let (Some(tau), Some(prev_tau)) = (self.kinetic.as_mut(), previous.kinetic.as_ref()) {
            tau.blend(prev_tau, fraction);
        }
    }

    /// Overwrite `self` with Σ_j w_j v_j
    pub fn assign_weighted_sum(&mut self, history: &[MixedVariable], weights: &[f64]) {
        if let Some(primary) =
            FieldSet::weighted_sum(history.iter().map(|v| &v.primary), weights)
        {
            self.primary = primary;
        }
        if self.kinetic.is_some() {
            self.kinetic =
                FieldSet::weighted_sum(history.iter().filter_map(|v| v.kinetic.as_ref()), weights);
        }
    }

    pub fn is_finite(&self) -> bool {
        self.primary.is_finite() && self.kinetic.as_ref().map_or(true, |k| k.is_finite())
    }
}
