//! Self-consistent-field driver with density/potential mixing
//!
//! This module provides the collaborator traits the driver is written against
//! ([`KohnShamState`], [`Reducer`]), the energy accumulator, and
//! [`ScfDriver`], which alternates band minimization at a frozen Hamiltonian
//! with plain or DIIS mixing of the Hamiltonian-defining variable until the
//! total energy stops changing.

pub mod history;
pub mod mixing;

#[cfg(test)]
mod tests;

pub use history::{HistoryBuffer, ResidualOverlap};
pub use mixing::{mix_plain, MixOutcome, MixedQuantity, Mixer, MixingMethod};

use crate::error::ScfError;
use crate::field::MixedVariable;
use rayon::prelude::*;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace_span, warn};

/// Whether the Hamiltonian may follow the wavefunctions.
///
/// `Frozen` keeps the density and local potential fixed while bands are
/// minimized; `Variable` lets energy evaluation refresh them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HamiltonianMode {
    Frozen,
    Variable,
}

/// Result of one inner band minimization
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandReport {
    pub converged: bool,
    pub iterations: usize,
    pub residual_norm: f64,
}

/// Updated bands for one quantum number plus how the solve went
#[derive(Debug, Clone)]
pub struct BandOutcome<B> {
    pub bands: B,
    pub report: BandReport,
}

/// Electronic state seen by the SCF driver.
///
/// Implementors own the wavefunctions, density and local potential. Band
/// minimization takes `&self`: it runs with the Hamiltonian frozen and may be
/// executed concurrently for different quantum numbers; only the driver
/// installs the results.
pub trait KohnShamState: Sync {
    type Bands: Send;

    /// Number of independent Hamiltonian blocks (k-point × spin)
    fn n_quantum_numbers(&self) -> usize;

    /// Whether the functional depends on the kinetic-energy density
    fn needs_kinetic_density(&self) -> bool;

    fn set_hamiltonian_mode(&mut self, mode: HamiltonianMode);

    /// Minimize the bands of quantum number `q` at the current Hamiltonian
    fn minimize_bands(&self, q: usize) -> BandOutcome<Self::Bands>;

    fn install_bands(&mut self, q: usize, bands: Self::Bands);

    /// Compute energies and, in variable mode, refresh density and potential.
    ///
    /// Contributions of the locally owned quantum numbers must be summed
    /// through `reducer` here. On return the energies, the density and both
    /// mixed variables are global and identical on every process; the mixer
    /// relies on this and never reduces them again.
    fn evaluate(&mut self, reducer: &dyn Reducer) -> Energies;

    /// Rebuild the local potential from the current density
    fn density_to_potential(&mut self);

    fn mixed_variable(&self, quantity: MixedQuantity) -> &MixedVariable;

    fn mixed_variable_mut(&mut self, quantity: MixedQuantity) -> &mut MixedVariable;
}

/// Collective operations across cooperating processes
pub trait Reducer: Send + Sync {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    /// Element-wise global sum, in place
    fn reduce_sum(&self, values: &mut [f64]);

    fn reduce_scalar(&self, value: f64) -> f64 {
        let mut buf = [value];
        self.reduce_sum(&mut buf);
        buf[0]
    }

    fn barrier(&self) {}
}

/// Single-process reducer: every sum is already global
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalReducer;

impl Reducer for LocalReducer {
    fn reduce_sum(&self, _values: &mut [f64]) {}
}

/// Contiguous block of quantum numbers owned by `rank` out of `size` processes.
///
/// The first `n % size` ranks get one extra entry.
pub fn owned_quantum_numbers(n: usize, size: usize, rank: usize) -> Range<usize> {
    let size = size.max(1);
    let base = n / size;
    let extra = n % size;
    let start = rank * base + rank.min(extra);
    let len = base + usize::from(rank < extra);
    start.min(n)..(start + len).min(n)
}

/// Accumulator of named energy contributions (Hartree)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Energies {
    terms: Vec<(&'static str, f64)>,
}

impl Energies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` to term `name`, creating it if absent
    pub fn add(&mut self, name: &'static str, value: f64) {
        match self.terms.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v += value,
            None => self.terms.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.terms.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn total(&self) -> f64 {
        self.terms.iter().map(|(_, v)| v).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.terms.iter().copied()
    }

    /// Sums every term across processes
    pub fn reduce(&mut self, reducer: &dyn Reducer) {
        let mut values: Vec<f64> = self.terms.iter().map(|(_, v)| *v).collect();
        reducer.reduce_sum(&mut values);
        for ((_, v), reduced) in self.terms.iter_mut().zip(values) {
            *v = reduced;
        }
    }
}

impl fmt::Display for Energies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.terms {
            writeln!(f, "  {:>12} = {:>20.12} au", name, value)?;
        }
        write!(f, "  {:>12} = {:>20.12} au", "Etot", self.total())
    }
}

/// Validated SCF convergence parameters
#[derive(Clone, Debug, PartialEq)]
pub struct ScfSettings {
    pub mixing_method: MixingMethod,
    pub mixed_quantity: MixedQuantity,
    /// Capacity of the mixing history window
    pub history: usize,
    pub n_iterations: usize,
    pub energy_diff_threshold: f64,
    /// Damping fraction for plain mixing, in (0, 1]
    pub mix_fraction: f64,
}

impl Default for ScfSettings {
    fn default() -> Self {
        ScfSettings {
            mixing_method: MixingMethod::Plain,
            mixed_quantity: MixedQuantity::Density,
            history: 5,
            n_iterations: 50,
            energy_diff_threshold: 1e-8,
            mix_fraction: 0.5,
        }
    }
}

impl ScfSettings {
    pub fn validate(self) -> Result<Self, ScfError> {
        if self.history < 1 {
            return Err(ScfError::InvalidConfig(
                "history must be at least 1".to_string(),
            ));
        }
        if self.n_iterations < 1 {
            return Err(ScfError::InvalidConfig(
                "n_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.energy_diff_threshold.is_finite() && self.energy_diff_threshold > 0.0) {
            return Err(ScfError::InvalidConfig(format!(
                "energy_diff_threshold must be a positive number, got {}",
                self.energy_diff_threshold
            )));
        }
        if !(self.mix_fraction > 0.0 && self.mix_fraction <= 1.0) {
            return Err(ScfError::InvalidConfig(format!(
                "mix_fraction must lie in (0, 1], got {}",
                self.mix_fraction
            )));
        }
        Ok(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScfStatus {
    Iterating,
    Converged,
    MaxIterReached,
    Cancelled,
}

/// Iteration bookkeeping for the outer loop
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvergenceState {
    pub iteration: usize,
    pub energy_prev: f64,
    pub energy: f64,
    pub status: ScfStatus,
}

impl ConvergenceState {
    pub fn new() -> Self {
        ConvergenceState {
            iteration: 0,
            energy_prev: 0.0,
            energy: 0.0,
            status: ScfStatus::Iterating,
        }
    }

    pub fn delta(&self) -> f64 {
        self.energy - self.energy_prev
    }

    pub fn is_converged(&self) -> bool {
        self.status == ScfStatus::Converged
    }
}

impl Default for ConvergenceState {
    fn default() -> Self {
        Self::new()
    }
}

/// What the driver reports once the loop ends
#[derive(Clone, Debug)]
pub struct ScfOutcome {
    pub convergence: ConvergenceState,
    pub energies: Energies,
    /// Energy of the initial guess (probe evaluation)
    pub initial_energy: f64,
}

impl ScfOutcome {
    pub fn status(&self) -> ScfStatus {
        self.convergence.status
    }

    pub fn iterations(&self) -> usize {
        self.convergence.iteration
    }

    pub fn energy(&self) -> f64 {
        self.convergence.energy
    }

    pub fn delta_energy(&self) -> f64 {
        self.convergence.delta()
    }
}

/// Shared flag used to stop the SCF loop between iterations
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outer SCF loop
pub struct ScfDriver {
    settings: ScfSettings,
    mixer: Mixer,
    reducer: Arc<dyn Reducer>,
    stop: StopHandle,
}

impl ScfDriver {
    pub fn new(settings: ScfSettings) -> Result<Self, ScfError> {
        Self::with_reducer(settings, Arc::new(LocalReducer))
    }

    pub fn with_reducer(settings: ScfSettings, reducer: Arc<dyn Reducer>) -> Result<Self, ScfError> {
        let settings = settings.validate()?;
        let mixer = Mixer::new(settings.mixing_method, settings.history, settings.mix_fraction);
        Ok(ScfDriver {
            settings,
            mixer,
            reducer,
            stop: StopHandle::new(),
        })
    }

    pub fn settings(&self) -> &ScfSettings {
        &self.settings
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Handle that may be triggered from another thread to end the loop
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs the SCF cycle on `state` until convergence, cancellation or the
    /// iteration cap. Non-convergence is reported through the outcome status.
    pub fn run<S: KohnShamState>(&mut self, state: &mut S) -> Result<ScfOutcome, ScfError> {
        let quantity = self.settings.mixed_quantity;
        let reducer = Arc::clone(&self.reducer);
        self.mixer.reset();

        // probe energy of the initial guess; not an iteration
        state.set_hamiltonian_mode(HamiltonianMode::Variable);
        let initial_energy = state.evaluate(reducer.as_ref()).total();
        state.set_hamiltonian_mode(HamiltonianMode::Frozen);
        if !initial_energy.is_finite() {
            return Err(ScfError::NonFiniteEnergy { iteration: 0 });
        }
        info!("Initial guess energy: {:.12} au", initial_energy);
        info!(
            "Will mix electronic {} at each iteration ({} mixing, history {}).",
            quantity, self.settings.mixing_method, self.settings.history
        );

        let owned = owned_quantum_numbers(state.n_quantum_numbers(), reducer.size(), reducer.rank());
        // the first iteration is compared against the initial guess
        let mut convergence = ConvergenceState {
            energy: initial_energy,
            ..ConvergenceState::new()
        };
        let mut energies = Energies::new();

        info!("------------------- SCF Cycle ---------------------");
        for iteration in 1..=self.settings.n_iterations {
            if self.stop.is_stop_requested() {
                info!("SCF stopped on request before iteration {}", iteration);
                convergence.status = ScfStatus::Cancelled;
                break;
            }
            convergence.iteration = iteration;

            self.mixer.evict_if_full();
            self.mixer.record_variable(state.mixed_variable(quantity));
            convergence.energy_prev = convergence.energy;

            state.set_hamiltonian_mode(HamiltonianMode::Frozen);
            let solved = {
                let _span = trace_span!("band_minimization", iteration).entered();
                let frozen: &S = state;
                owned
                    .clone()
                    .into_par_iter()
                    .map(|q| (q, frozen.minimize_bands(q)))
                    .collect::<Vec<_>>()
            };
            for (q, outcome) in solved {
                if !outcome.report.converged {
                    warn!(
                        "Band minimization for quantum number {} not converged after {} iterations (residual {:.3e})",
                        q, outcome.report.iterations, outcome.report.residual_norm
                    );
                }
                state.install_bands(q, outcome.bands);
            }

            state.set_hamiltonian_mode(HamiltonianMode::Variable);
            energies = state.evaluate(reducer.as_ref());
            reducer.barrier();
            convergence.energy = energies.total();
            if !convergence.energy.is_finite() {
                return Err(ScfError::NonFiniteEnergy { iteration });
            }

            info!(
                "SCF Iter: {:>3}  Eprev: {:>18.10}  dE: {:>10.2e}  Etot: {:>18.10}",
                iteration,
                convergence.energy_prev,
                convergence.delta(),
                convergence.energy
            );

            if convergence.delta().abs() < self.settings.energy_diff_threshold {
                info!(
                    "SCF converged (|Delta E| < {:.3e}) in {} iterations.",
                    self.settings.energy_diff_threshold, iteration
                );
                convergence.status = ScfStatus::Converged;
                break;
            }

            let outcome = self.mixer.mix(state.mixed_variable_mut(quantity));
            debug!("Mixing outcome: {:?}", outcome);
            if !state.mixed_variable(quantity).is_finite() {
                return Err(ScfError::NonFiniteVariable { iteration });
            }

            if quantity == MixedQuantity::Density {
                state.density_to_potential();
            }
        }

        if convergence.status == ScfStatus::Iterating {
            convergence.status = ScfStatus::MaxIterReached;
            warn!(
                "SCF did not converge within {} iterations (last dE = {:.3e})",
                self.settings.n_iterations,
                convergence.delta()
            );
        }
        state.set_hamiltonian_mode(HamiltonianMode::Frozen);

        Ok(ScfOutcome {
            convergence,
            energies,
            initial_energy,
        })
    }
}
