//! Tests for the SCF driver against a scripted electronic state

use super::*;
use crate::field::{FieldSet, MixedVariable};
use approx::assert_relative_eq;
use nalgebra::DVector;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;

/// Electronic state whose energies follow a fixed script.
///
/// The density is a single two-point channel; each evaluation overwrites it
/// with a new "output" density so that mixing has something to work on.
struct ScriptedState {
    n_q: usize,
    probe_energy: f64,
    energies: VecDeque<f64>,
    probed: bool,
    mode: HamiltonianMode,
    density: MixedVariable,
    potential: MixedVariable,
    minimize_calls: Vec<AtomicUsize>,
    frozen_during_minimize: AtomicBool,
    potential_rebuilds: usize,
    evaluations: usize,
}

impl ScriptedState {
    fn new(n_q: usize, energies: &[f64]) -> Self {
        let field = |v: f64| {
            MixedVariable::new(
                FieldSet::from_channels(vec![DVector::from_element(2, v)], 0.5),
                None,
            )
        };
        ScriptedState {
            n_q,
            probe_energy: 100.0,
            energies: energies.iter().copied().collect(),
            probed: false,
            mode: HamiltonianMode::Frozen,
            density: field(1.0),
            potential: field(-1.0),
            minimize_calls: (0..n_q).map(|_| AtomicUsize::new(0)).collect(),
            frozen_during_minimize: AtomicBool::new(true),
            potential_rebuilds: 0,
            evaluations: 0,
        }
    }

    fn calls(&self, q: usize) -> usize {
        self.minimize_calls[q].load(Ordering::SeqCst)
    }
}

impl KohnShamState for ScriptedState {
    type Bands = usize;

    fn n_quantum_numbers(&self) -> usize {
        self.n_q
    }

    fn needs_kinetic_density(&self) -> bool {
        false
    }

    fn set_hamiltonian_mode(&mut self, mode: HamiltonianMode) {
        self.mode = mode;
    }

    fn minimize_bands(&self, q: usize) -> BandOutcome<usize> {
        if self.mode != HamiltonianMode::Frozen {
            self.frozen_during_minimize.store(false, Ordering::SeqCst);
        }
        let n = self.minimize_calls[q].fetch_add(1, Ordering::SeqCst) + 1;
        BandOutcome {
            bands: n,
            report: BandReport {
                converged: q != 1,
                iterations: 3,
                residual_norm: 1e-9,
            },
        }
    }

    fn install_bands(&mut self, _q: usize, _bands: usize) {}

    fn evaluate(&mut self, _reducer: &dyn Reducer) -> Energies {
        let mut energies = Energies::new();
        if !self.probed {
            self.probed = true;
            energies.add("Probe", self.probe_energy);
            return energies;
        }
        self.evaluations += 1;
        let e = self.energies.pop_front().unwrap_or(0.0);
        let shift = self.evaluations as f64;
        self.density.primary.channel_mut(0).fill(1.0 + 0.1 * shift);
        self.potential.primary.channel_mut(0).fill(-1.0 - 0.1 * shift);
        energies.add("Kinetic", 0.5 * e);
        energies.add("Hartree", 0.5 * e);
        energies
    }

    fn density_to_potential(&mut self) {
        self.potential_rebuilds += 1;
    }

    fn mixed_variable(&self, quantity: MixedQuantity) -> &MixedVariable {
        match quantity {
            MixedQuantity::Density => &self.density,
            MixedQuantity::Potential => &self.potential,
        }
    }

    fn mixed_variable_mut(&mut self, quantity: MixedQuantity) -> &mut MixedVariable {
        match quantity {
            MixedQuantity::Density => &mut self.density,
            MixedQuantity::Potential => &mut self.potential,
        }
    }
}

fn plain_settings() -> ScfSettings {
    ScfSettings {
        mixing_method: MixingMethod::Plain,
        mixed_quantity: MixedQuantity::Density,
        history: 3,
        n_iterations: 10,
        energy_diff_threshold: 1e-6,
        mix_fraction: 0.5,
    }
}

#[test]
fn test_converges_on_scripted_sequence() {
    let mut state = ScriptedState::new(2, &[10.0, 5.0, 2.5, 2.5000001]);
    let mut driver = ScfDriver::new(plain_settings()).unwrap();
    let outcome = driver.run(&mut state).unwrap();

    assert_eq!(outcome.status(), ScfStatus::Converged);
    assert_eq!(outcome.iterations(), 4);
    assert_relative_eq!(outcome.delta_energy(), 1e-7, epsilon = 1e-12);
    assert_relative_eq!(outcome.energy(), 2.5000001, epsilon = 1e-12);
    assert_relative_eq!(outcome.initial_energy, 100.0);
    for q in 0..2 {
        assert_eq!(state.calls(q), 4);
    }
    assert!(state.frozen_during_minimize.load(Ordering::SeqCst));
}

#[test]
fn test_no_mixing_after_convergence() {
    let mut state = ScriptedState::new(1, &[10.0, 5.0, 2.5, 2.5000001]);
    let mut driver = ScfDriver::new(plain_settings()).unwrap();
    driver.run(&mut state).unwrap();

    // mixing (and the potential rebuild that follows it) happens on
    // iterations 1..=3 only
    assert_eq!(state.potential_rebuilds, 3);
    // the converged density is the raw fourth output, not a blend
    assert_relative_eq!(state.density.primary.channel(0)[0], 1.4, epsilon = 1e-12);
}

#[test]
fn test_plain_mixing_blends_with_snapshot() {
    let mut state = ScriptedState::new(1, &[10.0, 5.0]);
    let settings = ScfSettings {
        n_iterations: 1,
        ..plain_settings()
    };
    let mut driver = ScfDriver::new(settings).unwrap();
    driver.run(&mut state).unwrap();
    // snapshot 1.0, output 1.1, fraction 0.5
    assert_relative_eq!(state.density.primary.channel(0)[0], 1.05, epsilon = 1e-12);
}

#[test]
fn test_max_iterations_is_not_an_error() {
    let energies: Vec<f64> = (0..5).map(|i| 10.0 / (i + 1) as f64).collect();
    let mut state = ScriptedState::new(1, &energies);
    let settings = ScfSettings {
        n_iterations: 5,
        ..plain_settings()
    };
    let mut driver = ScfDriver::new(settings).unwrap();
    let outcome = driver.run(&mut state).unwrap();
    assert_eq!(outcome.status(), ScfStatus::MaxIterReached);
    assert_eq!(outcome.iterations(), 5);
    assert_eq!(state.calls(0), 5);
}

#[test]
fn test_potential_mixing_skips_rebuild() {
    let mut state = ScriptedState::new(1, &[10.0, 5.0, 2.5, 2.5000001]);
    let settings = ScfSettings {
        mixed_quantity: MixedQuantity::Potential,
        ..plain_settings()
    };
    let mut driver = ScfDriver::new(settings).unwrap();
    let outcome = driver.run(&mut state).unwrap();
    assert!(outcome.convergence.is_converged());
    assert_eq!(state.potential_rebuilds, 0);
}

#[test]
fn test_diis_history_never_exceeds_capacity() {
    let energies: Vec<f64> = (0..8).map(|i| 1.0 / (i + 1) as f64).collect();
    let mut state = ScriptedState::new(1, &energies);
    let settings = ScfSettings {
        mixing_method: MixingMethod::Diis,
        history: 3,
        n_iterations: 8,
        ..plain_settings()
    };
    let mut driver = ScfDriver::new(settings).unwrap();
    driver.run(&mut state).unwrap();
    let history = driver.mixer().history();
    assert!(history.size() <= 3);
    assert!(history.residual_count() <= 3);
    assert_eq!(history.overlap().dim(), history.residual_count());
    assert!(history.overlap().is_symmetric());
}

#[test]
fn test_near_zero_first_energy_is_not_converged() {
    // ΔE on iteration 1 is measured against the initial-guess energy, not zero
    let mut state = ScriptedState::new(1, &[1e-8, 0.5, 0.5]);
    let mut driver = ScfDriver::new(plain_settings()).unwrap();
    let outcome = driver.run(&mut state).unwrap();

    assert_eq!(outcome.status(), ScfStatus::Converged);
    assert_eq!(outcome.iterations(), 3);
    assert_eq!(state.calls(0), 3);
}

#[test]
fn test_diis_overlaps_are_not_reduced_again() {
    // fields are global after evaluate, so a multi-rank reducer must not
    // touch the residual overlaps
    struct TwoRanks;
    impl Reducer for TwoRanks {
        fn size(&self) -> usize {
            2
        }
        fn reduce_sum(&self, values: &mut [f64]) {
            values.iter_mut().for_each(|v| *v *= 2.0);
        }
    }

    let energies: Vec<f64> = (0..4).map(|i| 1.0 / (i + 1) as f64).collect();
    let mut state = ScriptedState::new(2, &energies);
    let settings = ScfSettings {
        mixing_method: MixingMethod::Diis,
        history: 3,
        n_iterations: 4,
        ..plain_settings()
    };
    let mut driver = ScfDriver::with_reducer(settings, Arc::new(TwoRanks)).unwrap();
    driver.run(&mut state).unwrap();

    let history = driver.mixer().history();
    let residuals = history.residuals();
    assert!(!residuals.is_empty());
    for i in 0..residuals.len() {
        for j in 0..residuals.len() {
            assert_relative_eq!(
                history.overlap().get(i, j),
                residuals[i].dot(&residuals[j]),
                epsilon = 1e-14
            );
        }
    }
}

#[test]
fn test_stop_requested_before_first_iteration() {
    let mut state = ScriptedState::new(2, &[10.0, 5.0]);
    let mut driver = ScfDriver::new(plain_settings()).unwrap();
    driver.stop_handle().request_stop();
    let outcome = driver.run(&mut state).unwrap();
    assert_eq!(outcome.status(), ScfStatus::Cancelled);
    assert_eq!(outcome.iterations(), 0);
    assert_eq!(state.calls(0), 0);
}

#[test]
fn test_non_finite_energy_is_fatal() {
    let mut state = ScriptedState::new(1, &[10.0, f64::NAN]);
    let mut driver = ScfDriver::new(plain_settings()).unwrap();
    let err = driver.run(&mut state).unwrap_err();
    assert_eq!(err, ScfError::NonFiniteEnergy { iteration: 2 });
}

#[test]
fn test_invalid_settings_fail_fast() {
    let bad_history = ScfSettings {
        history: 0,
        ..plain_settings()
    };
    assert!(matches!(
        ScfDriver::new(bad_history),
        Err(ScfError::InvalidConfig(_))
    ));

    let bad_threshold = ScfSettings {
        energy_diff_threshold: -1.0,
        ..plain_settings()
    };
    assert!(ScfDriver::new(bad_threshold).is_err());

    let bad_fraction = ScfSettings {
        mix_fraction: 0.0,
        ..plain_settings()
    };
    assert!(ScfDriver::new(bad_fraction).is_err());
}

#[test]
fn test_owned_quantum_numbers_partition() {
    for &(n, size) in &[(7usize, 3usize), (4, 4), (2, 5), (10, 1)] {
        let mut covered = Vec::new();
        for rank in 0..size {
            covered.extend(owned_quantum_numbers(n, size, rank));
        }
        assert_eq!(covered, (0..n).collect::<Vec<_>>());
    }
    assert_eq!(owned_quantum_numbers(7, 3, 0), 0..3);
    assert_eq!(owned_quantum_numbers(7, 3, 1), 3..5);
    assert_eq!(owned_quantum_numbers(7, 3, 2), 5..7);
}

#[test]
fn test_energies_accumulate_and_reduce() {
    struct Doubling;
    impl Reducer for Doubling {
        fn size(&self) -> usize {
            2
        }
        fn reduce_sum(&self, values: &mut [f64]) {
            values.iter_mut().for_each(|v| *v *= 2.0);
        }
    }

    let mut e = Energies::new();
    e.add("Kinetic", 1.0);
    e.add("Hartree", 0.5);
    e.add("Kinetic", 0.25);
    assert_eq!(e.get("Kinetic"), Some(1.25));
    assert_relative_eq!(e.total(), 1.75);

    e.reduce(&Doubling);
    assert_relative_eq!(e.total(), 3.5);
    assert_eq!(Doubling.reduce_scalar(2.0), 4.0);
}
