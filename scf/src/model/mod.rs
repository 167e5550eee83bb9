//! One-dimensional Kohn–Sham model system
//!
//! Electrons on a uniform grid interact with soft-Coulomb nuclei and with each
//! other through a soft-Coulomb Hartree term plus local exchange. Each spin
//! channel is one quantum number of the SCF driver.

pub mod bands;
pub mod coulomb;
pub mod grid;
pub mod xc;

extern crate nalgebra as na;

use crate::error::ScfError;
use crate::field::{FieldSet, MixedVariable};
use crate::scf_impl::{
    owned_quantum_numbers, BandOutcome, Energies, HamiltonianMode, KohnShamState, MixedQuantity,
    Reducer,
};
use bands::{BandMinimizerParams, Bands};
use coulomb::{soft_coulomb, CoulombBoundary, CoulombKernel};
use grid::Grid;
use na::{DMatrix, DVector};
use tracing::{debug, info};
use xc::Exchange;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Nucleus {
    pub position: f64,
    pub charge: f64,
}

/// Everything needed to set up a [`ModelSystem`]
#[derive(Clone, Debug, PartialEq)]
pub struct ModelParams {
    pub points: usize,
    pub length: f64,
    pub nuclei: Vec<Nucleus>,
    pub n_electrons: usize,
    pub spin_polarized: bool,
    /// n↑ − n↓, only read when spin polarized
    pub magnetization: usize,
    pub softening: f64,
    pub boundary: CoulombBoundary,
    pub kinetic_density: bool,
    pub band_params: BandMinimizerParams,
}

/// Occupation numbers for each spin channel
fn occupations(params: &ModelParams) -> Result<Vec<Vec<f64>>, ScfError> {
    let n = params.n_electrons;
    if !params.spin_polarized {
        let mut occ = vec![2.0; n / 2];
        if n % 2 == 1 {
            occ.push(1.0);
        }
        return Ok(vec![occ]);
    }

    let m = params.magnetization;
    if m > n || (n - m) % 2 != 0 {
        return Err(ScfError::InvalidConfig(format!(
            "magnetization {} is incompatible with {} electrons",
            m, n
        )));
    }
    let n_up = (n + m) / 2;
    let n_down = (n - m) / 2;
    Ok(vec![vec![1.0; n_up], vec![1.0; n_down]])
}

pub struct ModelSystem {
    grid: Grid,
    coulomb: CoulombKernel,
    exchange: Exchange,
    kinetic: DMatrix<f64>,
    v_external: DVector<f64>,
    occupations: Vec<Vec<f64>>,
    wavefunctions: Vec<DMatrix<f64>>,
    eigenvalues: Vec<DVector<f64>>,
    /// n_s (+ τ_s)
    density: MixedVariable,
    /// Vscloc_s (+ Vtau_s)
    potential: MixedVariable,
    band_params: BandMinimizerParams,
    mode: HamiltonianMode,
}

impl ModelSystem {
    pub fn new(params: &ModelParams) -> Result<Self, ScfError> {
        let grid = Grid::new(params.points, params.length)?;
        if params.n_electrons == 0 {
            return Err(ScfError::InvalidConfig(
                "at least one electron is required".to_string(),
            ));
        }
        if !(params.softening.is_finite() && params.softening > 0.0) {
            return Err(ScfError::InvalidConfig(format!(
                "softening must be positive, got {}",
                params.softening
            )));
        }
        let occupations = occupations(params)?;
        let max_bands = occupations.iter().map(|o| o.len()).max().unwrap_or(0);
        if max_bands > grid.points() {
            return Err(ScfError::InvalidConfig(format!(
                "{} bands do not fit on a grid of {} points",
                max_bands,
                grid.points()
            )));
        }

        let v_external = DVector::from_fn(grid.points(), |i, _| {
            let x = grid.coordinate(i);
            -params
                .nuclei
                .iter()
                .map(|nuc| {
                    let d = coulomb::distance(&grid, params.boundary, x, nuc.position);
                    nuc.charge * soft_coulomb(d, params.softening)
                })
                .sum::<f64>()
        });

        let n_spin = occupations.len();
        let dx = grid.dx();
        let tau = |on: bool| on.then(|| FieldSet::zeros(n_spin, grid.points(), dx));
        let density = MixedVariable::new(
            FieldSet::zeros(n_spin, grid.points(), dx),
            tau(params.kinetic_density),
        );
        let potential = density.clone();

        let wavefunctions = occupations
            .iter()
            .map(|occ| grid.harmonic_guess(occ.len()))
            .collect();
        let eigenvalues = occupations
            .iter()
            .map(|occ| DVector::zeros(occ.len()))
            .collect();

        let mut system = ModelSystem {
            coulomb: CoulombKernel::new(&grid, params.softening, params.boundary),
            exchange: Exchange::new(params.spin_polarized, params.kinetic_density),
            kinetic: grid.kinetic_matrix(),
            grid,
            v_external,
            occupations,
            wavefunctions,
            eigenvalues,
            density,
            potential,
            band_params: params.band_params,
            mode: HamiltonianMode::Frozen,
        };

        let (n, tau) = system.local_densities(0..n_spin);
        system.density.primary = n;
        system.density.kinetic = tau;
        system.density_to_potential();

        info!(
            "Model system: {} points, L = {:.3}, {} nuclei, {} electrons in {} spin channel(s)",
            system.grid.points(),
            system.grid.length(),
            params.nuclei.len(),
            params.n_electrons,
            n_spin
        );
        Ok(system)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn n_spin(&self) -> usize {
        self.occupations.len()
    }

    pub fn occupations(&self, q: usize) -> &[f64] {
        &self.occupations[q]
    }

    pub fn eigenvalues(&self, q: usize) -> &DVector<f64> {
        &self.eigenvalues[q]
    }

    pub fn wavefunctions(&self, q: usize) -> &DMatrix<f64> {
        &self.wavefunctions[q]
    }

    pub fn density(&self) -> &MixedVariable {
        &self.density
    }

    pub fn potential(&self) -> &MixedVariable {
        &self.potential
    }

    pub fn external_potential(&self) -> &DVector<f64> {
        &self.v_external
    }

    pub fn mode(&self) -> HamiltonianMode {
        self.mode
    }

    /// ∫ n dx summed over spin channels
    pub fn electron_count(&self) -> f64 {
        self.density.primary.total_integral()
    }

    /// H_s = T + V_ext + Vscloc_s
    pub fn hamiltonian(&self, q: usize) -> DMatrix<f64> {
        let v = &self.v_external + self.potential.primary.channel(q);
        let diagonal = self.kinetic.diagonal() + v;
        let mut h = self.kinetic.clone();
        h.set_diagonal(&diagonal);
        h
    }

    /// Density (and τ) contributed by the quantum numbers in `range`.
    /// Wavefunction columns are Euclidean-normalized, hence the 1/dx.
    fn local_densities(&self, range: std::ops::Range<usize>) -> (FieldSet, Option<FieldSet>) {
        let n_points = self.grid.points();
        let dx = self.grid.dx();
        let mut n = FieldSet::zeros(self.n_spin(), n_points, dx);
        let mut tau = self
            .exchange
            .needs_kinetic_density()
            .then(|| FieldSet::zeros(self.n_spin(), n_points, dx));

        for q in range {
            let psi = &self.wavefunctions[q];
            for (b, &f) in self.occupations[q].iter().enumerate() {
                let col = psi.column(b);
                let channel = n.channel_mut(q);
                for i in 0..n_points {
                    channel[i] += f * col[i] * col[i] / dx;
                }
                if let Some(tau) = tau.as_mut() {
                    let grad = self.grid.gradient(&col.clone_owned());
                    tau.channel_mut(q)
                        .axpy(0.5 * f / dx, &grad.component_mul(&grad), 1.0);
                }
            }
        }
        (n, tau)
    }

    fn kinetic_energy(&self, range: std::ops::Range<usize>) -> f64 {
        range
            .map(|q| {
                let psi = &self.wavefunctions[q];
                let tpsi = &self.kinetic * psi;
                self.occupations[q]
                    .iter()
                    .enumerate()
                    .map(|(b, f)| f * psi.column(b).dot(&tpsi.column(b)))
                    .sum::<f64>()
            })
            .sum()
    }

    fn total_density(density: &FieldSet) -> DVector<f64> {
        density
            .channels()
            .iter()
            .fold(DVector::zeros(density.n_points()), |acc, c| acc + c)
    }
}

impl KohnShamState for ModelSystem {
    type Bands = Bands;

    fn n_quantum_numbers(&self) -> usize {
        self.n_spin()
    }

    fn needs_kinetic_density(&self) -> bool {
        self.exchange.needs_kinetic_density()
    }

    fn set_hamiltonian_mode(&mut self, mode: HamiltonianMode) {
        self.mode = mode;
    }

    fn minimize_bands(&self, q: usize) -> BandOutcome<Bands> {
        let h = self.hamiltonian(q);
        let (bands, report) = bands::minimize_bands(&h, &self.wavefunctions[q], &self.band_params);
        BandOutcome { bands, report }
    }

    fn install_bands(&mut self, q: usize, bands: Bands) {
        self.wavefunctions[q] = bands.wavefunctions;
        self.eigenvalues[q] = bands.eigenvalues;
    }

    fn evaluate(&mut self, reducer: &dyn Reducer) -> Energies {
        let owned = owned_quantum_numbers(self.n_spin(), reducer.size(), reducer.rank());
        // band sums cover only the owned quantum numbers
        let mut energies = Energies::new();
        energies.add("Kinetic", self.kinetic_energy(owned.clone()));
        energies.reduce(reducer);

        if self.mode == HamiltonianMode::Variable {
            let (mut n, mut tau) = self.local_densities(owned);
            for s in 0..n.n_channels() {
                reducer.reduce_sum(n.channel_mut(s).as_mut_slice());
            }
            if let Some(tau) = tau.as_mut() {
                for s in 0..tau.n_channels() {
                    reducer.reduce_sum(tau.channel_mut(s).as_mut_slice());
                }
            }
            self.density.primary = n;
            self.density.kinetic = tau;
            self.density_to_potential();
        }

        let dx = self.grid.dx();
        let n = &self.density.primary;
        let n_total = Self::total_density(n);
        let v_hartree = self.coulomb.hartree_potential(&n_total);
        let exchange: f64 = n
            .channels()
            .iter()
            .map(|c| c.iter().map(|&v| self.exchange.energy_density(v)).sum::<f64>())
            .sum::<f64>()
            * dx;

        energies.add("External", self.v_external.dot(&n_total) * dx);
        energies.add("Hartree", self.coulomb.hartree_energy(&n_total, &v_hartree));
        energies.add("Exchange", exchange);
        debug!("Energy terms:\n{}", energies);
        energies
    }

    fn density_to_potential(&mut self) {
        let n = &self.density.primary;
        let v_hartree = self.coulomb.hartree_potential(&Self::total_density(n));
        let channels = n
            .channels()
            .iter()
            .map(|c| &v_hartree + c.map(|v| self.exchange.potential(v)))
            .collect();
        self.potential.primary = FieldSet::from_channels(channels, n.dv());
        if let Some(vtau) = self.potential.kinetic.as_mut() {
            vtau.fill_zero();
        }
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
