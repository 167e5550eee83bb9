//! Configuration management for SCF calculations
//!
//! The YAML input describes the model system (grid, nuclei, electrons,
//! interaction) and the SCF/band solver parameters. Every solver parameter
//! is optional in the file; `with_defaults` fills the gaps and
//! [`Config::scf_settings`] turns the result into validated driver settings.

mod args;

pub use args::Args;

use crate::error::ScfError;
use crate::model::bands::BandMinimizerParams;
use crate::model::coulomb::CoulombBoundary;
use crate::model::{ModelParams, Nucleus};
use crate::scf_impl::{MixedQuantity, MixingMethod, ScfSettings};
use serde::{Deserialize, Serialize};

/// Main configuration structure for SCF calculations
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub grid: GridParams,
    #[serde(default)]
    pub nuclei: Vec<NucleusParams>,
    pub electrons: ElectronParams,
    #[serde(default)]
    pub coulomb: CoulombParams,
    #[serde(default)]
    pub scf_params: ScfParams,
    #[serde(default)]
    pub band_params: BandParams,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GridParams {
    pub points: usize,
    pub length: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NucleusParams {
    pub position: f64,
    pub charge: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ElectronParams {
    pub count: usize,
    pub spin_polarized: Option<bool>,
    /// n↑ − n↓
    pub magnetization: Option<usize>,
    /// Track the kinetic-energy density alongside the density
    pub kinetic_density: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CoulombParams {
    pub softening: Option<f64>,
    pub boundary: Option<String>, // "periodic" or "truncated"
}

impl Default for CoulombParams {
    fn default() -> Self {
        CoulombParams {
            softening: Some(1.0),
            boundary: Some("periodic".to_string()),
        }
    }
}

impl CoulombParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.softening.is_none() {
            self.softening = defaults.softening;
        }
        if self.boundary.is_none() {
            self.boundary = defaults.boundary;
        }
        self
    }
}

/// SCF-specific parameters
#[derive(Debug, Deserialize, Serialize)]
pub struct ScfParams {
    pub mixing_method: Option<String>, // "plain" or "diis"
    pub mixed_variable: Option<String>, // "density" or "potential"
    pub history: Option<usize>,
    pub n_iterations: Option<usize>,
    pub energy_diff_threshold: Option<f64>,
    pub mix_fraction: Option<f64>,
}

impl Default for ScfParams {
    fn default() -> Self {
        ScfParams {
            mixing_method: Some("plain".to_string()),
            mixed_variable: Some("density".to_string()),
            history: Some(5),
            n_iterations: Some(50),
            energy_diff_threshold: Some(1e-8),
            mix_fraction: Some(0.5),
        }
    }
}

impl ScfParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.mixing_method.is_none() {
            self.mixing_method = defaults.mixing_method;
        }
        if self.mixed_variable.is_none() {
            self.mixed_variable = defaults.mixed_variable;
        }
        if self.history.is_none() {
            self.history = defaults.history;
        }
        if self.n_iterations.is_none() {
            self.n_iterations = defaults.n_iterations;
        }
        if self.energy_diff_threshold.is_none() {
            self.energy_diff_threshold = defaults.energy_diff_threshold;
        }
        if self.mix_fraction.is_none() {
            self.mix_fraction = defaults.mix_fraction;
        }
        self
    }
}

/// Inner band minimizer parameters
#[derive(Debug, Deserialize, Serialize)]
pub struct BandParams {
    pub max_iterations: Option<usize>,
    pub tolerance: Option<f64>,
}

impl Default for BandParams {
    fn default() -> Self {
        let defaults = BandMinimizerParams::default();
        BandParams {
            max_iterations: Some(defaults.max_iterations),
            tolerance: Some(defaults.tolerance),
        }
    }
}

impl BandParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.max_iterations.is_none() {
            self.max_iterations = defaults.max_iterations;
        }
        if self.tolerance.is_none() {
            self.tolerance = defaults.tolerance;
        }
        self
    }
}

impl Config {
    /// Apply defaults to all configuration sections
    pub fn with_defaults(mut self) -> Self {
        self.coulomb = self.coulomb.with_defaults();
        self.scf_params = self.scf_params.with_defaults();
        self.band_params = self.band_params.with_defaults();
        self
    }

    /// Command-line values take precedence over the file
    pub fn apply_overrides(&mut self, args: &Args) {
        let scf = &mut self.scf_params;
        if let Some(method) = args.mixing_method.clone() {
            scf.mixing_method = Some(method);
        }
        if let Some(variable) = args.mixed_variable.clone() {
            scf.mixed_variable = Some(variable);
        }
        if let Some(history) = args.history {
            scf.history = Some(history);
        }
        if let Some(n) = args.n_iterations {
            scf.n_iterations = Some(n);
        }
        if let Some(threshold) = args.energy_diff_threshold {
            scf.energy_diff_threshold = Some(threshold);
        }
        if let Some(fraction) = args.mix_fraction {
            scf.mix_fraction = Some(fraction);
        }
    }

    /// Validated SCF driver settings
    pub fn scf_settings(&self) -> Result<ScfSettings, ScfError> {
        let defaults = ScfSettings::default();
        let p = &self.scf_params;

        let mixing_method = match p.mixing_method.as_deref() {
            Some(s) => s.parse::<MixingMethod>()?,
            None => defaults.mixing_method,
        };
        let mixed_quantity = match p.mixed_variable.as_deref() {
            Some(s) => s.parse::<MixedQuantity>()?,
            None => defaults.mixed_quantity,
        };

        ScfSettings {
            mixing_method,
            mixed_quantity,
            history: p.history.unwrap_or(defaults.history),
            n_iterations: p.n_iterations.unwrap_or(defaults.n_iterations),
            energy_diff_threshold: p
                .energy_diff_threshold
                .unwrap_or(defaults.energy_diff_threshold),
            mix_fraction: p.mix_fraction.unwrap_or(defaults.mix_fraction),
        }
        .validate()
    }

    pub fn model_params(&self) -> Result<ModelParams, ScfError> {
        let boundary = match self.coulomb.boundary.as_deref() {
            Some(s) => s.parse::<CoulombBoundary>()?,
            None => CoulombBoundary::Periodic,
        };
        let band_defaults = BandMinimizerParams::default();
        let band_params = BandMinimizerParams {
            max_iterations: self
                .band_params
                .max_iterations
                .unwrap_or(band_defaults.max_iterations),
            tolerance: self.band_params.tolerance.unwrap_or(band_defaults.tolerance),
        };
        if band_params.max_iterations == 0 || !(band_params.tolerance > 0.0) {
            return Err(ScfError::InvalidConfig(
                "band_params needs max_iterations >= 1 and a positive tolerance".to_string(),
            ));
        }

        Ok(ModelParams {
            points: self.grid.points,
            length: self.grid.length,
            nuclei: self
                .nuclei
                .iter()
                .map(|n| Nucleus {
                    position: n.position,
                    charge: n.charge,
                })
                .collect(),
            n_electrons: self.electrons.count,
            spin_polarized: self.electrons.spin_polarized.unwrap_or(false),
            magnetization: self.electrons.magnetization.unwrap_or(0),
            softening: self.coulomb.softening.unwrap_or(1.0),
            boundary,
            kinetic_density: self.electrons.kinetic_density.unwrap_or(false),
            band_params,
        })
    }
}
