//! Command-line argument parsing for SCF calculations

use clap::Parser;

/// Self-consistent field run of a 1D Kohn–Sham model, configured by YAML
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override mixing method (plain or diis)
    #[arg(long)]
    pub mixing_method: Option<String>,

    /// Override mixed variable (density or potential)
    #[arg(long)]
    pub mixed_variable: Option<String>,

    /// Override mixing history size
    #[arg(long)]
    pub history: Option<usize>,

    /// Override maximum SCF iterations
    #[arg(long)]
    pub n_iterations: Option<usize>,

    /// Override total-energy convergence threshold
    #[arg(long)]
    pub energy_diff_threshold: Option<f64>,

    /// Override plain mixing fraction
    #[arg(long)]
    pub mix_fraction: Option<f64>,

    /// Write the converged density profile to this file
    #[arg(long)]
    pub density_out: Option<String>,
}
