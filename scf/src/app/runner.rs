use crate::config::Config;
use crate::model::ModelSystem;
use crate::scf_impl::{ScfDriver, ScfOutcome};
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;

/// Builds the model system described by `config` and drives it to
/// self-consistency.
pub fn run_scf(config: &Config) -> Result<(ModelSystem, ScfOutcome)> {
    let settings = config
        .scf_settings()
        .wrap_err("Invalid scf_params section")?;
    let params = config.model_params()?;

    info!("\nInitializing model system...");
    let mut system = ModelSystem::new(&params)?;

    info!(
        "SCF settings: {} mixing of {}, history {}, fraction {}, threshold {:.1e}, max {} iterations",
        settings.mixing_method,
        settings.mixed_quantity,
        settings.history,
        settings.mix_fraction,
        settings.energy_diff_threshold,
        settings.n_iterations
    );
    let mut driver = ScfDriver::new(settings)?;

    info!("\nStarting SCF cycle...\n");
    let outcome = driver.run(&mut system)?;
    Ok((system, outcome))
}
