mod report;
mod runner;

pub use runner::run_scf;

use self::report::report_summary;
use crate::config::{Args, Config};
use crate::io::{setup_output, write_density_profile};
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use tracing::info;

pub struct ScfApplication {
    args: Args,
    config: Config,
}

impl ScfApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let mut config = load_config(&args)?;
        config.apply_overrides(&args);
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref());
        info!("Configuration loaded from {}:\n{:?}", self.args.config_file, self.config);

        let (system, outcome) = run_scf(&self.config)?;
        report_summary(&system, &outcome);

        if let Some(path) = self.args.density_out.as_ref() {
            let file = File::create(path)
                .wrap_err_with(|| format!("Unable to create density output file: {}", path))?;
            let mut writer = BufWriter::new(file);
            write_density_profile(&mut writer, &system)?;
            writer.flush()?;
            info!("Density profile written to {}", path);
        }

        Ok(())
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", args.config_file))?;

    let config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("Failed to parse configuration file")?
        .with_defaults();

    Ok(config)
}
