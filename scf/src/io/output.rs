//! Output formatting and logging utilities

use crate::model::ModelSystem;
use color_eyre::eyre::Result;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::sync::Mutex;
use std::time::SystemTime as StdSystemTime;
use tracing::info;
use tracing_subscriber::{
    filter::LevelFilter, fmt::format::Writer, fmt::layer, fmt::time::FormatTime,
    layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

/// Custom time formatter that shows only seconds
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let total_seconds = StdSystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;

        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Setup output logging to file or stdout.
///
/// Band-solver chatter is emitted at `trace` and stays hidden at the
/// default `info` level.
pub fn setup_output(output_path: Option<&String>) {
    match output_path {
        Some(path) => match File::create(path) {
            Ok(log) => {
                let file_layer = layer()
                    .with_writer(Mutex::new(log))
                    .with_timer(SecondPrecisionTimer)
                    .with_ansi(false)
                    .with_filter(LevelFilter::INFO);
                Registry::default().with(file_layer).init();
                info!("Output will be written to: {}", path);
            }
            Err(err) => eprintln!("Could not create output file {}: {}", path, err),
        },
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true)
                .with_filter(LevelFilter::INFO);
            Registry::default().with(stdout_layer).init();
            info!("Output will be printed to stdout");
        }
    }
}

/// Columns: index, x, n_s for every spin channel, and the total density
pub fn write_density_profile<W: Write>(writer: &mut W, system: &ModelSystem) -> Result<()> {
    let grid = system.grid();
    let density = &system.density().primary;

    write!(writer, "# {:>4} {:>12}", "i", "x")?;
    for s in 0..density.n_channels() {
        write!(writer, " {:>16}", format!("n_{}", s))?;
    }
    writeln!(writer, " {:>16}", "n_total")?;

    for i in 0..grid.points() {
        write!(writer, "{:>6} {:>12.6}", i, grid.coordinate(i))?;
        let mut total = 0.0;
        for channel in density.channels() {
            write!(writer, " {:>16.10e}", channel[i])?;
            total += channel[i];
        }
        writeln!(writer, " {:>16.10e}", total)?;
    }
    Ok(())
}
