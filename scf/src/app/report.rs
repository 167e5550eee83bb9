use crate::model::ModelSystem;
use crate::scf_impl::{ScfOutcome, ScfStatus};
use tracing::{info, warn};

pub fn report_summary(system: &ModelSystem, outcome: &ScfOutcome) {
    match outcome.status() {
        ScfStatus::Converged => info!(
            "\nSCF calculation converged after {} iterations.",
            outcome.iterations()
        ),
        ScfStatus::MaxIterReached => warn!(
            "\nSCF calculation stopped at the iteration limit ({} iterations, last dE = {:.3e}).",
            outcome.iterations(),
            outcome.delta_energy()
        ),
        ScfStatus::Cancelled => warn!(
            "\nSCF calculation cancelled after {} iterations.",
            outcome.iterations()
        ),
        ScfStatus::Iterating => {}
    }

    info!("\nFinal Energy Levels:");
    let labels = ["up", "down"];
    for q in 0..system.n_spin() {
        if system.n_spin() > 1 {
            info!("  Spin {}:", labels[q]);
        }
        let occupations = system.occupations(q);
        for (i, energy) in system.eigenvalues(q).iter().enumerate() {
            info!(
                "    Level {}: {:.8} au (occupation {:.1})",
                i + 1,
                energy,
                occupations[i]
            );
        }
    }

    info!("\nEnergy components:\n{}", outcome.energies);
    info!("Electron count: {:.8}", system.electron_count());
    info!("Initial guess energy: {:.10} au", outcome.initial_energy);
    info!("\nTotal energy: {:.10} au", outcome.energy());
}
