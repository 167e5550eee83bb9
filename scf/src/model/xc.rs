//! Local exchange for the model system (Slater exchange only).
//!
//! Energy density:  e_x(ρ) = c_x ρ^(4/3),  c_x = -(3/4) (3/π)^(1/3)
//! Potential:       v_x(ρ) = -(3/π)^(1/3) ρ^(1/3)
//!
//! Spin-polarized densities use exact spin scaling,
//! E_x[n↑, n↓] = ½ (E_x[2n↑] + E_x[2n↓]).

use std::f64::consts::PI;

pub(crate) fn lda_x_energy_density(rho: f64) -> f64 {
    if rho <= 0.0 {
        return 0.0;
    }
    let cx = -0.75 * (3.0 / PI).powf(1.0 / 3.0);
    cx * rho.powf(4.0 / 3.0)
}

pub(crate) fn lda_x_potential(rho: f64) -> f64 {
    if rho <= 0.0 {
        return 0.0;
    }
    -(3.0 / PI).powf(1.0 / 3.0) * rho.powf(1.0 / 3.0)
}

/// Exchange functional with an optional kinetic-energy-density dependence
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Exchange {
    spin_polarized: bool,
    kinetic_density: bool,
}

impl Exchange {
    pub fn new(spin_polarized: bool, kinetic_density: bool) -> Self {
        Exchange {
            spin_polarized,
            kinetic_density,
        }
    }

    /// Whether τ must be tracked (and mixed) alongside the density
    pub fn needs_kinetic_density(&self) -> bool {
        self.kinetic_density
    }

    /// Energy density of channel density `n_s`
    pub fn energy_density(&self, n_s: f64) -> f64 {
        if self.spin_polarized {
            0.5 * lda_x_energy_density(2.0 * n_s)
        } else {
            lda_x_energy_density(n_s)
        }
    }

    /// ∂e/∂n_s
    pub fn potential(&self, n_s: f64) -> f64 {
        if self.spin_polarized {
            lda_x_potential(2.0 * n_s)
        } else {
            lda_x_potential(n_s)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_potential_is_energy_derivative() {
        for &polarized in &[false, true] {
            let xc = Exchange::new(polarized, false);
            let n = 0.37;
            let h = 1e-6;
            let fd = (xc.energy_density(n + h) - xc.energy_density(n - h)) / (2.0 * h);
            assert_relative_eq!(xc.potential(n), fd, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_spin_scaling_matches_unpolarized() {
        let unpol = Exchange::new(false, false);
        let pol = Exchange::new(true, false);
        let n = 0.8;
        // equal spin channels of n/2 reproduce the unpolarized energy
        assert_relative_eq!(2.0 * pol.energy_density(0.5 * n), unpol.energy_density(n), epsilon = 1e-12);
    }

    #[test]
    fn test_vanishes_for_non_positive_density() {
        assert_eq!(lda_x_energy_density(-0.1), 0.0);
        assert_eq!(lda_x_potential(0.0), 0.0);
    }
}
