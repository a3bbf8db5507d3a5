// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Semi-Solid Lineshapes
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Green's functions of the semi-solid spin pool.
//!
//! `G(kappa)` is the time-domain response of the lineshape with
//! `kappa = t / T2s`. All three shapes satisfy `G(0) = 1`. The
//! super-Lorentzian integrates the Gaussian response over all orientations
//! of the dipolar coupling relative to B0:
//!   G(kappa) = ∫₀¹ exp(-kappa² (3u² - 1)² / 8) du

use gbloch_math::quadrature::adaptive_simpson;
use gbloch_types::config::LineshapeKind;
use gbloch_types::constants::MAGIC_ANGLE;

const SUPER_LORENTZIAN_TOL: f64 = 1e-13;
const SUPER_LORENTZIAN_DEPTH: usize = 48;

/// Green's function of the given lineshape at `kappa = t / T2s`.
pub fn greens_function(kind: LineshapeKind, kappa: f64) -> f64 {
    match kind {
        LineshapeKind::Lorentzian => (-kappa.abs()).exp(),
        LineshapeKind::Gaussian => (-0.5 * kappa * kappa).exp(),
        LineshapeKind::SuperLorentzian => super_lorentzian_greens(kappa),
    }
}

fn super_lorentzian_greens(kappa: f64) -> f64 {
    if kappa == 0.0 {
        return 1.0;
    }
    let k2 = kappa * kappa / 8.0;
    let integrand = |u: f64| {
        let p2 = 3.0 * u * u - 1.0;
        (-k2 * p2 * p2).exp()
    };
    // The integrand peaks at the magic angle; splitting there keeps the
    // peak on a panel boundary where adaptive Simpson always samples it.
    let u0 = MAGIC_ANGLE.cos();
    adaptive_simpson(&integrand, 0.0, u0, SUPER_LORENTZIAN_TOL, SUPER_LORENTZIAN_DEPTH)
        + adaptive_simpson(&integrand, u0, 1.0, SUPER_LORENTZIAN_TOL, SUPER_LORENTZIAN_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LineshapeKind; 3] = [
        LineshapeKind::Lorentzian,
        LineshapeKind::Gaussian,
        LineshapeKind::SuperLorentzian,
    ];

    #[test]
    fn test_unit_at_origin() {
        for kind in ALL {
            assert!((greens_function(kind, 0.0) - 1.0).abs() < 1e-14, "{kind:?}");
        }
    }

    #[test]
    fn test_even_and_decaying() {
        for kind in ALL {
            let mut prev = 1.0;
            for i in 1..40 {
                let k = i as f64 * 0.5;
                let g = greens_function(kind, k);
                assert!(g <= prev + 1e-14, "{kind:?} not monotone at {k}");
                assert!((g - greens_function(kind, -k)).abs() < 1e-14);
                prev = g;
            }
        }
    }

    #[test]
    fn test_super_lorentzian_small_kappa() {
        // G ≈ 1 - kappa²/8 ∫(3u²-1)² du = 1 - kappa²/10
        let k = 1e-2;
        let g = greens_function(LineshapeKind::SuperLorentzian, k);
        assert!((g - (1.0 - k * k / 10.0)).abs() < 1e-9);
    }

    #[test]
    fn test_super_lorentzian_long_tail() {
        // Stationary-phase limit: G ≈ sqrt(2π/3) / kappa
        let k = 200.0;
        let g = greens_function(LineshapeKind::SuperLorentzian, k);
        let asymptote = (2.0 * std::f64::consts::PI / 3.0).sqrt() / k;
        assert!((g - asymptote).abs() / asymptote < 1e-2, "g = {g}");
        // Much heavier tail than the Gaussian and Lorentzian
        assert!(g > greens_function(LineshapeKind::Lorentzian, k));
    }
}
