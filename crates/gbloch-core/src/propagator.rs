// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Segment Propagators
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Affine propagators of single sequence segments.
//!
//! Plain propagators are 6x6 and act on `[xf, yf, zf, xs, zs, 1]`. The
//! derivative variants are 11x11 and act on `[m, ∂m/∂p, 1]`; they are the
//! exponential of the block-triangular generator
//!
//! ```text
//! [ H   0   h  ]
//! [ dH  H   dh ]
//! [ 0   0   0  ]
//! ```
//!
//! where `H`/`dH` are the 5x5 linear parts and `h`/`dh` the relaxation
//! columns, so one exponential yields the propagator and its derivative.

use crate::hamiltonian::{hamiltonian, hamiltonian_derivative};
use crate::r2sl::R2slModel;
use gbloch_math::linalg::expm;
use gbloch_types::constants::{IDX_ONE, IDX_XF, IDX_XS, IDX_YF, N_AUGMENTED, N_PHYS, N_STATE};
use gbloch_types::error::{GblochError, GblochResult};
use gbloch_types::state::{Param, TissueParams};
use ndarray::{s, Array2};

fn check_duration(t: f64, what: &str) -> GblochResult<()> {
    if !t.is_finite() || t < 0.0 {
        return Err(GblochError::Sequence(format!(
            "{what} duration must be finite and >= 0, got {t}"
        )));
    }
    Ok(())
}

fn check_pulse(alpha: f64, t_rf: f64) -> GblochResult<()> {
    if !alpha.is_finite() {
        return Err(GblochError::Sequence(format!(
            "flip angle must be finite, got {alpha}"
        )));
    }
    if !t_rf.is_finite() || t_rf <= 0.0 {
        return Err(GblochError::Sequence(format!(
            "pulse duration must be finite and > 0, got {t_rf}"
        )));
    }
    Ok(())
}

/// 11x11 derivative generator from a 6x6 generator and its derivative.
pub fn augment(h: &Array2<f64>, dh: &Array2<f64>) -> Array2<f64> {
    let n = N_PHYS;
    let last = N_AUGMENTED - 1;
    let mut a = Array2::zeros((N_AUGMENTED, N_AUGMENTED));

    a.slice_mut(s![..n, ..n]).assign(&h.slice(s![..n, ..n]));
    a.slice_mut(s![..n, last]).assign(&h.slice(s![..n, IDX_ONE]));
    a.slice_mut(s![n..2 * n, ..n]).assign(&dh.slice(s![..n, ..n]));
    a.slice_mut(s![n..2 * n, n..2 * n]).assign(&h.slice(s![..n, ..n]));
    a.slice_mut(s![n..2 * n, last]).assign(&dh.slice(s![..n, IDX_ONE]));
    a
}

/// Relaxation and exchange without RF: `exp(H(0, 1/T2s) t)`.
pub fn free_precession(t: f64, p: &TissueParams) -> GblochResult<Array2<f64>> {
    check_duration(t, "free precession")?;
    let h = hamiltonian(0.0, 1.0 / p.t2s, p);
    expm(&(h * t))
}

pub fn free_precession_with_derivative(
    t: f64,
    p: &TissueParams,
    param: Param,
) -> GblochResult<Array2<f64>> {
    check_duration(t, "free precession")?;
    let h = hamiltonian(0.0, 1.0 / p.t2s, p);
    let dr2s = match param {
        Param::T2s => -1.0 / (p.t2s * p.t2s),
        _ => 0.0,
    };
    let dh = hamiltonian_derivative(0.0, dr2s, p, param);
    expm(&(augment(&h, &dh) * t))
}

/// Rectangular pulse of nominal flip `alpha` and duration `t_rf`.
///
/// The semi-solid pool relaxes with R2sl evaluated at the effective flip
/// angle `B1 · alpha`.
pub fn rf_pulse<M: R2slModel + ?Sized>(
    alpha: f64,
    t_rf: f64,
    p: &TissueParams,
    r2sl: &M,
) -> GblochResult<Array2<f64>> {
    check_pulse(alpha, t_rf)?;
    let r2s = r2sl.r2sl(t_rf, p.b1 * alpha, p.t2s)?;
    let h = hamiltonian(alpha / t_rf, r2s, p);
    expm(&(h * t_rf))
}

pub fn rf_pulse_with_derivative<M: R2slModel + ?Sized>(
    alpha: f64,
    t_rf: f64,
    p: &TissueParams,
    r2sl: &M,
    param: Param,
) -> GblochResult<Array2<f64>> {
    check_pulse(alpha, t_rf)?;
    let omega1 = alpha / t_rf;
    let alpha_eff = p.b1 * alpha;
    let r2s = r2sl.r2sl(t_rf, alpha_eff, p.t2s)?;
    let dr2s = match param {
        Param::T2s => r2sl.r2sl_gradient(t_rf, alpha_eff, p.t2s)?.0,
        // ∂(B1 α)/∂B1 = α
        Param::B1 => r2sl.r2sl_gradient(t_rf, alpha_eff, p.t2s)?.1 * alpha,
        _ => 0.0,
    };
    let h = hamiltonian(omega1, r2s, p);
    let dh = hamiltonian_derivative(omega1, dr2s, p, param);
    expm(&(augment(&h, &dh) * t_rf))
}

/// Ideal crusher: destroys all transverse magnetization.
pub fn spoiler() -> Array2<f64> {
    let mut d = Array2::eye(N_STATE);
    for i in [IDX_XF, IDX_YF, IDX_XS] {
        d[[i, i]] = 0.0;
    }
    d
}

/// Spoiler acting on the derivative-augmented state.
pub fn spoiler_augmented() -> Array2<f64> {
    let mut d = Array2::eye(N_AUGMENTED);
    for i in [IDX_XF, IDX_YF, IDX_XS] {
        d[[i, i]] = 0.0;
        d[[i + N_PHYS, i + N_PHYS]] = 0.0;
    }
    d
}
