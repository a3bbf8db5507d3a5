// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Two-Pool Hamiltonian
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Generators of the linearized generalized-Bloch equations.
//!
//! `dm/dt = H m` for the homogeneous state `m = [xf, yf, zf, xs, zs, 1]`.
//! The RF field rotates about y with nominal `omega1` scaled by `B1`;
//! `r2s` is the semi-solid transverse rate (R2sl during pulses).

use gbloch_types::constants::{IDX_ONE, IDX_XF, IDX_XS, IDX_YF, IDX_ZF, IDX_ZS, N_STATE};
use gbloch_types::state::{Param, TissueParams};
use ndarray::Array2;

/// 6x6 generator for nominal RF amplitude `omega1` (rad/s).
pub fn hamiltonian(omega1: f64, r2s: f64, p: &TissueParams) -> Array2<f64> {
    let m0f = p.m0f();
    let w1 = p.b1 * omega1;
    let mut h = Array2::zeros((N_STATE, N_STATE));

    h[[IDX_XF, IDX_XF]] = -p.r2f;
    h[[IDX_XF, IDX_YF]] = -p.omega0;
    h[[IDX_XF, IDX_ZF]] = w1;

    h[[IDX_YF, IDX_XF]] = p.omega0;
    h[[IDX_YF, IDX_YF]] = -p.r2f;

    h[[IDX_ZF, IDX_XF]] = -w1;
    h[[IDX_ZF, IDX_ZF]] = -p.r1f - p.rx * p.m0s;
    h[[IDX_ZF, IDX_ZS]] = p.rx * m0f;
    h[[IDX_ZF, IDX_ONE]] = m0f * p.r1f;

    h[[IDX_XS, IDX_XS]] = -r2s;
    h[[IDX_XS, IDX_ZS]] = w1;

    h[[IDX_ZS, IDX_ZF]] = p.rx * p.m0s;
    h[[IDX_ZS, IDX_XS]] = -w1;
    h[[IDX_ZS, IDX_ZS]] = -p.r1s - p.rx * m0f;
    h[[IDX_ZS, IDX_ONE]] = p.m0s * p.r1s;

    h
}

/// Element-wise `∂H/∂param`.
///
/// `dr2s` is the derivative of the semi-solid rate with respect to the same
/// parameter; only `T2s` and `B1` give it a non-zero value.
pub fn hamiltonian_derivative(
    omega1: f64,
    dr2s: f64,
    p: &TissueParams,
    param: Param,
) -> Array2<f64> {
    let m0f = p.m0f();
    let mut d = Array2::zeros((N_STATE, N_STATE));

    match param {
        Param::M0 => {}
        Param::M0s => {
            d[[IDX_ZF, IDX_ZF]] = -p.rx;
            d[[IDX_ZF, IDX_ZS]] = -p.rx;
            d[[IDX_ZF, IDX_ONE]] = -p.r1f;
            d[[IDX_ZS, IDX_ZF]] = p.rx;
            d[[IDX_ZS, IDX_ZS]] = p.rx;
            d[[IDX_ZS, IDX_ONE]] = p.r1s;
        }
        Param::R1f => {
            d[[IDX_ZF, IDX_ZF]] = -1.0;
            d[[IDX_ZF, IDX_ONE]] = m0f;
        }
        Param::R1s => {
            d[[IDX_ZS, IDX_ZS]] = -1.0;
            d[[IDX_ZS, IDX_ONE]] = p.m0s;
        }
        Param::R1 => {
            d[[IDX_ZF, IDX_ZF]] = -1.0;
            d[[IDX_ZF, IDX_ONE]] = m0f;
            d[[IDX_ZS, IDX_ZS]] = -1.0;
            d[[IDX_ZS, IDX_ONE]] = p.m0s;
        }
        Param::R2f => {
            d[[IDX_XF, IDX_XF]] = -1.0;
            d[[IDX_YF, IDX_YF]] = -1.0;
        }
        Param::Rx => {
            d[[IDX_ZF, IDX_ZF]] = -p.m0s;
            d[[IDX_ZF, IDX_ZS]] = m0f;
            d[[IDX_ZS, IDX_ZF]] = p.m0s;
            d[[IDX_ZS, IDX_ZS]] = -m0f;
        }
        Param::T2s => {
            d[[IDX_XS, IDX_XS]] = -dr2s;
        }
        Param::Omega0 => {
            d[[IDX_XF, IDX_YF]] = -1.0;
            d[[IDX_YF, IDX_XF]] = 1.0;
        }
        Param::B1 => {
            d[[IDX_XF, IDX_ZF]] = omega1;
            d[[IDX_ZF, IDX_XF]] = -omega1;
            d[[IDX_XS, IDX_ZS]] = omega1;
            d[[IDX_ZS, IDX_XS]] = -omega1;
            d[[IDX_XS, IDX_XS]] = -dr2s;
        }
    }
    d
}
