// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Magic angle, cos^2(theta) = 1/3 (rad)
pub const MAGIC_ANGLE: f64 = 0.955_316_618_124_509_3;

/// Length of the homogeneous magnetization vector [xf, yf, zf, xs, zs, 1]
pub const N_STATE: usize = 6;

/// Number of physical components (homogeneous 1 excluded)
pub const N_PHYS: usize = N_STATE - 1;

/// Length of the derivative-augmented vector [m, dm/dp, 1]
pub const N_AUGMENTED: usize = 2 * N_PHYS + 1;

pub const IDX_XF: usize = 0;
pub const IDX_YF: usize = 1;
pub const IDX_ZF: usize = 2;
pub const IDX_XS: usize = 3;
pub const IDX_ZS: usize = 4;
pub const IDX_ONE: usize = 5;

/// Semi-solid saturation by a 1 ms hard inversion pulse in white matter,
/// used as the fixed Ss of the conventional SIR model.
pub const SIR_SS_DEFAULT: f64 = 0.83;
