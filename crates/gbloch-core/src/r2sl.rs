// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Linearized Semi-Solid Relaxation (R2sl)
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Linear approximation of the generalized Bloch model during RF pulses.
//!
//! For an isolated semi-solid pool driven by a rectangular pulse the
//! generalized Bloch equation reads (time in units of T2s)
//!   zs'(t) = -ω1² ∫₀ᵗ G(t - t') zs(t') dt',  zs(0) = 1.
//! The linear model replaces the memory kernel with an exponential,
//!   xs' = -R2sl xs + ω1 zs,  zs' = -ω1 xs,
//! and R2sl is chosen so that both models leave the same `zs` at the end of
//! the pulse. The result is scale invariant: `R2sl · T2s = f(T_RF / T2s, α)`.

use crate::lineshape::greens_function;
use gbloch_math::interp::{linspace, logspace, Table2D};
use gbloch_math::linalg::expm;
use gbloch_math::quadrature::adaptive_simpson;
use gbloch_types::config::{LineshapeKind, R2slGridConfig};
use gbloch_types::error::{GblochError, GblochResult};
use ndarray::array;

/// Flip angles below this use the small-angle limit of the matching.
pub const SMALL_ANGLE: f64 = 1e-6;

const WEIGHT_REL_TOL: f64 = 1e-11;
const WEIGHT_DEPTH: usize = 40;
const BRACKET_MIN: f64 = 1e-9;
const BRACKET_MAX: f64 = 1e9;
const BISECTION_REL_TOL: f64 = 1e-12;
const BISECTION_MAX_ITER: usize = 200;
/// Axis tolerance when checking table bounds.
const TABLE_SLACK: f64 = 1e-9;

/// Product-integration weights of the memory kernel on a uniform grid.
///
/// With `zs` linear between grid points, the memory integral at `t_k` is
///   I_k = Σ_{m=1..k} (a[m-1] · z_{k-m} + b[m-1] · z_{k-m+1}).
#[derive(Debug, Clone)]
pub struct KernelWeights {
    pub tau: f64,
    pub h: f64,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl KernelWeights {
    pub fn new(kind: LineshapeKind, tau: f64, n_steps: usize) -> GblochResult<Self> {
        if !tau.is_finite() || tau <= 0.0 {
            return Err(GblochError::ConfigError(format!(
                "pulse duration in T2s units must be finite and > 0, got {tau}"
            )));
        }
        if n_steps == 0 {
            return Err(GblochError::ConfigError(
                "n_steps must be >= 1".to_string(),
            ));
        }
        let h = tau / n_steps as f64;
        let tol = WEIGHT_REL_TOL * h;
        let mut a = Vec::with_capacity(n_steps);
        let mut b = Vec::with_capacity(n_steps);
        for m in 1..=n_steps {
            let lo = (m - 1) as f64 * h;
            let hi = m as f64 * h;
            let wa = |s: f64| (s - lo) / h * greens_function(kind, s);
            let wb = |s: f64| (hi - s) / h * greens_function(kind, s);
            a.push(adaptive_simpson(&wa, lo, hi, tol, WEIGHT_DEPTH));
            b.push(adaptive_simpson(&wb, lo, hi, tol, WEIGHT_DEPTH));
        }
        Ok(KernelWeights { tau, h, a, b })
    }

    pub fn n_steps(&self) -> usize {
        self.a.len()
    }

    /// `∫₀^τ (τ - s) G(s) ds`, the second moment driving small-angle saturation.
    pub fn ramp_moment(&self) -> f64 {
        (0..self.n_steps())
            .map(|i| {
                let hi = (i + 1) as f64 * self.h;
                (self.tau - hi) * (self.a[i] + self.b[i]) + self.h * self.b[i]
            })
            .sum()
    }
}

/// Final semi-solid longitudinal magnetization of the generalized Bloch
/// model after a rectangular pulse of flip angle `alpha`.
///
/// Trapezoidal time stepping; the implicit `z_{k+1}` term enters only
/// through `b[0]` and is solved in closed form.
pub fn integrate_saturation(weights: &KernelWeights, alpha: f64) -> f64 {
    let n = weights.n_steps();
    let h = weights.h;
    let w1_sq = (alpha / weights.tau).powi(2);
    let mut z = vec![0.0; n + 1];
    z[0] = 1.0;
    let mut memory_prev = 0.0;

    for k in 0..n {
        // Memory integral at t_{k+1} without the z_{k+1} contribution
        let mut rest = 0.0;
        for m in 1..=(k + 1) {
            rest += weights.a[m - 1] * z[k + 1 - m];
        }
        for m in 2..=(k + 1) {
            rest += weights.b[m - 1] * z[k + 2 - m];
        }
        let implicit = 1.0 + 0.5 * h * w1_sq * weights.b[0];
        z[k + 1] = (z[k] - 0.5 * h * w1_sq * (memory_prev + rest)) / implicit;
        memory_prev = rest + weights.b[0] * z[k + 1];
    }
    z[n]
}

/// Generalized-Bloch saturation `zs(τ)` for pulse duration `tau = T_RF/T2s`.
pub fn gbloch_saturation(
    kind: LineshapeKind,
    tau: f64,
    alpha: f64,
    n_steps: usize,
) -> GblochResult<f64> {
    let weights = KernelWeights::new(kind, tau, n_steps)?;
    Ok(integrate_saturation(&weights, alpha))
}

/// `zs(τ)` of the linear two-state model with relaxation rate `r` (1/T2s units).
pub fn linear_saturation(r: f64, tau: f64, alpha: f64) -> GblochResult<f64> {
    let w1 = alpha / tau;
    let generator = array![[-r * tau, w1 * tau], [-w1 * tau, 0.0]];
    let e = expm(&generator)?;
    Ok(e[[1, 1]])
}

/// `∫₀^τ (τ - s) e^{-r s} ds`
fn exponential_ramp_moment(r: f64, tau: f64) -> f64 {
    let x = r * tau;
    if x < 1e-4 {
        tau * tau * (0.5 - x / 6.0 + x * x / 24.0)
    } else {
        tau / r - (1.0 - (-x).exp()) / (r * r)
    }
}

/// Bisection on `ln r` for an increasing function `g` with a sign change
/// inside `[lo, hi]`.
fn bisect_log<F: FnMut(f64) -> GblochResult<f64>>(
    mut g: F,
    mut lo: f64,
    mut hi: f64,
) -> GblochResult<f64> {
    for _ in 0..BISECTION_MAX_ITER {
        if hi - lo <= BISECTION_REL_TOL * hi {
            break;
        }
        let mid = (lo * hi).sqrt();
        if g(mid)? > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok((lo * hi).sqrt())
}

/// Small-angle R2sl: match `∫₀^τ (τ - s) G(s) ds` with the exponential kernel.
fn small_angle_match(weights: &KernelWeights) -> GblochResult<f64> {
    let tau = weights.tau;
    let target = weights.ramp_moment();
    // exponential_ramp_moment decreases in r; g increases.
    let g = |r: f64| -> GblochResult<f64> { Ok(target - exponential_ramp_moment(r, tau)) };

    let mut hi = 1.0;
    while g(hi)? <= 0.0 {
        hi *= 2.0;
        if hi > BRACKET_MAX {
            return Err(GblochError::SolverDiverged {
                iteration: 0,
                message: format!("small-angle R2sl not bracketed for tau = {tau}"),
            });
        }
    }
    let mut lo = 0.5 * hi;
    while g(lo)? > 0.0 {
        lo *= 0.5;
        if lo < BRACKET_MIN {
            return Ok(0.0);
        }
    }
    bisect_log(g, lo, hi)
}

/// R2sl (units of 1/T2s) reproducing `target = zs(τ)` with the linear model.
///
/// The bracket is grown downwards from large rates so the root found is the
/// branch connected to the weak-saturation limit.
fn match_linear_model(tau: f64, alpha: f64, target: f64) -> GblochResult<f64> {
    let g = |r: f64| -> GblochResult<f64> { Ok(linear_saturation(r, tau, alpha)? - target) };

    let mut hi = 1.0;
    while g(hi)? <= 0.0 {
        hi *= 2.0;
        if hi > BRACKET_MAX {
            return Err(GblochError::SolverDiverged {
                iteration: 0,
                message: format!(
                    "R2sl not bracketed: tau = {tau}, alpha = {alpha}, zs = {target}"
                ),
            });
        }
    }
    let mut lo = 0.5 * hi;
    while g(lo)? > 0.0 {
        lo *= 0.5;
        if lo < BRACKET_MIN {
            tracing::debug!(tau, alpha, target, "linear model cannot saturate further");
            return Ok(0.0);
        }
    }
    bisect_log(g, lo, hi)
}

fn scaled_from_weights(weights: &KernelWeights, alpha: f64) -> GblochResult<f64> {
    if alpha.abs() < SMALL_ANGLE {
        return small_angle_match(weights);
    }
    let target = integrate_saturation(weights, alpha);
    match_linear_model(weights.tau, alpha.abs(), target)
}

/// Dimensionless `R2sl · T2s` for `tau = T_RF / T2s` and flip angle `alpha`.
pub fn r2sl_scaled(
    kind: LineshapeKind,
    tau: f64,
    alpha: f64,
    n_steps: usize,
) -> GblochResult<f64> {
    if !alpha.is_finite() {
        return Err(GblochError::ConfigError(format!(
            "flip angle must be finite, got {alpha}"
        )));
    }
    let weights = KernelWeights::new(kind, tau, n_steps)?;
    scaled_from_weights(&weights, alpha)
}

/// Source of R2sl values for rectangular pulses.
pub trait R2slModel {
    /// R2sl in 1/s for pulse duration `t_rf` (s), effective flip `alpha`
    /// (rad) and semi-solid `t2s` (s).
    fn r2sl(&self, t_rf: f64, alpha: f64, t2s: f64) -> GblochResult<f64>;

    /// `(∂R2sl/∂T2s, ∂R2sl/∂alpha)` at the same point.
    fn r2sl_gradient(&self, t_rf: f64, alpha: f64, t2s: f64) -> GblochResult<(f64, f64)>;
}

/// Precomputed `R2sl · T2s` over `(ln τ, α)` with bilinear interpolation.
#[derive(Debug, Clone)]
pub struct R2slTable {
    kind: LineshapeKind,
    table: Table2D,
}

impl R2slTable {
    pub fn precompute(kind: LineshapeKind, grid: &R2slGridConfig) -> GblochResult<Self> {
        grid.validate()?;
        let taus = logspace(grid.tau_min, grid.tau_max, grid.n_tau);
        let alphas = linspace(0.0, grid.alpha_max, grid.n_alpha);

        let mut values = ndarray::Array2::zeros((taus.len(), alphas.len()));
        for (i, &tau) in taus.iter().enumerate() {
            let weights = KernelWeights::new(kind, tau, grid.n_steps)?;
            for (j, &alpha) in alphas.iter().enumerate() {
                values[[i, j]] = scaled_from_weights(&weights, alpha)?;
            }
        }
        tracing::debug!(
            lineshape = ?kind,
            n_tau = grid.n_tau,
            n_alpha = grid.n_alpha,
            "R2sl table precomputed"
        );

        let log_taus = taus.iter().map(|t| t.ln()).collect();
        let table = Table2D::new(log_taus, alphas, values)?;
        Ok(R2slTable { kind, table })
    }

    pub fn lineshape(&self) -> LineshapeKind {
        self.kind
    }

    pub fn table(&self) -> &Table2D {
        &self.table
    }

    fn check_bounds(&self, tau: f64, alpha: f64) -> GblochResult<()> {
        let (ln_lo, ln_hi) = self.table.x_range();
        let (_, alpha_max) = self.table.y_range();
        let ln_tau = tau.ln();
        if !ln_tau.is_finite() || ln_tau < ln_lo - TABLE_SLACK || ln_tau > ln_hi + TABLE_SLACK {
            return Err(GblochError::ConfigError(format!(
                "T_RF/T2s = {tau:.4} outside the R2sl table [{:.4}, {:.4}]; widen r2sl.tau_min/tau_max",
                ln_lo.exp(),
                ln_hi.exp()
            )));
        }
        if !alpha.is_finite() || alpha.abs() > alpha_max * (1.0 + TABLE_SLACK) {
            return Err(GblochError::ConfigError(format!(
                "flip angle {alpha:.4} rad outside the R2sl table (max {alpha_max:.4}); raise r2sl.alpha_max"
            )));
        }
        Ok(())
    }

    /// Interpolated `R2sl · T2s`.
    pub fn scaled(&self, tau: f64, alpha: f64) -> GblochResult<f64> {
        self.check_bounds(tau, alpha)?;
        Ok(self.table.eval(tau.ln(), alpha.abs()))
    }
}

impl R2slModel for R2slTable {
    fn r2sl(&self, t_rf: f64, alpha: f64, t2s: f64) -> GblochResult<f64> {
        Ok(self.scaled(t_rf / t2s, alpha)? / t2s)
    }

    fn r2sl_gradient(&self, t_rf: f64, alpha: f64, t2s: f64) -> GblochResult<(f64, f64)> {
        let tau = t_rf / t2s;
        let f = self.scaled(tau, alpha)?;
        let (df_dln_tau, df_dalpha) = self.table.gradient(tau.ln(), alpha.abs());
        // R = f(ln(T_RF/T2s), α) / T2s
        let d_t2s = -(f + df_dln_tau) / (t2s * t2s);
        // Even in α.
        let d_alpha = if alpha == 0.0 {
            0.0
        } else {
            alpha.signum() * df_dalpha / t2s
        };
        Ok((d_t2s, d_alpha))
    }
}

/// Closed form for the Lorentzian lineshape, whose exponential memory
/// kernel makes the linear model exact: `R2sl = 1/T2s` for every pulse.
#[derive(Debug, Clone, Copy, Default)]
pub struct LorentzianR2sl;

impl R2slModel for LorentzianR2sl {
    fn r2sl(&self, _t_rf: f64, _alpha: f64, t2s: f64) -> GblochResult<f64> {
        Ok(1.0 / t2s)
    }

    fn r2sl_gradient(&self, _t_rf: f64, _alpha: f64, t2s: f64) -> GblochResult<(f64, f64)> {
        Ok((-1.0 / (t2s * t2s), 0.0))
    }
}

/// Solves the generalized Bloch equation for every request.
///
/// Exact up to the time discretization but orders of magnitude slower than
/// the table; used as reference and for one-off evaluations.
#[derive(Debug, Clone)]
pub struct DirectR2sl {
    pub kind: LineshapeKind,
    pub n_steps: usize,
    /// Relative step of the central-difference gradient.
    pub fd_step: f64,
}

impl DirectR2sl {
    pub fn new(kind: LineshapeKind, n_steps: usize) -> Self {
        DirectR2sl {
            kind,
            n_steps,
            fd_step: 1e-4,
        }
    }
}

impl R2slModel for DirectR2sl {
    fn r2sl(&self, t_rf: f64, alpha: f64, t2s: f64) -> GblochResult<f64> {
        Ok(r2sl_scaled(self.kind, t_rf / t2s, alpha, self.n_steps)? / t2s)
    }

    fn r2sl_gradient(&self, t_rf: f64, alpha: f64, t2s: f64) -> GblochResult<(f64, f64)> {
        let dt = self.fd_step * t2s;
        let d_t2s = (self.r2sl(t_rf, alpha, t2s + dt)? - self.r2sl(t_rf, alpha, t2s - dt)?)
            / (2.0 * dt);
        let da = self.fd_step * alpha.abs().max(1e-2);
        let d_alpha =
            (self.r2sl(t_rf, alpha + da, t2s)? - self.r2sl(t_rf, alpha - da, t2s)?) / (2.0 * da);
        Ok((d_t2s, d_alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn small_grid() -> R2slGridConfig {
        R2slGridConfig {
            tau_min: 5.0,
            tau_max: 200.0,
            n_tau: 8,
            alpha_max: PI,
            n_alpha: 9,
            n_steps: 80,
        }
    }

    #[test]
    fn test_lorentzian_matches_exponential_kernel() {
        // Exponential kernel is the linear model itself: R2sl = 1/T2s.
        for &(tau, alpha) in &[(2.0, 0.5), (20.0, PI / 2.0), (100.0, PI), (50.0, 0.0)] {
            let f = r2sl_scaled(LineshapeKind::Lorentzian, tau, alpha, 200).unwrap();
            assert!((f - 1.0).abs() < 2e-3, "tau {tau}, alpha {alpha}: f = {f}");
        }
    }

    #[test]
    fn test_lorentzian_saturation_matches_linear() {
        let tau = 10.0;
        let alpha = PI / 2.0;
        let zg = gbloch_saturation(LineshapeKind::Lorentzian, tau, alpha, 200).unwrap();
        let zl = linear_saturation(1.0, tau, alpha).unwrap();
        assert!((zg - zl).abs() < 1e-4, "gBloch {zg} vs linear {zl}");
    }

    #[test]
    fn test_zero_flip_leaves_pool_untouched() {
        let z = gbloch_saturation(LineshapeKind::SuperLorentzian, 50.0, 0.0, 50).unwrap();
        assert_eq!(z, 1.0);
    }

    #[test]
    fn test_linear_saturation_limits() {
        // No damping: pure rotation
        let z = linear_saturation(0.0, 7.0, 1.1).unwrap();
        assert!((z - 1.1_f64.cos()).abs() < 1e-12);
        // Strong damping: no saturation
        let z = linear_saturation(1e6, 7.0, 1.1).unwrap();
        assert!((z - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_saturation_grows_with_flip_angle() {
        let mut prev = 1.0;
        for i in 1..6 {
            let alpha = i as f64 * 0.5;
            let z = gbloch_saturation(LineshapeKind::Gaussian, 80.0, alpha, 80).unwrap();
            assert!(z < prev, "alpha {alpha}: {z} >= {prev}");
            prev = z;
        }
    }

    #[test]
    fn test_gaussian_r2sl_positive_and_finite() {
        for &alpha in &[1e-8, 0.3, PI / 2.0, PI] {
            let f = r2sl_scaled(LineshapeKind::Gaussian, 40.0, alpha, 80).unwrap();
            assert!(f.is_finite() && f > 0.0, "alpha {alpha}: {f}");
        }
    }

    #[test]
    fn test_r2sl_reproduces_gbloch_saturation() {
        let tau = 60.0;
        let alpha = 2.0;
        let target = gbloch_saturation(LineshapeKind::SuperLorentzian, tau, alpha, 100).unwrap();
        let f = r2sl_scaled(LineshapeKind::SuperLorentzian, tau, alpha, 100).unwrap();
        let z = linear_saturation(f, tau, alpha).unwrap();
        assert!((z - target).abs() < 1e-9, "linear {z} vs gBloch {target}");
    }

    #[test]
    fn test_table_matches_direct_on_nodes() {
        let grid = small_grid();
        let table = R2slTable::precompute(LineshapeKind::Gaussian, &grid).unwrap();
        let taus = logspace(grid.tau_min, grid.tau_max, grid.n_tau);
        let alphas = linspace(0.0, grid.alpha_max, grid.n_alpha);
        let tau = taus[3];
        let alpha = alphas[4];
        let direct = r2sl_scaled(LineshapeKind::Gaussian, tau, alpha, grid.n_steps).unwrap();
        let tabled = table.scaled(tau, alpha).unwrap();
        assert!((direct - tabled).abs() < 1e-9 * direct.abs().max(1.0));
    }

    #[test]
    fn test_table_rejects_out_of_range() {
        let table = R2slTable::precompute(LineshapeKind::Lorentzian, &small_grid()).unwrap();
        assert!(table.scaled(1.0, 0.5).is_err());
        assert!(table.scaled(50.0, 4.0).is_err());
        assert!(table.scaled(50.0, 1.0).is_ok());
    }

    #[test]
    fn test_table_gradient_matches_finite_difference() {
        let table = R2slTable::precompute(LineshapeKind::Gaussian, &small_grid()).unwrap();
        let t_rf = 0.5e-3;
        let t2s = 12e-6;
        let alpha = 1.3;
        let (d_t2s, d_alpha) = table.r2sl_gradient(t_rf, alpha, t2s).unwrap();
        let h = 1e-9;
        let fd_t2s = (table.r2sl(t_rf, alpha, t2s + h).unwrap()
            - table.r2sl(t_rf, alpha, t2s - h).unwrap())
            / (2.0 * h);
        let ha = 1e-6;
        let fd_alpha = (table.r2sl(t_rf, alpha + ha, t2s).unwrap()
            - table.r2sl(t_rf, alpha - ha, t2s).unwrap())
            / (2.0 * ha);
        assert!((d_t2s - fd_t2s).abs() < 1e-5 * fd_t2s.abs(), "{d_t2s} vs {fd_t2s}");
        assert!((d_alpha - fd_alpha).abs() < 1e-5 * fd_alpha.abs().max(1.0));
    }

    #[test]
    fn test_table_alpha_gradient_is_odd() {
        let table = R2slTable::precompute(LineshapeKind::Gaussian, &small_grid()).unwrap();
        let (t_rf, t2s) = (0.5e-3, 12e-6);
        let (_, at_zero) = table.r2sl_gradient(t_rf, 0.0, t2s).unwrap();
        assert_eq!(at_zero, 0.0);
        let (_, pos) = table.r2sl_gradient(t_rf, 1.3, t2s).unwrap();
        let (_, neg) = table.r2sl_gradient(t_rf, -1.3, t2s).unwrap();
        assert!(pos != 0.0);
        assert_eq!(pos, -neg);
    }

    #[test]
    fn test_lorentzian_table_model_is_inverse_t2s() {
        let table = R2slTable::precompute(LineshapeKind::Lorentzian, &small_grid()).unwrap();
        let r = table.r2sl(0.5e-3, PI / 2.0, 12e-6).unwrap();
        let exact = LorentzianR2sl.r2sl(0.5e-3, PI / 2.0, 12e-6).unwrap();
        assert!((r / exact - 1.0).abs() < 5e-3);
    }
}
