// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Nonlinear Least Squares
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Levenberg-Marquardt fitting with box constraints.
//!
//! Each iteration solves `(JᵀJ + λ diag(JᵀJ) + τ I) δ = -Jᵀr`, with the
//! Tikhonov weight `τ` taken relative to the largest diagonal of `JᵀJ`.
//! A step is accepted
//! when the cost does not increase; otherwise λ grows and the step shrinks.
//! Trial points are clamped to the model's bounds.

use gbloch_math::linalg::lu_solve;
use gbloch_types::config::FitConfig;
use gbloch_types::error::{GblochError, GblochResult};
use ndarray::{Array1, Array2};
use serde::Serialize;

const MAX_DAMPING_STEPS: usize = 12;
const LAMBDA_DOWN: f64 = 0.3;
const LAMBDA_UP: f64 = 10.0;
const LAMBDA_MIN: f64 = 1e-15;
/// Relative floor on the Marquardt scaling of near-zero diagonal entries.
const DIAG_FLOOR: f64 = 1e-12;

/// A forward model `x -> prediction` for least-squares fitting.
pub trait FitModel {
    fn n_params(&self) -> usize;

    fn predict(&self, x: &[f64]) -> GblochResult<Array1<f64>>;

    /// `∂prediction/∂x`; central differences unless overridden.
    fn jacobian(&self, x: &[f64], fd_step: f64) -> GblochResult<Array2<f64>> {
        fd_jacobian(self, x, fd_step)
    }

    /// Inclusive `(lower, upper)` per parameter.
    fn bounds(&self) -> Vec<(f64, f64)> {
        vec![(f64::NEG_INFINITY, f64::INFINITY); self.n_params()]
    }
}

/// Central-difference Jacobian with relative step.
pub fn fd_jacobian<F: FitModel + ?Sized>(
    model: &F,
    x: &[f64],
    step: f64,
) -> GblochResult<Array2<f64>> {
    let mut cols = Vec::with_capacity(x.len());
    for k in 0..x.len() {
        let h = if x[k] != 0.0 { step * x[k].abs() } else { step };
        let mut up = x.to_vec();
        let mut dn = x.to_vec();
        up[k] += h;
        dn[k] -= h;
        cols.push((model.predict(&up)? - model.predict(&dn)?) / (2.0 * h));
    }
    let rows = cols.first().map(|c| c.len()).unwrap_or(0);
    let mut jac = Array2::zeros((rows, x.len()));
    for (k, col) in cols.iter().enumerate() {
        jac.column_mut(k).assign(col);
    }
    Ok(jac)
}

#[derive(Debug, Clone, Serialize)]
pub struct FitResult {
    pub params: Vec<f64>,
    pub converged: bool,
    pub iterations: usize,
    /// Root-mean-square residual at `params`.
    pub residual: f64,
    pub residual_history: Vec<f64>,
}

fn clamp_to(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (v, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *v = v.clamp(lo, hi);
    }
}

fn sum_sq(pred: &Array1<f64>, data: &Array1<f64>) -> f64 {
    pred.iter().zip(data.iter()).map(|(p, d)| (p - d).powi(2)).sum()
}

fn validate_problem(
    n_params: usize,
    data: &[f64],
    x0: &[f64],
    bounds: &[(f64, f64)],
) -> GblochResult<()> {
    if x0.len() != n_params || bounds.len() != n_params {
        return Err(GblochError::ConfigError(format!(
            "fit expects {n_params} parameters, got x0 = {} and bounds = {}",
            x0.len(),
            bounds.len()
        )));
    }
    if data.len() < n_params {
        return Err(GblochError::ConfigError(format!(
            "fit is underdetermined: {} data points for {n_params} parameters",
            data.len()
        )));
    }
    if x0.iter().chain(data).any(|v| !v.is_finite()) {
        return Err(GblochError::ConfigError(
            "fit data and start point must be finite".to_string(),
        ));
    }
    if bounds.iter().any(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi) {
        return Err(GblochError::ConfigError(
            "fit bounds must satisfy lower <= upper".to_string(),
        ));
    }
    Ok(())
}

/// Fit `model` to `data` starting from `x0`.
///
/// Stops when the RMS residual drops below `config.tolerance`, when the
/// relative cost decrease or the relative step falls below it, or when no
/// damped step reduces the cost.
pub fn levenberg_marquardt<F: FitModel + ?Sized>(
    model: &F,
    data: &[f64],
    x0: &[f64],
    config: &FitConfig,
) -> GblochResult<FitResult> {
    config.validate()?;
    let n = model.n_params();
    let bounds = model.bounds();
    validate_problem(n, data, x0, &bounds)?;
    let data = Array1::from(data.to_vec());
    let m = data.len() as f64;
    let step_tol = config.tolerance.sqrt();

    let mut x = x0.to_vec();
    clamp_to(&mut x, &bounds);
    let mut pred = model.predict(&x)?;
    if pred.len() != data.len() {
        return Err(GblochError::ConfigError(format!(
            "model predicts {} values for {} data points",
            pred.len(),
            data.len()
        )));
    }
    let mut cost = sum_sq(&pred, &data);
    let mut lambda = config.lambda;
    let mut residual_history = Vec::with_capacity(config.max_iterations + 1);
    residual_history.push((cost / m).sqrt());
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;
        if (cost / m).sqrt() < config.tolerance {
            converged = true;
            break;
        }

        let jac = model.jacobian(&x, config.fd_step)?;
        let r = &pred - &data;
        let jtj = jac.t().dot(&jac);
        let rhs = jac.t().dot(&r).mapv(|v| -v);
        let diag_max = (0..n).fold(0.0_f64, |acc, k| acc.max(jtj[[k, k]]));
        if diag_max == 0.0 {
            return Err(GblochError::LinAlg(
                "fit Jacobian is identically zero".to_string(),
            ));
        }

        let ridge = config.tikhonov * diag_max;

        let mut accepted = false;
        let mut stalled = false;
        for _ in 0..MAX_DAMPING_STEPS {
            let mut a = jtj.clone();
            for k in 0..n {
                a[[k, k]] += lambda * jtj[[k, k]].max(DIAG_FLOOR * diag_max) + ridge;
            }
            let delta = match lu_solve(&a, &rhs) {
                Ok(d) => d,
                Err(_) => {
                    lambda *= LAMBDA_UP;
                    continue;
                }
            };

            let rel_step = delta
                .iter()
                .zip(&x)
                .fold(0.0_f64, |acc, (d, v)| acc.max(d.abs() / (v.abs() + step_tol)));
            if rel_step < step_tol {
                stalled = true;
                break;
            }

            let mut trial: Vec<f64> = x.iter().zip(delta.iter()).map(|(v, d)| v + d).collect();
            clamp_to(&mut trial, &bounds);
            let trial_pred = match model.predict(&trial) {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(iteration = iter, error = %e, "trial point rejected");
                    lambda *= LAMBDA_UP;
                    continue;
                }
            };
            let trial_cost = sum_sq(&trial_pred, &data);
            if trial_cost <= cost {
                let decrease = cost - trial_cost;
                x = trial;
                pred = trial_pred;
                let old_cost = cost;
                cost = trial_cost;
                lambda = (lambda * LAMBDA_DOWN).max(LAMBDA_MIN);
                accepted = true;
                if decrease <= config.tolerance * old_cost {
                    stalled = true;
                }
                break;
            }
            lambda *= LAMBDA_UP;
        }

        if accepted {
            residual_history.push((cost / m).sqrt());
        }
        tracing::debug!(
            iteration = iter,
            rms = (cost / m).sqrt(),
            lambda,
            accepted,
            "levenberg-marquardt step"
        );
        if stalled {
            converged = true;
            break;
        }
        if !accepted {
            break;
        }
    }

    Ok(FitResult {
        params: x,
        converged,
        iterations,
        residual: (cost / m).sqrt(),
        residual_history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = a · exp(-b t) + c
    struct Exponential {
        t: Vec<f64>,
    }

    impl FitModel for Exponential {
        fn n_params(&self) -> usize {
            3
        }

        fn predict(&self, x: &[f64]) -> GblochResult<Array1<f64>> {
            Ok(self.t.iter().map(|&t| x[0] * (-x[1] * t).exp() + x[2]).collect())
        }

        fn bounds(&self) -> Vec<(f64, f64)> {
            vec![(0.0, 10.0), (0.0, 100.0), (-1.0, 1.0)]
        }
    }

    fn model() -> Exponential {
        Exponential {
            t: (0..12).map(|i| i as f64 * 0.25).collect(),
        }
    }

    #[test]
    fn test_recovers_exact_parameters() {
        let m = model();
        let truth = [2.0, 1.3, 0.1];
        let data = m.predict(&truth).unwrap().to_vec();
        let fit = levenberg_marquardt(&m, &data, &[1.0, 0.5, 0.0], &FitConfig::default()).unwrap();
        assert!(fit.converged, "{fit:?}");
        for (a, b) in fit.params.iter().zip(truth.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
        assert!(fit.residual < 1e-8);
    }

    #[test]
    fn test_residual_history_non_increasing() {
        let m = model();
        let data = m.predict(&[1.5, 2.0, -0.2]).unwrap().to_vec();
        let fit = levenberg_marquardt(&m, &data, &[0.5, 0.2, 0.3], &FitConfig::default()).unwrap();
        for w in fit.residual_history.windows(2) {
            assert!(w[1] <= w[0] + 1e-15);
        }
    }

    #[test]
    fn test_bounds_are_respected() {
        let m = model();
        // Best fit wants c = 2, outside its bound.
        let data = m.predict(&[1.0, 1.0, 2.0]).unwrap().to_vec();
        let fit = levenberg_marquardt(&m, &data, &[1.0, 1.0, 0.0], &FitConfig::default()).unwrap();
        assert!(fit.params[2] <= 1.0);
        assert!(fit.residual > 0.0);
    }

    #[test]
    fn test_fd_jacobian_matches_analytic() {
        let m = model();
        let x = [1.7, 0.8, 0.05];
        let j = fd_jacobian(&m, &x, 1e-6).unwrap();
        for (i, &t) in m.t.iter().enumerate() {
            let e = (-x[1] * t).exp();
            assert!((j[[i, 0]] - e).abs() < 1e-8);
            assert!((j[[i, 1]] + x[0] * t * e).abs() < 1e-7);
            assert!((j[[i, 2]] - 1.0).abs() < 1e-8);
        }
    }

    /// y = (a + b) · t, so only the sum is identifiable.
    struct Degenerate;

    impl FitModel for Degenerate {
        fn n_params(&self) -> usize {
            2
        }

        fn predict(&self, x: &[f64]) -> GblochResult<Array1<f64>> {
            Ok((1..=5).map(|t| (x[0] + x[1]) * t as f64).collect())
        }
    }

    #[test]
    fn test_tikhonov_handles_rank_deficiency() {
        let data = Degenerate.predict(&[1.0, 2.0]).unwrap().to_vec();
        let cfg = FitConfig {
            lambda: 1e-15,
            tikhonov: 1e-6,
            ..FitConfig::default()
        };
        let fit = levenberg_marquardt(&Degenerate, &data, &[0.5, 0.5], &cfg).unwrap();
        assert!(fit.converged, "{fit:?}");
        assert!((fit.params[0] + fit.params[1] - 3.0).abs() < 1e-8);
        // The unidentified direction takes no step.
        assert!((fit.params[0] - fit.params[1]).abs() < 1e-6);
        assert!(fit.residual < 1e-8);
    }

    #[test]
    fn test_rejects_bad_problems() {
        let m = model();
        let cfg = FitConfig::default();
        assert!(levenberg_marquardt(&m, &[1.0, 2.0], &[1.0, 1.0, 0.0], &cfg).is_err());
        assert!(levenberg_marquardt(&m, &[1.0; 12], &[1.0, 1.0], &cfg).is_err());
        assert!(levenberg_marquardt(&m, &[f64::NAN; 12], &[1.0, 1.0, 0.0], &cfg).is_err());
    }
}
