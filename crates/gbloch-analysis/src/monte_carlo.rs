// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Monte-Carlo Precision Check
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Empirical estimator variance next to the Cramér-Rao bound.
//!
//! Gaussian noise is added to noise-free gBloch signals and the gBloch
//! model is refitted with its analytic Jacobian. For an efficient,
//! unbiased estimator the variance ratio approaches 1.

use crate::crb::protocol_crb;
use crate::fit::{levenberg_marquardt, FitModel};
use crate::model::GblochModel;
use crate::protocol::Protocol;
use gbloch_core::r2sl::R2slModel;
use gbloch_types::config::{FitConfig, NoiseConfig};
use gbloch_types::error::{GblochError, GblochResult};
use gbloch_types::state::{Param, TissueParams};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloEntry {
    pub param: Param,
    pub truth: f64,
    pub mean: f64,
    /// Unbiased sample variance.
    pub variance: f64,
    pub bias: f64,
    pub crb: f64,
    /// `variance / crb`.
    pub variance_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloReport {
    pub protocol: String,
    pub sigma: f64,
    pub seed: u64,
    pub n_trials: usize,
    /// Trials whose fit returned a result.
    pub n_fitted: usize,
    pub n_converged: usize,
    pub entries: Vec<MonteCarloEntry>,
}

impl MonteCarloReport {
    pub fn entry(&self, param: Param) -> Option<&MonteCarloEntry> {
        self.entries.iter().find(|e| e.param == param)
    }
}

pub fn monte_carlo<P: Protocol + ?Sized, M: R2slModel + ?Sized>(
    protocol: &P,
    tissue: &TissueParams,
    r2sl: &M,
    noise: &NoiseConfig,
    fit: &FitConfig,
) -> GblochResult<MonteCarloReport> {
    noise.validate()?;
    fit.validate()?;
    let crb = protocol_crb(protocol, tissue, r2sl, noise.sigma)?;

    let params = protocol.fit_params().to_vec();
    let model = GblochModel::new(protocol.sequences(), *tissue, params.clone(), r2sl);
    let truth = model.reference_values();
    let clean = model.predict(&truth)?;

    let normal = Normal::new(0.0, noise.sigma)
        .map_err(|e| GblochError::ConfigError(format!("noise distribution: {e}")))?;
    let mut rng = StdRng::seed_from_u64(noise.seed);

    let mut estimates: Vec<Vec<f64>> = Vec::with_capacity(noise.n_trials);
    let mut n_converged = 0;
    for trial in 0..noise.n_trials {
        let data: Vec<f64> = clean.iter().map(|s| s + normal.sample(&mut rng)).collect();
        match levenberg_marquardt(&model, &data, &truth, fit) {
            Ok(result) => {
                if result.converged {
                    n_converged += 1;
                }
                estimates.push(result.params);
            }
            Err(e) => tracing::debug!(trial, error = %e, "Monte-Carlo fit failed"),
        }
    }
    if estimates.len() < 2 {
        return Err(GblochError::SolverDiverged {
            iteration: noise.n_trials,
            message: format!("only {} of {} fits succeeded", estimates.len(), noise.n_trials),
        });
    }

    let n = estimates.len() as f64;
    let entries = params
        .iter()
        .enumerate()
        .map(|(k, &param)| {
            let mean = estimates.iter().map(|e| e[k]).sum::<f64>() / n;
            let variance =
                estimates.iter().map(|e| (e[k] - mean).powi(2)).sum::<f64>() / (n - 1.0);
            let bound = crb.entries[k].crb;
            MonteCarloEntry {
                param,
                truth: truth[k],
                mean,
                variance,
                bias: mean - truth[k],
                crb: bound,
                variance_ratio: variance / bound,
            }
        })
        .collect();

    let report = MonteCarloReport {
        protocol: protocol.name().to_string(),
        sigma: noise.sigma,
        seed: noise.seed,
        n_trials: noise.n_trials,
        n_fitted: estimates.len(),
        n_converged,
        entries,
    };
    tracing::info!(
        protocol = protocol.name(),
        n_trials = report.n_trials,
        n_converged = report.n_converged,
        "Monte-Carlo check finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::VfaProtocol;
    use gbloch_core::r2sl::LorentzianR2sl;
    use gbloch_types::config::VfaConfig;

    fn noise(seed: u64) -> NoiseConfig {
        NoiseConfig {
            sigma: 1e-4,
            n_trials: 200,
            seed,
        }
    }

    #[test]
    fn test_vfa_variance_matches_crb() {
        let protocol = VfaProtocol::new(&VfaConfig::default()).unwrap();
        let tissue = TissueParams::default();
        let report = monte_carlo(
            &protocol,
            &tissue,
            &LorentzianR2sl,
            &noise(7),
            &FitConfig::default(),
        )
        .unwrap();
        assert_eq!(report.n_fitted, 200);
        for entry in &report.entries {
            assert!(
                (0.6..1.5).contains(&entry.variance_ratio),
                "{}: {entry:?}",
                entry.param
            );
            assert!(entry.bias.abs() < 4.0 * (entry.crb / 200.0).sqrt() + 1e-3 * entry.truth);
        }
    }

    #[test]
    fn test_seed_reproducibility() {
        let protocol = VfaProtocol::new(&VfaConfig::default()).unwrap();
        let tissue = TissueParams::default();
        let small = NoiseConfig {
            n_trials: 10,
            ..noise(3)
        };
        let a = monte_carlo(&protocol, &tissue, &LorentzianR2sl, &small, &FitConfig::default())
            .unwrap();
        let b = monte_carlo(&protocol, &tissue, &LorentzianR2sl, &small, &FitConfig::default())
            .unwrap();
        let r1 = |r: &MonteCarloReport| r.entry(Param::R1).map(|e| e.mean);
        assert_eq!(r1(&a), r1(&b));
        assert!(r1(&a).is_some());
    }
}
