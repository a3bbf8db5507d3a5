// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Cramér-Rao Bound
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Fisher information and Cramér-Rao bounds under white Gaussian noise.
//!
//! The Fisher matrix is equilibrated by its diagonal before inversion;
//! parameters spanning microseconds (T2s) to unity (M0) otherwise leave it
//! too badly scaled for a plain LU.

use crate::model::param_values;
use crate::protocol::Protocol;
use gbloch_core::jacobian::signal_jacobian;
use gbloch_core::r2sl::R2slModel;
use gbloch_math::linalg::inverse;
use gbloch_types::error::{GblochError, GblochResult};
use gbloch_types::state::{Param, TissueParams};
use ndarray::Array2;
use serde::Serialize;

fn check_sigma(sigma: f64) -> GblochResult<()> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(GblochError::ConfigError(format!(
            "noise sigma must be finite and > 0, got {sigma}"
        )));
    }
    Ok(())
}

/// `F = JᵀJ / σ²`.
pub fn fisher_information(jacobian: &Array2<f64>, sigma: f64) -> GblochResult<Array2<f64>> {
    check_sigma(sigma)?;
    Ok(jacobian.t().dot(jacobian) / (sigma * sigma))
}

/// Diagonal of `F⁻¹`: lower bounds on the variance of unbiased estimators.
pub fn cramer_rao_bound(jacobian: &Array2<f64>, sigma: f64) -> GblochResult<Vec<f64>> {
    let fisher = fisher_information(jacobian, sigma)?;
    let n = fisher.nrows();
    let mut scale = Vec::with_capacity(n);
    for k in 0..n {
        let f = fisher[[k, k]];
        if !f.is_finite() || f <= 0.0 {
            return Err(GblochError::LinAlg(format!(
                "Fisher information of parameter {k} is {f}; the protocol is insensitive to it"
            )));
        }
        scale.push(1.0 / f.sqrt());
    }

    let mut scaled = fisher;
    for ((i, j), v) in scaled.indexed_iter_mut() {
        *v *= scale[i] * scale[j];
    }
    let inv = inverse(&scaled)
        .map_err(|e| GblochError::LinAlg(format!("Fisher information is singular: {e}")))?;

    let mut crb = Vec::with_capacity(n);
    for k in 0..n {
        let v = inv[[k, k]] * scale[k] * scale[k];
        if !v.is_finite() || v <= 0.0 {
            return Err(GblochError::LinAlg(format!(
                "Fisher information is numerically singular (CRB[{k}] = {v})"
            )));
        }
        crb.push(v);
    }
    Ok(crb)
}

#[derive(Debug, Clone, Serialize)]
pub struct CrbEntry {
    pub param: Param,
    pub value: f64,
    /// Variance bound.
    pub crb: f64,
    /// `sqrt(CRB) / |value|`; absent for zero-valued parameters.
    pub relative_std: Option<f64>,
    /// `CRB · T_total / value²`, the inverse efficiency per unit scan time.
    pub time_normalized: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrbReport {
    pub protocol: String,
    pub sigma: f64,
    pub total_time: f64,
    pub n_signals: usize,
    pub entries: Vec<CrbEntry>,
}

impl CrbReport {
    pub fn from_jacobian(
        protocol: &str,
        jacobian: &Array2<f64>,
        params: &[Param],
        values: &[f64],
        sigma: f64,
        total_time: f64,
    ) -> GblochResult<Self> {
        if params.len() != jacobian.ncols() || values.len() != params.len() {
            return Err(GblochError::ConfigError(format!(
                "CRB report: {} parameters, {} values, {} Jacobian columns",
                params.len(),
                values.len(),
                jacobian.ncols()
            )));
        }
        let crb = cramer_rao_bound(jacobian, sigma)?;
        let entries = params
            .iter()
            .zip(values)
            .zip(crb)
            .map(|((&param, &value), crb)| {
                let nonzero = value != 0.0;
                CrbEntry {
                    param,
                    value,
                    crb,
                    relative_std: nonzero.then(|| crb.sqrt() / value.abs()),
                    time_normalized: nonzero.then(|| crb * total_time / (value * value)),
                }
            })
            .collect();
        Ok(CrbReport {
            protocol: protocol.to_string(),
            sigma,
            total_time,
            n_signals: jacobian.nrows(),
            entries,
        })
    }

    pub fn entry(&self, param: Param) -> Option<&CrbEntry> {
        self.entries.iter().find(|e| e.param == param)
    }
}

/// CRB of `protocol.fit_params()` at `tissue` with unit `M0`.
pub fn protocol_crb<P: Protocol + ?Sized, M: R2slModel + ?Sized>(
    protocol: &P,
    tissue: &TissueParams,
    r2sl: &M,
    sigma: f64,
) -> GblochResult<CrbReport> {
    tissue.validate()?;
    let params = protocol.fit_params();
    let sequences = protocol.sequences();
    let jac = signal_jacobian(&sequences, tissue, r2sl, params)?;
    let values = param_values(tissue, params);
    let report = CrbReport::from_jacobian(
        protocol.name(),
        &jac,
        params,
        &values,
        sigma,
        protocol.total_time(),
    )?;
    tracing::info!(
        protocol = protocol.name(),
        n_signals = report.n_signals,
        n_params = params.len(),
        "CRB computed"
    );
    Ok(report)
}
