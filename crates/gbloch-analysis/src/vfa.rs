// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Variable Flip Angle T1
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Variable-flip-angle T1 mapping (DESPOT1) on spoiled gradient echoes.

use crate::afi::afi_bias;
use crate::crb::{protocol_crb, CrbReport};
use crate::protocol::VfaProtocol;
use gbloch_core::jacobian::signals;
use gbloch_core::r2sl::R2slModel;
use gbloch_core::sequence::{ReadoutKind, Sequence};
use gbloch_types::config::{AnalysisConfig, VfaConfig};
use gbloch_types::error::{GblochError, GblochResult};
use gbloch_types::state::TissueParams;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Spoiled gradient echo per nominal flip angle.
pub fn vfa_sequences(cfg: &VfaConfig) -> Vec<Sequence> {
    cfg.flip_angles_rad()
        .into_iter()
        .map(|alpha| {
            Sequence::new()
                .pulse(alpha, cfg.t_rf)
                .readout(ReadoutKind::Transverse)
                .spoil()
                .free(cfg.tr - cfg.t_rf)
        })
        .collect()
}

pub fn vfa_signals<M: R2slModel + ?Sized>(
    cfg: &VfaConfig,
    tissue: &TissueParams,
    r2sl: &M,
) -> GblochResult<Array1<f64>> {
    cfg.validate()?;
    tissue.validate()?;
    signals(&vfa_sequences(cfg), tissue, r2sl)
}

pub fn vfa_crb<M: R2slModel + ?Sized>(cfg: &AnalysisConfig, r2sl: &M) -> GblochResult<CrbReport> {
    let protocol = VfaProtocol::new(&cfg.vfa)?;
    protocol_crb(&protocol, &cfg.tissue, r2sl, cfg.noise.sigma)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Despot1Fit {
    pub e1: f64,
    pub t1: f64,
    pub r1: f64,
    pub m0: f64,
}

/// Linear DESPOT1 fit.
///
/// Regresses `S/sin α` on `S/tan α`: the slope is `E1 = exp(-TR/T1)` and
/// the intercept `M0 (1 - E1)`.
pub fn despot1_fit(signals: &[f64], flip_angles: &[f64], tr: f64) -> GblochResult<Despot1Fit> {
    if signals.len() != flip_angles.len() || signals.len() < 2 {
        return Err(GblochError::ConfigError(format!(
            "DESPOT1 needs at least two signals with matching angles, got {} and {}",
            signals.len(),
            flip_angles.len()
        )));
    }
    if !tr.is_finite() || tr <= 0.0 {
        return Err(GblochError::ConfigError(format!(
            "TR must be finite and > 0, got {tr}"
        )));
    }

    let (x, y): (Vec<f64>, Vec<f64>) = signals
        .iter()
        .zip(flip_angles)
        .map(|(&s, &a)| (s / a.tan(), s / a.sin()))
        .unzip();
    if x.iter().chain(&y).any(|v| !v.is_finite()) {
        return Err(GblochError::PhysicsViolation(
            "DESPOT1 regression points are not finite".to_string(),
        ));
    }

    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;
    let sxx: f64 = x.iter().map(|v| (v - x_mean).powi(2)).sum();
    let sxy: f64 = x.iter().zip(&y).map(|(a, b)| (a - x_mean) * (b - y_mean)).sum();
    let x_norm: f64 = x.iter().map(|v| v * v).sum();
    if sxx <= 1e3 * f64::EPSILON * x_norm {
        return Err(GblochError::PhysicsViolation(
            "DESPOT1 needs at least two distinct flip angles".to_string(),
        ));
    }

    let e1 = sxy / sxx;
    if e1.is_nan() || e1 <= 0.0 || e1 >= 1.0 {
        return Err(GblochError::PhysicsViolation(format!(
            "DESPOT1 slope E1 = {e1} outside (0, 1)"
        )));
    }
    let intercept = y_mean - e1 * x_mean;
    let t1 = -tr / e1.ln();
    Ok(Despot1Fit {
        e1,
        t1,
        r1: 1.0 / t1,
        m0: intercept / (1.0 - e1),
    })
}

/// Flip-angle calibration assumed by the DESPOT1 fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum B1Assumption {
    /// Nominal flip angles, B1 = 1.
    #[default]
    Nominal,
    /// The simulated tissue's B1.
    True,
    /// B1 estimated by AFI on the same tissue.
    Afi,
}

impl fmt::Display for B1Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            B1Assumption::Nominal => "nominal",
            B1Assumption::True => "true",
            B1Assumption::Afi => "afi",
        })
    }
}

impl FromStr for B1Assumption {
    type Err = GblochError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nominal" => Ok(B1Assumption::Nominal),
            "true" => Ok(B1Assumption::True),
            "afi" => Ok(B1Assumption::Afi),
            _ => Err(GblochError::ConfigError(format!(
                "unknown B1 assumption '{s}' (expected nominal, true or afi)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VfaBiasReport {
    pub b1_assumption: B1Assumption,
    pub b1_used: f64,
    pub signals: Vec<f64>,
    pub fit: Despot1Fit,
    /// `1 / R1f` of the simulated tissue.
    pub t1_true: f64,
    /// `(T1_apparent - T1_true) / T1_true`.
    pub bias_t1: f64,
}

/// Apparent DESPOT1 T1 of gBloch signals versus the free-pool `1/R1f`.
pub fn vfa_bias<M: R2slModel + ?Sized>(
    cfg: &AnalysisConfig,
    r2sl: &M,
    assumption: B1Assumption,
) -> GblochResult<VfaBiasReport> {
    if cfg.tissue.r1f <= 0.0 {
        return Err(GblochError::PhysicsViolation(
            "T1 bias needs r1f > 0".to_string(),
        ));
    }
    let data = vfa_signals(&cfg.vfa, &cfg.tissue, r2sl)?.to_vec();
    let b1_used = match assumption {
        B1Assumption::Nominal => 1.0,
        B1Assumption::True => cfg.tissue.b1,
        B1Assumption::Afi => afi_bias(cfg, r2sl)?.b1_estimate,
    };
    let angles: Vec<f64> = cfg
        .vfa
        .flip_angles_rad()
        .into_iter()
        .map(|a| a * b1_used)
        .collect();
    let fit = despot1_fit(&data, &angles, cfg.vfa.tr)?;
    let t1_true = 1.0 / cfg.tissue.r1f;
    let bias_t1 = (fit.t1 - t1_true) / t1_true;
    tracing::info!(
        b1_assumption = %assumption,
        b1_used,
        t1 = fit.t1,
        bias_t1,
        "VFA bias computed"
    );
    Ok(VfaBiasReport {
        b1_assumption: assumption,
        b1_used,
        signals: data,
        fit,
        t1_true,
        bias_t1,
    })
}
