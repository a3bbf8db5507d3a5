// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Actual Flip-Angle Imaging
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Actual flip-angle imaging (AFI) B1 mapping.
//!
//! Two spoiled gradient echoes with identical pulses interleave with
//! repetition times `TR1 < TR2`. For `TR ≪ T1` the signal ratio
//! `r = S2/S1` obeys `r = (1 + n cos α) / (n + cos α)` with `n = TR2/TR1`.

use crate::crb::{protocol_crb, CrbReport};
use crate::protocol::AfiProtocol;
use gbloch_core::jacobian::signals;
use gbloch_core::r2sl::R2slModel;
use gbloch_core::sequence::{ReadoutKind, Sequence};
use gbloch_types::config::{AfiConfig, AnalysisConfig};
use gbloch_types::error::{GblochError, GblochResult};
use gbloch_types::state::TissueParams;
use ndarray::Array1;
use serde::Serialize;

pub fn afi_sequence(cfg: &AfiConfig) -> Sequence {
    let alpha = cfg.flip_angle_deg.to_radians();
    Sequence::new()
        .pulse(alpha, cfg.t_rf)
        .readout(ReadoutKind::Transverse)
        .free(cfg.tr1 - cfg.t_rf)
        .spoil()
        .pulse(alpha, cfg.t_rf)
        .readout(ReadoutKind::Transverse)
        .free(cfg.tr2 - cfg.t_rf)
        .spoil()
}

/// `[S1, S2]`, the read-outs followed by TR1 and TR2.
pub fn afi_signals<M: R2slModel + ?Sized>(
    cfg: &AfiConfig,
    tissue: &TissueParams,
    r2sl: &M,
) -> GblochResult<Array1<f64>> {
    cfg.validate()?;
    tissue.validate()?;
    signals(&[afi_sequence(cfg)], tissue, r2sl)
}

/// Flip angle from the signal ratio `r` and TR ratio `n`.
///
/// The cosine is clamped to `[-1, 1]`; ratios outside the physical range
/// map to 0 or π.
pub fn afi_flip_angle(r: f64, n: f64) -> f64 {
    ((r * n - 1.0) / (n - r)).clamp(-1.0, 1.0).acos()
}

pub fn afi_crb<M: R2slModel + ?Sized>(cfg: &AnalysisConfig, r2sl: &M) -> GblochResult<CrbReport> {
    let protocol = AfiProtocol::new(&cfg.afi)?;
    protocol_crb(&protocol, &cfg.tissue, r2sl, cfg.noise.sigma)
}

#[derive(Debug, Clone, Serialize)]
pub struct AfiBiasReport {
    pub s1: f64,
    pub s2: f64,
    pub ratio: f64,
    pub tr_ratio: f64,
    pub alpha_nominal: f64,
    pub alpha_estimate: f64,
    pub b1_true: f64,
    pub b1_estimate: f64,
    /// `(B1_estimate - B1_true) / B1_true`.
    pub bias: f64,
}

/// B1 estimated from gBloch AFI signals.
pub fn afi_bias<M: R2slModel + ?Sized>(
    cfg: &AnalysisConfig,
    r2sl: &M,
) -> GblochResult<AfiBiasReport> {
    let s = afi_signals(&cfg.afi, &cfg.tissue, r2sl)?;
    let (s1, s2) = (s[0], s[1]);
    if s1 == 0.0 {
        return Err(GblochError::PhysicsViolation(
            "AFI signal S1 is zero".to_string(),
        ));
    }
    let ratio = s2 / s1;
    let n = cfg.afi.tr_ratio();
    let alpha_nominal = cfg.afi.flip_angle_deg.to_radians();
    let alpha_estimate = afi_flip_angle(ratio, n);
    if !alpha_estimate.is_finite() {
        return Err(GblochError::PhysicsViolation(format!(
            "AFI ratio {ratio} gives no flip angle for n = {n}"
        )));
    }
    let b1_true = cfg.tissue.b1;
    let b1_estimate = alpha_estimate / alpha_nominal;
    let bias = (b1_estimate - b1_true) / b1_true;
    tracing::info!(ratio, b1_estimate, bias, "AFI bias computed");
    Ok(AfiBiasReport {
        s1,
        s2,
        ratio,
        tr_ratio: n,
        alpha_nominal,
        alpha_estimate,
        b1_true,
        b1_estimate,
        bias,
    })
}
