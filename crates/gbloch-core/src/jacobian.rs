// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Signal Jacobians
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Jacobians of concatenated steady-state signals.
//!
//! Rows follow the read-outs of every sequence in order; columns follow the
//! requested parameters. The analytic Jacobian uses the derivative-augmented
//! propagators; the finite-difference version is the reference.

use crate::r2sl::R2slModel;
use crate::sequence::Sequence;
use gbloch_types::error::{GblochError, GblochResult};
use gbloch_types::state::{Param, TissueParams};
use ndarray::{Array1, Array2};

fn n_signals(sequences: &[Sequence]) -> usize {
    sequences.iter().map(Sequence::n_readouts).sum()
}

/// Read-outs of all sequences, concatenated, for unit `M0`.
pub fn signals<M: R2slModel + ?Sized>(
    sequences: &[Sequence],
    p: &TissueParams,
    r2sl: &M,
) -> GblochResult<Array1<f64>> {
    let mut out = Vec::with_capacity(n_signals(sequences));
    for seq in sequences {
        out.extend(seq.signals(p, r2sl)?);
    }
    Ok(Array1::from(out))
}

/// Analytic `∂S/∂param`, one column per entry of `params`.
pub fn signal_jacobian<M: R2slModel + ?Sized>(
    sequences: &[Sequence],
    p: &TissueParams,
    r2sl: &M,
    params: &[Param],
) -> GblochResult<Array2<f64>> {
    if params.is_empty() {
        return Err(GblochError::ConfigError(
            "Jacobian needs at least one parameter".to_string(),
        ));
    }
    let rows = n_signals(sequences);
    let mut jac = Array2::zeros((rows, params.len()));
    for (col, &param) in params.iter().enumerate() {
        let mut row = 0;
        for seq in sequences {
            let (_, ds) = seq.signals_with_derivative(p, r2sl, param)?;
            for d in ds {
                jac[[row, col]] = d;
                row += 1;
            }
        }
    }
    tracing::debug!(rows, cols = params.len(), "signal Jacobian assembled");
    Ok(jac)
}

/// Tissue with `param` shifted by `delta`; `R1` moves both rates together.
fn perturb(p: &TissueParams, param: Param, delta: f64) -> TissueParams {
    match param {
        Param::R1 => TissueParams {
            r1f: p.r1f + delta,
            r1s: p.r1s + delta,
            ..*p
        },
        _ => p.with(param, p.get(param) + delta),
    }
}

/// Central finite differences with relative step `step`.
pub fn fd_signal_jacobian<M: R2slModel + ?Sized>(
    sequences: &[Sequence],
    p: &TissueParams,
    r2sl: &M,
    params: &[Param],
    step: f64,
) -> GblochResult<Array2<f64>> {
    if !(step > 0.0 && step.is_finite()) {
        return Err(GblochError::ConfigError(format!(
            "finite-difference step must be > 0, got {step}"
        )));
    }
    let base = signals(sequences, p, r2sl)?;
    let mut jac = Array2::zeros((base.len(), params.len()));
    for (col, &param) in params.iter().enumerate() {
        if param == Param::M0 {
            jac.column_mut(col).assign(&base);
            continue;
        }
        let v = p.get(param);
        let h = if v != 0.0 { step * v.abs() } else { step };
        let up = signals(sequences, &perturb(p, param, h), r2sl)?;
        let dn = signals(sequences, &perturb(p, param, -h), r2sl)?;
        jac.column_mut(col).assign(&((up - dn) / (2.0 * h)));
    }
    Ok(jac)
}
