// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Generalized-Bloch Signal Model
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! The full two-pool gBloch model as a fit model.
//!
//! Free parameters are a subset of `Param`; everything else stays at the
//! reference tissue. The prediction is `M0 · S(p)`.

use crate::fit::FitModel;
use gbloch_core::jacobian::{signal_jacobian, signals};
use gbloch_core::r2sl::R2slModel;
use gbloch_core::sequence::Sequence;
use gbloch_types::error::GblochResult;
use gbloch_types::state::{Param, TissueParams};
use ndarray::{Array1, Array2};

/// Tissue with the free parameters set to `x`.
///
/// `R1` shifts both longitudinal rates by the same amount, matching the
/// constrained derivative `∂/∂R1f + ∂/∂R1s`.
pub fn apply_params(reference: &TissueParams, params: &[Param], x: &[f64]) -> TissueParams {
    let mut p = *reference;
    for (&param, &v) in params.iter().zip(x) {
        match param {
            Param::M0 => {}
            Param::R1 => {
                let shift = v - reference.r1f;
                p.r1f = reference.r1f + shift;
                p.r1s = reference.r1s + shift;
            }
            _ => p = p.with(param, v),
        }
    }
    p
}

/// Values of `params` at `tissue`, with unit `M0`.
pub fn param_values(tissue: &TissueParams, params: &[Param]) -> Vec<f64> {
    params.iter().map(|&param| tissue.get(param)).collect()
}

fn param_bounds(param: Param) -> (f64, f64) {
    match param {
        Param::M0 => (1e-9, f64::INFINITY),
        Param::M0s => (0.0, 0.95),
        Param::R1f | Param::R1s | Param::R1 | Param::R2f | Param::Rx => (0.0, f64::INFINITY),
        Param::T2s => (1e-7, 1e-3),
        Param::Omega0 => (f64::NEG_INFINITY, f64::INFINITY),
        Param::B1 => (0.1, 2.0),
    }
}

pub struct GblochModel<'a, M: R2slModel + ?Sized> {
    sequences: Vec<Sequence>,
    reference: TissueParams,
    params: Vec<Param>,
    r2sl: &'a M,
}

impl<'a, M: R2slModel + ?Sized> GblochModel<'a, M> {
    pub fn new(
        sequences: Vec<Sequence>,
        reference: TissueParams,
        params: Vec<Param>,
        r2sl: &'a M,
    ) -> Self {
        GblochModel {
            sequences,
            reference,
            params,
            r2sl,
        }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Parameter vector reproducing the reference tissue.
    pub fn reference_values(&self) -> Vec<f64> {
        param_values(&self.reference, &self.params)
    }

    fn m0(&self, x: &[f64]) -> f64 {
        self.params
            .iter()
            .position(|&p| p == Param::M0)
            .map_or(1.0, |k| x[k])
    }
}

impl<M: R2slModel + ?Sized> FitModel for GblochModel<'_, M> {
    fn n_params(&self) -> usize {
        self.params.len()
    }

    fn predict(&self, x: &[f64]) -> GblochResult<Array1<f64>> {
        let tissue = apply_params(&self.reference, &self.params, x);
        Ok(signals(&self.sequences, &tissue, self.r2sl)? * self.m0(x))
    }

    fn jacobian(&self, x: &[f64], _fd_step: f64) -> GblochResult<Array2<f64>> {
        let tissue = apply_params(&self.reference, &self.params, x);
        let mut jac = signal_jacobian(&self.sequences, &tissue, self.r2sl, &self.params)?;
        let m0 = self.m0(x);
        for (k, &param) in self.params.iter().enumerate() {
            if param != Param::M0 {
                jac.column_mut(k).mapv_inplace(|v| v * m0);
            }
        }
        Ok(jac)
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        self.params.iter().map(|&p| param_bounds(p)).collect()
    }
}
