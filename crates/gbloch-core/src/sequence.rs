// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Pulse Sequences and Steady State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Periodic pulse sequences.
//!
//! A `Sequence` is one period of segments. Its net propagator
//! `P = [[A, b], [0, 1]]` has the fixed point `m = (I - A)⁻¹ b`, the
//! steady state from which the period's read-outs are collected.

use crate::propagator::{
    free_precession, free_precession_with_derivative, rf_pulse, rf_pulse_with_derivative,
    spoiler, spoiler_augmented,
};
use crate::r2sl::R2slModel;
use gbloch_math::linalg::lu_solve;
use gbloch_types::constants::{IDX_XF, IDX_YF, IDX_ZF, N_AUGMENTED, N_PHYS, N_STATE};
use gbloch_types::error::{GblochError, GblochResult};
use gbloch_types::state::{Param, TissueParams};
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

/// Quantity recorded by a read-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadoutKind {
    /// Free-pool transverse magnitude `|xf + i yf|`.
    Transverse,
    /// Free-pool longitudinal magnetization `zf`.
    Longitudinal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    /// Rectangular RF pulse; `alpha` is the nominal flip angle in rad.
    Pulse { alpha: f64, t_rf: f64 },
    Free { t: f64 },
    Spoil,
    /// Instantaneous, non-destructive sample of the current state.
    Readout(ReadoutKind),
}

impl Segment {
    pub fn duration(&self) -> f64 {
        match *self {
            Segment::Pulse { t_rf, .. } => t_rf,
            Segment::Free { t } => t,
            Segment::Spoil | Segment::Readout(_) => 0.0,
        }
    }

    /// 6x6 propagator; `None` for read-outs.
    fn propagator<M: R2slModel + ?Sized>(
        &self,
        p: &TissueParams,
        r2sl: &M,
    ) -> GblochResult<Option<Array2<f64>>> {
        Ok(match *self {
            Segment::Pulse { alpha, t_rf } => Some(rf_pulse(alpha, t_rf, p, r2sl)?),
            Segment::Free { t } => Some(free_precession(t, p)?),
            Segment::Spoil => Some(spoiler()),
            Segment::Readout(_) => None,
        })
    }

    fn propagator_with_derivative<M: R2slModel + ?Sized>(
        &self,
        p: &TissueParams,
        r2sl: &M,
        param: Param,
    ) -> GblochResult<Option<Array2<f64>>> {
        Ok(match *self {
            Segment::Pulse { alpha, t_rf } => {
                Some(rf_pulse_with_derivative(alpha, t_rf, p, r2sl, param)?)
            }
            Segment::Free { t } => Some(free_precession_with_derivative(t, p, param)?),
            Segment::Spoil => Some(spoiler_augmented()),
            Segment::Readout(_) => None,
        })
    }
}

/// Read-out value from a 6-state or 11-state vector.
fn readout_value(kind: ReadoutKind, m: &Array1<f64>) -> f64 {
    match kind {
        ReadoutKind::Transverse => m[IDX_XF].hypot(m[IDX_YF]),
        ReadoutKind::Longitudinal => m[IDX_ZF],
    }
}

/// Derivative of the read-out from an 11-state vector.
fn readout_derivative(kind: ReadoutKind, m: &Array1<f64>) -> f64 {
    match kind {
        ReadoutKind::Transverse => {
            let (x, y) = (m[IDX_XF], m[IDX_YF]);
            let mag = x.hypot(y);
            if mag == 0.0 {
                0.0
            } else {
                (x * m[N_PHYS + IDX_XF] + y * m[N_PHYS + IDX_YF]) / mag
            }
        }
        ReadoutKind::Longitudinal => m[N_PHYS + IDX_ZF],
    }
}

/// Fixed point of an affine propagator `[[A, b], [0, 1]]` of any size.
///
/// Returns the full homogeneous vector, trailing 1 included.
pub fn steady_state_from_propagator(prop: &Array2<f64>) -> GblochResult<Array1<f64>> {
    let n = prop.nrows();
    if n < 2 || prop.ncols() != n {
        return Err(GblochError::LinAlg(format!(
            "affine propagator must be square with n >= 2, got {:?}",
            prop.dim()
        )));
    }
    let k = n - 1;
    let a = prop.slice(s![..k, ..k]);
    let b = prop.slice(s![..k, k]).to_owned();
    let system = Array2::eye(k) - &a;
    let m = lu_solve(&system, &b).map_err(|e| {
        GblochError::PhysicsViolation(format!("sequence has no unique steady state: {e}"))
    })?;

    let mut full = Array1::ones(n);
    full.slice_mut(s![..k]).assign(&m);
    Ok(full)
}

/// One period of a periodic sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    segments: Vec<Segment>,
}

impl Sequence {
    pub fn new() -> Self {
        Sequence::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Sequence { segments }
    }

    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn pulse(mut self, alpha: f64, t_rf: f64) -> Self {
        self.push(Segment::Pulse { alpha, t_rf });
        self
    }

    pub fn free(mut self, t: f64) -> Self {
        self.push(Segment::Free { t });
        self
    }

    pub fn spoil(mut self) -> Self {
        self.push(Segment::Spoil);
        self
    }

    pub fn readout(mut self, kind: ReadoutKind) -> Self {
        self.push(Segment::Readout(kind));
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Length of one period in seconds.
    pub fn duration(&self) -> f64 {
        self.segments.iter().map(Segment::duration).sum()
    }

    pub fn n_readouts(&self) -> usize {
        self.segments
            .iter()
            .filter(|seg| matches!(seg, Segment::Readout(_)))
            .count()
    }

    pub fn validate(&self) -> GblochResult<()> {
        if self.segments.is_empty() {
            return Err(GblochError::Sequence("sequence has no segments".to_string()));
        }
        if self.n_readouts() == 0 {
            return Err(GblochError::Sequence("sequence has no read-out".to_string()));
        }
        for (i, seg) in self.segments.iter().enumerate() {
            let ok = match *seg {
                Segment::Pulse { alpha, t_rf } => alpha.is_finite() && t_rf.is_finite() && t_rf > 0.0,
                Segment::Free { t } => t.is_finite() && t >= 0.0,
                Segment::Spoil | Segment::Readout(_) => true,
            };
            if !ok {
                return Err(GblochError::Sequence(format!("invalid segment {i}: {seg:?}")));
            }
        }
        Ok(())
    }

    fn propagators<M: R2slModel + ?Sized>(
        &self,
        p: &TissueParams,
        r2sl: &M,
    ) -> GblochResult<Vec<Option<Array2<f64>>>> {
        self.segments.iter().map(|seg| seg.propagator(p, r2sl)).collect()
    }

    fn propagators_with_derivative<M: R2slModel + ?Sized>(
        &self,
        p: &TissueParams,
        r2sl: &M,
        param: Param,
    ) -> GblochResult<Vec<Option<Array2<f64>>>> {
        self.segments
            .iter()
            .map(|seg| seg.propagator_with_derivative(p, r2sl, param))
            .collect()
    }

    /// Product of the segment propagators, later segments on the left.
    fn compose(props: &[Option<Array2<f64>>], n: usize) -> Array2<f64> {
        props
            .iter()
            .flatten()
            .fold(Array2::eye(n), |acc, u| u.dot(&acc))
    }

    /// 6x6 propagator of one full period.
    pub fn net_propagator<M: R2slModel + ?Sized>(
        &self,
        p: &TissueParams,
        r2sl: &M,
    ) -> GblochResult<Array2<f64>> {
        self.validate()?;
        Ok(Self::compose(&self.propagators(p, r2sl)?, N_STATE))
    }

    /// 11x11 period propagator carrying `∂/∂param`.
    pub fn net_propagator_with_derivative<M: R2slModel + ?Sized>(
        &self,
        p: &TissueParams,
        r2sl: &M,
        param: Param,
    ) -> GblochResult<Array2<f64>> {
        self.validate()?;
        Ok(Self::compose(
            &self.propagators_with_derivative(p, r2sl, param)?,
            N_AUGMENTED,
        ))
    }

    /// Steady state at the start of the period.
    pub fn steady_state<M: R2slModel + ?Sized>(
        &self,
        p: &TissueParams,
        r2sl: &M,
    ) -> GblochResult<Array1<f64>> {
        steady_state_from_propagator(&self.net_propagator(p, r2sl)?)
    }

    /// Steady state `[m, ∂m/∂param, 1]` at the start of the period.
    pub fn steady_state_with_derivative<M: R2slModel + ?Sized>(
        &self,
        p: &TissueParams,
        r2sl: &M,
        param: Param,
    ) -> GblochResult<Array1<f64>> {
        steady_state_from_propagator(&self.net_propagator_with_derivative(p, r2sl, param)?)
    }

    /// Walk one period from `m`, recording every read-out.
    fn collect<F>(&self, props: &[Option<Array2<f64>>], mut m: Array1<f64>, mut record: F) -> Array1<f64>
    where
        F: FnMut(ReadoutKind, &Array1<f64>),
    {
        for (seg, prop) in self.segments.iter().zip(props) {
            match (seg, prop) {
                (Segment::Readout(kind), _) => record(*kind, &m),
                (_, Some(u)) => m = u.dot(&m),
                (_, None) => {}
            }
        }
        m
    }

    /// Steady-state read-outs in segment order, for unit `M0`.
    pub fn signals<M: R2slModel + ?Sized>(
        &self,
        p: &TissueParams,
        r2sl: &M,
    ) -> GblochResult<Vec<f64>> {
        self.validate()?;
        let props = self.propagators(p, r2sl)?;
        let m = steady_state_from_propagator(&Self::compose(&props, N_STATE))?;
        let mut out = Vec::with_capacity(self.n_readouts());
        self.collect(&props, m, |kind, m| out.push(readout_value(kind, m)));
        Ok(out)
    }

    /// Steady-state read-outs and their derivatives with respect to `param`.
    ///
    /// The signal model is `M0 · S`, so the `M0` derivative is the signal.
    pub fn signals_with_derivative<M: R2slModel + ?Sized>(
        &self,
        p: &TissueParams,
        r2sl: &M,
        param: Param,
    ) -> GblochResult<(Vec<f64>, Vec<f64>)> {
        if param == Param::M0 {
            let s = self.signals(p, r2sl)?;
            return Ok((s.clone(), s));
        }
        self.validate()?;
        let props = self.propagators_with_derivative(p, r2sl, param)?;
        let m = steady_state_from_propagator(&Self::compose(&props, N_AUGMENTED))?;
        let mut values = Vec::with_capacity(self.n_readouts());
        let mut derivs = Vec::with_capacity(self.n_readouts());
        self.collect(&props, m, |kind, m| {
            values.push(readout_value(kind, m));
            derivs.push(readout_derivative(kind, m));
        });
        Ok((values, derivs))
    }

    /// Read-outs of `n_periods` consecutive periods starting from `m_init`.
    ///
    /// `m_init` is a homogeneous 6-vector; the approach to steady state
    /// shows up as the read-outs converging to `signals`.
    pub fn transient<M: R2slModel + ?Sized>(
        &self,
        p: &TissueParams,
        r2sl: &M,
        m_init: &Array1<f64>,
        n_periods: usize,
    ) -> GblochResult<Vec<Vec<f64>>> {
        self.validate()?;
        if m_init.len() != N_STATE {
            return Err(GblochError::Sequence(format!(
                "initial state must have {N_STATE} entries, got {}",
                m_init.len()
            )));
        }
        let props = self.propagators(p, r2sl)?;
        let mut m = m_init.clone();
        let mut periods = Vec::with_capacity(n_periods);
        for _ in 0..n_periods {
            let mut out = Vec::with_capacity(self.n_readouts());
            m = self.collect(&props, m, |kind, m| out.push(readout_value(kind, m)));
            periods.push(out);
        }
        Ok(periods)
    }
}
