// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Parameter Sweeps
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use gbloch_math::interp::linspace;
use gbloch_types::config::AnalysisConfig;
use gbloch_types::error::{GblochError, GblochResult};
use gbloch_types::state::Param;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SweepPoint<T> {
    pub value: f64,
    pub result: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport<T> {
    pub param: Param,
    pub points: Vec<SweepPoint<T>>,
}

/// Run `analysis` with one tissue parameter set to each of
/// `linspace(start, stop, n)`.
///
/// `R1` sets both longitudinal rates. Every point must be a valid tissue.
pub fn sweep<T, F>(
    base: &AnalysisConfig,
    param: Param,
    start: f64,
    stop: f64,
    n: usize,
    mut analysis: F,
) -> GblochResult<SweepReport<T>>
where
    F: FnMut(&AnalysisConfig) -> GblochResult<T>,
{
    if param == Param::M0 {
        return Err(GblochError::ConfigError(
            "m0 is a signal scale, not a tissue parameter; it cannot be swept".to_string(),
        ));
    }
    if n == 0 || !start.is_finite() || !stop.is_finite() {
        return Err(GblochError::ConfigError(format!(
            "sweep needs n >= 1 and finite bounds, got n = {n}, [{start}, {stop}]"
        )));
    }

    let mut points = Vec::with_capacity(n);
    for value in linspace(start, stop, n) {
        let mut cfg = base.clone();
        cfg.tissue = cfg.tissue.with(param, value);
        cfg.tissue.validate()?;
        tracing::debug!(%param, value, "sweep point");
        let result = analysis(&cfg)?;
        points.push(SweepPoint { value, result });
    }
    tracing::info!(%param, start, stop, n, "sweep finished");
    Ok(SweepReport { param, points })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afi::afi_bias;
    use gbloch_core::r2sl::LorentzianR2sl;

    #[test]
    fn test_afi_estimate_tracks_b1() {
        let base = AnalysisConfig::default();
        let report = sweep(&base, Param::B1, 0.8, 1.2, 5, |cfg| {
            afi_bias(cfg, &LorentzianR2sl)
        })
        .unwrap();
        assert_eq!(report.points.len(), 5);
        assert!((report.points[0].value - 0.8).abs() < 1e-15);
        assert_eq!(report.points[4].value, 1.2);
        for w in report.points.windows(2) {
            assert!(w[1].result.b1_estimate > w[0].result.b1_estimate);
        }
    }

    #[test]
    fn test_sweep_sets_constrained_r1() {
        let base = AnalysisConfig::default();
        let report = sweep(&base, Param::R1, 0.4, 0.6, 3, |cfg| Ok(cfg.tissue)).unwrap();
        for point in &report.points {
            assert_eq!(point.result.r1f, point.value);
            assert_eq!(point.result.r1s, point.value);
        }
    }

    #[test]
    fn test_invalid_sweeps_rejected() {
        let base = AnalysisConfig::default();
        let ok = |cfg: &AnalysisConfig| Ok(cfg.tissue.m0s);
        assert!(sweep(&base, Param::M0, 0.5, 1.0, 3, ok).is_err());
        assert!(sweep(&base, Param::M0s, 0.0, 0.2, 0, ok).is_err());
        // m0s = 1 leaves no free pool.
        assert!(sweep(&base, Param::M0s, 0.5, 1.0, 3, ok).is_err());
    }
}
