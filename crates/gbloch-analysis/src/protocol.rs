// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Protocols
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Measurement protocols as sets of periodic sequences.

use crate::afi::afi_sequence;
use crate::sir::sir_sequences;
use crate::vfa::vfa_sequences;
use gbloch_core::r2sl::R2slTable;
use gbloch_core::sequence::Sequence;
use gbloch_types::config::{AfiConfig, AnalysisConfig, SirConfig, VfaConfig};
use gbloch_types::error::GblochResult;
use gbloch_types::state::Param;

/// A quantitative MRI protocol: which sequences are played and which
/// parameters are estimated from their read-outs.
pub trait Protocol {
    fn name(&self) -> &'static str;

    /// One sequence per independently measured steady state.
    fn sequences(&self) -> Vec<Sequence>;

    fn fit_params(&self) -> &[Param];

    /// Scan time of one repetition of every sequence.
    fn total_time(&self) -> f64 {
        self.sequences().iter().map(Sequence::duration).sum()
    }
}

#[derive(Debug, Clone)]
pub struct SirProtocol {
    pub config: SirConfig,
}

impl SirProtocol {
    pub fn new(config: &SirConfig) -> GblochResult<Self> {
        config.validate()?;
        Ok(SirProtocol {
            config: config.clone(),
        })
    }
}

impl Protocol for SirProtocol {
    fn name(&self) -> &'static str {
        "sir"
    }

    fn sequences(&self) -> Vec<Sequence> {
        sir_sequences(&self.config)
    }

    fn fit_params(&self) -> &[Param] {
        &self.config.fit_params
    }
}

#[derive(Debug, Clone)]
pub struct VfaProtocol {
    pub config: VfaConfig,
}

impl VfaProtocol {
    pub fn new(config: &VfaConfig) -> GblochResult<Self> {
        config.validate()?;
        Ok(VfaProtocol {
            config: config.clone(),
        })
    }
}

impl Protocol for VfaProtocol {
    fn name(&self) -> &'static str {
        "vfa"
    }

    fn sequences(&self) -> Vec<Sequence> {
        vfa_sequences(&self.config)
    }

    fn fit_params(&self) -> &[Param] {
        &self.config.fit_params
    }
}

#[derive(Debug, Clone)]
pub struct AfiProtocol {
    pub config: AfiConfig,
}

impl AfiProtocol {
    pub fn new(config: &AfiConfig) -> GblochResult<Self> {
        config.validate()?;
        Ok(AfiProtocol {
            config: config.clone(),
        })
    }
}

impl Protocol for AfiProtocol {
    fn name(&self) -> &'static str {
        "afi"
    }

    fn sequences(&self) -> Vec<Sequence> {
        vec![afi_sequence(&self.config)]
    }

    fn fit_params(&self) -> &[Param] {
        &self.config.fit_params
    }
}

/// R2sl table for the configured lineshape and grid.
pub fn precompute_r2sl(cfg: &AnalysisConfig) -> GblochResult<R2slTable> {
    let table = R2slTable::precompute(cfg.lineshape, &cfg.r2sl)?;
    tracing::info!(
        lineshape = ?cfg.lineshape,
        n_tau = cfg.r2sl.n_tau,
        n_alpha = cfg.r2sl.n_alpha,
        "R2sl table ready"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_protocol_times() {
        let cfg = AnalysisConfig::default();
        let sir = SirProtocol::new(&cfg.sir).unwrap();
        let expected: f64 = cfg
            .sir
            .t_i
            .iter()
            .zip(&cfg.sir.t_d)
            .map(|(ti, td)| ti + td + cfg.sir.t_inversion + cfg.sir.t_excitation)
            .sum();
        assert!((sir.total_time() - expected).abs() < 1e-12);
        assert_eq!(sir.sequences().len(), 4);

        let vfa = VfaProtocol::new(&cfg.vfa).unwrap();
        assert!((vfa.total_time() - 2.0 * cfg.vfa.tr).abs() < 1e-12);

        let afi = AfiProtocol::new(&cfg.afi).unwrap();
        assert!((afi.total_time() - cfg.afi.tr1 - cfg.afi.tr2).abs() < 1e-12);
        assert_eq!(afi.sequences()[0].n_readouts(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = VfaConfig {
            flip_angles_deg: vec![10.0],
            ..VfaConfig::default()
        };
        assert!(VfaProtocol::new(&cfg).is_err());
    }

    #[test]
    fn test_trait_objects() {
        let cfg = AnalysisConfig::default();
        let protocols: Vec<Box<dyn Protocol>> = vec![
            Box::new(SirProtocol::new(&cfg.sir).unwrap()),
            Box::new(VfaProtocol::new(&cfg.vfa).unwrap()),
            Box::new(AfiProtocol::new(&cfg.afi).unwrap()),
        ];
        let names: Vec<_> = protocols.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["sir", "vfa", "afi"]);
    }
}
