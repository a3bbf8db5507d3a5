// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::constants::{IDX_ONE, IDX_ZF, IDX_ZS, N_STATE};
use crate::error::{GblochError, GblochResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two-pool tissue description: free water plus semi-solid macromolecules.
///
/// Total equilibrium magnetization is normalized to 1, so the free pool
/// holds `1 - m0s`. Rates in 1/s, `t2s` in s, `omega0` in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TissueParams {
    #[serde(default = "default_m0s")]
    pub m0s: f64,
    #[serde(default = "default_r1f")]
    pub r1f: f64,
    #[serde(default = "default_r2f")]
    pub r2f: f64,
    #[serde(default = "default_rx")]
    pub rx: f64,
    #[serde(default = "default_r1s")]
    pub r1s: f64,
    #[serde(default = "default_t2s")]
    pub t2s: f64,
    #[serde(default)]
    pub omega0: f64,
    #[serde(default = "default_b1")]
    pub b1: f64,
}

fn default_m0s() -> f64 {
    0.139
}
fn default_r1f() -> f64 {
    0.52
}
fn default_r2f() -> f64 {
    15.3
}
fn default_rx() -> f64 {
    67.0
}
fn default_r1s() -> f64 {
    3.0
}
fn default_t2s() -> f64 {
    12e-6
}
fn default_b1() -> f64 {
    1.0
}

impl Default for TissueParams {
    /// Frontal white matter at 3 T.
    fn default() -> Self {
        TissueParams {
            m0s: default_m0s(),
            r1f: default_r1f(),
            r2f: default_r2f(),
            rx: default_rx(),
            r1s: default_r1s(),
            t2s: default_t2s(),
            omega0: 0.0,
            b1: default_b1(),
        }
    }
}

impl TissueParams {
    /// Free-pool fraction.
    pub fn m0f(&self) -> f64 {
        1.0 - self.m0s
    }

    /// Thermal equilibrium `[0, 0, m0f, 0, m0s, 1]`.
    pub fn equilibrium(&self) -> [f64; N_STATE] {
        let mut m = [0.0; N_STATE];
        m[IDX_ZF] = self.m0f();
        m[IDX_ZS] = self.m0s;
        m[IDX_ONE] = 1.0;
        m
    }

    pub fn validate(&self) -> GblochResult<()> {
        if !self.m0s.is_finite() || !(0.0..1.0).contains(&self.m0s) {
            return Err(GblochError::PhysicsViolation(format!(
                "m0s must be in [0, 1), got {}",
                self.m0s
            )));
        }
        for (name, rate) in [
            ("r1f", self.r1f),
            ("r2f", self.r2f),
            ("rx", self.rx),
            ("r1s", self.r1s),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(GblochError::PhysicsViolation(format!(
                    "{name} must be finite and >= 0, got {rate}"
                )));
            }
        }
        if !self.t2s.is_finite() || self.t2s <= 0.0 {
            return Err(GblochError::PhysicsViolation(format!(
                "t2s must be finite and > 0, got {}",
                self.t2s
            )));
        }
        if !self.omega0.is_finite() {
            return Err(GblochError::PhysicsViolation(
                "omega0 must be finite".to_string(),
            ));
        }
        if !self.b1.is_finite() || self.b1 <= 0.0 {
            return Err(GblochError::PhysicsViolation(format!(
                "b1 must be finite and > 0, got {}",
                self.b1
            )));
        }
        Ok(())
    }

    /// Value of a parameter. `R1` reads `r1f`, `M0` is the unit signal scale.
    pub fn get(&self, param: Param) -> f64 {
        match param {
            Param::M0 => 1.0,
            Param::M0s => self.m0s,
            Param::R1f | Param::R1 => self.r1f,
            Param::R2f => self.r2f,
            Param::Rx => self.rx,
            Param::R1s => self.r1s,
            Param::T2s => self.t2s,
            Param::Omega0 => self.omega0,
            Param::B1 => self.b1,
        }
    }

    /// Copy with one parameter replaced. `R1` sets both longitudinal rates.
    pub fn with(&self, param: Param, value: f64) -> Self {
        let mut p = *self;
        match param {
            Param::M0 => {}
            Param::M0s => p.m0s = value,
            Param::R1f => p.r1f = value,
            Param::R1 => {
                p.r1f = value;
                p.r1s = value;
            }
            Param::R2f => p.r2f = value,
            Param::Rx => p.rx = value,
            Param::R1s => p.r1s = value,
            Param::T2s => p.t2s = value,
            Param::Omega0 => p.omega0 = value,
            Param::B1 => p.b1 = value,
        }
        p
    }
}

/// Differentiable model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Param {
    /// Signal scale (proton density times receive gain).
    M0,
    M0s,
    R1f,
    R2f,
    Rx,
    R1s,
    /// Constrained longitudinal rate, R1f = R1s.
    R1,
    T2s,
    Omega0,
    B1,
}

impl Param {
    pub const ALL: [Param; 10] = [
        Param::M0,
        Param::M0s,
        Param::R1f,
        Param::R2f,
        Param::Rx,
        Param::R1s,
        Param::R1,
        Param::T2s,
        Param::Omega0,
        Param::B1,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Param::M0 => "m0",
            Param::M0s => "m0s",
            Param::R1f => "r1f",
            Param::R2f => "r2f",
            Param::Rx => "rx",
            Param::R1s => "r1s",
            Param::R1 => "r1",
            Param::T2s => "t2s",
            Param::Omega0 => "omega0",
            Param::B1 => "b1",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Param {
    type Err = GblochError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Param::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| GblochError::ConfigError(format!("unknown parameter '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::IDX_XF;

    #[test]
    fn test_default_tissue_is_valid() {
        let p = TissueParams::default();
        assert!(p.validate().is_ok());
        assert!((p.m0f() + p.m0s - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_equilibrium_layout() {
        let p = TissueParams::default();
        let m = p.equilibrium();
        assert_eq!(m[IDX_XF], 0.0);
        assert!((m[IDX_ZF] - 0.861).abs() < 1e-12);
        assert!((m[IDX_ZS] - 0.139).abs() < 1e-12);
        assert_eq!(m[IDX_ONE], 1.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let p = TissueParams::default();
        assert!(p.with(Param::M0s, 1.0).validate().is_err());
        assert!(p.with(Param::M0s, -0.1).validate().is_err());
        assert!(p.with(Param::T2s, 0.0).validate().is_err());
        assert!(p.with(Param::B1, f64::NAN).validate().is_err());
        assert!(p.with(Param::Rx, -1.0).validate().is_err());
    }

    #[test]
    fn test_constrained_r1_sets_both_rates() {
        let p = TissueParams::default().with(Param::R1, 0.9);
        assert_eq!(p.r1f, 0.9);
        assert_eq!(p.r1s, 0.9);
        assert_eq!(p.get(Param::R1), 0.9);
    }

    #[test]
    fn test_param_parse_roundtrip() {
        for param in Param::ALL {
            let parsed: Param = param.name().parse().unwrap();
            assert_eq!(parsed, param);
        }
        assert!("t3s".parse::<Param>().is_err());
        assert_eq!("B1".parse::<Param>().unwrap(), Param::B1);
    }

    #[test]
    fn test_param_serde_names() {
        let json = serde_json::to_string(&[Param::M0s, Param::Omega0]).unwrap();
        assert_eq!(json, r#"["m0s","omega0"]"#);
    }
}
