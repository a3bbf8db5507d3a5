// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::error::{GblochError, GblochResult};
use crate::state::{Param, TissueParams};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Top-level analysis configuration.
/// Every section is optional in JSON and falls back to the white-matter
/// defaults used throughout the analyses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub tissue: TissueParams,
    #[serde(default)]
    pub lineshape: LineshapeKind,
    #[serde(default)]
    pub r2sl: R2slGridConfig,
    #[serde(default)]
    pub sir: SirConfig,
    #[serde(default)]
    pub vfa: VfaConfig,
    #[serde(default)]
    pub afi: AfiConfig,
    #[serde(default)]
    pub fit: FitConfig,
    #[serde(default)]
    pub noise: NoiseConfig,
}

/// Semi-solid lineshape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineshapeKind {
    Lorentzian,
    Gaussian,
    #[default]
    SuperLorentzian,
}

/// Grid of the precomputed linearized R2sl table, in scale-free units
/// `tau = T_RF / T2s`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct R2slGridConfig {
    #[serde(default = "default_tau_min")]
    pub tau_min: f64,
    #[serde(default = "default_tau_max")]
    pub tau_max: f64,
    #[serde(default = "default_n_tau")]
    pub n_tau: usize,
    /// Largest tabulated effective flip angle (rad).
    #[serde(default = "default_alpha_max")]
    pub alpha_max: f64,
    #[serde(default = "default_n_alpha")]
    pub n_alpha: usize,
    /// Time steps of the generalized-Bloch solve per pulse.
    #[serde(default = "default_n_steps")]
    pub n_steps: usize,
}

fn default_tau_min() -> f64 {
    1.0
}
fn default_tau_max() -> f64 {
    3000.0
}
fn default_n_tau() -> usize {
    24
}
fn default_alpha_max() -> f64 {
    1.5 * PI
}
fn default_n_alpha() -> usize {
    25
}
fn default_n_steps() -> usize {
    100
}

impl Default for R2slGridConfig {
    fn default() -> Self {
        R2slGridConfig {
            tau_min: default_tau_min(),
            tau_max: default_tau_max(),
            n_tau: default_n_tau(),
            alpha_max: default_alpha_max(),
            n_alpha: default_n_alpha(),
            n_steps: default_n_steps(),
        }
    }
}

/// Selective inversion recovery protocol. Times in seconds.
///
/// Each `(t_i[k], t_d[k])` pair is one steady-state experiment:
/// inversion, wait `t_i`, read-out, wait `t_d`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SirConfig {
    #[serde(default = "default_sir_ti")]
    pub t_i: Vec<f64>,
    #[serde(default = "default_sir_td")]
    pub t_d: Vec<f64>,
    /// Duration of the rectangular inversion pulse.
    #[serde(default = "default_sir_t_inv")]
    pub t_inversion: f64,
    /// Duration of the rectangular 90° read-out pulse.
    #[serde(default = "default_sir_t_exc")]
    pub t_excitation: f64,
    /// Semi-solid saturation assumed by the conventional fit model.
    #[serde(default = "default_sir_ss")]
    pub ss_fixed: f64,
    /// Exchange rate held fixed by the conventional fit model; `None` uses
    /// the simulated tissue's value.
    #[serde(default)]
    pub rx_fixed: Option<f64>,
    /// Fit Rx in the conventional model instead of fixing it. Needs at
    /// least five (t_i, t_d) pairs.
    #[serde(default)]
    pub fit_rx: bool,
    #[serde(default = "default_sir_fit_params")]
    pub fit_params: Vec<Param>,
}

fn default_sir_ti() -> Vec<f64> {
    vec![10e-3, 10e-3, 278e-3, 1007e-3]
}
fn default_sir_td() -> Vec<f64> {
    vec![684e-3, 4171e-3, 2730e-3, 10e-3]
}
fn default_sir_t_inv() -> f64 {
    1e-3
}
fn default_sir_t_exc() -> f64 {
    1e-3
}
fn default_sir_ss() -> f64 {
    crate::constants::SIR_SS_DEFAULT
}
fn default_sir_fit_params() -> Vec<Param> {
    vec![Param::M0, Param::M0s, Param::R1, Param::Rx]
}

impl Default for SirConfig {
    fn default() -> Self {
        SirConfig {
            t_i: default_sir_ti(),
            t_d: default_sir_td(),
            t_inversion: default_sir_t_inv(),
            t_excitation: default_sir_t_exc(),
            ss_fixed: default_sir_ss(),
            rx_fixed: None,
            fit_rx: false,
            fit_params: default_sir_fit_params(),
        }
    }
}

/// Variable-flip-angle spoiled gradient echo (DESPOT1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VfaConfig {
    #[serde(default = "default_vfa_tr")]
    pub tr: f64,
    #[serde(default = "default_vfa_t_rf")]
    pub t_rf: f64,
    #[serde(default = "default_vfa_angles")]
    pub flip_angles_deg: Vec<f64>,
    #[serde(default = "default_vfa_fit_params")]
    pub fit_params: Vec<Param>,
}

fn default_vfa_tr() -> f64 {
    15e-3
}
fn default_vfa_t_rf() -> f64 {
    0.5e-3
}
fn default_vfa_angles() -> Vec<f64> {
    vec![4.0, 18.0]
}
fn default_vfa_fit_params() -> Vec<Param> {
    vec![Param::M0, Param::R1]
}

impl Default for VfaConfig {
    fn default() -> Self {
        VfaConfig {
            tr: default_vfa_tr(),
            t_rf: default_vfa_t_rf(),
            flip_angles_deg: default_vfa_angles(),
            fit_params: default_vfa_fit_params(),
        }
    }
}

/// Actual flip-angle imaging: one flip angle, two interleaved TRs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AfiConfig {
    #[serde(default = "default_afi_tr1")]
    pub tr1: f64,
    #[serde(default = "default_afi_tr2")]
    pub tr2: f64,
    #[serde(default = "default_afi_t_rf")]
    pub t_rf: f64,
    #[serde(default = "default_afi_angle")]
    pub flip_angle_deg: f64,
    #[serde(default = "default_afi_fit_params")]
    pub fit_params: Vec<Param>,
}

fn default_afi_tr1() -> f64 {
    20e-3
}
fn default_afi_tr2() -> f64 {
    100e-3
}
fn default_afi_t_rf() -> f64 {
    0.5e-3
}
fn default_afi_angle() -> f64 {
    60.0
}
fn default_afi_fit_params() -> Vec<Param> {
    vec![Param::M0, Param::B1]
}

impl Default for AfiConfig {
    fn default() -> Self {
        AfiConfig {
            tr1: default_afi_tr1(),
            tr2: default_afi_tr2(),
            t_rf: default_afi_t_rf(),
            flip_angle_deg: default_afi_angle(),
            fit_params: default_afi_fit_params(),
        }
    }
}

/// Damped Gauss-Newton settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    #[serde(default = "default_fit_max_iter")]
    pub max_iterations: usize,
    #[serde(default = "default_fit_tol")]
    pub tolerance: f64,
    /// Initial Levenberg-Marquardt damping.
    #[serde(default = "default_fit_lambda")]
    pub lambda: f64,
    /// Relative finite-difference step.
    #[serde(default = "default_fit_fd_step")]
    pub fd_step: f64,
    /// Tikhonov weight on the step, relative to the largest diagonal of `JᵀJ`.
    #[serde(default = "default_fit_tikhonov")]
    pub tikhonov: f64,
}

fn default_fit_max_iter() -> usize {
    200
}
fn default_fit_tol() -> f64 {
    1e-12
}
fn default_fit_lambda() -> f64 {
    1e-3
}
fn default_fit_fd_step() -> f64 {
    1e-6
}
fn default_fit_tikhonov() -> f64 {
    1e-10
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            max_iterations: default_fit_max_iter(),
            tolerance: default_fit_tol(),
            lambda: default_fit_lambda(),
            fd_step: default_fit_fd_step(),
            tikhonov: default_fit_tikhonov(),
        }
    }
}

/// Gaussian noise model for CRB scaling and Monte-Carlo checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    #[serde(default = "default_trials")]
    pub n_trials: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_sigma() -> f64 {
    1e-3
}
fn default_trials() -> usize {
    200
}
fn default_seed() -> u64 {
    42
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            sigma: default_sigma(),
            n_trials: default_trials(),
            seed: default_seed(),
        }
    }
}

fn check_positive(name: &str, value: f64) -> GblochResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(GblochError::ConfigError(format!(
            "{name} must be finite and > 0, got {value}"
        )));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> GblochResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(GblochError::ConfigError(format!(
            "{name} must be finite and >= 0, got {value}"
        )));
    }
    Ok(())
}

fn check_fit_params(section: &str, params: &[Param], n_signals: usize) -> GblochResult<()> {
    if params.is_empty() {
        return Err(GblochError::ConfigError(format!(
            "{section}.fit_params must not be empty"
        )));
    }
    if params.len() > n_signals {
        return Err(GblochError::ConfigError(format!(
            "{section}: {} fit parameters but only {n_signals} signals",
            params.len()
        )));
    }
    for (i, p) in params.iter().enumerate() {
        if params[..i].contains(p) {
            return Err(GblochError::ConfigError(format!(
                "{section}.fit_params lists '{p}' twice"
            )));
        }
    }
    if params.contains(&Param::R1) && (params.contains(&Param::R1f) || params.contains(&Param::R1s))
    {
        return Err(GblochError::ConfigError(format!(
            "{section}.fit_params: 'r1' cannot be combined with 'r1f' or 'r1s'"
        )));
    }
    Ok(())
}

impl R2slGridConfig {
    pub fn validate(&self) -> GblochResult<()> {
        check_positive("r2sl.tau_min", self.tau_min)?;
        check_positive("r2sl.tau_max", self.tau_max)?;
        if self.tau_max <= self.tau_min {
            return Err(GblochError::ConfigError(
                "r2sl.tau_max must exceed r2sl.tau_min".to_string(),
            ));
        }
        check_positive("r2sl.alpha_max", self.alpha_max)?;
        if self.n_tau < 2 || self.n_alpha < 2 {
            return Err(GblochError::ConfigError(
                "r2sl grid needs at least 2 points per axis".to_string(),
            ));
        }
        if self.n_steps < 4 {
            return Err(GblochError::ConfigError(
                "r2sl.n_steps must be >= 4".to_string(),
            ));
        }
        Ok(())
    }
}

impl SirConfig {
    pub fn validate(&self) -> GblochResult<()> {
        if self.t_i.is_empty() || self.t_i.len() != self.t_d.len() {
            return Err(GblochError::ConfigError(format!(
                "sir.t_i and sir.t_d must be non-empty and equally long: {} vs {}",
                self.t_i.len(),
                self.t_d.len()
            )));
        }
        for (&ti, &td) in self.t_i.iter().zip(self.t_d.iter()) {
            check_non_negative("sir.t_i", ti)?;
            check_non_negative("sir.t_d", td)?;
        }
        check_positive("sir.t_inversion", self.t_inversion)?;
        check_positive("sir.t_excitation", self.t_excitation)?;
        if !self.ss_fixed.is_finite() || self.ss_fixed.abs() > 1.0 {
            return Err(GblochError::ConfigError(format!(
                "sir.ss_fixed must be in [-1, 1], got {}",
                self.ss_fixed
            )));
        }
        if let Some(rx) = self.rx_fixed {
            check_non_negative("sir.rx_fixed", rx)?;
        }
        if self.fit_rx && self.t_i.len() < 5 {
            return Err(GblochError::ConfigError(format!(
                "sir.fit_rx needs at least 5 (t_i, t_d) pairs, got {}",
                self.t_i.len()
            )));
        }
        check_fit_params("sir", &self.fit_params, self.t_i.len())
    }
}

impl VfaConfig {
    pub fn validate(&self) -> GblochResult<()> {
        check_positive("vfa.tr", self.tr)?;
        check_positive("vfa.t_rf", self.t_rf)?;
        if self.t_rf >= self.tr {
            return Err(GblochError::ConfigError(
                "vfa.t_rf must be shorter than vfa.tr".to_string(),
            ));
        }
        if self.flip_angles_deg.len() < 2 {
            return Err(GblochError::ConfigError(
                "vfa needs at least two flip angles".to_string(),
            ));
        }
        for &a in &self.flip_angles_deg {
            if !a.is_finite() || a <= 0.0 || a >= 180.0 {
                return Err(GblochError::ConfigError(format!(
                    "vfa flip angle must be in (0, 180) deg, got {a}"
                )));
            }
        }
        check_fit_params("vfa", &self.fit_params, self.flip_angles_deg.len())
    }

    pub fn flip_angles_rad(&self) -> Vec<f64> {
        self.flip_angles_deg.iter().map(|a| a.to_radians()).collect()
    }
}

impl AfiConfig {
    pub fn validate(&self) -> GblochResult<()> {
        check_positive("afi.tr1", self.tr1)?;
        check_positive("afi.tr2", self.tr2)?;
        check_positive("afi.t_rf", self.t_rf)?;
        if self.tr2 <= self.tr1 {
            return Err(GblochError::ConfigError(
                "afi.tr2 must be longer than afi.tr1".to_string(),
            ));
        }
        if self.t_rf >= self.tr1 {
            return Err(GblochError::ConfigError(
                "afi.t_rf must be shorter than afi.tr1".to_string(),
            ));
        }
        if !self.flip_angle_deg.is_finite()
            || self.flip_angle_deg <= 0.0
            || self.flip_angle_deg >= 180.0
        {
            return Err(GblochError::ConfigError(format!(
                "afi.flip_angle_deg must be in (0, 180), got {}",
                self.flip_angle_deg
            )));
        }
        check_fit_params("afi", &self.fit_params, 2)
    }

    /// TR ratio n = TR2 / TR1.
    pub fn tr_ratio(&self) -> f64 {
        self.tr2 / self.tr1
    }
}

impl FitConfig {
    pub fn validate(&self) -> GblochResult<()> {
        if self.max_iterations == 0 {
            return Err(GblochError::ConfigError(
                "fit.max_iterations must be >= 1".to_string(),
            ));
        }
        check_positive("fit.tolerance", self.tolerance)?;
        check_positive("fit.lambda", self.lambda)?;
        check_positive("fit.fd_step", self.fd_step)?;
        check_positive("fit.tikhonov", self.tikhonov)
    }
}

impl NoiseConfig {
    pub fn validate(&self) -> GblochResult<()> {
        check_positive("noise.sigma", self.sigma)?;
        if self.n_trials < 2 {
            return Err(GblochError::ConfigError(
                "noise.n_trials must be >= 2".to_string(),
            ));
        }
        Ok(())
    }
}

impl AnalysisConfig {
    /// Load from a JSON file; missing sections take their defaults.
    pub fn from_file(path: &str) -> GblochResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GblochResult<()> {
        self.tissue.validate()?;
        self.r2sl.validate()?;
        self.sir.validate()?;
        self.vfa.validate()?;
        self.afi.validate()?;
        self.fit.validate()?;
        self.noise.validate()
    }
}
