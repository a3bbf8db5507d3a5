// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Command-Line Interface
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! gBloch CLI

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use gbloch_analysis::afi::{afi_bias, afi_crb};
use gbloch_analysis::crb::CrbReport;
use gbloch_analysis::monte_carlo::monte_carlo;
use gbloch_analysis::protocol::{precompute_r2sl, AfiProtocol, SirProtocol, VfaProtocol};
use gbloch_analysis::sir::{sir_bias, sir_crb};
use gbloch_analysis::sweep::sweep;
use gbloch_analysis::vfa::{vfa_bias, vfa_crb, B1Assumption};
use gbloch_core::r2sl::{DirectR2sl, R2slModel, R2slTable};
use gbloch_types::config::AnalysisConfig;
use gbloch_types::error::GblochResult;
use gbloch_types::state::Param;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "gbloch")]
#[command(about = "Precision and bias of qMRI protocols under the generalized-Bloch model")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// Analysis configuration (JSON). Defaults to white matter at 3 T.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output file for results (pretty JSON). Defaults to stdout.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolKind {
    Sir,
    Vfa,
    Afi,
}

#[derive(Subcommand)]
enum Commands {
    /// Bias of the conventional SIR fit on gBloch signals
    Sir,

    /// Bias of DESPOT1 T1 on gBloch signals
    Vfa {
        /// Flip-angle calibration: nominal, true or afi
        #[arg(long, default_value = "nominal")]
        b1: B1Assumption,
    },

    /// Bias of the AFI B1 estimate
    Afi,

    /// Cramér-Rao bound of a protocol's fit parameters
    Crb {
        #[arg(short, long, value_enum)]
        protocol: ProtocolKind,

        /// Noise standard deviation; overrides noise.sigma.
        #[arg(long)]
        sigma: Option<f64>,
    },

    /// Repeat a bias analysis over a range of one tissue parameter
    Sweep {
        /// Bias analysis to run at each point
        #[arg(short, long, value_enum)]
        protocol: ProtocolKind,

        /// Tissue parameter (m0s, r1f, r2f, rx, r1s, r1, t2s, omega0, b1)
        #[arg(long)]
        param: Param,

        #[arg(long)]
        start: f64,

        #[arg(long)]
        stop: f64,

        #[arg(long, default_value = "11")]
        points: usize,

        /// Flip-angle calibration of the VFA analysis
        #[arg(long, default_value = "nominal")]
        b1: B1Assumption,
    },

    /// Empirical fit variance against the Cramér-Rao bound
    MonteCarlo {
        #[arg(short, long, value_enum)]
        protocol: ProtocolKind,

        /// Number of noise realizations; overrides noise.n_trials.
        #[arg(long)]
        trials: Option<usize>,

        /// RNG seed; overrides noise.seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Noise standard deviation; overrides noise.sigma.
        #[arg(long)]
        sigma: Option<f64>,
    },

    /// Linearized semi-solid R2sl of one rectangular pulse
    R2sl {
        /// Pulse duration (s)
        #[arg(long)]
        t_rf: f64,

        /// Nominal flip angle (deg)
        #[arg(long)]
        alpha_deg: f64,

        /// Semi-solid T2 (s); defaults to the configured tissue.
        #[arg(long)]
        t2s: Option<f64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    let mut cfg = load_config(cli.config.as_deref())?;
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Sir => cmd_sir(&cfg, output),
        Commands::Vfa { b1 } => cmd_vfa(&cfg, b1, output),
        Commands::Afi => cmd_afi(&cfg, output),
        Commands::Crb { protocol, sigma } => {
            if let Some(sigma) = sigma {
                cfg.noise.sigma = sigma;
            }
            cmd_crb(&cfg, protocol, output)
        }
        Commands::Sweep { protocol, param, start, stop, points, b1 } => {
            cmd_sweep(&cfg, protocol, param, start, stop, points, b1, output)
        }
        Commands::MonteCarlo { protocol, trials, seed, sigma } => {
            if let Some(trials) = trials {
                cfg.noise.n_trials = trials;
            }
            if let Some(seed) = seed {
                cfg.noise.seed = seed;
            }
            if let Some(sigma) = sigma {
                cfg.noise.sigma = sigma;
            }
            cmd_monte_carlo(&cfg, protocol, output)
        }
        Commands::R2sl { t_rf, alpha_deg, t2s } => cmd_r2sl(&cfg, t_rf, alpha_deg, t2s, output),
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    let cfg = match path {
        Some(p) => AnalysisConfig::from_file(&p.to_string_lossy())?,
        None => AnalysisConfig::default(),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn cmd_sir(cfg: &AnalysisConfig, output: Option<&PathBuf>) -> Result<()> {
    let table = precompute_r2sl(cfg)?;
    let report = sir_bias(cfg, &table)?;
    write_json(output, serde_json::to_value(report)?)
}

fn cmd_vfa(cfg: &AnalysisConfig, b1: B1Assumption, output: Option<&PathBuf>) -> Result<()> {
    let table = precompute_r2sl(cfg)?;
    let report = vfa_bias(cfg, &table, b1)?;
    write_json(output, serde_json::to_value(report)?)
}

fn cmd_afi(cfg: &AnalysisConfig, output: Option<&PathBuf>) -> Result<()> {
    let table = precompute_r2sl(cfg)?;
    let report = afi_bias(cfg, &table)?;
    write_json(output, serde_json::to_value(report)?)
}

fn crb_for(
    cfg: &AnalysisConfig,
    protocol: ProtocolKind,
    table: &R2slTable,
) -> GblochResult<CrbReport> {
    match protocol {
        ProtocolKind::Sir => sir_crb(cfg, table),
        ProtocolKind::Vfa => vfa_crb(cfg, table),
        ProtocolKind::Afi => afi_crb(cfg, table),
    }
}

fn cmd_crb(cfg: &AnalysisConfig, protocol: ProtocolKind, output: Option<&PathBuf>) -> Result<()> {
    let table = precompute_r2sl(cfg)?;
    let report = crb_for(cfg, protocol, &table)?;
    write_json(output, serde_json::to_value(report)?)
}

#[allow(clippy::too_many_arguments)]
fn cmd_sweep(
    cfg: &AnalysisConfig,
    protocol: ProtocolKind,
    param: Param,
    start: f64,
    stop: f64,
    points: usize,
    b1: B1Assumption,
    output: Option<&PathBuf>,
) -> Result<()> {
    let table = precompute_r2sl(cfg)?;
    let report = sweep(cfg, param, start, stop, points, |point| {
        let value = match protocol {
            ProtocolKind::Sir => serde_json::to_value(sir_bias(point, &table)?)?,
            ProtocolKind::Vfa => serde_json::to_value(vfa_bias(point, &table, b1)?)?,
            ProtocolKind::Afi => serde_json::to_value(afi_bias(point, &table)?)?,
        };
        Ok(value)
    })?;
    write_json(output, serde_json::to_value(report)?)
}

fn cmd_monte_carlo(
    cfg: &AnalysisConfig,
    protocol: ProtocolKind,
    output: Option<&PathBuf>,
) -> Result<()> {
    let table = precompute_r2sl(cfg)?;
    let report = match protocol {
        ProtocolKind::Sir => {
            let p = SirProtocol::new(&cfg.sir)?;
            monte_carlo(&p, &cfg.tissue, &table, &cfg.noise, &cfg.fit)?
        }
        ProtocolKind::Vfa => {
            let p = VfaProtocol::new(&cfg.vfa)?;
            monte_carlo(&p, &cfg.tissue, &table, &cfg.noise, &cfg.fit)?
        }
        ProtocolKind::Afi => {
            let p = AfiProtocol::new(&cfg.afi)?;
            monte_carlo(&p, &cfg.tissue, &table, &cfg.noise, &cfg.fit)?
        }
    };
    write_json(output, serde_json::to_value(report)?)
}

fn cmd_r2sl(
    cfg: &AnalysisConfig,
    t_rf: f64,
    alpha_deg: f64,
    t2s: Option<f64>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let t2s = t2s.unwrap_or(cfg.tissue.t2s);
    let alpha = alpha_deg.to_radians() * cfg.tissue.b1;
    let table = precompute_r2sl(cfg)?;
    let direct = DirectR2sl::new(cfg.lineshape, cfg.r2sl.n_steps);
    let r2sl_table = table.r2sl(t_rf, alpha, t2s)?;
    let r2sl_direct = direct.r2sl(t_rf, alpha, t2s)?;
    let (d_t2s, d_alpha) = table.r2sl_gradient(t_rf, alpha, t2s)?;
    write_json(
        output,
        serde_json::json!({
            "lineshape": cfg.lineshape,
            "t_rf": t_rf,
            "alpha": alpha,
            "t2s": t2s,
            "tau": t_rf / t2s,
            "r2sl_table": r2sl_table,
            "r2sl_direct": r2sl_direct,
            "relative_difference": (r2sl_table - r2sl_direct) / r2sl_direct,
            "d_r2sl_d_t2s": d_t2s,
            "d_r2sl_d_alpha": d_alpha,
        }),
    )
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
