// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — R2sl and Steady-State Benchmark
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

use criterion::{criterion_group, criterion_main, Criterion};
use gbloch_core::jacobian::signal_jacobian;
use gbloch_core::r2sl::{r2sl_scaled, R2slModel, R2slTable};
use gbloch_core::sequence::{ReadoutKind, Sequence};
use gbloch_types::config::{LineshapeKind, R2slGridConfig};
use gbloch_types::state::{Param, TissueParams};
use std::f64::consts::PI;
use std::hint::black_box;

fn small_grid() -> R2slGridConfig {
    R2slGridConfig {
        tau_min: 10.0,
        tau_max: 500.0,
        n_tau: 8,
        alpha_max: 1.5 * PI,
        n_alpha: 9,
        n_steps: 60,
    }
}

fn sir_block(ti: f64, td: f64) -> Sequence {
    Sequence::new()
        .pulse(PI, 1e-3)
        .free(ti)
        .readout(ReadoutKind::Longitudinal)
        .pulse(PI / 2.0, 1e-3)
        .spoil()
        .free(td)
}

fn bench_r2sl_direct(c: &mut Criterion) {
    c.bench_function("r2sl_direct_super_lorentzian", |b| {
        b.iter(|| r2sl_scaled(LineshapeKind::SuperLorentzian, black_box(80.0), 1.2, 100))
    });
}

fn bench_r2sl_table(c: &mut Criterion) {
    c.bench_function("r2sl_table_precompute_gaussian", |b| {
        b.iter(|| R2slTable::precompute(LineshapeKind::Gaussian, black_box(&small_grid())))
    });

    if let Ok(table) = R2slTable::precompute(LineshapeKind::Gaussian, &small_grid()) {
        c.bench_function("r2sl_table_lookup", |b| {
            b.iter(|| table.r2sl(black_box(1e-3), 2.0, 12e-6))
        });
    }
}

fn bench_sir_jacobian(c: &mut Criterion) {
    let Ok(table) = R2slTable::precompute(LineshapeKind::Gaussian, &small_grid()) else {
        return;
    };
    let p = TissueParams::default();
    let seqs: Vec<Sequence> = [(10e-3, 684e-3), (10e-3, 4171e-3), (278e-3, 2730e-3), (1007e-3, 10e-3)]
        .iter()
        .map(|&(ti, td)| sir_block(ti, td))
        .collect();
    let params = [Param::M0, Param::M0s, Param::R1, Param::Rx, Param::B1];
    c.bench_function("sir_signal_jacobian", |b| {
        b.iter(|| signal_jacobian(black_box(&seqs), &p, &table, &params))
    });
}

criterion_group!(benches, bench_r2sl_direct, bench_r2sl_table, bench_sir_jacobian);
criterion_main!(benches);
