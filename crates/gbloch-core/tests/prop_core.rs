// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Property-Based Tests (proptest) for gbloch-core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for gbloch-core using proptest.
//!
//! Covers: propagator structure, steady-state bounds, read-out consistency
//! and R2sl positivity.

use gbloch_core::propagator::{free_precession, rf_pulse};
use gbloch_core::r2sl::{r2sl_scaled, LorentzianR2sl};
use gbloch_core::sequence::{ReadoutKind, Sequence};
use gbloch_types::config::LineshapeKind;
use gbloch_types::constants::{IDX_ONE, IDX_ZF, IDX_ZS, N_STATE};
use gbloch_types::state::TissueParams;
use ndarray::Array1;
use proptest::prelude::*;

fn tissue_strategy() -> impl Strategy<Value = TissueParams> {
    (
        0.01f64..0.3,
        0.2f64..2.0,
        5.0f64..60.0,
        1.0f64..100.0,
        0.5f64..6.0,
        5e-6f64..20e-6,
        -50.0f64..50.0,
        0.7f64..1.3,
    )
        .prop_map(|(m0s, r1f, r2f, rx, r1s, t2s, omega0, b1)| TissueParams {
            m0s,
            r1f,
            r2f,
            rx,
            r1s,
            t2s,
            omega0,
            b1,
        })
}

// ── Propagator Properties ────────────────────────────────────────────

proptest! {
    /// Pulses and free precession keep the homogeneous row [0 … 0 1].
    #[test]
    fn propagators_are_affine(
        p in tissue_strategy(),
        alpha in -3.0f64..3.0,
        t in 0.0f64..2.0,
    ) {
        for u in [
            free_precession(t, &p).unwrap(),
            rf_pulse(alpha, 1e-3, &p, &LorentzianR2sl).unwrap(),
        ] {
            for j in 0..N_STATE {
                let expected = if j == IDX_ONE { 1.0 } else { 0.0 };
                prop_assert!((u[[IDX_ONE, j]] - expected).abs() < 1e-12);
            }
        }
    }

    /// Free precession pulls every state towards equilibrium in the norm
    /// weighted by the inverse pool sizes, where exchange is symmetric.
    #[test]
    fn free_precession_contracts_to_equilibrium(
        p in tissue_strategy(),
        zf in -1.0f64..1.0,
        zs in -0.3f64..0.3,
    ) {
        let eq = Array1::from(p.equilibrium().to_vec());
        let mut m = eq.clone();
        m[IDX_ZF] = zf;
        m[IDX_ZS] = zs;
        let m1 = free_precession(0.5, &p).unwrap().dot(&m);
        let dist = |v: &Array1<f64>| {
            ((v[IDX_ZF] - eq[IDX_ZF]).powi(2) / p.m0f()
                + (v[IDX_ZS] - eq[IDX_ZS]).powi(2) / p.m0s)
                .sqrt()
        };
        prop_assert!(dist(&m1) <= dist(&m) + 1e-12, "{} > {}", dist(&m1), dist(&m));
    }
}

// ── Steady-State Properties ──────────────────────────────────────────

proptest! {
    /// Spoiled steady state stays inside the equilibrium magnitudes.
    #[test]
    fn spoiled_steady_state_bounded(
        p in tissue_strategy(),
        alpha in 0.01f64..1.5,
        tr in 5e-3f64..50e-3,
    ) {
        let seq = Sequence::new()
            .pulse(alpha, 5e-4)
            .readout(ReadoutKind::Transverse)
            .spoil()
            .free(tr - 5e-4);
        let m = seq.steady_state(&p, &LorentzianR2sl).unwrap();
        prop_assert!(m[IDX_ZF] > 0.0 && m[IDX_ZF] <= p.m0f() + 1e-12);
        prop_assert!(m[IDX_ZS] >= 0.0 && m[IDX_ZS] <= p.m0s + 1e-12);
        let s = seq.signals(&p, &LorentzianR2sl).unwrap()[0];
        prop_assert!(s > 0.0 && s <= p.m0f());
    }

    /// Inversion recovery read-out lies between -m0f and m0f.
    #[test]
    fn inversion_readout_bounded(
        p in tissue_strategy(),
        ti in 1e-3f64..3.0,
        td in 1e-3f64..5.0,
    ) {
        let seq = Sequence::new()
            .pulse(std::f64::consts::PI, 1e-3)
            .free(ti)
            .readout(ReadoutKind::Longitudinal)
            .pulse(std::f64::consts::FRAC_PI_2, 1e-3)
            .spoil()
            .free(td);
        let s = seq.signals(&p, &LorentzianR2sl).unwrap()[0];
        prop_assert!(s.abs() <= p.m0f() + 1e-12, "s = {}", s);
    }
}

// ── R2sl Properties ──────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// The linearized rate is positive and finite for Gaussian lines.
    #[test]
    fn r2sl_positive(tau in 2.0f64..200.0, alpha in 0.0f64..3.0) {
        let f = r2sl_scaled(LineshapeKind::Gaussian, tau, alpha, 40).unwrap();
        prop_assert!(f.is_finite() && f > 0.0, "f = {}", f);
    }
}
