// ─────────────────────────────────────────────────────────────────────
// gBloch qMRI — Property-Based Tests (proptest) for gbloch-math
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for gbloch-math using proptest.
//!
//! Covers: LU solve, inverse, matrix exponential semigroup identities,
//! bilinear interpolation bounds.

use gbloch_math::interp::{linspace, Table2D};
use gbloch_math::linalg::{expm, inverse, lu_solve};
use ndarray::{Array1, Array2};
use proptest::prelude::*;

fn matrix_from(n: usize, seed: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((n, n), |(i, j)| seed[(i * n + j) % seed.len()])
}

fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .fold(0.0_f64, |acc, (x, y)| acc.max((x - y).abs()))
}

// ── LU Solver Properties ─────────────────────────────────────────────

proptest! {
    /// For any diagonally dominant system, x = lu_solve(A, b) satisfies Ax = b.
    #[test]
    fn lu_solve_ax_eq_b(
        n in 2usize..11,
        seed in prop::collection::vec(-1.0f64..1.0, 16..64),
    ) {
        let mut a = matrix_from(n, &seed);
        for i in 0..n {
            a[[i, i]] += n as f64 + 1.0;
        }
        let b: Array1<f64> = (0..n).map(|i| (i as f64 + 1.0).sin()).collect();
        let x = lu_solve(&a, &b).unwrap();
        let ax = a.dot(&x);
        for i in 0..n {
            prop_assert!((ax[i] - b[i]).abs() < 1e-10, "row {}: {} vs {}", i, ax[i], b[i]);
        }
    }

    /// A * inverse(A) = I for well-conditioned matrices.
    #[test]
    fn inverse_is_two_sided(
        n in 2usize..11,
        seed in prop::collection::vec(-1.0f64..1.0, 16..64),
    ) {
        let mut a = matrix_from(n, &seed);
        for i in 0..n {
            a[[i, i]] += n as f64 + 1.0;
        }
        let inv = inverse(&a).unwrap();
        prop_assert!(max_abs_diff(&a.dot(&inv), &Array2::eye(n)) < 1e-10);
        prop_assert!(max_abs_diff(&inv.dot(&a), &Array2::eye(n)) < 1e-10);
    }
}

// ── Matrix Exponential Properties ────────────────────────────────────

proptest! {
    /// exp(A) exp(-A) = I.
    #[test]
    fn expm_inverse_pair(
        n in 1usize..8,
        seed in prop::collection::vec(-2.0f64..2.0, 16..64),
    ) {
        let a = matrix_from(n, &seed);
        let e = expm(&a).unwrap();
        let e_neg = expm(&a.mapv(|v| -v)).unwrap();
        let scale = e.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()))
            * e_neg.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
        prop_assert!(max_abs_diff(&e.dot(&e_neg), &Array2::eye(n)) < 1e-9 * scale);
    }

    /// exp(sA) exp(tA) = exp((s+t)A).
    #[test]
    fn expm_semigroup(
        n in 1usize..8,
        seed in prop::collection::vec(-0.5f64..0.5, 16..64),
        s in 0.0f64..1.0,
        t in 0.0f64..1.0,
    ) {
        let a = matrix_from(n, &seed);
        let lhs = expm(&(&a * s)).unwrap().dot(&expm(&(&a * t)).unwrap());
        let rhs = expm(&(&a * (s + t))).unwrap();
        let scale = rhs.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
        prop_assert!(max_abs_diff(&lhs, &rhs) < 1e-10 * scale);
    }

    /// A diagonal exponent exponentiates element-wise.
    #[test]
    fn expm_diagonal_matches_scalar(d in prop::collection::vec(-5.0f64..5.0, 1..11)) {
        let n = d.len();
        let mut a = Array2::zeros((n, n));
        for (i, &v) in d.iter().enumerate() {
            a[[i, i]] = v;
        }
        let e = expm(&a).unwrap();
        for (i, &v) in d.iter().enumerate() {
            prop_assert!((e[[i, i]] - v.exp()).abs() < 1e-12 * v.exp().max(1.0));
        }
    }
}

// ── Interpolation Properties ─────────────────────────────────────────

proptest! {
    /// Interpolated values stay within the min/max of the table.
    #[test]
    fn bilinear_bounded_by_table(
        x in -0.5f64..1.5,
        y in -0.5f64..1.5,
    ) {
        let t = Table2D::from_fn(linspace(0.0, 1.0, 6), linspace(0.0, 1.0, 4), |x, y| {
            Ok((3.0 * x).sin() * (2.0 * y).cos())
        })
        .unwrap();
        let lo = t.values.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = t.values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let v = t.eval(x, y);
        prop_assert!(v >= lo - 1e-12 && v <= hi + 1e-12);
    }
}
