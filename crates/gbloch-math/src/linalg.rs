//! Linear algebra utilities.
//!
//! LU decomposition with partial pivoting, dense solves, inverse and the
//! matrix exponential used by every propagator in the workspace. The
//! matrices here are at most 11x11, so plain loops over `Array2` suffice.

use gbloch_types::error::{GblochError, GblochResult};
use ndarray::{Array1, Array2};

/// Relative pivot threshold below which a matrix is treated as singular.
const PIVOT_EPS: f64 = 1e-14;

/// Degree of the diagonal Padé approximant used by `expm`.
const PADE_DEGREE: usize = 6;

/// `expm` scales the argument until its 1-norm is at most this value.
const EXPM_NORM_TARGET: f64 = 0.5;

/// Packed LU factors `P A = L U` with unit-diagonal `L`.
#[derive(Debug, Clone)]
pub struct LuDecomposition {
    lu: Array2<f64>,
    perm: Vec<usize>,
    parity: f64,
}

fn require_square(a: &Array2<f64>, what: &str) -> GblochResult<usize> {
    let (m, n) = a.dim();
    if m != n {
        return Err(GblochError::LinAlg(format!(
            "{what} requires a square matrix, got {m}x{n}"
        )));
    }
    if n == 0 {
        return Err(GblochError::LinAlg(format!("{what} of an empty matrix")));
    }
    Ok(n)
}

/// Maximum absolute column sum.
pub fn norm_1(a: &Array2<f64>) -> f64 {
    a.columns()
        .into_iter()
        .map(|col| col.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0_f64, f64::max)
}

/// Doolittle LU decomposition with partial pivoting.
pub fn lu_decompose(a: &Array2<f64>) -> GblochResult<LuDecomposition> {
    let n = require_square(a, "LU decomposition")?;
    let scale = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !scale.is_finite() {
        return Err(GblochError::LinAlg(
            "LU decomposition of a non-finite matrix".to_string(),
        ));
    }
    if scale == 0.0 {
        return Err(GblochError::LinAlg("matrix is identically zero".to_string()));
    }

    let mut lu = a.clone();
    let mut perm: Vec<usize> = (0..n).collect();
    let mut parity = 1.0;

    for k in 0..n {
        let mut pivot_row = k;
        let mut pivot_abs = lu[[k, k]].abs();
        for i in (k + 1)..n {
            if lu[[i, k]].abs() > pivot_abs {
                pivot_abs = lu[[i, k]].abs();
                pivot_row = i;
            }
        }
        if pivot_abs < PIVOT_EPS * scale {
            return Err(GblochError::LinAlg(format!(
                "matrix is singular to working precision (pivot {k} = {pivot_abs:e})"
            )));
        }
        if pivot_row != k {
            for j in 0..n {
                lu.swap([k, j], [pivot_row, j]);
            }
            perm.swap(k, pivot_row);
            parity = -parity;
        }
        let pivot = lu[[k, k]];
        for i in (k + 1)..n {
            let factor = lu[[i, k]] / pivot;
            lu[[i, k]] = factor;
            if factor != 0.0 {
                for j in (k + 1)..n {
                    lu[[i, j]] -= factor * lu[[k, j]];
                }
            }
        }
    }

    Ok(LuDecomposition { lu, perm, parity })
}

impl LuDecomposition {
    pub fn dim(&self) -> usize {
        self.perm.len()
    }

    /// Solve `A x = b` for one right-hand side.
    pub fn solve(&self, b: &Array1<f64>) -> GblochResult<Array1<f64>> {
        let n = self.dim();
        if b.len() != n {
            return Err(GblochError::LinAlg(format!(
                "right-hand side has length {}, expected {n}",
                b.len()
            )));
        }
        let mut x: Array1<f64> = self.perm.iter().map(|&p| b[p]).collect();

        // Forward substitution (unit lower)
        for i in 0..n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.lu[[i, j]] * x[j];
            }
            x[i] = sum;
        }
        // Back substitution
        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..n {
                sum -= self.lu[[i, j]] * x[j];
            }
            x[i] = sum / self.lu[[i, i]];
        }
        Ok(x)
    }

    /// Solve `A X = B` column by column.
    pub fn solve_matrix(&self, b: &Array2<f64>) -> GblochResult<Array2<f64>> {
        let n = self.dim();
        if b.nrows() != n {
            return Err(GblochError::LinAlg(format!(
                "right-hand side has {} rows, expected {n}",
                b.nrows()
            )));
        }
        let mut out = Array2::zeros(b.dim());
        for (j, col) in b.columns().into_iter().enumerate() {
            let x = self.solve(&col.to_owned())?;
            out.column_mut(j).assign(&x);
        }
        Ok(out)
    }

    pub fn determinant(&self) -> f64 {
        (0..self.dim()).fold(self.parity, |acc, i| acc * self.lu[[i, i]])
    }
}

/// Solve `A x = b`.
pub fn lu_solve(a: &Array2<f64>, b: &Array1<f64>) -> GblochResult<Array1<f64>> {
    lu_decompose(a)?.solve(b)
}

/// Solve `A X = B` for several right-hand sides sharing one factorization.
pub fn solve_multi(a: &Array2<f64>, b: &Array2<f64>) -> GblochResult<Array2<f64>> {
    lu_decompose(a)?.solve_matrix(b)
}

/// Matrix inverse via LU.
pub fn inverse(a: &Array2<f64>) -> GblochResult<Array2<f64>> {
    let n = require_square(a, "inverse")?;
    lu_decompose(a)?.solve_matrix(&Array2::eye(n))
}

/// Matrix exponential by scaling and squaring with a diagonal Padé
/// approximant.
///
/// `A` is scaled by `2^-s` so that `||A||_1 <= 0.5`, the (6,6) Padé
/// approximant `D^-1 N` is formed, and the result is squared `s` times.
/// For the norms reached here the truncation error is below f64 rounding.
pub fn expm(a: &Array2<f64>) -> GblochResult<Array2<f64>> {
    let n = require_square(a, "expm")?;
    let norm = norm_1(a);
    if !norm.is_finite() {
        return Err(GblochError::LinAlg(
            "expm of a non-finite matrix".to_string(),
        ));
    }
    if norm == 0.0 {
        return Ok(Array2::eye(n));
    }

    let squarings = if norm > EXPM_NORM_TARGET {
        (norm / EXPM_NORM_TARGET).log2().ceil() as i32
    } else {
        0
    };
    let x = a * 2.0_f64.powi(-squarings);

    let q = PADE_DEGREE;
    let mut c = 1.0;
    let mut numer = Array2::<f64>::eye(n);
    let mut denom = Array2::<f64>::eye(n);
    let mut x_pow = Array2::<f64>::eye(n);
    for k in 1..=q {
        c *= (q - k + 1) as f64 / (k * (2 * q - k + 1)) as f64;
        x_pow = x_pow.dot(&x);
        numer.scaled_add(c, &x_pow);
        let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
        denom.scaled_add(sign * c, &x_pow);
    }

    let mut e = solve_multi(&denom, &numer)?;
    for _ in 0..squarings {
        e = e.dot(&e);
    }
    Ok(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .fold(0.0_f64, |acc, (x, y)| acc.max((x - y).abs()))
    }

    #[test]
    fn test_lu_solve_known_system() {
        let a = array![[2.0, 1.0, -1.0], [-3.0, -1.0, 2.0], [-2.0, 1.0, 2.0]];
        let b = array![8.0, -11.0, -3.0];
        let x = lu_solve(&a, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
        assert!((x[2] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_lu_requires_pivoting() {
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        let b = array![3.0, 5.0];
        let x = lu_solve(&a, &b).unwrap();
        assert!((x[0] - 5.0).abs() < 1e-15);
        assert!((x[1] - 3.0).abs() < 1e-15);
        assert!((lu_decompose(&a).unwrap().determinant() + 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(lu_solve(&a, &array![1.0, 1.0]).is_err());
        assert!(inverse(&Array2::zeros((3, 3))).is_err());
        assert!(inverse(&Array2::zeros((2, 3))).is_err());
    }

    #[test]
    fn test_inverse_times_matrix_is_identity() {
        let a = array![[4.0, 7.0, 2.0], [3.0, 6.0, 1.0], [2.0, 5.0, 3.0]];
        let inv = inverse(&a).unwrap();
        let prod = a.dot(&inv);
        assert!(max_abs_diff(&prod, &Array2::eye(3)) < 1e-12);
    }

    #[test]
    fn test_expm_zero_is_identity() {
        let e = expm(&Array2::zeros((4, 4))).unwrap();
        assert_eq!(e, Array2::<f64>::eye(4));
    }

    #[test]
    fn test_expm_diagonal() {
        let a = array![[1.0, 0.0], [0.0, -2.0]];
        let e = expm(&a).unwrap();
        assert!((e[[0, 0]] - 1.0_f64.exp()).abs() < 1e-13);
        assert!((e[[1, 1]] - (-2.0_f64).exp()).abs() < 1e-14);
        assert!(e[[0, 1]].abs() < 1e-15);
    }

    #[test]
    fn test_expm_rotation() {
        let theta = 2.3;
        let a = array![[0.0, -theta], [theta, 0.0]];
        let e = expm(&a).unwrap();
        assert!((e[[0, 0]] - theta.cos()).abs() < 1e-13);
        assert!((e[[1, 0]] - theta.sin()).abs() < 1e-13);
        assert!((e[[0, 1]] + theta.sin()).abs() < 1e-13);
    }

    #[test]
    fn test_expm_nilpotent() {
        // exp([[0, t], [0, 0]]) = [[1, t], [0, 1]]
        let a = array![[0.0, 3.5], [0.0, 0.0]];
        let e = expm(&a).unwrap();
        assert!(max_abs_diff(&e, &array![[1.0, 3.5], [0.0, 1.0]]) < 1e-13);
    }

    #[test]
    fn test_expm_stiff_decay() {
        let a = array![[-8.0e4, 0.0], [0.0, -0.5]];
        let e = expm(&a).unwrap();
        assert!(e[[0, 0]].abs() < 1e-300);
        assert!((e[[1, 1]] - (-0.5_f64).exp()).abs() < 1e-13);
    }

    #[test]
    fn test_expm_rejects_nan() {
        let a = array![[f64::NAN, 0.0], [0.0, 1.0]];
        assert!(expm(&a).is_err());
    }
}
