//! Bilinear interpolation on rectilinear tables.
//!
//! Used for the precomputed R2sl table, where the first axis is
//! log-spaced pulse duration and the second is flip angle.

use gbloch_types::error::{GblochError, GblochResult};
use ndarray::Array2;

/// Values sampled on a rectilinear grid `values[[i, j]] = f(x[i], y[j])`.
#[derive(Debug, Clone)]
pub struct Table2D {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub values: Array2<f64>,
}

/// `n` evenly spaced points from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { stop } else { start + i as f64 * step })
                .collect()
        }
    }
}

/// `n` logarithmically spaced points from `start` to `stop` inclusive.
pub fn logspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    linspace(start.ln(), stop.ln(), n)
        .into_iter()
        .map(f64::exp)
        .collect()
}

fn check_axis(name: &str, axis: &[f64]) -> GblochResult<()> {
    if axis.len() < 2 {
        return Err(GblochError::ConfigError(format!(
            "table axis {name} needs at least 2 points"
        )));
    }
    if axis
        .windows(2)
        .any(|w| w[1].partial_cmp(&w[0]) != Some(std::cmp::Ordering::Greater))
    {
        return Err(GblochError::ConfigError(format!(
            "table axis {name} must be strictly increasing"
        )));
    }
    Ok(())
}

/// Cell index and fractional position of `v`, clamped to the axis range.
fn locate(axis: &[f64], v: f64) -> (usize, f64) {
    let n = axis.len();
    let upper = axis.partition_point(|&a| a <= v);
    let i0 = upper.saturating_sub(1).min(n - 2);
    let width = axis[i0 + 1] - axis[i0];
    let t = ((v - axis[i0]) / width).clamp(0.0, 1.0);
    (i0, t)
}

impl Table2D {
    pub fn new(x: Vec<f64>, y: Vec<f64>, values: Array2<f64>) -> GblochResult<Self> {
        check_axis("x", &x)?;
        check_axis("y", &y)?;
        if values.dim() != (x.len(), y.len()) {
            return Err(GblochError::ConfigError(format!(
                "table values have shape {:?}, axes need ({}, {})",
                values.dim(),
                x.len(),
                y.len()
            )));
        }
        Ok(Table2D { x, y, values })
    }

    /// Tabulate `f` on the given axes.
    pub fn from_fn<F: FnMut(f64, f64) -> GblochResult<f64>>(
        x: Vec<f64>,
        y: Vec<f64>,
        mut f: F,
    ) -> GblochResult<Self> {
        let mut values = Array2::zeros((x.len(), y.len()));
        for (i, &xi) in x.iter().enumerate() {
            for (j, &yj) in y.iter().enumerate() {
                values[[i, j]] = f(xi, yj)?;
            }
        }
        Self::new(x, y, values)
    }

    /// Bilinear interpolation, clamped to the table boundary.
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let (i0, tx) = locate(&self.x, x);
        let (j0, ty) = locate(&self.y, y);
        let v00 = self.values[[i0, j0]];
        let v10 = self.values[[i0 + 1, j0]];
        let v01 = self.values[[i0, j0 + 1]];
        let v11 = self.values[[i0 + 1, j0 + 1]];

        (1.0 - tx) * ((1.0 - ty) * v00 + ty * v01) + tx * ((1.0 - ty) * v10 + ty * v11)
    }

    /// Partial derivatives `(df/dx, df/dy)` of the bilinear interpolant.
    ///
    /// Outside the table the boundary cell's slope is returned even though
    /// `eval` is constant there; callers stay inside the grid.
    pub fn gradient(&self, x: f64, y: f64) -> (f64, f64) {
        let (i0, tx) = locate(&self.x, x);
        let (j0, ty) = locate(&self.y, y);
        let v00 = self.values[[i0, j0]];
        let v10 = self.values[[i0 + 1, j0]];
        let v01 = self.values[[i0, j0 + 1]];
        let v11 = self.values[[i0 + 1, j0 + 1]];
        let dx = self.x[i0 + 1] - self.x[i0];
        let dy = self.y[j0 + 1] - self.y[j0];

        let df_dx = ((1.0 - ty) * (v10 - v00) + ty * (v11 - v01)) / dx;
        let df_dy = ((1.0 - tx) * (v01 - v00) + tx * (v11 - v10)) / dy;
        (df_dx, df_dy)
    }

    pub fn x_range(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    pub fn y_range(&self) -> (f64, f64) {
        (self.y[0], self.y[self.y.len() - 1])
    }
}
