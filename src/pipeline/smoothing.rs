//! Savitzky–Golay smoothing.
//!
//! The convolution kernel is the row of the local least-squares projection that
//! reproduces the fitted polynomial at the window centre:
//! `h = A · ((AᵗA)⁻¹ · e₀)` with `A[k, j] = k^j` for `k = -m..m`.
//! Samples past either end are read from the nearest valid index, so the output
//! always has the input's length.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::linalg::{solve_dense, vandermonde};
use crate::error::{ensure_finite, Result, SpectraError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmoothParams {
    pub window_length: usize,
    pub polyorder: usize,
}

impl SmoothParams {
    pub fn new(window_length: usize, polyorder: usize) -> Self {
        Self {
            window_length,
            polyorder,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_length < 3 || self.window_length % 2 == 0 {
            return Err(SpectraError::Config(format!(
                "window_length must be odd and >= 3, got {}",
                self.window_length
            )));
        }
        if self.polyorder >= self.window_length {
            return Err(SpectraError::Config(format!(
                "polyorder {} must be less than window_length {}",
                self.polyorder, self.window_length
            )));
        }
        Ok(())
    }

    pub fn half_window(&self) -> usize {
        (self.window_length - 1) / 2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmoothOutput {
    pub y: Vec<f64>,
    /// Convolution weights for offsets `-m..=m`
    pub kernel: Vec<f64>,
}

/// Smoothing coefficients for offsets `-m..=m`.
pub fn savgol_coefficients(params: &SmoothParams) -> Result<Vec<f64>> {
    params.validate()?;
    let m = params.half_window();

    // Offsets divided by m: the projection is unchanged by column scaling and the
    // normal matrix stays well conditioned for wide windows.
    let t: Vec<f64> = (0..params.window_length)
        .map(|i| (i as f64 - m as f64) / m as f64)
        .collect();
    let a = vandermonde(&t, params.polyorder);
    let ata = a.transpose() * &a;
    let mut e0 = DVector::zeros(params.polyorder + 1);
    e0[0] = 1.0;

    let z = solve_dense(
        ata,
        &e0,
        &format!(
            "Savitzky-Golay normal matrix (window {}, polyorder {})",
            params.window_length, params.polyorder
        ),
    )?;
    let kernel = &a * z;
    Ok(kernel.iter().cloned().collect())
}

/// Convolve `y` with the Savitzky–Golay kernel, clamping indices at the edges.
pub fn savitzky_golay_smooth(y: &[f64], params: &SmoothParams) -> Result<SmoothOutput> {
    ensure_finite(y, "smoothing input y")?;
    let kernel = savgol_coefficients(params)?;
    let n = y.len();
    if n == 0 {
        return Ok(SmoothOutput { y: Vec::new(), kernel });
    }

    let m = params.half_window() as isize;
    let last = (n - 1) as isize;
    let out = (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(j, c)| {
                    let idx = (i + j as isize - m).clamp(0, last) as usize;
                    c * y[idx]
                })
                .sum::<f64>()
        })
        .collect();

    Ok(SmoothOutput { y: out, kernel })
}
