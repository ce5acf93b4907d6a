//! Polynomial baseline fitting and subtraction.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::linalg::{solve_normal_equations, vandermonde};
use crate::error::{ensure_finite, ensure_same_len, Result, SpectraError};

pub const MAX_BASELINE_ORDER: i32 = 6;

/// Fitted polynomial in the scaled abscissa `t = (x - x_center) / x_scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineFit {
    /// Order actually used after clamping
    pub order: usize,
    /// `c_0 .. c_order`, lowest power first
    pub coefficients: Vec<f64>,
    pub x_center: f64,
    pub x_scale: f64,
    pub rms_residual: f64,
}

impl BaselineFit {
    /// Evaluate the baseline at `x` (Horner).
    pub fn evaluate(&self, x: f64) -> f64 {
        let t = (x - self.x_center) / self.x_scale;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * t + c)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaselineOutput {
    pub corrected: Vec<f64>,
    pub baseline: Vec<f64>,
    pub fit: BaselineFit,
}

/// Fit a least-squares polynomial of `order` (clamped to 0..=6) and subtract it.
///
/// The abscissa is mapped onto [-1, 1] before building the Vandermonde basis so
/// that wavelength-scale X values do not wreck the normal equations.
pub fn fit_polynomial_baseline(x: &[f64], y: &[f64], order: i32) -> Result<BaselineOutput> {
    ensure_same_len(x, y, "baseline")?;
    ensure_finite(x, "baseline input x")?;
    ensure_finite(y, "baseline input y")?;

    let order = order.clamp(0, MAX_BASELINE_ORDER) as usize;
    let n = x.len();
    if n < order + 2 {
        return Err(SpectraError::Shape(format!(
            "baseline of order {} needs at least {} points, got {}",
            order,
            order + 2,
            n
        )));
    }

    let x_min = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let x_max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let x_center = 0.5 * (x_min + x_max);
    let half_span = 0.5 * (x_max - x_min);
    let x_scale = if half_span > 0.0 { half_span } else { 1.0 };

    let t: Vec<f64> = x.iter().map(|&v| (v - x_center) / x_scale).collect();
    let design = vandermonde(&t, order);
    let rhs = DVector::from_column_slice(y);
    let coeffs = solve_normal_equations(
        &design,
        &rhs,
        &format!("baseline fit of order {}", order),
    )?;

    let mut fit = BaselineFit {
        order,
        coefficients: coeffs.iter().cloned().collect(),
        x_center,
        x_scale,
        rms_residual: 0.0,
    };
    let baseline: Vec<f64> = x.iter().map(|&v| fit.evaluate(v)).collect();
    let corrected: Vec<f64> = y.iter().zip(&baseline).map(|(v, b)| v - b).collect();
    fit.rms_residual = (corrected.iter().map(|r| r * r).sum::<f64>() / n as f64).sqrt();

    Ok(BaselineOutput {
        corrected,
        baseline,
        fit,
    })
}
