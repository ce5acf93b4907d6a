//! Pointwise comparison of two series on a shared grid.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::alignment::{
    compute_overlap, ensure_increasing, join_key, resample, AlignMethod, AlignmentResult,
    Overlap, ResampleOptions,
};
use crate::data::spectrum::Series;
use crate::error::{ensure_same_len, Result, SpectraError};

/// Floor of the default ratio threshold
pub const TAU_FLOOR: f64 = 1e-12;
/// Default ratio threshold relative to `max|B|`
pub const TAU_RELATIVE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffOperator {
    #[serde(rename = "A-B", alias = "subtract")]
    Subtract,
    #[serde(rename = "A/B", alias = "ratio")]
    Ratio,
}

impl DiffOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            DiffOperator::Subtract => "A-B",
            DiffOperator::Ratio => "A/B",
        }
    }
}

impl std::fmt::Display for DiffOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl std::str::FromStr for DiffOperator {
    type Err = SpectraError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "a-b" | "subtract" | "difference" => Ok(DiffOperator::Subtract),
            "a/b" | "ratio" | "divide" => Ok(DiffOperator::Ratio),
            other => Err(SpectraError::Config(format!(
                "unknown differential operator '{}'",
                other
            ))),
        }
    }
}

/// Which input's X grid the result lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlignTarget {
    #[default]
    A,
    B,
}

impl std::str::FromStr for AlignTarget {
    type Err = SpectraError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim() {
            "A" | "a" => Ok(AlignTarget::A),
            "B" | "b" => Ok(AlignTarget::B),
            other => Err(SpectraError::Config(format!(
                "alignment target must be A or B, got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default)]
    pub method: AlignMethod,
    #[serde(default)]
    pub target: AlignTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioHandling {
    /// Points with `|B| < tau` become NaN
    #[default]
    Mask,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatioConfig {
    #[serde(default)]
    pub handling: RatioHandling,
    /// Overrides the default threshold; must be finite and positive
    #[serde(default)]
    pub tau: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TauSource {
    Default,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioMask {
    pub tau: f64,
    pub tau_source: TauSource,
    pub masked_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffOutput {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub warnings: Vec<String>,
    pub interpolated: bool,
    pub overlap: Overlap,
    /// Present for `A/B` only
    pub ratio_mask: Option<RatioMask>,
    pub alignment: AlignmentResult,
}

/// `max(1e-12, 1e-6 · max|b|)` over the finite values of `b`.
pub fn default_tau(b: impl IntoIterator<Item = f64>) -> f64 {
    let max_abs = b
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(0.0f64, |m, v| m.max(v.abs()));
    TAU_FLOOR.max(TAU_RELATIVE * max_abs)
}

/// Compare `a` and `b` with `op` on the grid of `align.target`.
///
/// The other series is resampled onto the target grid restricted to the
/// overlap. With `AlignMethod::None` every target X inside the overlap must be
/// present verbatim in the other series.
pub fn differential_compare(
    a: Series<'_>,
    b: Series<'_>,
    op: DiffOperator,
    align: &AlignmentConfig,
    ratio: &RatioConfig,
) -> Result<DiffOutput> {
    ensure_same_len(a.x, a.y, "series A")?;
    ensure_same_len(b.x, b.y, "series B")?;
    ensure_increasing(a.x, "series A x")?;
    ensure_increasing(b.x, "series B x")?;

    if let Some(tau) = ratio.tau {
        if !tau.is_finite() || tau <= 0.0 {
            return Err(SpectraError::Config(format!(
                "ratio tau must be finite and > 0, got {}",
                tau
            )));
        }
    }

    let overlap = compute_overlap(a.x, b.x).ok_or_else(|| {
        SpectraError::Overlap(format!(
            "series A spans {} and series B spans {}; no shared X range",
            span_text(a.x),
            span_text(b.x)
        ))
    })?;

    let (target, other) = match align.target {
        AlignTarget::A => (a, b),
        AlignTarget::B => (b, a),
    };

    if align.method == AlignMethod::None {
        let available: HashSet<u64> = other.x.iter().map(|&v| join_key(v)).collect();
        if let Some(&missing) = target
            .x
            .iter()
            .filter(|&&t| overlap.contains(t))
            .find(|&&t| !available.contains(&join_key(t)))
        {
            return Err(SpectraError::Alignment(format!(
                "X grids differ and alignment method is none: {} is missing from series {}",
                missing,
                match align.target {
                    AlignTarget::A => "B",
                    AlignTarget::B => "A",
                }
            )));
        }
    }

    let resampled = resample(
        other.x,
        other.y,
        target.x,
        &ResampleOptions {
            method: align.method,
            overlap_only: true,
            extrapolate: false,
        },
    )?;

    // Values of A and B on the target grid, NaN outside the overlap
    let pairs: Vec<(f64, f64)> = target
        .x
        .iter()
        .zip(target.y)
        .zip(&resampled.y_aligned)
        .map(|((&t, &ty), &oy)| {
            if !overlap.contains(t) {
                (f64::NAN, f64::NAN)
            } else {
                match align.target {
                    AlignTarget::A => (ty, oy),
                    AlignTarget::B => (oy, ty),
                }
            }
        })
        .collect();

    let mut warnings = Vec::new();
    let (y, ratio_mask) = match op {
        DiffOperator::Subtract => (pairs.iter().map(|(va, vb)| va - vb).collect(), None),
        DiffOperator::Ratio => {
            let (tau, tau_source) = match ratio.tau {
                Some(tau) => (tau, TauSource::User),
                None => (default_tau(pairs.iter().map(|p| p.1)), TauSource::Default),
            };
            let mut masked_count = 0;
            let y: Vec<f64> = pairs
                .iter()
                .map(|&(va, vb)| {
                    if vb.abs() < tau {
                        masked_count += 1;
                        f64::NAN
                    } else {
                        va / vb
                    }
                })
                .collect();
            if masked_count > 0 {
                warnings.push(format!(
                    "{} point(s) with |B| < tau = {:e} were masked to NaN",
                    masked_count, tau
                ));
            }
            (
                y,
                Some(RatioMask {
                    tau,
                    tau_source,
                    masked_count,
                }),
            )
        }
    };

    Ok(DiffOutput {
        x: target.x.to_vec(),
        y,
        warnings,
        interpolated: resampled.interpolated,
        overlap,
        ratio_mask,
        alignment: AlignmentResult {
            overlap: Some(overlap),
            interpolated: resampled.interpolated,
            method: align.method,
        },
    })
}

fn span_text(x: &[f64]) -> String {
    match (x.first(), x.last()) {
        (Some(lo), Some(hi)) => format!("[{}, {}]", lo, hi),
        _ => "nothing".to_string(),
    }
}
