//! Y-axis normalization. X is never touched; an optional range selection only
//! decides which samples the statistics are computed from.

use serde::{Deserialize, Serialize};

use crate::data::units::{convert_value, SpectralUnit};
use crate::error::{ensure_finite, ensure_same_len, Result, SpectraError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizeMode {
    #[default]
    None,
    Max,
    MinMax,
    ZScore,
    Area,
}

impl std::fmt::Display for NormalizeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NormalizeMode::None => "none",
            NormalizeMode::Max => "max",
            NormalizeMode::MinMax => "min-max",
            NormalizeMode::ZScore => "z-score",
            NormalizeMode::Area => "area",
        };
        f.write_str(s)
    }
}

/// X window the statistics are taken from, optionally in a non-canonical unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeSelection {
    pub x0: f64,
    pub x1: f64,
    #[serde(default)]
    pub unit: Option<SpectralUnit>,
}

/// The selection as actually applied, in canonical units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsedSelection {
    pub x_lo: f64,
    pub x_hi: f64,
    pub start_index: usize,
    pub end_index: usize,
    pub points: usize,
}

/// Divisor and offset used, tagged by mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum NormalizeStats {
    None,
    Max { max_abs: f64 },
    MinMax { min: f64, max: f64 },
    ZScore { mean: f64, std: f64, n: usize },
    Area { area: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOutput {
    pub y: Vec<f64>,
    pub stats: NormalizeStats,
    pub used_selection: Option<UsedSelection>,
}

/// Rescale `y` by statistics computed over the whole trace or a selected slice.
pub fn normalize_y(
    x: &[f64],
    y: &[f64],
    mode: NormalizeMode,
    selection: Option<&RangeSelection>,
    canonical_unit: Option<SpectralUnit>,
) -> Result<NormalizeOutput> {
    ensure_same_len(x, y, "normalize")?;
    ensure_finite(y, "normalize input y")?;

    let used = match selection {
        Some(sel) => Some(resolve_selection(x, sel, canonical_unit)?),
        None => None,
    };
    let (start, end) = match used {
        Some(u) => (u.start_index, u.end_index + 1),
        None => (0, y.len()),
    };
    let x_slice = &x[start..end];
    let y_slice = &y[start..end];

    let (stats, out) = match mode {
        NormalizeMode::None => (NormalizeStats::None, y.to_vec()),
        NormalizeMode::Max => {
            let max_abs = y_slice.iter().map(|v| v.abs()).fold(0.0f64, f64::max);
            if max_abs == 0.0 || !max_abs.is_finite() {
                return Err(SpectraError::Division(format!(
                    "max normalization: max |y| is {}",
                    max_abs
                )));
            }
            (
                NormalizeStats::Max { max_abs },
                y.iter().map(|v| v / max_abs).collect(),
            )
        }
        NormalizeMode::MinMax => {
            let min = y_slice.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = y_slice.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let span = max - min;
            if !span.is_finite() || span == 0.0 {
                return Err(SpectraError::Division(format!(
                    "min-max normalization: range is degenerate (min={}, max={})",
                    min, max
                )));
            }
            (
                NormalizeStats::MinMax { min, max },
                y.iter().map(|v| (v - min) / span).collect(),
            )
        }
        NormalizeMode::ZScore => {
            let (mean, std) = mean_and_sample_std(y_slice);
            if std == 0.0 || !std.is_finite() {
                return Err(SpectraError::Division(format!(
                    "z-score normalization: standard deviation is {} over {} points",
                    std,
                    y_slice.len()
                )));
            }
            (
                NormalizeStats::ZScore {
                    mean,
                    std,
                    n: y_slice.len(),
                },
                y.iter().map(|v| (v - mean) / std).collect(),
            )
        }
        NormalizeMode::Area => {
            let area = trapezoid_abs_area(x_slice, y_slice);
            if area == 0.0 || !area.is_finite() {
                return Err(SpectraError::Division(format!(
                    "area normalization: absolute area is {}",
                    area
                )));
            }
            (
                NormalizeStats::Area { area },
                y.iter().map(|v| v / area).collect(),
            )
        }
    };

    Ok(NormalizeOutput {
        y: out,
        stats,
        used_selection: used,
    })
}

/// Convert the selection to canonical units and find its index span.
fn resolve_selection(
    x: &[f64],
    sel: &RangeSelection,
    canonical_unit: Option<SpectralUnit>,
) -> Result<UsedSelection> {
    if !sel.x0.is_finite() || !sel.x1.is_finite() {
        return Err(SpectraError::Config(format!(
            "range selection bounds must be finite, got [{}, {}]",
            sel.x0, sel.x1
        )));
    }
    let (x0, x1) = match (sel.unit, canonical_unit) {
        (None, _) => (sel.x0, sel.x1),
        (Some(u), Some(c)) => (convert_value(sel.x0, u, c), convert_value(sel.x1, u, c)),
        (Some(u), None) => {
            return Err(SpectraError::Unit(format!(
                "range selection is given in {} but the trace's canonical unit is unknown",
                u
            )))
        }
    };
    let (lo, hi) = if x0 > x1 { (x1, x0) } else { (x0, x1) };

    // Membership is contiguous only on a monotone axis, either direction.
    let increasing = x.windows(2).all(|w| w[1] >= w[0]);
    let decreasing = x.windows(2).all(|w| w[1] <= w[0]);
    if !increasing && !decreasing {
        return Err(SpectraError::Alignment(
            "range selection needs a monotone X axis".to_string(),
        ));
    }
    let inside = |v: f64| lo <= v && v <= hi;
    let start = x.iter().position(|&v| inside(v));
    let end = x.iter().rposition(|&v| inside(v));
    match (start, end) {
        (Some(s), Some(e)) if s <= e => Ok(UsedSelection {
            x_lo: lo,
            x_hi: hi,
            start_index: s,
            end_index: e,
            points: e - s + 1,
        }),
        _ => Err(SpectraError::Config(format!(
            "range selection [{}, {}] contains no samples",
            lo, hi
        ))),
    }
}

/// Mean and sample standard deviation (`n - 1`); std is 0 below two points.
pub fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (mean, (ss / (n - 1) as f64).sqrt())
}

/// Trapezoidal integral of |y| over x.
pub fn trapezoid_abs_area(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xw, yw)| 0.5 * (yw[0].abs() + yw[1].abs()) * (xw[1] - xw[0]).abs())
        .sum()
}
