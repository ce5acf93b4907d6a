//! Mapping a source series onto a target X grid.
//!
//! Nothing is synthesized outside the shared range unless extrapolation is
//! requested, and every method other than `None` flags its output as
//! interpolated. Lookups are binary searches, so resampling `m` targets from an
//! `n`-point source costs `O(n + m log n)`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ensure_same_len, Result, SpectraError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignMethod {
    /// Exact X join only
    #[default]
    None,
    Nearest,
    Linear,
    /// Monotone cubic Hermite (Fritsch–Carlson)
    Pchip,
}

impl std::fmt::Display for AlignMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlignMethod::None => "none",
            AlignMethod::Nearest => "nearest",
            AlignMethod::Linear => "linear",
            AlignMethod::Pchip => "pchip",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AlignMethod {
    type Err = SpectraError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "none" => Ok(AlignMethod::None),
            "nearest" => Ok(AlignMethod::Nearest),
            "linear" => Ok(AlignMethod::Linear),
            "pchip" => Ok(AlignMethod::Pchip),
            other => Err(SpectraError::Config(format!(
                "unknown alignment method '{}'",
                other
            ))),
        }
    }
}

/// Shared closed X interval of two grids
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overlap {
    pub lo: f64,
    pub hi: f64,
}

impl Overlap {
    pub fn contains(&self, x: f64) -> bool {
        x >= self.lo && x <= self.hi
    }
}

/// Alignment metadata embedded in whatever operation used the resampler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub overlap: Option<Overlap>,
    pub interpolated: bool,
    pub method: AlignMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleOptions {
    pub method: AlignMethod,
    /// NaN outside the shared range of source and target
    pub overlap_only: bool,
    /// Extend the end segments past the source domain; ignored when `overlap_only`
    pub extrapolate: bool,
}

impl Default for ResampleOptions {
    fn default() -> Self {
        Self {
            method: AlignMethod::Linear,
            overlap_only: true,
            extrapolate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResampleOutput {
    pub y_aligned: Vec<f64>,
    pub interpolated: bool,
    pub overlap: Option<Overlap>,
    pub method: AlignMethod,
}

impl ResampleOutput {
    pub fn alignment(&self) -> AlignmentResult {
        AlignmentResult {
            overlap: self.overlap,
            interpolated: self.interpolated,
            method: self.method,
        }
    }
}

/// Fail with `Alignment` unless `x` is finite and strictly increasing.
pub fn ensure_increasing(x: &[f64], what: &str) -> Result<()> {
    if let Some(i) = x.iter().position(|v| !v.is_finite()) {
        return Err(SpectraError::Alignment(format!(
            "{} has non-finite value {} at index {}",
            what, x[i], i
        )));
    }
    if let Some(i) = x.windows(2).position(|w| w[1] <= w[0]) {
        return Err(SpectraError::Alignment(format!(
            "{} is not strictly increasing at index {} ({} then {})",
            what,
            i + 1,
            x[i],
            x[i + 1]
        )));
    }
    Ok(())
}

/// `[max(lo), min(hi)]` of two increasing grids, or `None` if disjoint or empty.
pub fn compute_overlap(a: &[f64], b: &[f64]) -> Option<Overlap> {
    let (a0, a1) = (a.first()?, a.last()?);
    let (b0, b1) = (b.first()?, b.last()?);
    let lo = a0.max(*b0);
    let hi = a1.min(*b1);
    if lo <= hi {
        Some(Overlap { lo, hi })
    } else {
        None
    }
}

/// Index of the first element `>= t`.
pub fn lower_bound(xs: &[f64], t: f64) -> usize {
    xs.partition_point(|&v| v < t)
}

/// Hash key treating `0.0` and `-0.0` as the same abscissa.
pub(crate) fn join_key(x: f64) -> u64 {
    if x == 0.0 {
        0.0f64.to_bits()
    } else {
        x.to_bits()
    }
}

/// Monotone piecewise-cubic Hermite interpolant.
pub struct PchipInterpolator<'a> {
    x: &'a [f64],
    y: &'a [f64],
    slopes: Vec<f64>,
}

impl<'a> PchipInterpolator<'a> {
    /// `x` must already be strictly increasing.
    pub fn new(x: &'a [f64], y: &'a [f64]) -> Self {
        Self {
            x,
            y,
            slopes: pchip_slopes(x, y),
        }
    }

    pub fn slopes(&self) -> &[f64] {
        &self.slopes
    }

    /// Evaluate at `t`; outside the knots this extends the end cubic.
    pub fn evaluate(&self, t: f64) -> f64 {
        let n = self.x.len();
        match n {
            0 => f64::NAN,
            1 => self.y[0],
            _ => {
                let i = lower_bound(self.x, t);
                if i < n && self.x[i] == t {
                    return self.y[i];
                }
                let j = i.clamp(1, n - 1) - 1;
                hermite(
                    t,
                    self.x[j],
                    self.x[j + 1],
                    self.y[j],
                    self.y[j + 1],
                    self.slopes[j],
                    self.slopes[j + 1],
                )
            }
        }
    }
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Fritsch–Carlson derivative estimates.
///
/// Interior slopes are zero where the neighbouring secants disagree in sign (or
/// one is flat) and a weighted harmonic mean otherwise. End slopes use the
/// shape-preserving three-point formula.
pub fn pchip_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let delta: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / h[k]).collect();
    if n == 2 {
        return vec![delta[0], delta[0]];
    }

    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        let (d0, d1) = (delta[k - 1], delta[k]);
        if sign(d0) * sign(d1) <= 0 {
            d[k] = 0.0;
        } else {
            let w1 = 2.0 * h[k] + h[k - 1];
            let w2 = h[k] + 2.0 * h[k - 1];
            d[k] = (w1 + w2) / (w1 / d0 + w2 / d1);
        }
    }
    d[0] = edge_slope(h[0], h[1], delta[0], delta[1]);
    d[n - 1] = edge_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
    d
}

fn edge_slope(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
    if sign(d) != sign(m0) {
        0.0
    } else if sign(m0) != sign(m1) && d.abs() > 3.0 * m0.abs() {
        3.0 * m0
    } else {
        d
    }
}

fn hermite(t: f64, x0: f64, x1: f64, y0: f64, y1: f64, d0: f64, d1: f64) -> f64 {
    let h = x1 - x0;
    let s = (t - x0) / h;
    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;
    h00 * y0 + h10 * h * d0 + h01 * y1 + h11 * h * d1
}

fn nearest_value(sx: &[f64], sy: &[f64], t: f64) -> f64 {
    let n = sx.len();
    let i = lower_bound(sx, t);
    if i == 0 {
        return sy[0];
    }
    if i == n {
        return sy[n - 1];
    }
    // Ties go to the lower index
    if t - sx[i - 1] <= sx[i] - t {
        sy[i - 1]
    } else {
        sy[i]
    }
}

fn linear_value(sx: &[f64], sy: &[f64], t: f64) -> f64 {
    let n = sx.len();
    if n == 1 {
        return sy[0];
    }
    let i = lower_bound(sx, t);
    if i < n && sx[i] == t {
        return sy[i];
    }
    let j = i.clamp(1, n - 1) - 1;
    let frac = (t - sx[j]) / (sx[j + 1] - sx[j]);
    sy[j] + frac * (sy[j + 1] - sy[j])
}

/// Map `(source_x, source_y)` onto `target_x`.
pub fn resample(
    source_x: &[f64],
    source_y: &[f64],
    target_x: &[f64],
    opts: &ResampleOptions,
) -> Result<ResampleOutput> {
    ensure_same_len(source_x, source_y, "resample source")?;
    ensure_increasing(source_x, "source x")?;
    ensure_increasing(target_x, "target x")?;

    let overlap = compute_overlap(source_x, target_x);
    let interpolated = opts.method != AlignMethod::None;
    let nan_result = || ResampleOutput {
        y_aligned: vec![f64::NAN; target_x.len()],
        interpolated,
        overlap,
        method: opts.method,
    };
    if source_x.is_empty() || (opts.overlap_only && overlap.is_none()) {
        return Ok(nan_result());
    }

    let (src_lo, src_hi) = (source_x[0], source_x[source_x.len() - 1]);
    let extrapolate = opts.extrapolate && !opts.overlap_only;
    let in_range = |t: f64| -> bool {
        if opts.overlap_only {
            overlap.map_or(false, |o| o.contains(t))
        } else {
            extrapolate || (t >= src_lo && t <= src_hi)
        }
    };

    let y_aligned = match opts.method {
        AlignMethod::None => {
            let join: HashMap<u64, f64> = source_x
                .iter()
                .zip(source_y)
                .map(|(&x, &y)| (join_key(x), y))
                .collect();
            target_x
                .iter()
                .map(|&t| {
                    if !in_range(t) {
                        return f64::NAN;
                    }
                    join.get(&join_key(t)).copied().unwrap_or(f64::NAN)
                })
                .collect()
        }
        AlignMethod::Nearest => target_x
            .iter()
            .map(|&t| if in_range(t) { nearest_value(source_x, source_y, t) } else { f64::NAN })
            .collect(),
        AlignMethod::Linear => target_x
            .iter()
            .map(|&t| if in_range(t) { linear_value(source_x, source_y, t) } else { f64::NAN })
            .collect(),
        AlignMethod::Pchip => {
            let interp = PchipInterpolator::new(source_x, source_y);
            target_x
                .iter()
                .map(|&t| if in_range(t) { interp.evaluate(t) } else { f64::NAN })
                .collect()
        }
    };

    Ok(ResampleOutput {
        y_aligned,
        interpolated,
        overlap,
        method: opts.method,
    })
}
