//! Peak and dip detection with prominence, separation and count filters.
//!
//! A candidate is a local maximum `y[i-1] < y[i] >= y[i+1]`. Its prominence is
//! the height above the higher of the two minima reached before the signal
//! climbs strictly above the candidate on each side (or runs out). Dips are
//! peaks of the negated signal.
//!
//! Non-finite Y values split the signal into independent runs; no candidate,
//! base or width crossing reaches across them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::alignment::ensure_increasing;
use crate::error::{ensure_same_len, Result, SpectraError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureMode {
    #[default]
    Peaks,
    Dips,
}

impl std::fmt::Display for FeatureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureMode::Peaks => f.write_str("peaks"),
            FeatureMode::Dips => f.write_str("dips"),
        }
    }
}

impl std::str::FromStr for FeatureMode {
    type Err = SpectraError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "peaks" | "peak" | "max" => Ok(FeatureMode::Peaks),
            "dips" | "dip" | "min" => Ok(FeatureMode::Dips),
            other => Err(SpectraError::Config(format!("unknown feature mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub mode: FeatureMode,
    pub min_prominence: f64,
    /// Minimum distance in X units between kept features
    pub min_separation_x: f64,
    pub max_count: Option<usize>,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            mode: FeatureMode::Peaks,
            min_prominence: 0.0,
            min_separation_x: 0.0,
            max_count: None,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_prominence >= 0.0) || self.min_prominence.is_infinite() {
            return Err(SpectraError::Config(format!(
                "min_prominence must be finite and >= 0, got {}",
                self.min_prominence
            )));
        }
        if !(self.min_separation_x >= 0.0) || self.min_separation_x.is_infinite() {
            return Err(SpectraError::Config(format!(
                "min_separation_x must be finite and >= 0, got {}",
                self.min_separation_x
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub trace_id: String,
    pub index: usize,
    pub center_x: f64,
    /// Original (not negated) Y at the feature
    pub value_y: f64,
    pub prominence: Option<f64>,
    /// Full width at half prominence, in X units
    pub width: Option<f64>,
    pub mode: FeatureMode,
    pub detector_params: DetectorParams,
}

/// Stable id for a detected feature.
pub fn feature_id(trace_id: &str, mode: FeatureMode, index: usize) -> String {
    let key = format!("feature:{}:{}:{}", trace_id, mode, index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

/// For every index, the minimum over the stretch reaching back to the nearest
/// strictly higher value on the left (or the start), the index included.
fn left_base_minima(y: &[f64]) -> Vec<f64> {
    // (index, min over the segment this entry absorbed)
    let mut stack: Vec<(usize, f64)> = Vec::with_capacity(y.len());
    let mut out = Vec::with_capacity(y.len());
    for (i, &v) in y.iter().enumerate() {
        let mut seg_min = v;
        while let Some(&(top, top_min)) = stack.last() {
            if y[top] > v {
                break;
            }
            seg_min = seg_min.min(top_min);
            stack.pop();
        }
        stack.push((i, seg_min));
        out.push(seg_min);
    }
    out
}

fn right_base_minima(y: &[f64]) -> Vec<f64> {
    let reversed: Vec<f64> = y.iter().rev().cloned().collect();
    let mut out = left_base_minima(&reversed);
    out.reverse();
    out
}

struct Candidate {
    index: usize,
    prominence: f64,
}

/// Local maxima of one finite run with their prominences.
fn run_candidates(y: &[f64]) -> Vec<Candidate> {
    let n = y.len();
    if n < 3 {
        return Vec::new();
    }
    let left = left_base_minima(y);
    let right = right_base_minima(y);
    (1..n - 1)
        .filter(|&i| y[i - 1] < y[i] && y[i] >= y[i + 1])
        .map(|i| Candidate {
            index: i,
            prominence: y[i] - left[i].max(right[i]),
        })
        .collect()
}

/// Width at `peak - prominence/2` within one run.
fn half_prominence_width(x: &[f64], y: &[f64], peak: usize, prominence: f64) -> Option<f64> {
    if !(prominence > 0.0) {
        return None;
    }
    let level = y[peak] - 0.5 * prominence;

    let mut l = peak;
    while l > 0 && y[l] > level {
        l -= 1;
    }
    if y[l] > level {
        return None;
    }
    let mut r = peak;
    while r + 1 < y.len() && y[r] > level {
        r += 1;
    }
    if y[r] > level {
        return None;
    }

    let cross = |lo: usize, hi: usize| -> f64 {
        let t = (level - y[lo]) / (y[hi] - y[lo]);
        x[lo] + t * (x[hi] - x[lo])
    };
    let x_left = cross(l, l + 1);
    let x_right = cross(r, r - 1);
    Some(x_right - x_left)
}

/// Maximal index ranges of finite values.
fn finite_runs(y: &[f64]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, v) in y.iter().enumerate() {
        match (v.is_finite(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, y.len()));
    }
    runs
}

/// Detect peaks or dips in `(x, y)`.
///
/// Filters apply in order: minimum prominence, greedy minimum X separation by
/// descending prominence, then `max_count` keeping the most prominent. The
/// result is sorted by ascending X.
pub fn detect_features(
    trace_id: &str,
    x: &[f64],
    y: &[f64],
    params: &DetectorParams,
) -> Result<Vec<Feature>> {
    ensure_same_len(x, y, "feature detection")?;
    ensure_increasing(x, "feature detection x")?;
    params.validate()?;

    let signal: Vec<f64> = match params.mode {
        FeatureMode::Peaks => y.to_vec(),
        FeatureMode::Dips => y.iter().map(|v| -v).collect(),
    };

    // Candidates carry global indices alongside the run they belong to
    let mut found: Vec<(Candidate, (usize, usize))> = Vec::new();
    for (start, end) in finite_runs(&signal) {
        for c in run_candidates(&signal[start..end]) {
            if c.prominence < params.min_prominence {
                continue;
            }
            found.push((
                Candidate {
                    index: c.index + start,
                    prominence: c.prominence,
                },
                (start, end),
            ));
        }
    }

    // Most prominent first; ties keep the lower index
    found.sort_by(|a, b| {
        b.0.prominence
            .total_cmp(&a.0.prominence)
            .then(a.0.index.cmp(&b.0.index))
    });

    let mut kept: Vec<(Candidate, (usize, usize))> = Vec::with_capacity(found.len());
    if params.min_separation_x > 0.0 {
        // X is increasing, so only the nearest kept neighbour on each side matters
        let mut taken: BTreeSet<usize> = BTreeSet::new();
        for item in found {
            let i = item.0.index;
            let clear_left = taken
                .range(..i)
                .next_back()
                .map_or(true, |&j| x[i] - x[j] >= params.min_separation_x);
            let clear_right = taken
                .range(i..)
                .next()
                .map_or(true, |&j| x[j] - x[i] >= params.min_separation_x);
            if clear_left && clear_right {
                taken.insert(i);
                kept.push(item);
            }
        }
    } else {
        kept = found;
    }

    if let Some(limit) = params.max_count {
        kept.truncate(limit);
    }
    kept.sort_by_key(|(c, _)| c.index);

    Ok(kept
        .into_iter()
        .map(|(c, (start, end))| Feature {
            id: feature_id(trace_id, params.mode, c.index),
            trace_id: trace_id.to_string(),
            index: c.index,
            center_x: x[c.index],
            value_y: y[c.index],
            prominence: Some(c.prominence),
            width: half_prominence_width(
                &x[start..end],
                &signal[start..end],
                c.index - start,
                c.prominence,
            ),
            mode: params.mode,
            detector_params: *params,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn test_two_simple_peaks() {
        let x = grid(5);
        let f = detect_features("t", &x, &[0.0, 1.0, 0.0, 2.0, 0.0], &DetectorParams::default()).unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(f[0].center_x, 1.0);
        assert_eq!(f[1].center_x, 3.0);
        assert_eq!(f[0].prominence, Some(1.0));
        assert_eq!(f[1].prominence, Some(2.0));
        assert_eq!(f[1].width, Some(1.0));
    }

    #[test]
    fn test_prominence_matches_scan() {
        // Shallow saddle between two peaks; the lower peak's base is the saddle
        let y = [0.0, 5.0, 3.0, 4.0, 0.0, 1.0, 0.0];
        let f = detect_features("t", &grid(7), &y, &DetectorParams::default()).unwrap();
        let prom: Vec<f64> = f.iter().filter_map(|p| p.prominence).collect();
        assert_eq!(prom, vec![5.0, 1.0, 1.0]);
    }

    #[test]
    fn test_min_prominence_filter() {
        let y = [0.0, 5.0, 3.0, 4.0, 0.0];
        let params = DetectorParams {
            min_prominence: 2.0,
            ..DetectorParams::default()
        };
        let f = detect_features("t", &grid(5), &y, &params).unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].index, 1);
    }

    #[test]
    fn test_separation_keeps_more_prominent() {
        let y = [0.0, 2.0, 0.0, 3.0, 0.0, 1.0, 0.0];
        let params = DetectorParams {
            min_separation_x: 2.5,
            ..DetectorParams::default()
        };
        let f = detect_features("t", &grid(7), &y, &params).unwrap();
        let idx: Vec<usize> = f.iter().map(|p| p.index).collect();
        assert_eq!(idx, vec![3]);

        let params = DetectorParams {
            min_separation_x: 2.0,
            ..DetectorParams::default()
        };
        let f = detect_features("t", &grid(7), &y, &params).unwrap();
        let idx: Vec<usize> = f.iter().map(|p| p.index).collect();
        assert_eq!(idx, vec![1, 3, 5]);
    }

    #[test]
    fn test_max_count_keeps_most_prominent_sorted_by_x() {
        let y = [0.0, 3.0, 0.0, 1.0, 0.0, 2.0, 0.0];
        let params = DetectorParams {
            max_count: Some(2),
            ..DetectorParams::default()
        };
        let f = detect_features("t", &grid(7), &y, &params).unwrap();
        let idx: Vec<usize> = f.iter().map(|p| p.index).collect();
        assert_eq!(idx, vec![1, 5]);
    }

    #[test]
    fn test_dips() {
        let y = [5.0, 4.0, 5.0, 2.0, 5.0];
        let params = DetectorParams {
            mode: FeatureMode::Dips,
            ..DetectorParams::default()
        };
        let f = detect_features("t", &grid(5), &y, &params).unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(f[1].value_y, 2.0);
        assert_eq!(f[1].prominence, Some(3.0));
        assert_eq!(f[1].mode, FeatureMode::Dips);
    }

    #[test]
    fn test_width_crossing_on_first_and_last_sample() {
        let f = detect_features("t", &grid(3), &[0.0, 4.0, 0.0], &DetectorParams::default()).unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].width, Some(1.0));
    }

    #[test]
    fn test_plateau_zero_prominence_has_no_width() {
        let y = [0.0, 2.0, 2.0, 3.0, 0.0];
        let f = detect_features("t", &grid(5), &y, &DetectorParams::default()).unwrap();
        let first = f.iter().find(|p| p.index == 1).unwrap();
        assert_eq!(first.prominence, Some(0.0));
        assert_eq!(first.width, None);
    }

    #[test]
    fn test_nan_splits_runs() {
        let y = [f64::NAN, 0.0, 1.0, 0.0, f64::NAN, 0.0, 3.0, 0.0];
        let f = detect_features("t", &grid(8), &y, &DetectorParams::default()).unwrap();
        let idx: Vec<usize> = f.iter().map(|p| p.index).collect();
        assert_eq!(idx, vec![2, 6]);
        assert_eq!(f[0].prominence, Some(1.0));
    }

    #[test]
    fn test_rejects_bad_input() {
        let err = detect_features("t", &[0.0, 1.0], &[0.0], &DetectorParams::default()).unwrap_err();
        assert!(matches!(err, SpectraError::Shape(_)));
        let err = detect_features("t", &[1.0, 0.0], &[0.0, 0.0], &DetectorParams::default()).unwrap_err();
        assert!(matches!(err, SpectraError::Alignment(_)));
        let params = DetectorParams {
            min_prominence: -1.0,
            ..DetectorParams::default()
        };
        let err = detect_features("t", &grid(3), &[0.0, 1.0, 0.0], &params).unwrap_err();
        assert!(matches!(err, SpectraError::Config(_)));
    }

    #[test]
    fn test_ids_are_deterministic() {
        let x = grid(5);
        let y = [0.0, 1.0, 0.0, 2.0, 0.0];
        let a = detect_features("trace-1", &x, &y, &DetectorParams::default()).unwrap();
        let b = detect_features("trace-1", &x, &y, &DetectorParams::default()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a[0].id, a[1].id);
    }

    #[test]
    fn test_stack_bases_match_brute_force() {
        let y: Vec<f64> = (0..60)
            .map(|i| ((i * 37 % 11) as f64) - ((i * 13 % 7) as f64) * 0.5)
            .collect();
        let left = left_base_minima(&y);
        let right = right_base_minima(&y);
        for i in 0..y.len() {
            let mut lmin = y[i];
            for j in (0..i).rev() {
                if y[j] > y[i] {
                    break;
                }
                lmin = lmin.min(y[j]);
            }
            let mut rmin = y[i];
            for &v in &y[i + 1..] {
                if v > y[i] {
                    break;
                }
                rmin = rmin.min(v);
            }
            assert_eq!(left[i], lmin, "left base at {}", i);
            assert_eq!(right[i], rmin, "right base at {}", i);
        }
    }
}
