//! Scoring detected features against reference lines and bands.
//!
//! Every match carries the numbers its score was built from, and every feature
//! reports whether its candidate list was empty, unique, ambiguous or cut short.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::features::Feature;
use crate::data::units::{convert_value, ensure_same_dimension, SpectralUnit};
use crate::error::{Result, SpectraError};

fn default_strength() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Line lists without an intensity column import as unit sticks
    Line {
        x: f64,
        #[serde(default = "default_strength")]
        strength: f64,
    },
    Band { x0: f64, x1: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub kind: ReferenceKind,
}

impl ReferenceEntry {
    pub fn line(id: &str, label: &str, x: f64, strength: f64) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            kind: ReferenceKind::Line { x, strength },
        }
    }

    pub fn band(id: &str, label: &str, x0: f64, x1: f64) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            kind: ReferenceKind::Band { x0, x1 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSet {
    pub id: String,
    #[serde(default)]
    pub unit: Option<SpectralUnit>,
    pub entries: Vec<ReferenceEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchParams {
    /// Half-width of the acceptance window, in feature X units
    pub tolerance_dx: f64,
    /// Accept features within `tolerance_dx` outside a band
    #[serde(default = "default_true")]
    pub pad_bands: bool,
    #[serde(default)]
    pub weight_by_strength: bool,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

fn default_true() -> bool {
    true
}

pub const DEFAULT_MAX_CANDIDATES: usize = 5;

fn default_max_candidates() -> usize {
    DEFAULT_MAX_CANDIDATES
}

impl MatchParams {
    pub fn new(tolerance_dx: f64) -> Self {
        Self {
            tolerance_dx,
            pad_bands: true,
            weight_by_strength: false,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tolerance_dx.is_finite() || self.tolerance_dx <= 0.0 {
            return Err(SpectraError::Config(format!(
                "tolerance_dx must be finite and > 0, got {}",
                self.tolerance_dx
            )));
        }
        if self.max_candidates == 0 {
            return Err(SpectraError::Config(
                "max_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchEvidence {
    /// `center_x - ref_position_x`
    pub delta_x: f64,
    pub closeness: f64,
    pub strength: Option<f64>,
    pub max_strength: Option<f64>,
    pub strength_weight: f64,
    /// Distance from the band edge when the feature lies outside it (bands only)
    pub distance_outside: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub feature_id: String,
    pub reference_id: String,
    pub candidate_label: String,
    /// Line position, or the nearest point of a band
    pub ref_position_x: f64,
    pub tolerance_dx: f64,
    pub score: f64,
    pub evidence: MatchEvidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchStatus {
    NoCandidates,
    Unique,
    Ambiguous { count: usize },
    TooMany { count: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatches {
    pub feature_id: String,
    pub center_x: f64,
    #[serde(flatten)]
    pub status: MatchStatus,
    /// Ranked best first, at most `max_candidates`
    pub candidates: Vec<Match>,
}

/// Reference entry with positions in feature units and bands ordered
struct Prepared<'a> {
    entry: &'a ReferenceEntry,
    kind: PreparedKind,
}

enum PreparedKind {
    Line { x: f64, strength: f64 },
    Band { lo: f64, hi: f64 },
}

fn prepare<'a>(
    refs: &'a ReferenceSet,
    feature_unit: Option<SpectralUnit>,
) -> Result<Vec<Prepared<'a>>> {
    ensure_same_dimension(feature_unit, refs.unit, "feature matching")?;
    let to_feature = |v: f64| match (refs.unit, feature_unit) {
        (Some(from), Some(to)) if from != to => convert_value(v, from, to),
        _ => v,
    };

    refs.entries
        .iter()
        .map(|entry| {
            let kind = match entry.kind {
                ReferenceKind::Line { x, strength } => {
                    if !x.is_finite() || !strength.is_finite() || strength < 0.0 {
                        return Err(SpectraError::Config(format!(
                            "reference '{}' has invalid line position {} or strength {}",
                            entry.id, x, strength
                        )));
                    }
                    PreparedKind::Line {
                        x: to_feature(x),
                        strength,
                    }
                }
                ReferenceKind::Band { x0, x1 } => {
                    if !x0.is_finite() || !x1.is_finite() {
                        return Err(SpectraError::Config(format!(
                            "reference '{}' has invalid band [{}, {}]",
                            entry.id, x0, x1
                        )));
                    }
                    // Edges may be listed in either order
                    let (a, b) = (to_feature(x0), to_feature(x1));
                    PreparedKind::Band {
                        lo: a.min(b),
                        hi: a.max(b),
                    }
                }
            };
            Ok(Prepared { entry, kind })
        })
        .collect()
}

pub fn match_id(feature_id: &str, reference_set_id: &str, reference_id: &str) -> String {
    let key = format!("match:{}:{}:{}", feature_id, reference_set_id, reference_id);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

/// Score each feature against every reference entry.
///
/// `feature_unit` is the X unit the features were detected in; when both it
/// and the reference unit are known they must share a dimension, and reference
/// positions are converted into the feature unit.
pub fn match_features(
    features: &[Feature],
    feature_unit: Option<SpectralUnit>,
    refs: &ReferenceSet,
    params: &MatchParams,
) -> Result<Vec<FeatureMatches>> {
    params.validate()?;
    let prepared = prepare(refs, feature_unit)?;
    let max_strength = prepared
        .iter()
        .filter_map(|p| match p.kind {
            PreparedKind::Line { strength, .. } => Some(strength),
            PreparedKind::Band { .. } => None,
        })
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |m| m.max(s))));

    let dx = params.tolerance_dx;
    Ok(features
        .iter()
        .map(|feature| {
            let c = feature.center_x;
            let mut candidates: Vec<Match> = if c.is_finite() {
                prepared
                    .iter()
                    .filter_map(|p| score_entry(feature, p, dx, params, max_strength, &refs.id))
                    .collect()
            } else {
                Vec::new()
            };

            candidates.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then(a.evidence.delta_x.abs().total_cmp(&b.evidence.delta_x.abs()))
                    .then_with(|| a.reference_id.cmp(&b.reference_id))
            });

            let count = candidates.len();
            let status = match count {
                0 => MatchStatus::NoCandidates,
                1 => MatchStatus::Unique,
                n if n <= params.max_candidates => MatchStatus::Ambiguous { count: n },
                n => MatchStatus::TooMany {
                    count: n,
                    limit: params.max_candidates,
                },
            };
            candidates.truncate(params.max_candidates);

            FeatureMatches {
                feature_id: feature.id.clone(),
                center_x: c,
                status,
                candidates,
            }
        })
        .collect())
}

fn score_entry(
    feature: &Feature,
    p: &Prepared<'_>,
    dx: f64,
    params: &MatchParams,
    max_strength: Option<f64>,
    set_id: &str,
) -> Option<Match> {
    let c = feature.center_x;
    let (ref_x, closeness, strength, distance_outside) = match p.kind {
        PreparedKind::Line { x, strength } => {
            let delta = (c - x).abs();
            if delta > dx {
                return None;
            }
            (x, (1.0 - delta / dx).max(0.0), Some(strength), None)
        }
        PreparedKind::Band { lo, hi } => {
            let nearest = c.clamp(lo, hi);
            let outside = (c - nearest).abs();
            if outside > 0.0 && (!params.pad_bands || outside > dx) {
                return None;
            }
            (nearest, 1.0 - outside / dx, None, Some(outside))
        }
    };

    let strength_weight = match (params.weight_by_strength, strength, max_strength) {
        (true, Some(s), Some(m)) if m > 0.0 => s / m,
        _ => 1.0,
    };

    Some(Match {
        id: match_id(&feature.id, set_id, &p.entry.id),
        feature_id: feature.id.clone(),
        reference_id: p.entry.id.clone(),
        candidate_label: p.entry.label.clone(),
        ref_position_x: ref_x,
        tolerance_dx: dx,
        score: closeness * strength_weight,
        evidence: MatchEvidence {
            delta_x: c - ref_x,
            closeness,
            strength,
            max_strength: if params.weight_by_strength { max_strength } else { None },
            strength_weight,
            distance_outside,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::features::{feature_id, DetectorParams, FeatureMode};

    fn feature_at(x: f64) -> Feature {
        Feature {
            id: feature_id("t", FeatureMode::Peaks, x as usize),
            trace_id: "t".to_string(),
            index: x as usize,
            center_x: x,
            value_y: 1.0,
            prominence: Some(1.0),
            width: None,
            mode: FeatureMode::Peaks,
            detector_params: DetectorParams::default(),
        }
    }

    fn refs(entries: Vec<ReferenceEntry>) -> ReferenceSet {
        ReferenceSet {
            id: "refs".to_string(),
            unit: Some(SpectralUnit::Nanometer),
            entries,
        }
    }

    #[test]
    fn test_line_closeness_and_ranking() {
        let set = refs(vec![
            ReferenceEntry::line("far", "Far", 503.0, 1.0),
            ReferenceEntry::line("near", "Near", 500.5, 1.0),
            ReferenceEntry::line("out", "Out", 510.0, 1.0),
        ]);
        let out = match_features(
            &[feature_at(500.0)],
            Some(SpectralUnit::Nanometer),
            &set,
            &MatchParams::new(4.0),
        )
        .unwrap();
        let fm = &out[0];
        assert_eq!(fm.status, MatchStatus::Ambiguous { count: 2 });
        assert_eq!(fm.candidates[0].reference_id, "near");
        assert!((fm.candidates[0].score - 0.875).abs() < 1e-12);
        assert!((fm.candidates[1].score - 0.25).abs() < 1e-12);
        assert!((fm.candidates[1].evidence.delta_x + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unique_and_none() {
        let set = refs(vec![ReferenceEntry::line("a", "A", 500.0, 1.0)]);
        let out = match_features(
            &[feature_at(500.0), feature_at(600.0)],
            Some(SpectralUnit::Nanometer),
            &set,
            &MatchParams::new(1.0),
        )
        .unwrap();
        assert_eq!(out[0].status, MatchStatus::Unique);
        assert_eq!(out[0].candidates[0].score, 1.0);
        assert_eq!(out[1].status, MatchStatus::NoCandidates);
        assert!(out[1].candidates.is_empty());
    }

    #[test]
    fn test_band_inside_and_padded() {
        let set = refs(vec![ReferenceEntry::band("b", "Band", 495.0, 505.0)]);
        let params = MatchParams::new(2.0);
        let out = match_features(
            &[feature_at(500.0), feature_at(506.0), feature_at(508.0)],
            Some(SpectralUnit::Nanometer),
            &set,
            &params,
        )
        .unwrap();
        assert_eq!(out[0].candidates[0].score, 1.0);
        assert_eq!(out[0].candidates[0].evidence.distance_outside, Some(0.0));
        assert!((out[1].candidates[0].score - 0.5).abs() < 1e-12);
        assert_eq!(out[1].candidates[0].ref_position_x, 505.0);
        assert_eq!(out[2].status, MatchStatus::NoCandidates);

        let strict = MatchParams {
            pad_bands: false,
            ..params
        };
        let out = match_features(&[feature_at(506.0)], None, &set, &strict).unwrap();
        assert_eq!(out[0].status, MatchStatus::NoCandidates);
    }

    #[test]
    fn test_band_edges_in_either_order() {
        let set = refs(vec![ReferenceEntry::band("b", "Band", 505.0, 495.0)]);
        let out = match_features(
            &[feature_at(500.0), feature_at(506.0)],
            Some(SpectralUnit::Nanometer),
            &set,
            &MatchParams::new(2.0),
        )
        .unwrap();
        assert_eq!(out[0].candidates[0].score, 1.0);
        assert!((out[1].candidates[0].score - 0.5).abs() < 1e-12);
        assert_eq!(out[1].candidates[0].ref_position_x, 505.0);
    }

    #[test]
    fn test_strength_weighting() {
        let set = refs(vec![
            ReferenceEntry::line("weak", "Weak", 500.0, 2.0),
            ReferenceEntry::line("strong", "Strong", 501.0, 8.0),
        ]);
        let params = MatchParams {
            weight_by_strength: true,
            ..MatchParams::new(2.0)
        };
        let out = match_features(&[feature_at(500.0)], None, &set, &params).unwrap();
        let c = &out[0].candidates;
        assert_eq!(c[0].reference_id, "strong");
        assert!((c[0].score - 0.5).abs() < 1e-12);
        assert!((c[1].score - 0.25).abs() < 1e-12);
        assert_eq!(c[1].evidence.strength_weight, 0.25);
        assert_eq!(c[1].evidence.max_strength, Some(8.0));
    }

    #[test]
    fn test_too_many_truncates() {
        let set = refs(
            (0..4)
                .map(|i| ReferenceEntry::line(&format!("r{}", i), "", 500.0 + i as f64 * 0.1, 1.0))
                .collect(),
        );
        let params = MatchParams {
            max_candidates: 2,
            ..MatchParams::new(1.0)
        };
        let out = match_features(&[feature_at(500.0)], None, &set, &params).unwrap();
        assert_eq!(out[0].status, MatchStatus::TooMany { count: 4, limit: 2 });
        assert_eq!(out[0].candidates.len(), 2);
        assert_eq!(out[0].candidates[0].reference_id, "r0");
    }

    #[test]
    fn test_ties_break_on_reference_id() {
        let set = refs(vec![
            ReferenceEntry::line("b", "", 501.0, 1.0),
            ReferenceEntry::line("a", "", 499.0, 1.0),
        ]);
        let out = match_features(&[feature_at(500.0)], None, &set, &MatchParams::new(2.0)).unwrap();
        assert_eq!(out[0].candidates[0].reference_id, "a");
    }

    #[test]
    fn test_invalid_tolerance() {
        let set = refs(vec![]);
        for dx in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = match_features(&[], None, &set, &MatchParams::new(dx)).unwrap_err();
            assert!(matches!(err, SpectraError::Config(_)));
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let set = refs(vec![ReferenceEntry::line("a", "", 500.0, 1.0)]);
        let err = match_features(
            &[feature_at(20000.0)],
            Some(SpectralUnit::Wavenumber),
            &set,
            &MatchParams::new(1.0),
        )
        .unwrap_err();
        assert!(matches!(err, SpectraError::Unit(_)));
    }

    #[test]
    fn test_same_dimension_reference_converted() {
        let set = ReferenceSet {
            id: "refs".to_string(),
            unit: Some(SpectralUnit::Angstrom),
            entries: vec![ReferenceEntry::line("a", "", 5000.0, 1.0)],
        };
        let out = match_features(
            &[feature_at(500.0)],
            Some(SpectralUnit::Nanometer),
            &set,
            &MatchParams::new(0.5),
        )
        .unwrap();
        assert_eq!(out[0].status, MatchStatus::Unique);
        assert!((out[0].candidates[0].ref_position_x - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_reference_json_defaults_strength() {
        let set: ReferenceSet = serde_json::from_str(
            r#"{"id":"nist","unit":"nm","entries":[
                {"id":"h-alpha","label":"H-alpha","kind":"line","x":656.28},
                {"id":"o2","kind":"band","x0":759.0,"x1":770.0}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            set.entries[0].kind,
            ReferenceKind::Line {
                x: 656.28,
                strength: 1.0
            }
        );
        assert_eq!(set.entries[1].label, "");
    }
}
