use std::sync::Arc;

use spectra_engine::data::units::convert_x_from_canonical;
use spectra_engine::log::provenance::TransformType;
use spectra_engine::pipeline::alignment::AlignMethod;
use spectra_engine::pipeline::differential::{
    AlignTarget, AlignmentConfig, DiffOperator, RatioConfig,
};
use spectra_engine::pipeline::features::{DetectorParams, FeatureMode};
use spectra_engine::pipeline::matching::{match_features, MatchStatus, ReferenceSet};
use spectra_engine::pipeline::normalize::NormalizeMode;
use spectra_engine::{
    compare, derive, detect, replay, Dataset, DisplayUnit, SpectralUnit, Trace, TransformStep,
};

fn gaussian(x: f64, center: f64, height: f64, sigma: f64) -> f64 {
    height * (-0.5 * ((x - center) / sigma).powi(2)).exp()
}

fn sample_dataset(id: &str, shift: f64) -> Dataset {
    let x: Vec<f64> = (0..400).map(|i| 400.0 + 0.75 * i as f64 + shift).collect();
    let y: Vec<f64> = x
        .iter()
        .map(|&v| {
            1.0 + 0.002 * (v - 400.0)
                + gaussian(v, 486.1, 5.0, 1.5)
                + gaussian(v, 656.3, 9.0, 1.5)
        })
        .collect();
    Dataset::new(id, x, y, Some(SpectralUnit::Nanometer), Some("counts".to_string()))
        .unwrap()
        .with_name(id)
}

#[test]
fn test_derive_detect_match() {
    let ds = Arc::new(sample_dataset("lamp", 0.0));
    let root = Trace::from(Arc::clone(&ds));

    let steps = vec![
        TransformStep::Baseline { order: 1 },
        TransformStep::Smooth {
            window_length: 7,
            polyorder: 2,
        },
        TransformStep::Normalize {
            mode: NormalizeMode::Max,
            selection: None,
        },
    ];
    let derived = derive(&root, &steps).unwrap();
    assert_eq!(derived.transform_chain().len(), 3);
    assert!(derived.name().ends_with("lamp"));

    let replayed = replay(&ds, derived.transform_chain()).unwrap();
    assert_eq!(replayed, derived.y().to_vec());

    let features = detect(
        &Trace::from(derived.clone()),
        &DetectorParams {
            mode: FeatureMode::Peaks,
            min_prominence: 0.2,
            min_separation_x: 5.0,
            max_count: None,
        },
    )
    .unwrap();
    assert_eq!(features.len(), 2);
    assert!((features[0].center_x - 486.1).abs() < 1.0);
    assert!((features[1].center_x - 656.3).abs() < 1.0);
    assert!(features.iter().all(|f| f.width.is_some()));

    let refs: ReferenceSet = serde_json::from_str(
        r#"{"id": "balmer", "unit": "nm", "entries": [
            {"id": "h-alpha", "label": "H-alpha", "kind": "line", "x": 656.28, "strength": 3.0},
            {"id": "h-beta", "label": "H-beta", "kind": "line", "x": 486.13, "strength": 1.0},
            {"id": "h-gamma", "label": "H-gamma", "kind": "line", "x": 434.05}
        ]}"#,
    )
    .unwrap();
    let params = spectra_engine::pipeline::matching::MatchParams::new(1.0);
    let matches = match_features(&features, Some(SpectralUnit::Nanometer), &refs, &params).unwrap();
    assert_eq!(matches[0].status, MatchStatus::Unique);
    assert_eq!(matches[0].candidates[0].candidate_label, "H-beta");
    assert_eq!(matches[1].candidates[0].reference_id, "h-alpha");

    // Original arrays untouched
    assert_eq!(ds.y(), sample_dataset("lamp", 0.0).y());
}

#[test]
fn test_compare_shifted_grids() {
    let a = Trace::from(sample_dataset("a", 0.0));
    let b = Trace::from(sample_dataset("b", 0.3));

    let err = compare(
        &a,
        &b,
        DiffOperator::Subtract,
        &AlignmentConfig::default(),
        &RatioConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "alignment_error");

    let diff = compare(
        &a,
        &b,
        DiffOperator::Ratio,
        &AlignmentConfig {
            method: AlignMethod::Pchip,
            target: AlignTarget::A,
        },
        &RatioConfig::default(),
    )
    .unwrap();
    assert_eq!(diff.x(), a.x());
    assert!(diff.y()[0].is_nan());
    let finite: Vec<f64> = diff.y().iter().cloned().filter(|v| v.is_finite()).collect();
    assert_eq!(finite.len(), diff.y().len() - 1);
    assert!(finite.iter().all(|v| (v - 1.0).abs() < 0.2));

    let types: Vec<TransformType> = diff
        .transform_chain()
        .iter()
        .map(|r| r.transform_type)
        .collect();
    assert_eq!(types, vec![TransformType::Resample, TransformType::Differential]);

    let log = diff.provenance();
    assert_eq!(log.parent_ids, vec!["a".to_string(), "b".to_string()]);
    assert!(log.to_text().contains("differential"));
    let json = log.to_json().unwrap();
    assert!(json.contains("\"ratio_mask\""));
}

#[test]
fn test_display_round_trip() {
    let ds = sample_dataset("w", 0.0);
    let shown = convert_x_from_canonical(
        ds.x_canonical(),
        ds.x_unit(),
        DisplayUnit::Unit(SpectralUnit::Wavenumber),
    )
    .unwrap();
    assert!((shown[0] - 25_000.0).abs() < 1e-6);
    let view = spectra_engine::display_view(&ds, "µm".parse().unwrap()).unwrap();
    assert!((view.x[0] - 0.4).abs() < 1e-12);
    assert_eq!(ds.x_canonical()[0], 400.0);
}
