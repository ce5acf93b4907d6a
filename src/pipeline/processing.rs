/// Trace-level operations
///
/// Each operation reads its input traces without modifying them, produces a
/// new DerivedTrace (or feature list), and records what it did in the
/// transform chain. Chains of normalize/baseline/smooth steps replay
/// bit-for-bit against the root dataset.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::baseline::fit_polynomial_baseline;
use super::differential::{
    differential_compare, AlignTarget, AlignmentConfig, DiffOperator, RatioConfig,
};
use super::features::{detect_features, DetectorParams, Feature};
use super::normalize::{normalize_y, NormalizeMode, RangeSelection};
use super::smoothing::{savitzky_golay_smooth, SmoothParams};
use crate::data::spectrum::{Dataset, DerivedTrace, Series, Trace};
use crate::data::units::{
    convert_x_from_canonical, ensure_same_dimension, DisplayUnit, SpectralUnit,
};
use crate::error::{Result, SpectraError};
use crate::log::provenance::{TransformRecord, TransformType};

/// A replayable single-trace transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformStep {
    Normalize {
        mode: NormalizeMode,
        #[serde(default)]
        selection: Option<RangeSelection>,
    },
    Baseline {
        order: i32,
    },
    Smooth {
        window_length: usize,
        polyorder: usize,
    },
}

impl TransformStep {
    pub fn transform_type(&self) -> TransformType {
        match self {
            TransformStep::Normalize { .. } => TransformType::Normalize,
            TransformStep::Baseline { .. } => TransformType::Baseline,
            TransformStep::Smooth { .. } => TransformType::Smooth,
        }
    }

    /// Recover the step stored in a record's parameters.
    pub fn from_record(record: &TransformRecord) -> Result<Self> {
        let step: TransformStep =
            serde_json::from_value(Value::Object(record.parameters.clone())).map_err(|e| {
                SpectraError::Config(format!(
                    "{} record parameters are not a replayable step: {}",
                    record.transform_type, e
                ))
            })?;
        if step.transform_type() != record.transform_type {
            return Err(SpectraError::Config(format!(
                "record of type {} carries {} parameters",
                record.transform_type,
                step.transform_type()
            )));
        }
        Ok(step)
    }
}

impl std::fmt::Display for TransformStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformStep::Normalize { mode, .. } => write!(f, "NORM({})", mode),
            TransformStep::Baseline { order } => write!(f, "BASE({})", order),
            TransformStep::Smooth {
                window_length,
                polyorder,
            } => write!(f, "SG({},{})", window_length, polyorder),
        }
    }
}

// =========================================================================
//  Single-trace transforms
// =========================================================================

/// Apply one step to `y` and describe it.
fn apply_step(
    x: &[f64],
    y: &[f64],
    unit: Option<SpectralUnit>,
    step: &TransformStep,
) -> Result<(Vec<f64>, TransformRecord)> {
    match step {
        TransformStep::Normalize { mode, selection } => {
            let out = normalize_y(x, y, *mode, selection.as_ref(), unit)?;
            let stats = json!({
                "stats": out.stats,
                "used_selection": out.used_selection,
            });
            Ok((out.y, TransformRecord::new(step.transform_type(), step, &stats)?))
        }
        TransformStep::Baseline { order } => {
            let out = fit_polynomial_baseline(x, y, *order)?;
            Ok((
                out.corrected,
                TransformRecord::new(step.transform_type(), step, &out.fit)?,
            ))
        }
        TransformStep::Smooth {
            window_length,
            polyorder,
        } => {
            let out = savitzky_golay_smooth(y, &SmoothParams::new(*window_length, *polyorder))?;
            let stats = json!({ "kernel": out.kernel });
            Ok((out.y, TransformRecord::new(step.transform_type(), step, &stats)?))
        }
    }
}

/// Apply `steps` in order to `parent`, producing one derived trace.
///
/// The new chain is the parent's chain followed by one record per step.
pub fn derive(parent: &Trace, steps: &[TransformStep]) -> Result<DerivedTrace> {
    if steps.is_empty() {
        return Err(SpectraError::Config(
            "derive needs at least one transform step".to_string(),
        ));
    }

    let x = parent.x();
    let mut y = parent.y().to_vec();
    let mut chain = parent.transform_chain().to_vec();
    let mut name = parent.name().to_string();

    for step in steps {
        let (next, record) = apply_step(x, &y, parent.x_unit(), step)?;
        log::debug!("Applied {} to '{}'", step, parent.name());
        y = next;
        chain.push(record);
        name = format!("{}: {}", step, name);
    }

    DerivedTrace::new(
        name,
        vec![parent.id().to_string()],
        x.to_vec(),
        y,
        parent.x_unit(),
        parent.y_unit().map(str::to_string),
        chain,
    )
}

/// Re-run a recorded chain against its root dataset and return the final Y.
pub fn replay(root: &Dataset, records: &[TransformRecord]) -> Result<Vec<f64>> {
    let x = root.x_canonical();
    let mut y = root.y().to_vec();
    for record in records {
        match record.transform_type {
            TransformType::UnitDisplay => continue,
            TransformType::Resample | TransformType::Differential => {
                return Err(SpectraError::Config(format!(
                    "cannot replay a {} record against a single root dataset",
                    record.transform_type
                )));
            }
            _ => {}
        }
        let step = TransformStep::from_record(record)?;
        let (next, _) = apply_step(x, &y, root.x_unit(), &step)?;
        y = next;
    }
    log::debug!("Replayed {} record(s) against '{}'", records.len(), root.name());
    Ok(y)
}

// =========================================================================
//  Two-trace comparison
// =========================================================================

/// Compare two traces and wrap the result as a derived trace.
///
/// Traces in different units of the same dimension are compared on the unit
/// of the alignment target.
pub fn compare(
    a: &Trace,
    b: &Trace,
    op: DiffOperator,
    align: &AlignmentConfig,
    ratio: &RatioConfig,
) -> Result<DerivedTrace> {
    ensure_same_dimension(a.x_unit(), b.x_unit(), "differential comparison")?;
    let (target_unit, other_unit) = match align.target {
        AlignTarget::A => (a.x_unit(), b.x_unit()),
        AlignTarget::B => (b.x_unit(), a.x_unit()),
    };
    let rescale = |trace: &Trace| -> Result<Vec<f64>> {
        match (other_unit, target_unit) {
            (Some(from), Some(to)) if from != to => {
                let x = convert_x_from_canonical(trace.x(), Some(from), DisplayUnit::Unit(to))?;
                Ok(x.into_owned())
            }
            _ => Ok(trace.x().to_vec()),
        }
    };
    let (ax, bx): (Cow<'_, [f64]>, Cow<'_, [f64]>) = match align.target {
        AlignTarget::A => (Cow::Borrowed(a.x()), Cow::Owned(rescale(b)?)),
        AlignTarget::B => (Cow::Owned(rescale(a)?), Cow::Borrowed(b.x())),
    };

    let out = differential_compare(
        Series::new(&ax, a.y()),
        Series::new(&bx, b.y()),
        op,
        align,
        ratio,
    )?;

    if let Some(mask) = out.ratio_mask.filter(|m| m.masked_count > 0) {
        log::warn!(
            "{} of {} ratio points masked (|B| < {:e}) comparing '{}' with '{}'",
            mask.masked_count,
            out.y.len(),
            mask.tau,
            a.name(),
            b.name()
        );
    }

    let (target, other) = match align.target {
        AlignTarget::A => (a, b),
        AlignTarget::B => (b, a),
    };
    // The result lives on the target's grid, so its history leads the chain.
    // Both parents' full histories are kept on the differential record.
    let mut chain = target.transform_chain().to_vec();
    if out.interpolated {
        chain.push(TransformRecord::new(
            TransformType::Resample,
            &json!({
                "method": align.method,
                "source_trace": other.id(),
                "target_trace": target.id(),
                "source_chain": other.transform_chain(),
                "overlap_only": true,
                "extrapolate": false,
            }),
            &json!({
                "overlap": out.overlap,
                "interpolated": out.interpolated,
                "points": out.x.len(),
            }),
        )?);
    }
    chain.push(TransformRecord::new(
        TransformType::Differential,
        &json!({
            "operator": op,
            "alignment": align,
            "ratio": ratio,
            "parent_a": a.id(),
            "parent_b": b.id(),
            "parent_a_chain": a.transform_chain(),
            "parent_b_chain": b.transform_chain(),
        }),
        &json!({
            "overlap": out.overlap,
            "interpolated": out.interpolated,
            "alignment": out.alignment,
            "ratio_mask": out.ratio_mask,
            "warnings": out.warnings,
        }),
    )?);
    log::debug!("Compared '{}' {} '{}'", a.name(), op, b.name());

    let y_unit = match op {
        DiffOperator::Subtract if a.y_unit() == b.y_unit() => a.y_unit().map(str::to_string),
        _ => None,
    };

    DerivedTrace::new(
        format!("DIFF({}): {} vs {}", op, a.name(), b.name()),
        vec![a.id().to_string(), b.id().to_string()],
        out.x,
        out.y,
        target_unit,
        y_unit,
        chain,
    )
}

// =========================================================================
//  Features
// =========================================================================

/// Detect peaks or dips on any trace.
pub fn detect(trace: &Trace, params: &DetectorParams) -> Result<Vec<Feature>> {
    let features = detect_features(trace.id(), trace.x(), trace.y(), params)?;
    log::debug!(
        "Detected {} {} on '{}'",
        features.len(),
        params.mode,
        trace.name()
    );
    Ok(features)
}

// =========================================================================
//  Display
// =========================================================================

/// An X axis converted for display, plus its provenance record
#[derive(Debug, Clone)]
pub struct DisplayView<'a> {
    pub x: Cow<'a, [f64]>,
    pub unit: Option<SpectralUnit>,
    pub record: TransformRecord,
}

/// Convert a dataset's canonical X axis for display. The dataset is untouched.
pub fn display_view(dataset: &Dataset, display: DisplayUnit) -> Result<DisplayView<'_>> {
    let x = convert_x_from_canonical(dataset.x_canonical(), dataset.x_unit(), display)?;
    let unit = match display {
        DisplayUnit::AsImported => dataset.x_unit(),
        DisplayUnit::Unit(u) => Some(u),
    };
    let record = TransformRecord::new(
        TransformType::UnitDisplay,
        &json!({
            "display": display,
            "canonical": dataset.x_unit(),
        }),
        &json!({
            "points": x.len(),
            "converted": matches!(x, Cow::Owned(_)),
        }),
    )?;
    log::debug!("Display view of '{}' in {}", dataset.name(), display);
    Ok(DisplayView { x, unit, record })
}
