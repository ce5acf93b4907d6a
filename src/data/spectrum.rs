use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::units::SpectralUnit;
use crate::error::{ensure_finite, ensure_same_len, Result, SpectraError};
use crate::log::provenance::{ProvenanceLog, TransformRecord};

/// Borrowed `(x, y)` view used by every numeric operation
#[derive(Debug, Clone, Copy)]
pub struct Series<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
}

impl<'a> Series<'a> {
    pub fn new(x: &'a [f64], y: &'a [f64]) -> Self {
        Self { x, y }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// An imported measurement. Arrays are set once at construction and only
/// ever handed out as shared slices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DatasetInput")]
pub struct Dataset {
    id: String,
    name: String,
    x_canonical: Vec<f64>,
    y: Vec<f64>,
    x_unit_canonical: Option<SpectralUnit>,
    y_unit: Option<String>,
}

/// Unvalidated wire form of a dataset
#[derive(Debug, Clone, Deserialize)]
struct DatasetInput {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(alias = "x")]
    x_canonical: Vec<f64>,
    y: Vec<f64>,
    #[serde(default, alias = "x_unit")]
    x_unit_canonical: Option<String>,
    #[serde(default)]
    y_unit: Option<String>,
}

impl TryFrom<DatasetInput> for Dataset {
    type Error = SpectraError;

    fn try_from(input: DatasetInput) -> Result<Self> {
        // An unrecognized label is treated as unknown, not as a failure: unit-free
        // operations still work and display conversion reports it.
        let unit = input
            .x_unit_canonical
            .as_deref()
            .and_then(super::units::normalize_unit);
        let mut ds = Dataset::new(&input.id, input.x_canonical, input.y, unit, input.y_unit)?;
        if let Some(name) = input.name {
            ds.name = name;
        }
        Ok(ds)
    }
}

impl Dataset {
    pub fn new(
        id: &str,
        x_canonical: Vec<f64>,
        y: Vec<f64>,
        x_unit_canonical: Option<SpectralUnit>,
        y_unit: Option<String>,
    ) -> Result<Self> {
        ensure_same_len(&x_canonical, &y, &format!("dataset '{}'", id))?;
        ensure_finite(&x_canonical, &format!("dataset '{}' x", id))?;
        ensure_finite(&y, &format!("dataset '{}' y", id))?;
        Ok(Self {
            id: id.to_string(),
            name: id.to_string(),
            x_canonical,
            y,
            x_unit_canonical,
            y_unit,
        })
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn x_canonical(&self) -> &[f64] {
        &self.x_canonical
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn x_unit(&self) -> Option<SpectralUnit> {
        self.x_unit_canonical
    }

    pub fn y_unit(&self) -> Option<&str> {
        self.y_unit.as_deref()
    }

    pub fn series(&self) -> Series<'_> {
        Series::new(&self.x_canonical, &self.y)
    }
}

/// Marker carried in serialized derived traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Derived,
}

/// A trace produced by transforming or combining other traces.
///
/// `transform_chain` holds the full history from the root dataset. A child
/// chain starts with the chain of the parent whose X grid it shares; a
/// comparison also keeps both parents' chains on its differential record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DerivedTraceInput")]
pub struct DerivedTrace {
    id: String,
    name: String,
    parent_ids: Vec<String>,
    kind: TraceKind,
    x: Vec<f64>,
    /// NaN marks points outside an overlap; JSON writes them as null
    y: Vec<f64>,
    x_unit: Option<SpectralUnit>,
    y_unit: Option<String>,
    transform_chain: Vec<TransformRecord>,
}

/// Unvalidated wire form of a derived trace
#[derive(Debug, Clone, Deserialize)]
struct DerivedTraceInput {
    id: String,
    name: String,
    #[serde(default)]
    parent_ids: Vec<String>,
    kind: TraceKind,
    x: Vec<f64>,
    #[serde(deserialize_with = "nullable_values")]
    y: Vec<f64>,
    #[serde(default)]
    x_unit: Option<SpectralUnit>,
    #[serde(default)]
    y_unit: Option<String>,
    #[serde(default)]
    transform_chain: Vec<TransformRecord>,
}

impl TryFrom<DerivedTraceInput> for DerivedTrace {
    type Error = SpectraError;

    fn try_from(input: DerivedTraceInput) -> Result<Self> {
        ensure_same_len(&input.x, &input.y, &format!("derived trace '{}'", input.name))?;
        ensure_finite(&input.x, &format!("derived trace '{}' x", input.name))?;
        Ok(Self {
            id: input.id,
            name: input.name,
            parent_ids: input.parent_ids,
            kind: input.kind,
            x: input.x,
            y: input.y,
            x_unit: input.x_unit,
            y_unit: input.y_unit,
            transform_chain: input.transform_chain,
        })
    }
}

impl DerivedTrace {
    /// Assemble a derived trace with a fresh identifier.
    pub(crate) fn new(
        name: String,
        parent_ids: Vec<String>,
        x: Vec<f64>,
        y: Vec<f64>,
        x_unit: Option<SpectralUnit>,
        y_unit: Option<String>,
        transform_chain: Vec<TransformRecord>,
    ) -> Result<Self> {
        ensure_same_len(&x, &y, &format!("derived trace '{}'", name))?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            parent_ids,
            kind: TraceKind::Derived,
            x,
            y,
            x_unit,
            y_unit,
            transform_chain,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_ids(&self) -> &[String] {
        &self.parent_ids
    }

    pub fn kind(&self) -> TraceKind {
        self.kind
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn transform_chain(&self) -> &[TransformRecord] {
        &self.transform_chain
    }

    pub fn provenance(&self) -> ProvenanceLog {
        let mut log = ProvenanceLog::new(&self.id, &self.name, &self.parent_ids);
        for record in &self.transform_chain {
            log.push(record.clone());
        }
        log
    }
}

fn nullable_values<'de, D>(deserializer: D) -> std::result::Result<Vec<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<Option<f64>> = Deserialize::deserialize(deserializer)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Either an imported dataset or something derived from one
#[derive(Debug, Clone, PartialEq)]
pub enum Trace {
    Original(Arc<Dataset>),
    Derived(DerivedTrace),
}

impl Trace {
    pub fn id(&self) -> &str {
        match self {
            Trace::Original(ds) => ds.id(),
            Trace::Derived(t) => t.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Trace::Original(ds) => ds.name(),
            Trace::Derived(t) => t.name(),
        }
    }

    pub fn x(&self) -> &[f64] {
        match self {
            Trace::Original(ds) => ds.x_canonical(),
            Trace::Derived(t) => t.x(),
        }
    }

    pub fn y(&self) -> &[f64] {
        match self {
            Trace::Original(ds) => ds.y(),
            Trace::Derived(t) => t.y(),
        }
    }

    pub fn x_unit(&self) -> Option<SpectralUnit> {
        match self {
            Trace::Original(ds) => ds.x_unit(),
            Trace::Derived(t) => t.x_unit,
        }
    }

    pub fn y_unit(&self) -> Option<&str> {
        match self {
            Trace::Original(ds) => ds.y_unit(),
            Trace::Derived(t) => t.y_unit.as_deref(),
        }
    }

    /// Records applied since the root dataset; empty for originals.
    pub fn transform_chain(&self) -> &[TransformRecord] {
        match self {
            Trace::Original(_) => &[],
            Trace::Derived(t) => t.transform_chain(),
        }
    }

    pub fn series(&self) -> Series<'_> {
        Series::new(self.x(), self.y())
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, Trace::Derived(_))
    }
}

impl From<Dataset> for Trace {
    fn from(ds: Dataset) -> Self {
        Trace::Original(Arc::new(ds))
    }
}

impl From<Arc<Dataset>> for Trace {
    fn from(ds: Arc<Dataset>) -> Self {
        Trace::Original(ds)
    }
}

impl From<DerivedTrace> for Trace {
    fn from(t: DerivedTrace) -> Self {
        Trace::Derived(t)
    }
}
