/// Provenance records for derived traces
///
/// Every transform that produces a derived trace is recorded with:
/// - The transform type
/// - Every parameter that changes numeric output
/// - Statistics computed while applying it (divisors, fit coefficients, masks)
/// - A UTC timestamp
///
/// Records are ordered and replayable. A chain can be rendered as:
/// - Human-readable text
/// - JSON (for export manifests)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SpectraError};

/// Kind of transform a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformType {
    Normalize,
    Baseline,
    Smooth,
    Resample,
    Differential,
    UnitDisplay,
}

impl TransformType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransformType::Normalize => "normalize",
            TransformType::Baseline => "baseline",
            TransformType::Smooth => "smooth",
            TransformType::Resample => "resample",
            TransformType::Differential => "differential",
            TransformType::UnitDisplay => "unit_display",
        }
    }
}

impl std::fmt::Display for TransformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single transform applied to produce a derived trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    #[serde(rename = "type")]
    pub transform_type: TransformType,
    pub parameters: Map<String, Value>,
    pub computed_stats: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl TransformRecord {
    /// Build a record from any serializable parameter and stats payloads.
    ///
    /// A payload that does not serialize to JSON is a `Config` error.
    pub fn new<P: Serialize, S: Serialize>(
        transform_type: TransformType,
        parameters: &P,
        computed_stats: &S,
    ) -> Result<Self> {
        Ok(Self {
            transform_type,
            parameters: to_map(parameters, transform_type, "parameters")?,
            computed_stats: to_map(computed_stats, transform_type, "computed stats")?,
            created_at: Utc::now(),
        })
    }

    /// Format as human-readable text line
    pub fn to_text(&self, sequence: usize) -> String {
        format!(
            "[{:03}] {} | {}\n      Parameters: {}\n      Stats:      {}",
            sequence,
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            self.transform_type,
            render_map(&self.parameters),
            render_map(&self.computed_stats),
        )
    }
}

/// Serialize into a JSON object; scalars are wrapped under `"value"`.
fn to_map<T: Serialize>(
    value: &T,
    transform_type: TransformType,
    what: &str,
) -> Result<Map<String, Value>> {
    let value = serde_json::to_value(value).map_err(|e| {
        SpectraError::Config(format!(
            "{} {} cannot be recorded: {}",
            transform_type, what, e
        ))
    })?;
    Ok(match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    })
}

fn render_map(map: &Map<String, Value>) -> String {
    if map.is_empty() {
        return "(none)".to_string();
    }
    map.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The full provenance of one trace, ready for an export writer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceLog {
    pub trace_id: String,
    pub trace_name: String,
    pub parent_ids: Vec<String>,
    pub engine_version: String,
    /// Ordered list of transforms, oldest first
    pub records: Vec<TransformRecord>,
}

impl ProvenanceLog {
    pub fn new(trace_id: &str, trace_name: &str, parent_ids: &[String]) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            trace_name: trace_name.to_string(),
            parent_ids: parent_ids.to_vec(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            records: Vec::new(),
        }
    }

    /// Append a record
    pub fn push(&mut self, record: TransformRecord) {
        log::debug!(
            "[PROV {:03}] {} on {}: {}",
            self.records.len() + 1,
            record.transform_type,
            self.trace_id,
            render_map(&record.parameters)
        );
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Export as human-readable text
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str("  Derived Trace Provenance\n");
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str(&format!("  Trace:       {} ({})\n", self.trace_name, self.trace_id));
        out.push_str(&format!("  Parents:     {}\n", self.parent_ids.join(", ")));
        out.push_str(&format!("  Engine:      spectra-engine v{}\n", self.engine_version));
        out.push_str(&format!("  Transforms:  {}\n", self.records.len()));
        out.push_str("───────────────────────────────────────────────────────────────\n\n");

        for (i, record) in self.records.iter().enumerate() {
            out.push_str(&record.to_text(i + 1));
            out.push_str("\n\n");
        }
        out
    }

    /// Export as JSON
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
