//! Engine defaults, loadable from a JSON file.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Explicit command-line options override what is loaded here.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::units::DisplayUnit;
use crate::error::SpectraError;
use crate::pipeline::alignment::ResampleOptions;
use crate::pipeline::differential::{AlignmentConfig, RatioConfig};
use crate::pipeline::features::DetectorParams;
use crate::pipeline::matching::{MatchParams, DEFAULT_MAX_CANDIDATES};

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(#[from] SpectraError),
}

/// Matcher defaults; the tolerance has no built-in value and must come from
/// the config file or the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherDefaults {
    pub tolerance_dx: Option<f64>,
    pub pad_bands: bool,
    pub weight_by_strength: bool,
    pub max_candidates: usize,
}

impl Default for MatcherDefaults {
    fn default() -> Self {
        Self {
            tolerance_dx: None,
            pad_bands: true,
            weight_by_strength: false,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl MatcherDefaults {
    /// Resolve match parameters, preferring an explicit tolerance.
    pub fn params(&self, tolerance_dx: Option<f64>) -> Result<MatchParams, SpectraError> {
        let tolerance_dx = tolerance_dx.or(self.tolerance_dx).ok_or_else(|| {
            SpectraError::Config(
                "a matching tolerance is required (set matcher.tolerance_dx or pass one)"
                    .to_string(),
            )
        })?;
        let params = MatchParams {
            tolerance_dx,
            pad_bands: self.pad_bands,
            weight_by_strength: self.weight_by_strength,
            max_candidates: self.max_candidates,
        };
        params.validate()?;
        Ok(params)
    }
}

fn default_display_unit() -> DisplayUnit {
    DisplayUnit::AsImported
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub alignment: AlignmentConfig,
    pub ratio: RatioConfig,
    /// Used by standalone resampling; differential comparison is always overlap-only
    pub resample: ResampleOptions,
    pub detector: DetectorParams,
    pub matcher: MatcherDefaults,
    #[serde(default = "default_display_unit")]
    pub display_unit: DisplayUnit,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alignment: AlignmentConfig::default(),
            ratio: RatioConfig::default(),
            resample: ResampleOptions::default(),
            detector: DetectorParams::default(),
            matcher: MatcherDefaults::default(),
            display_unit: default_display_unit(),
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let text = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        ::log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SpectraError> {
        if let Some(tau) = self.ratio.tau {
            if !tau.is_finite() || tau <= 0.0 {
                return Err(SpectraError::Config(format!(
                    "ratio.tau must be finite and > 0, got {}",
                    tau
                )));
            }
        }
        self.detector.validate()?;
        if let Some(dx) = self.matcher.tolerance_dx {
            self.matcher.params(Some(dx))?;
        } else if self.matcher.max_candidates == 0 {
            return Err(SpectraError::Config(
                "matcher.max_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
