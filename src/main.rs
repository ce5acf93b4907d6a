//! spectra-engine: batch front end over JSON documents.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use spectra_engine::config::{ConfigLoadError, EngineConfig};
use spectra_engine::data::units::normalize_unit;
use spectra_engine::pipeline::alignment::{resample, AlignmentResult};
use spectra_engine::pipeline::differential::{AlignmentConfig, RatioConfig};
use spectra_engine::pipeline::features::{DetectorParams, Feature};
use spectra_engine::pipeline::matching::{match_features, ReferenceSet};
use spectra_engine::{
    compare, derive, detect, display_view, Dataset, DerivedTrace, DisplayUnit, SpectraError,
    SpectralUnit, Trace, TransformStep,
};

#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error on {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("Invalid argument: {0}")]
    Argument(String),
    #[error("{0}")]
    Config(#[from] ConfigLoadError),
    #[error("{} ({})", .0, .0.kind())]
    Engine(#[from] SpectraError),
}

#[derive(Parser)]
#[command(
    name = "spectra-engine",
    version,
    about = "Non-destructive spectral transforms, comparison and feature matching"
)]
struct Cli {
    /// Engine config JSON (defaults apply to anything not set)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output file (or - for stdout)
    #[arg(short, long, global = true, default_value = "-")]
    out: String,

    /// Verbose logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a chain of transform steps to a dataset or derived trace
    Derive {
        #[arg(short, long)]
        input: PathBuf,
        /// JSON array of steps
        #[arg(short, long)]
        steps: PathBuf,
    },
    /// Compare two traces pointwise
    Compare {
        #[arg(long)]
        a: PathBuf,
        #[arg(long)]
        b: PathBuf,
        /// ratio | subtract
        #[arg(long, default_value = "subtract")]
        op: String,
        /// none | nearest | linear | pchip
        #[arg(long)]
        method: Option<String>,
        /// A | B
        #[arg(long)]
        target: Option<String>,
        /// Ratio masking threshold
        #[arg(long)]
        tau: Option<f64>,
    },
    /// Resample a trace onto the X grid of another
    Resample {
        #[arg(short, long)]
        input: PathBuf,
        /// Trace whose X grid is the target
        #[arg(short, long)]
        grid: PathBuf,
        #[arg(long)]
        method: Option<String>,
    },
    /// Detect peaks or dips
    Detect {
        #[arg(short, long)]
        input: PathBuf,
        /// peaks | dips
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        min_prominence: Option<f64>,
        #[arg(long)]
        min_separation: Option<f64>,
        #[arg(long)]
        max_count: Option<usize>,
    },
    /// Match detected features against a reference set
    Match {
        #[arg(short, long)]
        features: PathBuf,
        #[arg(short, long)]
        references: PathBuf,
        #[arg(short, long)]
        tolerance: Option<f64>,
        /// X unit the features were detected in
        #[arg(long)]
        unit: Option<String>,
    },
    /// Show a dataset's X axis in another unit
    Convert {
        #[arg(short, long)]
        input: PathBuf,
        /// Display unit, or as-imported
        #[arg(short, long)]
        unit: Option<String>,
    },
}

/// A trace document: derived traces carry `kind`, anything else is a dataset
#[derive(Deserialize)]
#[serde(untagged)]
enum TraceDocument {
    Derived(DerivedTrace),
    Original(Dataset),
}

impl From<TraceDocument> for Trace {
    fn from(doc: TraceDocument) -> Self {
        match doc {
            TraceDocument::Derived(t) => Trace::Derived(t),
            TraceDocument::Original(ds) => Trace::Original(Arc::new(ds)),
        }
    }
}

#[derive(Serialize)]
struct ResampleReport<'a> {
    source_trace: &'a str,
    x: &'a [f64],
    y: Vec<f64>,
    alignment: AlignmentResult,
}

#[derive(Serialize)]
struct ConvertReport<'a> {
    dataset_id: &'a str,
    unit: Option<SpectralUnit>,
    x: &'a [f64],
    record: &'a spectra_engine::log::provenance::TransformRecord,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .format_timestamp_secs()
    .init();

    if let Err(e) = run(&cli) {
        ::log::error!("{}", e);
        return Err(e.into());
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let json = match &cli.command {
        Command::Derive { input, steps } => {
            let parent: Trace = read_json::<TraceDocument>(input)?.into();
            let steps: Vec<TransformStep> = read_json(steps)?;
            let derived = derive(&parent, &steps)?;
            ::log::info!(
                "Derived '{}' with {} record(s)",
                derived.name(),
                derived.transform_chain().len()
            );
            to_json(&derived)?
        }
        Command::Compare {
            a,
            b,
            op,
            method,
            target,
            tau,
        } => {
            let ta: Trace = read_json::<TraceDocument>(a)?.into();
            let tb: Trace = read_json::<TraceDocument>(b)?.into();
            let align = AlignmentConfig {
                method: match method {
                    Some(m) => m.parse()?,
                    None => config.alignment.method,
                },
                target: match target {
                    Some(t) => t.parse()?,
                    None => config.alignment.target,
                },
            };
            let ratio = RatioConfig {
                tau: tau.or(config.ratio.tau),
                ..config.ratio
            };
            let derived = compare(&ta, &tb, op.parse()?, &align, &ratio)?;
            ::log::info!("Produced '{}' ({} points)", derived.name(), derived.x().len());
            to_json(&derived)?
        }
        Command::Resample {
            input,
            grid,
            method,
        } => {
            let source: Trace = read_json::<TraceDocument>(input)?.into();
            let target: Trace = read_json::<TraceDocument>(grid)?.into();
            let mut opts = config.resample;
            if let Some(m) = method {
                opts.method = m.parse()?;
            }
            let out = resample(source.x(), source.y(), target.x(), &opts)?;
            let alignment = out.alignment();
            to_json(&ResampleReport {
                source_trace: source.id(),
                x: target.x(),
                y: out.y_aligned,
                alignment,
            })?
        }
        Command::Detect {
            input,
            mode,
            min_prominence,
            min_separation,
            max_count,
        } => {
            let trace: Trace = read_json::<TraceDocument>(input)?.into();
            let mut params: DetectorParams = config.detector;
            if let Some(m) = mode {
                params.mode = m.parse()?;
            }
            if let Some(p) = min_prominence {
                params.min_prominence = *p;
            }
            if let Some(s) = min_separation {
                params.min_separation_x = *s;
            }
            if max_count.is_some() {
                params.max_count = *max_count;
            }
            let features = detect(&trace, &params)?;
            ::log::info!("Detected {} feature(s) on '{}'", features.len(), trace.name());
            to_json(&features)?
        }
        Command::Match {
            features,
            references,
            tolerance,
            unit,
        } => {
            let features: Vec<Feature> = read_json(features)?;
            let refs: ReferenceSet = read_json(references)?;
            let feature_unit = match unit {
                Some(raw) => Some(normalize_unit(raw).ok_or_else(|| {
                    CliError::Argument(format!("unrecognized unit '{}'", raw))
                })?),
                None => None,
            };
            let params = config.matcher.params(*tolerance)?;
            let matches = match_features(&features, feature_unit, &refs, &params)?;
            ::log::info!(
                "Matched {} feature(s) against reference set '{}'",
                matches.len(),
                refs.id
            );
            to_json(&matches)?
        }
        Command::Convert { input, unit } => {
            let dataset: Dataset = read_json(input)?;
            let display: DisplayUnit = match unit {
                Some(raw) => raw.parse()?,
                None => config.display_unit,
            };
            let view = display_view(&dataset, display)?;
            to_json(&ConvertReport {
                dataset_id: dataset.id(),
                unit: view.unit,
                x: &view.x,
                record: &view.record,
            })?
        }
    };

    write_output(&cli.out, &json)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|source| CliError::Json {
        path: "<output>".to_string(),
        source,
    })
}

fn write_output(out_path: &str, json: &str) -> Result<(), CliError> {
    let io_err = |source: io::Error| CliError::Io {
        path: out_path.to_string(),
        source,
    };
    if out_path == "-" {
        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        writeln!(out, "{}", json).map_err(io_err)?;
        out.flush().map_err(io_err)?;
    } else {
        let mut out = BufWriter::new(File::create(out_path).map_err(io_err)?);
        writeln!(out, "{}", json).map_err(io_err)?;
        out.flush().map_err(io_err)?;
        ::log::info!("Wrote {}", out_path);
    }
    Ok(())
}
