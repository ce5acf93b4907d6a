//! Non-destructive spectral processing: unit display, Y transforms, alignment,
//! differential comparison, feature detection and reference matching, with a
//! replayable provenance record for every derived trace.

pub mod config;
pub mod data;
pub mod error;
pub mod log;
pub mod pipeline;

pub use config::EngineConfig;
pub use data::spectrum::{Dataset, DerivedTrace, Series, Trace};
pub use data::units::{DisplayUnit, SpectralUnit};
pub use error::{Result, SpectraError};
pub use pipeline::processing::{compare, derive, detect, display_view, replay, TransformStep};
