//! Data layer: immutable datasets, derived traces, and spectral units.

pub mod spectrum;
pub mod units;
