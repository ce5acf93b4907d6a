//! Error taxonomy shared by every engine component.
//!
//! All failures are deterministic: the same input always fails the same way, so
//! callers decide how to surface them and nothing here retries or substitutes
//! defaults.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpectraError {
    /// Unknown or incompatible spectral unit / dimension.
    #[error("Unit error: {0}")]
    Unit(String),
    /// Mismatched array lengths or too few points for a fit.
    #[error("Shape error: {0}")]
    Shape(String),
    /// Degenerate normalization denominator.
    #[error("Division error: {0}")]
    Division(String),
    /// Unsolvable linear system in a least-squares fit.
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),
    /// Invalid user parameter.
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Non-monotone X, or an exact join was required but the grids differ.
    #[error("Alignment error: {0}")]
    Alignment(String),
    /// Two traces share no X range.
    #[error("Overlap error: {0}")]
    Overlap(String),
    /// NaN or infinity where a finite value is required.
    #[error("Non-finite input: {0}")]
    NonFinite(String),
}

impl SpectraError {
    /// Stable tag for serialized error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SpectraError::Unit(_) => "unit_error",
            SpectraError::Shape(_) => "shape_error",
            SpectraError::Division(_) => "division_error",
            SpectraError::SingularMatrix(_) => "singular_matrix_error",
            SpectraError::Config(_) => "config_error",
            SpectraError::Alignment(_) => "alignment_error",
            SpectraError::Overlap(_) => "overlap_error",
            SpectraError::NonFinite(_) => "non_finite_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, SpectraError>;

/// Fail with `Shape` unless both arrays have the same length.
pub fn ensure_same_len(x: &[f64], y: &[f64], what: &str) -> Result<()> {
    if x.len() != y.len() {
        return Err(SpectraError::Shape(format!(
            "{}: x has {} points but y has {}",
            what,
            x.len(),
            y.len()
        )));
    }
    Ok(())
}

/// Fail with `NonFinite` naming the first offending index.
pub fn ensure_finite(values: &[f64], what: &str) -> Result<()> {
    if let Some((i, v)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(SpectraError::NonFinite(format!(
            "{} contains {} at index {}",
            what, v, i
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_value() {
        let err = ensure_finite(&[1.0, f64::NAN], "y").unwrap_err();
        assert_eq!(err.kind(), "non_finite_error");
        assert!(err.to_string().contains("index 1"));

        let err = ensure_same_len(&[1.0], &[1.0, 2.0], "trace").unwrap_err();
        assert!(matches!(err, SpectraError::Shape(_)));
        assert!(err.to_string().contains("x has 1 points but y has 2"));
    }
}
