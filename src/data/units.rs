//! Spectral X-axis units and display conversion.
//!
//! Conversion always starts from the canonical axis stored on a dataset and goes
//! through nanometres (`canonical → nm → display`). Converted axes are never fed
//! back into another conversion, so repeated unit switching cannot drift.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectraError};

/// nm·cm⁻¹ product for spectroscopic wavenumber (`nm = 1e7 / cm⁻¹`).
const NM_PER_INVERSE_CM: f64 = 1e7;

/// Canonical spectral units an axis may be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SpectralUnit {
    Nanometer,
    Angstrom,
    Micrometer,
    Wavenumber,
}

/// Physical quantity an axis measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisDimension {
    Wavelength,
    Wavenumber,
}

impl SpectralUnit {
    pub const ALL: [SpectralUnit; 4] = [
        SpectralUnit::Nanometer,
        SpectralUnit::Angstrom,
        SpectralUnit::Micrometer,
        SpectralUnit::Wavenumber,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            SpectralUnit::Nanometer => "nm",
            SpectralUnit::Angstrom => "Å",
            SpectralUnit::Micrometer => "µm",
            SpectralUnit::Wavenumber => "cm⁻¹",
        }
    }

    pub fn dimension(self) -> AxisDimension {
        match self {
            SpectralUnit::Wavenumber => AxisDimension::Wavenumber,
            _ => AxisDimension::Wavelength,
        }
    }
}

impl fmt::Display for SpectralUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl From<SpectralUnit> for String {
    fn from(unit: SpectralUnit) -> Self {
        unit.symbol().to_string()
    }
}

impl TryFrom<String> for SpectralUnit {
    type Error = SpectraError;

    fn try_from(raw: String) -> Result<Self> {
        raw.parse()
    }
}

impl FromStr for SpectralUnit {
    type Err = SpectraError;

    fn from_str(raw: &str) -> Result<Self> {
        normalize_unit(raw)
            .ok_or_else(|| SpectraError::Unit(format!("unrecognized spectral unit '{}'", raw)))
    }
}

/// Map a loosely spelled unit label onto a canonical unit.
///
/// Matching is case-insensitive and ignores surrounding whitespace. Returns `None`
/// for anything that is not a known wavelength or wavenumber spelling.
pub fn normalize_unit(raw: &str) -> Option<SpectralUnit> {
    let key = raw.trim().to_lowercase();
    let unit = match key.as_str() {
        "nm" | "nanometer" | "nanometers" | "nanometre" | "nanometres" => SpectralUnit::Nanometer,
        "å" | "a" | "aa" | "angstrom" | "angstroms" | "ångström" | "ångströms" | "angstroem" => {
            SpectralUnit::Angstrom
        }
        "µm" | "μm" | "um" | "micron" | "microns" | "micrometer" | "micrometers"
        | "micrometre" | "micrometres" => SpectralUnit::Micrometer,
        "cm-1" | "cm^-1" | "cm⁻¹" | "1/cm" | "cm**-1" | "wavenumber" | "wavenumbers"
        | "kayser" => SpectralUnit::Wavenumber,
        _ => return None,
    };
    Some(unit)
}

/// Unit an axis should be shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DisplayUnit {
    /// Show the canonical axis exactly as imported.
    AsImported,
    Unit(SpectralUnit),
}

impl fmt::Display for DisplayUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayUnit::AsImported => write!(f, "as-imported"),
            DisplayUnit::Unit(u) => write!(f, "{}", u),
        }
    }
}

impl From<DisplayUnit> for String {
    fn from(unit: DisplayUnit) -> Self {
        unit.to_string()
    }
}

impl From<SpectralUnit> for DisplayUnit {
    fn from(unit: SpectralUnit) -> Self {
        DisplayUnit::Unit(unit)
    }
}

impl TryFrom<String> for DisplayUnit {
    type Error = SpectraError;

    fn try_from(raw: String) -> Result<Self> {
        raw.parse()
    }
}

impl FromStr for DisplayUnit {
    type Err = SpectraError;

    fn from_str(raw: &str) -> Result<Self> {
        if raw.trim().eq_ignore_ascii_case("as-imported") {
            return Ok(DisplayUnit::AsImported);
        }
        raw.parse().map(DisplayUnit::Unit)
    }
}

/// Convert one value in `unit` to nanometres.
pub fn map_to_nm(value: f64, unit: SpectralUnit) -> f64 {
    match unit {
        SpectralUnit::Nanometer => value,
        SpectralUnit::Angstrom => value / 10.0,
        SpectralUnit::Micrometer => value * 1000.0,
        SpectralUnit::Wavenumber => NM_PER_INVERSE_CM / value,
    }
}

/// Convert one value in nanometres to `unit`.
pub fn map_from_nm(nm: f64, unit: SpectralUnit) -> f64 {
    match unit {
        SpectralUnit::Nanometer => nm,
        SpectralUnit::Angstrom => nm * 10.0,
        SpectralUnit::Micrometer => nm / 1000.0,
        SpectralUnit::Wavenumber => NM_PER_INVERSE_CM / nm,
    }
}

/// Convert a single value between two units via nanometres.
pub fn convert_value(value: f64, from: SpectralUnit, to: SpectralUnit) -> f64 {
    if from == to {
        return value;
    }
    map_from_nm(map_to_nm(value, from), to)
}

/// Convert a canonical X axis into a display unit.
///
/// `AsImported` and same-unit requests borrow `x` untouched.
pub fn convert_x_from_canonical<'a>(
    x: &'a [f64],
    canonical: Option<SpectralUnit>,
    display: DisplayUnit,
) -> Result<Cow<'a, [f64]>> {
    let target = match display {
        DisplayUnit::AsImported => return Ok(Cow::Borrowed(x)),
        DisplayUnit::Unit(u) => u,
    };
    let canonical = canonical.ok_or_else(|| {
        SpectraError::Unit(format!(
            "cannot display axis in {}: canonical unit is unknown",
            target
        ))
    })?;
    if canonical == target {
        return Ok(Cow::Borrowed(x));
    }
    Ok(Cow::Owned(
        x.iter().map(|&v| convert_value(v, canonical, target)).collect(),
    ))
}

/// Inverse of [`convert_x_from_canonical`]: map display values back to canonical.
pub fn convert_x_to_canonical<'a>(
    x: &'a [f64],
    canonical: Option<SpectralUnit>,
    display: DisplayUnit,
) -> Result<Cow<'a, [f64]>> {
    let source = match display {
        DisplayUnit::AsImported => return Ok(Cow::Borrowed(x)),
        DisplayUnit::Unit(u) => u,
    };
    let canonical = canonical.ok_or_else(|| {
        SpectraError::Unit(format!(
            "cannot map {} values back: canonical unit is unknown",
            source
        ))
    })?;
    if canonical == source {
        return Ok(Cow::Borrowed(x));
    }
    Ok(Cow::Owned(
        x.iter().map(|&v| convert_value(v, source, canonical)).collect(),
    ))
}

pub fn convert_scalar_from_canonical(
    value: f64,
    canonical: Option<SpectralUnit>,
    display: DisplayUnit,
) -> Result<f64> {
    let out = convert_x_from_canonical(std::slice::from_ref(&value), canonical, display)?;
    Ok(out[0])
}

pub fn convert_scalar_to_canonical(
    value: f64,
    canonical: Option<SpectralUnit>,
    display: DisplayUnit,
) -> Result<f64> {
    let out = convert_x_to_canonical(std::slice::from_ref(&value), canonical, display)?;
    Ok(out[0])
}

/// Fail with `Unit` when two known units measure different quantities.
///
/// Unknown units are accepted: the caller has vouched for them.
pub fn ensure_same_dimension(
    a: Option<SpectralUnit>,
    b: Option<SpectralUnit>,
    what: &str,
) -> Result<()> {
    if let (Some(a), Some(b)) = (a, b) {
        if a.dimension() != b.dimension() {
            return Err(SpectraError::Unit(format!(
                "{}: cannot mix {} ({:?}) with {} ({:?}); convert to one dimension first",
                what,
                a,
                a.dimension(),
                b,
                b.dimension()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel_close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * a.abs().max(b.abs()).max(f64::MIN_POSITIVE)
    }

    #[test]
    fn test_normalize_unit_spellings() {
        assert_eq!(normalize_unit(" NM "), Some(SpectralUnit::Nanometer));
        assert_eq!(normalize_unit("Angstroms"), Some(SpectralUnit::Angstrom));
        assert_eq!(normalize_unit("Å"), Some(SpectralUnit::Angstrom));
        assert_eq!(normalize_unit("um"), Some(SpectralUnit::Micrometer));
        assert_eq!(normalize_unit("μm"), Some(SpectralUnit::Micrometer));
        assert_eq!(normalize_unit("Microns"), Some(SpectralUnit::Micrometer));
        assert_eq!(normalize_unit("cm^-1"), Some(SpectralUnit::Wavenumber));
        assert_eq!(normalize_unit("1/cm"), Some(SpectralUnit::Wavenumber));
        assert_eq!(normalize_unit("Wavenumbers"), Some(SpectralUnit::Wavenumber));
        assert_eq!(normalize_unit("flux"), None);
        assert_eq!(normalize_unit(""), None);
    }

    #[test]
    fn test_same_unit_is_identity() {
        let x = vec![500.0, 1000.0, 2000.0];
        let out = convert_x_from_canonical(&x, Some(SpectralUnit::Nanometer), SpectralUnit::Nanometer.into())
            .unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.as_ptr(), x.as_ptr());
        assert_eq!(&*out, &[500.0, 1000.0, 2000.0]);
    }

    #[test]
    fn test_as_imported_ignores_unknown_unit() {
        let x = vec![1.0, 2.0];
        let out = convert_x_from_canonical(&x, None, DisplayUnit::AsImported).unwrap();
        assert_eq!(out.as_ptr(), x.as_ptr());
    }

    #[test]
    fn test_unknown_canonical_fails() {
        let err = convert_x_from_canonical(&[1.0], None, SpectralUnit::Angstrom.into()).unwrap_err();
        assert!(matches!(err, SpectraError::Unit(_)));
    }

    #[test]
    fn test_known_conversions() {
        let nm = [500.0, 1000.0];
        let a = convert_x_from_canonical(&nm, Some(SpectralUnit::Nanometer), SpectralUnit::Angstrom.into())
            .unwrap();
        assert_eq!(&*a, &[5000.0, 10000.0]);
        let um = convert_x_from_canonical(&nm, Some(SpectralUnit::Nanometer), SpectralUnit::Micrometer.into())
            .unwrap();
        assert!((um[0] - 0.5).abs() < 1e-15);
        let wn = convert_x_from_canonical(&nm, Some(SpectralUnit::Nanometer), SpectralUnit::Wavenumber.into())
            .unwrap();
        assert!((wn[0] - 20000.0).abs() < 1e-9);
        assert!((wn[1] - 10000.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_all_pairs() {
        let x = [0.37, 12.5, 480.0, 1234.5678, 98765.0];
        for canonical in SpectralUnit::ALL {
            for display in SpectralUnit::ALL {
                let shown = convert_x_from_canonical(&x, Some(canonical), display.into()).unwrap();
                let back = convert_x_to_canonical(&shown, Some(canonical), display.into()).unwrap();
                for (orig, rt) in x.iter().zip(back.iter()) {
                    assert!(
                        rel_close(*orig, *rt, 1e-8),
                        "{} -> {} round trip drifted: {} vs {}",
                        canonical,
                        display,
                        orig,
                        rt
                    );
                }
            }
        }
    }

    #[test]
    fn test_scalar_delegates() {
        let v = convert_scalar_from_canonical(2.0, Some(SpectralUnit::Micrometer), SpectralUnit::Nanometer.into())
            .unwrap();
        assert_eq!(v, 2000.0);
        let back = convert_scalar_to_canonical(v, Some(SpectralUnit::Micrometer), SpectralUnit::Nanometer.into())
            .unwrap();
        assert_eq!(back, 2.0);
    }

    #[test]
    fn test_dimension_check() {
        assert!(ensure_same_dimension(Some(SpectralUnit::Nanometer), Some(SpectralUnit::Angstrom), "m").is_ok());
        assert!(ensure_same_dimension(None, Some(SpectralUnit::Wavenumber), "m").is_ok());
        let err = ensure_same_dimension(Some(SpectralUnit::Nanometer), Some(SpectralUnit::Wavenumber), "m")
            .unwrap_err();
        assert!(matches!(err, SpectraError::Unit(_)));
    }

    #[test]
    fn test_serde_symbols() {
        let json = serde_json::to_string(&SpectralUnit::Wavenumber).unwrap();
        assert_eq!(json, "\"cm⁻¹\"");
        let parsed: SpectralUnit = serde_json::from_str("\"Angstrom\"").unwrap();
        assert_eq!(parsed, SpectralUnit::Angstrom);
        let display: DisplayUnit = serde_json::from_str("\"as-imported\"").unwrap();
        assert_eq!(display, DisplayUnit::AsImported);
        assert!(serde_json::from_str::<SpectralUnit>("\"parsec\"").is_err());
    }
}
