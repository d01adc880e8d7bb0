//! Clearance units and conversion
//!
//! All conversions go through mil as the base unit. The factors are kept as
//! exact integer ratios (1 inch = 1000 mil, 1 mm = 5000/127 mil which is
//! 1000/25.4) so that converting back and forth does not drift.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Mil per inch.
pub const MIL_PER_INCH: f64 = 1000.0;

/// Millimeters per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// Values closer than this (in mil) are treated as equal clearances.
pub const CLEARANCE_EPSILON_MIL: f64 = 1e-9;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),
}

/// Linear unit a clearance value is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearanceUnit {
    #[default]
    Mil,
    Mm,
    Inch,
}

impl ClearanceUnit {
    pub const ALL: [ClearanceUnit; 3] = [ClearanceUnit::Mil, ClearanceUnit::Mm, ClearanceUnit::Inch];

    /// Label used in rule files and spreadsheet headers.
    pub fn label(&self) -> &'static str {
        match self {
            ClearanceUnit::Mil => "mil",
            ClearanceUnit::Mm => "mm",
            ClearanceUnit::Inch => "inch",
        }
    }

    /// Parse a unit label, case-insensitive. Accepts the common plural and
    /// long forms as well as `in` and `thou`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "mil" | "mils" | "thou" => Some(ClearanceUnit::Mil),
            "mm" | "millimeter" | "millimeters" | "millimetre" | "millimetres" => {
                Some(ClearanceUnit::Mm)
            }
            "in" | "inch" | "inches" => Some(ClearanceUnit::Inch),
            _ => None,
        }
    }

    /// Exact ratio (numerator, denominator) of mil per one unit.
    fn mil_ratio(&self) -> (f64, f64) {
        match self {
            ClearanceUnit::Mil => (1.0, 1.0),
            ClearanceUnit::Inch => (1000.0, 1.0),
            ClearanceUnit::Mm => (5000.0, 127.0),
        }
    }

    pub fn to_mil(&self, value: f64) -> f64 {
        convert(value, *self, ClearanceUnit::Mil)
    }
}

impl fmt::Display for ClearanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ClearanceUnit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClearanceUnit::from_label(s).ok_or_else(|| UnitError::UnknownUnit(s.trim().to_string()))
    }
}

/// Convert `value` between units.
///
/// Total for every unit pair. Same-unit conversion returns the input
/// unchanged; otherwise the value is scaled once by the combined ratio so
/// only a single rounding step happens.
pub fn convert(value: f64, from: ClearanceUnit, to: ClearanceUnit) -> f64 {
    if from == to {
        return value;
    }
    let (from_num, from_den) = from.mil_ratio();
    let (to_num, to_den) = to.mil_ratio();
    value * (from_num * to_den) / (from_den * to_num)
}

/// Where a detected unit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// A unit token was found in the header text.
    Header,
    /// Guessed from the magnitude of the values.
    Magnitude,
    /// Nothing to go on; the default unit was returned.
    Default,
    /// Supplied by the caller.
    Caller,
}

/// Result of unit detection. This is a suggestion for the caller to
/// confirm, not a committed interpretation of the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitDetection {
    pub unit: ClearanceUnit,
    pub source: DetectionSource,
}

impl UnitDetection {
    pub fn caller(unit: ClearanceUnit) -> Self {
        Self {
            unit,
            source: DetectionSource::Caller,
        }
    }

    pub fn is_guess(&self) -> bool {
        matches!(self.source, DetectionSource::Magnitude | DetectionSource::Default)
    }
}

/// Find a unit token in free header text such as `"Clearance (mil)"`.
///
/// `mm`, `mil` and `inch` style tokens take precedence over a bare `in`,
/// which is also an ordinary English word ("Clearance in mm").
pub fn unit_from_header(header: &str) -> Option<ClearanceUnit> {
    let tokens: Vec<String> = header
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect();

    let explicit = tokens
        .iter()
        .filter(|t| t.as_str() != "in")
        .find_map(|t| ClearanceUnit::from_label(t));
    if explicit.is_some() {
        return explicit;
    }
    if tokens.iter().any(|t| t == "in") {
        return Some(ClearanceUnit::Inch);
    }
    None
}

/// Guess the unit of a set of clearance values.
///
/// A unit token in `header_hint` wins. Otherwise the mean of the finite
/// positive values decides: below 1 reads as inch, below 50 as mm, anything
/// larger as mil. With no usable values the result is mil with
/// [`DetectionSource::Default`].
pub fn detect_unit(values: &[f64], header_hint: Option<&str>) -> UnitDetection {
    if let Some(unit) = header_hint.and_then(unit_from_header) {
        return UnitDetection {
            unit,
            source: DetectionSource::Header,
        };
    }

    let usable: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    if usable.is_empty() {
        return UnitDetection {
            unit: ClearanceUnit::default(),
            source: DetectionSource::Default,
        };
    }

    let mean = usable.iter().sum::<f64>() / usable.len() as f64;
    let unit = if mean < 1.0 {
        ClearanceUnit::Inch
    } else if mean < 50.0 {
        ClearanceUnit::Mm
    } else {
        ClearanceUnit::Mil
    };
    tracing::debug!("Detected unit {} from mean value {:.4}", unit, mean);

    UnitDetection {
        unit,
        source: DetectionSource::Magnitude,
    }
}
