//! Aggregation functions used to consolidate samples into coarser archives.

use crate::error::{Result, WhisperError};
use std::fmt;
use std::str::FromStr;

/// How a window of known high-resolution values is folded into a single
/// coarser-resolution value during propagation.
///
/// The discriminant is the on-disk type code stored in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum AggregationMethod {
    /// Arithmetic mean of the known values (the default).
    #[default]
    Average = 1,
    /// Sum of the known values.
    Sum = 2,
    /// The most recent known value.
    Last = 3,
    /// Largest known value.
    Max = 4,
    /// Smallest known value.
    Min = 5,
}

impl AggregationMethod {
    /// Creates an AggregationMethod from its on-disk type code.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::InvalidAggregationMethod` for unknown codes.
    pub fn from_type(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::Average),
            2 => Ok(Self::Sum),
            3 => Ok(Self::Last),
            4 => Ok(Self::Max),
            5 => Ok(Self::Min),
            other => Err(WhisperError::InvalidAggregationMethod(other.to_string())),
        }
    }

    /// Returns the on-disk type code.
    pub fn as_type(self) -> u32 {
        self as u32
    }

    /// Folds a window of known values into one aggregate value.
    ///
    /// Returns `None` when `values` is empty, which callers treat the same
    /// as an interval with too little known data.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(match self {
            Self::Average => values.iter().sum::<f64>() / values.len() as f64,
            Self::Sum => values.iter().sum(),
            Self::Last => values[values.len() - 1],
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        })
    }
}

impl FromStr for AggregationMethod {
    type Err = WhisperError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "average" => Ok(Self::Average),
            "sum" => Ok(Self::Sum),
            "last" => Ok(Self::Last),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            other => Err(WhisperError::InvalidAggregationMethod(other.to_string())),
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Average => "average",
            Self::Sum => "sum",
            Self::Last => "last",
            Self::Max => "max",
            Self::Min => "min",
        };
        f.write_str(name)
    }
}

/// Applies `method` to a window of known values.
///
/// Returns `None` when `known_values` is empty.
pub fn aggregate(method: AggregationMethod, known_values: &[f64]) -> Option<f64> {
    method.apply(known_values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_values() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(aggregate(AggregationMethod::Sum, &values), Some(10.0));
        assert_eq!(aggregate(AggregationMethod::Average, &values), Some(2.5));
        assert_eq!(aggregate(AggregationMethod::Max, &values), Some(4.0));
        assert_eq!(aggregate(AggregationMethod::Min, &values), Some(1.0));
        assert_eq!(aggregate(AggregationMethod::Last, &values), Some(4.0));
    }

    #[test]
    fn test_aggregate_empty_window() {
        for method in [
            AggregationMethod::Average,
            AggregationMethod::Sum,
            AggregationMethod::Last,
            AggregationMethod::Max,
            AggregationMethod::Min,
        ] {
            assert_eq!(method.apply(&[]), None);
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "average".parse::<AggregationMethod>().unwrap(),
            AggregationMethod::Average
        );
        assert_eq!(
            "min".parse::<AggregationMethod>().unwrap(),
            AggregationMethod::Min
        );
        assert!(matches!(
            "median".parse::<AggregationMethod>(),
            Err(WhisperError::InvalidAggregationMethod(name)) if name == "median"
        ));
    }

    #[test]
    fn test_type_codes_round_trip() {
        for code in 1..=5u32 {
            let method = AggregationMethod::from_type(code).unwrap();
            assert_eq!(method.as_type(), code);
        }
        assert!(AggregationMethod::from_type(0).is_err());
        assert!(AggregationMethod::from_type(6).is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for method in [
            AggregationMethod::Average,
            AggregationMethod::Sum,
            AggregationMethod::Last,
            AggregationMethod::Max,
            AggregationMethod::Min,
        ] {
            assert_eq!(method.to_string().parse::<AggregationMethod>().unwrap(), method);
        }
    }
}
