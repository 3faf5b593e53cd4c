//! Summarization length parameters
//!
//! Invalid combinations are always reported, never silently corrected. Only a
//! combination that passed validation is clamped into the server-accepted ranges.

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifiedError;

/// Lowest accepted `min_length`
pub const MIN_LENGTH_FLOOR: i64 = 0;
/// Highest accepted `min_length`
pub const MIN_LENGTH_CEIL: i64 = 1024;
/// Lowest accepted `max_length`
pub const MAX_LENGTH_FLOOR: i64 = 16;
/// Highest accepted `max_length`
pub const MAX_LENGTH_CEIL: i64 = 2048;

/// Validated, server-acceptable length bounds (in tokens)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryParams {
    pub min_length: u32,
    pub max_length: u32,
}

impl SummaryParams {
    /// Validate and clamp a `(min_length, max_length)` pair
    pub fn new(min_length: i64, max_length: i64) -> Result<Self, ClassifiedError> {
        validate(min_length, max_length)
    }

    /// Strict check that the pair is inside the server-accepted ranges.
    /// Nothing is clamped here.
    pub fn ensure_in_range(&self) -> Result<(), ClassifiedError> {
        let (min, max) = (i64::from(self.min_length), i64::from(self.max_length));
        if min > max {
            return Err(ClassifiedError::validation(format!(
                "Minimum length ({}) cannot be greater than maximum length ({})",
                min, max
            )));
        }
        if !(MIN_LENGTH_FLOOR..=MIN_LENGTH_CEIL).contains(&min) {
            return Err(ClassifiedError::validation(format!(
                "Minimum length must be between {} and {} (got {})",
                MIN_LENGTH_FLOOR, MIN_LENGTH_CEIL, min
            )));
        }
        if !(MAX_LENGTH_FLOOR..=MAX_LENGTH_CEIL).contains(&max) {
            return Err(ClassifiedError::validation(format!(
                "Maximum length must be between {} and {} (got {})",
                MAX_LENGTH_FLOOR, MAX_LENGTH_CEIL, max
            )));
        }
        Ok(())
    }
}

impl Default for SummaryParams {
    fn default() -> Self {
        Self {
            min_length: 50,
            max_length: 500,
        }
    }
}

/// Validate a `(min_length, max_length)` pair.
///
/// Fails with a `validation` error when `min_length > max_length`,
/// `min_length < 0`, or `max_length > 2048`. On success both values are clamped
/// into `[0, 1024]` and `[16, 2048]` respectively, which keeps `min <= max`.
pub fn validate(min_length: i64, max_length: i64) -> Result<SummaryParams, ClassifiedError> {
    if min_length > max_length {
        return Err(ClassifiedError::validation(format!(
            "Minimum length ({}) cannot be greater than maximum length ({})",
            min_length, max_length
        )));
    }
    if min_length < MIN_LENGTH_FLOOR {
        return Err(ClassifiedError::validation(format!(
            "Minimum length cannot be negative (got {})",
            min_length
        )));
    }
    if max_length > MAX_LENGTH_CEIL {
        return Err(ClassifiedError::validation(format!(
            "Maximum length cannot exceed {} (got {})",
            MAX_LENGTH_CEIL, max_length
        )));
    }

    let min = min_length.clamp(MIN_LENGTH_FLOOR, MIN_LENGTH_CEIL);
    let max = max_length.clamp(MAX_LENGTH_FLOOR, MAX_LENGTH_CEIL);

    Ok(SummaryParams {
        min_length: min as u32,
        max_length: max as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ErrorKind;

    #[test]
    fn test_inverted_bounds_rejected() {
        for (min, max) in [(10, 9), (500, 50), (2048, 0), (-1, -5)] {
            let err = validate(min, max).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "({}, {})", min, max);
        }
    }

    #[test]
    fn test_out_of_range_rejected_not_corrected() {
        assert!(validate(-1, 100).is_err());
        assert!(validate(10, 2049).is_err());
        assert!(validate(0, 4096).is_err());
    }

    #[test]
    fn test_clamped_output_within_bounds() {
        for min in (0..=2048).step_by(97) {
            for max in (min..=2048).step_by(89) {
                let p = validate(min, max).unwrap();
                assert!(p.min_length <= p.max_length, "({}, {}) -> {:?}", min, max, p);
                assert!(p.max_length <= 2048);
                assert!(p.max_length >= 16);
                assert!(p.min_length <= 1024);
            }
        }
    }

    #[test]
    fn test_ensure_in_range_is_strict() {
        assert!(SummaryParams { min_length: 50, max_length: 500 }.ensure_in_range().is_ok());
        assert!(SummaryParams { min_length: 0, max_length: 8 }.ensure_in_range().is_err());
        assert!(SummaryParams { min_length: 1100, max_length: 1200 }.ensure_in_range().is_err());
        assert!(SummaryParams { min_length: 600, max_length: 500 }.ensure_in_range().is_err());
        assert!(SummaryParams { min_length: 10, max_length: 4096 }.ensure_in_range().is_err());
    }

    #[test]
    fn test_clamping() {
        assert_eq!(
            validate(50, 500).unwrap(),
            SummaryParams { min_length: 50, max_length: 500 }
        );
        assert_eq!(
            validate(0, 5).unwrap(),
            SummaryParams { min_length: 0, max_length: 16 }
        );
        assert_eq!(
            validate(1500, 2000).unwrap(),
            SummaryParams { min_length: 1024, max_length: 2000 }
        );
    }
}
