//! Confidence scores.
//!
//! Every level of the cascade reports how sure it is about a prediction. The
//! values are hand-calibrated per level rather than learned, so a confidence is
//! only comparable with the acceptance threshold of the level that produced it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A confidence value in `[0.0, 1.0]`.
///
/// # Examples
///
/// ```
/// use namecascade::Confidence;
///
/// let conf = Confidence::new(0.95).unwrap();
/// assert_eq!(conf.value(), 0.95);
/// assert!(Confidence::new(1.2).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Confidence(f32);

impl Confidence {
    /// Minimum valid confidence value.
    pub const MIN_VALUE: f32 = 0.0;

    /// Maximum valid confidence value.
    pub const MAX_VALUE: f32 = 1.0;

    /// Complete certainty. Used for exact user corrections.
    pub const ONE: Self = Self(1.0);

    /// Creates a new confidence with validation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ConfidenceOutOfRange` if the value is NaN or not
    /// in [0.0, 1.0].
    pub fn new(value: f32) -> Result<Self, ValidationError> {
        Self::validate_value(value)?;
        Ok(Self(value))
    }

    /// Wraps a calibration constant that is known to be in range.
    pub(crate) const fn calibrated(value: f32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> f32 {
        self.0
    }

    /// Returns true if this confidence clears `threshold`.
    #[must_use]
    pub fn meets(self, threshold: f32) -> bool {
        self.0 >= threshold
    }

    /// Validates that a confidence value is in the valid range.
    pub(crate) fn validate_value(value: f32) -> Result<(), ValidationError> {
        if value.is_nan() || !(Self::MIN_VALUE..=Self::MAX_VALUE).contains(&value) {
            return Err(ValidationError::ConfidenceOutOfRange { value });
        }
        Ok(())
    }
}

impl TryFrom<f32> for Confidence {
    type Error = ValidationError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f32 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}
