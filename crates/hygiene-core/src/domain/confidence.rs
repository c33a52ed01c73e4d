//! Validated confidence scores on the 0–100 scale.

use serde::{Deserialize, Serialize};

use super::error::{DomainError, DomainResult};

/// Confidence score in the closed range `[0.0, 100.0]`.
///
/// The inner value is private so a score outside the range can never be
/// observed; construction fails fast with
/// [`DomainError::InvalidConfidenceScore`]. NaN is rejected as well.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ConfidenceScore(f64);

impl ConfidenceScore {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 100.0;

    /// Build a score from a 0–100 value.
    pub fn new(value: f64) -> DomainResult<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(DomainError::InvalidConfidenceScore { value })
        }
    }

    /// Build a score from a 0.0–1.0 value (model probabilities).
    pub fn from_normalized(value: f64) -> DomainResult<Self> {
        Self::new(value * 100.0).map_err(|_| DomainError::InvalidConfidenceScore { value })
    }

    /// The zero score, used when nothing was detected.
    pub const fn zero() -> Self {
        Self(0.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Inclusive comparison: a score equal to the threshold passes.
    pub fn is_above_threshold(self, threshold: f64) -> bool {
        self.0 >= threshold
    }

    /// Two-decimal percentage, e.g. `"57.50%"`.
    pub fn as_percentage(self) -> String {
        format!("{:.2}%", self.0)
    }
}

impl TryFrom<f64> for ConfidenceScore {
    type Error = DomainError;

    fn try_from(value: f64) -> DomainResult<Self> {
        Self::new(value)
    }
}

impl From<ConfidenceScore> for f64 {
    fn from(score: ConfidenceScore) -> f64 {
        score.0
    }
}

impl std::fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_percentage())
    }
}
