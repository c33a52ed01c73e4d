//! Cleanliness verdicts.

use serde::{Deserialize, Serialize};

/// Business-level cleanliness decision.
///
/// All four states are terminal for the evaluator. The only later
/// transition is a one-shot manual override on the audit entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CleanlinessStatus {
    /// Passes the audit.
    Clean,
    /// Fails due to detected issues.
    NotClean,
    /// Analysis was uncertain; a human needs to look.
    RequiresManualReview,
    /// Confidence too low and review-on-low-confidence is disabled.
    InsufficientData,
}

impl CleanlinessStatus {
    /// Only `Clean` passes compliance.
    pub fn is_compliant(self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Statuses that must be routed to an auditor before a final decision.
    pub fn requires_human_intervention(self) -> bool {
        matches!(self, Self::RequiresManualReview | Self::InsufficientData)
    }

    /// Status implied by a human clean/not-clean decision.
    pub fn from_override(is_clean: bool) -> Self {
        if is_clean {
            Self::Clean
        } else {
            Self::NotClean
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "CLEAN",
            Self::NotClean => "NOT_CLEAN",
            Self::RequiresManualReview => "REQUIRES_MANUAL_REVIEW",
            Self::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

impl std::fmt::Display for CleanlinessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
