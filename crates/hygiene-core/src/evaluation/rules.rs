//! Cleanliness rule configuration.
//!
//! A rule set is immutable once built and may be shared across any number
//! of concurrent evaluations. Rule files are TOML; every field is optional
//! and falls back to the defaults below.
//!
//! ```toml
//! confidence_threshold = 85.0
//! max_negative_labels = 0
//! review_on_low_confidence = true
//! negative_vocabulary = ["Dirt", "Trash", "Spill"]
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfidenceScore, DomainError, DomainResult};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 80.0;

/// Built-in vocabulary of unclean or unsafe indicators.
pub const DEFAULT_NEGATIVE_VOCABULARY: &[&str] = &[
    // dirt and debris
    "Dirt", "Mud", "Debris", "Trash", "Garbage", "Litter", "Waste", "Rubbish", "Clutter", "Mess",
    // stains and damage
    "Stain", "Graffiti", "Rust", "Corrosion", "Mold", "Mildew", "Decay", "Deterioration",
    // pests
    "Insect", "Bug", "Rodent", "Pest", "Spider Web",
    // disorder
    "Disorder", "Disorganized", "Untidy", "Unkempt",
    // hazards
    "Spill", "Leak", "Broken Glass", "Sharp Object",
];

/// On-disk shape of a rule set. Missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RulesConfig {
    pub negative_vocabulary: Vec<String>,
    pub confidence_threshold: f64,
    pub max_negative_labels: usize,
    pub review_on_low_confidence: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            negative_vocabulary: DEFAULT_NEGATIVE_VOCABULARY
                .iter()
                .map(|s| s.to_string())
                .collect(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_negative_labels: 0,
            review_on_low_confidence: true,
        }
    }
}

/// Validated rule set used by the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RulesConfig", into = "RulesConfig")]
pub struct CleanlinessRules {
    negative_vocabulary: BTreeSet<String>,
    /// Lowercased copy of the vocabulary for matching.
    matchers: Vec<String>,
    confidence_threshold: f64,
    max_negative_labels: usize,
    review_on_low_confidence: bool,
}

impl Default for CleanlinessRules {
    fn default() -> Self {
        Self::build(RulesConfig::default().negative_vocabulary, DEFAULT_CONFIDENCE_THRESHOLD, 0, true)
    }
}

impl CleanlinessRules {
    fn build(
        vocabulary: impl IntoIterator<Item = String>,
        confidence_threshold: f64,
        max_negative_labels: usize,
        review_on_low_confidence: bool,
    ) -> Self {
        let negative_vocabulary: BTreeSet<String> = vocabulary
            .into_iter()
            .map(|t| t.trim().to_string())
            .collect();
        let matchers = negative_vocabulary.iter().map(|t| t.to_lowercase()).collect();
        Self {
            negative_vocabulary,
            matchers,
            confidence_threshold,
            max_negative_labels,
            review_on_low_confidence,
        }
    }

    /// Build a rule set, validating every field.
    pub fn new<I, S>(
        negative_vocabulary: I,
        confidence_threshold: f64,
        max_negative_labels: usize,
        review_on_low_confidence: bool,
    ) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::try_from(RulesConfig {
            negative_vocabulary: negative_vocabulary.into_iter().map(Into::into).collect(),
            confidence_threshold,
            max_negative_labels,
            review_on_low_confidence,
        })
    }

    /// Parse and validate a TOML rule set.
    pub fn from_toml_str(source: &str) -> DomainResult<Self> {
        let config: RulesConfig = toml::from_str(source)
            .map_err(|e| DomainError::InvalidRules(format!("failed to parse rules: {e}")))?;
        Self::try_from(config)
    }

    /// Read and validate a TOML rule file.
    pub fn load(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            DomainError::InvalidRules(format!("failed to read {}: {e}", path.display()))
        })?;
        let rules = Self::from_toml_str(&source)?;
        tracing::debug!(
            path = %path.display(),
            terms = rules.negative_vocabulary.len(),
            threshold = rules.confidence_threshold,
            "loaded cleanliness rules"
        );
        Ok(rules)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> DomainResult<String> {
        toml::to_string_pretty(&RulesConfig::from(self.clone()))
            .map_err(|e| DomainError::InvalidRules(format!("failed to render rules: {e}")))
    }

    pub fn with_confidence_threshold(self, threshold: f64) -> DomainResult<Self> {
        let mut config = RulesConfig::from(self);
        config.confidence_threshold = threshold;
        Self::try_from(config)
    }

    pub fn with_max_negative_labels(mut self, max: usize) -> Self {
        self.max_negative_labels = max;
        self
    }

    pub fn with_review_on_low_confidence(mut self, enabled: bool) -> Self {
        self.review_on_low_confidence = enabled;
        self
    }

    /// Add one term to the vocabulary.
    pub fn with_negative_term(self, term: impl Into<String>) -> DomainResult<Self> {
        let mut config = RulesConfig::from(self);
        config.negative_vocabulary.push(term.into());
        Self::try_from(config)
    }

    /// Case-insensitive substring match against the vocabulary.
    pub fn is_negative(&self, label_name: &str) -> bool {
        let name = label_name.to_lowercase();
        self.matchers.iter().any(|term| name.contains(term.as_str()))
    }

    pub fn negative_vocabulary(&self) -> &BTreeSet<String> {
        &self.negative_vocabulary
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn max_negative_labels(&self) -> usize {
        self.max_negative_labels
    }

    pub fn review_on_low_confidence(&self) -> bool {
        self.review_on_low_confidence
    }
}

impl TryFrom<RulesConfig> for CleanlinessRules {
    type Error = DomainError;

    fn try_from(config: RulesConfig) -> DomainResult<Self> {
        ConfidenceScore::new(config.confidence_threshold).map_err(|_| {
            DomainError::InvalidRules(format!(
                "confidence_threshold must be between 0 and 100, got {}",
                config.confidence_threshold
            ))
        })?;
        if let Some(pos) = config
            .negative_vocabulary
            .iter()
            .position(|t| t.trim().is_empty())
        {
            return Err(DomainError::InvalidRules(format!(
                "negative_vocabulary entry {pos} is empty"
            )));
        }
        Ok(Self::build(
            config.negative_vocabulary,
            config.confidence_threshold,
            config.max_negative_labels,
            config.review_on_low_confidence,
        ))
    }
}

impl From<CleanlinessRules> for RulesConfig {
    fn from(rules: CleanlinessRules) -> Self {
        Self {
            negative_vocabulary: rules.negative_vocabulary.into_iter().collect(),
            confidence_threshold: rules.confidence_threshold,
            max_negative_labels: rules.max_negative_labels,
            review_on_low_confidence: rules.review_on_low_confidence,
        }
    }
}
