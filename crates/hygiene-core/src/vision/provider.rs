//! Vision provider contract and provider-agnostic result types.
//!
//! Adapters translate their backend's native payloads into [`VisionLabel`]s
//! before anything else sees them; the evaluator never handles a
//! provider-specific format.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ConfidenceScore, DomainError, DomainResult};

use super::error::VisionResult;

/// Default number of labels requested from a backend.
pub const DEFAULT_MAX_LABELS: usize = 50;

/// Default minimum label confidence requested from a backend.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 70.0;

/// A named detection returned by a vision backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionLabel {
    pub name: String,
    pub confidence: ConfidenceScore,
    /// Free-form grouping, e.g. `general`, `indoor`, `cleanliness`.
    pub category: String,
}

impl VisionLabel {
    pub fn new(name: impl Into<String>, confidence: ConfidenceScore) -> Self {
        Self {
            name: name.into(),
            confidence,
            category: "general".to_string(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// Everything a provider returns for one image.
///
/// An empty `labels` list is a valid result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionAnalysisResult {
    pub labels: Vec<VisionLabel>,
    pub provider_name: String,
    pub model_version: String,
    pub processing_time_ms: u64,
}

impl VisionAnalysisResult {
    pub fn new(
        labels: Vec<VisionLabel>,
        provider_name: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            labels,
            provider_name: provider_name.into(),
            model_version: model_version.into(),
            processing_time_ms: 0,
        }
    }

    pub fn with_processing_time_ms(mut self, ms: u64) -> Self {
        self.processing_time_ms = ms;
        self
    }

    /// The most confident label, if any were detected.
    pub fn highest_confidence_label(&self) -> Option<&VisionLabel> {
        self.labels.iter().max_by(|a, b| {
            a.confidence
                .value()
                .total_cmp(&b.confidence.value())
        })
    }
}

/// Per-call analysis parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub max_labels: usize,
    /// Minimum label confidence on the 0–100 scale.
    pub min_confidence: f64,
}

impl Default for AnalysisRequest {
    fn default() -> Self {
        Self {
            max_labels: DEFAULT_MAX_LABELS,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl AnalysisRequest {
    pub fn new(max_labels: usize, min_confidence: f64) -> Self {
        Self {
            max_labels,
            min_confidence,
        }
    }

    /// Reject requests no backend could honour.
    pub fn validate(&self) -> DomainResult<()> {
        if self.max_labels == 0 {
            return Err(DomainError::InvalidRequest(
                "max_labels must be at least 1".into(),
            ));
        }
        ConfidenceScore::new(self.min_confidence).map_err(|_| {
            DomainError::InvalidRequest(format!(
                "min_confidence must be between 0 and 100, got {}",
                self.min_confidence
            ))
        })?;
        Ok(())
    }
}

/// Handle to an image that a backend may fetch itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageLocator {
    /// Object-store bucket and key, written `s3://bucket/key`.
    Object { bucket: String, key: String },
    /// Plain HTTP(S) URL.
    Url { url: String },
}

impl StorageLocator {
    pub fn object(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Object {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }
}

impl FromStr for StorageLocator {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        if let Some(rest) = s.strip_prefix("s3://") {
            return match rest.split_once('/') {
                Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                    Ok(Self::object(bucket, key))
                }
                _ => Err(DomainError::InvalidRequest(format!(
                    "object locator must look like s3://bucket/key, got '{s}'"
                ))),
            };
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(Self::url(s));
        }
        Err(DomainError::InvalidRequest(format!(
            "unsupported storage locator '{s}'"
        )))
    }
}

impl std::fmt::Display for StorageLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Self::Url { url } => f.write_str(url),
        }
    }
}

/// Capability contract for a vision backend.
///
/// Implementations must be thread-safe so one instance (or one provider
/// chain) can serve concurrent requests.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Analyze raw image bytes.
    async fn analyze(
        &self,
        image: &[u8],
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult>;

    /// Analyze an image by storage reference.
    ///
    /// Backends that cannot fetch remotely may download the bytes themselves
    /// and delegate to [`analyze`](Self::analyze).
    async fn analyze_by_reference(
        &self,
        locator: &StorageLocator,
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult>;

    /// Name recorded in the audit trail.
    fn provider_name(&self) -> String;

    /// Model version recorded in the audit trail.
    fn model_version(&self) -> String;
}
