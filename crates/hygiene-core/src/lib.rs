//! Hygiene Core Library
//!
//! Vision-decision core for facility hygiene audits: provider-agnostic
//! vision results, an ordered fallback chain over vision backends, and a
//! rule-driven evaluator producing auditable cleanliness decisions.

pub mod domain;
pub mod evaluation;
pub mod obs;
pub mod service;
pub mod telemetry;
pub mod vision;

pub use domain::{
    AuditResult, CleanlinessStatus, ConfidenceScore, DetectedLabel, DomainError, DomainResult,
    ImageMetadata,
};

pub use evaluation::{CleanlinessEvaluator, CleanlinessRules};

pub use service::{AnalyzeCommand, AuditError, AuditService, ImageSource, ServiceResult};

pub use vision::{
    AnalysisRequest, DetectLabelsProvider, FallbackVisionProvider, GeminiConfig, GeminiProvider,
    HttpImageFetcher, ImageFetcher, ProviderFailure, StorageLocator, VisionAnalysisResult,
    VisionError, VisionLabel, VisionProvider, VisionResult,
};

/// Crate version, recorded by binaries at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
