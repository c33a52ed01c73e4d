//! Domain model: confidence scores, verdicts, image metadata and the audit entity.

pub mod audit;
pub mod confidence;
pub mod error;
pub mod image;
pub mod status;

pub use audit::{AuditAnalysis, AuditResult, DetectedLabel};
pub use confidence::ConfidenceScore;
pub use error::{DomainError, DomainResult};
pub use image::ImageMetadata;
pub use status::CleanlinessStatus;
