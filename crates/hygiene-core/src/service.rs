//! Audit orchestration: one inbound command in, one [`AuditResult`] out.
//!
//! The service owns a long-lived provider (usually a fallback chain) and a
//! default rule set, both built once at startup and shared read-only by
//! every request. It validates the command, calls the provider once, and
//! hands the answer to the evaluator. Persistence and transport belong to
//! the caller.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::image::MAX_IMAGE_BYTES;
use crate::domain::{AuditResult, DomainError, ImageMetadata};
use crate::evaluation::{CleanlinessEvaluator, CleanlinessRules};
use crate::obs;
use crate::vision::{AnalysisRequest, StorageLocator, VisionAnalysisResult, VisionError, VisionProvider};

/// Errors surfaced by [`AuditService`].
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl AuditError {
    /// True when the target audit was already finalized by a reviewer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Domain(DomainError::AlreadyFinalized { .. }))
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = std::result::Result<T, AuditError>;

/// Where the image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    Reference(StorageLocator),
}

/// Inbound analysis command.
#[derive(Debug, Clone)]
pub struct AnalyzeCommand {
    pub image_metadata: ImageMetadata,
    pub source: ImageSource,
    pub request: AnalysisRequest,
    pub manual_override: Option<bool>,
    /// Replaces the service's default rules for this command only.
    pub rules: Option<CleanlinessRules>,
}

impl AnalyzeCommand {
    pub fn from_bytes(image_metadata: ImageMetadata, image: Vec<u8>) -> Self {
        Self::new(image_metadata, ImageSource::Bytes(image))
    }

    pub fn from_reference(image_metadata: ImageMetadata, locator: StorageLocator) -> Self {
        Self::new(image_metadata, ImageSource::Reference(locator))
    }

    fn new(image_metadata: ImageMetadata, source: ImageSource) -> Self {
        Self {
            image_metadata,
            source,
            request: AnalysisRequest::default(),
            manual_override: None,
            rules: None,
        }
    }

    pub fn with_request(mut self, request: AnalysisRequest) -> Self {
        self.request = request;
        self
    }

    pub fn with_manual_override(mut self, is_clean: bool) -> Self {
        self.manual_override = Some(is_clean);
        self
    }

    pub fn with_rules(mut self, rules: CleanlinessRules) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Reject anything no provider should ever see.
    pub fn validate(&self) -> ServiceResult<()> {
        self.request.validate()?;
        self.image_metadata.validate_for_analysis()?;
        if let ImageSource::Bytes(bytes) = &self.source {
            if bytes.is_empty() {
                return Err(DomainError::InvalidImage("image is empty".into()).into());
            }
            if bytes.len() as u64 > MAX_IMAGE_BYTES {
                return Err(DomainError::InvalidImage(format!(
                    "image is {} bytes, limit is {MAX_IMAGE_BYTES}",
                    bytes.len()
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Application service wiring a provider to the evaluator.
#[derive(Clone)]
pub struct AuditService {
    provider: Arc<dyn VisionProvider>,
    evaluator: CleanlinessEvaluator,
}

impl AuditService {
    pub fn new(provider: Arc<dyn VisionProvider>, default_rules: CleanlinessRules) -> Self {
        tracing::info!(
            provider = %provider.provider_name(),
            model_version = %provider.model_version(),
            "initialized audit service"
        );
        Self {
            provider,
            evaluator: CleanlinessEvaluator::new(default_rules),
        }
    }

    pub fn provider(&self) -> &Arc<dyn VisionProvider> {
        &self.provider
    }

    pub fn default_rules(&self) -> &CleanlinessRules {
        self.evaluator.rules()
    }

    /// Validate, analyze and evaluate one image.
    pub async fn execute(&self, command: AnalyzeCommand) -> ServiceResult<AuditResult> {
        let correlation_id = Uuid::new_v4().to_string();
        let span = obs::audit_span(&correlation_id, &command.image_metadata.dealer_id);
        self.run(command).instrument(span).await
    }

    /// Re-run analysis for an existing audit, refusing finalized ones.
    ///
    /// The result is a new audit; the existing one is left untouched.
    pub async fn reanalyze(
        &self,
        existing: &AuditResult,
        command: AnalyzeCommand,
    ) -> ServiceResult<AuditResult> {
        existing.ensure_not_finalized()?;
        self.execute(command).await
    }

    /// Run many commands with at most `concurrency` in flight.
    ///
    /// Results are returned in command order; one failure does not affect
    /// the others.
    pub async fn execute_batch(
        &self,
        commands: Vec<AnalyzeCommand>,
        concurrency: usize,
    ) -> Vec<ServiceResult<AuditResult>> {
        stream::iter(commands)
            .map(|command| self.execute(command))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Record a reviewer decision and finalize the audit.
    pub fn apply_override(
        &self,
        audit: &mut AuditResult,
        reviewer_id: &str,
        is_clean: bool,
        notes: &str,
    ) -> ServiceResult<()> {
        let _span = obs::AuditSpan::enter(
            &audit.audit_id().to_string(),
            &audit.image_metadata().dealer_id,
        );
        audit.apply_manual_override(reviewer_id, is_clean, notes)?;
        obs::emit_override_applied(&audit.audit_id().to_string(), reviewer_id, audit.status());
        Ok(())
    }

    async fn run(&self, command: AnalyzeCommand) -> ServiceResult<AuditResult> {
        if let Err(err) = command.validate() {
            tracing::warn!(error = %err, "rejected analysis command");
            return Err(err);
        }

        tracing::info!(
            checkpoint_id = %command.image_metadata.checkpoint_id,
            uploader_id = %command.image_metadata.uploader_id,
            provider = %self.provider.provider_name(),
            "starting cleanliness analysis"
        );

        let vision = self.analyze(&command.source, &command.request).await?;
        tracing::info!(
            labels = vision.labels.len(),
            answered_by = %vision.provider_name,
            processing_time_ms = vision.processing_time_ms,
            "vision analysis complete"
        );

        let result = match command.rules {
            Some(rules) => CleanlinessEvaluator::new(rules).evaluate(
                &vision,
                command.image_metadata,
                command.manual_override,
            ),
            None => self
                .evaluator
                .evaluate(&vision, command.image_metadata, command.manual_override),
        };
        Ok(result)
    }

    async fn analyze(
        &self,
        source: &ImageSource,
        request: &AnalysisRequest,
    ) -> ServiceResult<VisionAnalysisResult> {
        let outcome = match source {
            ImageSource::Bytes(bytes) => self.provider.analyze(bytes, request).await,
            ImageSource::Reference(locator) => {
                self.provider.analyze_by_reference(locator, request).await
            }
        };
        outcome.map_err(|err| {
            tracing::error!(error = %err, "vision analysis failed");
            AuditError::from(err)
        })
    }
}
