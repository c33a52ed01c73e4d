//! Cleanliness decision engine.
//!
//! Turns a [`VisionAnalysisResult`] into an [`AuditResult`] under a
//! [`CleanlinessRules`] set. Rules are applied in strict priority order and
//! the first one that fires decides the status:
//!
//! 1. manual override present: `CLEAN` or `NOT_CLEAN` as given
//! 2. overall confidence below threshold: `REQUIRES_MANUAL_REVIEW`, or
//!    `INSUFFICIENT_DATA` when review-on-low-confidence is off
//! 3. more negative labels than tolerated: `NOT_CLEAN`
//! 4. any negative label: `NOT_CLEAN`
//! 5. otherwise `CLEAN`
//!
//! Evaluation is pure. The same inputs always give the same status,
//! confidence and labels; only the audit id and timestamp are fresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    AuditAnalysis, AuditResult, CleanlinessStatus, ConfidenceScore, DetectedLabel, ImageMetadata,
};
use crate::obs;
use crate::vision::{VisionAnalysisResult, VisionLabel};

use super::rules::CleanlinessRules;

/// Number of most-confident labels averaged into the overall confidence.
pub const TOP_LABELS_FOR_CONFIDENCE: usize = 5;

/// Stateless evaluator bound to one shared rule set.
#[derive(Debug, Clone, Default)]
pub struct CleanlinessEvaluator {
    rules: Arc<CleanlinessRules>,
}

impl CleanlinessEvaluator {
    pub fn new(rules: impl Into<Arc<CleanlinessRules>>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    pub fn rules(&self) -> &CleanlinessRules {
        &self.rules
    }

    /// Evaluate a vision result, timestamped now.
    pub fn evaluate(
        &self,
        vision: &VisionAnalysisResult,
        image_metadata: ImageMetadata,
        manual_override: Option<bool>,
    ) -> AuditResult {
        self.evaluate_at(vision, image_metadata, manual_override, Utc::now())
    }

    /// [`evaluate`](Self::evaluate) with an explicit clock.
    pub fn evaluate_at(
        &self,
        vision: &VisionAnalysisResult,
        image_metadata: ImageMetadata,
        manual_override: Option<bool>,
        now: DateTime<Utc>,
    ) -> AuditResult {
        let detected_labels = self.classify_labels(&vision.labels);
        let overall_confidence = overall_confidence(&detected_labels);
        let negative_count = detected_labels.iter().filter(|l| l.is_negative).count();
        let status = self.determine_status(negative_count, overall_confidence, manual_override);

        let result = AuditResult::new(
            image_metadata,
            AuditAnalysis {
                detected_labels,
                overall_confidence,
                status,
                manual_override,
                vision_provider: vision.provider_name.clone(),
                model_version: vision.model_version.clone(),
            },
            now,
        );

        obs::emit_audit_evaluated(
            &result.audit_id().to_string(),
            status,
            overall_confidence.value(),
            negative_count,
        );
        result
    }

    /// Mark each label negative if its name contains a vocabulary term.
    pub fn classify_labels(&self, labels: &[VisionLabel]) -> Vec<DetectedLabel> {
        labels
            .iter()
            .map(|label| {
                DetectedLabel::new(
                    label.name.clone(),
                    label.confidence,
                    self.rules.is_negative(&label.name),
                )
            })
            .collect()
    }

    fn determine_status(
        &self,
        negative_count: usize,
        overall_confidence: ConfidenceScore,
        manual_override: Option<bool>,
    ) -> CleanlinessStatus {
        if let Some(is_clean) = manual_override {
            return CleanlinessStatus::from_override(is_clean);
        }

        if !overall_confidence.is_above_threshold(self.rules.confidence_threshold()) {
            return if self.rules.review_on_low_confidence() {
                CleanlinessStatus::RequiresManualReview
            } else {
                CleanlinessStatus::InsufficientData
            };
        }

        if negative_count > self.rules.max_negative_labels() {
            return CleanlinessStatus::NotClean;
        }

        if negative_count > 0 {
            return CleanlinessStatus::NotClean;
        }

        CleanlinessStatus::Clean
    }
}

/// Mean confidence of the top five labels, or of all labels when fewer.
/// Zero when nothing was detected.
pub fn overall_confidence(labels: &[DetectedLabel]) -> ConfidenceScore {
    if labels.is_empty() {
        return ConfidenceScore::zero();
    }

    let mut values: Vec<f64> = labels.iter().map(|l| l.confidence.value()).collect();
    values.sort_by(|a, b| b.total_cmp(a));
    values.truncate(TOP_LABELS_FOR_CONFIDENCE);

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    ConfidenceScore::new(mean.clamp(ConfidenceScore::MIN, ConfidenceScore::MAX))
        .unwrap_or(ConfidenceScore::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vision(labels: &[(&str, f64)]) -> VisionAnalysisResult {
        VisionAnalysisResult::new(
            labels
                .iter()
                .map(|(n, v)| VisionLabel::new(*n, ConfidenceScore::new(*v).unwrap()))
                .collect(),
            "static",
            "1",
        )
    }

    fn metadata() -> ImageMetadata {
        ImageMetadata::new("dealer-001", "showroom", "user-1", "s3://b/k.jpg", 4096, Utc::now())
    }

    #[test]
    fn test_top_five_mean() {
        let evaluator = CleanlinessEvaluator::default();
        let labels = evaluator.classify_labels(
            &vision(&[
                ("A", 100.0),
                ("B", 90.0),
                ("C", 80.0),
                ("D", 70.0),
                ("E", 60.0),
                ("F", 10.0),
            ])
            .labels,
        );
        assert!((overall_confidence(&labels).value() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_fewer_than_five_labels() {
        let evaluator = CleanlinessEvaluator::default();
        let labels = evaluator.classify_labels(&vision(&[("Indoor", 60.0), ("Room", 55.0)]).labels);
        assert!((overall_confidence(&labels).value() - 57.5).abs() < 1e-9);
    }

    #[test]
    fn test_no_labels_is_zero_confidence() {
        let evaluator = CleanlinessEvaluator::default();
        let result = evaluator.evaluate(&vision(&[]), metadata(), None);
        assert_eq!(result.overall_confidence().value(), 0.0);
        assert_eq!(result.status(), CleanlinessStatus::RequiresManualReview);
    }

    #[test]
    fn test_clean_verdict() {
        let evaluator = CleanlinessEvaluator::default();
        let result = evaluator.evaluate(&vision(&[("Showroom", 97.0), ("Floor", 91.0)]), metadata(), None);
        assert_eq!(result.status(), CleanlinessStatus::Clean);
        assert_eq!(result.reason(), "No cleanliness issues detected");
        assert!(result.negative_labels().is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let evaluator = CleanlinessEvaluator::default();
        let result = evaluator.evaluate(&vision(&[("Floor", 80.0)]), metadata(), None);
        assert_eq!(result.status(), CleanlinessStatus::Clean);
    }

    #[test]
    fn test_low_confidence_wins_over_negatives() {
        let evaluator = CleanlinessEvaluator::default();
        let result = evaluator.evaluate(&vision(&[("Trash", 65.0)]), metadata(), None);
        assert_eq!(result.status(), CleanlinessStatus::RequiresManualReview);
        assert_eq!(result.negative_labels().len(), 1);
    }

    #[test]
    fn test_insufficient_data_reason_has_percentage() {
        let evaluator = CleanlinessEvaluator::new(
            CleanlinessRules::default().with_review_on_low_confidence(false),
        );
        let result = evaluator.evaluate(&vision(&[("Indoor", 60.0), ("Room", 55.0)]), metadata(), None);
        assert_eq!(result.status(), CleanlinessStatus::InsufficientData);
        assert_eq!(result.reason(), "Confidence too low (57.50%)");
    }

    #[test]
    fn test_override_records_provenance() {
        let evaluator = CleanlinessEvaluator::default();
        let mut input = vision(&[("Dirt", 85.0)]);
        input.provider_name = "secondary".into();
        input.model_version = "2.5".into();

        let result = evaluator.evaluate(&input, metadata(), Some(true));
        assert_eq!(result.status(), CleanlinessStatus::Clean);
        assert_eq!(result.manual_override(), Some(true));
        assert!(!result.is_finalized());
        assert_eq!(result.vision_provider(), "secondary");
        assert_eq!(result.model_version(), "2.5");
    }
}
