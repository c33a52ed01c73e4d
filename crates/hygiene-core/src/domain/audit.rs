//! The audit decision entity and its one-shot manual override.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::confidence::ConfidenceScore;
use super::error::{DomainError, DomainResult};
use super::image::ImageMetadata;
use super::status::CleanlinessStatus;

/// Number of negative label names quoted in a NOT_CLEAN reason.
const REASON_LABEL_LIMIT: usize = 3;

/// A label after polarity classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLabel {
    pub name: String,
    pub confidence: ConfidenceScore,
    /// Whether the label indicates an unclean or unsafe condition.
    pub is_negative: bool,
}

impl DetectedLabel {
    pub fn new(name: impl Into<String>, confidence: ConfidenceScore, is_negative: bool) -> Self {
        Self {
            name: name.into(),
            confidence,
            is_negative,
        }
    }
}

impl std::fmt::Display for DetectedLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flag = if self.is_negative { "!" } else { "-" };
        write!(f, "{flag} {} ({})", self.name, self.confidence)
    }
}

/// Analysis outcome handed to [`AuditResult::new`] by the evaluator.
#[derive(Debug, Clone)]
pub struct AuditAnalysis {
    pub detected_labels: Vec<DetectedLabel>,
    pub overall_confidence: ConfidenceScore,
    pub status: CleanlinessStatus,
    /// Override supplied at evaluation time, if any.
    pub manual_override: Option<bool>,
    /// Provider that actually answered.
    pub vision_provider: String,
    pub model_version: String,
}

/// Result of a hygiene audit.
///
/// Analysis fields are fixed at creation. `negative_labels` is always the
/// `is_negative` subset of `detected_labels` and has no setter. The only
/// sanctioned mutation is [`apply_manual_override`](Self::apply_manual_override),
/// which finalizes the audit.
///
/// Deserialization goes through [`AuditRecord`] so a reloaded audit keeps
/// its identity and review state, and `negative_labels` is rebuilt from
/// `detected_labels` rather than read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AuditRecord")]
pub struct AuditResult {
    audit_id: Uuid,
    image_metadata: ImageMetadata,
    detected_labels: Vec<DetectedLabel>,
    negative_labels: Vec<DetectedLabel>,
    overall_confidence: ConfidenceScore,
    status: CleanlinessStatus,
    reason: String,
    analyzed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    manual_override: Option<bool>,
    vision_provider: String,
    model_version: String,
}

impl AuditResult {
    /// Create a fresh audit with a new identity and a generated reason.
    pub fn new(image_metadata: ImageMetadata, analysis: AuditAnalysis, now: DateTime<Utc>) -> Self {
        let negative_labels: Vec<DetectedLabel> = analysis
            .detected_labels
            .iter()
            .filter(|l| l.is_negative)
            .cloned()
            .collect();
        let reason = generate_reason(
            analysis.status,
            analysis.overall_confidence,
            &negative_labels,
        );

        Self {
            audit_id: Uuid::new_v4(),
            image_metadata,
            detected_labels: analysis.detected_labels,
            negative_labels,
            overall_confidence: analysis.overall_confidence,
            status: analysis.status,
            reason,
            analyzed_at: now,
            reviewed_by: None,
            reviewed_at: None,
            manual_override: analysis.manual_override,
            vision_provider: analysis.vision_provider,
            model_version: analysis.model_version,
        }
    }

    /// Replace the generated reason with an explicit one.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Apply a human reviewer decision, timestamped now.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::AlreadyFinalized`] if a reviewer already decided.
    /// Returns [`DomainError::InvalidOverride`] for an empty reviewer id or notes.
    pub fn apply_manual_override(
        &mut self,
        reviewer_id: &str,
        is_clean: bool,
        notes: &str,
    ) -> DomainResult<()> {
        self.apply_manual_override_at(reviewer_id, is_clean, notes, Utc::now())
    }

    /// [`apply_manual_override`](Self::apply_manual_override) with an explicit clock.
    pub fn apply_manual_override_at(
        &mut self,
        reviewer_id: &str,
        is_clean: bool,
        notes: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_not_finalized()?;

        if reviewer_id.trim().is_empty() {
            return Err(DomainError::InvalidOverride(
                "reviewer id must not be empty".into(),
            ));
        }
        if notes.trim().is_empty() {
            return Err(DomainError::InvalidOverride(
                "override notes must not be empty".into(),
            ));
        }

        self.manual_override = Some(is_clean);
        self.status = CleanlinessStatus::from_override(is_clean);
        self.reviewed_by = Some(reviewer_id.to_string());
        self.reviewed_at = Some(now);
        self.reason = format!("Manual override: {notes}");
        Ok(())
    }

    /// Fails with [`DomainError::AlreadyFinalized`] once a reviewer has decided.
    pub fn ensure_not_finalized(&self) -> DomainResult<()> {
        match &self.reviewed_by {
            Some(reviewer) => Err(DomainError::AlreadyFinalized {
                audit_id: self.audit_id,
                reviewed_by: reviewer.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.reviewed_by.is_some()
    }

    pub fn passes_compliance(&self) -> bool {
        self.status.is_compliant()
    }

    pub fn requires_review(&self) -> bool {
        self.status.requires_human_intervention()
    }

    pub fn audit_id(&self) -> Uuid {
        self.audit_id
    }

    pub fn image_metadata(&self) -> &ImageMetadata {
        &self.image_metadata
    }

    pub fn detected_labels(&self) -> &[DetectedLabel] {
        &self.detected_labels
    }

    pub fn negative_labels(&self) -> &[DetectedLabel] {
        &self.negative_labels
    }

    pub fn overall_confidence(&self) -> ConfidenceScore {
        self.overall_confidence
    }

    pub fn status(&self) -> CleanlinessStatus {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn analyzed_at(&self) -> DateTime<Utc> {
        self.analyzed_at
    }

    pub fn reviewed_by(&self) -> Option<&str> {
        self.reviewed_by.as_deref()
    }

    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.reviewed_at
    }

    pub fn manual_override(&self) -> Option<bool> {
        self.manual_override
    }

    pub fn vision_provider(&self) -> &str {
        &self.vision_provider
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }
}

/// Stored shape of an [`AuditResult`]. A stored `negative_labels` list is ignored.
#[derive(Deserialize)]
struct AuditRecord {
    audit_id: Uuid,
    image_metadata: ImageMetadata,
    detected_labels: Vec<DetectedLabel>,
    overall_confidence: ConfidenceScore,
    status: CleanlinessStatus,
    reason: String,
    analyzed_at: DateTime<Utc>,
    #[serde(default)]
    reviewed_by: Option<String>,
    #[serde(default)]
    reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    manual_override: Option<bool>,
    vision_provider: String,
    model_version: String,
}

impl TryFrom<AuditRecord> for AuditResult {
    type Error = DomainError;

    fn try_from(record: AuditRecord) -> DomainResult<Self> {
        match (&record.reviewed_by, record.reviewed_at, record.manual_override) {
            (None, None, _) => {}
            (Some(reviewer), Some(_), Some(is_clean)) => {
                if reviewer.trim().is_empty() {
                    return Err(DomainError::InvalidAuditRecord(
                        "reviewed_by must not be empty".into(),
                    ));
                }
                if record.status != CleanlinessStatus::from_override(is_clean) {
                    return Err(DomainError::InvalidAuditRecord(format!(
                        "finalized status {} contradicts override {is_clean}",
                        record.status
                    )));
                }
            }
            (Some(_), None, _) => {
                return Err(DomainError::InvalidAuditRecord(
                    "reviewed_by set without reviewed_at".into(),
                ))
            }
            (None, Some(_), _) => {
                return Err(DomainError::InvalidAuditRecord(
                    "reviewed_at set without reviewed_by".into(),
                ))
            }
            (Some(_), Some(_), None) => {
                return Err(DomainError::InvalidAuditRecord(
                    "reviewed audit has no manual_override".into(),
                ))
            }
        }

        let negative_labels = record
            .detected_labels
            .iter()
            .filter(|l| l.is_negative)
            .cloned()
            .collect();

        Ok(Self {
            audit_id: record.audit_id,
            image_metadata: record.image_metadata,
            detected_labels: record.detected_labels,
            negative_labels,
            overall_confidence: record.overall_confidence,
            status: record.status,
            reason: record.reason,
            analyzed_at: record.analyzed_at,
            reviewed_by: record.reviewed_by,
            reviewed_at: record.reviewed_at,
            manual_override: record.manual_override,
            vision_provider: record.vision_provider,
            model_version: record.model_version,
        })
    }
}

fn generate_reason(
    status: CleanlinessStatus,
    confidence: ConfidenceScore,
    negative_labels: &[DetectedLabel],
) -> String {
    match status {
        CleanlinessStatus::Clean => "No cleanliness issues detected".to_string(),
        CleanlinessStatus::InsufficientData => {
            format!("Confidence too low ({})", confidence.as_percentage())
        }
        CleanlinessStatus::RequiresManualReview => {
            "Unclear results - manual review required".to_string()
        }
        CleanlinessStatus::NotClean if negative_labels.is_empty() => {
            "Status determination unclear".to_string()
        }
        CleanlinessStatus::NotClean => {
            let names: Vec<&str> = negative_labels
                .iter()
                .take(REASON_LABEL_LIMIT)
                .map(|l| l.name.as_str())
                .collect();
            format!("Issues detected: {}", names.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(v: f64) -> ConfidenceScore {
        ConfidenceScore::new(v).unwrap()
    }

    fn metadata() -> ImageMetadata {
        ImageMetadata::new("dealer-001", "wash-bay", "user-9", "s3://b/k.jpg", 2048, Utc::now())
    }

    fn audit(labels: Vec<DetectedLabel>, status: CleanlinessStatus) -> AuditResult {
        AuditResult::new(
            metadata(),
            AuditAnalysis {
                detected_labels: labels,
                overall_confidence: score(90.0),
                status,
                manual_override: None,
                vision_provider: "static".into(),
                model_version: "1".into(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_negative_labels_derived_from_detected() {
        let result = audit(
            vec![
                DetectedLabel::new("Floor", score(95.0), false),
                DetectedLabel::new("Dirt", score(85.0), true),
                DetectedLabel::new("Trash", score(82.0), true),
            ],
            CleanlinessStatus::NotClean,
        );
        let names: Vec<&str> = result.negative_labels().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Dirt", "Trash"]);
    }

    #[test]
    fn test_not_clean_reason_lists_first_three() {
        let labels = ["Dirt", "Trash", "Stain", "Mold"]
            .iter()
            .map(|n| DetectedLabel::new(*n, score(85.0), true))
            .collect();
        let result = audit(labels, CleanlinessStatus::NotClean);
        assert_eq!(result.reason(), "Issues detected: Dirt, Trash, Stain");
    }

    #[test]
    fn test_generated_reasons_per_status() {
        assert_eq!(
            audit(vec![], CleanlinessStatus::Clean).reason(),
            "No cleanliness issues detected"
        );
        assert_eq!(
            audit(vec![], CleanlinessStatus::RequiresManualReview).reason(),
            "Unclear results - manual review required"
        );
        assert_eq!(
            audit(vec![], CleanlinessStatus::InsufficientData).reason(),
            "Confidence too low (90.00%)"
        );
    }

    #[test]
    fn test_explicit_reason_wins() {
        let result = audit(vec![], CleanlinessStatus::Clean).with_reason("checked by hand");
        assert_eq!(result.reason(), "checked by hand");
    }

    #[test]
    fn test_override_sets_review_fields_and_reason() {
        let mut result = audit(
            vec![DetectedLabel::new("Dirt", score(85.0), true)],
            CleanlinessStatus::NotClean,
        );
        let now = Utc::now();
        result
            .apply_manual_override_at("auditor-1", true, "shadow, not dirt", now)
            .unwrap();

        assert_eq!(result.status(), CleanlinessStatus::Clean);
        assert_eq!(result.manual_override(), Some(true));
        assert_eq!(result.reviewed_by(), Some("auditor-1"));
        assert_eq!(result.reviewed_at(), Some(now));
        assert_eq!(result.reason(), "Manual override: shadow, not dirt");
        assert!(result.is_finalized());
        assert_eq!(result.negative_labels().len(), 1);
    }

    #[test]
    fn test_second_override_rejected() {
        let mut result = audit(vec![], CleanlinessStatus::RequiresManualReview);
        result.apply_manual_override("auditor-1", false, "spill near door").unwrap();
        let err = result
            .apply_manual_override("auditor-2", true, "looks fine")
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyFinalized { .. }));
        assert_eq!(result.status(), CleanlinessStatus::NotClean);
        assert_eq!(result.reviewed_by(), Some("auditor-1"));
    }

    #[test]
    fn test_override_requires_reviewer_and_notes() {
        let mut result = audit(vec![], CleanlinessStatus::RequiresManualReview);
        assert!(matches!(
            result.apply_manual_override("  ", true, "ok"),
            Err(DomainError::InvalidOverride(_))
        ));
        assert!(matches!(
            result.apply_manual_override("auditor-1", true, ""),
            Err(DomainError::InvalidOverride(_))
        ));
        assert!(!result.is_finalized());
    }

    #[test]
    fn test_record_without_review_time_rejected() {
        let mut result = audit(vec![], CleanlinessStatus::RequiresManualReview);
        result.apply_manual_override("auditor-1", true, "checked").unwrap();
        let mut json = serde_json::to_value(&result).unwrap();
        json.as_object_mut().unwrap().remove("reviewed_at");

        let err = serde_json::from_value::<AuditResult>(json).unwrap_err();
        assert!(err.to_string().contains("reviewed_by set without reviewed_at"));
    }

    #[test]
    fn test_record_status_must_match_override() {
        let mut result = audit(vec![], CleanlinessStatus::RequiresManualReview);
        result.apply_manual_override("auditor-1", true, "checked").unwrap();
        let mut json = serde_json::to_value(&result).unwrap();
        json["status"] = serde_json::json!("NOT_CLEAN");

        assert!(serde_json::from_value::<AuditResult>(json).is_err());
    }

    #[test]
    fn test_stored_negative_labels_are_rebuilt() {
        let result = audit(
            vec![
                DetectedLabel::new("Floor", score(95.0), false),
                DetectedLabel::new("Dirt", score(85.0), true),
            ],
            CleanlinessStatus::NotClean,
        );
        let mut json = serde_json::to_value(&result).unwrap();
        json["negative_labels"] = serde_json::json!([]);

        let reloaded: AuditResult = serde_json::from_value(json).unwrap();
        assert_eq!(reloaded.negative_labels().len(), 1);
        assert_eq!(reloaded.negative_labels()[0].name, "Dirt");
        assert_eq!(reloaded, result);
    }

    #[test]
    fn test_serializes_audit_trail() {
        let result = audit(vec![], CleanlinessStatus::Clean);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "CLEAN");
        assert_eq!(json["vision_provider"], "static");
        assert!(json.get("reviewed_by").is_none());
    }
}
