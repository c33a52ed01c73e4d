//! Caller-owned image metadata carried on every audit for traceability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::{DomainError, DomainResult};

/// Largest image accepted for analysis (15 MiB).
pub const MAX_IMAGE_BYTES: u64 = 15 * 1024 * 1024;

/// Minimum resolution, enforced only when both dimensions are known.
pub const MIN_WIDTH_PX: u32 = 640;
pub const MIN_HEIGHT_PX: u32 = 480;

/// Metadata about an analyzed image.
///
/// The audit core never stores or fetches the image itself; this is the
/// reference the persistence collaborator uses to find it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub image_id: Uuid,
    pub dealer_id: String,
    pub checkpoint_id: String,
    /// Opaque storage reference, e.g. `s3://bucket/key`.
    pub storage_locator: String,
    /// Mobile app user who uploaded the image.
    pub uploader_id: String,
    pub captured_at: DateTime<Utc>,
    pub uploaded_at: DateTime<Utc>,
    pub file_size_bytes: u64,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_px: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_px: Option<u32>,
    /// SHA-256 hex digest of the image bytes, when the caller had them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,
}

impl ImageMetadata {
    /// Metadata for an image captured and uploaded at `now`.
    pub fn new(
        dealer_id: impl Into<String>,
        checkpoint_id: impl Into<String>,
        uploader_id: impl Into<String>,
        storage_locator: impl Into<String>,
        file_size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            image_id: Uuid::new_v4(),
            dealer_id: dealer_id.into(),
            checkpoint_id: checkpoint_id.into(),
            storage_locator: storage_locator.into(),
            uploader_id: uploader_id.into(),
            captured_at: now,
            uploaded_at: now,
            file_size_bytes,
            content_type: "image/jpeg".to_string(),
            width_px: None,
            height_px: None,
            content_digest: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_dimensions(mut self, width_px: u32, height_px: u32) -> Self {
        self.width_px = Some(width_px);
        self.height_px = Some(height_px);
        self
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Record the SHA-256 digest and size of the image bytes.
    pub fn with_content_digest_of(mut self, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        self.content_digest = Some(hex::encode(hasher.finalize()));
        self.file_size_bytes = bytes.len() as u64;
        self
    }

    /// Whether the image meets the minimum requirements for analysis.
    pub fn is_valid_for_analysis(&self) -> bool {
        self.validate_for_analysis().is_ok()
    }

    /// Like [`is_valid_for_analysis`](Self::is_valid_for_analysis) but says why not.
    pub fn validate_for_analysis(&self) -> DomainResult<()> {
        if self.file_size_bytes > MAX_IMAGE_BYTES {
            return Err(DomainError::InvalidImage(format!(
                "{} bytes exceeds the {} byte limit",
                self.file_size_bytes, MAX_IMAGE_BYTES
            )));
        }
        if let (Some(w), Some(h)) = (self.width_px, self.height_px) {
            if w < MIN_WIDTH_PX || h < MIN_HEIGHT_PX {
                return Err(DomainError::InvalidImage(format!(
                    "resolution {w}x{h} below minimum {MIN_WIDTH_PX}x{MIN_HEIGHT_PX}"
                )));
            }
        }
        Ok(())
    }

    /// Whole days between capture and `reference`.
    pub fn age_in_days(&self, reference: DateTime<Utc>) -> i64 {
        (reference - self.captured_at).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ImageMetadata {
        ImageMetadata::new(
            "dealer-001",
            "reception",
            "user-123",
            "s3://hygiene-images/dealer-001/reception/img.jpg",
            1_024_000,
            Utc::now(),
        )
    }

    #[test]
    fn test_valid_by_default() {
        assert!(sample().is_valid_for_analysis());
    }

    #[test]
    fn test_oversized_image_rejected() {
        let mut meta = sample();
        meta.file_size_bytes = MAX_IMAGE_BYTES + 1;
        assert!(matches!(
            meta.validate_for_analysis(),
            Err(DomainError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_low_resolution_rejected_only_when_known() {
        assert!(!sample().with_dimensions(320, 240).is_valid_for_analysis());
        assert!(sample().with_dimensions(1920, 1080).is_valid_for_analysis());
        let mut one_dim = sample();
        one_dim.width_px = Some(10);
        assert!(one_dim.is_valid_for_analysis());
    }

    #[test]
    fn test_content_digest_is_sha256_hex() {
        let meta = sample().with_content_digest_of(b"jpeg-bytes");
        let digest = meta.content_digest.unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(meta.file_size_bytes, 10);
    }

    #[test]
    fn test_age_in_days() {
        let now = Utc::now();
        let meta = sample().with_captured_at(now - chrono::Duration::days(3));
        assert_eq!(meta.age_in_days(now), 3);
    }
}
