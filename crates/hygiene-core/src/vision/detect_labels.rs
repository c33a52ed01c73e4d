//! Label-detection adapter for services speaking the DetectLabels JSON shape.
//!
//! Works against a Rekognition-compatible gateway or an on-prem model server
//! that accepts `{"Image": ..., "MaxLabels": n, "MinConfidence": c}` and
//! answers with `Labels` and `LabelModelVersion`. Object locators are passed
//! through so the service reads storage itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::domain::ConfidenceScore;

use super::error::{VisionError, VisionResult};
use super::fetch::ImageFetcher;
use super::provider::{AnalysisRequest, StorageLocator, VisionAnalysisResult, VisionLabel, VisionProvider};

pub const PROVIDER_NAME: &str = "detect-labels";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectLabelsRequest<'a> {
    image: ImagePayload<'a>,
    max_labels: usize,
    min_confidence: f64,
    features: [&'static str; 1],
}

#[derive(Debug, Serialize)]
enum ImagePayload<'a> {
    Bytes(String),
    S3Object {
        #[serde(rename = "Bucket")]
        bucket: &'a str,
        #[serde(rename = "Name")]
        name: &'a str,
    },
}

/// Wire shape of a DetectLabels answer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetectLabelsResponse {
    #[serde(default)]
    pub labels: Vec<DetectedLabelPayload>,
    #[serde(default)]
    pub label_model_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetectedLabelPayload {
    pub name: String,
    pub confidence: f64,
    #[serde(default)]
    pub parents: Vec<ParentLabel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParentLabel {
    pub name: String,
}

/// Coarse grouping inferred from a label's parents.
pub fn category_for(label: &DetectedLabelPayload) -> &'static str {
    let has_parent = |name: &str| label.parents.iter().any(|p| p.name == name);

    if label.name == "Person" || has_parent("Person") {
        "people"
    } else if has_parent("Vehicle") {
        "vehicles"
    } else if has_parent("Furniture") || has_parent("Indoor") {
        "indoor"
    } else if has_parent("Outdoor") {
        "outdoor"
    } else {
        "general"
    }
}

/// Translate a wire response into provider-agnostic labels and model version.
pub fn translate_response(response: DetectLabelsResponse) -> VisionResult<(Vec<VisionLabel>, String)> {
    let labels = response
        .labels
        .iter()
        .map(|label| {
            ConfidenceScore::new(label.confidence)
                .map(|score| VisionLabel::new(label.name.clone(), score).with_category(category_for(label)))
                .map_err(|e| VisionError::malformed_score(PROVIDER_NAME, e))
        })
        .collect::<VisionResult<Vec<_>>>()?;
    let model_version = response
        .label_model_version
        .unwrap_or_else(|| "unknown".to_string());
    Ok((labels, model_version))
}

/// [`VisionProvider`] that POSTs DetectLabels requests to `endpoint`.
pub struct DetectLabelsProvider {
    client: reqwest::Client,
    endpoint: String,
    fetcher: Option<Arc<dyn ImageFetcher>>,
}

impl DetectLabelsProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> VisionResult<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(VisionError::provider(PROVIDER_NAME, "endpoint is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                VisionError::provider_with_source(PROVIDER_NAME, "failed to create HTTP client", e)
            })?;
        tracing::info!(endpoint = %endpoint, "initialized detect-labels provider");
        Ok(Self {
            client,
            endpoint,
            fetcher: None,
        })
    }

    /// Fetcher for `Url` locators, which the service cannot read natively.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    async fn detect(
        &self,
        image: ImagePayload<'_>,
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        let started = Instant::now();
        let body = DetectLabelsRequest {
            image,
            max_labels: request.max_labels,
            min_confidence: request.min_confidence,
            features: ["GENERAL_LABELS"],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::provider_with_source(PROVIDER_NAME, "request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VisionError::provider(
                PROVIDER_NAME,
                format!("service error ({status}): {text}"),
            ));
        }

        let payload: DetectLabelsResponse = response.json().await.map_err(|e| {
            VisionError::provider_with_source(PROVIDER_NAME, "failed to decode response", e)
        })?;
        let (labels, model_version) = translate_response(payload)?;
        tracing::info!(labels = labels.len(), model_version = %model_version, "detected labels");

        Ok(VisionAnalysisResult::new(labels, PROVIDER_NAME, model_version)
            .with_processing_time_ms(started.elapsed().as_millis() as u64))
    }
}

#[async_trait]
impl VisionProvider for DetectLabelsProvider {
    async fn analyze(
        &self,
        image: &[u8],
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        tracing::debug!(size_bytes = image.len(), max_labels = request.max_labels, "detect labels from bytes");
        self.detect(ImagePayload::Bytes(STANDARD.encode(image)), request)
            .await
    }

    async fn analyze_by_reference(
        &self,
        locator: &StorageLocator,
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        match locator {
            StorageLocator::Object { bucket, key } => {
                tracing::debug!(locator = %locator, "detect labels from object store");
                self.detect(ImagePayload::S3Object { bucket, name: key }, request)
                    .await
            }
            StorageLocator::Url { .. } => {
                let fetcher = self.fetcher.as_ref().ok_or_else(|| {
                    VisionError::provider(
                        PROVIDER_NAME,
                        format!("cannot read {locator} without an image fetcher"),
                    )
                })?;
                let image = fetcher.fetch(locator).await?;
                self.analyze(&image, request).await
            }
        }
    }

    fn provider_name(&self) -> String {
        PROVIDER_NAME.to_string()
    }

    /// The service picks its model per call; the real version is on each result.
    fn model_version(&self) -> String {
        "latest".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> DetectLabelsResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_translate_response_with_categories() {
        let response = payload(json!({
            "Labels": [
                { "Name": "Person", "Confidence": 99.5, "Parents": [] },
                { "Name": "Car", "Confidence": 97.0, "Parents": [{ "Name": "Vehicle" }] },
                { "Name": "Chair", "Confidence": 88.0, "Parents": [{ "Name": "Furniture" }] },
                { "Name": "Parking Lot", "Confidence": 80.0, "Parents": [{ "Name": "Outdoor" }] },
                { "Name": "Floor", "Confidence": 91.0 }
            ],
            "LabelModelVersion": "3.0"
        }));
        let (labels, version) = translate_response(response).unwrap();
        assert_eq!(version, "3.0");
        let categories: Vec<_> = labels.iter().map(|l| l.category.as_str()).collect();
        assert_eq!(categories, vec!["people", "vehicles", "indoor", "outdoor", "general"]);
    }

    #[test]
    fn test_missing_model_version_defaults() {
        let (labels, version) = translate_response(payload(json!({ "Labels": [] }))).unwrap();
        assert!(labels.is_empty());
        assert_eq!(version, "unknown");
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        let response = payload(json!({ "Labels": [{ "Name": "Floor", "Confidence": 140.0 }] }));
        assert!(matches!(
            translate_response(response),
            Err(VisionError::Provider { .. })
        ));
    }

    #[test]
    fn test_request_wire_shape() {
        let body = DetectLabelsRequest {
            image: ImagePayload::S3Object {
                bucket: "hygiene-images",
                name: "dealer-1/a.jpg",
            },
            max_labels: 10,
            min_confidence: 75.0,
            features: ["GENERAL_LABELS"],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["Image"]["S3Object"]["Bucket"], "hygiene-images");
        assert_eq!(value["Image"]["S3Object"]["Name"], "dealer-1/a.jpg");
        assert_eq!(value["MaxLabels"], 10);
        assert_eq!(value["MinConfidence"], 75.0);

        let bytes = DetectLabelsRequest {
            image: ImagePayload::Bytes(STANDARD.encode(b"abc")),
            max_labels: 1,
            min_confidence: 0.0,
            features: ["GENERAL_LABELS"],
        };
        assert_eq!(serde_json::to_value(&bytes).unwrap()["Image"]["Bytes"], "YWJj");
    }

    #[tokio::test]
    async fn test_url_locator_without_fetcher_fails() {
        let provider = DetectLabelsProvider::new("http://127.0.0.1:9/detect", Duration::from_secs(1)).unwrap();
        let err = provider
            .analyze_by_reference(&StorageLocator::url("https://cdn.example.com/a.jpg"), &AnalysisRequest::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("without an image fetcher"));
    }
}
