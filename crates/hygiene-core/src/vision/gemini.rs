//! Gemini generative-vision adapter.
//!
//! Gemini is asked to classify the image as `Clean` or `Messy` and list the
//! items that led to that verdict. The answer is translated into ordinary
//! [`VisionLabel`]s so the evaluator treats it like any other backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::ConfidenceScore;

use super::error::{VisionError, VisionResult};
use super::fetch::ImageFetcher;
use super::provider::{AnalysisRequest, StorageLocator, VisionAnalysisResult, VisionLabel, VisionProvider};

/// Name recorded in the audit trail.
pub const PROVIDER_NAME: &str = "gemini";

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Share of the classification confidence assigned to each detected item.
const DETECTED_ITEM_WEIGHT: f64 = 0.9;

const CLEAN_INDICATORS: &[&str] = &[
    "clean floor",
    "showroom",
    "organized",
    "polished surface",
    "clear space",
    "vehicle showroom",
    "tidy",
    "pristine",
];

const MESSY_INDICATORS: &[&str] = &[
    "trash",
    "clutter",
    "dirt",
    "stain",
    "garbage",
    "spill",
    "damaged floor",
    "debris",
    "untidy",
    "disorganized",
];

/// Connection and retry settings for [`GeminiProvider`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    /// Retries after a quota rejection. Other failures are never retried here.
    pub max_retries: u32,
    /// Wait before quota retry `n` is `retry_base * n`.
    pub retry_base: Duration,
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: API_BASE.to_string(),
            max_retries: 3,
            retry_base: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Read `GEMINI_API_KEY` and, if set, `GEMINI_MODEL`.
    pub fn from_env() -> VisionResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            VisionError::provider(PROVIDER_NAME, "GEMINI_API_KEY environment variable not set")
        })?;
        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Structured verdict Gemini is prompted to return.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Classification {
    #[serde(default = "unknown_classification")]
    pub classification: String,
    /// Model confidence on the 0–1 scale.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub detected_items: Vec<String>,
}

fn unknown_classification() -> String {
    "Unknown".to_string()
}

/// Translate a classification into labels.
///
/// The verdict itself becomes one `cleanliness` label. Detected items are
/// added as `detected_item` labels at a reduced confidence, and only when
/// the verdict clears `request.min_confidence`.
pub fn labels_from_classification(
    classification: &Classification,
    request: &AnalysisRequest,
) -> VisionResult<Vec<VisionLabel>> {
    let score = ConfidenceScore::from_normalized(classification.confidence)
        .map_err(|e| VisionError::malformed_score(PROVIDER_NAME, e))?;

    let mut labels = vec![
        VisionLabel::new(classification.classification.clone(), score).with_category("cleanliness"),
    ];

    if score.value() >= request.min_confidence {
        let item_score = ConfidenceScore::new(score.value() * DETECTED_ITEM_WEIGHT)
            .map_err(|e| VisionError::malformed_score(PROVIDER_NAME, e))?;
        labels.extend(
            classification
                .detected_items
                .iter()
                .map(|item| VisionLabel::new(item.clone(), item_score).with_category("detected_item")),
        );
    }

    labels.truncate(request.max_labels);
    Ok(labels)
}

fn classification_prompt() -> String {
    format!(
        "Analyze this image for cleanliness. Is it 'Clean' or 'Messy'?\n\
         \n\
         Clean criteria: {}\n\
         Messy criteria: {}\n\
         \n\
         Return JSON with this exact structure:\n\
         {{\"classification\": \"Clean\"|\"Messy\", \"confidence\": 0.0-1.0, \
         \"reasoning\": \"Brief explanation\", \"detected_items\": [\"item1\", \"item2\"]}}\n\
         \n\
         Be thorough in identifying all relevant items that indicate cleanliness or messiness.",
        CLEAN_INDICATORS.join(", "),
        MESSY_INDICATORS.join(", "),
    )
}

/// Best-effort MIME type from magic bytes.
fn sniff_mime_type(image: &[u8]) -> &'static str {
    match image {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'G', b'I', b'F', ..] => "image/gif",
        _ => "image/jpeg",
    }
}

/// Extract the classification JSON from a `generateContent` response body.
pub fn parse_generate_response(body: &Value) -> VisionResult<Classification> {
    let text = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| VisionError::provider(PROVIDER_NAME, "response contained no text part"))?;

    let trimmed = text.trim();
    let json_str = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    serde_json::from_str(json_str).map_err(|e| {
        VisionError::provider_with_source(PROVIDER_NAME, "failed to parse classification JSON", e)
    })
}

/// Outcome of one HTTP round trip, before retry policy is applied.
enum Attempt {
    Done(Value),
    QuotaExceeded(String),
}

fn is_quota_rejection(status: reqwest::StatusCode, body: &str) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED")
}

/// [`VisionProvider`] backed by the Gemini `generateContent` REST API.
///
/// Gemini only accepts inline image bytes. By-reference analysis downloads
/// through the configured [`ImageFetcher`], so it can read exactly the
/// locators that fetcher supports. With [`HttpImageFetcher`](super::HttpImageFetcher)
/// that is `Url` locators only; `Object` locators fail with a provider error,
/// and a chain that falls back to Gemini for them needs an object-store
/// fetcher wired in with [`with_fetcher`](Self::with_fetcher).
pub struct GeminiProvider {
    client: reqwest::Client,
    config: GeminiConfig,
    fetcher: Option<Arc<dyn ImageFetcher>>,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> VisionResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(VisionError::provider(PROVIDER_NAME, "API key is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                VisionError::provider_with_source(PROVIDER_NAME, "failed to create HTTP client", e)
            })?;
        tracing::info!(model = %config.model, "initialized gemini provider");
        Ok(Self {
            client,
            config,
            fetcher: None,
        })
    }

    pub fn from_env() -> VisionResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    /// Fetcher used to download images for by-reference analysis.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn send_once(&self, body: &Value) -> VisionResult<Attempt> {
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| VisionError::provider_with_source(PROVIDER_NAME, "API request failed", e))?;

        let status = response.status();
        if status.is_success() {
            let value = response.json::<Value>().await.map_err(|e| {
                VisionError::provider_with_source(PROVIDER_NAME, "failed to decode API response", e)
            })?;
            return Ok(Attempt::Done(value));
        }

        let text = response.text().await.unwrap_or_default();
        if is_quota_rejection(status, &text) {
            return Ok(Attempt::QuotaExceeded(text));
        }
        Err(VisionError::provider(
            PROVIDER_NAME,
            format!("API error ({status}): {text}"),
        ))
    }

    /// Send the request, retrying only quota rejections.
    async fn generate(&self, body: &Value) -> VisionResult<Value> {
        let mut retries = 0;
        loop {
            match self.send_once(body).await? {
                Attempt::Done(value) => return Ok(value),
                Attempt::QuotaExceeded(detail) => {
                    if retries >= self.config.max_retries {
                        return Err(VisionError::provider(
                            PROVIDER_NAME,
                            format!(
                                "quota exceeded after {} retries: {detail}",
                                self.config.max_retries
                            ),
                        ));
                    }
                    retries += 1;
                    let wait = self.config.retry_base * retries;
                    tracing::warn!(
                        retry = retries,
                        max_retries = self.config.max_retries,
                        wait_ms = wait.as_millis() as u64,
                        "gemini quota exceeded, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    async fn analyze(
        &self,
        image: &[u8],
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        let started = Instant::now();
        tracing::debug!(
            size_bytes = image.len(),
            model = %self.config.model,
            min_confidence = request.min_confidence,
            "analyzing image with gemini"
        );

        let body = json!({
            "contents": [{
                "parts": [
                    { "text": classification_prompt() },
                    { "inline_data": {
                        "mime_type": sniff_mime_type(image),
                        "data": STANDARD.encode(image),
                    }}
                ]
            }],
            "generationConfig": { "response_mime_type": "application/json" }
        });

        let response = self.generate(&body).await?;
        let classification = parse_generate_response(&response)?;
        let labels = labels_from_classification(&classification, request)?;

        tracing::info!(
            classification = %classification.classification,
            confidence = classification.confidence,
            detected_items = classification.detected_items.len(),
            reasoning = %classification.reasoning,
            "gemini classification"
        );

        Ok(
            VisionAnalysisResult::new(labels, PROVIDER_NAME, self.config.model.clone())
                .with_processing_time_ms(started.elapsed().as_millis() as u64),
        )
    }

    /// Gemini cannot read storage directly, so the image is downloaded first.
    async fn analyze_by_reference(
        &self,
        locator: &StorageLocator,
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        let fetcher = self.fetcher.as_ref().ok_or_else(|| {
            VisionError::provider(
                PROVIDER_NAME,
                format!("no image fetcher configured to download {locator}"),
            )
        })?;
        let image = fetcher.fetch(locator).await.map_err(|e| {
            VisionError::provider_with_source(PROVIDER_NAME, format!("failed to download {locator}"), e)
        })?;
        self.analyze(&image, request).await
    }

    fn provider_name(&self) -> String {
        PROVIDER_NAME.to_string()
    }

    fn model_version(&self) -> String {
        self.config.model.clone()
    }
}
