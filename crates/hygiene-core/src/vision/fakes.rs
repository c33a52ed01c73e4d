//! In-memory fakes for the vision traits
//!
//! Provides `StaticVisionProvider`, `FailingVisionProvider`,
//! `DelayedVisionProvider` and `MemoryImageFetcher` that satisfy the trait
//! contracts without any network access. Tests use all of them; the CLI's
//! `dry-run` provider is a `StaticVisionProvider` with no labels, so its
//! behaviour is part of the operator-facing surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ConfidenceScore;

use super::error::{VisionError, VisionResult};
use super::fetch::ImageFetcher;
use super::provider::{AnalysisRequest, StorageLocator, VisionAnalysisResult, VisionLabel, VisionProvider};

// ---------------------------------------------------------------------------
// StaticVisionProvider
// ---------------------------------------------------------------------------

/// Returns the same labels for every image and counts its calls.
///
/// The returned result always carries this provider's own name and version,
/// so tests can tell which chain member answered.
#[derive(Debug)]
pub struct StaticVisionProvider {
    name: String,
    model_version: String,
    labels: Vec<VisionLabel>,
    processing_time_ms: u64,
    calls: AtomicUsize,
    last_request: Mutex<Option<AnalysisRequest>>,
}

impl StaticVisionProvider {
    pub fn new(name: impl Into<String>, labels: Vec<VisionLabel>) -> Self {
        Self {
            name: name.into(),
            model_version: "static-1".to_string(),
            labels,
            processing_time_ms: 0,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A provider that detects nothing.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// Build from `(name, confidence)` pairs. Panics on an out-of-range score.
    pub fn with_scores(name: impl Into<String>, scores: &[(&str, f64)]) -> Self {
        let labels = scores
            .iter()
            .map(|(label, score)| {
                VisionLabel::new(
                    *label,
                    ConfidenceScore::new(*score).expect("fake label score out of range"),
                )
            })
            .collect();
        Self::new(name, labels)
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = version.into();
        self
    }

    pub fn with_processing_time_ms(mut self, ms: u64) -> Self {
        self.processing_time_ms = ms;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The request seen by the most recent call.
    pub fn last_request(&self) -> Option<AnalysisRequest> {
        *self.last_request.lock().unwrap()
    }

    fn answer(&self, request: &AnalysisRequest) -> VisionAnalysisResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(*request);
        VisionAnalysisResult::new(self.labels.clone(), self.name.clone(), self.model_version.clone())
            .with_processing_time_ms(self.processing_time_ms)
    }
}

#[async_trait]
impl VisionProvider for StaticVisionProvider {
    async fn analyze(
        &self,
        _image: &[u8],
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        Ok(self.answer(request))
    }

    async fn analyze_by_reference(
        &self,
        _locator: &StorageLocator,
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        Ok(self.answer(request))
    }

    fn provider_name(&self) -> String {
        self.name.clone()
    }

    fn model_version(&self) -> String {
        self.model_version.clone()
    }
}

// ---------------------------------------------------------------------------
// FailingVisionProvider
// ---------------------------------------------------------------------------

/// Fails every call with [`VisionError::Provider`].
#[derive(Debug)]
pub struct FailingVisionProvider {
    name: String,
    message: String,
    calls: AtomicUsize,
}

impl FailingVisionProvider {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> VisionError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        VisionError::provider(self.name.clone(), self.message.clone())
    }
}

#[async_trait]
impl VisionProvider for FailingVisionProvider {
    async fn analyze(
        &self,
        _image: &[u8],
        _request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        Err(self.fail())
    }

    async fn analyze_by_reference(
        &self,
        _locator: &StorageLocator,
        _request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        Err(self.fail())
    }

    fn provider_name(&self) -> String {
        self.name.clone()
    }

    fn model_version(&self) -> String {
        "unavailable".to_string()
    }
}

// ---------------------------------------------------------------------------
// DelayedVisionProvider
// ---------------------------------------------------------------------------

/// Sleeps before delegating to an inner provider. Pair with
/// `tokio::time::pause()` to exercise deadlines without real waiting.
pub struct DelayedVisionProvider<P> {
    inner: P,
    delay: Duration,
}

impl<P: VisionProvider> DelayedVisionProvider<P> {
    pub fn new(inner: P, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: VisionProvider> VisionProvider for DelayedVisionProvider<P> {
    async fn analyze(
        &self,
        image: &[u8],
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        tokio::time::sleep(self.delay).await;
        self.inner.analyze(image, request).await
    }

    async fn analyze_by_reference(
        &self,
        locator: &StorageLocator,
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        tokio::time::sleep(self.delay).await;
        self.inner.analyze_by_reference(locator, request).await
    }

    fn provider_name(&self) -> String {
        self.inner.provider_name()
    }

    fn model_version(&self) -> String {
        self.inner.model_version()
    }
}

// ---------------------------------------------------------------------------
// MemoryImageFetcher
// ---------------------------------------------------------------------------

/// Image fetcher backed by a `HashMap<locator, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryImageFetcher {
    images: Mutex<HashMap<StorageLocator, Vec<u8>>>,
}

impl MemoryImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, locator: StorageLocator, bytes: impl Into<Vec<u8>>) {
        self.images.lock().unwrap().insert(locator, bytes.into());
    }
}

#[async_trait]
impl ImageFetcher for MemoryImageFetcher {
    async fn fetch(&self, locator: &StorageLocator) -> VisionResult<Vec<u8>> {
        self.images
            .lock()
            .unwrap()
            .get(locator)
            .cloned()
            .ok_or_else(|| VisionError::provider("memory-fetcher", format!("no image at {locator}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_counts_and_records() {
        let provider = StaticVisionProvider::with_scores("static", &[("Floor", 90.0)]);
        let request = AnalysisRequest::new(5, 60.0);
        let result = provider.analyze(b"img", &request).await.unwrap();
        assert_eq!(result.labels.len(), 1);
        assert_eq!(result.provider_name, "static");
        assert_eq!(provider.calls(), 1);
        assert_eq!(provider.last_request(), Some(request));
    }

    #[tokio::test]
    async fn test_memory_fetcher_missing_locator() {
        let fetcher = MemoryImageFetcher::new();
        let loc = StorageLocator::object("b", "k");
        assert!(fetcher.fetch(&loc).await.is_err());
        fetcher.insert(loc.clone(), b"bytes".to_vec());
        assert_eq!(fetcher.fetch(&loc).await.unwrap(), b"bytes");
    }
}
