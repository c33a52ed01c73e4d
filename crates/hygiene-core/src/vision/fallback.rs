//! Ordered provider chain with try-next-on-failure semantics.
//!
//! The chain is fixed at construction. Each call walks it from the primary,
//! invoking providers one at a time and returning the first success
//! unmodified. Every failure is kept, in chain order, so an exhausted chain
//! reports which combination of backends is degraded. Providers are never
//! queried concurrently and never called twice within one call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::obs;

use super::error::{ProviderFailure, VisionError, VisionResult};
use super::provider::{AnalysisRequest, StorageLocator, VisionAnalysisResult, VisionProvider};

/// What a single chain call asks each provider to do.
#[derive(Debug, Clone, Copy)]
enum Operation<'a> {
    Bytes(&'a [u8]),
    Reference(&'a StorageLocator),
}

impl Operation<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "analyze",
            Self::Reference(_) => "analyze_by_reference",
        }
    }

    async fn dispatch(
        &self,
        provider: &dyn VisionProvider,
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        match self {
            Self::Bytes(image) => provider.analyze(image, request).await,
            Self::Reference(locator) => provider.analyze_by_reference(locator, request).await,
        }
    }
}

/// Lightweight per-chain counters. No allocations, no locking.
#[derive(Debug, Default)]
pub struct ChainStats {
    calls: AtomicU64,
    attempts: AtomicU64,
    provider_failures: AtomicU64,
    fallback_successes: AtomicU64,
    exhausted: AtomicU64,
    timed_out: AtomicU64,
}

impl ChainStats {
    /// Chain calls started.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Individual provider invocations.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn provider_failures(&self) -> u64 {
        self.provider_failures.load(Ordering::Relaxed)
    }

    /// Calls answered by a provider other than the primary.
    pub fn fallback_successes(&self) -> u64 {
        self.fallback_successes.load(Ordering::Relaxed)
    }

    /// Calls where every provider failed.
    pub fn exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }

    /// Calls cut off by the chain deadline.
    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    /// Emit all counter values as a single `info!` event.
    pub fn flush(&self, chain: &str) {
        tracing::info!(
            metric = "vision.chain_stats",
            chain = %chain,
            calls = self.calls(),
            attempts = self.attempts(),
            provider_failures = self.provider_failures(),
            fallback_successes = self.fallback_successes(),
            exhausted = self.exhausted(),
            timed_out = self.timed_out(),
        );
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A [`VisionProvider`] that delegates to an ordered chain of providers.
///
/// Position 0 is the primary and is always preferred when it works. The
/// composite itself implements [`VisionProvider`], so chains nest.
pub struct FallbackVisionProvider {
    chain: Vec<Arc<dyn VisionProvider>>,
    name: String,
    deadline: Option<Duration>,
    stats: ChainStats,
}

impl FallbackVisionProvider {
    /// Build a chain. Fails with [`VisionError::EmptyChain`] if `chain` is empty.
    pub fn new(chain: Vec<Arc<dyn VisionProvider>>) -> VisionResult<Self> {
        if chain.is_empty() {
            return Err(VisionError::EmptyChain);
        }
        Ok(Self::assemble(chain))
    }

    /// Two-element chain: primary, then fallback.
    pub fn from_pair(primary: Arc<dyn VisionProvider>, fallback: Arc<dyn VisionProvider>) -> Self {
        Self::assemble(vec![primary, fallback])
    }

    fn assemble(chain: Vec<Arc<dyn VisionProvider>>) -> Self {
        let name = format!(
            "fallback({})",
            chain
                .iter()
                .map(|p| p.provider_name())
                .collect::<Vec<_>>()
                .join("->")
        );
        tracing::info!(chain = %name, providers = chain.len(), "initialized vision provider chain");
        Self {
            chain,
            name,
            deadline: None,
            stats: ChainStats::default(),
        }
    }

    /// Bound every call, across all attempts, by `deadline`.
    ///
    /// When it elapses the in-flight provider call is dropped and the whole
    /// call fails with [`VisionError::Timeout`]; no further provider is tried.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn providers(&self) -> &[Arc<dyn VisionProvider>] {
        &self.chain
    }

    pub fn stats(&self) -> &ChainStats {
        &self.stats
    }

    async fn run(
        &self,
        operation: Operation<'_>,
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.walk(operation, request))
                .await
                .map_err(|_| {
                    let timeout_ms = deadline.as_millis() as u64;
                    ChainStats::bump(&self.stats.timed_out);
                    obs::emit_chain_timed_out(&self.name, timeout_ms);
                    VisionError::Timeout { timeout_ms }
                })?,
            None => self.walk(operation, request).await,
        }
    }

    async fn walk(
        &self,
        operation: Operation<'_>,
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        ChainStats::bump(&self.stats.calls);
        let mut failures: Vec<ProviderFailure> = Vec::with_capacity(self.chain.len());

        for (position, provider) in self.chain.iter().enumerate() {
            let provider_name = provider.provider_name();
            obs::emit_provider_attempt(&self.name, &provider_name, position, operation.name());
            ChainStats::bump(&self.stats.attempts);

            match operation.dispatch(provider.as_ref(), request).await {
                Ok(result) => {
                    if position > 0 {
                        ChainStats::bump(&self.stats.fallback_successes);
                        obs::emit_fallback_succeeded(&self.name, &provider_name, position);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    ChainStats::bump(&self.stats.provider_failures);
                    obs::emit_provider_failed(&self.name, &provider_name, position, &error);
                    failures.push(ProviderFailure {
                        provider: provider_name,
                        error,
                    });
                }
            }
        }

        ChainStats::bump(&self.stats.exhausted);
        obs::emit_chain_exhausted(&self.name, failures.len());
        Err(VisionError::AllProvidersFailed { attempts: failures })
    }
}

#[async_trait]
impl VisionProvider for FallbackVisionProvider {
    async fn analyze(
        &self,
        image: &[u8],
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        self.run(Operation::Bytes(image), request).await
    }

    async fn analyze_by_reference(
        &self,
        locator: &StorageLocator,
        request: &AnalysisRequest,
    ) -> VisionResult<VisionAnalysisResult> {
        self.run(Operation::Reference(locator), request).await
    }

    /// Encodes the whole configured topology, e.g. `fallback(primary->secondary)`.
    fn provider_name(&self) -> String {
        self.name.clone()
    }

    /// Static label taken from the primary. The per-call record is the
    /// `model_version` on the returned [`VisionAnalysisResult`].
    fn model_version(&self) -> String {
        format!("primary:{}", self.chain[0].model_version())
    }
}
