//! Structured observability hooks for provider chains and audit decisions.
//!
//! This module provides:
//! - Audit-scoped tracing spans via the `AuditSpan` RAII guard
//! - Emission functions for provider attempts, fallbacks, chain exhaustion
//!   or timeout, evaluations and manual overrides
//!
//! Events are emitted at `info!` (failures at `warn!`/`error!`) so operators
//! can filter on the `event` field regardless of formatter.

use tracing::{error, info, warn};

use crate::domain::CleanlinessStatus;

/// RAII guard that enters an audit-scoped span for the duration of a request.
///
/// # Example
///
/// ```ignore
/// let _span = AuditSpan::enter("2f1c...", "dealer-001");
/// // every event below carries correlation_id and dealer_id
/// ```
pub struct AuditSpan {
    _span: tracing::span::EnteredSpan,
}

impl AuditSpan {
    pub fn enter(correlation_id: &str, dealer_id: &str) -> Self {
        Self {
            _span: audit_span(correlation_id, dealer_id).entered(),
        }
    }
}

/// The audit-scoped span itself, for instrumenting futures.
///
/// An entered guard must not be held across `.await`; async callers attach
/// this span with `tracing::Instrument` instead of using [`AuditSpan`].
pub fn audit_span(correlation_id: &str, dealer_id: &str) -> tracing::Span {
    tracing::info_span!(
        "hygiene.audit",
        correlation_id = %correlation_id,
        dealer_id = %dealer_id,
    )
}

/// Emit event: a chain is about to call the provider at `position`.
pub fn emit_provider_attempt(chain: &str, provider: &str, position: usize, operation: &str) {
    info!(
        event = "vision.attempt",
        chain = %chain,
        provider = %provider,
        position = position,
        operation = %operation,
    );
}

/// Emit event: one provider in a chain failed (warning level).
pub fn emit_provider_failed(chain: &str, provider: &str, position: usize, err: &dyn std::fmt::Display) {
    warn!(
        event = "vision.attempt_failed",
        chain = %chain,
        provider = %provider,
        position = position,
        error = %err,
    );
}

/// Emit event: a provider after the primary answered.
pub fn emit_fallback_succeeded(chain: &str, provider: &str, position: usize) {
    info!(
        event = "vision.fallback_succeeded",
        chain = %chain,
        provider = %provider,
        position = position,
    );
}

/// Emit event: every provider in the chain failed (error level).
pub fn emit_chain_exhausted(chain: &str, attempts: usize) {
    error!(event = "vision.chain_exhausted", chain = %chain, attempts = attempts);
}

/// Emit event: the chain deadline elapsed before any provider answered.
pub fn emit_chain_timed_out(chain: &str, timeout_ms: u64) {
    error!(event = "vision.chain_timed_out", chain = %chain, timeout_ms = timeout_ms);
}

/// Emit event: evaluator produced a verdict.
pub fn emit_audit_evaluated(
    audit_id: &str,
    status: CleanlinessStatus,
    confidence: f64,
    negative_labels: usize,
) {
    info!(
        event = "audit.evaluated",
        audit_id = %audit_id,
        status = %status,
        confidence = confidence,
        negative_labels = negative_labels,
    );
}

/// Emit event: a reviewer finalized an audit.
pub fn emit_override_applied(audit_id: &str, reviewer: &str, status: CleanlinessStatus) {
    info!(
        event = "audit.override_applied",
        audit_id = %audit_id,
        reviewer = %reviewer,
        status = %status,
    );
}
