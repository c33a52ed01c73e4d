//! Observability tests for provider chains and audit decisions.
//!
//! These verify that the structured events operators filter on are emitted
//! with their stable `event` names.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing_test::traced_test;

use hygiene_core::obs::{
    emit_audit_evaluated, emit_chain_exhausted, emit_override_applied, emit_provider_failed,
    AuditSpan,
};
use hygiene_core::vision::fakes::{
    DelayedVisionProvider, FailingVisionProvider, StaticVisionProvider,
};
use hygiene_core::{
    AnalysisRequest, CleanlinessEvaluator, CleanlinessStatus, FallbackVisionProvider,
    ImageMetadata, VisionProvider,
};

#[traced_test]
#[test]
fn test_emit_audit_evaluated_logs_status() {
    emit_audit_evaluated("audit-1", CleanlinessStatus::NotClean, 88.5, 2);
    assert!(logs_contain("audit.evaluated"));
    assert!(logs_contain("NOT_CLEAN"));
}

#[traced_test]
#[test]
fn test_emit_override_applied_logs_reviewer() {
    emit_override_applied("audit-2", "reviewer-9", CleanlinessStatus::Clean);
    assert!(logs_contain("audit.override_applied"));
    assert!(logs_contain("reviewer-9"));
}

#[traced_test]
#[test]
fn test_emit_provider_failed_logs_error_text() {
    emit_provider_failed("fallback(a->b)", "a", 0, &"connection reset");
    assert!(logs_contain("vision.attempt_failed"));
    assert!(logs_contain("connection reset"));
}

#[traced_test]
#[test]
fn test_emit_chain_exhausted() {
    emit_chain_exhausted("fallback(a->b)", 2);
    assert!(logs_contain("vision.chain_exhausted"));
}

#[traced_test]
#[test]
fn test_audit_span_enter_creates_span() {
    let span = AuditSpan::enter("corr-123", "dealer-001");
    tracing::info!("inside audit span");
    drop(span);
    assert!(logs_contain("corr-123"));
}

#[tokio::test]
#[traced_test]
async fn test_fallback_emits_attempt_and_success_events() {
    let chain = FallbackVisionProvider::from_pair(
        Arc::new(FailingVisionProvider::new("primary", "throttled")),
        Arc::new(StaticVisionProvider::empty("secondary")),
    );
    chain
        .analyze(b"img", &AnalysisRequest::default())
        .await
        .unwrap();

    assert!(logs_contain("vision.attempt"));
    assert!(logs_contain("vision.attempt_failed"));
    assert!(logs_contain("vision.fallback_succeeded"));
    assert!(!logs_contain("vision.chain_exhausted"));

    chain.stats().flush(&chain.provider_name());
    assert!(logs_contain("vision.chain_stats"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_deadline_emits_timed_out_event() {
    let chain = FallbackVisionProvider::from_pair(
        Arc::new(DelayedVisionProvider::new(
            StaticVisionProvider::empty("slow"),
            Duration::from_secs(30),
        )),
        Arc::new(StaticVisionProvider::empty("backup")),
    )
    .with_deadline(Duration::from_secs(5));

    chain
        .analyze(b"img", &AnalysisRequest::default())
        .await
        .unwrap_err();

    assert!(logs_contain("vision.chain_timed_out"));
    assert!(logs_contain("timeout_ms=5000"));
    assert!(!logs_contain("vision.chain_exhausted"));
}

#[traced_test]
#[test]
fn test_evaluator_emits_evaluated_event() {
    let evaluator = CleanlinessEvaluator::default();
    let meta = ImageMetadata::new("dealer-7", "lobby", "user-1", "s3://b/k.jpg", 1024, Utc::now());
    let result = evaluator.evaluate(
        &hygiene_core::VisionAnalysisResult::new(vec![], "static", "1"),
        meta,
        None,
    );
    assert!(logs_contain("audit.evaluated"));
    assert!(logs_contain(&result.audit_id().to_string()));
}
