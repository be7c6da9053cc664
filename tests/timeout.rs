//! Timeout and failure-path tests, on a paused clock so stage and
//! session limits fire without wall-clock waiting.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use nestlog::config::PipelineConfig;
use nestlog::domain::SessionState;
use nestlog::error::{ErrorCategory, PipelineError, TransportError};
use nestlog::pipeline::VoicePipeline;
use nestlog::services::mock::{
    FailingTranscriber, FixedClock, MemoryLogStore, PendingTranscriber, ScriptedCompletion,
};
use nestlog::services::{AudioRef, TranscriptionService};

/// Route pipeline logs through the test harness, filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pipeline_with(
    transcriber: impl TranscriptionService + 'static,
    config: PipelineConfig,
) -> VoicePipeline {
    init_tracing();
    VoicePipeline::new(
        Arc::new(transcriber),
        Arc::new(ScriptedCompletion::new(vec![])),
        Arc::new(MemoryLogStore::new()),
        Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2025, 3, 11, 14, 0, 0).unwrap(),
        )),
        config,
    )
}

#[tokio::test(start_paused = true)]
async fn hung_transcription_hits_the_stage_timeout() {
    let config = PipelineConfig {
        stage_timeout_secs: 5,
        global_timeout_secs: 60,
        ..PipelineConfig::default()
    };
    let pipeline = pipeline_with(PendingTranscriber, config);

    let err = pipeline.run(AudioRef::new("memo")).await.unwrap_err();
    match err {
        PipelineError::StageTimeout { ref stage, limit } => {
            assert_eq!(stage.to_string(), "transcription");
            assert_eq!(limit, Duration::from_secs(5));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.category(), ErrorCategory::Timeout);
    assert_eq!(pipeline.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn global_timeout_caps_the_whole_session() {
    // Per-stage limit looser than the session limit, so the global one
    // fires first.
    let config = PipelineConfig {
        stage_timeout_secs: 60,
        global_timeout_secs: 10,
        ..PipelineConfig::default()
    };
    let pipeline = pipeline_with(PendingTranscriber, config);

    let err = pipeline.run(AudioRef::new("memo")).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::GlobalTimeout { limit } if limit == Duration::from_secs(10)
    ));
    assert_eq!(pipeline.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_carries_its_stage() {
    let pipeline = pipeline_with(
        FailingTranscriber(TransportError::Auth),
        PipelineConfig::default(),
    );

    let err = pipeline.run(AudioRef::new("memo")).await.unwrap_err();
    match err {
        PipelineError::Transport { ref stage, ref source } => {
            assert_eq!(stage.to_string(), "transcription");
            assert!(matches!(source, TransportError::Auth));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.category(), ErrorCategory::Transport);
}

#[tokio::test(start_paused = true)]
async fn failed_session_has_no_grace_window() {
    let pipeline = pipeline_with(
        FailingTranscriber(TransportError::Auth),
        PipelineConfig::default(),
    );

    pipeline.run(AudioRef::new("take-1")).await.unwrap_err();
    assert_eq!(pipeline.state(), SessionState::Idle);

    // A retry is admitted immediately; it fails on transport again, not
    // on a busy slot.
    let err = pipeline.run(AudioRef::new("take-2")).await.unwrap_err();
    assert!(!matches!(err, PipelineError::SessionActive));
}
