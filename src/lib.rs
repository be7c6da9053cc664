//! nestlog - Voice-command health logging pipeline
//!
//! Turns a finished voice recording into persisted, structured log
//! entries: transcription, intent classification, action extraction,
//! execution, and background nutrition enrichment.
//!
//! # Architecture
//!
//! The pipeline is a staged state machine:
//! - One session runs at a time, tracked through an explicit
//!   transition table
//! - Each remote stage runs under a per-stage timeout, the whole
//!   session under a global one
//! - Entry shells persist synchronously; nutrition estimation runs in
//!   the background against the persisted id
//!
//! # Modules
//!
//! - `pipeline`: Session orchestration and action execution
//! - `extract`: Intent classification and action extraction
//! - `nutrition`: Component-based nutrition estimation
//! - `timeres`: Spoken-time to instant resolution
//! - `domain`: Data structures (VoiceAction, LogEntry, PipelineSession)
//! - `services`: Collaborator traits plus HTTP and mock implementations
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use nestlog::config::PipelineConfig;
//! use nestlog::pipeline::VoicePipeline;
//! use nestlog::services::{AudioRef, SystemClock};
//! use nestlog::services::http::{HttpCompletionClient, HttpTranscriptionClient};
//! use nestlog::services::mock::MemoryLogStore;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let pipeline = VoicePipeline::new(
//!     Arc::new(HttpTranscriptionClient::from_env()?),
//!     Arc::new(HttpCompletionClient::from_env()?),
//!     Arc::new(MemoryLogStore::new()),
//!     Arc::new(SystemClock),
//!     config,
//! );
//! let report = pipeline.run(AudioRef::new("memo-2025-03-10.m4a")).await?;
//! println!("logged {} entries", report.session.executed_actions.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod nutrition;
pub mod pipeline;
pub mod services;
pub mod timeres;

// Re-export main types at crate root for convenience
pub use config::PipelineConfig;
pub use domain::{
    ActionDetails, ActionType, LogEntry, NutritionConfidence, NutritionEstimate, PipelineSession,
    SessionState, VoiceAction,
};
pub use error::{ErrorCategory, PipelineError};
pub use pipeline::{SessionReport, VoicePipeline};
pub use services::{AudioRef, Clock, CompletionService, LogStore, TranscriptionService};
