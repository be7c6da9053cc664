//! Abstract collaborators at the library boundary.
//!
//! The pipeline consumes transcription, structured completion, storage,
//! and a clock as object-safe traits. Internal implementations are out of
//! scope; the contract here is binding.

pub mod http;
pub mod mock;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::entry::LogEntry;
use crate::domain::estimate::NutritionEstimate;
use crate::error::{StoreError, TransportError};

pub use http::{HttpCompletionClient, HttpTranscriptionClient};
pub use retry::{with_retry, RetryPolicy};

/// Opaque reference to captured audio. The audio buffer itself is owned by
/// the capture layer; this core never touches recording mechanics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRef(String);

impl AudioRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of transcribing one finished recording.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub duration_seconds: f64,
}

/// Speech-to-text over a finished audio buffer.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(&self, audio: &AudioRef) -> Result<Transcript, TransportError>;
}

/// A structured completion call: task name, prompt, and the JSON schema the
/// response must conform to.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Stable task label ("classify_intent", "extract_actions", ...).
    pub task: &'static str,
    pub prompt: String,
    pub schema: serde_json::Value,
}

/// Language-model-backed structured extraction under a strict output
/// schema. The service guarantees schema-conformant output or an explicit
/// failure; callers still validate by deserializing, and treat mismatches
/// as schema errors rather than guessing at fields.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<serde_json::Value, TransportError>;
}

/// The external log store. Writes to a given entry id are serialized:
/// `append` completes before any `update_nutrition` for the same id is
/// attempted.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist a new entry, returning its id.
    async fn append(&self, entry: LogEntry) -> Result<Uuid, StoreError>;

    /// Fill in the nutrition fields of an already-persisted entry.
    async fn update_nutrition(
        &self,
        id: Uuid,
        nutrition: NutritionEstimate,
    ) -> Result<(), StoreError>;
}

/// Injected time source so resolution is deterministic in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
