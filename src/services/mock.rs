//! Scripted collaborators for development and testing.
//!
//! These back the integration tests and double as reference
//! implementations of the service contracts: `MemoryLogStore` in
//! particular shows the append-before-update discipline the pipeline
//! relies on.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use super::{
    AudioRef, Clock, CompletionRequest, CompletionService, LogStore, Transcript,
    TranscriptionService,
};
use crate::domain::entry::LogEntry;
use crate::domain::estimate::NutritionEstimate;
use crate::error::{StoreError, TransportError};

/// Clock pinned to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Transcription that always returns the same text.
pub struct StaticTranscriber {
    text: String,
}

impl StaticTranscriber {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl TranscriptionService for StaticTranscriber {
    async fn transcribe(&self, _audio: &AudioRef) -> Result<Transcript, TransportError> {
        Ok(Transcript {
            text: self.text.clone(),
            duration_seconds: 3.0,
        })
    }
}

/// Transcription that never completes. Exercises timeout paths.
pub struct PendingTranscriber;

#[async_trait]
impl TranscriptionService for PendingTranscriber {
    async fn transcribe(&self, _audio: &AudioRef) -> Result<Transcript, TransportError> {
        std::future::pending::<()>().await;
        unreachable!("pending future never resolves")
    }
}

/// Transcription that blocks until released through its gate. Exercises
/// cancellation landing while a stage call is in flight.
pub struct GatedTranscriber {
    text: String,
    gate: Arc<Notify>,
}

impl GatedTranscriber {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            gate: Arc::new(Notify::new()),
        }
    }

    /// Handle that releases a pending `transcribe` call.
    pub fn gate(&self) -> Arc<Notify> {
        Arc::clone(&self.gate)
    }
}

#[async_trait]
impl TranscriptionService for GatedTranscriber {
    async fn transcribe(&self, _audio: &AudioRef) -> Result<Transcript, TransportError> {
        self.gate.notified().await;
        Ok(Transcript {
            text: self.text.clone(),
            duration_seconds: 3.0,
        })
    }
}

/// Transcription that fails with a fixed transport error.
pub struct FailingTranscriber(pub TransportError);

#[async_trait]
impl TranscriptionService for FailingTranscriber {
    async fn transcribe(&self, _audio: &AudioRef) -> Result<Transcript, TransportError> {
        Err(self.0.clone())
    }
}

/// Completion service that pops scripted responses in order and records
/// the task name of every call.
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<serde_json::Value, TransportError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(responses: Vec<Result<serde_json::Value, TransportError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Task names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<serde_json::Value, TransportError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(request.task.to_string());
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Unreachable("script exhausted".into())))
    }
}

/// In-memory log store. Updates against unknown ids are `NotFound`, which
/// is exactly what an enrichment racing a failed append would see.
#[derive(Default)]
pub struct MemoryLogStore {
    entries: Mutex<HashMap<Uuid, LogEntry>>,
    order: Mutex<Vec<Uuid>>,
    /// When set, appends whose food item contains this substring fail.
    fail_matching: Mutex<Option<String>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make appends fail for entries whose food item contains `needle`.
    pub fn fail_items_matching(&self, needle: impl Into<String>) {
        *self.fail_matching.lock().expect("fail lock") = Some(needle.into());
    }

    /// Entries in append order.
    pub fn entries(&self) -> Vec<LogEntry> {
        let entries = self.entries.lock().expect("entries lock");
        self.order
            .lock()
            .expect("order lock")
            .iter()
            .filter_map(|id| entries.get(id).cloned())
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<LogEntry> {
        self.entries.lock().expect("entries lock").get(&id).cloned()
    }
}

fn entry_item(entry: &LogEntry) -> Option<&str> {
    match &entry.details {
        crate::domain::action::ActionDetails::Food { item, .. } => Some(item.as_str()),
        _ => None,
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, entry: LogEntry) -> Result<Uuid, StoreError> {
        if let Some(needle) = self.fail_matching.lock().expect("fail lock").as_deref() {
            if entry_item(&entry).is_some_and(|item| item.contains(needle)) {
                return Err(StoreError::Backend(format!(
                    "injected failure for '{needle}'"
                )));
            }
        }

        let id = entry.id;
        self.entries.lock().expect("entries lock").insert(id, entry);
        self.order.lock().expect("order lock").push(id);
        Ok(id)
    }

    async fn update_nutrition(
        &self,
        id: Uuid,
        nutrition: NutritionEstimate,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("entries lock");
        let entry = entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        entry.nutrition = Some(nutrition);
        Ok(())
    }
}
