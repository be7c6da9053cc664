//! Session orchestration: the transcribe, classify, extract, execute
//! sequence under per-stage and session-wide timeouts.
//!
//! One session runs at a time. The pipeline owns a published state slot
//! that observers poll; the session value itself stays local to `run`, so
//! a timed-out or cancelled run can never corrupt a later one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::domain::session::{PipelineSession, SessionState, Stage};
use crate::error::{PipelineError, ServiceError};
use crate::extract::{ActionExtractor, IntentClassifier, MealPairingPolicy};
use crate::nutrition::NutritionEstimator;
use crate::pipeline::executor::ActionExecutor;
use crate::services::{AudioRef, Clock, CompletionService, LogStore, TranscriptionService};
use crate::timeres::TimeResolver;

/// The single in-flight session: its id, last published state, and the
/// flag its `run` future polls between stages.
struct ActiveSession {
    id: Uuid,
    state: SessionState,
    cancelled: Arc<AtomicBool>,
}

/// Published view of the in-flight session. `None` means idle.
type Slot = Arc<Mutex<Option<ActiveSession>>>;

/// Outcome of a completed session: the final session record plus the
/// nutrition enrichment tasks still running in the background.
#[derive(Debug)]
pub struct SessionReport {
    pub session: PipelineSession,
    pub enrichments: Vec<JoinHandle<()>>,
}

/// The voice-logging pipeline. Construct once, call [`run`] per finished
/// recording.
///
/// [`run`]: VoicePipeline::run
pub struct VoicePipeline {
    transcription: Arc<dyn TranscriptionService>,
    classifier: IntentClassifier,
    extractor: ActionExtractor,
    executor: ActionExecutor,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    current: Slot,
}

impl VoicePipeline {
    pub fn new(
        transcription: Arc<dyn TranscriptionService>,
        completion: Arc<dyn CompletionService>,
        store: Arc<dyn LogStore>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        let resolver = TimeResolver::new(
            config.meal_times.clone(),
            config.max_past(),
            config.max_future(),
        );
        let pairing = MealPairingPolicy::new(config.meal_pairs.clone());
        let estimator = Arc::new(NutritionEstimator::new(Arc::clone(&completion)));

        Self {
            transcription,
            classifier: IntentClassifier::new(Arc::clone(&completion)),
            extractor: ActionExtractor::new(completion, resolver, pairing),
            executor: ActionExecutor::new(store, estimator),
            clock,
            config,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Last published state of the in-flight session, `Idle` when none.
    pub fn state(&self) -> SessionState {
        self.current
            .lock()
            .expect("session slot lock")
            .as_ref()
            .map(|active| active.state)
            .unwrap_or(SessionState::Idle)
    }

    /// Cancel the in-flight session, if any. Returns whether a session was
    /// actually cleared. The flag stops the cancelled run at its next
    /// stage boundary, before any output is persisted or returned; its
    /// later slot writes are no-ops because its id no longer matches.
    pub fn cancel(&self) -> bool {
        match self.current.lock().expect("session slot lock").take() {
            Some(active) => {
                active.cancelled.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Run one recording through the full pipeline.
    ///
    /// Rejects with `SessionActive` while another session holds the slot,
    /// including during the Completed grace window. On success the
    /// returned report carries the enrichment handles; callers that need
    /// nutrition to settle (tests, shutdown) can await them.
    #[instrument(skip_all)]
    pub async fn run(&self, audio: AudioRef) -> Result<SessionReport, PipelineError> {
        let mut session = PipelineSession::begin(self.clock.now());
        let cancelled = self.claim_slot(session.id)?;
        let mut guard = ClearOnDrop {
            slot: Arc::clone(&self.current),
            id: session.id,
            armed: true,
        };

        info!(session_id = %session.id, "session started");

        let outcome = timeout(
            self.config.global_timeout(),
            self.drive(&mut session, audio, &cancelled),
        )
        .await;
        match outcome {
            Ok(Ok(enrichments)) => {
                // A cancel that landed after the last stage boundary still
                // discards the session's outcome.
                if cancelled.load(Ordering::SeqCst) {
                    return Err(self.discard(&mut session));
                }
                session.transition(SessionState::Completed)?;
                self.publish(session.id, SessionState::Completed);
                guard.armed = false;
                self.schedule_reset(session.id);
                info!(
                    session_id = %session.id,
                    executed = session.executed_actions.len(),
                    failed = session.failed_actions.len(),
                    "session completed"
                );
                Ok(SessionReport {
                    session,
                    enrichments,
                })
            }
            Ok(Err(PipelineError::Cancelled)) => Err(self.discard(&mut session)),
            Ok(Err(err)) => {
                self.fail(&mut session, &err);
                Err(err)
            }
            Err(_elapsed) => {
                let err = PipelineError::GlobalTimeout {
                    limit: self.config.global_timeout(),
                };
                self.fail(&mut session, &err);
                Err(err)
            }
        }
    }

    /// The staged sequence, without the global timeout wrapper.
    /// Returns the enrichment handles from execution.
    ///
    /// The cancellation flag is polled at every stage boundary so a
    /// cancelled session stops before its next stage runs, and in
    /// particular before anything is persisted.
    async fn drive(
        &self,
        session: &mut PipelineSession,
        audio: AudioRef,
        cancelled: &AtomicBool,
    ) -> Result<Vec<JoinHandle<()>>, PipelineError> {
        check_cancelled(cancelled)?;
        let transcript = self
            .staged(Stage::Transcribing, self.transcription.transcribe(&audio))
            .await?;
        info!(
            session_id = %session.id,
            duration_seconds = transcript.duration_seconds,
            "transcription complete"
        );
        session.transcript = Some(transcript.text.clone());
        check_cancelled(cancelled)?;
        self.advance(session, SessionState::Classifying)?;

        let has_action = self
            .staged_service(Stage::Classifying, self.classifier.classify(&transcript.text))
            .await?;
        session.has_action = Some(has_action);
        if !has_action {
            info!(session_id = %session.id, "no loggable action detected");
            return Ok(Vec::new());
        }
        check_cancelled(cancelled)?;
        self.advance(session, SessionState::Extracting)?;

        let now = self.clock.now();
        let actions = self
            .staged_service(Stage::Extracting, self.extractor.extract(&transcript.text, now))
            .await?;
        session.extracted_actions = actions.clone();
        if actions.is_empty() {
            warn!(session_id = %session.id, "classifier said yes but extraction found nothing");
            return Ok(Vec::new());
        }
        check_cancelled(cancelled)?;
        self.advance(session, SessionState::Executing)?;

        // Execution runs local persistence per action; it gets no stage
        // timeout of its own and stays bounded by the global timeout.
        let result = self.executor.execute(actions).await;
        if result.all_failed() {
            return Err(PipelineError::AllActionsFailed {
                count: result.failed.len(),
            });
        }
        session.executed_actions = result.succeeded;
        session.failed_actions = result.failed;
        Ok(result.enrichments)
    }

    /// Wrap a transport-returning stage call in the per-stage timeout.
    async fn staged<T>(
        &self,
        stage: Stage,
        call: impl std::future::Future<Output = Result<T, crate::error::TransportError>>,
    ) -> Result<T, PipelineError> {
        match timeout(self.config.stage_timeout(), call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(PipelineError::Transport { stage, source }),
            Err(_elapsed) => Err(PipelineError::StageTimeout {
                stage,
                limit: self.config.stage_timeout(),
            }),
        }
    }

    /// As `staged`, for calls that already distinguish schema failures.
    async fn staged_service<T>(
        &self,
        stage: Stage,
        call: impl std::future::Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, PipelineError> {
        match timeout(self.config.stage_timeout(), call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(PipelineError::from_service(stage, err)),
            Err(_elapsed) => Err(PipelineError::StageTimeout {
                stage,
                limit: self.config.stage_timeout(),
            }),
        }
    }

    fn advance(
        &self,
        session: &mut PipelineSession,
        to: SessionState,
    ) -> Result<(), PipelineError> {
        session.transition(to)?;
        self.publish(session.id, to);
        Ok(())
    }

    fn fail(&self, session: &mut PipelineSession, err: &PipelineError) {
        // Failed is reachable from every active stage, so this cannot
        // panic; a session already terminal keeps its state.
        let _ = session.transition(SessionState::Failed);
        session.error = Some(err.to_string());
        error!(session_id = %session.id, error = %err, "session failed");
    }

    /// Wind down a cancelled session. Its slot is already released by
    /// `cancel`, so the only work left is the session record itself.
    fn discard(&self, session: &mut PipelineSession) -> PipelineError {
        let err = PipelineError::Cancelled;
        let _ = session.transition(SessionState::Failed);
        session.error = Some(err.to_string());
        info!(session_id = %session.id, "session cancelled");
        err
    }

    fn claim_slot(&self, id: Uuid) -> Result<Arc<AtomicBool>, PipelineError> {
        let mut slot = self.current.lock().expect("session slot lock");
        if slot.is_some() {
            return Err(PipelineError::SessionActive);
        }
        let cancelled = Arc::new(AtomicBool::new(false));
        *slot = Some(ActiveSession {
            id,
            state: SessionState::Transcribing,
            cancelled: Arc::clone(&cancelled),
        });
        Ok(cancelled)
    }

    /// Publish a state for the session, only while it still owns the slot.
    fn publish(&self, id: Uuid, state: SessionState) {
        let mut slot = self.current.lock().expect("session slot lock");
        if let Some(active) = slot.as_mut() {
            if active.id == id {
                active.state = state;
            }
        }
    }

    /// Hold Completed for the grace window, then release the slot. New
    /// sessions are rejected until the reset lands.
    fn schedule_reset(&self, id: Uuid) {
        let slot = Arc::clone(&self.current);
        let grace = self.config.completed_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut slot = slot.lock().expect("session slot lock");
            if slot.as_ref().is_some_and(|active| active.id == id) {
                *slot = None;
            }
        });
    }
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<(), PipelineError> {
    if cancelled.load(Ordering::SeqCst) {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Releases the session slot when a run fails or is dropped mid-flight.
/// Disarmed on the success path, where the grace timer owns the release.
struct ClearOnDrop {
    slot: Slot,
    id: Uuid,
    armed: bool,
}

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = self.slot.lock().expect("session slot lock");
        if slot.as_ref().is_some_and(|active| active.id == self.id) {
            *slot = None;
        }
    }
}
