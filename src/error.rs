//! Error taxonomy for the voice-logging pipeline.
//!
//! Errors are grouped by how they propagate:
//! - `TransportError`: external-service failures, retried when retryable
//! - `ServiceError`: transport or schema failure from a structured call
//! - `PipelineError`: terminal session failures, categorized for the UI

use std::time::Duration;

use thiserror::Error;

use crate::domain::session::Stage;

/// Transport-level failure talking to an external service.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("rate limited by upstream service")]
    RateLimited,

    #[error("upstream server error (status {status})")]
    Server { status: u16 },

    #[error("service unreachable: {0}")]
    Unreachable(String),

    #[error("authentication rejected by upstream service")]
    Auth,
}

impl TransportError {
    /// Whether a retry can plausibly succeed. Auth failures never retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Server { .. } | Self::Unreachable(_)
        )
    }
}

/// Failure of a structured completion call (classifier, extractor).
///
/// Schema failures are never retried: a malformed prompt/response pairing
/// will not fix itself on a second attempt.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("response failed schema validation: {0}")]
    Schema(String),
}

/// Storage failure from the log store collaborator.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("entry not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Nutrition-estimator failure. Callers treat both variants as
/// "nutrition pending" rather than failing the owning entry.
#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("nutrition estimation unavailable: {0}")]
    Unavailable(#[from] TransportError),

    #[error("nutrition response failed validation: {0}")]
    Schema(String),
}

/// Terminal failure of a pipeline session.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a session is already active")]
    SessionActive,

    #[error("session cancelled")]
    Cancelled,

    #[error("{stage} failed: {source}")]
    Transport {
        stage: Stage,
        source: TransportError,
    },

    #[error("{stage} response failed schema validation: {reason}")]
    SchemaValidation { stage: Stage, reason: String },

    #[error("{stage} timed out after {limit:?}")]
    StageTimeout { stage: Stage, limit: Duration },

    #[error("session timed out after {limit:?}")]
    GlobalTimeout { limit: Duration },

    #[error("all {count} actions failed to persist")]
    AllActionsFailed { count: usize },

    #[error("invalid session transition: {0}")]
    InvalidTransition(#[from] crate::domain::session::InvalidTransition),
}

impl PipelineError {
    /// Attach a stage to a structured-call failure.
    pub fn from_service(stage: Stage, err: ServiceError) -> Self {
        match err {
            ServiceError::Transport(source) => Self::Transport { stage, source },
            ServiceError::Schema(reason) => Self::SchemaValidation { stage, reason },
        }
    }

    /// Coarse category so the UI layer can offer the right recovery
    /// action (retry vs. check connectivity vs. report bug).
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::StageTimeout { .. } | Self::GlobalTimeout { .. } => ErrorCategory::Timeout,
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::SchemaValidation { .. } | Self::InvalidTransition(_) => ErrorCategory::Validation,
            Self::SessionActive => ErrorCategory::Busy,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::AllActionsFailed { .. } => ErrorCategory::Storage,
        }
    }
}

/// User-facing recovery category for a session failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Suggest retrying the recording.
    Timeout,
    /// Suggest checking connectivity.
    Transport,
    /// Suggest reporting a bug.
    Validation,
    /// A session is already in flight.
    Busy,
    /// The user cancelled the session; nothing to surface.
    Cancelled,
    /// Local persistence failed.
    Storage,
}
