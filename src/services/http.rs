//! HTTP reference adapters for the transcription and completion services.
//!
//! Endpoint: POST, JSON body, bearer-token auth. Status codes map onto the
//! transport taxonomy so the shared retry policy can tell transient
//! failures from permanent ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::retry::{with_retry, RetryPolicy};
use super::{AudioRef, CompletionRequest, CompletionService, Transcript, TranscriptionService};
use crate::error::TransportError;

/// Structured-completion client against a schema-enforcing endpoint.
pub struct HttpCompletionClient {
    endpoint: String,
    token: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    task: &'a str,
    prompt: &'a str,
    schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    output: serde_json::Value,
}

impl HttpCompletionClient {
    pub fn new(endpoint: String, token: String, retry: RetryPolicy) -> Self {
        Self {
            endpoint,
            token,
            retry,
            client: reqwest::Client::new(),
        }
    }

    /// Build a client from `NESTLOG_COMPLETION_ENDPOINT` / `NESTLOG_API_TOKEN`.
    pub fn from_env() -> Result<Self, TransportError> {
        let endpoint = std::env::var("NESTLOG_COMPLETION_ENDPOINT")
            .map_err(|_| TransportError::Unreachable("NESTLOG_COMPLETION_ENDPOINT not set".into()))?;
        let token = std::env::var("NESTLOG_API_TOKEN")
            .map_err(|_| TransportError::Auth)?;
        Ok(Self::new(endpoint, token, RetryPolicy::default()))
    }
}

#[async_trait]
impl CompletionService for HttpCompletionClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<serde_json::Value, TransportError> {
        let body = CompletionBody {
            task: request.task,
            prompt: &request.prompt,
            schema: &request.schema,
        };

        with_retry(&self.retry, request.task, |attempt| {
            debug!(task = request.task, attempt, "completion call");
            let call = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.token)
                .json(&body)
                .send();
            async move {
                let response = call.await.map_err(|e| {
                    TransportError::Unreachable(e.to_string())
                })?;
                let response = check_status(response)?;
                let parsed: CompletionResponse = response
                    .json()
                    .await
                    .map_err(|e| TransportError::Unreachable(e.to_string()))?;
                Ok(parsed.output)
            }
        })
        .await
    }
}

/// Transcription client posting an audio reference.
pub struct HttpTranscriptionClient {
    endpoint: String,
    token: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct TranscriptionBody<'a> {
    audio: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    duration_seconds: f64,
}

impl HttpTranscriptionClient {
    pub fn new(endpoint: String, token: String, retry: RetryPolicy) -> Self {
        Self {
            endpoint,
            token,
            retry,
            client: reqwest::Client::new(),
        }
    }

    /// Build a client from `NESTLOG_TRANSCRIPTION_ENDPOINT` / `NESTLOG_API_TOKEN`.
    pub fn from_env() -> Result<Self, TransportError> {
        let endpoint = std::env::var("NESTLOG_TRANSCRIPTION_ENDPOINT").map_err(|_| {
            TransportError::Unreachable("NESTLOG_TRANSCRIPTION_ENDPOINT not set".into())
        })?;
        let token = std::env::var("NESTLOG_API_TOKEN").map_err(|_| TransportError::Auth)?;
        Ok(Self::new(endpoint, token, RetryPolicy::default()))
    }
}

#[async_trait]
impl TranscriptionService for HttpTranscriptionClient {
    async fn transcribe(&self, audio: &AudioRef) -> Result<Transcript, TransportError> {
        with_retry(&self.retry, "transcribe", |attempt| {
            debug!(attempt, "transcription call");
            let call = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.token)
                .json(&TranscriptionBody {
                    audio: audio.as_str(),
                })
                .send();
            async move {
                let response = call.await.map_err(|e| {
                    TransportError::Unreachable(e.to_string())
                })?;
                let response = check_status(response)?;
                let parsed: TranscriptionResponse = response
                    .json()
                    .await
                    .map_err(|e| TransportError::Unreachable(e.to_string()))?;
                Ok(Transcript {
                    text: parsed.text.trim().to_string(),
                    duration_seconds: parsed.duration_seconds,
                })
            }
        })
        .await
    }
}

/// Map HTTP status classes onto the transport taxonomy.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status.as_u16() == 429 {
        Err(TransportError::RateLimited)
    } else if status.as_u16() == 401 || status.as_u16() == 403 {
        Err(TransportError::Auth)
    } else if status.is_server_error() {
        Err(TransportError::Server {
            status: status.as_u16(),
        })
    } else {
        Err(TransportError::Unreachable(format!(
            "unexpected status {status}"
        )))
    }
}
