//! First-pass intent gate.
//!
//! A cheap boolean check so irrelevant speech never pays for full
//! extraction. A false positive costs one wasted extraction call; a false
//! negative silently drops a user's log, so the prompt biases toward
//! "yes" whenever in doubt.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::ServiceError;
use crate::services::{CompletionRequest, CompletionService};

/// Decides whether a transcript contains any loggable action at all.
pub struct IntentClassifier {
    completion: Arc<dyn CompletionService>,
}

#[derive(Debug, Deserialize)]
struct Classification {
    has_action: bool,
}

impl IntentClassifier {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Returns whether the transcript contains a loggable action. Blank
    /// transcripts short-circuit to `false` without a service call.
    #[instrument(skip(self, transcript))]
    pub async fn classify(&self, transcript: &str) -> Result<bool, ServiceError> {
        if transcript.trim().is_empty() {
            debug!("blank transcript, skipping classification call");
            return Ok(false);
        }

        let response = self
            .completion
            .complete(CompletionRequest {
                task: "classify_intent",
                prompt: format!(
                    "Does the transcript below contain anything the speaker \
                     wants logged: food or drink consumed, water intake, a \
                     symptom, or a vitamin/supplement? Answer yes if you are \
                     unsure; missing a real entry is worse than a wasted \
                     follow-up.\n\nTranscript: {transcript}"
                ),
                schema: json!({
                    "type": "object",
                    "required": ["has_action"],
                    "properties": { "has_action": { "type": "boolean" } }
                }),
            })
            .await?;

        let classification: Classification = serde_json::from_value(response)
            .map_err(|e| ServiceError::Schema(e.to_string()))?;

        debug!(has_action = classification.has_action, "transcript classified");
        Ok(classification.has_action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::services::mock::ScriptedCompletion;

    #[tokio::test]
    async fn blank_transcript_short_circuits_without_a_call() {
        let completion = Arc::new(ScriptedCompletion::new(vec![]));
        let classifier = IntentClassifier::new(completion.clone());

        assert!(!classifier.classify("   ").await.unwrap());
        assert!(completion.calls().is_empty());
    }

    #[tokio::test]
    async fn verdicts_parse() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Ok(json!({ "has_action": true })),
            Ok(json!({ "has_action": false })),
        ]));
        let classifier = IntentClassifier::new(completion);

        assert!(classifier.classify("I ate 3 bananas").await.unwrap());
        assert!(!classifier
            .classify("the weather is nice today")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn malformed_verdict_is_a_schema_error() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok(json!({ "verdict": "yes" }))]));
        let classifier = IntentClassifier::new(completion);

        let err = classifier.classify("I had lunch").await.unwrap_err();
        assert!(matches!(err, ServiceError::Schema(_)));
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Err(
            TransportError::RateLimited,
        )]));
        let classifier = IntentClassifier::new(completion);

        let err = classifier.classify("I had lunch").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Transport(TransportError::RateLimited)
        ));
    }
}
