//! Action execution: shell persistence plus background nutrition
//! enrichment.
//!
//! The entry shell is persisted synchronously so the user sees immediate
//! feedback; nutrition estimation is fire-and-forget against the already
//! persisted id. One action's failure never stops the rest of the batch.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::action::VoiceAction;
use crate::domain::entry::LogEntry;
use crate::nutrition::NutritionEstimator;
use crate::services::LogStore;

/// Per-batch outcome: which actions persisted, which did not, and the
/// in-flight enrichment tasks.
pub struct ExecutionResult {
    pub succeeded: Vec<VoiceAction>,

    /// Actions whose shell persistence failed, with the error text.
    pub failed: Vec<(VoiceAction, String)>,

    /// Background nutrition tasks, one per persisted food action. The
    /// session never waits on these; a caller that deletes an entry can
    /// abort the matching task.
    pub enrichments: Vec<JoinHandle<()>>,
}

impl ExecutionResult {
    /// Terminal for the session only when every action in the batch failed.
    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }
}

/// Turns validated voice actions into persisted log entries.
pub struct ActionExecutor {
    store: Arc<dyn LogStore>,
    estimator: Arc<NutritionEstimator>,
}

impl ActionExecutor {
    pub fn new(store: Arc<dyn LogStore>, estimator: Arc<NutritionEstimator>) -> Self {
        Self { store, estimator }
    }

    /// Execute a batch in emission order. Each action is attempted
    /// independently; enrichment is spawned only after its entry's append
    /// succeeded, so an update can never race a not-yet-created record.
    pub async fn execute(&self, actions: Vec<VoiceAction>) -> ExecutionResult {
        let mut result = ExecutionResult {
            succeeded: Vec::new(),
            failed: Vec::new(),
            enrichments: Vec::new(),
        };

        for action in actions {
            // Unknown actions never reach this point; a stray one is
            // dropped the same way the extractor drops them.
            let Some(entry) = LogEntry::from_action(&action) else {
                warn!(action_type = ?action.action_type, "skipping unloggable action");
                continue;
            };
            let entry_id = entry.id;

            match self.store.append(entry).await {
                Ok(id) => {
                    debug!(%id, action_type = ?action.action_type, "entry persisted");
                    if let Some(description) = action.food_description() {
                        result.enrichments.push(self.spawn_enrichment(id, description));
                    }
                    result.succeeded.push(action);
                }
                Err(err) => {
                    error!(%entry_id, error = %err, "entry persistence failed");
                    result.failed.push((action, err.to_string()));
                }
            }
        }

        info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "batch executed"
        );
        result
    }

    /// Estimate nutrition and patch the persisted entry. Failures leave
    /// the entry's nutrition pending; they never flip the action to
    /// failed.
    fn spawn_enrichment(&self, id: uuid::Uuid, description: String) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let estimator = Arc::clone(&self.estimator);

        tokio::spawn(async move {
            match estimator.estimate(&description).await {
                Ok(estimate) => {
                    if let Err(err) = store.update_nutrition(id, estimate).await {
                        warn!(%id, error = %err, "nutrition update failed");
                    }
                }
                Err(err) => {
                    warn!(%id, error = %err, "nutrition left pending");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::{ActionDetails, ActionType, MealType, TimeSource};
    use crate::error::TransportError;
    use crate::services::mock::{MemoryLogStore, ScriptedCompletion};
    use chrono::Utc;
    use serde_json::json;

    fn food(item: &str) -> VoiceAction {
        VoiceAction {
            action_type: ActionType::LogFood,
            confidence: 0.9,
            details: ActionDetails::Food {
                item: item.into(),
                amount: None,
                unit: None,
                meal_type: MealType::SingleItem,
                meal_name: None,
                components: vec![],
                notes: None,
            },
            timestamp: Utc::now(),
            time_source: TimeSource::CurrentTime,
        }
    }

    fn water() -> VoiceAction {
        VoiceAction {
            action_type: ActionType::LogWater,
            confidence: 1.0,
            details: ActionDetails::Water {
                amount: 8.0,
                unit: "oz".into(),
                notes: None,
            },
            timestamp: Utc::now(),
            time_source: TimeSource::CurrentTime,
        }
    }

    fn banana_breakdown() -> serde_json::Value {
        json!({
            "components": [{
                "name": "banana",
                "quantity": 1.0,
                "cooked": false,
                "base": {
                    "calories": 105.0, "protein_grams": 1.3,
                    "carb_grams": 27.0, "fat_grams": 0.4
                }
            }]
        })
    }

    fn executor_with(
        store: Arc<MemoryLogStore>,
        responses: Vec<Result<serde_json::Value, TransportError>>,
    ) -> ActionExecutor {
        let completion = Arc::new(ScriptedCompletion::new(responses));
        ActionExecutor::new(store, Arc::new(NutritionEstimator::new(completion)))
    }

    #[tokio::test]
    async fn shells_persist_before_enrichment_completes() {
        let store = Arc::new(MemoryLogStore::new());
        let executor = executor_with(store.clone(), vec![Ok(banana_breakdown())]);

        let result = executor.execute(vec![food("1 banana")]).await;
        assert_eq!(result.succeeded.len(), 1);

        // The shell is visible immediately, nutrition possibly pending.
        let entries = store.entries();
        assert_eq!(entries.len(), 1);

        for handle in result.enrichments {
            handle.await.unwrap();
        }
        let entry = &store.entries()[0];
        assert_eq!(entry.nutrition.as_ref().unwrap().calories, 105);
    }

    #[tokio::test]
    async fn estimation_failure_leaves_nutrition_pending() {
        let store = Arc::new(MemoryLogStore::new());
        let executor = executor_with(
            store.clone(),
            vec![Err(TransportError::Unreachable("down".into()))],
        );

        let result = executor.execute(vec![food("1 banana")]).await;
        assert_eq!(result.succeeded.len(), 1);
        assert!(result.failed.is_empty());

        for handle in result.enrichments {
            handle.await.unwrap();
        }
        assert!(store.entries()[0].nutrition.is_none());
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let store = Arc::new(MemoryLogStore::new());
        store.fail_items_matching("crackers");
        let executor = executor_with(store.clone(), vec![Ok(banana_breakdown())]);

        let result = executor
            .execute(vec![food("crackers"), food("1 banana"), water()])
            .await;

        assert_eq!(result.succeeded.len(), 2);
        assert_eq!(result.failed.len(), 1);
        assert!(!result.all_failed());
        assert_eq!(store.entries().len(), 2);
    }

    #[tokio::test]
    async fn all_failed_batch_is_terminal() {
        let store = Arc::new(MemoryLogStore::new());
        store.fail_items_matching("banana");
        let executor = executor_with(store.clone(), vec![]);

        let result = executor.execute(vec![food("banana")]).await;
        assert!(result.all_failed());
        assert!(store.entries().is_empty());
    }

    #[tokio::test]
    async fn non_food_actions_get_no_enrichment() {
        let store = Arc::new(MemoryLogStore::new());
        let executor = executor_with(store.clone(), vec![]);

        let result = executor.execute(vec![water()]).await;
        assert_eq!(result.succeeded.len(), 1);
        assert!(result.enrichments.is_empty());
    }

    #[tokio::test]
    async fn unloggable_actions_are_dropped_not_failed() {
        let store = Arc::new(MemoryLogStore::new());
        let executor = executor_with(store.clone(), vec![]);

        let stray = VoiceAction {
            action_type: ActionType::Unknown,
            confidence: 0.2,
            details: ActionDetails::Unknown { notes: None },
            timestamp: Utc::now(),
            time_source: TimeSource::CurrentTime,
        };
        let result = executor.execute(vec![stray, water()]).await;

        assert_eq!(result.succeeded.len(), 1);
        assert!(result.failed.is_empty());
        assert_eq!(store.entries().len(), 1);
    }

    #[tokio::test]
    async fn empty_batch_is_not_all_failed() {
        let store = Arc::new(MemoryLogStore::new());
        let executor = executor_with(store, vec![]);
        let result = executor.execute(vec![]).await;
        assert!(!result.all_failed());
    }
}
