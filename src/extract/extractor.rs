//! Structured action extraction from an actionable transcript.
//!
//! The completion service returns raw actions under an explicit schema;
//! everything after that is local: strict validation, per-action time
//! resolution, and the meal-vs-separate-items tie-break.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::domain::action::{
    ActionDetails, ActionType, MealComponent, MealType, VoiceAction,
};
use crate::error::ServiceError;
use crate::services::{CompletionRequest, CompletionService};
use crate::timeres::{MealSlot, TimeExpression, TimeResolver};

/// Curated table of food combinations that are conventionally eaten as one
/// meal. The tie-break for ambiguous groupings is a policy, not hardcoded
/// logic, so deployments can tune it.
#[derive(Debug, Clone)]
pub struct MealPairingPolicy {
    pairs: Vec<(String, String)>,
}

impl MealPairingPolicy {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        let pairs = pairs
            .into_iter()
            .map(|(a, b)| (normalize(&a), normalize(&b)))
            .collect();
        Self { pairs }
    }

    /// Whether two food items form a conventional combination, in either
    /// order. Matching is on normalized names so "pork chop" and
    /// "porkchop" agree.
    pub fn is_conventional_pair(&self, a: &str, b: &str) -> bool {
        let (na, nb) = (normalize(a), normalize(b));
        self.pairs.iter().any(|(pa, pb)| {
            (na.contains(pa.as_str()) && nb.contains(pb.as_str()))
                || (na.contains(pb.as_str()) && nb.contains(pa.as_str()))
        })
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Wire schema for one extracted action, before validation.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    action_type: ActionType,
    confidence: f64,

    #[serde(default)]
    item: Option<String>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    meal_type: Option<MealType>,
    #[serde(default)]
    meal_name: Option<String>,
    #[serde(default)]
    components: Vec<MealComponent>,

    #[serde(default)]
    symptoms: Vec<String>,
    #[serde(default)]
    severity: Option<u8>,

    #[serde(default)]
    vitamin_name: Option<String>,
    #[serde(default)]
    dosage: Option<String>,
    #[serde(default)]
    frequency: Option<String>,

    #[serde(default)]
    event: Option<String>,

    #[serde(default)]
    notes: Option<String>,

    /// RFC 3339 instant when the utterance stated an explicit time.
    #[serde(default)]
    explicit_time: Option<String>,
    /// Meal keyword associated with this action's span.
    #[serde(default)]
    meal_slot: Option<MealSlot>,
    /// "N minutes ago".
    #[serde(default)]
    minutes_ago: Option<i64>,

    /// Set when the service could not decide between one compound meal
    /// and separate items for this food and its neighbor.
    #[serde(default)]
    ambiguous_grouping: bool,
}

/// Turns an actionable transcript into ordered, validated voice actions.
pub struct ActionExtractor {
    completion: Arc<dyn CompletionService>,
    resolver: TimeResolver,
    pairing: MealPairingPolicy,
}

impl ActionExtractor {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        resolver: TimeResolver,
        pairing: MealPairingPolicy,
    ) -> Self {
        Self {
            completion,
            resolver,
            pairing,
        }
    }

    /// Extract voice actions from a transcript. Actions come back in the
    /// order their utterance spans occur; a response that fails schema
    /// validation is a hard failure for the session.
    #[instrument(skip(self, transcript))]
    pub async fn extract(
        &self,
        transcript: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<VoiceAction>, ServiceError> {
        let response = self
            .completion
            .complete(extraction_request(transcript))
            .await?;

        let raw: RawExtraction = serde_json::from_value(response)
            .map_err(|e| ServiceError::Schema(e.to_string()))?;

        let mut actions = Vec::with_capacity(raw.actions.len());
        let mut ambiguous = Vec::with_capacity(raw.actions.len());
        for raw_action in raw.actions {
            if raw_action.action_type == ActionType::Unknown {
                warn!(notes = ?raw_action.notes, "dropping unknown action");
                continue;
            }
            ambiguous.push(raw_action.ambiguous_grouping);
            actions.push(self.build_action(raw_action, now)?);
        }

        let actions = self.resolve_groupings(actions, &ambiguous);
        debug!(count = actions.len(), "actions extracted");
        Ok(actions)
    }

    fn build_action(
        &self,
        raw: RawAction,
        now: DateTime<Utc>,
    ) -> Result<VoiceAction, ServiceError> {
        let resolved = self.resolver.resolve(&time_expression(&raw), now);
        let details = build_details(&raw)?;

        let action = VoiceAction {
            action_type: raw.action_type,
            confidence: raw.confidence,
            details,
            timestamp: resolved.instant,
            time_source: resolved.source,
        };
        action.validate().map_err(ServiceError::Schema)?;
        Ok(action)
    }

    /// Apply the meal-vs-separate tie-break: adjacent ambiguous single
    /// items merge into one meal combination when conventionally paired,
    /// otherwise they stay separate. Every ambiguous case is logged.
    fn resolve_groupings(
        &self,
        actions: Vec<VoiceAction>,
        ambiguous: &[bool],
    ) -> Vec<VoiceAction> {
        let mut result: Vec<VoiceAction> = Vec::with_capacity(actions.len());
        let mut result_ambiguous: Vec<bool> = Vec::with_capacity(actions.len());

        for (action, flagged) in actions.into_iter().zip(ambiguous.iter().copied()) {
            let mergeable = flagged
                && result_ambiguous.last().copied().unwrap_or(false)
                && result
                    .last()
                    .is_some_and(|prev| self.can_merge(prev, &action));

            if mergeable {
                if let Some(prev) = result.pop() {
                    result_ambiguous.pop();
                    let merged = merge_pair(prev, action);
                    warn!(
                        meal = merged.food_description().as_deref().unwrap_or(""),
                        "ambiguous grouping merged into one meal"
                    );
                    result.push(merged);
                    // A merged meal does not chain into further merges.
                    result_ambiguous.push(false);
                }
            } else {
                if flagged {
                    warn!("ambiguous grouping left as separate items");
                }
                result.push(action);
                result_ambiguous.push(flagged);
            }
        }

        result
    }

    fn can_merge(&self, a: &VoiceAction, b: &VoiceAction) -> bool {
        match (&a.details, &b.details) {
            (
                ActionDetails::Food {
                    item: item_a,
                    meal_type: MealType::SingleItem,
                    ..
                },
                ActionDetails::Food {
                    item: item_b,
                    meal_type: MealType::SingleItem,
                    ..
                },
            ) => self.pairing.is_conventional_pair(item_a, item_b),
            _ => false,
        }
    }
}

fn time_expression(raw: &RawAction) -> TimeExpression {
    if let Some(text) = raw.explicit_time.as_deref() {
        match DateTime::parse_from_rfc3339(text) {
            Ok(instant) => return TimeExpression::Explicit(instant.with_timezone(&Utc)),
            Err(err) => {
                // Unparseable explicit times fall through to the next rule.
                warn!(%text, %err, "unparseable explicit time");
            }
        }
    }
    if let Some(slot) = raw.meal_slot {
        return TimeExpression::Meal(slot);
    }
    if let Some(minutes) = raw.minutes_ago {
        return TimeExpression::MinutesAgo(minutes);
    }
    TimeExpression::None
}

fn build_details(raw: &RawAction) -> Result<ActionDetails, ServiceError> {
    let missing = |field: &str| {
        ServiceError::Schema(format!(
            "{:?} action missing required field '{field}'",
            raw.action_type
        ))
    };

    match raw.action_type {
        ActionType::LogWater => Ok(ActionDetails::Water {
            amount: raw.amount.ok_or_else(|| missing("amount"))?,
            unit: raw.unit.clone().ok_or_else(|| missing("unit"))?,
            notes: raw.notes.clone(),
        }),
        ActionType::LogFood => Ok(ActionDetails::Food {
            item: raw.item.clone().ok_or_else(|| missing("item"))?,
            amount: raw.amount,
            unit: raw.unit.clone(),
            meal_type: raw.meal_type.ok_or_else(|| missing("meal_type"))?,
            meal_name: raw.meal_name.clone(),
            components: raw.components.clone(),
            notes: raw.notes.clone(),
        }),
        ActionType::LogSymptom => {
            if raw.symptoms.is_empty() {
                return Err(missing("symptoms"));
            }
            Ok(ActionDetails::Symptom {
                symptoms: raw.symptoms.clone(),
                severity: raw.severity,
                notes: raw.notes.clone(),
            })
        }
        ActionType::LogVitamin | ActionType::AddVitamin => Ok(ActionDetails::Vitamin {
            name: raw.vitamin_name.clone().ok_or_else(|| missing("vitamin_name"))?,
            dosage: raw.dosage.clone(),
            frequency: raw.frequency.clone(),
            notes: raw.notes.clone(),
        }),
        ActionType::LogScoreEvent => Ok(ActionDetails::Score {
            event: raw.event.clone().ok_or_else(|| missing("event"))?,
            notes: raw.notes.clone(),
        }),
        ActionType::Unknown => Ok(ActionDetails::Unknown {
            notes: raw.notes.clone(),
        }),
    }
}

fn merge_pair(first: VoiceAction, second: VoiceAction) -> VoiceAction {
    let component_of = |action: &VoiceAction| match &action.details {
        ActionDetails::Food { item, amount, unit, .. } => MealComponent {
            name: item.clone(),
            quantity: amount.unwrap_or(1.0),
            unit: unit.clone(),
            preparation: None,
            is_main_ingredient: true,
        },
        _ => unreachable!("merge candidates are food actions"),
    };

    let components = vec![component_of(&first), component_of(&second)];
    let meal_name = format!("{} and {}", components[0].name, components[1].name);

    VoiceAction {
        action_type: ActionType::LogFood,
        confidence: first.confidence.min(second.confidence),
        details: ActionDetails::Food {
            item: meal_name.clone(),
            amount: None,
            unit: None,
            meal_type: MealType::MealCombination,
            meal_name: Some(meal_name),
            components,
            notes: None,
        },
        timestamp: first.timestamp,
        time_source: first.time_source,
    }
}

fn extraction_request(transcript: &str) -> CompletionRequest {
    CompletionRequest {
        task: "extract_actions",
        prompt: format!(
            "Extract every loggable event from the transcript below as one \
             action per event, in utterance order. Treat foods joined by \
             cooking-verb framing ('I made/cooked X'), a recognized recipe \
             name, a meal-context phrase ('for dinner I had...'), or \
             'and'/'with' between foods commonly eaten together as ONE \
             compound meal with components. Treat foods separated by time \
             words ('then', 'later', 'after that') or with independent \
             quantities and no shared meal context as SEPARATE actions. \
             When you cannot decide, emit separate single items and set \
             ambiguous_grouping on them. For each action carry the time \
             reference from its span: an explicit RFC 3339 instant, a meal \
             keyword, or a minutes-ago offset; omit all three when none was \
             spoken. Flag a compound meal's primary protein or starch \
             components as main ingredients.\n\nTranscript: {transcript}"
        ),
        schema: json!({
            "type": "object",
            "required": ["actions"],
            "properties": {
                "actions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["action_type", "confidence"],
                        "properties": {
                            "action_type": {
                                "enum": [
                                    "log_water", "log_food", "log_symptom",
                                    "log_vitamin", "add_vitamin",
                                    "log_score_event", "unknown"
                                ]
                            },
                            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                            "item": { "type": "string" },
                            "amount": { "type": "number" },
                            "unit": { "type": "string" },
                            "meal_type": {
                                "enum": ["single_item", "recipe", "meal_combination", "snack"]
                            },
                            "meal_name": { "type": "string" },
                            "components": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "required": ["name"],
                                    "properties": {
                                        "name": { "type": "string" },
                                        "quantity": { "type": "number" },
                                        "unit": { "type": "string" },
                                        "preparation": { "type": "string" },
                                        "is_main_ingredient": { "type": "boolean" }
                                    }
                                }
                            },
                            "symptoms": { "type": "array", "items": { "type": "string" } },
                            "severity": { "type": "integer", "minimum": 1, "maximum": 10 },
                            "vitamin_name": { "type": "string" },
                            "dosage": { "type": "string" },
                            "frequency": { "type": "string" },
                            "event": { "type": "string" },
                            "notes": { "type": "string" },
                            "explicit_time": { "type": "string", "format": "date-time" },
                            "meal_slot": { "enum": ["breakfast", "lunch", "dinner", "snack"] },
                            "minutes_ago": { "type": "integer", "minimum": 0 },
                            "ambiguous_grouping": { "type": "boolean" }
                        }
                    }
                }
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::domain::action::TimeSource;
    use crate::services::mock::ScriptedCompletion;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 14, 14, 30, 0).unwrap()
    }

    fn extractor(response: serde_json::Value) -> ActionExtractor {
        let config = PipelineConfig::default();
        ActionExtractor::new(
            Arc::new(ScriptedCompletion::new(vec![Ok(response)])),
            TimeResolver::default(),
            MealPairingPolicy::new(config.meal_pairs),
        )
    }

    #[tokio::test]
    async fn simple_quantity_resolves_to_now() {
        let response = json!({
            "actions": [{
                "action_type": "log_food",
                "confidence": 0.95,
                "item": "3 bananas",
                "amount": 3.0,
                "meal_type": "single_item"
            }]
        });

        let actions = extractor(response).extract("I ate 3 bananas", now()).await.unwrap();
        assert_eq!(actions.len(), 1);
        let action = &actions[0];
        assert_eq!(action.action_type, ActionType::LogFood);
        assert_eq!(action.timestamp, now());
        assert_eq!(action.time_source, TimeSource::CurrentTime);
        match &action.details {
            ActionDetails::Food { item, meal_type, components, .. } => {
                assert_eq!(item, "3 bananas");
                assert_eq!(*meal_type, MealType::SingleItem);
                assert!(components.is_empty());
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[tokio::test]
    async fn compound_meal_for_dinner() {
        let response = json!({
            "actions": [{
                "action_type": "log_food",
                "confidence": 0.9,
                "item": "porkchop and potatoes",
                "meal_type": "meal_combination",
                "meal_name": "porkchop and potatoes",
                "meal_slot": "dinner",
                "components": [
                    { "name": "porkchop", "is_main_ingredient": true },
                    { "name": "potatoes", "is_main_ingredient": true }
                ]
            }]
        });

        let actions = extractor(response)
            .extract("I ate porkchop and potatoes for dinner", now())
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        let action = &actions[0];
        assert_eq!(
            action.timestamp,
            Utc.with_ymd_and_hms(2025, 10, 14, 18, 0, 0).unwrap()
        );
        assert_eq!(action.time_source, TimeSource::MealType);
        match &action.details {
            ActionDetails::Food { meal_type, components, meal_name, .. } => {
                assert_eq!(*meal_type, MealType::MealCombination);
                assert_eq!(components.len(), 2);
                assert_eq!(meal_name.as_deref(), Some("porkchop and potatoes"));
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[tokio::test]
    async fn separate_items_with_relative_time_keep_order() {
        let response = json!({
            "actions": [
                {
                    "action_type": "log_food",
                    "confidence": 0.9,
                    "item": "crackers",
                    "meal_type": "single_item",
                    "minutes_ago": 30
                },
                {
                    "action_type": "log_food",
                    "confidence": 0.9,
                    "item": "a banana",
                    "meal_type": "single_item"
                }
            ]
        });

        let actions = extractor(response)
            .extract("I had crackers 30 minutes ago and then a banana", now())
            .await
            .unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].timestamp, now() - chrono::Duration::minutes(30));
        assert_eq!(actions[0].time_source, TimeSource::Relative);
        assert_eq!(actions[1].timestamp, now());
        assert_eq!(actions[1].time_source, TimeSource::CurrentTime);
    }

    #[tokio::test]
    async fn ambiguous_conventional_pair_merges_into_one_meal() {
        let response = json!({
            "actions": [
                {
                    "action_type": "log_food",
                    "confidence": 0.8,
                    "item": "pork chop",
                    "meal_type": "single_item",
                    "ambiguous_grouping": true
                },
                {
                    "action_type": "log_food",
                    "confidence": 0.7,
                    "item": "potatoes",
                    "meal_type": "single_item",
                    "ambiguous_grouping": true
                }
            ]
        });

        let actions = extractor(response)
            .extract("I had pork chop and potatoes", now())
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        let action = &actions[0];
        assert!((action.confidence - 0.7).abs() < f64::EPSILON);
        match &action.details {
            ActionDetails::Food { meal_type, components, .. } => {
                assert_eq!(*meal_type, MealType::MealCombination);
                assert_eq!(components.len(), 2);
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ambiguous_unrelated_items_stay_separate() {
        let response = json!({
            "actions": [
                {
                    "action_type": "log_food",
                    "confidence": 0.8,
                    "item": "crackers",
                    "meal_type": "single_item",
                    "ambiguous_grouping": true
                },
                {
                    "action_type": "log_food",
                    "confidence": 0.8,
                    "item": "a banana",
                    "meal_type": "single_item",
                    "ambiguous_grouping": true
                }
            ]
        });

        let actions = extractor(response)
            .extract("I had crackers and a banana", now())
            .await
            .unwrap();
        assert_eq!(actions.len(), 2);
    }

    #[tokio::test]
    async fn compound_meal_without_components_is_rejected() {
        let response = json!({
            "actions": [{
                "action_type": "log_food",
                "confidence": 0.9,
                "item": "stir fry",
                "meal_type": "recipe"
            }]
        });

        let err = extractor(response)
            .extract("I made a stir fry", now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Schema(_)));
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_rejected() {
        let response = json!({
            "actions": [{
                "action_type": "log_water",
                "confidence": 1.4,
                "amount": 8.0,
                "unit": "oz"
            }]
        });

        let err = extractor(response)
            .extract("I drank some water", now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Schema(_)));
    }

    #[tokio::test]
    async fn unparseable_explicit_time_falls_back() {
        let response = json!({
            "actions": [{
                "action_type": "log_water",
                "confidence": 0.9,
                "amount": 8.0,
                "unit": "oz",
                "explicit_time": "two-ish"
            }]
        });

        let actions = extractor(response)
            .extract("I drank water at two-ish", now())
            .await
            .unwrap();
        assert_eq!(actions[0].timestamp, now());
        assert_eq!(actions[0].time_source, TimeSource::CurrentTime);
    }

    #[tokio::test]
    async fn explicit_time_is_honored() {
        let response = json!({
            "actions": [{
                "action_type": "log_water",
                "confidence": 0.9,
                "amount": 8.0,
                "unit": "oz",
                "explicit_time": "2025-10-14T14:00:00Z"
            }]
        });

        let actions = extractor(response)
            .extract("I drank water at 2pm", now())
            .await
            .unwrap();
        assert_eq!(
            actions[0].timestamp,
            Utc.with_ymd_and_hms(2025, 10, 14, 14, 0, 0).unwrap()
        );
        assert_eq!(actions[0].time_source, TimeSource::Explicit);
    }

    #[test]
    fn pairing_policy_normalizes_names() {
        let policy = MealPairingPolicy::new(vec![("porkchop".into(), "potatoes".into())]);
        assert!(policy.is_conventional_pair("pork chop", "potatoes"));
        assert!(policy.is_conventional_pair("Potatoes", "Pork Chop"));
        assert!(!policy.is_conventional_pair("crackers", "a banana"));
    }
}
