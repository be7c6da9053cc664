//! Persisted log entries, the pipeline's output contract.
//!
//! The log store collaborator owns persistence mechanics; this module owns
//! the entry shape and the shell construction from a voice action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::action::{ActionDetails, ActionType, VoiceAction};
use super::estimate::NutritionEstimate;

/// Category of a persisted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Food,
    Water,
    Symptom,
    Vitamin,
    Score,
}

/// How the entry was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    Voice,
    Manual,
}

/// One persisted log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Assigned at creation, never reused.
    pub id: Uuid,

    /// Resolved event time. Distinct from creation time.
    pub date: DateTime<Utc>,

    pub entry_type: EntryType,

    pub source: EntrySource,

    /// Type-specific payload mirroring the originating action.
    pub details: ActionDetails,

    /// Populated asynchronously for food entries; `None` means pending.
    #[serde(default)]
    pub nutrition: Option<NutritionEstimate>,
}

impl LogEntry {
    /// Build the entry shell for a voice action. Nutrition fields start
    /// empty and are filled in by the enrichment task. Unknown actions
    /// have no entry type and yield `None`.
    pub fn from_action(action: &VoiceAction) -> Option<Self> {
        Some(Self {
            id: Uuid::new_v4(),
            date: action.timestamp,
            entry_type: entry_type_for(action.action_type)?,
            source: EntrySource::Voice,
            details: action.details.clone(),
            nutrition: None,
        })
    }
}

fn entry_type_for(action_type: ActionType) -> Option<EntryType> {
    match action_type {
        ActionType::LogFood => Some(EntryType::Food),
        ActionType::LogWater => Some(EntryType::Water),
        ActionType::LogSymptom => Some(EntryType::Symptom),
        ActionType::LogVitamin | ActionType::AddVitamin => Some(EntryType::Vitamin),
        ActionType::LogScoreEvent => Some(EntryType::Score),
        ActionType::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::{MealType, TimeSource};

    #[test]
    fn shell_preserves_event_time_and_starts_without_nutrition() {
        let timestamp = Utc::now() - chrono::Duration::minutes(30);
        let action = VoiceAction {
            action_type: ActionType::LogFood,
            confidence: 0.8,
            details: ActionDetails::Food {
                item: "1 banana".into(),
                amount: Some(1.0),
                unit: None,
                meal_type: MealType::SingleItem,
                meal_name: None,
                components: vec![],
                notes: None,
            },
            timestamp,
            time_source: TimeSource::Relative,
        };

        let entry = LogEntry::from_action(&action).unwrap();
        assert_eq!(entry.date, timestamp);
        assert_eq!(entry.entry_type, EntryType::Food);
        assert_eq!(entry.source, EntrySource::Voice);
        assert!(entry.nutrition.is_none());
    }

    #[test]
    fn entry_ids_are_unique() {
        let action = VoiceAction {
            action_type: ActionType::LogWater,
            confidence: 1.0,
            details: ActionDetails::Water {
                amount: 8.0,
                unit: "oz".into(),
                notes: None,
            },
            timestamp: Utc::now(),
            time_source: TimeSource::CurrentTime,
        };

        let a = LogEntry::from_action(&action).unwrap();
        let b = LogEntry::from_action(&action).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.entry_type, EntryType::Water);
    }

    #[test]
    fn vitamin_actions_share_the_vitamin_entry_type() {
        for action_type in [ActionType::LogVitamin, ActionType::AddVitamin] {
            assert_eq!(entry_type_for(action_type), Some(EntryType::Vitamin));
        }
    }

    #[test]
    fn unknown_actions_have_no_entry_type() {
        assert_eq!(entry_type_for(ActionType::Unknown), None);

        let action = VoiceAction {
            action_type: ActionType::Unknown,
            confidence: 0.3,
            details: ActionDetails::Unknown { notes: None },
            timestamp: Utc::now(),
            time_source: TimeSource::CurrentTime,
        };
        assert!(LogEntry::from_action(&action).is_none());
    }
}
