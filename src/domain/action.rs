//! Voice actions: one detected loggable event per structured extraction.
//!
//! A `VoiceAction` is created by the action extractor from one transcript,
//! immutable thereafter, and consumed exactly once by the action executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of loggable event detected in an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    LogWater,
    LogFood,
    LogSymptom,
    LogVitamin,
    AddVitamin,
    LogScoreEvent,
    Unknown,
}

/// How a food event was reported: one item, or a compound meal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    SingleItem,
    Recipe,
    MealCombination,
    Snack,
}

impl MealType {
    /// Compound meals must carry a component list.
    pub fn is_compound(self) -> bool {
        matches!(self, Self::Recipe | Self::MealCombination)
    }
}

/// How an action's timestamp was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSource {
    Explicit,
    MealType,
    Relative,
    CurrentTime,
}

/// One named ingredient or dish within a compound meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealComponent {
    pub name: String,

    /// Numeric quantity, defaulting to one portion.
    #[serde(default = "default_quantity")]
    pub quantity: f64,

    #[serde(default)]
    pub unit: Option<String>,

    /// Preparation method as spoken ("fried", "grilled", ...).
    #[serde(default)]
    pub preparation: Option<String>,

    /// True for a primary protein/starch rather than a garnish or sauce.
    #[serde(default)]
    pub is_main_ingredient: bool,
}

fn default_quantity() -> f64 {
    1.0
}

/// Type-specific payload for a voice action, keyed by its action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ActionDetails {
    Water {
        amount: f64,
        unit: String,
        #[serde(default)]
        notes: Option<String>,
    },
    Food {
        /// Item description as spoken ("3 bananas").
        item: String,
        #[serde(default)]
        amount: Option<f64>,
        #[serde(default)]
        unit: Option<String>,
        meal_type: MealType,
        /// Name for a compound meal ("porkchop and potatoes").
        #[serde(default)]
        meal_name: Option<String>,
        /// Present only for compound meals, in utterance order.
        #[serde(default)]
        components: Vec<MealComponent>,
        #[serde(default)]
        notes: Option<String>,
    },
    Symptom {
        symptoms: Vec<String>,
        /// 1-10 when stated.
        #[serde(default)]
        severity: Option<u8>,
        #[serde(default)]
        notes: Option<String>,
    },
    Vitamin {
        name: String,
        #[serde(default)]
        dosage: Option<String>,
        #[serde(default)]
        frequency: Option<String>,
        #[serde(default)]
        notes: Option<String>,
    },
    Score {
        event: String,
        #[serde(default)]
        notes: Option<String>,
    },
    Unknown {
        #[serde(default)]
        notes: Option<String>,
    },
}

/// One detected loggable event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceAction {
    pub action_type: ActionType,

    /// Extraction confidence in [0, 1]. Distinct from nutrition confidence.
    pub confidence: f64,

    pub details: ActionDetails,

    /// Resolved event time, never left unresolved.
    pub timestamp: DateTime<Utc>,

    pub time_source: TimeSource,
}

impl VoiceAction {
    /// Enforce structural invariants. Violations are schema errors at the
    /// extraction boundary, never silently repaired.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }

        if let ActionDetails::Food {
            meal_type,
            components,
            item,
            ..
        } = &self.details
        {
            if meal_type.is_compound() && components.is_empty() {
                return Err(format!(
                    "compound meal '{}' has no components",
                    item
                ));
            }
            if *meal_type == MealType::SingleItem && !components.is_empty() {
                return Err(format!(
                    "single item '{}' carries a component list",
                    item
                ));
            }
        }

        Ok(())
    }

    /// Food description to hand to the nutrition estimator, if this is a
    /// food action.
    pub fn food_description(&self) -> Option<String> {
        match &self.details {
            ActionDetails::Food {
                item,
                meal_name,
                components,
                ..
            } => {
                if components.is_empty() {
                    Some(item.clone())
                } else {
                    let names: Vec<&str> =
                        components.iter().map(|c| c.name.as_str()).collect();
                    Some(
                        meal_name
                            .clone()
                            .unwrap_or_else(|| names.join(" and ")),
                    )
                }
            }
            _ => None,
        }
    }
}
