//! Nutrition estimator: per-component breakdown plus local arithmetic.
//!
//! The completion service decomposes a food description into components
//! with per-portion base values; everything numeric happens here, so the
//! same breakdown always produces the same estimate. Failures are
//! "nutrition pending" for the caller, never a hard error for the entry.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::domain::estimate::{
    round_calories, round_grams, NutritionConfidence, NutritionEstimate,
};
use crate::error::EstimateError;
use crate::services::{CompletionRequest, CompletionService};

const SIZE_SMALL: f64 = 0.75;
const SIZE_LARGE: f64 = 1.3;

/// Estimates calories and macros for a food description.
pub struct NutritionEstimator {
    completion: Arc<dyn CompletionService>,
}

/// Wire schema for the breakdown call.
#[derive(Debug, Deserialize)]
struct BreakdownResponse {
    components: Vec<ComponentBreakdown>,

    /// True when the description is too generic to decompose reliably
    /// ("salad", "smoothie") and the components are a typical recipe.
    #[serde(default)]
    vague: bool,
}

#[derive(Debug, Deserialize)]
struct ComponentBreakdown {
    name: String,

    /// Explicit numeric quantity, when the utterance stated one.
    #[serde(default)]
    quantity: Option<f64>,

    /// Portion size, when stated.
    #[serde(default)]
    size: Option<PortionSize>,

    /// Preparation method, when stated.
    #[serde(default)]
    preparation: Option<Preparation>,

    /// Whether this food is typically cooked, so an unstated preparation
    /// method is a real guess rather than a non-question.
    #[serde(default)]
    cooked: bool,

    /// Standard per-portion base values.
    base: MacroBlock,
}

#[derive(Debug, Deserialize)]
struct MacroBlock {
    calories: f64,
    protein_grams: f64,
    carb_grams: f64,
    fat_grams: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PortionSize {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Preparation {
    Fried,
    Grilled,
    Baked,
    Steamed,
    Boiled,
    Raw,
}

impl NutritionEstimator {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Estimate nutrition for a food description (single item or compound
    /// meal). Transport failures surface as `Unavailable` and callers
    /// treat them as "nutrition pending".
    #[instrument(skip(self))]
    pub async fn estimate(&self, description: &str) -> Result<NutritionEstimate, EstimateError> {
        let response = self
            .completion
            .complete(breakdown_request(description))
            .await?;

        let breakdown: BreakdownResponse = serde_json::from_value(response)
            .map_err(|e| EstimateError::Schema(e.to_string()))?;

        validate_breakdown(&breakdown)?;
        let estimate = compute(description, &breakdown);
        debug!(
            calories = estimate.calories,
            confidence = ?estimate.confidence,
            assumptions = estimate.assumptions.len(),
            "nutrition estimate ready"
        );
        Ok(estimate)
    }
}

fn breakdown_request(description: &str) -> CompletionRequest {
    CompletionRequest {
        task: "nutrition_breakdown",
        prompt: format!(
            "Break the food description below into its named components. For \
             each component give standard per-portion calories and macros, \
             the explicit numeric quantity if one was stated, the portion \
             size (small/medium/large) if stated, the preparation method if \
             stated, and whether the food is typically cooked. Mark the \
             response vague when the description is too generic to decompose \
             without assuming a recipe.\n\nDescription: {description}"
        ),
        schema: json!({
            "type": "object",
            "required": ["components"],
            "properties": {
                "vague": { "type": "boolean" },
                "components": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["name", "base"],
                        "properties": {
                            "name": { "type": "string" },
                            "quantity": { "type": "number" },
                            "size": { "enum": ["small", "medium", "large"] },
                            "preparation": {
                                "enum": ["fried", "grilled", "baked", "steamed", "boiled", "raw"]
                            },
                            "cooked": { "type": "boolean" },
                            "base": {
                                "type": "object",
                                "required": ["calories", "protein_grams", "carb_grams", "fat_grams"],
                                "properties": {
                                    "calories": { "type": "number" },
                                    "protein_grams": { "type": "number" },
                                    "carb_grams": { "type": "number" },
                                    "fat_grams": { "type": "number" }
                                }
                            }
                        }
                    }
                }
            }
        }),
    }
}

fn validate_breakdown(breakdown: &BreakdownResponse) -> Result<(), EstimateError> {
    if breakdown.components.is_empty() {
        return Err(EstimateError::Schema("breakdown has no components".into()));
    }
    for component in &breakdown.components {
        let base = &component.base;
        if base.calories < 0.0
            || base.protein_grams < 0.0
            || base.carb_grams < 0.0
            || base.fat_grams < 0.0
        {
            return Err(EstimateError::Schema(format!(
                "negative base values for '{}'",
                component.name
            )));
        }
        if let Some(quantity) = component.quantity {
            if quantity <= 0.0 {
                return Err(EstimateError::Schema(format!(
                    "non-positive quantity for '{}'",
                    component.name
                )));
            }
        }
    }
    Ok(())
}

fn compute(description: &str, breakdown: &BreakdownResponse) -> NutritionEstimate {
    let mut calories = 0.0;
    let mut protein = 0.0;
    let mut carbs = 0.0;
    let mut fat = 0.0;
    let mut assumptions = Vec::new();
    let mut any_assumed = false;

    if breakdown.vague {
        assumptions.push(format!("Assumed a typical recipe for {description}"));
    }

    for component in &breakdown.components {
        let quantity = match component.quantity {
            Some(q) => q,
            None => {
                assumptions.push(format!("Assumed 1 portion of {}", component.name));
                any_assumed = true;
                1.0
            }
        };

        let size_multiplier = match component.size {
            Some(PortionSize::Small) => SIZE_SMALL,
            Some(PortionSize::Medium) => 1.0,
            Some(PortionSize::Large) => SIZE_LARGE,
            None => {
                // Only a guess worth recording when no explicit quantity
                // pins the amount down either.
                if component.quantity.is_none() {
                    assumptions.push(format!("Assumed a medium {}", component.name));
                    any_assumed = true;
                }
                1.0
            }
        };

        // Frying roughly doubles the fat; calories grow by the added
        // fat's energy so the macro/energy relation stays intact.
        let (mut component_calories, component_fat) = match component.preparation {
            Some(Preparation::Fried) => (
                component.base.calories + 9.0 * component.base.fat_grams,
                component.base.fat_grams * 2.0,
            ),
            Some(_) => (component.base.calories, component.base.fat_grams),
            None => {
                if component.cooked {
                    assumptions.push(format!("Assumed {} was not fried", component.name));
                    any_assumed = true;
                }
                (component.base.calories, component.base.fat_grams)
            }
        };
        component_calories *= quantity * size_multiplier;

        calories += component_calories;
        protein += component.base.protein_grams * quantity * size_multiplier;
        carbs += component.base.carb_grams * quantity * size_multiplier;
        fat += component_fat * quantity * size_multiplier;
    }

    let confidence = if breakdown.vague {
        NutritionConfidence::Low
    } else if any_assumed {
        NutritionConfidence::Medium
    } else {
        NutritionConfidence::High
    };

    let mut estimate = NutritionEstimate {
        calories: round_calories(calories),
        protein_grams: round_grams(protein),
        carb_grams: round_grams(carbs),
        fat_grams: round_grams(fat),
        confidence,
        assumptions,
    };

    // An inconsistent estimate is flagged, not discarded.
    if !estimate.is_energy_consistent() {
        estimate.assumptions.push(
            "Calorie total differs from macro energy by more than 15%".to_string(),
        );
    }

    estimate
}
