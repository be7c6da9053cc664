//! Nutrition estimates with confidence and assumption tracking.

use serde::{Deserialize, Serialize};

/// Tolerated relative gap between stated calories and macro energy.
pub const ENERGY_BALANCE_TOLERANCE: f64 = 0.15;

/// Qualitative reliability of a nutrition estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NutritionConfidence {
    Low,
    Medium,
    High,
}

/// Calorie/macro estimate for one food description.
///
/// Values are non-negative, calories rounded to the nearest 5 and macros to
/// the nearest gram. `assumptions` lists every portion/preparation guess
/// that went into the numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionEstimate {
    pub calories: u32,
    pub protein_grams: u32,
    pub carb_grams: u32,
    pub fat_grams: u32,
    pub confidence: NutritionConfidence,
    pub assumptions: Vec<String>,
}

impl NutritionEstimate {
    /// Energy implied by the macros alone (4/4/9 kcal per gram).
    pub fn macro_energy(&self) -> u32 {
        4 * self.protein_grams + 4 * self.carb_grams + 9 * self.fat_grams
    }

    /// Whether the calorie figure agrees with the macro energy within the
    /// tolerance. A violation must be flagged, not silently accepted.
    pub fn is_energy_consistent(&self) -> bool {
        if self.calories == 0 {
            return self.macro_energy() == 0;
        }
        let gap = (self.calories as f64 - self.macro_energy() as f64).abs();
        gap / self.calories as f64 <= ENERGY_BALANCE_TOLERANCE
    }
}

/// Round calories to the nearest 5 kcal, clamping below at zero.
pub fn round_calories(raw: f64) -> u32 {
    ((raw.max(0.0) / 5.0).round() * 5.0) as u32
}

/// Round a macro value to the nearest whole gram, clamping below at zero.
pub fn round_grams(raw: f64) -> u32 {
    raw.max(0.0).round() as u32
}
