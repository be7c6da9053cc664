//! Nutrition estimation for food descriptions.

pub mod estimator;

pub use estimator::NutritionEstimator;
