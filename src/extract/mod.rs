//! Transcript understanding: intent classification and action extraction.

pub mod classifier;
pub mod extractor;

pub use classifier::IntentClassifier;
pub use extractor::{ActionExtractor, MealPairingPolicy};
