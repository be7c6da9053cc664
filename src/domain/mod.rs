//! Data structures for the voice-logging pipeline.

pub mod action;
pub mod entry;
pub mod estimate;
pub mod session;

pub use action::{ActionDetails, ActionType, MealComponent, MealType, TimeSource, VoiceAction};
pub use entry::{EntrySource, EntryType, LogEntry};
pub use estimate::{NutritionConfidence, NutritionEstimate};
pub use session::{PipelineSession, SessionState, Stage};
