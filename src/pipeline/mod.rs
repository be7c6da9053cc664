//! Session orchestration: the state machine and action execution.

pub mod executor;
pub mod orchestrator;

pub use executor::{ActionExecutor, ExecutionResult};
pub use orchestrator::{SessionReport, VoicePipeline};
