//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod readiness;

pub use engine::{EventHandler, ExecutionEvent, Orchestrator};
pub use executor::StepExecutor;
pub use readiness::{poll_until, poll_until_deadline, PollExhausted};
