//! Pipeline execution engine

pub mod engine;
pub mod events;
pub mod executor;
pub mod interrupt;
pub mod scheduler;

pub use engine::ExecutionEngine;
pub use events::{EventBus, EventHandler, ExecutionEvent};
pub use executor::{JobExecutor, JobOutcome};
pub use interrupt::Interrupt;
pub use scheduler::{Decision, StageScheduler};
