//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and contain domain logic.

pub mod job;
pub mod log;
pub mod ticket;

// Re-export for convenience
pub use job::{JobOrchestrator, RetryPolicy};
pub use log::LogService;
pub use ticket::EscalationService;
