//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository handles storage for a specific domain entity behind a trait,
//! with a Postgres implementation for deployment and an in-memory one.

pub mod audit;
pub mod job;
pub mod log;
pub mod memory;
pub mod registry;
pub mod ticket;

// Re-export for convenience
pub use audit::{AuditSink, PgAuditSink};
pub use job::{JobRepository, JobUpdate, NewJob, PgJobRepository};
pub use log::{LogRepository, PgLogRepository};
pub use registry::{PgRegistry, ScriptRegistry, TargetRegistry};
pub use ticket::{NewTicket, PgTicketRepository, TicketRepository};
