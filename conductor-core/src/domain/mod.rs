//! Core domain types
//!
//! This module contains the core domain structures used across Conductor services.
//! These types represent the fundamental business entities and are shared between
//! the orchestrator (for persistence), workers (for callbacks) and the CLI (for display).

pub mod audit;
pub mod job;
pub mod log;
pub mod principal;
pub mod registry;
pub mod stats;
pub mod ticket;

/// Returned when a stored or user-supplied label does not name a known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
