//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used for communication between Conductor services
//! (orchestrator, workers, CLI). DTOs are lightweight request and response
//! shapes built around the domain entities.

pub mod job;
pub mod log;
pub mod ticket;
