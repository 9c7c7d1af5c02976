//! Conductor Core
//!
//! Core types and abstractions for the Conductor job orchestration system.
//!
//! This crate contains:
//! - Domain types: Core business entities (Job, LogLine, Ticket, etc.) and the
//!   job lifecycle rules every component agrees on
//! - DTOs: Data transfer objects for inter-service communication

pub mod domain;
pub mod dto;
