//! Read-only views of the script and target registries
//!
//! Both registries are owned elsewhere; the orchestrator only looks entries up
//! and checks their activation flag.

use serde::{Deserialize, Serialize};

/// An automation script known to the definition store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRef {
    pub id: i64,
    pub name: String,
    pub active: bool,
}

/// A host that scripts can be run against, with its connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub id: i64,
    pub hostname: String,
    pub address: String,
    pub port: u16,
    pub active: bool,
}
