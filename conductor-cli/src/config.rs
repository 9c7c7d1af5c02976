//! Configuration module
//!
//! Handles CLI configuration: where the orchestrator lives and who is calling it.

use conductor_client::OrchestratorClient;
use conductor_core::domain::principal::Principal;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the orchestrator service
    pub orchestrator_url: String,
    /// Identity forwarded to the orchestrator
    pub principal: Principal,
}

impl Config {
    pub fn client(&self) -> OrchestratorClient {
        OrchestratorClient::new(&self.orchestrator_url).with_principal(self.principal)
    }
}
