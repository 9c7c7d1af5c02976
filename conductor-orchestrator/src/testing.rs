//! Test fixtures: services wired to in-memory storage and a scriptable
//! worker pool.

use async_trait::async_trait;
use conductor_core::domain::job::Job;
use conductor_core::domain::registry::{ScriptRef, TargetRef};
use conductor_core::dto::job::CreateJob;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

use crate::api::AppState;
use crate::dispatch::{DispatchGateway, WorkUnit};
use crate::error::DispatchError;
use crate::repository::memory::{
    InMemoryAuditSink, InMemoryJobRepository, InMemoryLogRepository, InMemoryRegistry,
    InMemoryTicketRepository,
};
use crate::service::{EscalationService, JobOrchestrator, LogService, RetryPolicy};

pub const ACTIVE_SCRIPT: i64 = 1;
pub const INACTIVE_SCRIPT: i64 = 2;
pub const ACTIVE_TARGET: i64 = 1;
pub const INACTIVE_TARGET: i64 = 2;

/// Worker pool double that hands out `w-1`, `w-2`, ... and reports
/// termination requests on a channel
pub struct StubGateway {
    failures_left: AtomicU32,
    hanging: AtomicBool,
    held: AtomicBool,
    arrived: Notify,
    released: Notify,
    issued: AtomicU32,
    enqueued: Mutex<Vec<WorkUnit>>,
    terminations: mpsc::UnboundedSender<String>,
}

impl StubGateway {
    fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gateway = Self {
            failures_left: AtomicU32::new(0),
            hanging: AtomicBool::new(false),
            held: AtomicBool::new(false),
            arrived: Notify::new(),
            released: Notify::new(),
            issued: AtomicU32::new(0),
            enqueued: Mutex::new(Vec::new()),
            terminations: tx,
        };
        (gateway, rx)
    }

    /// Makes the next `n` enqueue calls fail as unreachable
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Makes enqueue calls never answer
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Makes the next enqueue call wait until `release`
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held enqueue call has reached the worker pool
    pub async fn wait_for_enqueue(&self) {
        self.arrived.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    pub fn enqueued(&self) -> Vec<WorkUnit> {
        self.enqueued.lock().unwrap().clone()
    }
}

#[async_trait]
impl DispatchGateway for StubGateway {
    async fn enqueue(&self, unit: WorkUnit) -> Result<String, DispatchError> {
        if self.hanging.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.held.swap(false, Ordering::SeqCst) {
            self.arrived.notify_one();
            self.released.notified().await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DispatchError::Unreachable("connection refused".to_string()));
        }

        self.enqueued.lock().unwrap().push(unit);
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("w-{}", n))
    }

    async fn request_termination(&self, handle: &str) {
        let _ = self.terminations.send(handle.to_string());
    }
}

pub struct Harness {
    pub audit: Arc<InMemoryAuditSink>,
    pub gateway: Arc<StubGateway>,
    pub terminations: mpsc::UnboundedReceiver<String>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub logs: Arc<LogService>,
    pub escalation: Arc<EscalationService>,
    pub retry: RetryPolicy,
}

impl Harness {
    pub fn new() -> Self {
        let jobs = Arc::new(InMemoryJobRepository::new());
        let log_store = Arc::new(InMemoryLogRepository::new());
        let tickets = Arc::new(InMemoryTicketRepository::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let (gateway, terminations) = StubGateway::new();
        let gateway = Arc::new(gateway);

        for (id, active) in [(ACTIVE_SCRIPT, true), (INACTIVE_SCRIPT, false)] {
            registry.add_script(ScriptRef {
                id,
                name: format!("script-{}", id),
                active,
            });
        }
        for (id, active) in [(ACTIVE_TARGET, true), (INACTIVE_TARGET, false)] {
            registry.add_target(TargetRef {
                id,
                hostname: format!("host-{}", id),
                address: format!("10.0.0.{}", id),
                port: 22,
                active,
            });
        }

        let orchestrator = Arc::new(JobOrchestrator::new(
            jobs.clone(),
            registry.clone(),
            registry.clone(),
            gateway.clone(),
            audit.clone(),
            Duration::from_millis(50),
        ));
        let logs = Arc::new(LogService::new(jobs.clone(), log_store));
        let escalation = Arc::new(EscalationService::new(
            jobs.clone(),
            tickets,
            audit.clone(),
        ));

        Self {
            audit,
            gateway,
            terminations,
            orchestrator,
            logs,
            escalation,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            },
        }
    }

    /// A freshly created job on the active script and target
    pub async fn pending_job(&self) -> Job {
        self.orchestrator
            .create(
                1,
                CreateJob {
                    script_id: ACTIVE_SCRIPT,
                    target_id: ACTIVE_TARGET,
                    extra_parameters: HashMap::new(),
                },
            )
            .await
            .unwrap()
    }

    pub fn state(&self) -> AppState {
        AppState {
            orchestrator: self.orchestrator.clone(),
            logs: self.logs.clone(),
            escalation: self.escalation.clone(),
            retry: self.retry,
        }
    }
}
