//! In-memory repositories
//!
//! Process-local implementations of every storage trait. Jobs are kept one
//! `Mutex` per row so that status changes on different jobs never contend.

use async_trait::async_trait;
use chrono::Utc;
use conductor_core::domain::audit::AuditEvent;
use conductor_core::domain::job::{Job, JobStatus};
use conductor_core::domain::log::LogLine;
use conductor_core::domain::registry::{ScriptRef, TargetRef};
use conductor_core::domain::stats::StatusCounts;
use conductor_core::domain::ticket::{Ticket, TicketStatus};
use conductor_core::dto::job::{JobFilter, Page, PageRequest};
use conductor_core::dto::log::NewLogLine;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use uuid::Uuid;

use super::audit::AuditSink;
use super::job::{JobRepository, JobUpdate, NewJob};
use super::log::LogRepository;
use super::registry::{ScriptRegistry, TargetRegistry};
use super::ticket::{NewTicket, TicketRepository};
use crate::error::StorageError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Jobs
// =============================================================================

#[derive(Default)]
pub struct InMemoryJobRepository {
    rows: RwLock<BTreeMap<i64, Arc<Mutex<Job>>>>,
    next_id: AtomicI64,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, id: i64) -> Option<Arc<Mutex<Job>>> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.get(&id).cloned()
    }

    fn snapshot(&self) -> Vec<Job> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.values().map(|row| lock(row).clone()).collect()
    }
}

fn matches(filter: &JobFilter, job: &Job) -> bool {
    filter.status.is_none_or(|s| job.status == s)
        && filter.script_id.is_none_or(|id| job.script_id == id)
        && filter.target_id.is_none_or(|id| job.target_id == id)
        && filter.principal_id.is_none_or(|id| job.principal_id == id)
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: NewJob) -> Result<Job, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let job = Job {
            id,
            token: job.token,
            script_id: job.script_id,
            target_id: job.target_id,
            principal_id: job.principal_id,
            status: JobStatus::Pending,
            worker_handle: None,
            error_message: None,
            extra_parameters: job.extra_parameters,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        rows.insert(id, Arc::new(Mutex::new(job.clone())));

        Ok(job)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Job>, StorageError> {
        Ok(self.row(id).map(|row| lock(&row).clone()))
    }

    async fn find_by_token(&self, token: Uuid) -> Result<Option<Job>, StorageError> {
        Ok(self.snapshot().into_iter().find(|job| job.token == token))
    }

    async fn list(&self, filter: &JobFilter, page: PageRequest) -> Result<Page<Job>, StorageError> {
        let mut jobs: Vec<Job> = self
            .snapshot()
            .into_iter()
            .filter(|job| matches(filter, job))
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = jobs.len() as i64;
        let items = jobs
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok(Page::new(items, page, total))
    }

    async fn compare_and_set(
        &self,
        id: i64,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<Option<Job>, StorageError> {
        let Some(row) = self.row(id) else {
            return Ok(None);
        };

        let mut job = lock(&row);
        if job.status != expected {
            return Ok(None);
        }
        update.apply_to(&mut job);

        Ok(Some(job.clone()))
    }

    async fn set_worker_handle_if_unset(
        &self,
        id: i64,
        handle: &str,
    ) -> Result<Option<Job>, StorageError> {
        let Some(row) = self.row(id) else {
            return Ok(None);
        };

        let mut job = lock(&row);
        if job.worker_handle.is_some() {
            return Ok(None);
        }
        job.worker_handle = Some(handle.to_string());

        Ok(Some(job.clone()))
    }

    async fn count_by_status(
        &self,
        principal_id: Option<i64>,
    ) -> Result<StatusCounts, StorageError> {
        let mut counts = StatusCounts::default();
        for job in self.snapshot() {
            if principal_id.is_none_or(|id| job.principal_id == id) {
                counts.add(job.status, 1);
            }
        }
        Ok(counts)
    }
}

// =============================================================================
// Logs
// =============================================================================

#[derive(Default)]
pub struct InMemoryLogRepository {
    streams: Mutex<HashMap<i64, Vec<LogLine>>>,
}

impl InMemoryLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogRepository for InMemoryLogRepository {
    async fn append(&self, job_id: i64, line: NewLogLine) -> Result<i64, StorageError> {
        let numbers = self.append_batch(job_id, vec![line]).await?;
        numbers
            .first()
            .copied()
            .ok_or_else(|| StorageError::InvalidRow(format!("no line stored for job {job_id}")))
    }

    async fn append_batch(
        &self,
        job_id: i64,
        lines: Vec<NewLogLine>,
    ) -> Result<Vec<i64>, StorageError> {
        let mut streams = lock(&self.streams);
        let stream = streams.entry(job_id).or_default();
        let captured_at = Utc::now();

        let mut numbers = Vec::with_capacity(lines.len());
        for line in lines {
            let line_number = stream.last().map_or(0, |last| last.line_number + 1);
            stream.push(LogLine {
                job_id,
                line_number,
                content: line.content,
                severity: line.severity.unwrap_or_default(),
                captured_at,
            });
            numbers.push(line_number);
        }

        Ok(numbers)
    }

    async fn read(
        &self,
        job_id: i64,
        start_line: i64,
        limit: Option<i64>,
    ) -> Result<Vec<LogLine>, StorageError> {
        let streams = lock(&self.streams);
        let Some(stream) = streams.get(&job_id) else {
            return Ok(Vec::new());
        };

        let limit = limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(stream
            .iter()
            .filter(|line| line.line_number >= start_line)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, job_id: i64) -> Result<i64, StorageError> {
        let streams = lock(&self.streams);
        Ok(streams.get(&job_id).map_or(0, |stream| stream.len() as i64))
    }
}

// =============================================================================
// Tickets
// =============================================================================

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: Mutex<Vec<Ticket>>,
    next_id: AtomicI64,
}

impl InMemoryTicketRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn insert(&self, ticket: NewTicket) -> Result<Ticket, StorageError> {
        let now = Utc::now();
        let ticket = Ticket {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            token: ticket.token,
            job_id: ticket.job_id,
            created_by: ticket.created_by,
            title: ticket.title,
            description: ticket.description,
            status: TicketStatus::Open,
            priority: ticket.priority,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };

        lock(&self.tickets).push(ticket.clone());
        Ok(ticket)
    }

    async fn find_by_token(&self, token: Uuid) -> Result<Option<Ticket>, StorageError> {
        Ok(lock(&self.tickets)
            .iter()
            .find(|ticket| ticket.token == token)
            .cloned())
    }
}

// =============================================================================
// Registries
// =============================================================================

/// Script and target registry held in memory
#[derive(Default)]
pub struct InMemoryRegistry {
    scripts: Mutex<HashMap<i64, ScriptRef>>,
    targets: Mutex<HashMap<i64, TargetRef>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_script(&self, script: ScriptRef) {
        lock(&self.scripts).insert(script.id, script);
    }

    pub fn add_target(&self, target: TargetRef) {
        lock(&self.targets).insert(target.id, target);
    }
}

#[async_trait]
impl ScriptRegistry for InMemoryRegistry {
    async fn lookup(&self, id: i64) -> Result<Option<ScriptRef>, StorageError> {
        Ok(lock(&self.scripts).get(&id).cloned())
    }
}

#[async_trait]
impl TargetRegistry for InMemoryRegistry {
    async fn lookup(&self, id: i64) -> Result<Option<TargetRef>, StorageError> {
        Ok(lock(&self.targets).get(&id).cloned())
    }
}

// =============================================================================
// Audit
// =============================================================================

/// Collects audit events; can be switched to reject every write
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    unavailable: AtomicBool,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        lock(&self.events).clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("audit sink".to_string()));
        }
        lock(&self.events).push(event);
        Ok(())
    }
}
