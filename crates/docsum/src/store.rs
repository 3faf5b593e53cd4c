//! Shared read model of summarization jobs
//!
//! Maps `job id -> job` and `document id -> job id`. Every observer reads the
//! same records; there is no per-observer copy that could drift. Writes go
//! through [`JobStateStore::record_submission`] (job submission),
//! [`JobStateStore::record_discovered`] (document lookup) and
//! [`JobStateStore::apply`] (status polling), all of which enforce the status
//! lifecycle `queued -> running -> {done | failed}` under one write lock, so a
//! reader never sees half of an update.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::types::{JobStatus, SummarizationJob};

/// What the store knows about a document's summarization
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", content = "job", rename_all = "snake_case")]
pub enum DocumentJobState {
    /// No job has been submitted for the document
    NotStarted,
    /// A job exists, in whatever status it is
    Tracked(SummarizationJob),
}

impl DocumentJobState {
    /// `not_started`, or the job status
    pub fn status_label(&self) -> &'static str {
        match self {
            DocumentJobState::NotStarted => "not_started",
            DocumentJobState::Tracked(job) => job.status.as_str(),
        }
    }

    pub fn job(&self) -> Option<&SummarizationJob> {
        match self {
            DocumentJobState::NotStarted => None,
            DocumentJobState::Tracked(job) => Some(job),
        }
    }
}

/// Outcome of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// First record for this job
    Inserted,
    /// Status moved forward
    Advanced { from: JobStatus, to: JobStatus },
    /// Same status, record replaced
    Refreshed,
    /// The stored job is already terminal; the update was dropped
    IgnoredTerminal,
    /// The update would move the status backwards; dropped
    IgnoredRegression { current: JobStatus, received: JobStatus },
    /// A newer job is tracked for the same document; dropped
    Superseded,
}

impl Reconcile {
    pub fn applied(&self) -> bool {
        matches!(
            self,
            Reconcile::Inserted | Reconcile::Advanced { .. } | Reconcile::Refreshed
        )
    }
}

/// Change notification for observers
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub job: SummarizationJob,
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<String, SummarizationJob>,
    by_document: HashMap<String, String>,
}

impl StoreInner {
    /// Apply the lifecycle rules to one incoming record
    fn reconcile(&mut self, job: SummarizationJob) -> Reconcile {
        match self.jobs.get(&job.id) {
            None => {
                self.jobs.insert(job.id.clone(), job);
                Reconcile::Inserted
            }
            Some(current) if current.status.is_terminal() => Reconcile::IgnoredTerminal,
            Some(current) if !current.status.can_advance_to(job.status) => {
                Reconcile::IgnoredRegression {
                    current: current.status,
                    received: job.status,
                }
            }
            Some(current) => {
                let from = current.status;
                let to = job.status;
                self.jobs.insert(job.id.clone(), job);
                if from == to {
                    Reconcile::Refreshed
                } else {
                    Reconcile::Advanced { from, to }
                }
            }
        }
    }
}

/// Keyed job state shared by every observer
pub struct JobStateStore {
    inner: RwLock<StoreInner>,
    events: broadcast::Sender<StoreEvent>,
}

impl JobStateStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: RwLock::new(StoreInner::default()),
            events,
        }
    }

    /// Record a freshly submitted job for its document.
    ///
    /// The job becomes the one tracked for its document; an older job for the
    /// same document is discarded, not merged.
    pub fn record_submission(&self, job: SummarizationJob) -> Reconcile {
        let job = job.normalized();
        let mut inner = self.inner.write();

        if let Some(document_id) = &job.document_id {
            let previous = inner.by_document.insert(document_id.clone(), job.id.clone());
            if let Some(previous) = previous.filter(|id| *id != job.id) {
                inner.jobs.remove(&previous);
                tracing::debug!("Job {} supersedes {} for document {}", job.id, previous, document_id);
            }
        }

        let outcome = inner.reconcile(job.clone());
        self.notify(outcome, job);
        outcome
    }

    /// Record a job found by document lookup.
    ///
    /// Unlike a submission, the lookup answer may be older than what is
    /// already tracked: the tracked job is replaced only when the incoming one
    /// was created later.
    pub fn record_discovered(&self, job: SummarizationJob) -> Reconcile {
        let job = job.normalized();
        let mut inner = self.inner.write();

        if let Some(document_id) = &job.document_id {
            let tracked = inner
                .by_document
                .get(document_id)
                .and_then(|id| inner.jobs.get(id))
                .filter(|tracked| tracked.id != job.id)
                .map(|tracked| (tracked.id.clone(), tracked.created_at));

            match tracked {
                Some((tracked_id, created_at)) if job.created_at <= created_at => {
                    tracing::debug!(
                        "Keeping job {} for document {}; looked-up job {} is not newer",
                        tracked_id,
                        document_id,
                        job.id
                    );
                    return Reconcile::Superseded;
                }
                Some((tracked_id, _)) => {
                    inner.jobs.remove(&tracked_id);
                    tracing::debug!("Job {} supersedes {} for document {}", job.id, tracked_id, document_id);
                }
                None => {}
            }
            inner.by_document.insert(document_id.clone(), job.id.clone());
        }

        let outcome = inner.reconcile(job.clone());
        self.notify(outcome, job);
        outcome
    }

    /// Apply a status observed by polling
    pub fn apply(&self, job: SummarizationJob) -> Reconcile {
        let job = job.normalized();
        let mut inner = self.inner.write();

        if let Some(document_id) = &job.document_id {
            let tracked = inner.by_document.get(document_id).cloned();
            match tracked {
                Some(tracked) if tracked != job.id => {
                    tracing::debug!(
                        "Dropping status for job {}: document {} now tracks {}",
                        job.id,
                        document_id,
                        tracked
                    );
                    return Reconcile::Superseded;
                }
                Some(_) => {}
                None => {
                    inner.by_document.insert(document_id.clone(), job.id.clone());
                }
            }
        }

        let outcome = inner.reconcile(job.clone());
        match outcome {
            Reconcile::IgnoredRegression { current, received } => tracing::debug!(
                "Ignoring out-of-order status for job {}: {} -> {}",
                job.id,
                current,
                received
            ),
            Reconcile::IgnoredTerminal => {
                tracing::debug!("Ignoring status for settled job {}", job.id)
            }
            _ => {}
        }
        self.notify(outcome, job);
        outcome
    }

    // Called with the write lock held so events follow store order.
    fn notify(&self, outcome: Reconcile, job: SummarizationJob) {
        if outcome.applied() {
            let _ = self.events.send(StoreEvent { job });
        }
    }

    /// Current record for a job
    pub fn get(&self, job_id: &str) -> Option<SummarizationJob> {
        self.inner.read().jobs.get(job_id).cloned()
    }

    pub fn status_of(&self, job_id: &str) -> Option<JobStatus> {
        self.inner.read().jobs.get(job_id).map(|j| j.status)
    }

    /// The job tracked for a document, or `NotStarted`
    pub fn job_for_document(&self, document_id: &str) -> DocumentJobState {
        let inner = self.inner.read();
        inner
            .by_document
            .get(document_id)
            .and_then(|job_id| inner.jobs.get(job_id))
            .cloned()
            .map(DocumentJobState::Tracked)
            .unwrap_or(DocumentJobState::NotStarted)
    }

    /// Drop everything known about a document
    pub fn forget_document(&self, document_id: &str) -> Option<SummarizationJob> {
        let mut inner = self.inner.write();
        let job_id = inner.by_document.remove(document_id)?;
        inner.jobs.remove(&job_id)
    }

    /// Subscribe to applied changes
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.inner.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobStateStore {
    fn default() -> Self {
        Self::new()
    }
}
