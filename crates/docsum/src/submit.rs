//! Summarization job submission
//!
//! At most one submission per document id is pending at any time. A second
//! request for the same document while the first is still in flight is
//! rejected locally instead of creating a duplicate server-side job.

use dashmap::DashSet;
use std::sync::Arc;

use crate::api::{ApiResult, SummaryApi};
use crate::classifier::ClassifiedError;
use crate::params::SummaryParams;
use crate::store::{JobStateStore, Reconcile};
use crate::types::{CreateSummaryRequest, JobStatus, SummarizationJob};

/// Releases the document's submission slot when dropped, including when the
/// submitting future is cancelled mid-request.
struct InFlightSlot<'a> {
    pending: &'a DashSet<String>,
    document_id: String,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.document_id);
    }
}

/// Creates summarization jobs and registers them in the store
pub struct JobSubmitter {
    api: Arc<dyn SummaryApi>,
    store: Arc<JobStateStore>,
    pending: DashSet<String>,
    default_method: String,
}

impl JobSubmitter {
    pub fn new(api: Arc<dyn SummaryApi>, store: Arc<JobStateStore>, default_method: impl Into<String>) -> Self {
        Self {
            api,
            store,
            pending: DashSet::new(),
            default_method: default_method.into(),
        }
    }

    fn claim(&self, document_id: &str) -> Option<InFlightSlot<'_>> {
        if !self.pending.insert(document_id.to_string()) {
            return None;
        }
        Some(InFlightSlot {
            pending: &self.pending,
            document_id: document_id.to_string(),
        })
    }

    /// Whether a submission for the document is currently in flight
    pub fn is_pending(&self, document_id: &str) -> bool {
        self.pending.contains(document_id)
    }

    /// Create a job for a document.
    ///
    /// `params` are checked again and out-of-range values fail instead of being
    /// sent. On success the job is recorded in the store as the one tracked for
    /// `document_id`.
    pub async fn submit(
        &self,
        document_id: &str,
        params: SummaryParams,
        method: Option<&str>,
    ) -> ApiResult<SummarizationJob> {
        if document_id.trim().is_empty() {
            return Err(ClassifiedError::validation("Document id must not be empty"));
        }
        params.ensure_in_range()?;

        let _slot = self.claim(document_id).ok_or_else(|| {
            tracing::warn!("Summarization already in progress for document {}", document_id);
            ClassifiedError::validation(format!(
                "A summarization request for document {} is already in progress",
                document_id
            ))
        })?;

        let method = method.unwrap_or(self.default_method.as_str());
        let request = CreateSummaryRequest::new(document_id, params, method);

        tracing::info!(
            "Submitting summarization for document {} (method: {}, min: {}, max: {})",
            document_id,
            method,
            params.min_length,
            params.max_length
        );
        let job = self.api.create_summary(&request).await?;

        if job.status != JobStatus::Queued {
            tracing::warn!(
                "Job {} was created with status {} instead of queued",
                job.id,
                job.status
            );
        }
        tracing::info!("Created job {} for document {}", job.id, document_id);

        let mut tracked = job.clone();
        if tracked.document_id.is_none() {
            tracked.document_id = Some(document_id.to_string());
        }
        self.store.record_submission(tracked);

        Ok(job)
    }

    /// Register a job found by looking up `document_id` as the one tracked for
    /// that document, unless a newer job is already tracked
    pub fn adopt(&self, document_id: &str, mut job: SummarizationJob) -> Reconcile {
        if job.document_id.is_none() {
            job.document_id = Some(document_id.to_string());
        }
        tracing::debug!("Tracking existing job {} ({}) for document {}", job.id, job.status, document_id);
        self.store.record_discovered(job)
    }
}
