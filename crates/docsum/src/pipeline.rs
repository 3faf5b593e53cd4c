//! Upload → submit → poll, wired together
//!
//! [`SummaryPipeline`] owns one of each component and shares the store and the
//! API client between them. Starting a new submission or opening another
//! document supersedes whatever job was being polled, and a new submission
//! also discards the previous submission's document and job from the store.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use crate::api::{HttpApi, SummaryApi};
use crate::classifier::ClassifiedError;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::params::SummaryParams;
use crate::poller::{PollPolicy, PollState, StatusPoller};
use crate::store::{DocumentJobState, JobStateStore};
use crate::submit::JobSubmitter;
use crate::types::{DocumentDetail, DocumentList, DocumentRecord, SummarizationJob, UploadFile};
use crate::upload::{UploadCoordinator, UploadLimits};

/// Largest page the history endpoint is asked for
pub const MAX_HISTORY_PAGE: u32 = 100;

/// Result of [`SummaryPipeline::submit_file`]
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub document: DocumentRecord,
    /// The job as returned by the creation request
    pub job: SummarizationJob,
}

/// A document together with what is known about its summarization
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub document: DocumentDetail,
    pub job_state: DocumentJobState,
}

/// Client-side summarization pipeline
pub struct SummaryPipeline {
    config: ClientConfig,
    api: Arc<dyn SummaryApi>,
    store: Arc<JobStateStore>,
    uploader: UploadCoordinator,
    submitter: JobSubmitter,
    poller: StatusPoller,
    /// Document of the latest `submit_file` call
    current_document: Mutex<Option<String>>,
}

impl SummaryPipeline {
    /// Build a pipeline talking to the configured backend
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let api: Arc<dyn SummaryApi> = Arc::new(HttpApi::new(&config)?);
        Ok(Self::with_api(api, config))
    }

    /// Build a pipeline over any [`SummaryApi`] implementation
    pub fn with_api(api: Arc<dyn SummaryApi>, config: ClientConfig) -> Self {
        let store = Arc::new(JobStateStore::new());
        let uploader = UploadCoordinator::new(Arc::clone(&api), UploadLimits::from(&config));
        let submitter = JobSubmitter::new(
            Arc::clone(&api),
            Arc::clone(&store),
            config.default_method.clone(),
        );
        let poller = StatusPoller::new(
            Arc::clone(&api),
            Arc::clone(&store),
            PollPolicy::from(&config),
        );

        Self {
            config,
            api,
            store,
            uploader,
            submitter,
            poller,
            current_document: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStateStore> {
        &self.store
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    /// Validate, upload, create a job, and start polling it.
    ///
    /// Parameter and file checks run before anything else, so an invalid
    /// request neither reaches the network nor disturbs the current poll.
    pub async fn submit_file(
        &self,
        file: &UploadFile,
        min_length: i64,
        max_length: i64,
        method: Option<&str>,
    ) -> Result<Submission> {
        let params = SummaryParams::new(min_length, max_length)?;
        self.uploader.limits().check(file)?;

        self.poller.cancel();
        self.discard_previous_submission();

        let document = self.uploader.upload(file).await?;
        *self.current_document.lock() = Some(document.id.clone());
        let job = self.submitter.submit(&document.id, params, method).await?;
        // Polled even if already settled: the first tick latches the outcome.
        self.poller.start(&job.id);

        Ok(Submission { document, job })
    }

    /// Load a document and its summarization state.
    ///
    /// A document with no job is reported as `NotStarted`. A job that is still
    /// in progress becomes the one being polled.
    pub async fn open_document(&self, document_id: &str) -> Result<DocumentView> {
        let document = self.api.get_document(document_id).await?;

        let job_state = match self.api.get_summary_by_document(document_id).await {
            Ok(job) => {
                self.submitter.adopt(document_id, job);
                let state = self.store.job_for_document(document_id);
                if let Some(job) = state.job() {
                    self.follow(job);
                }
                state
            }
            Err(err) if err.is_not_found() => {
                tracing::debug!("No summarization submitted for document {}", document_id);
                DocumentJobState::NotStarted
            }
            Err(err) => return Err(err.into()),
        };

        Ok(DocumentView {
            document,
            job_state,
        })
    }

    /// One page of previously uploaded documents, newest first
    pub async fn history(&self, limit: u32, offset: u32) -> Result<DocumentList> {
        if limit == 0 || limit > MAX_HISTORY_PAGE {
            return Err(ClassifiedError::validation(format!(
                "Page size must be between 1 and {} (got {})",
                MAX_HISTORY_PAGE, limit
            ))
            .into());
        }
        Ok(self.api.list_documents(limit, offset).await?)
    }

    /// Wait until `job_id` settles and return its final record.
    ///
    /// Fails if the job is not being polled, or if polling stops (cancelled or
    /// superseded) before the job reaches `done` or `failed`.
    pub async fn wait_for_outcome(&self, job_id: &str) -> Result<SummarizationJob> {
        if let Some(job) = self.settled_job(job_id) {
            return Ok(job);
        }
        if self.poller.state().job_id() != Some(job_id) {
            return Err(not_followed(job_id));
        }

        let state = self.poller.wait_settled().await;
        if let Some(job) = self.settled_job(job_id) {
            return Ok(job);
        }
        tracing::debug!("Poller stopped in {:?} before job {} settled", state, job_id);
        Err(not_followed(job_id))
    }

    /// Current poller state
    pub fn poll_state(&self) -> PollState {
        self.poller.state()
    }

    fn discard_previous_submission(&self) {
        let previous = self.current_document.lock().take();
        if let Some(document_id) = previous {
            if let Some(job) = self.store.forget_document(&document_id) {
                tracing::debug!("Discarded job {} of previous document {}", job.id, document_id);
            }
        }
    }

    fn settled_job(&self, job_id: &str) -> Option<SummarizationJob> {
        self.store.get(job_id).filter(|job| job.status.is_terminal())
    }

    fn follow(&self, job: &SummarizationJob) {
        if job.status.is_terminal() {
            tracing::info!("Job {} is already {}", job.id, job.status);
            self.poller.cancel();
        } else {
            self.poller.start(&job.id);
        }
    }
}

fn not_followed(job_id: &str) -> Error {
    Error::cancelled(format!("job {} is no longer being followed", job_id))
}
