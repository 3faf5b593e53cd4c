//! Scripted in-memory backend for unit tests
//!
//! Each call pops the next scripted step for its key; a step may be delayed to
//! simulate slow or reordered responses. Unscripted calls fail as `network`.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ApiResult, SummaryApi};
use crate::classifier::ClassifiedError;
use crate::types::{
    CreateSummaryRequest, DocumentDetail, DocumentList, DocumentRecord, JobParams, JobStatus,
    SummarizationJob, UploadFile,
};

pub(crate) struct Step<T> {
    delay: Duration,
    result: ApiResult<T>,
}

#[derive(Default)]
pub(crate) struct ScriptedApi {
    statuses: Mutex<HashMap<String, VecDeque<Step<SummarizationJob>>>>,
    creations: Mutex<VecDeque<Step<SummarizationJob>>>,
    by_document: Mutex<HashMap<String, ApiResult<SummarizationJob>>>,
    uploads: Mutex<VecDeque<ApiResult<DocumentRecord>>>,
    documents: Mutex<HashMap<String, ApiResult<DocumentDetail>>>,
    pub status_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    status_log: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next status response for `job_id`
    pub fn push_status(&self, job_id: &str, result: ApiResult<SummarizationJob>) -> &Self {
        self.push_status_after(job_id, Duration::ZERO, result)
    }

    pub fn push_status_after(
        &self,
        job_id: &str,
        delay: Duration,
        result: ApiResult<SummarizationJob>,
    ) -> &Self {
        self.statuses
            .lock()
            .entry(job_id.to_string())
            .or_default()
            .push_back(Step { delay, result });
        self
    }

    /// Script the statuses of a job in order, all successful
    pub fn script_statuses(&self, job_id: &str, document_id: &str, statuses: &[JobStatus]) {
        for status in statuses {
            self.push_status(job_id, Ok(job(job_id, document_id, *status)));
        }
    }

    pub fn push_creation(&self, delay: Duration, result: ApiResult<SummarizationJob>) {
        self.creations.lock().push_back(Step { delay, result });
    }

    pub fn set_by_document(&self, document_id: &str, result: ApiResult<SummarizationJob>) {
        self.by_document.lock().insert(document_id.to_string(), result);
    }

    pub fn push_upload(&self, result: ApiResult<DocumentRecord>) {
        self.uploads.lock().push_back(result);
    }

    pub fn set_document(&self, document_id: &str, result: ApiResult<DocumentDetail>) {
        self.documents.lock().insert(document_id.to_string(), result);
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Job ids in the order their status was requested
    pub fn status_log(&self) -> Vec<String> {
        self.status_log.lock().clone()
    }
}

/// A job in `status` with the fields that status implies
pub(crate) fn job(id: &str, document_id: &str, status: JobStatus) -> SummarizationJob {
    SummarizationJob {
        id: id.to_string(),
        document_id: Some(document_id.to_string()),
        method: "mbart_ru_sum_gazeta".to_string(),
        params: JobParams {
            min_length: Some(50),
            max_length: Some(500),
        },
        status,
        summary_text: (status == JobStatus::Done).then(|| "Short summary.".to_string()),
        error_message: (status == JobStatus::Failed).then(|| "model crashed".to_string()),
        created_at: Utc::now(),
    }
}

pub(crate) fn document(id: &str, filename: &str, size_bytes: u64) -> DocumentRecord {
    DocumentRecord {
        id: id.to_string(),
        filename: filename.to_string(),
        mime_type: Some("text/plain".to_string()),
        size_bytes,
        uploaded_at: Utc::now(),
        parsed: true,
        parsed_preview: Some("Quarterly report".to_string()),
    }
}

pub(crate) fn document_detail(id: &str, filename: &str) -> DocumentDetail {
    DocumentDetail {
        id: id.to_string(),
        filename: filename.to_string(),
        mime_type: Some("text/plain".to_string()),
        size_bytes: 2048,
        uploaded_at: Utc::now(),
        parsed: true,
        parsed_text: Some("Quarterly report for the second half of the year.".to_string()),
        storage_ref: None,
    }
}

fn unscripted(what: &str) -> ClassifiedError {
    ClassifiedError::network(format!("no scripted response for {}", what))
}

#[async_trait]
impl SummaryApi for ScriptedApi {
    async fn upload_document(&self, file: &UploadFile) -> ApiResult<DocumentRecord> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.uploads.lock().pop_front();
        next.unwrap_or_else(|| Err(unscripted(&file.name)))
    }

    async fn get_document(&self, document_id: &str) -> ApiResult<DocumentDetail> {
        self.documents
            .lock()
            .get(document_id)
            .cloned()
            .unwrap_or_else(|| Err(unscripted(document_id)))
    }

    async fn list_documents(&self, _limit: u32, _offset: u32) -> ApiResult<DocumentList> {
        Err(unscripted("list_documents"))
    }

    async fn create_summary(&self, request: &CreateSummaryRequest) -> ApiResult<SummarizationJob> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.creations.lock().pop_front();
        match step {
            Some(step) => {
                tokio::time::sleep(step.delay).await;
                step.result
            }
            None => Err(unscripted(&request.document_id)),
        }
    }

    async fn get_summary(&self, job_id: &str) -> ApiResult<SummarizationJob> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status_log.lock().push(job_id.to_string());
        let step = self
            .statuses
            .lock()
            .get_mut(job_id)
            .and_then(|steps| steps.pop_front());
        match step {
            Some(step) => {
                tokio::time::sleep(step.delay).await;
                step.result
            }
            None => Err(unscripted(job_id)),
        }
    }

    async fn get_summary_by_document(&self, document_id: &str) -> ApiResult<SummarizationJob> {
        self.by_document
            .lock()
            .get(document_id)
            .cloned()
            .unwrap_or_else(|| Err(unscripted(document_id)))
    }
}
