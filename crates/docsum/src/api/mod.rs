//! REST interface of the summarization backend
//!
//! [`SummaryApi`] is the collaborator boundary: everything behind it (parsing,
//! inference, persistence) is the server's business. [`HttpApi`] talks to the
//! real backend; tests substitute their own implementations.

mod http;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::classifier::ClassifiedError;
use crate::types::{
    CreateSummaryRequest, DocumentDetail, DocumentList, DocumentRecord, SummarizationJob,
    UploadFile,
};

pub use http::HttpApi;

/// Result of a single API call
pub type ApiResult<T> = std::result::Result<T, ClassifiedError>;

/// Trait for the summarization backend
///
/// Implementations:
/// - `HttpApi`: the REST backend over reqwest
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SummaryApi: Send + Sync {
    /// `POST /documents` (multipart, field `file`)
    async fn upload_document(&self, file: &UploadFile) -> ApiResult<DocumentRecord>;

    /// `GET /documents/{id}`
    async fn get_document(&self, document_id: &str) -> ApiResult<DocumentDetail>;

    /// `GET /documents?limit=&offset=`
    async fn list_documents(&self, limit: u32, offset: u32) -> ApiResult<DocumentList>;

    /// `POST /summaries`
    async fn create_summary(&self, request: &CreateSummaryRequest) -> ApiResult<SummarizationJob>;

    /// `GET /summaries/{id}`
    async fn get_summary(&self, job_id: &str) -> ApiResult<SummarizationJob>;

    /// `GET /summaries/by-document/{id}`; 404 when nothing was submitted yet
    async fn get_summary_by_document(&self, document_id: &str) -> ApiResult<SummarizationJob>;
}
