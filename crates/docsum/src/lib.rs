//! docsum: client core for background document summarization
//!
//! Uploads a document, submits a summarization job for it, and follows the job
//! until the server reports a terminal status. The moving parts are:
//!
//! - [`upload::UploadCoordinator`] - precondition checks and the single upload request
//! - [`submit::JobSubmitter`] - job creation with one pending submission per document
//! - [`poller::StatusPoller`] - the epoch-guarded status polling state machine
//! - [`store::JobStateStore`] - the shared read model keyed by job and document id
//! - [`classifier`] - normalization of every failure into a [`ClassifiedError`]
//!
//! [`pipeline::SummaryPipeline`] wires them together.

pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod poller;
pub mod store;
pub mod submit;
pub mod types;
pub mod upload;

pub use api::{HttpApi, SummaryApi};
pub use classifier::{classify, ClassifiedError, ErrorKind, RawFailure, RequestContext};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use params::SummaryParams;
pub use pipeline::{DocumentView, Submission, SummaryPipeline};
pub use poller::{PollEvent, PollPolicy, PollState, StatusPoller};
pub use store::{DocumentJobState, JobStateStore, StoreEvent};
pub use submit::JobSubmitter;
pub use types::{
    document::{DocumentDetail, DocumentList, DocumentListItem, DocumentRecord, UploadFile},
    summary::{JobParams, JobStatus, SummarizationJob},
};
pub use upload::UploadCoordinator;
