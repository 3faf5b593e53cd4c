//! Summarization job types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::SummaryParams;

/// Summarization method used when the caller does not pick one
pub const DEFAULT_METHOD: &str = "mbart_ru_sum_gazeta";

/// Job status as reported by the server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// `done` and `failed` accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Done | JobStatus::Failed => 2,
        }
    }

    /// Whether a record in this status may be replaced by one in `next`.
    ///
    /// `queued -> running -> {done | failed}`; repeating the current status is
    /// allowed, going backwards or leaving a terminal status is not.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length parameters echoed back by the server
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobParams {
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub max_length: Option<u32>,
}

impl From<SummaryParams> for JobParams {
    fn from(params: SummaryParams) -> Self {
        Self {
            min_length: Some(params.min_length),
            max_length: Some(params.max_length),
        }
    }
}

/// A server-tracked summarization job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummarizationJob {
    pub id: String,
    pub document_id: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: JobParams,
    pub status: JobStatus,
    /// Set only when `status == done`
    #[serde(default)]
    pub summary_text: Option<String>,
    /// Set only when `status == failed`
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(deserialize_with = "super::timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

impl SummarizationJob {
    /// Drop fields that do not belong to the current status
    pub fn normalized(mut self) -> Self {
        if self.status != JobStatus::Done {
            self.summary_text = None;
        }
        if self.status != JobStatus::Failed {
            self.error_message = None;
        }
        self
    }

    /// Human-readable failure reason for a failed job
    pub fn failure_reason(&self) -> Option<&str> {
        if self.status != JobStatus::Failed {
            return None;
        }
        Some(
            self.error_message
                .as_deref()
                .unwrap_or("Summarization failed without an error message"),
        )
    }
}

/// Body of `POST /summaries`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateSummaryRequest {
    pub document_id: String,
    pub method: String,
    pub min_length: u32,
    pub max_length: u32,
}

impl CreateSummaryRequest {
    pub fn new(document_id: impl Into<String>, params: SummaryParams, method: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            method: method.into(),
            min_length: params.min_length,
            max_length: params.max_length,
        }
    }
}
