//! Document upload with client-side preconditions
//!
//! One invocation issues at most one upload request and never retries: a
//! partially received upload is not safe to replay blindly, so retrying is left
//! to the caller.

use std::sync::Arc;

use crate::api::{ApiResult, SummaryApi};
use crate::classifier::ClassifiedError;
use crate::config::ClientConfig;
use crate::types::{DocumentRecord, UploadFile};

/// Size and format limits checked before any network call
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_bytes: u64,
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
    pub allowed_mime_types: Vec<String>,
}

impl From<&ClientConfig> for UploadLimits {
    fn from(config: &ClientConfig) -> Self {
        Self {
            max_bytes: config.max_upload_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            allowed_mime_types: config.allowed_mime_types.clone(),
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl UploadLimits {
    /// Check a file against the limits
    pub fn check(&self, file: &UploadFile) -> Result<(), ClassifiedError> {
        let size = file.size.max(file.bytes.len() as u64);
        if size > self.max_bytes {
            return Err(ClassifiedError::validation(format!(
                "File '{}' is too large ({} bytes). Maximum size: {} MB.",
                file.name,
                size,
                self.max_bytes / 1024 / 1024
            )));
        }

        let extension_ok = file
            .extension()
            .map(|ext| self.allowed_extensions.iter().any(|a| *a == ext))
            .unwrap_or(false);
        let mime_ok = file
            .mime_type
            .as_deref()
            .map(|mime| self.allowed_mime_types.iter().any(|a| a.eq_ignore_ascii_case(mime)))
            .unwrap_or(false);

        if !extension_ok && !mime_ok {
            let allowed = self
                .allowed_extensions
                .iter()
                .map(|e| format!(".{}", e))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ClassifiedError::validation(format!(
                "Unsupported file format '{}'. Allowed: {}",
                file.name, allowed
            )));
        }

        Ok(())
    }
}

/// Submits files and returns the created document record
pub struct UploadCoordinator {
    api: Arc<dyn SummaryApi>,
    limits: UploadLimits,
}

impl UploadCoordinator {
    pub fn new(api: Arc<dyn SummaryApi>, limits: UploadLimits) -> Self {
        Self { api, limits }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Upload a file. Precondition failures return a `validation` error
    /// without touching the network; request failures come back classified.
    pub async fn upload(&self, file: &UploadFile) -> ApiResult<DocumentRecord> {
        if let Err(err) = self.limits.check(file) {
            tracing::warn!("Upload rejected: {}", err);
            return Err(err);
        }

        tracing::info!("Uploading {} ({} bytes)", file.name, file.size);
        let record = self.api.upload_document(file).await?;
        tracing::info!(
            "Uploaded {} as document {} (parsed: {})",
            record.filename,
            record.id,
            record.parsed
        );
        Ok(record)
    }
}
