//! reqwest implementation of [`SummaryApi`]

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::time::Duration;

use super::{ApiResult, SummaryApi};
use crate::classifier::{classify, ClassifiedError, RawFailure, RequestContext};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::types::{
    CreateSummaryRequest, DocumentDetail, DocumentList, DocumentRecord, SummarizationJob,
    UploadFile,
};

/// HTTP client for the summarization backend
pub struct HttpApi {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl HttpApi {
    /// Create a new client from configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("docsum/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_root().to_string(),
            request_timeout: config.request_timeout(),
            upload_timeout: config.upload_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a 2xx JSON body, classifying every failure
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: RequestContext,
        timeout: Duration,
    ) -> ApiResult<T> {
        let response = match request.timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(transport_failure(e, context))),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.fail(RawFailure::Status {
                status: status.as_u16(),
                body,
                context,
            }));
        }

        match response.json::<T>().await {
            Ok(value) => Ok(value),
            Err(e) if e.is_timeout() => Err(self.fail(transport_failure(e, context))),
            Err(e) => Err(self.fail(RawFailure::Other {
                message: format!("Failed to decode response: {}", e),
                context: Some(context),
            })),
        }
    }

    fn fail(&self, raw: RawFailure) -> ClassifiedError {
        let err = classify(raw);
        log_failure(&err);
        err
    }
}

fn transport_failure(err: reqwest::Error, context: RequestContext) -> RawFailure {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        RawFailure::NoResponse {
            message: err.to_string(),
            context,
        }
    } else {
        RawFailure::Other {
            message: err.to_string(),
            context: Some(context),
        }
    }
}

fn log_failure(err: &ClassifiedError) {
    let (method, url) = err
        .context
        .as_ref()
        .map(|c| (c.method.as_str(), c.url.as_str()))
        .unwrap_or(("UNKNOWN", "UNKNOWN"));

    match err.status {
        Some(status) => tracing::error!(
            status,
            method,
            url,
            trace_id = err.trace_id.as_deref().unwrap_or("-"),
            "API error: {}",
            err.message
        ),
        None => tracing::error!(kind = %err.kind, method, url, "API request failed: {}", err.message),
    }
}

#[async_trait]
impl SummaryApi for HttpApi {
    async fn upload_document(&self, file: &UploadFile) -> ApiResult<DocumentRecord> {
        let url = self.url("/documents");
        let context = RequestContext::new("POST", &url).with_payload(json!({
            "file": file.name,
            "size_bytes": file.size,
        }));

        // Bytes clones share the buffer; the length keeps Content-Length on the request.
        let length = file.bytes.len() as u64;
        let mut part = multipart::Part::stream_with_length(file.bytes.clone(), length)
            .file_name(file.name.clone());
        if let Some(mime) = &file.mime_type {
            part = part.mime_str(mime).map_err(|e| {
                self.fail(RawFailure::Other {
                    message: format!("Invalid MIME type '{}': {}", mime, e),
                    context: Some(context.clone()),
                })
            })?;
        }
        let form = multipart::Form::new().part("file", part);

        tracing::debug!("Uploading {} ({} bytes)", file.name, file.size);
        self.send(
            self.client.post(&url).multipart(form),
            context,
            self.upload_timeout,
        )
        .await
    }

    async fn get_document(&self, document_id: &str) -> ApiResult<DocumentDetail> {
        let url = self.url(&format!("/documents/{}", document_id));
        let context = RequestContext::new("GET", &url);
        self.send(self.client.get(&url), context, self.request_timeout)
            .await
    }

    async fn list_documents(&self, limit: u32, offset: u32) -> ApiResult<DocumentList> {
        let url = self.url("/documents");
        let context = RequestContext::new("GET", &url)
            .with_payload(json!({ "limit": limit, "offset": offset }));
        self.send(
            self.client.get(&url).query(&[("limit", limit), ("offset", offset)]),
            context,
            self.request_timeout,
        )
        .await
    }

    async fn create_summary(&self, request: &CreateSummaryRequest) -> ApiResult<SummarizationJob> {
        let url = self.url("/summaries");
        let context = json_context("POST", &url, request);
        self.send(self.client.post(&url).json(request), context, self.request_timeout)
            .await
    }

    async fn get_summary(&self, job_id: &str) -> ApiResult<SummarizationJob> {
        let url = self.url(&format!("/summaries/{}", job_id));
        let context = RequestContext::new("GET", &url);
        self.send(self.client.get(&url), context, self.request_timeout)
            .await
    }

    async fn get_summary_by_document(&self, document_id: &str) -> ApiResult<SummarizationJob> {
        let url = self.url(&format!("/summaries/by-document/{}", document_id));
        let context = RequestContext::new("GET", &url);
        self.send(self.client.get(&url), context, self.request_timeout)
            .await
    }
}

/// Request context carrying the JSON body, or none if it cannot be encoded
fn json_context<T: Serialize + ?Sized>(method: &str, url: &str, body: &T) -> RequestContext {
    let context = RequestContext::new(method, url);
    match serde_json::to_value(body) {
        Ok(payload) => context.with_payload(payload),
        Err(e) => {
            tracing::warn!("Request body for {} not recorded in error context: {}", url, e);
            context
        }
    }
}
