//! Normalization of request failures into one error taxonomy
//!
//! Every failure a caller can observe, local or remote, ends up as a
//! [`ClassifiedError`] tagged with an [`ErrorKind`]. The backend reports errors in
//! two shapes (a plain `detail` string, or a list of field issues); both collapse
//! into a single readable message here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected locally before any network call
    Validation,
    /// Request sent but no response received
    Network,
    /// Response received with a non-2xx status
    Http,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Http => "http",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request a failure belongs to, kept for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestContext {
    pub method: String,
    pub url: String,
    /// Echo of the request payload (JSON body, or a summary of a multipart form)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A failure normalized for uniform handling
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[error("{message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// HTTP status, for `http` errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Server-side trace identifier, when the response carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            trace_id: None,
            context: None,
        }
    }

    /// Create a validation error (local precondition failure)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Create an unknown error
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }

    /// HTTP status 404
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::Http && self.status == Some(404)
    }

    /// Whether a status poll should simply try again on the next tick.
    /// Validation failures are caller bugs and never go away on their own.
    pub fn is_transient(&self) -> bool {
        !self.is_validation()
    }
}

/// A failure before classification
#[derive(Debug, Clone)]
pub enum RawFailure {
    /// Local precondition failure
    Rejected { message: String },
    /// The request was sent but nothing came back (unreachable host, timeout)
    NoResponse {
        message: String,
        context: RequestContext,
    },
    /// A response arrived with a non-2xx status
    Status {
        status: u16,
        body: String,
        context: RequestContext,
    },
    /// Anything else (request construction, undecodable success body, ...)
    Other {
        message: String,
        context: Option<RequestContext>,
    },
}

/// Error body returned by the backend on any non-2xx response
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub detail: Option<ErrorDetail>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
}

/// The two `detail` shapes the backend produces
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    Issues(Vec<FieldIssue>),
    Other(serde_json::Value),
}

/// One field-level validation issue
#[derive(Debug, Clone, Deserialize)]
pub struct FieldIssue {
    #[serde(default)]
    pub loc: Vec<serde_json::Value>,
    pub msg: String,
}

impl FieldIssue {
    fn render(&self) -> String {
        let path = self
            .loc
            .iter()
            .map(|segment| match segment {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");
        let path = if path.is_empty() { "field".to_string() } else { path };
        format!("{}: {}", path, self.msg)
    }
}

impl ErrorDetail {
    /// Collapse the detail into one readable line
    pub fn to_message(&self) -> Option<String> {
        let message = match self {
            ErrorDetail::Message(s) => s.trim().to_string(),
            ErrorDetail::Issues(issues) => issues
                .iter()
                .map(FieldIssue::render)
                .collect::<Vec<_>>()
                .join(", "),
            ErrorDetail::Other(serde_json::Value::Null) => String::new(),
            ErrorDetail::Other(value) => value.to_string(),
        };
        if message.is_empty() {
            None
        } else {
            Some(message)
        }
    }
}

/// Classify a raw failure
pub fn classify(raw: RawFailure) -> ClassifiedError {
    match raw {
        RawFailure::Rejected { message } => ClassifiedError::validation(message),
        RawFailure::NoResponse { message, context } => {
            let mut err = ClassifiedError::network("Server unreachable or request timed out")
                .with_context(context);
            if !message.is_empty() {
                err.message = format!("{} ({})", err.message, message);
            }
            err
        }
        RawFailure::Status {
            status,
            body,
            context,
        } => {
            let parsed = serde_json::from_str::<ErrorBody>(&body).ok();
            let message = parsed
                .as_ref()
                .and_then(|b| b.detail.as_ref())
                .and_then(ErrorDetail::to_message)
                .unwrap_or_else(|| format!("Server error (HTTP {})", status));

            ClassifiedError {
                kind: ErrorKind::Http,
                message,
                status: Some(status),
                trace_id: parsed.and_then(|b| b.trace_id),
                context: Some(context),
            }
        }
        RawFailure::Other { message, context } => {
            let message = if message.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                message
            };
            ClassifiedError {
                context,
                ..ClassifiedError::unknown(message)
            }
        }
    }
}

impl From<RawFailure> for ClassifiedError {
    fn from(raw: RawFailure) -> Self {
        classify(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::new("POST", "http://localhost:8000/summaries")
    }

    #[test]
    fn test_string_detail_with_trace_id() {
        let body = r#"{"status_code":404,"detail":"Document not found","timestamp":"2024-05-01T10:00:00","trace_id":"abc-123"}"#;
        let err = classify(RawFailure::Status {
            status: 404,
            body: body.to_string(),
            context: ctx(),
        });

        assert_eq!(err.kind, ErrorKind::Http);
        assert_eq!(err.message, "Document not found");
        assert_eq!(err.status, Some(404));
        assert_eq!(err.trace_id.as_deref(), Some("abc-123"));
        assert!(err.is_not_found());
        assert_eq!(err.context.unwrap().method, "POST");
    }

    #[test]
    fn test_field_issues_joined() {
        let body = r#"{"detail":[
            {"loc":["body","min_length"],"msg":"ensure this value is greater than or equal to 0"},
            {"loc":["body","items",2],"msg":"bad item"},
            {"msg":"missing location"}
        ]}"#;
        let err = classify(RawFailure::Status {
            status: 422,
            body: body.to_string(),
            context: ctx(),
        });

        assert_eq!(
            err.message,
            "body.min_length: ensure this value is greater than or equal to 0, \
             body.items.2: bad item, field: missing location"
        );
        assert!(err.trace_id.is_none());
    }

    #[test]
    fn test_unparseable_body_falls_back() {
        let err = classify(RawFailure::Status {
            status: 502,
            body: "<html>Bad Gateway</html>".to_string(),
            context: ctx(),
        });
        assert_eq!(err.message, "Server error (HTTP 502)");
        assert_eq!(err.kind, ErrorKind::Http);
    }

    #[test]
    fn test_no_response_is_network() {
        let err = classify(RawFailure::NoResponse {
            message: "operation timed out".to_string(),
            context: ctx(),
        });
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(err.message.contains("timed out"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_rejected_and_other() {
        let err = classify(RawFailure::Rejected {
            message: "file too large".to_string(),
        });
        assert!(err.is_validation());
        assert!(!err.is_transient());
        assert!(err.context.is_none());

        let err = classify(RawFailure::Other {
            message: "invalid header value".to_string(),
            context: None,
        });
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.to_string(), "invalid header value");
    }
}
