//! Typed errors for the extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::job::{JobId, JobStatus};
use crate::types::quota::DenialReason;

/// Errors surfaced by job management operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// Quota admission refused the batch; nothing was charged or created
    #[error("quota exceeded: {0}")]
    QuotaExceeded(DenialReason),

    /// Uploaded document could not be turned into a URL list
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Caller is not entitled to upload CSV files
    #[error("CSV upload is not enabled for this account")]
    CsvUploadNotAllowed,

    /// Request was well-formed but unusable
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Job does not exist or belongs to another owner
    #[error("job not found: {job_id}")]
    NotFound { job_id: JobId },

    /// Job has not reached a terminal state yet
    #[error("job {job_id} is not finished (status: {status})")]
    NotReady { job_id: JobId, status: JobStatus },

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Export serialization failed
    #[error("export error: {0}")]
    Export(String),
}

impl JobError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        JobError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        JobError::Storage(Box::new(err))
    }
}

/// Errors from turning an uploaded document into URLs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The document is not readable as CSV text
    #[error("malformed CSV at line {line}: {detail}")]
    Malformed { line: u64, detail: String },

    /// The document parsed but held no usable website URLs
    #[error("no usable URLs found")]
    NoUsableUrls,
}

/// Classification of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// Connection refused, DNS failure, TLS failure
    Unreachable,
    /// Stage exceeded its time budget
    Timeout,
    /// Response body could not be interpreted
    ParseFailure,
    /// Non-success HTTP response
    HttpStatus,
    /// Target rejected by URL safety validation
    Blocked,
    /// Backing service (browser, WHOIS) is not available for this target
    Unavailable,
    /// Job was cancelled while the stage ran
    Cancelled,
}

impl StageErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageErrorKind::Unreachable => "unreachable",
            StageErrorKind::Timeout => "timeout",
            StageErrorKind::ParseFailure => "parse_failure",
            StageErrorKind::HttpStatus => "http_status",
            StageErrorKind::Blocked => "blocked",
            StageErrorKind::Unavailable => "unavailable",
            StageErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage failure, recorded on the progress entry of the stage that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {detail}")]
pub struct StageError {
    pub kind: StageErrorKind,
    pub detail: String,
    /// HTTP status code for `http_status` failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl StageError {
    pub fn new(kind: StageErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            status: None,
        }
    }

    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self::new(StageErrorKind::Unreachable, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(StageErrorKind::Timeout, detail)
    }

    pub fn parse_failure(detail: impl Into<String>) -> Self {
        Self::new(StageErrorKind::ParseFailure, detail)
    }

    pub fn http_status(status: u16, url: &str) -> Self {
        Self {
            kind: StageErrorKind::HttpStatus,
            detail: format!("HTTP {status} from {url}"),
            status: Some(status),
        }
    }

    pub fn blocked(detail: impl Into<String>) -> Self {
        Self::new(StageErrorKind::Blocked, detail)
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(StageErrorKind::Unavailable, detail)
    }

    pub fn cancelled() -> Self {
        Self::new(StageErrorKind::Cancelled, "job cancelled")
    }

    /// Whether retrying the same stage might succeed.
    ///
    /// Network failures, timeouts, 429 and 5xx responses are transient.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            StageErrorKind::Unreachable | StageErrorKind::Timeout => true,
            StageErrorKind::HttpStatus => {
                matches!(self.status, Some(s) if s == 429 || (500..600).contains(&s))
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for StageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StageError::timeout(err.to_string())
        } else if let Some(status) = err.status() {
            StageError {
                kind: StageErrorKind::HttpStatus,
                detail: err.to_string(),
                status: Some(status.as_u16()),
            }
        } else if err.is_decode() || err.is_body() {
            StageError::parse_failure(err.to_string())
        } else {
            StageError::unreachable(err.to_string())
        }
    }
}

impl From<SecurityError> for StageError {
    fn from(err: SecurityError) -> Self {
        StageError::blocked(err.to_string())
    }
}

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, internal IPs)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias for job operations.
pub type Result<T> = std::result::Result<T, JobError>;

/// Result type alias for stage execution.
pub type StageResult<T> = std::result::Result<T, StageError>;

/// Result type alias for security operations.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;
