use std::fmt;
use std::io;

use thiserror::Error;

use crate::outcome::Stage;

/// Errors that end a run before (or instead of) producing a report.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("missing credentials: {} not set", .0.join(", "))]
    MissingCredentials(Vec<String>),
    #[error("dataset {path}: {details}")]
    Dataset { path: String, details: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A failed call to a remote service, with the HTTP status when one was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFailure {
    pub status: Option<u16>,
    pub message: String,
}

impl ServiceFailure {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn credentials_rejected(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "HTTP {code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Per-record failure. Never fatal to the run; recorded as a failure outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("locator unavailable: {0}")]
    LocatorUnavailable(ServiceFailure),
    #[error("malformed locator response: {0}")]
    MalformedResponse(String),
    #[error("no document published yet")]
    NotPublished,
    #[error("document fetch failed: {0}")]
    FetchError(ServiceFailure),
    #[error("ocr service error: {0}")]
    OcrServiceError(ServiceFailure),
    #[error("extraction service error: {0}")]
    ExtractionServiceError(ServiceFailure),
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::LocatorUnavailable(_) | Self::MalformedResponse(_) | Self::NotPublished => {
                Stage::Locate
            }
            Self::FetchError(_) => Stage::Fetch,
            Self::OcrServiceError(_) => Stage::Ocr,
            Self::ExtractionServiceError(_) => Stage::Extract,
        }
    }

    /// Stable identifier written to the report's `reason_kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocatorUnavailable(_) => "locator_unavailable",
            Self::MalformedResponse(_) => "malformed_response",
            Self::NotPublished => "not_published",
            Self::FetchError(_) => "fetch_error",
            Self::OcrServiceError(_) => "ocr_service_error",
            Self::ExtractionServiceError(_) => "extraction_service_error",
        }
    }

    /// True when an authenticated service refused our key (revoked or invalid).
    pub fn credentials_rejected(&self) -> bool {
        match self {
            Self::OcrServiceError(f) | Self::ExtractionServiceError(f) => f.credentials_rejected(),
            _ => false,
        }
    }
}
