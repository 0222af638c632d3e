pub mod http;
pub mod openai;
pub mod prep;
pub mod types;
pub mod vision;

use crate::config::Config;
use crate::dataset::RecordKey;
use crate::error::{AuditError, StageError};
use std::fmt;

pub use types::{ExtractedText, RawDocument, ResolvedLocation, StructuredResult};

/// Resolves a record to the address of its scanned result sheet.
pub trait Locator: Send + Sync {
    fn locate(&self, key: &RecordKey) -> Result<ResolvedLocation, StageError>;
}

/// Fetches a document and runs OCR over it.
///
/// Errors must be `FetchError` or `OcrServiceError` so the failing stage is known.
pub trait Ingestor: Send + Sync {
    fn ingest(&self, address: &str) -> Result<ExtractedText, StageError>;
}

/// Turns OCR text into structured fields via a language model.
pub trait Extractor: Send + Sync {
    fn extract(&self, text: &ExtractedText) -> Result<StructuredResult, StageError>;
}

/// Text recognition over raw document bytes.
pub trait OcrService: Send + Sync {
    fn recognize(&self, doc: &RawDocument) -> Result<ExtractedText, StageError>;
}

/// The two API keys the run needs, looked up from the variables named in the config.
#[derive(Clone)]
pub struct Credentials {
    pub ocr_key: String,
    pub extractor_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ocr_key", &"<redacted>")
            .field("extractor_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_env(cfg: &Config) -> Result<Self, AuditError> {
        Self::from_lookup(cfg, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        cfg: &Config,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AuditError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let ocr_key = get(&cfg.ocr.api_key_env);
        let extractor_key = get(&cfg.extractor.api_key_env);

        match (ocr_key, extractor_key) {
            (Some(ocr_key), Some(extractor_key)) => Ok(Self {
                ocr_key,
                extractor_key,
            }),
            (ocr_key, extractor_key) => {
                let mut missing = Vec::new();
                if ocr_key.is_none() {
                    missing.push(cfg.ocr.api_key_env.clone());
                }
                if extractor_key.is_none() {
                    missing.push(cfg.extractor.api_key_env.clone());
                }
                Err(AuditError::MissingCredentials(missing))
            }
        }
    }
}
