use serde::{Deserialize, Serialize};

/// Where a record's scanned result sheet lives, if it has been published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedLocation {
    Present(String),
    Absent,
}

impl ResolvedLocation {
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Present(url) => Some(url.as_str()),
            Self::Absent => None,
        }
    }
}

/// Fetched document bytes; lives only for one ingestion call.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub address: String,
    pub content: Vec<u8>,
}

/// OCR output for one document. Empty when the scan held no detectable text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText(pub String);

impl ExtractedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The model's rendering of a sheet's fields, kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult(pub String);

impl StructuredResult {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
