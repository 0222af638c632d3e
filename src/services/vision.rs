use super::http::{RetryPolicy, build_client, send_for_bytes};
use super::{ExtractedText, Ingestor, OcrService, RawDocument};
use crate::config::Config;
use crate::error::{ServiceFailure, StageError};
use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

/// Response bodies from the annotate endpoint are small; this only guards against garbage.
const MAX_ANNOTATE_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

/// Keeps the key out of the request URL, and so out of transport error text.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Text detection through the Cloud Vision `images:annotate` REST endpoint.
pub struct VisionOcr {
    client: Client,
    endpoint: String,
    api_key: String,
    feature: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    error: Option<RpcStatus>,
}

#[derive(Debug, Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl VisionOcr {
    pub fn new(cfg: &Config, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(cfg.ocr.timeout_seconds)?,
            endpoint: cfg.ocr.endpoint.clone(),
            api_key: api_key.to_string(),
            feature: cfg.ocr.feature.clone(),
            retry: RetryPolicy::from_config(&cfg.retry),
        })
    }
}

impl OcrService for VisionOcr {
    fn recognize(&self, doc: &RawDocument) -> Result<ExtractedText, StageError> {
        let body = serde_json::json!({
            "requests": [{
                "image": { "content": BASE64_STANDARD.encode(&doc.content) },
                "features": [{ "type": self.feature }],
            }]
        });
        let raw = self
            .retry
            .run("ocr", || {
                let req = self
                    .client
                    .post(&self.endpoint)
                    .header(API_KEY_HEADER, self.api_key.as_str())
                    .json(&body);
                send_for_bytes(req, MAX_ANNOTATE_RESPONSE_BYTES)
            })
            .map_err(StageError::OcrServiceError)?;
        parse_annotate_response(&raw)
    }
}

/// Takes the first (full-page) annotation. No annotations is empty text, not an error.
pub fn parse_annotate_response(body: &[u8]) -> Result<ExtractedText, StageError> {
    let resp: AnnotateResponse = serde_json::from_slice(body).map_err(|e| {
        StageError::OcrServiceError(ServiceFailure::new(None, format!("unreadable response: {e}")))
    })?;
    let Some(first) = resp.responses.into_iter().next() else {
        return Ok(ExtractedText::default());
    };
    if let Some(err) = first.error {
        if err.code != 0 {
            return Err(StageError::OcrServiceError(ServiceFailure::new(
                None,
                format!("rpc code {}: {}", err.code, err.message),
            )));
        }
    }
    Ok(first
        .text_annotations
        .into_iter()
        .next()
        .map(|a| ExtractedText(a.description))
        .unwrap_or_default())
}

/// Fetches the sheet over HTTP and hands the bytes to an OCR service.
pub struct DocumentIngestor<O: OcrService> {
    client: Client,
    ocr: O,
    retry: RetryPolicy,
    max_bytes: u64,
}

impl<O: OcrService> DocumentIngestor<O> {
    pub fn new(cfg: &Config, ocr: O) -> Result<Self> {
        Ok(Self {
            client: build_client(cfg.fetch.timeout_seconds)?,
            ocr,
            retry: RetryPolicy::from_config(&cfg.retry),
            max_bytes: cfg.fetch.max_document_bytes,
        })
    }

    pub fn with_client(client: Client, ocr: O, retry: RetryPolicy, max_bytes: u64) -> Self {
        Self {
            client,
            ocr,
            retry,
            max_bytes,
        }
    }

    pub fn fetch(&self, address: &str) -> Result<RawDocument, StageError> {
        let content = self
            .retry
            .run("fetch", || send_for_bytes(self.client.get(address), self.max_bytes))
            .map_err(StageError::FetchError)?;
        debug!("fetched {} bytes from {address}", content.len());
        Ok(RawDocument {
            address: address.to_string(),
            content,
        })
    }
}

impl<O: OcrService> Ingestor for DocumentIngestor<O> {
    fn ingest(&self, address: &str) -> Result<ExtractedText, StageError> {
        let doc = self.fetch(address)?;
        self.ocr.recognize(&doc)
    }
}
