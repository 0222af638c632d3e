use super::http::{RetryPolicy, build_client, send_for_bytes};
use super::{ExtractedText, Extractor, StructuredResult};
use crate::config::Config;
use crate::error::{ServiceFailure, StageError};
use anyhow::Result;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_COMPLETION_RESPONSE_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct ChatExtractor {
    client: Client,
    base_url: String,
    model: String,
    instruction: String,
    temperature: f32,
    max_tokens: u32,
    api_key: String,
    retry: RetryPolicy,
}

impl ChatExtractor {
    pub fn new(cfg: &Config, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(cfg.extractor.timeout_seconds)?,
            base_url: cfg.extractor.base_url.clone(),
            model: cfg.extractor.model.clone(),
            instruction: cfg.extractor.instruction.clone(),
            temperature: cfg.extractor.temperature,
            max_tokens: cfg.extractor.max_tokens,
            api_key: api_key.to_string(),
            retry: RetryPolicy::from_config(&cfg.retry),
        })
    }

    /// Resolve the chat completions endpoint from the base URL.
    pub fn endpoint(&self) -> String {
        completions_endpoint(&self.base_url)
    }

    pub fn prompt(&self, text: &ExtractedText) -> String {
        build_prompt(&self.instruction, text)
    }
}

pub fn completions_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

pub fn build_prompt(instruction: &str, text: &ExtractedText) -> String {
    format!("{instruction}\n{}", text.as_str())
}

/// Returns `choices[0].message.content` verbatim; a null content is an empty result.
pub fn parse_completion(body: &[u8]) -> Result<StructuredResult, StageError> {
    let fail = |msg: String| StageError::ExtractionServiceError(ServiceFailure::new(None, msg));
    let json: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| fail(format!("unreadable response: {e}")))?;
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| fail("response carried no choices".to_string()))?;
    let content = choice["message"]["content"].as_str().unwrap_or("");
    Ok(StructuredResult(content.to_string()))
}

impl Extractor for ChatExtractor {
    fn extract(&self, text: &ExtractedText) -> Result<StructuredResult, StageError> {
        let messages = vec![Message {
            role: "user".to_string(),
            content: self.prompt(text),
        }];
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let endpoint = self.endpoint();
        debug!("extract chars={} endpoint={endpoint}", text.as_str().len());

        let raw = self
            .retry
            .run("extract", || {
                let req = self
                    .client
                    .post(&endpoint)
                    .bearer_auth(&self.api_key)
                    .json(&body);
                send_for_bytes(req, MAX_COMPLETION_RESPONSE_BYTES)
            })
            .map_err(StageError::ExtractionServiceError)?;
        parse_completion(&raw)
    }
}
