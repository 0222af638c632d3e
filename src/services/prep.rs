use super::http::{RetryPolicy, build_client, send_for_bytes};
use super::{Locator, ResolvedLocation};
use crate::config::Config;
use crate::dataset::RecordKey;
use crate::error::StageError;
use anyhow::{Result, anyhow};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

/// Locator backed by the per-section JSON listings of the preliminary results site.
pub struct PrepLocator {
    client: Client,
    url_template: String,
    retry: RetryPolicy,
    max_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct Listing {
    casillas: Vec<ListingEntry>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    url: String,
}

impl PrepLocator {
    pub fn new(cfg: &Config) -> Result<Self> {
        let template = &cfg.locator.url_template;
        if !template.contains("{entity}") || !template.contains("{section}") {
            return Err(anyhow!(
                "locator.url_template must contain {{entity}} and {{section}}: {template}"
            ));
        }
        Ok(Self {
            client: build_client(cfg.locator.timeout_seconds)?,
            url_template: template.clone(),
            retry: RetryPolicy::from_config(&cfg.retry),
            max_bytes: cfg.fetch.max_document_bytes,
        })
    }

    pub fn lookup_url(&self, key: &RecordKey) -> String {
        lookup_url(&self.url_template, key)
    }
}

pub fn lookup_url(template: &str, key: &RecordKey) -> String {
    template
        .replace("{entity}", &key.entity.to_string())
        .replace("{section}", &key.section.to_string())
}

/// Parses a listing body. An empty `casillas` list means nothing is published
/// yet; a body without that list is a malformed response.
pub fn parse_listing(body: &[u8]) -> Result<ResolvedLocation, StageError> {
    let listing: Listing =
        serde_json::from_slice(body).map_err(|e| StageError::MalformedResponse(e.to_string()))?;
    // First entry wins: it is the document the audit reads.
    Ok(match listing.casillas.into_iter().next() {
        Some(entry) => ResolvedLocation::Present(entry.url),
        None => ResolvedLocation::Absent,
    })
}

impl Locator for PrepLocator {
    fn locate(&self, key: &RecordKey) -> Result<ResolvedLocation, StageError> {
        let url = self.lookup_url(key);
        debug!("locate {key} via {url}");
        let body = self
            .retry
            .run("locate", || send_for_bytes(self.client.get(&url), self.max_bytes))
            .map_err(StageError::LocatorUnavailable)?;
        parse_listing(&body)
    }
}
