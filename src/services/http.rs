use crate::config::Retry;
use crate::error::ServiceFailure;
use reqwest::blocking::{Client, RequestBuilder};
use std::io::Read;
use std::time::Duration;
use tracing::{debug, warn};

pub fn build_client(timeout_seconds: u64) -> anyhow::Result<Client> {
    let mut builder = Client::builder().user_agent(concat!("acta-audit/", env!("CARGO_PKG_VERSION")));
    if timeout_seconds > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_seconds));
    }
    Ok(builder.build()?)
}

/// Bounded retry with exponential backoff. One attempt means no retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &Retry) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff: Duration::from_millis(cfg.backoff_ms),
        }
    }

    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Wait after the given failed attempt: `backoff * 2^(attempt - 1)`, saturating.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.checked_mul(factor).unwrap_or(Duration::MAX)
    }

    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, ServiceFailure>,
    ) -> Result<T, ServiceFailure> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(err) if attempt < self.max_attempts && is_retryable(&err) => {
                    let wait = self.backoff_for(attempt);
                    warn!("{what} attempt {attempt} failed ({err}); retrying in {wait:?}");
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Transport errors (status `None`), 429 and 5xx.
pub fn is_retryable(err: &ServiceFailure) -> bool {
    match err.status {
        None => true,
        Some(code) => code == 429 || code >= 500,
    }
}

/// Sends the request and returns the body of a 2xx response.
///
/// Any non-2xx status is a failure; the body is not inspected.
pub fn send_for_bytes(req: RequestBuilder, max_bytes: u64) -> Result<Vec<u8>, ServiceFailure> {
    let resp = req.send().map_err(transport_failure)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ServiceFailure::new(
            Some(status.as_u16()),
            status.canonical_reason().unwrap_or("unexpected status"),
        ));
    }

    let mut body = Vec::new();
    let mut limited = resp.take(max_bytes.saturating_add(1));
    limited
        .read_to_end(&mut body)
        .map_err(|e| ServiceFailure::new(None, format!("reading body: {e}")))?;
    if body.len() as u64 > max_bytes {
        return Err(ServiceFailure::new(
            Some(status.as_u16()),
            format!("body exceeds {max_bytes} bytes"),
        ));
    }
    debug!("received {} bytes", body.len());
    Ok(body)
}

/// The request URL is dropped from the message; it may carry credentials.
pub fn transport_failure(err: reqwest::Error) -> ServiceFailure {
    let err = err.without_url();
    let status = err.status().map(|s| s.as_u16());
    if err.is_timeout() {
        ServiceFailure::new(status, format!("timed out: {err}"))
    } else {
        ServiceFailure::new(status, err.to_string())
    }
}
