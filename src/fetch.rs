//! Retrying HTTP fetcher for the killmail feed
//!
//! Wraps the two feed endpoints behind the `KillmailSource` trait:
//! - `GET {base}/sequence.json` -> current sequence number
//! - `GET {base}/{N}.json` -> killmail at sequence N, or 404 while N is not
//!   yet published
//!
//! Status handling:
//! - 404 with `allow_not_found` is the normal "not yet available" signal
//! - 429 retries after a fixed backoff, bounded by `MAX_RETRIES`
//! - any other non-success status or transport failure fails immediately
//!
//! The 429 backoff selects against the shutdown token so a stop request
//! never waits out the delay.

use crate::killmail::Killmail;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SLEEP_ON_429: Duration = Duration::from_secs(2);
const MAX_RETRIES: u32 = 5;

#[derive(Debug)]
pub enum FetchError {
    /// 404 on an endpoint that must exist
    NotFound,
    /// 429 persisted beyond the retry bound
    RateLimited,
    /// Non-success status or connection-level failure
    Transport(String),
    /// Response body did not parse as the expected document
    Parse(String),
    /// Shutdown was signaled during a retry backoff
    Cancelled,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::NotFound => write!(f, "Resource not found"),
            FetchError::RateLimited => write!(f, "Rate limited beyond retry bound"),
            FetchError::Transport(e) => write!(f, "Transport error: {}", e),
            FetchError::Parse(e) => write!(f, "Parse error: {}", e),
            FetchError::Cancelled => write!(f, "Cancelled by shutdown"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Source of sequence-ordered killmails
///
/// The poller is written against this trait so tests can drive it with a
/// scripted fake instead of a live endpoint.
#[async_trait]
pub trait KillmailSource: Send + Sync {
    /// Current live-edge sequence number of the feed
    async fn current_sequence(&self) -> Result<u64, FetchError>;

    /// Killmail at a sequence number; None while not yet published
    async fn killmail(&self, sequence_id: u64) -> Result<Option<Killmail>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct SequenceResponse {
    sequence_id: u64,
}

/// reqwest-backed feed client with bounded 429 retries
pub struct ZkbClient {
    client: reqwest::Client,
    base_url: String,
    shutdown: Shutdown,
    retry_backoff: Duration,
}

impl ZkbClient {
    pub fn new(base_url: &str, shutdown: Shutdown) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("killfeed/0.1"));

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            shutdown,
            retry_backoff: SLEEP_ON_429,
        })
    }

    /// Override the 429 backoff delay (tests)
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Issue one GET, retrying on 429 up to the bound.
    ///
    /// Returns Ok(None) only for an allowed 404.
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        allow_not_found: bool,
    ) -> Result<Option<T>, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;

        loop {
            let response = self.client.get(&url).send().await?;
            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                if allow_not_found {
                    return Ok(None);
                }
                return Err(FetchError::NotFound);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt < MAX_RETRIES {
                    attempt += 1;
                    log::warn!("⏳ Rate limited (429), retry {}/{}", attempt, MAX_RETRIES);
                    if self.shutdown.sleep(self.retry_backoff).await {
                        return Err(FetchError::Cancelled);
                    }
                    continue;
                }
                return Err(FetchError::RateLimited);
            }

            if !status.is_success() {
                return Err(FetchError::Transport(format!(
                    "unexpected status {} for {}",
                    status, url
                )));
            }

            let body = response
                .json::<T>()
                .await
                .map_err(|e| FetchError::Parse(e.to_string()))?;
            return Ok(Some(body));
        }
    }
}

#[async_trait]
impl KillmailSource for ZkbClient {
    async fn current_sequence(&self) -> Result<u64, FetchError> {
        match self.request::<SequenceResponse>("/sequence.json", false).await? {
            Some(response) => Ok(response.sequence_id),
            // allow_not_found is false on this endpoint, so None is unreachable
            None => Err(FetchError::NotFound),
        }
    }

    async fn killmail(&self, sequence_id: u64) -> Result<Option<Killmail>, FetchError> {
        self.request::<Killmail>(&format!("/{}.json", sequence_id), true)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(FetchError::NotFound.to_string(), "Resource not found");
        assert!(FetchError::Transport("boom".to_string())
            .to_string()
            .contains("boom"));
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = ZkbClient::new("http://127.0.0.1:1/feed/", Shutdown::new()).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:1/feed");
    }
}
