//! DuckDuckGo Instant Answer API client
//!
//! Single GET against a fixed endpoint with bounded, linearly backed-off
//! retries. The JSON body is handed back as a [`RawAnswer`] without schema
//! validation; the normalizer copes with whatever shape arrives.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::answer::RawAnswer;

pub const DDG_API_BASE: &str = "https://api.duckduckgo.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, thiserror::Error)]
pub enum DuckDuckGoError {
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Failed to fetch DuckDuckGo results after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Why a single attempt failed. Every variant is retryable.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("HTTP error! status: {0}")]
    Status(u16),
    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

/// Retry budget: `max_attempts` tries in total, waiting `base_delay * n`
/// after the n-th failed attempt (never after the last one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (1-based), or `None` when
    /// the budget is spent.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts.max(1) {
            None
        } else {
            Some(self.base_delay * attempt)
        }
    }
}

enum RetryState {
    Attempt(u32),
    Wait { after: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

/// Anything that can turn a query into a raw answer
#[async_trait]
pub trait AnswerSource: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<RawAnswer, DuckDuckGoError>;
}

#[derive(Debug, Clone)]
pub struct DuckDuckGoClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl DuckDuckGoClient {
    pub fn new() -> Result<Self, DuckDuckGoError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("freesearch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: DDG_API_BASE.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Point the client at another host (used for tests and mirrors)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Full request URL for a query
    pub fn search_url(&self, query: &str) -> String {
        format!(
            "{}/?q={}&format=json&no_html=1&skip_disambig=1",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(query)
        )
    }

    /// Fetch the raw answer for `query`, retrying failed attempts
    pub async fn fetch(&self, query: &str) -> Result<RawAnswer, DuckDuckGoError> {
        let url = self.search_url(query);
        let mut last_error = String::new();
        let mut state = RetryState::Attempt(1);

        loop {
            state = match state {
                RetryState::Attempt(n) => match self.attempt(&url).await {
                    Ok(answer) => {
                        if n > 1 {
                            info!("DuckDuckGo fetch succeeded on attempt {}", n);
                        }
                        return Ok(answer);
                    }
                    Err(e) => {
                        warn!(
                            "DuckDuckGo attempt {}/{} failed: {}",
                            n, self.retry.max_attempts, e
                        );
                        last_error = e.to_string();
                        match self.retry.delay_after(n) {
                            Some(delay) => RetryState::Wait { after: n, delay },
                            None => RetryState::Exhausted { attempts: n },
                        }
                    }
                },
                RetryState::Wait { after, delay } => {
                    debug!("Retrying DuckDuckGo in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    RetryState::Attempt(after + 1)
                }
                RetryState::Exhausted { attempts } => {
                    return Err(DuckDuckGoError::Exhausted {
                        attempts,
                        last_error,
                    });
                }
            };
        }
    }

    async fn attempt(&self, url: &str) -> Result<RawAnswer, AttemptError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status.as_u16()));
        }

        // DDG serves JSON as application/x-javascript, so don't rely on the content type
        let body: serde_json::Value = response.json().await?;
        Ok(RawAnswer::from_value(body))
    }
}

#[async_trait]
impl AnswerSource for DuckDuckGoClient {
    async fn fetch(&self, query: &str) -> Result<RawAnswer, DuckDuckGoError> {
        DuckDuckGoClient::fetch(self, query).await
    }
}
