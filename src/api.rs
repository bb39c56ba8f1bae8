//! HTTP fetching with bounded exponential-backoff retry.
//!
//! # Architecture
//!
//! The module uses a trait-based design:
//! - [`Fetch`]: core trait for "GET this URL, give me the body"
//! - [`HttpFetch`]: a single attempt over a shared `reqwest::Client`
//! - [`RetryFetch`]: decorator that retries transient failures of any [`Fetch`]
//!
//! # Retry Policies
//!
//! Two retry configurations exist and are deliberately kept apart because
//! they produce different timing:
//!
//! | Policy | Attempts | Delays | Retries on |
//! |--------|----------|--------|------------|
//! | [`RetryPolicy::FEED`] | 1 + 5 retries | 1s, 2s, 4s, 8s, 16s | 500/502/503/504, transport errors |
//! | [`RetryPolicy::ARTICLE`] | 3 | 1s, 2s | any extraction error |

use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// Statuses treated as transient server failures.
pub const RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Errors returned by [`Fetch`] implementations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, TLS, timeout, body read).
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The server answered with a non-2xx status.
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
}

impl FetchError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(e) => !e.is_builder() && !e.is_redirect(),
            FetchError::HttpStatus(code) => RETRY_STATUSES.contains(code),
        }
    }
}

/// Attempt budget and backoff schedule for one kind of operation.
///
/// The delay before retry `n` (1-based) is `base_delay * 2^(n-1)`; no delay
/// follows the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: StdDuration,
}

impl RetryPolicy {
    /// Policy of the generic fetcher: one attempt plus five retries.
    pub const FEED: RetryPolicy = RetryPolicy {
        max_attempts: 6,
        base_delay: StdDuration::from_secs(1),
    };

    /// Policy of the article extractor: three attempts in total.
    pub const ARTICLE: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        base_delay: StdDuration::from_secs(1),
    };

    /// Same attempt budget with no waiting.
    #[cfg(test)]
    pub const fn without_delay(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: StdDuration::ZERO,
        }
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> StdDuration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exp)
    }
}

/// Trait for fetching the body of a URL.
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// A single GET over a shared client. Non-2xx statuses are errors.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: Client,
}

impl HttpFetch {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Fetch for HttpFetch {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        if let Some(e) = status_error(response.status()) {
            return Err(e);
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Wrapper that adds exponential backoff retry to any [`Fetch`] implementation.
///
/// Only transient failures ([`FetchError::is_transient`]) are retried; any
/// other error is returned straight away.
pub struct RetryFetch<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Fetch> RetryFetch<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T: Fetch> Fetch for RetryFetch<T> {
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let e = match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if !e.is_transient() {
                error!(attempt, error = %e, "fetch failed with a non-retryable error");
                return Err(e);
            }

            if attempt >= self.policy.max_attempts {
                error!(
                    attempt,
                    max = self.policy.max_attempts,
                    elapsed_ms_total = total_t0.elapsed().as_millis(),
                    error = %e,
                    "fetch exhausted retries"
                );
                return Err(e);
            }

            let delay = self.policy.delay_after(attempt);
            warn!(
                attempt,
                max = self.policy.max_attempts,
                ?delay,
                error = %e,
                "fetch attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }
}

/// Treat a status code the way [`HttpFetch`] does.
pub fn status_error(status: StatusCode) -> Option<FetchError> {
    (!status.is_success()).then(|| FetchError::HttpStatus(status.as_u16()))
}
