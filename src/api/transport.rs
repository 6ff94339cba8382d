//! HTTP transport with retry.
//!
//! One `reqwest::Client` (shared connection pool, cheap to clone) plus the
//! retry policy for transient failures: network errors, 5xx, and explicit
//! rate limiting (429) are retried with exponential backoff and jitter.
//! Client errors are never retried here; 401 in particular is passed up so
//! the API layer can run its single re-authenticate-and-retry cycle.

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::{ReminiConfig, RetryPolicy};
use crate::error::{ReminiError, Result, TransportCause};

#[derive(Clone)]
pub(crate) struct Transport {
    http: Client,
    retry: RetryPolicy,
    transfer_timeout: Duration,
}

impl Transport {
    pub fn new(config: &ReminiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ReminiError::Transport {
                attempts: 0,
                source: TransportCause::Network(e),
            })?;
        Ok(Self {
            http,
            retry: config.retry.clone(),
            transfer_timeout: config.transfer_timeout,
        })
    }

    /// The underlying client, for callers that build their own requests.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Timeout override for bulk image transfers (upload/download).
    pub fn transfer_timeout(&self) -> Duration {
        self.transfer_timeout
    }

    /// Send a request, retrying transient failures.
    ///
    /// The request is rebuilt for each attempt via `build`, the same shape
    /// as retrying in a loop but without cloning request bodies. Returns
    /// the response for any non-retryable status; callers decide what a
    /// 4xx means for them.
    pub async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = build().send().await;

            let cause = match outcome {
                Ok(response) if !is_retryable_status(response.status()) => {
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    TransportCause::Status {
                        status,
                        body: ReminiError::truncate_body(&body),
                    }
                }
                Err(e) if is_transient(&e) => TransportCause::Network(e),
                Err(e) => {
                    return Err(ReminiError::Transport {
                        attempts: attempt,
                        source: TransportCause::Network(e),
                    });
                }
            };

            if attempt > self.retry.max_retries {
                warn!(attempts = attempt, error = %cause, "Retries exhausted");
                return Err(ReminiError::Transport {
                    attempts: attempt,
                    source: cause,
                });
            }

            let delay = backoff_delay(&self.retry, attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, error = %cause, "Transient failure, backing off");
            tokio::time::sleep(delay).await;
        }
    }

    /// Map a non-success response to the appropriate domain error.
    pub async fn expect_success(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ReminiError::from_status(status, &body))
        }
    }
}

/// Statuses worth retrying: server-side failures and explicit rate limits.
fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Network faults worth retrying: connection failures and timeouts.
/// Anything else (TLS, malformed URL, body errors) fails immediately.
fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Exponential backoff capped at `max_backoff`, plus up to 25% jitter so
/// concurrent clients do not retry in lockstep.
fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy
        .initial_backoff
        .saturating_mul(1u32 << (attempt - 1).min(16))
        .min(policy.max_backoff);
    let jitter_ms = if base.as_millis() > 0 {
        rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4)
    } else {
        0
    };
    base + Duration::from_millis(jitter_ms)
}
