//! Client configuration.
//!
//! Everything the remote contract or local policy might need tuning for
//! lives here: endpoint base URLs, timeouts, retry policy, polling
//! cadence, and the token cache location. Defaults match the behavior of
//! the official Android client the API expects to see.

use std::path::PathBuf;
use std::time::Duration;

use crate::auth::AppFingerprint;

/// Base URL for the main mobile API (tasks, users)
const API_BASE_URL: &str = "https://a.android.api.remini.ai/v1/mobile";

/// Base URL for the oracle API (settings/handshake)
const ORACLE_BASE_URL: &str = "https://api.remini.ai/v1/mobile/oracle";

/// Token cache file name in the temp directory
const TOKEN_FILE: &str = "remini_identity_token.json";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Timeout for the raw image upload and result download.
/// Transfers of large images can legitimately take minutes on slow links.
const TRANSFER_TIMEOUT_SECS: u64 = 120;

/// Maximum number of retries for transient failures (network, 5xx, 429).
const MAX_TRANSIENT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds between retries.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Cap on the backoff delay so retries stay responsive.
const MAX_BACKOFF_MS: u64 = 8000;

/// Delay between successive job-status polls.
const POLL_INTERVAL_SECS: u64 = 5;

/// Cap on the poll interval as it backs off for slow jobs.
const MAX_POLL_INTERVAL_SECS: u64 = 15;

/// Overall deadline for one job to complete.
const MAX_WAIT_SECS: u64 = 600;

/// Retry policy applied by the transport to transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_TRANSIENT_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

/// Polling cadence for job completion.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the first and between subsequent status queries
    pub interval: Duration,
    /// Cap on the interval as it grows for slow jobs
    pub max_interval: Duration,
    /// Local deadline; exceeding it fails with `ReminiError::Timeout`
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(POLL_INTERVAL_SECS),
            max_interval: Duration::from_secs(MAX_POLL_INTERVAL_SECS),
            max_wait: Duration::from_secs(MAX_WAIT_SECS),
        }
    }
}

/// Full client configuration.
#[derive(Debug, Clone)]
pub struct ReminiConfig {
    pub api_base_url: String,
    pub oracle_base_url: String,
    pub request_timeout: Duration,
    pub transfer_timeout: Duration,
    pub retry: RetryPolicy,
    pub poll: PollConfig,
    /// On-disk location of the cached identity token
    pub token_path: PathBuf,
    /// Header values identifying an accepted client build
    pub fingerprint: AppFingerprint,
}

impl Default for ReminiConfig {
    fn default() -> Self {
        Self {
            api_base_url: API_BASE_URL.to_string(),
            oracle_base_url: ORACLE_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            transfer_timeout: Duration::from_secs(TRANSFER_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            poll: PollConfig::default(),
            token_path: std::env::temp_dir().join(TOKEN_FILE),
            fingerprint: AppFingerprint::default(),
        }
    }
}

impl ReminiConfig {
    pub fn tasks_url(&self) -> String {
        format!("{}/tasks", self.api_base_url)
    }

    pub fn task_url(&self, task_id: &str) -> String {
        format!("{}/tasks/{}", self.api_base_url, task_id)
    }

    pub fn process_url(&self, task_id: &str) -> String {
        format!("{}/tasks/{}/process", self.api_base_url, task_id)
    }

    pub fn reprocess_url(&self, task_id: &str) -> String {
        format!("{}/tasks/{}/reprocess", self.api_base_url, task_id)
    }

    pub fn profile_url(&self) -> String {
        format!("{}/users/@me", self.api_base_url)
    }

    pub fn setup_url(&self) -> String {
        format!("{}/setup", self.oracle_base_url)
    }
}
