use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Maximum length for remote error bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Umbrella error type for every failure the client can surface.
///
/// Callers can match coarsely on `ReminiError` or finely on a variant.
/// Transient network faults are retried inside the transport and only
/// appear here once retries are exhausted.
#[derive(Error, Debug)]
pub enum ReminiError {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("remote API error: {0}")]
    Api(String),

    #[error("request failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportCause,
    },

    #[error("task {task_id} did not finish within {waited:?}")]
    Timeout { task_id: String, waited: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Last underlying cause of a transport failure.
#[derive(Error, Debug)]
pub enum TransportCause {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server responded {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

impl ReminiError {
    /// Truncate a response body so error messages stay loggable
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..end],
                body.len()
            )
        }
    }

    /// Map a non-success HTTP status on an API endpoint to a domain error.
    ///
    /// 401 maps to `Auth` so the caller can run its single
    /// re-authenticate-and-retry cycle; everything else the transport did
    /// not already retry is a remote business failure.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ReminiError::Auth(format!("identity token rejected: {}", truncated)),
            _ => ReminiError::Api(format!("status {}: {}", status, truncated)),
        }
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ReminiError>;
