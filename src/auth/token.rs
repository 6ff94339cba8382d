//! Identity token caching.
//!
//! Tokens survive process restarts via a small JSON file in scratch
//! storage. Several processes may share that file; reads are defensive
//! (anything unreadable is a cache miss) and writes are atomic
//! (write-to-temp-then-rename), so concurrent writers resolve
//! last-writer-wins. A stale overwrite costs at most one extra handshake.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

/// Assumed token lifetime in minutes.
/// The service does not publish a TTL; observed tokens stay valid for
/// many hours, so 12h keeps re-handshakes rare while bounding staleness.
const TOKEN_TTL_MINUTES: i64 = 720;

/// Lookahead window before expiry that triggers a proactive refresh, so a
/// token never expires in the middle of an upload/poll/download cycle.
const REFRESH_MARGIN_MINUTES: i64 = 10;

/// Cached identity token with its acquisition time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,
    pub acquired_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn new(token: String) -> Self {
        Self {
            token,
            acquired_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.acquired_at + Duration::minutes(TOKEN_TTL_MINUTES)
    }

    /// True while the token is safely usable: not expired and not inside
    /// the refresh lookahead window.
    pub fn is_usable(&self) -> bool {
        let refresh_at =
            self.acquired_at + Duration::minutes(TOKEN_TTL_MINUTES - REFRESH_MARGIN_MINUTES);
        Utc::now() < refresh_at
    }
}

/// Injectable token store seam.
///
/// The facade only ever talks to this trait, so tests (and embedders that
/// want no disk state) can substitute `MemoryTokenStore`.
pub trait TokenStore: Send + Sync {
    /// Read the cached token. Absent, unreadable, or structurally invalid
    /// cache is a miss, never an error.
    fn load(&self) -> Option<SessionToken>;

    /// Persist a freshly acquired token.
    fn save(&self, token: &SessionToken) -> Result<()>;

    /// Drop the cached token (e.g. after the service rejected it).
    fn clear(&self);
}

/// Token store backed by a JSON file in scratch storage.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<SessionToken> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No readable token cache");
                return None;
            }
        };
        match serde_json::from_str::<SessionToken>(&contents) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt token cache, ignoring");
                None
            }
        }
    }

    fn save(&self, token: &SessionToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Unique temp name so racing writers never clobber each other's
        // half-written file; rename makes the replacement atomic.
        let tmp = self
            .path
            .with_extension(format!("tmp.{}", Uuid::new_v4().simple()));
        let contents = serde_json::to_string_pretty(token)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "Token cache updated");
        Ok(())
    }

    fn clear(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to clear token cache");
            }
        }
    }
}

/// In-process token store for tests and embedders without disk state.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Option<SessionToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: SessionToken) -> Self {
        Self {
            inner: Mutex::new(Some(token)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<SessionToken> {
        self.inner.lock().expect("token store lock poisoned").clone()
    }

    fn save(&self, token: &SessionToken) -> Result<()> {
        *self.inner.lock().expect("token store lock poisoned") = Some(token.clone());
        Ok(())
    }

    fn clear(&self) {
        *self.inner.lock().expect("token store lock poisoned") = None;
    }
}
