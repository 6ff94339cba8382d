//! Authentication handshake against the oracle API.
//!
//! A fresh identity token comes from the `/setup` endpoint, which answers
//! only to requests carrying a full accepted-client fingerprint. The
//! response schema varies between releases, so the token is extracted
//! defensively; any shape mismatch is an [`ReminiError::Auth`], never a
//! raw parse error.

use std::sync::Arc;

use tracing::{debug, info};

use crate::api::Transport;
use crate::config::ReminiConfig;
use crate::error::{ReminiError, Result};

use super::fingerprint::DeviceIds;
use super::token::SessionToken;

pub(crate) struct Authenticator {
    transport: Transport,
    config: Arc<ReminiConfig>,
    device: DeviceIds,
}

impl Authenticator {
    pub fn new(transport: Transport, config: Arc<ReminiConfig>, device: DeviceIds) -> Self {
        Self {
            transport,
            config,
            device,
        }
    }

    /// Perform the handshake and return a fresh token.
    ///
    /// Storage is the caller's concern; this only talks to the service.
    pub async fn authenticate(&self) -> Result<SessionToken> {
        info!("Requesting a new identity token");
        let headers = self.config.fingerprint.handshake_headers(&self.device)?;
        let url = self.config.setup_url();

        let response = self
            .transport
            .send_with_retry(|| self.transport.http().get(&url).headers(headers.clone()))
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReminiError::Auth(format!(
                "handshake rejected with status {}: {}",
                status,
                ReminiError::truncate_body(&body)
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ReminiError::Auth(format!("unreadable setup response: {}", e)))?;

        let token = body
            .pointer("/settings/__identity__/token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ReminiError::Auth("token not found in setup response".to_string())
            })?;

        debug!("Handshake succeeded");
        Ok(SessionToken::new(token.to_string()))
    }

    /// Activate a token by fetching the user profile.
    ///
    /// Returns `Ok(false)` when the service rejects the token (it is stale
    /// or revoked); transport-level failures still propagate.
    pub async fn activate(&self, token: &str) -> Result<bool> {
        let headers = self
            .config
            .fingerprint
            .base_headers(&self.device, Some(token))?;
        let url = self.config.profile_url();

        let response = self
            .transport
            .send_with_retry(|| self.transport.http().get(&url).headers(headers.clone()))
            .await?;

        if response.status().is_success() {
            if let Ok(profile) = response.json::<serde_json::Value>().await {
                debug!(balance = ?profile.get("balance"), "User profile activated");
            }
            Ok(true)
        } else {
            debug!(status = %response.status(), "Token rejected during activation");
            Ok(false)
        }
    }
}
