//! Authenticated API client for the task endpoints.
//!
//! Wraps the transport with session handling: every request carries the
//! fingerprint headers plus the identity token, a cached token is reused
//! until it nears expiry, and a 401 triggers exactly one transparent
//! re-authenticate-and-retry cycle before surfacing as an auth failure.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::{Authenticator, DeviceIds, SessionToken, TokenStore};
use crate::config::ReminiConfig;
use crate::error::{ReminiError, Result};
use crate::models::task::{
    CreateTaskRequest, CreateTaskResponse, ReprocessRequest, ReprocessResponse,
    TaskStatusResponse,
};
use crate::models::{Feature, ImageMetadata, ProcessOptions};

use super::transport::Transport;

/// One image ready for upload.
#[derive(Debug)]
pub(crate) struct ImagePayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub metadata: ImageMetadata,
}

impl ImagePayload {
    /// Base64-encoded MD5 digest, the checksum format the API expects.
    pub fn md5_base64(&self) -> String {
        BASE64.encode(Md5::digest(&self.bytes))
    }
}

pub(crate) struct ApiClient {
    transport: Transport,
    config: Arc<ReminiConfig>,
    device: DeviceIds,
    authenticator: Authenticator,
    store: Arc<dyn TokenStore>,
    /// In-memory session shared by concurrent operations on one client.
    /// Refresh races resolve last-writer-wins; the loser costs one extra
    /// handshake on its next 401, nothing more.
    session: RwLock<Option<SessionToken>>,
}

impl ApiClient {
    pub fn new(config: Arc<ReminiConfig>, store: Arc<dyn TokenStore>) -> Result<Self> {
        let transport = Transport::new(&config)?;
        let device = DeviceIds::generate(&config.fingerprint.bsp_id);
        let authenticator =
            Authenticator::new(transport.clone(), Arc::clone(&config), device.clone());
        Ok(Self {
            transport,
            config,
            device,
            authenticator,
            store,
            session: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &ReminiConfig {
        &self.config
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Establish a usable session and return its token.
    ///
    /// Order of preference: in-memory token, cached token from the store
    /// (verified against the profile endpoint), fresh handshake. Exactly
    /// one handshake happens when the cache is cold or stale.
    pub async fn login(&self) -> Result<String> {
        {
            let session = self.session.read().await;
            if let Some(token) = session.as_ref() {
                if token.is_usable() {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut session = self.session.write().await;
        // Another task may have logged in while we waited for the lock
        if let Some(token) = session.as_ref() {
            if token.is_usable() {
                return Ok(token.token.clone());
            }
        }

        if let Some(cached) = self.store.load() {
            if cached.is_usable() && self.authenticator.activate(&cached.token).await? {
                info!("Logged in with cached identity token");
                let token = cached.token.clone();
                *session = Some(cached);
                return Ok(token);
            }
            debug!("Cached token unusable, discarding");
            self.store.clear();
        }

        let fresh = self.handshake().await?;
        let token = fresh.token.clone();
        *session = Some(fresh);
        Ok(token)
    }

    /// Drop the current session and acquire a fresh one. Used for the
    /// single re-auth cycle after a 401.
    async fn refresh_session(&self) -> Result<String> {
        let mut session = self.session.write().await;
        *session = None;
        self.store.clear();
        let fresh = self.handshake().await?;
        let token = fresh.token.clone();
        *session = Some(fresh);
        Ok(token)
    }

    async fn handshake(&self) -> Result<SessionToken> {
        let fresh = self.authenticator.authenticate().await?;
        if !self.authenticator.activate(&fresh.token).await? {
            return Err(ReminiError::Auth(
                "failed to activate user profile with a fresh token".to_string(),
            ));
        }
        self.store.save(&fresh)?;
        info!("New identity token acquired and activated");
        Ok(fresh)
    }

    /// Send an authenticated request, running one re-auth cycle on 401.
    ///
    /// Returns the response without judging non-401 statuses; callers map
    /// those. A 401 that survives re-authentication is returned as-is and
    /// becomes `ReminiError::Auth` at the caller's status check.
    async fn authed_send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&HeaderMap) -> RequestBuilder,
    {
        let token = self.login().await?;
        let headers = self
            .config
            .fingerprint
            .base_headers(&self.device, Some(&token))?;

        let response = self
            .transport
            .send_with_retry(|| build(&headers))
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("Request returned 401, re-authenticating once");
        let token = self.refresh_session().await?;
        let headers = self
            .config
            .fingerprint
            .base_headers(&self.device, Some(&token))?;
        self.transport.send_with_retry(|| build(&headers)).await
    }

    /// Create a task and upload the image, returning the task id.
    pub async fn submit(
        &self,
        payload: &ImagePayload,
        feature: Feature,
        options: ProcessOptions,
    ) -> Result<String> {
        if payload.bytes.is_empty() {
            return Err(ReminiError::Api(
                "refusing to submit an empty image payload".to_string(),
            ));
        }

        let request = CreateTaskRequest {
            image_content_type: payload.content_type.clone(),
            image_md5: payload.md5_base64(),
            feature,
            metadata: payload.metadata.clone(),
            options,
        };

        let url = self.config.tasks_url();
        let response = self
            .authed_send(|headers| {
                self.transport
                    .http()
                    .post(&url)
                    .headers(headers.clone())
                    .json(&request)
            })
            .await?;
        let response = Transport::expect_success(response).await?;

        let created: CreateTaskResponse = response
            .json()
            .await
            .map_err(|e| ReminiError::Api(format!("unreadable task response: {}", e)))?;
        let (task_id, upload_url) = match (created.task_id, created.upload_url) {
            (Some(task_id), Some(upload_url)) => (task_id, upload_url),
            _ => {
                return Err(ReminiError::Api(
                    "task response missing task_id or upload_url".to_string(),
                ))
            }
        };

        debug!(task_id = %task_id, size = payload.bytes.len(), "Uploading image");
        self.upload_image(&upload_url, payload, &created.upload_headers)
            .await?;
        Ok(task_id)
    }

    /// PUT the raw image bytes to the signed storage URL.
    ///
    /// This request does not carry the identity token; the URL itself is
    /// the credential, plus whatever headers the task response dictated.
    async fn upload_image(
        &self,
        upload_url: &str,
        payload: &ImagePayload,
        upload_headers: &HashMap<String, String>,
    ) -> Result<()> {
        let response = self
            .transport
            .send_with_retry(|| {
                let mut request = self
                    .transport
                    .http()
                    .put(upload_url)
                    .timeout(self.transport.transfer_timeout());
                for (name, value) in upload_headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                request
                    .header(CONTENT_LENGTH, payload.bytes.len())
                    .header(USER_AGENT, &self.config.fingerprint.user_agent)
                    .body(payload.bytes.clone())
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReminiError::Api(format!(
                "image upload rejected with status {}: {}",
                status,
                ReminiError::truncate_body(&body)
            )));
        }
        Ok(())
    }

    /// Kick the uploaded task into processing.
    pub async fn start_processing(&self, task_id: &str) -> Result<()> {
        let url = self.config.process_url(task_id);
        let response = self
            .authed_send(|headers| {
                self.transport
                    .http()
                    .post(&url)
                    .headers(headers.clone())
                    .header(CONTENT_LENGTH, 0)
            })
            .await?;
        Transport::expect_success(response).await?;
        Ok(())
    }

    /// Query task status. `None` means the task is not registered yet
    /// (404), which the poller treats as still queued.
    pub async fn task_status(&self, task_id: &str) -> Result<Option<TaskStatusResponse>> {
        let url = self.config.task_url(task_id);
        let response = self
            .authed_send(|headers| self.transport.http().get(&url).headers(headers.clone()))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Transport::expect_success(response).await?;
        let snapshot = response
            .json()
            .await
            .map_err(|e| ReminiError::Api(format!("unreadable status response: {}", e)))?;
        Ok(Some(snapshot))
    }

    /// Reprocess a completed task with a new feature, returning the id of
    /// the follow-up task.
    pub async fn reprocess(&self, base_task_id: &str, feature: Feature) -> Result<String> {
        let url = self.config.reprocess_url(base_task_id);
        let request = ReprocessRequest { feature };
        let response = self
            .authed_send(|headers| {
                self.transport
                    .http()
                    .post(&url)
                    .headers(headers.clone())
                    .json(&request)
            })
            .await?;
        let response = Transport::expect_success(response).await?;

        let reprocessed: ReprocessResponse = response
            .json()
            .await
            .map_err(|e| ReminiError::Api(format!("unreadable reprocess response: {}", e)))?;
        reprocessed.task_id.ok_or_else(|| {
            ReminiError::Api("reprocess response did not include a new task id".to_string())
        })
    }
}
