//! The public client facade.
//!
//! `Remini` composes authentication, upload, polling, and download into
//! the two operations callers actually want: [`Remini::process`] and
//! [`Remini::stylize`].

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::api::{download, poll, ApiClient, ImagePayload};
use crate::auth::{FileTokenStore, TokenStore};
use crate::config::ReminiConfig;
use crate::error::{ReminiError, Result};
use crate::models::task::TaskResult;
use crate::models::{Feature, ImageMetadata, ProcessOptions, Style};

/// Client for the unofficial Remini API.
///
/// Cheap to clone; clones share the connection pool and the in-memory
/// session, so concurrent `process`/`stylize` calls authenticate at most
/// once between them. Each call runs one job end to end and is safe to
/// run alongside others.
///
/// Cancellation: dropping the future returned by any operation stops the
/// pipeline at its next await point. No background tasks are spawned, so
/// nothing keeps running after a drop.
#[derive(Clone)]
pub struct Remini {
    inner: Arc<ApiClient>,
}

impl Remini {
    /// Client with default configuration and the on-disk token cache in
    /// the system temp directory.
    pub fn new() -> Result<Self> {
        Self::with_config(ReminiConfig::default())
    }

    /// Client with custom configuration, keeping the file-backed token
    /// cache at `config.token_path`.
    pub fn with_config(config: ReminiConfig) -> Result<Self> {
        let store = Arc::new(FileTokenStore::new(config.token_path.clone()));
        Self::with_store(config, store)
    }

    /// Client with an injected token store. Tests and embedders that want
    /// no disk state can pass a [`crate::auth::MemoryTokenStore`].
    pub fn with_store(config: ReminiConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(ApiClient::new(Arc::new(config), store)?),
        })
    }

    /// Enhance an image and write the result to `output_path`.
    ///
    /// Fails with [`ReminiError::InputNotFound`] before any network
    /// traffic when `image_path` does not exist. On success the output
    /// file is complete and non-empty; on any failure mid-download no
    /// file is left at `output_path` (the transfer goes through a `.part`
    /// file renamed into place only once the body is fully written).
    pub async fn process(
        &self,
        image_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
    ) -> Result<()> {
        self.process_with_options(image_path, output_path, ProcessOptions::default())
            .await
    }

    /// [`Remini::process`] with explicit task options.
    pub async fn process_with_options(
        &self,
        image_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        options: ProcessOptions,
    ) -> Result<()> {
        let payload = load_image(image_path.as_ref()).await?;
        self.inner.login().await?;

        info!("Submitting image for standard enhancement");
        let result = self
            .run_task(&payload, Feature::enhance(), options)
            .await?;
        self.download(&result, output_path.as_ref()).await
    }

    /// Apply a stylization effect (e.g. [`Style::Toon`]) and write the
    /// result to `output_path`.
    ///
    /// The service requires a completed base enhancement task before it
    /// accepts a stylization, so this runs two jobs: enhance, then
    /// reprocess with the requested pipeline. Failure semantics match
    /// [`Remini::process`].
    pub async fn stylize(
        &self,
        image_path: impl AsRef<Path>,
        style: Style,
        output_path: impl AsRef<Path>,
    ) -> Result<()> {
        let payload = load_image(image_path.as_ref()).await?;
        self.inner.login().await?;

        info!("Creating base task for stylization");
        let base = self
            .run_task(&payload, Feature::enhance(), ProcessOptions::default())
            .await?;

        info!(style = %style, "Reprocessing with stylization pipeline");
        let style_task_id = self
            .inner
            .reprocess(&base.task_id, Feature::stylization(&style))
            .await?;
        let result = self.await_task(&style_task_id).await?;
        self.download(&result, output_path.as_ref()).await
    }

    /// Submit one task, start processing, and wait for its result.
    async fn run_task(
        &self,
        payload: &ImagePayload,
        feature: Feature,
        options: ProcessOptions,
    ) -> Result<TaskResult> {
        let task_id = self.inner.submit(payload, feature, options).await?;
        info!(task_id = %task_id, "Image uploaded");
        self.inner.start_processing(&task_id).await?;
        self.await_task(&task_id).await
    }

    async fn await_task(&self, task_id: &str) -> Result<TaskResult> {
        let api = &self.inner;
        poll::await_completion(task_id, &api.config().poll, || api.task_status(task_id)).await
    }

    async fn download(&self, result: &TaskResult, output_path: &Path) -> Result<()> {
        info!(path = %output_path.display(), "Downloading processed image");
        download::download_to(
            self.inner.transport(),
            &self.inner.config().fingerprint.user_agent,
            &result.output_url,
            output_path,
        )
        .await
    }
}

/// Read the input image and assemble the upload payload.
///
/// The missing-input check runs here, before any authentication or
/// network traffic.
async fn load_image(path: &Path) -> Result<ImagePayload> {
    if !path.exists() {
        return Err(ReminiError::InputNotFound(path.to_path_buf()));
    }
    let bytes = tokio::fs::read(path).await?;
    let metadata = image_metadata(&bytes);
    Ok(ImagePayload {
        content_type: content_type_for(path).to_string(),
        metadata,
        bytes,
    })
}

/// Content type from the file extension; the service assumes JPEG when in
/// doubt, as the official client does.
fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}

#[cfg(feature = "image-metadata")]
fn image_metadata(bytes: &[u8]) -> ImageMetadata {
    let dimensions = image::load_from_memory(bytes)
        .map(|img| (img.width(), img.height()))
        .ok();
    ImageMetadata {
        size: bytes.len() as u64,
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
    }
}

#[cfg(not(feature = "image-metadata"))]
fn image_metadata(bytes: &[u8]) -> ImageMetadata {
    ImageMetadata {
        size: bytes.len() as u64,
        width: None,
        height: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for_known_extensions() {
        assert_eq!(content_type_for(Path::new("a.png")), "image/png");
        assert_eq!(content_type_for(Path::new("a.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("a.webp")), "image/webp");
        assert_eq!(content_type_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.jpeg")), "image/jpeg");
    }

    #[test]
    fn test_content_type_defaults_to_jpeg() {
        assert_eq!(content_type_for(Path::new("mystery")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.tiff")), "image/jpeg");
    }

    #[tokio::test]
    async fn test_load_image_missing_path() {
        let err = load_image(Path::new("/definitely/not/here.jpg"))
            .await
            .expect_err("missing input must fail");
        match err {
            ReminiError::InputNotFound(path) => {
                assert_eq!(path, Path::new("/definitely/not/here.jpg"))
            }
            other => panic!("expected InputNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_image_reads_bytes_and_size() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let payload = load_image(&path).await.unwrap();
        assert_eq!(payload.bytes, b"not really a png");
        assert_eq!(payload.content_type, "image/png");
        assert_eq!(payload.metadata.size, 16);
    }
}
