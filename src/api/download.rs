//! Result download.
//!
//! Streams the processed image to disk through a `.part` file that is
//! renamed into place only after the body completes, so a failed or
//! cancelled download never leaves a plausible-looking partial result at
//! the caller's output path.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::header::USER_AGENT;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{ReminiError, Result, TransportCause};

use super::transport::Transport;

/// Download `url` to `output_path`.
///
/// A 4xx here usually means the result reference expired server-side and
/// surfaces as an API error; network failures keep their transport
/// classification.
pub(crate) async fn download_to(
    transport: &Transport,
    user_agent: &str,
    url: &str,
    output_path: &Path,
) -> Result<()> {
    let response = transport
        .send_with_retry(|| {
            transport
                .http()
                .get(url)
                .timeout(transport.transfer_timeout())
                .header(USER_AGENT, user_agent)
        })
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ReminiError::Api(format!(
            "result download rejected with status {} (reference may have expired): {}",
            status,
            ReminiError::truncate_body(&body)
        )));
    }

    let partial = partial_path(output_path);
    match stream_to_file(response, &partial).await {
        Ok(bytes) => {
            fs::rename(&partial, output_path).await.map_err(|e| {
                // Rename failed; do not leave the .part file behind either
                let _ = std::fs::remove_file(&partial);
                ReminiError::Io(e)
            })?;
            debug!(path = %output_path.display(), bytes, "Download finished");
            Ok(())
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&partial).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %partial.display(), error = %cleanup, "Failed to remove partial download");
                }
            }
            Err(e)
        }
    }
}

fn partial_path(output_path: &Path) -> PathBuf {
    let mut name = output_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let mut file = fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ReminiError::Transport {
            attempts: 1,
            source: TransportCause::Network(e),
        })?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/out.jpg")),
            Path::new("/tmp/out.jpg.part")
        );
    }
}
