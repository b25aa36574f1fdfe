//! Obtaining archive products.
//!
//! A location is an `http(s)` URL, a `file://` URL or a filesystem path.
//! Downloads are retried with exponential backoff on transient failures
//! (connection errors, timeouts, interrupted bodies, `429` and `5xx`
//! responses). Response bodies are streamed to the destination file; every
//! attempt starts the file over. Local products
//! are copied, recursively for directories, so the source stays intact.

use crate::constants::{DOWNLOAD_RETRIES, DOWNLOAD_RETRY_BASE_MS, DOWNLOAD_RETRY_MAX_DELAY, HTTP_TIMEOUT};
use crate::core::PpError;
use crate::utils::fs::copy_path_async;
use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Http(Url),
    Path(PathBuf),
}

fn parse_location(location: &str) -> Result<Location> {
    match Url::parse(location) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Location::Http(url)),
        Ok(url) if url.scheme() == "file" => url.to_file_path().map(Location::Path).map_err(|()| {
            PpError::ConfigError {
                message: format!("invalid file URL '{location}'"),
            }
            .into()
        }),
        // Anything else, including Windows drive letters parsed as schemes, is a path.
        _ => Ok(Location::Path(PathBuf::from(location))),
    }
}

struct DownloadFailure {
    transient: bool,
    error: anyhow::Error,
}

impl DownloadFailure {
    fn from_reqwest(error: reqwest::Error, url: &Url) -> Self {
        Self {
            transient: error.is_timeout() || error.is_connect() || error.is_request() || error.is_body(),
            error: anyhow::Error::new(error).context(format!("Failed to download {url}")),
        }
    }

    fn from_io(error: std::io::Error, destination: &Path) -> Self {
        Self {
            transient: false,
            error: anyhow::Error::new(error).context(format!("Failed to write {}", destination.display())),
        }
    }
}

/// Fetches archive products into a destination path.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: reqwest::Client,
    retries: usize,
}

impl ArchiveFetcher {
    /// A fetcher with the default timeout and retry policy.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            retries: DOWNLOAD_RETRIES,
        })
    }

    /// Writes the product at `location` to `destination`.
    ///
    /// # Errors
    ///
    /// [`PpError::BackendCommandFailure`] if a download keeps failing or is
    /// rejected; I/O errors for local products.
    pub async fn fetch(&self, location: &str, destination: &Path) -> Result<()> {
        match parse_location(location)? {
            Location::Http(url) => self.download(url, destination).await,
            Location::Path(path) => {
                tracing::debug!(target: "fetch", "Copying {} to {}", path.display(), destination.display());
                if !path.exists() {
                    return Err(PpError::BackendCommandFailure {
                        operation: "archive fetch".to_string(),
                        message: format!("{} does not exist", path.display()),
                    }
                    .into());
                }
                copy_path_async(&path, destination).await
            }
        }
    }

    async fn download(&self, url: Url, destination: &Path) -> Result<()> {
        let strategy = ExponentialBackoff::from_millis(DOWNLOAD_RETRY_BASE_MS)
            .max_delay(DOWNLOAD_RETRY_MAX_DELAY)
            .factor(2)
            .take(self.retries);

        let downloaded = RetryIf::spawn(
            strategy,
            || self.attempt(&url, destination),
            |failure: &DownloadFailure| {
                if failure.transient {
                    tracing::debug!(target: "fetch", "Retrying download: {:#}", failure.error);
                }
                failure.transient
            },
        )
        .await;

        let size = match downloaded {
            Ok(size) => size,
            Err(failure) => {
                // Partial download, if any.
                let _ = tokio::fs::remove_file(destination).await;
                return Err(PpError::BackendCommandFailure {
                    operation: "archive download".to_string(),
                    message: format!("{:#}", failure.error),
                }
                .into());
            }
        };
        tracing::debug!(target: "fetch", "Downloaded {} ({} bytes)", url, size);
        Ok(())
    }

    /// Streams one response body into `destination`, returning its size.
    async fn attempt(&self, url: &Url, destination: &Path) -> std::result::Result<u64, DownloadFailure> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DownloadFailure::from_reqwest(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadFailure {
                transient: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
                error: anyhow::anyhow!("GET {url} returned {status}"),
            });
        }

        let mut file =
            tokio::fs::File::create(destination).await.map_err(|e| DownloadFailure::from_io(e, destination))?;
        let mut stream = response.bytes_stream();
        let mut size = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadFailure::from_reqwest(e, url))?;
            file.write_all(&chunk).await.map_err(|e| DownloadFailure::from_io(e, destination))?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| DownloadFailure::from_io(e, destination))?;
        Ok(size)
    }
}
