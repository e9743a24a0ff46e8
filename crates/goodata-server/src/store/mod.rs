//! On-disk resource store with resumable downloads.
//!
//! Files live at `<root>/<package-uuid>/<resource-name>`; a download in
//! flight is written to `<...>.tmp` and only renamed to its final name
//! after a complete, error-free transfer. The `.tmp` file deliberately
//! survives cancellation and process restarts so the next attempt can
//! resume with a `Range` request instead of starting over.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, StatusCode};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::Resource;

/// Write buffer for streaming downloads.
const DOWNLOAD_BUFFER_BYTES: usize = 10 * 1024 * 1024;

/// Progress is logged every this many bytes.
const PROGRESS_LOG_INTERVAL: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The resource descriptor carries no package id, so it has no home in
    /// the store layout.
    #[error("resource {0} has no package id")]
    InvalidResource(Uuid),

    /// The server answered with something other than 200, 206 or 416.
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(StatusCode),

    #[error("download request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The ambient token was cancelled mid-transfer. The partial `.tmp`
    /// file is left in place for the next attempt.
    #[error("download cancelled")]
    Cancelled,
}

/// Storage for catalog resources, keyed by (package id, resource name).
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Download the resource to its final path. Idempotent: an existing
    /// final file short-circuits without network I/O.
    async fn save(&self, resource: &Resource, cancel: &CancellationToken)
        -> Result<(), StoreError>;

    /// Open the stored file for streaming reads.
    async fn open(
        &self,
        resource: &Resource,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, StoreError>;
}

/// Filesystem-backed store.
pub struct FsResourceStore {
    root: PathBuf,
    http: reqwest::Client,
}

impl FsResourceStore {
    /// Create the store, creating the root directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            http: reqwest::Client::new(),
        })
    }

    fn final_path(&self, resource: &Resource) -> Result<PathBuf, StoreError> {
        let package_id = resource
            .package_id
            .ok_or(StoreError::InvalidResource(resource.id))?;

        Ok(self
            .root
            .join(package_id.to_string())
            .join(&resource.name))
    }
}

#[async_trait]
impl ResourceStore for FsResourceStore {
    async fn save(
        &self,
        resource: &Resource,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let file_path = self.final_path(resource)?;

        if tokio::fs::try_exists(&file_path).await? {
            info!(
                resource_id = %resource.id,
                resource_name = %resource.name,
                "file already exists, skipping download"
            );
            return Ok(());
        }

        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = temp_path_for(&file_path);
        let existing_size = match tokio::fs::metadata(&temp_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        if existing_size > 0 {
            info!(
                resource_name = %resource.name,
                existing_size,
                "found partial download"
            );
        }

        debug!(url = %resource.url, "sending download request");
        let mut request = self.http.get(&resource.url);
        if existing_size > 0 {
            request = request.header(header::RANGE, format!("bytes={}-", existing_size));
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(status = %status, "received download response");

        // 200 = full content, 206 = partial content (resume),
        // 416 = nothing left to request: the temp file is already complete.
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            info!(
                resource_name = %resource.name,
                "file is already complete on server, renaming temp file"
            );
            tokio::fs::rename(&temp_path, &file_path).await?;
            return Ok(());
        }

        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(StoreError::UnexpectedStatus(status));
        }

        let resumed = existing_size > 0 && status == StatusCode::PARTIAL_CONTENT;
        let file = if resumed {
            OpenOptions::new().append(true).open(&temp_path).await?
        } else {
            // A 200 answer means the server ignored the Range header; any
            // partial prefix is stale and gets truncated.
            File::create(&temp_path).await?
        };

        let already_downloaded = if resumed { existing_size } else { 0 };
        copy_with_cancel(file, response, already_downloaded, cancel, resource).await?;

        tokio::fs::rename(&temp_path, &file_path).await?;

        Ok(())
    }

    async fn open(
        &self,
        resource: &Resource,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, StoreError> {
        let path = self.final_path(resource)?;
        let file = File::open(path).await?;
        Ok(Box::new(file))
    }
}

fn temp_path_for(file_path: &Path) -> PathBuf {
    let mut name = file_path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Stream the response body to `file`, checking the cancellation token
/// between chunks. On cancellation the bytes written so far are flushed and
/// the partial file is kept.
async fn copy_with_cancel(
    file: File,
    response: reqwest::Response,
    existing_size: u64,
    cancel: &CancellationToken,
    resource: &Resource,
) -> Result<(), StoreError> {
    let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFFER_BYTES, file);
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    let mut last_logged: u64 = 0;

    if existing_size > 0 {
        info!(
            resource_name = %resource.name,
            already_downloaded = existing_size,
            "resuming download"
        );
    }

    loop {
        if cancel.is_cancelled() {
            writer.flush().await?;
            warn!(
                resource_name = %resource.name,
                downloaded_this_session = written,
                total_on_disk = existing_size + written,
                "download cancelled"
            );
            return Err(StoreError::Cancelled);
        }

        let chunk = tokio::select! {
            _ = cancel.cancelled() => continue,
            chunk = stream.next() => chunk,
        };

        let Some(chunk) = chunk else { break };
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;

        if written - last_logged >= PROGRESS_LOG_INTERVAL {
            info!(
                resource_name = %resource.name,
                session = written,
                total = existing_size + written,
                "download progress"
            );
            last_logged = written;
        }
    }

    writer.flush().await?;
    info!(
        resource_name = %resource.name,
        total = existing_size + written,
        "download complete"
    );

    Ok(())
}
