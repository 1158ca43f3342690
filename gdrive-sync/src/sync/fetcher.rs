use std::time::Duration;
use std::{io, path::Path};

use futures_util::StreamExt;
use gdrive_core::{DriveClient, DriveError};
use md5::Context;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::paths::partial_path;
use super::planner::DownloadPlanEntry;
use super::retry::{RetryPolicy, Retryable};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("drive error: {0}")]
    Drive(#[from] DriveError),
    #[error("download interrupted: {0}")]
    Stream(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("download integrity check failed: expected {expected_md5}, got {actual_md5}")]
    IntegrityMismatch {
        expected_md5: String,
        actual_md5: String,
    },
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Drive(err) => err.is_retryable(),
            FetchError::Stream(err) => err.is_timeout() || err.is_body() || err.is_connect(),
            FetchError::IntegrityMismatch { .. } => true,
            FetchError::Io(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::Drive(err) => err.retry_after(),
            _ => None,
        }
    }
}

/// Downloads plan entries into the raw-data directory.
#[derive(Clone)]
pub struct Fetcher {
    client: DriveClient,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: DriveClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Streams `entry` to `target`, calling `on_progress` with the completed
    /// fraction after every chunk. Returns the number of bytes written.
    ///
    /// The body lands in a `.partial` sibling first; `target` is only replaced
    /// once the whole file is on disk and its checksum matches.
    pub async fn fetch<P>(
        &self,
        entry: &DownloadPlanEntry,
        target: &Path,
        mut on_progress: P,
    ) -> Result<u64, FetchError>
    where
        P: FnMut(f64),
    {
        let mut failed = 0u32;
        loop {
            match self.fetch_once(entry, target, &mut on_progress).await {
                Ok(written) => return Ok(written),
                Err(err) => {
                    failed += 1;
                    let Some(delay) = self.retry.next_delay(failed, &err) else {
                        return Err(err);
                    };
                    warn!(
                        file = %entry.name,
                        attempt = failed,
                        max_attempts = self.retry.attempts(),
                        ?delay,
                        "download failed, retrying: {err}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn fetch_once<P>(
        &self,
        entry: &DownloadPlanEntry,
        target: &Path,
        on_progress: &mut P,
    ) -> Result<u64, FetchError>
    where
        P: FnMut(f64),
    {
        let response = self.client.get_media(&entry.id).await?;
        let total = response.content_length();
        debug!(file = %entry.name, id = %entry.id, ?total, "download started");

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        let result = write_body(
            response,
            &partial,
            total,
            entry.md5_checksum.as_deref(),
            on_progress,
        )
        .await;
        let written = match result {
            Ok(written) => written,
            Err(err) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(err);
            }
        };

        tokio::fs::rename(&partial, target).await?;
        Ok(written)
    }
}

async fn write_body<P>(
    response: reqwest::Response,
    partial: &Path,
    total: Option<u64>,
    expected_md5: Option<&str>,
    on_progress: &mut P,
) -> Result<u64, FetchError>
where
    P: FnMut(f64),
{
    let mut file = tokio::fs::File::create(partial).await?;
    let mut stream = response.bytes_stream();
    let mut md5 = expected_md5.map(|_| Context::new());
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        if let Some(ctx) = md5.as_mut() {
            ctx.consume(&chunk);
        }
        written += chunk.len() as u64;
        if let Some(total) = total.filter(|t| *t > 0) {
            on_progress((written as f64 / total as f64).min(1.0));
        }
    }

    file.flush().await?;
    file.sync_all().await?;

    if let (Some(expected), Some(ctx)) = (expected_md5, md5) {
        let actual_md5 = format!("{:x}", ctx.compute());
        if !actual_md5.eq_ignore_ascii_case(expected) {
            return Err(FetchError::IntegrityMismatch {
                expected_md5: expected.to_ascii_lowercase(),
                actual_md5,
            });
        }
    }

    if total.is_none_or(|t| t == 0 || written < t) {
        on_progress(1.0);
    }
    Ok(written)
}
