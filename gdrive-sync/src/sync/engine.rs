use std::path::PathBuf;

use gdrive_core::{DriveClient, DriveError};
use thiserror::Error;
use tracing::{info, warn};

use super::fetcher::{FetchError, Fetcher};
use super::inventory::{self, InventoryError, LocalInventory};
use super::metadata::{MetadataError, MetadataStore, SyncMetadata};
use super::paths::{PathError, local_path_for};
use super::planner::{self, DownloadPlanEntry, RemoteFile};
use super::retry::RetryPolicy;
use crate::config::SyncConfig;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("listing remote folder failed: {0}")]
    Listing(#[from] DriveError),
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("local inventory error: {0}")]
    Inventory(#[from] InventoryError),
}

/// Why a single plan entry was left un-downloaded.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("{0}")]
    Path(#[from] PathError),
    #[error("{0}")]
    Fetch(#[from] FetchError),
}

#[derive(Debug)]
pub struct FetchFailure {
    pub name: String,
    pub error: EntryError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote folder is empty; nothing was read or written locally.
    NoRemoteFiles,
    UpToDate,
    Synced,
}

#[derive(Debug)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub listed: usize,
    pub planned: usize,
    pub downloaded: Vec<String>,
    pub failed: Vec<FetchFailure>,
}

impl SyncReport {
    fn without_downloads(outcome: SyncOutcome, listed: usize) -> Self {
        Self {
            outcome,
            listed,
            planned: 0,
            downloaded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Inputs and result of the planning half of a pass.
#[derive(Debug)]
pub struct PassPlan {
    pub remote: Vec<RemoteFile>,
    pub metadata: SyncMetadata,
    pub local: LocalInventory,
    pub entries: Vec<DownloadPlanEntry>,
}

pub struct SyncEngine {
    client: DriveClient,
    fetcher: Fetcher,
    retry: RetryPolicy,
    store: MetadataStore,
    folder_id: String,
    raw_dir: PathBuf,
    extension: String,
}

impl SyncEngine {
    pub fn new(client: DriveClient, config: &SyncConfig) -> Self {
        let retry = RetryPolicy::from_config(config);
        Self {
            fetcher: Fetcher::new(client.clone(), retry),
            client,
            retry,
            store: MetadataStore::new(&config.metadata_path),
            folder_id: config.folder_id.clone(),
            raw_dir: config.raw_dir.clone(),
            extension: config.extension.clone(),
        }
    }

    /// Lists the folder, retrying quota and transient failures under the
    /// same policy as downloads.
    pub async fn list_remote(&self) -> Result<Vec<RemoteFile>, SyncError> {
        let mut failed = 0u32;
        let listing = loop {
            match self.client.list_folder_all(&self.folder_id).await {
                Ok(listing) => break listing,
                Err(err) => {
                    failed += 1;
                    let Some(delay) = self.retry.next_delay(failed, &err) else {
                        return Err(err.into());
                    };
                    warn!(attempt = failed, ?delay, "listing remote folder failed, retrying: {err}");
                    tokio::time::sleep(delay).await;
                }
            }
        };
        Ok(planner::collect_remote_files(listing))
    }

    /// Lists, loads and scans, then decides what to fetch. `None` when the
    /// remote folder holds no files.
    pub async fn plan_pass(&self) -> Result<Option<PassPlan>, SyncError> {
        let remote = self.list_remote().await?;
        if remote.is_empty() {
            return Ok(None);
        }
        let metadata = self.store.load()?;
        let local = inventory::scan(&self.raw_dir, &self.extension).await?;
        let entries = planner::plan(&remote, &local, &metadata);
        Ok(Some(PassPlan {
            remote,
            metadata,
            local,
            entries,
        }))
    }

    /// Runs one sync pass. Metadata is committed after every successful
    /// download, so an interrupted pass only repeats uncommitted files.
    pub async fn run_pass(&self) -> Result<SyncReport, SyncError> {
        let Some(plan) = self.plan_pass().await? else {
            info!(folder_id = %self.folder_id, "no files found in the remote folder");
            return Ok(SyncReport::without_downloads(SyncOutcome::NoRemoteFiles, 0));
        };
        let listed = plan.remote.len();

        if plan.entries.is_empty() {
            info!(files = listed, "no updates found, all files are up to date");
            return Ok(SyncReport::without_downloads(SyncOutcome::UpToDate, listed));
        }

        info!(count = plan.entries.len(), "the following files are missing or outdated:");
        for entry in &plan.entries {
            info!("  {} (last modified: {})", entry.name, entry.modified_time);
        }

        let mut metadata = plan.metadata;
        let mut report = SyncReport {
            outcome: SyncOutcome::Synced,
            listed,
            planned: plan.entries.len(),
            downloaded: Vec::new(),
            failed: Vec::new(),
        };

        for entry in plan.entries {
            match self.fetch_entry(&entry).await {
                Ok(bytes) => {
                    info!(file = %entry.name, bytes, "downloaded");
                    metadata.insert(entry.name.clone(), entry.modified_time.clone());
                    self.store.save(&metadata)?;
                    report.downloaded.push(entry.name);
                }
                Err(error) => {
                    warn!(file = %entry.name, "download failed, will retry on next run: {error}");
                    report.failed.push(FetchFailure {
                        name: entry.name,
                        error,
                    });
                }
            }
        }

        if report.is_complete() {
            info!(
                count = report.downloaded.len(),
                "all files downloaded successfully to {}",
                self.raw_dir.display()
            );
        } else {
            warn!(
                downloaded = report.downloaded.len(),
                failed = report.failed.len(),
                "sync pass finished with failures"
            );
        }
        Ok(report)
    }

    async fn fetch_entry(&self, entry: &DownloadPlanEntry) -> Result<u64, EntryError> {
        let target = local_path_for(&self.raw_dir, &entry.name)?;
        info!(file = %entry.name, "downloading");
        let mut last_step = None;
        let written = self
            .fetcher
            .fetch(entry, &target, |fraction| {
                let percent = (fraction * 100.0).floor() as u32;
                let step = percent / 10;
                if last_step != Some(step) {
                    last_step = Some(step);
                    info!(file = %entry.name, "downloaded {percent}% complete");
                }
            })
            .await?;
        Ok(written)
    }
}
