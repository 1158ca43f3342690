use std::collections::HashMap;

use gdrive_core::DriveFile;
use tracing::{debug, warn};

use super::inventory::LocalInventory;
use super::metadata::SyncMetadata;
use super::timestamp::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub id: String,
    pub modified_time: Timestamp,
    pub md5_checksum: Option<String>,
}

impl RemoteFile {
    pub fn new(name: impl Into<String>, id: impl Into<String>, modified_time: Timestamp) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            modified_time,
            md5_checksum: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlanEntry {
    pub name: String,
    pub id: String,
    pub modified_time: Timestamp,
    pub md5_checksum: Option<String>,
}

impl From<&RemoteFile> for DownloadPlanEntry {
    fn from(file: &RemoteFile) -> Self {
        Self {
            name: file.name.clone(),
            id: file.id.clone(),
            modified_time: file.modified_time.clone(),
            md5_checksum: file.md5_checksum.clone(),
        }
    }
}

/// Turns a raw folder listing into the files a pass works on.
///
/// Folders are dropped. A name listed twice keeps the position of its first
/// occurrence and the id/timestamp of its last one. Items whose
/// `modifiedTime` does not parse are skipped with a warning.
pub fn collect_remote_files(listing: Vec<DriveFile>) -> Vec<RemoteFile> {
    let mut files: Vec<RemoteFile> = Vec::with_capacity(listing.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for item in listing {
        if item.is_folder() {
            debug!(name = %item.name, "skipping folder in remote listing");
            continue;
        }
        let modified_time = match Timestamp::parse(&item.modified_time) {
            Ok(modified_time) => modified_time,
            Err(err) => {
                warn!(
                    name = %item.name,
                    modified_time = %item.modified_time,
                    "skipping remote file with unparsable modification time: {err}"
                );
                continue;
            }
        };
        let file = RemoteFile {
            name: item.name,
            id: item.id,
            modified_time,
            md5_checksum: item.md5_checksum,
        };
        match positions.get(&file.name) {
            Some(&index) => {
                warn!(name = %file.name, "remote folder lists this name more than once; using the last entry");
                files[index] = file;
            }
            None => {
                positions.insert(file.name.clone(), files.len());
                files.push(file);
            }
        }
    }

    files
}

pub fn needs_download(file: &RemoteFile, local: &LocalInventory, metadata: &SyncMetadata) -> bool {
    if !local.contains(&file.name) {
        return true;
    }
    match metadata.get(&file.name) {
        Some(synced) => *synced < file.modified_time,
        None => Timestamp::epoch() < file.modified_time,
    }
}

/// Selects the remote files that are missing locally or newer than the last
/// synced timestamp, in listing order. Local-only files are never touched.
pub fn plan(
    remote: &[RemoteFile],
    local: &LocalInventory,
    metadata: &SyncMetadata,
) -> Vec<DownloadPlanEntry> {
    remote
        .iter()
        .filter(|file| needs_download(file, local, metadata))
        .map(DownloadPlanEntry::from)
        .collect()
}
