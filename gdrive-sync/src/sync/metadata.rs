use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::timestamp::Timestamp;

/// File name -> remote modification time of the copy last synced.
pub type SyncMetadata = BTreeMap<String, Timestamp>;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error on metadata file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize metadata: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// JSON object of `name -> modifiedTime`, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<SyncMetadata, MetadataError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no metadata file yet");
                return Ok(SyncMetadata::new());
            }
            Err(source) => {
                return Err(MetadataError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&raw).map_err(|source| MetadataError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, metadata: &SyncMetadata) -> Result<(), MetadataError> {
        let payload = serde_json::to_vec(metadata).map_err(MetadataError::Serialize)?;
        let temp_path = temp_path(&self.path);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|source| self.io_error(source))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&payload)
            .map_err(|source| self.io_error(source))?;
        let file = writer
            .into_inner()
            .map_err(|err| self.io_error(err.into_error()))?;
        file.sync_all().map_err(|source| self.io_error(source))?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|source| self.io_error(source))?;
        debug!(path = %self.path.display(), entries = metadata.len(), "metadata saved");
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> MetadataError {
        MetadataError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}
