use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Names of the recognized files currently in the raw-data directory.
pub type LocalInventory = BTreeSet<String>;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("raw data directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("cannot read raw data directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lists the files in `dir` whose name ends with `.{extension}`.
///
/// The directory is created by the setup step; its absence is an error.
pub async fn scan(dir: &Path, extension: &str) -> Result<LocalInventory, InventoryError> {
    let io_error = |source: std::io::Error| InventoryError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let suffix = format!(".{}", extension.trim_start_matches('.'));

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(InventoryError::MissingDirectory(dir.to_path_buf()));
        }
        Err(err) => return Err(io_error(err)),
    };

    let mut inventory = LocalInventory::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            warn!(name = ?file_name, "skipping local file with non UTF-8 name");
            continue;
        };
        if !name.ends_with(&suffix) {
            continue;
        }
        if entry.file_type().await.map_err(io_error)?.is_dir() {
            continue;
        }
        inventory.insert(name.to_string());
    }
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_only_matching_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), b"x").unwrap();
        std::fs::write(dir.path().join("b.csv"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("c.csv.partial"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("folder.csv")).unwrap();

        let inventory = scan(dir.path(), "csv").await.unwrap();

        let names: Vec<_> = inventory.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[tokio::test]
    async fn extension_may_carry_leading_dot() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), b"x").unwrap();

        let inventory = scan(dir.path(), ".csv").await.unwrap();
        assert!(inventory.contains("a.csv"));
    }

    #[tokio::test]
    async fn empty_directory_gives_empty_inventory() {
        let dir = tempdir().unwrap();
        assert!(scan(dir.path(), "csv").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("raw");

        let err = scan(&missing, "csv").await.unwrap_err();
        assert!(matches!(err, InventoryError::MissingDirectory(path) if path == missing));
    }
}
