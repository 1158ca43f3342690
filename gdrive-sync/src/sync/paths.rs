use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("remote file name is empty")]
    Empty,
    #[error("remote file name {0:?} is not a plain file name")]
    UnsupportedName(String),
}

/// Maps a remote file name to its location in the raw-data directory.
///
/// Drive names may contain `/` or be `..`; those never leave `raw_dir`.
pub fn local_path_for(raw_dir: &Path, name: &str) -> Result<PathBuf, PathError> {
    if name.is_empty() {
        return Err(PathError::Empty);
    }
    if matches!(name, "." | "..") || name.contains(['/', '\\', '\0']) {
        return Err(PathError::UnsupportedName(name.to_string()));
    }
    Ok(raw_dir.join(name))
}

/// Sibling file a download is streamed into before it replaces the target.
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_name_under_raw_dir() {
        let root = PathBuf::from("/data/raw");
        let mapped = local_path_for(&root, "Sales 2024.csv").unwrap();
        assert_eq!(mapped, PathBuf::from("/data/raw/Sales 2024.csv"));
    }

    #[test]
    fn rejects_names_that_escape_raw_dir() {
        let root = PathBuf::from("/data/raw");
        for name in ["..", ".", "../secret.csv", "a/b.csv", "a\\b.csv"] {
            assert!(
                matches!(
                    local_path_for(&root, name),
                    Err(PathError::UnsupportedName(_))
                ),
                "{name} should be rejected"
            );
        }
        assert!(matches!(local_path_for(&root, ""), Err(PathError::Empty)));
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/data/raw/a.csv")),
            PathBuf::from("/data/raw/a.csv.partial")
        );
    }
}
