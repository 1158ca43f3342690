use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_RAW_DIR: &str = "raw";
const DEFAULT_DRIVE_FILES_DIR: &str = "drive_files";
const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";
const DEFAULT_TOKEN_FILE: &str = "token.json";
const DEFAULT_METADATA_FILE: &str = "metadata.json";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const DEFAULT_EXTENSION: &str = "csv";
const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com";
const DEFAULT_FETCH_ATTEMPTS: u64 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_RETRY_MAX_SECS: u64 = 16;
const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 180;

/// Everything a sync pass needs to know about its surroundings.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub folder_id: String,
    pub raw_dir: PathBuf,
    pub drive_files_dir: PathBuf,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub metadata_path: PathBuf,
    pub scope: String,
    pub extension: String,
    pub api_base_url: String,
    pub fetch_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub oauth_timeout: Duration,
    pub oauth_force_manual: bool,
    pub access_token_override: Option<String>,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir();
        Self::from_lookup(|name| std::env::var(name).ok(), home.as_deref())
    }

    /// Builds the configuration from any variable source; relative paths stay
    /// relative to the working directory.
    pub fn from_lookup<F>(lookup: F, home: Option<&Path>) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let path_var = |name: &str, default: &str| {
            let value = var(name).unwrap_or_else(|| default.to_string());
            expand_with_home(&value, home)
        };

        let folder_id = var("DRIVE_FOLDER_ID")
            .or_else(|| var("ELIXIR"))
            .context("DRIVE_FOLDER_ID is not set")?;

        let data_dir = path_var("DATA_DIR", DEFAULT_DATA_DIR);
        let raw_dir = data_dir.join(var("RAW_DATA").unwrap_or_else(|| DEFAULT_RAW_DIR.into()));
        let drive_files_dir = path_var("DRIVE_FILES", DEFAULT_DRIVE_FILES_DIR);
        let file_in_drive_files = |name: &str, default: &str| {
            drive_files_dir.join(var(name).unwrap_or_else(|| default.to_string()))
        };
        let credentials_path = file_in_drive_files("CREDENTIALS", DEFAULT_CREDENTIALS_FILE);
        let token_path = file_in_drive_files("TOKEN", DEFAULT_TOKEN_FILE);
        let metadata_path = file_in_drive_files("METADATA", DEFAULT_METADATA_FILE);

        let fetch_attempts = read_u64(&var, "GDRIVE_FETCH_ATTEMPTS", DEFAULT_FETCH_ATTEMPTS)
            .min(u64::from(u32::MAX)) as u32;
        let retry_base_delay = Duration::from_millis(read_u64(
            &var,
            "GDRIVE_RETRY_BASE_MS",
            DEFAULT_RETRY_BASE_MS,
        ));
        let retry_max_delay = Duration::from_secs(read_u64(
            &var,
            "GDRIVE_RETRY_MAX_SECS",
            DEFAULT_RETRY_MAX_SECS,
        ));
        let oauth_timeout = Duration::from_secs(read_u64(
            &var,
            "GDRIVE_OAUTH_TIMEOUT_SECS",
            DEFAULT_OAUTH_TIMEOUT_SECS,
        ));

        Ok(Self {
            folder_id,
            raw_dir,
            credentials_path,
            token_path,
            metadata_path,
            drive_files_dir,
            scope: var("SCOPES").unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            extension: DEFAULT_EXTENSION.to_string(),
            api_base_url: var("GDRIVE_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            fetch_attempts,
            retry_base_delay,
            retry_max_delay,
            oauth_timeout,
            oauth_force_manual: read_bool(&var, "GDRIVE_OAUTH_FORCE_MANUAL", false),
            access_token_override: var("GDRIVE_ACCESS_TOKEN"),
        })
    }

    /// Default layout rooted at `root`, for a given folder.
    pub fn for_folder(folder_id: impl Into<String>, root: &Path) -> Self {
        let drive_files_dir = root.join(DEFAULT_DRIVE_FILES_DIR);
        Self {
            folder_id: folder_id.into(),
            raw_dir: root.join(DEFAULT_DATA_DIR).join(DEFAULT_RAW_DIR),
            credentials_path: drive_files_dir.join(DEFAULT_CREDENTIALS_FILE),
            token_path: drive_files_dir.join(DEFAULT_TOKEN_FILE),
            metadata_path: drive_files_dir.join(DEFAULT_METADATA_FILE),
            drive_files_dir,
            scope: DEFAULT_SCOPE.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS as u32,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            retry_max_delay: Duration::from_secs(DEFAULT_RETRY_MAX_SECS),
            oauth_timeout: Duration::from_secs(DEFAULT_OAUTH_TIMEOUT_SECS),
            oauth_force_manual: false,
            access_token_override: None,
        }
    }

    /// Creates the raw-data and drive-files directories if they are missing.
    pub async fn prepare_directories(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.raw_dir)
            .await
            .with_context(|| format!("failed to create raw data dir at {:?}", self.raw_dir))?;
        tokio::fs::create_dir_all(&self.drive_files_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create drive files dir at {:?}",
                    self.drive_files_dir
                )
            })?;
        Ok(())
    }
}

fn expand_with_home(value: &str, home: Option<&Path>) -> PathBuf {
    match home {
        Some(home) if value == "~" => home.to_path_buf(),
        Some(home) => match value.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None => PathBuf::from(value),
        },
        None => PathBuf::from(value),
    }
}

fn read_u64(var: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    var(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool(var: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    var(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
