use clap::Parser;
use gdrive_sync::auth;
use gdrive_sync::config::SyncConfig;
use gdrive_sync::runner;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Download new and updated CSV files from a Google Drive folder.
#[derive(Debug, Parser)]
#[command(name = "gdrive-sync", version)]
struct Cli {
    /// Show what would be downloaded without fetching or recording anything
    #[arg(long)]
    dry_run: bool,

    /// Remove the saved OAuth token and exit
    #[arg(long)]
    logout: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    /// Drive folder to mirror, overriding DRIVE_FOLDER_ID
    #[arg(long, value_name = "ID")]
    folder_id: Option<String>,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{default_level},hyper=warn,reqwest=warn,rustls=warn"
        ))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = if let Some(folder_id) = cli.folder_id.as_deref() {
        let home = dirs::home_dir();
        SyncConfig::from_lookup(
            |name| match name {
                "DRIVE_FOLDER_ID" => Some(folder_id.to_string()),
                other => std::env::var(other).ok(),
            },
            home.as_deref(),
        )?
    } else {
        SyncConfig::from_env()?
    };

    if cli.logout {
        if auth::logout(&config)? {
            info!(path = %config.token_path.display(), "saved token removed");
        } else {
            info!("no saved token to remove");
        }
        return Ok(());
    }

    config.prepare_directories().await?;

    if cli.dry_run {
        match runner::plan_once(&config).await? {
            None => println!("No files found in the remote folder."),
            Some(plan) if plan.entries.is_empty() => {
                println!("All {} files are up to date.", plan.remote.len())
            }
            Some(plan) => {
                println!("Would download {} file(s):", plan.entries.len());
                for entry in &plan.entries {
                    println!("  {} (last modified: {})", entry.name, entry.modified_time);
                }
            }
        }
        return Ok(());
    }

    let report = runner::sync_once(&config).await?;
    if !report.is_complete() {
        let names: Vec<&str> = report.failed.iter().map(|f| f.name.as_str()).collect();
        anyhow::bail!(
            "{} file(s) failed to download: {}",
            names.len(),
            names.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_a_sync_pass() {
        let cli = Cli::try_parse_from(["gdrive-sync"]).unwrap();
        assert!(!cli.dry_run);
        assert!(!cli.logout);
        assert!(cli.folder_id.is_none());
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "gdrive-sync",
            "--dry-run",
            "-v",
            "--folder-id",
            "abc123",
        ])
        .unwrap();
        assert!(cli.dry_run);
        assert!(cli.verbose);
        assert_eq!(cli.folder_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn supports_logout() {
        let cli = Cli::try_parse_from(["gdrive-sync", "--logout"]).unwrap();
        assert!(cli.logout);
    }

    #[test]
    fn rejects_unknown_arguments() {
        assert!(Cli::try_parse_from(["gdrive-sync", "--bogus"]).is_err());
    }
}
