use anyhow::Context;
use gdrive_core::{ApiErrorClass, Credential, DriveClient, DriveError};
use tracing::warn;

use crate::auth::AuthSession;
use crate::config::SyncConfig;
use crate::sync::engine::{PassPlan, SyncEngine, SyncError, SyncReport};

/// Authenticates and runs one full sync pass.
pub async fn sync_once(config: &SyncConfig) -> anyhow::Result<SyncReport> {
    let mut session = AuthSession::establish(config).await?;
    let engine = build_engine(config, session.credential().await?)?;
    match engine.run_pass().await {
        Err(SyncError::Listing(err)) if is_auth_rejection(&err) && session.can_refresh() => {
            warn!("drive rejected the access token, refreshing and retrying once");
            let engine = build_engine(config, refreshed(&mut session).await?)?;
            Ok(engine.run_pass().await?)
        }
        other => Ok(other?),
    }
}

/// Authenticates and computes the plan without fetching or writing anything.
pub async fn plan_once(config: &SyncConfig) -> anyhow::Result<Option<PassPlan>> {
    let mut session = AuthSession::establish(config).await?;
    let engine = build_engine(config, session.credential().await?)?;
    match engine.plan_pass().await {
        Err(SyncError::Listing(err)) if is_auth_rejection(&err) && session.can_refresh() => {
            warn!("drive rejected the access token, refreshing and retrying once");
            let engine = build_engine(config, refreshed(&mut session).await?)?;
            Ok(engine.plan_pass().await?)
        }
        other => Ok(other?),
    }
}

async fn refreshed(session: &mut AuthSession) -> anyhow::Result<Credential> {
    session
        .force_refresh()
        .await
        .context("failed to refresh token after the api rejected it")
}

fn build_engine(config: &SyncConfig, credential: Credential) -> anyhow::Result<SyncEngine> {
    let client = DriveClient::with_base_url(&config.api_base_url, credential)
        .with_context(|| format!("invalid drive api base url {:?}", config.api_base_url))?;
    Ok(SyncEngine::new(client, config))
}

fn is_auth_rejection(err: &DriveError) -> bool {
    matches!(err.classification(), Some(ApiErrorClass::Auth))
}
