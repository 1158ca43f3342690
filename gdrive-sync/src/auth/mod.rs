pub mod oauth_flow;
pub mod token_provider;
pub mod token_store;

use std::path::PathBuf;

use gdrive_core::{ClientSecrets, Credential, OAuthClient};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SyncConfig;
use oauth_flow::{OAuthFlow, OAuthFlowError};
use token_provider::{TokenProvider, TokenProviderError};
use token_store::{OAuthState, TokenStore, TokenStoreError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("cannot load client secrets from {path}: {source}")]
    Secrets {
        path: PathBuf,
        #[source]
        source: gdrive_core::OAuthError,
    },
    #[error("token storage error: {0}")]
    Store(#[from] TokenStoreError),
    #[error("authorization failed: {0}")]
    Flow(#[from] OAuthFlowError),
    #[error("cannot obtain a valid access token: {0} (run with --logout to start over)")]
    Token(#[from] TokenProviderError),
}

/// Produces the credential for the Drive client and keeps the cached session
/// file current.
pub struct AuthSession {
    inner: SessionKind,
}

enum SessionKind {
    Static(Credential),
    Cached {
        store: TokenStore,
        provider: TokenProvider,
    },
}

impl AuthSession {
    /// Loads the cached session, running the interactive consent flow when
    /// there is none.
    pub async fn establish(config: &SyncConfig) -> Result<Self, AuthError> {
        if let Some(token) = config.access_token_override.as_deref() {
            info!("using access token from the environment");
            return Ok(Self {
                inner: SessionKind::Static(Credential::bearer(token)),
            });
        }

        let store = TokenStore::new(&config.token_path);
        let cached = match store.get_oauth_state() {
            Ok(state) => Some(state),
            Err(TokenStoreError::TokenNotFound) => None,
            Err(err @ TokenStoreError::Format { .. }) => {
                warn!("discarding unreadable cached session: {err}");
                None
            }
            Err(err) => return Err(err.into()),
        };

        let state = match cached {
            Some(state) => state,
            None => {
                let client = load_oauth_client(config)?;
                let state = authenticate_interactively(config, client).await?;
                store.save_oauth_state(&state)?;
                info!(path = %store.path().display(), "saved new session");
                state
            }
        };

        let oauth_client = if config.credentials_path.exists() {
            Some(load_oauth_client(config)?)
        } else {
            None
        };

        Ok(Self {
            inner: SessionKind::Cached {
                store,
                provider: TokenProvider::new(state, oauth_client),
            },
        })
    }

    pub async fn credential(&mut self) -> Result<Credential, AuthError> {
        match &mut self.inner {
            SessionKind::Static(credential) => Ok(credential.clone()),
            SessionKind::Cached { store, provider } => {
                let before = provider.state().access_token.clone();
                let credential = provider.valid_credential().await?;
                if credential.access_token() != before {
                    store.save_oauth_state(provider.state())?;
                }
                Ok(credential)
            }
        }
    }

    /// Refreshes regardless of the recorded expiry, after the API rejected
    /// the current token.
    pub async fn force_refresh(&mut self) -> Result<Credential, AuthError> {
        match &mut self.inner {
            SessionKind::Static(credential) => Ok(credential.clone()),
            SessionKind::Cached { store, provider } => {
                let credential = provider.refresh_now().await?;
                store.save_oauth_state(provider.state())?;
                Ok(credential)
            }
        }
    }

    pub fn can_refresh(&self) -> bool {
        matches!(self.inner, SessionKind::Cached { .. })
    }
}

/// Removes the cached session so the next run asks for consent again.
pub fn logout(config: &SyncConfig) -> Result<bool, AuthError> {
    let store = TokenStore::new(&config.token_path);
    let existed = store.has_token();
    store.delete_token()?;
    Ok(existed)
}

fn load_oauth_client(config: &SyncConfig) -> Result<OAuthClient, AuthError> {
    let secrets_error = |source: gdrive_core::OAuthError| AuthError::Secrets {
        path: config.credentials_path.clone(),
        source,
    };
    let secrets = ClientSecrets::from_file(&config.credentials_path).map_err(secrets_error)?;
    OAuthClient::new(&secrets).map_err(secrets_error)
}

async fn authenticate_interactively(
    config: &SyncConfig,
    client: OAuthClient,
) -> Result<OAuthState, AuthError> {
    info!("no cached session, starting authorization");
    let flow = OAuthFlow::new(client, config.scope.clone())
        .with_timeout(config.oauth_timeout)
        .with_manual_entry(config.oauth_force_manual);
    let token = flow.authenticate().await?;
    let mut state = OAuthState::from_oauth_token(&token);
    if state.scope.is_none() {
        state.scope = Some(config.scope.clone());
    }
    Ok(state)
}
