use gdrive_core::{Credential, OAuthClient};
use thiserror::Error;
use tracing::debug;

use super::token_store::{OAuthState, now_unix};

#[derive(Debug, Error)]
pub enum TokenProviderError {
    #[error("oauth client is required to refresh expired token")]
    MissingOAuthClient,
    #[error("refresh token is missing")]
    MissingRefreshToken,
    #[error("oauth refresh failed: {0}")]
    OAuth(#[from] gdrive_core::OAuthError),
}

/// Hands out access tokens, refreshing them shortly before they expire.
pub struct TokenProvider {
    state: OAuthState,
    oauth_client: Option<OAuthClient>,
    refresh_skew_secs: i64,
}

impl TokenProvider {
    pub fn new(state: OAuthState, oauth_client: Option<OAuthClient>) -> Self {
        Self {
            state,
            oauth_client,
            refresh_skew_secs: 60,
        }
    }

    pub async fn valid_credential(&mut self) -> Result<Credential, TokenProviderError> {
        if self.should_refresh() {
            self.refresh().await?;
        }
        Ok(Credential::bearer(self.state.access_token.clone()))
    }

    pub fn state(&self) -> &OAuthState {
        &self.state
    }

    pub async fn refresh_now(&mut self) -> Result<Credential, TokenProviderError> {
        self.refresh().await?;
        Ok(Credential::bearer(self.state.access_token.clone()))
    }

    fn should_refresh(&self) -> bool {
        let Some(expires_at) = self.state.expires_at else {
            return false;
        };
        expires_at <= now_unix().saturating_add(self.refresh_skew_secs)
    }

    async fn refresh(&mut self) -> Result<(), TokenProviderError> {
        let refresh_token = self
            .state
            .refresh_token
            .clone()
            .ok_or(TokenProviderError::MissingRefreshToken)?;
        let client = self
            .oauth_client
            .as_ref()
            .ok_or(TokenProviderError::MissingOAuthClient)?;
        debug!("refreshing access token");
        let token = client.refresh_token(&refresh_token).await?;
        let mut refreshed = OAuthState::from_oauth_token(&token);
        // Google omits the refresh token on refresh responses.
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token);
        }
        if refreshed.scope.is_none() {
            refreshed.scope = self.state.scope.clone();
        }
        self.state = refreshed;
        Ok(())
    }
}
