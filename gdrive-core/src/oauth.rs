use std::path::Path;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("cannot read client secrets: {0}")]
    SecretsIo(#[from] std::io::Error),
    #[error("malformed client secrets: {0}")]
    SecretsFormat(#[from] serde_json::Error),
    #[error("client secrets contain neither an \"installed\" nor a \"web\" section")]
    SecretsMissingSection,
}

/// Client registration as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(raw: &str) -> Result<Self, OAuthError> {
        let file: ClientSecretsFile = serde_json::from_str(raw)?;
        file.installed
            .or(file.web)
            .ok_or(OAuthError::SecretsMissingSection)
    }

    pub fn from_file(path: &Path) -> Result<Self, OAuthError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    auth_uri: Url,
    token_uri: Url,
    client_id: String,
    client_secret: String,
}

impl OAuthClient {
    pub fn new(secrets: &ClientSecrets) -> Result<Self, OAuthError> {
        Ok(Self {
            http: Client::new(),
            auth_uri: Url::parse(&secrets.auth_uri)?,
            token_uri: Url::parse(&secrets.token_uri)?,
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
        })
    }

    pub fn with_base_url(
        base_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, OAuthError> {
        let base = Url::parse(base_url)?;
        Ok(Self {
            http: Client::new(),
            auth_uri: base.join("/o/oauth2/auth")?,
            token_uri: base.join("/token")?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Consent URL for the installed-app flow; asks for offline access so a
    /// refresh token is issued.
    pub fn authorize_url(
        &self,
        redirect_uri: &str,
        scope: &str,
        state: Option<&str>,
    ) -> Url {
        let mut url = self.auth_uri.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", redirect_uri);
            query.append_pair("scope", scope);
            query.append_pair("access_type", "offline");
            query.append_pair("prompt", "consent");
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        url
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthToken, OAuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ];
        self.post_token_form(&form).await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthToken, OAuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        self.post_token_form(&form).await
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<OAuthToken, OAuthError> {
        let response = self
            .http
            .post(self.token_uri.clone())
            .form(form)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json::<OAuthToken>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(OAuthError::Api { status, body })
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_installed_client_secrets() {
        let secrets = ClientSecrets::from_json(
            r#"{"installed":{"client_id":"id-1","client_secret":"s-1",
                "auth_uri":"https://accounts.example/auth","token_uri":"https://oauth.example/token",
                "redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();
        assert_eq!(secrets.client_id, "id-1");
        assert_eq!(secrets.token_uri, "https://oauth.example/token");
    }

    #[test]
    fn falls_back_to_web_section_and_default_uris() {
        let secrets =
            ClientSecrets::from_json(r#"{"web":{"client_id":"id-2","client_secret":"s-2"}}"#)
                .unwrap();
        assert_eq!(secrets.auth_uri, DEFAULT_AUTH_URI);
        assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn rejects_secrets_without_known_section() {
        let err = ClientSecrets::from_json(r#"{"other":{}}"#).unwrap_err();
        assert!(matches!(err, OAuthError::SecretsMissingSection));
    }
}
