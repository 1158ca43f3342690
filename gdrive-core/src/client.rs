use std::fmt;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const MAX_PAGE_SIZE: u32 = 1000;
const RATE_LIMIT_REASONS: [&str; 2] = ["rateLimitExceeded", "userRateLimitExceeded"];
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, modifiedTime, md5Checksum, size)";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry path segments")]
    BaseUrl,
    #[error("api returned {status}: {body}")]
    Api {
        status: StatusCode,
        body: String,
        retry_after: Option<Duration>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// Bearer credential handed out by the authentication layer.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
}

impl Credential {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    credential: Credential,
}

impl DriveClient {
    pub fn with_base_url(base_url: &str, credential: Credential) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            credential,
        })
    }

    /// Lists one page of non-trashed items whose parent is `folder_id`.
    pub async fn list_folder(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
        page_size: Option<u32>,
    ) -> Result<FileList, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", &folder_query(folder_id));
            query.append_pair("fields", LIST_FIELDS);
            query.append_pair(
                "pageSize",
                &page_size.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE).to_string(),
            );
            if let Some(token) = page_token.filter(|t| !t.is_empty()) {
                query.append_pair("pageToken", token);
            }
        }
        debug!(folder_id, page_token, "listing drive folder page");
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_folder_all(&self, folder_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_folder(folder_id, page_token.as_deref(), None)
                .await?;
            files.extend(page.files);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) if page_token.as_deref() != Some(next.as_str()) => {
                    page_token = Some(next);
                }
                _ => break,
            }
        }
        Ok(files)
    }

    /// Starts a media download; the caller streams the body.
    pub async fn get_media(&self, file_id: &str) -> Result<Response, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        url.path_segments_mut()
            .map_err(|_| DriveError::BaseUrl)?
            .push(file_id);
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::check_status(response).await
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.credential.access_token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    async fn check_status(response: Response) -> Result<Response, DriveError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api {
                status,
                body,
                retry_after,
            })
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, DriveError> {
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, body, .. } => Some(classify_api_error(*status, body)),
            _ => None,
        }
    }

    /// Server-requested wait before retrying, from a `Retry-After` header
    /// given in seconds.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DriveError::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            DriveError::Request(err) => err.is_timeout() || err.is_connect(),
            _ => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
        }
    }
}

/// Drive reports quota exhaustion as 403 with a reason in the error body,
/// so the body decides between `Auth` and `RateLimit` for that status.
fn classify_api_error(status: StatusCode, body: &str) -> ApiErrorClass {
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && is_rate_limit_body(body))
    {
        ApiErrorClass::RateLimit
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorDetail>,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

fn is_rate_limit_body(body: &str) -> bool {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error
        .unwrap_or_default()
        .errors
        .iter()
        .chain(&parsed.errors)
        .any(|e| RATE_LIMIT_REASONS.contains(&e.reason.as_str()))
}

fn folder_query(folder_id: &str) -> String {
    let escaped = folder_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}' in parents and trashed = false")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub modified_time: String,
    #[serde(default)]
    pub md5_checksum: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_query_escapes_quotes() {
        assert_eq!(
            folder_query("abc"),
            "'abc' in parents and trashed = false"
        );
        assert_eq!(
            folder_query("it's"),
            "'it\\'s' in parents and trashed = false"
        );
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(
            classify_api_error(StatusCode::UNAUTHORIZED, ""),
            ApiErrorClass::Auth
        );
        assert_eq!(
            classify_api_error(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiErrorClass::RateLimit
        );
        assert_eq!(
            classify_api_error(StatusCode::BAD_GATEWAY, ""),
            ApiErrorClass::Transient
        );
        assert_eq!(
            classify_api_error(StatusCode::NOT_FOUND, ""),
            ApiErrorClass::Permanent
        );
    }

    #[test]
    fn forbidden_with_quota_reason_is_rate_limit() {
        let nested = r#"{"error":{"code":403,"errors":[{"domain":"usageLimits","reason":"userRateLimitExceeded"}]}}"#;
        let flat = r#"{"errors":[{"reason":"rateLimitExceeded"}]}"#;
        let denied = r#"{"error":{"code":403,"errors":[{"reason":"insufficientPermissions"}]}}"#;

        assert_eq!(
            classify_api_error(StatusCode::FORBIDDEN, nested),
            ApiErrorClass::RateLimit
        );
        assert_eq!(
            classify_api_error(StatusCode::FORBIDDEN, flat),
            ApiErrorClass::RateLimit
        );
        assert_eq!(
            classify_api_error(StatusCode::FORBIDDEN, denied),
            ApiErrorClass::Auth
        );
        assert_eq!(
            classify_api_error(StatusCode::FORBIDDEN, "not json"),
            ApiErrorClass::Auth
        );
    }

    #[test]
    fn credential_debug_hides_token() {
        let credential = Credential::bearer("secret-token");
        assert!(!format!("{credential:?}").contains("secret-token"));
    }
}
