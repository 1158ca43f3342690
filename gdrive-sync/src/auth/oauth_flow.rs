use std::io::Write;
use std::time::Duration;

use gdrive_core::{OAuthClient, OAuthToken};
use rand::Rng;
use rand::distributions::Alphanumeric;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};
use url::Url;

const MANUAL_REDIRECT_URI: &str = "http://localhost";

#[derive(Debug, Error)]
pub enum OAuthFlowError {
    #[error("oauth error: {0}")]
    OAuth(#[from] gdrive_core::OAuthError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("authorization code missing in redirect")]
    MissingCode,
    #[error("authorization was denied: {0}")]
    Denied(String),
    #[error("redirect state does not match the authorization request")]
    StateMismatch,
    #[error("authorization timed out")]
    Timeout,
}

/// Interactive consent for an installed application.
///
/// The default path listens on an ephemeral loopback port for the browser
/// redirect; the manual path asks the operator to paste the redirected URL.
pub struct OAuthFlow {
    client: OAuthClient,
    scope: String,
    timeout: Duration,
    force_manual: bool,
}

impl OAuthFlow {
    pub fn new(client: OAuthClient, scope: impl Into<String>) -> Self {
        Self {
            client,
            scope: scope.into(),
            timeout: Duration::from_secs(180),
            force_manual: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_manual_entry(mut self, force_manual: bool) -> Self {
        self.force_manual = force_manual;
        self
    }

    pub async fn authenticate(&self) -> Result<OAuthToken, OAuthFlowError> {
        if self.force_manual {
            return self.authenticate_manual().await;
        }
        match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => self.authenticate_via_loopback(listener).await,
            Err(err) => {
                warn!("loopback listener unavailable ({err}), falling back to manual code entry");
                self.authenticate_manual().await
            }
        }
    }

    async fn authenticate_via_loopback(
        &self,
        listener: TcpListener,
    ) -> Result<OAuthToken, OAuthFlowError> {
        let addr = listener.local_addr()?;
        let redirect_uri = format!("http://127.0.0.1:{}/", addr.port());
        let state = random_state();
        let url = self
            .client
            .authorize_url(&redirect_uri, &self.scope, Some(&state));

        println!("Open this URL in your browser to authorize access:\n{url}");
        info!(port = addr.port(), "waiting for the authorization redirect");

        let (mut stream, _) = tokio::time::timeout(self.timeout, listener.accept())
            .await
            .map_err(|_| OAuthFlowError::Timeout)??;

        let mut request = vec![0u8; 8192];
        let read = tokio::time::timeout(Duration::from_secs(10), stream.read(&mut request))
            .await
            .map_err(|_| OAuthFlowError::Timeout)??;
        let request_text = String::from_utf8_lossy(&request[..read]);
        let result = request_target(&request_text)
            .ok_or(OAuthFlowError::MissingCode)
            .and_then(|target| code_from_redirect(&target, Some(&state)));

        let page: &[u8] = if result.is_ok() {
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
            <html><body><h2>Google Drive connected</h2><p>You can close this tab.</p></body></html>"
        } else {
            b"HTTP/1.1 400 Bad Request\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
            <html><body><h2>Authorization failed</h2><p>Return to the terminal for details.</p></body></html>"
        };
        let _ = stream.write_all(page).await;
        let _ = stream.shutdown().await;

        let code = result?;
        Ok(self.client.exchange_code(&code, &redirect_uri).await?)
    }

    async fn authenticate_manual(&self) -> Result<OAuthToken, OAuthFlowError> {
        let url = self
            .client
            .authorize_url(MANUAL_REDIRECT_URI, &self.scope, None);
        println!("Open this URL in your browser:\n{url}");
        println!("After approving, copy the address of the page you are sent to.");
        print!("Paste the redirected URL or the code: ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        let code = code_from_pasted_input(&input)?;
        Ok(self.client.exchange_code(&code, MANUAL_REDIRECT_URI).await?)
    }
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

fn request_target(request: &str) -> Option<String> {
    let request_line = request.lines().next()?;
    let target = request_line.split_whitespace().nth(1)?;
    if target.starts_with("http://") || target.starts_with("https://") {
        Some(target.to_string())
    } else {
        Some(format!("http://127.0.0.1{target}"))
    }
}

fn code_from_redirect(target: &str, expected_state: Option<&str>) -> Result<String, OAuthFlowError> {
    let url = Url::parse(target).map_err(|_| OAuthFlowError::MissingCode)?;
    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(OAuthFlowError::Denied(value.into_owned())),
            _ => {}
        }
    }
    if let Some(expected) = expected_state
        && state.as_deref() != Some(expected)
    {
        return Err(OAuthFlowError::StateMismatch);
    }
    code.ok_or(OAuthFlowError::MissingCode)
}

fn code_from_pasted_input(input: &str) -> Result<String, OAuthFlowError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(OAuthFlowError::MissingCode);
    }
    if input.starts_with("http://") || input.starts_with("https://") {
        return code_from_redirect(input, None);
    }
    Ok(input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_code_from_request_line() {
        let req = "GET /?state=xyz&code=4/abc123&scope=drive HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n";
        let target = request_target(req).unwrap();
        assert_eq!(
            code_from_redirect(&target, Some("xyz")).unwrap(),
            "4/abc123"
        );
    }

    #[test]
    fn rejects_mismatched_state() {
        let target = request_target("GET /?state=other&code=abc HTTP/1.1\r\n\r\n").unwrap();
        assert!(matches!(
            code_from_redirect(&target, Some("xyz")),
            Err(OAuthFlowError::StateMismatch)
        ));
    }

    #[test]
    fn reports_denied_consent() {
        let target =
            request_target("GET /?error=access_denied&state=xyz HTTP/1.1\r\n\r\n").unwrap();
        assert!(matches!(
            code_from_redirect(&target, Some("xyz")),
            Err(OAuthFlowError::Denied(reason)) if reason == "access_denied"
        ));
    }

    #[test]
    fn returns_missing_code_when_absent() {
        let target = request_target("GET /?state=xyz HTTP/1.1\r\n\r\n").unwrap();
        assert!(matches!(
            code_from_redirect(&target, Some("xyz")),
            Err(OAuthFlowError::MissingCode)
        ));
    }

    #[test]
    fn pasted_input_accepts_url_or_bare_code() {
        assert_eq!(
            code_from_pasted_input("http://localhost/?code=4%2Fxyz&scope=a\n").unwrap(),
            "4/xyz"
        );
        assert_eq!(code_from_pasted_input("  4/plain \n").unwrap(), "4/plain");
        assert!(matches!(
            code_from_pasted_input("   "),
            Err(OAuthFlowError::MissingCode)
        ));
    }

    #[test]
    fn random_state_is_alphanumeric() {
        let state = random_state();
        assert_eq!(state.len(), 24);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(state, random_state());
    }
}
