//! Credential acquisition for the Microsoft Graph API.
//!
//! The library never talks to Graph without a bearer token, and a batch
//! export holds that token for long enough that it can expire mid-run.
//! [`TokenSource`] is the seam between those two facts: the HTTP layer
//! asks it for the current token before each request and asks it to
//! [`refresh`](TokenSource::refresh) after a 401.
//!
//! ## Single-flight refresh
//!
//! With five workers in flight, an expired token produces five 401s at
//! roughly the same moment. The cached token lives behind a
//! `tokio::sync::Mutex`, and `refresh` re-acquires only when the cache
//! still holds the stale value the caller saw — late callers find the
//! cache already replaced and return the new token without a second
//! interactive round.
//!
//! [`InteractiveAuth`] implements the authorization-code + PKCE flow:
//! open the system browser on the consumers authorize endpoint, catch the
//! redirect on a loopback listener, exchange the code for a token.
//! [`StaticToken`] wraps a fixed token for tests and for callers that
//! already have one.

use crate::error::ExportError;
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, CsrfToken, PkceCodeChallenge, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

/// Client id of the shared public application registration.
pub const DEFAULT_CLIENT_ID: &str = "8e1a6f85-d243-41ac-a6d3-4b7fd05ce004";

/// Port the loopback redirect listener binds on.
pub const REDIRECT_PORT: u16 = 8400;

const AUTH_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/authorize";
const TOKEN_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
const SCOPE: &str = "Notes.Read";

/// Supplies bearer tokens to the HTTP layer.
///
/// Implementations must be cheap to call on the happy path —
/// `access_token` runs before every request — and safe to call
/// concurrently from all workers.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current token, acquiring one first if none is cached.
    async fn access_token(&self) -> Result<String, ExportError>;

    /// Replace a token the API just rejected.
    ///
    /// `stale` is the token the caller used; when another worker already
    /// refreshed, the cached (newer) token is returned as-is.
    async fn refresh(&self, stale: &str) -> Result<String, ExportError>;
}

/// A fixed token: `refresh` hands back the same value.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, ExportError> {
        Ok(self.token.clone())
    }

    async fn refresh(&self, _stale: &str) -> Result<String, ExportError> {
        Ok(self.token.clone())
    }
}

/// Interactive browser-based flow against the consumers tenant.
pub struct InteractiveAuth {
    client_id: String,
    cached: Mutex<Option<String>>,
}

impl InteractiveAuth {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for InteractiveAuth {
    async fn access_token(&self) -> Result<String, ExportError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = acquire_interactive(&self.client_id).await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn refresh(&self, stale: &str) -> Result<String, ExportError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token != stale {
                return Ok(token.clone());
            }
        }
        info!("access token rejected; starting a fresh sign-in");
        let token = acquire_interactive(&self.client_id).await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Run one full authorization-code round trip.
async fn acquire_interactive(client_id: &str) -> Result<String, ExportError> {
    let auth_url = AuthUrl::new(AUTH_URL.to_string())
        .map_err(|e| ExportError::Internal(format!("authorize endpoint: {e}")))?;
    let token_url = TokenUrl::new(TOKEN_URL.to_string())
        .map_err(|e| ExportError::Internal(format!("token endpoint: {e}")))?;
    let redirect_url = RedirectUrl::new(format!("http://localhost:{REDIRECT_PORT}"))
        .map_err(|e| ExportError::Internal(format!("redirect uri: {e}")))?;

    let client = BasicClient::new(
        ClientId::new(client_id.to_string()),
        None,
        auth_url,
        Some(token_url),
    )
    .set_redirect_uri(redirect_url);

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
    let (authorize_url, csrf_state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(SCOPE.to_string()))
        .set_pkce_challenge(pkce_challenge)
        .url();

    info!("Opening browser for authentication…");
    if webbrowser::open(authorize_url.as_str()).is_err() {
        warn!("could not launch a browser; open this URL manually:\n{authorize_url}");
    }

    let redirect = tokio::task::spawn_blocking(wait_for_redirect)
        .await
        .map_err(|e| ExportError::Internal(format!("redirect listener task: {e}")))??;

    if redirect.state.as_deref() != Some(csrf_state.secret().as_str()) {
        return Err(ExportError::AuthFailed {
            detail: "state parameter mismatch on OAuth redirect".to_string(),
        });
    }

    let token = client
        .exchange_code(AuthorizationCode::new(redirect.code))
        .set_pkce_verifier(pkce_verifier)
        .request_async(oauth2::reqwest::async_http_client)
        .await
        .map_err(|e| ExportError::AuthFailed {
            detail: e.to_string(),
        })?;

    Ok(token.access_token().secret().clone())
}

struct Redirect {
    code: String,
    state: Option<String>,
}

/// Block until the browser hits the loopback listener with a `code`.
///
/// Stray requests (favicon probes, a user reloading the tab) get a 400
/// and the listener keeps waiting.
fn wait_for_redirect() -> Result<Redirect, ExportError> {
    let listener_err = |detail: String| ExportError::RedirectListener {
        port: REDIRECT_PORT,
        detail,
    };

    let listener =
        TcpListener::bind(("127.0.0.1", REDIRECT_PORT)).map_err(|e| listener_err(e.to_string()))?;

    for stream in listener.incoming() {
        let mut stream = stream.map_err(|e| listener_err(e.to_string()))?;
        let mut request_line = String::new();
        if BufReader::new(&stream).read_line(&mut request_line).is_err() {
            continue;
        }

        // "GET /?code=…&state=… HTTP/1.1"
        let path = request_line.split_whitespace().nth(1).unwrap_or("/");
        let parsed = match Url::parse(&format!("http://localhost{path}")) {
            Ok(u) => u,
            Err(_) => {
                respond(&mut stream, 400, "Authentication failed! Please try again.");
                continue;
            }
        };

        let mut code = None;
        let mut state = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }

        match code {
            Some(code) => {
                respond(
                    &mut stream,
                    200,
                    "Authentication successful! You can close this window.",
                );
                return Ok(Redirect { code, state });
            }
            None => {
                respond(&mut stream, 400, "Authentication failed! Please try again.");
            }
        }
    }

    Err(listener_err("listener closed before a code arrived".into()))
}

fn respond(stream: &mut std::net::TcpStream, status: u16, body: &str) {
    let reason = if status == 200 { "OK" } else { "Bad Request" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    // Best-effort: a browser that hung up early is not an auth failure.
    let _ = stream.write_all(response.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_round_trips() {
        let tokens = StaticToken::new("tok-1");
        assert_eq!(tokens.access_token().await.expect("token"), "tok-1");
        assert_eq!(tokens.refresh("tok-1").await.expect("token"), "tok-1");
    }

    #[tokio::test]
    async fn static_token_is_object_safe() {
        use std::sync::Arc;
        let tokens: Arc<dyn TokenSource> = Arc::new(StaticToken::new("tok-2"));
        assert_eq!(tokens.access_token().await.expect("token"), "tok-2");
    }
}
