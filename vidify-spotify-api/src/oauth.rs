use crate::config::SpotifyProviderConfig;
use crate::error::{Result, SpotifyError};
use axum::{extract::Query, response::Html, routing::get, Router};
use rspotify::{prelude::*, scopes, AuthCodeSpotify, Credentials, OAuth, Token};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

/// How long to wait for the user to finish authorizing in the browser
const OAUTH_CALLBACK_TIMEOUT: Duration = Duration::from_secs(600);

/// Refresh the token if it expires within this many seconds
const PROACTIVE_REFRESH_THRESHOLD_SECS: i64 = 60;

type CodeSender = Arc<Mutex<Option<oneshot::Sender<String>>>>;

/// Spotify OAuth (authorization code flow) with a persisted token cache
pub struct SpotifyOAuth {
    client: AuthCodeSpotify,
}

impl SpotifyOAuth {
    /// Create a new OAuth manager. The token is cached in the config directory.
    #[must_use]
    pub fn new(config: &SpotifyProviderConfig) -> Self {
        let creds = Credentials::new(&config.client_id, &config.client_secret);
        let oauth = OAuth {
            redirect_uri: config.oauth_redirect_uri.clone(),
            scopes: scopes!("user-read-currently-playing", "user-read-playback-state"),
            ..Default::default()
        };
        let client_config = rspotify::Config {
            token_cached: true,
            token_refreshing: true,
            cache_path: crate::paths::spotify_token_cache_path(),
            ..Default::default()
        };

        Self {
            client: AuthCodeSpotify::with_config(creds, oauth, client_config),
        }
    }

    /// Get the underlying Spotify client
    #[must_use]
    pub const fn client(&self) -> &AuthCodeSpotify {
        &self.client
    }

    async fn lock_token(&self) -> Result<futures::lock::MutexGuard<'_, Option<Token>>> {
        self.client
            .token
            .lock()
            .await
            .map_err(|_| SpotifyError::AuthFailed {
                reason: "Failed to acquire token lock".to_string(),
            })
    }

    /// Make sure a usable token is loaded: from the cache, by refreshing it,
    /// or by running the interactive browser flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the interactive flow fails or times out.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        match self.client.read_token_cache(true).await {
            Ok(Some(token)) => {
                let expired = token.is_expired();
                let refreshable = token.refresh_token.is_some();
                *self.lock_token().await? = Some(token);

                if !expired {
                    info!("Loaded cached Spotify token");
                    return Ok(());
                }
                if refreshable {
                    match self.refresh_token().await {
                        Ok(()) => return Ok(()),
                        Err(e) => warn!("Cached Spotify token couldn't be refreshed: {}", e),
                    }
                }
            }
            Ok(None) => info!("No cached Spotify token"),
            Err(e) => warn!("Ignoring unreadable Spotify token cache: {}", e),
        }

        self.authenticate_interactive().await
    }

    /// Refresh the access token and update the cache
    ///
    /// # Errors
    ///
    /// Returns an error if Spotify rejects the refresh.
    pub async fn refresh_token(&self) -> Result<()> {
        info!("Refreshing Spotify access token");
        self.client
            .refresh_token()
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Token refresh failed: {e}"),
            })?;
        self.client.write_token_cache().await?;
        Ok(())
    }

    /// Refresh the token if it is about to expire.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh fails.
    pub async fn ensure_token_fresh(&self) -> Result<()> {
        let needs_refresh = {
            let token = self.lock_token().await?;
            token.as_ref().is_some_and(expires_soon)
        };
        if needs_refresh {
            self.refresh_token().await?;
        }
        Ok(())
    }

    /// Run the authorization code flow through the browser and a local
    /// callback server on the redirect URI.
    async fn authenticate_interactive(&self) -> Result<()> {
        let callback = CallbackAddress::parse(&self.client.oauth.redirect_uri)?;
        let listener = tokio::net::TcpListener::bind(callback.addr)
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Failed to bind to {}: {e}", callback.addr),
            })?;

        let (tx, rx) = oneshot::channel();
        let router = callback_router(&callback.path, Arc::new(Mutex::new(Some(tx))));

        let auth_url = self
            .client
            .get_authorize_url(false)
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Failed to generate auth URL: {e}"),
            })?;
        info!("Opening the browser to authorize Vidify with Spotify");
        if let Err(e) = open::that(&auth_url) {
            warn!("Could not open browser automatically: {}", e);
            info!("Please open this URL manually:\n{auth_url}");
        }
        info!(
            "Waiting for the authorization callback on http://{}{}",
            callback.addr, callback.path
        );

        let code = tokio::select! {
            code = rx => code.map_err(|_| SpotifyError::AuthFailed {
                reason: "Callback channel closed unexpectedly".into(),
            })?,
            served = axum::serve(listener, router) => {
                served?;
                return Err(SpotifyError::AuthFailed {
                    reason: "Callback server stopped unexpectedly".into(),
                });
            }
            () = tokio::time::sleep(OAUTH_CALLBACK_TIMEOUT) => {
                return Err(SpotifyError::AuthFailed {
                    reason: format!(
                        "Authorization timed out after {} minutes",
                        OAUTH_CALLBACK_TIMEOUT.as_secs() / 60
                    ),
                });
            }
        };

        debug!("Received authorization code, exchanging for token");
        self.client
            .request_token(&code)
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Token exchange failed: {e}"),
            })?;
        info!("Authenticated with Spotify");
        Ok(())
    }
}

fn expires_soon(token: &Token) -> bool {
    token.expires_at.is_some_and(|expires_at| {
        (expires_at - chrono::Utc::now()).num_seconds() <= PROACTIVE_REFRESH_THRESHOLD_SECS
    })
}

/// Socket address and path the OAuth callback server listens on
#[derive(Debug, PartialEq, Eq)]
struct CallbackAddress {
    addr: SocketAddr,
    path: String,
}

impl CallbackAddress {
    fn parse(redirect_uri: &str) -> Result<Self> {
        let invalid = |reason: String| SpotifyError::AuthFailed {
            reason: format!("Invalid redirect URI {redirect_uri}: {reason}"),
        };

        let url = url::Url::parse(redirect_uri).map_err(|e| invalid(e.to_string()))?;
        let host = match url.host_str() {
            None | Some("localhost") => "127.0.0.1",
            Some(host) => host,
        };
        let port = url.port_or_known_default().unwrap_or(8888);
        let addr = format!("{host}:{port}")
            .parse()
            .map_err(|e: std::net::AddrParseError| invalid(e.to_string()))?;

        Ok(Self {
            addr,
            path: url.path().to_string(),
        })
    }
}

/// Query parameters Spotify sends to the redirect URI
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

fn callback_router(path: &str, tx: CodeSender) -> Router {
    Router::new().route(
        path,
        get(move |Query(params): Query<CallbackParams>| {
            let tx = Arc::clone(&tx);
            async move { handle_callback(params, tx).await }
        }),
    )
}

async fn handle_callback(params: CallbackParams, tx: CodeSender) -> Html<String> {
    match (params.code, params.error) {
        (Some(code), _) => {
            if let Some(sender) = tx.lock().await.take() {
                let _ = sender.send(code);
            }
            Html(callback_page(
                "Authorization Successful",
                "Vidify is now connected to Spotify. You can close this window.",
            ))
        }
        (None, Some(error)) => Html(callback_page(
            "Authorization Failed",
            &format!("Spotify returned an error: {error}. Please close this window and try again."),
        )),
        (None, None) => Html(callback_page(
            "Authorization Failed",
            "No authorization code received. Please close this window and try again.",
        )),
    }
}

fn callback_page(heading: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{heading}</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px;">
    <h1>{heading}</h1>
    <p>{message}</p>
</body>
</html>"#
    )
}
