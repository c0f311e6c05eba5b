//! OAuth2 PKCE authentication flow for Microsoft Graph API
//!
//! Implements the Authorization Code flow with PKCE (RFC 7636) for
//! authenticating native desktop applications with Microsoft identity platform.
//!
//! ## Components
//!
//! - [`OAuth2Config`] - Configuration for the OAuth2 flow
//! - [`TokenCache`] - JSON token file under the user cache directory
//! - [`PKCEFlow`] - OAuth2 PKCE challenge/exchange logic
//! - [`LocalCallbackServer`] - Minimal HTTP server for the OAuth redirect
//! - [`GraphAuthAdapter`] - Cache, refresh, or interactive login

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use cloudbackup_core::config::AuthConfig;
use cloudbackup_core::ports::Tokens;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet,
    EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope,
    TokenResponse, TokenUrl,
};
use sha2::{Digest, Sha256};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::GraphError;

/// Default Microsoft OAuth2 authorization endpoint (consumers tenant)
const AUTH_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/authorize";

/// Default Microsoft OAuth2 token endpoint (consumers tenant)
const TOKEN_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";

/// Default port for the local callback server
const DEFAULT_REDIRECT_PORT: u16 = 8400;

/// Default OAuth2 scopes for OneDrive access
const DEFAULT_SCOPES: &[&str] = &["Files.ReadWrite", "offline_access"];

/// Application name used for the cache directory and token file prefix
const APP_NAME: &str = "cloud-backup";

/// Tokens this close to expiry are refreshed before use
const EXPIRY_MARGIN_MINUTES: i64 = 5;

// ============================================================================
// OAuth2Config
// ============================================================================

/// Configuration for the OAuth2 PKCE authentication flow
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    /// Application (client) ID from Azure AD app registration
    pub app_id: String,
    /// Local port the redirect URI points at
    pub redirect_port: u16,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
    /// Authorization endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
}

impl OAuth2Config {
    /// Creates a new OAuth2Config with the given app_id and default settings
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            redirect_port: DEFAULT_REDIRECT_PORT,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    /// Builds a config from the `auth` section of the configuration file
    ///
    /// # Errors
    /// Returns an error if no application ID is configured
    pub fn from_auth_config(auth: &AuthConfig) -> Result<Self> {
        let app_id = auth.app_id.clone().ok_or_else(|| {
            anyhow::anyhow!("No application ID configured; set auth.app_id or pass --app-id")
        })?;
        Ok(Self::new(app_id)
            .with_scopes(auth.scopes.clone())
            .with_redirect_port(auth.redirect_port))
    }

    /// Creates a config with custom scopes
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Creates a config with a custom callback port
    pub fn with_redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = port;
        self
    }

    /// Points the flow at different authorization and token endpoints
    pub fn with_endpoints(mut self, auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self
    }

    /// Redirect URI served by [`LocalCallbackServer`]
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.redirect_port)
    }
}

// ============================================================================
// TokenCache
// ============================================================================

/// Stores OAuth tokens as JSON in the user cache directory
///
/// The file name embeds a SHA-256 digest of the client ID and scopes, so a
/// change to either starts from a clean cache.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Cache file for the given OAuth configuration
    ///
    /// Typically `$XDG_CACHE_HOME/cloud-backup/cloud-backup-token-<digest>.json`.
    pub fn for_config(config: &OAuth2Config) -> Self {
        let dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("~/.cache"))
            .join(APP_NAME);
        Self::in_dir(&dir, config)
    }

    /// Cache file for the given configuration inside `dir`
    pub fn in_dir(dir: &Path, config: &OAuth2Config) -> Self {
        Self {
            path: dir.join(Self::file_name(config)),
        }
    }

    /// Cache backed by an explicit file
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn file_name(config: &OAuth2Config) -> String {
        let mut hasher = Sha256::new();
        hasher.update(config.app_id.as_bytes());
        for scope in &config.scopes {
            hasher.update(b"\n");
            hasher.update(scope.as_bytes());
        }
        format!("{APP_NAME}-token-{}.json", hex::encode(hasher.finalize()))
    }

    /// Location of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads cached tokens
    ///
    /// # Returns
    /// `None` if the file is missing or unreadable as tokens
    pub fn load(&self) -> Result<Option<Tokens>> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cached tokens");
                return Ok(None);
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context("Failed to read token cache"));
            }
        };

        match serde_json::from_str::<Tokens>(&json) {
            Ok(tokens) => {
                debug!(path = %self.path.display(), "Loaded cached tokens");
                Ok(Some(tokens))
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt token cache");
                Ok(None)
            }
        }
    }

    /// Writes tokens to the cache file, readable by the owner only
    pub fn save(&self, tokens: &Tokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create token cache directory")?;
        }

        let json = serde_json::to_string(tokens).context("Failed to serialize tokens")?;
        std::fs::write(&self.path, json).context("Failed to write token cache")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to restrict token cache permissions")?;
        }

        debug!(path = %self.path.display(), "Saved tokens");
        Ok(())
    }

    /// Removes the cache file
    ///
    /// # Returns
    /// `true` if a file was removed
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Cleared cached tokens");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to remove token cache")),
        }
    }
}

// ============================================================================
// PKCEFlow
// ============================================================================

/// OAuth2 PKCE flow implementation using the `oauth2` crate
///
/// Handles generating authorization URLs with PKCE challenges,
/// exchanging authorization codes for tokens, and refreshing tokens.
pub struct PKCEFlow {
    client: BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    http: reqwest::Client,
    scopes: Vec<String>,
}

impl PKCEFlow {
    /// Creates a new PKCEFlow with the given configuration
    pub fn new(config: &OAuth2Config) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(config.app_id.clone()))
            .set_auth_uri(AuthUrl::new(config.auth_url.clone()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(config.token_url.clone()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri()).context("Invalid redirect URI")?,
            );

        // Token endpoints must not redirect.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build OAuth HTTP client")?;

        Ok(Self {
            client,
            http,
            scopes: config.scopes.clone(),
        })
    }

    /// Generates an authorization URL with a PKCE challenge
    ///
    /// # Returns
    /// A tuple of `(authorization_url, csrf_token, pkce_verifier)`.
    /// The `pkce_verifier` must be kept until the code exchange step.
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = self.client.authorize_url(CsrfToken::new_random);

        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_token) = auth_request.set_pkce_challenge(pkce_challenge).url();

        debug!("Generated authorization URL");
        (auth_url.to_string(), csrf_token, pkce_verifier)
    }

    /// Exchanges an authorization code for OAuth tokens
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<Tokens> {
        info!("Exchanging authorization code for tokens");

        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .context("Failed to exchange authorization code")?;

        let tokens = Tokens {
            access_token: token_result.access_token().secret().to_string(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().to_string()),
            expires_at: expiry(token_result.expires_in()),
        };

        info!("Successfully obtained OAuth tokens");
        Ok(tokens)
    }

    /// Refreshes an expired access token using a refresh token
    ///
    /// The old refresh token is kept when the service does not rotate it.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens> {
        info!("Refreshing access token");

        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .context("Failed to refresh token")?;

        let tokens = Tokens {
            access_token: token_result.access_token().secret().to_string(),
            refresh_token: token_result
                .refresh_token()
                .map(|t| t.secret().to_string())
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: expiry(token_result.expires_in()),
        };

        info!("Successfully refreshed access token");
        Ok(tokens)
    }
}

/// Absolute expiry from a relative lifetime; one hour when unspecified
fn expiry(expires_in: Option<std::time::Duration>) -> chrono::DateTime<Utc> {
    expires_in
        .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64))
        .unwrap_or_else(|| Utc::now() + Duration::hours(1))
}

// ============================================================================
// LocalCallbackServer
// ============================================================================

/// Minimal HTTP server that listens on localhost for the OAuth2 redirect callback.
///
/// Serves connections until a request carrying either an authorization code
/// or an error arrives, answers it with an HTML page, and shuts down.
pub struct LocalCallbackServer;

/// Parameters extracted from the OAuth2 callback
#[derive(Debug)]
pub struct CallbackParams {
    /// The authorization code
    pub code: String,
    /// The CSRF state parameter
    pub state: String,
}

/// What a single callback request carried
#[derive(Debug)]
enum Callback {
    Code(CallbackParams),
    Denied(String),
    Unrelated,
}

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<Result<CallbackParams, String>>>>>;

impl LocalCallbackServer {
    /// Starts the local callback server and waits for the OAuth redirect
    ///
    /// # Arguments
    /// * `port` - Port on 127.0.0.1 to listen on
    /// * `expected_state` - CSRF state sent with the authorization request
    ///
    /// # Returns
    /// The callback parameters, after the state was checked
    pub async fn start(port: u16, expected_state: &str) -> Result<CallbackParams> {
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{Request, StatusCode};
        use hyper_util::rt::TokioIo;
        use tokio::net::TcpListener;

        let addr = format!("127.0.0.1:{port}");
        info!("Starting local OAuth callback server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind callback server to {addr}"))?;

        let (tx, rx) = oneshot::channel::<Result<CallbackParams, String>>();
        let tx: CallbackSender = Arc::new(Mutex::new(Some(tx)));
        let expected_state = expected_state.to_string();

        let accept_loop = tokio::spawn(async move {
            loop {
                let (stream, _addr) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Callback server accept error: {}", e);
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let tx = tx.clone();
                let expected_state = expected_state.clone();

                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let tx = tx.clone();
                    let expected_state = expected_state.clone();
                    async move {
                        let uri = req.uri().to_string();
                        debug!("Callback server received request: {}", uri);

                        let (status, html, outcome) = match parse_callback(&uri) {
                            Callback::Code(params) if params.state == expected_state => {
                                (StatusCode::OK, success_html(), Some(Ok(params)))
                            }
                            Callback::Code(_) => {
                                let msg = "State mismatch in callback; the request was not started by cloud-backup";
                                (StatusCode::BAD_REQUEST, error_html(msg), Some(Err(msg.to_string())))
                            }
                            Callback::Denied(reason) => {
                                (StatusCode::BAD_REQUEST, error_html(&reason), Some(Err(reason)))
                            }
                            Callback::Unrelated => {
                                (StatusCode::NOT_FOUND, error_html("Not found"), None)
                            }
                        };

                        if let Some(outcome) = outcome {
                            if let Some(sender) = tx.lock().await.take() {
                                let _ = sender.send(outcome);
                            }
                        }

                        Ok::<_, hyper::Error>(html_response(status, html))
                    }
                });

                tokio::spawn(async move {
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        warn!("Callback server connection error: {}", e);
                    }
                });
            }
        });

        let outcome = rx.await;
        accept_loop.abort();

        match outcome {
            Ok(Ok(params)) => {
                info!("Received OAuth callback with authorization code");
                Ok(params)
            }
            Ok(Err(reason)) => Err(GraphError::AuthFailed(reason).into()),
            Err(_) => Err(GraphError::AuthFailed(
                "callback server closed without a response".to_string(),
            )
            .into()),
        }
    }
}

/// Builds an HTML response without fallible builders
fn html_response(
    status: hyper::StatusCode,
    html: String,
) -> hyper::Response<http_body_util::Full<hyper::body::Bytes>> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};

    let mut response = hyper::Response::new(http_body_util::Full::new(hyper::body::Bytes::from(html)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    response
}

/// Classifies a callback request URI
fn parse_callback(uri: &str) -> Callback {
    let url = match url::Url::parse(&format!("http://localhost{uri}")) {
        Ok(url) => url,
        Err(_) => return Callback::Unrelated,
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => error = Some(value.to_string()),
            "error_description" => description = Some(value.to_string()),
            _ => {}
        }
    }

    match (code, error) {
        (Some(code), _) => Callback::Code(CallbackParams {
            code,
            state: state.unwrap_or_default(),
        }),
        (None, Some(error)) => Callback::Denied(match description {
            Some(d) => format!("{error}: {d}"),
            None => error,
        }),
        (None, None) => Callback::Unrelated,
    }
}

/// Returns the HTML for a successful authentication page
fn success_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>cloud-backup - Authentication Successful</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Successful</h1>
    <p>cloud-backup can now access your OneDrive.</p>
    <p>You can close this window and return to the terminal.</p>
    <script>setTimeout(function() { window.close(); }, 3000);</script>
</body>
</html>"#
        .to_string()
}

/// Returns the HTML for an authentication error page
fn error_html(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>cloud-backup - Authentication Error</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Error</h1>
    <p>{message}</p>
    <p>Please close this window and try again.</p>
</body>
</html>"#
    )
}

// ============================================================================
// GraphAuthAdapter
// ============================================================================

/// Provides access tokens, from the cache when possible.
///
/// [`GraphAuthAdapter::access_token`] tries, in order:
///
/// 1. A cached token that is not about to expire
/// 2. A refresh using the cached refresh token
/// 3. The interactive browser login
///
/// Fresh tokens are written back to the cache; failing to do so is logged
/// and otherwise ignored.
pub struct GraphAuthAdapter {
    config: OAuth2Config,
    cache: TokenCache,
}

impl GraphAuthAdapter {
    /// Creates a new GraphAuthAdapter using the default cache location
    pub fn new(config: OAuth2Config) -> Self {
        let cache = TokenCache::for_config(&config);
        Self { config, cache }
    }

    /// Creates a new GraphAuthAdapter with an explicit cache
    pub fn with_cache(config: OAuth2Config, cache: TokenCache) -> Self {
        Self { config, cache }
    }

    /// Returns a valid access token
    pub async fn access_token(&self) -> Result<String> {
        if let Some(tokens) = self.cache.load()? {
            if !tokens.expires_within(Duration::minutes(EXPIRY_MARGIN_MINUTES)) {
                debug!("Using cached access token");
                return Ok(tokens.access_token);
            }

            if let Some(refresh_token) = tokens.refresh_token.as_deref() {
                match self.refresh(refresh_token).await {
                    Ok(fresh) => {
                        self.store(&fresh);
                        return Ok(fresh.access_token);
                    }
                    Err(e) => warn!(error = %e, "Token refresh failed, logging in again"),
                }
            }
        }

        let tokens = self.login().await?;
        self.store(&tokens);
        Ok(tokens.access_token)
    }

    /// Performs the full interactive OAuth2 PKCE login flow
    ///
    /// This will:
    /// 1. Generate a PKCE-secured authorization URL
    /// 2. Open the user's default browser to Microsoft login
    /// 3. Start a local HTTP server to receive the callback
    /// 4. Check the CSRF state and exchange the code for tokens
    pub async fn login(&self) -> Result<Tokens> {
        info!("Starting OAuth2 PKCE login flow");

        let flow = PKCEFlow::new(&self.config)?;
        let (auth_url, csrf_token, pkce_verifier) = flow.generate_auth_url();

        info!("Opening browser for authentication");
        if let Err(e) = webbrowser::open(&auth_url) {
            warn!(error = %e, "Could not open a browser; open this URL to sign in: {}", auth_url);
        }

        let callback =
            LocalCallbackServer::start(self.config.redirect_port, csrf_token.secret()).await?;

        let tokens = flow.exchange_code(callback.code, pkce_verifier).await?;

        info!("OAuth2 PKCE login completed successfully");
        Ok(tokens)
    }

    /// Interactive login whose tokens are written to the cache
    pub async fn login_and_store(&self) -> Result<Tokens> {
        let tokens = self.login().await?;
        self.store(&tokens);
        Ok(tokens)
    }

    /// Refreshes an expired access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<Tokens> {
        let flow = PKCEFlow::new(&self.config)?;
        flow.refresh_token(refresh_token).await
    }

    /// Tokens currently in the cache, if any
    pub fn cached_tokens(&self) -> Result<Option<Tokens>> {
        self.cache.load()
    }

    /// Forgets cached tokens
    pub fn logout(&self) -> Result<bool> {
        self.cache.clear()
    }

    fn store(&self, tokens: &Tokens) {
        if let Err(e) = self.cache.save(tokens) {
            warn!(error = %e, "Failed to cache tokens");
        }
    }

    /// Returns a reference to the current configuration
    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    /// Returns the token cache in use
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }
}
