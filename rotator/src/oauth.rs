//! OAuth 2.0 against Google's endpoints for the YouTube Data API.
//!
//! The client id and secret come from the `client_secrets.json` file that the
//! Google Cloud console hands out for an "installed" (desktop) application.

use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, Scope, TokenResponse, TokenUrl, reqwest,
};
use serde::Deserialize;
use std::future::Future;
use std::path::Path;

const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Managing broadcasts (transition, bind, insert) needs the full-access scope.
const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

const OAUTH_DONE_HTML: &str = "<html><body><p>The broadcast rotator is now authorized. \
You can close this tab.</p></body></html>";

/// The application section of a Google `client_secrets.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

/// Google nests the secrets under `installed` or `web` depending on the client type.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ClientSecretsFile {
    Installed(ClientSecrets),
    Web(ClientSecrets),
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> eyre::Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).context("parse client secrets JSON")?;
        Ok(match file {
            ClientSecretsFile::Installed(secrets) | ClientSecretsFile::Web(secrets) => secrets,
        })
    }

    pub async fn load(path: &Path) -> eyre::Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read client secrets from {}", path.display()))?;
        Self::from_json(&json)
    }
}

/// Runs the authorization-code and refresh-token grants.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    secrets: ClientSecrets,
    http: reqwest::Client,
}

impl OAuthManager {
    pub fn new(secrets: ClientSecrets) -> eyre::Result<Self> {
        let http = reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build OAuth HTTP client")?;
        Ok(Self { secrets, http })
    }

    fn token_url(&self) -> eyre::Result<TokenUrl> {
        TokenUrl::new(self.secrets.token_uri.clone()).context("parse token endpoint URL")
    }

    /// Walks the user through the browser consent screen and exchanges the
    /// resulting code for a token.
    ///
    /// Only used by the `authorize` subcommand; unattended rotation runs never
    /// end up here.
    pub async fn authenticate(&self) -> eyre::Result<BasicTokenResponse> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_code) = listen_for_redirect(csrf.clone())
            .await
            .context("set up redirect endpoint")?;

        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(self.secrets.auth_uri.clone())
                    .context("parse authorization endpoint URL")?,
            )
            .set_token_uri(self.token_url()?)
            .set_redirect_uri(redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _) = client
            // The flow runs exactly once, so the CSRF token is never re-used.
            .authorize_url(move || csrf.clone())
            .add_scope(Scope::new(YOUTUBE_SCOPE.to_string()))
            // Without offline access Google does not hand out a refresh token.
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        if let Err(e) = webbrowser::open(auth_url.as_ref()) {
            // Headless hosts: the operator can still paste the URL by hand.
            tracing::warn!(error = %e, "could not open a browser; open the URL above manually");
        }
        let code = eventually_code
            .await
            .context("await user authorization code")?;

        let token = client
            .exchange_code(code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .context("exchange authorization code for access token")?;
        if token.refresh_token().is_none() {
            tracing::warn!("authorization did not yield a refresh token");
        }
        Ok(token)
    }

    /// Exchanges the refresh token in `token` for a new access token.
    ///
    /// Returns `Ok(None)` when there is nothing to refresh with, or when Google
    /// rejects the refresh token as an invalid grant (revoked or expired);
    /// either way only a new interactive authorization can help.
    pub async fn refresh_token(
        &self,
        token: &BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        tracing::debug!("attempting to refresh OAuth token");
        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_token_uri(self.token_url()?);

        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&self.http)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("successfully refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(
                    sr.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }
}

/// Binds a one-shot HTTP server on a random loopback port for Google to redirect to.
///
/// Returns the redirect URL to register with the authorization request, and a
/// future that resolves to the authorization code once the browser arrives
/// with a matching `state`.
async fn listen_for_redirect(
    csrf: CsrfToken,
) -> eyre::Result<(
    RedirectUrl,
    impl Future<Output = eyre::Result<AuthorizationCode>>,
)> {
    let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind to localhost")?;
    let addr = socket.local_addr().context("get local address")?;
    let url = RedirectUrl::new(format!("http://{}:{}", addr.ip(), addr.port()))
        .context("construct redirect url")?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let r = async move {
            let (conn, _) = socket.accept().await.context("accept")?;
            let conn = hyper_util::rt::TokioIo::new(conn);
            let (got, mut gotten) = tokio::sync::mpsc::channel(1);
            let service = service_fn(move |req: Request<body::Incoming>| {
                let csrf = csrf.clone();
                let got = got.clone();
                async move {
                    match authorization_code_from_query(
                        req.uri().query().unwrap_or(""),
                        csrf.secret(),
                    ) {
                        Ok(code) => {
                            // The receiver lives until the server shuts down.
                            let _ = got.send(code).await;
                            Ok(Response::new(Full::<Bytes>::from(OAUTH_DONE_HTML)))
                        }
                        Err(e) => Err(e),
                    }
                }
            });
            let mut serve = std::pin::pin!(
                hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
            );

            tokio::select! {
                exit = &mut serve => {
                    match exit {
                        Err(e) => Err(e).context("redirect server got bad request"),
                        Ok(()) => eyre::bail!("redirect server exit prematurely"),
                    }
                }
                code = gotten.recv() => {
                    serve.as_mut().graceful_shutdown();
                    code.ok_or_else(|| eyre::eyre!("redirect handler went away"))
                }
            }
        };
        let _ = tx.send(r.await);
    });
    Ok((url, async move {
        rx.await.context("redirect future dropped prematurely")?
    }))
}

/// Pulls the authorization code out of the redirect's query string.
fn authorization_code_from_query(
    query: &str,
    expected_state: &str,
) -> Result<AuthorizationCode, &'static str> {
    let mut state = None;
    let mut code = None;
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        match &*k {
            "state" => state = Some(v),
            "code" => code = Some(v),
            _ => {}
        }
    }
    if state.as_deref() != Some(expected_state) {
        return Err("invalid csrf token");
    }
    let code = code.ok_or("no authorization code found")?;
    Ok(AuthorizationCode::new(code.into_owned()))
}
