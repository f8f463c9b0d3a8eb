//! OAuth 2.0 authorization-code grant against Google's identity provider.
//!
//! [`OAuthClient`] covers the three provider interactions of the grant: building the consent URL
//! the user is sent to, exchanging the code that comes back on the callback, and minting new
//! access tokens from a refresh token. It holds no per-user state; persisting what it returns is
//! the job of [`crate::credentials::CredentialResolver`].
//!
//! The flow moves through `UNAUTHENTICATED -> AWAITING_CALLBACK -> EXCHANGING ->
//! AUTHENTICATED | FAILED`. Which step a user is at is tracked by the caller: the `state` handed to
//! [`OAuthClient::authorization_url`] must be stored with the session and compared against the
//! callback (see [`redirect::CallbackParams::authorization_code`]).

use crate::config::{self, OAuthConfig};
use crate::{Error, Result};
use http::StatusCode;
use oauth2::basic::BasicClient;
use oauth2::url::Url;
use oauth2::{
    AccessToken, AuthUrl, AuthorizationCode, ClientId, CsrfToken, RedirectUrl, RefreshToken,
    Scope,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

pub mod redirect;

/// Lifetime assumed when the provider doesn't say how long an access token lives.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Tokens as returned by one successful call to the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: AccessToken,
    pub refresh_token: Option<RefreshToken>,
    pub expires_in: Duration,
    pub token_type: String,
    pub scope: String,
}

impl TokenSet {
    /// Keeps `prior` as the refresh token if the provider didn't rotate it.
    ///
    /// Google (like most providers) only sometimes issues a new refresh token on refresh.
    pub fn or_refresh_token(mut self, prior: RefreshToken) -> Self {
        if self.refresh_token.is_none() {
            tracing::trace!("token response lacks refresh token, preserving original");
            self.refresh_token = Some(prior);
        }
        self
    }
}

/// Wire format of a successful token endpoint response.
///
/// See: <https://developers.google.com/identity/protocols/oauth2/web-server#exchange-authorization-code>
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    /// Seconds.
    expires_in: Option<u64>,
    #[serde(default = "bearer")]
    token_type: String,
    #[serde(default)]
    scope: String,
}

fn bearer() -> String {
    "Bearer".to_string()
}

impl From<TokenResponse> for TokenSet {
    fn from(r: TokenResponse) -> Self {
        Self {
            access_token: AccessToken::new(r.access_token),
            refresh_token: r.refresh_token.filter(|t| !t.is_empty()).map(RefreshToken::new),
            expires_in: r
                .expires_in
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TOKEN_LIFETIME),
            token_type: r.token_type,
            scope: r.scope,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        let http = config::http_client(config::DEFAULT_REQUEST_TIMEOUT)?;
        Ok(Self::with_http_client(config, http))
    }

    /// Uses an existing HTTP client, so its connection pool is shared with the resource clients.
    pub fn with_http_client(config: OAuthConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Builds the URL that sends the user to the provider's consent screen.
    ///
    /// Requests offline access and forces the consent prompt so that a refresh token is issued
    /// on every authorization, not only the first one. `state` is echoed back on the callback
    /// and must be verified there.
    pub fn authorization_url(&self, state: &CsrfToken) -> Result<Url> {
        let auth_url = AuthUrl::new(self.config.auth_url.clone())
            .map_err(|e| Error::Config(format!("authorization endpoint URL: {e}")))?;
        let redirect_url = RedirectUrl::new(self.config.redirect_uri.clone())
            .map_err(|e| Error::Config(format!("redirect URI: {e}")))?;
        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_redirect_uri(redirect_url);

        let state = state.clone();
        let (url, _) = client
            .authorize_url(move || state)
            .add_scopes(self.config.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();
        Ok(url)
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// Codes are single-use, so this is never retried: on failure the user has to go through
    /// the consent screen again.
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &AuthorizationCode) -> Result<TokenSet> {
        tracing::debug!("exchanging authorization code");
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code.secret().as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        self.request_token(&form, |status, body| Error::TokenExchange { status, body })
            .await
    }

    /// Mints a new access token from `refresh_token`.
    ///
    /// The returned set may lack a refresh token; callers must then keep the one they used
    /// (see [`TokenSet::or_refresh_token`]).
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &RefreshToken) -> Result<TokenSet> {
        tracing::debug!("attempting to refresh OAuth token");
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token.secret().as_str()),
            ("grant_type", "refresh_token"),
        ];
        self.request_token(&form, |status, body| Error::TokenRefresh { status, body })
            .await
    }

    async fn request_token(
        &self,
        form: &[(&str, &str)],
        rejected: fn(StatusCode, String) -> Error,
    ) -> Result<TokenSet> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(Error::from_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::from_transport)?;
        if !status.is_success() {
            tracing::warn!(%status, "token endpoint rejected the request");
            return Err(rejected(status, body));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|source| Error::Decode {
            endpoint: self.config.token_url.clone(),
            source,
        })?;
        Ok(token.into())
    }
}
