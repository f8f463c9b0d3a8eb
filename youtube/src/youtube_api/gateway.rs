//! Authenticated transport for the YouTube resource APIs.

use crate::config::ApiConfig;
use crate::credentials::CredentialResolver;
use crate::youtube_api::videos::SearchListResponse;
use crate::{Error, Result};
use http::{Method, StatusCode};
use oauth2::AccessToken;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Sends requests to the resource APIs on behalf of one user.
///
/// Every request carries the application API key (when configured) and the user's bearer token
/// (when the user is connected). The token is resolved right before each send, never cached here.
/// A `401` triggers exactly one forced refresh and resend; a second `401` is
/// [`Error::Authorization`]. All other failures come back with their original status and are
/// never retried at this layer.
#[derive(Clone)]
pub struct ApiGateway {
    http: reqwest::Client,
    api_key: Option<String>,
    resolver: Arc<CredentialResolver>,
    user_id: String,
}

impl fmt::Debug for ApiGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiGateway")
            .field("user_id", &self.user_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

impl ApiGateway {
    pub fn new(
        http: reqwest::Client,
        api_key: Option<String>,
        resolver: Arc<CredentialResolver>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_key,
            resolver,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn resolver(&self) -> &Arc<CredentialResolver> {
        &self.resolver
    }

    /// `GET`s `url` and decodes the JSON body.
    pub async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.execute(Method::GET, url, query).await?;
        decode(url, response).await
    }

    /// Sends one logical request, with at most one resend after a `401`.
    ///
    /// Returns the successful response; any non-2xx status is turned into an [`Error`].
    #[instrument(skip(self, query), fields(user_id = %self.user_id), level = tracing::Level::TRACE)]
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let token = self.resolver.valid_access_token(&self.user_id).await?;
        let response = self.send_once(&method, url, query, token.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        let body = response.text().await.map_err(Error::from_transport)?;
        tracing::debug!(%url, "access token rejected, refreshing and retrying once");
        let Some(fresh) = self
            .resolver
            .force_refresh(&self.user_id, token.as_ref())
            .await?
        else {
            return Err(match token {
                None => Error::NotConnected,
                Some(_) => Error::Authorization { body },
            });
        };

        let response = self.send_once(&method, url, query, Some(&fresh)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let body = response.text().await.map_err(Error::from_transport)?;
            tracing::warn!(%url, "refreshed access token rejected too");
            return Err(Error::Authorization { body });
        }
        check_status(response).await
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        query: &[(&str, &str)],
        token: Option<&AccessToken>,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.request(method.clone(), url).query(query);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token.secret());
        }
        request.send().await.map_err(Error::from_transport)
    }
}

/// Checks that the configured API key is accepted, with one key-only `search.list` request.
///
/// Returns how many results the request found. A rejected or unknown key (or a project without
/// the Data API enabled) comes back as [`Error::QuotaOrScope`].
#[instrument(skip_all)]
pub async fn check_api_key(http: &reqwest::Client, config: &ApiConfig) -> Result<usize> {
    let key = match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => key,
        _ => return Err(Error::Config("no YouTube API key configured".to_string())),
    };
    let url = format!("{}/search", config.data_api_url.trim_end_matches('/'));
    let response = http
        .get(&url)
        .query(&[
            ("part", "snippet"),
            ("q", "test"),
            ("type", "video"),
            ("maxResults", "1"),
            ("key", key),
        ])
        .send()
        .await
        .map_err(Error::from_transport)?;
    let search: SearchListResponse = decode(&url, check_status(response).await?).await?;
    Ok(search.items.len())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(if status == StatusCode::FORBIDDEN {
        Error::QuotaOrScope { body }
    } else {
        Error::Api { status, body }
    })
}

async fn decode<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T> {
    let body = response.bytes().await.map_err(Error::from_transport)?;
    serde_json::from_slice(&body).map_err(|source| Error::Decode {
        endpoint: url.to_string(),
        source,
    })
}
