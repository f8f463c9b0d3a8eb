//! Error types for the YouTube dashboard core.
//!
//! Lower layers return these typed failures and never decide how they are presented to a user.
//! The one case that is interpreted on the way up is a `403` from the analytics endpoint, which
//! [`crate::youtube_api::YouTubeClient::get_analytics_data`] turns into an empty report.

use http::StatusCode;
use thiserror::Error;

/// Failure of the persistence layer behind a [`crate::store::TokenStore`] or
/// [`crate::store::SnapshotStore`].
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("(de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The authorization code was invalid, expired, or already used.
    ///
    /// Terminal for this attempt; the user has to restart the authorization flow.
    #[error("token exchange failed ({status}): {body}")]
    TokenExchange { status: StatusCode, body: String },

    /// The refresh token was rejected by the provider.
    #[error("token refresh failed ({status}): {body}")]
    TokenRefresh { status: StatusCode, body: String },

    /// The resource API rejected a freshly refreshed access token.
    #[error("YouTube rejected the access token even after a refresh; please reconnect: {body}")]
    Authorization { body: String },

    /// A `403` from a resource endpoint: quota exhausted or scope not granted.
    #[error("YouTube API denied the request (quota or scope): {body}")]
    QuotaOrScope { body: String },

    #[error("YouTube API request failed with status {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("unexpected response payload from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no YouTube account connected")]
    NotConnected,

    #[error("no YouTube channel found for the connected account")]
    NoChannel,

    #[error("authorization denied by provider: {error} ({description:?})")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("callback state does not match the one issued for this session")]
    StateMismatch,

    #[error("callback did not carry an authorization code")]
    MissingCode,
}

impl Error {
    /// Classifies a transport-level [`reqwest::Error`], keeping timeouts distinct.
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e)
        } else {
            Error::Transport(e)
        }
    }

    /// The HTTP status the provider answered with, if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::TokenExchange { status, .. }
            | Error::TokenRefresh { status, .. }
            | Error::Api { status, .. } => Some(*status),
            Error::Authorization { .. } => Some(StatusCode::UNAUTHORIZED),
            Error::QuotaOrScope { .. } => Some(StatusCode::FORBIDDEN),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
