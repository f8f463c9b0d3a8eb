//! Endpoint and credential configuration.
//!
//! Everything defaults to Google's production endpoints; every URL can be overridden so that
//! tests (and staging setups) can point the client at another server.

use std::time::Duration;

/// Google's OAuth 2.0 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google's OAuth 2.0 token endpoint, used for both code exchange and refresh.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Base URL of the YouTube Data API v3.
pub const YOUTUBE_DATA_API_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Base URL of the YouTube Analytics API v2.
pub const YOUTUBE_ANALYTICS_API_URL: &str = "https://youtubeanalytics.googleapis.com/v2";

/// Per-request timeout applied to every outbound call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Scopes requested during authorization.
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/youtube.readonly",
    "https://www.googleapis.com/auth/yt-analytics.readonly",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// OAuth client registration and provider endpoints.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Must match one of the redirect URIs registered for `client_id`.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
}

impl OAuthConfig {
    /// Configuration for Google's endpoints with the default YouTube scopes.
    pub fn google(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

/// Settings for the resource APIs.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Application-level API key, attached as `key=` to every resource request when set.
    pub api_key: Option<String>,
    pub data_api_url: String,
    pub analytics_api_url: String,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            data_api_url: YOUTUBE_DATA_API_URL.to_string(),
            analytics_api_url: YOUTUBE_ANALYTICS_API_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ApiConfig {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Points both resource APIs at `base`, as `{base}/youtube/v3` and `{base}/v2`.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.data_api_url = format!("{base}/youtube/v3");
        self.analytics_api_url = format!("{base}/v2");
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub oauth: OAuthConfig,
    pub api: ApiConfig,
}

/// Builds the HTTP client shared by the OAuth and resource clients.
pub(crate) fn http_client(timeout: Duration) -> crate::Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        // SSRF no thank you.
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|e| crate::Error::Config(format!("build HTTP client: {e}")))
}
