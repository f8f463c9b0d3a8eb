#![allow(dead_code)]

use jiff::{SignedDuration, Timestamp};
use oauth2::{AccessToken, RefreshToken};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use youtube_dashboard::youtube_api::{ApiGateway, YouTubeClient};
use youtube_dashboard::{
    ApiConfig, Config, CredentialResolver, ManualClock, MemoryStore, OAuthClient, OAuthConfig,
    TokenSet,
};

pub const API_KEY: &str = "test-api-key";
pub const USER: &str = "user-1";

pub fn start_time() -> Timestamp {
    "2024-05-01T12:00:00Z".parse().unwrap()
}

pub fn oauth_config(server: &MockServer) -> OAuthConfig {
    OAuthConfig::google(
        "client-id",
        "client-secret",
        "http://localhost:3000/api/auth/youtube/callback",
    )
    .with_token_url(format!("{}/token", server.uri()))
}

pub fn api_config(server: &MockServer) -> ApiConfig {
    ApiConfig::default()
        .with_base_url(&server.uri())
        .with_api_key(API_KEY)
}

pub fn config(server: &MockServer) -> Config {
    Config {
        oauth: oauth_config(server),
        api: api_config(server),
    }
}

/// A token endpoint answer in Google's format.
pub fn token_response(access: &str, refresh: Option<&str>, expires_in: u64) -> ResponseTemplate {
    let mut body = serde_json::json!({
        "access_token": access,
        "expires_in": expires_in,
        "token_type": "Bearer",
        "scope": "https://www.googleapis.com/auth/youtube.readonly",
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = refresh.into();
    }
    ResponseTemplate::new(200).set_body_json(body)
}

/// Mounts a refresh-grant responder on `/token` that must be hit exactly `times` times.
pub async fn mount_refresh(server: &MockServer, response: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(response)
        .expect(times)
        .named("token refresh")
        .mount(server)
        .await;
}

pub fn tokens(access: &str, refresh: Option<&str>) -> TokenSet {
    TokenSet {
        access_token: AccessToken::new(access.to_string()),
        refresh_token: refresh.map(|r| RefreshToken::new(r.to_string())),
        expires_in: Duration::from_secs(3600),
        token_type: "Bearer".to_string(),
        scope: String::new(),
    }
}

/// Everything needed to drive one user's credentials against a mock provider.
pub struct Harness {
    pub server: MockServer,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub resolver: Arc<CredentialResolver>,
}

impl Harness {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let oauth = OAuthClient::new(oauth_config(&server)).unwrap();
        let resolver = Arc::new(CredentialResolver::with_clock(
            oauth,
            store.clone(),
            clock.clone(),
        ));
        Self {
            server,
            store,
            clock,
            resolver,
        }
    }

    /// Stores `access`/`refresh` for [`USER`], issued now and valid for an hour.
    pub async fn connected(access: &str, refresh: Option<&str>) -> Self {
        let h = Self::new().await;
        h.resolver
            .store_tokens(USER, tokens(access, refresh))
            .await
            .unwrap();
        h
    }

    pub fn expire(&self) {
        self.clock.advance(SignedDuration::from_secs(3601));
    }

    pub fn client(&self) -> YouTubeClient {
        let api = api_config(&self.server);
        let gateway = ApiGateway::new(
            reqwest::Client::new(),
            api.api_key.clone(),
            self.resolver.clone(),
            USER,
        );
        YouTubeClient::new(Arc::new(gateway), &api)
    }
}

pub fn channel_body(id: &str) -> serde_json::Value {
    serde_json::json!({
        "kind": "youtube#channelListResponse",
        "pageInfo": { "totalResults": 1, "resultsPerPage": 5 },
        "items": [{
            "id": id,
            "snippet": {
                "title": "Crab Kitchen",
                "description": "Cooking with ferris",
                "thumbnails": { "high": { "url": "https://yt3.example/high.jpg" } }
            },
            "statistics": {
                "viewCount": "5000",
                "subscriberCount": "120",
                "hiddenSubscriberCount": false,
                "videoCount": "3"
            }
        }]
    })
}

pub fn video_body(id: &str, views: u64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "snippet": {
            "title": format!("Video {id}"),
            "publishedAt": "2024-04-01T00:00:00Z",
            "thumbnails": { "medium": { "url": format!("https://i.ytimg.com/{id}.jpg") } }
        },
        "statistics": { "viewCount": views.to_string(), "likeCount": "1" },
        "contentDetails": { "duration": "PT1M" }
    })
}
