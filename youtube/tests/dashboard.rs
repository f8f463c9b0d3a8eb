mod common;

use common::{USER, channel_body, config, start_time, token_response, tokens, video_body};
use jiff::civil::date;
use oauth2::CsrfToken;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use youtube_dashboard::youtube_api::DateRange;
use youtube_dashboard::{
    CallbackParams, Dashboard, Error, JsonFileStore, ManualClock, MemoryStore, SnapshotStore,
    TokenStore,
};

async fn mount_exchange(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .respond_with(token_response("A1", Some("R1"), 3600))
        .expect(1)
        .named("code exchange")
        .mount(server)
        .await;
}

async fn mount_channel(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(channel_body("UC1")))
        .mount(server)
        .await;
}

fn dashboard(server: &MockServer, store: Arc<MemoryStore>) -> Dashboard {
    let clock = Arc::new(ManualClock::new(start_time()));
    Dashboard::with_clock(config(server), store.clone(), store, clock).unwrap()
}

#[tokio::test]
async fn authorization_url_points_at_provider() {
    let server = MockServer::start().await;
    let d = dashboard(&server, Arc::new(MemoryStore::new()));

    let url = d
        .authorization_url(&CsrfToken::new("s-1".to_string()))
        .unwrap();
    let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(url.host_str(), Some("accounts.google.com"));
    assert_eq!(query["state"], "s-1");
    assert_eq!(query["access_type"], "offline");
    assert_eq!(query["prompt"], "consent");
}

#[tokio::test]
async fn callback_connects_and_caches_channel() {
    let server = MockServer::start().await;
    mount_exchange(&server).await;
    mount_channel(&server).await;
    let store = Arc::new(MemoryStore::new());
    let d = dashboard(&server, store.clone());

    let params = CallbackParams::from_query("code=abc&state=s-1");
    let channel = d
        .complete_authorization(USER, &params, "s-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(channel.id, "UC1");

    let record = store.load(USER).await.unwrap().unwrap();
    assert_eq!(record.access_token.secret(), "A1");
    assert_eq!(store.channels(USER).await.unwrap(), vec![channel]);
}

#[tokio::test]
async fn callback_with_forged_state_never_exchanges() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response("A1", Some("R1"), 3600))
        .expect(0)
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let d = dashboard(&server, store.clone());

    let params = CallbackParams::from_query("code=abc&state=forged");
    let err = d
        .complete_authorization(USER, &params, "s-1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StateMismatch), "{err:?}");

    let params = CallbackParams::from_query("error=access_denied&state=s-1");
    let err = d
        .complete_authorization(USER, &params, "s-1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AuthorizationDenied { .. }), "{err:?}");
    assert!(store.load(USER).await.unwrap().is_none());
}

#[tokio::test]
async fn callback_survives_channel_lookup_failure() {
    let server = MockServer::start().await;
    mount_exchange(&server).await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let d = dashboard(&server, store.clone());

    let params = CallbackParams::from_query("code=abc&state=s-1");
    let channel = d.complete_authorization(USER, &params, "s-1").await.unwrap();
    assert_eq!(channel, None);
    assert!(store.load(USER).await.unwrap().is_some());
}

#[tokio::test]
async fn syncing_requires_a_connection() {
    let server = MockServer::start().await;
    let d = dashboard(&server, Arc::new(MemoryStore::new()));

    assert!(matches!(d.sync_channel(USER).await, Err(Error::NotConnected)));
    assert!(matches!(
        d.sync_videos(USER, 10, None).await,
        Err(Error::NotConnected)
    ));
    assert!(matches!(
        d.sync_analytics(USER, None, &[]).await,
        Err(Error::NotConnected)
    ));
}

#[tokio::test]
async fn disconnect_forgets_credentials() {
    let server = MockServer::start().await;
    mount_exchange(&server).await;
    mount_channel(&server).await;
    let store = Arc::new(MemoryStore::new());
    let d = dashboard(&server, store.clone());

    let params = CallbackParams::from_query("code=abc&state=s-1");
    d.complete_authorization(USER, &params, "s-1").await.unwrap();
    d.disconnect(USER).await.unwrap();
    d.disconnect(USER).await.unwrap();

    assert!(store.load(USER).await.unwrap().is_none());
    assert!(matches!(d.sync_channel(USER).await, Err(Error::NotConnected)));
}

#[tokio::test]
async fn resyncing_upserts_into_the_file_store() {
    let server = MockServer::start().await;
    mount_exchange(&server).await;
    mount_channel(&server).await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "pageInfo": { "totalResults": 2, "resultsPerPage": 2 },
            "items": [
                { "id": { "kind": "youtube#video", "videoId": "a" } },
                { "id": { "kind": "youtube#video", "videoId": "b" } }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [video_body("a", 10), video_body("b", 20)]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path().join("dashboard.json")));
    let clock = Arc::new(ManualClock::new(start_time()));
    let d = Dashboard::with_clock(config(&server), store.clone(), store.clone(), clock).unwrap();

    let params = CallbackParams::from_query("code=abc&state=s-1");
    d.complete_authorization(USER, &params, "s-1").await.unwrap();
    d.sync_channel(USER).await.unwrap();
    d.sync_channel(USER).await.unwrap();
    d.sync_videos(USER, 25, None).await.unwrap();
    let page = d.sync_videos(USER, 25, None).await.unwrap();
    assert_eq!(page.videos.len(), 2);

    let reopened = JsonFileStore::new(dir.path().join("dashboard.json"));
    assert_eq!(reopened.channels(USER).await.unwrap().len(), 1);
    let videos = reopened.videos(USER).await.unwrap();
    assert_eq!(
        videos.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(),
        ["a", "b"]
    );
    assert!(reopened.load(USER).await.unwrap().is_some());
}

#[tokio::test]
async fn analytics_default_to_last_thirty_days() {
    let server = MockServer::start().await;
    mount_exchange(&server).await;
    mount_channel(&server).await;
    Mock::given(method("GET"))
        .and(path("/v2/reports"))
        .and(query_param("startDate", "2024-04-01"))
        .and(query_param("endDate", "2024-05-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "columnHeaders": [{ "name": "day" }, { "name": "views" }],
            "rows": [["2024-04-30", 7], ["2024-05-01", 9]]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let d = dashboard(&server, store.clone());

    let params = CallbackParams::from_query("code=abc&state=s-1");
    d.complete_authorization(USER, &params, "s-1").await.unwrap();
    let report = d.sync_analytics(USER, None, &[]).await.unwrap();
    assert!(report.available);

    let cached = store.analytics(USER, "UC1").await.unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(cached[0].date, date(2024, 4, 30));
    assert_eq!(cached[1].views, 9);
}

#[tokio::test]
async fn unavailable_analytics_cache_nothing() {
    let server = MockServer::start().await;
    mount_exchange(&server).await;
    mount_channel(&server).await;
    Mock::given(method("GET"))
        .and(path("/v2/reports"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let d = dashboard(&server, store.clone());

    let params = CallbackParams::from_query("code=abc&state=s-1");
    d.complete_authorization(USER, &params, "s-1").await.unwrap();
    let range = DateRange::new(date(2024, 4, 1), date(2024, 4, 30));
    let report = d.sync_analytics(USER, Some(range), &[]).await.unwrap();
    assert!(!report.available);
    assert!(store.analytics(USER, "UC1").await.unwrap().is_empty());
}

#[tokio::test]
async fn slow_api_is_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(channel_body("UC1"))
                .set_delay(Duration::from_secs(1)),
        )
        .mount(&server)
        .await;
    let mut config = config(&server);
    config.api = config.api.with_request_timeout(Duration::from_millis(200));
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let d = Dashboard::with_clock(config, store.clone(), store.clone(), clock).unwrap();
    d.resolver()
        .store_tokens(USER, tokens("A1", Some("R1")))
        .await
        .unwrap();

    let err = d.sync_channel(USER).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err:?}");
    // Nothing about a timeout says the credential is bad.
    assert!(store.load(USER).await.unwrap().is_some());
    assert!(store.channels(USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn api_key_check_sends_key_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/search"))
        .and(query_param("key", common::API_KEY))
        .and(query_param("maxResults", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{ "id": { "kind": "youtube#video", "videoId": "a" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let d = dashboard(&server, Arc::new(MemoryStore::new()));

    assert_eq!(d.check_api_key().await.unwrap(), 1);
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn api_key_check_reports_rejected_or_missing_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/search"))
        .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
        .expect(1)
        .mount(&server)
        .await;
    let d = dashboard(&server, Arc::new(MemoryStore::new()));
    assert!(matches!(
        d.check_api_key().await,
        Err(Error::QuotaOrScope { .. })
    ));

    let mut config = config(&server);
    config.api.api_key = None;
    let store = Arc::new(MemoryStore::new());
    let d = Dashboard::new(config, store.clone(), store).unwrap();
    assert!(matches!(d.check_api_key().await, Err(Error::Config(_))));
}
