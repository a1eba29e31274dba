use std::sync::Arc;
use std::time::Duration;

use gateway::server::error::Error;
use gateway::server::services::browser_services::{
    DynBrowserService, MockBrowserServiceTrait, RenderedPage,
};
use gateway::server::services::derivation_services::{
    DerivationService, DerivationServiceTrait, ExtractionStrategy, PLATFORM_TOKEN_KEY,
    PipelineConfig, extract_manifest_credential, extract_platform_token,
};
use gateway::{CacheServiceTrait, DynCacheService, FileStore, TieredCache};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PLAYBACK_PATH: &str = "/singlePlayback/getDetails/secure";

fn landing_page(token: &str) -> RenderedPage {
    RenderedPage::new(
        200,
        format!(
            r#"<html><head><script>window.__INITIAL_STATE__ = {{"gwapiPlatformToken":"{}","user":{{}}}};</script></head><body></body></html>"#,
            token
        ),
    )
}

fn browser_returning(token: &'static str, times: usize) -> DynBrowserService {
    let mut browser = MockBrowserServiceTrait::new();
    browser
        .expect_render()
        .times(times)
        .returning(move |_, _| Ok(landing_page(token)));
    Arc::new(browser)
}

async fn pipeline(
    server: &MockServer,
    browser: DynBrowserService,
) -> (tempfile::TempDir, DynCacheService, DerivationService) {
    let dir = tempfile::tempdir().unwrap();
    let files = FileStore::open(dir.path()).await.unwrap();
    let cache = Arc::new(TieredCache::file_only(files)) as DynCacheService;

    let config = PipelineConfig {
        platform_base_url: "https://www.zee5.com".to_string(),
        landing_url: format!("{}/landing", server.uri()),
        api_url: server.uri(),
        user_agent: "TestAgent/1.0".to_string(),
        credential_ttl: 43200,
        platform_token_ttl: 3600,
        upstream_timeout: Duration::from_secs(5),
    };

    let service = DerivationService::new(cache.clone(), browser, config).unwrap();
    (dir, cache, service)
}

async fn mount_playback_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(PLAYBACK_PATH))
        .and(query_param("channel_id", "x1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keyOsDetails": { "video_token": format!("{}/live/x1.m3u8?vt=1", server.uri()) }
        })))
        .mount(server)
        .await;
}

async fn mount_manifest(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/live/x1.m3u8"))
        .and(header("user-agent", "TestAgent/1.0"))
        .respond_with(
            ResponseTemplate::new(200)
                // a cookie header is only a decoy, the body is what counts
                .insert_header("set-cookie", "hdntl=decoy; path=/")
                .set_body_string(body.to_string()),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_pipeline_returns_the_manifest_credential() {
    let server = MockServer::start().await;
    mount_playback_ok(&server).await;
    mount_manifest(&server, "#EXTM3U\n#EXT-X-X:hdntl=exp=99~acl=%2f*~hmac=ab12\nindex.m3u8\n").await;

    let (_dir, cache, service) = pipeline(&server, browser_returning("ptok", 1)).await;
    let credential = service.derive_credential("x1").await.unwrap();

    assert_eq!(credential.value, "hdntl=exp=99~acl=%2f*~hmac=ab12");
    assert_eq!(credential.user_agent, "TestAgent/1.0");
    assert!(credential.is_usable());
    let lifetime = credential.expires_at - credential.created_at;
    assert_eq!(lifetime.num_seconds(), 43200);

    assert_eq!(cache.get(PLATFORM_TOKEN_KEY).await.as_deref(), Some("ptok"));
}

#[tokio::test]
async fn test_cached_platform_token_skips_the_browser() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PLAYBACK_PATH))
        .and(header("x-access-token", "cached-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keyOsDetails": { "video_token": format!("{}/live/x1.m3u8", server.uri()) }
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_manifest(&server, "hdntl=abc123\n").await;

    let (_dir, cache, service) = pipeline(&server, browser_returning("unused", 0)).await;
    cache.set(PLATFORM_TOKEN_KEY, "cached-token", Some(3600)).await;

    let credential = service.derive_credential("x1").await.unwrap();
    assert_eq!(credential.value, "hdntl=abc123");
}

#[tokio::test]
async fn test_one_unauthorized_response_is_retried_with_a_new_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PLAYBACK_PATH))
        .and(header("x-access-token", "stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(PLAYBACK_PATH))
        .and(header("x-access-token", "fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keyOsDetails": { "video_token": format!("{}/live/x1.m3u8", server.uri()) }
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_manifest(&server, "hdntl=after-retry\n").await;

    let (_dir, cache, service) = pipeline(&server, browser_returning("fresh", 1)).await;
    cache.set(PLATFORM_TOKEN_KEY, "stale", Some(3600)).await;

    let credential = service.derive_credential("x1").await.unwrap();

    assert_eq!(credential.value, "hdntl=after-retry");
    assert_eq!(cache.get(PLATFORM_TOKEN_KEY).await.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_second_unauthorized_response_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PLAYBACK_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let (_dir, _cache, service) = pipeline(&server, browser_returning("ptok", 2)).await;

    let result = service.derive_credential("x1").await;
    assert!(matches!(result, Err(Error::AuthRetryExhausted)));
}

#[tokio::test]
async fn test_missing_manifest_url_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PLAYBACK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keyOsDetails": {} })))
        .mount(&server)
        .await;

    let (_dir, _cache, service) = pipeline(&server, browser_returning("ptok", 1)).await;

    let result = service.derive_credential("x1").await;
    assert!(matches!(result, Err(Error::UpstreamApi(_))));
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PLAYBACK_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, _cache, service) = pipeline(&server, browser_returning("ptok", 1)).await;

    let result = service.derive_credential("x1").await;
    assert!(matches!(result, Err(Error::UpstreamApi(_))));
}

#[tokio::test]
async fn test_manifest_without_credential_fails() {
    let server = MockServer::start().await;
    mount_playback_ok(&server).await;
    mount_manifest(&server, "#EXTM3U\nindex.m3u8\n").await;

    let (_dir, _cache, service) = pipeline(&server, browser_returning("ptok", 1)).await;

    let result = service.derive_credential("x1").await;
    assert!(matches!(result, Err(Error::CredentialNotFoundInManifest)));
}

#[tokio::test]
async fn test_manifest_redirects_are_not_followed() {
    let server = MockServer::start().await;
    mount_playback_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/live/x1.m3u8"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/elsewhere.m3u8", server.uri()))
                .set_body_string("moved hdntl=from-first-hop\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hdntl=from-redirect\n"))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, _cache, service) = pipeline(&server, browser_returning("ptok", 1)).await;

    let credential = service.derive_credential("x1").await.unwrap();
    assert_eq!(credential.value, "hdntl=from-first-hop");
}

#[tokio::test]
async fn test_landing_page_error_status_fails_extraction() {
    let server = MockServer::start().await;
    let mut browser = MockBrowserServiceTrait::new();
    browser
        .expect_render()
        .returning(|_, _| Ok(RenderedPage::new(403, "<html>denied</html>".to_string())));

    let (_dir, _cache, service) = pipeline(&server, Arc::new(browser)).await;

    let result = service.derive_credential("x1").await;
    assert!(matches!(result, Err(Error::TokenExtractionFailed(_))));
}

#[test]
fn test_strategies_run_in_order() {
    let page = landing_page("from-page");

    assert_eq!(
        ExtractionStrategy::Markup.extract(&page).as_deref(),
        Some("from-page")
    );
    assert_eq!(
        ExtractionStrategy::GlobalState.extract(&page).as_deref(),
        Some("from-page")
    );
    assert_eq!(
        ExtractionStrategy::InlineScripts.extract(&page).as_deref(),
        Some("from-page")
    );
    assert_eq!(extract_platform_token(&page).unwrap(), "from-page");
}

#[test]
fn test_evaluate_reads_nested_window_globals() {
    let page = RenderedPage::new(
        200,
        r#"<script src="/app.js"></script><script>window.__APP__ = {"config": {"region": "IN", "build": 7}}; start();</script>"#
            .to_string(),
    );

    assert_eq!(page.inline_scripts.len(), 1);
    assert_eq!(page.evaluate("window.__APP__.config.region").as_deref(), Some("IN"));
    assert_eq!(page.evaluate("__APP__.config.region").as_deref(), Some("IN"));
    // only strings come back
    assert_eq!(page.evaluate("__APP__.config.build"), None);
    assert_eq!(page.evaluate("__MISSING__.anything"), None);
    assert_eq!(ExtractionStrategy::GlobalState.extract(&page), None);
}

#[test]
fn test_page_without_token_exhausts_every_strategy() {
    let page = RenderedPage::new(200, "<html><script>var a = 1;</script></html>".to_string());

    match extract_platform_token(&page) {
        Err(Error::TokenExtractionFailed(reason)) => {
            assert!(reason.contains("Markup"));
            assert!(reason.contains("GlobalState"));
            assert!(reason.contains("InlineScripts"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_manifest_credential_stops_at_whitespace() {
    assert_eq!(
        extract_manifest_credential("a\nhdntl=exp=1~acl=/*~hmac=ff other").as_deref(),
        Some("hdntl=exp=1~acl=/*~hmac=ff")
    );
    assert_eq!(extract_manifest_credential("nothing here"), None);
}
