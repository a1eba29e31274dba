use std::sync::Arc;

use gateway::database::channel::{Channel, DynChannelRepository, JsonChannelRepository};
use gateway::database::credential::Credential;
use gateway::server::dtos::stream_dto::CredentialSource;
use gateway::server::error::Error;
use gateway::server::services::channel_cookie_services::{
    CHANNEL_COOKIE_TTL_SECONDS, ChannelCookieService, DynChannelCookieService,
};
use gateway::server::services::cookie_pool_services::{
    DynCookiePoolService, MockCookiePoolServiceTrait,
};
use gateway::server::services::derivation_services::{
    DynDerivationService, MockDerivationServiceTrait,
};
use gateway::server::services::stream_services::{StreamsService, StreamsServiceTrait};
use gateway::{DynCacheService, FileCacheEntry, FileStore, TieredCache};
use mockall::predicate::eq;

fn catalog() -> DynChannelRepository {
    Arc::new(JsonChannelRepository::from_channels(vec![Channel {
        id: "x1".to_string(),
        slug: "x-one".to_string(),
        name: "Channel X1".to_string(),
        country: "IN".to_string(),
        chno: "1".to_string(),
        language: "en".to_string(),
        logo: String::new(),
        genre: "News".to_string(),
        url: "https://cdn.example/x1.m3u8".to_string(),
    }]))
}

fn credential(value: &str) -> Credential {
    Credential::new(value.to_string(), "TestAgent/1.0".to_string(), 43200)
}

fn empty_pool() -> DynCookiePoolService {
    let mut pool = MockCookiePoolServiceTrait::new();
    pool.expect_best_available().returning(|| None);
    Arc::new(pool)
}

struct Harness {
    _dir: tempfile::TempDir,
    files: FileStore,
    streams: StreamsService,
}

async fn harness(derivation: MockDerivationServiceTrait, pool: DynCookiePoolService) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let files = FileStore::open(dir.path()).await.unwrap();
    let cache = Arc::new(TieredCache::file_only(files.clone())) as DynCacheService;

    let channel_cookies = Arc::new(ChannelCookieService::new(
        cache,
        Arc::new(derivation) as DynDerivationService,
        CHANNEL_COOKIE_TTL_SECONDS,
    )) as DynChannelCookieService;

    Harness {
        _dir: dir,
        files,
        streams: StreamsService::new(catalog(), channel_cookies, pool),
    }
}

#[tokio::test]
async fn test_first_request_derives_once_and_caches() {
    let mut derivation = MockDerivationServiceTrait::new();
    derivation
        .expect_derive_credential()
        .with(eq("x1"))
        .times(1)
        .returning(|_| Ok(credential("hdntl=abc123")));

    let h = harness(derivation, empty_pool()).await;

    let first = h.streams.resolve("x1").await.unwrap();
    assert_eq!(first.stream_url, "https://cdn.example/x1.m3u8?hdntl=abc123");
    assert_eq!(first.source, CredentialSource::Derived);
    assert!(!first.cached());

    // stored under the channel key with a 10h ttl
    let raw = tokio::fs::read_to_string(h.files.dir().join("channel_cookie%3Ax1.cache"))
        .await
        .unwrap();
    let entry: FileCacheEntry = serde_json::from_str(&raw).unwrap();
    assert_eq!(entry.value, "hdntl=abc123");
    let ttl = entry.expires_at.unwrap() - entry.created_at;
    assert_eq!(ttl.num_seconds(), 36000);

    // second request comes out of the cache, the mock would panic on a second derivation
    let second = h.streams.resolve("x1").await.unwrap();
    assert_eq!(second.stream_url, first.stream_url);
    assert_eq!(second.source, CredentialSource::ChannelCache);
    assert!(second.cached());
}

#[tokio::test]
async fn test_unknown_channel_is_not_found() {
    let mut derivation = MockDerivationServiceTrait::new();
    derivation.expect_derive_credential().times(0);

    let h = harness(derivation, empty_pool()).await;

    assert!(matches!(
        h.streams.resolve("nope").await,
        Err(Error::ResourceNotFound(_))
    ));
}

#[tokio::test]
async fn test_falls_back_to_the_shared_pool() {
    let mut derivation = MockDerivationServiceTrait::new();
    derivation
        .expect_derive_credential()
        .returning(|_| Err(Error::AuthRetryExhausted));

    let mut pool = MockCookiePoolServiceTrait::new();
    pool.expect_best_available()
        .times(1)
        .returning(|| Some(credential("hdntl=pooled")));
    pool.expect_get_credential().times(0);

    let h = harness(derivation, Arc::new(pool)).await;
    let resolved = h.streams.resolve("x1").await.unwrap();

    assert_eq!(resolved.stream_url, "https://cdn.example/x1.m3u8?hdntl=pooled");
    assert_eq!(resolved.source, CredentialSource::SharedPool);
    assert!(resolved.expires_in > 0);
}

#[tokio::test]
async fn test_nothing_to_attach_means_unavailable() {
    let mut derivation = MockDerivationServiceTrait::new();
    derivation
        .expect_derive_credential()
        .returning(|_| Err(Error::CredentialNotFoundInManifest));

    let h = harness(derivation, empty_pool()).await;

    let result = h.streams.resolve("x1").await;
    assert!(matches!(result, Err(Error::StreamUnavailable(_))));
}
