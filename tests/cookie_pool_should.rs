use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gateway::database::credential::{Credential, CredentialPoolSnapshot};
use gateway::server::dtos::cookie_dto::PoolState;
use gateway::server::error::{AppResult, Error};
use gateway::server::services::cookie_pool_services::{
    COOKIE_POOL_KEY, CookiePoolService, CookiePoolServiceTrait, PoolConfig, select_best,
};
use gateway::server::services::derivation_services::{
    DerivationServiceTrait, DynDerivationService, MockDerivationServiceTrait,
};
use gateway::{CacheServiceTrait, DynCacheService, FileStore, TieredCache};

#[derive(Clone, Copy)]
enum Step {
    Ok,
    Fail,
    Hang,
}

// hand rolled so the tests can count calls and control timing per call
struct FakeDerivation {
    calls: AtomicUsize,
    delay: Duration,
    plan: Box<dyn Fn(usize) -> Step + Send + Sync>,
}

impl FakeDerivation {
    fn new(delay: Duration, plan: impl Fn(usize) -> Step + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            plan: Box::new(plan),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DerivationServiceTrait for FakeDerivation {
    async fn derive_credential(&self, _channel_id: &str) -> AppResult<Credential> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        match (self.plan)(n) {
            Step::Ok => Ok(Credential::new(
                format!("hdntl=cred{}", n),
                "TestAgent/1.0".to_string(),
                43200,
            )),
            Step::Fail => Err(Error::CredentialNotFoundInManifest),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::UpstreamTimeout("never".to_string()))
            }
        }
    }

    async fn invalidate_platform_token(&self) -> bool {
        true
    }
}

fn pool_config(pool_size: usize) -> PoolConfig {
    PoolConfig {
        pool_size,
        refresh_interval: Duration::from_secs(36000),
        min_remaining: Duration::from_secs(3600),
        generation_delay: Duration::from_millis(0),
        derivation_timeout: Duration::from_millis(200),
        credential_ttl: 43200,
        probe_channel_id: "0-9-aajtak".to_string(),
    }
}

async fn file_cache() -> (tempfile::TempDir, DynCacheService) {
    let dir = tempfile::tempdir().unwrap();
    let files = FileStore::open(dir.path()).await.unwrap();
    (dir, Arc::new(TieredCache::file_only(files)))
}

fn credential_expiring_in(value: &str, seconds: i64) -> Credential {
    let mut credential = Credential::new(value.to_string(), "TestAgent/1.0".to_string(), 0);
    credential.expires_at = Utc::now() + chrono::Duration::seconds(seconds);
    credential
}

#[tokio::test]
async fn test_concurrent_callers_share_one_derivation() {
    let (_dir, cache) = file_cache().await;
    let fake = FakeDerivation::new(Duration::from_millis(50), |_| Step::Ok);
    let pool = Arc::new(CookiePoolService::new(
        fake.clone() as DynDerivationService,
        cache,
        pool_config(1),
    ));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move { pool.get_credential().await }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap().unwrap().value);
    }

    assert_eq!(fake.calls(), 1);
    assert!(values.iter().all(|v| v == "hdntl=cred0"));
}

#[tokio::test]
async fn test_get_credential_fails_when_derivation_fails() {
    let (_dir, cache) = file_cache().await;
    let fake = FakeDerivation::new(Duration::ZERO, |_| Step::Fail);
    let pool = CookiePoolService::new(fake.clone() as DynDerivationService, cache, pool_config(1));

    let result = pool.get_credential().await;

    assert!(matches!(result, Err(Error::NoCredentialAvailable)));
    assert_eq!(fake.calls(), 1);
}

#[tokio::test]
async fn test_refresh_skips_a_derivation_that_times_out() {
    let (_dir, cache) = file_cache().await;
    let fake = FakeDerivation::new(Duration::ZERO, |n| if n == 1 { Step::Hang } else { Step::Ok });
    let pool = CookiePoolService::new(fake.clone() as DynDerivationService, cache, pool_config(2));

    let generated = pool.refresh().await;
    let status = pool.status();

    assert_eq!(generated, 1);
    assert_eq!(status.total_cookies, 1);
    assert_eq!(status.valid_cookies, 1);
    assert_eq!(status.state, PoolState::Ready);
    assert!(status.last_refresh.is_some());
    assert!(status.next_refresh.is_some());
}

#[tokio::test]
async fn test_refresh_accepts_a_partial_batch() {
    let (_dir, cache) = file_cache().await;
    let fake = FakeDerivation::new(Duration::ZERO, |n| if n % 2 == 1 { Step::Fail } else { Step::Ok });
    let pool = CookiePoolService::new(fake.clone() as DynDerivationService, cache, pool_config(3));

    assert_eq!(pool.refresh().await, 2);
    assert_eq!(fake.calls(), 3);

    let status = pool.status();
    assert_eq!(status.total_cookies, 2);
    assert_eq!(status.valid_cookies, 2);
}

#[tokio::test]
async fn test_zero_successes_keep_the_old_pool() {
    let (_dir, cache) = file_cache().await;
    // first refresh works, everything after that fails
    let fake = FakeDerivation::new(Duration::ZERO, |n| if n == 0 { Step::Ok } else { Step::Fail });
    let pool = CookiePoolService::new(fake.clone() as DynDerivationService, cache.clone(), pool_config(1));

    assert_eq!(pool.refresh().await, 1);
    assert_eq!(pool.refresh().await, 0);

    let best = pool.best_available().await.unwrap();
    assert_eq!(best.value, "hdntl=cred0");
    assert_eq!(pool.status().state, PoolState::Ready);

    // the persisted copy still holds the original credential
    let raw = cache.get(COOKIE_POOL_KEY).await.unwrap();
    let snapshot: CredentialPoolSnapshot = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot.cookies.len(), 1);
    assert_eq!(snapshot.cookies[0].value, "hdntl=cred0");
}

#[tokio::test]
async fn test_initialize_loads_persisted_pool_without_deriving() {
    let (_dir, cache) = file_cache().await;
    let snapshot = CredentialPoolSnapshot {
        cookies: vec![
            credential_expiring_in("hdntl=short", 600),
            credential_expiring_in("hdntl=long", 40000),
            credential_expiring_in("hdntl=gone", -10),
        ],
        last_refresh: Some(Utc::now()),
    };
    cache
        .set(COOKIE_POOL_KEY, &serde_json::to_string(&snapshot).unwrap(), Some(3600))
        .await;

    let mut mock = MockDerivationServiceTrait::new();
    mock.expect_derive_credential().times(0);
    let pool = CookiePoolService::new(Arc::new(mock) as DynDerivationService, cache, pool_config(1));

    pool.initialize().await;
    let status = pool.status();

    // the expired one is dropped on load
    assert_eq!(status.total_cookies, 2);
    assert_eq!(status.state, PoolState::Ready);
    assert_eq!(pool.get_credential().await.unwrap().value, "hdntl=long");
}

#[tokio::test]
async fn test_initialize_warms_an_empty_pool() {
    let (_dir, cache) = file_cache().await;

    let mut mock = MockDerivationServiceTrait::new();
    mock.expect_derive_credential()
        .times(2)
        .returning(|_| Ok(Credential::new("hdntl=warm".to_string(), "TestAgent/1.0".to_string(), 43200)));
    let pool = CookiePoolService::new(Arc::new(mock) as DynDerivationService, cache, pool_config(2));

    assert_eq!(pool.status().state, PoolState::Empty);
    pool.initialize().await;

    let status = pool.status();
    assert_eq!(status.valid_cookies, 2);
    assert_eq!(status.state, PoolState::Ready);
    assert!(!status.refreshing);
}

#[tokio::test]
async fn test_should_refresh_follows_pool_health() {
    let (_dir, cache) = file_cache().await;
    let fake = FakeDerivation::new(Duration::ZERO, |_| Step::Ok);

    let pool = CookiePoolService::new(fake.clone() as DynDerivationService, cache.clone(), pool_config(1));
    assert!(pool.should_refresh());
    pool.refresh().await;
    assert!(!pool.should_refresh());

    // low water mark above the credential lifetime means it's always "expiring soon"
    let mut eager = pool_config(1);
    eager.min_remaining = Duration::from_secs(50000);
    let eager_pool = CookiePoolService::new(fake as DynDerivationService, cache, eager);
    eager_pool.refresh().await;
    assert!(eager_pool.should_refresh());
}

#[tokio::test]
async fn test_reported_failure_stops_credential_being_handed_out() {
    let (_dir, cache) = file_cache().await;
    let fake = FakeDerivation::new(Duration::ZERO, |_| Step::Ok);
    let pool = CookiePoolService::new(fake.clone() as DynDerivationService, cache, pool_config(1));

    pool.refresh().await;
    assert!(pool.report_failure(None).await);

    let status = pool.status();
    assert_eq!(status.valid_cookies, 0);
    assert_eq!(status.cookies[0].failure_count, 1);
    assert!(pool.best_available().await.is_none());

    // the next caller derives a replacement
    assert_eq!(pool.get_credential().await.unwrap().value, "hdntl=cred1");
    assert!(!pool.report_failure(Some("hdntl=unknown".to_string())).await);
}

#[test]
fn test_select_best_prefers_longest_then_first() {
    let a = credential_expiring_in("hdntl=a", 1000);
    let mut b = a.clone();
    b.value = "hdntl=b".to_string();
    let c = credential_expiring_in("hdntl=c", 10);

    let creds = vec![c.clone(), a.clone(), b];
    assert_eq!(select_best(&creds).unwrap().value, "hdntl=a");

    let mut invalid = credential_expiring_in("hdntl=bad", 99999);
    invalid.is_valid = false;
    assert_eq!(select_best(&[invalid, c]).unwrap().value, "hdntl=c");
    assert!(select_best(&[]).is_none());
}

#[tokio::test]
async fn test_refilling_after_failures_stays_within_pool_size() {
    let (_dir, cache) = file_cache().await;
    let fake = FakeDerivation::new(Duration::ZERO, |_| Step::Ok);
    let pool = CookiePoolService::new(fake.clone() as DynDerivationService, cache, pool_config(1));

    pool.refresh().await;
    for round in 1..=3 {
        assert!(pool.report_failure(None).await);
        assert_eq!(
            pool.get_credential().await.unwrap().value,
            format!("hdntl=cred{}", round)
        );

        let status = pool.status();
        assert_eq!(status.total_cookies, 1);
        assert_eq!(status.valid_cookies, 1);
    }
}
