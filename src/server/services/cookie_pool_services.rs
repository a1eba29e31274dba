//! shared credential pool
//!
//! holds up to `pool_size` credentials derived against the probe channel and keeps them warm on
//! a schedule. every mutation (load, single derivation, batch refresh, failure report) runs under
//! one async lock so at most one derivation is in flight per pool. readers that only need a view
//! (status, the refresh check) go through a published snapshot and never wait on that lock.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::database::DynCacheService;
use crate::database::credential::{Credential, CredentialPoolSnapshot};
use crate::server::dtos::cookie_dto::{CookieDetail, CookiePoolStatus, PoolState};
use crate::server::error::{AppResult, Error};
use crate::server::services::derivation_services::DynDerivationService;

pub type DynCookiePoolService = Arc<dyn CookiePoolServiceTrait + Send + Sync>;

pub const COOKIE_POOL_KEY: &str = "cookie_pool";

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pool_size: usize,
    pub refresh_interval: Duration,
    pub min_remaining: Duration,
    pub generation_delay: Duration,
    /// upper bound on one derivation inside a refresh or a synchronous fill
    pub derivation_timeout: Duration,
    pub credential_ttl: u64,
    pub probe_channel_id: String,
}

impl From<&AppConfig> for PoolConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            pool_size: config.cookie_pool_size.max(1),
            refresh_interval: Duration::from_secs(config.cookie_refresh_interval),
            min_remaining: Duration::from_secs(config.cookie_min_remaining),
            generation_delay: Duration::from_millis(config.cookie_generation_delay_ms),
            // browser render + api call + manifest fetch, each with their own timeout
            derivation_timeout: Duration::from_secs(
                config.browser_timeout + 2 * config.upstream_timeout,
            ),
            credential_ttl: config.cookie_cache_ttl,
            probe_channel_id: config.probe_channel_id.clone(),
        }
    }
}

#[automock]
#[async_trait]
pub trait CookiePoolServiceTrait {
    /// loads the persisted pool, runs a full refresh if nothing usable came back
    async fn initialize(&self);

    /// the usable credential with the most time left, derives one synchronously if the pool is dry
    async fn get_credential(&self) -> AppResult<Credential>;

    /// same pick as `get_credential` but never derives, None when the pool has nothing usable
    async fn best_available(&self) -> Option<Credential>;

    /// derives a fresh batch and swaps it in, returns how many derivations succeeded
    async fn refresh(&self) -> usize;

    fn should_refresh(&self) -> bool;

    fn status(&self) -> CookiePoolStatus;

    /// marks a credential as failed so it stops being handed out, None picks the current best
    async fn report_failure(&self, value: Option<String>) -> bool;
}

#[derive(Debug, Default, Clone)]
struct PoolView {
    credentials: Vec<Credential>,
    last_refresh: Option<DateTime<Utc>>,
    next_refresh: Option<DateTime<Utc>>,
    state: Option<PoolState>,
}

// clears the refreshing flag even when the refresh future is dropped halfway
struct RefreshingGuard<'a>(&'a AtomicBool);

impl<'a> RefreshingGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RefreshingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct CookiePoolService {
    derivation: DynDerivationService,
    cache: DynCacheService,
    config: PoolConfig,
    inner: Mutex<PoolView>,
    published: RwLock<PoolView>,
    refreshing: AtomicBool,
}

/// first usable credential with the greatest remaining lifetime, insertion order breaks ties
pub fn select_best(credentials: &[Credential]) -> Option<&Credential> {
    credentials
        .iter()
        .filter(|c| c.is_usable())
        .fold(None, |best: Option<&Credential>, candidate| match best {
            Some(current) if current.expires_at >= candidate.expires_at => Some(current),
            _ => Some(candidate),
        })
}

impl CookiePoolService {
    pub fn new(
        derivation: DynDerivationService,
        cache: DynCacheService,
        config: PoolConfig,
    ) -> Self {
        let view = PoolView {
            state: Some(PoolState::Empty),
            ..Default::default()
        };

        Self {
            derivation,
            cache,
            config,
            inner: Mutex::new(view.clone()),
            published: RwLock::new(view),
            refreshing: AtomicBool::new(false),
        }
    }

    fn has_usable(credentials: &[Credential]) -> bool {
        credentials.iter().any(|c| c.is_usable())
    }

    fn settle_state(pool: &mut PoolView) {
        pool.state = Some(if Self::has_usable(&pool.credentials) {
            PoolState::Ready
        } else if pool.last_refresh.is_some() {
            PoolState::Degraded
        } else {
            PoolState::Empty
        });
    }

    fn publish(&self, pool: &PoolView) {
        let mut published = self.published.write().unwrap_or_else(|e| e.into_inner());
        *published = pool.clone();
    }

    fn snapshot(&self) -> PoolView {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn schedule_next_refresh(&self, pool: &mut PoolView) {
        let interval = chrono::Duration::from_std(self.config.refresh_interval)
            .unwrap_or_else(|_| chrono::Duration::hours(10));
        let next = Utc::now() + interval;
        info!("Next pool refresh scheduled at {}", next);
        pool.next_refresh = Some(next);
    }

    async fn load_persisted(&self) -> Option<CredentialPoolSnapshot> {
        let raw = self.cache.get(COOKIE_POOL_KEY).await?;

        match serde_json::from_str::<CredentialPoolSnapshot>(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                error!("Persisted cookie pool is unreadable: {}", e);
                None
            }
        }
    }

    async fn persist(&self, pool: &PoolView) {
        let snapshot = CredentialPoolSnapshot {
            cookies: pool.credentials.clone(),
            last_refresh: pool.last_refresh,
        };

        match serde_json::to_string(&snapshot) {
            Ok(raw) => {
                if !self
                    .cache
                    .set(COOKIE_POOL_KEY, &raw, Some(self.config.credential_ttl))
                    .await
                {
                    error!("Failed to persist cookie pool");
                }
            }
            Err(e) => error!("Failed to serialize cookie pool: {}", e),
        }
    }

    async fn derive_one(&self) -> AppResult<Credential> {
        match tokio::time::timeout(
            self.config.derivation_timeout,
            self.derivation
                .derive_credential(&self.config.probe_channel_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::UpstreamTimeout(format!(
                "derivation took longer than {:?}",
                self.config.derivation_timeout
            ))),
        }
    }

    // callers hold the pool lock
    async fn refresh_locked(&self, pool: &mut PoolView) -> usize {
        let target = self.config.pool_size;
        info!("Refreshing cookie pool (target size: {})", target);

        let mut fresh = Vec::with_capacity(target);
        for i in 0..target {
            debug!("Generating cookie {}/{}", i + 1, target);

            match self.derive_one().await {
                Ok(credential) => fresh.push(credential),
                Err(e) => warn!("Failed to generate cookie {}/{}: {}", i + 1, target, e),
            }

            if i + 1 < target {
                tokio::time::sleep(self.config.generation_delay).await;
            }
        }

        let generated = fresh.len();
        if generated > 0 {
            if generated < target {
                warn!("Partial refresh, got {}/{} cookies", generated, target);
            }
            pool.credentials = fresh;
        } else {
            error!("Failed to generate any new cookies, keeping the old pool");
        }

        pool.last_refresh = Some(Utc::now());
        self.schedule_next_refresh(pool);
        Self::settle_state(pool);

        if generated > 0 {
            self.persist(pool).await;
            info!("Refreshed cookie pool with {} cookies", generated);
        }

        metrics::counter!("pool_refreshes_total").increment(1);
        generated
    }
}

#[async_trait]
impl CookiePoolServiceTrait for CookiePoolService {
    async fn initialize(&self) {
        info!("Initializing cookie pool...");
        let mut pool = self.inner.lock().await;

        if let Some(snapshot) = self.load_persisted().await {
            pool.credentials = snapshot
                .cookies
                .into_iter()
                .filter(|c| !c.is_expired())
                .collect();
            pool.last_refresh = snapshot.last_refresh;
            info!("Loaded {} cookies from cache", pool.credentials.len());
        }

        if Self::has_usable(&pool.credentials) {
            self.schedule_next_refresh(&mut pool);
            Self::settle_state(&mut pool);
            self.publish(&pool);
            return;
        }

        info!("No valid cookies found, warming the pool...");
        pool.state = Some(PoolState::Warming);
        self.publish(&pool);

        {
            let _refreshing = RefreshingGuard::raise(&self.refreshing);
            self.refresh_locked(&mut pool).await;
        }

        self.publish(&pool);
    }

    async fn get_credential(&self) -> AppResult<Credential> {
        let mut pool = self.inner.lock().await;

        if !Self::has_usable(&pool.credentials) {
            warn!("No valid cookies in pool, generating one...");

            match self.derive_one().await {
                Ok(credential) => {
                    // failed and expired entries would otherwise pile up past the pool size
                    pool.credentials.retain(Credential::is_usable);
                    pool.credentials.push(credential);
                    Self::settle_state(&mut pool);
                    self.persist(&pool).await;
                    self.publish(&pool);
                }
                Err(e) => {
                    error!("Failed to generate cookie: {}", e);
                    return Err(Error::NoCredentialAvailable);
                }
            }
        }

        let best = select_best(&pool.credentials)
            .cloned()
            .ok_or(Error::NoCredentialAvailable)?;

        debug!(
            "Returning cookie with {}s remaining",
            best.remaining_seconds()
        );
        Ok(best)
    }

    async fn best_available(&self) -> Option<Credential> {
        select_best(&self.snapshot().credentials).cloned()
    }

    async fn refresh(&self) -> usize {
        let mut pool = self.inner.lock().await;

        let generated = {
            let _refreshing = RefreshingGuard::raise(&self.refreshing);
            self.refresh_locked(&mut pool).await
        };

        self.publish(&pool);
        generated
    }

    fn should_refresh(&self) -> bool {
        let view = self.snapshot();

        let usable: Vec<&Credential> = view.credentials.iter().filter(|c| c.is_usable()).collect();
        if usable.is_empty() {
            return true;
        }

        if view.next_refresh.is_some_and(|next| Utc::now() >= next) {
            return true;
        }

        let min_remaining = usable
            .iter()
            .map(|c| c.remaining_seconds())
            .min()
            .unwrap_or(0);

        if min_remaining < self.config.min_remaining.as_secs() as i64 {
            info!("Cookies expiring soon (min remaining: {}s)", min_remaining);
            return true;
        }

        false
    }

    fn status(&self) -> CookiePoolStatus {
        let view = self.snapshot();

        CookiePoolStatus {
            state: view.state.unwrap_or(PoolState::Empty),
            refreshing: self.refreshing.load(Ordering::SeqCst),
            total_cookies: view.credentials.len(),
            valid_cookies: view.credentials.iter().filter(|c| c.is_usable()).count(),
            expired_cookies: view.credentials.iter().filter(|c| c.is_expired()).count(),
            cookies: view
                .credentials
                .iter()
                .enumerate()
                .map(|(i, c)| CookieDetail::from_credential(i, c))
                .collect(),
            last_refresh: view.last_refresh,
            next_refresh: view.next_refresh,
        }
    }

    async fn report_failure(&self, value: Option<String>) -> bool {
        let mut pool = self.inner.lock().await;

        let target = match value {
            Some(value) => value,
            None => match select_best(&pool.credentials) {
                Some(best) => best.value.clone(),
                None => return false,
            },
        };

        let Some(credential) = pool.credentials.iter_mut().find(|c| c.value == target) else {
            return false;
        };

        credential.failure_count += 1;
        credential.is_valid = false;
        warn!(
            "Cookie marked as failed (failure count {})",
            credential.failure_count
        );

        Self::settle_state(&mut pool);
        self.persist(&pool).await;
        self.publish(&pool);
        true
    }
}
