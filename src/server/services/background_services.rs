use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::database::DynCacheService;
use crate::server::services::cookie_pool_services::DynCookiePoolService;

/// warms the pool, then checks it every `every` and refreshes it when it asks for it. errors
/// inside one round are logged and the loop keeps going until shutdown flips
pub fn spawn_refresh_loop(
    pool: DynCookiePoolService,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // runs here and not before serving so a slow first derivation doesn't hold up the port
        tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            _ = pool.initialize() => {}
        }

        info!("Cookie refresh loop started (every {:?})", every);
        // interval panics on a zero period
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires straight away and initialize just ran
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("Cookie refresh loop stopping");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if !pool.should_refresh() {
                debug!("Cookie pool healthy, skipping refresh");
                continue;
            }

            info!("Cookie pool needs refresh, refreshing...");
            // a batch can take minutes, shutdown drops it mid-flight
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("Cookie refresh loop stopping, abandoning refresh");
                    return;
                }
                generated = pool.refresh() => {
                    if generated == 0 {
                        error!("Scheduled cookie refresh produced nothing");
                    }
                }
            }
        }
    })
}

/// periodically drops expired entries out of the file tier
pub fn spawn_sweep_loop(
    cache: DynCacheService,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Cache sweep loop started (every {:?})", every);
        // interval panics on a zero period
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("Cache sweep loop stopping");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let cleared = cache.clear_expired().await;
            debug!("Cache sweep removed {} entries", cleared);
        }
    })
}
