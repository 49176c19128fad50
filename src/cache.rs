use anyhow::Result;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Loader failure shared between every caller waiting on the same load.
#[derive(Debug, Clone)]
pub struct LoadError(Arc<anyhow::Error>);

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for LoadError {}

type SharedLoad<V> = Shared<BoxFuture<'static, std::result::Result<V, LoadError>>>;

struct Entry<V> {
    value: V,
    fresh_until: Instant,
    stale_until: Instant,
    inserted: u64,
}

struct InFlight<V> {
    id: u64,
    load: SharedLoad<V>,
}

struct CacheState<V> {
    entries: HashMap<String, Entry<V>>,
    in_flight: HashMap<String, InFlight<V>>,
}

enum Lookup<V> {
    Fresh(V),
    Stale(V),
    Miss,
}

/// Process-local keyed cache with single-flight loading and
/// stale-while-revalidate refresh.
///
/// Concurrent callers for one key share a single loader run. The entry count
/// is bounded: on overflow, expired entries are purged first and then the
/// oldest-inserted entry is evicted. This is an approximate bound, not LRU.
pub struct CacheStore<V> {
    state: Arc<Mutex<CacheState<V>>>,
    max_entries: usize,
    sequence: Arc<AtomicU64>,
}

impl<V> Clone for CacheStore<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            max_entries: self.max_entries,
            sequence: Arc::clone(&self.sequence),
        }
    }
}

impl<V> fmt::Debug for CacheStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("max_entries", &self.max_entries)
            .field("len", &self.len())
            .finish()
    }
}

impl<V> CacheStore<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            })),
            max_entries: max_entries.max(1),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a load for `key` is currently running.
    pub fn is_loading(&self, key: &str) -> bool {
        lock(&self.state).in_flight.contains_key(key)
    }

    /// Delete every stored and in-flight entry whose key starts with `prefix`.
    ///
    /// A load that was in flight keeps running for the callers already
    /// waiting on it, but its result is not stored.
    pub fn clear_by_prefix(&self, prefix: &str) -> usize {
        let mut state = lock(&self.state);
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(prefix));
        state.in_flight.retain(|key, _| !key.starts_with(prefix));
        let removed = before - state.entries.len();
        debug!("Cleared {} cache entries with prefix '{}'", removed, prefix);
        removed
    }
}

impl<V> CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Return the fresh cached value for `key`, or run `loader` once for all
    /// concurrent callers and cache its result for `ttl`.
    ///
    /// `loader` is called without the store's lock held, so it may use this
    /// store itself.
    pub async fn get_or_set<F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let joined = {
            let mut state = lock(&self.state);
            if let Lookup::Fresh(value) = lookup(&mut state, key) {
                return Ok(value);
            }
            in_flight(&state, key)
        };

        let load = match joined {
            Some(load) => load,
            None => self.start(key, ttl, Duration::ZERO, loader),
        };
        Ok(load.await?)
    }

    /// Like [`get_or_set`](Self::get_or_set), but entries stay servable for
    /// `stale_ttl` past freshness. A stale hit returns the old value at once
    /// and refreshes it in the background; refresh failures are logged and
    /// leave the old value in place.
    pub async fn get_or_set_stale_while_revalidate<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        stale_ttl: Duration,
        loader: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let joined = {
            let mut state = lock(&self.state);
            match lookup(&mut state, key) {
                Lookup::Fresh(value) => return Ok(value),
                Lookup::Stale(value) => {
                    if state.in_flight.contains_key(key) {
                        return Ok(value);
                    }
                    drop(state);

                    debug!("Serving stale value for '{}', refreshing in background", key);
                    let refresh = self.start(key, ttl, stale_ttl, loader);
                    let key = key.to_string();
                    tokio::spawn(async move {
                        if let Err(e) = refresh.await {
                            warn!("Background refresh failed for '{}': {}", key, e);
                        }
                    });
                    return Ok(value);
                }
                Lookup::Miss => in_flight(&state, key),
            }
        };

        let load = match joined {
            Some(load) => load,
            None => self.start(key, ttl, stale_ttl, loader),
        };
        Ok(load.await?)
    }

    /// Register a load for `key`, or join one that another caller registered
    /// while `loader` was being called.
    fn start<F, Fut>(&self, key: &str, ttl: Duration, stale_ttl: Duration, loader: F) -> SharedLoad<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let pending = loader();

        let mut state = lock(&self.state);
        if let Some(load) = in_flight(&state, key) {
            return load;
        }

        debug!("Cache miss for '{}', loading", key);
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        let sequence = Arc::clone(&self.sequence);
        let shared_state = Arc::clone(&self.state);
        let max_entries = self.max_entries;
        let owned_key = key.to_string();

        let load = async move {
            let result = pending.await.map_err(|e| LoadError(Arc::new(e)));

            let mut state = lock(&shared_state);
            // A prefix clear while loading drops this flight; its result is not stored.
            if state.in_flight.get(&owned_key).map(|f| f.id) == Some(id) {
                state.in_flight.remove(&owned_key);
                if let Ok(value) = &result {
                    let fresh_until = Instant::now() + ttl;
                    let entry = Entry {
                        value: value.clone(),
                        fresh_until,
                        stale_until: fresh_until + stale_ttl,
                        inserted: sequence.fetch_add(1, Ordering::Relaxed),
                    };
                    state.entries.insert(owned_key, entry);
                    evict_overflow(&mut state, max_entries);
                }
            }

            result
        }
        .boxed()
        .shared();

        state.in_flight.insert(
            key.to_string(),
            InFlight {
                id,
                load: load.clone(),
            },
        );
        load
    }
}

fn in_flight<V>(state: &CacheState<V>, key: &str) -> Option<SharedLoad<V>> {
    let flight = state.in_flight.get(key)?;
    debug!("Joining in-flight load for '{}'", key);
    Some(flight.load.clone())
}

fn lock<V>(state: &Mutex<CacheState<V>>) -> MutexGuard<'_, CacheState<V>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lookup<V: Clone>(state: &mut CacheState<V>, key: &str) -> Lookup<V> {
    let now = Instant::now();
    let Some(entry) = state.entries.get(key) else {
        return Lookup::Miss;
    };

    if now < entry.fresh_until {
        Lookup::Fresh(entry.value.clone())
    } else if now < entry.stale_until {
        Lookup::Stale(entry.value.clone())
    } else {
        state.entries.remove(key);
        Lookup::Miss
    }
}

fn evict_overflow<V>(state: &mut CacheState<V>, max_entries: usize) {
    if state.entries.len() <= max_entries {
        return;
    }

    let now = Instant::now();
    state.entries.retain(|_, entry| entry.stale_until > now);

    while state.entries.len() > max_entries {
        let oldest = state
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted)
            .map(|(key, _)| key.clone());
        match oldest {
            Some(key) => {
                state.entries.remove(&key);
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_loader(
        calls: &Arc<AtomicUsize>,
        value: u32,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_load() {
        let cache = CacheStore::new(16);
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..8).map(|_| {
            let cache = cache.clone();
            let loader = counting_loader(&calls, 7, Duration::from_millis(50));
            async move { cache.get_or_set("k", Duration::from_secs(60), loader).await }
        });
        let results = futures::future::join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| matches!(r, Ok(7))));
        assert!(!cache.is_loading("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_hit_skips_loader_until_ttl_elapses() {
        let cache = CacheStore::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(10);

        cache
            .get_or_set("k", ttl, counting_loader(&calls, 1, Duration::ZERO))
            .await
            .unwrap();
        let hit = cache
            .get_or_set("k", ttl, counting_loader(&calls, 2, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(hit, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        let reloaded = cache
            .get_or_set("k", ttl, counting_loader(&calls, 2, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(reloaded, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_loader_error_reaches_caller_and_is_not_cached() {
        let cache: CacheStore<u32> = CacheStore::new(16);

        let err = cache
            .get_or_set("k", Duration::from_secs(60), || async {
                Err(anyhow::anyhow!("source unavailable"))
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("source unavailable"));
        assert!(!cache.is_loading("k"));
        assert!(cache.is_empty());

        let value = cache
            .get_or_set("k", Duration::from_secs(60), || async { Ok(3) })
            .await
            .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_value_served_while_single_refresh_runs() {
        let cache = CacheStore::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(10);
        let stale = Duration::from_secs(60);

        let first = cache
            .get_or_set_stale_while_revalidate("k", ttl, stale, counting_loader(&calls, 1, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(first, 1);

        tokio::time::advance(Duration::from_secs(11)).await;

        let callers = (0..5).map(|_| {
            let cache = cache.clone();
            let loader = counting_loader(&calls, 2, Duration::from_secs(1));
            async move {
                cache
                    .get_or_set_stale_while_revalidate("k", ttl, stale, loader)
                    .await
            }
        });
        let results = futures::future::join_all(callers).await;
        assert!(results.iter().all(|r| matches!(r, Ok(1))));

        tokio::time::sleep(Duration::from_secs(2)).await;

        let refreshed = cache
            .get_or_set_stale_while_revalidate("k", ttl, stale, counting_loader(&calls, 3, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(refreshed, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_background_refresh_keeps_stale_value() {
        let cache = CacheStore::new(16);
        let ttl = Duration::from_secs(10);
        let stale = Duration::from_secs(60);

        cache
            .get_or_set_stale_while_revalidate("k", ttl, stale, || async { Ok(1u32) })
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        let served = cache
            .get_or_set_stale_while_revalidate("k", ttl, stale, || async {
                Err(anyhow::anyhow!("refresh failed"))
            })
            .await
            .unwrap();
        assert_eq!(served, 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!cache.is_loading("k"));

        let still_stale = cache
            .get_or_set_stale_while_revalidate("k", ttl, stale, || async {
                Err(anyhow::anyhow!("refresh failed again"))
            })
            .await
            .unwrap();
        assert_eq!(still_stale, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_grace_window() {
        let cache = CacheStore::new(16);
        let ttl = Duration::from_secs(10);
        let stale = Duration::from_secs(20);

        cache
            .get_or_set_stale_while_revalidate("k", ttl, stale, || async { Ok(1u32) })
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        let value = cache
            .get_or_set_stale_while_revalidate("k", ttl, stale, || async { Ok(2u32) })
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_purges_expired_then_oldest() {
        let cache = CacheStore::new(2);
        let short = Duration::from_secs(1);
        let long = Duration::from_secs(600);

        cache.get_or_set("expired", short, || async { Ok(0u32) }).await.unwrap();
        cache.get_or_set("a", long, || async { Ok(1u32) }).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        cache.get_or_set("b", long, || async { Ok(2u32) }).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.get_or_set("c", long, || async { Ok(3u32) }).await.unwrap();
        assert_eq!(cache.len(), 2);

        // "a" was the oldest survivor, so it must reload.
        let reloaded = cache.get_or_set("a", long, || async { Ok(10u32) }).await.unwrap();
        assert_eq!(reloaded, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_order_follows_completion() {
        let cache = CacheStore::new(2);
        let ttl = Duration::from_secs(600);

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_set("slow", ttl, || async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(1u32)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(cache.is_loading("slow"));

        cache.get_or_set("a", ttl, || async { Ok(2u32) }).await.unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), 1);

        cache.get_or_set("b", ttl, || async { Ok(3u32) }).await.unwrap();
        assert_eq!(cache.len(), 2);

        // "slow" started first but was stored after "a".
        let kept = cache.get_or_set("slow", ttl, || async { Ok(10u32) }).await.unwrap();
        assert_eq!(kept, 1);
        let reloaded = cache.get_or_set("a", ttl, || async { Ok(20u32) }).await.unwrap();
        assert_eq!(reloaded, 20);
    }

    #[tokio::test]
    async fn test_loader_may_use_the_store() {
        let cache = CacheStore::new(16);
        let ttl = Duration::from_secs(60);
        cache.get_or_set("other", ttl, || async { Ok(5u32) }).await.unwrap();

        let inner = cache.clone();
        let value = cache
            .get_or_set("k", ttl, move || {
                let seen = inner.len() as u32;
                async move { Ok(seen) }
            })
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_by_prefix() {
        let cache = CacheStore::new(16);
        let ttl = Duration::from_secs(60);

        for key in ["listings:1", "listings:2", "count:1"] {
            cache.get_or_set(key, ttl, || async { Ok(1u32) }).await.unwrap();
        }

        assert_eq!(cache.clear_by_prefix("listings:"), 2);
        assert_eq!(cache.len(), 1);

        let value = cache.get_or_set("listings:1", ttl, || async { Ok(5u32) }).await.unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_load_drops_result() {
        let cache = CacheStore::new(16);
        let ttl = Duration::from_secs(60);

        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_set("listings:x", ttl, || async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok(1u32)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(cache.is_loading("listings:x"));

        cache.clear_by_prefix("listings:");
        assert_eq!(pending.await.unwrap().unwrap(), 1);
        assert!(cache.is_empty());
    }
}
