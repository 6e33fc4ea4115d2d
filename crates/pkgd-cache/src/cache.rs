//! §4.F package cache: an LRU list of `pkg_hash -> cached package` entries
//! behind one lock, with a separately-driven sweep that age-evicts on a
//! 24h TTL and then, under memory pressure, evicts the LRU-first quarter
//! of what's left.
//!
//! The `Mutex<LruCache<K, V>>` shape is grounded in
//! `examples/other_examples/91994499_kyoshisuki-sui__crates-sui-package-resolver-src-cache.rs.rs`'s
//! `PackageCache` (`Mutex<LruCache<AccountAddress, Arc<Package>>>`), with
//! `parking_lot::Mutex` substituted for `std::sync::Mutex` to match the
//! teacher's lock-crate convention.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::pressure::MemoryPressureSignal;

/// Entries older than this, measured from their last access, are evicted
/// unconditionally on every sweep.
pub const TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the background sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Large enough that, in practice, eviction is driven by the TTL and
/// memory-pressure sweep rather than by this capacity ever being hit.
const DEFAULT_CAPACITY: usize = 1 << 20;

struct Entry<V> {
    value: Arc<V>,
    last_access: Instant,
}

/// Keyed by package content hash (§4.B `pkg_hash`).
pub struct PackageCache<V> {
    inner: Mutex<LruCache<[u8; 32], Entry<V>>>,
}

impl<V> PackageCache<V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CAPACITY).expect("nonzero"))
    }

    /// Moves `key` to the front and refreshes its `last_access` stamp.
    pub fn get(&self, key: &[u8; 32]) -> Option<Arc<V>> {
        let mut inner = self.inner.lock();
        let entry = inner.get_mut(key)?;
        entry.last_access = Instant::now();
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: [u8; 32], value: Arc<V>) {
        let mut inner = self.inner.lock();
        inner.put(
            key,
            Entry {
                value,
                last_access: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &[u8; 32]) -> Option<Arc<V>> {
        self.inner.lock().pop(key).map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One sweep pass: unconditional TTL eviction, then — only if
    /// `pressure` currently reports true — an additional eviction of the
    /// least-recently-used quarter of whatever remains. Returns
    /// `(ttl_evicted, pressure_evicted)` for observability/tests.
    pub fn sweep_once(&self, pressure: &dyn MemoryPressureSignal, ttl: Duration) -> (usize, usize) {
        let now = Instant::now();
        let stale: Vec<[u8; 32]> = {
            let inner = self.inner.lock();
            inner
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_access) >= ttl)
                .map(|(key, _)| *key)
                .collect()
        };
        let ttl_evicted = stale.len();
        if ttl_evicted > 0 {
            let mut inner = self.inner.lock();
            for key in &stale {
                inner.pop(key);
            }
        }

        let mut pressure_evicted = 0;
        if pressure.under_pressure() {
            let mut inner = self.inner.lock();
            let quarter = inner.len() / 4;
            for _ in 0..quarter {
                if inner.pop_lru().is_none() {
                    break;
                }
                pressure_evicted += 1;
            }
        }

        (ttl_evicted, pressure_evicted)
    }
}

/// Drives `sweep_once` on `SWEEP_INTERVAL`, forever. Meant to be spawned
/// as its own task; cache misses never wait on it (§4.F: "The sweeper's
/// liveness is independent of lookups").
pub async fn run_sweeper<V: Send + Sync + 'static>(
    cache: Arc<PackageCache<V>>,
    pressure: Arc<dyn MemoryPressureSignal>,
) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        let (ttl_evicted, pressure_evicted) = cache.sweep_once(pressure.as_ref(), TTL);
        if ttl_evicted > 0 || pressure_evicted > 0 {
            tracing::debug!(ttl_evicted, pressure_evicted, "package cache sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pressure::NeverUnderPressure;

    struct AlwaysUnderPressure;
    impl MemoryPressureSignal for AlwaysUnderPressure {
        fn under_pressure(&self) -> bool {
            true
        }
    }

    fn key(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn get_after_insert_returns_the_value_and_promotes_it() {
        let cache: PackageCache<String> = PackageCache::unbounded();
        cache.insert(key(1), Arc::new("one".to_string()));
        assert_eq!(cache.get(&key(1)).as_deref().map(String::as_str), Some("one"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sweep_with_zero_ttl_evicts_everything() {
        let cache: PackageCache<String> = PackageCache::unbounded();
        cache.insert(key(1), Arc::new("one".to_string()));
        cache.insert(key(2), Arc::new("two".to_string()));
        let (ttl_evicted, pressure_evicted) =
            cache.sweep_once(&NeverUnderPressure, Duration::from_secs(0));
        assert_eq!(ttl_evicted, 2);
        assert_eq!(pressure_evicted, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn sweep_without_pressure_never_touches_fresh_entries() {
        let cache: PackageCache<String> = PackageCache::unbounded();
        cache.insert(key(1), Arc::new("one".to_string()));
        let (ttl_evicted, pressure_evicted) =
            cache.sweep_once(&NeverUnderPressure, TTL);
        assert_eq!(ttl_evicted, 0);
        assert_eq!(pressure_evicted, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sweep_under_pressure_evicts_the_lru_quarter_of_survivors() {
        let cache: PackageCache<String> = PackageCache::unbounded();
        for i in 0..8u8 {
            cache.insert(key(i), Arc::new(i.to_string()));
        }
        let (ttl_evicted, pressure_evicted) =
            cache.sweep_once(&AlwaysUnderPressure, TTL);
        assert_eq!(ttl_evicted, 0);
        assert_eq!(pressure_evicted, 2);
        assert_eq!(cache.len(), 6);
        // The least-recently-used entries (inserted first) are the ones gone.
        assert!(cache.get(&key(0)).is_none());
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(7)).is_some());
    }
}
