//! In-process кэш с TTL и LRU-вытеснением.
//!
//! Истёкшие записи считаются отсутствующими и удаляются лениво (при `get`)
//! или явно через [`ExpiringLruCache::sweep_expired`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    /// `None` = не истекает
    expires_at_ms: Option<u64>,
    last_access_ms: u64,
    /// порядок обращений при равных миллисекундах
    last_access_seq: u64,
}

impl<T> Entry<T> {
    fn expired(&self, now: u64) -> bool {
        matches!(self.expires_at_ms, Some(at) if now > at)
    }
}

#[derive(Debug)]
struct Store<T> {
    map: HashMap<String, Entry<T>>,
    seq: u64,
}

impl<T> Store<T> {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .map
            .iter()
            .min_by_key(|(_, e)| (e.last_access_ms, e.last_access_seq))
            .map(|(k, _)| k.clone());

        if let Some(k) = oldest {
            self.map.remove(&k);
        }
    }
}

pub struct ExpiringLruCache<T> {
    default_ttl: Duration,
    max_size: usize,
    store: Mutex<Store<T>>,
    clock: Arc<dyn Clock>,
}

impl<T> fmt::Debug for ExpiringLruCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringLruCache")
            .field("default_ttl", &self.default_ttl)
            .field("max_size", &self.max_size)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: Clone> ExpiringLruCache<T> {
    pub fn new(cfg: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            default_ttl: Duration::from_millis(cfg.default_ttl_ms),
            max_size: cfg.max_size,
            store: Mutex::new(Store {
                map: HashMap::new(),
                seq: 0,
            }),
            clock,
        })
    }

    /// Значение по ключу; обновляет время последнего обращения.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now_ms();
        let mut store = self.lock();

        let expired = store.map.get(key)?.expired(now);
        if expired {
            store.map.remove(key);
            return None;
        }

        let seq = store.next_seq();
        let entry = store.map.get_mut(key)?;
        entry.last_access_ms = now;
        entry.last_access_seq = seq;
        Some(entry.value.clone())
    }

    /// `ttl`: `None` - TTL по умолчанию, `Some(Duration::ZERO)` - без срока.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Option<Duration>) {
        let key = key.into();
        let now = self.clock.now_ms();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut store = self.lock();

        if !store.map.contains_key(&key) && store.map.len() >= self.max_size {
            store.evict_lru();
        }

        let seq = store.next_seq();
        store.map.insert(
            key,
            Entry {
                value,
                expires_at_ms: expires_at(now, ttl),
                last_access_ms: now,
                last_access_seq: seq,
            },
        );
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Вернуть закэшированное значение или вычислить через `supplier`.
    ///
    /// Блокировка на время вычисления не держится: одновременные промахи
    /// по одному ключу вызовут `supplier` каждый.
    pub fn get_or_compute(&self, key: &str, supplier: impl FnOnce() -> T, ttl: Option<Duration>) -> T {
        if let Some(v) = self.get(key) {
            return v;
        }
        let v = supplier();
        self.set(key, v.clone(), ttl);
        v
    }

    /// Как [`get_or_compute`](Self::get_or_compute), но ошибки не кэшируются.
    pub fn get_or_try_compute<E>(
        &self,
        key: &str,
        supplier: impl FnOnce() -> Result<T, E>,
        ttl: Option<Duration>,
    ) -> Result<T, E> {
        if let Some(v) = self.get(key) {
            return Ok(v);
        }
        let v = supplier()?;
        self.set(key, v.clone(), ttl);
        Ok(v)
    }
}

impl<T> ExpiringLruCache<T> {
    pub fn delete(&self, key: &str) -> bool {
        self.lock().map.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().map.clear();
    }

    /// Количество записей, включая ещё не вычищенные истёкшие
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Удалить все истёкшие записи, вернуть их количество
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut store = self.lock();
        let before = store.map.len();
        store.map.retain(|_, e| !e.expired(now));
        before - store.map.len()
    }

    fn lock(&self) -> MutexGuard<'_, Store<T>> {
        match self.store.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// Срок за пределами u64 = запись не истекает
fn expires_at(now: u64, ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        return None;
    }
    let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    now.checked_add(ms)
}

/// Ключ кэша из частей через `:`, отсутствующие части пропускаются.
///
/// `cache_key([Some("codes"), None, Some("sh")]) == "codes:sh"`
pub fn cache_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = Option<S>>,
    S: ToString,
{
    parts
        .into_iter()
        .flatten()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache(ttl_ms: u64, max: usize) -> (Arc<ManualClock>, ExpiringLruCache<String>) {
        let clock = Arc::new(ManualClock::new());
        let cfg = CacheConfig {
            default_ttl_ms: ttl_ms,
            max_size: max,
        };
        let c = ExpiringLruCache::new(&cfg, clock.clone()).unwrap();
        (clock, c)
    }

    #[test]
    fn set_and_get() {
        let (_clock, c) = cache(0, 10);
        c.set("key1", "value1".into(), None);
        assert_eq!(c.get("key1").as_deref(), Some("value1"));
        assert_eq!(c.get("missing"), None);
    }

    #[test]
    fn entry_expires_after_ttl() {
        let (clock, c) = cache(0, 10);
        c.set("k", "v".into(), Some(Duration::from_millis(1000)));

        clock.advance_ms(1000);
        assert!(c.has("k"));

        clock.advance_ms(1);
        assert_eq!(c.get("k"), None);
        // удалена лениво
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn per_key_ttl_overrides_default() {
        let (clock, c) = cache(5000, 10);
        c.set("short", "1".into(), Some(Duration::from_millis(1000)));
        c.set("default", "2".into(), None);
        c.set("forever", "3".into(), Some(Duration::ZERO));

        clock.advance_ms(1001);
        assert_eq!(c.get("short"), None);
        assert_eq!(c.get("default").as_deref(), Some("2"));

        clock.advance_ms(1_000_000);
        assert_eq!(c.get("default"), None);
        assert_eq!(c.get("forever").as_deref(), Some("3"));
    }

    #[test]
    fn evicts_least_recently_accessed() {
        let (clock, c) = cache(0, 3);
        c.set("key1", "v1".into(), None);
        clock.advance_ms(10);
        c.set("key2", "v2".into(), None);
        clock.advance_ms(10);
        c.set("key3", "v3".into(), None);
        clock.advance_ms(10);

        c.get("key1");
        clock.advance_ms(10);

        c.set("key4", "v4".into(), None);

        assert_eq!(c.len(), 3);
        assert!(c.has("key1"));
        assert!(!c.has("key2"));
        assert!(c.has("key3"));
        assert!(c.has("key4"));
    }

    #[test]
    fn eviction_order_without_time_passing() {
        // все обращения в одну миллисекунду: решает порядок обращений
        let (_clock, c) = cache(0, 2);
        c.set("a", "1".into(), None);
        c.set("b", "2".into(), None);
        c.get("a");
        c.set("c", "3".into(), None);

        assert!(c.has("a"));
        assert!(!c.has("b"));
        assert!(c.has("c"));
    }

    #[test]
    fn overwrite_existing_key_does_not_evict() {
        let (_clock, c) = cache(0, 2);
        c.set("a", "1".into(), None);
        c.set("b", "2".into(), None);
        c.set("a", "11".into(), None);

        assert_eq!(c.len(), 2);
        assert_eq!(c.get("a").as_deref(), Some("11"));
        assert!(c.has("b"));
    }

    #[test]
    fn sweep_removes_only_expired() {
        let (clock, c) = cache(1000, 10);
        c.set("a", "1".into(), None);
        c.set("b", "2".into(), None);
        c.set("c", "3".into(), Some(Duration::ZERO));

        clock.advance_ms(1001);
        assert_eq!(c.sweep_expired(), 2);
        assert_eq!(c.len(), 1);
        assert_eq!(c.sweep_expired(), 0);
    }

    #[test]
    fn delete_and_clear() {
        let (_clock, c) = cache(0, 10);
        c.set("a", "1".into(), None);
        c.set("b", "2".into(), None);

        assert!(c.delete("a"));
        assert!(!c.delete("a"));

        c.clear();
        assert!(c.is_empty());
    }

    #[test]
    fn get_or_compute_calls_supplier_once_per_miss() {
        let (clock, c) = cache(0, 10);
        let mut calls = 0;

        let v = c.get_or_compute("k", || {
            calls += 1;
            "computed".to_string()
        }, Some(Duration::from_millis(100)));
        assert_eq!(v, "computed");

        let v = c.get_or_compute("k", || {
            calls += 1;
            "again".to_string()
        }, None);
        assert_eq!(v, "computed");
        assert_eq!(calls, 1);

        clock.advance_ms(101);
        let v = c.get_or_compute("k", || {
            calls += 1;
            "fresh".to_string()
        }, None);
        assert_eq!(v, "fresh");
        assert_eq!(calls, 2);
    }

    #[test]
    fn get_or_try_compute_does_not_cache_errors() {
        let (_clock, c) = cache(0, 10);

        let r: Result<String, &str> = c.get_or_try_compute("k", || Err("boom"), None);
        assert_eq!(r, Err("boom"));
        assert!(!c.has("k"));

        let r: Result<String, &str> = c.get_or_try_compute("k", || Ok("ok".into()), None);
        assert_eq!(r.as_deref(), Ok("ok"));
        assert!(c.has("k"));
    }

    #[test]
    fn huge_ttl_never_expires() {
        let (clock, c) = cache(u64::MAX, 10);
        clock.advance_ms(10);
        c.set("k", "v".into(), None);
        c.set("k2", "v2".into(), Some(Duration::MAX));

        clock.advance_ms(u64::MAX / 2);
        assert_eq!(c.get("k").as_deref(), Some("v"));
        assert_eq!(c.get("k2").as_deref(), Some("v2"));
        assert_eq!(c.sweep_expired(), 0);
    }

    #[test]
    fn cache_key_skips_missing_parts() {
        assert_eq!(cache_key([Some("codes"), None, Some("sh")]), "codes:sh");
        assert_eq!(cache_key([Some(1), Some(2)]), "1:2");
        assert_eq!(cache_key::<_, &str>([None, None]), "");
    }
}
