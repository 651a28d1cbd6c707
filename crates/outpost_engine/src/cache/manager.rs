//! Cache policy on top of [`CacheStorage`].

use super::storage::CacheStorage;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::http::{Response, CACHED_AT_HEADER};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// A cached API response and how old it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiHit {
    /// The stored response, including its `sw-cached-at` header.
    pub response: Response,
    /// Milliseconds since it was cached. `u64::MAX` if the stamp is unreadable.
    pub age_ms: u64,
}

/// Cache key for a URL: the full URL without its fragment.
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// Maintains the static and API caches.
///
/// Static entries are cache-first and never expire. API entries are a single
/// slot per URL, stamped on write and judged fresh by age at read time.
/// Staleness never deletes anything.
pub struct CacheManager {
    storage: Arc<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
    static_cache: String,
    api_cache: String,
    max_api_age: Duration,
}

impl CacheManager {
    /// Creates a manager for the caches named in `config`.
    pub fn new(storage: Arc<dyn CacheStorage>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            storage,
            clock,
            static_cache: config.static_cache_name(),
            api_cache: config.api_cache_name(),
            max_api_age: config.max_api_age(),
        }
    }

    /// Returns the underlying storage.
    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    /// Creates both caches if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage fails.
    pub fn ensure_caches(&self) -> EngineResult<()> {
        self.storage.open(&self.static_cache)?;
        self.storage.open(&self.api_cache)
    }

    /// Exact-match lookup in the static cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage fails.
    pub fn lookup_static(&self, url: &Url) -> EngineResult<Option<Response>> {
        self.storage.match_key(&self.static_cache, &cache_key(url))
    }

    /// Stores a copy of `response` in the static cache if it is a success.
    ///
    /// Returns true if it was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage fails.
    pub fn store_static(&self, url: &Url, response: &Response) -> EngineResult<bool> {
        if !response.is_ok() {
            debug!(url = %url, status = response.status, "not caching unsuccessful static response");
            return Ok(false);
        }
        self.storage.put(&self.static_cache, &cache_key(url), response)?;
        Ok(true)
    }

    /// Looks up the API cache entry for `url` and computes its age.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage fails.
    pub fn lookup_api(&self, url: &Url) -> EngineResult<Option<ApiHit>> {
        let Some(response) = self.storage.match_key(&self.api_cache, &cache_key(url))? else {
            return Ok(None);
        };

        let now = self.clock.now().timestamp_millis();
        let age_ms = match response
            .headers
            .get(CACHED_AT_HEADER)
            .and_then(|v| v.trim().parse::<i64>().ok())
        {
            Some(cached_at) => u64::try_from(now.saturating_sub(cached_at)).unwrap_or(0),
            None => {
                warn!(url = %url, "cached API response has no readable {CACHED_AT_HEADER} header");
                u64::MAX
            }
        };

        Ok(Some(ApiHit { response, age_ms }))
    }

    /// Stamps the current time into a copy of `response` and makes it the
    /// only API entry for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage fails.
    pub fn store_api(&self, url: &Url, response: &Response) -> EngineResult<()> {
        let now = self.clock.now().timestamp_millis();
        let stamped = response.clone().with_header(CACHED_AT_HEADER, now.to_string());
        self.storage.put(&self.api_cache, &cache_key(url), &stamped)
    }

    /// Returns true if `hit` may stand in for a failed network read.
    pub fn is_fresh(&self, hit: &ApiHit) -> bool {
        u128::from(hit.age_ms) < self.max_api_age.as_millis()
    }

    /// Deletes every cache whose name is not in `expected`.
    ///
    /// Returns the deleted names.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage fails; caches deleted before the
    /// failure stay deleted.
    pub fn evict_unknown_caches(&self, expected: &[String]) -> EngineResult<Vec<String>> {
        let mut evicted = Vec::new();
        for name in self.storage.keys()? {
            if expected.contains(&name) {
                continue;
            }
            if self.storage.delete(&name)? {
                info!(cache = %name, "evicted stale cache");
                evicted.push(name);
            }
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn setup() -> (CacheManager, Arc<ManualClock>, MemoryCacheStorage) {
        let storage = MemoryCacheStorage::new();
        let clock = Arc::new(ManualClock::new(Utc.timestamp_millis_opt(1_000_000).unwrap()));
        let config = EngineConfig::for_origin("https://app.test").unwrap();
        let manager = CacheManager::new(Arc::new(storage.clone()), clock.clone(), &config);
        (manager, clock, storage)
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn static_stores_only_success() {
        let (manager, _, _) = setup();
        let js = url("https://app.test/app.js");

        assert!(!manager.store_static(&js, &Response::new(404, "nope")).unwrap());
        assert!(manager.lookup_static(&js).unwrap().is_none());

        assert!(manager.store_static(&js, &Response::ok("code")).unwrap());
        assert_eq!(manager.lookup_static(&js).unwrap().unwrap().text(), "code");
    }

    #[test]
    fn static_key_ignores_fragment() {
        let (manager, _, _) = setup();
        manager
            .store_static(&url("https://app.test/app.css#x"), &Response::ok("css"))
            .unwrap();
        assert!(manager.lookup_static(&url("https://app.test/app.css")).unwrap().is_some());
        // The query is part of the key.
        assert!(manager.lookup_static(&url("https://app.test/app.css?v=2")).unwrap().is_none());
    }

    #[test]
    fn api_entries_are_stamped_and_aged() {
        let (manager, clock, _) = setup();
        let players = url("https://app.test/api/players");

        manager.store_api(&players, &Response::ok("[1]")).unwrap();
        clock.advance(chrono::Duration::milliseconds(1_500));

        let hit = manager.lookup_api(&players).unwrap().unwrap();
        assert_eq!(hit.age_ms, 1_500);
        assert_eq!(hit.response.headers.get(CACHED_AT_HEADER), Some("1000000"));
        assert_eq!(hit.response.text(), "[1]");
        assert!(manager.is_fresh(&hit));
    }

    #[test]
    fn api_freshness_boundary() {
        let (manager, clock, _) = setup();
        let players = url("https://app.test/api/players");
        manager.store_api(&players, &Response::ok("[]")).unwrap();

        clock.advance(chrono::Duration::milliseconds(3_600_000 - 1));
        assert!(manager.is_fresh(&manager.lookup_api(&players).unwrap().unwrap()));

        clock.advance(chrono::Duration::milliseconds(1));
        let hit = manager.lookup_api(&players).unwrap().unwrap();
        assert_eq!(hit.age_ms, 3_600_000);
        assert!(!manager.is_fresh(&hit));
    }

    #[test]
    fn api_slot_is_overwritten() {
        let (manager, _, storage) = setup();
        let players = url("https://app.test/api/players");
        manager.store_api(&players, &Response::ok("old")).unwrap();
        manager.store_api(&players, &Response::ok("new")).unwrap();

        assert_eq!(storage.entries("api-v1").unwrap().len(), 1);
        assert_eq!(manager.lookup_api(&players).unwrap().unwrap().response.text(), "new");
    }

    #[test]
    fn unstamped_api_entry_is_stale() {
        let (manager, _, storage) = setup();
        let players = url("https://app.test/api/players");
        storage
            .put("api-v1", &cache_key(&players), &Response::ok("[]"))
            .unwrap();

        let hit = manager.lookup_api(&players).unwrap().unwrap();
        assert_eq!(hit.age_ms, u64::MAX);
        assert!(!manager.is_fresh(&hit));
    }

    #[test]
    fn evicts_only_unknown_caches() {
        let (manager, _, storage) = setup();
        for name in ["static-v1", "api-v1", "static-v0"] {
            storage.open(name).unwrap();
        }

        let expected = vec!["static-v1".to_string(), "api-v1".to_string()];
        assert_eq!(manager.evict_unknown_caches(&expected).unwrap(), vec!["static-v0"]);
        assert_eq!(storage.keys().unwrap(), vec!["api-v1", "static-v1"]);
    }
}
