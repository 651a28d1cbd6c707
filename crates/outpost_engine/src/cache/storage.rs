//! Named cache storage trait and in-memory implementation.

use crate::error::EngineResult;
use crate::http::Response;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named key-value stores of responses.
///
/// Each operation is atomic on its own. Reading a cache that does not exist
/// behaves like reading an empty one; writing to it creates it.
pub trait CacheStorage: Send + Sync {
    /// Creates the named cache if it does not exist.
    fn open(&self, name: &str) -> EngineResult<()>;

    /// Returns true if the named cache exists.
    fn has(&self, name: &str) -> EngineResult<bool>;

    /// Looks up one entry.
    fn match_key(&self, name: &str, key: &str) -> EngineResult<Option<Response>>;

    /// Stores an entry, replacing any previous response for `key`.
    fn put(&self, name: &str, key: &str, response: &Response) -> EngineResult<()>;

    /// Deletes a whole cache. Returns false if it did not exist.
    fn delete(&self, name: &str) -> EngineResult<bool>;

    /// Returns the names of all caches, sorted.
    fn keys(&self) -> EngineResult<Vec<String>>;

    /// Returns every `(key, response)` in the named cache, sorted by key.
    fn entries(&self, name: &str) -> EngineResult<Vec<(String, Response)>>;
}

impl<S: CacheStorage + ?Sized> CacheStorage for Arc<S> {
    fn open(&self, name: &str) -> EngineResult<()> {
        (**self).open(name)
    }

    fn has(&self, name: &str) -> EngineResult<bool> {
        (**self).has(name)
    }

    fn match_key(&self, name: &str, key: &str) -> EngineResult<Option<Response>> {
        (**self).match_key(name, key)
    }

    fn put(&self, name: &str, key: &str, response: &Response) -> EngineResult<()> {
        (**self).put(name, key, response)
    }

    fn delete(&self, name: &str) -> EngineResult<bool> {
        (**self).delete(name)
    }

    fn keys(&self) -> EngineResult<Vec<String>> {
        (**self).keys()
    }

    fn entries(&self, name: &str) -> EngineResult<Vec<(String, Response)>> {
        (**self).entries(name)
    }
}

type Caches = BTreeMap<String, BTreeMap<String, Response>>;

/// In-memory cache storage.
///
/// Clones share the same caches, so a test can drop a controller and build a
/// new one over what the old one stored.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    caches: Arc<RwLock<Caches>>,
}

impl MemoryCacheStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn open(&self, name: &str) -> EngineResult<()> {
        self.caches.write().entry(name.to_string()).or_default();
        Ok(())
    }

    fn has(&self, name: &str) -> EngineResult<bool> {
        Ok(self.caches.read().contains_key(name))
    }

    fn match_key(&self, name: &str, key: &str) -> EngineResult<Option<Response>> {
        Ok(self
            .caches
            .read()
            .get(name)
            .and_then(|cache| cache.get(key))
            .cloned())
    }

    fn put(&self, name: &str, key: &str, response: &Response) -> EngineResult<()> {
        self.caches
            .write()
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), response.clone());
        Ok(())
    }

    fn delete(&self, name: &str) -> EngineResult<bool> {
        Ok(self.caches.write().remove(name).is_some())
    }

    fn keys(&self) -> EngineResult<Vec<String>> {
        Ok(self.caches.read().keys().cloned().collect())
    }

    fn entries(&self, name: &str) -> EngineResult<Vec<(String, Response)>> {
        Ok(self
            .caches
            .read()
            .get(name)
            .map(|cache| cache.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_put_and_match() {
        let storage = MemoryCacheStorage::new();
        assert!(!storage.has("static-v1").unwrap());
        assert!(storage.match_key("static-v1", "k").unwrap().is_none());

        storage.put("static-v1", "k", &Response::ok("one")).unwrap();
        assert!(storage.has("static-v1").unwrap());
        assert_eq!(storage.match_key("static-v1", "k").unwrap().unwrap().text(), "one");

        storage.put("static-v1", "k", &Response::ok("two")).unwrap();
        assert_eq!(storage.entries("static-v1").unwrap().len(), 1);
        assert_eq!(storage.match_key("static-v1", "k").unwrap().unwrap().text(), "two");
    }

    #[test]
    fn memory_open_delete_keys() {
        let storage = MemoryCacheStorage::new();
        storage.open("b").unwrap();
        storage.open("a").unwrap();
        storage.open("a").unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["a", "b"]);

        assert!(storage.delete("a").unwrap());
        assert!(!storage.delete("a").unwrap());
        assert_eq!(storage.keys().unwrap(), vec!["b"]);
    }

    #[test]
    fn memory_clones_share_caches() {
        let storage = MemoryCacheStorage::new();
        let respawned = storage.clone();
        storage.put("api-v1", "k", &Response::ok("x")).unwrap();
        assert!(respawned.match_key("api-v1", "k").unwrap().is_some());
    }
}
