//! Storage doubles that fail on demand, for exercising degraded paths.

use crate::cache::CacheStorage;
use crate::error::{EngineError, EngineResult};
use crate::http::Response;
use outpost_queue::{LogQueueStore, MutationId, QueueError, QueueResult, QueueStore, QueuedMutation};
use outpost_storage::{InMemoryBackend, StorageError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

fn unavailable<T>() -> EngineResult<T> {
    Err(EngineError::Cache("cache storage unavailable".into()))
}

/// Cache storage where every call fails.
pub(crate) struct BrokenCaches;

impl CacheStorage for BrokenCaches {
    fn open(&self, _name: &str) -> EngineResult<()> {
        unavailable()
    }

    fn has(&self, _name: &str) -> EngineResult<bool> {
        unavailable()
    }

    fn match_key(&self, _name: &str, _key: &str) -> EngineResult<Option<Response>> {
        unavailable()
    }

    fn put(&self, _name: &str, _key: &str, _response: &Response) -> EngineResult<()> {
        unavailable()
    }

    fn delete(&self, _name: &str) -> EngineResult<bool> {
        unavailable()
    }

    fn keys(&self) -> EngineResult<Vec<String>> {
        unavailable()
    }

    fn entries(&self, _name: &str) -> EngineResult<Vec<(String, Response)>> {
        unavailable()
    }
}

/// An in-memory queue store whose writes can be switched off.
pub(crate) struct FlakyStore {
    inner: LogQueueStore<InMemoryBackend>,
    fail_add: AtomicBool,
    fail_delete: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: LogQueueStore::open(InMemoryBackend::new()).expect("Failed to open queue store"),
            fail_add: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_fail_add(&self, fail: bool) {
        self.fail_add.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

fn disk_full() -> QueueError {
    QueueError::Storage(StorageError::Io(io::Error::other("disk full")))
}

impl QueueStore for FlakyStore {
    fn add(&self, entry: QueuedMutation) -> QueueResult<()> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(disk_full());
        }
        self.inner.add(entry)
    }

    fn get_all(&self) -> QueueResult<Vec<QueuedMutation>> {
        self.inner.get_all()
    }

    fn get(&self, id: &MutationId) -> QueueResult<Option<QueuedMutation>> {
        self.inner.get(id)
    }

    fn delete(&self, id: &MutationId) -> QueueResult<bool> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(disk_full());
        }
        self.inner.delete(id)
    }

    fn len(&self) -> QueueResult<usize> {
        self.inner.len()
    }
}
