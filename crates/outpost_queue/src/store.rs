//! The durable queue store.

use crate::error::{QueueError, QueueResult};
use crate::mutation::{MutationId, QueuedMutation};
use crate::record::{scan_log, QueueRecord};
use outpost_storage::StorageBackend;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// A keyed store of queued mutations.
///
/// Every method is one atomic unit: it either fully happens (and is durable
/// when it returns) or has no effect.
pub trait QueueStore: Send + Sync {
    /// Adds a new entry.
    ///
    /// # Errors
    ///
    /// Fails with [`QueueError::DuplicateKey`] if the id is already queued,
    /// or [`QueueError::InvalidEntry`] for GET or an empty verb.
    fn add(&self, entry: QueuedMutation) -> QueueResult<()>;

    /// Returns every queued entry, in the order the entries were added.
    fn get_all(&self) -> QueueResult<Vec<QueuedMutation>>;

    /// Returns one entry by id.
    fn get(&self, id: &MutationId) -> QueueResult<Option<QueuedMutation>>;

    /// Removes an entry. Returns false if it was not queued.
    fn delete(&self, id: &MutationId) -> QueueResult<bool>;

    /// Returns the number of queued entries.
    fn len(&self) -> QueueResult<usize>;

    /// Returns true if nothing is queued.
    fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl<S: QueueStore + ?Sized> QueueStore for Arc<S> {
    fn add(&self, entry: QueuedMutation) -> QueueResult<()> {
        (**self).add(entry)
    }

    fn get_all(&self) -> QueueResult<Vec<QueuedMutation>> {
        (**self).get_all()
    }

    fn get(&self, id: &MutationId) -> QueueResult<Option<QueuedMutation>> {
        (**self).get(id)
    }

    fn delete(&self, id: &MutationId) -> QueueResult<bool> {
        (**self).delete(id)
    }

    fn len(&self) -> QueueResult<usize> {
        (**self).len()
    }
}

/// Options for opening a [`LogQueueStore`].
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// `sync` the backend after every record instead of only flushing.
    pub sync_on_write: bool,
    /// Schema version the caller expects.
    pub schema_version: u32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            schema_version: SCHEMA_VERSION,
        }
    }
}

impl QueueOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether every record is synced to disk.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the expected schema version.
    #[must_use]
    pub const fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }
}

/// Handed to the upgrade hook when the stored schema is older than expected.
///
/// `from == 0` means the store did not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaUpgrade {
    /// Version found in the log (0 for a new store).
    pub from: u32,
    /// Version being installed.
    pub to: u32,
}

/// Counters describing the log behind a [`LogQueueStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogStats {
    /// Total records in the log.
    pub records: u64,
    /// Add records in the log.
    pub added: u64,
    /// Remove records in the log.
    pub removed: u64,
    /// Entries currently queued.
    pub live: u64,
    /// Log size in bytes.
    pub bytes: u64,
    /// Schema version in effect.
    pub schema_version: u32,
    /// Bytes of interrupted writes cut off when the store was opened.
    pub recovered_tail_bytes: u64,
}

/// Live entries in log append order.
#[derive(Default)]
struct QueueIndex {
    by_seq: BTreeMap<u64, QueuedMutation>,
    seq_of: HashMap<MutationId, u64>,
    next_seq: u64,
}

impl QueueIndex {
    /// Returns false, and changes nothing, if the id is already present.
    fn insert(&mut self, entry: QueuedMutation) -> bool {
        if self.seq_of.contains_key(&entry.id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.seq_of.insert(entry.id.clone(), seq);
        self.by_seq.insert(seq, entry);
        true
    }

    fn remove(&mut self, id: &MutationId) -> Option<QueuedMutation> {
        let seq = self.seq_of.remove(id)?;
        self.by_seq.remove(&seq)
    }

    fn get(&self, id: &MutationId) -> Option<&QueuedMutation> {
        self.seq_of.get(id).and_then(|seq| self.by_seq.get(seq))
    }

    fn contains(&self, id: &MutationId) -> bool {
        self.seq_of.contains_key(id)
    }

    fn len(&self) -> usize {
        self.by_seq.len()
    }

    fn iter(&self) -> impl Iterator<Item = &QueuedMutation> {
        self.by_seq.values()
    }
}

struct Inner<B> {
    backend: B,
    entries: QueueIndex,
    stats: LogStats,
}

/// A [`QueueStore`] persisted as an append-only record log.
///
/// Opening replays the log; afterwards reads are served from an in-memory
/// index and each write appends exactly one record. Dropping the store and
/// opening it again over the same backend yields the same entries.
pub struct LogQueueStore<B: StorageBackend> {
    inner: Mutex<Inner<B>>,
    sync_on_write: bool,
}

impl<B: StorageBackend> LogQueueStore<B> {
    /// Opens (or creates) a store with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupted or was written by a newer schema.
    pub fn open(backend: B) -> QueueResult<Self> {
        Self::open_with_upgrade(backend, QueueOptions::default(), |_| Ok(()))
    }

    /// Opens a store, running `upgrade` if the log is missing or older than
    /// `options.schema_version`.
    ///
    /// The new schema version is recorded only after `upgrade` succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupted, was written by a newer
    /// schema, or the upgrade hook fails.
    pub fn open_with_upgrade<F>(mut backend: B, options: QueueOptions, upgrade: F) -> QueueResult<Self>
    where
        F: FnOnce(SchemaUpgrade) -> QueueResult<()>,
    {
        let scan = scan_log(&backend)?;

        let mut recovered_tail_bytes = 0;
        if scan.torn_bytes() > 0 {
            warn!(
                torn_bytes = scan.torn_bytes(),
                offset = scan.valid_end,
                "dropping interrupted write at end of queue log"
            );
            recovered_tail_bytes = scan.torn_bytes();
            backend.truncate(scan.valid_end)?;
        }

        let mut entries = QueueIndex::default();
        let mut stats = LogStats {
            recovered_tail_bytes,
            ..LogStats::default()
        };
        let mut stored_version = None;

        for (offset, record) in scan.records {
            stats.records += 1;
            match record {
                QueueRecord::Schema { version } => stored_version = Some(version),
                QueueRecord::Add(entry) => {
                    if stored_version.is_none() {
                        return Err(QueueError::corrupted(offset, "entry before schema record"));
                    }
                    stats.added += 1;
                    if !entries.insert(entry) {
                        return Err(QueueError::corrupted(offset, "mutation id queued twice"));
                    }
                }
                QueueRecord::Remove { id } => {
                    stats.removed += 1;
                    if entries.remove(&id).is_none() {
                        debug!(%id, offset, "remove record for an id that is not queued");
                    }
                }
            }
        }

        let mut store = Self {
            inner: Mutex::new(Inner {
                backend,
                entries,
                stats,
            }),
            sync_on_write: options.sync_on_write,
        };

        let from = stored_version.unwrap_or(0);
        let to = options.schema_version;
        if from > to {
            return Err(QueueError::SchemaTooNew {
                stored: from,
                supported: to,
            });
        }
        if from < to {
            upgrade(SchemaUpgrade { from, to })?;
            store.append_locked(&QueueRecord::Schema { version: to })?;
            if from == 0 {
                debug!(version = to, "created mutation queue");
            } else {
                info!(from, to, "upgraded mutation queue schema");
            }
        }

        let inner = store.inner.get_mut();
        inner.stats.schema_version = to;
        inner.stats.live = inner.entries.len() as u64;
        inner.stats.bytes = inner.backend.size()?;

        Ok(store)
    }

    /// Returns counters describing the log.
    pub fn stats(&self) -> LogStats {
        self.inner.lock().stats.clone()
    }

    /// Re-reads the whole log and checks it against the in-memory index.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Corrupted`] if the log has damage or no longer
    /// replays to the entries currently served.
    pub fn verify(&self) -> QueueResult<LogStats> {
        let inner = self.inner.lock();
        let scan = scan_log(&inner.backend)?;
        if scan.torn_bytes() > 0 {
            return Err(QueueError::corrupted(scan.valid_end, "incomplete record at end of log"));
        }

        let mut live = QueueIndex::default();
        for (_, record) in scan.records {
            match record {
                QueueRecord::Schema { .. } => {}
                QueueRecord::Add(entry) => {
                    live.insert(entry);
                }
                QueueRecord::Remove { id } => {
                    live.remove(&id);
                }
            }
        }

        if !live.iter().eq(inner.entries.iter()) {
            return Err(QueueError::corrupted(scan.valid_end, "log does not match queued entries"));
        }
        Ok(inner.stats.clone())
    }

    /// Consumes the store and returns its backend.
    pub fn into_backend(self) -> B {
        self.inner.into_inner().backend
    }

    fn append_locked(&mut self, record: &QueueRecord) -> QueueResult<()> {
        let sync = self.sync_on_write;
        let inner = self.inner.get_mut();
        append_record(inner, record, sync)
    }
}

fn append_record<B: StorageBackend>(inner: &mut Inner<B>, record: &QueueRecord, sync: bool) -> QueueResult<()> {
    let frame = record.encode()?;
    let offset = inner.backend.append(&frame)?;

    let durable = if sync {
        inner.backend.flush().and_then(|()| inner.backend.sync())
    } else {
        inner.backend.flush()
    };

    if let Err(e) = durable {
        // Leave no half-committed record behind.
        if let Err(cut) = inner.backend.truncate(offset) {
            warn!(error = %cut, offset, "failed to roll back queue record");
        }
        return Err(e.into());
    }

    inner.stats.records += 1;
    inner.stats.bytes = offset + frame.len() as u64;
    Ok(())
}

impl<B: StorageBackend> QueueStore for LogQueueStore<B> {
    fn add(&self, entry: QueuedMutation) -> QueueResult<()> {
        if !entry.is_replayable_method() {
            return Err(QueueError::InvalidEntry(format!(
                "{} requests are not queued",
                if entry.method.is_empty() { "empty-method" } else { entry.method.as_str() }
            )));
        }

        let mut inner = self.inner.lock();
        if inner.entries.contains(&entry.id) {
            return Err(QueueError::DuplicateKey(entry.id));
        }

        let record = QueueRecord::Add(entry);
        append_record(&mut inner, &record, self.sync_on_write)?;

        if let QueueRecord::Add(entry) = record {
            debug!(id = %entry.id, method = %entry.method, url = %entry.url, "queued mutation");
            inner.entries.insert(entry);
        }
        inner.stats.added += 1;
        inner.stats.live = inner.entries.len() as u64;
        Ok(())
    }

    fn get_all(&self) -> QueueResult<Vec<QueuedMutation>> {
        Ok(self.inner.lock().entries.iter().cloned().collect())
    }

    fn get(&self, id: &MutationId) -> QueueResult<Option<QueuedMutation>> {
        Ok(self.inner.lock().entries.get(id).cloned())
    }

    fn delete(&self, id: &MutationId) -> QueueResult<bool> {
        let mut inner = self.inner.lock();
        if !inner.entries.contains(id) {
            return Ok(false);
        }

        append_record(&mut inner, &QueueRecord::Remove { id: id.clone() }, self.sync_on_write)?;
        inner.entries.remove(id);
        inner.stats.removed += 1;
        inner.stats.live = inner.entries.len() as u64;
        debug!(%id, "removed mutation from queue");
        Ok(true)
    }

    fn len(&self) -> QueueResult<usize> {
        Ok(self.inner.lock().entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::replay_order;
    use crate::record::QueueRecord;
    use chrono::{TimeZone, Utc};
    use outpost_storage::{FileBackend, InMemoryBackend};
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn entry(method: &str, path: &str, millis: i64) -> QueuedMutation {
        QueuedMutation::capture(
            method,
            format!("https://app.test{path}"),
            BTreeMap::new(),
            format!(r#"{{"at":{millis}}}"#),
            Utc.timestamp_millis_opt(millis).unwrap(),
        )
    }

    #[test]
    fn open_creates_schema_record() {
        let log = InMemoryBackend::new();
        let store = LogQueueStore::open(log.clone()).unwrap();

        let stats = store.stats();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.schema_version, SCHEMA_VERSION);
        assert!(store.is_empty().unwrap());
        assert!(!log.data().is_empty());
    }

    #[test]
    fn add_get_delete() {
        let store = LogQueueStore::open(InMemoryBackend::new()).unwrap();
        let e = entry("POST", "/api/players", 1);

        store.add(e.clone()).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get(&e.id).unwrap(), Some(e.clone()));

        assert!(store.delete(&e.id).unwrap());
        assert!(!store.delete(&e.id).unwrap());
        assert!(store.get(&e.id).unwrap().is_none());
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let store = LogQueueStore::open(InMemoryBackend::new()).unwrap();
        let e = entry("PUT", "/api/players/1", 1);

        store.add(e.clone()).unwrap();
        assert!(matches!(store.add(e), Err(QueueError::DuplicateKey(_))));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn add_rejects_reads() {
        let store = LogQueueStore::open(InMemoryBackend::new()).unwrap();
        let result = store.add(entry("GET", "/api/players", 1));
        assert!(matches!(result, Err(QueueError::InvalidEntry(_))));
    }

    #[test]
    fn add_accepts_head_and_options() {
        let store = LogQueueStore::open(InMemoryBackend::new()).unwrap();
        store.add(entry("HEAD", "/api/players", 1)).unwrap();
        store.add(entry("OPTIONS", "/api/players", 2)).unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn same_tick_entries_keep_append_order() {
        let log = InMemoryBackend::new();
        let created = entry("POST", "/api/players", 5);
        let renamed = entry("PATCH", "/api/players/1", 5);
        let removed = entry("DELETE", "/api/players/1", 5);
        {
            let store = LogQueueStore::open(log.clone()).unwrap();
            for e in [&created, &renamed, &removed] {
                store.add(e.clone()).unwrap();
            }
        }

        let store = LogQueueStore::open(log).unwrap();
        let mut all = store.get_all().unwrap();
        replay_order(&mut all);
        assert_eq!(all, vec![created, renamed, removed]);
        assert!(store.verify().is_ok());
    }

    #[test]
    fn entries_survive_reopen() {
        let log = InMemoryBackend::new();
        let kept = entry("POST", "/api/matches", 10);
        let replayed = entry("DELETE", "/api/matches/4", 20);

        {
            let store = LogQueueStore::open(log.clone()).unwrap();
            store.add(kept.clone()).unwrap();
            store.add(replayed.clone()).unwrap();
            store.delete(&replayed.id).unwrap();
        }

        let store = LogQueueStore::open(log).unwrap();
        assert_eq!(store.get_all().unwrap(), vec![kept]);

        let stats = store.stats();
        assert_eq!(stats.added, 2);
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.live, 1);
        assert_eq!(stats.records, 4);
    }

    #[test]
    fn reopen_drops_torn_write() {
        let log = InMemoryBackend::new();
        let kept = entry("POST", "/api/matches", 10);
        {
            let store = LogQueueStore::open(log.clone()).unwrap();
            store.add(kept.clone()).unwrap();
        }

        // Simulate the worker dying halfway through the next append.
        let frame = QueueRecord::Add(entry("POST", "/api/lost", 11)).encode().unwrap();
        let mut writer = log.clone();
        writer.append(&frame[..20]).unwrap();

        let store = LogQueueStore::open(log.clone()).unwrap();
        assert_eq!(store.get_all().unwrap(), vec![kept]);
        assert_eq!(store.stats().recovered_tail_bytes, 20);

        // The tail is gone, so the next record lands on a clean boundary.
        store.add(entry("PATCH", "/api/matches/1", 12)).unwrap();
        drop(store);
        assert_eq!(LogQueueStore::open(log).unwrap().len().unwrap(), 2);
    }

    #[test]
    fn upgrade_hook_runs_for_new_and_old_stores() {
        let log = InMemoryBackend::new();
        let mut seen = Vec::new();

        LogQueueStore::open_with_upgrade(log.clone(), QueueOptions::new(), |u| {
            seen.push(u);
            Ok(())
        })
        .unwrap();

        LogQueueStore::open_with_upgrade(log.clone(), QueueOptions::new().schema_version(2), |u| {
            seen.push(u);
            Ok(())
        })
        .unwrap();

        // Already at version 2: no hook.
        let store = LogQueueStore::open_with_upgrade(log, QueueOptions::new().schema_version(2), |u| {
            seen.push(u);
            Ok(())
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![SchemaUpgrade { from: 0, to: 1 }, SchemaUpgrade { from: 1, to: 2 }]
        );
        assert_eq!(store.stats().schema_version, 2);
    }

    #[test]
    fn failed_upgrade_records_nothing() {
        let log = InMemoryBackend::new();
        let result = LogQueueStore::open_with_upgrade(log.clone(), QueueOptions::new(), |_| {
            Err(QueueError::InvalidEntry("refused".into()))
        });
        assert!(result.is_err());
        assert!(log.data().is_empty());
    }

    #[test]
    fn newer_schema_is_rejected() {
        let log = InMemoryBackend::new();
        LogQueueStore::open_with_upgrade(log.clone(), QueueOptions::new().schema_version(5), |_| Ok(()))
            .unwrap();

        assert!(matches!(
            LogQueueStore::open(log),
            Err(QueueError::SchemaTooNew {
                stored: 5,
                supported: SCHEMA_VERSION
            })
        ));
    }

    #[test]
    fn entry_without_schema_is_corruption() {
        let mut log = InMemoryBackend::new();
        log.append(&QueueRecord::Add(entry("POST", "/api/x", 1)).encode().unwrap())
            .unwrap();

        assert!(matches!(
            LogQueueStore::open(log),
            Err(QueueError::Corrupted { offset: 0, .. })
        ));
    }

    #[test]
    fn file_store_persists_across_processes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.log");
        let e = entry("POST", "/api/ratings", 42);

        {
            let store = LogQueueStore::open(FileBackend::open(&path).unwrap()).unwrap();
            store.add(e.clone()).unwrap();
        }

        let store = LogQueueStore::open(FileBackend::open(&path).unwrap()).unwrap();
        let all = store.get_all().unwrap();
        assert_eq!(all, vec![e]);
        assert_eq!(all[0].body, r#"{"at":42}"#);
    }

    #[test]
    fn verify_detects_external_damage() {
        let log = InMemoryBackend::new();
        let store = LogQueueStore::open(log.clone()).unwrap();
        store.add(entry("POST", "/api/a", 1)).unwrap();
        store.add(entry("POST", "/api/b", 2)).unwrap();
        assert_eq!(store.verify().unwrap().live, 2);

        // Flip a payload byte of the first entry record.
        log.poke(40, log.data()[40] ^ 0xFF);
        assert!(matches!(store.verify(), Err(QueueError::Corrupted { .. })));
    }

    #[test]
    fn shared_through_arc() {
        let store: Arc<dyn QueueStore> = Arc::new(LogQueueStore::open(InMemoryBackend::new()).unwrap());
        store.add(entry("POST", "/api/a", 1)).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    proptest! {
        #[test]
        fn crash_at_any_byte_recovers_a_prefix(count in 1usize..6, cut_seed in any::<u64>()) {
            let log = InMemoryBackend::new();
            let store = LogQueueStore::open(log.clone()).unwrap();
            let mut added = Vec::new();
            let mut ends = Vec::new();
            for i in 0..count {
                let queued = entry("POST", &format!("/api/{i}"), i as i64);
                store.add(queued.clone()).unwrap();
                added.push(queued);
                ends.push(log.size().unwrap());
            }
            drop(store);

            let full = log.data();
            let cut = (cut_seed % (full.len() as u64 + 1)) as usize;
            let reopened = LogQueueStore::open(InMemoryBackend::with_data(full[..cut].to_vec())).unwrap();

            let survivors = ends.iter().filter(|&&end| end <= cut as u64).count();
            let mut recovered = reopened.get_all().unwrap();
            replay_order(&mut recovered);
            prop_assert_eq!(recovered, added[..survivors].to_vec());
        }
    }
}
