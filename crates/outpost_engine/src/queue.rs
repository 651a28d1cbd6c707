//! Mutation queue manager: enqueue on failure, replay on recovery.

use crate::clock::Clock;
use crate::error::EngineResult;
use crate::http::{Headers, Request};
use crate::network::Network;
use crate::trigger::BackgroundSync;
use outpost_queue::{replay_order, QueueStore, QueuedMutation};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Entries replayed.
    pub attempted: usize,
    /// Entries the server accepted; these were removed.
    pub succeeded: usize,
    /// Entries rejected or unreachable; these stay queued.
    pub failed: usize,
    /// Entries still queued when the drain finished.
    pub remaining: usize,
}

/// Enqueues failed mutations and replays them.
///
/// Holds no state of its own between calls: everything it knows is read back
/// from the store, so a freshly built manager picks up where a dead one left
/// off.
pub struct MutationQueue {
    store: Arc<dyn QueueStore>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    background_sync: Option<Arc<dyn BackgroundSync>>,
    sync_tag: String,
    // One drain at a time within this process.
    draining: Mutex<()>,
}

impl MutationQueue {
    /// Creates a manager over `store`.
    pub fn new(
        store: Arc<dyn QueueStore>,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
        background_sync: Option<Arc<dyn BackgroundSync>>,
        sync_tag: impl Into<String>,
    ) -> Self {
        Self {
            store,
            network,
            clock,
            background_sync,
            sync_tag: sync_tag.into(),
            draining: Mutex::new(()),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Snapshots `request` and commits it to the store.
    ///
    /// After a successful commit the recovery trigger is registered; a
    /// missing or failing trigger is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be committed.
    pub fn enqueue(&self, request: &Request) -> EngineResult<QueuedMutation> {
        let entry = snapshot(request, self.clock.as_ref());
        self.store.add(entry.clone())?;
        info!(id = %entry.id, method = %entry.method, url = %entry.url, "queued mutation for replay");

        match &self.background_sync {
            Some(sync) => {
                if let Err(e) = sync.register(&self.sync_tag) {
                    warn!(error = %e, tag = %self.sync_tag, "could not register background sync");
                }
            }
            None => debug!("no background sync; entry waits for an explicit drain"),
        }

        Ok(entry)
    }

    /// Returns the number of queued entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn pending(&self) -> EngineResult<usize> {
        Ok(self.store.len()?)
    }

    /// Returns queued entries in replay order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn entries(&self) -> EngineResult<Vec<QueuedMutation>> {
        let mut entries = self.store.get_all()?;
        replay_order(&mut entries);
        Ok(entries)
    }

    /// Replays every queued entry, oldest first, one at a time.
    ///
    /// A 2xx response removes the entry. Any other response, or a network
    /// failure, leaves it for the next drain. The loop never stops early.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store cannot be read.
    pub fn drain(&self) -> EngineResult<DrainReport> {
        let _draining = self.draining.lock();

        let entries = self.entries()?;
        if entries.is_empty() {
            debug!("mutation queue empty; nothing to replay");
            return Ok(DrainReport::default());
        }

        let mut report = DrainReport::default();
        for entry in &entries {
            report.attempted += 1;
            if self.replay(entry) {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }

        report.remaining = self.store.len()?;
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            remaining = report.remaining,
            "mutation replay finished"
        );
        Ok(report)
    }

    /// Replays one entry. Returns true if it was accepted and removed.
    fn replay(&self, entry: &QueuedMutation) -> bool {
        let request = match replay_request(entry) {
            Ok(request) => request,
            Err(e) => {
                warn!(id = %entry.id, error = %e, "queued mutation cannot be rebuilt");
                return false;
            }
        };

        match self.network.fetch(&request) {
            Ok(response) if response.is_ok() => match self.store.delete(&entry.id) {
                Ok(_) => {
                    debug!(id = %entry.id, status = response.status, "replayed mutation");
                    true
                }
                Err(e) => {
                    // Still queued, so it will be sent again next drain.
                    error!(id = %entry.id, error = %e, "replayed mutation could not be removed");
                    false
                }
            },
            Ok(response) => {
                warn!(id = %entry.id, status = response.status, "server rejected replayed mutation");
                false
            }
            Err(e) => {
                warn!(id = %entry.id, error = %e, "replay failed; still offline");
                false
            }
        }
    }
}

/// Captures everything needed to re-issue `request` later.
pub fn snapshot(request: &Request, clock: &dyn Clock) -> QueuedMutation {
    QueuedMutation::capture(
        request.method.as_str(),
        request.url.as_str(),
        request.headers.to_map(),
        request.body_text(),
        clock.now(),
    )
}

/// Rebuilds the request a queued entry was captured from.
///
/// # Errors
///
/// Returns an error if the stored method or URL no longer parses.
pub fn replay_request(entry: &QueuedMutation) -> EngineResult<Request> {
    let headers: Headers = entry.headers.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    let mut request = Request::parse(&entry.method, &entry.url)?.with_body(entry.body.clone());
    request.headers = headers;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::faults::FlakyStore;
    use crate::http::{Method, Response};
    use crate::network::MockNetwork;
    use crate::trigger::RecordingBackgroundSync;
    use chrono::{Duration, TimeZone, Utc};
    use outpost_queue::LogQueueStore;
    use outpost_storage::InMemoryBackend;

    struct Fixture {
        queue: MutationQueue,
        network: Arc<MockNetwork>,
        clock: Arc<ManualClock>,
        sync: Arc<RecordingBackgroundSync>,
        store: Arc<LogQueueStore<InMemoryBackend>>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(LogQueueStore::open(InMemoryBackend::new()).unwrap());
        let network = Arc::new(MockNetwork::new());
        let clock = Arc::new(ManualClock::new(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()));
        let sync = Arc::new(RecordingBackgroundSync::new());
        let trigger: Arc<dyn BackgroundSync> = sync.clone();
        let queue = MutationQueue::new(store.clone(), network.clone(), clock.clone(), Some(trigger), "sync-mutations");
        Fixture {
            queue,
            network,
            clock,
            sync,
            store,
        }
    }

    fn post(path: &str, body: &str) -> Request {
        Request::parse("POST", &format!("https://app.test{path}"))
            .unwrap()
            .with_header("Content-Type", "application/json")
            .with_body(body.to_string())
    }

    #[test]
    fn enqueue_snapshots_and_registers() {
        let f = fixture();
        let entry = f.queue.enqueue(&post("/api/players", r#"{"name":"Ana"}"#)).unwrap();

        assert_eq!(entry.method, "POST");
        assert_eq!(entry.url, "https://app.test/api/players");
        assert_eq!(entry.body, r#"{"name":"Ana"}"#);
        assert_eq!(entry.headers.get("content-type").map(String::as_str), Some("application/json"));
        assert_eq!(f.store.get_all().unwrap(), vec![entry]);
        assert_eq!(f.sync.pending(), vec!["sync-mutations"]);
    }

    #[test]
    fn enqueue_tolerates_trigger_failure() {
        let f = fixture();
        f.sync.set_failing(true);
        f.queue.enqueue(&post("/api/players", "{}")).unwrap();
        assert_eq!(f.queue.pending().unwrap(), 1);
    }

    #[test]
    fn drain_empty_is_a_no_op() {
        let f = fixture();
        assert_eq!(f.queue.drain().unwrap(), DrainReport::default());
        assert_eq!(f.network.call_count(), 0);
    }

    #[test]
    fn drain_replays_oldest_first_and_removes() {
        let f = fixture();
        for path in ["/api/a", "/api/b", "/api/c"] {
            f.queue.enqueue(&post(path, "{}")).unwrap();
            f.clock.advance(Duration::seconds(1));
        }
        for path in ["/api/a", "/api/b", "/api/c"] {
            f.network
                .respond(Method::Post, &format!("https://app.test{path}"), Response::new(201, "{}"));
        }

        let report = f.queue.drain().unwrap();
        assert_eq!(
            report,
            DrainReport {
                attempted: 3,
                succeeded: 3,
                failed: 0,
                remaining: 0
            }
        );
        let paths: Vec<_> = f.network.calls().iter().map(|r| r.url.path().to_string()).collect();
        assert_eq!(paths, vec!["/api/a", "/api/b", "/api/c"]);
    }

    #[test]
    fn drain_keeps_rejected_and_unreachable_entries() {
        let f = fixture();
        for path in ["/api/a", "/api/b", "/api/c"] {
            f.queue.enqueue(&post(path, "{}")).unwrap();
            f.clock.advance(Duration::seconds(1));
        }
        f.network.respond(Method::Post, "https://app.test/api/a", Response::ok("{}"));
        f.network.respond(Method::Post, "https://app.test/api/b", Response::new(409, "conflict"));
        f.network.fail(Method::Post, "https://app.test/api/c");

        let report = f.queue.drain().unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.remaining, 2);

        let left: Vec<_> = f.queue.entries().unwrap().into_iter().map(|e| e.url).collect();
        assert_eq!(left, vec!["https://app.test/api/b", "https://app.test/api/c"]);
    }

    #[test]
    fn replayed_request_matches_capture() {
        let f = fixture();
        let original = post("/api/ratings", r#"{"score":5}"#).with_header("X-Client", "web");
        let entry = f.queue.enqueue(&original).unwrap();

        let rebuilt = replay_request(&entry).unwrap();
        assert_eq!(rebuilt.method, original.method);
        assert_eq!(rebuilt.url, original.url);
        assert_eq!(rebuilt.headers, original.headers);
        assert_eq!(rebuilt.body, original.body);
    }

    #[test]
    fn accepted_entry_stays_queued_when_removal_fails() {
        let f = fixture();
        let store = Arc::new(FlakyStore::new());
        let queue = MutationQueue::new(store.clone(), f.network.clone(), f.clock.clone(), None, "sync-mutations");
        queue.enqueue(&post("/api/players", "{}")).unwrap();
        f.network.respond(Method::Post, "https://app.test/api/players", Response::new(201, "{}"));

        store.set_fail_delete(true);
        let report = queue.drain().unwrap();
        assert_eq!(
            report,
            DrainReport {
                attempted: 1,
                succeeded: 0,
                failed: 1,
                remaining: 1
            }
        );

        store.set_fail_delete(false);
        let report = queue.drain().unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(f.network.call_count(), 2);
    }
}
