//! Test fixtures and engine helpers.
//!
//! [`TestEngine`] wires an activated controller to a scripted network, a
//! manual clock and a recording background-sync host, over either shared
//! in-memory storage or a temporary data directory. [`TestEngine::respawn`]
//! throws the controller away and builds a fresh one over the same storage,
//! which is what the host does between any two events.

use chrono::{DateTime, Duration, TimeZone, Utc};
use outpost_engine::{
    Collaborators, Controller, DataDir, EngineConfig, ManualClock, MemoryCacheStorage, Method, MockNetwork,
    RecordingBackgroundSync, Request, Response,
};
use outpost_queue::{LogQueueStore, QueueOptions, QueueStore, QueuedMutation};
use outpost_storage::InMemoryBackend;
use std::sync::Arc;
use tempfile::TempDir;

/// Origin every fixture controls.
pub const ORIGIN: &str = "https://app.test";

/// Body served for the app shell.
pub const SHELL_HTML: &str = "<!doctype html><title>app</title>";

/// Epoch millis the fixture clock starts at.
pub const START_MILLIS: i64 = 1_700_000_000_000;

/// Returns the fixture clock's starting time.
pub fn start_time() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(START_MILLIS)
        .single()
        .expect("Start time out of range")
}

/// Resolves `path` against [`ORIGIN`].
pub fn url(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

/// A request with an explicit method and body.
pub fn request(method: &str, path: &str, body: &str) -> Request {
    Request::parse(method, &url(path))
        .expect("Invalid test request")
        .with_body(body.to_string())
}

/// A GET request.
pub fn get(path: &str) -> Request {
    request("GET", path, "")
}

/// A POST request with a JSON body.
pub fn post(path: &str, body: &str) -> Request {
    request("POST", path, body).with_header("content-type", "application/json")
}

/// A top-level navigation.
pub fn navigate(path: &str) -> Request {
    let url = url(path).parse().expect("Invalid test URL");
    Request::navigate(url)
}

enum Backing {
    Memory {
        log: InMemoryBackend,
        caches: MemoryCacheStorage,
    },
    File {
        data: DataDir,
        _temp_dir: TempDir,
    },
}

/// An activated controller with scripted collaborators.
pub struct TestEngine {
    /// Configuration every (re)spawned controller uses.
    pub config: EngineConfig,
    /// Scripted network.
    pub network: Arc<MockNetwork>,
    /// Clock shared by cache stamps and queue timestamps.
    pub clock: Arc<ManualClock>,
    /// Host recovery-trigger recorder.
    pub background_sync: Arc<RecordingBackgroundSync>,
    controller: Controller,
    backing: Backing,
}

impl TestEngine {
    /// Creates an engine over shared in-memory storage.
    pub fn memory() -> Self {
        Self::memory_with(default_config())
    }

    /// Creates an engine over in-memory storage with a custom configuration.
    pub fn memory_with(config: EngineConfig) -> Self {
        let backing = Backing::Memory {
            log: InMemoryBackend::new(),
            caches: MemoryCacheStorage::new(),
        };
        Self::build(config, backing)
    }

    /// Creates an engine over a temporary data directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let data = DataDir::open(temp_dir.path(), true).expect("Failed to open data directory");
        let backing = Backing::File {
            data,
            _temp_dir: temp_dir,
        };
        Self::build(default_config(), backing)
    }

    fn build(config: EngineConfig, backing: Backing) -> Self {
        let network = Arc::new(MockNetwork::new());
        for asset in &config.shell_assets {
            let target = config.resolve(asset).expect("Invalid shell asset");
            network.respond(Method::Get, target.as_str(), Response::ok(SHELL_HTML));
        }

        let clock = Arc::new(ManualClock::new(start_time()));
        let background_sync = Arc::new(RecordingBackgroundSync::new());

        let parts = collaborators(&backing, &network, &clock, &background_sync);
        let controller = Controller::new(config.clone(), parts).expect("Failed to build controller");
        controller.install().expect("Install failed");
        controller.activate().expect("Activate failed");
        network.clear_calls();

        Self {
            config,
            network,
            clock,
            background_sync,
            controller,
            backing,
        }
    }

    /// Returns the live controller.
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Drops the controller and resumes a new one over the same storage.
    pub fn respawn(&mut self) {
        let parts = collaborators(&self.backing, &self.network, &self.clock, &self.background_sync);
        self.controller =
            Controller::resume(self.config.clone(), parts).expect("Failed to resume controller");
    }

    /// Dispatches a request that the controller must intercept.
    pub fn fetch(&self, request: &Request) -> Response {
        self.controller
            .handle_fetch(request)
            .expect("Request was not intercepted")
    }

    /// Cuts the network.
    pub fn go_offline(&self) {
        self.network.set_online(false);
    }

    /// Restores the network.
    pub fn go_online(&self) {
        self.network.set_online(true);
    }

    /// Moves the fixture clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Returns the durable store behind the controller.
    pub fn store(&self) -> Arc<dyn QueueStore> {
        self.controller.queue().store().clone()
    }

    /// Returns the queued mutations in replay order.
    pub fn queued(&self) -> Vec<QueuedMutation> {
        self.controller.queue().entries().expect("Failed to read queue")
    }

    /// Returns the names of the caches that exist.
    pub fn cache_names(&self) -> Vec<String> {
        self.controller
            .caches()
            .storage()
            .keys()
            .expect("Failed to list caches")
    }
}

/// Default fixture configuration for [`ORIGIN`].
pub fn default_config() -> EngineConfig {
    EngineConfig::for_origin(ORIGIN).expect("Invalid fixture origin")
}

fn collaborators(
    backing: &Backing,
    network: &Arc<MockNetwork>,
    clock: &Arc<ManualClock>,
    background_sync: &Arc<RecordingBackgroundSync>,
) -> Collaborators {
    let parts = match backing {
        Backing::Memory { log, caches } => {
            let store = LogQueueStore::open(log.clone()).expect("Failed to open queue store");
            Collaborators::new(network.clone(), Arc::new(store), Arc::new(caches.clone()))
        }
        Backing::File { data, .. } => {
            let store = data
                .open_store(QueueOptions::default())
                .expect("Failed to open queue store");
            let caches = data.open_caches().expect("Failed to open caches");
            Collaborators::new(network.clone(), Arc::new(store), Arc::new(caches))
        }
    };
    parts
        .with_clock(clock.clone())
        .with_background_sync(background_sync.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_is_activated_with_shell_cached() {
        let engine = TestEngine::memory();
        assert!(engine.controller().state().is_controlling());
        assert_eq!(engine.cache_names(), vec!["api-v1", "static-v1"]);
        assert_eq!(engine.network.call_count(), 0);
    }

    #[test]
    fn respawn_keeps_the_queue() {
        for mut engine in [TestEngine::memory(), TestEngine::file()] {
            engine.go_offline();
            assert_eq!(engine.fetch(&post("/api/notes", "{}")).status, 202);
            engine.respawn();
            assert_eq!(engine.queued().len(), 1);
        }
    }
}
