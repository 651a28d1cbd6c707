//! Integration tests for the controller against an in-process server.

use chrono::{Duration, TimeZone, Utc};
use outpost_engine::{
    ClientMessage, ClientReply, Collaborators, Controller, EngineConfig, EngineError, EngineResult,
    LifecycleState, ManualClock, MemoryCacheStorage, Network, Request, Response,
};
use outpost_queue::LogQueueStore;
use outpost_storage::InMemoryBackend;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A tiny players API: `GET /api/players` lists, `POST /api/players` adds.
/// Names must be unique; a duplicate is answered with 409.
struct PlayersServer {
    online: AtomicBool,
    players: Mutex<Vec<String>>,
}

impl PlayersServer {
    fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            players: Mutex::new(Vec::new()),
        }
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn players(&self) -> Vec<String> {
        self.players.lock().clone()
    }
}

impl Network for PlayersServer {
    fn fetch(&self, request: &Request) -> EngineResult<Response> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(EngineError::network("no route to host"));
        }

        match (request.method.as_str(), request.url.path()) {
            ("GET", "/" | "/index.html") => Ok(Response::ok("<html>app</html>")),
            ("GET", "/api/players") => {
                let body = serde_json::to_string(&*self.players.lock()).unwrap();
                Ok(Response::ok(body).with_header("content-type", "application/json"))
            }
            ("POST", "/api/players") => {
                let name = request.body_text();
                let mut players = self.players.lock();
                if players.contains(&name) {
                    return Ok(Response::new(409, "duplicate"));
                }
                players.push(name);
                Ok(Response::new(201, "{}"))
            }
            _ => Ok(Response::new(404, "")),
        }
    }
}

struct Host {
    server: Arc<PlayersServer>,
    log: InMemoryBackend,
    caches: MemoryCacheStorage,
    clock: Arc<ManualClock>,
}

impl Host {
    fn new() -> Self {
        Self {
            server: Arc::new(PlayersServer::new()),
            log: InMemoryBackend::new(),
            caches: MemoryCacheStorage::new(),
            clock: Arc::new(ManualClock::new(
                Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            )),
        }
    }

    fn parts(&self) -> Collaborators {
        let store = Arc::new(LogQueueStore::open(self.log.clone()).unwrap());
        Collaborators::new(self.server.clone(), store, Arc::new(self.caches.clone()))
            .with_clock(self.clock.clone())
    }

    fn tick(&self) {
        self.clock.advance(Duration::seconds(1));
    }

    fn install(&self) -> Controller {
        let controller = Controller::new(config(), self.parts()).unwrap();
        controller.install().unwrap();
        controller.activate().unwrap();
        controller
    }

    fn respawn(&self) -> Controller {
        Controller::resume(config(), self.parts()).unwrap()
    }
}

fn config() -> EngineConfig {
    EngineConfig::for_origin("https://app.test").unwrap()
}

fn add_player(name: &str) -> Request {
    Request::parse("POST", "https://app.test/api/players")
        .unwrap()
        .with_body(name.to_string())
}

#[test]
fn offline_writes_replay_after_respawn() {
    let host = Host::new();
    let controller = host.install();
    assert_eq!(controller.state(), LifecycleState::Activated);

    host.server.set_online(false);
    for name in ["ana", "bo", "cy"] {
        assert_eq!(controller.handle_fetch(&add_player(name)).unwrap().status, 202);
        host.tick();
    }
    drop(controller);

    // Host evicts the worker, connectivity returns, a fresh instance drains.
    host.server.set_online(true);
    let controller = host.respawn();
    let reply = controller.handle_message(ClientMessage::SyncMutations).unwrap();

    assert_eq!(
        reply,
        ClientReply::Drained {
            attempted: 3,
            succeeded: 3,
            failed: 0
        }
    );
    assert_eq!(host.server.players(), vec!["ana", "bo", "cy"]);
}

#[test]
fn rejected_replay_stays_queued_until_cleared() {
    let host = Host::new();
    let controller = host.install();

    // "bo" already exists on the server, so its replay will be rejected.
    assert_eq!(controller.handle_fetch(&add_player("bo")).unwrap().status, 201);

    host.server.set_online(false);
    controller.handle_fetch(&add_player("ana")).unwrap();
    host.tick();
    controller.handle_fetch(&add_player("bo")).unwrap();
    host.server.set_online(true);

    let report = controller.drain().unwrap();
    assert_eq!((report.succeeded, report.failed, report.remaining), (1, 1, 1));

    // Every later drain retries it again.
    let report = host.respawn().drain().unwrap();
    assert_eq!((report.attempted, report.failed), (1, 1));
}

#[test]
fn reads_survive_respawn_through_the_cache() {
    let host = Host::new();
    let controller = host.install();
    controller.handle_fetch(&add_player("ana")).unwrap();

    let list = Request::get("https://app.test/api/players".parse().unwrap());
    let live = controller.handle_fetch(&list).unwrap();
    assert_eq!(live.text(), r#"["ana"]"#);
    drop(controller);

    host.server.set_online(false);
    let controller = host.respawn();
    let cached = controller.handle_fetch(&list).unwrap();
    assert_eq!(cached.body, live.body);

    let nav = Request::navigate("https://app.test/players".parse().unwrap());
    assert_eq!(controller.handle_fetch(&nav).unwrap().text(), "<html>app</html>");
}
