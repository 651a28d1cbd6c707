//! # Outpost Engine
//!
//! Offline-first interception for a single web origin.
//!
//! Every outgoing request from the controlled scope goes through a
//! [`Controller`], which classifies it and picks a handler:
//!
//! | Strategy | Handling |
//! |---|---|
//! | [`Strategy::ApiMutation`] | send; if the network is gone, queue and answer 202 |
//! | [`Strategy::ApiRead`] | network-first; fall back to a cached copy younger than an hour |
//! | [`Strategy::StaticAsset`] | cache-first |
//! | [`Strategy::Navigation`] | network-first; fall back to the last shell that loaded |
//! | [`Strategy::Passthrough`] | not intercepted |
//!
//! Queued mutations are replayed oldest first, one at a time, when the host
//! fires the recovery trigger or a client posts `{"type":"SYNC_MUTATIONS"}`.
//! An entry leaves the queue only after the server accepted it with a 2xx.
//!
//! ## Key Invariants
//!
//! - The controller can be dropped and rebuilt between any two calls; the
//!   queue store and the caches are the only state it relies on
//! - A cached API read is used only while younger than the freshness limit
//! - Replay is at-least-once; nothing is removed before a confirmed success
//! - Nothing here is fatal to the host: handlers always produce a response
//!
//! ## Example
//!
//! ```rust
//! use outpost_engine::{
//!     Collaborators, Controller, EngineConfig, MemoryCacheStorage, Method, MockNetwork,
//!     Request, Response,
//! };
//! use outpost_queue::LogQueueStore;
//! use outpost_storage::InMemoryBackend;
//! use std::sync::Arc;
//!
//! let network = Arc::new(MockNetwork::new());
//! network.respond(Method::Get, "https://app.test/", Response::ok("<html></html>"));
//! network.respond(Method::Get, "https://app.test/index.html", Response::ok("<html></html>"));
//!
//! let store = Arc::new(LogQueueStore::open(InMemoryBackend::new()).unwrap());
//! let parts = Collaborators::new(network.clone(), store, Arc::new(MemoryCacheStorage::new()));
//! let controller = Controller::new(EngineConfig::for_origin("https://app.test").unwrap(), parts).unwrap();
//! controller.install().unwrap();
//! controller.activate().unwrap();
//!
//! network.set_online(false);
//! let post = Request::parse("POST", "https://app.test/api/players").unwrap().with_body("{}");
//! assert_eq!(controller.handle_fetch(&post).unwrap().status, 202);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod classify;
mod clock;
mod config;
mod controller;
mod dir;
mod error;
#[cfg(test)]
mod faults;
mod handlers;
mod http;
mod lifecycle;
mod message;
mod network;
mod queue;
mod trigger;

pub use cache::{cache_key, entry_file_name, ApiHit, CacheManager, CacheStorage, DirCacheStorage, MemoryCacheStorage};
pub use classify::{Classifier, Strategy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, DEFAULT_API_PREFIX, DEFAULT_CACHE_VERSION, DEFAULT_MAX_API_AGE, DEFAULT_SYNC_TAG};
pub use controller::{Collaborators, Controller};
pub use dir::DataDir;
pub use error::{EngineError, EngineResult};
pub use handlers::{handle_api_mutation, handle_api_read, handle_navigation, handle_static};
pub use http::{Headers, Method, Request, RequestMode, Response, CACHED_AT_HEADER};
pub use lifecycle::LifecycleState;
pub use message::{ClientMessage, ClientReply};
pub use network::{MockNetwork, Network};
pub use queue::{replay_request, snapshot, DrainReport, MutationQueue};
pub use trigger::{BackgroundSync, RecordingBackgroundSync};
