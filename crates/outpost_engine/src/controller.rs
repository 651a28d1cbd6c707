//! The interception controller.

use crate::cache::{CacheManager, CacheStorage};
use crate::classify::{Classifier, Strategy};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::handlers;
use crate::http::{Request, Response};
use crate::lifecycle::LifecycleState;
use crate::message::{ClientMessage, ClientReply};
use crate::network::Network;
use crate::queue::{DrainReport, MutationQueue};
use crate::trigger::BackgroundSync;
use outpost_queue::QueueStore;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Everything a controller talks to.
///
/// The queue store and the caches are the only state that outlives a
/// controller; the rest are capabilities of the host.
#[derive(Clone)]
pub struct Collaborators {
    /// Outgoing fetch capability.
    pub network: Arc<dyn Network>,
    /// Durable queue of failed mutations.
    pub store: Arc<dyn QueueStore>,
    /// Named response caches.
    pub caches: Arc<dyn CacheStorage>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Recovery trigger, if the host has one.
    pub background_sync: Option<Arc<dyn BackgroundSync>>,
}

impl Collaborators {
    /// Creates collaborators with the system clock and no recovery trigger.
    pub fn new(network: Arc<dyn Network>, store: Arc<dyn QueueStore>, caches: Arc<dyn CacheStorage>) -> Self {
        Self {
            network,
            store,
            caches,
            clock: Arc::new(SystemClock),
            background_sync: None,
        }
    }

    /// Sets the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the recovery trigger.
    pub fn with_background_sync(mut self, sync: Arc<dyn BackgroundSync>) -> Self {
        self.background_sync = Some(sync);
        self
    }
}

/// The process-wide entry point for intercepted requests.
///
/// A controller is cheap to build and keeps nothing across respawns except
/// what it writes to the queue store and the caches. A host that evicts the
/// worker builds a new one with [`Controller::resume`] over the same store and
/// caches, and every pending entry and cached response is still there.
pub struct Controller {
    config: EngineConfig,
    classifier: Classifier,
    network: Arc<dyn Network>,
    caches: CacheManager,
    queue: MutationQueue,
    shell_url: Url,
    state: RwLock<LifecycleState>,
    claimed: AtomicBool,
}

impl Controller {
    /// Creates a controller in [`LifecycleState::Parsed`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the configuration is unusable.
    pub fn new(config: EngineConfig, parts: Collaborators) -> EngineResult<Self> {
        config.validate()?;
        let classifier = Classifier::new(&config)?;
        let shell_url = config.resolve("/")?;
        let caches = CacheManager::new(parts.caches, parts.clock.clone(), &config);
        let queue = MutationQueue::new(
            parts.store,
            parts.network.clone(),
            parts.clock,
            parts.background_sync,
            config.sync_tag.clone(),
        );

        Ok(Self {
            config,
            classifier,
            network: parts.network,
            caches,
            queue,
            shell_url,
            state: RwLock::new(LifecycleState::Parsed),
            claimed: AtomicBool::new(false),
        })
    }

    /// Creates a controller for an already active worker the host respawned.
    ///
    /// It starts in [`LifecycleState::Activated`] and controls clients
    /// immediately; install and activation already ran in an earlier life.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the configuration is unusable.
    pub fn resume(config: EngineConfig, parts: Collaborators) -> EngineResult<Self> {
        let controller = Self::new(config, parts)?;
        *controller.state.write() = LifecycleState::Activated;
        controller.claimed.store(true, Ordering::SeqCst);
        debug!("controller resumed in activated state");
        Ok(controller)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Returns true once open clients have been claimed.
    pub fn has_claimed_clients(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    /// Returns the cache manager.
    pub fn caches(&self) -> &CacheManager {
        &self.caches
    }

    /// Returns the mutation queue manager.
    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    fn set_state(&self, next: LifecycleState) -> EngineResult<()> {
        let mut state = self.state.write();
        let from = *state;
        *state = from.transition(next)?;
        info!(%from, to = %next, "controller lifecycle transition");
        Ok(())
    }

    fn fail(&self, error: EngineError) -> EngineError {
        let mut state = self.state.write();
        if state.can_transition_to(LifecycleState::Redundant) {
            *state = LifecycleState::Redundant;
        }
        warn!(error = %error, "controller is redundant");
        error
    }

    /// Install phase: pre-cache the shell assets, then move straight to
    /// [`LifecycleState::Installed`] without waiting for older instances.
    ///
    /// If any shell asset cannot be fetched successfully the controller
    /// becomes [`LifecycleState::Redundant`].
    ///
    /// # Errors
    ///
    /// Returns an error if called out of order, or if pre-caching fails.
    pub fn install(&self) -> EngineResult<()> {
        self.set_state(LifecycleState::Installing)?;
        self.precache_shell().map_err(|e| self.fail(e))?;
        self.set_state(LifecycleState::Installed)
    }

    fn precache_shell(&self) -> EngineResult<()> {
        self.caches.ensure_caches()?;
        for path in &self.config.shell_assets {
            let url = self.config.resolve(path)?;
            let response = self.network.fetch(&Request::get(url.clone()))?;
            if !response.is_ok() {
                return Err(EngineError::cache(format!(
                    "shell asset {url} answered {}",
                    response.status
                )));
            }
            self.caches.store_static(&url, &response)?;
            debug!(url = %url, "pre-cached shell asset");
        }
        Ok(())
    }

    /// Activate phase: evict caches from other versions and claim all open
    /// clients. Returns the names of the evicted caches.
    ///
    /// # Errors
    ///
    /// Returns an error if called out of order, or if eviction fails, in
    /// which case the controller becomes [`LifecycleState::Redundant`].
    pub fn activate(&self) -> EngineResult<Vec<String>> {
        self.set_state(LifecycleState::Activating)?;
        let evicted = self
            .caches
            .evict_unknown_caches(&self.config.expected_caches())
            .map_err(|e| self.fail(e))?;
        self.claimed.store(true, Ordering::SeqCst);
        self.set_state(LifecycleState::Activated)?;
        Ok(evicted)
    }

    /// Marks the controller as replaced. It stops intercepting.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller never got past [`LifecycleState::Parsed`].
    pub fn retire(&self) -> EngineResult<()> {
        self.set_state(LifecycleState::Redundant)?;
        self.claimed.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Classifies a request without handling it.
    pub fn classify(&self, request: &Request) -> Strategy {
        self.classifier.classify(&request.url, &request.method, request.mode)
    }

    /// Handles one intercepted request.
    ///
    /// Returns `None` when the request is not intercepted and should go to
    /// the network untouched, including every request made before activation.
    pub fn handle_fetch(&self, request: &Request) -> Option<Response> {
        if !self.state().is_controlling() {
            return None;
        }

        let strategy = self.classify(request);
        debug!(method = %request.method, url = %request.url, ?strategy, "dispatch");

        let network = self.network.as_ref();
        let response = match strategy {
            Strategy::ApiMutation => {
                handlers::handle_api_mutation(network, &self.queue, &self.config.queued_message, request)
            }
            Strategy::ApiRead => handlers::handle_api_read(network, &self.caches, request),
            Strategy::StaticAsset => handlers::handle_static(network, &self.caches, request),
            Strategy::Navigation => handlers::handle_navigation(network, &self.caches, &self.shell_url, request),
            Strategy::Passthrough => return None,
        };
        Some(response)
    }

    /// Handles a message from a connected client.
    ///
    /// A `SYNC_MUTATIONS` message drains exactly as the recovery trigger does.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue store cannot be read.
    pub fn handle_message(&self, message: ClientMessage) -> EngineResult<ClientReply> {
        match message {
            ClientMessage::SyncMutations => {
                let report = self.drain()?;
                Ok(ClientReply::Drained {
                    attempted: report.attempted,
                    succeeded: report.succeeded,
                    failed: report.failed,
                })
            }
            ClientMessage::QueueStatus => Ok(ClientReply::QueueStatus {
                pending: self.queue.pending()?,
            }),
        }
    }

    /// Handles a recovery-trigger event. Events with other tags are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue store cannot be read.
    pub fn handle_sync(&self, tag: &str) -> EngineResult<Option<DrainReport>> {
        if tag != self.config.sync_tag {
            debug!(tag = %tag, "ignoring sync event with unknown tag");
            return Ok(None);
        }
        self.drain().map(Some)
    }

    /// Replays the mutation queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue store cannot be read.
    pub fn drain(&self) -> EngineResult<DrainReport> {
        self.queue.drain()
    }
}
