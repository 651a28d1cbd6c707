//! Network boundary.

use crate::error::{EngineError, EngineResult};
use crate::http::{Method, Request, Response};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

/// A generic fetch capability.
///
/// `Ok` means the server answered, whatever the status code. `Err` means the
/// request never completed (no connectivity, DNS failure, reset connection);
/// only that case triggers cache fallback or queueing.
pub trait Network: Send + Sync {
    /// Sends `request` and waits for the response.
    fn fetch(&self, request: &Request) -> EngineResult<Response>;
}

#[derive(Debug, Clone)]
enum Scripted {
    Respond(Response),
    Fail,
}

type RouteKey = (String, String);

fn route_key(method: &Method, url: &str) -> RouteKey {
    (method.as_str().to_string(), url.to_string())
}

/// A scripted network for testing.
///
/// Routes are matched on method and full URL. One-shot responses are served
/// before the standing route for the same key. Unknown routes answer 404.
/// Every call is logged, including calls made while offline.
#[derive(Debug)]
pub struct MockNetwork {
    online: AtomicBool,
    routes: Mutex<HashMap<RouteKey, Scripted>>,
    once: Mutex<HashMap<RouteKey, VecDeque<Scripted>>>,
    calls: Mutex<Vec<Request>>,
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetwork {
    /// Creates an online network with no routes.
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            routes: Mutex::new(HashMap::new()),
            once: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the connectivity state.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns the connectivity state.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Answers every `method url` request with `response`.
    pub fn respond(&self, method: Method, url: &str, response: Response) {
        self.routes
            .lock()
            .insert(route_key(&method, url), Scripted::Respond(response));
    }

    /// Answers the next `method url` request with `response`.
    pub fn respond_once(&self, method: Method, url: &str, response: Response) {
        self.once
            .lock()
            .entry(route_key(&method, url))
            .or_default()
            .push_back(Scripted::Respond(response));
    }

    /// Fails every `method url` request as if the host were unreachable.
    pub fn fail(&self, method: Method, url: &str) {
        self.routes.lock().insert(route_key(&method, url), Scripted::Fail);
    }

    /// Fails only the next `method url` request.
    pub fn fail_once(&self, method: Method, url: &str) {
        self.once
            .lock()
            .entry(route_key(&method, url))
            .or_default()
            .push_back(Scripted::Fail);
    }

    /// Returns every request seen, oldest first.
    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().clone()
    }

    /// Returns the number of requests seen.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Forgets the call log.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl Network for MockNetwork {
    fn fetch(&self, request: &Request) -> EngineResult<Response> {
        self.calls.lock().push(request.clone());

        if !self.is_online() {
            return Err(EngineError::network("offline"));
        }

        let key = route_key(&request.method, request.url.as_str());
        let scripted = self
            .once
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.routes.lock().get(&key).cloned());

        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail) => Err(EngineError::network(format!("connection to {} failed", request.url))),
            None => Ok(Response::new(404, "Not Found")),
        }
    }
}
