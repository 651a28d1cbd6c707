//! Per-strategy request handlers.
//!
//! Every handler is callable with no in-memory context beyond its arguments
//! and always produces a response: storage failures are logged and turned
//! into the same synthesized offline responses as network failures.

use crate::cache::CacheManager;
use crate::http::{Request, Response};
use crate::network::Network;
use crate::queue::MutationQueue;
use tracing::{debug, error, warn};
use url::Url;

/// Cache-first handling of a static asset.
pub fn handle_static(network: &dyn Network, caches: &CacheManager, request: &Request) -> Response {
    match caches.lookup_static(&request.url) {
        Ok(Some(hit)) => {
            debug!(url = %request.url, "static asset served from cache");
            return hit;
        }
        Ok(None) => {}
        Err(e) => error!(url = %request.url, error = %e, "static cache lookup failed"),
    }

    match network.fetch(request) {
        Ok(response) => {
            if let Err(e) = caches.store_static(&request.url, &response) {
                error!(url = %request.url, error = %e, "could not cache static asset");
            }
            response
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "static asset unreachable and not cached");
            Response::offline_text()
        }
    }
}

/// Network-first handling of a top-level navigation.
///
/// A successful fetch becomes the cached shell under `shell_url`, so the
/// fallback is always the latest HTML that actually loaded.
pub fn handle_navigation(
    network: &dyn Network,
    caches: &CacheManager,
    shell_url: &Url,
    request: &Request,
) -> Response {
    match network.fetch(request) {
        Ok(response) => {
            if let Err(e) = caches.store_static(shell_url, &response) {
                error!(url = %request.url, error = %e, "could not cache app shell");
            }
            response
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "navigation failed; trying cached shell");
            match caches.lookup_static(shell_url) {
                Ok(Some(shell)) => shell,
                Ok(None) => Response::offline_text(),
                Err(e) => {
                    error!(error = %e, "shell cache lookup failed");
                    Response::offline_text()
                }
            }
        }
    }
}

/// Network-first handling of an API read with a timed cache fallback.
///
/// Any completed response, error statuses included, is cached and returned.
/// Only a failed fetch falls back, and only to an entry younger than the
/// freshness limit.
pub fn handle_api_read(network: &dyn Network, caches: &CacheManager, request: &Request) -> Response {
    let error = match network.fetch(request) {
        Ok(response) => {
            if let Err(e) = caches.store_api(&request.url, &response) {
                error!(url = %request.url, error = %e, "could not cache API response");
            }
            return response;
        }
        Err(e) => e,
    };

    match caches.lookup_api(&request.url) {
        Ok(Some(hit)) if caches.is_fresh(&hit) => {
            debug!(url = %request.url, age_ms = hit.age_ms, "API read served from cache");
            hit.response
        }
        Ok(Some(hit)) => {
            warn!(url = %request.url, age_ms = hit.age_ms, error = %error, "API cache too old; reporting offline");
            Response::offline_json()
        }
        Ok(None) => {
            warn!(url = %request.url, error = %error, "API read unreachable and not cached");
            Response::offline_json()
        }
        Err(e) => {
            error!(url = %request.url, error = %e, "API cache lookup failed");
            Response::offline_json()
        }
    }
}

/// Handling of an API write: send it, or queue it if the network is gone.
///
/// A completed response is returned untouched whatever its status; deciding
/// what a 4xx means is the caller's job.
pub fn handle_api_mutation(
    network: &dyn Network,
    queue: &MutationQueue,
    queued_message: &str,
    request: &Request,
) -> Response {
    let error = match network.fetch(request) {
        Ok(response) => return response,
        Err(e) => e,
    };

    warn!(method = %request.method, url = %request.url, error = %error, "mutation failed; queueing");
    match queue.enqueue(request) {
        Ok(_) => Response::queued(queued_message),
        Err(e) => {
            error!(method = %request.method, url = %request.url, error = %e, "could not queue mutation");
            Response::enqueue_failed()
        }
    }
}
