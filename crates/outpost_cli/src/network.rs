//! Network access for the CLI.

use outpost_engine::{EngineError, EngineResult, Headers, Network, Request, Response};
use reqwest::blocking::Client;
use reqwest::Method;
use std::time::Duration;
use tracing::debug;

/// A [`Network`] backed by a blocking `reqwest` client.
///
/// Transport failures (DNS, refused connections, timeouts) are network
/// errors; every response that arrives is returned whatever its status.
pub struct ReqwestNetwork {
    client: Client,
}

impl ReqwestNetwork {
    /// Builds a client with a user agent and a request timeout.
    pub fn new(timeout: Duration) -> EngineResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("outpost/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Network for ReqwestNetwork {
    fn fetch(&self, request: &Request) -> EngineResult<Response> {
        let method = Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.to_vec());
        }

        let reply = builder
            .send()
            .map_err(|e| EngineError::network(e.to_string()))?;
        let status = reply.status().as_u16();

        let mut headers = Headers::new();
        for (name, value) in reply.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str(), value);
            }
        }

        let body = reply
            .bytes()
            .map_err(|e| EngineError::network(e.to_string()))?;
        debug!(method = %request.method, url = %request.url, status, "fetched");

        let mut response = Response::new(status, body.to_vec());
        response.headers = headers;
        Ok(response)
    }
}
