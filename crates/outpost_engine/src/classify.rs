//! Request classification.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::http::{Method, RequestMode};
use regex::Regex;
use url::{Origin, Url};

/// How an intercepted request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Non-GET under the API prefix: network, else queue.
    ApiMutation,
    /// GET under the API prefix: network-first with a timed cache fallback.
    ApiRead,
    /// Static asset: cache-first.
    StaticAsset,
    /// Top-level document: network-first with the cached shell as fallback.
    Navigation,
    /// Not intercepted; default network behavior applies.
    Passthrough,
}

impl Strategy {
    /// Returns true if the controller responds to the request itself.
    pub fn is_intercepted(&self) -> bool {
        !matches!(self, Strategy::Passthrough)
    }
}

/// Maps requests to a [`Strategy`].
///
/// Rules are checked in order and the first match wins:
///
/// 1. cross-origin → [`Strategy::Passthrough`]
/// 2. API prefix, non-GET → [`Strategy::ApiMutation`]
/// 3. API prefix, GET → [`Strategy::ApiRead`]
/// 4. static file extension → [`Strategy::StaticAsset`]
/// 5. navigation mode → [`Strategy::Navigation`]
/// 6. anything else → [`Strategy::Passthrough`]
///
/// Classification holds no state beyond the configuration.
#[derive(Debug, Clone)]
pub struct Classifier {
    origin: Origin,
    api_prefix: String,
    static_asset: Option<Regex>,
}

impl Classifier {
    /// Builds a classifier for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the extension list does not
    /// form a valid pattern.
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        Ok(Self {
            origin: config.origin.origin(),
            api_prefix: config.api_prefix.clone(),
            static_asset: static_asset_pattern(&config.static_extensions)?,
        })
    }

    /// Classifies one request.
    pub fn classify(&self, url: &Url, method: &Method, mode: RequestMode) -> Strategy {
        if url.origin() != self.origin {
            return Strategy::Passthrough;
        }

        let path = url.path();
        if path.starts_with(&self.api_prefix) {
            return if method.is_get() {
                Strategy::ApiRead
            } else {
                Strategy::ApiMutation
            };
        }

        // The query string is not part of `path`, so `?v=3` never hides an extension.
        if self.static_asset.as_ref().is_some_and(|re| re.is_match(path)) {
            return Strategy::StaticAsset;
        }

        if mode == RequestMode::Navigate {
            return Strategy::Navigation;
        }

        Strategy::Passthrough
    }
}

fn static_asset_pattern(extensions: &[String]) -> EngineResult<Option<Regex>> {
    if extensions.is_empty() {
        return Ok(None);
    }

    let alternatives: Vec<String> = extensions
        .iter()
        .map(|ext| regex::escape(ext.trim_start_matches('.')))
        .collect();
    Regex::new(&format!(r"(?i)\.(?:{})$", alternatives.join("|")))
        .map(Some)
        .map_err(|e| EngineError::InvalidConfig(format!("static extensions: {e}")))
}
