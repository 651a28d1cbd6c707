//! Configuration for the interception controller.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default prefix for API paths.
pub const DEFAULT_API_PREFIX: &str = "/api/";

/// Default cache version suffix.
pub const DEFAULT_CACHE_VERSION: u32 = 1;

/// Default freshness limit for cached API reads.
pub const DEFAULT_MAX_API_AGE: Duration = Duration::from_secs(60 * 60);

/// Default recovery-trigger tag.
pub const DEFAULT_SYNC_TAG: &str = "sync-mutations";

const DEFAULT_QUEUED_MESSAGE: &str = "Request queued for sync when online";

const DEFAULT_STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "woff", "woff2", "ttf", "otf", "eot", "png", "jpg", "jpeg", "gif",
    "svg", "webp", "avif", "ico", "webmanifest", "json",
];

/// Configuration for one controlled origin.
///
/// Deserializes from JSON with every field except `origin` optional:
///
/// ```json
/// { "origin": "https://app.example.com", "cache_version": 2 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The controlled origin; cross-origin requests pass through.
    pub origin: Url,
    /// Path prefix of API routes.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Suffix of both cache names (`static-v{n}`, `api-v{n}`).
    #[serde(default = "default_cache_version")]
    pub cache_version: u32,
    /// Freshness limit for cached API reads, in seconds.
    #[serde(default = "default_max_api_age_secs")]
    pub max_api_age_secs: u64,
    /// Paths pre-cached at install time.
    #[serde(default = "default_shell_assets")]
    pub shell_assets: Vec<String>,
    /// File extensions treated as static assets (case-insensitive).
    #[serde(default = "default_static_extensions")]
    pub static_extensions: Vec<String>,
    /// Tag used to register the recovery trigger.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,
    /// Human text in the body of a 202 queued response.
    #[serde(default = "default_queued_message")]
    pub queued_message: String,
}

impl EngineConfig {
    /// Creates a configuration with defaults for `origin`.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            api_prefix: default_api_prefix(),
            cache_version: default_cache_version(),
            max_api_age_secs: default_max_api_age_secs(),
            shell_assets: default_shell_assets(),
            static_extensions: default_static_extensions(),
            sync_tag: default_sync_tag(),
            queued_message: default_queued_message(),
        }
    }

    /// Parses the origin and creates a configuration with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `origin` is not an absolute URL.
    pub fn for_origin(origin: &str) -> EngineResult<Self> {
        let url = Url::parse(origin).map_err(|e| EngineError::InvalidConfig(format!("origin {origin}: {e}")))?;
        Ok(Self::new(url))
    }

    /// Loads a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the JSON is malformed or fails
    /// [`validate`](Self::validate).
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the API path prefix.
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Sets the cache version.
    pub fn with_cache_version(mut self, version: u32) -> Self {
        self.cache_version = version;
        self
    }

    /// Sets the freshness limit for cached API reads.
    pub fn with_max_api_age(mut self, age: Duration) -> Self {
        self.max_api_age_secs = age.as_secs();
        self
    }

    /// Sets the paths pre-cached at install time.
    pub fn with_shell_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the recovery-trigger tag.
    pub fn with_sync_tag(mut self, tag: impl Into<String>) -> Self {
        self.sync_tag = tag.into();
        self
    }

    /// Sets the message returned with queued mutations.
    pub fn with_queued_message(mut self, message: impl Into<String>) -> Self {
        self.queued_message = message.into();
        self
    }

    /// Name of the static asset cache.
    pub fn static_cache_name(&self) -> String {
        format!("static-v{}", self.cache_version)
    }

    /// Name of the API response cache.
    pub fn api_cache_name(&self) -> String {
        format!("api-v{}", self.cache_version)
    }

    /// Caches that survive activation.
    pub fn expected_caches(&self) -> Vec<String> {
        vec![self.static_cache_name(), self.api_cache_name()]
    }

    /// Freshness limit for cached API reads.
    pub fn max_api_age(&self) -> Duration {
        Duration::from_secs(self.max_api_age_secs)
    }

    /// Resolves a path against the origin.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the result is not a valid URL.
    pub fn resolve(&self, path: &str) -> EngineResult<Url> {
        self.origin
            .join(path)
            .map_err(|e| EngineError::InvalidConfig(format!("{path}: {e}")))
    }

    /// Checks the configuration for values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> EngineResult<()> {
        if self.origin.cannot_be_a_base() || self.origin.host().is_none() {
            return Err(EngineError::InvalidConfig(format!("origin {} has no host", self.origin)));
        }
        if !self.api_prefix.starts_with('/') {
            return Err(EngineError::InvalidConfig(format!(
                "api prefix {:?} must start with '/'",
                self.api_prefix
            )));
        }
        if self.sync_tag.is_empty() {
            return Err(EngineError::InvalidConfig("sync tag is empty".into()));
        }
        for path in &self.shell_assets {
            self.resolve(path)?;
        }
        Ok(())
    }
}

fn default_api_prefix() -> String {
    DEFAULT_API_PREFIX.into()
}

fn default_cache_version() -> u32 {
    DEFAULT_CACHE_VERSION
}

fn default_max_api_age_secs() -> u64 {
    DEFAULT_MAX_API_AGE.as_secs()
}

fn default_shell_assets() -> Vec<String> {
    vec!["/".into(), "/index.html".into()]
}

fn default_static_extensions() -> Vec<String> {
    DEFAULT_STATIC_EXTENSIONS.iter().map(|s| (*s).to_string()).collect()
}

fn default_sync_tag() -> String {
    DEFAULT_SYNC_TAG.into()
}

fn default_queued_message() -> String {
    DEFAULT_QUEUED_MESSAGE.into()
}
