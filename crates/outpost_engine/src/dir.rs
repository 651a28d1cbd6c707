//! Data directory management.
//!
//! ```text
//! <root>/
//! ├─ LOCK         # Advisory lock for a single engine process
//! ├─ queue.log    # Durable mutation queue
//! └─ caches/      # Named response caches
//! ```

use crate::cache::DirCacheStorage;
use crate::config::EngineConfig;
use crate::controller::{Collaborators, Controller};
use crate::error::{EngineError, EngineResult};
use crate::network::Network;
use fs2::FileExt;
use outpost_queue::{LogQueueStore, QueueOptions};
use outpost_storage::FileBackend;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const QUEUE_FILE: &str = "queue.log";
const CACHES_DIR: &str = "caches";

/// An engine data directory, held exclusively for as long as this value lives.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens (or creates) a data directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DataDirLocked`] if another process holds it, or
    /// an error if the directory is missing and `create_if_missing` is false.
    pub fn open(path: &Path, create_if_missing: bool) -> EngineResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(EngineError::InvalidConfig(format!(
                    "data directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(EngineError::InvalidConfig(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::DataDirLocked);
        }

        debug!(path = %path.display(), "opened data directory");
        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the queue log.
    pub fn queue_path(&self) -> PathBuf {
        self.path.join(QUEUE_FILE)
    }

    /// Returns the root of the cache directories.
    pub fn caches_path(&self) -> PathBuf {
        self.path.join(CACHES_DIR)
    }

    /// Opens the file-backed queue store.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or replayed.
    pub fn open_store(&self, options: QueueOptions) -> EngineResult<LogQueueStore<FileBackend>> {
        let backend = FileBackend::open(&self.queue_path())?;
        Ok(LogQueueStore::open_with_upgrade(backend, options, |_| Ok(()))?)
    }

    /// Opens the directory-backed caches.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache root cannot be created.
    pub fn open_caches(&self) -> EngineResult<DirCacheStorage> {
        DirCacheStorage::open(self.caches_path())
    }

    /// Builds an active controller over this directory's store and caches.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or caches cannot be opened, or if the
    /// configuration is unusable.
    pub fn open_engine(&self, config: EngineConfig, network: Arc<dyn Network>) -> EngineResult<Controller> {
        let store = Arc::new(self.open_store(QueueOptions::default())?);
        let caches = Arc::new(self.open_caches()?);
        Controller::resume(config, Collaborators::new(network, store, caches))
    }
}
