//! Directory-backed cache storage.
//!
//! ```text
//! <root>/
//! ├─ static-v1/
//! │  ├─ 5f2b…e1.cbor     # one entry, named by SHA-256 of its key
//! │  └─ …
//! └─ api-v1/
//!    └─ …
//! ```
//!
//! Each entry file holds the key and the response as CBOR. Entries are
//! written to a temporary file, synced, and renamed over the old one, so a
//! reader sees either the previous response or the new one.

use super::storage::CacheStorage;
use crate::error::{EngineError, EngineResult};
use crate::http::Response;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const ENTRY_EXT: &str = "cbor";
const TEMP_EXT: &str = "tmp";

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    response: Response,
}

/// Returns the file name for a cache key.
pub fn entry_file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{}.{ENTRY_EXT}", hex::encode(hasher.finalize()))
}

fn validate_name(name: &str) -> EngineResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidCacheName(name.to_string()))
    }
}

/// Cache storage persisted under a directory.
#[derive(Debug)]
pub struct DirCacheStorage {
    root: PathBuf,
    // Serializes writers so two puts of one key never share a temp file.
    write_lock: Mutex<()>,
}

impl DirCacheStorage {
    /// Opens (or creates) cache storage rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> EngineResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> EngineResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn read_entry(path: &Path) -> EngineResult<StoredEntry> {
        let file = File::open(path)?;
        ciborium::from_reader(file)
            .map_err(|e| EngineError::cache(format!("{}: {e}", path.display())))
    }
}

impl CacheStorage for DirCacheStorage {
    fn open(&self, name: &str) -> EngineResult<()> {
        fs::create_dir_all(self.cache_dir(name)?)?;
        Ok(())
    }

    fn has(&self, name: &str) -> EngineResult<bool> {
        Ok(self.cache_dir(name)?.is_dir())
    }

    fn match_key(&self, name: &str, key: &str) -> EngineResult<Option<Response>> {
        let path = self.cache_dir(name)?.join(entry_file_name(key));
        match Self::read_entry(&path) {
            Ok(entry) if entry.key == key => Ok(Some(entry.response)),
            Ok(_) => Ok(None),
            Err(EngineError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn put(&self, name: &str, key: &str, response: &Response) -> EngineResult<()> {
        let dir = self.cache_dir(name)?;
        let entry = StoredEntry {
            key: key.to_string(),
            response: response.clone(),
        };
        let mut data = Vec::new();
        ciborium::into_writer(&entry, &mut data).map_err(EngineError::cache)?;

        let _guard = self.write_lock.lock();
        fs::create_dir_all(&dir)?;

        let path = dir.join(entry_file_name(key));
        let temp_path = path.with_extension(TEMP_EXT);
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> EngineResult<bool> {
        let dir = self.cache_dir(name)?;
        let _guard = self.write_lock.lock();
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> EngineResult<Vec<String>> {
        let mut names = Vec::new();
        for dirent in fs::read_dir(&self.root)? {
            let dirent = dirent?;
            if !dirent.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = dirent.file_name().to_str() {
                if validate_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn entries(&self, name: &str) -> EngineResult<Vec<(String, Response)>> {
        let dir = self.cache_dir(name)?;
        let listing = match fs::read_dir(&dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for dirent in listing {
            let path = dirent?.path();
            // Leftover temp files from an interrupted put are ignored.
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let entry = Self::read_entry(&path)?;
            entries.push((entry.key, entry.response));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}
