//! File-backed byte log.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A byte log stored in a single file.
///
/// Data survives process restarts, which is what lets a queued mutation
/// outlive the worker that captured it.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to hand data to the OS
/// - `sync()` calls `File::sync_all()` so data and length are on disk
///
/// ```no_run
/// use outpost_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut log = FileBackend::open(Path::new("queue.log")).unwrap();
/// log.append(b"record").unwrap();
/// log.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    log: Mutex<LogFile>,
}

/// Open handle plus the length every append is positioned against.
#[derive(Debug)]
struct LogFile {
    file: File,
    len: u64,
}

impl LogFile {
    fn check_range(&self, offset: u64, len: usize) -> StorageResult<()> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.len,
            }),
        }
    }
}

impl FileBackend {
    /// Opens or creates a log file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            log: Mutex::new(LogFile { file, len }),
        })
    }

    /// Opens or creates a log file, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut log = self.log.lock();
        log.check_range(offset, len)?;

        let mut buffer = vec![0u8; len];
        if len > 0 {
            log.file.seek(SeekFrom::Start(offset))?;
            log.file.read_exact(&mut buffer)?;
        }
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let log = self.log.get_mut();
        let offset = log.len;
        if !data.is_empty() {
            log.file.seek(SeekFrom::Start(offset))?;
            log.file.write_all(data)?;
            log.len += data.len() as u64;
        }
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(self.log.get_mut().file.flush()?)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.log.lock().len)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(self.log.get_mut().file.sync_all()?)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let log = self.log.get_mut();
        if new_size > log.len {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: log.len,
            });
        }

        // The cut must be durable before anything is appended after it.
        log.file.set_len(new_size)?;
        log.file.sync_all()?;
        log.len = new_size;
        Ok(())
    }
}
