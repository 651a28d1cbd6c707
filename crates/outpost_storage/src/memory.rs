//! In-memory byte log.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A byte log held in process memory.
///
/// Cloning an `InMemoryBackend` does **not** copy the bytes: every clone
/// appends to and reads from the same buffer. A test can therefore hand one
/// clone to a queue store, drop the store (the "worker" is evicted), and
/// open a fresh store over another clone to observe exactly what survived.
///
/// ```rust
/// use outpost_storage::{StorageBackend, InMemoryBackend};
///
/// let mut first = InMemoryBackend::new();
/// let second = first.clone();
/// first.append(b"entry").unwrap();
/// assert_eq!(second.size().unwrap(), 5);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log holding pre-existing bytes.
    ///
    /// Useful for feeding hand-crafted or damaged logs to recovery code.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of everything in the log.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Overwrites a single byte in place.
    ///
    /// Only meant for corrupting logs in recovery tests.
    pub fn poke(&self, offset: usize, byte: u8) {
        if let Some(slot) = self.data.write().get_mut(offset) {
            *slot = byte;
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;

        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn memory_offsets_follow_appends() {
        let mut log = InMemoryBackend::new();

        assert_eq!(log.append(b"first").unwrap(), 0);
        assert_eq!(log.append(b"-second").unwrap(), 5);
        assert_eq!(log.size().unwrap(), 12);
        assert_eq!(log.read_at(5, 7).unwrap(), b"-second");
    }

    #[test]
    fn memory_clones_share_bytes() {
        let mut writer = InMemoryBackend::new();
        let reader = writer.clone();

        writer.append(b"survives respawn").unwrap();
        drop(writer);

        assert_eq!(reader.read_at(0, 16).unwrap(), b"survives respawn");
    }

    #[test]
    fn memory_read_past_end_fails() {
        let mut log = InMemoryBackend::new();
        log.append(b"abc").unwrap();

        assert!(matches!(
            log.read_at(2, 5),
            Err(StorageError::ReadPastEnd { size: 3, .. })
        ));
        assert!(matches!(
            log.read_at(9, 0),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn memory_truncate_cuts_tail() {
        let mut log = InMemoryBackend::with_data(b"good-torn".to_vec());
        log.truncate(4).unwrap();
        assert_eq!(log.data(), b"good");

        assert!(matches!(
            log.truncate(10),
            Err(StorageError::TruncateBeyondEnd {
                requested: 10,
                size: 4
            })
        ));
    }

    #[test]
    fn memory_poke_corrupts_single_byte() {
        let log = InMemoryBackend::with_data(vec![0, 0, 0]);
        log.poke(1, 0xFF);
        log.poke(99, 0xFF);
        assert_eq!(log.data(), vec![0, 0xFF, 0]);
    }

    proptest! {
        #[test]
        fn memory_appends_read_back(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16)) {
            let mut log = InMemoryBackend::new();
            let mut offsets = Vec::new();
            for chunk in &chunks {
                offsets.push(log.append(chunk).unwrap());
            }
            for (chunk, offset) in chunks.iter().zip(offsets) {
                prop_assert_eq!(&log.read_at(offset, chunk.len()).unwrap(), chunk);
            }
        }
    }
}
