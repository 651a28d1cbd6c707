//! Queue log records and their on-disk framing.

use crate::error::{QueueError, QueueResult};
use crate::mutation::{MutationId, QueuedMutation};
use outpost_storage::StorageBackend;

/// Magic bytes opening every queue record.
pub const QUEUE_MAGIC: [u8; 4] = *b"OPQL";

/// Current framing version.
pub const QUEUE_FORMAT_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Type tag of a queue record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Schema version marker.
    Schema = 1,
    /// A mutation was queued.
    Add = 2,
    /// A mutation was removed after a successful replay.
    Remove = 3,
}

impl RecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Schema),
            2 => Some(Self::Add),
            3 => Some(Self::Remove),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One transaction against the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueRecord {
    /// The store was created or upgraded to `version`.
    Schema {
        /// Schema version now in effect.
        version: u32,
    },
    /// A mutation entered the queue.
    Add(QueuedMutation),
    /// A mutation left the queue.
    Remove {
        /// Id of the removed entry.
        id: MutationId,
    },
}

impl QueueRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Schema { .. } => RecordType::Schema,
            Self::Add(_) => RecordType::Add,
            Self::Remove { .. } => RecordType::Remove,
        }
    }

    /// Serializes the record payload (without framing).
    ///
    /// # Errors
    ///
    /// Returns a codec error if the mutation cannot be encoded as CBOR.
    pub fn encode_payload(&self) -> QueueResult<Vec<u8>> {
        match self {
            Self::Schema { version } => Ok(version.to_le_bytes().to_vec()),
            Self::Add(entry) => {
                let mut buf = Vec::new();
                ciborium::into_writer(entry, &mut buf).map_err(QueueError::codec)?;
                Ok(buf)
            }
            Self::Remove { id } => Ok(id.as_str().as_bytes().to_vec()),
        }
    }

    /// Deserializes a record from its type and payload.
    ///
    /// `offset` is only used for error reporting.
    pub fn decode_payload(record_type: RecordType, payload: &[u8], offset: u64) -> QueueResult<Self> {
        match record_type {
            RecordType::Schema => {
                let bytes: [u8; 4] = payload
                    .try_into()
                    .map_err(|_| QueueError::corrupted(offset, "schema record must be 4 bytes"))?;
                Ok(Self::Schema {
                    version: u32::from_le_bytes(bytes),
                })
            }
            RecordType::Add => {
                let entry: QueuedMutation =
                    ciborium::from_reader(payload).map_err(QueueError::codec)?;
                Ok(Self::Add(entry))
            }
            RecordType::Remove => {
                let id = std::str::from_utf8(payload)
                    .map_err(|_| QueueError::corrupted(offset, "remove id is not UTF-8"))?;
                Ok(Self::Remove {
                    id: MutationId::new(id),
                })
            }
        }
    }

    /// Serializes the record with its full frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded or exceeds 4 GiB.
    pub fn encode(&self) -> QueueResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| QueueError::InvalidEntry("record payload too large".into()))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&QUEUE_MAGIC);
        data.extend_from_slice(&QUEUE_FORMAT_VERSION.to_le_bytes());
        data.push(self.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        // CRC covers everything before it.
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

/// Result of scanning a queue log from the start.
#[derive(Debug, Clone, Default)]
pub struct LogScan {
    /// Every intact record with the offset it starts at.
    pub records: Vec<(u64, QueueRecord)>,
    /// End of the last intact record.
    pub valid_end: u64,
    /// Total log size at scan time.
    pub size: u64,
}

impl LogScan {
    /// Bytes after the last intact record, left by an interrupted write.
    pub fn torn_bytes(&self) -> u64 {
        self.size - self.valid_end
    }
}

/// Reads every record of a queue log.
///
/// A record that runs past the end of the log, or whose checksum fails while
/// being the very last thing in the log, is an interrupted append: scanning
/// stops there and [`LogScan::valid_end`] points at its start. Any damage
/// followed by more data is corruption.
///
/// # Errors
///
/// Returns [`QueueError::Corrupted`] for damaged records inside the log.
pub fn scan_log<B: StorageBackend + ?Sized>(backend: &B) -> QueueResult<LogScan> {
    let size = backend.size()?;
    let mut offset = 0u64;
    let mut records = Vec::new();

    while offset < size {
        if offset + HEADER_SIZE as u64 > size {
            break;
        }

        let header = backend.read_at(offset, HEADER_SIZE)?;
        if header[0..4] != QUEUE_MAGIC {
            return Err(QueueError::corrupted(offset, "bad record magic"));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > QUEUE_FORMAT_VERSION {
            return Err(QueueError::corrupted(
                offset,
                format!("unsupported record format version {version}"),
            ));
        }

        let record_type = RecordType::from_byte(header[6]).ok_or_else(|| {
            QueueError::corrupted(offset, format!("unknown record type {}", header[6]))
        })?;

        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as u64;
        let total = HEADER_SIZE as u64 + len + CRC_SIZE as u64;
        if offset + total > size {
            break;
        }

        let frame = backend.read_at(offset, total as usize)?;
        let body_end = frame.len() - CRC_SIZE;
        let stored_crc = u32::from_le_bytes([
            frame[body_end],
            frame[body_end + 1],
            frame[body_end + 2],
            frame[body_end + 3],
        ]);
        if compute_crc32(&frame[..body_end]) != stored_crc {
            if offset + total == size {
                break;
            }
            return Err(QueueError::corrupted(offset, "checksum mismatch"));
        }

        let record = QueueRecord::decode_payload(record_type, &frame[HEADER_SIZE..body_end], offset)?;
        records.push((offset, record));
        offset += total;
    }

    Ok(LogScan {
        records,
        valid_end: offset,
        size,
    })
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
