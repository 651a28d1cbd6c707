//! # Outpost Storage
//!
//! Append-only byte backends underneath the Outpost durable mutation queue.
//!
//! Backends are **opaque byte logs**: they never look inside what they hold.
//! The queue crate owns record framing, checksums and recovery; a backend
//! only has to append, read back, flush and cut off a torn tail.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - Shared in-process buffer; clones see the same bytes,
//!   which is how tests simulate a worker being torn down and respawned
//! - [`FileBackend`] - Single file on disk, survives process restarts
//!
//! ## Example
//!
//! ```rust
//! use outpost_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut log = InMemoryBackend::new();
//! let offset = log.append(b"queued").unwrap();
//! assert_eq!(log.read_at(offset, 6).unwrap(), b"queued");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
