//! # Outpost Queue
//!
//! The durable store behind offline writes.
//!
//! When a mutating request cannot reach the network, the engine snapshots it
//! into a [`QueuedMutation`] and commits it here. Entries survive the worker
//! being evicted and respawned, and are removed only after a confirmed
//! successful replay.
//!
//! ## Log format
//!
//! A [`LogQueueStore`] keeps every transaction as one framed record in an
//! append-only [`StorageBackend`](outpost_storage::StorageBackend):
//!
//! ```text
//! ┌───────┬─────────┬──────┬─────────┬─────────┬───────┐
//! │ magic │ version │ type │ length  │ payload │ crc32 │
//! │  4 B  │   2 B   │ 1 B  │   4 B   │  len B  │  4 B  │
//! └───────┴─────────┴──────┴─────────┴─────────┴───────┘
//! ```
//!
//! Opening the store replays the log into an index. A record cut short by a
//! crash is the end of the log and is truncated away; damage anywhere else
//! is reported as corruption.
//!
//! ## Key Invariants
//!
//! - An entry is immutable once added; there is no update-in-place
//! - Ids are unique; adding an existing id fails
//! - Removal is a separate record written only for a live id

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod mutation;
mod record;
mod store;

pub use error::{QueueError, QueueResult};
pub use mutation::{replay_order, MutationId, QueuedMutation};
pub use record::{compute_crc32, scan_log, LogScan, QueueRecord, RecordType, QUEUE_FORMAT_VERSION, QUEUE_MAGIC};
pub use store::{LogQueueStore, LogStats, QueueOptions, QueueStore, SchemaUpgrade, SCHEMA_VERSION};
