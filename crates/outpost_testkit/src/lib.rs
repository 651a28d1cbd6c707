//! # Outpost Testkit
//!
//! Test utilities for Outpost.
//!
//! This crate provides:
//! - A scripted engine harness over memory- or file-backed storage
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use outpost_testkit::prelude::*;
//!
//! #[test]
//! fn offline_write_is_queued() {
//!     let engine = TestEngine::memory();
//!     engine.go_offline();
//!     let response = engine.fetch(&post("/api/players", "{}"));
//!     assert_eq!(response.status, 202);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
