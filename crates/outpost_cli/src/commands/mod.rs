//! CLI command implementations.

pub mod compact;
pub mod drain;
pub mod inspect;
pub mod purge;
pub mod send;
pub mod verify;
