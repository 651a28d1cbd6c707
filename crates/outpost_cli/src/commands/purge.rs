//! Purge command implementation.

use outpost_engine::DataDir;
use outpost_queue::{MutationId, QueueOptions, QueueStore};
use std::path::Path;
use tracing::info;

/// Which entries to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single entry by id.
    One(String),
    /// Every queued entry.
    All,
}

/// Runs the purge command.
pub fn run(path: &Path, target: Target) -> Result<(), Box<dyn std::error::Error>> {
    let removed = purge(path, &target)?;
    match target {
        Target::One(id) if removed == 0 => return Err(format!("No queued mutation with id {id}").into()),
        Target::One(id) => println!("✓ Removed {id}"),
        Target::All => println!("✓ Removed {removed} queued mutation(s)"),
    }
    Ok(())
}

/// Removes the targeted entries and returns how many were removed.
pub fn purge(path: &Path, target: &Target) -> Result<usize, Box<dyn std::error::Error>> {
    let data = DataDir::open(path, false)?;
    let store = data.open_store(QueueOptions::default())?;

    let ids = match target {
        Target::One(id) => vec![MutationId::new(id.as_str())],
        Target::All => store.get_all()?.into_iter().map(|entry| entry.id).collect(),
    };

    let mut removed = 0;
    for id in ids {
        if store.delete(&id)? {
            info!(%id, "purged queued mutation");
            removed += 1;
        }
    }
    Ok(removed)
}
