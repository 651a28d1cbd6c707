//! Drain command implementation.

use crate::network::ReqwestNetwork;
use outpost_engine::{DataDir, EngineConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the drain command.
pub fn run(path: &Path, config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let data = DataDir::open(path, false)?;
    let network = Arc::new(ReqwestNetwork::new(REQUEST_TIMEOUT)?);
    let engine = data.open_engine(config, network)?;

    let pending = engine.queue().pending()?;
    if pending == 0 {
        println!("Queue is empty - nothing to replay");
        return Ok(());
    }

    println!("Replaying {pending} queued mutation(s)...");
    let report = engine.drain()?;
    println!();
    println!("  Attempted: {}", report.attempted);
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed:    {}", report.failed);
    println!("  Remaining: {}", report.remaining);

    if report.failed > 0 {
        println!();
        println!("Failed entries stay queued; use `outpost purge --id <ID>` to drop a poisoned one.");
    }
    Ok(())
}
