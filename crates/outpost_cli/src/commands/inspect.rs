//! Inspect command implementation.

use outpost_engine::{CacheStorage, DataDir};
use outpost_queue::{replay_order, QueueOptions, QueueStore};
use serde::Serialize;
use std::path::Path;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// Queue log size in bytes.
    pub queue_bytes: u64,
    /// Schema version of the queue store.
    pub schema_version: u32,
    /// Queued mutations in replay order.
    pub queued: Vec<QueuedSummary>,
    /// Named caches.
    pub caches: Vec<CacheSummary>,
}

/// One queued mutation.
#[derive(Debug, Serialize)]
pub struct QueuedSummary {
    /// Entry id.
    pub id: String,
    /// HTTP verb.
    pub method: String,
    /// Target URL.
    pub url: String,
    /// Capture time (ISO-8601).
    pub timestamp: String,
    /// Body length in bytes.
    pub body_bytes: usize,
}

/// One named cache.
#[derive(Debug, Serialize)]
pub struct CacheSummary {
    /// Cache name.
    pub name: String,
    /// Number of stored responses.
    pub entries: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "text" => print_text(&result),
        other => return Err(format!("Unknown format: {other}").into()),
    }
    Ok(())
}

/// Gathers the queue and cache contents of a data directory.
pub fn collect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let data = DataDir::open(path, false)?;
    let store = data.open_store(QueueOptions::default())?;
    let caches = data.open_caches()?;

    let mut entries = store.get_all()?;
    replay_order(&mut entries);
    let stats = store.stats();

    let queued = entries
        .into_iter()
        .map(|entry| QueuedSummary {
            timestamp: entry.timestamp_iso(),
            body_bytes: entry.body.len(),
            id: entry.id.to_string(),
            method: entry.method,
            url: entry.url,
        })
        .collect();

    let mut cache_list = Vec::new();
    for name in caches.keys()? {
        let entries = caches.entries(&name)?.len();
        cache_list.push(CacheSummary { name, entries });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        queue_bytes: stats.bytes,
        schema_version: stats.schema_version,
        queued,
        caches: cache_list,
    })
}

fn print_text(result: &InspectResult) {
    println!("Outpost data directory: {}", result.path);
    println!();
    println!("Queue ({} bytes, schema v{}):", result.queue_bytes, result.schema_version);
    if result.queued.is_empty() {
        println!("  (empty)");
    }
    for entry in &result.queued {
        println!(
            "  {}  {} {:<7} {} ({} bytes)",
            entry.timestamp, entry.id, entry.method, entry.url, entry.body_bytes
        );
    }
    println!();
    println!("Caches:");
    if result.caches.is_empty() {
        println!("  (none)");
    }
    for cache in &result.caches {
        println!("  {:<16} {} entries", cache.name, cache.entries);
    }
}
