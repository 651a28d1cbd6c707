//! Compact command implementation.

use outpost_engine::DataDir;
use outpost_queue::{
    replay_order, scan_log, QueueOptions, QueueRecord, QueueStore, QueuedMutation, SCHEMA_VERSION,
};
use outpost_storage::FileBackend;
use std::io::Write;
use std::path::Path;

/// Compaction statistics.
#[derive(Debug)]
pub struct CompactStats {
    /// Records before compaction.
    pub input_records: u64,
    /// Records after compaction.
    pub output_records: u64,
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction.
    pub bytes_after: u64,
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting queue log at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let stats = compact(path, dry_run)?;
    println!("  Input records:  {}", stats.input_records);
    println!("  Output records: {}", stats.output_records);
    println!("  Size before:    {} bytes", stats.bytes_before);
    println!("  Size after:     {} bytes", stats.bytes_after);

    if !dry_run {
        println!();
        if stats.output_records < stats.input_records {
            println!("✓ Compaction complete");
        } else {
            println!("No compaction needed - log holds only live entries");
        }
    }
    Ok(())
}

/// What the current log holds, in replay order.
struct LiveLog {
    records: u64,
    bytes: u64,
    schema_version: u32,
    entries: Vec<QueuedMutation>,
}

/// Rewrites the queue log as one schema record plus one add per live entry.
///
/// The new log is written to a temporary file, synced, then renamed over the
/// old one, so a crash leaves either the old log or the new one. A dry run
/// only reads the log.
pub fn compact(path: &Path, dry_run: bool) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let data = DataDir::open(path, false)?;
    let queue_path = data.queue_path();
    if !queue_path.exists() {
        return Err("Queue log not found".into());
    }

    let live = if dry_run {
        scan_live(&queue_path)?
    } else {
        open_live(&data)?
    };

    let mut output = QueueRecord::Schema {
        version: live.schema_version,
    }
    .encode()?;
    let output_records = live.entries.len() as u64 + 1;
    for entry in live.entries {
        output.extend_from_slice(&QueueRecord::Add(entry).encode()?);
    }

    let stats = CompactStats {
        input_records: live.records,
        output_records,
        bytes_before: live.bytes,
        bytes_after: output.len() as u64,
    };

    if !dry_run && stats.output_records < stats.input_records {
        let temp_path = queue_path.with_extension("compact");
        {
            let mut temp_file = std::fs::File::create(&temp_path)?;
            temp_file.write_all(&output)?;
            temp_file.sync_all()?;
        }
        std::fs::rename(&temp_path, &queue_path)?;
    }
    Ok(stats)
}

/// Opens the store, which cuts a torn tail and runs schema upgrades.
fn open_live(data: &DataDir) -> Result<LiveLog, Box<dyn std::error::Error>> {
    let store = data.open_store(QueueOptions::default())?;
    let stats = store.stats();
    let mut entries = store.get_all()?;
    replay_order(&mut entries);
    Ok(LiveLog {
        records: stats.records,
        bytes: stats.bytes,
        schema_version: stats.schema_version,
        entries,
    })
}

/// Replays the log without writing to it.
fn scan_live(queue_path: &Path) -> Result<LiveLog, Box<dyn std::error::Error>> {
    let backend = FileBackend::open(queue_path)?;
    let scan = scan_log(&backend)?;

    let mut schema_version = None;
    let mut entries: Vec<QueuedMutation> = Vec::new();
    let records = scan.records.len() as u64;
    for (_, record) in scan.records {
        match record {
            QueueRecord::Schema { version } => schema_version = Some(version),
            QueueRecord::Add(entry) => entries.push(entry),
            QueueRecord::Remove { id } => entries.retain(|entry| entry.id != id),
        }
    }
    replay_order(&mut entries);

    Ok(LiveLog {
        records,
        bytes: scan.size,
        schema_version: schema_version.unwrap_or(SCHEMA_VERSION),
        entries,
    })
}
