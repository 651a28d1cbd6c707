//! Verify command implementation.
//!
//! Scans the queue log read-only: a torn tail is reported, not truncated.

use outpost_engine::DataDir;
use outpost_queue::{scan_log, MutationId, QueueRecord};
use outpost_storage::FileBackend;
use std::collections::BTreeSet;
use std::path::Path;

/// Verification report.
#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Intact records.
    pub records: usize,
    /// Add records.
    pub added: usize,
    /// Remove records.
    pub removed: usize,
    /// Entries still queued.
    pub live: usize,
    /// Schema version recorded in the log.
    pub schema_version: Option<u32>,
    /// Bytes left by an interrupted write.
    pub torn_bytes: u64,
    /// Logical problems found.
    pub issues: Vec<String>,
}

impl VerifyReport {
    /// Returns true if the log needs no repair.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.torn_bytes == 0
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying queue log at {:?}", path);
    println!();

    let report = check(path)?;
    println!("  Records:        {}", report.records);
    println!("  Added/removed:  {}/{}", report.added, report.removed);
    println!("  Live entries:   {}", report.live);
    match report.schema_version {
        Some(version) => println!("  Schema version: {version}"),
        None => println!("  Schema version: (none)"),
    }
    if report.torn_bytes > 0 {
        println!("  Torn tail:      {} bytes (cut off on next open)", report.torn_bytes);
    }
    for issue in &report.issues {
        println!("  ✗ {issue}");
    }

    println!();
    if report.is_clean() {
        println!("✓ Queue log is intact");
        Ok(())
    } else if report.issues.is_empty() {
        println!("⚠ Queue log ends in an interrupted write");
        Ok(())
    } else {
        Err(format!("{} problem(s) found", report.issues.len()).into())
    }
}

/// Scans the queue log of a data directory.
///
/// Framing damage inside the log is returned as an error; logical problems
/// (duplicate adds, removals of unknown ids) are collected in the report.
pub fn check(path: &Path) -> Result<VerifyReport, Box<dyn std::error::Error>> {
    let data = DataDir::open(path, false)?;
    let queue_path = data.queue_path();
    if !queue_path.exists() {
        return Err("Queue log not found".into());
    }

    let backend = FileBackend::open(&queue_path)?;
    let scan = scan_log(&backend)?;

    let mut report = VerifyReport {
        records: scan.records.len(),
        torn_bytes: scan.torn_bytes(),
        ..VerifyReport::default()
    };
    let mut live: BTreeSet<MutationId> = BTreeSet::new();

    for (offset, record) in &scan.records {
        match record {
            QueueRecord::Schema { version } => report.schema_version = Some(*version),
            QueueRecord::Add(entry) => {
                report.added += 1;
                if report.schema_version.is_none() {
                    report.issues.push(format!("entry {} at offset {offset} precedes the schema record", entry.id));
                }
                if !live.insert(entry.id.clone()) {
                    report.issues.push(format!("duplicate entry {} at offset {offset}", entry.id));
                }
            }
            QueueRecord::Remove { id } => {
                report.removed += 1;
                if !live.remove(id) {
                    report.issues.push(format!("removal of unknown entry {id} at offset {offset}"));
                }
            }
        }
    }
    report.live = live.len();
    Ok(report)
}
