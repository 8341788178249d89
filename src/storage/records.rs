//! Label record persistence
//!
//! Single records are written as pretty JSON; batch runs append one JSON
//! object per line.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::reconcile::LabelRecord;

/// Write a single record as pretty JSON
pub fn save_record(record: &LabelRecord, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(record)?;
    ensure_parent(path)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write record {:?}", path))?;
    Ok(())
}

/// Append a record as one JSON line, creating the file if needed
pub fn append_record(record: &LabelRecord, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open record log {:?}", path))?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Load records from a JSON-lines file, skipping blank lines
pub fn load_records(path: &Path) -> Result<Vec<LabelRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open record log {:?}", path))?;

    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: LabelRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record on line {} of {:?}", number + 1, path))?;
        records.push(record);
    }
    Ok(records)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
