//! Record file I/O and the atomic-write discipline shared by every state file.
//!
//! A save never truncates the live file: contents go to `<file>.tmp`, are
//! synced, the previous file is copied to `<file>.bak`, and only then is the
//! temp file renamed over the target. An interrupted save leaves the old
//! file, the backup, or the complete new file.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use hz_core::{LoadReport, RecordFileFormat, RecordStore, parse_record_file, render_record_file};

use crate::error::{Result, StoreError};

pub const RECORDS_FILE: &str = "records.jsonl";

/// `path` with `.suffix` appended to the full file name.
pub(crate) fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

pub fn backup_path(path: &Path) -> PathBuf {
    sibling(path, "bak")
}

/// Write-temp, back up, rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp = sibling(path, "tmp");
    {
        let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(contents)
            .map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    }

    if path.exists() {
        let bak = backup_path(path);
        fs::copy(path, &bak).map_err(|e| StoreError::io(&bak, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

pub fn save_records(path: &Path, store: &RecordStore, now: f64) -> Result<()> {
    let text = render_record_file(store, now)?;
    write_atomic(path, text.as_bytes())?;
    tracing::debug!("saved {} records to {}", store.len(), path.display());
    Ok(())
}

/// Load a record file. A missing or unreadable file is an empty store;
/// corrupt lines are skipped and logged.
pub fn load_records(path: &Path, dimensions: usize) -> RecordStore {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return RecordStore::new(dimensions),
        Err(e) => {
            tracing::warn!("cannot read {}, starting empty: {e}", path.display());
            return RecordStore::new(dimensions);
        }
    };

    let (store, report) = parse_record_file(&text, dimensions);
    log_report(path, dimensions, &report);
    store
}

fn log_report(path: &Path, dimensions: usize, report: &LoadReport) {
    for skipped in &report.skipped {
        tracing::warn!(
            "{}: skipped line {}: {}",
            path.display(),
            skipped.line,
            skipped.reason
        );
    }
    if report.padded > 0 {
        tracing::warn!(
            "{}: zero-padded {} short vectors to {dimensions} dimensions",
            path.display(),
            report.padded
        );
    }
    if let Some(header) = &report.header
        && header.dimensions != dimensions
    {
        tracing::warn!(
            "{}: file declares {} dimensions, configured for {dimensions}",
            path.display(),
            header.dimensions
        );
    }
    match report.format {
        RecordFileFormat::Legacy => {
            tracing::info!("migrated legacy document {}", path.display())
        }
        RecordFileFormat::Headerless => {
            tracing::warn!("{} has no readable header line", path.display())
        }
        RecordFileFormat::Empty | RecordFileFormat::LineDelimited => {}
    }
    tracing::debug!("loaded {} records from {}", report.loaded, path.display());
}
