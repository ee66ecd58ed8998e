//! Horizon snapshot, emergence marker and bridge state files.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use hz_core::{BridgeSnapshot, EmergenceEvent, HorizonSnapshot};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, StoreError};
use crate::record_file::write_atomic;

pub const HORIZON_FILE: &str = "horizon.json";
pub const EMERGENCE_FILE: &str = "emergence.json";
pub const BRIDGE_FILE: &str = "bridge.json";

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Missing → `None`. Unreadable or corrupt → `None` with a warning.
fn load_json<T: DeserializeOwned>(path: &Path, what: &str) -> Option<T> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("cannot read {what} at {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("ignoring corrupt {what} at {}: {e}", path.display());
            None
        }
    }
}

pub fn save_horizon(path: &Path, snapshot: &HorizonSnapshot) -> Result<()> {
    save_json(path, snapshot)?;
    tracing::debug!(
        "saved horizon snapshot ({} quanta) to {}",
        snapshot.quanta.len(),
        path.display()
    );
    Ok(())
}

pub fn load_horizon(path: &Path) -> Option<HorizonSnapshot> {
    load_json(path, "horizon snapshot")
}

pub fn save_bridge(path: &Path, snapshot: &BridgeSnapshot) -> Result<()> {
    save_json(path, snapshot)?;
    tracing::debug!("saved bridge state to {}", path.display());
    Ok(())
}

pub fn load_bridge(path: &Path) -> Option<BridgeSnapshot> {
    load_json(path, "bridge state")
}

/// Write the emergence marker once. Returns false if it already exists.
pub fn write_emergence_marker(path: &Path, event: &EmergenceEvent) -> Result<bool> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let bytes = serde_json::to_vec_pretty(event)?;
    file.write_all(&bytes).map_err(|e| StoreError::io(path, e))?;
    file.sync_all().map_err(|e| StoreError::io(path, e))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hz_core::{BridgeConfig, StateBridge};
    use tempfile::TempDir;

    #[test]
    fn test_missing_snapshots_are_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_horizon(&dir.path().join(HORIZON_FILE)).is_none());
        assert!(load_bridge(&dir.path().join(BRIDGE_FILE)).is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(HORIZON_FILE);
        fs::write(&path, "{\"quanta\": [").unwrap();
        assert!(load_horizon(&path).is_none());
    }

    #[test]
    fn test_partial_bridge_state_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(BRIDGE_FILE);
        fs::write(&path, r#"{"ref_dim": "trust", "entropy": 1.5}"#).unwrap();
        let snapshot = load_bridge(&path).unwrap();
        assert_eq!(snapshot.ref_dim.as_deref(), Some("trust"));
        assert!(snapshot.interferences.is_empty());
        assert!(snapshot.timestamp.is_none());
    }

    #[test]
    fn test_bridge_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(BRIDGE_FILE);
        let mut bridge = StateBridge::new(BridgeConfig::default());
        bridge
            .sync_from_external(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8])
            .unwrap();
        let snapshot = bridge.to_persisted(100.0);
        save_bridge(&path, &snapshot).unwrap();
        assert_eq!(load_bridge(&path).unwrap(), snapshot);
    }

    #[test]
    fn test_emergence_marker_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(EMERGENCE_FILE);
        let event = EmergenceEvent {
            timestamp: 1.0,
            quanta_count: 100,
            message: "first".to_string(),
        };
        assert!(write_emergence_marker(&path, &event).unwrap());

        let again = EmergenceEvent {
            message: "second".to_string(),
            ..event
        };
        assert!(!write_emergence_marker(&path, &again).unwrap());
        let stored: EmergenceEvent =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored.message, "first");
    }
}
