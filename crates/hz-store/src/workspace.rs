use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hz_core::{EmergenceEvent, Horizon, OfflineEvolution, StateBridge};

use crate::config::{CONFIG_FILE, Config};
use crate::error::{Result, StoreError};
use crate::record_file::{RECORDS_FILE, load_records, save_records};
use crate::shared::SharedRecords;
use crate::state::{
    BRIDGE_FILE, EMERGENCE_FILE, HORIZON_FILE, load_bridge, load_horizon, save_bridge,
    save_horizon, write_emergence_marker,
};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "HZ_DATA_DIR";

/// Default base directory for all horizon storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".horizon-memory")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Explicit path, else `HZ_DATA_DIR`, else `~/.horizon-memory`.
pub fn resolve_base_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    env::var(DATA_DIR_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_base_dir)
}

/// Everything a host works with after loading a data directory.
pub struct Memory {
    pub records: SharedRecords,
    pub horizon: Horizon,
    pub bridge: StateBridge,
    /// Set when the bridge was evolved across an offline gap on load.
    pub offline: Option<OfflineEvolution>,
}

/// Manages one data directory.
///
/// Layout:
/// ```text
/// ~/.horizon-memory/
/// ├── config.toml
/// ├── records.jsonl      (+ .bak after the first overwrite)
/// ├── horizon.json
/// ├── bridge.json
/// └── emergence.json     (write-once)
/// ```
pub struct Workspace {
    root: PathBuf,
    config: Config,
}

impl Workspace {
    /// Open a data directory, creating it as needed, and load its config.
    /// `base_dir`: override the resolved directory (for testing).
    pub fn open(base_dir: Option<&Path>) -> Result<Self> {
        let root = resolve_base_dir(base_dir);
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        let config = Config::load(&root.join(CONFIG_FILE))?;
        Ok(Self { root, config })
    }

    /// Open with an explicit config instead of `config.toml`.
    pub fn with_config(root: &Path, config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(root).map_err(|e| StoreError::io(root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn records_path(&self) -> PathBuf {
        self.root.join(RECORDS_FILE)
    }

    pub fn horizon_path(&self) -> PathBuf {
        self.root.join(HORIZON_FILE)
    }

    pub fn bridge_path(&self) -> PathBuf {
        self.root.join(BRIDGE_FILE)
    }

    pub fn emergence_path(&self) -> PathBuf {
        self.root.join(EMERGENCE_FILE)
    }

    /// Write the default config if none exists. Returns whether it wrote.
    pub fn write_default_config(&self) -> Result<bool> {
        let path = self.config_path();
        if path.exists() {
            return Ok(false);
        }
        let text = self.config.to_toml()?;
        fs::write(&path, text).map_err(|e| StoreError::io(&path, e))?;
        Ok(true)
    }

    /// Load records, restore the horizon from its snapshot and resync it,
    /// then rebuild the bridge (evolving it across any offline gap).
    pub fn load(&self, now: f64) -> Result<Memory> {
        let store = load_records(&self.records_path(), self.config.dimensions);
        let mut horizon = Horizon::new(self.config.dimensions, self.config.horizon.clone());

        if let Some(snapshot) = load_horizon(&self.horizon_path()) {
            let report = horizon.restore(snapshot, &store);
            tracing::debug!(
                "restored {} quanta ({} dropped)",
                report.restored,
                report.dropped
            );
        }
        if let Some(event) = horizon.sync_all(&store, now) {
            self.record_emergence(&event)?;
        }

        let (bridge, offline) = match load_bridge(&self.bridge_path()) {
            Some(snapshot) => {
                StateBridge::from_persisted(&snapshot, self.config.bridge.clone(), now)
            }
            None => (StateBridge::new(self.config.bridge.clone()), None),
        };
        if let Some(evolution) = &offline {
            tracing::info!(
                "bridge evolved across {:.1}h offline (vacuum {:.3} -> {:.3})",
                evolution.elapsed_hours,
                evolution.vacuum_before,
                evolution.vacuum_after
            );
        }

        Ok(Memory {
            records: SharedRecords::new(store),
            horizon,
            bridge,
            offline,
        })
    }

    /// Save records, horizon snapshot and bridge state.
    pub fn save(&self, memory: &Memory, now: f64) -> Result<()> {
        {
            let store = memory.records.read()?;
            save_records(&self.records_path(), &store, now)?;
        }
        save_horizon(&self.horizon_path(), &memory.horizon.snapshot(now))?;
        save_bridge(&self.bridge_path(), &memory.bridge.to_persisted(now))?;
        Ok(())
    }

    /// Write the emergence marker. Returns false if one was already written.
    pub fn record_emergence(&self, event: &EmergenceEvent) -> Result<bool> {
        let written = write_emergence_marker(&self.emergence_path(), event)?;
        if written {
            tracing::info!("emergence: {}", event.message);
        }
        Ok(written)
    }
}
