//! `config.toml` in the data directory. Every field has a default, so a
//! missing file or a partial one both load.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use hz_core::{BridgeConfig, HorizonParams};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallDefaults {
    pub top_k: usize,
    pub reach: f64,
    /// Cosine threshold for proustian and combined recall.
    pub threshold: f64,
}

impl Default for RecallDefaults {
    fn default() -> Self {
        Self {
            top_k: 5,
            reach: 1.0,
            threshold: 0.5,
        }
    }
}

/// How the host's maintenance task sweeps the horizon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecaySchedule {
    pub max_age_hours: f64,
    pub factor: f64,
    pub interval_secs: u64,
}

impl Default for DecaySchedule {
    fn default() -> Self {
        Self {
            max_age_hours: 48.0,
            factor: 1.2,
            interval_secs: 300,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Record vector width (N).
    pub dimensions: usize,
    pub recall: RecallDefaults,
    pub decay: DecaySchedule,
    pub horizon: HorizonParams,
    pub bridge: BridgeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dimensions: 8,
            recall: RecallDefaults::default(),
            decay: DecaySchedule::default(),
            horizon: HorizonParams::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(StoreError::InvalidData("dimensions must be positive".into()));
        }
        if self.decay.factor <= 1.0 {
            return Err(StoreError::InvalidData(format!(
                "decay.factor must be greater than 1, got {}",
                self.decay.factor
            )));
        }
        if self.recall.reach <= 0.0 {
            return Err(StoreError::InvalidData("recall.reach must be positive".into()));
        }
        if self.horizon.curvature_floor <= 0.0 {
            return Err(StoreError::InvalidData(
                "horizon.curvature_floor must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.bridge.vacuum_floor) {
            return Err(StoreError::InvalidData(
                "bridge.vacuum_floor must be in [0, 1)".into(),
            ));
        }
        if let Some(dim) = self
            .bridge
            .dimensions
            .iter()
            .find(|d| d.relaxation_hours <= 0.0)
        {
            return Err(StoreError::InvalidData(format!(
                "bridge dimension '{}' needs a positive relaxation time",
                dim.name
            )));
        }
        // Names key the persisted bridge state, alongside `<name>_phase`.
        let mut keys = HashSet::new();
        for dim in &self.bridge.dimensions {
            if !keys.insert(dim.name.clone()) || !keys.insert(format!("{}_phase", dim.name)) {
                return Err(StoreError::InvalidData(format!(
                    "bridge dimension '{}' collides with another dimension's name",
                    dim.name
                )));
            }
        }
        Ok(())
    }
}
