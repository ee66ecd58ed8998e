//! File persistence for the horizon memory engine.
//!
//! Owns the data directory: the line-delimited record file, the horizon
//! snapshot, the write-once emergence marker, the bridge state and
//! `config.toml`. All writes go through write-temp, back up, rename.

pub mod config;
pub mod error;
pub mod maintenance;
pub mod record_file;
pub mod shared;
pub mod state;
pub mod workspace;

pub use config::{Config, DecaySchedule, RecallDefaults};
pub use error::{Result, StoreError};
pub use maintenance::{Maintenance, MaintenanceReport};
pub use record_file::{load_records, save_records};
pub use shared::SharedRecords;
pub use workspace::{DATA_DIR_ENV, Memory, Workspace, default_base_dir, resolve_base_dir};
