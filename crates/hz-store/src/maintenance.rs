//! Periodic upkeep, run by the host's own scheduler.
//!
//! One pass decays stale shallow memories and saves everything. Nothing
//! here spawns or sleeps; the caller decides when a pass happens.

use crate::error::Result;
use crate::workspace::{Memory, Workspace};

#[derive(Clone, Debug, PartialEq)]
pub struct MaintenanceReport {
    pub decayed: Vec<String>,
    pub saved_at: f64,
}

pub struct Maintenance<'a> {
    workspace: &'a Workspace,
}

impl<'a> Maintenance<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }

    pub fn run(&self, memory: &mut Memory, now: f64) -> Result<MaintenanceReport> {
        let schedule = &self.workspace.config().decay;
        let decayed = memory
            .horizon
            .auto_decay(schedule.max_age_hours, schedule.factor, now)?;
        self.workspace.save(memory, now)?;

        if !decayed.is_empty() {
            tracing::info!("maintenance decayed {} memories", decayed.len());
        }
        tracing::debug!("maintenance pass saved at {now}");
        Ok(MaintenanceReport {
            decayed,
            saved_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use hz_core::{LinkOptions, RecordType};
    use tempfile::TempDir;

    const NOW: f64 = 1_700_000_000.0;
    const HOUR: f64 = 3600.0;

    #[test]
    fn test_pass_decays_stale_shallow_and_saves() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            dimensions: 3,
            ..Default::default()
        };
        let ws = Workspace::with_config(dir.path(), config).unwrap();
        let mut memory = ws.load(NOW).unwrap();

        let stale = memory
            .records
            .store(
                "old chatter",
                vec![1.0, 0.0, 0.0],
                RecordType::Dialog,
                0.2,
                LinkOptions::none(),
                NOW - 100.0 * HOUR,
            )
            .unwrap();
        let fresh = memory
            .records
            .store(
                "new chatter",
                vec![0.0, 1.0, 0.0],
                RecordType::Dialog,
                0.2,
                LinkOptions::none(),
                NOW,
            )
            .unwrap();
        let core = memory
            .records
            .store(
                "old but central",
                vec![0.0, 0.0, 1.0],
                RecordType::Memory,
                0.95,
                LinkOptions::none(),
                NOW - 100.0 * HOUR,
            )
            .unwrap();
        memory.records.resync(&mut memory.horizon, NOW).unwrap();
        let before = memory.horizon.curvature(&stale).unwrap();

        let report = Maintenance::new(&ws).run(&mut memory, NOW).unwrap();
        assert_eq!(report.decayed, vec![stale.clone()]);
        assert!(memory.horizon.curvature(&stale).unwrap() > before);
        assert!(!report.decayed.contains(&fresh));
        assert!(!report.decayed.contains(&core));
        assert!(ws.records_path().exists());
        assert!(ws.horizon_path().exists());
        assert!(ws.bridge_path().exists());
    }
}
