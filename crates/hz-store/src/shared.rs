//! Lock-guarded handle to the one canonical record store.
//!
//! Writers (store, forget, activation bookkeeping) hold the write lock for
//! the record and all of its indices at once. Recalls share the read lock.
//! The horizon is not tied to the handle; callers resync it explicitly.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hz_core::{
    CombinedHit, EmergenceEvent, Horizon, LinkOptions, Record, RecordStore, RecordType,
    SimilarityHit,
};

use crate::error::{Result, StoreError};

#[derive(Clone, Debug)]
pub struct SharedRecords {
    inner: Arc<RwLock<RecordStore>>,
}

impl SharedRecords {
    pub fn new(store: RecordStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, RecordStore>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, RecordStore>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    pub fn store(
        &self,
        content: &str,
        vector: Vec<f64>,
        record_type: RecordType,
        weight: f64,
        links: LinkOptions,
        now: f64,
    ) -> Result<String> {
        let mut store = self.write()?;
        Ok(store.store_at(content, vector, record_type, weight, links, now)?)
    }

    pub fn forget(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.write()?.forget(id))
    }

    pub fn record_activation(&self, id: &str, now: f64) -> Result<u32> {
        Ok(self.write()?.record_activation(id, now)?)
    }

    pub fn proustian_recall(&self, query: &[f64], threshold: f64) -> Result<Vec<SimilarityHit>> {
        Ok(self.read()?.proustian_recall(query, threshold))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn recall_combined(
        &self,
        horizon: &mut Horizon,
        query: &str,
        vector: &[f64],
        top_k: usize,
        reach: f64,
        threshold: f64,
        now: f64,
    ) -> Result<Vec<CombinedHit>> {
        let store = self.read()?;
        Ok(horizon.recall_combined_at(&store, query, vector, top_k, reach, threshold, now))
    }

    /// Bring `horizon` in line with the current records.
    pub fn resync(&self, horizon: &mut Horizon, now: f64) -> Result<Option<EmergenceEvent>> {
        let store = self.read()?;
        Ok(horizon.sync_all(&store, now))
    }
}
