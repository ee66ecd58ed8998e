//! Resonance recall over the record store.
//!
//! Every non-meta record gets one oscillator whose curvature encodes how far
//! behind the recall horizon it sits. A query tunnels through that curvature
//! with probability `exp(-curvature / reach)`, so a larger reach searches
//! deeper. The horizon is a derived cache: after the store changes, the host
//! must resync it explicitly.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::constants::{
    BASE_CURVATURE_DEEP, BASE_CURVATURE_MIDDLE, BASE_CURVATURE_SURFACE, CURVATURE_FLOOR,
    EMERGENCE_THRESHOLD, ENERGY_FLOOR, EPSILON, LOW_WEIGHT_THRESHOLD, RECALL_DT, RESONANCE_EPSILON,
    SNAPSHOT_CAP, SNAPSHOT_CONTENT_CHARS,
};
use crate::error::{CoreError, Result};
use crate::oscillator::Oscillator;
use crate::phase::normalize_angle;
use crate::records::{Depth, Record, RecordStore, RecordType};
use crate::time::{hours_between, now_unix};

/// Tunable horizon behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonParams {
    pub curvature_floor: f64,
    pub recall_dt: f64,
    pub resonance_epsilon: f64,
    pub emergence_threshold: usize,
    pub snapshot_cap: usize,
    pub low_weight_threshold: f64,
}

impl Default for HorizonParams {
    fn default() -> Self {
        Self {
            curvature_floor: CURVATURE_FLOOR,
            recall_dt: RECALL_DT,
            resonance_epsilon: RESONANCE_EPSILON,
            emergence_threshold: EMERGENCE_THRESHOLD,
            snapshot_cap: SNAPSHOT_CAP,
            low_weight_threshold: LOW_WEIGHT_THRESHOLD,
        }
    }
}

/// Base curvature by depth. Deeper memories are easier to reach.
pub fn base_curvature(depth: Depth) -> f64 {
    match depth {
        Depth::Surface => BASE_CURVATURE_SURFACE,
        Depth::Middle => BASE_CURVATURE_MIDDLE,
        Depth::Deep => BASE_CURVATURE_DEEP,
    }
}

/// Per-type curvature modifier.
pub fn type_modifier(record_type: RecordType) -> f64 {
    match record_type {
        RecordType::Dialog => 1.0,
        RecordType::Read => 1.2,
        RecordType::Memory => 0.8,
        RecordType::Meta => 1.0,
    }
}

/// `base(depth) × type_mod(type) × 1/(0.5 + weight)`, clamped to `floor`.
pub fn curvature_for(depth: Depth, record_type: RecordType, weight: f64, floor: f64) -> f64 {
    let c = base_curvature(depth) * type_modifier(record_type) / (0.5 + weight.max(0.0));
    c.max(floor)
}

/// One oscillator plus the record facts decay eligibility depends on.
#[derive(Clone, Debug)]
pub struct Quantum {
    pub oscillator: Oscillator,
    pub depth: Depth,
    pub weight: f64,
}

impl Quantum {
    fn decay_eligible(&self, low_weight: f64) -> bool {
        self.depth == Depth::Surface && self.weight < low_weight
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HorizonHit {
    pub id: String,
    pub resonance: f64,
    /// Resonance after tunneling attenuation.
    pub score: f64,
    pub curvature: f64,
    pub energy: f64,
    pub age_secs: f64,
}

/// Fused result of resonance and cosine recall.
#[derive(Clone, Debug, PartialEq)]
pub struct CombinedHit {
    pub id: String,
    pub score: f64,
    pub resonance: Option<f64>,
    pub similarity: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergenceEvent {
    pub timestamp: f64,
    pub quanta_count: usize,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelfQuery {
    pub timestamp: f64,
    pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuantumSnapshot {
    pub id: String,
    pub content: String,
    pub curvature: f64,
    pub energy: f64,
    pub born: f64,
    /// Magnitudes only; phases regenerate from content.
    pub vector: Vec<f64>,
    /// Evolution time replayed onto the regenerated phases.
    #[serde(default)]
    pub evolved: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HorizonSnapshot {
    #[serde(default)]
    pub saved_at: f64,
    #[serde(default)]
    pub emergence_detected: bool,
    #[serde(default)]
    pub quanta: Vec<QuantumSnapshot>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    /// Entries past the cap, or whose record is gone or meta.
    pub dropped: usize,
}

/// Combine horizon and cosine scores.
///
/// An id found by only one method keeps half its score; an id found by both
/// scores the geometric mean, so it ranks highly only when both agree.
pub fn fuse_scores(resonant: &[(String, f64)], cosine: &[(String, f64)]) -> Vec<CombinedHit> {
    let mut merged: BTreeMap<&str, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for (id, s) in resonant {
        merged.entry(id.as_str()).or_default().0 = Some(*s);
    }
    for (id, s) in cosine {
        merged.entry(id.as_str()).or_default().1 = Some(*s);
    }

    let mut hits: Vec<CombinedHit> = merged
        .into_iter()
        .map(|(id, (r, c))| {
            let score = match (r, c) {
                (Some(r), Some(c)) => (r.max(0.0) * c.max(0.0)).sqrt(),
                (Some(s), None) | (None, Some(s)) => 0.5 * s,
                (None, None) => 0.0,
            };
            CombinedHit {
                id: id.to_string(),
                score,
                resonance: r,
                similarity: c,
            }
        })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits
}

#[derive(Clone)]
pub struct Horizon {
    dimensions: usize,
    params: HorizonParams,
    quanta: HashMap<String, Quantum>,
    emergence_detected: bool,
    self_queries: Vec<SelfQuery>,
    global_phase: f64,
}

impl Horizon {
    /// `dimensions` is the record vector length; oscillators carry one extra
    /// sink slot.
    pub fn new(dimensions: usize, params: HorizonParams) -> Self {
        Self {
            dimensions,
            params,
            quanta: HashMap::new(),
            emergence_detected: false,
            self_queries: Vec::new(),
            global_phase: 0.0,
        }
    }

    pub fn params(&self) -> &HorizonParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.quanta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quanta.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.quanta.contains_key(id)
    }

    pub fn quantum(&self, id: &str) -> Option<&Quantum> {
        self.quanta.get(id)
    }

    pub fn curvature(&self, id: &str) -> Option<f64> {
        self.quanta.get(id).map(|q| q.oscillator.curvature)
    }

    pub fn emergence_detected(&self) -> bool {
        self.emergence_detected
    }

    pub fn self_queries(&self) -> &[SelfQuery] {
        &self.self_queries
    }

    pub fn global_phase(&self) -> f64 {
        self.global_phase
    }

    /// Record vector padded (or cut) to N, plus a zero sink slot.
    fn with_sink(&self, vector: &[f64]) -> Vec<f64> {
        let mut v: Vec<f64> = vector.iter().take(self.dimensions).copied().collect();
        v.resize(self.dimensions + 1, 0.0);
        v
    }

    fn build_quantum(&self, record: &Record) -> Quantum {
        let curvature = curvature_for(
            record.depth(),
            record.record_type,
            record.weight,
            self.params.curvature_floor,
        );
        Quantum {
            oscillator: Oscillator::new(
                &record.content,
                &self.with_sink(record.vector()),
                curvature,
                record.time,
            ),
            depth: record.depth(),
            weight: record.weight,
        }
    }

    /// Replace the oscillator for one record. Meta records are removed instead.
    pub fn sync_from_record(&mut self, record: &Record, now: f64) -> Option<EmergenceEvent> {
        if record.record_type == RecordType::Meta {
            self.quanta.remove(&record.id);
            return None;
        }
        let quantum = self.build_quantum(record);
        self.quanta.insert(record.id.clone(), quantum);
        self.check_emergence(now)
    }

    /// Full resync against the store: add missing oscillators, drop those
    /// whose record is gone or meta. Existing oscillators keep their
    /// (possibly reinforced) curvature.
    pub fn sync_all(&mut self, store: &RecordStore, now: f64) -> Option<EmergenceEvent> {
        self.quanta.retain(|id, _| {
            store
                .get(id)
                .is_some_and(|r| r.record_type != RecordType::Meta)
        });
        for record in store.iter() {
            if record.record_type == RecordType::Meta || self.quanta.contains_key(&record.id) {
                continue;
            }
            let quantum = self.build_quantum(record);
            self.quanta.insert(record.id.clone(), quantum);
        }
        self.check_emergence(now)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.quanta.remove(id).is_some()
    }

    fn check_emergence(&mut self, now: f64) -> Option<EmergenceEvent> {
        let count = self.quanta.len();
        if self.emergence_detected || count < self.params.emergence_threshold {
            return None;
        }
        self.emergence_detected = true;
        let message = format!(
            "{count} memories now resonate together. What pattern connects them?"
        );
        self.self_queries.push(SelfQuery {
            timestamp: now,
            text: message.clone(),
        });
        Some(EmergenceEvent {
            timestamp: now,
            quanta_count: count,
            message,
        })
    }

    pub fn recall(
        &mut self,
        query: &str,
        vector: &[f64],
        top_k: usize,
        reach: f64,
    ) -> Vec<HorizonHit> {
        self.recall_at(query, vector, top_k, reach, now_unix())
    }

    /// Resonance recall. Each stored oscillator evolves by one recall step,
    /// then its resonance with an ephemeral query oscillator is attenuated
    /// by `exp(-curvature / reach)`.
    pub fn recall_at(
        &mut self,
        query: &str,
        vector: &[f64],
        top_k: usize,
        reach: f64,
        now: f64,
    ) -> Vec<HorizonHit> {
        let probe = Oscillator::new(query, &self.with_sink(vector), 0.0, now);
        let reach = reach.max(EPSILON);
        let dt = self.params.recall_dt;
        let epsilon = self.params.resonance_epsilon;

        let mut hits: Vec<HorizonHit> = self
            .quanta
            .iter_mut()
            .filter_map(|(id, q)| {
                let osc = &mut q.oscillator;
                osc.evolve(dt, now);
                let resonance = probe.resonance_with(osc);
                let score = resonance * (-osc.curvature / reach).exp();
                (score > epsilon).then(|| HorizonHit {
                    id: id.clone(),
                    resonance,
                    score,
                    curvature: osc.curvature,
                    energy: osc.energy,
                    age_secs: (now - osc.born).max(0.0),
                })
            })
            .collect();

        self.global_phase = normalize_angle(self.global_phase + dt * TAU);

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(top_k);
        hits
    }

    #[allow(clippy::too_many_arguments)]
    pub fn recall_combined_at(
        &mut self,
        store: &RecordStore,
        query: &str,
        vector: &[f64],
        top_k: usize,
        reach: f64,
        threshold: f64,
        now: f64,
    ) -> Vec<CombinedHit> {
        let resonant: Vec<(String, f64)> = self
            .recall_at(query, vector, top_k, reach, now)
            .into_iter()
            .map(|h| (h.id, h.score))
            .collect();
        let cosine: Vec<(String, f64)> = store
            .proustian_recall(vector, threshold)
            .into_iter()
            .map(|h| (h.id, h.similarity))
            .collect();

        let mut fused = fuse_scores(&resonant, &cosine);
        fused.truncate(top_k);
        fused
    }

    pub fn recall_combined(
        &mut self,
        store: &RecordStore,
        query: &str,
        vector: &[f64],
        top_k: usize,
        reach: f64,
        threshold: f64,
    ) -> Vec<CombinedHit> {
        self.recall_combined_at(store, query, vector, top_k, reach, threshold, now_unix())
    }

    /// Make a memory easier to reach. Never goes below the curvature floor.
    pub fn reinforce(&mut self, id: &str, factor: f64) -> Result<f64> {
        if !(factor > 0.0 && factor < 1.0) {
            return Err(CoreError::InvalidFactor {
                factor,
                expected: "between 0 and 1",
            });
        }
        let floor = self.params.curvature_floor;
        let q = self
            .quanta
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownRecord(id.to_string()))?;
        q.oscillator.curvature = (q.oscillator.curvature * factor).max(floor);
        Ok(q.oscillator.curvature)
    }

    /// Push a shallow, low-weight memory further behind the horizon.
    /// Returns false when the record is not eligible.
    pub fn decay(&mut self, id: &str, factor: f64) -> Result<bool> {
        check_decay_factor(factor)?;
        let low_weight = self.params.low_weight_threshold;
        let q = self
            .quanta
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownRecord(id.to_string()))?;
        if !q.decay_eligible(low_weight) {
            return Ok(false);
        }
        q.oscillator.curvature *= factor;
        Ok(true)
    }

    /// Decay every eligible quantum older than `max_age_hours`. Returns the
    /// ids touched, sorted.
    pub fn auto_decay(&mut self, max_age_hours: f64, factor: f64, now: f64) -> Result<Vec<String>> {
        check_decay_factor(factor)?;
        let low_weight = self.params.low_weight_threshold;
        let mut touched: Vec<String> = self
            .quanta
            .iter_mut()
            .filter(|(_, q)| {
                let age_hours = hours_between(q.oscillator.born, now);
                q.decay_eligible(low_weight) && age_hours > max_age_hours
            })
            .map(|(id, q)| {
                q.oscillator.curvature *= factor;
                id.clone()
            })
            .collect();
        touched.sort();
        Ok(touched)
    }

    pub fn snapshot(&self, now: f64) -> HorizonSnapshot {
        let mut quanta: Vec<QuantumSnapshot> = self
            .quanta
            .iter()
            .map(|(id, q)| QuantumSnapshot {
                id: id.clone(),
                content: q
                    .oscillator
                    .content
                    .chars()
                    .take(SNAPSHOT_CONTENT_CHARS)
                    .collect(),
                curvature: q.oscillator.curvature,
                energy: q.oscillator.energy,
                born: q.oscillator.born,
                vector: q.oscillator.magnitudes(),
                evolved: q.oscillator.evolved,
            })
            .collect();
        quanta.sort_by(|a, b| a.born.total_cmp(&b.born).then_with(|| a.id.cmp(&b.id)));
        HorizonSnapshot {
            saved_at: now,
            emergence_detected: self.emergence_detected,
            quanta,
        }
    }

    /// Restore curvature and energy from a snapshot, newest entries first up
    /// to the cap. Only ids still present (and non-meta) in the store come
    /// back; the caller follows with `sync_all` to fill any gaps.
    pub fn restore(&mut self, snapshot: HorizonSnapshot, store: &RecordStore) -> RestoreReport {
        self.emergence_detected |= snapshot.emergence_detected;

        let mut entries = snapshot.quanta;
        entries.sort_by(|a, b| b.born.total_cmp(&a.born));
        let mut report = RestoreReport {
            dropped: entries.len().saturating_sub(self.params.snapshot_cap),
            ..Default::default()
        };
        entries.truncate(self.params.snapshot_cap);

        for entry in entries {
            let Some(record) = store
                .get(&entry.id)
                .filter(|r| r.record_type != RecordType::Meta)
            else {
                report.dropped += 1;
                continue;
            };
            let curvature = entry.curvature.max(self.params.curvature_floor);
            let mut oscillator = if entry.vector.len() == self.dimensions + 1 {
                Oscillator::from_magnitudes(
                    &record.content,
                    &entry.vector,
                    curvature,
                    entry.energy,
                    entry.born,
                )
            } else {
                let mut osc = Oscillator::new(
                    &record.content,
                    &self.with_sink(record.vector()),
                    curvature,
                    entry.born,
                );
                osc.energy = entry.energy.clamp(ENERGY_FLOOR, 1.0);
                osc
            };
            if entry.evolved > 0.0 {
                oscillator.advance(entry.evolved);
            }
            self.quanta.insert(
                entry.id,
                Quantum {
                    oscillator,
                    depth: record.depth(),
                    weight: record.weight,
                },
            );
            report.restored += 1;
        }
        report
    }
}

fn check_decay_factor(factor: f64) -> Result<()> {
    if factor > 1.0 && factor.is_finite() {
        Ok(())
    } else {
        Err(CoreError::InvalidFactor {
            factor,
            expected: "greater than 1",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::LinkOptions;
    use approx::assert_relative_eq;

    const N: usize = 4;
    const HOUR: f64 = crate::time::SECS_PER_HOUR;

    fn params() -> HorizonParams {
        HorizonParams::default()
    }

    fn populated() -> (RecordStore, Horizon, Vec<String>) {
        let mut store = RecordStore::new(N);
        let ids = vec![
            store
                .store_at(
                    "deep anchor",
                    vec![0.0, 0.0, 0.0, 1.0],
                    RecordType::Memory,
                    0.95,
                    LinkOptions::none(),
                    0.0,
                )
                .unwrap(),
            store
                .store_at(
                    "middle ground",
                    vec![0.0, 1.0, 0.0, 0.0],
                    RecordType::Read,
                    0.7,
                    LinkOptions::none(),
                    0.0,
                )
                .unwrap(),
            store
                .store_at(
                    "passing remark",
                    vec![1.0, 0.0, 0.0, 0.0],
                    RecordType::Dialog,
                    0.3,
                    LinkOptions::none(),
                    0.0,
                )
                .unwrap(),
        ];
        let mut horizon = Horizon::new(N, params());
        horizon.sync_all(&store, 0.0);
        (store, horizon, ids)
    }

    #[test]
    fn test_curvature_monotonic_in_depth() {
        let s = curvature_for(Depth::Surface, RecordType::Dialog, 0.5, 0.0);
        let m = curvature_for(Depth::Middle, RecordType::Dialog, 0.5, 0.0);
        let d = curvature_for(Depth::Deep, RecordType::Dialog, 0.5, 0.0);
        assert!(s > m && m > d);
        assert_relative_eq!(s, 1.2);
        assert_relative_eq!(curvature_for(Depth::Deep, RecordType::Memory, 10.0, 0.05), 0.05);
    }

    #[test]
    fn test_sync_skips_meta() {
        let mut store = RecordStore::new(N);
        let meta = store
            .store_at(
                "meta note",
                vec![1.0, 0.0, 0.0, 0.0],
                RecordType::Meta,
                0.5,
                LinkOptions::none(),
                0.0,
            )
            .unwrap();
        let mut horizon = Horizon::new(N, params());
        horizon.sync_all(&store, 0.0);
        assert!(!horizon.contains(&meta));
        assert!(horizon.sync_from_record(store.get(&meta).unwrap(), 0.0).is_none());
        assert!(horizon.is_empty());
    }

    #[test]
    fn test_oscillators_carry_sink_slot() {
        let (_, horizon, ids) = populated();
        let q = horizon.quantum(&ids[0]).unwrap();
        assert_eq!(q.oscillator.dimensions(), N + 1);
        assert_eq!(q.oscillator.magnitudes()[N], 0.0);
    }

    #[test]
    fn test_recall_exact_content_first() {
        let (_, mut horizon, ids) = populated();
        let hits = horizon.recall_at("deep anchor", &[0.0, 0.0, 0.0, 1.0], 3, 1.0, 0.0);
        assert_eq!(hits[0].id, ids[0]);
        assert!(hits[0].resonance > 0.99);
        assert!(hits.iter().all(|h| h.score <= h.resonance));
    }

    #[test]
    fn test_reach_deepens_search() {
        let (_, mut shallow, ids) = populated();
        let mut deep = shallow.clone();
        let v = [1.0, 0.0, 0.0, 0.0];
        let near = shallow.recall_at("passing remark", &v, 3, 0.2, 0.0);
        let far = deep.recall_at("passing remark", &v, 3, 5.0, 0.0);
        let score = |hits: &[HorizonHit]| {
            hits.iter()
                .find(|h| h.id == ids[2])
                .map(|h| h.score)
                .unwrap_or(0.0)
        };
        assert!(score(&far) > score(&near));
    }

    #[test]
    fn test_recall_advances_global_phase() {
        let (_, mut horizon, _) = populated();
        horizon.recall_at("q", &[0.1; N], 1, 1.0, 0.0);
        assert!(horizon.global_phase() > 0.0);
    }

    #[test]
    fn test_reinforce_never_below_floor() {
        let (_, mut horizon, ids) = populated();
        for _ in 0..200 {
            let c = horizon.reinforce(&ids[2], 0.5).unwrap();
            assert!(c >= CURVATURE_FLOOR);
        }
        assert_relative_eq!(horizon.curvature(&ids[2]).unwrap(), CURVATURE_FLOOR);
    }

    #[test]
    fn test_reinforce_rejects_bad_factor() {
        let (_, mut horizon, ids) = populated();
        assert!(matches!(
            horizon.reinforce(&ids[0], 1.5),
            Err(CoreError::InvalidFactor { .. })
        ));
        assert!(matches!(
            horizon.reinforce("missing", 0.5),
            Err(CoreError::UnknownRecord(_))
        ));
    }

    #[test]
    fn test_decay_only_shallow_low_weight() {
        let (_, mut horizon, ids) = populated();
        let before: Vec<f64> = ids.iter().map(|id| horizon.curvature(id).unwrap()).collect();
        assert!(!horizon.decay(&ids[0], 2.0).unwrap());
        assert!(!horizon.decay(&ids[1], 2.0).unwrap());
        assert!(horizon.decay(&ids[2], 2.0).unwrap());
        assert_relative_eq!(horizon.curvature(&ids[0]).unwrap(), before[0]);
        assert_relative_eq!(horizon.curvature(&ids[2]).unwrap(), before[2] * 2.0);
        assert!(horizon.decay(&ids[2], 0.5).is_err());
    }

    #[test]
    fn test_auto_decay_respects_age() {
        let (_, mut horizon, ids) = populated();
        let young = horizon.auto_decay(48.0, 1.5, 24.0 * HOUR).unwrap();
        assert!(young.is_empty());
        let old = horizon.auto_decay(48.0, 1.5, 72.0 * HOUR).unwrap();
        assert_eq!(old, vec![ids[2].clone()]);
    }

    #[test]
    fn test_emergence_fires_once() {
        let mut store = RecordStore::new(N);
        let mut horizon = Horizon::new(
            N,
            HorizonParams {
                emergence_threshold: 3,
                ..params()
            },
        );
        let mut events = Vec::new();
        for i in 0..5 {
            let id = store
                .store_at(
                    &format!("m{i}"),
                    vec![0.25; N],
                    RecordType::Dialog,
                    0.3,
                    LinkOptions::none(),
                    0.0,
                )
                .unwrap();
            if let Some(e) = horizon.sync_from_record(store.get(&id).unwrap(), i as f64) {
                events.push(e);
            }
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].quanta_count, 3);
        assert!(horizon.emergence_detected());
        assert_eq!(horizon.self_queries().len(), 1);
        assert!(horizon.sync_all(&store, 10.0).is_none());
    }

    #[test]
    fn test_fuse_scores_geometric_mean() {
        let resonant = vec![("a".to_string(), 0.64), ("b".to_string(), 0.5)];
        let cosine = vec![("a".to_string(), 1.0), ("c".to_string(), 0.9)];
        let fused = fuse_scores(&resonant, &cosine);
        assert_eq!(fused[0].id, "a");
        assert_relative_eq!(fused[0].score, 0.8);
        let c = fused.iter().find(|h| h.id == "c").unwrap();
        assert_relative_eq!(c.score, 0.45);
        assert_eq!(c.resonance, None);
        let b = fused.iter().find(|h| h.id == "b").unwrap();
        assert_relative_eq!(b.score, 0.25);
    }

    #[test]
    fn test_fused_agreement_ranks_at_or_above_individual_ranks() {
        let resonant = vec![
            ("x".to_string(), 0.9),
            ("both".to_string(), 0.7),
            ("y".to_string(), 0.6),
        ];
        let cosine = vec![
            ("z".to_string(), 0.95),
            ("both".to_string(), 0.8),
            ("w".to_string(), 0.5),
        ];
        let rank = |list: &[(String, f64)]| list.iter().position(|(id, _)| id == "both").unwrap();
        let fused = fuse_scores(&resonant, &cosine);
        let fused_rank = fused.iter().position(|h| h.id == "both").unwrap();
        assert!(fused_rank <= rank(&resonant));
        assert!(fused_rank <= rank(&cosine));
    }

    #[test]
    fn test_combined_recall_wall_clock() {
        let (store, mut horizon, ids) = populated();
        let hits = horizon.recall_combined(&store, "passing", &[1.0, 0.0, 0.0, 0.0], 3, 1.0, 0.5);
        assert_eq!(hits[0].id, ids[2]);
        assert_eq!(hits[0].similarity, Some(1.0));
    }

    #[test]
    fn test_snapshot_restore_keeps_curvature() {
        let (store, mut horizon, ids) = populated();
        horizon.reinforce(&ids[2], 0.5).unwrap();
        let reinforced = horizon.curvature(&ids[2]).unwrap();

        let snap = horizon.snapshot(10.0);
        assert_eq!(snap.quanta.len(), 3);
        assert_eq!(snap.quanta[0].vector.len(), N + 1);

        let mut restored = Horizon::new(N, params());
        let report = restored.restore(snap, &store);
        assert_eq!(report.restored, 3);
        assert_relative_eq!(restored.curvature(&ids[2]).unwrap(), reinforced);

        // A full sync afterwards keeps the restored curvature
        restored.sync_all(&store, 10.0);
        assert_relative_eq!(restored.curvature(&ids[2]).unwrap(), reinforced);
    }

    #[test]
    fn test_restore_replays_recall_evolution() {
        let (store, mut horizon, _) = populated();
        let query = [0.3, 0.3, 0.2, 0.2];
        for _ in 0..12 {
            horizon.recall_at("mornings", &query, 3, 1.0, 5.0);
        }
        let snap = horizon.snapshot(5.0);
        assert!(snap.quanta.iter().all(|q| q.evolved > 0.0));

        let mut restored = Horizon::new(N, params());
        restored.restore(snap, &store);
        let live = horizon.recall_at("mornings", &query, 3, 1.0, 5.0);
        let again = restored.recall_at("mornings", &query, 3, 1.0, 5.0);
        assert_eq!(live.len(), again.len());
        for (a, b) in live.iter().zip(&again) {
            assert_eq!(a.id, b.id);
            assert_relative_eq!(a.score, b.score, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_restore_caps_to_most_recent() {
        let mut store = RecordStore::new(N);
        let mut horizon = Horizon::new(N, params());
        for i in 0..6 {
            let id = store
                .store_at(
                    &format!("r{i}"),
                    vec![0.25; N],
                    RecordType::Dialog,
                    0.3,
                    LinkOptions::none(),
                    i as f64,
                )
                .unwrap();
            horizon.sync_from_record(store.get(&id).unwrap(), 0.0);
        }
        let snap = horizon.snapshot(0.0);
        let mut capped = Horizon::new(
            N,
            HorizonParams {
                snapshot_cap: 4,
                ..params()
            },
        );
        let report = capped.restore(snap, &store);
        assert_eq!(report, RestoreReport { restored: 4, dropped: 2 });
        let oldest = store.iter().next().unwrap();
        assert!(!capped.contains(&oldest.id));
    }
}
