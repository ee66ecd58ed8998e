use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    DEPTH_DEEP_WEIGHT, DEPTH_MIDDLE_WEIGHT, EPSILON, LATERAL_LINK_THRESHOLD, MAX_LATERAL_LINKS,
    NEUTRAL_SIMILARITY, PARENT_LINK_THRESHOLD, PROUSTIAN_LIMIT,
};
use crate::error::{CoreError, Result};
use crate::time::now_unix;

/// Kind of experience a record came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// Something said in conversation.
    #[default]
    Dialog,
    /// Something read from a document.
    Read,
    /// A consolidated memory.
    Memory,
    /// Bookkeeping about the memory itself; never enters the horizon.
    Meta,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dialog => "dialog",
            Self::Read => "read",
            Self::Memory => "memory",
            Self::Meta => "meta",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "read" => Self::Read,
            "memory" => Self::Memory,
            "meta" => Self::Meta,
            _ => Self::Dialog,
        }
    }
}

/// Abstraction depth. Heavier records sit deeper and are easier to reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Depth {
    Surface = 1,
    Middle = 2,
    Deep = 3,
}

impl Depth {
    pub fn from_weight(weight: f64) -> Self {
        if weight >= DEPTH_DEEP_WEIGHT {
            Self::Deep
        } else if weight >= DEPTH_MIDDLE_WEIGHT {
            Self::Middle
        } else {
            Self::Surface
        }
    }

    /// The next more abstract level, if any.
    pub fn above(self) -> Option<Self> {
        match self {
            Self::Surface => Some(Self::Middle),
            Self::Middle => Some(Self::Deep),
            Self::Deep => None,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Depth {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::Surface),
            2 => Ok(Self::Middle),
            3 => Ok(Self::Deep),
            other => Err(format!("depth out of range: {other}")),
        }
    }
}

impl From<Depth> for u8 {
    fn from(d: Depth) -> u8 {
        d.level()
    }
}

/// Parent/child abstraction links.
#[derive(Clone, Debug, PartialEq)]
pub struct FractalLinks {
    pub depth: Depth,
    pub parent_id: Option<String>,
    pub children_ids: Vec<String>,
}

/// Lateral similarity links and activation bookkeeping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LateralLinks {
    pub linked_ids: Vec<String>,
    pub activation_count: u32,
    pub last_resonance: Option<f64>,
}

/// One stored experience.
#[derive(Clone, Debug)]
pub struct Record {
    pub id: String,
    pub content: String,
    vector: Vec<f64>,
    pub record_type: RecordType,
    pub weight: f64,
    pub time: f64,
    pub fractal: FractalLinks,
    pub resonance: LateralLinks,
    norm: OnceLock<f64>,
}

impl Record {
    pub fn new(
        id: String,
        content: &str,
        vector: Vec<f64>,
        record_type: RecordType,
        weight: f64,
        time: f64,
    ) -> Self {
        Self {
            id,
            content: content.to_string(),
            vector,
            record_type,
            weight,
            time,
            fractal: FractalLinks {
                depth: Depth::from_weight(weight),
                parent_id: None,
                children_ids: Vec::new(),
            },
            resonance: LateralLinks::default(),
            norm: OnceLock::new(),
        }
    }

    pub fn depth(&self) -> Depth {
        self.fractal.depth
    }

    pub fn vector(&self) -> &[f64] {
        &self.vector
    }

    /// Replace the vector in place. Drops the cached norm.
    pub fn set_vector(&mut self, vector: Vec<f64>) {
        self.vector = vector;
        self.norm.take();
    }

    /// Euclidean norm, computed on first use.
    pub fn norm(&self) -> f64 {
        *self.norm.get_or_init(|| l2_norm(&self.vector))
    }

    pub fn is_norm_cached(&self) -> bool {
        self.norm.get().is_some()
    }
}

fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity with a neutral 0.5 when either side has zero norm.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}

fn cosine_with_norms(a: &[f64], norm_a: f64, b: &[f64], norm_b: f64) -> f64 {
    if norm_a < EPSILON || norm_b < EPSILON {
        return NEUTRAL_SIMILARITY;
    }
    let c = dot(a, b) / (norm_a * norm_b);
    if c.is_finite() { c.clamp(-1.0, 1.0) } else { NEUTRAL_SIMILARITY }
}

/// Which automatic links `store` should build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkOptions {
    pub auto_link: bool,
    pub auto_parent: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            auto_link: true,
            auto_parent: true,
        }
    }
}

impl LinkOptions {
    pub fn none() -> Self {
        Self {
            auto_link: false,
            auto_parent: false,
        }
    }
}

/// A cosine-similarity match from proustian recall.
#[derive(Clone, Debug, PartialEq)]
pub struct SimilarityHit {
    pub id: String,
    pub similarity: f64,
    pub weight: f64,
}

/// Population counts, also written into the record file header.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub by_depth: BTreeMap<u8, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub parent_links: usize,
    pub lateral_links: usize,
}

/// Canonical keyed collection of records.
///
/// Records live in one arena vector; `slots` maps ids to arena positions and
/// the depth/type indices hold ids. Every mutation rebuilds or patches the
/// indices in the same `&mut self` call, so a reader holding a shared borrow
/// never sees a record without its index entries.
#[derive(Debug)]
pub struct RecordStore {
    dimensions: usize,
    records: Vec<Record>,
    slots: HashMap<String, usize>,
    by_depth: BTreeMap<Depth, Vec<String>>,
    by_type: BTreeMap<RecordType, Vec<String>>,
}

impl RecordStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            records: Vec::new(),
            slots: HashMap::new(),
            by_depth: BTreeMap::new(),
            by_type: BTreeMap::new(),
        }
    }

    /// Build a store from already-validated records, rebuilding every index
    /// from scratch. Links pointing at ids not in the set are dropped.
    pub fn from_records(dimensions: usize, records: Vec<Record>) -> Self {
        let mut store = Self::new(dimensions);
        store.records = records;
        store.prune_dangling_links();
        store.rebuild_indexes();
        store
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.slots.get(id).map(|&i| &self.records[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn ids_at_depth(&self, depth: Depth) -> &[String] {
        self.by_depth.get(&depth).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids_of_type(&self, record_type: RecordType) -> &[String] {
        self.by_type.get(&record_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parent_of(&self, id: &str) -> Option<&Record> {
        let parent_id = self.get(id)?.fractal.parent_id.as_deref()?;
        self.get(parent_id)
    }

    pub fn children_of(&self, id: &str) -> Vec<&Record> {
        self.get(id)
            .map(|r| {
                r.fractal
                    .children_ids
                    .iter()
                    .filter_map(|c| self.get(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Store a new record timestamped now.
    pub fn store(
        &mut self,
        content: &str,
        vector: Vec<f64>,
        record_type: RecordType,
        weight: f64,
        links: LinkOptions,
    ) -> Result<String> {
        self.store_at(content, vector, record_type, weight, links, now_unix())
    }

    /// Store a new record with an explicit timestamp.
    ///
    /// Rejects a vector of the wrong length before touching anything. Link
    /// candidates are chosen against the records present before this call.
    pub fn store_at(
        &mut self,
        content: &str,
        vector: Vec<f64>,
        record_type: RecordType,
        weight: f64,
        links: LinkOptions,
        now: f64,
    ) -> Result<String> {
        if vector.len() != self.dimensions {
            return Err(CoreError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }

        let id = Uuid::new_v4().to_string();
        let mut record = Record::new(id.clone(), content, vector, record_type, weight, now);

        let parent = if links.auto_parent {
            self.best_parent(&record)
        } else {
            None
        };
        let lateral = if links.auto_link {
            self.lateral_candidates(&record)
        } else {
            Vec::new()
        };

        if let Some(parent_id) = parent {
            let slot = self.slots[&parent_id];
            self.records[slot].fractal.children_ids.push(id.clone());
            record.fractal.parent_id = Some(parent_id);
        }
        for other_id in lateral {
            let slot = self.slots[&other_id];
            self.records[slot].resonance.linked_ids.push(id.clone());
            record.resonance.linked_ids.push(other_id);
        }

        self.slots.insert(id.clone(), self.records.len());
        self.by_depth
            .entry(record.depth())
            .or_default()
            .push(id.clone());
        self.by_type
            .entry(record.record_type)
            .or_default()
            .push(id.clone());
        self.records.push(record);

        Ok(id)
    }

    /// Most similar record one level up, if similar enough.
    fn best_parent(&self, record: &Record) -> Option<String> {
        let above = record.depth().above()?;
        self.ids_at_depth(above)
            .iter()
            .map(|pid| (pid, self.similarity(record, &self.records[self.slots[pid]])))
            .filter(|(_, sim)| *sim >= PARENT_LINK_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(pid, _)| pid.clone())
    }

    /// Up to MAX_LATERAL_LINKS same-depth records, most similar first.
    fn lateral_candidates(&self, record: &Record) -> Vec<String> {
        let mut scored: Vec<(&String, f64)> = self
            .ids_at_depth(record.depth())
            .iter()
            .map(|oid| (oid, self.similarity(record, &self.records[self.slots[oid]])))
            .filter(|(_, sim)| *sim >= LATERAL_LINK_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
            .into_iter()
            .take(MAX_LATERAL_LINKS)
            .map(|(oid, _)| oid.clone())
            .collect()
    }

    fn similarity(&self, a: &Record, b: &Record) -> f64 {
        cosine_with_norms(a.vector(), a.norm(), b.vector(), b.norm())
    }

    /// Cosine retrieval over raw vectors.
    ///
    /// A shorter (legacy-length) query is zero-padded to N, a longer one is
    /// truncated. Matches at or above `threshold` are ordered by weight and
    /// the top PROUSTIAN_LIMIT returned.
    pub fn proustian_recall(&self, query: &[f64], threshold: f64) -> Vec<SimilarityHit> {
        let mut q: Vec<f64> = query.iter().take(self.dimensions).copied().collect();
        q.resize(self.dimensions, 0.0);
        let q_norm = l2_norm(&q);

        let mut hits: Vec<SimilarityHit> = self
            .records
            .iter()
            .filter_map(|r| {
                let similarity = cosine_with_norms(&q, q_norm, r.vector(), r.norm());
                (similarity >= threshold).then(|| SimilarityHit {
                    id: r.id.clone(),
                    similarity,
                    weight: r.weight,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then_with(|| b.similarity.total_cmp(&a.similarity))
        });
        hits.truncate(PROUSTIAN_LIMIT);
        hits
    }

    /// Remove a record and every link that points at it.
    pub fn forget(&mut self, id: &str) -> Option<Record> {
        let slot = *self.slots.get(id)?;
        let removed = self.records.remove(slot);

        for r in &mut self.records {
            if r.fractal.parent_id.as_deref() == Some(id) {
                r.fractal.parent_id = None;
            }
            r.fractal.children_ids.retain(|c| c != id);
            r.resonance.linked_ids.retain(|l| l != id);
        }

        self.rebuild_indexes();
        Some(removed)
    }

    /// Note that a record took part in a successful recall.
    pub fn record_activation(&mut self, id: &str, now: f64) -> Result<u32> {
        let slot = *self
            .slots
            .get(id)
            .ok_or_else(|| CoreError::UnknownRecord(id.to_string()))?;
        let links = &mut self.records[slot].resonance;
        links.activation_count = links.activation_count.saturating_add(1);
        links.last_resonance = Some(now);
        Ok(links.activation_count)
    }

    /// Replace a record's vector. Length is checked like `store`.
    pub fn update_vector(&mut self, id: &str, vector: Vec<f64>) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(CoreError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        let slot = *self
            .slots
            .get(id)
            .ok_or_else(|| CoreError::UnknownRecord(id.to_string()))?;
        self.records[slot].set_vector(vector);
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            total: self.records.len(),
            ..Default::default()
        };
        for (depth, ids) in &self.by_depth {
            stats.by_depth.insert(depth.level(), ids.len());
        }
        for (ty, ids) in &self.by_type {
            stats.by_type.insert(ty.as_str().to_string(), ids.len());
        }
        stats.parent_links = self
            .records
            .iter()
            .filter(|r| r.fractal.parent_id.is_some())
            .count();
        // Each lateral link is stored on both ends
        stats.lateral_links = self
            .records
            .iter()
            .map(|r| r.resonance.linked_ids.len())
            .sum::<usize>()
            / 2;
        stats
    }

    fn rebuild_indexes(&mut self) {
        self.slots.clear();
        self.by_depth.clear();
        self.by_type.clear();
        for (i, r) in self.records.iter().enumerate() {
            self.slots.insert(r.id.clone(), i);
            self.by_depth.entry(r.depth()).or_default().push(r.id.clone());
            self.by_type
                .entry(r.record_type)
                .or_default()
                .push(r.id.clone());
        }
    }

    fn prune_dangling_links(&mut self) {
        let ids: HashSet<String> = self.records.iter().map(|r| r.id.clone()).collect();
        for r in &mut self.records {
            if let Some(pid) = &r.fractal.parent_id
                && !ids.contains(pid)
            {
                r.fractal.parent_id = None;
            }
            r.fractal.children_ids.retain(|c| ids.contains(c));
            r.resonance.linked_ids.retain(|l| ids.contains(l));
        }
    }
}
