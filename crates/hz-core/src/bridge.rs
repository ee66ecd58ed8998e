//! State bridge: the agent's external state vector as a complex state.
//!
//! N named dimensions plus one reserved vacuum dimension that holds whatever
//! probability no named axis claims. Total probability over all N+1
//! components is 1 after every public mutation.
//!
//! The bridge survives process restarts separated by unknown wall-clock
//! time. On save, magnitudes and phases are stored relative to a reference
//! dimension; on load, the state relaxes toward its last predicted
//! trajectory and leaks magnitude into the vacuum in proportion to the
//! elapsed time.

use std::collections::{BTreeMap, VecDeque};
use std::f64::consts::{PI, TAU};

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::constants::{
    BRIDGE_EPSILON, BRIDGE_HISTORY, DRIFT_WINDOW, EPSILON, KURAMOTO_COUPLING,
    OFFLINE_THRESHOLD_SECS, RANK_DISCOUNT, STRUCTURAL_RELAXATION_HOURS, TRAJECTORY_GAIN,
    VACUUM_FLOOR, VACUUM_LEAK, VOLATILE_RELAXATION_HOURS,
};
use crate::error::{CoreError, Result};
use crate::phase::{normalize_angle, seeded_phases, slerp_angle, wrap_pi};
use crate::time::SECS_PER_HOUR;

const VACUUM_NAME: &str = "vacuum";
const PHASE_SUFFIX: &str = "_phase";

/// One named external dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    /// Volatile dimensions relax quickly and never serve as the reference.
    #[serde(default)]
    pub volatile: bool,
    #[serde(default = "default_relaxation_hours")]
    pub relaxation_hours: f64,
}

fn default_relaxation_hours() -> f64 {
    STRUCTURAL_RELAXATION_HOURS
}

impl DimensionSpec {
    pub fn volatile(name: &str) -> Self {
        Self {
            name: name.to_string(),
            volatile: true,
            relaxation_hours: VOLATILE_RELAXATION_HOURS,
        }
    }

    pub fn structural(name: &str) -> Self {
        Self {
            name: name.to_string(),
            volatile: false,
            relaxation_hours: STRUCTURAL_RELAXATION_HOURS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub history: usize,
    pub epsilon: f64,
    /// Floor on the vacuum's squared magnitude, applied on every external
    /// sync before renormalizing.
    pub vacuum_floor: f64,
    pub offline_threshold_secs: f64,
    /// Fraction of magnitude leaked to the vacuum per relaxation time.
    pub vacuum_leak: f64,
    pub rank_discount: f64,
    pub coupling: f64,
    pub dimensions: Vec<DimensionSpec>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let dimensions = ["valence", "arousal", "curiosity", "focus"]
            .into_iter()
            .map(DimensionSpec::volatile)
            .chain(
                ["trust", "coherence", "identity", "warmth"]
                    .into_iter()
                    .map(DimensionSpec::structural),
            )
            .collect();
        Self {
            history: BRIDGE_HISTORY,
            epsilon: BRIDGE_EPSILON,
            vacuum_floor: VACUUM_FLOOR,
            offline_threshold_secs: OFFLINE_THRESHOLD_SECS,
            vacuum_leak: VACUUM_LEAK,
            rank_discount: RANK_DISCOUNT,
            coupling: KURAMOTO_COUPLING,
            dimensions,
        }
    }
}

/// Phase evolution applied by `process_interference`.
///
/// Implementations see only the named dimensions. They must keep
/// Σ|a|² unchanged and reduce to the identity as `dt → 0`.
pub trait PhaseRule: Send + Sync {
    fn apply(&self, amplitudes: &mut [Complex64], dt: f64);
}

/// Mean-field (Kuramoto) coupling: each phase advances at its natural
/// frequency `|a|·2π` and is pulled toward the magnitude-weighted mean phase.
/// Magnitudes are never touched.
#[derive(Clone, Copy, Debug)]
pub struct KuramotoRule {
    pub coupling: f64,
}

impl Default for KuramotoRule {
    fn default() -> Self {
        Self {
            coupling: KURAMOTO_COUPLING,
        }
    }
}

impl PhaseRule for KuramotoRule {
    fn apply(&self, amplitudes: &mut [Complex64], dt: f64) {
        let total: f64 = amplitudes.iter().map(|a| a.norm()).sum();
        if total < EPSILON {
            return;
        }
        let field = amplitudes.iter().sum::<Complex64>() / total;
        let (order, mean_phase) = field.to_polar();

        for a in amplitudes.iter_mut() {
            let (r, theta) = a.to_polar();
            let omega = r * TAU;
            let pull = self.coupling * order * (mean_phase - theta).sin();
            *a = Complex64::from_polar(r, normalize_angle(theta + dt * (omega + pull)));
        }
    }
}

/// Near-term prediction of the named dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    pub probabilities: Vec<f64>,
    pub phases: Vec<f64>,
    /// `1 − drift/π` per dimension, 1 when no history is available.
    pub stability: Vec<f64>,
}

/// An externally scored retrieval candidate.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub id: String,
    pub content: String,
    /// Score from the caller's own ranking; candidates arrive sorted by it.
    pub classical: f64,
    pub weight: f64,
    /// The candidate's state over the named dimensions.
    pub vector: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankedCandidate {
    pub id: String,
    pub score: f64,
    /// False for candidates past the rescored window.
    pub rescored: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DimInterference {
    #[serde(default)]
    pub rel_magnitude: Option<f64>,
    #[serde(default)]
    pub rel_phase: Option<f64>,
    #[serde(default)]
    pub abs_magnitude: Option<f64>,
}

/// Persisted bridge state. Every field defaults when absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeSnapshot {
    #[serde(default)]
    pub ref_dim: Option<String>,
    #[serde(default)]
    pub interferences: BTreeMap<String, DimInterference>,
    /// `{dim: probability, dim + "_phase": phase}`
    #[serde(default)]
    pub predicted_trajectory: BTreeMap<String, f64>,
    #[serde(default)]
    pub entropy: f64,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// What happened to a reloaded bridge across the offline gap.
#[derive(Clone, Debug, PartialEq)]
pub struct OfflineEvolution {
    pub elapsed_hours: f64,
    pub vacuum_before: f64,
    pub vacuum_after: f64,
    /// Probability change per named dimension.
    pub shifts: Vec<(String, f64)>,
}

pub struct StateBridge {
    config: BridgeConfig,
    /// Named dimensions in config order, vacuum last.
    amplitudes: Vec<Complex64>,
    history: VecDeque<Vec<f64>>,
    trajectory: Option<Trajectory>,
    rule: Box<dyn PhaseRule>,
}

impl StateBridge {
    pub fn new(config: BridgeConfig) -> Self {
        let rule = KuramotoRule {
            coupling: config.coupling,
        };
        Self::with_rule(config, Box::new(rule))
    }

    /// Uniform probability over all N+1 components, phases seeded from the
    /// dimension names.
    pub fn with_rule(config: BridgeConfig, rule: Box<dyn PhaseRule>) -> Self {
        let m = 1.0 / ((config.dimensions.len() + 1) as f64).sqrt();
        let amplitudes = config
            .dimensions
            .iter()
            .map(|d| d.name.as_str())
            .chain(std::iter::once(VACUUM_NAME))
            .map(|name| Complex64::from_polar(m, name_phase(name)))
            .collect();
        Self {
            config,
            amplitudes,
            history: VecDeque::new(),
            trajectory: None,
            rule,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.config.dimensions.iter().map(|d| d.name.as_str())
    }

    fn named(&self) -> usize {
        self.config.dimensions.len()
    }

    /// Probabilities for all N+1 components, vacuum last.
    pub fn probabilities(&self) -> Vec<f64> {
        self.amplitudes.iter().map(|a| a.norm_sqr()).collect()
    }

    pub fn phases(&self) -> Vec<f64> {
        self.amplitudes
            .iter()
            .map(|a| normalize_angle(a.arg()))
            .collect()
    }

    pub fn vacuum_probability(&self) -> f64 {
        self.amplitudes[self.named()].norm_sqr()
    }

    pub fn total_probability(&self) -> f64 {
        self.amplitudes.iter().map(|a| a.norm_sqr()).sum()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn trajectory(&self) -> Option<&Trajectory> {
        self.trajectory.as_ref()
    }

    /// Shannon entropy (nats) over all N+1 probabilities.
    pub fn entropy(&self) -> f64 {
        self.amplitudes
            .iter()
            .map(|a| a.norm_sqr())
            .filter(|p| *p > EPSILON)
            .map(|p| -p * p.ln())
            .sum()
    }

    fn normalize(&mut self) {
        let norm = self.total_probability().sqrt();
        if norm > EPSILON {
            for a in &mut self.amplitudes {
                *a /= norm;
            }
        } else if let Some(vacuum) = self.amplitudes.last_mut() {
            *vacuum = Complex64::from_polar(1.0, vacuum.arg());
        }
    }

    /// Drive named magnitudes from an external vector, keeping phases.
    pub fn sync_from_external(&mut self, values: &[f64]) -> Result<()> {
        let n = self.named();
        if values.len() != n {
            return Err(CoreError::DimensionMismatch {
                expected: n,
                got: values.len(),
            });
        }
        for (a, v) in self.amplitudes.iter_mut().zip(values) {
            let m = v.max(0.0).sqrt() + self.config.epsilon;
            *a = Complex64::from_polar(m, a.arg());
        }
        let vacuum = self.amplitudes[n];
        let floor = self.config.vacuum_floor.max(0.0).sqrt();
        self.amplitudes[n] = Complex64::from_polar(vacuum.norm().max(floor), vacuum.arg());
        self.normalize();
        Ok(())
    }

    /// Write `|a_i|²` for the named dimensions into `out`, clamped to [0, 1].
    pub fn sync_to_external(&self, out: &mut [f64]) {
        for (slot, a) in out.iter_mut().zip(&self.amplitudes[..self.named()]) {
            *slot = a.norm_sqr().clamp(0.0, 1.0);
        }
    }

    pub fn external_vector(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.named()];
        self.sync_to_external(&mut out);
        out
    }

    /// One interference step over the named dimensions. The vacuum is held
    /// aside while the phase rule runs. Returns the phase order parameter
    /// in [0, 1].
    pub fn process_interference(&mut self, dt: f64, external: &mut [f64]) -> f64 {
        let n = self.named();
        let vacuum = self.amplitudes[n];
        self.rule.apply(&mut self.amplitudes[..n], dt);
        self.amplitudes[n] = vacuum;
        self.normalize();

        let snapshot: Vec<f64> = self.amplitudes[..n]
            .iter()
            .map(|a| normalize_angle(a.arg()))
            .collect();
        self.history.push_back(snapshot);
        while self.history.len() > self.config.history.max(1) {
            self.history.pop_front();
        }

        self.sync_to_external(external);
        self.order_parameter()
    }

    fn order_parameter(&self) -> f64 {
        let n = self.named();
        if n == 0 {
            return 0.0;
        }
        let sum: Complex64 = self.amplitudes[..n]
            .iter()
            .map(|a| Complex64::from_polar(1.0, a.arg()))
            .sum();
        (sum.norm() / n as f64).clamp(0.0, 1.0)
    }

    fn compute_trajectory(&self) -> Trajectory {
        let n = self.named();
        let probabilities: Vec<f64> = self.amplitudes[..n].iter().map(|a| a.norm_sqr()).collect();
        let phases: Vec<f64> = self.amplitudes[..n]
            .iter()
            .map(|a| normalize_angle(a.arg()))
            .collect();

        let window: Vec<&Vec<f64>> = self
            .history
            .iter()
            .skip(self.history.len().saturating_sub(DRIFT_WINDOW))
            .collect();
        if window.len() < 2 {
            return Trajectory {
                probabilities,
                phases,
                stability: vec![1.0; n],
            };
        }

        let steps = (window.len() - 1) as f64;
        let mut stability = Vec::with_capacity(n);
        let mut predicted_phases = Vec::with_capacity(n);
        for i in 0..n {
            let diffs: Vec<f64> = window
                .windows(2)
                .map(|pair| wrap_pi(pair[1][i] - pair[0][i]))
                .collect();
            let drift = diffs.iter().map(|d| d.abs()).sum::<f64>() / steps;
            let signed = diffs.iter().sum::<f64>() / steps;
            stability.push((1.0 - drift / PI).clamp(0.0, 1.0));
            predicted_phases.push(normalize_angle(phases[i] + signed));
        }

        let total: f64 = probabilities.iter().sum();
        let mut boosted: Vec<f64> = probabilities
            .iter()
            .zip(&stability)
            .map(|(p, s)| p * (1.0 + s * TRAJECTORY_GAIN))
            .collect();
        let boosted_total: f64 = boosted.iter().sum();
        if boosted_total > EPSILON {
            for p in &mut boosted {
                *p *= total / boosted_total;
            }
        }

        Trajectory {
            probabilities: boosted,
            phases: predicted_phases,
            stability,
        }
    }

    /// Predict the named dimensions from recent phase drift. The predicted
    /// probabilities sum to the same total as the current named ones.
    pub fn predict_trajectory(&mut self) -> Trajectory {
        let trajectory = self.compute_trajectory();
        self.trajectory = Some(trajectory.clone());
        trajectory
    }

    /// Re-rank candidates against the current state. The first `top_n` are
    /// rescored with resonance, trajectory fit and phase alignment; the rest
    /// keep a discounted classical score. Nothing is dropped.
    pub fn rank_candidates(&self, candidates: &[Candidate], top_n: usize) -> Vec<RankedCandidate> {
        let n = self.named();
        let current = unit_sum(
            &self.amplitudes[..n]
                .iter()
                .map(|a| a.norm_sqr())
                .collect::<Vec<_>>(),
        );
        let predicted = unit_sum(
            &self
                .trajectory
                .clone()
                .unwrap_or_else(|| self.compute_trajectory())
                .probabilities,
        );
        let state_phases: Vec<f64> = self.amplitudes[..n].iter().map(|a| a.arg()).collect();
        let max_classical = candidates
            .iter()
            .map(|c| c.classical)
            .fold(0.0_f64, f64::max);
        let scale = |classical: f64| {
            if max_classical > EPSILON {
                classical.max(0.0) / max_classical
            } else {
                0.0
            }
        };

        let mut ranked: Vec<RankedCandidate> = candidates
            .iter()
            .enumerate()
            .map(|(rank, c)| {
                let boost = 0.5 + c.weight;
                let classical = scale(c.classical);
                if rank >= top_n {
                    return RankedCandidate {
                        id: c.id.clone(),
                        score: self.config.rank_discount * classical * boost,
                        rescored: false,
                    };
                }
                let mut padded: Vec<f64> = c.vector.iter().take(n).copied().collect();
                padded.resize(n, 0.0);
                let q = unit_sum(&padded);
                let resonance = bhattacharyya(&current, &q);
                let fit = bhattacharyya(&predicted, &q);
                let candidate_phases = seeded_phases(&c.content, n);
                let alignment = phase_alignment(&current, &q, &state_phases, &candidate_phases);
                let score =
                    (0.50 * classical + 0.25 * resonance + 0.15 * fit + 0.10 * alignment) * boost;
                RankedCandidate {
                    id: c.id.clone(),
                    score,
                    rescored: true,
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }

    /// Index of the reference dimension: largest magnitude among the
    /// structural dimensions, or among all when none are structural.
    fn reference_index(&self) -> Option<usize> {
        let n = self.named();
        let structural: Vec<usize> = (0..n)
            .filter(|&i| !self.config.dimensions[i].volatile)
            .collect();
        let pool = if structural.is_empty() {
            (0..n).collect()
        } else {
            structural
        };
        pool.into_iter()
            .max_by(|&a, &b| self.amplitudes[a].norm().total_cmp(&self.amplitudes[b].norm()))
    }

    pub fn to_persisted(&self, now: f64) -> BridgeSnapshot {
        let reference = self.reference_index();
        let (ref_mag, ref_phase) = reference
            .map(|r| self.amplitudes[r].to_polar())
            .unwrap_or((0.0, 0.0));

        let interferences = self
            .config
            .dimensions
            .iter()
            .zip(&self.amplitudes)
            .map(|(spec, a)| {
                let (mag, phase) = a.to_polar();
                let rel_magnitude = (ref_mag > EPSILON).then(|| mag / ref_mag);
                (
                    spec.name.clone(),
                    DimInterference {
                        rel_magnitude,
                        rel_phase: Some(wrap_pi(phase - ref_phase)),
                        abs_magnitude: Some(mag),
                    },
                )
            })
            .collect();

        let trajectory = self
            .trajectory
            .clone()
            .unwrap_or_else(|| self.compute_trajectory());
        let mut predicted_trajectory = BTreeMap::new();
        for ((name, p), phase) in self
            .dimension_names()
            .zip(&trajectory.probabilities)
            .zip(&trajectory.phases)
        {
            predicted_trajectory.insert(name.to_string(), *p);
            predicted_trajectory.insert(
                format!("{name}{PHASE_SUFFIX}"),
                wrap_pi(*phase - ref_phase),
            );
        }

        BridgeSnapshot {
            ref_dim: reference.map(|r| self.config.dimensions[r].name.clone()),
            interferences,
            predicted_trajectory,
            entropy: self.entropy(),
            timestamp: Some(now),
        }
    }

    /// Rebuild from a persisted snapshot, then evolve across the offline gap
    /// when it exceeds the configured threshold.
    pub fn from_persisted(
        snapshot: &BridgeSnapshot,
        config: BridgeConfig,
        now: f64,
    ) -> (Self, Option<OfflineEvolution>) {
        let mut bridge = Self::new(config);
        let n = bridge.named();
        let defaults = bridge.amplitudes.clone();

        let ref_name = snapshot
            .ref_dim
            .clone()
            .or_else(|| bridge.reference_index().map(|r| bridge.config.dimensions[r].name.clone()));
        let ref_entry = ref_name
            .as_deref()
            .and_then(|name| snapshot.interferences.get(name));
        let ref_mag = ref_entry.and_then(|e| e.abs_magnitude);
        let ref_phase = ref_name.as_deref().map(name_phase).unwrap_or(0.0);

        for i in 0..n {
            let name = bridge.config.dimensions[i].name.clone();
            let Some(entry) = snapshot.interferences.get(&name) else {
                continue;
            };
            let magnitude = entry
                .rel_magnitude
                .zip(ref_mag)
                .map(|(rel, r)| rel * r)
                .or(entry.abs_magnitude)
                .unwrap_or(defaults[i].norm())
                .max(0.0);
            let phase = entry
                .rel_phase
                .map(|d| normalize_angle(ref_phase + d))
                .unwrap_or(defaults[i].arg());
            bridge.amplitudes[i] = Complex64::from_polar(magnitude, phase);
        }

        // Vacuum takes the remainder; an over-full named set is scaled back.
        let named_total: f64 = bridge.amplitudes[..n].iter().map(|a| a.norm_sqr()).sum();
        if named_total > 1.0 {
            let scale = named_total.sqrt();
            for a in &mut bridge.amplitudes[..n] {
                *a /= scale;
            }
        }
        let remainder = (1.0 - named_total.min(1.0)).max(0.0);
        bridge.amplitudes[n] = Complex64::from_polar(remainder.sqrt(), defaults[n].arg());
        bridge.normalize();

        let current = bridge.compute_trajectory();
        let trajectory = Trajectory {
            probabilities: bridge
                .dimension_names()
                .zip(&current.probabilities)
                .map(|(name, p)| {
                    snapshot
                        .predicted_trajectory
                        .get(name)
                        .copied()
                        .unwrap_or(*p)
                        .clamp(0.0, 1.0)
                })
                .collect(),
            phases: bridge
                .dimension_names()
                .zip(&current.phases)
                .map(|(name, phi)| {
                    snapshot
                        .predicted_trajectory
                        .get(&format!("{name}{PHASE_SUFFIX}"))
                        .map(|d| normalize_angle(ref_phase + d))
                        .unwrap_or(*phi)
                })
                .collect(),
            stability: current.stability,
        };
        bridge.trajectory = Some(trajectory.clone());

        let elapsed_secs = snapshot.timestamp.map_or(0.0, |t| (now - t).max(0.0));
        if elapsed_secs <= bridge.config.offline_threshold_secs {
            return (bridge, None);
        }
        let report = bridge.evolve_offline(elapsed_secs / SECS_PER_HOUR, &trajectory);
        (bridge, Some(report))
    }

    /// Relax each named dimension toward `target` and leak magnitude into
    /// the vacuum. Probability lost by a dimension is credited to the vacuum.
    fn evolve_offline(&mut self, hours: f64, target: &Trajectory) -> OfflineEvolution {
        let n = self.named();
        let vacuum_before = self.vacuum_probability();
        let mut vacuum_prob = vacuum_before;
        let mut shifts = Vec::with_capacity(n);

        for i in 0..n {
            let spec = &self.config.dimensions[i];
            let tau = spec.relaxation_hours.max(EPSILON);
            let pull = 1.0 - (-hours / tau).exp();
            let (mag, phase) = self.amplitudes[i].to_polar();

            let target_mag = target.probabilities[i].max(0.0).sqrt();
            let relaxed = mag + pull * (target_mag - mag);
            let leaked = relaxed * (-hours * self.config.vacuum_leak / tau).exp();
            let new_phase = slerp_angle(phase, target.phases[i], pull);

            let before = mag * mag;
            let after = leaked * leaked;
            vacuum_prob += before - after;
            shifts.push((spec.name.clone(), after - before));
            self.amplitudes[i] = Complex64::from_polar(leaked, new_phase);
        }

        if vacuum_prob < 0.0 {
            let named_total: f64 = self.amplitudes[..n].iter().map(|a| a.norm_sqr()).sum();
            let scale = named_total.sqrt();
            if scale > EPSILON {
                for a in &mut self.amplitudes[..n] {
                    *a /= scale;
                }
            }
            vacuum_prob = 0.0;
        }
        let vacuum_phase = self.amplitudes[n].arg();
        self.amplitudes[n] = Complex64::from_polar(vacuum_prob.sqrt(), vacuum_phase);
        self.normalize();

        OfflineEvolution {
            elapsed_hours: hours,
            vacuum_before,
            vacuum_after: self.vacuum_probability(),
            shifts,
        }
    }
}

fn name_phase(name: &str) -> f64 {
    seeded_phases(name, 1)[0]
}

/// Scale non-negative values to sum 1; all-zero input stays zero.
fn unit_sum(values: &[f64]) -> Vec<f64> {
    let clamped: Vec<f64> = values.iter().map(|v| v.max(0.0)).collect();
    let total: f64 = clamped.iter().sum();
    if total < EPSILON {
        return clamped;
    }
    clamped.iter().map(|v| v / total).collect()
}

/// Σ√(p·q), in [0, 1] for two unit-sum distributions.
fn bhattacharyya(p: &[f64], q: &[f64]) -> f64 {
    p.iter()
        .zip(q)
        .map(|(a, b)| (a * b).sqrt())
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

/// Overlap-weighted phase agreement mapped to [0, 1]; 0.5 when the two
/// distributions share no support.
fn phase_alignment(p: &[f64], q: &[f64], state: &[f64], candidate: &[f64]) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for i in 0..p.len().min(q.len()) {
        let w = (p[i] * q[i]).sqrt();
        weighted += w * (state[i] - candidate[i]).cos();
        total += w;
    }
    if total < EPSILON {
        return 0.5;
    }
    (0.5 * (1.0 + weighted / total)).clamp(0.0, 1.0)
}
