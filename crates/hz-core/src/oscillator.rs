use std::f64::consts::TAU;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::constants::{ENERGY_DECAY_RATE, ENERGY_FLOOR, EPSILON};
use crate::phase::{normalize_angle, seeded_phases};

/// Complex-amplitude representation of one record.
///
/// Magnitudes come from the originating vector, phases from a generator
/// seeded by the content, so two oscillators built from the same record are
/// identical. Resonance between oscillators is the modulus of their complex
/// inner product scaled by their remaining energy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Oscillator {
    pub content: String,
    pub amplitudes: Vec<Complex64>,
    /// Inverse accessibility: higher is harder to recall.
    pub curvature: f64,
    /// Remaining energy in (0, 1].
    pub energy: f64,
    /// Creation time, Unix seconds.
    pub born: f64,
    /// Total time the phases have been evolved since they were seeded.
    #[serde(default)]
    pub evolved: f64,
}

impl Oscillator {
    /// Build from a non-negative vector. Negative components count as zero;
    /// an all-zero vector gives uniform magnitudes.
    pub fn new(content: &str, vector: &[f64], curvature: f64, born: f64) -> Self {
        let n = vector.len();
        let clamped: Vec<f64> = vector.iter().map(|v| v.max(0.0)).collect();
        let total: f64 = clamped.iter().sum();
        let magnitudes: Vec<f64> = if total > EPSILON {
            clamped.iter().map(|v| v / total).collect()
        } else {
            vec![1.0 / n.max(1) as f64; n]
        };
        Self::from_magnitudes(content, &magnitudes, curvature, 1.0, born)
    }

    /// Rebuild from stored magnitudes. Phases are regenerated from content.
    pub fn from_magnitudes(
        content: &str,
        magnitudes: &[f64],
        curvature: f64,
        energy: f64,
        born: f64,
    ) -> Self {
        let phases = seeded_phases(content, magnitudes.len());
        let amplitudes = magnitudes
            .iter()
            .zip(&phases)
            .map(|(m, phi)| Complex64::from_polar(m.max(0.0), *phi))
            .collect();
        let mut osc = Self {
            content: content.to_string(),
            amplitudes,
            curvature,
            energy: energy.clamp(ENERGY_FLOOR, 1.0),
            born,
            evolved: 0.0,
        };
        osc.normalize();
        osc
    }

    pub fn dimensions(&self) -> usize {
        self.amplitudes.len()
    }

    /// Scale amplitudes so Σ|a|² = 1. Phases are untouched. A zero state
    /// becomes uniform with its existing phases.
    pub fn normalize(&mut self) {
        let norm = self.total_probability().sqrt();
        if norm > EPSILON {
            for a in &mut self.amplitudes {
                *a /= norm;
            }
        } else if !self.amplitudes.is_empty() {
            let m = 1.0 / (self.amplitudes.len() as f64).sqrt();
            for a in &mut self.amplitudes {
                let phi = a.arg();
                *a = Complex64::from_polar(m, phi);
            }
        }
    }

    /// Phase evolution: each component rotates by |a|·2π·dt, so stronger
    /// components decorrelate sooner. Energy follows the oscillator's age.
    pub fn evolve(&mut self, dt: f64, now: f64) {
        self.advance(dt);
        let age = (now - self.born).max(0.0);
        self.energy = (-age * ENERGY_DECAY_RATE).exp().max(ENERGY_FLOOR);
    }

    /// Rotate phases as `evolve` does, leaving energy alone. Magnitudes do
    /// not change, so one advance by `t` matches any sequence of evolves
    /// summing to `t`.
    pub fn advance(&mut self, dt: f64) {
        for a in &mut self.amplitudes {
            let (r, phi) = a.to_polar();
            *a = Complex64::from_polar(r, normalize_angle(phi + r * TAU * dt));
        }
        self.normalize();
        self.evolved += dt;
    }

    /// |⟨self|other⟩| · √(E_self · E_other), clamped to [0, 1].
    /// Oscillators of different length are compared over the shared prefix.
    pub fn resonance_with(&self, other: &Oscillator) -> f64 {
        let inner: Complex64 = self
            .amplitudes
            .iter()
            .zip(&other.amplitudes)
            .map(|(a, b)| a.conj() * b)
            .sum();
        let r = inner.norm() * (self.energy * other.energy).sqrt();
        if r.is_finite() { r.clamp(0.0, 1.0) } else { 0.0 }
    }

    pub fn magnitudes(&self) -> Vec<f64> {
        self.amplitudes.iter().map(|a| a.norm()).collect()
    }

    pub fn phases(&self) -> Vec<f64> {
        self.amplitudes.iter().map(|a| normalize_angle(a.arg())).collect()
    }

    pub fn total_probability(&self) -> f64 {
        self.amplitudes.iter().map(|a| a.norm_sqr()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_construct_is_normalized() {
        let osc = Oscillator::new("quiet harbor", &[0.2, 0.5, 0.3, 0.0], 1.0, 0.0);
        assert_relative_eq!(osc.total_probability(), 1.0, epsilon = 1e-12);
        assert_eq!(osc.energy, 1.0);
        assert_eq!(osc.magnitudes()[3], 0.0);
    }

    #[test]
    fn test_zero_vector_is_uniform() {
        let osc = Oscillator::new("nothing", &[0.0; 4], 1.0, 0.0);
        for m in osc.magnitudes() {
            assert_relative_eq!(m, 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_same_content_same_phases() {
        let a = Oscillator::new("the red kite", &[0.1, 0.9], 1.0, 0.0);
        let b = Oscillator::new("the red kite", &[0.1, 0.9], 0.3, 50.0);
        assert_eq!(a.phases(), b.phases());
        assert_relative_eq!(a.resonance_with(&b), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_resonance_commutative_and_bounded() {
        let a = Oscillator::new("first", &[0.4, 0.1, 0.5], 1.0, 0.0);
        let b = Oscillator::new("second", &[0.3, 0.3, 0.4], 1.0, 0.0);
        let ab = a.resonance_with(&b);
        let ba = b.resonance_with(&a);
        assert_relative_eq!(ab, ba, epsilon = 1e-12);
        assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn test_evolve_keeps_norm_and_magnitudes() {
        let mut osc = Oscillator::new("drift", &[0.7, 0.2, 0.1], 1.0, 0.0);
        let before = osc.magnitudes();
        osc.evolve(0.37, 10.0);
        assert_relative_eq!(osc.total_probability(), 1.0, epsilon = 1e-12);
        for (b, a) in before.iter().zip(osc.magnitudes()) {
            assert_relative_eq!(*b, a, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_stronger_components_rotate_faster() {
        let mut osc = Oscillator::new("spin", &[0.9, 0.1], 1.0, 0.0);
        let before = osc.phases();
        osc.evolve(0.01, 0.0);
        let after = osc.phases();
        let d0 = crate::phase::wrap_pi(after[0] - before[0]).abs();
        let d1 = crate::phase::wrap_pi(after[1] - before[1]).abs();
        assert!(d0 > d1, "strong component should rotate further: {d0} vs {d1}");
    }

    #[test]
    fn test_energy_never_reaches_zero() {
        let mut osc = Oscillator::new("ancient", &[1.0], 1.0, 0.0);
        osc.evolve(0.0, 1e12);
        assert_relative_eq!(osc.energy, ENERGY_FLOOR, epsilon = 1e-15);
        assert!(osc.energy > 0.0);
    }

    #[test]
    fn test_energy_scales_resonance() {
        let mut a = Oscillator::new("same", &[0.5, 0.5], 1.0, 0.0);
        let b = a.clone();
        a.energy = 0.25;
        assert_relative_eq!(a.resonance_with(&b), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_repeated_evolve_replays_as_one_advance() {
        let mut live = Oscillator::new("the tide table", &[0.6, 0.3, 0.1], 1.0, 0.0);
        for _ in 0..50 {
            live.evolve(0.01, 5.0);
        }
        assert_relative_eq!(live.evolved, 0.5, epsilon = 1e-12);

        let magnitudes = live.magnitudes();
        let mut rebuilt =
            Oscillator::from_magnitudes("the tide table", &magnitudes, 1.0, live.energy, 0.0);
        rebuilt.advance(live.evolved);
        for (a, b) in live.phases().iter().zip(rebuilt.phases()) {
            assert!(crate::phase::wrap_pi(a - b).abs() < 1e-9);
        }
        assert_relative_eq!(live.resonance_with(&rebuilt), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_from_magnitudes_roundtrip() {
        let osc = Oscillator::new("kept", &[0.2, 0.3, 0.5], 0.4, 12.0);
        let rebuilt =
            Oscillator::from_magnitudes("kept", &osc.magnitudes(), 0.4, osc.energy, 12.0);
        assert_relative_eq!(osc.resonance_with(&rebuilt), 1.0, epsilon = 1e-9);
    }
}
