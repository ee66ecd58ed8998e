//! Phase-angle helpers and deterministic content seeding.
//!
//! Every phase in the engine is regenerated from content rather than stored,
//! so the seed derivation here must stay stable across processes and releases.

use std::f64::consts::{PI, TAU};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::constants::PHASE_SEED_CHARS;

/// Normalize an angle to [0, 2π).
pub fn normalize_angle(theta: f64) -> f64 {
    theta.rem_euclid(TAU)
}

/// Wrap an angle difference to [-π, π] for shortest-arc comparisons.
pub fn wrap_pi(diff: f64) -> f64 {
    let mut d = diff.rem_euclid(TAU);
    if d > PI {
        d -= TAU;
    }
    d
}

/// Move `from` toward `to` along the shortest arc by fraction `t`.
pub fn slerp_angle(from: f64, to: f64, t: f64) -> f64 {
    normalize_angle(from + t * wrap_pi(to - from))
}

/// Stable 64-bit seed from the leading characters of `content`.
pub fn content_seed(content: &str) -> u64 {
    let head: String = content.chars().take(PHASE_SEED_CHARS).collect();
    let digest = Sha256::digest(head.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Generator seeded from content. Callers get a fresh generator per call,
/// never a shared one.
pub fn seeded_rng(content: &str) -> SmallRng {
    SmallRng::seed_from_u64(content_seed(content))
}

/// `n` phases uniform in [0, 2π), fully determined by `content`.
pub fn seeded_phases(content: &str, n: usize) -> Vec<f64> {
    let mut rng = seeded_rng(content);
    (0..n).map(|_| rng.random_range(0.0..TAU)).collect()
}
