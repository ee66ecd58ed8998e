/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-10;

/// Tolerance for the unit-probability invariant
pub const NORM_TOLERANCE: f64 = 1e-6;

/// Characters of content that feed the phase seed
pub const PHASE_SEED_CHARS: usize = 50;

/// Weight at or above which a record is filed at depth 3
pub const DEPTH_DEEP_WEIGHT: f64 = 0.90;

/// Weight at or above which a record is filed at depth 2
pub const DEPTH_MIDDLE_WEIGHT: f64 = 0.60;

/// Minimum cosine similarity for an automatic child → parent link
pub const PARENT_LINK_THRESHOLD: f64 = 0.5;

/// Minimum cosine similarity for an automatic lateral link
pub const LATERAL_LINK_THRESHOLD: f64 = 0.7;

/// Maximum lateral links created by a single store
pub const MAX_LATERAL_LINKS: usize = 5;

/// Result cap for proustian (cosine) recall
pub const PROUSTIAN_LIMIT: usize = 5;

/// Neutral cosine score when either vector has zero norm
pub const NEUTRAL_SIMILARITY: f64 = 0.5;

/// Base curvature per depth: shallow memories sit behind the horizon
pub const BASE_CURVATURE_SURFACE: f64 = 1.2;
pub const BASE_CURVATURE_MIDDLE: f64 = 0.5;
pub const BASE_CURVATURE_DEEP: f64 = 0.15;

/// Lowest curvature any oscillator may reach
pub const CURVATURE_FLOOR: f64 = 0.05;

/// Energy never drops below this (information becomes inaccessible, not erased)
pub const ENERGY_FLOOR: f64 = 1e-3;

/// Energy decay rate per second of age (half-life roughly eight days)
pub const ENERGY_DECAY_RATE: f64 = 1e-6;

/// Phase step applied to stored oscillators during a recall
pub const RECALL_DT: f64 = 0.01;

/// Scores at or below this are dropped from horizon recall
pub const RESONANCE_EPSILON: f64 = 1e-4;

/// Population at which the emergence event fires
pub const EMERGENCE_THRESHOLD: usize = 100;

/// Most recent quanta restored from a horizon snapshot
pub const SNAPSHOT_CAP: usize = 500;

/// Content characters kept per quantum in a horizon snapshot
pub const SNAPSHOT_CONTENT_CHARS: usize = 200;

/// Weight below which a shallow record is eligible for decay
pub const LOW_WEIGHT_THRESHOLD: f64 = 0.5;

/// Trajectory boost applied per unit of phase stability
pub const TRAJECTORY_GAIN: f64 = 0.3;

/// Snapshots considered when estimating phase drift
pub const DRIFT_WINDOW: usize = 3;

/// Record file format written by this version
pub const FORMAT_VERSION: u32 = 2;

/// Phase snapshots kept by the state bridge
pub const BRIDGE_HISTORY: usize = 16;

/// Added to every externally driven bridge magnitude
pub const BRIDGE_EPSILON: f64 = 1e-3;

/// Floor on the vacuum's squared magnitude during an external sync, applied
/// before renormalizing, so the vacuum never empties but may end below it
pub const VACUUM_FLOOR: f64 = 0.05;

/// Gap after which a reloaded bridge is evolved forward
pub const OFFLINE_THRESHOLD_SECS: f64 = 60.0;

/// Magnitude leak into the vacuum per relaxation time
pub const VACUUM_LEAK: f64 = 0.1;

/// Relaxation time of a volatile bridge dimension
pub const VOLATILE_RELAXATION_HOURS: f64 = 1.0;

/// Relaxation time of a structural bridge dimension
pub const STRUCTURAL_RELAXATION_HOURS: f64 = 72.0;

/// Classical-score multiplier for candidates past the rescored window
pub const RANK_DISCOUNT: f64 = 0.1;

/// Mean-field coupling strength of the default phase rule
pub const KURAMOTO_COUPLING: f64 = 0.5;
