//! Horizon resonance memory engine.
//!
//! Records are short texts with an N-dimensional vector. Each record gets a
//! decaying complex-amplitude oscillator whose curvature decides how far
//! behind the recall horizon it sits; recall blends phase-sensitive
//! resonance with plain cosine similarity. A separate state bridge maps the
//! agent's external state vector onto the same amplitude math and carries it
//! across offline gaps.
//!
//! Zero I/O. Persistence lives in `hz-store`.

pub mod bridge;
pub mod constants;
pub mod error;
pub mod horizon;
pub mod oscillator;
pub mod phase;
pub mod records;
pub mod serde_compat;
pub mod time;

pub use bridge::{
    BridgeConfig, BridgeSnapshot, Candidate, DimInterference, DimensionSpec, KuramotoRule,
    OfflineEvolution, PhaseRule, RankedCandidate, StateBridge, Trajectory,
};
pub use constants::{CURVATURE_FLOOR, EPSILON, FORMAT_VERSION, NORM_TOLERANCE};
pub use error::{CoreError, Result};
pub use horizon::{
    CombinedHit, EmergenceEvent, Horizon, HorizonHit, HorizonParams, HorizonSnapshot, Quantum,
    QuantumSnapshot, RestoreReport, SelfQuery, curvature_for, fuse_scores,
};
pub use oscillator::Oscillator;
pub use records::{
    Depth, FractalLinks, LateralLinks, LinkOptions, Record, RecordStore, RecordType,
    SimilarityHit, StoreStats, cosine_similarity,
};
pub use serde_compat::{
    CURRENT_VERSION, FileHeader, LoadReport, RecordFileFormat, SkippedLine, parse_record_file,
    render_record_file,
};
