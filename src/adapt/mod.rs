//! MLLR speaker adaptation.
//!
//! Gaussians are partitioned into regression classes, sufficient statistics
//! are accumulated over decoded results, per-class affine transforms are
//! solved, and the transformed means are written back out in the model's
//! own binary format.

mod applier;
mod cluster;
mod session;
mod stats;
mod transform;

pub use applier::TransformApplier;
pub use cluster::ClusteredDensity;
pub use session::{AdaptationSession, SolverState};
pub use stats::{ClassAccumulator, DecodedResult, ObservedFrame, Stats, StatsSnapshot};
pub use transform::{SolveReport, Transform};
