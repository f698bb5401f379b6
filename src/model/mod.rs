//! The in-memory acoustic model and its loader.
//!
//! This module contains the parameter pools, the senone/HMM topology types,
//! and the loader that assembles them from a model directory.

mod hmm;
mod loader;
mod mdef;
mod pool;
mod senone;
mod store;
#[cfg(test)]
pub(crate) mod testing;
mod unit;

pub use hmm::{HmmManager, SenoneHmm};
pub use loader::ModelLoader;
pub use mdef::MdefTokenizer;
pub use pool::{Feature, Pool};
pub use senone::{GaussianMixture, MixtureComponent, Senone, SenoneSequence};
pub use store::ModelStore;
pub use unit::{HmmPosition, LeftRightContext, Unit};
