//! Tied-state acoustic model loading and MLLR speaker adaptation.
//!
//! This crate parses the binary, byte-order-tagged acoustic models produced
//! by the Sphinx-3 trainer (means, variances, mixture weights, transition
//! matrices, optional feature transform, plus the textual HMM definition)
//! and estimates Maximum-Likelihood Linear Regression transforms from
//! decoded utterance results, writing an adapted means file back in the
//! same binary format.
//!
//! The expected flow: load a [`model::ModelStore`] once with a
//! [`model::ModelLoader`], open an [`adapt::AdaptationSession`] over it,
//! feed it [`adapt::DecodedResult`]s from an upstream recognizer, then
//! `solve` and `apply`.

pub mod adapt;
pub mod config;
pub mod constants;
pub mod error;
pub mod logmath;
pub mod model;
pub mod s3;

pub use config::LoaderConfig;
pub use error::{ModelError, Result};
pub use logmath::LogMath;
