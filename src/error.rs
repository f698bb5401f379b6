//! Custom error types for acoustic model loading and adaptation.
//!
//! This module provides a centralized error handling system using the `thiserror` crate
//! to define structured, typed errors with clear messages and proper error conversion.

use std::io;
use thiserror::Error;

/// Primary error type for the crate, covering all possible error cases.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Errors from the underlying IO system.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structural damage in a binary model file (bad magic, truncated body).
    #[error("corrupted model file {path}: {detail}")]
    CorruptFile {
        /// The file that failed to parse.
        path: String,
        /// What went wrong.
        detail: String,
    },

    /// A model file declared a version this loader does not understand.
    #[error("unsupported version {found:?} in {path} (expected {expected})")]
    UnsupportedVersion {
        /// The file that carried the version string.
        path: String,
        /// The version found in the header, if any.
        found: Option<String>,
        /// The version this loader supports.
        expected: &'static str,
    },

    /// A declared trailing checksum did not match the computed one.
    #[error("checksum mismatch in {path}: computed {computed:#010x}, stored {stored:#010x}")]
    ChecksumMismatch {
        /// The file whose checksum failed.
        path: String,
        /// The checksum computed over the body.
        computed: u32,
        /// The checksum stored in the trailer.
        stored: u32,
    },

    /// Semantic inconsistency across otherwise well-formed model files.
    #[error("malformed model: {0}")]
    ModelMalformed(String),

    /// A regression class produced a numerically singular linear system.
    ///
    /// During estimation this is reported through the solve result rather
    /// than raised; the degenerate class falls back to the identity
    /// transform.
    #[error("singular system for regression class {class}, dimension {dim}")]
    SingularSystem {
        /// The degenerate regression class.
        class: usize,
        /// The feature dimension whose system had no usable pivot.
        dim: usize,
    },

    /// An operation was invoked in the wrong lifecycle phase.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Errors from invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Convenience type alias for Results with ModelError.
pub type Result<T> = std::result::Result<T, ModelError>;
