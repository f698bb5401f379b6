//! Domain constants for acoustic model loading and adaptation.
//!
//! This module contains compile-time constants used throughout the crate.
//! These are separated from runtime configuration to provide clear distinction
//! between values that never change and those that can be configured.

/// S3 binary container constants.
pub mod s3 {
    /// Magic word written after the header; its byte order reveals the
    /// byte order of the file body.
    pub const BYTE_ORDER_MAGIC: u32 = 0x1122_3344;

    /// Leading header token identifying the container format.
    pub const FORMAT_TAG: &str = "s3";

    /// Header token terminating the property section.
    pub const END_HEADER: &str = "endhdr";

    /// Supported version of density files (means, variances).
    pub const DENSITY_FILE_VERSION: &str = "1.0";

    /// Supported version of mixture weight files.
    pub const MIXW_FILE_VERSION: &str = "1.0";

    /// Supported version of transition matrix files.
    pub const TMAT_FILE_VERSION: &str = "1.0";

    /// Supported version of feature transform files.
    pub const TRANSFORM_FILE_VERSION: &str = "0.1";
}

/// Model definition (mdef) text format constants.
pub mod mdef {
    /// Supported version of the HMM definition file.
    pub const MODEL_VERSION: &str = "0.3";

    /// Character starting a comment that runs to end of line.
    pub const COMMENT_CHAR: char = '#';

    /// Column placeholder meaning "no value" in phone rows.
    pub const NO_VALUE: &str = "-";

    /// Token terminating the tied-state id list of a phone row.
    pub const ROW_TERMINATOR: &str = "N";
}

/// Phonetic unit constants.
pub mod unit {
    /// Name of the mandatory context-independent silence phone.
    pub const SILENCE_CIPHONE: &str = "SIL";

    /// Attribute marking a filler phone in the model definition.
    pub const FILLER_ATTRIBUTE: &str = "filler";

    /// Attribute carried by context-dependent phone rows.
    pub const NO_ATTRIBUTE: &str = "n/a";

    /// Width of the left and right phonetic context.
    pub const CONTEXT_SIZE: usize = 1;
}

/// Adaptation and clustering constants.
pub mod adapt {
    /// Maximum Lloyd iterations when clustering Gaussians into
    /// regression classes.
    pub const MAX_CLUSTER_ITERATIONS: usize = 20;

    /// Pivot magnitude below which a regression system is treated as
    /// singular and the affected row falls back to the identity.
    pub const SINGULARITY_EPSILON: f64 = 1e-12;

    /// Component posteriors below this contribute nothing measurable to
    /// the accumulators and are skipped.
    pub const MIN_POSTERIOR: f32 = 1e-10;
}

/// Default floors applied while loading model parameters.
pub mod floors {
    /// Default lower bound on loaded variances.
    pub const DEFAULT_VARIANCE_FLOOR: f32 = 1e-4;

    /// Default lower bound on normalized mixture weights.
    pub const DEFAULT_MIXTURE_WEIGHT_FLOOR: f32 = 1e-7;

    /// Default lower bound on mixture component densities.
    pub const DEFAULT_DIST_FLOOR: f32 = 0.0;
}
