//! Loader configuration.
//!
//! This module centralizes the options recognized by the model loader.
//! Configuration is an explicit record; it can be built directly, or loaded
//! from layered sources (defaults, `adapt.toml`, environment variables).

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::floors;
use crate::error::{ModelError, Result};

// Default value functions for serde defaults
fn default_model_definition() -> String {
    "mdef".to_string()
}
fn default_data_location() -> String {
    String::new()
}
fn default_use_cd_units() -> bool {
    true
}
fn default_mixture_component_score_floor() -> f32 {
    floors::DEFAULT_DIST_FLOOR
}
fn default_variance_floor() -> f32 {
    floors::DEFAULT_VARIANCE_FLOOR
}
fn default_mixture_weight_floor() -> f32 {
    floors::DEFAULT_MIXTURE_WEIGHT_FLOOR
}

/// Options recognized by the model loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Root directory of the acoustic model.
    pub location: PathBuf,

    /// Name of the model definition file, relative to `location`.
    #[serde(default = "default_model_definition")]
    pub model_definition: String,

    /// Subdirectory of `location` holding the binary parameter files.
    #[serde(default = "default_data_location")]
    pub data_location: String,

    /// Whether context-dependent units are registered while loading the
    /// model definition. When false, triphone rows are parsed but skipped.
    #[serde(default = "default_use_cd_units")]
    pub use_cd_units: bool,

    /// Lower bound on mixture component densities during scoring.
    #[serde(default = "default_mixture_component_score_floor")]
    pub mixture_component_score_floor: f32,

    /// Lower bound applied to loaded variances.
    #[serde(default = "default_variance_floor")]
    pub variance_floor: f32,

    /// Lower bound applied to normalized mixture weights.
    #[serde(default = "default_mixture_weight_floor")]
    pub mixture_weight_floor: f32,
}

impl LoaderConfig {
    /// Create a configuration for the model rooted at `location` with all
    /// other options at their defaults.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            model_definition: default_model_definition(),
            data_location: default_data_location(),
            use_cd_units: default_use_cd_units(),
            mixture_component_score_floor: default_mixture_component_score_floor(),
            variance_floor: default_variance_floor(),
            mixture_weight_floor: default_mixture_weight_floor(),
        }
    }

    /// Load configuration from layered sources with precedence:
    /// 1. Environment variables prefixed `TIEDSTATE_` (highest priority)
    /// 2. `adapt.toml` (if it exists)
    /// 3. Built-in defaults (lowest priority)
    pub fn load() -> Result<Self> {
        let config: LoaderConfig = Figment::new()
            .merge(Toml::file("adapt.toml"))
            .merge(Env::prefixed("TIEDSTATE_"))
            .extract()
            .map_err(|e| {
                ModelError::Configuration(format!("failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.location.as_os_str().is_empty() {
            return Err(ModelError::Configuration(
                "location cannot be empty".to_string(),
            ));
        }

        if self.model_definition.is_empty() {
            return Err(ModelError::Configuration(
                "model_definition cannot be empty".to_string(),
            ));
        }

        if self.variance_floor <= 0.0 {
            return Err(ModelError::Configuration(format!(
                "variance_floor must be positive, got {}",
                self.variance_floor
            )));
        }

        if self.mixture_weight_floor < 0.0 {
            return Err(ModelError::Configuration(format!(
                "mixture_weight_floor must not be negative, got {}",
                self.mixture_weight_floor
            )));
        }

        if self.mixture_component_score_floor < 0.0 {
            return Err(ModelError::Configuration(format!(
                "mixture_component_score_floor must not be negative, got {}",
                self.mixture_component_score_floor
            )));
        }

        Ok(())
    }

    /// Export configuration to TOML format.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ModelError::Configuration(format!("failed to serialize to TOML: {}", e)))
    }

    /// Absolute path of a data file, honoring `data_location`.
    pub(crate) fn data_path(&self, file: &str) -> PathBuf {
        if self.data_location.is_empty() {
            self.location.join(file)
        } else {
            self.location.join(&self.data_location).join(file)
        }
    }

    /// Absolute path of the model definition file.
    pub(crate) fn model_definition_path(&self) -> PathBuf {
        self.location.join(&self.model_definition)
    }
}
