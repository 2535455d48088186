//! Configuration system for the simulator.
//!
//! Settings that influence elaboration and solving can be given in code via
//! [`AmsConfigBuilder`] or loaded from YAML/JSON.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! name: rc_filter
//! integration_method: trapezoidal
//! ignore_reference_for_clustering: true
//! max_propagation_iterations: 100
//! singular_tolerance: 1.0e-12
//! delay_buffer_capacity: 16
//! de_resolution: 1000          # femtosecond ticks
//! converter_alignment: CeilToSample
//! log_level: info
//! collect_stats: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::converter::TimeAlignment;
use crate::eqn::IntegrationMethod;
use crate::time::SimTime;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Global simulator settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmsConfig {
    /// Name used as the root of hierarchical diagnostics
    #[serde(default = "default_name")]
    pub name: String,

    /// Integration method for time-domain steps of ELN/LSF clusters
    #[serde(default)]
    pub integration_method: IntegrationMethod,

    /// Whether reference (ground) nodes are skipped when partitioning clusters
    #[serde(default = "default_true")]
    pub ignore_reference_for_clustering: bool,

    /// Upper bound on attribute propagation rounds before elaboration fails
    #[serde(default = "default_max_propagation_iterations")]
    pub max_propagation_iterations: usize,

    /// Relative pivot threshold below which a factorization counts as singular
    #[serde(default = "default_singular_tolerance")]
    pub singular_tolerance: f64,

    /// Initial sample capacity of delay buffers
    #[serde(default = "default_delay_buffer_capacity")]
    pub delay_buffer_capacity: usize,

    /// Time grid of the discrete-event side, in ticks
    #[serde(default = "default_de_resolution")]
    pub de_resolution: SimTime,

    /// How TDF sample times map onto the discrete-event grid
    #[serde(default)]
    pub converter_alignment: TimeAlignment,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to collect detailed statistics
    #[serde(default)]
    pub collect_stats: bool,
}

fn default_name() -> String {
    "mixsig".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_propagation_iterations() -> usize {
    100
}

fn default_singular_tolerance() -> f64 {
    1e-12
}

fn default_delay_buffer_capacity() -> usize {
    16
}

fn default_de_resolution() -> SimTime {
    SimTime::from_ps(1)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AmsConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            integration_method: IntegrationMethod::default(),
            ignore_reference_for_clustering: true,
            max_propagation_iterations: default_max_propagation_iterations(),
            singular_tolerance: default_singular_tolerance(),
            delay_buffer_capacity: default_delay_buffer_capacity(),
            de_resolution: default_de_resolution(),
            converter_alignment: TimeAlignment::default(),
            log_level: default_log_level(),
            collect_stats: false,
        }
    }
}

impl AmsConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: AmsConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: AmsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_propagation_iterations == 0 {
            return Err(ConfigError::Validation(
                "max_propagation_iterations must be at least 1".to_string(),
            ));
        }
        if !self.singular_tolerance.is_finite() || self.singular_tolerance <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "singular_tolerance must be positive and finite, got {}",
                self.singular_tolerance
            )));
        }
        if self.delay_buffer_capacity < 2 {
            return Err(ConfigError::Validation(format!(
                "delay_buffer_capacity must hold at least 2 samples, got {}",
                self.delay_buffer_capacity
            )));
        }
        if self.de_resolution.is_zero() {
            return Err(ConfigError::Validation(
                "de_resolution must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating [`AmsConfig`] programmatically.
#[derive(Default)]
pub struct AmsConfigBuilder {
    config: AmsConfig,
}

impl AmsConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn integration_method(mut self, method: IntegrationMethod) -> Self {
        self.config.integration_method = method;
        self
    }

    pub fn ignore_reference_for_clustering(mut self, ignore: bool) -> Self {
        self.config.ignore_reference_for_clustering = ignore;
        self
    }

    pub fn max_propagation_iterations(mut self, iterations: usize) -> Self {
        self.config.max_propagation_iterations = iterations;
        self
    }

    pub fn singular_tolerance(mut self, tolerance: f64) -> Self {
        self.config.singular_tolerance = tolerance;
        self
    }

    pub fn delay_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.delay_buffer_capacity = capacity;
        self
    }

    pub fn de_resolution(mut self, resolution: SimTime) -> Self {
        self.config.de_resolution = resolution;
        self
    }

    pub fn converter_alignment(mut self, alignment: TimeAlignment) -> Self {
        self.config.converter_alignment = alignment;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Enables statistics collection.
    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.config.collect_stats = enable;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<AmsConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
