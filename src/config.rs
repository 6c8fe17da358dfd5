//! Configuration system for the simulation kernel.
//!
//! This module provides YAML/JSON configuration file support for choosing an
//! engine and declaring clock domains.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! log_level: info
//!
//! engine:
//!   kind: parallel
//!   shards: 8
//!   threads: 4
//!
//! buffers:
//!   default_capacity: 4
//!
//! frequencies:
//!   - name: core
//!     hz: 1000000000
//!   - name: mem
//!     hz: 2500000000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::engine::{Engine, ParallelEngine, SerialEngine};
use crate::error::SimError;
use crate::freq::FreqError;
use crate::simulation::Simulation;
use crate::types::Freq;

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

    #[error("Frequency error: {0}")]
    Frequency(#[from] FreqError),

    #[error("Engine error: {0}")]
    Engine(#[from] SimError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which engine drives the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Serial,
    Parallel,
}

/// Engine parameters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Serial or parallel
    #[serde(default)]
    pub kind: EngineKind,

    /// Queue shards for the parallel engine (default: hardware threads)
    #[serde(default)]
    pub shards: Option<usize>,

    /// Worker threads for the parallel engine (0 or absent: rayon default)
    #[serde(default)]
    pub threads: Option<usize>,
}

/// A named clock domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    pub hz: Freq,
}

/// Port buffer defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Capacity used by components that do not choose their own
    #[serde(default = "default_capacity")]
    pub default_capacity: usize,
}

fn default_capacity() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            default_capacity: default_capacity(),
        }
    }
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub buffers: BufferConfig,

    /// Clock domains registered when the simulation is built
    #[serde(default)]
    pub frequencies: Vec<DomainConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            engine: EngineConfig::default(),
            buffers: BufferConfig::default(),
            frequencies: Vec::new(),
        }
    }
}

impl SimConfig {
    /// Creates a new default configuration.
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
        let config: SimConfig = serde_yaml::from_str(yaml)?;
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
        let config: SimConfig = serde_json::from_str(json)?;
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

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.buffers.default_capacity == 0 {
            return Err(ConfigError::Validation(
                "buffers.default_capacity must be at least 1".to_string(),
            ));
        }

        if self.engine.shards == Some(0) {
            return Err(ConfigError::Validation(
                "engine.shards must be at least 1".to_string(),
            ));
        }

        if self.engine.kind == EngineKind::Serial
            && (self.engine.shards.is_some() || self.engine.threads.is_some())
        {
            tracing::warn!("serial engine ignores shards and threads");
        }

        let mut names = HashSet::new();
        for domain in &self.frequencies {
            if domain.hz == 0 {
                return Err(ConfigError::Validation(format!(
                    "Clock domain {} has zero frequency",
                    domain.name
                )));
            }
            if !names.insert(domain.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate clock domain: {}",
                    domain.name
                )));
            }
        }

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

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Builds the configured engine.
    pub fn build_engine(&self) -> ConfigResult<Arc<dyn Engine>> {
        let engine: Arc<dyn Engine> = match self.engine.kind {
            EngineKind::Serial => Arc::new(SerialEngine::new()),
            EngineKind::Parallel => {
                let engine = match self.engine.shards {
                    Some(shards) => ParallelEngine::with_shards(shards),
                    None => ParallelEngine::new(),
                };
                Arc::new(engine.with_threads(self.engine.threads.unwrap_or(0))?)
            }
        };
        Ok(engine)
    }

    /// Builds a simulation with the configured engine and clock domains.
    pub fn build_simulation(&self) -> ConfigResult<Simulation> {
        self.validate()?;
        let simulation = Simulation::new(self.build_engine()?);
        for domain in &self.frequencies {
            simulation.register_domain(domain.name.clone(), domain.hz)?;
        }
        tracing::info!(
            engine = ?self.engine.kind,
            domains = self.frequencies.len(),
            "simulation built from config"
        );
        Ok(simulation)
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Selects the serial engine.
    pub fn serial(mut self) -> Self {
        self.config.engine.kind = EngineKind::Serial;
        self
    }

    /// Selects the parallel engine.
    pub fn parallel(mut self, shards: Option<usize>, threads: Option<usize>) -> Self {
        self.config.engine = EngineConfig {
            kind: EngineKind::Parallel,
            shards,
            threads,
        };
        self
    }

    /// Sets the default port buffer capacity.
    pub fn default_capacity(mut self, capacity: usize) -> Self {
        self.config.buffers.default_capacity = capacity;
        self
    }

    /// Adds a clock domain.
    pub fn add_domain(mut self, name: impl Into<String>, hz: Freq) -> Self {
        self.config.frequencies.push(DomainConfig {
            name: name.into(),
            hz,
        });
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
