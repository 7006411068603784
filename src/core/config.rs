use crate::core::errors::{LockstepError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Growth and ownership parameters shared by every member of a group.
///
/// All members must run with identical values: they feed the resize math
/// that keeps the collective calls in step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Records added to every growable array at each growth event
    #[serde(default = "default_growth_increment")]
    pub growth_increment: u64,
    /// Consecutive entries handed to one member before rotating
    #[serde(default = "default_block_size")]
    pub block_size: u64,
    /// Select DEBUG instead of INFO as the log level (see `telemetry::init_tracing`)
    #[serde(default)]
    pub debug: bool,
}

fn default_growth_increment() -> u64 {
    1000
}

fn default_block_size() -> u64 {
    10
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            growth_increment: default_growth_increment(),
            block_size: default_block_size(),
            debug: false,
        }
    }
}

impl WriterConfig {
    pub fn new(growth_increment: u64, block_size: u64) -> Self {
        Self {
            growth_increment,
            block_size,
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.growth_increment == 0 {
            return Err(LockstepError::configuration_field(
                "growth_increment must be greater than 0",
                "growth_increment",
            ));
        }
        if self.block_size == 0 {
            return Err(LockstepError::configuration_field(
                "block_size must be greater than 0",
                "block_size",
            ));
        }
        Ok(())
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| LockstepError::io(format!("read {}", path.display()), e))?;
        Self::from_yaml_str(&yaml)
    }
}

/// Options for the member driver loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOptions {
    /// Stop after this many source events (0 = unlimited)
    #[serde(default)]
    pub max_events: u64,
    /// Log progress every this many source events (0 = never)
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

fn default_progress_every() -> u64 {
    1000
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_events: 0,
            progress_every: default_progress_every(),
        }
    }
}

impl DriverOptions {
    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = max_events;
        self
    }

    pub fn with_progress_every(mut self, progress_every: u64) -> Self {
        self.progress_every = progress_every;
        self
    }
}
