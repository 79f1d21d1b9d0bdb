//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! and the static startup configuration of the edge runtime: channel list,
//! component declarations with ordering, bridge assignments and tick timing.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ems_common::config::EdgeConfig;
//! use std::path::Path;
//!
//! let config = EdgeConfig::load_file(Path::new("edge.toml")).unwrap();
//! println!("Service: {}", config.shared.service_name);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::channel::{ChannelId, ChannelSpec, ComponentId};
use crate::consts::{
    DEFAULT_FAULT_THRESHOLD, DEFAULT_POLL_INTERVAL_MS, DEFAULT_READ_GRACE_MS,
    DEFAULT_TICK_TARGET_MS, DEFAULT_WRITE_TIMEOUT_MS,
};
use crate::error::ConfigurationError;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all EMS applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "edge-site-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Tick / Arbitration ─────────────────────────────────────────────

/// Resolution target when a channel received only `Min`/`Max` requests and
/// declares no `write_default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePolicy {
    /// Most restrictive upper bound; the lower bound if no upper bound exists.
    #[default]
    UpperBound,
    /// Most restrictive lower bound; the upper bound if no lower bound exists.
    LowerBound,
}

/// When a component runs within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// Regular EXECUTE phase, before write resolution.
    #[default]
    Execute,
    /// After the process image swap (derived-value calculators).
    AfterProcessImage,
}

/// Cycle worker timing and policy.
///
/// ```toml
/// [cycle]
/// target_ms = 1000
/// fault_threshold = 3
/// write_timeout_ms = 200
/// read_grace_ms = 50
/// range_policy = "upper_bound"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CycleConfig {
    #[serde(default = "default_target_ms")]
    pub target_ms: u64,
    #[serde(default = "default_fault_threshold")]
    pub fault_threshold: u32,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_read_grace_ms")]
    pub read_grace_ms: u64,
    #[serde(default)]
    pub range_policy: RangePolicy,
}

fn default_target_ms() -> u64 {
    DEFAULT_TICK_TARGET_MS
}
fn default_fault_threshold() -> u32 {
    DEFAULT_FAULT_THRESHOLD
}
fn default_write_timeout_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}
fn default_read_grace_ms() -> u64 {
    DEFAULT_READ_GRACE_MS
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            target_ms: DEFAULT_TICK_TARGET_MS,
            fault_threshold: DEFAULT_FAULT_THRESHOLD,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            read_grace_ms: DEFAULT_READ_GRACE_MS,
            range_policy: RangePolicy::default(),
        }
    }
}

impl CycleConfig {
    pub fn target(&self) -> Duration {
        Duration::from_millis(self.target_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn read_grace(&self) -> Duration {
        Duration::from_millis(self.read_grace_ms)
    }
}

// ─── Components / Bridges ───────────────────────────────────────────

/// Declaration of one schedulable component.
///
/// ```toml
/// [[components]]
/// id = "ctrlLimit0"
/// kind = "limit_active_power"
/// runs_before = ["ctrlFix0"]
/// params = { channel = "ess0/SetActivePower", max = 0 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub id: ComponentId,
    pub kind: String,
    #[serde(default)]
    pub runs_before: Vec<ComponentId>,
    #[serde(default)]
    pub runs_after: Vec<ComponentId>,
    /// Overrides `cycle.fault_threshold` for this component.
    #[serde(default)]
    pub fault_threshold: Option<u32>,
    #[serde(default)]
    pub phase: ExecutionPhase,
    #[serde(default)]
    pub params: toml::Table,
}

/// Declaration of one hardware bridge. The bridge id is also the id of the
/// component owning the bridge's channels.
///
/// ```toml
/// [[bridges]]
/// id = "ess0"
/// driver = "simulation"
/// poll_interval_ms = 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub id: ComponentId,
    pub driver: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub params: toml::Table,
}

impl BridgeConfig {
    pub fn new(id: impl Into<ComponentId>, driver: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            driver: driver.into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            params: toml::Table::new(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ─── Edge Config ────────────────────────────────────────────────────

/// Complete static configuration of one edge runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
    #[serde(default)]
    pub bridges: Vec<BridgeConfig>,
}

impl EdgeConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validated()
    }

    /// Load and validate a configuration file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigurationError> {
        let config = Self::load(path)?;
        config.validated()
    }

    /// Normalize channel limits and run all startup checks.
    pub fn validated(mut self) -> Result<Self, ConfigurationError> {
        self.shared.validate()?;

        if self.cycle.target_ms == 0 {
            return Err(ConfigurationError::Invalid(
                "cycle.target_ms must be > 0".to_string(),
            ));
        }
        if self.cycle.write_timeout_ms == 0 {
            return Err(ConfigurationError::Invalid(
                "cycle.write_timeout_ms must be > 0".to_string(),
            ));
        }

        let mut owners: HashSet<&str> = HashSet::new();
        for id in self
            .components
            .iter()
            .map(|c| c.id.as_str())
            .chain(self.bridges.iter().map(|b| b.id.as_str()))
        {
            if !owners.insert(id) {
                return Err(ConfigurationError::DuplicateComponent(id.to_string()));
            }
        }

        let scheduled: HashSet<&str> = self.components.iter().map(|c| c.id.as_str()).collect();
        for component in &self.components {
            for dep in component.runs_before.iter().chain(&component.runs_after) {
                if !scheduled.contains(dep.as_str()) {
                    return Err(ConfigurationError::UnresolvedDependency {
                        component: component.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut seen: HashSet<ChannelId> = HashSet::new();
        for spec in &self.channels {
            if !seen.insert(spec.id.clone()) {
                return Err(ConfigurationError::DuplicateChannel(spec.id.clone()));
            }
            if !owners.contains(spec.id.component()) {
                return Err(ConfigurationError::UnknownOwner(spec.id.clone()));
            }
        }

        self.channels = self
            .channels
            .into_iter()
            .map(ChannelSpec::normalize)
            .collect::<Result<_, _>>()?;

        Ok(self)
    }

    /// Channels owned by `component`.
    pub fn channels_of<'a>(&'a self, component: &'a str) -> impl Iterator<Item = &'a ChannelSpec> + 'a {
        self.channels
            .iter()
            .filter(move |spec| spec.id.component() == component)
    }
}
