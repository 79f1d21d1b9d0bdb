//! Channel model: identity, static description and value storage.
//!
//! A channel is a named, typed data point owned by exactly one component.
//! The static part ([`ChannelSpec`]) is loaded once from configuration; the
//! dynamic part (current/next values) lives in the process image.

mod slot;
mod value;

pub use slot::ValueSlot;
pub use value::{FromValue, Value, ValueType};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ChannelError, ConfigurationError};

/// Identifier of a component (driver, bridge or controller), e.g. `"ess0"`.
pub type ComponentId = String;

// ─── Channel Identity ───────────────────────────────────────────────

/// Channel identity: `(component id, channel name)`, written `"ess0/SetActivePower"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId {
    component: ComponentId,
    channel: String,
}

impl ChannelId {
    /// Build an id from its two parts.
    pub fn new(component: impl Into<ComponentId>, channel: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            channel: channel.into(),
        }
    }

    /// The owning component.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// The channel name within its component.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component, self.channel)
    }
}

impl FromStr for ChannelId {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((component, channel))
                if !component.is_empty() && !channel.is_empty() && !channel.contains('/') =>
            {
                Ok(Self::new(component, channel))
            }
            _ => Err(ChannelError::InvalidId(s.to_string())),
        }
    }
}

impl TryFrom<String> for ChannelId {
    type Error = ChannelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.to_string()
    }
}

// ─── Access / Unit / Persistence ────────────────────────────────────

/// Who may change a channel's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Sensor data; only the owner publishes next values.
    #[default]
    ReadOnly,
    /// Setpoint that is never read back from hardware.
    WriteOnly,
    /// Setpoint with read-back.
    ReadWrite,
}

impl AccessMode {
    /// True if write requests may be queued against the channel.
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }

    /// True if the channel is polled from hardware.
    pub const fn is_readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReadOnly => "read-only",
            Self::WriteOnly => "write-only",
            Self::ReadWrite => "read-write",
        };
        f.write_str(s)
    }
}

/// Physical unit of a channel. Informational for external consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    None,
    Watt,
    KiloWatt,
    Var,
    VoltAmpere,
    WattHours,
    Volt,
    Ampere,
    Hertz,
    Percent,
    Celsius,
}

impl Unit {
    /// Display symbol.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Watt => "W",
            Self::KiloWatt => "kW",
            Self::Var => "var",
            Self::VoltAmpere => "VA",
            Self::WattHours => "Wh",
            Self::Volt => "V",
            Self::Ampere => "A",
            Self::Hertz => "Hz",
            Self::Percent => "%",
            Self::Celsius => "°C",
        }
    }
}

/// Persistence hint for external time-series collectors. Not used internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePriority {
    VeryLow,
    #[default]
    Low,
    Medium,
    High,
    VeryHigh,
}

// ─── Channel Spec ───────────────────────────────────────────────────

/// Static description of a channel, as listed in the startup configuration.
///
/// # TOML Example
///
/// ```toml
/// [[channels]]
/// id = "ess0/SetActivePower"
/// type = "integer"
/// access = "write_only"
/// unit = "watt"
/// floor = -10000
/// ceiling = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelSpec {
    pub id: ChannelId,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub access: AccessMode,
    #[serde(default)]
    pub unit: Unit,
    #[serde(default)]
    pub persistence: PersistencePriority,
    /// Hardware-safe lower bound applied to every resolution.
    #[serde(default)]
    pub floor: Option<Value>,
    /// Hardware-safe upper bound applied to every resolution.
    #[serde(default)]
    pub ceiling: Option<Value>,
    /// Resolution target when only range requests were issued.
    #[serde(default)]
    pub write_default: Option<Value>,
}

impl ChannelSpec {
    pub fn new(id: ChannelId, value_type: ValueType, access: AccessMode) -> Self {
        Self {
            id,
            value_type,
            access,
            unit: Unit::None,
            persistence: PersistencePriority::default(),
            floor: None,
            ceiling: None,
            write_default: None,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_floor(mut self, floor: impl Into<Value>) -> Self {
        self.floor = Some(floor.into());
        self
    }

    pub fn with_ceiling(mut self, ceiling: impl Into<Value>) -> Self {
        self.ceiling = Some(ceiling.into());
        self
    }

    pub fn with_write_default(mut self, value: impl Into<Value>) -> Self {
        self.write_default = Some(value.into());
        self
    }

    /// Convert `value` to this channel's declared type.
    ///
    /// NaN and infinite floats are rejected for every channel type.
    pub fn coerce(&self, value: Value) -> Result<Value, ChannelError> {
        if !value.is_finite() {
            return Err(ChannelError::InvalidValue(format!(
                "{}: non-finite value {value}",
                self.id
            )));
        }
        if value.value_type() == self.value_type {
            return Ok(value);
        }
        value.convert_to(self.value_type).map_err(|e| match e {
            ChannelError::InvalidValue(reason) => {
                ChannelError::InvalidValue(format!("{}: {reason}", self.id))
            }
            other => other,
        })
    }

    /// Convert the configured limits to the channel type and check them.
    pub fn normalize(mut self) -> Result<Self, ConfigurationError> {
        let invalid = |what: &str, e: ChannelError| {
            ConfigurationError::Invalid(format!("channel '{}' {what}: {e}", self.id))
        };

        let has_limits = self.floor.is_some() || self.ceiling.is_some();
        if has_limits && !self.value_type.is_numeric() {
            return Err(ConfigurationError::Invalid(format!(
                "channel '{}' of type {} cannot declare floor/ceiling",
                self.id, self.value_type
            )));
        }
        if (has_limits || self.write_default.is_some()) && !self.access.is_writable() {
            return Err(ConfigurationError::Invalid(format!(
                "channel '{}' is {} but declares write limits",
                self.id, self.access
            )));
        }

        if let Some(v) = self.floor.take() {
            self.floor = Some(self.coerce(v).map_err(|e| invalid("floor", e))?);
        }
        if let Some(v) = self.ceiling.take() {
            self.ceiling = Some(self.coerce(v).map_err(|e| invalid("ceiling", e))?);
        }
        if let Some(v) = self.write_default.take() {
            self.write_default = Some(self.coerce(v).map_err(|e| invalid("write_default", e))?);
        }

        if let (Some(lo), Some(hi)) = (&self.floor, &self.ceiling) {
            if lo.cmp_numeric(hi) == Some(std::cmp::Ordering::Greater) {
                return Err(ConfigurationError::Invalid(format!(
                    "channel '{}' floor {lo} exceeds ceiling {hi}",
                    self.id
                )));
            }
        }
        Ok(self)
    }
}
