//! Error taxonomy shared by every EMS crate.
//!
//! - [`ChannelError`] - channel access failures (returned to the caller)
//! - [`WriteConflict`] - resolution outcomes (logged, never propagated)
//! - [`ComponentFault`] - failure of one component's `execute()`
//! - [`BridgeError`] - hardware I/O failure or timeout
//! - [`ConfigurationError`] - startup-only, fatal

use serde::Serialize;
use thiserror::Error;

use crate::channel::{AccessMode, ChannelId, ComponentId, Value};
use crate::config::ConfigError;

/// Failure of a single channel operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    /// Operation not allowed by the channel's access mode.
    #[error("access denied: {operation} on {access} channel '{channel}'")]
    AccessDenied {
        channel: ChannelId,
        operation: &'static str,
        access: AccessMode,
    },

    /// No usable value (never read, stale, or not convertible).
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Channel is not part of the process image.
    #[error("unknown channel '{0}'")]
    UnknownChannel(ChannelId),

    /// Next value set by a component that does not own the channel.
    #[error("component '{component}' does not own channel '{channel}'")]
    NotOwner {
        channel: ChannelId,
        component: ComponentId,
    },

    /// Malformed channel id string.
    #[error("invalid channel id '{0}' (expected 'component/Channel')")]
    InvalidId(String),
}

/// Outcome of resolving conflicting write requests on one channel.
///
/// Not an error in the propagation sense: the tick always proceeds.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteConflict {
    /// Several distinct exact values were requested; `chosen` was applied.
    #[error("ambiguous exact writes on '{channel}': {values:?}, applied {chosen}")]
    Ambiguous {
        channel: ChannelId,
        values: Vec<Value>,
        chosen: Value,
    },

    /// Effective minimum above effective maximum; hardware write skipped.
    #[error("infeasible range on '{channel}': min {min} > max {max}")]
    Infeasible {
        channel: ChannelId,
        min: Value,
        max: Value,
    },
}

impl WriteConflict {
    /// Channel the conflict was raised on.
    pub fn channel(&self) -> &ChannelId {
        match self {
            Self::Ambiguous { channel, .. } | Self::Infeasible { channel, .. } => channel,
        }
    }
}

/// Failure reported by a component's `execute()`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ComponentFault {
    pub message: String,
    #[source]
    pub cause: Option<ChannelError>,
}

impl ComponentFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }
}

impl From<ChannelError> for ComponentFault {
    fn from(e: ChannelError) -> Self {
        Self {
            message: e.to_string(),
            cause: Some(e),
        }
    }
}

/// Hardware bridge failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Write did not complete within the tick's write budget.
    #[error("bridge '{bridge}' timed out after {timeout_ms}ms writing '{channel}'")]
    Timeout {
        bridge: ComponentId,
        channel: ChannelId,
        timeout_ms: u64,
    },

    /// Device or transport error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Worker thread gone.
    #[error("bridge '{0}' disconnected")]
    Disconnected(ComponentId),

    /// Channel not served by the bridge.
    #[error("channel '{0}' is not handled by this bridge")]
    UnknownChannel(ChannelId),

    /// Bridge initialization failed.
    #[error("initialization failed: {0}")]
    InitFailed(String),
}

/// Startup configuration failure. Fatal: no tick ever begins.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// Declared execution order contains a cycle.
    #[error("cyclic execution order between components: {}", .0.join(" -> "))]
    Cycle(Vec<ComponentId>),

    #[error("duplicate channel id '{0}'")]
    DuplicateChannel(ChannelId),

    #[error("duplicate component id '{0}'")]
    DuplicateComponent(ComponentId),

    /// `runs_before` / `runs_after` names a component that does not exist.
    #[error("component '{component}' declares ordering against unknown component '{dependency}'")]
    UnresolvedDependency {
        component: ComponentId,
        dependency: ComponentId,
    },

    /// Channel owned by a component that is not configured.
    #[error("channel '{0}' is owned by an unknown component")]
    UnknownOwner(ChannelId),

    #[error("unknown bridge driver '{0}'")]
    UnknownDriver(String),

    /// A configured bridge could not be initialized.
    #[error("bridge '{bridge}' failed to start: {source}")]
    BridgeStart {
        bridge: ComponentId,
        #[source]
        source: BridgeError,
    },

    #[error("unknown component kind '{0}'")]
    UnknownComponentKind(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Load(#[from] ConfigError),
}
