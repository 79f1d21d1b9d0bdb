//! Prelude module for common re-exports.
//!
//! ```rust
//! use ems_common::prelude::*;
//! ```

// ─── Channels ───────────────────────────────────────────────────────
pub use crate::channel::{
    AccessMode, ChannelId, ChannelSpec, ComponentId, FromValue, PersistencePriority, Unit, Value,
    ValueSlot, ValueType,
};

// ─── Bridges ────────────────────────────────────────────────────────
pub use crate::bridge::{Bridge, BridgeDiagnostics, BridgeFactory};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    BridgeConfig, ComponentConfig, ConfigError, ConfigLoader, CycleConfig, EdgeConfig,
    ExecutionPhase, LogLevel, RangePolicy, SharedConfig,
};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{
    BridgeError, ChannelError, ComponentFault, ConfigurationError, WriteConflict,
};
