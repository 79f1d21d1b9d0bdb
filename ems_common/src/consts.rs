//! System-wide constants for the EMS workspace.
//!
//! Single source of truth for default timings and reserved channel names.

/// Default tick target duration in milliseconds (1 Hz).
pub const DEFAULT_TICK_TARGET_MS: u64 = 1000;

/// Default number of faults a component may accumulate before it is faulted.
pub const DEFAULT_FAULT_THRESHOLD: u32 = 3;

/// Default per-write hardware timeout in milliseconds.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 200;

/// Default time the READ phase waits for fresh bridge readings.
pub const DEFAULT_READ_GRACE_MS: u64 = 50;

/// Default bridge polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ems/edge.toml";

/// Per-component lifecycle channel (`Enum`: 0 = active, 1 = faulted).
pub const STATE_CHANNEL: &str = "State";

/// Per-component fault counter channel (`Long`).
pub const FAULT_COUNT_CHANNEL: &str = "FaultCount";
