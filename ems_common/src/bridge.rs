//! Hardware bridge trait.
//!
//! This module defines:
//! - `Bridge` trait - Interface for pluggable hardware bridges
//! - `BridgeFactory` type alias - Factory function type
//! - `BridgeDiagnostics` struct - Optional bridge diagnostics
//!
//! The core never sees protocol bytes: a bridge translates between channel
//! values and its wire protocol (Modbus, M-Bus, simulation, ...).

use std::time::Instant;

use crate::channel::{ChannelId, Value};
use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Factory function type for creating bridge instances.
pub type BridgeFactory = fn() -> Box<dyn Bridge>;

/// Optional bridge diagnostics.
#[derive(Debug, Clone, Default)]
pub struct BridgeDiagnostics {
    /// Successful reads since start
    pub reads: u64,
    /// Failed reads since start
    pub read_errors: u64,
    /// Successful writes since start
    pub writes: u64,
    /// Failed writes since start
    pub write_errors: u64,
    /// Bridge-specific diagnostics (JSON string)
    pub custom: Option<String>,
}

/// Trait defining the interface for hardware bridges.
///
/// After `init()` each bridge is moved onto its own worker thread and owned
/// exclusively by it; it is never called from the tick thread directly.
///
/// # Lifecycle
///
/// 1. `init()` - Called once at startup, before the worker thread is spawned
/// 2. `read()` - Called every poll interval for each owned readable channel
/// 3. `write()` - Called for each resolved setpoint handed over by HARDWARE_WRITE
/// 4. `shutdown()` - Called when the worker stops
///
/// # Timing Contracts
///
/// | Operation | Max Duration | Enforced |
/// |-----------|--------------|----------|
/// | `read()` | poll interval | No (delays the next round) |
/// | `write()` | write timeout | Yes (`deadline`; expired jobs are dropped) |
pub trait Bridge: Send {
    /// Returns the driver's identifier (e.g., "simulation", "modbus").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Initialize the bridge with its configuration.
    ///
    /// # Errors
    /// Return `BridgeError::InitFailed` if initialization cannot complete.
    fn init(&mut self, config: &BridgeConfig) -> Result<(), BridgeError>;

    /// Read the current hardware value of one channel.
    fn read(&mut self, channel: &ChannelId) -> Result<Value, BridgeError>;

    /// Write a resolved setpoint to hardware.
    ///
    /// The caller has stopped waiting at `deadline`. A write that cannot
    /// complete by then must not be committed and should return an error.
    fn write(&mut self, channel: &ChannelId, value: &Value, deadline: Instant) -> Result<(), BridgeError>;

    /// Graceful shutdown of the bridge.
    fn shutdown(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Get bridge-specific diagnostics.
    /// Default: None
    fn diagnostics(&self) -> Option<BridgeDiagnostics> {
        None
    }
}
