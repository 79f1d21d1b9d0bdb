//! Simulated device state.

use ems_common::channel::Value;
use ems_common::error::BridgeError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Prefix of setpoint channels mirrored into their read-back channel
/// (`SetActivePower` → `ActivePower`).
const SETPOINT_PREFIX: &str = "Set";

/// Name of the power channel integrated into `Soc`.
const POWER_CHANNEL: &str = "ActivePower";

/// Name of the state-of-charge channel [%].
const SOC_CHANNEL: &str = "Soc";

/// Device parameters, taken from the bridge's `params` table.
///
/// ```toml
/// [[bridges]]
/// id = "ess0"
/// driver = "simulation"
/// params = { capacity_wh = 10000.0, initial_soc = 80.0, values = { ActivePower = 0 } }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceParams {
    /// Initial readings by channel name.
    #[serde(default)]
    pub values: HashMap<String, Value>,
    /// Storage capacity; enables state-of-charge integration of `ActivePower`.
    #[serde(default)]
    pub capacity_wh: Option<f64>,
    /// Initial state of charge [%].
    #[serde(default = "default_initial_soc")]
    pub initial_soc: f64,
    /// Channel names whose reads always fail (fault injection).
    #[serde(default)]
    pub fail_reads: Vec<String>,
    /// Artificial latency of every write [ms].
    #[serde(default)]
    pub write_delay_ms: u64,
}

fn default_initial_soc() -> f64 {
    50.0
}

impl Default for DeviceParams {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            capacity_wh: None,
            initial_soc: default_initial_soc(),
            fail_reads: Vec::new(),
            write_delay_ms: 0,
        }
    }
}

/// One simulated device: a map of channel readings plus optional storage.
///
/// Power convention: positive `ActivePower` discharges the storage.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    values: HashMap<String, Value>,
    capacity_wh: Option<f64>,
    soc: f64,
    fail_reads: Vec<String>,
    write_delay: Duration,
}

impl SimulatedDevice {
    /// Build a device from its parameters.
    pub fn new(params: DeviceParams) -> Self {
        Self {
            values: params.values,
            capacity_wh: params.capacity_wh,
            soc: params.initial_soc.clamp(0.0, 100.0),
            fail_reads: params.fail_reads,
            write_delay: Duration::from_millis(params.write_delay_ms),
        }
    }

    /// Configured write latency.
    pub fn write_delay(&self) -> Duration {
        self.write_delay
    }

    /// Current state of charge [%].
    pub fn soc(&self) -> f64 {
        self.soc
    }

    /// Integrate the storage over `dt` at the current `ActivePower`.
    pub fn advance(&mut self, dt: Duration) {
        let Some(capacity) = self.capacity_wh.filter(|c| *c > 0.0) else {
            return;
        };
        let power = self
            .values
            .get(POWER_CHANNEL)
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let hours = dt.as_secs_f64() / 3600.0;
        self.soc = (self.soc - power * hours / capacity * 100.0).clamp(0.0, 100.0);
    }

    /// Read one channel by name.
    pub fn read(&self, name: &str) -> Result<Value, BridgeError> {
        if self.fail_reads.iter().any(|f| f == name) {
            return Err(BridgeError::Io(format!("simulated read failure on {name}")));
        }
        if name == SOC_CHANNEL && self.capacity_wh.is_some() {
            return Ok(Value::Float(self.soc));
        }
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::Io(format!("no simulated value for {name}")))
    }

    /// Write one channel by name; setpoints are mirrored to their read-back.
    pub fn write(&mut self, name: &str, value: Value) {
        if let Some(readback) = name.strip_prefix(SETPOINT_PREFIX).filter(|r| !r.is_empty()) {
            self.values.insert(readback.to_string(), value.clone());
        }
        self.values.insert(name.to_string(), value);
    }
}
