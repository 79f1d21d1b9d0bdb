//! Simulation bridge implementation.
//!
//! The `SimulationBridge` implements the `Bridge` trait on top of a
//! [`SimulatedDevice`], advancing the device model on every call.

use super::device::{DeviceParams, SimulatedDevice};
use ems_common::bridge::{Bridge, BridgeDiagnostics};
use ems_common::channel::{ChannelId, ComponentId, Value};
use ems_common::config::BridgeConfig;
use ems_common::error::BridgeError;
use std::time::Instant;
use tracing::{debug, info};

/// Simulation bridge serving the channels of one component.
pub struct SimulationBridge {
    /// Component served by this bridge
    component: ComponentId,
    /// Device model (None until `init()`)
    device: Option<SimulatedDevice>,
    /// Last model update
    last_update: Instant,
    diagnostics: BridgeDiagnostics,
}

impl SimulationBridge {
    /// Create an uninitialized simulation bridge.
    pub fn new() -> Self {
        Self {
            component: ComponentId::new(),
            device: None,
            last_update: Instant::now(),
            diagnostics: BridgeDiagnostics::default(),
        }
    }

    fn device(&mut self, channel: &ChannelId) -> Result<&mut SimulatedDevice, BridgeError> {
        if channel.component() != self.component {
            return Err(BridgeError::UnknownChannel(channel.clone()));
        }
        let now = Instant::now();
        let dt = now.duration_since(self.last_update);
        self.last_update = now;

        let device = self
            .device
            .as_mut()
            .ok_or_else(|| BridgeError::InitFailed("simulation bridge not initialized".into()))?;
        device.advance(dt);
        Ok(device)
    }
}

impl Default for SimulationBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge for SimulationBridge {
    fn name(&self) -> &'static str {
        super::DRIVER_NAME
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn init(&mut self, config: &BridgeConfig) -> Result<(), BridgeError> {
        let params: DeviceParams = config
            .params
            .clone()
            .try_into()
            .map_err(|e| BridgeError::InitFailed(format!("simulation params for '{}': {e}", config.id)))?;

        info!(
            "Initializing simulation device '{}' with {} preset values (capacity: {:?} Wh)",
            config.id,
            params.values.len(),
            params.capacity_wh
        );
        self.component = config.id.clone();
        self.device = Some(SimulatedDevice::new(params));
        self.last_update = Instant::now();
        Ok(())
    }

    fn read(&mut self, channel: &ChannelId) -> Result<Value, BridgeError> {
        let result = self.device(channel).and_then(|d| d.read(channel.channel()));
        match result {
            Ok(_) => self.diagnostics.reads += 1,
            Err(_) => self.diagnostics.read_errors += 1,
        }
        result
    }

    fn write(&mut self, channel: &ChannelId, value: &Value, deadline: Instant) -> Result<(), BridgeError> {
        let device = match self.device(channel) {
            Ok(d) => d,
            Err(e) => {
                self.diagnostics.write_errors += 1;
                return Err(e);
            }
        };
        let delay = device.write_delay();
        if !delay.is_zero() {
            let now = Instant::now();
            if now + delay > deadline {
                // Device busy until the deadline; the setpoint is not committed.
                std::thread::sleep(deadline.saturating_duration_since(now));
                self.diagnostics.write_errors += 1;
                return Err(BridgeError::Io(format!(
                    "write {channel} abandoned: device latency {}ms exceeds deadline",
                    delay.as_millis()
                )));
            }
            std::thread::sleep(delay);
        }
        device.write(channel.channel(), value.clone());
        debug!("Simulated write {} = {}", channel, value);
        self.diagnostics.writes += 1;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), BridgeError> {
        debug!("Simulation device '{}' shut down", self.component);
        self.device = None;
        Ok(())
    }

    fn diagnostics(&self) -> Option<BridgeDiagnostics> {
        Some(self.diagnostics.clone())
    }
}
