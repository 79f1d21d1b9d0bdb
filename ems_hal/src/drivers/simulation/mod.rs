//! Simulation driver module.
//!
//! Software-emulated devices (energy storage, meters, relays) for development
//! and testing without physical hardware.

mod bridge;
mod device;

pub use bridge::SimulationBridge;
pub use device::{DeviceParams, SimulatedDevice};

use ems_common::bridge::Bridge;

/// Driver name used in `[[bridges]] driver = "..."`.
pub const DRIVER_NAME: &str = "simulation";

/// Factory function to create a simulation bridge instance.
pub fn create_bridge() -> Box<dyn Bridge> {
    Box::new(SimulationBridge::new())
}
