//! Bridge driver implementations.
//!
//! - [`simulation`] - Software-simulated devices for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `Bridge` trait from `ems_common::bridge`
//! 3. Register the factory in [`register_all_drivers`]

pub mod simulation;

use crate::bridge_registry::BridgeRegistry;

/// Register all built-in drivers with `registry`.
pub fn register_all_drivers(registry: &mut BridgeRegistry) {
    registry.register(simulation::DRIVER_NAME, simulation::create_bridge);
}
