//! Startup wiring: configuration → process image, registry, bridges, worker.
//!
//! Everything is constructed once here and handed to the cycle worker by
//! value; there is no runtime service lookup.

use ems_common::config::EdgeConfig;
use ems_common::error::ConfigurationError;
use ems_hal::{BridgeRegistry, BridgeSet, PolledChannel};
use tracing::info;

use crate::components::ComponentFactory;
use crate::cycle::CycleWorker;
use crate::process_image::ProcessImage;
use crate::registry::{ComponentRegistry, Schedule};

/// Build a ready-to-run worker from a configuration.
///
/// Any `ConfigurationError` is fatal: no tick has run when it is returned,
/// and bridges started so far are shut down again.
pub fn build(
    config: EdgeConfig,
    drivers: &BridgeRegistry,
    factory: &ComponentFactory,
) -> Result<CycleWorker, ConfigurationError> {
    let config = config.validated()?;

    let image = ProcessImage::from_specs(config.channels.iter().cloned())?;

    let mut registry = ComponentRegistry::new(config.cycle.fault_threshold);
    let batch = config
        .components
        .iter()
        .map(|c| factory.create(c).map(|component| (component, Schedule::from(c))))
        .collect::<Result<Vec<_>, _>>()?;
    registry.register_all(batch)?;
    info!("Execution order: {}", registry.order().join(" → "));

    let mut bridges = BridgeSet::new();
    for bridge_config in &config.bridges {
        let bridge = drivers.create_bridge(&bridge_config.driver)?;
        let polled = config
            .channels_of(&bridge_config.id)
            .filter(|spec| spec.access.is_readable())
            .filter_map(|spec| {
                image.slot(&spec.id).map(|slot| PolledChannel {
                    spec: spec.clone(),
                    slot,
                })
            })
            .collect();
        // Dropping `bridges` on error stops the workers already running.
        bridges
            .spawn(bridge, bridge_config, polled)
            .map_err(|source| ConfigurationError::BridgeStart {
                bridge: bridge_config.id.clone(),
                source,
            })?;
    }

    info!(
        "Runtime assembled: {} channels, {} components, {} bridges",
        image.len(),
        registry.len(),
        bridges.len()
    );
    CycleWorker::new(config.cycle, image, registry, bridges)
}
