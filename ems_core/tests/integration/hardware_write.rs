//! Integration test: failing HARDWARE_WRITE inside complete ticks.
//!
//! A rejected or late hardware write is reported, never applied to the
//! process image, and not retried within the tick.

use std::thread;
use std::time::Duration;

use ems_common::channel::{AccessMode, ChannelId, ChannelSpec, Value, ValueType};
use ems_common::config::{BridgeConfig, CycleConfig};
use ems_common::error::BridgeError;
use ems_core::cycle::CycleWorker;
use ems_core::process_image::ProcessImage;
use ems_core::registry::ComponentRegistry;
use ems_hal::drivers::simulation::{self, DRIVER_NAME};
use ems_hal::{BridgeSet, PolledChannel};

use super::support::{Scripted, Step, failing_ess, setpoint, unordered, worker};

#[test]
fn rejected_write_is_reported_and_not_applied() {
    let (bridges, attempts) = failing_ess();
    let mut w = worker(
        bridges,
        unordered(vec![Scripted::new("ctrl", vec![Step::Exact(setpoint(), 700)]).boxed()]),
    );

    let report = w.run_tick();
    assert_eq!(report.bridge_errors.len(), 1);
    let failure = &report.bridge_errors[0];
    assert_eq!(failure.channel, setpoint());
    assert_eq!(failure.value, Value::Int(700));
    assert!(failure.error.contains("device rejected setpoint"));
    assert!(report.written(&setpoint()).is_none());
    assert_eq!(w.image().current(&setpoint()).unwrap(), None);
    assert_eq!(attempts.lock().unwrap().len(), 1, "one attempt per tick");

    // Next tick issues a fresh request: again exactly one attempt.
    let report = w.run_tick();
    assert_eq!(report.bridge_errors.len(), 1);
    assert_eq!(attempts.lock().unwrap().len(), 2);
    assert_eq!(w.image().current(&setpoint()).unwrap(), None);
    assert_eq!(w.stats().bridge_errors, 2);
}

#[test]
fn timed_out_write_never_reaches_hardware_later() {
    let readback = ChannelId::new("ess0", "ActivePower");
    let image = ProcessImage::from_specs([
        ChannelSpec::new(setpoint(), ValueType::Integer, AccessMode::WriteOnly),
        ChannelSpec::new(readback.clone(), ValueType::Integer, AccessMode::ReadOnly),
    ])
    .unwrap();

    let mut bridge_config = BridgeConfig::new("ess0", DRIVER_NAME);
    bridge_config.poll_interval_ms = 5;
    bridge_config.params =
        toml::from_str("write_delay_ms = 100\nvalues = { ActivePower = 0 }").unwrap();
    let polled = vec![PolledChannel {
        spec: image.spec(&readback).unwrap().clone(),
        slot: image.slot(&readback).unwrap(),
    }];
    let mut bridges = BridgeSet::new();
    bridges
        .spawn(simulation::create_bridge(), &bridge_config, polled)
        .unwrap();

    let config = CycleConfig {
        target_ms: 1000,
        read_grace_ms: 200,
        write_timeout_ms: 10,
        ..CycleConfig::default()
    };
    let mut registry = ComponentRegistry::new(config.fault_threshold);
    registry
        .register_all(unordered(vec![
            Scripted::new("ctrl", vec![Step::Exact(setpoint(), -4000)]).boxed(),
        ]))
        .unwrap();
    let mut w = CycleWorker::new(config, image, registry, bridges).unwrap();

    let report = w.run_tick();
    assert!(matches!(
        report.bridge_errors.as_slice(),
        [failure] if failure.error == BridgeError::Timeout {
            bridge: "ess0".into(),
            channel: setpoint(),
            timeout_ms: 10,
        }
        .to_string()
    ));
    assert!(report.written(&setpoint()).is_none());

    // Well past the device latency: the abandoned write must not show up.
    assert!(w.remove_component("ctrl").is_some());
    thread::sleep(Duration::from_millis(300));
    let report = w.run_tick();
    assert!(report.fresh_readings);
    assert!(report.bridge_errors.is_empty());
    assert_eq!(w.image().current(&readback).unwrap(), Some(Value::Int(0)));
    assert_eq!(w.image().current(&setpoint()).unwrap(), None);
    w.shutdown();
}
