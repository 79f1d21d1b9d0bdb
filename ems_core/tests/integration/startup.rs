//! Integration test: startup from a site TOML with the simulation bridge.
//!
//! Validates: config parsing → component factory → registry order →
//! bridge workers → ticks against simulated hardware.

use std::io::Write;

use ems_common::channel::{ChannelId, Value};
use ems_common::config::{ComponentConfig, EdgeConfig};
use ems_common::error::{ComponentFault, ConfigurationError};
use ems_core::component::{Component, TickContext};
use ems_core::components::ComponentFactory;
use ems_core::runtime;
use ems_hal::BridgeRegistry;
use serde::Deserialize;
use tempfile::NamedTempFile;

// ── Site configuration ──────────────────────────────────────────────

const SITE: &str = r#"
[shared]
service_name = "edge-it"

[cycle]
target_ms = 200
read_grace_ms = 100
write_timeout_ms = 200

[[channels]]
id = "ess0/SetActivePower"
type = "integer"
access = "write_only"
unit = "watt"
floor = -10000
ceiling = 10000

[[channels]]
id = "ess0/Soc"
type = "float"
unit = "percent"

[[channels]]
id = "meter0/ActivePower"
type = "integer"
unit = "watt"

[[channels]]
id = "sum0/GridBalance"
type = "long"
unit = "watt"

[[components]]
id = "ctrlX"
kind = "limit_active_power"
params = { channel = "ess0/SetActivePower", min = -5000, max = 0 }

[[components]]
id = "ctrlY"
kind = "limit_active_power"
runs_after = ["ctrlX"]
params = { channel = "ess0/SetActivePower", max = -1000 }

[[components]]
id = "reader"
kind = "strict_reader"
runs_before = ["ctrlX"]
params = { channel = "meter0/ActivePower" }

[[components]]
id = "sum0"
kind = "sum"
phase = "after_process_image"
params = { sources = ["meter0/ActivePower", "ess0/Soc"], target = "GridBalance" }

[[bridges]]
id = "ess0"
driver = "simulation"
poll_interval_ms = 10
params = { capacity_wh = 10000.0, initial_soc = 60.0 }

[[bridges]]
id = "meter0"
driver = "simulation"
poll_interval_ms = 10
params = { values = { ActivePower = 1500 }, fail_reads = ["ActivePower"] }
"#;

// ── Test component kind ─────────────────────────────────────────────

#[derive(Deserialize)]
struct ReaderParams {
    channel: ChannelId,
}

/// Fails every tick its channel has no value.
struct StrictReader {
    id: String,
    channel: ChannelId,
}

impl Component for StrictReader {
    fn id(&self) -> &str {
        &self.id
    }

    fn owned_channels(&self) -> &[ChannelId] {
        &[]
    }

    fn execute(&mut self, ctx: &TickContext<'_>) -> Result<(), ComponentFault> {
        ctx.read::<i32>(&self.channel)?;
        Ok(())
    }
}

fn create_strict_reader(config: &ComponentConfig) -> Result<Box<dyn Component>, ConfigurationError> {
    let p: ReaderParams = config
        .params
        .clone()
        .try_into()
        .map_err(|e| ConfigurationError::Invalid(format!("{e}")))?;
    Ok(Box::new(StrictReader {
        id: config.id.clone(),
        channel: p.channel,
    }))
}

fn factory() -> ComponentFactory {
    let mut factory = ComponentFactory::with_builtin_components();
    factory.register("strict_reader", create_strict_reader);
    factory
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn site_starts_and_arbitrates_against_simulated_ess() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(SITE.as_bytes()).unwrap();
    let config = EdgeConfig::load_file(file.path()).unwrap();

    let mut worker =
        runtime::build(config, &BridgeRegistry::with_builtin_drivers(), &factory()).unwrap();
    assert_eq!(worker.registry().order(), vec!["reader", "ctrlX", "ctrlY", "sum0"]);

    let setpoint = ChannelId::new("ess0", "SetActivePower");
    let meter = ChannelId::new("meter0", "ActivePower");
    let soc = ChannelId::new("ess0", "Soc");
    let balance = ChannelId::new("sum0", "GridBalance");

    for tick in 1..=3u32 {
        let report = worker.run_tick();

        // The simulated ESS receives the most restrictive upper bound.
        assert!(report.conflicts.is_empty());
        assert!(report.bridge_errors.is_empty());
        assert_eq!(report.written(&setpoint), Some(&Value::Int(-1000)));
        assert!(report.writes[0].hardware);

        // The meter never delivers: the strict reader faults, siblings run.
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].component, "reader");
        assert_eq!(report.executed, vec!["reader", "ctrlX", "ctrlY", "sum0"]);
        assert_eq!(worker.registry().fault_count("reader"), Some(tick));
        assert_eq!(worker.image().current(&meter).unwrap(), None);
    }

    assert_eq!(worker.image().current(&setpoint).unwrap(), Some(Value::Int(-1000)));

    // Soc arrives through the poll loop; the sum only sees the ESS.
    let soc_now = worker.image().current(&soc).unwrap().and_then(|v| v.as_f64());
    let balance_now = worker.image().current(&balance).unwrap();
    assert!(soc_now.is_some());
    assert!(balance_now.is_some());

    worker.shutdown();
}

#[test]
fn unknown_driver_is_fatal() {
    let site = SITE.replacen("driver = \"simulation\"", "driver = \"modbus\"", 1);
    let config: EdgeConfig = toml::from_str(&site).unwrap();
    let err = runtime::build(config, &BridgeRegistry::with_builtin_drivers(), &factory())
        .err()
        .unwrap();
    assert_eq!(err, ConfigurationError::UnknownDriver("modbus".into()));
}

#[test]
fn unknown_component_kind_is_fatal() {
    let config: EdgeConfig = toml::from_str(SITE).unwrap();
    let err = runtime::build(
        config,
        &BridgeRegistry::with_builtin_drivers(),
        &ComponentFactory::with_builtin_components(),
    )
    .err()
    .unwrap();
    assert_eq!(err, ConfigurationError::UnknownComponentKind("strict_reader".into()));
}

#[test]
fn cyclic_configuration_is_fatal() {
    let site = SITE.replace("runs_before = [\"ctrlX\"]", "runs_before = [\"ctrlX\"]\nruns_after = [\"ctrlY\"]");
    let config: EdgeConfig = toml::from_str(&site).unwrap();
    let err = runtime::build(config, &BridgeRegistry::with_builtin_drivers(), &factory())
        .err()
        .unwrap();
    assert!(matches!(err, ConfigurationError::Cycle(_)));
}
