//! Integration test: per-component failure isolation.

use ems_common::channel::{ChannelId, Value};
use ems_common::consts::{FAULT_COUNT_CHANNEL, STATE_CHANNEL};
use ems_core::component::ComponentState;

use super::support::{Scripted, Step, meter, recording_ess, setpoint, unordered, worker};

#[test]
fn failing_component_does_not_stop_the_tick() {
    let (bridges, writes) = recording_ess();
    let mut w = worker(
        bridges,
        unordered(vec![
            Scripted::new("first", vec![Step::Max(setpoint(), -100)]).boxed(),
            Scripted::new(
                "broken",
                vec![Step::Exact(setpoint(), 9999), Step::Fail("sensor missing")],
            )
            .boxed(),
            Scripted::new("last", vec![Step::Min(setpoint(), -300)]).boxed(),
        ]),
    );

    let report = w.run_tick();
    assert_eq!(report.executed, vec!["first", "broken", "last"]);
    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults[0].component, "broken");
    assert_eq!(report.faults[0].message, "sensor missing");

    // The failed component's partial demands are dropped.
    assert_eq!(report.written(&setpoint()), Some(&Value::Int(-100)));
    assert_eq!(writes.lock().unwrap().len(), 1);

    assert_eq!(w.registry().fault_count("broken"), Some(1));
    assert_eq!(w.registry().fault_count("first"), Some(0));
    assert_eq!(w.registry().fault_count("last"), Some(0));
}

#[test]
fn threshold_excludes_component_until_reset() {
    let (bridges, _) = recording_ess();
    let mut w = worker(
        bridges,
        unordered(vec![
            Scripted::new("broken", vec![Step::Fail("nope")]).boxed(),
            Scripted::new("ok", vec![]).boxed(),
        ]),
    );
    let threshold = w.config().fault_threshold;

    for _ in 0..threshold {
        assert!(w.run_tick().faulted.is_empty());
    }
    let report = w.run_tick();
    assert_eq!(report.faulted, vec!["broken"]);
    assert_eq!(w.registry().state("broken"), Some(ComponentState::Faulted));

    let report = w.run_tick();
    assert_eq!(report.executed, vec!["ok"]);

    let state = ChannelId::new("broken", STATE_CHANNEL);
    let count = ChannelId::new("broken", FAULT_COUNT_CHANNEL);
    assert_eq!(w.image().current(&state).unwrap(), Some(Value::Enum(1)));
    assert_eq!(
        w.image().current(&count).unwrap(),
        Some(Value::Long(i64::from(threshold) + 1))
    );

    assert!(w.reset_fault("broken"));
    w.run_tick();
    assert_eq!(w.registry().state("broken"), Some(ComponentState::Active));
}

#[test]
fn strict_read_of_missing_value_faults_only_the_reader() {
    let (bridges, _) = recording_ess();
    let mut w = worker(
        bridges,
        unordered(vec![
            Scripted::new("reader", vec![Step::StrictRead(meter())]).boxed(),
            Scripted::new("sibling", vec![Step::Exact(setpoint(), -50)]).boxed(),
        ]),
    );

    for tick in 1..=3 {
        let report = w.run_tick();
        assert_eq!(report.faults.len(), 1);
        assert!(report.faults[0].message.contains("invalid value"));
        assert_eq!(report.written(&setpoint()), Some(&Value::Int(-50)));
        assert_eq!(w.registry().fault_count("reader"), Some(tick));
    }
    assert_eq!(w.image().current(&meter()).unwrap(), None);
}
