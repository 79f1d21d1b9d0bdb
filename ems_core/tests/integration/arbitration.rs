//! Integration test: write arbitration through complete ticks.

use ems_common::channel::Value;
use ems_common::error::WriteConflict;

use super::support::{Scripted, Step, recording_ess, setpoint, unordered, worker};

#[test]
fn resolved_value_becomes_current_next_tick() {
    let (bridges, writes) = recording_ess();
    let mut w = worker(
        bridges,
        unordered(vec![Scripted::new("ctrl", vec![Step::Exact(setpoint(), -2500)]).boxed()]),
    );

    assert_eq!(w.image().current(&setpoint()).unwrap(), None);
    let report = w.run_tick();
    assert_eq!(report.written(&setpoint()), Some(&Value::Int(-2500)));
    assert!(report.writes[0].hardware);
    assert_eq!(w.image().current(&setpoint()).unwrap(), Some(Value::Int(-2500)));
    assert_eq!(writes.lock().unwrap().as_slice(), &[(setpoint(), Value::Int(-2500))]);
}

#[test]
fn channel_without_requests_keeps_its_value() {
    let (bridges, writes) = recording_ess();
    let mut w = worker(
        bridges,
        unordered(vec![Scripted::new("ctrl", vec![Step::Exact(setpoint(), 300)]).boxed()]),
    );
    w.run_tick();
    let removed = w.remove_component("ctrl");
    assert!(removed.is_some());

    let report = w.run_tick();
    assert!(report.writes.is_empty());
    assert_eq!(w.image().current(&setpoint()).unwrap(), Some(Value::Int(300)));
    assert_eq!(writes.lock().unwrap().len(), 1);
}

#[test]
fn infeasible_range_skips_hardware_write() {
    let (bridges, writes) = recording_ess();
    let mut w = worker(
        bridges,
        unordered(vec![
            Scripted::new("setter", vec![Step::Exact(setpoint(), 4)]).boxed(),
        ]),
    );
    w.run_tick();
    assert_eq!(w.image().current(&setpoint()).unwrap(), Some(Value::Int(4)));

    w.add_component(
        Scripted::new("low", vec![Step::Min(setpoint(), 5)]).boxed(),
        Default::default(),
    )
    .unwrap();
    w.add_component(
        Scripted::new("high", vec![Step::Max(setpoint(), 3)]).boxed(),
        Default::default(),
    )
    .unwrap();

    let report = w.run_tick();
    assert_eq!(
        report.conflict_on(&setpoint()),
        Some(&WriteConflict::Infeasible {
            channel: setpoint(),
            min: Value::Int(5),
            max: Value::Int(3),
        })
    );
    assert!(report.written(&setpoint()).is_none());
    assert_eq!(writes.lock().unwrap().len(), 1, "no write for the infeasible tick");
    assert_eq!(w.image().current(&setpoint()).unwrap(), Some(Value::Int(4)));
}

#[test]
fn distinct_exact_writes_are_ambiguous_last_registered_wins() {
    let (bridges, writes) = recording_ess();
    let mut w = worker(
        bridges,
        unordered(vec![
            Scripted::new("x", vec![Step::Exact(setpoint(), 10)]).boxed(),
            Scripted::new("y", vec![Step::Exact(setpoint(), 20)]).boxed(),
        ]),
    );

    for _ in 0..3 {
        let report = w.run_tick();
        assert_eq!(
            report.conflict_on(&setpoint()),
            Some(&WriteConflict::Ambiguous {
                channel: setpoint(),
                values: vec![Value::Int(10), Value::Int(20)],
                chosen: Value::Int(20),
            })
        );
        assert_eq!(report.written(&setpoint()), Some(&Value::Int(20)));
    }
    assert!(writes.lock().unwrap().iter().all(|(_, v)| v == &Value::Int(20)));
}

#[test]
fn layered_limits_resolve_to_most_restrictive_upper_bound() {
    let (bridges, writes) = recording_ess();
    let mut w = worker(
        bridges,
        unordered(vec![
            Scripted::new(
                "ctrlX",
                vec![Step::Min(setpoint(), -5000), Step::Max(setpoint(), 0)],
            )
            .boxed(),
            Scripted::new("ctrlY", vec![Step::Max(setpoint(), -1000)]).boxed(),
        ]),
    );

    let report = w.run_tick();
    assert!(report.conflicts.is_empty());
    assert_eq!(report.written(&setpoint()), Some(&Value::Int(-1000)));
    assert_eq!(writes.lock().unwrap().as_slice(), &[(setpoint(), Value::Int(-1000))]);
}

#[test]
fn requests_never_survive_their_tick() {
    let (bridges, _writes) = recording_ess();
    let mut w = worker(
        bridges,
        unordered(vec![Scripted::new("x", vec![Step::Max(setpoint(), -10)]).boxed()]),
    );
    w.run_tick();
    assert!(w.image().requests(&setpoint()).unwrap().is_empty());
}
