//! Integration test: declared execution order.

use std::cell::RefCell;
use std::rc::Rc;

use ems_common::error::ConfigurationError;
use ems_core::registry::{ComponentRegistry, Schedule};

use super::support::{Log, Scripted, recording_ess, worker};

fn before(ids: &[&str]) -> Schedule {
    Schedule {
        runs_before: ids.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

fn after(ids: &[&str]) -> Schedule {
    Schedule {
        runs_after: ids.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

#[test]
fn runs_before_holds_every_tick() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let (bridges, _) = recording_ess();
    let mut w = worker(
        bridges,
        vec![
            (Scripted::new("b", vec![]).logging(&log).boxed(), Schedule::default()),
            (Scripted::new("c", vec![]).logging(&log).boxed(), after(&["b"])),
            (Scripted::new("a", vec![]).logging(&log).boxed(), before(&["b"])),
        ],
    );

    for tick in 0..5 {
        let report = w.run_tick();
        assert_eq!(report.executed, vec!["a", "b", "c"]);
        assert_eq!(&log.borrow()[tick * 3..], &["a", "b", "c"]);
    }
}

#[test]
fn unrelated_components_keep_insertion_order() {
    let (bridges, _) = recording_ess();
    let mut w = worker(
        bridges,
        vec![
            (Scripted::new("z", vec![]).boxed(), Schedule::default()),
            (Scripted::new("m", vec![]).boxed(), Schedule::default()),
            (Scripted::new("k", vec![]).boxed(), before(&["z"])),
        ],
    );
    assert_eq!(w.run_tick().executed, vec!["m", "k", "z"]);
}

#[test]
fn cyclic_order_is_fatal() {
    let mut registry = ComponentRegistry::new(3);
    let err = registry
        .register_all(vec![
            (Scripted::new("a", vec![]).boxed(), before(&["b"])),
            (Scripted::new("b", vec![]).boxed(), before(&["c"])),
            (Scripted::new("c", vec![]).boxed(), before(&["a"])),
        ])
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::Cycle(ref ids) if ids.len() == 4));
    assert!(registry.is_empty());
}
