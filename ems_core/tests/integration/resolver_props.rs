//! Property tests for the write-constraint resolver.

use ems_common::channel::{AccessMode, ChannelId, ChannelSpec, Value, ValueType};
use ems_common::config::RangePolicy;
use ems_common::error::WriteConflict;
use ems_core::arbitration::{Demand, WriteRequest, resolve};
use proptest::prelude::*;

fn spec() -> ChannelSpec {
    ChannelSpec::new(
        ChannelId::new("ess0", "SetActivePower"),
        ValueType::Long,
        AccessMode::WriteOnly,
    )
}

fn tagged(demands: Vec<Demand>) -> Vec<WriteRequest> {
    demands
        .into_iter()
        .enumerate()
        .map(|(i, demand)| WriteRequest {
            demand,
            component: format!("c{i}"),
            tick: 1,
            sequence: i as u64,
        })
        .collect()
}

fn demand() -> impl Strategy<Value = Demand> {
    prop_oneof![
        (-10_000i64..10_000).prop_map(|v| Demand::Exact(Value::Long(v))),
        (-10_000i64..10_000).prop_map(|v| Demand::Min(Value::Long(v))),
        (-10_000i64..10_000).prop_map(|v| Demand::Max(Value::Long(v))),
    ]
}

fn bound(demands: &[Demand], pick: fn(&Demand) -> Option<i64>) -> Vec<i64> {
    demands.iter().filter_map(pick).collect()
}

proptest! {
    #[test]
    fn max_only_resolves_to_smallest_max(maxs in prop::collection::vec(-100_000i64..100_000, 1..16)) {
        let requests = tagged(maxs.iter().map(|&m| Demand::Max(Value::Long(m))).collect());
        let resolution = resolve(&spec(), &requests, RangePolicy::UpperBound);
        prop_assert_eq!(resolution.value, Some(Value::Long(*maxs.iter().min().unwrap())));
        prop_assert!(resolution.conflicts.is_empty());
    }

    #[test]
    fn resolution_is_deterministic(demands in prop::collection::vec(demand(), 0..12)) {
        let requests = tagged(demands);
        let a = resolve(&spec(), &requests, RangePolicy::UpperBound);
        let b = resolve(&spec(), &requests, RangePolicy::UpperBound);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn resolved_value_respects_every_bound(demands in prop::collection::vec(demand(), 1..12)) {
        let mins = bound(&demands, |d| match d { Demand::Min(v) => v.as_i64(), _ => None });
        let maxs = bound(&demands, |d| match d { Demand::Max(v) => v.as_i64(), _ => None });
        let lo = mins.iter().max().copied();
        let hi = maxs.iter().min().copied();

        let resolution = resolve(&spec(), &tagged(demands), RangePolicy::UpperBound);
        match (lo, hi) {
            (Some(lo), Some(hi)) if lo > hi => {
                prop_assert_eq!(resolution.value, None);
                let infeasible = matches!(resolution.conflicts[..], [WriteConflict::Infeasible { .. }]);
                prop_assert!(infeasible);
            }
            _ => {
                let v = resolution.value.and_then(|v| v.as_i64()).unwrap();
                if let Some(lo) = lo { prop_assert!(v >= lo); }
                if let Some(hi) = hi { prop_assert!(v <= hi); }
            }
        }
    }
}
