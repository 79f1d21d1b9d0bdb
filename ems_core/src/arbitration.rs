//! Write-constraint resolution.
//!
//! Every write-capable channel accumulates [`WriteRequest`]s during EXECUTE.
//! RESOLVE_WRITES reduces them to one effective value per channel:
//!
//! 1. `effective_min` = max of all `Min` demands and the channel floor.
//! 2. `effective_max` = min of all `Max` demands and the channel ceiling.
//! 3. `effective_min > effective_max` → [`WriteConflict::Infeasible`], no value.
//! 4. Exact demands: the most recently issued one wins, clamped against
//!    each effective bound that is present (a single bound clamps too);
//!    distinct exact values raise [`WriteConflict::Ambiguous`].
//! 5. Range demands only: point-equal bounds, else the channel's
//!    `write_default`, else the bound selected by [`RangePolicy`].
//!
//! [`resolve`] is a pure function of its inputs.

use std::cmp::Ordering;

use ems_common::channel::{ChannelSpec, ComponentId, Value};
use ems_common::config::RangePolicy;
use ems_common::error::WriteConflict;
use serde::Serialize;

// ─── Requests ───────────────────────────────────────────────────────

/// What a component asks of a write channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Demand {
    /// Set exactly this value.
    Exact(Value),
    /// Value must not be lower than this.
    Min(Value),
    /// Value must not be higher than this.
    Max(Value),
}

impl Demand {
    /// The demanded value.
    pub fn value(&self) -> &Value {
        match self {
            Self::Exact(v) | Self::Min(v) | Self::Max(v) => v,
        }
    }
}

/// One queued demand, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteRequest {
    pub demand: Demand,
    /// Issuing component.
    pub component: ComponentId,
    /// Tick the request was issued in.
    pub tick: u64,
    /// Issue order within the tick (monotonic across all channels).
    pub sequence: u64,
}

// ─── Resolution ─────────────────────────────────────────────────────

/// Result of resolving one channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Resolution {
    /// Hardware-write candidate; `None` when the write is skipped.
    pub value: Option<Value>,
    /// Logged conflict outcomes (at most one of each kind).
    pub conflicts: Vec<WriteConflict>,
}

fn lower(a: &Value, b: &Value) -> bool {
    a.cmp_numeric(b) == Some(Ordering::Less)
}

/// Fold `candidates` into the tightest bound. `tighter(a, b)` is true if `a`
/// is more restrictive than `b`.
fn tightest<'a>(
    candidates: impl Iterator<Item = &'a Value>,
    tighter: impl Fn(&Value, &Value) -> bool,
) -> Option<&'a Value> {
    candidates.fold(None, |best, v| match best {
        Some(b) if !tighter(v, b) => Some(b),
        _ => Some(v),
    })
}

fn clamp(value: &Value, min: Option<&Value>, max: Option<&Value>) -> Value {
    if let Some(min) = min {
        if lower(value, min) {
            return min.clone();
        }
    }
    if let Some(max) = max {
        if lower(max, value) {
            return max.clone();
        }
    }
    value.clone()
}

/// Reduce all requests issued against `spec` in one tick.
///
/// Requests are expected to be converted to the channel type already. An
/// empty request set resolves to no value, and so does a set containing a
/// NaN or infinite demand: no bound can be trusted then.
pub fn resolve(spec: &ChannelSpec, requests: &[WriteRequest], policy: RangePolicy) -> Resolution {
    if requests.is_empty() || requests.iter().any(|r| !r.demand.value().is_finite()) {
        return Resolution::default();
    }

    let mins = requests.iter().filter_map(|r| match &r.demand {
        Demand::Min(v) => Some(v),
        _ => None,
    });
    let maxs = requests.iter().filter_map(|r| match &r.demand {
        Demand::Max(v) => Some(v),
        _ => None,
    });
    let effective_min = tightest(mins.chain(spec.floor.as_ref()), |a, b| lower(b, a));
    let effective_max = tightest(maxs.chain(spec.ceiling.as_ref()), lower);

    if let (Some(min), Some(max)) = (effective_min, effective_max) {
        if lower(max, min) {
            return Resolution {
                value: None,
                conflicts: vec![WriteConflict::Infeasible {
                    channel: spec.id.clone(),
                    min: min.clone(),
                    max: max.clone(),
                }],
            };
        }
    }

    let mut conflicts = Vec::new();
    let latest_exact = requests
        .iter()
        .filter(|r| matches!(r.demand, Demand::Exact(_)))
        .max_by_key(|r| r.sequence);

    let value = match latest_exact {
        Some(latest) => {
            let chosen = latest.demand.value();
            let mut distinct: Vec<Value> = Vec::new();
            for r in requests {
                if let Demand::Exact(v) = &r.demand {
                    if !distinct.contains(v) {
                        distinct.push(v.clone());
                    }
                }
            }
            let applied = clamp(chosen, effective_min, effective_max);
            if distinct.len() > 1 {
                conflicts.push(WriteConflict::Ambiguous {
                    channel: spec.id.clone(),
                    values: distinct,
                    chosen: applied.clone(),
                });
            }
            applied
        }
        None => match (effective_min, effective_max) {
            (Some(min), Some(max)) if min.cmp_numeric(max) == Some(Ordering::Equal) => max.clone(),
            _ => match &spec.write_default {
                Some(default) => clamp(default, effective_min, effective_max),
                None => {
                    let bound = match policy {
                        RangePolicy::UpperBound => effective_max.or(effective_min),
                        RangePolicy::LowerBound => effective_min.or(effective_max),
                    };
                    // Only range demands were issued, so at least one bound exists.
                    match bound {
                        Some(v) => v.clone(),
                        None => return Resolution::default(),
                    }
                }
            },
        },
    };

    Resolution {
        value: Some(value),
        conflicts,
    }
}
