//! Component model: the [`Component`] contract and the per-tick view
//! ([`TickContext`]) a component executes against.

use std::fmt;
use std::time::{Duration, SystemTime};

use ems_common::channel::{ChannelId, FromValue, Value};
use ems_common::error::{ChannelError, ComponentFault};
use serde::Serialize;

use crate::arbitration::Demand;
use crate::process_image::ProcessImage;

// ─── Component ──────────────────────────────────────────────────────

/// A driver or controller scheduled once per tick.
pub trait Component {
    /// Unique component id (also the component part of its channel ids).
    fn id(&self) -> &str;

    /// Channels this component owns.
    fn owned_channels(&self) -> &[ChannelId];

    /// Run one tick against the frozen snapshot.
    ///
    /// Errors and panics are contained by the cycle worker and counted
    /// against this component only.
    fn execute(&mut self, ctx: &TickContext<'_>) -> Result<(), ComponentFault>;
}

/// Lifecycle state of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    #[default]
    Active,
    /// Excluded from scheduling until reset.
    Faulted,
}

impl ComponentState {
    /// Value published on the `<id>/State` channel.
    pub const fn as_enum(self) -> i32 {
        match self {
            Self::Active => 0,
            Self::Faulted => 1,
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Faulted => write!(f, "faulted"),
        }
    }
}

// ─── Tick ───────────────────────────────────────────────────────────

/// Identity and timing of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Monotonic tick counter, starting at 1.
    pub number: u64,
    /// Wall-clock start of the tick.
    pub started_at: SystemTime,
    /// Target duration.
    pub target: Duration,
}

// ─── Tick Context ───────────────────────────────────────────────────

/// What a component sees while it executes: the frozen `current` values,
/// its own `next` values, and the write-request queues.
pub struct TickContext<'a> {
    image: &'a ProcessImage,
    component: &'a str,
    tick: Tick,
}

impl<'a> TickContext<'a> {
    pub fn new(image: &'a ProcessImage, component: &'a str, tick: Tick) -> Self {
        Self {
            image,
            component,
            tick,
        }
    }

    pub fn tick(&self) -> &Tick {
        &self.tick
    }

    /// Id of the executing component.
    pub fn component(&self) -> &str {
        self.component
    }

    // ── Reads ──

    /// Current value; `None` signals "never successfully read".
    pub fn get(&self, id: &ChannelId) -> Result<Option<Value>, ChannelError> {
        self.image.current(id)
    }

    /// Current value, failing with `InvalidValue` if there is none.
    pub fn get_strict(&self, id: &ChannelId) -> Result<Value, ChannelError> {
        self.image
            .current(id)?
            .ok_or_else(|| ChannelError::InvalidValue(format!("'{id}' has no value")))
    }

    /// Current value, failing with `InvalidValue` if it is missing or was
    /// not refreshed during the last `max_age` ticks.
    pub fn get_fresh(&self, id: &ChannelId, max_age: u64) -> Result<Value, ChannelError> {
        let value = self.get_strict(id)?;
        let age = self.image.age(id)?;
        if age > max_age {
            return Err(ChannelError::InvalidValue(format!(
                "'{id}' is stale ({age} ticks, tolerance {max_age})"
            )));
        }
        Ok(value)
    }

    /// Typed strict read, e.g. `ctx.read::<i32>(&id)`.
    pub fn read<T: FromValue>(&self, id: &ChannelId) -> Result<T, ChannelError> {
        let value = self.get_strict(id)?;
        T::from_value(&value).ok_or_else(|| {
            ChannelError::InvalidValue(format!("'{id}' value {value} is not {}", T::TYPE))
        })
    }

    // ── Writes ──

    /// Overwrite the next value of a readable channel owned by the executing
    /// component. Write-only setpoints change only through resolution.
    pub fn set_next_value(&self, id: &ChannelId, value: impl Into<Value>) -> Result<(), ChannelError> {
        let spec = self
            .image
            .spec(id)
            .ok_or_else(|| ChannelError::UnknownChannel(id.clone()))?;
        if !spec.access.is_readable() {
            return Err(ChannelError::AccessDenied {
                channel: id.clone(),
                operation: "set_next_value",
                access: spec.access,
            });
        }
        if id.component() != self.component {
            return Err(ChannelError::NotOwner {
                channel: id.clone(),
                component: self.component.to_string(),
            });
        }
        self.image.set_next(id, value.into())
    }

    /// Demand an exact value.
    pub fn push_write(&self, id: &ChannelId, value: impl Into<Value>) -> Result<(), ChannelError> {
        self.push(id, Demand::Exact(value.into()))
    }

    /// Demand a lower bound.
    pub fn push_write_min(&self, id: &ChannelId, value: impl Into<Value>) -> Result<(), ChannelError> {
        self.push(id, Demand::Min(value.into()))
    }

    /// Demand an upper bound.
    pub fn push_write_max(&self, id: &ChannelId, value: impl Into<Value>) -> Result<(), ChannelError> {
        self.push(id, Demand::Max(value.into()))
    }

    fn push(&self, id: &ChannelId, demand: Demand) -> Result<(), ChannelError> {
        self.image
            .push_request(id, demand, self.component, self.tick.number)
    }
}
