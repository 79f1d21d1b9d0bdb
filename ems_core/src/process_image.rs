//! Process image: current/next double buffer of every channel.
//!
//! `current` is frozen for the duration of a tick. `next` lives in a
//! [`ValueSlot`] shared with the bridge worker that polls the channel, so
//! readings land there at any time without touching the tick thread.
//! [`ProcessImage::swap`] copies `next` into `current` once per tick and
//! drops all queued write requests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use ems_common::channel::{AccessMode, ChannelId, ChannelSpec, Value, ValueSlot};
use ems_common::config::RangePolicy;
use ems_common::error::{ChannelError, ConfigurationError};

use crate::arbitration::{self, Demand, Resolution, WriteRequest};

struct Entry {
    spec: ChannelSpec,
    current: Option<Value>,
    next: Arc<ValueSlot>,
    requests: RefCell<Vec<WriteRequest>>,
    /// Slot update count seen at the last latch.
    seen_updates: u64,
    /// Ticks since `current` last received a fresh value.
    age: u64,
}

impl Entry {
    fn new(spec: ChannelSpec) -> Self {
        Self {
            spec,
            current: None,
            next: Arc::new(ValueSlot::new()),
            requests: RefCell::new(Vec::new()),
            seen_updates: 0,
            age: 0,
        }
    }

    fn latch(&mut self) {
        let (value, updates) = self.next.snapshot();
        if updates != self.seen_updates {
            self.seen_updates = updates;
            self.age = 0;
        } else {
            self.age = self.age.saturating_add(1);
        }
        self.current = value;
    }
}

/// Two generations of every channel's value plus the per-tick request queues.
///
/// Request queues use interior mutability: they are only touched from the
/// tick thread during EXECUTE, so no locking is involved.
#[derive(Default)]
pub struct ProcessImage {
    entries: Vec<Entry>,
    index: HashMap<ChannelId, usize>,
    sequence: Cell<u64>,
}

impl ProcessImage {
    /// Empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an image from the static channel list.
    pub fn from_specs(specs: impl IntoIterator<Item = ChannelSpec>) -> Result<Self, ConfigurationError> {
        let mut image = Self::new();
        for spec in specs {
            image.add_channel(spec)?;
        }
        Ok(image)
    }

    /// Add one channel. Only allowed between ticks.
    pub fn add_channel(&mut self, spec: ChannelSpec) -> Result<(), ConfigurationError> {
        if self.index.contains_key(&spec.id) {
            return Err(ConfigurationError::DuplicateChannel(spec.id));
        }
        self.index.insert(spec.id.clone(), self.entries.len());
        self.entries.push(Entry::new(spec));
        Ok(())
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ChannelId) -> bool {
        self.index.contains_key(id)
    }

    /// All channel descriptions, in declaration order.
    pub fn specs(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.entries.iter().map(|e| &e.spec)
    }

    pub fn spec(&self, id: &ChannelId) -> Option<&ChannelSpec> {
        self.entry(id).ok().map(|e| &e.spec)
    }

    /// Shared `next` slot of a channel, handed to the bridge polling it.
    pub fn slot(&self, id: &ChannelId) -> Option<Arc<ValueSlot>> {
        self.entry(id).ok().map(|e| Arc::clone(&e.next))
    }

    fn entry(&self, id: &ChannelId) -> Result<&Entry, ChannelError> {
        self.index
            .get(id)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| ChannelError::UnknownChannel(id.clone()))
    }

    // ─── Values ─────────────────────────────────────────────────────

    /// Current (frozen) value. `None` means never successfully read.
    pub fn current(&self, id: &ChannelId) -> Result<Option<Value>, ChannelError> {
        Ok(self.entry(id)?.current.clone())
    }

    /// Ticks since the current value was last refreshed.
    pub fn age(&self, id: &ChannelId) -> Result<u64, ChannelError> {
        Ok(self.entry(id)?.age)
    }

    /// Pending next value.
    pub fn next(&self, id: &ChannelId) -> Result<Option<Value>, ChannelError> {
        Ok(self.entry(id)?.next.load())
    }

    /// Overwrite the next value after converting it to the channel type.
    /// Ownership is checked by the caller.
    pub fn set_next(&self, id: &ChannelId, value: Value) -> Result<(), ChannelError> {
        let entry = self.entry(id)?;
        let value = entry.spec.coerce(value)?;
        entry.next.publish(value);
        Ok(())
    }

    // ─── Write requests ─────────────────────────────────────────────

    /// Queue a demand against a write channel.
    ///
    /// # Errors
    /// - `AccessDenied` on read-only channels
    /// - `InvalidValue` if the value cannot be converted to the channel type,
    ///   or for range demands on non-numeric channels
    pub fn push_request(
        &self,
        id: &ChannelId,
        demand: Demand,
        component: &str,
        tick: u64,
    ) -> Result<(), ChannelError> {
        let entry = self.entry(id)?;
        let operation = match &demand {
            Demand::Exact(_) => "push_write",
            Demand::Min(_) => "push_write_min",
            Demand::Max(_) => "push_write_max",
        };
        if !entry.spec.access.is_writable() {
            return Err(ChannelError::AccessDenied {
                channel: id.clone(),
                operation,
                access: entry.spec.access,
            });
        }
        let demand = match demand {
            Demand::Exact(v) => Demand::Exact(entry.spec.coerce(v)?),
            Demand::Min(v) | Demand::Max(v) if !entry.spec.value_type.is_numeric() => {
                return Err(ChannelError::InvalidValue(format!(
                    "{operation}({v}) on {} channel '{id}'",
                    entry.spec.value_type
                )));
            }
            Demand::Min(v) => Demand::Min(entry.spec.coerce(v)?),
            Demand::Max(v) => Demand::Max(entry.spec.coerce(v)?),
        };

        let sequence = self.sequence.get();
        self.sequence.set(sequence + 1);
        entry.requests.borrow_mut().push(WriteRequest {
            demand,
            component: component.to_string(),
            tick,
            sequence,
        });
        Ok(())
    }

    /// Requests currently queued against `id`.
    pub fn requests(&self, id: &ChannelId) -> Result<Vec<WriteRequest>, ChannelError> {
        Ok(self.entry(id)?.requests.borrow().clone())
    }

    /// Drop every request issued by `component`. Returns how many were dropped.
    pub fn discard_requests_from(&self, component: &str) -> usize {
        self.entries
            .iter()
            .map(|e| {
                let mut requests = e.requests.borrow_mut();
                let before = requests.len();
                requests.retain(|r| r.component != component);
                before - requests.len()
            })
            .sum()
    }

    /// Drop all queued requests. Returns how many were dropped.
    pub fn clear_requests(&self) -> usize {
        self.sequence.set(0);
        self.entries
            .iter()
            .map(|e| std::mem::take(&mut *e.requests.borrow_mut()).len())
            .sum()
    }

    /// Resolve every channel that received at least one request, in
    /// declaration order.
    pub fn resolve_pending(&self, policy: RangePolicy) -> Vec<(ChannelId, Resolution)> {
        self.entries
            .iter()
            .filter_map(|e| {
                let requests = e.requests.borrow();
                if requests.is_empty() {
                    return None;
                }
                Some((
                    e.spec.id.clone(),
                    arbitration::resolve(&e.spec, &requests, policy),
                ))
            })
            .collect()
    }

    // ─── Generation swap ────────────────────────────────────────────

    /// `current := next` for every channel; request queues are cleared.
    pub fn swap(&mut self) {
        for entry in &mut self.entries {
            entry.latch();
        }
        self.clear_requests();
    }

    /// Latch the channels owned by `component` outside the regular swap.
    ///
    /// Used for derived values computed after the swap, so the following
    /// tick observes them.
    pub fn promote(&mut self, component: &str) {
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.spec.id.component() == component)
            .filter(|e| e.next.updates() != e.seen_updates)
        {
            entry.latch();
        }
    }

    /// Add a read-only lifecycle channel, or keep an existing one.
    pub(crate) fn ensure_status_channel(&mut self, spec: ChannelSpec) -> Result<(), ConfigurationError> {
        match self.spec(&spec.id) {
            Some(existing) if existing.value_type == spec.value_type => Ok(()),
            Some(_) => Err(ConfigurationError::DuplicateChannel(spec.id)),
            None => self.add_channel(ChannelSpec {
                access: AccessMode::ReadOnly,
                ..spec
            }),
        }
    }
}
