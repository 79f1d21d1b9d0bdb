//! Single-slot value cell between a publisher thread and the tick thread.

use parking_lot::Mutex;

use super::Value;

/// Last-write-wins cell holding a channel's *next* value.
///
/// Publishers (bridge worker threads, or the owning component on the tick
/// thread) overwrite the slot; the process image copies it into the current
/// generation at every swap. There is no queue: a value overwritten before the
/// swap is simply lost.
#[derive(Debug, Default)]
pub struct ValueSlot {
    inner: Mutex<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    value: Option<Value>,
    /// Number of publications since creation.
    updates: u64,
}

impl ValueSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the next value.
    pub fn publish(&self, value: Value) {
        let mut state = self.inner.lock();
        state.value = Some(value);
        state.updates = state.updates.wrapping_add(1);
    }

    /// Copy of the current slot content.
    pub fn load(&self) -> Option<Value> {
        self.inner.lock().value.clone()
    }

    /// Copy of the slot content together with its update counter.
    pub fn snapshot(&self) -> (Option<Value>, u64) {
        let state = self.inner.lock();
        (state.value.clone(), state.updates)
    }

    /// Number of publications so far.
    pub fn updates(&self) -> u64 {
        self.inner.lock().updates
    }
}
