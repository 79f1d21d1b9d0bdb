//! Component registry.
//!
//! Holds every schedulable component together with its declared ordering,
//! lifecycle state and fault counter. Execution order is the topological
//! sort of the declared `runs_before`/`runs_after` partial order; components
//! with no relation between them keep insertion order.
//!
//! The registry is owned by the cycle worker and only mutated between ticks.

use std::collections::{BTreeSet, HashMap};

use ems_common::channel::ComponentId;
use ems_common::config::{ComponentConfig, ExecutionPhase};
use ems_common::error::ConfigurationError;
use tracing::{info, warn};

use crate::component::{Component, ComponentState};

/// Scheduling declaration of one component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    /// Components that must run after this one.
    pub runs_before: Vec<ComponentId>,
    /// Components that must run before this one.
    pub runs_after: Vec<ComponentId>,
    pub phase: ExecutionPhase,
    /// Overrides the worker's fault threshold.
    pub fault_threshold: Option<u32>,
}

impl From<&ComponentConfig> for Schedule {
    fn from(config: &ComponentConfig) -> Self {
        Self {
            runs_before: config.runs_before.clone(),
            runs_after: config.runs_after.clone(),
            phase: config.phase,
            fault_threshold: config.fault_threshold,
        }
    }
}

pub(crate) struct Slot {
    pub(crate) component: Box<dyn Component>,
    pub(crate) schedule: Schedule,
    pub(crate) state: ComponentState,
    pub(crate) faults: u32,
}

/// Outcome of recording one fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultOutcome {
    /// Cumulative fault count.
    pub faults: u32,
    /// True if this fault moved the component to `Faulted`.
    pub faulted: bool,
}

/// Ordered set of components.
pub struct ComponentRegistry {
    slots: Vec<Slot>,
    /// Indices into `slots`, in execution order.
    order: Vec<usize>,
    default_threshold: u32,
}

impl ComponentRegistry {
    pub fn new(default_threshold: u32) -> Self {
        Self {
            slots: Vec::new(),
            order: Vec::new(),
            default_threshold,
        }
    }

    /// Register a component for the EXECUTE phase.
    ///
    /// # Errors
    /// `DuplicateComponent`, `UnresolvedDependency` or `Cycle`; the registry
    /// is left unchanged on error.
    pub fn register(
        &mut self,
        component: Box<dyn Component>,
        runs_before: &[&str],
        runs_after: &[&str],
    ) -> Result<(), ConfigurationError> {
        let schedule = Schedule {
            runs_before: runs_before.iter().map(|s| s.to_string()).collect(),
            runs_after: runs_after.iter().map(|s| s.to_string()).collect(),
            ..Schedule::default()
        };
        self.register_with(component, schedule)
    }

    /// Register a component with a full scheduling declaration.
    ///
    /// Ordering references must name already registered components; use
    /// [`ComponentRegistry::register_all`] for a batch in arbitrary order.
    pub fn register_with(
        &mut self,
        component: Box<dyn Component>,
        schedule: Schedule,
    ) -> Result<(), ConfigurationError> {
        self.register_all(vec![(component, schedule)])
    }

    /// Register a batch of components whose declarations may reference each
    /// other in any order.
    pub fn register_all(
        &mut self,
        batch: Vec<(Box<dyn Component>, Schedule)>,
    ) -> Result<(), ConfigurationError> {
        let base = self.slots.len();
        for (component, schedule) in batch {
            if self.index_of(component.id()).is_some() {
                let id = component.id().to_string();
                self.slots.truncate(base);
                return Err(ConfigurationError::DuplicateComponent(id));
            }
            self.slots.push(Slot {
                component,
                schedule,
                state: ComponentState::Active,
                faults: 0,
            });
        }

        match compute_order(&self.slots) {
            Ok(order) => {
                self.order = order;
                Ok(())
            }
            Err(e) => {
                self.slots.truncate(base);
                Err(e)
            }
        }
    }

    /// Remove a component. Ordering declarations of the remaining components
    /// that reference it are dropped with it.
    pub fn remove(&mut self, id: &str) -> Option<Box<dyn Component>> {
        let index = self.index_of(id)?;
        let slot = self.slots.remove(index);
        for other in &mut self.slots {
            other.schedule.runs_before.retain(|d| d != id);
            other.schedule.runs_after.retain(|d| d != id);
        }
        // Removing a node cannot introduce a cycle or a dangling reference.
        self.order = compute_order(&self.slots).unwrap_or_default();
        info!("Component '{}' removed", id);
        Some(slot.component)
    }

    /// Return a `Faulted` component to `Active` and clear its fault counter.
    ///
    /// Returns `false` if no such component is registered.
    pub fn reset_fault(&mut self, id: &str) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let slot = &mut self.slots[index];
        if slot.state == ComponentState::Faulted {
            info!("Component '{}' reset after {} faults", id, slot.faults);
        }
        slot.state = ComponentState::Active;
        slot.faults = 0;
        true
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    /// Component ids in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.slots[i].component.id()).collect()
    }

    /// Component ids of one phase, in execution order.
    pub fn order_of(&self, phase: ExecutionPhase) -> Vec<&str> {
        self.order
            .iter()
            .map(|&i| &self.slots[i])
            .filter(|s| s.schedule.phase == phase)
            .map(|s| s.component.id())
            .collect()
    }

    pub fn state(&self, id: &str) -> Option<ComponentState> {
        self.index_of(id).map(|i| self.slots[i].state)
    }

    pub fn fault_count(&self, id: &str) -> Option<u32> {
        self.index_of(id).map(|i| self.slots[i].faults)
    }

    pub fn get(&self, id: &str) -> Option<&dyn Component> {
        self.index_of(id).map(|i| self.slots[i].component.as_ref())
    }

    // ── Worker-side access ──

    /// Slot indices of `phase`, in execution order.
    pub(crate) fn schedule_of(&self, phase: ExecutionPhase) -> Vec<usize> {
        self.order
            .iter()
            .copied()
            .filter(|&i| self.slots[i].schedule.phase == phase)
            .collect()
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.slots[index]
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    /// Count one fault against the component at `index`.
    pub(crate) fn record_fault(&mut self, index: usize) -> FaultOutcome {
        let threshold = self.default_threshold;
        let slot = &mut self.slots[index];
        slot.faults = slot.faults.saturating_add(1);
        let limit = slot.schedule.fault_threshold.unwrap_or(threshold);
        let faulted = slot.state == ComponentState::Active && slot.faults > limit;
        if faulted {
            slot.state = ComponentState::Faulted;
            warn!(
                component = slot.component.id(),
                faults = slot.faults,
                "Component exceeded fault threshold {}, now faulted",
                limit
            );
        }
        FaultOutcome {
            faults: slot.faults,
            faulted,
        }
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.component.id() == id)
    }
}

/// Stable topological sort (Kahn, lowest insertion index first).
fn compute_order(slots: &[Slot]) -> Result<Vec<usize>, ConfigurationError> {
    let index: HashMap<&str, usize> = slots
        .iter()
        .enumerate()
        .map(|(i, s)| (s.component.id(), i))
        .collect();

    let n = slots.len();
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for (i, slot) in slots.iter().enumerate() {
        let resolve = |dep: &ComponentId| {
            index
                .get(dep.as_str())
                .copied()
                .ok_or_else(|| ConfigurationError::UnresolvedDependency {
                    component: slot.component.id().to_string(),
                    dependency: dep.clone(),
                })
        };
        for dep in &slot.schedule.runs_before {
            let j = resolve(dep)?;
            successors[i].insert(j);
        }
        for dep in &slot.schedule.runs_after {
            let j = resolve(dep)?;
            successors[j].insert(i);
        }
    }

    let mut in_degree = vec![0usize; n];
    for succ in &successors {
        for &j in succ {
            in_degree[j] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &j in &successors[i] {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if order.len() < n {
        return Err(ConfigurationError::Cycle(find_cycle(slots, &successors, &in_degree)));
    }
    Ok(order)
}

/// Extract one cycle among the nodes Kahn's algorithm could not place.
fn find_cycle(slots: &[Slot], successors: &[BTreeSet<usize>], in_degree: &[usize]) -> Vec<ComponentId> {
    let stuck = |i: usize| in_degree[i] > 0;
    let Some(start) = (0..slots.len()).find(|&i| stuck(i)) else {
        return Vec::new();
    };

    // Every stuck node has a stuck successor; walk until a node repeats.
    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(next) = successors[current].iter().copied().find(|&j| stuck(j)) else {
            break;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle: Vec<ComponentId> = path[pos..]
                .iter()
                .map(|&i| slots[i].component.id().to_string())
                .collect();
            cycle.push(slots[next].component.id().to_string());
            return cycle;
        }
        path.push(next);
        current = next;
    }
    path.iter().map(|&i| slots[i].component.id().to_string()).collect()
}
