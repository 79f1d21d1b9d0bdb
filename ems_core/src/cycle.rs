//! Tick loop: read → execute → resolve writes → hardware write → swap.
//!
//! ## Tick Sequence
//! 1. **READ**: wait (bounded by `read_grace_ms`) for one fresh poll round
//!    from every bridge. Bridges publish into `next` on their own threads.
//! 2. **EXECUTE**: components run in registry order against the frozen
//!    `current` snapshot. Errors and panics are contained per component.
//! 3. **RESOLVE_WRITES**: one resolution per channel that received requests.
//! 4. **HARDWARE_WRITE**: resolved values go to the owning bridge with a
//!    bounded timeout. Channels without a bridge take the value directly.
//! 5. **SWAP**: lifecycle channels are updated, `next` is copied to
//!    `current`, after-process-image components run.
//!
//! An overrun (EXECUTE through HARDWARE_WRITE above the target) is recorded
//! and the next tick starts immediately. Stop requests are honoured between ticks only.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use ems_common::channel::{AccessMode, ChannelId, ChannelSpec, ComponentId, Value, ValueType};
use ems_common::config::{CycleConfig, ExecutionPhase};
use ems_common::consts::{FAULT_COUNT_CHANNEL, STATE_CHANNEL};
use ems_common::error::{ConfigurationError, WriteConflict};
use ems_hal::BridgeSet;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::component::{Component, ComponentState, Tick, TickContext};
use crate::process_image::ProcessImage;
use crate::registry::{ComponentRegistry, Schedule};

/// Consecutive overruns are logged only every N ticks.
const OVERRUN_LOG_INTERVAL: u64 = 100;

/// Granularity of the stop-flag check while idling between ticks.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

// ─── Cycle Statistics ───────────────────────────────────────────────

/// Aggregated timing and event counters. Updated once per tick.
#[derive(Debug, Clone, Serialize)]
pub struct CycleStats {
    /// Total ticks executed.
    pub tick_count: u64,
    /// Busy time of the last tick [ns].
    pub last_tick_ns: u64,
    /// Minimum busy time [ns].
    pub min_tick_ns: u64,
    /// Maximum busy time [ns].
    pub max_tick_ns: u64,
    /// Running sum for average computation.
    pub sum_tick_ns: u64,
    /// Ticks whose busy time exceeded the target.
    pub overruns: u64,
    /// Ticks whose READ phase ran out of grace before all bridges delivered.
    pub stale_reads: u64,
    pub component_faults: u64,
    pub write_conflicts: u64,
    pub bridge_errors: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            tick_count: 0,
            last_tick_ns: 0,
            min_tick_ns: u64::MAX,
            max_tick_ns: 0,
            sum_tick_ns: 0,
            overruns: 0,
            stale_reads: 0,
            component_faults: 0,
            write_conflicts: 0,
            bridge_errors: 0,
        }
    }

    /// Fold one tick report into the counters.
    pub fn record(&mut self, report: &TickReport) {
        let busy_ns = report.busy_us.saturating_mul(1000);
        self.tick_count += 1;
        self.last_tick_ns = busy_ns;
        self.min_tick_ns = self.min_tick_ns.min(busy_ns);
        self.max_tick_ns = self.max_tick_ns.max(busy_ns);
        self.sum_tick_ns = self.sum_tick_ns.saturating_add(busy_ns);
        if report.overrun {
            self.overruns += 1;
        }
        if !report.fresh_readings {
            self.stale_reads += 1;
        }
        self.component_faults += report.faults.len() as u64;
        self.write_conflicts += report.conflicts.len() as u64;
        self.bridge_errors += report.bridge_errors.len() as u64;
    }

    /// Average busy time [ns] (0 if no ticks).
    pub fn avg_tick_ns(&self) -> u64 {
        if self.tick_count == 0 {
            0
        } else {
            self.sum_tick_ns / self.tick_count
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tick Report ────────────────────────────────────────────────────

/// One contained component failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultRecord {
    pub component: ComponentId,
    pub message: String,
    /// Cumulative fault count after this failure.
    pub fault_count: u32,
}

/// One failed hardware write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeFailure {
    pub channel: ChannelId,
    pub value: Value,
    pub error: String,
}

/// One resolved value that reached `next`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedWrite {
    pub channel: ChannelId,
    pub value: Value,
    /// False for channels without a bridge.
    pub hardware: bool,
}

/// Structured record of one tick, emitted for external collectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    /// Wall-clock start [ms since the Unix epoch].
    pub timestamp_ms: u64,
    /// Time spent waiting for bridge readings [µs].
    pub read_wait_us: u64,
    /// EXECUTE through HARDWARE_WRITE [µs]; the overrun budget.
    pub busy_us: u64,
    pub overrun: bool,
    /// Every bridge delivered a poll round within the grace window.
    pub fresh_readings: bool,
    /// Components invoked this tick, in invocation order.
    pub executed: Vec<ComponentId>,
    pub faults: Vec<FaultRecord>,
    /// Components that transitioned to `Faulted` this tick.
    pub faulted: Vec<ComponentId>,
    pub conflicts: Vec<WriteConflict>,
    pub writes: Vec<AppliedWrite>,
    pub bridge_errors: Vec<BridgeFailure>,
}

impl TickReport {
    fn new(tick: &Tick) -> Self {
        let timestamp_ms = tick
            .started_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            tick: tick.number,
            timestamp_ms,
            read_wait_us: 0,
            busy_us: 0,
            overrun: false,
            fresh_readings: true,
            executed: Vec::new(),
            faults: Vec::new(),
            faulted: Vec::new(),
            conflicts: Vec::new(),
            writes: Vec::new(),
            bridge_errors: Vec::new(),
        }
    }

    /// The conflict raised on `channel`, if any.
    pub fn conflict_on(&self, channel: &ChannelId) -> Option<&WriteConflict> {
        self.conflicts.iter().find(|c| c.channel() == channel)
    }

    /// The value applied to `channel`, if any.
    pub fn written(&self, channel: &ChannelId) -> Option<&Value> {
        self.writes
            .iter()
            .find(|w| &w.channel == channel)
            .map(|w| &w.value)
    }
}

// ─── Cycle Phase ────────────────────────────────────────────────────

/// Position of the worker in the tick state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePhase {
    #[default]
    Idle,
    Read,
    Execute,
    ResolveWrites,
    HardwareWrite,
    Swap,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Read => "READ",
            Self::Execute => "EXECUTE",
            Self::ResolveWrites => "RESOLVE_WRITES",
            Self::HardwareWrite => "HARDWARE_WRITE",
            Self::Swap => "SWAP",
        };
        f.write_str(name)
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Errors during RT setup.
#[derive(Debug, Error)]
pub enum CycleError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),
}

/// Lock all current and future memory pages.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

/// Pin the tick thread to one CPU core.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

/// Switch the tick thread to SCHED_FIFO.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` is a valid sched_param for the calling thread (pid 0).
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

/// Prepare the tick thread for soft real-time operation.
///
/// Locks memory, pins the thread and raises its scheduling priority. Without
/// the `rt` feature this is a no-op.
#[cfg(feature = "rt")]
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)
}

/// Prepare the tick thread for soft real-time operation.
///
/// Locks memory, pins the thread and raises its scheduling priority. Without
/// the `rt` feature this is a no-op.
#[cfg(not(feature = "rt"))]
pub fn rt_setup(_cpu_core: usize, _rt_priority: i32) -> Result<(), CycleError> {
    debug!("RT setup skipped (built without the `rt` feature)");
    Ok(())
}

// ─── Cycle Worker ───────────────────────────────────────────────────

fn status_channels(component: &str) -> [ChannelSpec; 2] {
    [
        ChannelSpec::new(
            ChannelId::new(component, STATE_CHANNEL),
            ValueType::Enum,
            AccessMode::ReadOnly,
        ),
        ChannelSpec::new(
            ChannelId::new(component, FAULT_COUNT_CHANNEL),
            ValueType::Long,
            AccessMode::ReadOnly,
        ),
    ]
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Drives ticks over one process image, component registry and bridge set.
pub struct CycleWorker {
    config: CycleConfig,
    image: ProcessImage,
    registry: ComponentRegistry,
    bridges: BridgeSet,
    tick: u64,
    phase: CyclePhase,
    stats: CycleStats,
}

impl CycleWorker {
    /// Assemble a worker.
    ///
    /// Adds the `<id>/State` and `<id>/FaultCount` channels of every
    /// registered component and checks that every owned channel exists.
    pub fn new(
        config: CycleConfig,
        mut image: ProcessImage,
        registry: ComponentRegistry,
        bridges: BridgeSet,
    ) -> Result<Self, ConfigurationError> {
        for slot in registry.slots() {
            prepare_component(&mut image, slot.component.as_ref())?;
        }
        Ok(Self {
            config,
            image,
            registry,
            bridges,
            tick: 0,
            phase: CyclePhase::Idle,
            stats: CycleStats::new(),
        })
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn image(&self) -> &ProcessImage {
        &self.image
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Number of the last completed tick (0 before the first).
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    // ── Between-tick registry changes ──

    /// Add a component between ticks.
    pub fn add_component(
        &mut self,
        component: Box<dyn Component>,
        schedule: Schedule,
    ) -> Result<(), ConfigurationError> {
        prepare_component(&mut self.image, component.as_ref())?;
        self.registry.register_with(component, schedule)
    }

    /// Remove a component between ticks. Its channels stay in the image.
    pub fn remove_component(&mut self, id: &str) -> Option<Box<dyn Component>> {
        self.registry.remove(id)
    }

    /// Return a faulted component to service.
    pub fn reset_fault(&mut self, id: &str) -> bool {
        self.registry.reset_fault(id)
    }

    // ── Ticks ──

    fn enter(&mut self, phase: CyclePhase) {
        trace!(tick = self.tick + 1, "{} → {}", self.phase, phase);
        self.phase = phase;
    }

    /// Execute exactly one tick.
    pub fn run_tick(&mut self) -> TickReport {
        let tick = Tick {
            number: self.tick + 1,
            started_at: SystemTime::now(),
            target: self.config.target(),
        };
        let mut report = TickReport::new(&tick);

        // Stray requests (e.g. from after-process-image components) never
        // carry over into a new tick.
        let stray = self.image.clear_requests();
        if stray > 0 {
            debug!(tick = tick.number, "Dropped {} requests issued outside EXECUTE", stray);
        }

        // ═══ READ ═══
        self.enter(CyclePhase::Read);
        let read_start = Instant::now();
        report.fresh_readings = self.bridges.await_readings(self.config.read_grace());
        report.read_wait_us = read_start.elapsed().as_micros() as u64;
        if !report.fresh_readings {
            debug!(tick = tick.number, "Read grace window elapsed before all bridges delivered");
        }

        let busy_start = Instant::now();

        // ═══ EXECUTE ═══
        self.enter(CyclePhase::Execute);
        for index in self.registry.schedule_of(ExecutionPhase::Execute) {
            self.execute_component(index, tick, &mut report);
        }

        // ═══ RESOLVE_WRITES ═══
        self.enter(CyclePhase::ResolveWrites);
        let resolved = self.image.resolve_pending(self.config.range_policy);
        let mut candidates = Vec::with_capacity(resolved.len());
        for (channel, resolution) in resolved {
            for conflict in resolution.conflicts {
                match &conflict {
                    WriteConflict::Ambiguous { .. } => {
                        warn!(tick = tick.number, channel = %channel, "{}", conflict)
                    }
                    WriteConflict::Infeasible { .. } => {
                        warn!(tick = tick.number, channel = %channel, "{}; hardware write skipped", conflict)
                    }
                }
                report.conflicts.push(conflict);
            }
            if let Some(value) = resolution.value {
                candidates.push((channel, value));
            }
        }

        // ═══ HARDWARE_WRITE ═══
        self.enter(CyclePhase::HardwareWrite);
        let timeout = self.config.write_timeout();
        for (channel, value) in candidates {
            let hardware = match self.bridges.write(&channel, &value, timeout) {
                None => false,
                Some(Ok(())) => true,
                Some(Err(e)) => {
                    warn!(tick = tick.number, channel = %channel, "Hardware write of {} failed: {}", value, e);
                    report.bridge_errors.push(BridgeFailure {
                        channel,
                        value,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            // Confirmed (or virtual) writes become the channel's next value.
            if let Err(e) = self.image.set_next(&channel, value.clone()) {
                error!(tick = tick.number, channel = %channel, "Cannot apply resolved value: {}", e);
                continue;
            }
            report.writes.push(AppliedWrite {
                channel,
                value,
                hardware,
            });
        }

        let busy = busy_start.elapsed();

        // ═══ SWAP ═══
        self.enter(CyclePhase::Swap);
        self.publish_lifecycle();
        self.image.swap();
        for index in self.registry.schedule_of(ExecutionPhase::AfterProcessImage) {
            self.execute_component(index, tick, &mut report);
            let id = self.registry.slot_mut(index).component.id().to_string();
            self.image.promote(&id);
        }

        self.enter(CyclePhase::Idle);
        report.busy_us = busy.as_micros() as u64;
        report.overrun = busy > tick.target;

        self.tick = tick.number;
        self.stats.record(&report);
        report
    }

    /// Run one component with failure isolation.
    fn execute_component(&mut self, index: usize, tick: Tick, report: &mut TickReport) {
        let slot = self.registry.slot_mut(index);
        if slot.state == ComponentState::Faulted {
            return;
        }
        let id = slot.component.id().to_string();
        let ctx = TickContext::new(&self.image, &id, tick);
        let component = &mut slot.component;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| component.execute(&ctx)));
        report.executed.push(id.clone());

        let message = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(fault)) => fault.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        let dropped = self.image.discard_requests_from(&id);
        let outcome = self.registry.record_fault(index);
        warn!(
            tick = tick.number,
            component = %id,
            faults = outcome.faults,
            "Component fault: {} ({} write requests dropped)",
            message,
            dropped
        );
        report.faults.push(FaultRecord {
            component: id.clone(),
            message,
            fault_count: outcome.faults,
        });
        if outcome.faulted {
            report.faulted.push(id);
        }
    }

    /// Write every component's lifecycle into its status channels.
    fn publish_lifecycle(&self) {
        for slot in self.registry.slots() {
            let [state, faults] = status_channels(slot.component.id());
            let results = [
                self.image
                    .set_next(&state.id, Value::Enum(slot.state.as_enum())),
                self.image
                    .set_next(&faults.id, Value::Long(i64::from(slot.faults))),
            ];
            for e in results.into_iter().filter_map(Result::err) {
                error!("Cannot publish lifecycle of '{}': {}", slot.component.id(), e);
            }
        }
    }

    /// Loop until `running` is cleared. The flag is checked between ticks.
    pub fn run(&mut self, running: &AtomicBool) {
        let target = self.config.target();
        info!(
            "Cycle worker started: target {}ms, {} components, {} channels",
            self.config.target_ms,
            self.registry.len(),
            self.image.len()
        );

        while running.load(Ordering::SeqCst) {
            let started = Instant::now();
            let report = self.run_tick();
            self.log_report(&report);

            if report.overrun {
                continue;
            }
            let mut remaining = target.saturating_sub(started.elapsed());
            while !remaining.is_zero() && running.load(Ordering::SeqCst) {
                let step = remaining.min(STOP_POLL_INTERVAL);
                std::thread::sleep(step);
                remaining -= step;
            }
        }

        info!(
            "Cycle worker stopped after {} ticks: avg {}µs, max {}µs, {} overruns, {} faults, {} conflicts",
            self.stats.tick_count,
            self.stats.avg_tick_ns() / 1000,
            self.stats.max_tick_ns / 1000,
            self.stats.overruns,
            self.stats.component_faults,
            self.stats.write_conflicts
        );
    }

    fn log_report(&self, report: &TickReport) {
        if report.overrun
            && (self.stats.overruns == 1 || self.stats.overruns % OVERRUN_LOG_INTERVAL == 0)
        {
            warn!(
                tick = report.tick,
                busy_us = report.busy_us,
                "Tick overrun (target {}ms, {} overruns so far)",
                self.config.target_ms,
                self.stats.overruns
            );
        }
        for id in &report.faulted {
            error!(tick = report.tick, component = %id, "Component faulted and excluded from scheduling");
        }
        match serde_json::to_string(report) {
            Ok(json) => debug!(tick = report.tick, report = %json, "Tick complete"),
            Err(e) => debug!(tick = report.tick, "Tick report not serializable: {}", e),
        }
    }

    /// Stop all bridge workers.
    pub fn shutdown(&mut self) {
        self.bridges.shutdown();
    }
}

/// Add lifecycle channels and check the owned channels of `component`.
fn prepare_component(image: &mut ProcessImage, component: &dyn Component) -> Result<(), ConfigurationError> {
    let id = component.id();
    for channel in component.owned_channels() {
        if channel.component() != id {
            return Err(ConfigurationError::Invalid(format!(
                "component '{id}' claims channel '{channel}' of another component"
            )));
        }
        if !image.contains(channel) {
            return Err(ConfigurationError::Invalid(format!(
                "component '{id}' owns undeclared channel '{channel}'"
            )));
        }
    }
    for spec in status_channels(id) {
        image.ensure_status_channel(spec)?;
    }
    Ok(())
}
