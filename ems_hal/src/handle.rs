//! Bridge worker threads.
//!
//! Every bridge is owned by one worker thread that
//! - polls the bridge's readable channels every `poll_interval` and publishes
//!   the readings into the channels' [`ValueSlot`]s (last write wins), and
//! - services write jobs handed over by the HARDWARE_WRITE phase.
//!
//! The tick thread waits for a write result at most `timeout`. Every write
//! job carries that deadline: the worker drops jobs that expired while
//! queued, and passes the deadline to the bridge so a write still in
//! progress is abandoned rather than committed late. There is no retry queue.

use ems_common::bridge::Bridge;
use ems_common::channel::{ChannelId, ChannelSpec, ComponentId, Value, ValueSlot};
use ems_common::config::BridgeConfig;
use ems_common::error::BridgeError;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Readings from consecutive failed polls are logged only every N rounds.
const READ_ERROR_LOG_INTERVAL: u64 = 100;

// ─── Read Synchronisation ───────────────────────────────────────────

/// Poll-round counters shared between bridge workers and the READ phase.
///
/// Each worker bumps its counter after a complete poll round; the tick
/// thread waits until every counter moved past the snapshot taken at the
/// previous tick, bounded by the grace window.
#[derive(Debug, Default)]
pub struct ReadSync {
    rounds: Mutex<Vec<u64>>,
    cond: Condvar,
}

impl ReadSync {
    /// Create an empty barrier.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self) -> usize {
        let mut rounds = self.rounds.lock();
        rounds.push(0);
        rounds.len() - 1
    }

    fn complete_round(&self, index: usize) {
        let mut rounds = self.rounds.lock();
        if let Some(r) = rounds.get_mut(index) {
            *r += 1;
        }
        self.cond.notify_all();
    }

    /// Current poll-round counters, one per registered bridge.
    pub fn snapshot(&self) -> Vec<u64> {
        self.rounds.lock().clone()
    }

    /// Wait until every bridge finished a poll round after `since`, or until
    /// `grace` elapsed. Returns `true` if all bridges delivered a fresh round.
    pub fn wait_fresh(&self, since: &[u64], grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        let mut rounds = self.rounds.lock();
        loop {
            let fresh = rounds
                .iter()
                .enumerate()
                .all(|(i, r)| *r > since.get(i).copied().unwrap_or(0));
            if fresh {
                return true;
            }
            if self.cond.wait_until(&mut rounds, deadline).timed_out() {
                return rounds
                    .iter()
                    .enumerate()
                    .all(|(i, r)| *r > since.get(i).copied().unwrap_or(0));
            }
        }
    }
}

// ─── Bridge Handle ──────────────────────────────────────────────────

/// A readable channel served by a bridge, with the slot its readings go to.
pub struct PolledChannel {
    /// Static description (used to coerce readings to the channel type).
    pub spec: ChannelSpec,
    /// Next-value slot of the channel in the process image.
    pub slot: Arc<ValueSlot>,
}

enum Job {
    Write {
        channel: ChannelId,
        value: Value,
        deadline: Instant,
        timeout_ms: u64,
        reply: mpsc::SyncSender<Result<(), BridgeError>>,
    },
    Shutdown,
}

/// Tick-thread side of one bridge worker.
pub struct BridgeHandle {
    id: ComponentId,
    driver: &'static str,
    jobs: mpsc::Sender<Job>,
    thread: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Initialize `bridge` and start its worker thread.
    ///
    /// # Errors
    /// Returns the bridge's `init()` error, or `BridgeError::InitFailed` if the
    /// thread cannot be spawned.
    pub fn spawn(
        mut bridge: Box<dyn Bridge>,
        config: &BridgeConfig,
        polled: Vec<PolledChannel>,
        sync: Arc<ReadSync>,
    ) -> Result<Self, BridgeError> {
        bridge.init(config)?;
        let driver = bridge.name();
        info!(
            "Bridge '{}' initialized: driver {} v{}, {} polled channels, poll interval {}ms",
            config.id,
            driver,
            bridge.version(),
            polled.len(),
            config.poll_interval_ms
        );

        let (jobs, rx) = mpsc::channel();
        let index = sync.register();
        let worker = Worker {
            id: config.id.clone(),
            bridge,
            polled,
            interval: config.poll_interval(),
            sync,
            index,
            failed_rounds: 0,
        };

        let thread = std::thread::Builder::new()
            .name(format!("bridge-{}", config.id))
            .spawn(move || worker.run(rx))
            .map_err(|e| BridgeError::InitFailed(format!("spawn worker: {e}")))?;

        Ok(Self {
            id: config.id.clone(),
            driver,
            jobs,
            thread: Some(thread),
        })
    }

    /// Component id the bridge serves.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Driver name of the wrapped bridge.
    pub fn driver(&self) -> &'static str {
        self.driver
    }

    /// Hand a resolved value to the bridge and wait at most `timeout`.
    ///
    /// A write that does not complete within `timeout` is never applied
    /// afterwards.
    pub fn write(
        &self,
        channel: &ChannelId,
        value: &Value,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        let timeout_ms = timeout.as_millis() as u64;
        let deadline = Instant::now() + timeout;
        let (reply, result) = mpsc::sync_channel(1);
        self.jobs
            .send(Job::Write {
                channel: channel.clone(),
                value: value.clone(),
                deadline,
                timeout_ms,
                reply,
            })
            .map_err(|_| BridgeError::Disconnected(self.id.clone()))?;

        let timed_out = || BridgeError::Timeout {
            bridge: self.id.clone(),
            channel: channel.clone(),
            timeout_ms,
        };
        match result.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            // A bridge abandoning the write at the deadline reports its own error.
            Ok(Err(_)) if Instant::now() >= deadline => Err(timed_out()),
            Ok(r) => r,
            Err(RecvTimeoutError::Timeout) => Err(timed_out()),
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::Disconnected(self.id.clone())),
        }
    }

    /// Stop the worker thread and wait for it.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.jobs.send(Job::Shutdown);
        if thread.join().is_err() {
            warn!("Bridge '{}' worker panicked", self.id);
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    id: ComponentId,
    bridge: Box<dyn Bridge>,
    polled: Vec<PolledChannel>,
    interval: Duration,
    sync: Arc<ReadSync>,
    index: usize,
    failed_rounds: u64,
}

impl Worker {
    fn run(mut self, jobs: mpsc::Receiver<Job>) {
        let mut next_poll = Instant::now();

        loop {
            if Instant::now() >= next_poll {
                self.poll();
                self.sync.complete_round(self.index);
                next_poll += self.interval;
                // Fell behind (slow device): re-anchor instead of bursting.
                if next_poll < Instant::now() {
                    next_poll = Instant::now() + self.interval;
                }
            }

            let wait = next_poll.saturating_duration_since(Instant::now());
            match jobs.recv_timeout(wait) {
                Ok(Job::Write {
                    channel,
                    value,
                    deadline,
                    timeout_ms,
                    reply,
                }) => {
                    if Instant::now() >= deadline {
                        debug!("Bridge '{}' dropped expired write {} = {}", self.id, channel, value);
                        let _ = reply.send(Err(BridgeError::Timeout {
                            bridge: self.id.clone(),
                            channel,
                            timeout_ms,
                        }));
                        continue;
                    }
                    let result = self.bridge.write(&channel, &value, deadline);
                    if let Err(ref e) = result {
                        debug!("Bridge '{}' write {} = {} failed: {}", self.id, channel, value, e);
                    }
                    // Receiver is gone if the tick thread already timed out.
                    let _ = reply.send(result);
                }
                Ok(Job::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        if let Err(e) = self.bridge.shutdown() {
            warn!("Bridge '{}' shutdown failed: {}", self.id, e);
        }
        debug!("Bridge '{}' worker stopped", self.id);
    }

    fn poll(&mut self) {
        let mut failures = 0usize;
        for channel in &self.polled {
            match self.bridge.read(&channel.spec.id) {
                Ok(raw) => match channel.spec.coerce(raw) {
                    Ok(value) => channel.slot.publish(value),
                    Err(e) => {
                        failures += 1;
                        warn!("Bridge '{}' delivered unusable reading: {}", self.id, e);
                    }
                },
                Err(e) => {
                    failures += 1;
                    if self.failed_rounds % READ_ERROR_LOG_INTERVAL == 0 {
                        warn!(
                            "Bridge '{}' read {} failed: {}",
                            self.id, channel.spec.id, e
                        );
                    }
                }
            }
        }
        if failures > 0 {
            self.failed_rounds += 1;
        } else {
            self.failed_rounds = 0;
        }
    }
}

// ─── Bridge Set ─────────────────────────────────────────────────────

/// All bridge workers of one runtime, indexed by owning component.
pub struct BridgeSet {
    handles: Vec<BridgeHandle>,
    by_component: HashMap<ComponentId, usize>,
    sync: Arc<ReadSync>,
    last_rounds: Vec<u64>,
}

impl BridgeSet {
    /// Empty set (no hardware attached).
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            by_component: HashMap::new(),
            sync: Arc::new(ReadSync::new()),
            last_rounds: Vec::new(),
        }
    }

    /// Initialize and start a bridge for component `config.id`.
    ///
    /// # Errors
    /// Propagates the bridge's initialization error.
    pub fn spawn(
        &mut self,
        bridge: Box<dyn Bridge>,
        config: &BridgeConfig,
        polled: Vec<PolledChannel>,
    ) -> Result<(), BridgeError> {
        if self.by_component.contains_key(&config.id) {
            return Err(BridgeError::InitFailed(format!(
                "bridge for '{}' already running",
                config.id
            )));
        }
        let handle = BridgeHandle::spawn(bridge, config, polled, Arc::clone(&self.sync))?;
        self.by_component
            .insert(config.id.clone(), self.handles.len());
        self.handles.push(handle);
        Ok(())
    }

    /// Number of running bridges.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True if no bridge is running.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// True if a bridge serves `component`.
    pub fn serves(&self, component: &str) -> bool {
        self.by_component.contains_key(component)
    }

    /// READ phase: wait for one fresh poll round from every bridge, at most `grace`.
    pub fn await_readings(&mut self, grace: Duration) -> bool {
        let fresh = if self.handles.is_empty() {
            true
        } else {
            self.sync.wait_fresh(&self.last_rounds, grace)
        };
        self.last_rounds = self.sync.snapshot();
        fresh
    }

    /// HARDWARE_WRITE: hand `value` to the bridge owning `channel`.
    ///
    /// Returns `None` if no bridge serves the channel's component.
    pub fn write(
        &self,
        channel: &ChannelId,
        value: &Value,
        timeout: Duration,
    ) -> Option<Result<(), BridgeError>> {
        let idx = *self.by_component.get(channel.component())?;
        Some(self.handles[idx].write(channel, value, timeout))
    }

    /// Stop all workers.
    pub fn shutdown(&mut self) {
        for handle in &mut self.handles {
            handle.shutdown();
        }
    }
}

impl Default for BridgeSet {
    fn default() -> Self {
        Self::new()
    }
}
