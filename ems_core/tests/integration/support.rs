//! Shared fixtures: scripted components and a write-recording bridge.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ems_common::bridge::Bridge;
use ems_common::channel::{AccessMode, ChannelId, ChannelSpec, Value, ValueType};
use ems_common::config::{BridgeConfig, CycleConfig};
use ems_common::error::{BridgeError, ComponentFault};
use ems_core::component::{Component, TickContext};
use ems_core::cycle::CycleWorker;
use ems_core::process_image::ProcessImage;
use ems_core::registry::{ComponentRegistry, Schedule};
use ems_hal::BridgeSet;

pub type Log = Rc<RefCell<Vec<String>>>;
pub type Writes = Arc<Mutex<Vec<(ChannelId, Value)>>>;

pub fn setpoint() -> ChannelId {
    ChannelId::new("ess0", "SetActivePower")
}

pub fn meter() -> ChannelId {
    ChannelId::new("meter0", "ActivePower")
}

/// One action of a scripted component.
#[derive(Clone)]
pub enum Step {
    Exact(ChannelId, i64),
    Min(ChannelId, i64),
    Max(ChannelId, i64),
    StrictRead(ChannelId),
    Fail(&'static str),
}

/// Component replaying a fixed list of steps every tick.
pub struct Scripted {
    id: String,
    steps: Vec<Step>,
    log: Option<Log>,
}

impl Scripted {
    pub fn new(id: &str, steps: Vec<Step>) -> Self {
        Self {
            id: id.to_string(),
            steps,
            log: None,
        }
    }

    pub fn logging(mut self, log: &Log) -> Self {
        self.log = Some(Rc::clone(log));
        self
    }

    pub fn boxed(self) -> Box<dyn Component> {
        Box::new(self)
    }
}

impl Component for Scripted {
    fn id(&self) -> &str {
        &self.id
    }

    fn owned_channels(&self) -> &[ChannelId] {
        &[]
    }

    fn execute(&mut self, ctx: &TickContext<'_>) -> Result<(), ComponentFault> {
        if let Some(log) = &self.log {
            log.borrow_mut().push(self.id.clone());
        }
        for step in &self.steps {
            match step {
                Step::Exact(id, v) => ctx.push_write(id, *v)?,
                Step::Min(id, v) => ctx.push_write_min(id, *v)?,
                Step::Max(id, v) => ctx.push_write_max(id, *v)?,
                Step::StrictRead(id) => {
                    ctx.get_strict(id)?;
                }
                Step::Fail(msg) => return Err(ComponentFault::new(*msg)),
            }
        }
        Ok(())
    }
}

/// Bridge that records every write attempt and never produces readings.
pub struct RecordingBridge {
    writes: Writes,
    /// Reject every write with an I/O error (after recording it).
    fail_writes: bool,
}

impl Bridge for RecordingBridge {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn version(&self) -> &'static str {
        "0.0.0"
    }

    fn init(&mut self, _config: &BridgeConfig) -> Result<(), BridgeError> {
        Ok(())
    }

    fn read(&mut self, channel: &ChannelId) -> Result<Value, BridgeError> {
        Err(BridgeError::UnknownChannel(channel.clone()))
    }

    fn write(
        &mut self,
        channel: &ChannelId,
        value: &Value,
        _deadline: Instant,
    ) -> Result<(), BridgeError> {
        self.writes
            .lock()
            .unwrap()
            .push((channel.clone(), value.clone()));
        if self.fail_writes {
            return Err(BridgeError::Io("device rejected setpoint".into()));
        }
        Ok(())
    }
}

/// Bridge set with one recording bridge serving `ess0`.
pub fn recording_ess() -> (BridgeSet, Writes) {
    ess_bridge(false)
}

/// Like [`recording_ess`], but every hardware write fails.
pub fn failing_ess() -> (BridgeSet, Writes) {
    ess_bridge(true)
}

fn ess_bridge(fail_writes: bool) -> (BridgeSet, Writes) {
    let writes: Writes = Arc::default();
    let mut bridges = BridgeSet::new();
    bridges
        .spawn(
            Box::new(RecordingBridge {
                writes: Arc::clone(&writes),
                fail_writes,
            }),
            &BridgeConfig::new("ess0", "recording"),
            Vec::new(),
        )
        .unwrap();
    (bridges, writes)
}

pub fn site_image() -> ProcessImage {
    ProcessImage::from_specs([
        ChannelSpec::new(setpoint(), ValueType::Integer, AccessMode::WriteOnly),
        ChannelSpec::new(meter(), ValueType::Integer, AccessMode::ReadOnly),
    ])
    .unwrap()
}

pub fn cycle_config() -> CycleConfig {
    CycleConfig {
        target_ms: 1000,
        read_grace_ms: 5,
        ..CycleConfig::default()
    }
}

/// Worker over [`site_image`] with the given components, in the given order.
pub fn worker(bridges: BridgeSet, components: Vec<(Box<dyn Component>, Schedule)>) -> CycleWorker {
    let config = cycle_config();
    let mut registry = ComponentRegistry::new(config.fault_threshold);
    registry.register_all(components).unwrap();
    CycleWorker::new(config, site_image(), registry, bridges).unwrap()
}

pub fn unordered(components: Vec<Box<dyn Component>>) -> Vec<(Box<dyn Component>, Schedule)> {
    components
        .into_iter()
        .map(|c| (c, Schedule::default()))
        .collect()
}
