//! Fixed active-power setpoint.

use ems_common::channel::ChannelId;
use ems_common::config::ComponentConfig;
use ems_common::error::{ComponentFault, ConfigurationError};
use serde::Deserialize;

use crate::component::{Component, TickContext};

pub const KIND: &str = "fix_active_power";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    channel: ChannelId,
    /// Setpoint [W]; positive discharges.
    power: i64,
}

/// Issues `push_write(power)` on one channel every tick.
pub struct FixActivePower {
    id: String,
    channel: ChannelId,
    power: i64,
}

impl FixActivePower {
    pub fn new(id: impl Into<String>, channel: ChannelId, power: i64) -> Self {
        Self {
            id: id.into(),
            channel,
            power,
        }
    }
}

impl Component for FixActivePower {
    fn id(&self) -> &str {
        &self.id
    }

    fn owned_channels(&self) -> &[ChannelId] {
        &[]
    }

    fn execute(&mut self, ctx: &TickContext<'_>) -> Result<(), ComponentFault> {
        ctx.push_write(&self.channel, self.power)?;
        Ok(())
    }
}

pub(crate) fn create(config: &ComponentConfig) -> Result<Box<dyn Component>, ConfigurationError> {
    let p: Params = super::params(config)?;
    Ok(Box::new(FixActivePower::new(config.id.clone(), p.channel, p.power)))
}
