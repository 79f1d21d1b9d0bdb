//! Active-power limits.

use ems_common::channel::ChannelId;
use ems_common::config::ComponentConfig;
use ems_common::error::{ComponentFault, ConfigurationError};
use serde::Deserialize;

use crate::component::{Component, TickContext};

pub const KIND: &str = "limit_active_power";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    channel: ChannelId,
    #[serde(default)]
    min: Option<i64>,
    #[serde(default)]
    max: Option<i64>,
}

/// Issues `push_write_min` / `push_write_max` on one channel every tick.
pub struct LimitActivePower {
    id: String,
    channel: ChannelId,
    min: Option<i64>,
    max: Option<i64>,
}

impl LimitActivePower {
    pub fn new(id: impl Into<String>, channel: ChannelId, min: Option<i64>, max: Option<i64>) -> Self {
        Self {
            id: id.into(),
            channel,
            min,
            max,
        }
    }
}

impl Component for LimitActivePower {
    fn id(&self) -> &str {
        &self.id
    }

    fn owned_channels(&self) -> &[ChannelId] {
        &[]
    }

    fn execute(&mut self, ctx: &TickContext<'_>) -> Result<(), ComponentFault> {
        if let Some(min) = self.min {
            ctx.push_write_min(&self.channel, min)?;
        }
        if let Some(max) = self.max {
            ctx.push_write_max(&self.channel, max)?;
        }
        Ok(())
    }
}

pub(crate) fn create(config: &ComponentConfig) -> Result<Box<dyn Component>, ConfigurationError> {
    let p: Params = super::params(config)?;
    if p.min.is_none() && p.max.is_none() {
        return Err(ConfigurationError::Invalid(format!(
            "component '{}' needs at least one of min/max",
            config.id
        )));
    }
    Ok(Box::new(LimitActivePower::new(config.id.clone(), p.channel, p.min, p.max)))
}
