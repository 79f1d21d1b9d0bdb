//! Derived sum of several channels, computed after the process-image swap.

use ems_common::channel::{ChannelId, Value};
use ems_common::config::ComponentConfig;
use ems_common::error::{ComponentFault, ConfigurationError};
use serde::Deserialize;

use crate::component::{Component, TickContext};

pub const KIND: &str = "sum";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    sources: Vec<ChannelId>,
    /// Name of the output channel owned by this component.
    target: String,
}

/// Sums the current values of `sources` into `<id>/<target>`.
///
/// Sources without a value are skipped; if none has a value the target is
/// left untouched.
pub struct Sum {
    id: String,
    sources: Vec<ChannelId>,
    owned: [ChannelId; 1],
}

impl Sum {
    pub fn new(id: impl Into<String>, sources: Vec<ChannelId>, target: &str) -> Self {
        let id = id.into();
        let owned = [ChannelId::new(id.clone(), target)];
        Self { id, sources, owned }
    }

    pub fn target(&self) -> &ChannelId {
        &self.owned[0]
    }
}

impl Component for Sum {
    fn id(&self) -> &str {
        &self.id
    }

    fn owned_channels(&self) -> &[ChannelId] {
        &self.owned
    }

    fn execute(&mut self, ctx: &TickContext<'_>) -> Result<(), ComponentFault> {
        let mut total: Option<f64> = None;
        for source in &self.sources {
            let Some(value) = ctx.get(source)? else {
                continue;
            };
            let v = value.as_f64().ok_or_else(|| {
                ComponentFault::new(format!("source '{source}' is not numeric: {value}"))
            })?;
            total = Some(total.unwrap_or(0.0) + v);
        }
        if let Some(total) = total {
            ctx.set_next_value(self.target(), Value::Float(total))?;
        }
        Ok(())
    }
}

pub(crate) fn create(config: &ComponentConfig) -> Result<Box<dyn Component>, ConfigurationError> {
    let p: Params = super::params(config)?;
    Ok(Box::new(Sum::new(config.id.clone(), p.sources, &p.target)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Tick;
    use crate::process_image::ProcessImage;
    use ems_common::channel::{AccessMode, ChannelSpec, ValueType};
    use std::time::{Duration, SystemTime};

    fn tick() -> Tick {
        Tick {
            number: 1,
            started_at: SystemTime::now(),
            target: Duration::from_secs(1),
        }
    }

    #[test]
    fn sums_available_sources() {
        let a = ChannelId::new("meter0", "ActivePower");
        let b = ChannelId::new("ess0", "ActivePower");
        let mut image = ProcessImage::from_specs([
            ChannelSpec::new(a.clone(), ValueType::Integer, AccessMode::ReadOnly),
            ChannelSpec::new(b.clone(), ValueType::Integer, AccessMode::ReadOnly),
            ChannelSpec::new(
                ChannelId::new("sum0", "ProductionActivePower"),
                ValueType::Long,
                AccessMode::ReadOnly,
            ),
        ])
        .unwrap();
        let mut sum = Sum::new("sum0", vec![a.clone(), b.clone()], "ProductionActivePower");

        // No source has a value: nothing published.
        sum.execute(&TickContext::new(&image, "sum0", tick())).unwrap();
        assert_eq!(image.next(sum.target()).unwrap(), None);

        image.set_next(&a, Value::Int(1200)).unwrap();
        image.swap();
        sum.execute(&TickContext::new(&image, "sum0", tick())).unwrap();
        assert_eq!(image.next(sum.target()).unwrap(), Some(Value::Long(1200)));

        image.set_next(&b, Value::Int(-200)).unwrap();
        image.swap();
        sum.execute(&TickContext::new(&image, "sum0", tick())).unwrap();
        assert_eq!(image.next(sum.target()).unwrap(), Some(Value::Long(1000)));
    }
}
