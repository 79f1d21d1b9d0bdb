//! Built-in components and the kind → constructor factory.
//!
//! The built-ins carry no control algorithm: they issue fixed demands or
//! derive values, which is enough to exercise arbitration end to end.

pub mod fix_active_power;
pub mod limit_active_power;
pub mod sum;

use std::collections::HashMap;

use ems_common::config::ComponentConfig;
use ems_common::error::ConfigurationError;
use serde::de::DeserializeOwned;

use crate::component::Component;

pub use fix_active_power::FixActivePower;
pub use limit_active_power::LimitActivePower;
pub use sum::Sum;

/// Constructor of one component kind.
pub type ComponentConstructor = fn(&ComponentConfig) -> Result<Box<dyn Component>, ConfigurationError>;

/// Component constructors by `kind`. Built once at startup; no global state.
pub struct ComponentFactory {
    constructors: HashMap<&'static str, ComponentConstructor>,
}

impl ComponentFactory {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Factory with all built-in kinds registered.
    pub fn with_builtin_components() -> Self {
        let mut factory = Self::new();
        factory.register(fix_active_power::KIND, fix_active_power::create);
        factory.register(limit_active_power::KIND, limit_active_power::create);
        factory.register(sum::KIND, sum::create);
        factory
    }

    /// Register a constructor.
    ///
    /// # Panics
    /// Panics if the kind is already registered.
    pub fn register(&mut self, kind: &'static str, constructor: ComponentConstructor) {
        if self.constructors.contains_key(kind) {
            panic!("Component kind '{kind}' is already registered");
        }
        self.constructors.insert(kind, constructor);
    }

    /// Build the component described by `config`.
    pub fn create(&self, config: &ComponentConfig) -> Result<Box<dyn Component>, ConfigurationError> {
        let constructor = self
            .constructors
            .get(config.kind.as_str())
            .ok_or_else(|| ConfigurationError::UnknownComponentKind(config.kind.clone()))?;
        constructor(config)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.constructors.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for ComponentFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize a component's `params` table.
pub(crate) fn params<T: DeserializeOwned>(config: &ComponentConfig) -> Result<T, ConfigurationError> {
    config.params.clone().try_into().map_err(|e| {
        ConfigurationError::Invalid(format!("component '{}' ({}): {e}", config.id, config.kind))
    })
}
