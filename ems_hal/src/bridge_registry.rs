//! Bridge registry for hardware drivers.
//!
//! Provides a `BridgeRegistry` struct for registering and retrieving bridge
//! factories by driver name. Constructed once at startup and passed by
//! reference; there is no global registry.

use ems_common::bridge::{Bridge, BridgeFactory};
use ems_common::error::ConfigurationError;
use std::collections::HashMap;

/// Registry of available bridge drivers.
pub struct BridgeRegistry {
    factories: HashMap<&'static str, BridgeFactory>,
}

impl BridgeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: BridgeFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a driver factory by name.
    pub fn get_factory(&self, name: &str) -> Option<BridgeFactory> {
        self.factories.get(name).copied()
    }

    /// Create a bridge instance by driver name.
    ///
    /// # Errors
    /// Returns `ConfigurationError::UnknownDriver` if no driver with the given name is registered.
    pub fn create_bridge(&self, name: &str) -> Result<Box<dyn Bridge>, ConfigurationError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| ConfigurationError::UnknownDriver(name.to_string()))?;
        Ok(factory())
    }

    /// List all registered driver names.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for BridgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
