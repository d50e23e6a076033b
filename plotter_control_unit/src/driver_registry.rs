//! Registry of output backends.
//!
//! Maps a backend name (as given on the command line) to its factory. Built
//! at startup and used once to create the backend for the pulse thread. No
//! global state.

use std::collections::HashMap;

use plotter_common::config::AxesConfig;
use plotter_common::hal::driver::{HalError, OutputFactory, StepperOutputs};

use crate::drivers;

/// Registry of available output backends.
pub struct DriverRegistry {
    factories: HashMap<&'static str, OutputFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every built-in backend.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        drivers::register_builtin(&mut registry);
        registry
    }

    /// Register a backend factory.
    ///
    /// # Panics
    /// Panics if a backend with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: OutputFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    pub fn get_factory(&self, name: &str) -> Option<OutputFactory> {
        self.factories.get(name).copied()
    }

    /// Create a backend by name.
    ///
    /// # Errors
    /// Returns `HalError::DriverNotFound` if no backend with the given name is registered.
    pub fn create(
        &self,
        name: &str,
        config: &AxesConfig,
    ) -> Result<Box<dyn StepperOutputs>, HalError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| HalError::DriverNotFound(name.to_string()))?;
        Ok(factory(config))
    }

    /// Registered names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plotter_common::axis::Axis;
    use plotter_common::hal::driver::Level;

    struct TestOutputs;

    impl StepperOutputs for TestOutputs {
        fn name(&self) -> &'static str {
            "test"
        }

        fn enable(&mut self, _axis: Axis) -> Result<(), HalError> {
            Ok(())
        }

        fn set_direction(&mut self, _axis: Axis, _level: Level) {}

        fn set_step(&mut self, _axis: Axis, _level: Level) {}
    }

    fn create_test_outputs(_config: &AxesConfig) -> Box<dyn StepperOutputs> {
        Box::new(TestOutputs)
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = DriverRegistry::new();
        reg.register("test_driver", create_test_outputs);

        let outputs = reg
            .create("test_driver", &AxesConfig::default())
            .expect("should create");
        assert_eq!(outputs.name(), "test");
    }

    #[test]
    fn registry_driver_not_found() {
        let reg = DriverRegistry::with_builtin();
        let result = reg.create("gpio", &AxesConfig::default());
        assert!(matches!(result, Err(HalError::DriverNotFound(name)) if name == "gpio"));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = DriverRegistry::new();
        reg.register("dup", create_test_outputs);
        reg.register("dup", create_test_outputs);
    }

    #[test]
    fn builtin_backends_are_listed() {
        let reg = DriverRegistry::with_builtin();
        assert_eq!(reg.list_drivers(), vec!["null", "simulation"]);
        let outputs = reg.create("simulation", &AxesConfig::default()).unwrap();
        assert_eq!(outputs.name(), "simulation");
        assert!(outputs.diagnostics().is_some());
    }
}
