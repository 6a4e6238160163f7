//! Pattern interface and registry
//!
//! A pattern turns time and inputs into per-item state. Patterns are queried
//! by their module once per tick and never push data on their own.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use sculpt_protocol::{ActuatorClass, GridSize, ItemState, LogicalAddress};
use serde::{Deserialize, Serialize};

use crate::input::{InputParam, InputSnapshot};

/// Identifier of a loaded pattern, unique within its module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId(pub u32);

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State a pattern produces for one tick
pub type PatternFrame = BTreeMap<LogicalAddress, ItemState>;

/// A generator of per-item state
pub trait Pattern: Send {
    /// Pattern type name
    fn name(&self) -> &str;

    /// Every address this pattern may ever write
    ///
    /// Checked against the module's mapping when the pattern is loaded.
    /// Entries in a rendered frame outside this set are ignored.
    fn addresses(&self) -> Vec<LogicalAddress>;

    /// Inputs the pattern reads
    fn inputs(&self) -> Vec<InputParam> {
        Vec::new()
    }

    /// Produce this tick's state
    fn render(&mut self, now: Duration, inputs: &InputSnapshot) -> PatternFrame;
}

/// What a pattern factory knows about the module it is building for
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleLayout {
    pub class: ActuatorClass,
    /// Rows and columns of the grid part of the mapping
    pub grid: GridSize,
    /// Every mapped logical address, in order
    pub addresses: Vec<LogicalAddress>,
}

/// Builds a pattern instance for a module
pub type PatternFactory = Box<dyn Fn(&ModuleLayout) -> Box<dyn Pattern> + Send + Sync>;

/// Catalogue of pattern types by name
#[derive(Default)]
pub struct PatternRegistry {
    factories: BTreeMap<String, PatternFactory>,
}

impl fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a pattern type
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ModuleLayout) -> Box<dyn Pattern> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate a pattern type for a module
    pub fn create(&self, name: &str, layout: &ModuleLayout) -> Option<Box<dyn Pattern>> {
        self.factories.get(name).map(|factory| factory(layout))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blank {
        addresses: Vec<LogicalAddress>,
    }

    impl Pattern for Blank {
        fn name(&self) -> &str {
            "Blank"
        }

        fn addresses(&self) -> Vec<LogicalAddress> {
            self.addresses.clone()
        }

        fn render(&mut self, _now: Duration, _inputs: &InputSnapshot) -> PatternFrame {
            PatternFrame::new()
        }
    }

    #[test]
    fn test_registry_creates_for_layout() {
        let mut registry = PatternRegistry::new();
        registry.register("Blank", |layout: &ModuleLayout| -> Box<dyn Pattern> {
            Box::new(Blank {
                addresses: layout.addresses.clone(),
            })
        });

        let layout = ModuleLayout {
            class: ActuatorClass::Poofer,
            grid: GridSize { rows: 1, cols: 2 },
            addresses: vec![LogicalAddress::grid(0, 0), LogicalAddress::grid(0, 1)],
        };

        let pattern = registry.create("Blank", &layout).unwrap();
        assert_eq!(pattern.name(), "Blank");
        assert_eq!(pattern.addresses().len(), 2);
        assert!(pattern.inputs().is_empty());
        assert!(registry.create("Missing", &layout).is_none());
        assert_eq!(registry.names(), vec!["Blank"]);
    }
}
