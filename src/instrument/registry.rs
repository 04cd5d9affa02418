//! Driver registry.
//!
//! The registry is built once at startup, then shared read-only behind an
//! `Arc`. Descriptors are tested in registration order; the first one whose
//! matcher accepts the `*IDN?` answer wins.

use super::e5071b::{self, HpE5071b};
use super::{DriverTiming, VnaDriver};
use crate::adapters::Connector;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Decides whether a driver supports an instrument from its identification string.
pub type IdnMatcher = fn(&str) -> bool;

/// Builds a disconnected driver.
pub type DriverConstructor = fn(Arc<dyn Connector>, DriverTiming) -> Box<dyn VnaDriver>;

/// Registration record for one driver.
#[derive(Clone, Copy)]
pub struct DriverDescriptor {
    /// Human-readable model name
    pub name: &'static str,
    /// Identification matcher
    pub idn_matches: IdnMatcher,
    /// Constructor
    pub construct: DriverConstructor,
}

impl DriverDescriptor {
    /// Construct a driver from this descriptor.
    pub fn build(&self, connector: Arc<dyn Connector>, timing: DriverTiming) -> Box<dyn VnaDriver> {
        (self.construct)(connector, timing)
    }
}

impl fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered list of known drivers.
#[derive(Debug, Default, Clone)]
pub struct DriverRegistry {
    descriptors: Vec<DriverDescriptor>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every driver shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(DriverDescriptor {
            name: e5071b::DRIVER_NAME,
            idn_matches: HpE5071b::idn_matches,
            construct: HpE5071b::boxed,
        });
        registry
    }

    /// Append a descriptor.
    pub fn register(&mut self, descriptor: DriverDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// First descriptor whose matcher accepts `idn`.
    ///
    /// A matcher that panics is skipped.
    pub fn detect(&self, idn: &str) -> Option<&DriverDescriptor> {
        self.descriptors.iter().find(|descriptor| {
            match panic::catch_unwind(AssertUnwindSafe(|| (descriptor.idn_matches)(idn))) {
                Ok(matched) => matched,
                Err(_) => {
                    warn!("IDN matcher of '{}' panicked, skipping", descriptor.name);
                    false
                }
            }
        })
    }

    /// Driver used to open the first session, before the instrument is identified.
    pub fn default_descriptor(&self) -> Option<&DriverDescriptor> {
        self.descriptors.first()
    }

    /// Descriptor registered under `name`.
    pub fn get(&self, name: &str) -> Option<&DriverDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Registered driver names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.descriptors.iter().map(|d| d.name).collect()
    }

    /// Number of registered drivers.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedVna;
    use tracing_test::traced_test;

    fn panicking_matcher(_idn: &str) -> bool {
        panic!("broken matcher")
    }

    fn everything_matcher(_idn: &str) -> bool {
        true
    }

    #[test]
    fn test_builtin_detects_e5071b() {
        let registry = DriverRegistry::builtin();
        let descriptor = registry
            .detect("HEWLETT-PACKARD,E5071B,MY12345678,A.01.02")
            .unwrap();
        assert_eq!(descriptor.name, "HP E5071B");
        assert_eq!(registry.names(), vec!["HP E5071B"]);
        assert_eq!(registry.default_descriptor().unwrap().name, "HP E5071B");
    }

    #[test]
    fn test_unknown_or_empty_idn() {
        let registry = DriverRegistry::builtin();
        assert!(registry.detect("").is_none());
        assert!(registry.detect("Rohde&Schwarz,ZNB8,1311601062,3.12").is_none());
    }

    #[test]
    fn test_detection_is_case_insensitive() {
        let registry = DriverRegistry::builtin();
        assert!(registry.detect("keysight technologies,e5071c,x,y").is_some());
    }

    #[test]
    #[traced_test]
    fn test_panicking_matcher_is_skipped() {
        let mut registry = DriverRegistry::new();
        registry.register(DriverDescriptor {
            name: "Broken",
            idn_matches: panicking_matcher,
            construct: HpE5071b::boxed,
        });
        registry.register(DriverDescriptor {
            name: "Fallback",
            idn_matches: everything_matcher,
            construct: HpE5071b::boxed,
        });
        assert_eq!(registry.detect("anything").unwrap().name, "Fallback");
        assert!(logs_contain("IDN matcher of 'Broken' panicked"));
    }

    #[test]
    fn test_registration_order_wins() {
        let mut registry = DriverRegistry::builtin();
        registry.register(DriverDescriptor {
            name: "Catch-all",
            idn_matches: everything_matcher,
            construct: HpE5071b::boxed,
        });
        assert_eq!(registry.detect("HP,E5071B,1,1").unwrap().name, "HP E5071B");
        assert_eq!(registry.detect("HP,8753ES,1,1").unwrap().name, "Catch-all");
        assert_eq!(registry.len(), 2);
        assert!(registry.get("Catch-all").is_some());
    }

    #[test]
    fn test_build_returns_disconnected_driver() {
        let registry = DriverRegistry::builtin();
        let driver = registry
            .default_descriptor()
            .unwrap()
            .build(Arc::new(SimulatedVna::new()), DriverTiming::without_delays());
        assert_eq!(driver.name(), "HP E5071B");
        assert!(!driver.is_connected());
        assert!(driver.idn().is_none());
    }
}
