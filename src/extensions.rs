//! Named behaviour attached to sessions at construction
//!
//! A registry maps names to factories. [`VowelTrackingSession::with_extensions`]
//! instantiates every registered factory once, so each session owns its own
//! extension state. Changes to the registry affect sessions built afterwards.
//!
//! [`VowelTrackingSession::with_extensions`]: crate::session::VowelTrackingSession::with_extensions

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::Coordinate;

/// Names that collide with session accessors.
pub const RESERVED_NAMES: &[&str] = &[
    "attach",
    "detach",
    "extension",
    "mode",
    "params",
    "position",
    "reset_position",
    "sample_rate",
    "transform_size",
];

pub trait SessionExtension: Send {
    /// Called with the smoothed position after every accepted frame.
    fn on_position(&mut self, position: &Coordinate);

    /// Called when the session's position is reset or its source detached.
    fn on_reset(&mut self) {}
}

pub type ExtensionFactory = Arc<dyn Fn() -> Box<dyn SessionExtension> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    factories: BTreeMap<String, ExtensionFactory>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns [`Error::Extension`] if `name` is empty, reserved or taken
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn SessionExtension> + Send + Sync + 'static,
    {
        if name.trim().is_empty() {
            return Err(Error::Extension("extension name is empty".into()));
        }
        if RESERVED_NAMES.contains(&name) {
            return Err(Error::Extension(format!(
                "\"{name}\" is reserved by the session"
            )));
        }
        if self.factories.contains_key(name) {
            return Err(Error::Extension(format!(
                "an extension named \"{name}\" is already registered"
            )));
        }
        self.factories.insert(name.to_string(), Arc::new(factory));
        tracing::debug!(name, "registered session extension");
        Ok(())
    }

    /// Returns whether anything was removed. Unknown names are ignored.
    pub fn remove(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// One fresh instance per registered factory, in name order.
    pub fn instantiate(&self) -> Vec<(String, Box<dyn SessionExtension>)> {
        self.factories
            .iter()
            .map(|(name, factory)| (name.clone(), factory()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counter(Arc<AtomicUsize>);

    impl SessionExtension for Counter {
        fn on_position(&mut self, _position: &Coordinate) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter_factory(hits: &Arc<AtomicUsize>) -> impl Fn() -> Box<dyn SessionExtension> + Send + Sync {
        let hits = Arc::clone(hits);
        move || Box::new(Counter(Arc::clone(&hits))) as Box<dyn SessionExtension>
    }

    #[test]
    fn registers_and_lists_in_name_order() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ExtensionRegistry::new();
        registry.register("trail", counter_factory(&hits)).unwrap();
        registry.register("recorder", counter_factory(&hits)).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["recorder", "trail"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn rejects_duplicate_reserved_and_empty_names() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ExtensionRegistry::new();
        registry.register("trail", counter_factory(&hits)).unwrap();
        assert!(matches!(
            registry.register("trail", counter_factory(&hits)),
            Err(Error::Extension(_))
        ));
        assert!(registry.register("position", counter_factory(&hits)).is_err());
        assert!(registry.register("  ", counter_factory(&hits)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_frees_the_name() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ExtensionRegistry::new();
        registry.register("trail", counter_factory(&hits)).unwrap();
        assert!(registry.remove("trail"));
        assert!(!registry.remove("trail"));
        assert!(!registry.contains("trail"));
        registry.register("trail", counter_factory(&hits)).unwrap();
    }

    #[test]
    fn instantiate_builds_independent_instances() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ExtensionRegistry::new();
        registry.register("trail", counter_factory(&hits)).unwrap();

        let mut first = registry.instantiate();
        let mut second = registry.instantiate();
        assert_eq!(first.len(), 1);
        first[0].1.on_position(&Coordinate::new(1.0, 1.0));
        second[0].1.on_position(&Coordinate::new(1.0, 1.0));
        second[0].1.on_reset();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
