//! Compiled-in module implementations keyed by entry name

use crate::modules::builtin::UptimeModule;
use crate::modules::Module;
use std::collections::HashMap;
use std::sync::Arc;

/// Creates a fresh module instance
pub type ModuleFactory = Arc<dyn Fn() -> Arc<dyn Module> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ModuleCatalog {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every module shipped in this crate
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(UptimeModule::ENTRY, || -> Arc<dyn Module> {
            Arc::new(UptimeModule::default())
        });
        catalog
    }

    pub fn register<F>(&mut self, entry: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Module> + Send + Sync + 'static,
    {
        self.factories.insert(entry.into(), Arc::new(factory));
        self
    }

    pub fn instantiate(&self, entry: &str) -> Option<Arc<dyn Module>> {
        self.factories.get(entry).map(|factory| factory())
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.factories.contains_key(entry)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
