//! Pluggable modules
//!
//! Modules are declared by TOML manifests in the module directory and
//! implemented by factories registered in a [`ModuleCatalog`]. The
//! [`ModuleManager`] owns every [`ModuleRecord`] and is the only place module
//! state changes.
//!
//! ```text
//! Discovered ──enable──▶ Enabled ──disable──▶ Disabled
//!     │                     │                    │
//!     └──── failure ────────┴──── failure ───────┴──▶ Failed
//! ```

mod builtin;
mod catalog;
mod manager;
mod manifest;

pub use builtin::UptimeModule;
pub use catalog::{ModuleCatalog, ModuleFactory};
pub use manager::{EnableSummary, ModuleManager, ModuleRecord, ModuleState};
pub use manifest::ModuleManifest;

use crate::config::ConfigSnapshot;
use crate::registry::{CommandHandler, CommandRegistry, EventHandler, EventRegistry};
use crate::runtime::{ExecutionPools, Scheduler};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Error type module implementations return
pub type ModuleResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// An independently loadable unit of behavior
///
/// Modules must not assume any other module is enabled before or after them.
#[async_trait]
pub trait Module: Send + Sync {
    async fn enable(&self, ctx: &ModuleContext) -> ModuleResult;

    async fn disable(&self, ctx: &ModuleContext) -> ModuleResult;
}

/// Process services shared with every module
#[derive(Clone)]
pub struct ModuleServices {
    pub config: ConfigSnapshot,
    pub commands: CommandRegistry,
    pub events: EventRegistry,
    pub pools: ExecutionPools,
    pub scheduler: Scheduler,
    pub booted_at: Instant,
}

/// What one module sees: the shared services plus its own manifest
#[derive(Clone)]
pub struct ModuleContext {
    manifest: Arc<ModuleManifest>,
    services: ModuleServices,
}

impl ModuleContext {
    pub fn new(manifest: Arc<ModuleManifest>, services: ModuleServices) -> Self {
        Self { manifest, services }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// The manifest's `[settings]` table
    pub fn settings(&self) -> &serde_json::Value {
        &self.manifest.settings
    }

    pub fn services(&self) -> &ModuleServices {
        &self.services
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.services.config
    }

    pub fn pools(&self) -> &ExecutionPools {
        &self.services.pools
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.services.scheduler
    }

    /// Register a command owned by this module
    pub fn register_command(&self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.services.commands.register(self.name(), name, handler);
    }

    /// Register an event handler owned by this module
    pub fn register_event(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        self.services.events.register(self.name(), event_type, handler);
    }
}
