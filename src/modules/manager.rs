//! Module lifecycle manager
//!
//! Discovers manifests, enables and disables modules. A module that fails is
//! marked `Failed` and the manager moves on; nothing here aborts startup
//! except an unreadable module directory.

use crate::error::{GatewayError, ModuleError};
use crate::modules::catalog::ModuleCatalog;
use crate::modules::manifest::ModuleManifest;
use crate::modules::{Module, ModuleContext, ModuleServices};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Discovered,
    Enabled,
    Disabled,
    Failed,
}

impl ModuleState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One discovered module and where it is in its lifecycle
pub struct ModuleRecord {
    manifest: Arc<ModuleManifest>,
    state: ModuleState,
    failure: Option<String>,
    instance: Option<Arc<dyn Module>>,
    context: Option<ModuleContext>,
}

impl ModuleRecord {
    fn discovered(manifest: ModuleManifest) -> Self {
        Self {
            manifest: Arc::new(manifest),
            state: ModuleState::Discovered,
            failure: None,
            instance: None,
            context: None,
        }
    }

    fn failed(manifest: ModuleManifest, error: &ModuleError) -> Self {
        warn!(module = %manifest.name, error = %error, "Module failed during discovery");
        Self {
            manifest: Arc::new(manifest),
            state: ModuleState::Failed,
            failure: Some(error.to_string()),
            instance: None,
            context: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Why the module is `Failed`
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("name", &self.manifest.name)
            .field("state", &self.state)
            .field("failure", &self.failure)
            .finish()
    }
}

/// Result of enabling every discovered module
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnableSummary {
    pub enabled: usize,
    pub failed: usize,
    /// Discovered with `enabled = false`
    pub skipped: usize,
}

/// Owns every module record
pub struct ModuleManager {
    directory: PathBuf,
    catalog: ModuleCatalog,
    records: Vec<ModuleRecord>,
}

impl ModuleManager {
    pub fn new(directory: impl Into<PathBuf>, catalog: ModuleCatalog) -> Self {
        Self {
            directory: directory.into(),
            catalog,
            records: Vec::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Scan the module directory for `*.toml` manifests
    ///
    /// A missing directory is created and yields no modules. Refused while
    /// any module is enabled.
    pub fn discover(&mut self) -> Result<&[ModuleRecord], GatewayError> {
        if self.records.iter().any(|r| r.state == ModuleState::Enabled) {
            warn!("Module discovery requested while modules are enabled, keeping current records");
            return Ok(&self.records);
        }

        self.records.clear();

        if !self.directory.exists() {
            if let Err(e) = std::fs::create_dir_all(&self.directory) {
                warn!(path = %self.directory.display(), error = %e, "Could not create module directory");
            }
            info!(path = %self.directory.display(), "No module directory, no modules to load");
            return Ok(&self.records);
        }

        let to_error = |source| GatewayError::ModuleDiscovery {
            path: self.directory.clone(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.directory).map_err(to_error)? {
            let path = entry.map_err(to_error)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let record = self.discover_one(&path);
            debug!(module = %record.name(), state = %record.state, "Discovered module");
            self.records.push(record);
        }

        info!(
            path = %self.directory.display(),
            modules = self.records.len(),
            "Module discovery complete"
        );
        Ok(&self.records)
    }

    fn discover_one(&self, path: &Path) -> ModuleRecord {
        let manifest = match ModuleManifest::load(path) {
            Ok(manifest) => manifest,
            Err(e) => {
                let name = ModuleManifest::name_from_path(path);
                let mut placeholder = ModuleManifest::new(name.clone(), name);
                placeholder.source = path.to_path_buf();
                return ModuleRecord::failed(placeholder, &e);
            }
        };

        if self.position(&manifest.name).is_some() {
            let error = ModuleError::Duplicate {
                module: manifest.name.clone(),
            };
            return ModuleRecord::failed(manifest, &error);
        }

        if !self.catalog.contains(&manifest.entry) {
            let error = ModuleError::UnknownEntry {
                module: manifest.name.clone(),
                entry: manifest.entry.clone(),
            };
            return ModuleRecord::failed(manifest, &error);
        }

        ModuleRecord::discovered(manifest)
    }

    /// Enable every discovered module whose manifest asks for it
    pub async fn enable_all(&mut self, services: &ModuleServices) -> EnableSummary {
        let mut summary = EnableSummary::default();

        let candidates: Vec<(String, bool)> = self
            .records
            .iter()
            .filter(|r| r.state == ModuleState::Discovered)
            .map(|r| (r.manifest.name.clone(), r.manifest.enabled))
            .collect();

        for (name, wanted) in candidates {
            if !wanted {
                debug!(module = %name, "Module disabled in manifest, skipping");
                summary.skipped += 1;
                continue;
            }
            match self.enable(&name, services).await {
                Ok(()) => summary.enabled += 1,
                Err(_) => summary.failed += 1,
            }
        }

        summary
    }

    /// Enable one module. On failure the module is marked `Failed`.
    pub async fn enable(&mut self, name: &str, services: &ModuleServices) -> Result<(), ModuleError> {
        let idx = self.position(name).ok_or_else(|| ModuleError::NotFound {
            module: name.to_string(),
        })?;

        let record = &self.records[idx];
        if !matches!(record.state, ModuleState::Discovered | ModuleState::Disabled) {
            return Err(ModuleError::InvalidTransition {
                module: name.to_string(),
                action: "enable",
                state: record.state.label(),
            });
        }

        let instance = match record
            .instance
            .clone()
            .or_else(|| self.catalog.instantiate(&record.manifest.entry))
        {
            Some(instance) => instance,
            None => {
                let error = ModuleError::UnknownEntry {
                    module: name.to_string(),
                    entry: record.manifest.entry.clone(),
                };
                self.mark_failed(idx, &error);
                return Err(error);
            }
        };

        let ctx = ModuleContext::new(Arc::clone(&record.manifest), services.clone());

        match instance.enable(&ctx).await {
            Ok(()) => {
                let record = &mut self.records[idx];
                record.state = ModuleState::Enabled;
                record.failure = None;
                record.instance = Some(instance);
                record.context = Some(ctx);
                info!(module = %name, version = %record.manifest.version, "Module enabled");
                Ok(())
            }
            Err(e) => {
                remove_registrations(&ctx);
                let error = ModuleError::Failed {
                    module: name.to_string(),
                    action: "enable",
                    reason: e.to_string(),
                };
                self.mark_failed(idx, &error);
                Err(error)
            }
        }
    }

    /// Disable one enabled module and drop its registrations
    pub async fn disable(&mut self, name: &str) -> Result<(), ModuleError> {
        let idx = self.position(name).ok_or_else(|| ModuleError::NotFound {
            module: name.to_string(),
        })?;

        let record = &mut self.records[idx];
        if record.state != ModuleState::Enabled {
            return Err(ModuleError::InvalidTransition {
                module: name.to_string(),
                action: "disable",
                state: record.state.label(),
            });
        }

        let (Some(instance), Some(ctx)) = (record.instance.clone(), record.context.take()) else {
            record.state = ModuleState::Disabled;
            return Ok(());
        };

        let result = instance.disable(&ctx).await;
        remove_registrations(&ctx);

        match result {
            Ok(()) => {
                self.records[idx].state = ModuleState::Disabled;
                info!(module = %name, "Module disabled");
                Ok(())
            }
            Err(e) => {
                let error = ModuleError::Failed {
                    module: name.to_string(),
                    action: "disable",
                    reason: e.to_string(),
                };
                self.mark_failed(idx, &error);
                Err(error)
            }
        }
    }

    /// Disable every enabled module. Failures are logged and swallowed.
    ///
    /// Returns how many modules disabled cleanly.
    pub async fn disable_all(&mut self) -> usize {
        let enabled: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.state == ModuleState::Enabled)
            .map(|r| r.manifest.name.clone())
            .collect();

        let mut disabled = 0;
        for name in enabled {
            match self.disable(&name).await {
                Ok(()) => disabled += 1,
                Err(e) => warn!(module = %name, error = %e, "Module failed to disable, continuing"),
            }
        }
        disabled
    }

    /// Drop every record. Only called at shutdown.
    pub fn forget(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[ModuleRecord] {
        &self.records
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.records.iter().filter(|r| r.state == ModuleState::Enabled)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleRecord> {
        self.records.iter().find(|r| r.manifest.name == name)
    }

    pub fn count(&self, state: ModuleState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.records.iter().position(|r| r.manifest.name == name)
    }

    fn mark_failed(&mut self, idx: usize, error: &ModuleError) {
        let record = &mut self.records[idx];
        warn!(module = %record.manifest.name, error = %error, "Module failed");
        record.state = ModuleState::Failed;
        record.failure = Some(error.to_string());
        record.context = None;
    }
}

fn remove_registrations(ctx: &ModuleContext) {
    let services = ctx.services();
    let commands = services.commands.unregister_owner(ctx.name());
    let events = services.events.unregister_owner(ctx.name());
    if commands + events > 0 {
        debug!(module = %ctx.name(), commands, events, "Removed module registrations");
    }
}
