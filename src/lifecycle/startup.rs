//! Startup sequencer

use super::shutdown::{self, ShutdownTrigger, Subsystem, Subsystems};
use super::signals;
use super::state::{unix_seconds, LifecycleStatus, ModuleCounts, ProcessState, RunningInstance, StartupPhase};
use super::{Lifecycle, StartOutcome};
use crate::config::{ConfigOutcome, ConfigSnapshot};
use crate::error::{ContractViolation, GatewayError, LifecycleError};
use crate::modules::{ModuleManager, ModuleServices};
use crate::registry::Dispatch;
use crate::runtime::{ExecutionPools, Scheduler};
use crate::topology;
use std::path::PathBuf;
use std::time::{Instant, SystemTime};
use tracing::{error, info, warn};

impl Lifecycle {
    /// Run the startup sequence
    ///
    /// Stages run strictly in order. On a fatal error everything built so
    /// far is torn down before the error is returned, leaving the lifecycle
    /// `Stopped`.
    pub async fn start(&mut self) -> Result<StartOutcome, LifecycleError> {
        if self.state.is_running() {
            return Err(ContractViolation::AlreadyRunning.into());
        }
        self.drain_stale_triggers();
        let began = Instant::now();

        self.enter(StartupPhase::ConfigLoading);
        let config = match ConfigSnapshot::load(&self.options.config_path) {
            Ok(ConfigOutcome::Loaded(config)) => config,
            Ok(ConfigOutcome::Unconfigured(reason)) => {
                warn!(%reason, "Gateway is not configured, not starting");
                self.enter(StartupPhase::Unconfigured);
                return Ok(StartOutcome::Unconfigured(reason));
            }
            Err(e) => return Err(self.fail(e, Subsystems::new()).await),
        };
        self.enter(StartupPhase::ConfigLoaded);
        info!(
            language = %config.client.language,
            storage_enabled = config.storage.enabled,
            storage = ?config.storage,
            worker_threads = config.runtime.worker_threads,
            "Configuration loaded"
        );

        let mut subsystems = Subsystems::new();
        if let Err(e) = self.build(&config, &mut subsystems).await {
            return Err(self.fail(e, subsystems).await);
        }

        let modules = subsystems.modules().map(ModuleCounts::of).unwrap_or_default();
        let started_at = SystemTime::now();
        let signal_listener = self
            .options
            .handle_signals
            .then(|| signals::spawn_listener(self.trigger_tx.clone()));

        self.state = ProcessState::Running(RunningInstance {
            started_at,
            booted: began,
            config,
            subsystems,
            signal_listener,
        });

        self.metrics.record_startup(began.elapsed());
        self.metrics.set_running(true);
        for (state, count) in modules.by_state() {
            self.metrics.set_modules(state, count);
        }
        self.status_tx.send_replace(LifecycleStatus {
            phase: StartupPhase::Running,
            running: true,
            modules,
            started_at: unix_seconds(started_at),
        });

        info!(
            phase = %StartupPhase::Running,
            elapsed_ms = began.elapsed().as_millis() as u64,
            modules_enabled = modules.enabled,
            modules_failed = modules.failed,
            "Gateway running"
        );
        Ok(StartOutcome::Running)
    }

    /// Build every collaborator, recording each one as soon as it exists
    async fn build(&self, config: &ConfigSnapshot, subsystems: &mut Subsystems) -> Result<(), GatewayError> {
        let pools = ExecutionPools::new(config.runtime.worker_threads);
        subsystems.push(Subsystem::Pools(pools.clone()));

        let scheduler = Scheduler::new();
        subsystems.push(Subsystem::Scheduler(scheduler.clone()));

        let dispatch = Dispatch::default();
        subsystems.push(Subsystem::Commands(dispatch.commands.clone()));
        subsystems.push(Subsystem::Events(dispatch.events.clone()));

        self.enter(StartupPhase::ConnectionBuilding);
        let recommended = self
            .collaborators
            .topology
            .recommended_shards(config.client.token.expose())
            .await?;
        let params = topology::connection_params(config, recommended)?;
        info!(
            requested = %params.topology.requested,
            recommended,
            resolved = %params.topology.resolved_total,
            range = %params.topology.connection_range(),
            "Resolved shard topology"
        );

        self.enter(StartupPhase::Connecting);
        let connection = self.collaborators.connector.connect(params, dispatch.clone()).await?;
        subsystems.push(Subsystem::Connection(connection));

        self.enter(StartupPhase::ModuleLoading);
        let mut manager = ModuleManager::new(self.module_dir(config), self.collaborators.catalog.clone());
        manager.discover()?;

        let services = ModuleServices {
            config: config.clone(),
            commands: dispatch.commands,
            events: dispatch.events,
            pools,
            scheduler,
            booted_at: Instant::now(),
        };
        let summary = manager.enable_all(&services).await;
        info!(
            enabled = summary.enabled,
            failed = summary.failed,
            skipped = summary.skipped,
            "Modules loaded"
        );

        let counts = ModuleCounts::of(&manager);
        self.status_tx.send_modify(|status| status.modules = counts);
        subsystems.push(Subsystem::Modules(manager));

        Ok(())
    }

    async fn fail(&mut self, error: GatewayError, subsystems: Subsystems) -> LifecycleError {
        let phase = self.phase();
        error!(%phase, error = %error, error_type = error.error_type_label(), "Startup failed");
        self.metrics.record_error(error.error_type_label());
        self.enter(StartupPhase::FailedStartup);

        let report = shutdown::teardown(ShutdownTrigger::StartupFailure, subsystems).await;
        if !report.is_clean() {
            warn!(failed = report.failures().count(), "Teardown after failed startup was incomplete");
        }
        self.last_teardown = Some(report);

        self.state = ProcessState::Stopped;
        self.metrics.set_running(false);
        LifecycleError::Startup {
            phase,
            source: error,
        }
    }

    fn module_dir(&self, config: &ConfigSnapshot) -> PathBuf {
        self.options
            .module_dir
            .clone()
            .unwrap_or_else(|| config.modules.directory.clone())
    }
}
