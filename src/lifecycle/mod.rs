//! Process lifecycle
//!
//! [`Lifecycle`] is the single owner of the process state. `start` runs the
//! startup sequence one stage at a time:
//!
//! ```text
//! Idle → ConfigLoading → ConfigLoaded → ConnectionBuilding → Connecting → ModuleLoading → Running
//!              │                                  any failure ──▶ FailedStartup (teardown)
//!              └──▶ Unconfigured
//! ```
//!
//! `shutdown` tears down whatever a successful start built. Both take
//! `&mut self`, so lifecycle calls are serialized by construction.

mod shutdown;
mod signals;
mod startup;
mod state;

pub use shutdown::{
    ShutdownHandle, ShutdownReport, ShutdownTrigger, StepOutcome, StepReport, Subsystem, Subsystems,
};
pub use state::{
    LifecycleStatus, ModuleCounts, ProcessState, RunningInstance, StartupPhase,
};

use crate::config::{Unconfigured, DEFAULT_CONFIG_PATH};
use crate::error::ContractViolation;
use crate::metrics::GatewayMetrics;
use crate::modules::{ModuleCatalog, ModuleManager};
use crate::shard::{GatewayConnector, ShardState, TwilightConnector};
use crate::topology::{DiscordTopology, TopologySource};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// External collaborators the lifecycle sequences
#[derive(Clone)]
pub struct Collaborators {
    pub topology: Arc<dyn TopologySource>,
    pub connector: Arc<dyn GatewayConnector>,
    pub catalog: ModuleCatalog,
}

impl Collaborators {
    /// Discord REST for topology, twilight-gateway shards, built-in modules
    pub fn discord(metrics: GatewayMetrics) -> Self {
        Self {
            topology: Arc::new(DiscordTopology),
            connector: Arc::new(TwilightConnector::new(metrics)),
            catalog: ModuleCatalog::with_builtins(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    pub config_path: PathBuf,
    /// Overrides `[modules] directory`
    pub module_dir: Option<PathBuf>,
    /// Listen for SIGINT/SIGTERM once running
    pub handle_signals: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            module_dir: None,
            handle_signals: true,
        }
    }
}

/// How a start attempt ended, when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Running,
    /// Nothing was built; the operator has to configure the gateway first
    Unconfigured(Unconfigured),
}

/// Owner of the process state and everything startup builds
pub struct Lifecycle {
    options: LifecycleOptions,
    collaborators: Collaborators,
    metrics: GatewayMetrics,
    state: ProcessState,
    status_tx: watch::Sender<LifecycleStatus>,
    trigger_tx: mpsc::UnboundedSender<ShutdownTrigger>,
    trigger_rx: mpsc::UnboundedReceiver<ShutdownTrigger>,
    last_teardown: Option<ShutdownReport>,
}

impl Lifecycle {
    pub fn new(options: LifecycleOptions, collaborators: Collaborators, metrics: GatewayMetrics) -> Self {
        let (status_tx, _) = watch::channel(LifecycleStatus::default());
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        Self {
            options,
            collaborators,
            metrics,
            state: ProcessState::Stopped,
            status_tx,
            trigger_tx,
            trigger_rx,
            last_teardown: None,
        }
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Current phase and module counts, updated on every transition
    pub fn status(&self) -> watch::Receiver<LifecycleStatus> {
        self.status_tx.subscribe()
    }

    /// Report of the most recent teardown, after a shutdown or a failed start
    pub fn last_teardown(&self) -> Option<&ShutdownReport> {
        self.last_teardown.as_ref()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.trigger_tx.clone())
    }

    pub fn modules(&self) -> Option<&ModuleManager> {
        self.state.instance().and_then(|i| i.subsystems.modules())
    }

    /// Shard health of the open connection
    pub fn shard_state(&self) -> Option<ShardState> {
        self.state
            .instance()
            .and_then(|i| i.subsystems.connection())
            .and_then(|c| c.shard_state())
    }

    /// Wait for the next termination signal or operator request
    pub async fn shutdown_requested(&mut self) -> ShutdownTrigger {
        // `self` holds a sender, so the channel never closes
        self.trigger_rx
            .recv()
            .await
            .unwrap_or(ShutdownTrigger::Operator)
    }

    /// Tear down the running instance and return to `Stopped`
    ///
    /// Fails with [`ContractViolation::NotRunning`] unless a start succeeded
    /// and no shutdown has run since.
    pub async fn shutdown(&mut self, trigger: ShutdownTrigger) -> Result<ShutdownReport, ContractViolation> {
        let instance = match std::mem::take(&mut self.state) {
            ProcessState::Running(instance) => instance,
            ProcessState::Stopped => return Err(ContractViolation::NotRunning),
        };

        info!(%trigger, uptime_secs = instance.uptime().as_secs(), "Shutting down gateway");

        if let Some(listener) = instance.signal_listener {
            listener.abort();
        }

        let report = shutdown::teardown(trigger, instance.subsystems).await;

        self.metrics.set_running(false);
        self.metrics.set_shards_ready(0);
        for (state, _) in ModuleCounts::default().by_state() {
            self.metrics.set_modules(state, 0);
        }
        self.status_tx.send_replace(LifecycleStatus::default());

        info!(
            steps = report.steps.len(),
            failed = report.failures().count(),
            "Gateway shutdown complete"
        );
        self.last_teardown = Some(report.clone());
        Ok(report)
    }

    fn enter(&self, phase: StartupPhase) {
        info!(%phase, "Lifecycle phase");
        self.status_tx.send_modify(|status| status.phase = phase);
    }

    fn phase(&self) -> StartupPhase {
        self.status_tx.borrow().phase
    }

    fn drain_stale_triggers(&mut self) {
        while self.trigger_rx.try_recv().is_ok() {}
    }
}
