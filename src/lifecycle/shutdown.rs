//! Shutdown coordination
//!
//! Startup pushes every collaborator it builds onto [`Subsystems`]. Teardown
//! pops them in reverse, so only what was actually built is touched, and
//! each step runs even if an earlier one failed.

use crate::modules::ModuleManager;
use crate::registry::{CommandRegistry, EventRegistry};
use crate::runtime::{ExecutionPools, Scheduler};
use crate::shard::GatewayConnection;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// What asked for the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    StartupFailure,
    /// SIGINT / SIGTERM
    Signal,
    Operator,
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StartupFailure => "startup failure",
            Self::Signal => "signal",
            Self::Operator => "operator",
        })
    }
}

/// Lets an operator request shutdown from anywhere in the process
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<ShutdownTrigger>,
}

impl ShutdownHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ShutdownTrigger>) -> Self {
        Self { tx }
    }

    /// Returns false if the lifecycle is gone
    pub fn request(&self) -> bool {
        self.tx.send(ShutdownTrigger::Operator).is_ok()
    }
}

/// One built collaborator
pub enum Subsystem {
    Pools(ExecutionPools),
    Scheduler(Scheduler),
    Commands(CommandRegistry),
    Events(EventRegistry),
    Connection(Box<dyn GatewayConnection>),
    Modules(ModuleManager),
}

impl Subsystem {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pools(_) => "execution pools",
            Self::Scheduler(_) => "scheduler",
            Self::Commands(_) => "command registry",
            Self::Events(_) => "event registry",
            Self::Connection(_) => "gateway connection",
            Self::Modules(_) => "modules",
        }
    }
}

impl fmt::Debug for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered record of built collaborators
#[derive(Debug, Default)]
pub struct Subsystems {
    built: Vec<Subsystem>,
}

impl Subsystems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subsystem: Subsystem) {
        self.built.push(subsystem);
    }

    pub fn len(&self) -> usize {
        self.built.len()
    }

    pub fn is_empty(&self) -> bool {
        self.built.is_empty()
    }

    /// Names in build order
    pub fn names(&self) -> Vec<&'static str> {
        self.built.iter().map(Subsystem::name).collect()
    }

    pub fn modules(&self) -> Option<&ModuleManager> {
        self.built.iter().find_map(|s| match s {
            Subsystem::Modules(manager) => Some(manager),
            _ => None,
        })
    }

    pub fn connection(&self) -> Option<&dyn GatewayConnection> {
        self.built.iter().find_map(|s| match s {
            Subsystem::Connection(connection) => Some(connection.as_ref()),
            _ => None,
        })
    }

    fn pop(&mut self) -> Option<Subsystem> {
        self.built.pop()
    }
}

/// Result of one teardown step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub subsystem: &'static str,
    pub outcome: StepOutcome,
}

/// What teardown did, step by step in the order it ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub trigger: ShutdownTrigger,
    pub steps: Vec<StepReport>,
}

impl ShutdownReport {
    /// Subsystem names in teardown order
    pub fn order(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.subsystem).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Tear down everything in `subsystems`, newest first
///
/// Never fails. A failing step is logged and recorded and the next step
/// still runs.
pub(crate) async fn teardown(trigger: ShutdownTrigger, mut subsystems: Subsystems) -> ShutdownReport {
    info!(%trigger, subsystems = subsystems.len(), "Tearing down subsystems");

    let mut steps = Vec::with_capacity(subsystems.len());
    while let Some(subsystem) = subsystems.pop() {
        let name = subsystem.name();
        let outcome = stop(subsystem).await;
        match &outcome {
            StepOutcome::Completed(detail) => info!(subsystem = name, %detail, "Subsystem stopped"),
            StepOutcome::Failed(reason) => warn!(subsystem = name, %reason, "Subsystem failed to stop cleanly, continuing"),
        }
        steps.push(StepReport {
            subsystem: name,
            outcome,
        });
    }

    ShutdownReport { trigger, steps }
}

async fn stop(subsystem: Subsystem) -> StepOutcome {
    match subsystem {
        Subsystem::Modules(mut manager) => {
            let enabled = manager.enabled().count();
            let disabled = manager.disable_all().await;
            manager.forget();
            if disabled == enabled {
                StepOutcome::Completed(format!("{disabled} modules disabled"))
            } else {
                StepOutcome::Failed(format!(
                    "{} of {enabled} modules failed to disable",
                    enabled - disabled
                ))
            }
        }
        Subsystem::Connection(connection) => match connection.close().await {
            Ok(()) => StepOutcome::Completed("connection closed".to_string()),
            Err(e) => StepOutcome::Failed(e.to_string()),
        },
        Subsystem::Events(events) => {
            StepOutcome::Completed(format!("{} event handlers unregistered", events.unregister_all()))
        }
        Subsystem::Commands(commands) => {
            StepOutcome::Completed(format!("{} commands unregistered", commands.unregister_all()))
        }
        Subsystem::Scheduler(scheduler) => {
            StepOutcome::Completed(format!("{} scheduled tasks stopped", scheduler.stop()))
        }
        Subsystem::Pools(pools) => {
            StepOutcome::Completed(format!("{} background jobs cancelled", pools.shutdown_now()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GatewayError, HandlerError};
    use crate::events::CommandInvocation;
    use crate::shard::ShardState;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct RefusingConnection;

    #[async_trait]
    impl GatewayConnection for RefusingConnection {
        fn shard_state(&self) -> Option<ShardState> {
            None
        }

        async fn close(self: Box<Self>) -> Result<(), GatewayError> {
            Err(GatewayError::Config("close refused".to_string()))
        }
    }

    #[tokio::test]
    async fn empty_teardown_is_a_noop() {
        let report = teardown(ShutdownTrigger::StartupFailure, Subsystems::new()).await;
        assert!(report.steps.is_empty());
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn teardown_runs_in_reverse_and_survives_failures() {
        let pools = ExecutionPools::new(2);
        let scheduler = Scheduler::new();
        let commands = CommandRegistry::new();
        commands.register(
            "test",
            "ping",
            Arc::new(|_: &CommandInvocation| -> Result<Option<String>, HandlerError> { Ok(None) }),
        );

        let mut subsystems = Subsystems::new();
        subsystems.push(Subsystem::Pools(pools.clone()));
        subsystems.push(Subsystem::Scheduler(scheduler.clone()));
        subsystems.push(Subsystem::Commands(commands.clone()));
        subsystems.push(Subsystem::Connection(Box::new(RefusingConnection)));

        let report = teardown(ShutdownTrigger::Operator, subsystems).await;

        assert_eq!(
            report.order(),
            vec!["gateway connection", "command registry", "scheduler", "execution pools"]
        );
        assert_eq!(report.failures().count(), 1);
        assert!(commands.is_empty());
        assert!(scheduler.is_stopped());
        assert!(pools.is_closed());
    }

    #[test]
    fn handle_reports_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ShutdownHandle::new(tx);
        assert!(handle.request());
        drop(rx);
        assert!(!handle.request());
    }
}
