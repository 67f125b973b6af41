//! Process state and the status published to observers

use crate::config::ConfigSnapshot;
use crate::lifecycle::shutdown::Subsystems;
use crate::modules::{ModuleManager, ModuleState};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};
use tokio::task::JoinHandle;

/// Where the startup sequence is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPhase {
    Idle,
    ConfigLoading,
    /// Terminal for this run: no configuration or no token
    Unconfigured,
    ConfigLoaded,
    ConnectionBuilding,
    Connecting,
    ModuleLoading,
    Running,
    FailedStartup,
}

impl StartupPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ConfigLoading => "config loading",
            Self::Unconfigured => "unconfigured",
            Self::ConfigLoaded => "config loaded",
            Self::ConnectionBuilding => "connection building",
            Self::Connecting => "connecting",
            Self::ModuleLoading => "module loading",
            Self::Running => "running",
            Self::FailedStartup => "failed startup",
        }
    }
}

impl fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Module totals per state
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleCounts {
    pub discovered: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub failed: usize,
}

impl ModuleCounts {
    pub fn of(manager: &ModuleManager) -> Self {
        Self {
            discovered: manager.count(ModuleState::Discovered),
            enabled: manager.count(ModuleState::Enabled),
            disabled: manager.count(ModuleState::Disabled),
            failed: manager.count(ModuleState::Failed),
        }
    }

    pub(crate) fn by_state(&self) -> [(&'static str, usize); 4] {
        [
            (ModuleState::Discovered.label(), self.discovered),
            (ModuleState::Enabled.label(), self.enabled),
            (ModuleState::Disabled.label(), self.disabled),
            (ModuleState::Failed.label(), self.failed),
        ]
    }
}

/// Snapshot published on the lifecycle's watch channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleStatus {
    pub phase: StartupPhase,
    pub running: bool,
    pub modules: ModuleCounts,
    /// Seconds since the Unix epoch at which the gateway reached `Running`
    pub started_at: Option<u64>,
}

impl Default for LifecycleStatus {
    fn default() -> Self {
        Self {
            phase: StartupPhase::Idle,
            running: false,
            modules: ModuleCounts::default(),
            started_at: None,
        }
    }
}

/// Run state of the process. Only the lifecycle writes it.
#[derive(Default)]
pub enum ProcessState {
    #[default]
    Stopped,
    Running(RunningInstance),
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    pub fn instance(&self) -> Option<&RunningInstance> {
        match self {
            Self::Running(instance) => Some(instance),
            Self::Stopped => None,
        }
    }
}

impl fmt::Debug for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("Stopped"),
            Self::Running(instance) => f.debug_tuple("Running").field(instance).finish(),
        }
    }
}

/// Everything a successful startup built
pub struct RunningInstance {
    pub(crate) started_at: SystemTime,
    pub(crate) booted: Instant,
    pub(crate) config: ConfigSnapshot,
    pub(crate) subsystems: Subsystems,
    pub(crate) signal_listener: Option<JoinHandle<()>>,
}

impl RunningInstance {
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.booted.elapsed()
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    pub fn subsystems(&self) -> &Subsystems {
        &self.subsystems
    }
}

impl fmt::Debug for RunningInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningInstance")
            .field("started_at", &self.started_at)
            .field("subsystems", &self.subsystems)
            .finish_non_exhaustive()
    }
}

pub(crate) fn unix_seconds(time: SystemTime) -> Option<u64> {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_display_as_words() {
        assert_eq!(StartupPhase::ConnectionBuilding.to_string(), "connection building");
        assert_eq!(StartupPhase::FailedStartup.to_string(), "failed startup");
    }

    #[test]
    fn status_serializes_phase_in_snake_case() {
        let status = LifecycleStatus {
            phase: StartupPhase::ModuleLoading,
            ..LifecycleStatus::default()
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"phase\":\"module_loading\""));
        assert!(json.contains("\"running\":false"));
    }

    #[test]
    fn stopped_has_no_instance() {
        let state = ProcessState::default();
        assert!(!state.is_running());
        assert!(state.instance().is_none());
    }
}
