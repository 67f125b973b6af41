//! Domain error types for the Hearth gateway
//!
//! Structured thiserror types for navigable diagnostics and compile-time
//! exhaustive handling.
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All library code returns Result<T, GatewayError> or one of the narrower
//! error types below.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

use crate::lifecycle::StartupPhase;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Gateway operational errors
///
/// Every variant carries structured context fields for diagnostics.
/// Pattern-match on the variant to understand the failure mode without
/// parsing error message strings.
///
/// Example log output:
/// ```text
/// GatewayError::ShardCircuitBroken { shard_id: 3, count: 10, max: 10 }
/// → "shard 3 exceeded consecutive error threshold (10/10)"
/// ```
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration file exists but could not be parsed or deserialized
    #[error("configuration file {} could not be parsed", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    /// Configuration value is present but invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// The default configuration template could not be written
    #[error("failed to write configuration template to {}", path.display())]
    TemplateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Recommended shard count could not be fetched from the platform
    #[error("recommended shard count query failed")]
    TopologyQuery(#[source] BoxError),

    /// Gateway connection could not be established
    #[error("gateway connection failed")]
    ConnectionFailed(#[source] BoxError),

    /// Shard ID overflow: u64 value exceeds u32::MAX (Twilight API boundary)
    #[error("shard ID overflow: {value} exceeds u32::MAX")]
    ShardIdOverflow { value: u64 },

    /// Shard exceeded consecutive error threshold (circuit breaker tripped)
    #[error("shard {shard_id} exceeded consecutive error threshold ({count}/{max})")]
    ShardCircuitBroken {
        shard_id: u64,
        count: u32,
        max: u32,
    },

    /// Shard reconnection failed (fatal — shard marked dead)
    #[error("shard {shard_id} reconnection failed")]
    ShardReconnectFailed {
        shard_id: u64,
        #[source]
        source: BoxError,
    },

    /// Module directory exists but could not be scanned
    #[error("module directory {} could not be scanned", path.display())]
    ModuleDiscovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Interaction response could not be delivered
    #[error("command reply could not be delivered")]
    CommandReply(#[source] BoxError),

    /// Health server listener could not be bound
    #[error("failed to bind health server on {addr}")]
    HealthBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl GatewayError {
    /// Returns a static label string suitable for Prometheus metrics.
    ///
    /// Used as the `error_type` label on `gateway_errors_total` counter.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } => "config_parse",
            Self::Config(_) => "config",
            Self::TemplateWrite { .. } => "template_write",
            Self::TopologyQuery(_) => "topology_query",
            Self::ConnectionFailed(_) => "connection",
            Self::ShardIdOverflow { .. } => "shard_overflow",
            Self::ShardCircuitBroken { .. } => "circuit_broken",
            Self::ShardReconnectFailed { .. } => "reconnect_failed",
            Self::ModuleDiscovery { .. } => "module_discovery",
            Self::CommandReply(_) => "command_reply",
            Self::HealthBind { .. } => "health_bind",
        }
    }
}

/// Lifecycle contract violations
///
/// These are programming errors in the caller, never transient faults.
/// They are a separate type so no retry logic can mistake one for an
/// operational failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("lifecycle contract violated: gateway is already running")]
    AlreadyRunning,

    #[error("lifecycle contract violated: gateway is not running")]
    NotRunning,
}

/// Error returned by `Lifecycle::start`
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Contract(#[from] ContractViolation),

    /// Fatal startup failure; partially built subsystems were torn down
    #[error("startup failed during {phase}")]
    Startup {
        phase: StartupPhase,
        #[source]
        source: GatewayError,
    },
}

impl LifecycleError {
    /// Returns true if this is a caller bug rather than an operational failure
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Contract(_))
    }
}

/// Per-module failures. Contained by the module manager, never escalated.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("module manifest {} is invalid", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("module '{module}' names unknown entry '{entry}'")]
    UnknownEntry { module: String, entry: String },

    #[error("module '{module}' is declared more than once")]
    Duplicate { module: String },

    #[error("module '{module}' not found")]
    NotFound { module: String },

    #[error("module '{module}' cannot {action} from state {state}")]
    InvalidTransition {
        module: String,
        action: &'static str,
        state: &'static str,
    },

    #[error("module '{module}' failed to {action}: {reason}")]
    Failed {
        module: String,
        action: &'static str,
        reason: String,
    },
}

/// Command or event handler failure
#[derive(Error, Debug)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Background execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("{pool} has been shut down")]
    Closed { pool: &'static str },
}
