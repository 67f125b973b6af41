//! Hearth Gateway - lifecycle orchestrator for a sharded Discord client
//!
//! Sequences configuration loading, shard topology resolution, the gateway
//! connection and module loading, and tears them down again in reverse.

pub mod build_info;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod lifecycle;
pub mod metrics;
pub mod modules;
pub mod registry;
pub mod runtime;
pub mod shard;
pub mod topology;

pub use error::{ContractViolation, GatewayError, LifecycleError};
pub use lifecycle::{Collaborators, Lifecycle, LifecycleOptions, StartOutcome};
