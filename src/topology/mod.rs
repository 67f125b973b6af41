//! Shard topology resolution
//!
//! Computes the shard total and range this process owns, and reconciles
//! requested cache flags against the granted gateway intents.

mod capability;
mod discovery;
mod resolver;

pub use capability::{CacheFlag, CapabilityAdjustment, CapabilitySet};
pub use discovery::{DiscordTopology, StaticTopology, TopologySource};
pub use resolver::{
    resolve_range, resolve_shard_total, ConnectionParams, ShardRange, ShardTopology, ShardTotal,
};

use crate::config::ConfigSnapshot;
use crate::error::GatewayError;

/// Bounds Discord accepts for the identify `large_threshold`
const LARGE_THRESHOLD_MIN: u64 = 50;
const LARGE_THRESHOLD_MAX: u64 = 250;

/// Build the connection parameters from configuration and the recommended count
pub fn connection_params(
    snapshot: &ConfigSnapshot,
    recommended: u32,
) -> Result<ConnectionParams, GatewayError> {
    let client = &snapshot.client;
    let intents = snapshot.intents()?;

    if !(LARGE_THRESHOLD_MIN..=LARGE_THRESHOLD_MAX).contains(&client.large_threshold) {
        return Err(GatewayError::Config(format!(
            "large_threshold must be between {LARGE_THRESHOLD_MIN} and {LARGE_THRESHOLD_MAX}, got {}",
            client.large_threshold
        )));
    }

    let topology = ShardTopology::resolve(
        snapshot.shard_total()?,
        client.shard_min,
        client.shard_max,
        recommended,
    );

    let mut capabilities = CapabilitySet::new(
        intents,
        client.enabled_cache_flags.iter().copied(),
        client.disabled_cache_flags.iter().copied(),
    );
    capabilities.reconcile();

    Ok(ConnectionParams {
        token: client.token.clone(),
        intents,
        capabilities,
        topology,
        activity: snapshot.activity().map(str::to_owned),
        auto_reconnect: client.auto_reconnect,
        large_threshold: client.large_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, Token};

    #[test]
    fn params_combine_topology_capabilities_and_activity() {
        let mut settings = Settings::default();
        settings.client.token = Token::new("t");
        settings.client.shard_total = 2;
        settings.client.shard_max = 50;
        settings.client.activity = "watching shards".to_string();
        settings.client.gateway_intents = vec!["GUILDS".to_string()];
        settings.client.enabled_cache_flags = vec![CacheFlag::VoiceState, CacheFlag::RoleTags];

        let params = connection_params(&ConfigSnapshot::from_settings(settings), 10).unwrap();

        assert_eq!(params.topology.resolved_total, ShardTotal::Fixed(10));
        assert_eq!(params.topology.range, Some(ShardRange { first: 0, last: 9 }));
        assert_eq!(params.activity.as_deref(), Some("watching shards"));
        assert!(params.capabilities.disabled().contains(&CacheFlag::VoiceState));
        assert!(params.capabilities.is_enabled(CacheFlag::RoleTags));
        assert!(!format!("{params:?}").contains("token"));
    }

    #[test]
    fn out_of_range_large_threshold_is_rejected() {
        let mut settings = Settings::default();
        settings.client.large_threshold = 1000;
        let err = connection_params(&ConfigSnapshot::from_settings(settings), 1).unwrap_err();
        assert!(err.to_string().contains("large_threshold"));
    }

    #[test]
    fn empty_activity_sets_none() {
        let params =
            connection_params(&ConfigSnapshot::from_settings(Settings::default()), 1).unwrap();
        assert_eq!(params.activity, None);
    }
}
