//! Recommended shard count discovery

use crate::error::GatewayError;
use async_trait::async_trait;
use tracing::{debug, info};
use twilight_http::Client;

/// Source of the platform's recommended shard count
///
/// Queried exactly once per startup; failures are fatal and not retried.
#[async_trait]
pub trait TopologySource: Send + Sync {
    async fn recommended_shards(&self, token: &str) -> Result<u32, GatewayError>;
}

/// Queries `GET /gateway/bot` through twilight-http
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscordTopology;

#[async_trait]
impl TopologySource for DiscordTopology {
    async fn recommended_shards(&self, token: &str) -> Result<u32, GatewayError> {
        let client = Client::new(token.to_owned());

        debug!("Querying recommended shard count");

        let info = client
            .gateway()
            .authed()
            .await
            .map_err(|e| GatewayError::TopologyQuery(Box::new(e)))?
            .model()
            .await
            .map_err(|e| GatewayError::TopologyQuery(Box::new(e)))?;

        info!(
            recommended_shards = info.shards,
            remaining_sessions = info.session_start_limit.remaining,
            "Fetched recommended shard count"
        );

        Ok(info.shards)
    }
}

/// Fixed recommendation, for deployments without REST access and tests
#[derive(Debug, Clone, Copy)]
pub struct StaticTopology(pub u32);

#[async_trait]
impl TopologySource for StaticTopology {
    async fn recommended_shards(&self, _token: &str) -> Result<u32, GatewayError> {
        Ok(self.0)
    }
}
