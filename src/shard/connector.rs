//! Gateway connection seam
//!
//! The lifecycle only builds a connection and later closes it. The shards
//! themselves run in a background task owned by the connection.

use crate::error::GatewayError;
use crate::metrics::GatewayMetrics;
use crate::registry::Dispatch;
use crate::shard::pool::ShardPool;
use crate::shard::responder::DiscordResponder;
use crate::shard::state::ShardState;
use crate::topology::ConnectionParams;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Opens the platform connection
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    /// Returns once the client is constructed. Handshakes may continue in
    /// the background.
    async fn connect(
        &self,
        params: ConnectionParams,
        dispatch: Dispatch,
    ) -> Result<Box<dyn GatewayConnection>, GatewayError>;
}

/// Handle to an open connection
#[async_trait]
pub trait GatewayConnection: Send + Sync {
    /// Shard health, when the connection tracks it
    fn shard_state(&self) -> Option<ShardState>;

    /// Stop receiving gateway events. In-flight handlers run to completion.
    async fn close(self: Box<Self>) -> Result<(), GatewayError>;
}

/// Connects through twilight-gateway
#[derive(Clone, Default)]
pub struct TwilightConnector {
    metrics: GatewayMetrics,
}

impl TwilightConnector {
    pub fn new(metrics: GatewayMetrics) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl GatewayConnector for TwilightConnector {
    async fn connect(
        &self,
        params: ConnectionParams,
        dispatch: Dispatch,
    ) -> Result<Box<dyn GatewayConnection>, GatewayError> {
        let responder = Arc::new(DiscordResponder::new(params.token.expose()));
        let pool = ShardPool::new(&params, dispatch, responder, self.metrics.clone())?;
        let state = pool.state();
        let shutdown_tx = pool.shutdown_sender();

        info!(
            shards = state.shard_count(),
            range = %state.range(),
            total = state.total_shards(),
            "Starting shards and connecting to Discord"
        );

        let task = tokio::spawn(pool.run());

        Ok(Box::new(TwilightConnection {
            state,
            shutdown_tx,
            task,
        }))
    }
}

struct TwilightConnection {
    state: ShardState,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

#[async_trait]
impl GatewayConnection for TwilightConnection {
    fn shard_state(&self) -> Option<ShardState> {
        Some(self.state.clone())
    }

    async fn close(self: Box<Self>) -> Result<(), GatewayError> {
        // No receivers means every shard task already ended
        let _ = self.shutdown_tx.send(());

        self.task.await.map_err(|e| {
            warn!(error = %e, "Shard pool task did not finish cleanly");
            GatewayError::ConnectionFailed(Box::new(e))
        })
    }
}
