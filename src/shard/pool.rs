//! Shard pool implementation
//!
//! Runs every shard in this process's range and dispatches their events to
//! the command and event registries.

use crate::error::GatewayError;
use crate::events::{CommandInvocation, GatewayEvent};
use crate::metrics::GatewayMetrics;
use crate::registry::{CommandOutcome, Dispatch};
use crate::shard::responder::{CommandResponder, ReplyTarget};
use crate::shard::state::{ShardHealth, ShardState};
use crate::topology::ConnectionParams;

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use twilight_gateway::{Config, ConfigBuilder, EventTypeFlags, Shard, StreamExt as _};
use twilight_model::gateway::event::Event;
use twilight_model::gateway::payload::outgoing::update_presence::UpdatePresencePayload;
use twilight_model::gateway::presence::{Activity, ActivityType, MinimalActivity, Status};
use twilight_model::gateway::ShardId;

/// Consecutive receive errors before a shard is declared dead
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Shards owned by this process
pub struct ShardPool {
    shards: Vec<Shard>,
    state: ShardState,
    dispatch: Dispatch,
    responder: Arc<dyn CommandResponder>,
    metrics: GatewayMetrics,
    auto_reconnect: bool,
    event_types: EventTypeFlags,
    shutdown_tx: broadcast::Sender<()>,
}

impl ShardPool {
    /// Create one shard per index in the resolved range
    pub fn new(
        params: &ConnectionParams,
        dispatch: Dispatch,
        responder: Arc<dyn CommandResponder>,
        metrics: GatewayMetrics,
    ) -> Result<Self, GatewayError> {
        let total = params.topology.connection_total();
        let range = params.topology.connection_range();
        let event_types = params.capabilities.event_types();

        info!(
            total_shards = total,
            first_shard = range.first,
            last_shard = range.last,
            shard_count = range.len(),
            cache_flags = ?params.capabilities.enabled(),
            event_types = ?event_types,
            "Creating shard pool"
        );

        let state = ShardState::new(range, total);

        let mut shards = Vec::with_capacity(range.len());
        for shard_id in range.indices() {
            let config = shard_config(params)?;
            shards.push(Shard::with_config(ShardId::new(shard_id, total), config));
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            shards,
            state,
            dispatch,
            responder,
            metrics,
            auto_reconnect: params.auto_reconnect,
            event_types,
            shutdown_tx,
        })
    }

    /// Get shared state (for health checks)
    pub fn state(&self) -> ShardState {
        self.state.clone()
    }

    /// Sender that stops every shard when signalled
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run all shards until they end or shutdown is signalled
    pub async fn run(self) {
        let mut handles = Vec::with_capacity(self.shards.len());

        for shard in self.shards {
            let shard_id: u64 = shard.id().number().into();
            let runner = ShardRunner {
                state: self.state.clone(),
                dispatch: self.dispatch.clone(),
                responder: Arc::clone(&self.responder),
                metrics: self.metrics.clone(),
                auto_reconnect: self.auto_reconnect,
                event_types: self.event_types,
            };
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            let handle = tokio::spawn(async move {
                tokio::select! {
                    result = runner.run(shard) => {
                        if let Err(e) = result {
                            error!(shard_id, error = %e, "Shard task failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!(shard_id, "Shard received shutdown signal");
                    }
                }
            });

            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }

        info!("Shard pool shut down");
    }
}

/// Build the per-shard gateway configuration
fn shard_config(params: &ConnectionParams) -> Result<Config, GatewayError> {
    let mut builder = ConfigBuilder::new(params.token.expose().to_owned(), params.intents)
        .large_threshold(params.large_threshold);

    if let Some(activity) = &params.activity {
        let activity: Activity = MinimalActivity {
            kind: ActivityType::Playing,
            name: activity.clone(),
            url: None,
        }
        .into();
        let presence = UpdatePresencePayload::new(vec![activity], false, None::<u64>, Status::Online)
            .map_err(|e| GatewayError::ConnectionFailed(Box::new(e)))?;
        builder = builder.presence(presence);
    }

    Ok(builder.build())
}

struct ShardRunner {
    state: ShardState,
    dispatch: Dispatch,
    responder: Arc<dyn CommandResponder>,
    metrics: GatewayMetrics,
    auto_reconnect: bool,
    event_types: EventTypeFlags,
}

impl ShardRunner {
    /// Run a single shard's event loop
    async fn run(self, mut shard: Shard) -> Result<(), GatewayError> {
        let shard_id: u64 = shard.id().number().into();

        self.state.set_health(shard_id, ShardHealth::Connecting);
        info!(shard_id, "Shard starting");

        let mut consecutive_errors: u32 = 0;

        while let Some(item) = shard.next_event(self.event_types).await {
            let event = match item {
                Ok(event) => {
                    consecutive_errors = 0;
                    event
                }
                Err(source) => {
                    consecutive_errors += 1;
                    warn!(shard_id, error = %source, consecutive = consecutive_errors, "Error receiving event");

                    if matches!(source.kind(), twilight_gateway::error::ReceiveMessageErrorType::Reconnect) {
                        let err = GatewayError::ShardReconnectFailed {
                            shard_id,
                            source: Box::new(source),
                        };
                        return Err(self.fail(shard_id, err));
                    }

                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        let err = GatewayError::ShardCircuitBroken {
                            shard_id,
                            count: consecutive_errors,
                            max: MAX_CONSECUTIVE_ERRORS,
                        };
                        return Err(self.fail(shard_id, err));
                    }

                    self.metrics.record_error("receive_error");
                    self.state.set_health(shard_id, ShardHealth::Disconnected);

                    if !self.auto_reconnect {
                        info!(shard_id, "Auto reconnect disabled, stopping shard");
                        return Ok(());
                    }
                    continue;
                }
            };

            self.track(shard_id, &event);

            if let Some(envelope) = GatewayEvent::from_twilight(&event, shard_id) {
                self.dispatch_event(&envelope, ReplyTarget::from_event(&event));
            }
        }

        info!(shard_id, "Shard event stream ended");
        Ok(())
    }

    fn fail(&self, shard_id: u64, err: GatewayError) -> GatewayError {
        self.metrics.record_error(err.error_type_label());
        self.state.set_health(shard_id, ShardHealth::Dead);
        error!(shard_id, error = %err, "Shard dead");
        err
    }

    /// Update health and counters for housekeeping events
    fn track(&self, shard_id: u64, event: &Event) {
        self.state.record_event(shard_id);
        if let Some(kind) = event.kind().name() {
            self.metrics.record_event(shard_id, kind);
        }

        match event {
            Event::Ready(ready) => {
                self.state.set_health(shard_id, ShardHealth::Ready);
                self.state.set_guilds(shard_id, ready.guilds.len() as u64);
                self.metrics.set_guilds(shard_id, ready.guilds.len() as u64);
                info!(shard_id, guilds = ready.guilds.len(), "Shard ready");
            }
            Event::Resumed => {
                self.state.set_health(shard_id, ShardHealth::Ready);
                info!(shard_id, "Shard resumed");
            }
            Event::GatewayHeartbeatAck => {
                self.state.record_heartbeat(shard_id);
                self.metrics.record_heartbeat(shard_id);
            }
            Event::GatewayReconnect | Event::GatewayInvalidateSession(_) => {
                self.state.set_health(shard_id, ShardHealth::Resuming);
            }
            Event::GuildCreate(guild) => {
                self.state.adjust_guilds(shard_id, 1);
                debug!(shard_id, guild_id = %guild.id(), "Guild joined");
            }
            Event::GuildDelete(guild) => {
                if guild.unavailable != Some(true) {
                    self.state.adjust_guilds(shard_id, -1);
                }
                debug!(shard_id, guild_id = %guild.id, "Guild left");
            }
            _ => {}
        }
    }

    fn dispatch_event(&self, envelope: &GatewayEvent, reply_to: Option<ReplyTarget>) {
        let shard_id = envelope.shard_id;

        let summary = self.dispatch.events.dispatch(envelope);
        if summary.handled > 0 {
            self.state.record_dispatch(shard_id);
        }
        if summary.failed > 0 {
            self.state.record_dispatch_failure(shard_id);
            self.metrics.record_dispatch_failure("event");
        }

        if let Some(invocation) = CommandInvocation::from_event(envelope) {
            match self.dispatch.commands.dispatch(&invocation) {
                CommandOutcome::Replied(reply) => {
                    debug!(shard_id, command = %invocation.name, replied = reply.is_some(), "Command executed");
                    if let (Some(content), Some(target)) = (reply, reply_to) {
                        self.reply(shard_id, invocation.name, target, content);
                    }
                }
                CommandOutcome::Failed(_) => {
                    self.state.record_dispatch_failure(shard_id);
                    self.metrics.record_dispatch_failure("command");
                }
                CommandOutcome::Unknown => {
                    debug!(shard_id, command = %invocation.name, "No handler for command");
                }
            }
        }
    }

    /// Deliver a reply without holding up the event loop
    fn reply(&self, shard_id: u64, command: String, target: ReplyTarget, content: String) {
        let responder = Arc::clone(&self.responder);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = responder.respond(&target, content).await {
                metrics.record_error(e.error_type_label());
                warn!(shard_id, %command, error = %e, "Failed to deliver command reply");
            }
        });
    }
}
