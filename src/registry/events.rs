//! Event handler registry

use crate::error::HandlerError;
use crate::events::GatewayEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handles one kind of gateway event
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &GatewayEvent) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(&GatewayEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &GatewayEvent) -> Result<(), HandlerError> {
        self(event)
    }
}

struct Registration {
    owner: String,
    handler: Arc<dyn EventHandler>,
}

/// Outcome of dispatching one event
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub handled: usize,
    pub failed: usize,
}

/// Handlers keyed by event type, shared between shards and modules
#[derive(Clone, Default)]
pub struct EventRegistry {
    handlers: Arc<DashMap<String, Vec<Registration>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        owner: impl Into<String>,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) {
        let owner = owner.into();
        let event_type = event_type.into();
        debug!(%owner, %event_type, "Registered event handler");
        self.handlers
            .entry(event_type)
            .or_default()
            .push(Registration { owner, handler });
    }

    /// Run every handler for the event's type. Failures are logged, not returned.
    pub fn dispatch(&self, event: &GatewayEvent) -> DispatchSummary {
        // Clone handlers out so no map shard lock is held while they run
        let handlers: Vec<(String, Arc<dyn EventHandler>)> = match self.handlers.get(event.event_type) {
            Some(entry) => entry
                .iter()
                .map(|r| (r.owner.clone(), Arc::clone(&r.handler)))
                .collect(),
            None => return DispatchSummary::default(),
        };

        let mut summary = DispatchSummary::default();
        for (owner, handler) in handlers {
            match handler.handle(event) {
                Ok(()) => summary.handled += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        %owner,
                        event_type = event.event_type,
                        shard_id = event.shard_id,
                        error = %e,
                        "Event handler failed"
                    );
                }
            }
        }
        summary
    }

    /// Remove every handler registered by `owner`. Returns removed count.
    pub fn unregister_owner(&self, owner: &str) -> usize {
        let mut removed = 0;
        for mut entry in self.handlers.iter_mut() {
            let before = entry.len();
            entry.retain(|r| r.owner != owner);
            removed += before - entry.len();
        }
        self.handlers.retain(|_, registrations| !registrations.is_empty());
        removed
    }

    /// Remove every handler. Returns removed count.
    pub fn unregister_all(&self) -> usize {
        let removed = self.len();
        self.handlers.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.handlers.iter().map(|e| e.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
