//! Command handler registry

use crate::error::HandlerError;
use crate::events::CommandInvocation;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Executes one named command, optionally producing a reply
///
/// A returned reply is posted back to the invoking interaction by the shard
/// that received it. Returning `None` sends nothing, leaving the handler to
/// answer on its own.
pub trait CommandHandler: Send + Sync {
    fn execute(&self, invocation: &CommandInvocation) -> Result<Option<String>, HandlerError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&CommandInvocation) -> Result<Option<String>, HandlerError> + Send + Sync,
{
    fn execute(&self, invocation: &CommandInvocation) -> Result<Option<String>, HandlerError> {
        self(invocation)
    }
}

struct Registration {
    owner: String,
    handler: Arc<dyn CommandHandler>,
}

/// Result of routing a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Replied(Option<String>),
    Failed(String),
    Unknown,
}

/// Commands keyed by name. One handler per name; later registrations win.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: Arc<DashMap<String, Registration>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        owner: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) {
        let owner = owner.into();
        let name = name.into().to_lowercase();
        if let Some(previous) = self.commands.insert(
            name.clone(),
            Registration {
                owner: owner.clone(),
                handler,
            },
        ) {
            warn!(command = %name, previous = %previous.owner, %owner, "Command replaced");
        } else {
            debug!(command = %name, %owner, "Registered command");
        }
    }

    pub fn dispatch(&self, invocation: &CommandInvocation) -> CommandOutcome {
        let handler = match self.commands.get(&invocation.name.to_lowercase()) {
            Some(registration) => Arc::clone(&registration.handler),
            None => return CommandOutcome::Unknown,
        };

        match handler.execute(invocation) {
            Ok(reply) => CommandOutcome::Replied(reply),
            Err(e) => {
                warn!(
                    command = %invocation.name,
                    shard_id = invocation.shard_id,
                    error = %e,
                    "Command failed"
                );
                CommandOutcome::Failed(e.to_string())
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_lowercase())
    }

    pub fn unregister_owner(&self, owner: &str) -> usize {
        let before = self.commands.len();
        self.commands.retain(|_, r| r.owner != owner);
        before - self.commands.len()
    }

    pub fn unregister_all(&self) -> usize {
        let removed = self.commands.len();
        self.commands.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
