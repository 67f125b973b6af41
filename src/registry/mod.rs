//! Command and event registries
//!
//! Modules register handlers here; shards dispatch into them. Registrations
//! carry their owner so a disabled module's handlers can be removed.

mod commands;
mod events;

pub use commands::{CommandHandler, CommandOutcome, CommandRegistry};
pub use events::{DispatchSummary, EventHandler, EventRegistry};

/// Both registries, as handed to the connection for dispatch
#[derive(Clone, Default)]
pub struct Dispatch {
    pub commands: CommandRegistry,
    pub events: EventRegistry,
}
