//! Shard management module
//!
//! Opens the Discord gateway for the resolved shard range and tracks the
//! health of each shard.

mod connector;
mod pool;
mod responder;
mod state;

pub use connector::{GatewayConnection, GatewayConnector, TwilightConnector};
pub use pool::ShardPool;
pub use responder::{CommandResponder, DiscordResponder, ReplyTarget};
pub use state::{ShardHealth, ShardState};
