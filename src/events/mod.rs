//! Event handling module
//!
//! Converts Twilight events into the envelopes dispatched to module handlers.

pub mod envelope;

pub use envelope::{kinds, CommandInvocation, GatewayEvent};
