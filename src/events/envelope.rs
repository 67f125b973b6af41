//! Event envelopes for module dispatch
//!
//! Converts Twilight events to a flat envelope keyed by event type, and
//! extracts slash-command invocations from interactions.

use serde::Serialize;
use twilight_model::application::interaction::InteractionData;
use twilight_model::gateway::event::Event;
use uuid::Uuid;

/// Event type names handlers register against
pub mod kinds {
    pub const SHARD_READY: &str = "shard.ready";
    pub const SHARD_RESUMED: &str = "shard.resumed";
    pub const GUILD_JOIN: &str = "guild.join";
    pub const GUILD_LEAVE: &str = "guild.leave";
    pub const MEMBER_JOIN: &str = "member.join";
    pub const MEMBER_LEAVE: &str = "member.leave";
    pub const MEMBER_UPDATE: &str = "member.update";
    pub const MESSAGE_CREATE: &str = "message.create";
    pub const INTERACTION_CREATE: &str = "interaction.create";
}

/// Generic gateway event payload
#[derive(Debug, Clone, Serialize)]
pub struct GatewayEvent {
    pub event_id: String,
    pub event_type: &'static str,
    pub shard_id: u64,
    pub timestamp: u64,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    pub data: serde_json::Value,
}

impl GatewayEvent {
    /// Empty envelope of the given type
    pub fn new(event_type: &'static str, shard_id: u64) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            shard_id,
            timestamp: now_millis(),
            guild_id: None,
            channel_id: None,
            user_id: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_guild(mut self, guild_id: impl ToString) -> Self {
        self.guild_id = Some(guild_id.to_string());
        self
    }

    pub fn with_channel(mut self, channel_id: impl ToString) -> Self {
        self.channel_id = Some(channel_id.to_string());
        self
    }

    pub fn with_user(mut self, user_id: impl ToString) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Build an envelope from a Twilight event
    ///
    /// Returns None for gateway housekeeping events (heartbeats, hello, ...)
    pub fn from_twilight(event: &Event, shard_id: u64) -> Option<Self> {
        let envelope = match event {
            Event::Ready(ready) => Self::new(kinds::SHARD_READY, shard_id).with_data(
                serde_json::json!({
                    "guilds": ready.guilds.len(),
                    "session_id": ready.session_id,
                }),
            ),

            Event::Resumed => Self::new(kinds::SHARD_RESUMED, shard_id),

            Event::GuildCreate(guild) => {
                Self::new(kinds::GUILD_JOIN, shard_id).with_guild(guild.id())
            }

            Event::GuildDelete(guild) => Self::new(kinds::GUILD_LEAVE, shard_id)
                .with_guild(guild.id)
                .with_data(serde_json::json!({ "unavailable": guild.unavailable })),

            Event::MemberAdd(member) => Self::new(kinds::MEMBER_JOIN, shard_id)
                .with_guild(member.guild_id)
                .with_user(member.user.id)
                .with_data(serde_json::json!({ "username": member.user.name })),

            Event::MemberRemove(member) => Self::new(kinds::MEMBER_LEAVE, shard_id)
                .with_guild(member.guild_id)
                .with_user(member.user.id),

            Event::MemberUpdate(member) => Self::new(kinds::MEMBER_UPDATE, shard_id)
                .with_guild(member.guild_id)
                .with_user(member.user.id)
                .with_data(serde_json::json!({
                    "roles": member.roles.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
                    "nick": member.nick,
                })),

            Event::MessageCreate(message) => {
                let mut envelope = Self::new(kinds::MESSAGE_CREATE, shard_id)
                    .with_channel(message.channel_id)
                    .with_user(message.author.id)
                    .with_data(serde_json::json!({
                        "message_id": message.id.to_string(),
                        "content": message.content,
                    }));
                envelope.guild_id = message.guild_id.map(|id| id.to_string());
                envelope
            }

            Event::InteractionCreate(interaction) => {
                let mut envelope = Self::new(kinds::INTERACTION_CREATE, shard_id).with_data(
                    serde_json::json!({
                        "interaction_id": interaction.id.to_string(),
                        "interaction_type": format!("{:?}", interaction.kind),
                        "command_name": command_name(&interaction.data),
                    }),
                );
                envelope.guild_id = interaction.guild_id.map(|id| id.to_string());
                envelope.channel_id = interaction.channel.as_ref().map(|c| c.id.to_string());
                envelope.user_id = interaction.author_id().map(|id| id.to_string());
                envelope
            }

            _ => return None,
        };

        Some(envelope)
    }
}

/// A slash command to route to the command registry
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub name: String,
    pub shard_id: u64,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
}

impl CommandInvocation {
    pub fn new(name: impl Into<String>, shard_id: u64) -> Self {
        Self {
            name: name.into(),
            shard_id,
            guild_id: None,
            channel_id: None,
            user_id: None,
        }
    }

    /// Extract an application command from an interaction envelope
    pub fn from_event(event: &GatewayEvent) -> Option<Self> {
        if event.event_type != kinds::INTERACTION_CREATE {
            return None;
        }
        let name = event.data.get("command_name")?.as_str()?;

        Some(Self {
            name: name.to_string(),
            shard_id: event.shard_id,
            guild_id: event.guild_id.clone(),
            channel_id: event.channel_id.clone(),
            user_id: event.user_id.clone(),
        })
    }
}

fn command_name(data: &Option<InteractionData>) -> Option<String> {
    match data {
        Some(InteractionData::ApplicationCommand(command)) => Some(command.name.clone()),
        _ => None,
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeats_are_not_dispatched() {
        assert!(GatewayEvent::from_twilight(&Event::GatewayHeartbeatAck, 0).is_none());
        assert!(GatewayEvent::from_twilight(&Event::GatewayReconnect, 0).is_none());
    }

    #[test]
    fn resumed_maps_to_shard_resumed() {
        let event = GatewayEvent::from_twilight(&Event::Resumed, 4).unwrap();
        assert_eq!(event.event_type, kinds::SHARD_RESUMED);
        assert_eq!(event.shard_id, 4);
    }

    #[test]
    fn command_invocation_requires_command_name() {
        let event = GatewayEvent::new(kinds::INTERACTION_CREATE, 1)
            .with_guild(42)
            .with_data(serde_json::json!({ "command_name": "uptime" }));
        let invocation = CommandInvocation::from_event(&event).unwrap();
        assert_eq!(invocation.name, "uptime");
        assert_eq!(invocation.guild_id.as_deref(), Some("42"));

        let component = GatewayEvent::new(kinds::INTERACTION_CREATE, 1)
            .with_data(serde_json::json!({ "command_name": null }));
        assert!(CommandInvocation::from_event(&component).is_none());

        let message = GatewayEvent::new(kinds::MESSAGE_CREATE, 1)
            .with_data(serde_json::json!({ "command_name": "uptime" }));
        assert!(CommandInvocation::from_event(&message).is_none());
    }

    #[test]
    fn envelope_serializes_event_type() {
        let json = serde_json::to_string(&GatewayEvent::new(kinds::GUILD_JOIN, 0)).unwrap();
        assert!(json.contains("\"event_type\":\"guild.join\""));
    }
}
