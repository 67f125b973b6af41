//! Interaction replies
//!
//! Command handlers return their reply as a string. The shard runner hands
//! it to a [`CommandResponder`] together with the interaction it answers.

use crate::error::GatewayError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use twilight_http::Client;
use twilight_model::gateway::event::Event;
use twilight_model::http::interaction::{
    InteractionResponse, InteractionResponseData, InteractionResponseType,
};
use twilight_model::id::marker::{ApplicationMarker, InteractionMarker};
use twilight_model::id::Id;

/// The interaction a reply is addressed to
#[derive(Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub application_id: Id<ApplicationMarker>,
    pub interaction_id: Id<InteractionMarker>,
    pub token: String,
}

impl ReplyTarget {
    /// Reply target of an interaction event
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::InteractionCreate(interaction) => Some(Self {
                application_id: interaction.application_id,
                interaction_id: interaction.id,
                token: interaction.token.clone(),
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for ReplyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyTarget")
            .field("application_id", &self.application_id)
            .field("interaction_id", &self.interaction_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Sends a command's reply back to the invoking user
#[async_trait]
pub trait CommandResponder: Send + Sync {
    async fn respond(&self, target: &ReplyTarget, content: String) -> Result<(), GatewayError>;
}

/// Answers interactions through twilight-http
#[derive(Clone)]
pub struct DiscordResponder {
    client: Arc<Client>,
}

impl DiscordResponder {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Arc::new(Client::new(token.into())),
        }
    }
}

#[async_trait]
impl CommandResponder for DiscordResponder {
    async fn respond(&self, target: &ReplyTarget, content: String) -> Result<(), GatewayError> {
        let response = InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(InteractionResponseData {
                content: Some(content),
                ..Default::default()
            }),
        };

        self.client
            .interaction(target.application_id)
            .create_response(target.interaction_id, &target.token, &response)
            .await
            .map_err(|e| GatewayError::CommandReply(Box::new(e)))?;
        Ok(())
    }
}
