use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serenity::all::{
    ChannelId, CommandInteraction, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateMessage, Http,
};

use crate::commands::{Reply, Respondable};
use crate::error::PlatformError;

use super::platform::EMBED_COLOUR;

fn embed(reply: &Reply) -> CreateEmbed {
    CreateEmbed::new()
        .title(reply.title)
        .description(&reply.body)
        .colour(EMBED_COLOUR)
}

/// Replies to a slash command. Refusals and errors are only shown to the caller.
pub struct InteractionResponder<'a> {
    pub http: Arc<Http>,
    pub cmd: &'a CommandInteraction,
}

#[async_trait]
impl Respondable for InteractionResponder<'_> {
    async fn send(&self, reply: &Reply) -> Result<()> {
        let private = matches!(reply.title, "permission denied" | "error" | "missing argument");
        self.cmd
            .create_response(
                &self.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .embed(embed(reply))
                        .ephemeral(private),
                ),
            )
            .await?;
        Ok(())
    }
}

/// Replies in the channel a mention command came from.
pub struct ChannelResponder {
    pub http: Arc<Http>,
    pub channel_id: ChannelId,
}

#[async_trait]
impl Respondable for ChannelResponder {
    async fn send(&self, reply: &Reply) -> Result<()> {
        let sent = self
            .channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed(reply)))
            .await;

        match sent.map_err(PlatformError::from) {
            Ok(_) => Ok(()),
            // no embed permission: plain text still gets through
            Err(PlatformError::PermissionDenied) => {
                self.channel_id
                    .say(&self.http, format!("**{}**\n{}", reply.title, reply.body))
                    .await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
