// src/discord/mod.rs
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures_util::FutureExt;
use serenity::all::*;
use serenity::async_trait;

use crate::AppContext;
use crate::antinuke::Antinuke;
use crate::antinuke::mitigation::Collaborators;
use crate::commands::{Invocation, parse_mention_command};
use crate::commands_sync;
use crate::permissions::Capabilities;

pub mod platform;
pub mod respond;

use platform::SerenityPlatform;
use respond::{ChannelResponder, InteractionResponder};

pub struct Handler {
    pub app: Arc<AppContext>,
}

impl Handler {
    fn antinuke(&self) -> Option<Arc<Antinuke>> {
        let an = self.app.antinuke();
        if an.is_none() {
            tracing::warn!("antinuke not installed, event ignored");
        }
        an
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!("Logged in as {}", ready.user.name);

        for g in ready.guilds {
            if let Err(e) = commands_sync::register_commands(&ctx, g.id).await {
                tracing::warn!(error=?e, gid=%g.id.get(), "register_commands failed (on ready)");
            }
        }
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: Option<bool>) {
        let gid = guild.id.get();
        if let Err(e) = commands_sync::register_commands(&ctx, guild.id).await {
            tracing::warn!(error=?e, gid, "register_commands failed (on guild_create)");
        }
        tracing::info!(guild=%guild.name, gid, "guild available");
    }

    async fn guild_member_addition(&self, _ctx: Context, member: Member) {
        let Some(an) = self.antinuke() else {
            return;
        };
        let obs = an.notify_member_join(member.guild_id.get(), Instant::now()).await;
        tracing::trace!(gid = member.guild_id.get(), uid = member.user.id.get(), ?obs, "join observed");
    }

    async fn channel_delete(
        &self,
        _ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        let Some(an) = self.antinuke() else {
            return;
        };
        let obs = an.notify_channel_delete(channel.guild_id.get(), Instant::now()).await;
        tracing::trace!(gid = channel.guild_id.get(), channel = channel.id.get(), ?obs, "channel delete observed");
    }

    async fn guild_role_delete(
        &self,
        _ctx: Context,
        guild_id: GuildId,
        removed_role_id: RoleId,
        _removed_role: Option<Role>,
    ) {
        let Some(an) = self.antinuke() else {
            return;
        };
        let obs = an.notify_role_delete(guild_id.get(), Instant::now()).await;
        tracing::trace!(gid = guild_id.get(), role = removed_role_id.get(), ?obs, "role delete observed");
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(cmd) = interaction else {
            return;
        };
        let Some(gid) = cmd.guild_id else {
            return;
        };

        let started = Instant::now();
        let (name, args) = commands_sync::slash_invocation(&cmd);
        let caps = cmd
            .member
            .as_ref()
            .and_then(|m| m.permissions)
            .map(Capabilities::from_permissions)
            .unwrap_or_default();
        let inv = Invocation {
            guild_id: gid.get(),
            channel_id: cmd.channel_id.get(),
            message_id: None,
            caller_id: cmd.user.id.get(),
            caps,
            args,
        };
        let out = InteractionResponder {
            http: ctx.http.clone(),
            cmd: &cmd,
        };

        let fut = self.app.commands.run(&self.app, &name, &inv, &out);
        let status = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => "ok",
            Ok(Err(e)) => {
                tracing::warn!(error=?e, command=%name, "reply failed");
                "error"
            }
            Err(_) => "panic",
        };
        tracing::info!(
            gid = gid.get(),
            uid = inv.caller_id,
            command = %name,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "slash command"
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let Some(gid) = msg.guild_id else {
            return;
        };
        if msg.author.bot {
            return;
        }

        let bot_id = ctx.cache.current_user().id.get();
        let Some((name, args)) = parse_mention_command(&msg.content, bot_id) else {
            return;
        };
        if self.app.commands.get(&name).is_none() {
            return;
        }

        let caps = match gid
            .member(&ctx.http, msg.author.id)
            .await
            .and_then(|m| m.permissions(&ctx.cache))
        {
            Ok(perms) => Capabilities::from_permissions(perms),
            Err(e) => {
                tracing::debug!(error=?e, gid=%gid.get(), "member permissions unavailable");
                Capabilities::none()
            }
        };
        let inv = Invocation {
            guild_id: gid.get(),
            channel_id: msg.channel_id.get(),
            message_id: Some(msg.id.get()),
            caller_id: msg.author.id.get(),
            caps,
            args,
        };
        let out = ChannelResponder {
            http: ctx.http.clone(),
            channel_id: msg.channel_id,
        };

        if let Err(e) = self.app.commands.run(&self.app, &name, &inv, &out).await {
            tracing::warn!(error=?e, command=%name, gid=%gid.get(), "mention command reply failed");
        }
    }
}

fn intents_from_settings(names: &[String]) -> GatewayIntents {
    let mut i = GatewayIntents::empty();
    for n in names {
        match n.as_str() {
            "GUILDS" => i |= GatewayIntents::GUILDS,
            "GUILD_MEMBERS" => i |= GatewayIntents::GUILD_MEMBERS,
            "GUILD_MESSAGES" => i |= GatewayIntents::GUILD_MESSAGES,
            "MESSAGE_CONTENT" => i |= GatewayIntents::MESSAGE_CONTENT,
            "GUILD_MODERATION" => i |= GatewayIntents::GUILD_MODERATION,
            other => tracing::warn!(intent = other, "unknown gateway intent ignored"),
        }
    }
    if i.is_empty() {
        return crate::default_gateway_intents();
    }
    i
}

pub async fn run_bot(ctx: Arc<AppContext>) -> Result<()> {
    let token = &ctx.settings.discord.token;
    if token.is_empty() {
        anyhow::bail!("missing Discord token (CHERRY_DISCORD__TOKEN or DISCORD_TOKEN)");
    }

    let intents = intents_from_settings(&ctx.settings.discord.intents);
    let handler = Handler { app: ctx.clone() };

    let mut client = serenity::Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    let platform = SerenityPlatform::new(
        client.http.clone(),
        client.cache.clone(),
        ctx.settings.antinuke.slowmode_secs,
    );
    let an = ctx.install(Collaborators::from_platform(Arc::new(platform)));
    Antinuke::spawn_prune_task(
        &an,
        Duration::from_secs(ctx.settings.antinuke.prune_interval_secs),
    );

    tracing::info!(?intents, "Discord client starting…");
    client.start().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_parse_known_names() {
        let i = intents_from_settings(&["GUILDS".into(), "GUILD_MODERATION".into()]);
        assert!(i.contains(GatewayIntents::GUILDS));
        assert!(i.contains(GatewayIntents::GUILD_MODERATION));
        assert!(!i.contains(GatewayIntents::MESSAGE_CONTENT));
    }

    #[test]
    fn empty_intent_list_falls_back_to_defaults() {
        assert_eq!(intents_from_settings(&[]), crate::default_gateway_intents());
    }
}
