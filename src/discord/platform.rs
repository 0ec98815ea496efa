//! Serenity-backed implementations of the antinuke collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    Cache, ChannelId, ChannelType, Colour, CreateChannel, CreateEmbed, CreateEmbedFooter,
    CreateMessage, EditChannel, EditMember, GetMessages, GuildChannel, GuildId, Http, MessageId,
    PermissionOverwrite, PermissionOverwriteType, Permissions, RoleId, Timestamp, UserId,
};
use serenity::model::guild::audit_log::{Action, ChannelAction, RoleAction};

use crate::antinuke::EventType;
use crate::antinuke::mitigation::{AuditResolver, LockdownReport, Mitigator, Notifier};
use crate::error::{PlatformError, PlatformResult};
use crate::moderation::Moderator;

pub const LOG_CHANNEL_NAMES: [&str; 2] = ["modlogs", "mod-logs"];
pub const EMBED_COLOUR: Colour = Colour::new(0x2F3136);
const FOOTER: &str = "cherry security";
/// Bulk delete refuses messages older than this.
const BULK_DELETE_MAX_AGE_SECS: i64 = 14 * 24 * 60 * 60;

pub struct SerenityPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
    slowmode_secs: u16,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, slowmode_secs: u16) -> Self {
        Self {
            http,
            cache,
            slowmode_secs,
        }
    }

    /// Returns `Ok(false)` when `@everyone` was already denied sending.
    async fn lockdown_channel(&self, ch: &GuildChannel, everyone: RoleId) -> PlatformResult<bool> {
        ch.id
            .edit(&self.http, EditChannel::new().rate_limit_per_user(self.slowmode_secs))
            .await?;
        self.set_everyone_send(ch, everyone, true).await
    }

    /// Deny (`deny = true`) or clear `@everyone`'s `SEND_MESSAGES` overwrite.
    /// Returns `Ok(false)` when nothing had to change. An overwrite left with
    /// no bits at all is removed.
    async fn set_everyone_send(&self, ch: &GuildChannel, everyone: RoleId, deny: bool) -> PlatformResult<bool> {
        let kind = PermissionOverwriteType::Role(everyone);
        let (allow, denied) = ch
            .permission_overwrites
            .iter()
            .find(|o| o.kind == kind)
            .map(|o| (o.allow, o.deny))
            .unwrap_or((Permissions::empty(), Permissions::empty()));

        let next_allow = allow & !Permissions::SEND_MESSAGES;
        let next_deny = if deny {
            denied | Permissions::SEND_MESSAGES
        } else {
            denied & !Permissions::SEND_MESSAGES
        };
        if next_allow == allow && next_deny == denied {
            return Ok(false);
        }

        if next_allow.is_empty() && next_deny.is_empty() {
            ch.id.delete_permission(&self.http, kind).await?;
        } else {
            ch.id
                .create_permission(
                    &self.http,
                    PermissionOverwrite {
                        allow: next_allow,
                        deny: next_deny,
                        kind,
                    },
                )
                .await?;
        }
        Ok(true)
    }

    async fn guild_channel(&self, channel_id: u64) -> PlatformResult<GuildChannel> {
        ChannelId::new(channel_id)
            .to_channel(&self.http)
            .await?
            .guild()
            .ok_or(PlatformError::NotFound)
    }

    async fn owner_of(&self, guild_id: GuildId) -> PlatformResult<UserId> {
        let cached = self.cache.guild(guild_id).map(|g| g.owner_id);
        if let Some(owner) = cached {
            return Ok(owner);
        }
        Ok(guild_id.to_partial_guild(&self.http).await?.owner_id)
    }

    async fn dm(&self, user: UserId, message: &str) -> PlatformResult<()> {
        let dm = user.create_dm_channel(&self.http).await?;
        dm.say(&self.http, message).await?;
        Ok(())
    }

    async fn find_log_channel(&self, guild_id: GuildId) -> PlatformResult<ChannelId> {
        let channels = guild_id.channels(&self.http).await?;
        if let Some(ch) = channels.values().find(|c| {
            c.kind == ChannelType::Text && LOG_CHANNEL_NAMES.contains(&c.name.as_str())
        }) {
            return Ok(ch.id);
        }
        let created = guild_id
            .create_channel(&self.http, CreateChannel::new("modlogs").kind(ChannelType::Text))
            .await?;
        Ok(created.id)
    }
}

#[async_trait]
impl AuditResolver for SerenityPlatform {
    async fn responsible(
        &self,
        guild_id: u64,
        kind: EventType,
        max_age: Duration,
    ) -> PlatformResult<Option<u64>> {
        let action = match kind {
            EventType::ChannelDelete => Action::Channel(ChannelAction::Delete),
            EventType::RoleDelete => Action::Role(RoleAction::Delete),
            EventType::MemberJoin => return Ok(None),
        };
        let logs = GuildId::new(guild_id)
            .audit_logs(&self.http, Some(action), None, None, Some(1))
            .await?;

        let Some(entry) = logs.entries.first() else {
            return Ok(None);
        };
        let age = Timestamp::now().unix_timestamp() - entry.id.created_at().unix_timestamp();
        if age > max_age.as_secs() as i64 {
            tracing::debug!(guild = guild_id, age, "newest audit entry too old");
            return Ok(None);
        }
        Ok(Some(entry.user_id.get()))
    }
}

#[async_trait]
impl Mitigator for SerenityPlatform {
    async fn lockdown_guild(&self, guild_id: u64) -> PlatformResult<LockdownReport> {
        let gid = GuildId::new(guild_id);
        let everyone = RoleId::new(guild_id);
        let channels = gid.channels(&self.http).await?;

        let mut report = LockdownReport::default();
        for ch in channels.values().filter(|c| c.kind == ChannelType::Text) {
            match self.lockdown_channel(ch, everyone).await {
                Ok(true) => report.locked += 1,
                Ok(false) => report.already_locked += 1,
                Err(e) => {
                    tracing::debug!(guild = guild_id, channel = ch.id.get(), error = %e, "channel lock failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn ban_subject(&self, guild_id: u64, subject: u64, reason: &str) -> PlatformResult<()> {
        GuildId::new(guild_id)
            .ban_with_reason(&self.http, UserId::new(subject), 0, reason)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SerenityPlatform {
    async fn notify_owners(&self, guild_id: u64, message: &str) -> PlatformResult<()> {
        let owner = self.owner_of(GuildId::new(guild_id)).await?;
        self.dm(owner, message).await
    }

    async fn notify_user(&self, user_id: u64, message: &str) -> PlatformResult<()> {
        if user_id == 0 {
            return Err(PlatformError::NotFound);
        }
        self.dm(UserId::new(user_id), message).await
    }

    async fn mod_log(&self, guild_id: u64, title: &str, message: &str) -> PlatformResult<()> {
        let channel = self.find_log_channel(GuildId::new(guild_id)).await?;
        let embed = CreateEmbed::new()
            .title(title)
            .description(message)
            .colour(EMBED_COLOUR)
            .footer(CreateEmbedFooter::new(FOOTER))
            .timestamp(Timestamp::now());
        channel
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }

    async fn guild_name(&self, guild_id: u64) -> PlatformResult<String> {
        let gid = GuildId::new(guild_id);
        let cached = self.cache.guild(gid).map(|g| g.name.clone());
        if let Some(name) = cached {
            return Ok(name);
        }
        Ok(gid.to_partial_guild(&self.http).await?.name)
    }
}

#[async_trait]
impl Moderator for SerenityPlatform {
    async fn kick(&self, guild_id: u64, user_id: u64, reason: Option<&str>) -> PlatformResult<()> {
        let gid = GuildId::new(guild_id);
        match reason {
            Some(r) => gid.kick_with_reason(&self.http, UserId::new(user_id), r).await?,
            None => gid.kick(&self.http, UserId::new(user_id)).await?,
        }
        Ok(())
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: Option<&str>) -> PlatformResult<()> {
        let gid = GuildId::new(guild_id);
        match reason {
            Some(r) => gid.ban_with_reason(&self.http, UserId::new(user_id), 0, r).await?,
            None => gid.ban(&self.http, UserId::new(user_id), 0).await?,
        }
        Ok(())
    }

    async fn unban(&self, guild_id: u64, user_id: u64) -> PlatformResult<()> {
        GuildId::new(guild_id)
            .unban(&self.http, UserId::new(user_id))
            .await?;
        Ok(())
    }

    async fn timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: Option<&str>,
    ) -> PlatformResult<()> {
        let until = Timestamp::from_unix_timestamp(until.timestamp())
            .map_err(|e| PlatformError::Other(e.to_string()))?;
        let mut edit = EditMember::new().disable_communication_until_datetime(until);
        if let Some(r) = reason {
            edit = edit.audit_log_reason(r);
        }
        GuildId::new(guild_id)
            .edit_member(&self.http, UserId::new(user_id), edit)
            .await?;
        Ok(())
    }

    async fn purge(
        &self,
        channel_id: u64,
        count: usize,
        author: Option<u64>,
        before: Option<u64>,
    ) -> PlatformResult<usize> {
        let ch = ChannelId::new(channel_id);
        // filtering by author needs a wider page to find enough matches
        let fetch = if author.is_some() { 100 } else { count.min(100) as u8 };
        let mut builder = GetMessages::new().limit(fetch);
        if let Some(b) = before {
            builder = builder.before(MessageId::new(b));
        }
        let msgs = ch.messages(&self.http, builder).await?;

        let now = Timestamp::now().unix_timestamp();
        let ids: Vec<MessageId> = msgs
            .iter()
            .filter(|m| author.is_none_or(|a| m.author.id.get() == a))
            .filter(|m| now - m.timestamp.unix_timestamp() < BULK_DELETE_MAX_AGE_SECS)
            .map(|m| m.id)
            .take(count)
            .collect();

        match ids.len() {
            0 => {}
            1 => ch.delete_message(&self.http, ids[0]).await?,
            _ => ch.delete_messages(&self.http, ids.clone()).await?,
        }
        Ok(ids.len())
    }

    async fn set_slowmode(&self, channel_id: u64, seconds: u16) -> PlatformResult<()> {
        ChannelId::new(channel_id)
            .edit(&self.http, EditChannel::new().rate_limit_per_user(seconds))
            .await?;
        Ok(())
    }

    async fn lock_channel(&self, guild_id: u64, channel_id: u64) -> PlatformResult<()> {
        let ch = self.guild_channel(channel_id).await?;
        self.set_everyone_send(&ch, RoleId::new(guild_id), true).await?;
        Ok(())
    }

    async fn unlock_channel(&self, guild_id: u64, channel_id: u64) -> PlatformResult<()> {
        let ch = self.guild_channel(channel_id).await?;
        self.set_everyone_send(&ch, RoleId::new(guild_id), false).await?;
        Ok(())
    }

    async fn log_channel(&self, guild_id: u64) -> PlatformResult<u64> {
        Ok(self.find_log_channel(GuildId::new(guild_id)).await?.get())
    }
}
