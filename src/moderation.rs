//! Manual moderation: kick, ban, unban, massban, timeout, purge, purge_user,
//! slowmode, lock, unlock and modlog.
//!
//! Handlers validate arguments, call the [`Moderator`] and post the outcome
//! to the guild's mod log. A platform refusal (the bot itself lacks the
//! permission) becomes a "permission error" reply rather than a failure.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::AppContext;
use crate::commands::{Invocation, Reply};
use crate::error::{PlatformError, PlatformResult};

pub const MAX_TIMEOUT_MINUTES: i64 = 43_200;
pub const MAX_PURGE: i64 = 100;
pub const MAX_SLOWMODE_SECS: i64 = 21_600;

#[async_trait]
pub trait Moderator: Send + Sync {
    async fn kick(&self, guild_id: u64, user_id: u64, reason: Option<&str>) -> PlatformResult<()>;

    async fn ban(&self, guild_id: u64, user_id: u64, reason: Option<&str>) -> PlatformResult<()>;

    async fn unban(&self, guild_id: u64, user_id: u64) -> PlatformResult<()>;

    async fn timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: Option<&str>,
    ) -> PlatformResult<()>;

    /// Delete up to `count` recent messages posted before `before` (newest
    /// first), only those by `author` when given. Returns how many went.
    async fn purge(
        &self,
        channel_id: u64,
        count: usize,
        author: Option<u64>,
        before: Option<u64>,
    ) -> PlatformResult<usize>;

    async fn set_slowmode(&self, channel_id: u64, seconds: u16) -> PlatformResult<()>;

    /// Deny `SEND_MESSAGES` to `@everyone` in one channel.
    async fn lock_channel(&self, guild_id: u64, channel_id: u64) -> PlatformResult<()>;

    /// Put `@everyone`'s `SEND_MESSAGES` back to neutral (inherit).
    async fn unlock_channel(&self, guild_id: u64, channel_id: u64) -> PlatformResult<()>;

    /// The mod-log channel, created when missing.
    async fn log_channel(&self, guild_id: u64) -> PlatformResult<u64>;
}

fn moderator(app: &AppContext) -> Result<Arc<dyn Moderator>> {
    app.moderator()
        .ok_or_else(|| anyhow!("moderation is not available yet"))
}

/// `Ok(Err(reply))` when the platform refused for lack of permission.
fn allowed<T>(res: PlatformResult<T>, action: &str) -> Result<std::result::Result<T, Reply>> {
    match res {
        Ok(v) => Ok(Ok(v)),
        Err(PlatformError::PermissionDenied) => Ok(Err(Reply::new(
            "permission error",
            format!("i don't have permission to {action}."),
        ))),
        Err(e) => Err(e.into()),
    }
}

fn usage(text: &str) -> Reply {
    Reply::new("missing argument", format!("usage: {text}"))
}

/// Best-effort post to the guild's mod log.
pub async fn post_log(app: &AppContext, guild_id: u64, title: &str, desc: &str) {
    let Some(notifier) = app.notifier() else {
        return;
    };
    if let Err(e) = notifier.mod_log(guild_id, title, desc).await {
        tracing::debug!(guild = guild_id, error = %e, "mod log post failed");
    }
}

async fn done(app: &AppContext, inv: &Invocation, title: &'static str, desc: String) -> Result<Reply> {
    post_log(app, inv.guild_id, title, &desc).await;
    tracing::info!(guild = inv.guild_id, moderator = inv.caller_id, action = title, "moderation action");
    Ok(Reply::new(title, desc))
}

pub fn kick<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let Some(uid) = inv.args.user else {
            return Ok(usage("kick <user> [reason]"));
        };
        let reason = inv.args.text.as_deref();
        let res = moderator(app)?.kick(inv.guild_id, uid, reason).await;
        if let Err(reply) = allowed(res, "kick")? {
            return Ok(reply);
        }
        let desc = format!(
            "<@{uid}> has been kicked. reason: {}",
            reason.unwrap_or("no reason provided.")
        );
        done(app, inv, "kick", desc.to_lowercase()).await
    }
    .boxed()
}

pub fn ban<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let Some(uid) = inv.args.user else {
            return Ok(usage("ban <user> [reason]"));
        };
        let reason = inv.args.text.as_deref();
        let res = moderator(app)?.ban(inv.guild_id, uid, reason).await;
        if let Err(reply) = allowed(res, "ban")? {
            return Ok(reply);
        }
        let desc = format!(
            "<@{uid}> has been banned. reason: {}",
            reason.unwrap_or("no reason provided.")
        );
        done(app, inv, "ban", desc.to_lowercase()).await
    }
    .boxed()
}

pub fn unban<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let Some(uid) = inv.args.user else {
            return Ok(usage("unban <user id>"));
        };
        if let Err(e) = moderator(app)?.unban(inv.guild_id, uid).await {
            tracing::debug!(guild = inv.guild_id, user = uid, error = %e, "unban failed");
            return Ok(Reply::new("unban", "could not unban that user."));
        }
        done(app, inv, "unban", format!("unbanned <@{uid}>.")).await
    }
    .boxed()
}

pub fn massban<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        if inv.args.users.is_empty() {
            return Ok(Reply::new("massban", "no members given."));
        }
        let m = moderator(app)?;
        let reason = format!("massban by <@{}>", inv.caller_id);
        let mut banned = 0;
        for &uid in &inv.args.users {
            match m.ban(inv.guild_id, uid, Some(&reason)).await {
                Ok(()) => banned += 1,
                Err(e) => tracing::debug!(guild = inv.guild_id, user = uid, error = %e, "massban entry failed"),
            }
        }
        done(app, inv, "massban", format!("banned {banned} member(s).")).await
    }
    .boxed()
}

pub fn timeout<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let (Some(uid), Some(minutes)) = (inv.args.user, inv.args.number) else {
            return Ok(usage("timeout <user> <minutes> [reason]"));
        };
        if !(1..=MAX_TIMEOUT_MINUTES).contains(&minutes) {
            return Ok(Reply::new("timeout", "minutes must be between 1 and 43200."));
        }
        let until = Utc::now() + chrono::Duration::minutes(minutes);
        let res = moderator(app)?
            .timeout(inv.guild_id, uid, until, inv.args.text.as_deref())
            .await;
        if let Err(reply) = allowed(res, "timeout members")? {
            return Ok(reply);
        }
        done(app, inv, "timeout", format!("<@{uid}> has been timed out for {minutes} minutes.")).await
    }
    .boxed()
}

pub fn purge<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let Some(count) = inv.args.number else {
            return Ok(usage("purge <count>"));
        };
        if !(1..=MAX_PURGE).contains(&count) {
            return Ok(Reply::new("purge", "count must be 1-100."));
        }
        let res = moderator(app)?
            .purge(inv.channel_id, count as usize, None, inv.message_id)
            .await;
        let deleted = match allowed(res, "delete messages")? {
            Ok(n) => n,
            Err(reply) => return Ok(reply),
        };
        done(app, inv, "purge", format!("deleted {deleted} messages.")).await
    }
    .boxed()
}

pub fn purge_user<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let (Some(uid), Some(count)) = (inv.args.user, inv.args.number) else {
            return Ok(usage("purge_user <user> <count>"));
        };
        if !(1..=MAX_PURGE).contains(&count) {
            return Ok(Reply::new("purge_user", "count must be 1-100."));
        }
        let res = moderator(app)?
            .purge(inv.channel_id, count as usize, Some(uid), inv.message_id)
            .await;
        let deleted = match allowed(res, "delete messages")? {
            Ok(n) => n,
            Err(reply) => return Ok(reply),
        };
        done(app, inv, "purge_user", format!("deleted {deleted} messages from <@{uid}>.")).await
    }
    .boxed()
}

pub fn slowmode<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let Some(seconds) = inv.args.number else {
            return Ok(usage("slowmode <seconds>"));
        };
        if !(0..=MAX_SLOWMODE_SECS).contains(&seconds) {
            return Ok(Reply::new("slowmode", "seconds must be 0-21600."));
        }
        let res = moderator(app)?
            .set_slowmode(inv.channel_id, seconds as u16)
            .await;
        if let Err(reply) = allowed(res, "manage channels")? {
            return Ok(reply);
        }
        let desc = if seconds == 0 {
            "slowmode disabled.".to_string()
        } else {
            format!("slowmode set to {seconds} seconds.")
        };
        done(app, inv, "slowmode", desc).await
    }
    .boxed()
}

pub fn lock<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let res = moderator(app)?.lock_channel(inv.guild_id, inv.channel_id).await;
        if let Err(reply) = allowed(res, "manage channels")? {
            return Ok(reply);
        }
        done(app, inv, "lock", "channel locked.".to_string()).await
    }
    .boxed()
}

pub fn unlock<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let res = moderator(app)?.unlock_channel(inv.guild_id, inv.channel_id).await;
        if let Err(reply) = allowed(res, "manage channels")? {
            return Ok(reply);
        }
        done(app, inv, "unlock", "channel unlocked.".to_string()).await
    }
    .boxed()
}

pub fn modlog<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let desc = match moderator(app)?.log_channel(inv.guild_id).await {
            Ok(id) => format!("logs are in <#{id}>"),
            Err(e) => {
                tracing::debug!(guild = inv.guild_id, error = %e, "log channel unavailable");
                "could not create log channel.".to_string()
            }
        };
        Ok(Reply::new("modlog", desc))
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_refusal_becomes_a_reply() {
        let res: PlatformResult<()> = Err(PlatformError::PermissionDenied);
        let reply = allowed(res, "kick").unwrap().unwrap_err();
        assert_eq!(reply.title, "permission error");
        assert_eq!(reply.body, "i don't have permission to kick.");
    }

    #[test]
    fn other_platform_errors_propagate() {
        let res: PlatformResult<()> = Err(PlatformError::Timeout);
        assert!(allowed(res, "kick").is_err());
        assert_eq!(allowed(Ok(3usize), "purge").unwrap(), Ok(3));
    }
}
