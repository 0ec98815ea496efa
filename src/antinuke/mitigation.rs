//! Capabilities the detector calls out to. The detector decides; these act.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::PlatformResult;
use crate::moderation::Moderator;

use super::EventType;

/// Finds who performed the most recent destructive action of `kind`.
#[async_trait]
pub trait AuditResolver: Send + Sync {
    /// `Ok(None)` when there is no matching entry younger than `max_age`.
    async fn responsible(
        &self,
        guild_id: u64,
        kind: EventType,
        max_age: Duration,
    ) -> PlatformResult<Option<u64>>;
}

#[async_trait]
pub trait Mitigator: Send + Sync {
    /// Slowmode + deny `@everyone` sending on every text channel. Per-channel
    /// failures are counted in the report, not returned.
    async fn lockdown_guild(&self, guild_id: u64) -> PlatformResult<LockdownReport>;

    async fn ban_subject(&self, guild_id: u64, subject: u64, reason: &str) -> PlatformResult<()>;
}

/// Best-effort messaging. Callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_owners(&self, guild_id: u64, message: &str) -> PlatformResult<()>;

    async fn notify_user(&self, user_id: u64, message: &str) -> PlatformResult<()>;

    /// Post to the guild's moderation log channel.
    async fn mod_log(&self, guild_id: u64, title: &str, message: &str) -> PlatformResult<()>;

    async fn guild_name(&self, guild_id: u64) -> PlatformResult<String>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockdownReport {
    pub locked: usize,
    pub already_locked: usize,
    pub failed: usize,
}

/// Platform handles: the first three build the detector, `moderator`
/// serves the manual moderation commands.
#[derive(Clone)]
pub struct Collaborators {
    pub audit: Arc<dyn AuditResolver>,
    pub mitigator: Arc<dyn Mitigator>,
    pub notifier: Arc<dyn Notifier>,
    pub moderator: Arc<dyn Moderator>,
}

impl Collaborators {
    /// One object serving every role (the gateway client, a test fake).
    pub fn from_platform<P>(platform: Arc<P>) -> Self
    where
        P: AuditResolver + Mitigator + Notifier + Moderator + 'static,
    {
        Self {
            audit: platform.clone(),
            mitigator: platform.clone(),
            notifier: platform.clone(),
            moderator: platform,
        }
    }
}
