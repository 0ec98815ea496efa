// tests/common/mod.rs
#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cherry_security::AppContext;
use cherry_security::antinuke::mitigation::{
    AuditResolver, Collaborators, LockdownReport, Mitigator, Notifier,
};
use cherry_security::antinuke::{Antinuke, EventType};
use cherry_security::config::{AntinukeConfig, Settings, Storage};
use cherry_security::error::{PlatformError, PlatformResult};
use cherry_security::moderation::Moderator;

pub const GUILD_NAME: &str = "test guild";
pub const LOG_CHANNEL: u64 = 4242;

/// Everything the detector and commands asked the platform to do.
#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub audits: Vec<(u64, EventType)>,
    pub lockdowns: Vec<u64>,
    pub bans: Vec<(u64, u64, String)>,
    pub owner_msgs: Vec<(u64, String)>,
    pub user_msgs: Vec<(u64, String)>,
    pub mod_logs: Vec<(u64, String, String)>,
    pub kicks: Vec<(u64, u64, Option<String>)>,
    pub mod_bans: Vec<(u64, u64, Option<String>)>,
    pub unbans: Vec<(u64, u64)>,
    pub timeouts: Vec<(u64, u64, DateTime<Utc>)>,
    /// (channel, count, author, before)
    pub purges: Vec<(u64, usize, Option<u64>, Option<u64>)>,
    pub slowmodes: Vec<(u64, u16)>,
    pub locks: Vec<(u64, u64)>,
    pub unlocks: Vec<(u64, u64)>,
}

/// In-memory platform: scripted audit answers, recorded side effects.
#[derive(Default)]
pub struct FakePlatform {
    actor: Mutex<Option<u64>>,
    audit_delay: Mutex<Option<Duration>>,
    audit_error: Mutex<Option<PlatformError>>,
    lockdown_error: Mutex<Option<PlatformError>>,
    ban_error: Mutex<Option<PlatformError>>,
    moderation_error: Mutex<Option<PlatformError>>,
    /// Messages each purge finds deletable.
    purgeable: Mutex<usize>,
    calls: Mutex<Calls>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Who the audit log names for the next destructive events.
    pub fn set_actor(&self, actor: Option<u64>) {
        *self.actor.lock().unwrap() = actor;
    }

    pub fn set_audit_delay(&self, delay: Duration) {
        *self.audit_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_audit(&self, err: PlatformError) {
        *self.audit_error.lock().unwrap() = Some(err);
    }

    pub fn fail_lockdown(&self, err: PlatformError) {
        *self.lockdown_error.lock().unwrap() = Some(err);
    }

    pub fn fail_ban(&self, err: PlatformError) {
        *self.ban_error.lock().unwrap() = Some(err);
    }

    /// Fail every manual moderation call with `err`.
    pub fn fail_moderation(&self, err: PlatformError) {
        *self.moderation_error.lock().unwrap() = Some(err);
    }

    pub fn set_purgeable(&self, n: usize) {
        *self.purgeable.lock().unwrap() = n;
    }

    fn moderation_result(&self) -> PlatformResult<()> {
        match self.moderation_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditResolver for FakePlatform {
    async fn responsible(
        &self,
        guild_id: u64,
        kind: EventType,
        _max_age: Duration,
    ) -> PlatformResult<Option<u64>> {
        self.calls.lock().unwrap().audits.push((guild_id, kind));
        let delay = *self.audit_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if let Some(e) = self.audit_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(*self.actor.lock().unwrap())
    }
}

#[async_trait]
impl Mitigator for FakePlatform {
    async fn lockdown_guild(&self, guild_id: u64) -> PlatformResult<LockdownReport> {
        self.calls.lock().unwrap().lockdowns.push(guild_id);
        if let Some(e) = self.lockdown_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(LockdownReport {
            locked: 3,
            ..Default::default()
        })
    }

    async fn ban_subject(&self, guild_id: u64, subject: u64, reason: &str) -> PlatformResult<()> {
        self.calls
            .lock()
            .unwrap()
            .bans
            .push((guild_id, subject, reason.to_string()));
        match self.ban_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Notifier for FakePlatform {
    async fn notify_owners(&self, guild_id: u64, message: &str) -> PlatformResult<()> {
        self.calls
            .lock()
            .unwrap()
            .owner_msgs
            .push((guild_id, message.to_string()));
        Ok(())
    }

    async fn notify_user(&self, user_id: u64, message: &str) -> PlatformResult<()> {
        self.calls
            .lock()
            .unwrap()
            .user_msgs
            .push((user_id, message.to_string()));
        Ok(())
    }

    async fn mod_log(&self, guild_id: u64, title: &str, message: &str) -> PlatformResult<()> {
        self.calls
            .lock()
            .unwrap()
            .mod_logs
            .push((guild_id, title.to_string(), message.to_string()));
        Ok(())
    }

    async fn guild_name(&self, _guild_id: u64) -> PlatformResult<String> {
        Ok(GUILD_NAME.to_string())
    }
}

#[async_trait]
impl Moderator for FakePlatform {
    async fn kick(&self, guild_id: u64, user_id: u64, reason: Option<&str>) -> PlatformResult<()> {
        self.moderation_result()?;
        let reason = reason.map(str::to_string);
        self.calls.lock().unwrap().kicks.push((guild_id, user_id, reason));
        Ok(())
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: Option<&str>) -> PlatformResult<()> {
        self.moderation_result()?;
        let reason = reason.map(str::to_string);
        self.calls.lock().unwrap().mod_bans.push((guild_id, user_id, reason));
        Ok(())
    }

    async fn unban(&self, guild_id: u64, user_id: u64) -> PlatformResult<()> {
        self.moderation_result()?;
        self.calls.lock().unwrap().unbans.push((guild_id, user_id));
        Ok(())
    }

    async fn timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        _reason: Option<&str>,
    ) -> PlatformResult<()> {
        self.moderation_result()?;
        self.calls.lock().unwrap().timeouts.push((guild_id, user_id, until));
        Ok(())
    }

    async fn purge(
        &self,
        channel_id: u64,
        count: usize,
        author: Option<u64>,
        before: Option<u64>,
    ) -> PlatformResult<usize> {
        self.moderation_result()?;
        self.calls
            .lock()
            .unwrap()
            .purges
            .push((channel_id, count, author, before));
        Ok(count.min(*self.purgeable.lock().unwrap()))
    }

    async fn set_slowmode(&self, channel_id: u64, seconds: u16) -> PlatformResult<()> {
        self.moderation_result()?;
        self.calls.lock().unwrap().slowmodes.push((channel_id, seconds));
        Ok(())
    }

    async fn lock_channel(&self, guild_id: u64, channel_id: u64) -> PlatformResult<()> {
        self.moderation_result()?;
        self.calls.lock().unwrap().locks.push((guild_id, channel_id));
        Ok(())
    }

    async fn unlock_channel(&self, guild_id: u64, channel_id: u64) -> PlatformResult<()> {
        self.moderation_result()?;
        self.calls.lock().unwrap().unlocks.push((guild_id, channel_id));
        Ok(())
    }

    async fn log_channel(&self, _guild_id: u64) -> PlatformResult<u64> {
        self.moderation_result()?;
        Ok(LOG_CHANNEL)
    }
}

/// Default settings with both stores inside `dir`.
pub fn settings_in(dir: &Path) -> Settings {
    let mut s = Settings::defaults("test".into());
    s.storage = Storage {
        enabled_file: dir.join("security_enabled.json"),
        warnings_file: dir.join("warnings.json"),
    };
    s
}

pub struct Harness {
    pub ctx: Arc<AppContext>,
    pub fake: Arc<FakePlatform>,
    pub antinuke: Arc<Antinuke>,
    _dir: tempfile::TempDir,
}

pub async fn harness() -> Harness {
    harness_with(AntinukeConfig::default()).await
}

pub async fn harness_with(antinuke: AntinukeConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings_in(dir.path());
    settings.antinuke = antinuke;

    let ctx = AppContext::open(settings).await;
    let fake = FakePlatform::new();
    let antinuke = ctx.install(Collaborators::from_platform(fake.clone()));
    Harness {
        ctx,
        fake,
        antinuke,
        _dir: dir,
    }
}
