use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::AntinukeConfig;
use crate::error::PlatformError;

pub mod commands;
pub mod enablement;
pub mod mitigation;
pub mod policy;
pub mod window;

use enablement::EnabledGuilds;
use mitigation::{AuditResolver, Collaborators, Mitigator, Notifier};
use policy::ThresholdPolicy;
use window::SlidingWindowCounter;

/// Actions monitored by the antinuke service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    MemberJoin,
    ChannelDelete,
    RoleDelete,
}

impl EventType {
    pub const ALL: [EventType; 3] = [
        EventType::MemberJoin,
        EventType::ChannelDelete,
        EventType::RoleDelete,
    ];

    /// Destructive actions are attributed to a user and keyed per user.
    pub fn is_destructive(self) -> bool {
        !matches!(self, EventType::MemberJoin)
    }

    pub fn label(self) -> &'static str {
        match self {
            EventType::MemberJoin => "member join",
            EventType::ChannelDelete => "channel delete",
            EventType::RoleDelete => "role delete",
        }
    }
}

/// A platform notification as seen by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub guild_id: u64,
    pub subject: Option<u64>,
    pub kind: EventType,
    pub at: Instant,
}

impl Event {
    pub fn new(guild_id: u64, kind: EventType, at: Instant) -> Self {
        Self {
            guild_id,
            subject: None,
            kind,
            at,
        }
    }

    /// Destructive event whose actor is already known (skips the audit lookup).
    pub fn attributed(guild_id: u64, subject: u64, kind: EventType, at: Instant) -> Self {
        Self {
            guild_id,
            subject: Some(subject),
            kind,
            at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub guild_id: u64,
    pub subject: Option<u64>,
    pub kind: EventType,
}

impl WindowKey {
    pub fn new(guild_id: u64, subject: Option<u64>, kind: EventType) -> Self {
        // joins are counted guild-wide
        let subject = if kind.is_destructive() { subject } else { None };
        Self {
            guild_id,
            subject,
            kind,
        }
    }
}

impl From<&Event> for WindowKey {
    fn from(e: &Event) -> Self {
        WindowKey::new(e.guild_id, e.subject, e.kind)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LatchState {
    #[default]
    Idle,
    /// Mitigation already issued for the running burst.
    Latched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incident {
    pub guild_id: u64,
    pub subject: Option<u64>,
    pub kind: EventType,
    pub count: usize,
}

/// What `observe` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Guild has detection disabled; nothing was touched.
    Inactive,
    /// Actor could not be resolved; event dropped.
    Unattributed,
    Counted { count: usize },
    /// Over threshold, but this burst was already mitigated.
    Suppressed { count: usize },
    Triggered(Incident),
}

/// Rate-windowed raid / mass-deletion detector.
///
/// Window update, latch check and latch set for one key run under that key's
/// latch-map entry lock; collaborator calls happen after it is released.
pub struct Antinuke {
    policy: ThresholdPolicy,
    guilds: Arc<EnabledGuilds>,
    windows: SlidingWindowCounter<WindowKey>,
    latches: DashMap<WindowKey, LatchState>,
    audit: Arc<dyn AuditResolver>,
    mitigator: Arc<dyn Mitigator>,
    notifier: Arc<dyn Notifier>,
    audit_timeout: Duration,
    audit_max_age: Duration,
}

impl std::fmt::Debug for Antinuke {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Antinuke")
            .field("policy", &self.policy)
            .field("tracked_keys", &self.windows.len())
            .finish_non_exhaustive()
    }
}

impl Antinuke {
    pub fn new(
        cfg: &AntinukeConfig,
        guilds: Arc<EnabledGuilds>,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        let policy = ThresholdPolicy::from_config(cfg);
        Arc::new(Self {
            policy,
            guilds,
            windows: SlidingWindowCounter::new(cfg.capacity, policy.max_window()),
            latches: DashMap::new(),
            audit: collaborators.audit,
            mitigator: collaborators.mitigator,
            notifier: collaborators.notifier,
            audit_timeout: cfg.audit_timeout(),
            audit_max_age: cfg.audit_max_age(),
        })
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    pub async fn notify_member_join(&self, guild_id: u64, at: Instant) -> Observation {
        self.observe(Event::new(guild_id, EventType::MemberJoin, at)).await
    }

    pub async fn notify_channel_delete(&self, guild_id: u64, at: Instant) -> Observation {
        self.observe(Event::new(guild_id, EventType::ChannelDelete, at)).await
    }

    pub async fn notify_role_delete(&self, guild_id: u64, at: Instant) -> Observation {
        self.observe(Event::new(guild_id, EventType::RoleDelete, at)).await
    }

    /// Feed one event through enablement, attribution, counting and, when a
    /// burst starts, mitigation. Never fails: collaborator errors are logged.
    pub async fn observe(&self, mut event: Event) -> Observation {
        if !self.guilds.is_enabled(event.guild_id).await {
            return Observation::Inactive;
        }

        if event.kind.is_destructive() && event.subject.is_none() {
            match self.resolve_subject(event.guild_id, event.kind).await {
                Some(uid) => event.subject = Some(uid),
                None => return Observation::Unattributed,
            }
        }

        let obs = self.record(&event);
        match &obs {
            Observation::Triggered(incident) => self.mitigate(incident).await,
            Observation::Suppressed { count } => {
                tracing::debug!(
                    guild = event.guild_id,
                    subject = ?event.subject,
                    kind = ?event.kind,
                    count,
                    "burst already mitigated"
                );
            }
            _ => {}
        }
        obs
    }

    fn record(&self, event: &Event) -> Observation {
        let key = WindowKey::from(event);
        let rule = self.policy.rule(event.kind);

        let mut latch = self.latches.entry(key).or_default();
        let at = self
            .windows
            .newest(&key)
            .map_or(event.at, |newest| newest.max(event.at));

        if *latch == LatchState::Latched {
            // rolling count only falls between events: under threshold now
            // (before this event) means the previous burst is over
            let before = self.windows.count_within(&key, rule.window, at);
            if !rule.is_crossed(before) {
                *latch = LatchState::Idle;
                tracing::debug!(guild = key.guild_id, kind = ?key.kind, "burst over, re-armed");
            }
        }

        self.windows.record(key, at);
        let count = self.windows.count_within(&key, rule.window, at);

        if !self.policy.evaluate(event.kind, count) {
            return Observation::Counted { count };
        }
        match *latch {
            LatchState::Latched => Observation::Suppressed { count },
            LatchState::Idle => {
                *latch = LatchState::Latched;
                Observation::Triggered(Incident {
                    guild_id: key.guild_id,
                    subject: key.subject,
                    kind: key.kind,
                    count,
                })
            }
        }
    }

    async fn resolve_subject(&self, guild_id: u64, kind: EventType) -> Option<u64> {
        let lookup = self.audit.responsible(guild_id, kind, self.audit_max_age);
        let res = match tokio::time::timeout(self.audit_timeout, lookup).await {
            Ok(res) => res,
            Err(elapsed) => Err(PlatformError::from(elapsed)),
        };
        match res {
            Ok(Some(uid)) => Some(uid),
            Ok(None) => {
                tracing::debug!(guild = guild_id, ?kind, "no audit entry, event dropped");
                None
            }
            Err(e) => {
                tracing::warn!(guild = guild_id, ?kind, error = %e, "audit lookup failed, event dropped");
                None
            }
        }
    }

    async fn mitigate(&self, incident: &Incident) {
        let rule = self.policy.rule(incident.kind);
        tracing::warn!(
            guild = incident.guild_id,
            subject = ?incident.subject,
            kind = ?incident.kind,
            count = incident.count,
            window_secs = rule.window.as_secs(),
            "antinuke threshold crossed"
        );
        match incident.kind {
            EventType::MemberJoin => self.raid_mode(incident).await,
            EventType::ChannelDelete | EventType::RoleDelete => self.ban_actor(incident).await,
        }
    }

    async fn raid_mode(&self, incident: &Incident) {
        let guild_id = incident.guild_id;
        match self.mitigator.lockdown_guild(guild_id).await {
            Ok(report) => tracing::info!(
                guild = guild_id,
                locked = report.locked,
                already_locked = report.already_locked,
                failed = report.failed,
                "raid lockdown applied"
            ),
            Err(e) => tracing::warn!(guild = guild_id, error = %e, "raid lockdown failed"),
        }

        let window = self.policy.rule(incident.kind).window.as_secs();
        let msg = format!(
            "raid mode activated: mass join detected ({} joins within {}s)",
            incident.count, window
        );
        self.announce(guild_id, "raid mode", &msg).await;
    }

    async fn ban_actor(&self, incident: &Incident) {
        let guild_id = incident.guild_id;
        let Some(subject) = incident.subject else {
            return;
        };
        let reason = format!("cherry antinuke: too many {}s", incident.kind.label());

        match self.mitigator.ban_subject(guild_id, subject, &reason).await {
            Ok(()) => {
                let msg = format!("banned <@{subject}> for mass {}s", incident.kind.label());
                self.announce(guild_id, "antinuke", &msg).await;
            }
            Err(PlatformError::PermissionDenied) => {
                tracing::warn!(guild = guild_id, subject, "missing ban permission, mitigation aborted");
            }
            Err(e) => {
                tracing::warn!(guild = guild_id, subject, error = %e, "ban failed, mitigation aborted");
            }
        }
    }

    async fn announce(&self, guild_id: u64, title: &str, msg: &str) {
        if let Err(e) = self.notifier.mod_log(guild_id, title, msg).await {
            tracing::debug!(guild = guild_id, error = %e, "mod log post failed");
        }
        if let Err(e) = self.notifier.notify_owners(guild_id, msg).await {
            tracing::debug!(guild = guild_id, error = %e, "owner notification failed");
        }
    }

    pub fn latch_state(&self, key: &WindowKey) -> LatchState {
        self.latches.get(key).map(|l| *l).unwrap_or_default()
    }

    /// Current rolling count for `key` under its kind's window. A `now`
    /// older than the newest stamp is clamped to it, as recording does.
    pub fn count(&self, key: &WindowKey, now: Instant) -> usize {
        let rule = self.policy.rule(key.kind);
        let now = self.windows.newest(key).map_or(now, |newest| newest.max(now));
        self.windows.count_within(key, rule.window, now)
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Forget keys idle for longer than the longest window. Their latches go
    /// too; an expired window would have re-armed them anyway.
    pub fn prune_idle(&self, now: Instant) -> usize {
        let removed = self.windows.prune(now);
        self.latches.retain(|k, _| self.windows.contains_key(k));
        removed
    }

    pub fn spawn_prune_task(this: &Arc<Self>, every: Duration) {
        let weak = Arc::downgrade(this);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let Some(strong) = weak.upgrade() else {
                    break;
                };
                let removed = strong.prune_idle(Instant::now());
                if removed > 0 {
                    tracing::debug!(removed, "pruned idle antinuke windows");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_keys_ignore_subject() {
        let a = WindowKey::new(1, Some(5), EventType::MemberJoin);
        let b = WindowKey::new(1, None, EventType::MemberJoin);
        assert_eq!(a, b);

        let c = WindowKey::new(1, Some(5), EventType::RoleDelete);
        let d = WindowKey::new(1, Some(6), EventType::RoleDelete);
        assert_ne!(c, d);
    }

    #[test]
    fn labels() {
        assert_eq!(EventType::ChannelDelete.label(), "channel delete");
        assert!(EventType::RoleDelete.is_destructive());
        assert!(!EventType::MemberJoin.is_destructive());
    }
}
