use std::time::Duration;

use crate::config::{AntinukeConfig, RuleConfig};

use super::EventType;

/// Threshold and window for one [`EventType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub threshold: u32,
    pub window: Duration,
}

impl Rule {
    pub fn is_crossed(&self, count: usize) -> bool {
        count >= self.threshold as usize
    }
}

impl From<RuleConfig> for Rule {
    fn from(c: RuleConfig) -> Self {
        Self {
            threshold: c.threshold,
            window: Duration::from_secs(c.window_secs),
        }
    }
}

/// Fixed-for-the-process thresholds, one rule per monitored action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    join: Rule,
    channel_delete: Rule,
    role_delete: Rule,
}

impl ThresholdPolicy {
    pub fn from_config(cfg: &AntinukeConfig) -> Self {
        Self {
            join: cfg.join.into(),
            channel_delete: cfg.channel_delete.into(),
            role_delete: cfg.role_delete.into(),
        }
    }

    pub fn rule(&self, kind: EventType) -> Rule {
        match kind {
            EventType::MemberJoin => self.join,
            EventType::ChannelDelete => self.channel_delete,
            EventType::RoleDelete => self.role_delete,
        }
    }

    pub fn evaluate(&self, kind: EventType, count: usize) -> bool {
        self.rule(kind).is_crossed(count)
    }

    /// Longest window across all rules.
    pub fn max_window(&self) -> Duration {
        EventType::ALL
            .iter()
            .map(|k| self.rule(*k).window)
            .max()
            .unwrap_or_default()
    }

    pub fn describe(&self) -> String {
        let line = |label: &str, r: Rule| format!("{label} threshold: {}/{}s", r.threshold, r.window.as_secs());
        [
            line("raid join", self.join),
            line("channel delete", self.channel_delete),
            line("role delete", self.role_delete),
        ]
        .join("\n")
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::from_config(&AntinukeConfig::default())
    }
}
