use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::AppContext;
use crate::commands::{Invocation, Reply};
use crate::moderation::post_log;
use crate::storage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarnRecord {
    pub reason: String,
    #[serde(rename = "mod")]
    pub moderator_id: u64,
    #[serde(with = "iso_time")]
    pub time: DateTime<Utc>,
}

/// Append-only warnings per user, persisted as one JSON document.
#[derive(Debug)]
pub struct WarnLedger {
    path: PathBuf,
    entries: RwLock<BTreeMap<u64, Vec<WarnRecord>>>,
}

impl WarnLedger {
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries: BTreeMap<u64, Vec<WarnRecord>> = storage::load_or_default(&path).await;
        tracing::info!(users = entries.len(), path = %path.display(), "warn ledger loaded");
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    /// Store a warning and return how many the user now has.
    pub async fn append(
        &self,
        user_id: u64,
        reason: &str,
        moderator_id: u64,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let reason = reason.trim().to_lowercase();
        if reason.is_empty() {
            bail!("reason must not be empty");
        }

        let mut entries = self.entries.write().await;
        entries.entry(user_id).or_default().push(WarnRecord {
            reason,
            moderator_id,
            time: at,
        });

        if let Err(e) = storage::save(&self.path, &*entries).await {
            // memory must keep matching the file
            if let Some(list) = entries.get_mut(&user_id) {
                list.pop();
                if list.is_empty() {
                    entries.remove(&user_id);
                }
            }
            return Err(e);
        }
        Ok(entries.get(&user_id).map_or(0, Vec::len))
    }

    pub async fn list(&self, user_id: u64) -> Vec<WarnRecord> {
        self.entries
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// RFC 3339 out; RFC 3339 or zone-less ISO-8601 (read as UTC) in.
mod iso_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        if let Ok(t) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(t.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|n| n.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

pub fn handle_warn<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let (Some(uid), Some(reason)) = (inv.args.user, inv.args.text.as_deref()) else {
            return Ok(Reply::new("missing argument", "usage: warn <user> <reason>"));
        };
        if reason.trim().is_empty() {
            return Ok(Reply::new("missing argument", "usage: warn <user> <reason>"));
        }
        if uid == inv.caller_id {
            return Ok(Reply::new("warn", "you can't warn yourself."));
        }

        let count = app.warns.append(uid, reason, inv.caller_id, Utc::now()).await?;
        let reason = reason.trim().to_lowercase();
        let desc = format!("<@{uid}> has been warned: {reason}");

        if let Some(notifier) = app.notifier() {
            let dm = match notifier.guild_name(inv.guild_id).await {
                Ok(name) => format!("⚠️ you were warned in {name}: {reason}"),
                Err(_) => format!("⚠️ you were warned: {reason}"),
            };
            if let Err(e) = notifier.notify_user(uid, &dm).await {
                tracing::debug!(user = uid, error = %e, "warn dm failed");
            }
        }
        post_log(app, inv.guild_id, "warn", &desc).await;

        tracing::info!(guild = inv.guild_id, user = uid, moderator = inv.caller_id, count, "warning issued");
        Ok(Reply::new("warn", desc))
    }
    .boxed()
}

pub fn handle_warnings<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let Some(uid) = inv.args.user else {
            return Ok(Reply::new("missing argument", "usage: warnings <user>"));
        };
        let entries = app.warns.list(uid).await;
        if entries.is_empty() {
            return Ok(Reply::new("warnings", "no warnings found."));
        }
        let lines: Vec<String> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| format!("{}. {} (mod <@{}>)", i + 1, e.reason, e.moderator_id))
            .collect();
        Ok(Reply::new("warnings", lines.join("\n")))
    }
    .boxed()
}
