use anyhow::Result;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::AppContext;
use crate::commands::{Invocation, Reply};

use super::policy::ThresholdPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityStatus {
    pub policy: ThresholdPolicy,
    pub enabled: bool,
}

impl SecurityStatus {
    pub fn render(&self) -> String {
        let status = if self.enabled { "enabled" } else { "disabled" };
        format!("{}\nstatus: {status}", self.policy.describe())
    }
}

pub async fn cmd_status(app: &AppContext, guild_id: u64) -> SecurityStatus {
    SecurityStatus {
        policy: app.policy,
        enabled: app.guilds.is_enabled(guild_id).await,
    }
}

pub async fn cmd_enable(app: &AppContext, guild_id: u64) -> Result<bool> {
    let changed = app.guilds.enable(guild_id).await?;
    tracing::info!(guild = guild_id, changed, "antinuke enabled");
    Ok(changed)
}

pub async fn cmd_disable(app: &AppContext, guild_id: u64) -> Result<bool> {
    let changed = app.guilds.disable(guild_id).await?;
    tracing::info!(guild = guild_id, changed, "antinuke disabled");
    Ok(changed)
}

pub fn status<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        let st = cmd_status(app, inv.guild_id).await;
        Ok(Reply::new("security", st.render()))
    }
    .boxed()
}

pub fn enable<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        cmd_enable(app, inv.guild_id).await?;
        Ok(Reply::new("security", "security enabled."))
    }
    .boxed()
}

pub fn disable<'a>(app: &'a AppContext, inv: &'a Invocation) -> BoxFuture<'a, Result<Reply>> {
    async move {
        cmd_disable(app, inv.guild_id).await?;
        Ok(Reply::new("security", "security disabled."))
    }
    .boxed()
}
