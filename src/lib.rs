// src/lib.rs

pub mod antinuke;
pub mod commands;
pub mod commands_sync;
pub mod config;
pub mod discord;
pub mod error;
pub mod logging;
pub mod moderation;
pub mod permissions;
pub mod storage;
pub mod warn;

use anyhow::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use antinuke::Antinuke;
use antinuke::enablement::EnabledGuilds;
use antinuke::mitigation::{Collaborators, Notifier};
use antinuke::policy::ThresholdPolicy;
use commands::CommandRegistry;
use config::Settings;
use moderation::Moderator;
use warn::WarnLedger;

use serenity::all::GatewayIntents;

/// Application context: settings, the persisted stores and the services
/// that need the gateway client (injected once it exists).
pub struct AppContext {
    pub settings: Settings,
    pub policy: ThresholdPolicy,
    pub guilds: Arc<EnabledGuilds>,
    pub warns: Arc<WarnLedger>,
    pub commands: CommandRegistry,
    antinuke: OnceCell<Arc<Antinuke>>,
    notifier: OnceCell<Arc<dyn Notifier>>,
    moderator: OnceCell<Arc<dyn Moderator>>,
}

impl AppContext {
    /// Bootstrap: logging, then the stores.
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        logging::init(&settings);
        let ctx = Self::open(settings).await;
        tracing::info!(name = %ctx.settings.app.name, env = %ctx.settings.env, "context ready");
        Ok(ctx)
    }

    /// Load the stores from the configured paths. Corrupt files load empty.
    pub async fn open(settings: Settings) -> Arc<Self> {
        let guilds = EnabledGuilds::load(&settings.storage.enabled_file).await;
        let warns = WarnLedger::load(&settings.storage.warnings_file).await;
        Arc::new(Self {
            policy: ThresholdPolicy::from_config(&settings.antinuke),
            settings,
            guilds: Arc::new(guilds),
            warns: Arc::new(warns),
            commands: CommandRegistry::builtin(),
            antinuke: OnceCell::new(),
            notifier: OnceCell::new(),
            moderator: OnceCell::new(),
        })
    }

    /// Wire the platform collaborators and build the detector. Only the first
    /// call takes effect; later calls return the existing detector.
    pub fn install(&self, collaborators: Collaborators) -> Arc<Antinuke> {
        let _ = self.notifier.set(collaborators.notifier.clone());
        let _ = self.moderator.set(collaborators.moderator.clone());
        self.antinuke
            .get_or_init(|| Antinuke::new(&self.settings.antinuke, self.guilds.clone(), collaborators))
            .clone()
    }

    pub fn antinuke(&self) -> Option<Arc<Antinuke>> {
        self.antinuke.get().cloned()
    }

    pub fn notifier(&self) -> Option<Arc<dyn Notifier>> {
        self.notifier.get().cloned()
    }

    pub fn moderator(&self) -> Option<Arc<dyn Moderator>> {
        self.moderator.get().cloned()
    }
}

/// Gateway intents the bot needs:
/// - GUILDS (channel/role deletes), GUILD_MEMBERS (joins),
/// - GUILD_MESSAGES + MESSAGE_CONTENT (mention commands, purge),
/// - GUILD_MODERATION (audit log events).
pub fn default_gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MODERATION
}

/// Start the Discord client.
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    discord::run_bot(ctx).await
}
