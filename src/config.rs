use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub env: String,
    pub app: App,
    pub discord: Discord,
    pub logging: Logging,
    pub storage: Storage,
    pub antinuke: AntinukeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct App {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Discord {
    pub token: String,
    pub intents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub json: Option<bool>,
    pub level: Option<String>,
}

/// Locations of the JSON documents the stores persist to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Storage {
    pub enabled_file: PathBuf,
    pub warnings_file: PathBuf,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            enabled_file: PathBuf::from("data/security_enabled.json"),
            warnings_file: PathBuf::from("data/warnings.json"),
        }
    }
}

/// Threshold + window pair for one kind of monitored action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleConfig {
    pub threshold: u32,
    pub window_secs: u64,
}

impl RuleConfig {
    pub const fn new(threshold: u32, window_secs: u64) -> Self {
        Self {
            threshold,
            window_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AntinukeConfig {
    pub join: RuleConfig,
    pub channel_delete: RuleConfig,
    pub role_delete: RuleConfig,
    /// Hard cap on stored timestamps per key.
    pub capacity: usize,
    pub audit_timeout_ms: u64,
    pub audit_max_age_secs: u64,
    pub slowmode_secs: u16,
    pub prune_interval_secs: u64,
}

impl Default for AntinukeConfig {
    fn default() -> Self {
        Self {
            join: RuleConfig::new(6, 10),
            channel_delete: RuleConfig::new(3, 30),
            role_delete: RuleConfig::new(3, 30),
            capacity: 50,
            audit_timeout_ms: 3_000,
            audit_max_age_secs: 30,
            slowmode_secs: 30,
            prune_interval_secs: 60,
        }
    }
}

impl AntinukeConfig {
    pub fn audit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }

    pub fn audit_max_age(&self) -> Duration {
        Duration::from_secs(self.audit_max_age_secs)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, rule) in [
            ("join", self.join),
            ("channel_delete", self.channel_delete),
            ("role_delete", self.role_delete),
        ] {
            if rule.threshold == 0 || rule.window_secs == 0 {
                bail!("antinuke.{name}: threshold and window_secs must be positive");
            }
            if rule.threshold as usize > self.capacity {
                bail!("antinuke.{name}: threshold {} exceeds capacity {}", rule.threshold, self.capacity);
            }
        }
        Ok(())
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let env = std::env::var("CHERRY_ENV").unwrap_or_else(|_| "development".to_string());

        // .env.<env> first, then the shared .env
        let _ = dotenvy::from_filename(format!(".env.{}", env));
        let _ = dotenvy::dotenv();

        let defaults = Settings::defaults(env.clone());

        // defaults -> config/<env>.toml -> CHERRY_* (CHERRY_DISCORD__TOKEN => discord.token)
        let figment = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(format!("config/{}.toml", env)))
            .merge(Env::prefixed("CHERRY_").split("__"));

        let mut s: Settings = figment.extract()?;
        s.env = env;

        if s.discord.token.is_empty() {
            if let Ok(token) = std::env::var("DISCORD_TOKEN") {
                s.discord.token = token;
            }
        }

        s.antinuke.validate()?;
        Ok(s)
    }

    /// Built-in values used beneath the TOML file and the environment.
    pub fn defaults(env: String) -> Self {
        Settings {
            env,
            app: App {
                name: "cherry security".into(),
            },
            discord: Discord {
                token: "".into(),
                intents: vec![
                    "GUILDS".into(),
                    "GUILD_MEMBERS".into(),
                    "GUILD_MESSAGES".into(),
                    "MESSAGE_CONTENT".into(),
                    "GUILD_MODERATION".into(),
                ],
            },
            logging: Logging {
                json: Some(false),
                level: Some("info".into()),
            },
            storage: Storage::default(),
            antinuke: AntinukeConfig::default(),
        }
    }
}
