//! Command table shared by slash commands and mention-prefixed messages.
//!
//! Every command is registered once at startup with the capabilities it
//! needs; [`CommandRegistry::dispatch`] checks them before calling the
//! handler, so handlers never repeat permission logic.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serenity::all::UserId;
use serenity::utils::parse_user_mention;

use crate::AppContext;
use crate::antinuke::commands as security;
use crate::moderation;
use crate::permissions::{Capabilities, Capability};
use crate::warn;

/// Titled reply rendered by a [`Respondable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub title: &'static str,
    pub body: String,
}

impl Reply {
    pub fn new(title: &'static str, body: impl Into<String>) -> Self {
        Self {
            title,
            body: body.into(),
        }
    }
}

/// Somewhere a reply can be sent: an interaction or a channel.
#[async_trait]
pub trait Respondable: Send + Sync {
    async fn send(&self, reply: &Reply) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    pub user: Option<u64>,
    /// Extra users (massban).
    pub users: Vec<u64>,
    /// Minutes, seconds or a message count depending on the command.
    pub number: Option<i64>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub guild_id: u64,
    pub channel_id: u64,
    /// The triggering message, for mention commands.
    pub message_id: Option<u64>,
    pub caller_id: u64,
    pub caps: Capabilities,
    pub args: Args,
}

pub type Handler = for<'a> fn(&'a AppContext, &'a Invocation) -> BoxFuture<'a, Result<Reply>>;

pub struct CommandSpec {
    pub name: &'static str,
    pub required: &'static [Capability],
    handler: Handler,
}

pub struct CommandRegistry {
    commands: HashMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    pub fn empty() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut r = Self::empty();
        r.register("security", &[Capability::ManageGuild], security::status);
        r.register("security status", &[Capability::ManageGuild], security::status);
        r.register("security enable", &[Capability::ManageGuild], security::enable);
        r.register("security disable", &[Capability::ManageGuild], security::disable);
        r.register("warn", &[Capability::ManageMessages], warn::handle_warn);
        r.register("warnings", &[Capability::ManageMessages], warn::handle_warnings);

        r.register("kick", &[Capability::KickMembers], moderation::kick);
        r.register("ban", &[Capability::BanMembers], moderation::ban);
        r.register("unban", &[Capability::BanMembers], moderation::unban);
        r.register("massban", &[Capability::BanMembers], moderation::massban);
        r.register("timeout", &[Capability::ModerateMembers], moderation::timeout);
        r.register("purge", &[Capability::ManageMessages], moderation::purge);
        r.register("purge_user", &[Capability::ManageMessages], moderation::purge_user);
        r.register("slowmode", &[Capability::ManageChannels], moderation::slowmode);
        r.register("lock", &[Capability::ManageChannels], moderation::lock);
        r.register("unlock", &[Capability::ManageChannels], moderation::unlock);
        r.register("modlog", &[Capability::ManageGuild], moderation::modlog);
        r
    }

    pub fn register(&mut self, name: &'static str, required: &'static [Capability], handler: Handler) {
        self.commands.insert(
            name,
            CommandSpec {
                name,
                required,
                handler,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut v: Vec<_> = self.commands.keys().copied().collect();
        v.sort_unstable();
        v
    }

    /// `None` for unknown commands (ignored, like unknown prefix text).
    pub async fn dispatch(&self, app: &AppContext, name: &str, inv: &Invocation) -> Option<Reply> {
        let spec = self.get(name)?;

        let missing = inv.caps.missing(spec.required);
        if !missing.is_empty() {
            let list: Vec<_> = missing.iter().map(|c| c.label()).collect();
            return Some(Reply::new(
                "permission denied",
                format!("you need {} permission(s) to use that command.", list.join(", ")),
            ));
        }

        match (spec.handler)(app, inv).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::warn!(command = spec.name, guild = inv.guild_id, error = ?e, "command failed");
                Some(Reply::new("error", e.to_string().to_lowercase()))
            }
        }
    }

    /// Dispatch and deliver the reply.
    pub async fn run(
        &self,
        app: &AppContext,
        name: &str,
        inv: &Invocation,
        out: &dyn Respondable,
    ) -> Result<()> {
        if let Some(reply) = self.dispatch(app, name, inv).await {
            out.send(&reply).await?;
        }
        Ok(())
    }
}

/// Parse `<@bot> command [args]` into a qualified command name and its args.
///
/// `security <enable|disable|status>` is qualified with its subcommand.
/// Users are mentions or raw ids; numbers follow the user where both appear
/// (`timeout <user> <minutes> [reason]`, `purge_user <user> <count>`).
pub fn parse_mention_command(content: &str, bot_id: u64) -> Option<(String, Args)> {
    let content = content.trim_start();
    let rest = [format!("<@{bot_id}>"), format!("<@!{bot_id}>")]
        .iter()
        .find_map(|p| content.strip_prefix(p.as_str()))?;

    let mut tokens = rest.split_whitespace();
    let cmd = tokens.next()?.to_lowercase();
    let mut args = Args::default();

    match cmd.as_str() {
        "security" | "securitysetup" => {
            let name = match tokens.next().map(str::to_lowercase).as_deref() {
                Some("enable") => "security enable",
                Some("disable") => "security disable",
                _ => "security",
            };
            return Some((name.to_string(), args));
        }
        "warn" | "warnings" | "kick" | "ban" | "unban" => {
            args.user = tokens.next().and_then(parse_user_ref);
        }
        "timeout" | "purge_user" => {
            args.user = tokens.next().and_then(parse_user_ref);
            args.number = tokens.next().and_then(|t| t.parse().ok());
        }
        "purge" | "slowmode" => {
            args.number = tokens.next().and_then(|t| t.parse().ok());
        }
        "massban" => {
            args.users = tokens.by_ref().filter_map(parse_user_ref).collect();
        }
        _ => {}
    }

    let text: Vec<&str> = tokens.collect();
    args.text = (!text.is_empty()).then(|| text.join(" "));
    Some((cmd, args))
}

/// `<@123>`, `<@!123>` or `123`.
pub fn parse_user_ref(token: &str) -> Option<u64> {
    parse_user_mention(token)
        .or_else(|| token.parse::<UserId>().ok())
        .map(UserId::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: u64 = 999;

    #[test]
    fn parses_security_subcommands() {
        let (name, _) = parse_mention_command("<@999> security enable", BOT).unwrap();
        assert_eq!(name, "security enable");
        let (name, _) = parse_mention_command("<@!999>   SECURITY disable", BOT).unwrap();
        assert_eq!(name, "security disable");
        let (name, _) = parse_mention_command("<@999> securitysetup", BOT).unwrap();
        assert_eq!(name, "security");
    }

    #[test]
    fn parses_warn_arguments() {
        let (name, args) = parse_mention_command("<@999> warn <@!42> spamming links", BOT).unwrap();
        assert_eq!(name, "warn");
        assert_eq!(args.user, Some(42));
        assert_eq!(args.text.as_deref(), Some("spamming links"));

        let (name, args) = parse_mention_command("<@999> warnings 42", BOT).unwrap();
        assert_eq!(name, "warnings");
        assert_eq!(args.user, Some(42));
        assert_eq!(args.text, None);
    }

    #[test]
    fn ignores_messages_not_addressed_to_bot() {
        assert!(parse_mention_command("security enable", BOT).is_none());
        assert!(parse_mention_command("<@1> security enable", BOT).is_none());
        assert!(parse_mention_command("<@999>", BOT).is_none());
    }

    #[test]
    fn user_refs() {
        assert_eq!(parse_user_ref("<@5>"), Some(5));
        assert_eq!(parse_user_ref("<@!5>"), Some(5));
        assert_eq!(parse_user_ref("5"), Some(5));
        assert_eq!(parse_user_ref("<#5>"), None);
        assert_eq!(parse_user_ref("bob"), None);
    }

    #[test]
    fn builtin_table_has_expected_commands() {
        let r = CommandRegistry::builtin();
        assert_eq!(
            r.names(),
            vec![
                "ban",
                "kick",
                "lock",
                "massban",
                "modlog",
                "purge",
                "purge_user",
                "security",
                "security disable",
                "security enable",
                "security status",
                "slowmode",
                "timeout",
                "unban",
                "unlock",
                "warn",
                "warnings",
            ]
        );
        assert_eq!(r.get("warn").unwrap().required, &[Capability::ManageMessages]);
        assert_eq!(r.get("unlock").unwrap().required, &[Capability::ManageChannels]);
        assert_eq!(r.get("timeout").unwrap().required, &[Capability::ModerateMembers]);
    }

    #[test]
    fn parses_moderation_arguments() {
        let (name, args) = parse_mention_command("<@999> timeout <@42> 15 being loud", BOT).unwrap();
        assert_eq!(name, "timeout");
        assert_eq!((args.user, args.number), (Some(42), Some(15)));
        assert_eq!(args.text.as_deref(), Some("being loud"));

        let (name, args) = parse_mention_command("<@999> purge 20", BOT).unwrap();
        assert_eq!(name, "purge");
        assert_eq!(args.number, Some(20));

        let (_, args) = parse_mention_command("<@999> purge_user 42 5", BOT).unwrap();
        assert_eq!((args.user, args.number), (Some(42), Some(5)));

        let (_, args) = parse_mention_command("<@999> massban <@1> <@!2> nobody 3", BOT).unwrap();
        assert_eq!(args.users, vec![1, 2, 3]);
        assert_eq!(args.text, None);

        let (_, args) = parse_mention_command("<@999> slowmode soon", BOT).unwrap();
        assert_eq!(args.number, None);
    }
}
