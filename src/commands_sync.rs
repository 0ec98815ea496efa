// src/commands_sync.rs

use anyhow::Result;
use serenity::all::{
    CommandDataOption, CommandDataOptionValue, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, GuildId, Permissions,
};

use crate::commands::{Args, parse_user_ref};
use crate::moderation::{MAX_PURGE, MAX_SLOWMODE_SECS, MAX_TIMEOUT_MINUTES};

/// Register the slash commands for one guild. `massban` stays a mention
/// command since it takes a free-length member list.
pub async fn register_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    for command in definitions() {
        guild_id.create_command(&ctx.http, command).await?;
    }
    Ok(())
}

fn user_option(description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::User, "user", description).required(true)
}

fn reason_option(required: bool) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "reason", "Reason").required(required)
}

fn int_option(name: &str, description: &str, min: u64, max: u64) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::Integer, name, description)
        .min_int_value(min)
        .max_int_value(max)
        .required(true)
}

fn definitions() -> Vec<CreateCommand> {
    let purge_max = MAX_PURGE as u64;
    vec![
        CreateCommand::new("security")
            .description("Anti-raid / anti-nuke protection")
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "status",
                "Show thresholds and whether protection is on",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "enable",
                "Enable protection for this server",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "disable",
                "Disable protection for this server",
            ))
            .default_member_permissions(Permissions::MANAGE_GUILD),
        CreateCommand::new("warn")
            .description("Warn a member")
            .add_option(user_option("Who to warn"))
            .add_option(reason_option(true))
            .default_member_permissions(Permissions::MANAGE_MESSAGES),
        CreateCommand::new("warnings")
            .description("List a member's warnings")
            .add_option(user_option("Member"))
            .default_member_permissions(Permissions::MANAGE_MESSAGES),
        CreateCommand::new("kick")
            .description("Kick a member")
            .add_option(user_option("Who to kick"))
            .add_option(reason_option(false))
            .default_member_permissions(Permissions::KICK_MEMBERS),
        CreateCommand::new("ban")
            .description("Ban a member")
            .add_option(user_option("Who to ban"))
            .add_option(reason_option(false))
            .default_member_permissions(Permissions::BAN_MEMBERS),
        CreateCommand::new("unban")
            .description("Unban a user by id")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "user_id", "User id")
                    .required(true),
            )
            .default_member_permissions(Permissions::BAN_MEMBERS),
        CreateCommand::new("timeout")
            .description("Time out a member")
            .add_option(user_option("Who to time out"))
            .add_option(int_option("minutes", "Minutes", 1, MAX_TIMEOUT_MINUTES as u64))
            .add_option(reason_option(false))
            .default_member_permissions(Permissions::MODERATE_MEMBERS),
        CreateCommand::new("purge")
            .description("Delete recent messages in this channel")
            .add_option(int_option("count", "How many", 1, purge_max))
            .default_member_permissions(Permissions::MANAGE_MESSAGES),
        CreateCommand::new("purge_user")
            .description("Delete a member's recent messages in this channel")
            .add_option(user_option("Whose messages"))
            .add_option(int_option("count", "How many", 1, purge_max))
            .default_member_permissions(Permissions::MANAGE_MESSAGES),
        CreateCommand::new("slowmode")
            .description("Set this channel's slowmode")
            .add_option(int_option("seconds", "Seconds, 0 disables", 0, MAX_SLOWMODE_SECS as u64))
            .default_member_permissions(Permissions::MANAGE_CHANNELS),
        CreateCommand::new("lock")
            .description("Stop @everyone from sending here")
            .default_member_permissions(Permissions::MANAGE_CHANNELS),
        CreateCommand::new("unlock")
            .description("Let @everyone send here again")
            .default_member_permissions(Permissions::MANAGE_CHANNELS),
        CreateCommand::new("modlog")
            .description("Show or create the mod log channel")
            .default_member_permissions(Permissions::MANAGE_GUILD),
    ]
}

/// Registry name and args for a slash command. `security status` collapses
/// onto `security`.
pub fn slash_invocation(cmd: &CommandInteraction) -> (String, Args) {
    let name = cmd.data.name.as_str();
    let mut options: &[CommandDataOption] = &cmd.data.options;
    let mut qualified = name.to_string();

    if let Some(sub) = options.first() {
        if let CommandDataOptionValue::SubCommand(inner) = &sub.value {
            if sub.name != "status" {
                qualified = format!("{name} {}", sub.name);
            }
            options = inner;
        }
    }

    let mut args = Args::default();
    for o in options {
        match (o.name.as_str(), &o.value) {
            ("user", CommandDataOptionValue::User(u)) => args.user = Some(u.get()),
            ("reason", CommandDataOptionValue::String(s)) => args.text = Some(s.clone()),
            ("user_id", CommandDataOptionValue::String(s)) => args.user = parse_user_ref(s.trim()),
            ("minutes" | "count" | "seconds", CommandDataOptionValue::Integer(n)) => {
                args.number = Some(*n)
            }
            _ => {}
        }
    }
    (qualified, args)
}
