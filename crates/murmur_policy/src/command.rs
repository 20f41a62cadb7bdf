//! Administrative command grammar.
//!
//! Parsing lives here so the trigger evaluator can recognize command attempts
//! without depending on the handler that executes them.

/// Privilege required to run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Owner,
    /// Whitelisted users may run it too, gated by the cooldown ledger.
    Whitelisted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    WhitelistAdd(String),
    WhitelistRemove(String),
    ChannelAllow(String),
    ChannelDeny(String),
    RoleGateSet { guild_id: String, role_id: String },
    RoleGateClear(String),
    Sleep,
    Wake,
    ConvoOn,
    ConvoOff,
    MemoryStats,
    MemoryClear,
}

impl AdminCommand {
    /// Parse a command attempt. `None` means the text is not a command at all
    /// (wrong prefix or unrecognized verb) and should fall through to the
    /// normal trigger rules. `Some(Err(usage))` is a recognized verb with bad
    /// arguments: the event is still consumed by the command path.
    pub fn parse(prefix: &str, text: &str) -> Option<Result<AdminCommand, String>> {
        let rest = text.trim().strip_prefix(prefix)?;
        let mut words = rest.split_whitespace();
        let verb = words.next()?;
        let args: Vec<&str> = words.collect();

        let parsed = match verb {
            "whitelist" => match args.as_slice() {
                ["add", id] => Ok(AdminCommand::WhitelistAdd(id.to_string())),
                ["remove", id] => Ok(AdminCommand::WhitelistRemove(id.to_string())),
                _ => Err(format!("usage: {}whitelist add|remove <user_id>", prefix)),
            },
            "channel" => match args.as_slice() {
                ["allow", id] => Ok(AdminCommand::ChannelAllow(id.to_string())),
                ["deny", id] => Ok(AdminCommand::ChannelDeny(id.to_string())),
                _ => Err(format!("usage: {}channel allow|deny <channel_id>", prefix)),
            },
            "rolegate" => match args.as_slice() {
                ["set", guild, role] => Ok(AdminCommand::RoleGateSet {
                    guild_id: guild.to_string(),
                    role_id: role.to_string(),
                }),
                ["clear", guild] => Ok(AdminCommand::RoleGateClear(guild.to_string())),
                _ => Err(format!(
                    "usage: {}rolegate set <guild_id> <role_id> | clear <guild_id>",
                    prefix
                )),
            },
            "sleep" => Ok(AdminCommand::Sleep),
            "wake" => Ok(AdminCommand::Wake),
            "convo" => match args.as_slice() {
                ["on"] => Ok(AdminCommand::ConvoOn),
                ["off"] => Ok(AdminCommand::ConvoOff),
                _ => Err(format!("usage: {}convo on|off", prefix)),
            },
            "memory" => match args.as_slice() {
                ["stats"] => Ok(AdminCommand::MemoryStats),
                ["clear"] => Ok(AdminCommand::MemoryClear),
                _ => Err(format!("usage: {}memory stats|clear", prefix)),
            },
            _ => return None,
        };
        Some(parsed)
    }

    /// True when the text would be consumed by the command path.
    pub fn is_command(prefix: &str, text: &str) -> bool {
        Self::parse(prefix, text).is_some()
    }

    pub fn privilege(&self) -> Privilege {
        match self {
            AdminCommand::Wake => Privilege::Whitelisted,
            _ => Privilege::Owner,
        }
    }
}
