//! Command parsing: turns `/name args…` text into a typed [`Command`].

use crate::error::CommandError;
use crate::message::ContentType;
use crate::modules::ModuleName;
use crate::policy::model::{DEFAULT_REACTION_COOLDOWN_SECS, FilterAction};
use crate::policy::pattern::{parse_pattern_spec, validate};

/// Command name and raw arguments, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Lowercased, without the leading `/` or a `@botname` suffix.
    pub name: String,
    pub args: Vec<String>,
}

/// Split `/name@bot arg "quoted arg"` into a [`CommandLine`]. `None` for non-commands.
pub fn split_command(text: &str) -> Option<CommandLine> {
    let rest = text.trim().strip_prefix('/')?;
    let (head, tail) = match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or_default().to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some(CommandLine {
        name,
        args: tokenize(tail),
    })
}

/// Whitespace-separated tokens; double quotes group words and `\"` escapes a quote.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    tokens
}

/// Every command the bot understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetLimit {
        content_type: ContentType,
        daily_limit: i64,
        threshold: Option<i64>,
    },
    RemoveLimit {
        content_type: ContentType,
    },
    ListContentLimits,
    MyContentUsage,

    SetVip {
        reason: String,
    },
    RemoveVip,
    ListVips,

    AddBan {
        pattern: String,
        is_regex: bool,
        action: FilterAction,
    },
    ListBans,
    RemoveBan {
        id: i64,
    },

    SetProfanity {
        action: FilterAction,
    },
    RemoveProfanity,
    ProfanityStatus,

    AddReaction {
        pattern: String,
        is_regex: bool,
        response: String,
        description: String,
        cooldown_secs: i64,
    },
    ListReactions,
    RemoveReaction {
        id: i64,
    },

    /// `None` removes the rule.
    SetTextLimit {
        limit: Option<i64>,
    },
    MyTextViolations,
    ChatTextViolations,

    MyStats,
    ChatStats,

    Enable(ModuleName),
    Disable(ModuleName),
    Modules,
    Help,
}

impl Command {
    /// Validate a command line. `Ok(None)` for names this bot does not handle.
    pub fn parse(line: &CommandLine) -> Result<Option<Self>, CommandError> {
        let args = &line.args;
        let command = match line.name.as_str() {
            "setlimit" => parse_set_limit(args)?,
            "removelimit" => Self::RemoveLimit {
                content_type: limited_type(single(args, "/removelimit <type>")?)?,
            },
            "listcontentlimits" | "limits" => Self::ListContentLimits,
            "mycontentusage" => Self::MyContentUsage,

            "setvip" => Self::SetVip {
                reason: args.join(" "),
            },
            "removevip" => Self::RemoveVip,
            "listvips" => Self::ListVips,

            "addban" => parse_add_ban(args)?,
            "listbans" => Self::ListBans,
            "removeban" => Self::RemoveBan {
                id: parse_id(args, "/removeban <id>")?,
            },

            "setprofanity" => Self::SetProfanity {
                action: parse_action(single(args, "/setprofanity <delete|warn|delete_warn>")?)?,
            },
            "removeprofanity" => Self::RemoveProfanity,
            "profanitystatus" => Self::ProfanityStatus,

            "addreaction" => parse_add_reaction(args)?,
            "listreactions" => Self::ListReactions,
            "removereaction" => Self::RemoveReaction {
                id: parse_id(args, "/removereaction <id>")?,
            },

            "settextlimit" => parse_text_limit(args)?,
            "mytextviolations" => Self::MyTextViolations,
            "chattextviolations" => Self::ChatTextViolations,

            "mystats" => Self::MyStats,
            "chatstats" => Self::ChatStats,

            "enable" => Self::Enable(parse_module(single(args, "/enable <module>")?)?),
            "disable" => Self::Disable(parse_module(single(args, "/disable <module>")?)?),
            "modules" => Self::Modules,
            "help" | "start" => Self::Help,

            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    /// Commands that change configuration and need a chat admin.
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Self::SetLimit { .. }
                | Self::RemoveLimit { .. }
                | Self::SetVip { .. }
                | Self::RemoveVip
                | Self::AddBan { .. }
                | Self::RemoveBan { .. }
                | Self::SetProfanity { .. }
                | Self::RemoveProfanity
                | Self::AddReaction { .. }
                | Self::RemoveReaction { .. }
                | Self::SetTextLimit { .. }
                | Self::Enable(_)
                | Self::Disable(_)
        )
    }
}

fn single<'a>(args: &'a [String], usage: &str) -> Result<&'a str, CommandError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(CommandError::usage(usage)),
    }
}

fn limited_type(raw: &str) -> Result<ContentType, CommandError> {
    let content_type: ContentType = raw
        .parse()
        .map_err(|_| CommandError::UnknownContentType(raw.to_string()))?;
    if !content_type.is_limited() {
        return Err(CommandError::usage(
            "text messages are capped with /settextlimit, other content can't be limited",
        ));
    }
    Ok(content_type)
}

fn parse_action(raw: &str) -> Result<FilterAction, CommandError> {
    raw.parse()
        .map_err(|_| CommandError::InvalidAction(raw.to_string()))
}

fn parse_module(raw: &str) -> Result<ModuleName, CommandError> {
    raw.parse()
        .map_err(|_| CommandError::UnknownModule(raw.to_string()))
}

fn parse_id(args: &[String], usage: &str) -> Result<i64, CommandError> {
    single(args, usage)?
        .trim_start_matches('#')
        .parse()
        .map_err(|_| CommandError::usage(usage))
}

fn checked_pattern(raw: &str) -> Result<(String, bool), CommandError> {
    let (pattern, is_regex) = parse_pattern_spec(raw);
    validate(&pattern, is_regex).map_err(|reason| CommandError::InvalidPattern {
        pattern: raw.to_string(),
        reason,
    })?;
    Ok((pattern, is_regex))
}

fn parse_set_limit(args: &[String]) -> Result<Command, CommandError> {
    const USAGE: &str = "/setlimit <type> <limit> [warning_threshold] \
        (-1 forbids, 0 is unlimited, the threshold can't exceed the limit)";
    let (raw_type, raw_limit, raw_threshold) = match args {
        [t, l] => (t, l, None),
        [t, l, w] => (t, l, Some(w)),
        _ => return Err(CommandError::usage(USAGE)),
    };
    let content_type = limited_type(raw_type)?;
    let daily_limit: i64 = raw_limit.parse().map_err(|_| CommandError::usage(USAGE))?;
    if daily_limit < -1 {
        return Err(CommandError::usage(USAGE));
    }
    let threshold = match raw_threshold {
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) if n >= 0 && (daily_limit <= 0 || n <= daily_limit) => Some(n),
            _ => return Err(CommandError::usage(USAGE)),
        },
        None => None,
    };
    Ok(Command::SetLimit {
        content_type,
        daily_limit,
        threshold,
    })
}

/// The action is the last argument; everything before it is the pattern.
fn parse_add_ban(args: &[String]) -> Result<Command, CommandError> {
    const USAGE: &str = "/addban <pattern> <delete|warn|delete_warn>";
    let Some((raw_action, pattern_parts)) = args.split_last() else {
        return Err(CommandError::usage(USAGE));
    };
    if pattern_parts.is_empty() {
        return Err(CommandError::usage(USAGE));
    }
    let action = parse_action(raw_action)?;
    let (pattern, is_regex) = checked_pattern(&pattern_parts.join(" "))?;
    Ok(Command::AddBan {
        pattern,
        is_regex,
        action,
    })
}

fn parse_add_reaction(args: &[String]) -> Result<Command, CommandError> {
    const USAGE: &str =
        "/addreaction \"<pattern>\" \"<response>\" \"<description>\" [cooldown_secs]";
    let (raw_pattern, response, description, cooldown_secs) = match args {
        [p, r, d] => (p, r, d, DEFAULT_REACTION_COOLDOWN_SECS),
        [p, r, d, c] => match c.parse::<i64>() {
            Ok(secs) if secs >= 0 => (p, r, d, secs),
            _ => return Err(CommandError::usage(USAGE)),
        },
        _ => return Err(CommandError::usage(USAGE)),
    };
    if response.trim().is_empty() {
        return Err(CommandError::usage(USAGE));
    }
    let (pattern, is_regex) = checked_pattern(raw_pattern)?;
    Ok(Command::AddReaction {
        pattern,
        is_regex,
        response: response.clone(),
        description: description.clone(),
        cooldown_secs,
    })
}

fn parse_text_limit(args: &[String]) -> Result<Command, CommandError> {
    const USAGE: &str = "/settextlimit [limit|off]";
    let limit = match args {
        [] => Some(0),
        [raw] if raw.eq_ignore_ascii_case("off") => None,
        [raw] => match raw.parse::<i64>() {
            Ok(0) => None,
            Ok(n) if n > 0 => Some(n),
            _ => return Err(CommandError::usage(USAGE)),
        },
        _ => return Err(CommandError::usage(USAGE)),
    };
    Ok(Command::SetTextLimit { limit })
}
