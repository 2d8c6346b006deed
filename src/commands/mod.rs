//! Command surface: admin configuration and read-only reports.
//!
//! Commands never enter the moderation pipeline. Each one is validated, checked
//! against the live admin list when it mutates state, executed, and answered with
//! a single reply.

pub mod parser;

mod filters;
mod limits;
mod reports;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::CommandError;
use crate::message::{ChatKind, InboundMessage, ReplyTarget};
use crate::modules::{KeywordReactionsModule, ModuleContext, ModuleRegistry};
use crate::policy::AdminAuthorizer;

pub use parser::{Command, CommandLine, split_command};

/// Reply sent when a command fails for reasons the caller can't fix.
const GENERIC_FAILURE: &str = "Something went wrong, please try again later.";

/// A command line together with its validation result.
#[derive(Debug)]
pub struct ParsedCommand {
    pub line: CommandLine,
    pub command: Result<Command, CommandError>,
}

/// Executes commands against the shared store and module state.
pub struct CommandHandler {
    ctx: Arc<ModuleContext>,
    registry: Arc<ModuleRegistry>,
    reactions: Arc<KeywordReactionsModule>,
    admin: AdminAuthorizer,
}

impl CommandHandler {
    pub fn new(
        ctx: Arc<ModuleContext>,
        registry: Arc<ModuleRegistry>,
        reactions: Arc<KeywordReactionsModule>,
    ) -> Self {
        let admin = AdminAuthorizer::new(Arc::clone(&ctx.transport));
        Self {
            ctx,
            registry,
            reactions,
            admin,
        }
    }

    /// The command a message carries, when it is one this bot handles.
    ///
    /// Returns `None` for media, for text that isn't a command, and for unknown
    /// command names; such messages belong to the moderation pipeline. Malformed
    /// arguments to a known command still count as a command so the sender gets
    /// the usage reply.
    pub fn recognize(message: &InboundMessage) -> Option<ParsedCommand> {
        if !message.is_command() {
            return None;
        }
        let line = message.body().and_then(split_command)?;
        let command = match Command::parse(&line) {
            Ok(Some(command)) => Ok(command),
            Ok(None) => {
                debug!(command = %line.name, chat_id = message.chat_id, "Unknown command left to the pipeline");
                return None;
            }
            Err(e) => Err(e),
        };
        Some(ParsedCommand { line, command })
    }

    /// Parse, run and answer a command message. Anything [`recognize`] rejects is ignored.
    ///
    /// [`recognize`]: Self::recognize
    pub async fn handle(&self, message: &InboundMessage) {
        if let Some(parsed) = Self::recognize(message) {
            self.answer(message, parsed).await;
        }
    }

    /// Run a recognized command and send its single reply.
    pub async fn answer(&self, message: &InboundMessage, parsed: ParsedCommand) {
        let ParsedCommand { line, command } = parsed;
        let outcome = match command {
            Ok(command) => self.execute(command, message).await,
            Err(e) => Err(e),
        };

        let reply = match outcome {
            Ok(text) => text,
            Err(e) if e.is_user_facing() => e.to_string(),
            Err(e) => {
                error!(command = %line.name, chat_id = message.chat_id, error = %e, "Command failed");
                GENERIC_FAILURE.to_string()
            }
        };

        if let Err(e) = self
            .ctx
            .transport
            .reply_to(message.chat_id, message.thread_id, message.message_id, &reply)
            .await
        {
            warn!(command = %line.name, chat_id = message.chat_id, error = %e, "Command reply failed");
        }
    }

    /// Run a parsed command and return the reply text.
    pub async fn execute(
        &self,
        command: Command,
        message: &InboundMessage,
    ) -> Result<String, CommandError> {
        if matches!(command, Command::Help) {
            return Ok(self.help().await);
        }
        if message.chat_kind == ChatKind::Private {
            return Err(CommandError::GroupOnly);
        }
        if command.requires_admin() {
            self.authorize(message).await?;
        }

        match command {
            Command::SetLimit {
                content_type,
                daily_limit,
                threshold,
            } => {
                self.set_limit(message, content_type, daily_limit, threshold)
                    .await
            }
            Command::RemoveLimit { content_type } => self.remove_limit(message, content_type).await,
            Command::ListContentLimits => self.list_content_limits(message).await,
            Command::MyContentUsage => self.my_content_usage(message).await,

            Command::SetVip { reason } => self.set_vip(message, reason).await,
            Command::RemoveVip => self.remove_vip(message).await,
            Command::ListVips => self.list_vips(message).await,

            Command::AddBan {
                pattern,
                is_regex,
                action,
            } => self.add_ban(message, &pattern, is_regex, action).await,
            Command::ListBans => self.list_bans(message).await,
            Command::RemoveBan { id } => self.remove_ban(message, id).await,

            Command::SetProfanity { action } => self.set_profanity(message, action).await,
            Command::RemoveProfanity => self.remove_profanity(message).await,
            Command::ProfanityStatus => self.profanity_status(message).await,

            Command::AddReaction {
                pattern,
                is_regex,
                response,
                description,
                cooldown_secs,
            } => {
                self.add_reaction(message, pattern, is_regex, response, description, cooldown_secs)
                    .await
            }
            Command::ListReactions => self.list_reactions(message).await,
            Command::RemoveReaction { id } => self.remove_reaction(message, id).await,

            Command::SetTextLimit { limit } => self.set_text_limit(message, limit).await,
            Command::MyTextViolations => self.my_text_violations(message).await,
            Command::ChatTextViolations => self.chat_text_violations(message).await,

            Command::MyStats => self.my_stats(message).await,
            Command::ChatStats => self.chat_stats(message).await,

            Command::Enable(name) => self.set_module(message, name, true).await,
            Command::Disable(name) => self.set_module(message, name, false).await,
            Command::Modules => self.list_modules(message).await,
            Command::Help => Ok(self.help().await),
        }
    }

    async fn authorize(&self, message: &InboundMessage) -> Result<(), CommandError> {
        let is_admin = self
            .admin
            .is_admin(message.chat_id, message.chat_kind, message.sender_id)
            .await?;
        if !is_admin {
            info!(
                chat_id = message.chat_id,
                user_id = message.sender_id,
                "Rejected configuration command from non-admin"
            );
            return Err(CommandError::Unauthorized);
        }
        Ok(())
    }
}

/// The user a command targets via reply.
fn reply_target(message: &InboundMessage) -> Result<&ReplyTarget, CommandError> {
    message.reply_to.as_ref().ok_or(CommandError::ReplyRequired)
}

/// Scope label used in replies.
fn scope_label(message: &InboundMessage) -> &'static str {
    if message.thread_id > 0 {
        "this topic"
    } else {
        "this chat"
    }
}
