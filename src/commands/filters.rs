//! Banned words, profanity settings and keyword reactions.

use std::fmt::Write;

use chrono::Utc;
use tracing::info;

use super::{CommandHandler, scope_label};
use crate::error::CommandError;
use crate::message::InboundMessage;
use crate::policy::model::{FilterAction, KeywordReaction, ProfanitySettings};

fn display_pattern(pattern: &str, is_regex: bool) -> String {
    if is_regex {
        format!("re:{pattern}")
    } else {
        pattern.to_string()
    }
}

impl CommandHandler {
    pub(super) async fn add_ban(
        &self,
        message: &InboundMessage,
        pattern: &str,
        is_regex: bool,
        action: FilterAction,
    ) -> Result<String, CommandError> {
        let scope = message.scope();
        let id = self
            .ctx
            .store
            .insert_banned_word(scope, pattern, is_regex, action, message.sender_id)
            .await?;

        info!(%scope, id, pattern, is_regex, %action, "Banned word added");
        Ok(format!(
            "Banned #{id} \"{}\" in {} ({action}).",
            display_pattern(pattern, is_regex),
            scope_label(message)
        ))
    }

    pub(super) async fn list_bans(&self, message: &InboundMessage) -> Result<String, CommandError> {
        let rules = self.ctx.resolver.banned_words(message.scope()).await?;
        if rules.is_empty() {
            return Ok(format!("No banned words in {}.", scope_label(message)));
        }
        let mut out = format!("Banned words in {}:\n", scope_label(message));
        for rule in rules {
            let origin = if rule.scope.is_thread() { "topic" } else { "chat" };
            let _ = writeln!(
                out,
                "#{} \"{}\" {} [{origin}]",
                rule.id,
                display_pattern(&rule.pattern, rule.is_regex),
                rule.action
            );
        }
        Ok(out)
    }

    pub(super) async fn remove_ban(
        &self,
        message: &InboundMessage,
        id: i64,
    ) -> Result<String, CommandError> {
        if !self.ctx.store.delete_banned_word(message.chat_id, id).await? {
            return Err(CommandError::NotFound(format!("banned word #{id}")));
        }
        info!(chat_id = message.chat_id, id, "Banned word removed");
        Ok(format!("Banned word #{id} removed."))
    }

    pub(super) async fn set_profanity(
        &self,
        message: &InboundMessage,
        action: FilterAction,
    ) -> Result<String, CommandError> {
        let settings = ProfanitySettings {
            scope: message.scope(),
            action,
            active: true,
            updated_by: message.sender_id,
            updated_at: Utc::now(),
        };
        self.ctx.store.upsert_profanity_settings(&settings).await?;

        info!(scope = %settings.scope, %action, "Profanity filter enabled");
        Ok(format!("Profanity filter on in {} ({action}).", scope_label(message)))
    }

    pub(super) async fn remove_profanity(
        &self,
        message: &InboundMessage,
    ) -> Result<String, CommandError> {
        if !self
            .ctx
            .store
            .delete_profanity_settings(message.scope())
            .await?
        {
            return Err(CommandError::NotFound(format!(
                "a profanity setting in {}",
                scope_label(message)
            )));
        }
        info!(scope = %message.scope(), "Profanity setting removed");
        Ok(format!("Profanity setting removed from {}.", scope_label(message)))
    }

    pub(super) async fn profanity_status(
        &self,
        message: &InboundMessage,
    ) -> Result<String, CommandError> {
        let scope = message.scope();
        let words = self.ctx.store.list_profanity_words().await?.len();
        let Some(settings) = self.ctx.resolver.profanity_settings(scope).await? else {
            return Ok(format!(
                "Profanity filter is off in {} ({words} dictionary entries).",
                scope_label(message)
            ));
        };

        let state = if settings.active { "on" } else { "off" };
        let inherited = if settings.scope != scope {
            " (inherited from the chat)"
        } else {
            ""
        };
        Ok(format!(
            "Profanity filter is {state} in {}{inherited}, action {}, {words} dictionary entries.",
            scope_label(message),
            settings.action
        ))
    }

    pub(super) async fn add_reaction(
        &self,
        message: &InboundMessage,
        pattern: String,
        is_regex: bool,
        response: String,
        description: String,
        cooldown_secs: i64,
    ) -> Result<String, CommandError> {
        let chat_id = message.chat_id;
        let reaction = KeywordReaction {
            id: 0,
            chat_id,
            pattern,
            is_regex,
            response,
            description,
            cooldown_secs,
            active: true,
            created_by: message.sender_id,
            created_at: Utc::now(),
        };
        let id = self.ctx.store.insert_reaction(&reaction).await?;
        self.reactions.invalidate(chat_id).await;

        info!(chat_id, id, pattern = %reaction.pattern, cooldown_secs, "Keyword reaction added");
        Ok(format!(
            "Reaction #{id} added for \"{}\" (cooldown {cooldown_secs}s).",
            display_pattern(&reaction.pattern, is_regex)
        ))
    }

    pub(super) async fn list_reactions(
        &self,
        message: &InboundMessage,
    ) -> Result<String, CommandError> {
        let reactions = self.ctx.store.list_active_reactions(message.chat_id).await?;
        if reactions.is_empty() {
            return Ok("No keyword reactions in this chat.".into());
        }
        let mut out = String::from("Keyword reactions:\n");
        for r in reactions {
            let description = if r.description.is_empty() {
                String::new()
            } else {
                format!(" {}:", r.description)
            };
            let _ = writeln!(
                out,
                "#{}{description} \"{}\" → {} ({}s)",
                r.id,
                display_pattern(&r.pattern, r.is_regex),
                r.response,
                r.cooldown_secs
            );
        }
        Ok(out)
    }

    pub(super) async fn remove_reaction(
        &self,
        message: &InboundMessage,
        id: i64,
    ) -> Result<String, CommandError> {
        let chat_id = message.chat_id;
        if !self.ctx.store.delete_reaction(chat_id, id).await? {
            return Err(CommandError::NotFound(format!("reaction #{id}")));
        }
        self.reactions.invalidate(chat_id).await;
        info!(chat_id, id, "Keyword reaction removed");
        Ok(format!("Reaction #{id} removed."))
    }
}
