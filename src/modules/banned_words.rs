//! Banned-word filter: per-chat and per-topic patterns, first match wins.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::ModuleError;
use crate::message::MessageContext;
use crate::modules::filter::enforce;
use crate::modules::{CommandHelp, ModerationModule, ModuleContext, ModuleName};
use crate::policy::model::{BannedWordRule, ViolationCode};
use crate::policy::pattern::Matcher;

const STAGE: &str = "banned_words";

const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        usage: "/addban <pattern> <delete|warn|delete_warn>",
        summary: "Ban a word or re:regex in this scope",
    },
    CommandHelp {
        usage: "/listbans",
        summary: "Banned patterns that apply here",
    },
    CommandHelp {
        usage: "/removeban <id>",
        summary: "Remove a banned pattern",
    },
];

pub struct BannedWordsModule {
    ctx: Arc<ModuleContext>,
}

impl BannedWordsModule {
    pub fn new(ctx: Arc<ModuleContext>) -> Self {
        Self { ctx }
    }
}

/// First rule in `rules` matching `text`. Rules whose pattern fails to compile are skipped.
pub fn first_match<'a>(rules: &'a [BannedWordRule], text: &str) -> Option<&'a BannedWordRule> {
    rules.iter().find(|rule| {
        match Matcher::compile(&rule.pattern, rule.is_regex) {
            Ok(matcher) => matcher.is_match(text),
            Err(e) => {
                warn!(id = rule.id, pattern = %rule.pattern, error = %e, "Skipping invalid banned-word regex");
                false
            }
        }
    })
}

#[async_trait]
impl ModerationModule for BannedWordsModule {
    fn name(&self) -> ModuleName {
        ModuleName::BannedWords
    }

    async fn enabled(&self, chat_id: i64) -> Result<bool, ModuleError> {
        Ok(self.ctx.module_enabled(self.name(), chat_id).await?)
    }

    async fn on_message(&self, message: &mut MessageContext) -> Result<(), ModuleError> {
        if message.is_deleted() {
            return Ok(());
        }
        let Some(body) = message.message.body().map(str::to_owned) else {
            return Ok(());
        };
        let scope = message.scope();
        let user_id = message.message.sender_id;

        let rules = self.ctx.resolver.banned_words(scope).await?;
        if rules.is_empty() {
            return Ok(());
        }
        if self.ctx.resolver.is_vip(scope, user_id).await? {
            debug!(%scope, user_id, "VIP exempt from banned words");
            return Ok(());
        }
        let Some(rule) = first_match(&rules, &body) else {
            return Ok(());
        };

        info!(%scope, user_id, rule_id = rule.id, action = %rule.action, "Banned word matched");
        let warning = format!(
            "{}, your message contains a banned word.",
            message.message.sender_mention()
        );
        enforce(&self.ctx, message, STAGE, rule.action, &warning).await;

        let msg = &message.message;
        if let Err(e) = self
            .ctx
            .counters
            .log_violation(scope, user_id, msg.message_id, ViolationCode::BannedWord, msg.sent_at)
            .await
        {
            warn!(module = STAGE, error = %e, "Failed to log violation");
        }
        Ok(())
    }

    fn commands(&self) -> &'static [CommandHelp] {
        COMMANDS
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::message::{ChatScope, InboundMessage};
    use crate::modules::test_support::{CHAT, context};
    use crate::policy::model::FilterAction;
    use crate::transport::TransportCall;

    fn rule(id: i64, pattern: &str, is_regex: bool) -> BannedWordRule {
        BannedWordRule {
            id,
            scope: ChatScope::chat_wide(CHAT),
            pattern: pattern.into(),
            is_regex,
            action: FilterAction::Delete,
            active: true,
            created_by: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn first_match_skips_broken_regex() {
        let rules = vec![rule(1, "(oops", true), rule(2, "spam", false), rule(3, "sp.m", true)];
        assert_eq!(first_match(&rules, "SPAM here").map(|r| r.id), Some(2));
        assert!(first_match(&rules, "ham").is_none());
    }

    #[tokio::test]
    async fn thread_rule_wins_over_chat_rule() {
        let (ctx, transport) = context(vec![]).await;
        ctx.store
            .insert_banned_word(ChatScope::chat_wide(CHAT), "spam", false, FilterAction::Delete, 1)
            .await
            .unwrap();
        ctx.store
            .insert_banned_word(ChatScope::new(CHAT, 4), "spam", false, FilterAction::Warn, 1)
            .await
            .unwrap();
        let module = BannedWordsModule::new(ctx.clone());

        let mut msg = MessageContext::new(InboundMessage::text(CHAT, 2, 30, "spam!").with_thread(4));
        module.on_message(&mut msg).await.unwrap();

        // Only the thread rule (warn) ran.
        assert!(!msg.is_deleted());
        let calls = transport.calls().await;
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], TransportCall::Reply { message_id: 30, .. }));
        assert_eq!(
            ctx.store
                .count_violations(CHAT, 2, ViolationCode::BannedWord, ctx.counters.today())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn no_match_does_nothing() {
        let (ctx, transport) = context(vec![]).await;
        ctx.store
            .insert_banned_word(ChatScope::chat_wide(CHAT), "spam", false, FilterAction::Delete, 1)
            .await
            .unwrap();
        let module = BannedWordsModule::new(ctx);

        let mut msg = MessageContext::new(InboundMessage::text(CHAT, 2, 30, "hello"));
        module.on_message(&mut msg).await.unwrap();
        assert!(transport.calls().await.is_empty());
    }
}
