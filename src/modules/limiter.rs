//! Content limiter: daily per-type quotas, plus the daily text-message cap
//! counted through the violation log.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::ModuleError;
use crate::message::{ContentType, MessageContext};
use crate::modules::{CommandHelp, ModerationModule, ModuleContext, ModuleName};
use crate::policy::model::{DailyLimit, ViolationCode};

const STAGE: &str = "limiter";

/// Text cap applied when the chat's text rule carries no usable limit.
pub const DEFAULT_TEXT_LIMIT: i64 = 10;

/// Warning threshold of the text cap. Not configurable.
pub const TEXT_WARNING_THRESHOLD: i64 = 2;

const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        usage: "/setlimit <type> <N> [threshold]",
        summary: "Daily cap for a content type (-1 forbids, 0 unlimited); reply to set it for one user",
    },
    CommandHelp {
        usage: "/removelimit <type>",
        summary: "Remove a cap (reply to remove a personal one)",
    },
    CommandHelp {
        usage: "/listcontentlimits",
        summary: "Caps configured in this chat",
    },
    CommandHelp {
        usage: "/setvip",
        summary: "Reply to a user to exempt them from limits and filters",
    },
    CommandHelp {
        usage: "/removevip",
        summary: "Reply to a user to revoke their exemption",
    },
    CommandHelp {
        usage: "/listvips",
        summary: "Exempt users in this scope",
    },
    CommandHelp {
        usage: "/mycontentusage",
        summary: "Your usage against today's caps",
    },
    CommandHelp {
        usage: "/settextlimit <N>",
        summary: "Daily text-message cap (0 or off disables)",
    },
    CommandHelp {
        usage: "/mytextviolations",
        summary: "Your text messages counted today",
    },
    CommandHelp {
        usage: "/chattextviolations",
        summary: "Members with the most counted text messages today",
    },
];

/// Outcome of a capped check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// `count` is the position of this message, 1-indexed.
    Warn { count: i64, limit: i64 },
    Delete,
}

/// Decide for a message given how many were counted before it.
///
/// The message is deleted when `previous >= limit`; otherwise it is warned when
/// `previous + threshold >= limit`.
pub fn decide(previous: i64, limit: i64, threshold: i64) -> Verdict {
    if previous >= limit {
        Verdict::Delete
    } else if previous.saturating_add(threshold) >= limit {
        Verdict::Warn {
            count: previous + 1,
            limit,
        }
    } else {
        Verdict::Allow
    }
}

pub struct LimiterModule {
    ctx: Arc<ModuleContext>,
}

impl LimiterModule {
    pub fn new(ctx: Arc<ModuleContext>) -> Self {
        Self { ctx }
    }

    async fn check_content(&self, message: &mut MessageContext) -> Result<(), ModuleError> {
        let content_type = message.content_type;
        let (scope, user_id, sent_at) = {
            let msg = &message.message;
            (msg.scope(), msg.sender_id, msg.sent_at)
        };

        let is_vip = self.ctx.resolver.is_vip(scope, user_id).await?;
        let Some(policy) = self
            .ctx
            .resolver
            .content_limit(scope, user_id, content_type)
            .await?
        else {
            return Ok(());
        };
        let Some(limit) = policy.limit() else {
            warn!(
                scope = %policy.scope,
                content_type = %content_type,
                raw = policy.daily_limit,
                "Ignoring limit row with invalid value"
            );
            return Ok(());
        };

        // Counters live in the scope the policy came from, so a chat-wide cap
        // counts across all topics.
        let counter_scope = policy.scope;

        if is_vip {
            let count = self
                .ctx
                .counters
                .increment_content(counter_scope, user_id, content_type, sent_at)
                .await?;
            debug!(%scope, user_id, content_type = %content_type, count, "VIP message counted");
            return Ok(());
        }

        match limit {
            DailyLimit::Unlimited => {
                self.ctx
                    .counters
                    .increment_content(counter_scope, user_id, content_type, sent_at)
                    .await?;
            }
            DailyLimit::Forbidden => {
                info!(%scope, user_id, content_type = %content_type, "Forbidden content, deleting");
                self.ctx.delete(message, STAGE).await;
                let text = format!(
                    "{}, {} messages are not allowed here.",
                    message.message.sender_mention(),
                    content_type
                );
                self.ctx.notify(message, STAGE, &text).await;
                self.audit(message, ViolationCode::ContentForbidden).await;
            }
            DailyLimit::Capped(cap) => {
                let count = self
                    .ctx
                    .counters
                    .increment_content(counter_scope, user_id, content_type, sent_at)
                    .await?;
                let verdict = decide(count - 1, cap, policy.warning_threshold);
                self.apply(message, verdict, content_type, ViolationCode::ContentCapped)
                    .await;
            }
        }
        Ok(())
    }

    /// Daily text cap, enabled per chat by a code-21 rule.
    async fn check_text(&self, message: &mut MessageContext) -> Result<(), ModuleError> {
        let (scope, user_id, message_id, sent_at) = {
            let msg = &message.message;
            (msg.scope(), msg.sender_id, msg.message_id, msg.sent_at)
        };

        if self.ctx.resolver.is_vip(scope, user_id).await? {
            return Ok(());
        }
        let Some(rule) = self
            .ctx
            .store
            .get_violation_rule(scope.chat_id, ViolationCode::TextMessage)
            .await?
        else {
            return Ok(());
        };
        let limit = rule
            .daily_limit
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_TEXT_LIMIT);

        let count = self
            .ctx
            .counters
            .count_violation(scope, user_id, message_id, ViolationCode::TextMessage, sent_at)
            .await?;
        let verdict = decide(count - 1, limit, TEXT_WARNING_THRESHOLD);
        // The log entry written above is the count; no separate audit row.
        self.apply_text(message, verdict).await;
        Ok(())
    }

    async fn apply(
        &self,
        message: &mut MessageContext,
        verdict: Verdict,
        content_type: ContentType,
        code: ViolationCode,
    ) {
        match verdict {
            Verdict::Allow => {}
            Verdict::Warn { count, limit } => {
                let text = format!(
                    "{}, that's {count}/{limit} {content_type} messages for today.",
                    message.message.sender_mention()
                );
                self.ctx.respond(message, STAGE, &text).await;
            }
            Verdict::Delete => {
                info!(
                    scope = %message.scope(),
                    user_id = message.message.sender_id,
                    content_type = %content_type,
                    "Daily limit exceeded, deleting"
                );
                self.ctx.delete(message, STAGE).await;
                let text = format!(
                    "{}, you've reached today's limit for {content_type} messages.",
                    message.message.sender_mention()
                );
                self.ctx.notify(message, STAGE, &text).await;
                self.audit(message, code).await;
            }
        }
    }

    async fn apply_text(&self, message: &mut MessageContext, verdict: Verdict) {
        match verdict {
            Verdict::Allow => {}
            Verdict::Warn { count, limit } => {
                let text = format!(
                    "{}, that's {count}/{limit} text messages for today.",
                    message.message.sender_mention()
                );
                self.ctx.respond(message, STAGE, &text).await;
            }
            Verdict::Delete => {
                info!(
                    scope = %message.scope(),
                    user_id = message.message.sender_id,
                    "Daily text limit exceeded, deleting"
                );
                self.ctx.delete(message, STAGE).await;
                let text = format!(
                    "{}, you've reached today's text message limit.",
                    message.message.sender_mention()
                );
                self.ctx.notify(message, STAGE, &text).await;
            }
        }
    }

    /// Best-effort audit entry; a failure here never changes the outcome.
    async fn audit(&self, message: &MessageContext, code: ViolationCode) {
        let msg = &message.message;
        if let Err(e) = self
            .ctx
            .counters
            .log_violation(msg.scope(), msg.sender_id, msg.message_id, code, msg.sent_at)
            .await
        {
            warn!(module = STAGE, code = code.code(), error = %e, "Failed to log violation");
        }
    }
}

#[async_trait]
impl ModerationModule for LimiterModule {
    fn name(&self) -> ModuleName {
        ModuleName::Limiter
    }

    async fn enabled(&self, chat_id: i64) -> Result<bool, ModuleError> {
        Ok(self.ctx.module_enabled(self.name(), chat_id).await?)
    }

    async fn on_message(&self, message: &mut MessageContext) -> Result<(), ModuleError> {
        match message.content_type {
            ContentType::Text => self.check_text(message).await,
            t if t.is_limited() => self.check_content(message).await,
            _ => Ok(()),
        }
    }

    fn commands(&self) -> &'static [CommandHelp] {
        COMMANDS
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::message::{Attachments, ChatScope, InboundMessage};
    use crate::modules::test_support::{CHAT, context};
    use crate::policy::model::{ContentLimitPolicy, ViolationRule, VipGrant};
    use crate::transport::TransportCall;

    fn sticker(user: i64, id: i64) -> MessageContext {
        let attachments = Attachments {
            sticker: true,
            ..Default::default()
        };
        MessageContext::new(InboundMessage::text(CHAT, user, id, "").with_attachments(attachments))
    }

    #[test]
    fn verdict_boundaries() {
        assert_eq!(decide(0, 3, 2), Verdict::Allow);
        assert_eq!(decide(1, 3, 2), Verdict::Warn { count: 2, limit: 3 });
        assert_eq!(decide(2, 3, 2), Verdict::Warn { count: 3, limit: 3 });
        assert_eq!(decide(3, 3, 2), Verdict::Delete);
        assert_eq!(decide(7, 3, 2), Verdict::Delete);
        // Threshold 0 never warns.
        assert_eq!(decide(2, 3, 0), Verdict::Allow);
        // An oversized stored threshold warns on every message instead of wrapping.
        assert_eq!(decide(1, 3, i64::MAX), Verdict::Warn { count: 2, limit: 3 });
        assert_eq!(decide(3, 3, i64::MAX), Verdict::Delete);
    }

    #[tokio::test]
    async fn no_policy_allows_without_counting() {
        let (ctx, transport) = context(vec![]).await;
        let limiter = LimiterModule::new(ctx.clone());

        limiter.on_message(&mut sticker(1, 1)).await.unwrap();

        assert!(transport.calls().await.is_empty());
        let count = ctx
            .counters
            .content_count(ChatScope::chat_wide(CHAT), 1, ContentType::Sticker, ctx.counters.today())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn forbidden_deletes_without_counting() {
        let (ctx, transport) = context(vec![]).await;
        ctx.store
            .upsert_content_limit(&ContentLimitPolicy::new(
                ChatScope::chat_wide(CHAT),
                ContentType::Sticker,
                -1,
            ))
            .await
            .unwrap();
        let limiter = LimiterModule::new(ctx.clone());

        let mut msg = sticker(1, 5);
        limiter.on_message(&mut msg).await.unwrap();

        assert!(msg.is_deleted());
        let calls = transport.calls().await;
        assert_eq!(calls[0], TransportCall::Delete { chat_id: CHAT, message_id: 5 });
        assert!(calls[1].text().unwrap().contains("not allowed"));

        let day = ctx.counters.today();
        assert_eq!(
            ctx.counters
                .content_count(ChatScope::chat_wide(CHAT), 1, ContentType::Sticker, day)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            ctx.store
                .count_violations(CHAT, 1, ViolationCode::ContentForbidden, day)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn vip_counts_but_is_never_deleted() {
        let (ctx, transport) = context(vec![]).await;
        let scope = ChatScope::chat_wide(CHAT);
        ctx.store
            .upsert_content_limit(&ContentLimitPolicy::new(scope, ContentType::Sticker, 1))
            .await
            .unwrap();
        ctx.store
            .upsert_vip(&VipGrant {
                scope,
                user_id: 1,
                granted_by: 2,
                reason: String::new(),
                granted_at: Utc::now(),
            })
            .await
            .unwrap();
        let limiter = LimiterModule::new(ctx.clone());

        for id in 0..4 {
            let mut msg = sticker(1, id);
            limiter.on_message(&mut msg).await.unwrap();
            assert!(!msg.is_deleted());
        }
        assert!(transport.calls().await.is_empty());
        assert_eq!(
            ctx.counters
                .content_count(scope, 1, ContentType::Sticker, ctx.counters.today())
                .await
                .unwrap(),
            4
        );
    }

    #[tokio::test]
    async fn text_cap_needs_a_rule_and_defaults_to_ten() {
        let (ctx, transport) = context(vec![]).await;
        let limiter = LimiterModule::new(ctx.clone());

        let mut msg = MessageContext::new(InboundMessage::text(CHAT, 1, 1, "hello"));
        limiter.on_message(&mut msg).await.unwrap();
        assert_eq!(
            ctx.store
                .count_violations(CHAT, 1, ViolationCode::TextMessage, ctx.counters.today())
                .await
                .unwrap(),
            0
        );

        ctx.store
            .upsert_violation_rule(&ViolationRule {
                chat_id: CHAT,
                code: ViolationCode::TextMessage,
                daily_limit: None,
                updated_by: 9,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        for id in 1..=11 {
            let mut msg = MessageContext::new(InboundMessage::text(CHAT, 1, id, "hello"));
            limiter.on_message(&mut msg).await.unwrap();
            assert_eq!(msg.is_deleted(), id == 11, "message {id}");
        }
        // Warnings at 9/10 and 10/10, then the delete and its notice.
        let calls = transport.calls().await;
        assert_eq!(calls.len(), 4);
        assert!(calls[0].text().unwrap().contains("9/10"));
        assert!(calls[1].text().unwrap().contains("10/10"));
        assert!(calls[2].is_delete());
    }

    #[tokio::test]
    async fn invalid_limit_row_is_ignored() {
        let (ctx, transport) = context(vec![]).await;
        ctx.store
            .upsert_content_limit(&ContentLimitPolicy::new(
                ChatScope::chat_wide(CHAT),
                ContentType::Sticker,
                -7,
            ))
            .await
            .unwrap();
        let limiter = LimiterModule::new(ctx.clone());

        let mut msg = sticker(1, 1);
        limiter.on_message(&mut msg).await.unwrap();
        assert!(!msg.is_deleted());
        assert!(transport.calls().await.is_empty());
    }
}
