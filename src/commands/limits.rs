//! Content limits, VIP grants and the text-message cap.

use std::fmt::Write;

use chrono::Utc;
use tracing::info;

use super::{CommandHandler, reply_target, scope_label};
use crate::error::CommandError;
use crate::message::{ContentType, InboundMessage};
use crate::modules::limiter::DEFAULT_TEXT_LIMIT;
use crate::policy::model::{ContentLimitPolicy, DailyLimit, ViolationCode, ViolationRule, VipGrant};

impl CommandHandler {
    pub(super) async fn set_limit(
        &self,
        message: &InboundMessage,
        content_type: ContentType,
        daily_limit: i64,
        threshold: Option<i64>,
    ) -> Result<String, CommandError> {
        let mut policy = ContentLimitPolicy::new(message.scope(), content_type, daily_limit);
        if let Some(threshold) = threshold {
            policy = policy.with_threshold(threshold);
        }
        policy.updated_by = Some(message.sender_id);

        let target = match &message.reply_to {
            Some(target) => {
                policy = policy.for_user(target.sender_id);
                format!("{} in {}", target.sender_name, scope_label(message))
            }
            None => scope_label(message).to_string(),
        };
        self.ctx.store.upsert_content_limit(&policy).await?;

        info!(
            scope = %policy.scope,
            user_id = ?policy.user_id,
            content_type = %content_type,
            daily_limit,
            "Content limit set"
        );
        let limit = DailyLimit::from_raw(daily_limit)
            .map(|l| l.to_string())
            .unwrap_or_else(|| daily_limit.to_string());
        Ok(format!(
            "{content_type} limit for {target}: {limit} (warning {} before the cap).",
            policy.warning_threshold
        ))
    }

    pub(super) async fn remove_limit(
        &self,
        message: &InboundMessage,
        content_type: ContentType,
    ) -> Result<String, CommandError> {
        let user_id = message.reply_to.as_ref().map(|t| t.sender_id);
        let removed = self
            .ctx
            .store
            .delete_content_limit(message.scope(), user_id, content_type)
            .await?;
        if !removed {
            return Err(CommandError::NotFound(format!(
                "a {content_type} limit in {}",
                scope_label(message)
            )));
        }
        Ok(format!("{content_type} limit removed."))
    }

    pub(super) async fn list_content_limits(
        &self,
        message: &InboundMessage,
    ) -> Result<String, CommandError> {
        let limits = self.ctx.store.list_content_limits(message.chat_id).await?;
        if limits.is_empty() {
            return Ok("No content limits set.".into());
        }

        let mut out = String::from("Content limits:\n");
        for policy in limits {
            let where_ = if policy.scope.is_thread() {
                format!("topic {}", policy.scope.thread_id)
            } else {
                "chat".to_string()
            };
            let who = policy
                .user_id
                .map(|id| format!(", user {id}"))
                .unwrap_or_default();
            let limit = policy
                .limit()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "invalid".into());
            let _ = writeln!(
                out,
                "• {} ({where_}{who}): {limit}, warn {}",
                policy.content_type, policy.warning_threshold
            );
        }
        Ok(out)
    }

    pub(super) async fn my_content_usage(
        &self,
        message: &InboundMessage,
    ) -> Result<String, CommandError> {
        let scope = message.scope();
        let user_id = message.sender_id;
        let today = self.ctx.counters.today();

        if self.ctx.resolver.is_vip(scope, user_id).await? {
            return Ok(format!("You are a VIP in {}: no limits apply.", scope_label(message)));
        }

        let mut out = String::new();
        for content_type in ContentType::ALL.into_iter().filter(ContentType::is_limited) {
            let Some(policy) = self
                .ctx
                .resolver
                .content_limit(scope, user_id, content_type)
                .await?
            else {
                continue;
            };
            let count = self
                .ctx
                .counters
                .content_count(policy.scope, user_id, content_type, today)
                .await?;
            let line = match policy.limit() {
                Some(DailyLimit::Capped(n)) => format!("{content_type}: {count}/{n}"),
                Some(DailyLimit::Unlimited) => format!("{content_type}: {count} (unlimited)"),
                Some(DailyLimit::Forbidden) => format!("{content_type}: not allowed"),
                None => continue,
            };
            let _ = writeln!(out, "• {line}");
        }

        if out.is_empty() {
            return Ok(format!("No content limits apply to you in {}.", scope_label(message)));
        }
        Ok(format!("Your usage today:\n{out}"))
    }

    pub(super) async fn set_vip(
        &self,
        message: &InboundMessage,
        reason: String,
    ) -> Result<String, CommandError> {
        let target = reply_target(message)?;
        let grant = VipGrant {
            scope: message.scope(),
            user_id: target.sender_id,
            granted_by: message.sender_id,
            reason,
            granted_at: Utc::now(),
        };
        self.ctx.store.upsert_vip(&grant).await?;

        info!(scope = %grant.scope, user_id = grant.user_id, granted_by = grant.granted_by, "VIP granted");
        Ok(format!("{} is now a VIP in {}.", target.sender_name, scope_label(message)))
    }

    pub(super) async fn remove_vip(&self, message: &InboundMessage) -> Result<String, CommandError> {
        let target = reply_target(message)?;
        if !self
            .ctx
            .store
            .delete_vip(message.scope(), target.sender_id)
            .await?
        {
            return Err(CommandError::NotFound(format!(
                "a VIP grant for {} in {}",
                target.sender_name,
                scope_label(message)
            )));
        }
        info!(scope = %message.scope(), user_id = target.sender_id, "VIP revoked");
        Ok(format!("{} is no longer a VIP.", target.sender_name))
    }

    pub(super) async fn list_vips(&self, message: &InboundMessage) -> Result<String, CommandError> {
        let vips = self.ctx.store.list_vips(message.scope()).await?;
        if vips.is_empty() {
            return Ok(format!("No VIPs in {}.", scope_label(message)));
        }
        let mut out = format!("VIPs in {}:\n", scope_label(message));
        for vip in vips {
            let reason = if vip.reason.is_empty() {
                String::new()
            } else {
                format!(" ({})", vip.reason)
            };
            let _ = writeln!(out, "• {}{reason}", vip.user_id);
        }
        Ok(out)
    }

    pub(super) async fn set_text_limit(
        &self,
        message: &InboundMessage,
        limit: Option<i64>,
    ) -> Result<String, CommandError> {
        let chat_id = message.chat_id;
        let Some(limit) = limit else {
            self.ctx
                .store
                .delete_violation_rule(chat_id, ViolationCode::TextMessage)
                .await?;
            info!(chat_id, "Text limit disabled");
            return Ok("Text message limit turned off.".into());
        };

        let stored = (limit > 0).then_some(limit);
        self.ctx
            .store
            .upsert_violation_rule(&ViolationRule {
                chat_id,
                code: ViolationCode::TextMessage,
                daily_limit: stored,
                updated_by: message.sender_id,
                updated_at: Utc::now(),
            })
            .await?;

        let effective = stored.unwrap_or(DEFAULT_TEXT_LIMIT);
        info!(chat_id, limit = effective, "Text limit set");
        Ok(format!("Text messages are now limited to {effective} per user per day."))
    }

    pub(super) async fn my_text_violations(
        &self,
        message: &InboundMessage,
    ) -> Result<String, CommandError> {
        let chat_id = message.chat_id;
        let count = self
            .ctx
            .store
            .count_violations(chat_id, message.sender_id, ViolationCode::TextMessage, self.ctx.counters.today())
            .await?;
        let rule = self
            .ctx
            .store
            .get_violation_rule(chat_id, ViolationCode::TextMessage)
            .await?;
        Ok(match rule {
            Some(rule) => {
                let limit = rule.daily_limit.filter(|n| *n > 0).unwrap_or(DEFAULT_TEXT_LIMIT);
                format!("Text messages today: {count}/{limit}.")
            }
            None => format!("Text messages today: {count} (no limit set)."),
        })
    }

    pub(super) async fn chat_text_violations(
        &self,
        message: &InboundMessage,
    ) -> Result<String, CommandError> {
        let top = self
            .ctx
            .store
            .top_violators(message.chat_id, ViolationCode::TextMessage, self.ctx.counters.today(), 10)
            .await?;
        if top.is_empty() {
            return Ok("No counted text messages today.".into());
        }
        let mut out = String::from("Text messages counted today:\n");
        for (rank, entry) in top.iter().enumerate() {
            let _ = writeln!(out, "{}. {}: {}", rank + 1, entry.user_id, entry.count);
        }
        Ok(out)
    }
}
