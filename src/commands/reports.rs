//! Statistics reports, module enablement and help.

use std::fmt::Write;

use tracing::info;

use super::CommandHandler;
use crate::error::CommandError;
use crate::message::InboundMessage;
use crate::modules::ModuleName;
use crate::policy::model::TypeCount;

const TOP_SENDERS: usize = 10;

/// Help lines for the commands the handler owns itself.
const MODULE_COMMANDS: &[(&str, &str)] = &[
    ("/modules", "Which modules run in this chat"),
    ("/enable <module>", "Turn a module on for this chat"),
    ("/disable <module>", "Turn a module off for this chat"),
    ("/help", "This list"),
];

fn format_counts(counts: &[TypeCount]) -> String {
    let total: i64 = counts.iter().map(|c| c.count).sum();
    let breakdown = counts
        .iter()
        .map(|c| format!("{} {}", c.count, c.content_type))
        .collect::<Vec<_>>()
        .join(", ");
    if breakdown.is_empty() {
        "0".into()
    } else {
        format!("{total} ({breakdown})")
    }
}

impl CommandHandler {
    pub(super) async fn my_stats(&self, message: &InboundMessage) -> Result<String, CommandError> {
        let store = &self.ctx.store;
        let today = self.ctx.counters.today();
        let (chat_id, user_id) = (message.chat_id, message.sender_id);

        let today_counts = store.user_message_stats(chat_id, user_id, Some(today)).await?;
        let all_counts = store.user_message_stats(chat_id, user_id, None).await?;
        Ok(format!(
            "Your messages\nToday: {}\nAll time: {}",
            format_counts(&today_counts),
            format_counts(&all_counts)
        ))
    }

    pub(super) async fn chat_stats(&self, message: &InboundMessage) -> Result<String, CommandError> {
        let top = self
            .ctx
            .store
            .top_senders(message.chat_id, self.ctx.counters.today(), TOP_SENDERS)
            .await?;
        if top.is_empty() {
            return Ok("No messages counted today.".into());
        }
        let mut out = String::from("Most active today:\n");
        for (rank, entry) in top.iter().enumerate() {
            let _ = writeln!(out, "{}. {}: {} messages", rank + 1, entry.user_id, entry.count);
        }
        Ok(out)
    }

    pub(super) async fn set_module(
        &self,
        message: &InboundMessage,
        name: ModuleName,
        enabled: bool,
    ) -> Result<String, CommandError> {
        if self.registry.get(name).await.is_none() {
            return Err(CommandError::UnknownModule(name.to_string()));
        }
        self.ctx
            .store
            .set_module_enabled(message.chat_id, name.as_str(), enabled, message.sender_id)
            .await?;

        info!(chat_id = message.chat_id, module = %name, enabled, "Module toggled");
        let state = if enabled { "enabled" } else { "disabled" };
        Ok(format!("{name} {state}."))
    }

    pub(super) async fn list_modules(&self, message: &InboundMessage) -> Result<String, CommandError> {
        let mut out = String::from("Modules:\n");
        for name in self.registry.names().await {
            let enabled = self.ctx.module_enabled(name, message.chat_id).await?;
            let mark = if enabled { "on" } else { "off" };
            let _ = writeln!(out, "• {name}: {mark}");
        }
        Ok(out)
    }

    /// Commands of every registered module, then the handler's own.
    pub(super) async fn help(&self) -> String {
        let mut out = String::from("Commands (admin-only where they change settings):\n");
        for (name, commands) in self.registry.commands().await {
            if commands.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n{name}");
            for command in commands {
                let _ = writeln!(out, "{}: {}", command.usage, command.summary);
            }
        }
        let _ = writeln!(out, "\nmodules");
        for (usage, summary) in MODULE_COMMANDS {
            let _ = writeln!(out, "{usage}: {summary}");
        }
        out
    }
}
