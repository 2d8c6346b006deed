//! Statistics: counts every message per user, content type and day.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ModuleError;
use crate::message::MessageContext;
use crate::modules::{CommandHelp, ModerationModule, ModuleContext, ModuleName};

const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        usage: "/mystats",
        summary: "Your message counts by type, today and all time",
    },
    CommandHelp {
        usage: "/chatstats",
        summary: "Today's most active members",
    },
];

/// First pipeline stage, so it sees every message before anything can delete it.
pub struct StatisticsModule {
    ctx: Arc<ModuleContext>,
}

impl StatisticsModule {
    pub fn new(ctx: Arc<ModuleContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ModerationModule for StatisticsModule {
    fn name(&self) -> ModuleName {
        ModuleName::Statistics
    }

    async fn enabled(&self, chat_id: i64) -> Result<bool, ModuleError> {
        Ok(self.ctx.module_enabled(self.name(), chat_id).await?)
    }

    async fn on_message(&self, message: &mut MessageContext) -> Result<(), ModuleError> {
        let msg = &message.message;
        let count = self
            .ctx
            .counters
            .record_message(msg.chat_id, msg.sender_id, message.content_type, msg.sent_at)
            .await?;
        debug!(
            chat_id = msg.chat_id,
            user_id = msg.sender_id,
            content_type = %message.content_type,
            count,
            "Message counted"
        );
        Ok(())
    }

    fn commands(&self) -> &'static [CommandHelp] {
        COMMANDS
    }
}
