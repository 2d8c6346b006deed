//! Pipeline dispatcher: routes each inbound message to the command surface or
//! through the module pipeline.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info};

use crate::commands::CommandHandler;
use crate::message::{InboundMessage, MessageContext};
use crate::modules::ModuleRegistry;
use crate::transport::MessageStream;

/// What happened to one inbound message.
#[derive(Debug)]
pub enum Dispatch {
    /// Sent by a bot; nothing ran.
    Ignored,
    /// Handled by the command surface.
    Command,
    /// Ran through the module pipeline; carries the final context.
    Moderated(MessageContext),
}

pub struct PipelineDispatcher {
    registry: Arc<ModuleRegistry>,
    commands: Arc<CommandHandler>,
}

impl PipelineDispatcher {
    pub fn new(registry: Arc<ModuleRegistry>, commands: Arc<CommandHandler>) -> Self {
        Self { registry, commands }
    }

    /// Handle one message to completion.
    pub async fn dispatch(&self, message: InboundMessage) -> Dispatch {
        if message.sender_is_bot {
            debug!(chat_id = message.chat_id, user_id = message.sender_id, "Ignoring bot message");
            return Dispatch::Ignored;
        }

        if let Some(parsed) = CommandHandler::recognize(&message) {
            self.commands.answer(&message, parsed).await;
            return Dispatch::Command;
        }

        let mut ctx = MessageContext::new(message);
        debug!(
            chat_id = ctx.message.chat_id,
            thread_id = ctx.message.thread_id,
            user_id = ctx.message.sender_id,
            content_type = %ctx.content_type,
            "Running pipeline"
        );
        self.registry.on_message(&mut ctx).await;
        if let Some(stage) = ctx.deleted_by() {
            info!(
                chat_id = ctx.message.chat_id,
                message_id = ctx.message.message_id,
                stage,
                "Message removed by pipeline"
            );
        }
        Dispatch::Moderated(ctx)
    }

    /// Consume a message stream, handling each message on its own task so chats
    /// don't wait on each other. Returns when the stream ends.
    pub async fn run(self: Arc<Self>, mut stream: MessageStream) {
        info!("Dispatcher started");
        while let Some(message) = stream.next().await {
            let dispatcher = Arc::clone(&self);
            tokio::spawn(async move {
                dispatcher.dispatch(message).await;
            });
        }
        info!("Message stream ended");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::modules::test_support::{CHAT, context};
    use crate::modules::{KeywordReactionsModule, ModuleName, StatisticsModule};

    async fn dispatcher() -> (PipelineDispatcher, Arc<crate::modules::ModuleContext>) {
        let (ctx, _) = context(vec![ModuleName::Statistics]).await;
        let registry = Arc::new(ModuleRegistry::new());
        registry.register(Arc::new(StatisticsModule::new(ctx.clone()))).await;
        let reactions = Arc::new(KeywordReactionsModule::new(ctx.clone(), Duration::from_secs(60)));
        let commands = Arc::new(CommandHandler::new(ctx.clone(), registry.clone(), reactions));
        (PipelineDispatcher::new(registry, commands), ctx)
    }

    #[tokio::test]
    async fn bots_are_ignored() {
        let (dispatcher, ctx) = dispatcher().await;
        let mut msg = InboundMessage::text(CHAT, 5, 1, "beep");
        msg.sender_is_bot = true;

        assert!(matches!(dispatcher.dispatch(msg).await, Dispatch::Ignored));
        let stats = ctx.store.user_message_stats(CHAT, 5, None).await.unwrap();
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn commands_skip_the_pipeline() {
        let (dispatcher, ctx) = dispatcher().await;

        let outcome = dispatcher.dispatch(InboundMessage::text(CHAT, 5, 1, "/mystats")).await;
        assert!(matches!(outcome, Dispatch::Command));
        assert!(ctx.store.user_message_stats(CHAT, 5, None).await.unwrap().is_empty());

        let outcome = dispatcher.dispatch(InboundMessage::text(CHAT, 5, 2, "hi")).await;
        assert!(matches!(outcome, Dispatch::Moderated(ref c) if !c.is_deleted()));
        assert_eq!(ctx.store.user_message_stats(CHAT, 5, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_commands_are_moderated() {
        let (dispatcher, _) = dispatcher().await;

        for (id, text) in [(1, "/lol"), (2, "/ buy now")] {
            let outcome = dispatcher.dispatch(InboundMessage::text(CHAT, 5, id, text)).await;
            assert!(matches!(outcome, Dispatch::Moderated(_)), "{text}: {outcome:?}");
        }
    }
}
