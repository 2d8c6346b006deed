//! Action execution shared by the banned-word and profanity filters.

use crate::message::MessageContext;
use crate::modules::ModuleContext;
use crate::policy::model::FilterAction;

/// Apply `action`: delete first, then warn. The warning is a reply while the
/// message still exists and a plain notice once it is gone.
pub async fn enforce(
    ctx: &ModuleContext,
    message: &mut MessageContext,
    stage: &'static str,
    action: FilterAction,
    warning: &str,
) {
    if action.deletes() {
        ctx.delete(message, stage).await;
    }
    if action.warns() {
        ctx.respond(message, stage, warning).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::InboundMessage;
    use crate::modules::test_support::{CHAT, context};
    use crate::transport::TransportCall;

    #[tokio::test]
    async fn delete_warn_deletes_then_notifies() {
        let (ctx, transport) = context(vec![]).await;
        let mut msg = MessageContext::new(InboundMessage::text(CHAT, 5, 40, "bad"));

        enforce(&ctx, &mut msg, "test", FilterAction::DeleteWarn, "no").await;

        assert_eq!(
            transport.calls().await,
            vec![
                TransportCall::Delete { chat_id: CHAT, message_id: 40 },
                TransportCall::Send { chat_id: CHAT, thread_id: 0, text: "no".into() },
            ]
        );
        assert_eq!(msg.deleted_by(), Some("test"));
    }

    #[tokio::test]
    async fn warn_only_replies() {
        let (ctx, transport) = context(vec![]).await;
        let mut msg = MessageContext::new(InboundMessage::text(CHAT, 5, 40, "bad").with_thread(8));

        enforce(&ctx, &mut msg, "test", FilterAction::Warn, "careful").await;

        assert_eq!(
            transport.calls().await,
            vec![TransportCall::Reply {
                chat_id: CHAT,
                thread_id: 8,
                message_id: 40,
                text: "careful".into()
            }]
        );
        assert!(!msg.is_deleted());
    }

    #[tokio::test]
    async fn failed_delete_falls_back_to_reply() {
        let (ctx, transport) = context(vec![]).await;
        transport.fail_deletes(true);
        let mut msg = MessageContext::new(InboundMessage::text(CHAT, 5, 40, "bad"));

        enforce(&ctx, &mut msg, "test", FilterAction::DeleteWarn, "no").await;

        let calls = transport.calls().await;
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], TransportCall::Reply { .. }));
    }
}
