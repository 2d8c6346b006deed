//! Chat transport: the delivery, deletion and admin-lookup primitives the
//! pipeline and command handlers act through.

pub mod recording;
pub mod telegram;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::TransportError;
use crate::message::InboundMessage;

pub use recording::{RecordingTransport, TransportCall};
pub use telegram::TelegramTransport;

/// Stream of inbound chat messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// Outbound operations against a chat provider. Implementations never retry.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name (e.g. "telegram").
    fn name(&self) -> &str;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError>;

    /// Post a new message. `thread_id == 0` posts to the chat's general area.
    async fn send_message(
        &self,
        chat_id: i64,
        thread_id: i64,
        text: &str,
    ) -> Result<(), TransportError>;

    /// Post a message as a reply to `message_id`.
    async fn reply_to(
        &self,
        chat_id: i64,
        thread_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), TransportError>;

    /// User ids of the chat's current administrators.
    async fn chat_administrators(&self, chat_id: i64) -> Result<Vec<i64>, TransportError>;
}
