//! Admin capability check for configuration commands.

use std::sync::Arc;

use crate::error::TransportError;
use crate::message::ChatKind;
use crate::transport::ChatTransport;

/// Asks the transport for the live admin list on every call. No caching, no retry.
pub struct AdminAuthorizer {
    transport: Arc<dyn ChatTransport>,
}

impl AdminAuthorizer {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// Private chats have no admins; everyone there is "not admin".
    pub async fn is_admin(
        &self,
        chat_id: i64,
        chat_kind: ChatKind,
        user_id: i64,
    ) -> Result<bool, TransportError> {
        if chat_kind.is_private() {
            return Ok(false);
        }
        let admins = self.transport.chat_administrators(chat_id).await?;
        Ok(admins.contains(&user_id))
    }
}
