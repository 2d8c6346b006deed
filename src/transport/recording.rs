//! In-memory transport that records every call, for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::TransportError;
use crate::transport::ChatTransport;

/// One recorded transport operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Delete {
        chat_id: i64,
        message_id: i64,
    },
    Send {
        chat_id: i64,
        thread_id: i64,
        text: String,
    },
    Reply {
        chat_id: i64,
        thread_id: i64,
        message_id: i64,
        text: String,
    },
}

impl TransportCall {
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    /// Text of a send or reply.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Send { text, .. } | Self::Reply { text, .. } => Some(text),
            Self::Delete { .. } => None,
        }
    }
}

/// Records calls in order. Failed calls are not recorded.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    admins: RwLock<HashMap<i64, Vec<i64>>>,
    fail_deletes: AtomicBool,
    fail_sends: AtomicBool,
    fail_admin_lookups: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_admins(&self, chat_id: i64, admins: Vec<i64>) {
        self.admins.write().await.insert(chat_id, admins);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_admin_lookups(&self, fail: bool) {
        self.fail_admin_lookups.store(fail, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().await.clone()
    }

    /// Drain and return the recorded calls.
    pub async fn take_calls(&self) -> Vec<TransportCall> {
        std::mem::take(&mut *self.calls.lock().await)
    }

    async fn record(&self, call: TransportCall) {
        self.calls.lock().await.push(call);
    }

    fn send_guard(&self) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed {
                name: "recording".into(),
                reason: "sends disabled".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(TransportError::DeleteFailed {
                chat_id,
                message_id,
                reason: "deletes disabled".into(),
            });
        }
        self.record(TransportCall::Delete {
            chat_id,
            message_id,
        })
        .await;
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        thread_id: i64,
        text: &str,
    ) -> Result<(), TransportError> {
        self.send_guard()?;
        self.record(TransportCall::Send {
            chat_id,
            thread_id,
            text: text.to_string(),
        })
        .await;
        Ok(())
    }

    async fn reply_to(
        &self,
        chat_id: i64,
        thread_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), TransportError> {
        self.send_guard()?;
        self.record(TransportCall::Reply {
            chat_id,
            thread_id,
            message_id,
            text: text.to_string(),
        })
        .await;
        Ok(())
    }

    async fn chat_administrators(&self, chat_id: i64) -> Result<Vec<i64>, TransportError> {
        if self.fail_admin_lookups.load(Ordering::SeqCst) {
            return Err(TransportError::AdminLookup {
                chat_id,
                reason: "admin lookups disabled".into(),
            });
        }
        Ok(self
            .admins
            .read()
            .await
            .get(&chat_id)
            .cloned()
            .unwrap_or_default())
    }
}
