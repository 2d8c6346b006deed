//! Telegram transport: long-polls the Bot API for group messages and
//! performs moderation actions through it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::TransportError;
use crate::message::{Attachments, ChatKind, InboundMessage, ReplyTarget};
use crate::transport::{ChatTransport, MessageStream};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Delay before polling again after a network or parse error.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram transport: connects to the Bot API via long-polling.
pub struct TelegramTransport {
    bot_token: SecretString,
    poll_timeout: Duration,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot_token: SecretString, poll_timeout: Duration) -> Self {
        Self {
            bot_token,
            poll_timeout,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// POST a Bot API method and return the `result` field.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, TransportError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(format!("{method}: {e}")))?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| TransportError::Http(format!("{method}: {e}")))?;

        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(TransportError::Http(format!(
                "{method} returned {status}: {description}"
            )));
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Send a single chunk (≤4096 chars), Markdown-first with one plain-text fallback.
    async fn send_chunk(
        &self,
        chat_id: i64,
        thread_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<(), TransportError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if thread_id > 0 {
            body["message_thread_id"] = Value::from(thread_id);
        }
        if let Some(message_id) = reply_to {
            body["reply_parameters"] = serde_json::json!({
                "message_id": message_id,
                "allow_sending_without_reply": true,
            });
        }

        let markdown_err = match self.call("sendMessage", &body).await {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };
        tracing::warn!(
            chat_id,
            error = %markdown_err,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        if let Some(obj) = body.as_object_mut() {
            obj.remove("parse_mode");
        }
        self.call("sendMessage", &body)
            .await
            .map(|_| ())
            .map_err(|plain_err| TransportError::SendFailed {
                name: "telegram".into(),
                reason: format!("markdown: {markdown_err}, plain: {plain_err}"),
            })
    }

    async fn send_text(
        &self,
        chat_id: i64,
        thread_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<(), TransportError> {
        for (i, chunk) in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH)
            .iter()
            .enumerate()
        {
            // Only the first chunk is threaded under the original message.
            let reply = if i == 0 { reply_to } else { None };
            self.send_chunk(chat_id, thread_id, reply, chunk).await?;
        }
        Ok(())
    }

    /// Start long-polling `getUpdates`. Updates that carry no group message are skipped.
    pub fn start(&self) -> MessageStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let timeout = self.poll_timeout.as_secs();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram transport listening for updates...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": timeout,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!(response = %data, "Telegram getUpdates returned no result");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(message) = update.get("message").and_then(parse_message) else {
                        continue;
                    };

                    if tx.send(message).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    /// Verify the token with `getMe`.
    pub async fn health_check(&self) -> Result<(), TransportError> {
        self.call("getMe", &serde_json::json!({}))
            .await
            .map(|_| ())
            .map_err(|e| TransportError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError> {
        self.call(
            "deleteMessage",
            &serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
        .map(|_| ())
        .map_err(|e| TransportError::DeleteFailed {
            chat_id,
            message_id,
            reason: e.to_string(),
        })
    }

    async fn send_message(
        &self,
        chat_id: i64,
        thread_id: i64,
        text: &str,
    ) -> Result<(), TransportError> {
        self.send_text(chat_id, thread_id, None, text).await
    }

    async fn reply_to(
        &self,
        chat_id: i64,
        thread_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), TransportError> {
        self.send_text(chat_id, thread_id, Some(message_id), text)
            .await
    }

    async fn chat_administrators(&self, chat_id: i64) -> Result<Vec<i64>, TransportError> {
        let result = self
            .call(
                "getChatAdministrators",
                &serde_json::json!({ "chat_id": chat_id }),
            )
            .await
            .map_err(|e| TransportError::AdminLookup {
                chat_id,
                reason: e.to_string(),
            })?;

        Ok(result
            .as_array()
            .map(|members| {
                members
                    .iter()
                    .filter_map(|m| m.get("user").and_then(|u| u.get("id")).and_then(Value::as_i64))
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        token.expose_secret()
    )
}

fn display_name(user: &Value) -> String {
    let first = user.get("first_name").and_then(Value::as_str).unwrap_or("");
    let last = user.get("last_name").and_then(Value::as_str).unwrap_or("");
    let full = format!("{first} {last}").trim().to_string();
    if full.is_empty() {
        user.get("username")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    } else {
        full
    }
}

/// Convert a Bot API `Message` object. Returns `None` for service messages
/// without a sender.
fn parse_message(message: &Value) -> Option<InboundMessage> {
    let message_id = message.get("message_id").and_then(Value::as_i64)?;
    let chat = message.get("chat")?;
    let chat_id = chat.get("id").and_then(Value::as_i64)?;
    let chat_kind = ChatKind::from_api(chat.get("type").and_then(Value::as_str).unwrap_or(""));
    let from = message.get("from")?;
    let sender_id = from.get("id").and_then(Value::as_i64)?;

    let is_topic = message
        .get("is_topic_message")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let thread_id = if is_topic {
        message
            .get("message_thread_id")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    } else {
        0
    };

    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str)
        .map(String::from);

    let attachments = Attachments {
        photo: message.get("photo").is_some(),
        video: message.get("video").is_some(),
        sticker: message.get("sticker").is_some(),
        animation: message.get("animation").is_some(),
        voice: message.get("voice").is_some(),
        video_note: message.get("video_note").is_some(),
        audio: message.get("audio").is_some(),
        document_mime: message.get("document").map(|d| {
            d.get("mime_type")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        }),
        location: message.get("location").is_some(),
        contact: message.get("contact").is_some(),
    };

    // Inside a forum topic every message "replies" to the topic's creation
    // message; that is not a user reply.
    let reply_to = message
        .get("reply_to_message")
        .filter(|r| r.get("forum_topic_created").is_none())
        .and_then(|r| {
            let user = r.get("from")?;
            Some(ReplyTarget {
                message_id: r.get("message_id").and_then(Value::as_i64)?,
                sender_id: user.get("id").and_then(Value::as_i64)?,
                sender_name: display_name(user),
            })
        });

    let sent_at = message
        .get("date")
        .and_then(Value::as_i64)
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    Some(InboundMessage {
        message_id,
        chat_id,
        chat_kind,
        thread_id,
        sender_id,
        sender_name: display_name(from),
        sender_is_bot: from.get("is_bot").and_then(Value::as_bool).unwrap_or(false),
        text,
        attachments,
        reply_to,
        sent_at,
    })
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }

        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(cut);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ContentType, classify};

    #[test]
    fn telegram_api_url() {
        let token = SecretString::from("123:ABC".to_string());
        assert_eq!(
            api_url(&token, "deleteMessage"),
            "https://api.telegram.org/bot123:ABC/deleteMessage"
        );
    }

    #[test]
    fn parses_topic_photo_with_caption() {
        let raw = serde_json::json!({
            "message_id": 77,
            "date": 1_700_000_000,
            "is_topic_message": true,
            "message_thread_id": 12,
            "chat": { "id": -1001, "type": "supergroup" },
            "from": { "id": 5, "first_name": "Ada", "last_name": "L", "is_bot": false },
            "photo": [{ "file_id": "x" }],
            "caption": "look",
            "reply_to_message": {
                "message_id": 12,
                "forum_topic_created": { "name": "pics" },
                "from": { "id": 1, "first_name": "Op" }
            }
        });
        let msg = parse_message(&raw).unwrap();
        assert_eq!(msg.chat_id, -1001);
        assert_eq!(msg.thread_id, 12);
        assert_eq!(msg.sender_name, "Ada L");
        assert_eq!(msg.text.as_deref(), Some("look"));
        assert!(msg.reply_to.is_none());
        assert_eq!(classify(&msg), ContentType::Photo);
        assert_eq!(msg.sent_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn thread_id_ignored_outside_topics() {
        let raw = serde_json::json!({
            "message_id": 1,
            "date": 0,
            "message_thread_id": 9,
            "chat": { "id": -5, "type": "group" },
            "from": { "id": 2, "username": "bob" },
            "text": "hi",
            "reply_to_message": { "message_id": 9, "from": { "id": 3, "first_name": "Cy" } }
        });
        let msg = parse_message(&raw).unwrap();
        assert_eq!(msg.thread_id, 0);
        assert_eq!(msg.sender_name, "bob");
        let target = msg.reply_to.unwrap();
        assert_eq!(target.sender_id, 3);
        assert_eq!(target.message_id, 9);
    }

    #[test]
    fn gif_document_keeps_mime() {
        let raw = serde_json::json!({
            "message_id": 1,
            "date": 0,
            "chat": { "id": -5, "type": "supergroup" },
            "from": { "id": 2, "first_name": "A" },
            "document": { "file_id": "f", "mime_type": "image/gif" }
        });
        let msg = parse_message(&raw).unwrap();
        assert_eq!(classify(&msg), ContentType::Animation);
    }

    #[test]
    fn message_without_sender_is_skipped() {
        let raw = serde_json::json!({
            "message_id": 1,
            "date": 0,
            "chat": { "id": -5, "type": "channel" },
            "text": "broadcast"
        });
        assert!(parse_message(&raw).is_none());
    }

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        // 'é' is two bytes; a cut at an odd byte offset must back off.
        let msg = "é".repeat(3000);
        let chunks = split_message(&msg, 4095);
        assert!(chunks.iter().all(|c| c.len() <= 4095));
        assert_eq!(chunks.concat(), msg);
    }
}
