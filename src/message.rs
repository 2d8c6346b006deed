//! Inbound message model, chat scopes and the content classifier.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Scope ───────────────────────────────────────────────────────────

/// A `(chat, thread)` pair. `thread_id == 0` means the whole chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatScope {
    pub chat_id: i64,
    pub thread_id: i64,
}

impl ChatScope {
    pub fn new(chat_id: i64, thread_id: i64) -> Self {
        Self {
            chat_id,
            thread_id: thread_id.max(0),
        }
    }

    /// The whole-chat scope of a chat.
    pub fn chat_wide(chat_id: i64) -> Self {
        Self {
            chat_id,
            thread_id: 0,
        }
    }

    /// True when this scope names one topic rather than the whole chat.
    pub fn is_thread(&self) -> bool {
        self.thread_id != 0
    }

    /// The chat-wide scope this one falls back to.
    pub fn fallback(&self) -> Option<Self> {
        self.is_thread().then(|| Self::chat_wide(self.chat_id))
    }
}

impl fmt::Display for ChatScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_thread() {
            write!(f, "{}#{}", self.chat_id, self.thread_id)
        } else {
            write!(f, "{}", self.chat_id)
        }
    }
}

// ── Chat kind ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn from_api(kind: &str) -> Self {
        match kind {
            "private" => Self::Private,
            "supergroup" => Self::Supergroup,
            "channel" => Self::Channel,
            _ => Self::Group,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private)
    }
}

// ── Content type ────────────────────────────────────────────────────

/// Classifier tag for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Photo,
    Video,
    Sticker,
    Animation,
    Voice,
    VideoNote,
    Audio,
    Document,
    Location,
    Contact,
    Text,
    Other,
}

impl ContentType {
    pub const ALL: [ContentType; 12] = [
        Self::Photo,
        Self::Video,
        Self::Sticker,
        Self::Animation,
        Self::Voice,
        Self::VideoNote,
        Self::Audio,
        Self::Document,
        Self::Location,
        Self::Contact,
        Self::Text,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Sticker => "sticker",
            Self::Animation => "animation",
            Self::Voice => "voice",
            Self::VideoNote => "video_note",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Location => "location",
            Self::Contact => "contact",
            Self::Text => "text",
            Self::Other => "other",
        }
    }

    /// Whether the content limiter applies to this type. Text and other are left to the
    /// filters and the text-violation counter.
    pub fn is_limited(&self) -> bool {
        !matches!(self, Self::Text | Self::Other)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let found = match normalized.as_str() {
            "gif" => Some(Self::Animation),
            "videonote" | "video-note" | "round" => Some(Self::VideoNote),
            "file" => Some(Self::Document),
            "unknown" => Some(Self::Other),
            other => Self::ALL.into_iter().find(|t| t.as_str() == other),
        };
        found.ok_or_else(|| format!("unknown content type: {s}"))
    }
}

// ── Inbound message ─────────────────────────────────────────────────

/// Media and attachment markers present on a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachments {
    pub photo: bool,
    pub video: bool,
    pub sticker: bool,
    pub animation: bool,
    pub voice: bool,
    pub video_note: bool,
    pub audio: bool,
    /// MIME type of an attached document, `Some("")` when the document declares none.
    pub document_mime: Option<String>,
    pub location: bool,
    pub contact: bool,
}

impl Attachments {
    /// No media of any kind.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The message a command or reaction was sent in reply to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub message_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
}

/// A chat message as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    /// Forum topic, 0 when the message is not in a topic.
    pub thread_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub sender_is_bot: bool,
    /// Text body, or the caption of a media message.
    pub text: Option<String>,
    pub attachments: Attachments,
    pub reply_to: Option<ReplyTarget>,
    pub sent_at: DateTime<Utc>,
}

impl InboundMessage {
    /// A plain text message in a group chat.
    pub fn text(chat_id: i64, sender_id: i64, message_id: i64, text: &str) -> Self {
        Self {
            message_id,
            chat_id,
            chat_kind: ChatKind::Supergroup,
            thread_id: 0,
            sender_id,
            sender_name: format!("user{sender_id}"),
            sender_is_bot: false,
            text: Some(text.to_string()),
            attachments: Attachments::default(),
            reply_to: None,
            sent_at: Utc::now(),
        }
    }

    pub fn with_thread(mut self, thread_id: i64) -> Self {
        self.thread_id = thread_id.max(0);
        self
    }

    pub fn with_attachments(mut self, attachments: Attachments) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_sent_at(mut self, sent_at: DateTime<Utc>) -> Self {
        self.sent_at = sent_at;
        self
    }

    pub fn with_reply_to(mut self, target: ReplyTarget) -> Self {
        self.reply_to = Some(target);
        self
    }

    pub fn with_chat_kind(mut self, kind: ChatKind) -> Self {
        self.chat_kind = kind;
        self
    }

    pub fn scope(&self) -> ChatScope {
        ChatScope::new(self.chat_id, self.thread_id)
    }

    /// Trimmed text, `None` when empty.
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Plain text starting with `/`. A media caption is never a command.
    pub fn is_command(&self) -> bool {
        self.attachments.is_empty() && self.body().is_some_and(|t| t.starts_with('/'))
    }

    /// Mention usable in replies.
    pub fn sender_mention(&self) -> String {
        format!("[{}](tg://user?id={})", escape_markdown(&self.sender_name), self.sender_id)
    }
}

/// Map a message to exactly one content type. First match wins, in the order below.
pub fn classify(message: &InboundMessage) -> ContentType {
    let a = &message.attachments;
    if a.photo {
        ContentType::Photo
    } else if a.video {
        ContentType::Video
    } else if a.sticker {
        ContentType::Sticker
    } else if a.animation {
        ContentType::Animation
    } else if a.voice {
        ContentType::Voice
    } else if a.video_note {
        ContentType::VideoNote
    } else if a.audio {
        ContentType::Audio
    } else if let Some(mime) = &a.document_mime {
        if mime.eq_ignore_ascii_case("image/gif") {
            ContentType::Animation
        } else {
            ContentType::Document
        }
    } else if a.location {
        ContentType::Location
    } else if a.contact {
        ContentType::Contact
    } else if message.body().is_some() {
        ContentType::Text
    } else {
        ContentType::Other
    }
}

/// Escape characters that legacy Markdown treats as markup.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ── Message context ─────────────────────────────────────────────────

/// Shared mutable state threaded through every pipeline stage for one message.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub message: InboundMessage,
    pub content_type: ContentType,
    deleted_by: Option<&'static str>,
}

impl MessageContext {
    pub fn new(message: InboundMessage) -> Self {
        let content_type = classify(&message);
        Self {
            message,
            content_type,
            deleted_by: None,
        }
    }

    pub fn scope(&self) -> ChatScope {
        self.message.scope()
    }

    /// Record that a stage deleted the underlying message.
    pub fn mark_deleted(&mut self, stage: &'static str) {
        if self.deleted_by.is_none() {
            self.deleted_by = Some(stage);
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_by.is_some()
    }

    pub fn deleted_by(&self) -> Option<&'static str> {
        self.deleted_by
    }
}
