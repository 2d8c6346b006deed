//! Policy rows: limits, VIP grants, filter rules, reactions and the violation log.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{ChatScope, ContentType};

/// Warning threshold used when a limit row does not set one.
pub const DEFAULT_WARNING_THRESHOLD: i64 = 2;

/// Default cooldown for keyword reactions added without one.
pub const DEFAULT_REACTION_COOLDOWN_SECS: i64 = 60;

// ── Content limits ──────────────────────────────────────────────────

/// Interpreted value of a `daily_limit` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyLimit {
    /// `-1`: the content type is not allowed at all.
    Forbidden,
    /// `0`: no cap.
    Unlimited,
    /// `N > 0` messages per day.
    Capped(i64),
}

impl DailyLimit {
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            -1 => Some(Self::Forbidden),
            0 => Some(Self::Unlimited),
            n if n > 0 => Some(Self::Capped(n)),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> i64 {
        match self {
            Self::Forbidden => -1,
            Self::Unlimited => 0,
            Self::Capped(n) => *n,
        }
    }
}

impl fmt::Display for DailyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden => f.write_str("forbidden"),
            Self::Unlimited => f.write_str("unlimited"),
            Self::Capped(n) => write!(f, "{n}/day"),
        }
    }
}

/// Daily quota for one content type in one scope, optionally for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentLimitPolicy {
    pub scope: ChatScope,
    /// `Some` for a personal override set by replying to the user.
    pub user_id: Option<i64>,
    pub content_type: ContentType,
    pub daily_limit: i64,
    pub warning_threshold: i64,
    pub updated_by: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl ContentLimitPolicy {
    pub fn new(scope: ChatScope, content_type: ContentType, daily_limit: i64) -> Self {
        Self {
            scope,
            user_id: None,
            content_type,
            daily_limit,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            updated_by: None,
            updated_at: Utc::now(),
        }
    }

    pub fn for_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.warning_threshold = threshold.max(0);
        self
    }

    /// `None` for corrupt rows (limit below -1), which callers treat as no policy.
    pub fn limit(&self) -> Option<DailyLimit> {
        DailyLimit::from_raw(self.daily_limit)
    }
}

// ── VIP ─────────────────────────────────────────────────────────────

/// Immunity from the limiter and filters within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipGrant {
    pub scope: ChatScope,
    pub user_id: i64,
    pub granted_by: i64,
    pub reason: String,
    pub granted_at: DateTime<Utc>,
}

// ── Filter actions ──────────────────────────────────────────────────

/// What a banned-word or profanity hit does to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    Delete,
    Warn,
    DeleteWarn,
}

impl FilterAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Warn => "warn",
            Self::DeleteWarn => "delete_warn",
        }
    }

    pub fn deletes(&self) -> bool {
        matches!(self, Self::Delete | Self::DeleteWarn)
    }

    pub fn warns(&self) -> bool {
        matches!(self, Self::Warn | Self::DeleteWarn)
    }
}

impl fmt::Display for FilterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "warn" => Ok(Self::Warn),
            "delete_warn" | "deletewarn" | "delete-warn" => Ok(Self::DeleteWarn),
            other => Err(format!("unknown filter action: {other}")),
        }
    }
}

// ── Banned words & profanity ────────────────────────────────────────

/// A chat- or topic-scoped banned pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannedWordRule {
    pub id: i64,
    pub scope: ChatScope,
    pub pattern: String,
    pub is_regex: bool,
    pub action: FilterAction,
    pub active: bool,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Profanity filtering switched on for a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfanitySettings {
    pub scope: ChatScope,
    pub action: FilterAction,
    pub active: bool,
    pub updated_by: i64,
    pub updated_at: DateTime<Utc>,
}

/// One entry of the global profanity dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfanityWord {
    pub id: i64,
    pub pattern: String,
    pub is_regex: bool,
}

// ── Keyword reactions ───────────────────────────────────────────────

/// Canned reply sent when a chat message matches a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordReaction {
    pub id: i64,
    pub chat_id: i64,
    pub pattern: String,
    pub is_regex: bool,
    pub response: String,
    pub description: String,
    pub cooldown_secs: i64,
    pub active: bool,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Per-(chat, reaction) trigger bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionTrigger {
    pub reaction_id: i64,
    pub trigger_count: i64,
    pub last_triggered_at: DateTime<Utc>,
}

// ── Violations ──────────────────────────────────────────────────────

/// Numeric tag written to the violation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationCode {
    /// Content type daily cap exceeded.
    ContentCapped,
    /// Content type forbidden in the scope.
    ContentForbidden,
    /// Text message counted against the daily text cap.
    TextMessage,
    BannedWord,
    Profanity,
}

impl ViolationCode {
    pub fn code(&self) -> i64 {
        match self {
            Self::ContentCapped => 11,
            Self::ContentForbidden => 12,
            Self::TextMessage => 21,
            Self::BannedWord => 31,
            Self::Profanity => 32,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            11 => Some(Self::ContentCapped),
            12 => Some(Self::ContentForbidden),
            21 => Some(Self::TextMessage),
            31 => Some(Self::BannedWord),
            32 => Some(Self::Profanity),
            _ => None,
        }
    }
}

/// One row of the violation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationEntry {
    pub scope: ChatScope,
    pub user_id: i64,
    pub message_id: i64,
    pub code: ViolationCode,
    pub day: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Chat-level rule that switches on counting for a violation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationRule {
    pub chat_id: i64,
    pub code: ViolationCode,
    pub daily_limit: Option<i64>,
    pub updated_by: i64,
    pub updated_at: DateTime<Utc>,
}

// ── Reports ─────────────────────────────────────────────────────────

/// Count of messages of one content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCount {
    pub content_type: ContentType,
    pub count: i64,
}

/// Count attributed to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCount {
    pub user_id: i64,
    pub count: i64,
}
