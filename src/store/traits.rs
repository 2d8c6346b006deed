//! Unified `ModerationStore` trait: single async interface for all persistence.
//!
//! Lookups here are exact-scope. Thread → chat-wide fallback is the
//! [`PolicyResolver`](crate::policy::PolicyResolver)'s job.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::DatabaseError;
use crate::message::{ChatScope, ContentType};
use crate::policy::model::{
    BannedWordRule, ContentLimitPolicy, FilterAction, KeywordReaction, ProfanitySettings,
    ProfanityWord, ReactionTrigger, TypeCount, UserCount, ViolationCode, ViolationEntry,
    ViolationRule, VipGrant,
};

/// Backend-agnostic store for every moderation table.
#[async_trait]
pub trait ModerationStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Module enablement ───────────────────────────────────────────

    /// Explicit enablement flag for a module in a chat, `None` if never set.
    async fn module_enabled(&self, chat_id: i64, module: &str)
    -> Result<Option<bool>, DatabaseError>;

    async fn set_module_enabled(
        &self,
        chat_id: i64,
        module: &str,
        enabled: bool,
        changed_by: i64,
    ) -> Result<(), DatabaseError>;

    /// All explicit `(module, enabled)` rows for a chat.
    async fn list_module_settings(&self, chat_id: i64)
    -> Result<Vec<(String, bool)>, DatabaseError>;

    // ── Content limits ──────────────────────────────────────────────

    async fn get_content_limit(
        &self,
        scope: ChatScope,
        user_id: Option<i64>,
        content_type: ContentType,
    ) -> Result<Option<ContentLimitPolicy>, DatabaseError>;

    async fn upsert_content_limit(&self, policy: &ContentLimitPolicy) -> Result<(), DatabaseError>;

    async fn delete_content_limit(
        &self,
        scope: ChatScope,
        user_id: Option<i64>,
        content_type: ContentType,
    ) -> Result<bool, DatabaseError>;

    /// Every limit row of a chat, across topics and personal overrides.
    async fn list_content_limits(
        &self,
        chat_id: i64,
    ) -> Result<Vec<ContentLimitPolicy>, DatabaseError>;

    // ── Limiter counters ────────────────────────────────────────────

    /// Atomically add one and return the new count.
    async fn increment_content_counter(
        &self,
        scope: ChatScope,
        user_id: i64,
        content_type: ContentType,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError>;

    async fn get_content_count(
        &self,
        scope: ChatScope,
        user_id: i64,
        content_type: ContentType,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError>;

    // ── Statistics ──────────────────────────────────────────────────

    /// Atomically add one to the statistics counter and return the new count.
    async fn increment_message_stat(
        &self,
        chat_id: i64,
        user_id: i64,
        content_type: ContentType,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError>;

    /// Per-type message counts of a user; all days when `day` is `None`.
    async fn user_message_stats(
        &self,
        chat_id: i64,
        user_id: i64,
        day: Option<NaiveDate>,
    ) -> Result<Vec<TypeCount>, DatabaseError>;

    async fn top_senders(
        &self,
        chat_id: i64,
        day: NaiveDate,
        limit: usize,
    ) -> Result<Vec<UserCount>, DatabaseError>;

    // ── VIP ─────────────────────────────────────────────────────────

    async fn get_vip(&self, scope: ChatScope, user_id: i64)
    -> Result<Option<VipGrant>, DatabaseError>;

    /// Insert or replace a grant.
    async fn upsert_vip(&self, grant: &VipGrant) -> Result<(), DatabaseError>;

    async fn delete_vip(&self, scope: ChatScope, user_id: i64) -> Result<bool, DatabaseError>;

    async fn list_vips(&self, scope: ChatScope) -> Result<Vec<VipGrant>, DatabaseError>;

    // ── Banned words ────────────────────────────────────────────────

    /// Active rules of exactly this scope, ascending id.
    async fn list_banned_words(&self, scope: ChatScope)
    -> Result<Vec<BannedWordRule>, DatabaseError>;

    /// Returns the new rule id.
    async fn insert_banned_word(
        &self,
        scope: ChatScope,
        pattern: &str,
        is_regex: bool,
        action: FilterAction,
        created_by: i64,
    ) -> Result<i64, DatabaseError>;

    /// Delete a rule by id, restricted to one chat.
    async fn delete_banned_word(&self, chat_id: i64, id: i64) -> Result<bool, DatabaseError>;

    // ── Profanity ───────────────────────────────────────────────────

    async fn get_profanity_settings(
        &self,
        scope: ChatScope,
    ) -> Result<Option<ProfanitySettings>, DatabaseError>;

    async fn upsert_profanity_settings(
        &self,
        settings: &ProfanitySettings,
    ) -> Result<(), DatabaseError>;

    async fn delete_profanity_settings(&self, scope: ChatScope) -> Result<bool, DatabaseError>;

    async fn list_profanity_words(&self) -> Result<Vec<ProfanityWord>, DatabaseError>;

    /// Returns false when the pattern already exists.
    async fn add_profanity_word(&self, pattern: &str, is_regex: bool)
    -> Result<bool, DatabaseError>;

    // ── Keyword reactions ───────────────────────────────────────────

    /// Active reactions of a chat in stored order.
    async fn list_active_reactions(
        &self,
        chat_id: i64,
    ) -> Result<Vec<KeywordReaction>, DatabaseError>;

    /// Returns the new reaction id.
    async fn insert_reaction(&self, reaction: &KeywordReaction) -> Result<i64, DatabaseError>;

    async fn delete_reaction(&self, chat_id: i64, id: i64) -> Result<bool, DatabaseError>;

    async fn get_reaction_trigger(
        &self,
        chat_id: i64,
        reaction_id: i64,
    ) -> Result<Option<ReactionTrigger>, DatabaseError>;

    /// Upsert the trigger row, bumping its counter. Returns the new trigger count.
    async fn record_reaction_trigger(
        &self,
        chat_id: i64,
        reaction_id: i64,
        at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError>;

    // ── Violations ──────────────────────────────────────────────────

    async fn log_violation(&self, entry: &ViolationEntry) -> Result<(), DatabaseError>;

    /// Log an entry, then return how many entries with its code the user has on its day
    /// (including the one just written).
    async fn record_violation_and_count(
        &self,
        entry: &ViolationEntry,
    ) -> Result<i64, DatabaseError>;

    async fn count_violations(
        &self,
        chat_id: i64,
        user_id: i64,
        code: ViolationCode,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError>;

    async fn top_violators(
        &self,
        chat_id: i64,
        code: ViolationCode,
        day: NaiveDate,
        limit: usize,
    ) -> Result<Vec<UserCount>, DatabaseError>;

    async fn get_violation_rule(
        &self,
        chat_id: i64,
        code: ViolationCode,
    ) -> Result<Option<ViolationRule>, DatabaseError>;

    async fn upsert_violation_rule(&self, rule: &ViolationRule) -> Result<(), DatabaseError>;

    async fn delete_violation_rule(
        &self,
        chat_id: i64,
        code: ViolationCode,
    ) -> Result<bool, DatabaseError>;
}
