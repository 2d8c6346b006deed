//! libSQL backend: async `ModerationStore` implementation.
//!
//! Supports local file and in-memory databases. Every counter is an
//! `INSERT … ON CONFLICT DO UPDATE … RETURNING` so concurrent messages never
//! lose an increment.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::message::{ChatScope, ContentType};
use crate::policy::model::{
    BannedWordRule, ContentLimitPolicy, FilterAction, KeywordReaction, ProfanitySettings,
    ProfanityWord, ReactionTrigger, TypeCount, UserCount, ViolationCode, ViolationEntry,
    ViolationRule, VipGrant,
};
use crate::store::migrations;
use crate::store::traits::ModerationStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run a query expected to return a single integer (an id or a count).
    async fn query_i64(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}"))),
            Ok(None) => Err(DatabaseError::Query(format!("{op}: no row returned"))),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Day keys are stored as `YYYY-MM-DD`.
fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn parse_content_type(s: &str) -> ContentType {
    s.parse().unwrap_or(ContentType::Other)
}

fn parse_action(s: &str) -> FilterAction {
    s.parse().unwrap_or(FilterAction::Delete)
}

/// Personal overrides are keyed by user id; 0 marks a scope-wide row.
fn user_key(user_id: Option<i64>) -> i64 {
    user_id.unwrap_or(0)
}

fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

const LIMIT_COLUMNS: &str = "chat_id, thread_id, user_id, content_type, daily_limit, warning_threshold, updated_by, updated_at";

/// Column order matches LIMIT_COLUMNS.
fn row_to_limit(row: &libsql::Row) -> Result<ContentLimitPolicy, libsql::Error> {
    let user_id: i64 = row.get(2)?;
    let content_type: String = row.get(3)?;
    let updated_at: String = row.get(7)?;
    Ok(ContentLimitPolicy {
        scope: ChatScope::new(row.get(0)?, row.get(1)?),
        user_id: (user_id != 0).then_some(user_id),
        content_type: parse_content_type(&content_type),
        daily_limit: row.get(4)?,
        warning_threshold: row.get(5)?,
        updated_by: row.get::<i64>(6).ok(),
        updated_at: parse_datetime(&updated_at),
    })
}

const VIP_COLUMNS: &str = "chat_id, thread_id, user_id, granted_by, reason, granted_at";

fn row_to_vip(row: &libsql::Row) -> Result<VipGrant, libsql::Error> {
    let granted_at: String = row.get(5)?;
    Ok(VipGrant {
        scope: ChatScope::new(row.get(0)?, row.get(1)?),
        user_id: row.get(2)?,
        granted_by: row.get(3)?,
        reason: row.get::<String>(4).unwrap_or_default(),
        granted_at: parse_datetime(&granted_at),
    })
}

const BANNED_COLUMNS: &str =
    "id, chat_id, thread_id, pattern, is_regex, action, active, created_by, created_at";

fn row_to_banned_word(row: &libsql::Row) -> Result<BannedWordRule, libsql::Error> {
    let action: String = row.get(5)?;
    let created_at: String = row.get(8)?;
    Ok(BannedWordRule {
        id: row.get(0)?,
        scope: ChatScope::new(row.get(1)?, row.get(2)?),
        pattern: row.get(3)?,
        is_regex: row.get::<i64>(4)? != 0,
        action: parse_action(&action),
        active: row.get::<i64>(6)? != 0,
        created_by: row.get(7)?,
        created_at: parse_datetime(&created_at),
    })
}

const PROFANITY_COLUMNS: &str = "chat_id, thread_id, action, active, updated_by, updated_at";

fn row_to_profanity_settings(row: &libsql::Row) -> Result<ProfanitySettings, libsql::Error> {
    let action: String = row.get(2)?;
    let updated_at: String = row.get(5)?;
    Ok(ProfanitySettings {
        scope: ChatScope::new(row.get(0)?, row.get(1)?),
        action: parse_action(&action),
        active: row.get::<i64>(3)? != 0,
        updated_by: row.get(4)?,
        updated_at: parse_datetime(&updated_at),
    })
}

const REACTION_COLUMNS: &str = "id, chat_id, pattern, is_regex, response, description, cooldown_secs, active, created_by, created_at";

fn row_to_reaction(row: &libsql::Row) -> Result<KeywordReaction, libsql::Error> {
    let created_at: String = row.get(9)?;
    Ok(KeywordReaction {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        pattern: row.get(2)?,
        is_regex: row.get::<i64>(3)? != 0,
        response: row.get(4)?,
        description: row.get::<String>(5).unwrap_or_default(),
        cooldown_secs: row.get(6)?,
        active: row.get::<i64>(7)? != 0,
        created_by: row.get(8)?,
        created_at: parse_datetime(&created_at),
    })
}

fn row_to_violation_rule(row: &libsql::Row) -> Result<ViolationRule, libsql::Error> {
    let code: i64 = row.get(1)?;
    let updated_at: String = row.get(4)?;
    Ok(ViolationRule {
        chat_id: row.get(0)?,
        code: ViolationCode::from_code(code).unwrap_or(ViolationCode::TextMessage),
        daily_limit: row.get::<i64>(2).ok(),
        updated_by: row.get(3)?,
        updated_at: parse_datetime(&updated_at),
    })
}

fn row_to_user_count(row: &libsql::Row) -> Result<UserCount, libsql::Error> {
    Ok(UserCount {
        user_id: row.get(0)?,
        count: row.get(1)?,
    })
}

fn row_to_type_count(row: &libsql::Row) -> Result<TypeCount, libsql::Error> {
    let content_type: String = row.get(0)?;
    Ok(TypeCount {
        content_type: parse_content_type(&content_type),
        count: row.get(1)?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ModerationStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Module enablement ───────────────────────────────────────────

    async fn module_enabled(
        &self,
        chat_id: i64,
        module: &str,
    ) -> Result<Option<bool>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT enabled FROM module_settings WHERE chat_id = ?1 AND module = ?2",
                params![chat_id, module],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("module_enabled: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let enabled: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("module_enabled row parse: {e}")))?;
                Ok(Some(enabled != 0))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("module_enabled: {e}"))),
        }
    }

    async fn set_module_enabled(
        &self,
        chat_id: i64,
        module: &str,
        enabled: bool,
        changed_by: i64,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO module_settings (chat_id, module, enabled, changed_by, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(chat_id, module) DO UPDATE SET
                    enabled = excluded.enabled,
                    changed_by = excluded.changed_by,
                    updated_at = excluded.updated_at",
                params![
                    chat_id,
                    module,
                    enabled as i64,
                    changed_by,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_module_enabled: {e}")))?;

        debug!(chat_id, module, enabled, "Module setting stored");
        Ok(())
    }

    async fn list_module_settings(
        &self,
        chat_id: i64,
    ) -> Result<Vec<(String, bool)>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT module, enabled FROM module_settings WHERE chat_id = ?1 ORDER BY module",
                params![chat_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_module_settings: {e}")))?;

        let mut settings = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let module: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("list_module_settings row parse: {e}")))?;
            let enabled: i64 = row.get(1).unwrap_or(0);
            settings.push((module, enabled != 0));
        }
        Ok(settings)
    }

    // ── Content limits ──────────────────────────────────────────────

    async fn get_content_limit(
        &self,
        scope: ChatScope,
        user_id: Option<i64>,
        content_type: ContentType,
    ) -> Result<Option<ContentLimitPolicy>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LIMIT_COLUMNS} FROM content_limits
                     WHERE chat_id = ?1 AND thread_id = ?2 AND user_id = ?3 AND content_type = ?4"
                ),
                params![
                    scope.chat_id,
                    scope.thread_id,
                    user_key(user_id),
                    content_type.as_str()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_content_limit: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let policy = row_to_limit(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_content_limit row parse: {e}")))?;
                Ok(Some(policy))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_content_limit: {e}"))),
        }
    }

    async fn upsert_content_limit(&self, policy: &ContentLimitPolicy) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO content_limits
                    (chat_id, thread_id, user_id, content_type, daily_limit, warning_threshold, updated_by, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(chat_id, thread_id, user_id, content_type) DO UPDATE SET
                    daily_limit = excluded.daily_limit,
                    warning_threshold = excluded.warning_threshold,
                    updated_by = excluded.updated_by,
                    updated_at = excluded.updated_at",
                params![
                    policy.scope.chat_id,
                    policy.scope.thread_id,
                    user_key(policy.user_id),
                    policy.content_type.as_str(),
                    policy.daily_limit,
                    policy.warning_threshold,
                    opt_int(policy.updated_by),
                    policy.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_content_limit: {e}")))?;

        debug!(
            scope = %policy.scope,
            user_id = ?policy.user_id,
            content_type = %policy.content_type,
            limit = policy.daily_limit,
            "Content limit stored"
        );
        Ok(())
    }

    async fn delete_content_limit(
        &self,
        scope: ChatScope,
        user_id: Option<i64>,
        content_type: ContentType,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM content_limits
                 WHERE chat_id = ?1 AND thread_id = ?2 AND user_id = ?3 AND content_type = ?4",
                params![
                    scope.chat_id,
                    scope.thread_id,
                    user_key(user_id),
                    content_type.as_str()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_content_limit: {e}")))?;
        Ok(affected > 0)
    }

    async fn list_content_limits(
        &self,
        chat_id: i64,
    ) -> Result<Vec<ContentLimitPolicy>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LIMIT_COLUMNS} FROM content_limits WHERE chat_id = ?1
                     ORDER BY thread_id, user_id, content_type"
                ),
                params![chat_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_content_limits: {e}")))?;

        let mut limits = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let policy = row_to_limit(&row)
                .map_err(|e| DatabaseError::Query(format!("list_content_limits row parse: {e}")))?;
            limits.push(policy);
        }
        Ok(limits)
    }

    // ── Limiter counters ────────────────────────────────────────────

    async fn increment_content_counter(
        &self,
        scope: ChatScope,
        user_id: i64,
        content_type: ContentType,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError> {
        self.query_i64(
            "increment_content_counter",
            "INSERT INTO content_counters (chat_id, thread_id, user_id, content_type, day, message_count)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)
             ON CONFLICT(chat_id, thread_id, user_id, content_type, day)
             DO UPDATE SET message_count = message_count + 1
             RETURNING message_count",
            params![
                scope.chat_id,
                scope.thread_id,
                user_id,
                content_type.as_str(),
                day_key(day)
            ],
        )
        .await
    }

    async fn get_content_count(
        &self,
        scope: ChatScope,
        user_id: i64,
        content_type: ContentType,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError> {
        self.query_i64(
            "get_content_count",
            "SELECT COALESCE(MAX(message_count), 0) FROM content_counters
             WHERE chat_id = ?1 AND thread_id = ?2 AND user_id = ?3 AND content_type = ?4 AND day = ?5",
            params![
                scope.chat_id,
                scope.thread_id,
                user_id,
                content_type.as_str(),
                day_key(day)
            ],
        )
        .await
    }

    // ── Statistics ──────────────────────────────────────────────────

    async fn increment_message_stat(
        &self,
        chat_id: i64,
        user_id: i64,
        content_type: ContentType,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError> {
        self.query_i64(
            "increment_message_stat",
            "INSERT INTO message_stats (chat_id, user_id, content_type, day, message_count)
             VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT(chat_id, user_id, content_type, day)
             DO UPDATE SET message_count = message_count + 1
             RETURNING message_count",
            params![chat_id, user_id, content_type.as_str(), day_key(day)],
        )
        .await
    }

    async fn user_message_stats(
        &self,
        chat_id: i64,
        user_id: i64,
        day: Option<NaiveDate>,
    ) -> Result<Vec<TypeCount>, DatabaseError> {
        let mut rows = match day {
            Some(day) => {
                self.conn()
                    .query(
                        "SELECT content_type, SUM(message_count) AS total FROM message_stats
                         WHERE chat_id = ?1 AND user_id = ?2 AND day = ?3
                         GROUP BY content_type ORDER BY total DESC, content_type",
                        params![chat_id, user_id, day_key(day)],
                    )
                    .await
            }
            None => {
                self.conn()
                    .query(
                        "SELECT content_type, SUM(message_count) AS total FROM message_stats
                         WHERE chat_id = ?1 AND user_id = ?2
                         GROUP BY content_type ORDER BY total DESC, content_type",
                        params![chat_id, user_id],
                    )
                    .await
            }
        }
        .map_err(|e| DatabaseError::Query(format!("user_message_stats: {e}")))?;

        let mut counts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let count = row_to_type_count(&row)
                .map_err(|e| DatabaseError::Query(format!("user_message_stats row parse: {e}")))?;
            counts.push(count);
        }
        Ok(counts)
    }

    async fn top_senders(
        &self,
        chat_id: i64,
        day: NaiveDate,
        limit: usize,
    ) -> Result<Vec<UserCount>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, SUM(message_count) AS total FROM message_stats
                 WHERE chat_id = ?1 AND day = ?2
                 GROUP BY user_id ORDER BY total DESC, user_id LIMIT ?3",
                params![chat_id, day_key(day), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("top_senders: {e}")))?;

        let mut senders = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let sender = row_to_user_count(&row)
                .map_err(|e| DatabaseError::Query(format!("top_senders row parse: {e}")))?;
            senders.push(sender);
        }
        Ok(senders)
    }

    // ── VIP ─────────────────────────────────────────────────────────

    async fn get_vip(
        &self,
        scope: ChatScope,
        user_id: i64,
    ) -> Result<Option<VipGrant>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {VIP_COLUMNS} FROM vip_users
                     WHERE chat_id = ?1 AND thread_id = ?2 AND user_id = ?3"
                ),
                params![scope.chat_id, scope.thread_id, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_vip: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let grant = row_to_vip(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_vip row parse: {e}")))?;
                Ok(Some(grant))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_vip: {e}"))),
        }
    }

    async fn upsert_vip(&self, grant: &VipGrant) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO vip_users (chat_id, thread_id, user_id, granted_by, reason, granted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(chat_id, thread_id, user_id) DO UPDATE SET
                    granted_by = excluded.granted_by,
                    reason = excluded.reason,
                    granted_at = excluded.granted_at",
                params![
                    grant.scope.chat_id,
                    grant.scope.thread_id,
                    grant.user_id,
                    grant.granted_by,
                    grant.reason.as_str(),
                    grant.granted_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_vip: {e}")))?;

        debug!(scope = %grant.scope, user_id = grant.user_id, "VIP granted");
        Ok(())
    }

    async fn delete_vip(&self, scope: ChatScope, user_id: i64) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM vip_users WHERE chat_id = ?1 AND thread_id = ?2 AND user_id = ?3",
                params![scope.chat_id, scope.thread_id, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_vip: {e}")))?;
        Ok(affected > 0)
    }

    async fn list_vips(&self, scope: ChatScope) -> Result<Vec<VipGrant>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {VIP_COLUMNS} FROM vip_users
                     WHERE chat_id = ?1 AND thread_id = ?2 ORDER BY granted_at"
                ),
                params![scope.chat_id, scope.thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_vips: {e}")))?;

        let mut grants = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let grant = row_to_vip(&row)
                .map_err(|e| DatabaseError::Query(format!("list_vips row parse: {e}")))?;
            grants.push(grant);
        }
        Ok(grants)
    }

    // ── Banned words ────────────────────────────────────────────────

    async fn list_banned_words(
        &self,
        scope: ChatScope,
    ) -> Result<Vec<BannedWordRule>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {BANNED_COLUMNS} FROM banned_words
                     WHERE chat_id = ?1 AND thread_id = ?2 AND active = 1 ORDER BY id ASC"
                ),
                params![scope.chat_id, scope.thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_banned_words: {e}")))?;

        let mut rules = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let rule = row_to_banned_word(&row)
                .map_err(|e| DatabaseError::Query(format!("list_banned_words row parse: {e}")))?;
            rules.push(rule);
        }
        Ok(rules)
    }

    async fn insert_banned_word(
        &self,
        scope: ChatScope,
        pattern: &str,
        is_regex: bool,
        action: FilterAction,
        created_by: i64,
    ) -> Result<i64, DatabaseError> {
        let id = self
            .query_i64(
                "insert_banned_word",
                "INSERT INTO banned_words (chat_id, thread_id, pattern, is_regex, action, active, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)
                 RETURNING id",
                params![
                    scope.chat_id,
                    scope.thread_id,
                    pattern,
                    is_regex as i64,
                    action.as_str(),
                    created_by,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        debug!(id, scope = %scope, pattern, "Banned word added");
        Ok(id)
    }

    async fn delete_banned_word(&self, chat_id: i64, id: i64) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM banned_words WHERE chat_id = ?1 AND id = ?2",
                params![chat_id, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_banned_word: {e}")))?;
        Ok(affected > 0)
    }

    // ── Profanity ───────────────────────────────────────────────────

    async fn get_profanity_settings(
        &self,
        scope: ChatScope,
    ) -> Result<Option<ProfanitySettings>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROFANITY_COLUMNS} FROM profanity_settings
                     WHERE chat_id = ?1 AND thread_id = ?2"
                ),
                params![scope.chat_id, scope.thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profanity_settings: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let settings = row_to_profanity_settings(&row).map_err(|e| {
                    DatabaseError::Query(format!("get_profanity_settings row parse: {e}"))
                })?;
                Ok(Some(settings))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profanity_settings: {e}"))),
        }
    }

    async fn upsert_profanity_settings(
        &self,
        settings: &ProfanitySettings,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO profanity_settings (chat_id, thread_id, action, active, updated_by, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(chat_id, thread_id) DO UPDATE SET
                    action = excluded.action,
                    active = excluded.active,
                    updated_by = excluded.updated_by,
                    updated_at = excluded.updated_at",
                params![
                    settings.scope.chat_id,
                    settings.scope.thread_id,
                    settings.action.as_str(),
                    settings.active as i64,
                    settings.updated_by,
                    settings.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_profanity_settings: {e}")))?;
        Ok(())
    }

    async fn delete_profanity_settings(&self, scope: ChatScope) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM profanity_settings WHERE chat_id = ?1 AND thread_id = ?2",
                params![scope.chat_id, scope.thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_profanity_settings: {e}")))?;
        Ok(affected > 0)
    }

    async fn list_profanity_words(&self) -> Result<Vec<ProfanityWord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, pattern, is_regex FROM profanity_words ORDER BY id",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_profanity_words: {e}")))?;

        let mut words = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let word = ProfanityWord {
                id: row.get(0).map_err(|e| {
                    DatabaseError::Query(format!("list_profanity_words row parse: {e}"))
                })?,
                pattern: row.get(1).map_err(|e| {
                    DatabaseError::Query(format!("list_profanity_words row parse: {e}"))
                })?,
                is_regex: row.get::<i64>(2).unwrap_or(0) != 0,
            };
            words.push(word);
        }
        Ok(words)
    }

    async fn add_profanity_word(
        &self,
        pattern: &str,
        is_regex: bool,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO profanity_words (pattern, is_regex) VALUES (?1, ?2)",
                params![pattern, is_regex as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_profanity_word: {e}")))?;
        Ok(affected > 0)
    }

    // ── Keyword reactions ───────────────────────────────────────────

    async fn list_active_reactions(
        &self,
        chat_id: i64,
    ) -> Result<Vec<KeywordReaction>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {REACTION_COLUMNS} FROM keyword_reactions
                     WHERE chat_id = ?1 AND active = 1 ORDER BY id ASC"
                ),
                params![chat_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_reactions: {e}")))?;

        let mut reactions = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let reaction = row_to_reaction(&row).map_err(|e| {
                DatabaseError::Query(format!("list_active_reactions row parse: {e}"))
            })?;
            reactions.push(reaction);
        }
        Ok(reactions)
    }

    async fn insert_reaction(&self, reaction: &KeywordReaction) -> Result<i64, DatabaseError> {
        let id = self
            .query_i64(
                "insert_reaction",
                "INSERT INTO keyword_reactions
                    (chat_id, pattern, is_regex, response, description, cooldown_secs, active, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 RETURNING id",
                params![
                    reaction.chat_id,
                    reaction.pattern.as_str(),
                    reaction.is_regex as i64,
                    reaction.response.as_str(),
                    reaction.description.as_str(),
                    reaction.cooldown_secs,
                    reaction.active as i64,
                    reaction.created_by,
                    reaction.created_at.to_rfc3339()
                ],
            )
            .await?;

        debug!(id, chat_id = reaction.chat_id, pattern = %reaction.pattern, "Keyword reaction added");
        Ok(id)
    }

    async fn delete_reaction(&self, chat_id: i64, id: i64) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM keyword_reactions WHERE chat_id = ?1 AND id = ?2",
                params![chat_id, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_reaction: {e}")))?;

        if affected > 0 {
            self.conn()
                .execute(
                    "DELETE FROM keyword_reaction_triggers WHERE chat_id = ?1 AND reaction_id = ?2",
                    params![chat_id, id],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("delete_reaction triggers: {e}")))?;
        }
        Ok(affected > 0)
    }

    async fn get_reaction_trigger(
        &self,
        chat_id: i64,
        reaction_id: i64,
    ) -> Result<Option<ReactionTrigger>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT reaction_id, trigger_count, last_triggered_at FROM keyword_reaction_triggers
                 WHERE chat_id = ?1 AND reaction_id = ?2",
                params![chat_id, reaction_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_reaction_trigger: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let parse = |e: libsql::Error| {
                    DatabaseError::Query(format!("get_reaction_trigger row parse: {e}"))
                };
                let last: String = row.get(2).map_err(parse)?;
                Ok(Some(ReactionTrigger {
                    reaction_id: row.get(0).map_err(parse)?,
                    trigger_count: row.get(1).map_err(parse)?,
                    last_triggered_at: parse_datetime(&last),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_reaction_trigger: {e}"))),
        }
    }

    async fn record_reaction_trigger(
        &self,
        chat_id: i64,
        reaction_id: i64,
        at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        self.query_i64(
            "record_reaction_trigger",
            "INSERT INTO keyword_reaction_triggers (chat_id, reaction_id, trigger_count, last_triggered_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(chat_id, reaction_id) DO UPDATE SET
                trigger_count = trigger_count + 1,
                last_triggered_at = excluded.last_triggered_at
             RETURNING trigger_count",
            params![chat_id, reaction_id, at.to_rfc3339()],
        )
        .await
    }

    // ── Violations ──────────────────────────────────────────────────

    async fn log_violation(&self, entry: &ViolationEntry) -> Result<(), DatabaseError> {
        self.record_violation(entry).await.map(|_| ())
    }

    async fn record_violation_and_count(
        &self,
        entry: &ViolationEntry,
    ) -> Result<i64, DatabaseError> {
        let id = self.record_violation(entry).await?;

        // Rows up to and including our own id, so concurrent inserts for the
        // same user each observe a distinct position.
        self.query_i64(
            "record_violation_and_count",
            "SELECT COUNT(*) FROM violation_log
             WHERE chat_id = ?1 AND user_id = ?2 AND violation_code = ?3 AND day = ?4 AND id <= ?5",
            params![
                entry.scope.chat_id,
                entry.user_id,
                entry.code.code(),
                day_key(entry.day),
                id
            ],
        )
        .await
    }

    async fn count_violations(
        &self,
        chat_id: i64,
        user_id: i64,
        code: ViolationCode,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError> {
        self.query_i64(
            "count_violations",
            "SELECT COUNT(*) FROM violation_log
             WHERE chat_id = ?1 AND user_id = ?2 AND violation_code = ?3 AND day = ?4",
            params![chat_id, user_id, code.code(), day_key(day)],
        )
        .await
    }

    async fn top_violators(
        &self,
        chat_id: i64,
        code: ViolationCode,
        day: NaiveDate,
        limit: usize,
    ) -> Result<Vec<UserCount>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, COUNT(*) AS total FROM violation_log
                 WHERE chat_id = ?1 AND violation_code = ?2 AND day = ?3
                 GROUP BY user_id ORDER BY total DESC, user_id LIMIT ?4",
                params![chat_id, code.code(), day_key(day), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("top_violators: {e}")))?;

        let mut violators = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let violator = row_to_user_count(&row)
                .map_err(|e| DatabaseError::Query(format!("top_violators row parse: {e}")))?;
            violators.push(violator);
        }
        Ok(violators)
    }

    async fn get_violation_rule(
        &self,
        chat_id: i64,
        code: ViolationCode,
    ) -> Result<Option<ViolationRule>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT chat_id, violation_code, daily_limit, updated_by, updated_at
                 FROM violation_rules WHERE chat_id = ?1 AND violation_code = ?2",
                params![chat_id, code.code()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_violation_rule: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let rule = row_to_violation_rule(&row).map_err(|e| {
                    DatabaseError::Query(format!("get_violation_rule row parse: {e}"))
                })?;
                Ok(Some(rule))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_violation_rule: {e}"))),
        }
    }

    async fn upsert_violation_rule(&self, rule: &ViolationRule) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO violation_rules (chat_id, violation_code, daily_limit, updated_by, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(chat_id, violation_code) DO UPDATE SET
                    daily_limit = excluded.daily_limit,
                    updated_by = excluded.updated_by,
                    updated_at = excluded.updated_at",
                params![
                    rule.chat_id,
                    rule.code.code(),
                    opt_int(rule.daily_limit),
                    rule.updated_by,
                    rule.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_violation_rule: {e}")))?;
        Ok(())
    }

    async fn delete_violation_rule(
        &self,
        chat_id: i64,
        code: ViolationCode,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM violation_rules WHERE chat_id = ?1 AND violation_code = ?2",
                params![chat_id, code.code()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_violation_rule: {e}")))?;
        Ok(affected > 0)
    }
}

impl LibSqlBackend {
    /// Append to the violation log, returning the new row id.
    async fn record_violation(&self, entry: &ViolationEntry) -> Result<i64, DatabaseError> {
        let id = self
            .query_i64(
                "log_violation",
                "INSERT INTO violation_log (chat_id, thread_id, user_id, message_id, violation_code, day, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 RETURNING id",
                params![
                    entry.scope.chat_id,
                    entry.scope.thread_id,
                    entry.user_id,
                    entry.message_id,
                    entry.code.code(),
                    day_key(entry.day),
                    entry.created_at.to_rfc3339()
                ],
            )
            .await?;

        debug!(
            scope = %entry.scope,
            user_id = entry.user_id,
            code = entry.code.code(),
            "Violation logged"
        );
        Ok(id)
    }
}
