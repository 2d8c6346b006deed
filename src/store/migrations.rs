//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "limiter_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS module_settings (
                chat_id INTEGER NOT NULL,
                module TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 0,
                changed_by INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, module)
            );

            CREATE TABLE IF NOT EXISTS content_limits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                thread_id INTEGER NOT NULL DEFAULT 0,
                user_id INTEGER NOT NULL DEFAULT 0,
                content_type TEXT NOT NULL,
                daily_limit INTEGER NOT NULL,
                warning_threshold INTEGER NOT NULL DEFAULT 2,
                updated_by INTEGER,
                updated_at TEXT NOT NULL,
                UNIQUE (chat_id, thread_id, user_id, content_type)
            );
            CREATE INDEX IF NOT EXISTS idx_content_limits_chat ON content_limits(chat_id);

            CREATE TABLE IF NOT EXISTS content_counters (
                chat_id INTEGER NOT NULL,
                thread_id INTEGER NOT NULL DEFAULT 0,
                user_id INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                day TEXT NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (chat_id, thread_id, user_id, content_type, day)
            );

            CREATE TABLE IF NOT EXISTS vip_users (
                chat_id INTEGER NOT NULL,
                thread_id INTEGER NOT NULL DEFAULT 0,
                user_id INTEGER NOT NULL,
                granted_by INTEGER NOT NULL,
                reason TEXT NOT NULL DEFAULT '',
                granted_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, thread_id, user_id)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "content_filters",
        sql: r#"
            CREATE TABLE IF NOT EXISTS banned_words (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                thread_id INTEGER NOT NULL DEFAULT 0,
                pattern TEXT NOT NULL,
                is_regex INTEGER NOT NULL DEFAULT 0,
                action TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_by INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_banned_words_scope ON banned_words(chat_id, thread_id);

            CREATE TABLE IF NOT EXISTS profanity_settings (
                chat_id INTEGER NOT NULL,
                thread_id INTEGER NOT NULL DEFAULT 0,
                action TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                updated_by INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, thread_id)
            );

            CREATE TABLE IF NOT EXISTS profanity_words (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern TEXT NOT NULL UNIQUE,
                is_regex INTEGER NOT NULL DEFAULT 0
            );
        "#,
    },
    Migration {
        version: 3,
        name: "keyword_reactions",
        sql: r#"
            CREATE TABLE IF NOT EXISTS keyword_reactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                pattern TEXT NOT NULL,
                is_regex INTEGER NOT NULL DEFAULT 0,
                response TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                cooldown_secs INTEGER NOT NULL DEFAULT 60,
                active INTEGER NOT NULL DEFAULT 1,
                created_by INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_keyword_reactions_chat ON keyword_reactions(chat_id);

            CREATE TABLE IF NOT EXISTS keyword_reaction_triggers (
                chat_id INTEGER NOT NULL,
                reaction_id INTEGER NOT NULL REFERENCES keyword_reactions(id) ON DELETE CASCADE,
                trigger_count INTEGER NOT NULL DEFAULT 0,
                last_triggered_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, reaction_id)
            );
        "#,
    },
    Migration {
        version: 4,
        name: "statistics_and_violations",
        sql: r#"
            CREATE TABLE IF NOT EXISTS message_stats (
                chat_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                day TEXT NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (chat_id, user_id, content_type, day)
            );
            CREATE INDEX IF NOT EXISTS idx_message_stats_day ON message_stats(chat_id, day);

            CREATE TABLE IF NOT EXISTS violation_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                thread_id INTEGER NOT NULL DEFAULT 0,
                user_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                violation_code INTEGER NOT NULL,
                day TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_violation_log_lookup
                ON violation_log(chat_id, user_id, violation_code, day);

            CREATE TABLE IF NOT EXISTS violation_rules (
                chat_id INTEGER NOT NULL,
                violation_code INTEGER NOT NULL,
                daily_limit INTEGER,
                updated_by INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, violation_code)
            );
        "#,
    },
];

/// Run all pending migrations.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::info!(
        "Database migrations complete (at V{})",
        get_current_version(conn).await?
    );

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
