//! Daily counters keyed by the local calendar date.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::error::DatabaseError;
use crate::message::{ChatScope, ContentType};
use crate::policy::model::{ViolationCode, ViolationEntry};
use crate::store::ModerationStore;

/// Maps timestamps to day keys and forwards to the store's atomic counters.
///
/// There is no reset job: a new date simply starts a new counter row.
pub struct CounterStore {
    store: Arc<dyn ModerationStore>,
    utc_offset: FixedOffset,
}

impl CounterStore {
    pub fn new(store: Arc<dyn ModerationStore>, utc_offset: FixedOffset) -> Self {
        Self { store, utc_offset }
    }

    /// Local calendar date of `at`.
    pub fn day_for(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.utc_offset).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.day_for(Utc::now())
    }

    /// Limiter counter: add one and return the new count.
    pub async fn increment_content(
        &self,
        scope: ChatScope,
        user_id: i64,
        content_type: ContentType,
        at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        self.store
            .increment_content_counter(scope, user_id, content_type, self.day_for(at))
            .await
    }

    pub async fn content_count(
        &self,
        scope: ChatScope,
        user_id: i64,
        content_type: ContentType,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError> {
        self.store
            .get_content_count(scope, user_id, content_type, day)
            .await
    }

    /// Statistics counter, separate from the limiter's.
    pub async fn record_message(
        &self,
        chat_id: i64,
        user_id: i64,
        content_type: ContentType,
        at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        self.store
            .increment_message_stat(chat_id, user_id, content_type, self.day_for(at))
            .await
    }

    fn violation(
        &self,
        scope: ChatScope,
        user_id: i64,
        message_id: i64,
        code: ViolationCode,
        at: DateTime<Utc>,
    ) -> ViolationEntry {
        ViolationEntry {
            scope,
            user_id,
            message_id,
            code,
            day: self.day_for(at),
            created_at: at,
        }
    }

    /// Audit-only log entry.
    pub async fn log_violation(
        &self,
        scope: ChatScope,
        user_id: i64,
        message_id: i64,
        code: ViolationCode,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.store
            .log_violation(&self.violation(scope, user_id, message_id, code, at))
            .await
    }

    /// Log an entry and return the user's count for that code on that day, including it.
    pub async fn count_violation(
        &self,
        scope: ChatScope,
        user_id: i64,
        message_id: i64,
        code: ViolationCode,
        at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        self.store
            .record_violation_and_count(&self.violation(scope, user_id, message_id, code, at))
            .await
    }
}
