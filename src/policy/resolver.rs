//! Scope fallback resolution.
//!
//! Every scoped lookup asks the thread scope first and, when it finds nothing and
//! the scope names a thread, the chat-wide scope. Lookups hit the store on every
//! call; nothing here is cached.

use std::future::Future;
use std::sync::Arc;

use crate::error::DatabaseError;
use crate::message::{ChatScope, ContentType};
use crate::policy::model::{BannedWordRule, ContentLimitPolicy, ProfanitySettings, VipGrant};
use crate::store::ModerationStore;

/// Shared resolver injected into every module and command handler.
pub struct PolicyResolver {
    store: Arc<dyn ModerationStore>,
}

impl PolicyResolver {
    pub fn new(store: Arc<dyn ModerationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ModerationStore> {
        &self.store
    }

    /// Run `lookup` for `scope`, then for its chat-wide fallback if the first found nothing.
    async fn with_fallback<T, F, Fut>(
        &self,
        scope: ChatScope,
        lookup: F,
    ) -> Result<Option<T>, DatabaseError>
    where
        F: Fn(ChatScope) -> Fut,
        Fut: Future<Output = Result<Option<T>, DatabaseError>>,
    {
        if let Some(found) = lookup(scope).await? {
            return Ok(Some(found));
        }
        match scope.fallback() {
            Some(chat_wide) => lookup(chat_wide).await,
            None => Ok(None),
        }
    }

    pub async fn vip(&self, scope: ChatScope, user_id: i64) -> Result<Option<VipGrant>, DatabaseError> {
        self.with_fallback(scope, |s| self.store.get_vip(s, user_id))
            .await
    }

    pub async fn is_vip(&self, scope: ChatScope, user_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.vip(scope, user_id).await?.is_some())
    }

    /// The limit that applies to `user_id`: a personal override (thread, then chat-wide)
    /// beats the shared scope row (thread, then chat-wide).
    pub async fn content_limit(
        &self,
        scope: ChatScope,
        user_id: i64,
        content_type: ContentType,
    ) -> Result<Option<ContentLimitPolicy>, DatabaseError> {
        let personal = self
            .with_fallback(scope, |s| {
                self.store.get_content_limit(s, Some(user_id), content_type)
            })
            .await?;
        if personal.is_some() {
            return Ok(personal);
        }
        self.with_fallback(scope, |s| self.store.get_content_limit(s, None, content_type))
            .await
    }

    /// Rules in match order: the thread's own rules, then the chat-wide ones, each by
    /// ascending id. With no thread rules this equals the chat-wide resolution.
    pub async fn banned_words(&self, scope: ChatScope) -> Result<Vec<BannedWordRule>, DatabaseError> {
        let mut rules = self.store.list_banned_words(scope).await?;
        if let Some(chat_wide) = scope.fallback() {
            rules.extend(self.store.list_banned_words(chat_wide).await?);
        }
        Ok(rules)
    }

    /// The profanity row for the scope. An inactive thread row still shadows the chat row.
    pub async fn profanity_settings(
        &self,
        scope: ChatScope,
    ) -> Result<Option<ProfanitySettings>, DatabaseError> {
        self.with_fallback(scope, |s| self.store.get_profanity_settings(s))
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::policy::model::FilterAction;
    use crate::store::LibSqlBackend;

    const CHAT: i64 = -42;

    async fn resolver() -> PolicyResolver {
        PolicyResolver::new(Arc::new(LibSqlBackend::new_memory().await.unwrap()))
    }

    fn grant(scope: ChatScope, user_id: i64) -> VipGrant {
        VipGrant {
            scope,
            user_id,
            granted_by: 1,
            reason: String::new(),
            granted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn thread_lookup_falls_back_to_chat() {
        let r = resolver().await;
        r.store().upsert_vip(&grant(ChatScope::chat_wide(CHAT), 7)).await.unwrap();

        assert!(r.is_vip(ChatScope::new(CHAT, 3), 7).await.unwrap());
        assert!(r.is_vip(ChatScope::chat_wide(CHAT), 7).await.unwrap());
        assert!(!r.is_vip(ChatScope::new(CHAT, 3), 8).await.unwrap());
    }

    #[tokio::test]
    async fn chat_lookup_never_consults_threads() {
        let r = resolver().await;
        r.store().upsert_vip(&grant(ChatScope::new(CHAT, 3), 7)).await.unwrap();

        assert!(!r.is_vip(ChatScope::chat_wide(CHAT), 7).await.unwrap());
        assert!(!r.is_vip(ChatScope::new(CHAT, 4), 7).await.unwrap());
    }

    #[tokio::test]
    async fn thread_limit_shadows_chat_limit() {
        let r = resolver().await;
        let store = r.store();
        store
            .upsert_content_limit(&ContentLimitPolicy::new(
                ChatScope::chat_wide(CHAT),
                ContentType::Photo,
                5,
            ))
            .await
            .unwrap();
        store
            .upsert_content_limit(&ContentLimitPolicy::new(
                ChatScope::new(CHAT, 2),
                ContentType::Photo,
                1,
            ))
            .await
            .unwrap();

        let in_thread = r.content_limit(ChatScope::new(CHAT, 2), 9, ContentType::Photo).await.unwrap();
        assert_eq!(in_thread.unwrap().daily_limit, 1);
        let elsewhere = r.content_limit(ChatScope::new(CHAT, 6), 9, ContentType::Photo).await.unwrap();
        assert_eq!(elsewhere.unwrap().daily_limit, 5);
        assert!(r.content_limit(ChatScope::new(CHAT, 6), 9, ContentType::Video).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn personal_chat_override_beats_thread_scope_row() {
        let r = resolver().await;
        let store = r.store();
        store
            .upsert_content_limit(&ContentLimitPolicy::new(
                ChatScope::new(CHAT, 2),
                ContentType::Sticker,
                1,
            ))
            .await
            .unwrap();
        store
            .upsert_content_limit(
                &ContentLimitPolicy::new(ChatScope::chat_wide(CHAT), ContentType::Sticker, 20)
                    .for_user(9),
            )
            .await
            .unwrap();

        let for_nine = r.content_limit(ChatScope::new(CHAT, 2), 9, ContentType::Sticker).await.unwrap();
        assert_eq!(for_nine.unwrap().daily_limit, 20);
        let for_others = r.content_limit(ChatScope::new(CHAT, 2), 10, ContentType::Sticker).await.unwrap();
        assert_eq!(for_others.unwrap().daily_limit, 1);
    }

    #[tokio::test]
    async fn banned_words_thread_rules_first() {
        let r = resolver().await;
        let store = r.store();
        let chat_rule = store
            .insert_banned_word(ChatScope::chat_wide(CHAT), "spam", false, FilterAction::Delete, 1)
            .await
            .unwrap();
        let thread_rule = store
            .insert_banned_word(ChatScope::new(CHAT, 3), "spam", false, FilterAction::Warn, 1)
            .await
            .unwrap();

        let ids: Vec<i64> = r
            .banned_words(ChatScope::new(CHAT, 3))
            .await
            .unwrap()
            .iter()
            .map(|rule| rule.id)
            .collect();
        assert_eq!(ids, vec![thread_rule, chat_rule]);

        let chat_only = r.banned_words(ChatScope::chat_wide(CHAT)).await.unwrap();
        assert_eq!(chat_only.len(), 1);
        assert_eq!(
            r.banned_words(ChatScope::new(CHAT, 8)).await.unwrap(),
            chat_only
        );
    }

    #[tokio::test]
    async fn profanity_settings_fall_back() {
        let r = resolver().await;
        r.store()
            .upsert_profanity_settings(&ProfanitySettings {
                scope: ChatScope::chat_wide(CHAT),
                action: FilterAction::Warn,
                active: true,
                updated_by: 1,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let found = r.profanity_settings(ChatScope::new(CHAT, 5)).await.unwrap().unwrap();
        assert_eq!(found.action, FilterAction::Warn);
        assert_eq!(found.scope, ChatScope::chat_wide(CHAT));
    }
}
