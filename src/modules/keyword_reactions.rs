//! Keyword reactions: canned replies with a per-reaction cooldown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::error::{DatabaseError, ModuleError};
use crate::message::MessageContext;
use crate::modules::{CommandHelp, ModerationModule, ModuleContext, ModuleName};
use crate::policy::model::KeywordReaction;
use crate::policy::pattern::Matcher;

const STAGE: &str = "keyword_reactions";

const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        usage: "/addreaction \"<pattern>\" \"<response>\" \"<description>\" [cooldown_secs]",
        summary: "Reply automatically when a message matches",
    },
    CommandHelp {
        usage: "/listreactions",
        summary: "Keyword reactions of this chat",
    },
    CommandHelp {
        usage: "/removereaction <id>",
        summary: "Remove a keyword reaction",
    },
];

type CompiledReactions = Arc<Vec<(KeywordReaction, Matcher)>>;

pub struct KeywordReactionsModule {
    ctx: Arc<ModuleContext>,
    cache: TtlCache<i64, CompiledReactions>,
}

impl KeywordReactionsModule {
    pub fn new(ctx: Arc<ModuleContext>, cache_ttl: Duration) -> Self {
        Self {
            ctx,
            cache: TtlCache::new(cache_ttl),
        }
    }

    /// Drop the cached reaction list of a chat. Every mutating command calls this.
    pub async fn invalidate(&self, chat_id: i64) {
        if self.cache.invalidate(&chat_id).await {
            debug!(chat_id, "Reaction cache invalidated");
        }
    }

    /// Evict expired cache entries, so chats that went quiet don't keep theirs.
    pub async fn purge_cache(&self) -> usize {
        let purged = self.cache.purge_expired().await;
        if purged > 0 {
            debug!(purged, "Purged expired reaction cache entries");
        }
        purged
    }

    async fn reactions_for(&self, chat_id: i64) -> Result<CompiledReactions, DatabaseError> {
        if let Some(cached) = self.cache.get(&chat_id).await {
            return Ok(cached);
        }

        let mut compiled = Vec::new();
        for reaction in self.ctx.store.list_active_reactions(chat_id).await? {
            match Matcher::compile(&reaction.pattern, reaction.is_regex) {
                Ok(matcher) => compiled.push((reaction, matcher)),
                Err(e) => {
                    warn!(chat_id, id = reaction.id, error = %e, "Skipping invalid reaction pattern");
                }
            }
        }
        let compiled = Arc::new(compiled);
        self.cache.insert(chat_id, Arc::clone(&compiled)).await;
        Ok(compiled)
    }
}

/// Spawn the background task that sweeps the reaction cache every `interval`.
pub fn spawn_cache_sweeper(
    module: Arc<KeywordReactionsModule>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            module.purge_cache().await;
        }
    })
}

#[async_trait]
impl ModerationModule for KeywordReactionsModule {
    fn name(&self) -> ModuleName {
        ModuleName::KeywordReactions
    }

    async fn enabled(&self, chat_id: i64) -> Result<bool, ModuleError> {
        Ok(self.ctx.module_enabled(self.name(), chat_id).await?)
    }

    async fn on_message(&self, message: &mut MessageContext) -> Result<(), ModuleError> {
        let msg = &message.message;
        if message.is_deleted() || msg.is_command() || msg.chat_kind.is_private() {
            return Ok(());
        }
        let Some(body) = msg.body() else {
            return Ok(());
        };
        let chat_id = msg.chat_id;
        let user_id = msg.sender_id;
        let now = msg.sent_at;

        if self.ctx.resolver.is_vip(message.scope(), user_id).await? {
            return Ok(());
        }

        let reactions = self.reactions_for(chat_id).await?;
        for (reaction, matcher) in reactions.iter() {
            if !matcher.is_match(body) {
                continue;
            }
            if let Some(trigger) = self.ctx.store.get_reaction_trigger(chat_id, reaction.id).await?
                && (now - trigger.last_triggered_at).num_seconds() < reaction.cooldown_secs
            {
                debug!(chat_id, reaction_id = reaction.id, "Reaction cooling down");
                continue;
            }

            info!(chat_id, user_id, reaction_id = reaction.id, "Keyword reaction triggered");
            self.ctx.respond(message, STAGE, &reaction.response).await;
            self.ctx
                .store
                .record_reaction_trigger(chat_id, reaction.id, now)
                .await?;
            break;
        }
        Ok(())
    }

    fn commands(&self) -> &'static [CommandHelp] {
        COMMANDS
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::message::{ChatKind, InboundMessage};
    use crate::modules::test_support::{CHAT, context};

    fn reaction(pattern: &str, response: &str, cooldown_secs: i64) -> KeywordReaction {
        KeywordReaction {
            id: 0,
            chat_id: CHAT,
            pattern: pattern.into(),
            is_regex: false,
            response: response.into(),
            description: String::new(),
            cooldown_secs,
            active: true,
            created_by: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn cooldown_skips_then_allows() {
        let (ctx, transport) = context(vec![]).await;
        ctx.store.insert_reaction(&reaction("rules", "Read the pinned post.", 60)).await.unwrap();
        let module = KeywordReactionsModule::new(ctx, Duration::from_secs(300));

        let t0 = Utc::now();
        for (id, offset) in [(1, 0), (2, 59), (3, 61)] {
            let msg = InboundMessage::text(CHAT, 2, id, "where are the rules?")
                .with_sent_at(t0 + TimeDelta::seconds(offset));
            module.on_message(&mut MessageContext::new(msg)).await.unwrap();
        }

        let replies: Vec<_> = transport.calls().await;
        assert_eq!(replies.len(), 2);
    }

    #[tokio::test]
    async fn cooling_reaction_falls_through_to_next() {
        let (ctx, transport) = context(vec![]).await;
        ctx.store.insert_reaction(&reaction("hello", "first", 600)).await.unwrap();
        ctx.store.insert_reaction(&reaction("hello", "second", 0)).await.unwrap();
        let module = KeywordReactionsModule::new(ctx, Duration::from_secs(300));

        for id in 1..=2 {
            let msg = InboundMessage::text(CHAT, 2, id, "hello all");
            module.on_message(&mut MessageContext::new(msg)).await.unwrap();
        }

        let texts: Vec<_> = transport
            .calls()
            .await
            .iter()
            .map(|c| c.text().unwrap_or_default().to_string())
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn ignores_commands_and_private_chats() {
        let (ctx, transport) = context(vec![]).await;
        ctx.store.insert_reaction(&reaction("help", "Try /help", 0)).await.unwrap();
        let module = KeywordReactionsModule::new(ctx, Duration::from_secs(300));

        let command = InboundMessage::text(CHAT, 2, 1, "/help");
        let private = InboundMessage::text(2, 2, 2, "help me").with_chat_kind(ChatKind::Private);
        for msg in [command, private] {
            module.on_message(&mut MessageContext::new(msg)).await.unwrap();
        }
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_quiet_chats() {
        let (ctx, _) = context(vec![]).await;
        let module = Arc::new(KeywordReactionsModule::new(ctx, Duration::from_secs(60)));
        module.cache.insert(CHAT, Arc::new(Vec::new())).await;
        assert_eq!(module.cache.len().await, 1);

        let sweeper = spawn_cache_sweeper(Arc::clone(&module), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(module.cache.is_empty().await);
        sweeper.abort();
    }

    #[tokio::test]
    async fn new_reaction_needs_invalidation() {
        let (ctx, transport) = context(vec![]).await;
        let module = KeywordReactionsModule::new(ctx.clone(), Duration::from_secs(300));

        let msg = || MessageContext::new(InboundMessage::text(CHAT, 2, 1, "ping"));
        module.on_message(&mut msg()).await.unwrap();

        ctx.store.insert_reaction(&reaction("ping", "pong", 0)).await.unwrap();
        module.on_message(&mut msg()).await.unwrap();
        assert!(transport.calls().await.is_empty(), "stale cache still empty");

        module.invalidate(CHAT).await;
        module.on_message(&mut msg()).await.unwrap();
        assert_eq!(transport.calls().await.len(), 1);
    }
}
