//! Policy modules and the capability interface they share.
//!
//! Modules are a closed set. Their [`ModuleName`] ordering is the pipeline order:
//! statistics, limiter, profanity, banned words, keyword reactions.

pub mod banned_words;
pub mod filter;
pub mod keyword_reactions;
pub mod limiter;
pub mod profanity;
pub mod registry;
pub mod statistics;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::FixedOffset;
use tracing::warn;

use crate::error::{DatabaseError, ModuleError};
use crate::message::MessageContext;
use crate::policy::{CounterStore, PolicyResolver};
use crate::store::ModerationStore;
use crate::transport::ChatTransport;

pub use banned_words::BannedWordsModule;
pub use keyword_reactions::KeywordReactionsModule;
pub use limiter::LimiterModule;
pub use profanity::ProfanityModule;
pub use registry::ModuleRegistry;
pub use statistics::StatisticsModule;

/// Identity of a pipeline module. `Ord` follows pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleName {
    Statistics,
    Limiter,
    Profanity,
    BannedWords,
    KeywordReactions,
}

impl ModuleName {
    pub const ALL: [ModuleName; 5] = [
        Self::Statistics,
        Self::Limiter,
        Self::Profanity,
        Self::BannedWords,
        Self::KeywordReactions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Statistics => "statistics",
            Self::Limiter => "limiter",
            Self::Profanity => "profanity",
            Self::BannedWords => "banned_words",
            Self::KeywordReactions => "keyword_reactions",
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "statistics" | "stats" => Ok(Self::Statistics),
            "limiter" | "limits" => Ok(Self::Limiter),
            "profanity" => Ok(Self::Profanity),
            "banned_words" | "bannedwords" | "bans" => Ok(Self::BannedWords),
            "keyword_reactions" | "reactions" => Ok(Self::KeywordReactions),
            other => Err(format!("unknown module: {other}")),
        }
    }
}

/// One command a module exposes, for `/help`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHelp {
    pub usage: &'static str,
    pub summary: &'static str,
}

/// Capability interface every policy module implements.
#[async_trait]
pub trait ModerationModule: Send + Sync {
    fn name(&self) -> ModuleName;

    /// One-time startup work. An error aborts startup.
    async fn init(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Whether the dispatcher should run this module for `chat_id`.
    async fn enabled(&self, chat_id: i64) -> Result<bool, ModuleError>;

    async fn on_message(&self, ctx: &mut MessageContext) -> Result<(), ModuleError>;

    fn commands(&self) -> &'static [CommandHelp];

    async fn shutdown(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Collaborators shared by every module.
pub struct ModuleContext {
    pub store: Arc<dyn ModerationStore>,
    pub resolver: PolicyResolver,
    pub counters: CounterStore,
    pub transport: Arc<dyn ChatTransport>,
    default_modules: Vec<ModuleName>,
}

impl ModuleContext {
    pub fn new(
        store: Arc<dyn ModerationStore>,
        transport: Arc<dyn ChatTransport>,
        utc_offset: FixedOffset,
        default_modules: Vec<ModuleName>,
    ) -> Self {
        Self {
            resolver: PolicyResolver::new(Arc::clone(&store)),
            counters: CounterStore::new(Arc::clone(&store), utc_offset),
            store,
            transport,
            default_modules,
        }
    }

    /// An explicit per-chat row wins; otherwise the module is enabled only if it
    /// is in the configured defaults.
    pub async fn module_enabled(
        &self,
        name: ModuleName,
        chat_id: i64,
    ) -> Result<bool, DatabaseError> {
        match self.store.module_enabled(chat_id, name.as_str()).await? {
            Some(enabled) => Ok(enabled),
            None => Ok(self.default_modules.contains(&name)),
        }
    }

    pub fn default_modules(&self) -> &[ModuleName] {
        &self.default_modules
    }

    /// Delete the message behind `ctx`. Failures are logged and leave the context untouched.
    pub async fn delete(&self, ctx: &mut MessageContext, stage: &'static str) -> bool {
        let (chat_id, message_id) = (ctx.message.chat_id, ctx.message.message_id);
        match self.transport.delete_message(chat_id, message_id).await {
            Ok(()) => {
                ctx.mark_deleted(stage);
                true
            }
            Err(e) => {
                warn!(
                    module = stage,
                    chat_id,
                    message_id,
                    error = %e,
                    "Delete failed"
                );
                false
            }
        }
    }

    /// Post a notice in the message's scope. Failures are logged.
    pub async fn notify(&self, ctx: &MessageContext, stage: &'static str, text: &str) {
        let msg = &ctx.message;
        if let Err(e) = self
            .transport
            .send_message(msg.chat_id, msg.thread_id, text)
            .await
        {
            warn!(module = stage, chat_id = msg.chat_id, error = %e, "Notice failed");
        }
    }

    /// Reply to the message, or post a notice when it is already gone.
    pub async fn respond(&self, ctx: &MessageContext, stage: &'static str, text: &str) {
        if ctx.is_deleted() {
            return self.notify(ctx, stage, text).await;
        }
        let msg = &ctx.message;
        if let Err(e) = self
            .transport
            .reply_to(msg.chat_id, msg.thread_id, msg.message_id, text)
            .await
        {
            warn!(module = stage, chat_id = msg.chat_id, error = %e, "Reply failed");
        }
    }
}
