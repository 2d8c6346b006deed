//! Profanity filter: a global dictionary applied in scopes that switch it on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{DatabaseError, ModuleError};
use crate::message::MessageContext;
use crate::modules::filter::enforce;
use crate::modules::{CommandHelp, ModerationModule, ModuleContext, ModuleName};
use crate::policy::model::ViolationCode;
use crate::policy::pattern::{Matcher, parse_pattern_spec, validate};

const STAGE: &str = "profanity";

const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        usage: "/setprofanity <delete|warn|delete_warn>",
        summary: "Turn the profanity filter on for this scope",
    },
    CommandHelp {
        usage: "/removeprofanity",
        summary: "Remove this scope's profanity setting",
    },
    CommandHelp {
        usage: "/profanitystatus",
        summary: "Show the profanity setting in effect here",
    },
];

pub struct ProfanityModule {
    ctx: Arc<ModuleContext>,
    import_file: Option<PathBuf>,
    dictionary: RwLock<Vec<Matcher>>,
}

impl ProfanityModule {
    pub fn new(ctx: Arc<ModuleContext>, import_file: Option<PathBuf>) -> Self {
        Self {
            ctx,
            import_file,
            dictionary: RwLock::new(Vec::new()),
        }
    }

    /// Import a word list: one entry per line, `re:` or `/…/` for regexes,
    /// `#` starts a comment. Returns how many new entries were stored.
    pub async fn import(&self, path: &Path) -> Result<usize, ModuleError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ModuleError::Init {
                module: STAGE.into(),
                reason: format!("reading {}: {e}", path.display()),
            })?;

        let mut added = 0;
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (pattern, is_regex) = parse_pattern_spec(line);
            if let Err(reason) = validate(&pattern, is_regex) {
                warn!(line = line_no + 1, %pattern, %reason, "Skipping invalid profanity entry");
                continue;
            }
            if self.ctx.store.add_profanity_word(&pattern, is_regex).await? {
                added += 1;
            }
        }
        info!(path = %path.display(), added, "Profanity word list imported");
        Ok(added)
    }

    /// Reload the in-memory dictionary from the store. Returns the entry count.
    pub async fn reload(&self) -> Result<usize, DatabaseError> {
        let words = self.ctx.store.list_profanity_words().await?;
        let mut compiled = Vec::with_capacity(words.len());
        for word in words {
            match Matcher::compile(&word.pattern, word.is_regex) {
                Ok(m) => compiled.push(m),
                Err(e) => {
                    warn!(id = word.id, pattern = %word.pattern, error = %e, "Skipping invalid profanity pattern");
                }
            }
        }
        let count = compiled.len();
        *self.dictionary.write().await = compiled;
        Ok(count)
    }

    async fn contains_profanity(&self, text: &str) -> bool {
        self.dictionary
            .read()
            .await
            .iter()
            .any(|m| m.is_match(text))
    }
}

#[async_trait]
impl ModerationModule for ProfanityModule {
    fn name(&self) -> ModuleName {
        ModuleName::Profanity
    }

    async fn init(&self) -> Result<(), ModuleError> {
        if let Some(path) = &self.import_file {
            self.import(path).await?;
        }
        let count = self.reload().await?;
        info!(entries = count, "Profanity dictionary loaded");
        Ok(())
    }

    async fn enabled(&self, chat_id: i64) -> Result<bool, ModuleError> {
        Ok(self.ctx.module_enabled(self.name(), chat_id).await?)
    }

    async fn on_message(&self, message: &mut MessageContext) -> Result<(), ModuleError> {
        if message.is_deleted() {
            return Ok(());
        }
        let Some(body) = message.message.body().map(str::to_owned) else {
            return Ok(());
        };
        let scope = message.scope();
        let user_id = message.message.sender_id;

        let Some(settings) = self.ctx.resolver.profanity_settings(scope).await? else {
            return Ok(());
        };
        if !settings.active {
            return Ok(());
        }
        if self.ctx.resolver.is_vip(scope, user_id).await? {
            debug!(%scope, user_id, "VIP exempt from profanity filter");
            return Ok(());
        }
        if !self.contains_profanity(&body).await {
            return Ok(());
        }

        info!(%scope, user_id, action = %settings.action, "Profanity matched");
        let warning = format!(
            "{}, please keep it civil.",
            message.message.sender_mention()
        );
        enforce(&self.ctx, message, STAGE, settings.action, &warning).await;

        let msg = &message.message;
        if let Err(e) = self
            .ctx
            .counters
            .log_violation(scope, user_id, msg.message_id, ViolationCode::Profanity, msg.sent_at)
            .await
        {
            warn!(module = STAGE, error = %e, "Failed to log violation");
        }
        Ok(())
    }

    fn commands(&self) -> &'static [CommandHelp] {
        COMMANDS
    }
}
