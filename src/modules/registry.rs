//! Module registry: owns module instances and runs them in pipeline order.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::ModuleError;
use crate::message::MessageContext;
use crate::modules::{CommandHelp, ModerationModule, ModuleName};

/// Registry of pipeline modules, keyed (and therefore ordered) by name.
///
/// Registration takes the write lock; dispatch holds the read lock for the whole
/// pipeline run, so modules can't be swapped mid-message.
pub struct ModuleRegistry {
    modules: RwLock<BTreeMap<ModuleName, Arc<dyn ModerationModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a module. A module already registered under the same name is replaced.
    pub async fn register(&self, module: Arc<dyn ModerationModule>) {
        let name = module.name();
        let mut modules = self.modules.write().await;
        if modules.insert(name, module).is_some() {
            warn!(module = %name, "Module re-registered, replacing previous instance");
        } else {
            info!(module = %name, "Registered module");
        }
    }

    pub async fn get(&self, name: ModuleName) -> Option<Arc<dyn ModerationModule>> {
        self.modules.read().await.get(&name).cloned()
    }

    /// Registered names in pipeline order.
    pub async fn names(&self) -> Vec<ModuleName> {
        self.modules.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.modules.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.modules.read().await.is_empty()
    }

    /// Commands of every registered module, in pipeline order.
    pub async fn commands(&self) -> Vec<(ModuleName, &'static [CommandHelp])> {
        self.modules
            .read()
            .await
            .iter()
            .map(|(name, module)| (*name, module.commands()))
            .collect()
    }

    /// Initialize every module in order, stopping at the first failure.
    pub async fn init_all(&self) -> Result<(), ModuleError> {
        let modules = self.modules.read().await;
        for (name, module) in modules.iter() {
            module.init().await.inspect_err(|e| {
                error!(module = %name, error = %e, "Module init failed");
            })?;
            debug!(module = %name, "Module initialized");
        }
        info!(count = modules.len(), "All modules initialized");
        Ok(())
    }

    /// Run every module enabled for the message's chat, in order.
    ///
    /// Errors (including from the enablement check) are logged and never stop the
    /// remaining modules.
    pub async fn on_message(&self, ctx: &mut MessageContext) {
        let chat_id = ctx.message.chat_id;
        let modules = self.modules.read().await;

        for (name, module) in modules.iter() {
            match module.enabled(chat_id).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(module = %name, chat_id, error = %e, "Enablement check failed, skipping module");
                    continue;
                }
            }

            if let Err(e) = module.on_message(ctx).await {
                warn!(
                    module = %name,
                    chat_id,
                    message_id = ctx.message.message_id,
                    error = %e,
                    "Module failed, continuing pipeline"
                );
            }
        }
    }

    /// Shut every module down, even after failures. Returns the last error seen.
    pub async fn shutdown_all(&self) -> Result<(), ModuleError> {
        let modules = self.modules.read().await;
        let mut last_err = None;
        for (name, module) in modules.iter() {
            if let Err(e) = module.shutdown().await {
                warn!(module = %name, error = %e, "Module shutdown failed");
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::message::InboundMessage;

    /// Appends its name to a shared journal; optionally fails.
    struct Probe {
        name: ModuleName,
        journal: Arc<Mutex<Vec<String>>>,
        enabled: bool,
        fail_message: bool,
        fail_init: bool,
        fail_shutdown: bool,
    }

    impl Probe {
        fn new(name: ModuleName, journal: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                journal: Arc::clone(journal),
                enabled: true,
                fail_message: false,
                fail_init: false,
                fail_shutdown: false,
            }
        }

        fn log(&self, event: &str) {
            self.journal.lock().unwrap().push(format!("{event}:{}", self.name));
        }
    }

    #[async_trait]
    impl ModerationModule for Probe {
        fn name(&self) -> ModuleName {
            self.name
        }

        async fn init(&self) -> Result<(), ModuleError> {
            self.log("init");
            if self.fail_init {
                return Err(ModuleError::Init {
                    module: self.name.to_string(),
                    reason: "boom".into(),
                });
            }
            Ok(())
        }

        async fn enabled(&self, _chat_id: i64) -> Result<bool, ModuleError> {
            Ok(self.enabled)
        }

        async fn on_message(&self, _ctx: &mut MessageContext) -> Result<(), ModuleError> {
            self.log("msg");
            if self.fail_message {
                return Err(ModuleError::Database(crate::error::DatabaseError::Query(
                    "down".into(),
                )));
            }
            Ok(())
        }

        fn commands(&self) -> &'static [CommandHelp] {
            &[]
        }

        async fn shutdown(&self) -> Result<(), ModuleError> {
            self.log("shutdown");
            if self.fail_shutdown {
                return Err(ModuleError::Shutdown {
                    module: self.name.to_string(),
                    reason: "stuck".into(),
                });
            }
            Ok(())
        }
    }

    fn message() -> MessageContext {
        MessageContext::new(InboundMessage::text(-1, 2, 3, "hello"))
    }

    #[tokio::test]
    async fn dispatches_in_pipeline_order_regardless_of_registration() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let registry = ModuleRegistry::new();
        for name in [
            ModuleName::KeywordReactions,
            ModuleName::Profanity,
            ModuleName::Statistics,
            ModuleName::BannedWords,
            ModuleName::Limiter,
        ] {
            registry.register(Arc::new(Probe::new(name, &journal))).await;
        }

        registry.on_message(&mut message()).await;
        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "msg:statistics",
                "msg:limiter",
                "msg:profanity",
                "msg:banned_words",
                "msg:keyword_reactions"
            ]
        );
    }

    #[tokio::test]
    async fn failing_module_does_not_block_siblings() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let registry = ModuleRegistry::new();
        let mut limiter = Probe::new(ModuleName::Limiter, &journal);
        limiter.fail_message = true;
        registry.register(Arc::new(limiter)).await;
        registry
            .register(Arc::new(Probe::new(ModuleName::BannedWords, &journal)))
            .await;

        registry.on_message(&mut message()).await;
        assert_eq!(*journal.lock().unwrap(), vec!["msg:limiter", "msg:banned_words"]);
    }

    #[tokio::test]
    async fn disabled_modules_are_skipped() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let registry = ModuleRegistry::new();
        let mut stats = Probe::new(ModuleName::Statistics, &journal);
        stats.enabled = false;
        registry.register(Arc::new(stats)).await;
        registry
            .register(Arc::new(Probe::new(ModuleName::Limiter, &journal)))
            .await;

        registry.on_message(&mut message()).await;
        assert_eq!(*journal.lock().unwrap(), vec!["msg:limiter"]);
    }

    #[tokio::test]
    async fn init_all_fails_fast() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let registry = ModuleRegistry::new();
        let mut limiter = Probe::new(ModuleName::Limiter, &journal);
        limiter.fail_init = true;
        registry
            .register(Arc::new(Probe::new(ModuleName::Statistics, &journal)))
            .await;
        registry.register(Arc::new(limiter)).await;
        registry
            .register(Arc::new(Probe::new(ModuleName::Profanity, &journal)))
            .await;

        assert!(registry.init_all().await.is_err());
        assert_eq!(*journal.lock().unwrap(), vec!["init:statistics", "init:limiter"]);
    }

    #[tokio::test]
    async fn shutdown_all_is_best_effort_and_returns_last_error() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let registry = ModuleRegistry::new();
        for name in [ModuleName::Statistics, ModuleName::Limiter, ModuleName::Profanity] {
            let mut probe = Probe::new(name, &journal);
            probe.fail_shutdown = name != ModuleName::Profanity;
            registry.register(Arc::new(probe)).await;
        }

        let err = registry.shutdown_all().await.unwrap_err();
        assert!(err.to_string().contains("limiter"));
        assert_eq!(journal.lock().unwrap().len(), 3);
    }
}
