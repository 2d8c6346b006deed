use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use chat_warden::commands::CommandHandler;
use chat_warden::config::BotConfig;
use chat_warden::modules::keyword_reactions::spawn_cache_sweeper;
use chat_warden::modules::{
    BannedWordsModule, KeywordReactionsModule, LimiterModule, ModuleContext, ModuleRegistry,
    ProfanityModule, StatisticsModule,
};
use chat_warden::pipeline::PipelineDispatcher;
use chat_warden::store::{LibSqlBackend, ModerationStore};
use chat_warden::transport::{ChatTransport, TelegramTransport};

/// Stderr logging, plus a daily rolling file when `log_dir` is set.
/// The returned guard must live as long as the process.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let registry = Registry::default().with(filter).with(console);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "chat-warden.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            registry.with(file).init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export TELEGRAM_BOT_TOKEN=123456:ABC...");
        std::process::exit(1);
    });
    let _log_guard = init_tracing(config.log_dir.as_deref());

    info!(version = env!("CARGO_PKG_VERSION"), "chat-warden starting");

    // ── Store ───────────────────────────────────────────────────────────
    let store: Arc<dyn ModerationStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );
    info!(path = %config.db_path.display(), "Database ready");

    // ── Transport ───────────────────────────────────────────────────────
    let telegram = Arc::new(TelegramTransport::new(
        config.bot_token.clone(),
        config.poll_timeout,
    ));
    telegram.health_check().await.context("Telegram token check")?;
    let transport: Arc<dyn ChatTransport> = telegram.clone();

    // ── Modules ─────────────────────────────────────────────────────────
    let ctx = Arc::new(ModuleContext::new(
        Arc::clone(&store),
        transport,
        config.utc_offset,
        config.default_modules.clone(),
    ));
    let reactions = Arc::new(KeywordReactionsModule::new(
        Arc::clone(&ctx),
        config.reaction_cache_ttl,
    ));

    let registry = Arc::new(ModuleRegistry::new());
    registry
        .register(Arc::new(StatisticsModule::new(Arc::clone(&ctx))))
        .await;
    registry
        .register(Arc::new(LimiterModule::new(Arc::clone(&ctx))))
        .await;
    registry
        .register(Arc::new(ProfanityModule::new(
            Arc::clone(&ctx),
            config.profanity_file.clone(),
        )))
        .await;
    registry
        .register(Arc::new(BannedWordsModule::new(Arc::clone(&ctx))))
        .await;
    registry.register(reactions.clone()).await;

    if let Err(e) = registry.init_all().await {
        error!(error = %e, "Module initialization failed");
        std::process::exit(1);
    }

    let sweep_every = config.reaction_cache_ttl.max(Duration::from_secs(1));
    let sweeper = spawn_cache_sweeper(Arc::clone(&reactions), sweep_every);

    let commands = Arc::new(CommandHandler::new(
        Arc::clone(&ctx),
        Arc::clone(&registry),
        reactions,
    ));
    let dispatcher = Arc::new(PipelineDispatcher::new(Arc::clone(&registry), commands));

    // ── Run ─────────────────────────────────────────────────────────────
    let stream = telegram.start();
    info!(
        modules = registry.len().await,
        defaults = ?config.default_modules,
        "Listening for messages"
    );

    tokio::select! {
        _ = dispatcher.run(stream) => {
            warn!("Update stream closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    sweeper.abort();
    if let Err(e) = registry.shutdown_all().await {
        warn!(error = %e, "Module shutdown reported errors");
    }
    info!("chat-warden stopped");
    Ok(())
}
