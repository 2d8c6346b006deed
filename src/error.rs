//! Error types for chat-warden.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Chat transport errors (delivery, deletion, admin lookup).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to delete message {message_id} in chat {chat_id}: {reason}")]
    DeleteFailed {
        chat_id: i64,
        message_id: i64,
        reason: String,
    },

    #[error("Admin lookup failed for chat {chat_id}: {reason}")]
    AdminLookup { chat_id: i64, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Errors raised by pipeline modules.
///
/// The registry logs these and keeps dispatching to sibling modules.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("Module {module} failed to initialize: {reason}")]
    Init { module: String, reason: String },

    #[error("Module {module} failed to shut down: {reason}")]
    Shutdown { module: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors raised by the command surface. Every variant maps to a user-facing reply.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Only chat administrators can use this command.")]
    Unauthorized,

    #[error("This command only works in group chats.")]
    GroupOnly,

    #[error("Usage: {usage}")]
    InvalidArguments { usage: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unknown action '{0}'. Use delete, warn or delete_warn.")]
    InvalidAction(String),

    #[error("Unknown content type '{0}'.")]
    UnknownContentType(String),

    #[error("Unknown module '{0}'.")]
    UnknownModule(String),

    #[error("Reply to a user's message to use this command.")]
    ReplyRequired,

    #[error("Nothing found for {0}.")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl CommandError {
    /// Whether this error is the caller's fault (reply with the message) rather than an
    /// infrastructure failure (reply with a generic apology).
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Database(_) | Self::Transport(_))
    }

    pub(crate) fn usage(usage: &str) -> Self {
        Self::InvalidArguments {
            usage: usage.to_string(),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
