//! Persistence layer: libSQL-backed storage for moderation policy and counters.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::ModerationStore;
