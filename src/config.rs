//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::modules::ModuleName;

/// Default database location.
pub const DEFAULT_DB_PATH: &str = "./data/chat-warden.db";

/// Bot configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token.
    pub bot_token: SecretString,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Offset that defines the "local calendar date" for daily counters.
    pub utc_offset: FixedOffset,
    /// How long a chat's keyword reactions stay cached.
    pub reaction_cache_ttl: Duration,
    /// Optional profanity word list imported on startup.
    pub profanity_file: Option<PathBuf>,
    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout: Duration,
    /// Modules treated as enabled in chats that never toggled them.
    pub default_modules: Vec<ModuleName>,
    /// Directory for rolling log files (stderr only when unset).
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let db_path = lookup("WARDEN_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let offset_minutes: i32 = parse_or(&lookup, "WARDEN_UTC_OFFSET_MINUTES", 0)?;
        let utc_offset =
            FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| ConfigError::InvalidValue {
                key: "WARDEN_UTC_OFFSET_MINUTES".into(),
                message: format!("{offset_minutes} is outside +/-24h"),
            })?;

        let reaction_cache_ttl =
            Duration::from_secs(parse_or(&lookup, "WARDEN_REACTION_CACHE_TTL_SECS", 300)?);
        let poll_timeout = Duration::from_secs(parse_or(&lookup, "WARDEN_POLL_TIMEOUT_SECS", 30)?);

        let profanity_file = lookup("WARDEN_PROFANITY_FILE").map(PathBuf::from);
        let log_dir = lookup("WARDEN_LOG_DIR").map(PathBuf::from);

        let mut default_modules = Vec::new();
        for name in lookup("WARDEN_DEFAULT_MODULES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let module = name.parse().map_err(|_| ConfigError::InvalidValue {
                key: "WARDEN_DEFAULT_MODULES".into(),
                message: format!("unknown module '{name}'"),
            })?;
            default_modules.push(module);
        }

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            db_path,
            utc_offset,
            reaction_cache_ttl,
            profanity_file,
            poll_timeout,
            default_modules,
            log_dir,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_applied() {
        let config = BotConfig::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "123:ABC")])).unwrap();
        assert_eq!(config.bot_token.expose_secret(), "123:ABC");
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.utc_offset.local_minus_utc(), 0);
        assert_eq!(config.reaction_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.poll_timeout, Duration::from_secs(30));
        assert!(config.default_modules.is_empty());
        assert!(config.profanity_file.is_none());
    }

    #[test]
    fn missing_token_rejected() {
        let err = BotConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn parses_offset_and_modules() {
        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("WARDEN_UTC_OFFSET_MINUTES", "180"),
            ("WARDEN_DEFAULT_MODULES", "statistics, limiter"),
        ]))
        .unwrap();
        assert_eq!(config.utc_offset.local_minus_utc(), 180 * 60);
        assert_eq!(
            config.default_modules,
            vec![ModuleName::Statistics, ModuleName::Limiter]
        );
    }

    #[test]
    fn invalid_number_rejected() {
        let err = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("WARDEN_POLL_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "WARDEN_POLL_TIMEOUT_SECS"));
    }

    #[test]
    fn unknown_default_module_rejected() {
        let err = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("WARDEN_DEFAULT_MODULES", "statistics,karma"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
