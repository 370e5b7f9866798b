use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use social_db::DbConfig;

/// Placeholder JWT secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub db: DbConfig,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub invite_ttl: chrono::Duration,
    pub notify_webhook: Option<String>,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("db_path", &self.db_path)
            .field("db", &self.db)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("invite_ttl", &self.invite_ttl)
            .field("notify_webhook", &self.notify_webhook)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("SOCIAL_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("SOCIAL_JWT_SECRET is unset or still a placeholder");
        }

        let host = get("SOCIAL_HOST", "0.0.0.0");
        let port: u16 = parse(&lookup, "SOCIAL_PORT", 8080)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let defaults = DbConfig::default();
        let db = DbConfig {
            max_open: parse(&lookup, "SOCIAL_DB_MAX_OPEN", defaults.max_open)?,
            max_idle: parse(&lookup, "SOCIAL_DB_MAX_IDLE", defaults.max_idle)?,
            idle_timeout: Duration::from_secs(
                60 * parse(&lookup, "SOCIAL_DB_IDLE_TIMEOUT_MINS", 15u64)?,
            ),
            acquire_timeout: Duration::from_secs(parse(
                &lookup,
                "SOCIAL_DB_ACQUIRE_TIMEOUT_SECS",
                30u64,
            )?),
            query_timeout: Duration::from_secs(parse(&lookup, "SOCIAL_QUERY_TIMEOUT_SECS", 180u64)?),
            ..defaults
        };
        if db.max_open == 0 {
            bail!("SOCIAL_DB_MAX_OPEN must be at least 1");
        }

        Ok(Self {
            addr,
            db_path: get("SOCIAL_DB_PATH", "social.db").into(),
            db,
            jwt_secret,
            token_ttl: chrono::Duration::hours(parse(&lookup, "SOCIAL_TOKEN_TTL_HOURS", 72i64)?),
            invite_ttl: chrono::Duration::hours(parse(&lookup, "SOCIAL_INVITE_TTL_HOURS", 72i64)?),
            notify_webhook: lookup("SOCIAL_NOTIFY_WEBHOOK").filter(|url| !url.is_empty()),
            request_timeout: Duration::from_secs(parse(
                &lookup,
                "SOCIAL_REQUEST_TIMEOUT_SECS",
                60u64,
            )?),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let c = config(&[("SOCIAL_JWT_SECRET", "a-real-secret")]).unwrap();
        assert_eq!(c.addr.port(), 8080);
        assert_eq!(c.db_path, PathBuf::from("social.db"));
        assert_eq!(c.db.max_open, 10);
        assert_eq!(c.db.idle_timeout, Duration::from_secs(15 * 60));
        assert_eq!(c.invite_ttl, chrono::Duration::hours(72));
        assert!(c.notify_webhook.is_none());
    }

    #[test]
    fn placeholder_or_missing_secret_is_refused() {
        assert!(config(&[]).is_err());
        assert!(config(&[("SOCIAL_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let err = config(&[("SOCIAL_JWT_SECRET", "k2"), ("SOCIAL_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("SOCIAL_PORT"));
    }

    #[test]
    fn secret_is_not_printed() {
        let c = config(&[("SOCIAL_JWT_SECRET", "hunter2-hunter2")]).unwrap();
        assert!(!format!("{:?}", c).contains("hunter2"));
    }
}
