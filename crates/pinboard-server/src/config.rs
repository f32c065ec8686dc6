use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use pinboard_api::EdgeConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub db_path: PathBuf,
    pub cors_origin: Option<String>,
    pub edge: EdgeConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("PINBOARD_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&lookup, "PINBOARD_PORT", 8080)?;
        let bind_address = format!("{}:{}", host, port)
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("PINBOARD_HOST".into(), e.to_string()))?;

        let db_path = lookup("PINBOARD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("pinboard.db"));

        let defaults = EdgeConfig::default();
        let ttl_hours: i64 = parse_or(
            &lookup,
            "PINBOARD_SESSION_TTL_HOURS",
            defaults.session_ttl.num_hours(),
        )?;
        if ttl_hours <= 0 {
            return Err(ConfigError::InvalidValue(
                "PINBOARD_SESSION_TTL_HOURS".into(),
                "must be positive".into(),
            ));
        }
        let write_timeout_ms: u64 = parse_or(
            &lookup,
            "PINBOARD_WRITE_TIMEOUT_MS",
            defaults.write_timeout.as_millis() as u64,
        )?;

        let edge = EdgeConfig {
            session_ttl: chrono::Duration::hours(ttl_hours),
            tls: parse_bool_or(&lookup, "PINBOARD_TLS", defaults.tls)?,
            csrf: parse_bool_or(&lookup, "PINBOARD_CSRF", defaults.csrf)?,
            write_timeout: Duration::from_millis(write_timeout_ms),
            report_threshold: parse_or(
                &lookup,
                "PINBOARD_REPORT_THRESHOLD",
                defaults.report_threshold,
            )?,
        };

        // Cross-site cookies need a named origin; a wildcard cannot carry credentials.
        let cors_origin = lookup("PINBOARD_CORS_ORIGIN").filter(|o| !o.is_empty());
        if edge.tls && cors_origin.is_none() {
            return Err(ConfigError::MissingVar("PINBOARD_CORS_ORIGIN".into()));
        }

        Ok(Self {
            bind_address,
            db_path,
            cors_origin,
            edge,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key.into(), e.to_string())),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue(
            key.into(),
            format!("'{}' is not a boolean", other),
        )),
    }
}
