use chrono::Duration;
use db::services::otp::OtpPolicy;
use std::env;
use std::str::FromStr;
use thiserror::Error;

const MAX_TTL_SECS: i64 = 24 * 60 * 60;
const MAX_RATE_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Which `OtpStore` backend the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub policy: OtpPolicy,
    /// Seconds between expiry sweeps; zero disables the sweeper.
    pub sweep_interval_secs: u64,
    pub log_codes: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = parse_or(&lookup, "OTP_STORE", StoreBackend::Postgres)?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let ttl = seconds_within(&lookup, "OTP_TTL_SECS", 300, MAX_TTL_SECS)?;
        let rate_window =
            seconds_within(&lookup, "OTP_RATE_WINDOW_SECS", 3600, MAX_RATE_WINDOW_SECS)?;
        let max_per_window: i64 = parse_or(&lookup, "OTP_MAX_PER_WINDOW", 3)?;
        if max_per_window <= 0 {
            return Err(ConfigError::Invalid {
                name: "OTP_MAX_PER_WINDOW",
                value: max_per_window.to_string(),
            });
        }

        Ok(Self {
            port: parse_or(&lookup, "PORT", 3001)?,
            store,
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            policy: OtpPolicy {
                ttl,
                rate_window,
                max_per_window,
            },
            sweep_interval_secs: parse_or(&lookup, "OTP_SWEEP_INTERVAL_SECS", 300)?,
            log_codes: parse_or(&lookup, "OTP_LOG_CODES", false)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Parses a positive number of seconds no larger than `max`.
fn seconds_within<F>(
    lookup: &F,
    name: &'static str,
    default: i64,
    max: i64,
) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: i64 = parse_or(lookup, name, default)?;
    if !(1..=max).contains(&secs) {
        return Err(ConfigError::Invalid {
            name,
            value: secs.to_string(),
        });
    }
    Duration::try_seconds(secs).ok_or(ConfigError::Invalid {
        name,
        value: secs.to_string(),
    })
}
