use chrono::Duration;
use std::env;
use std::str::FromStr;

use crate::error::Error;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub listen_addr: String,
    pub payment_rail: RailConfig,
    pub document_store_base: String,
    pub policy: Policy,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RailConfig {
    pub base_url: String,
    pub api_key: String,
    pub max_attempts: u32,
}

/// Time windows that drive bid expiry, invite expiry and escrow auto-release.
#[derive(Clone, Debug)]
pub struct Policy {
    pub bid_ttl: Duration,
    pub invite_ttl: Duration,
    pub auto_release_after: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            bid_ttl: Duration::hours(72),
            invite_ttl: Duration::days(7),
            auto_release_after: Duration::days(7),
        }
    }
}

impl Config {
    fn get_env(key: &str) -> Result<String, Error> {
        Ok(env::var(key)?)
    }

    fn get_env_or<T: FromStr>(key: &str, default: T) -> Result<T, Error> {
        match env::var(key) {
            Ok(value) => value.parse().map_err(|_| Error::config_error(key)),
            Err(env::VarError::NotPresent) => Ok(default),
            Err(err) => Err(err.into()),
        }
    }

    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();

        let policy = Policy {
            bid_ttl: Duration::hours(Self::get_env_or("BID_TTL_HOURS", 72)?),
            invite_ttl: Duration::days(Self::get_env_or("INVITE_TTL_DAYS", 7)?),
            auto_release_after: Duration::days(Self::get_env_or("AUTO_RELEASE_AFTER_DAYS", 7)?),
        };

        Ok(Config {
            database_url: Self::get_env("DATABASE_URL")?,
            database_max_connections: Self::get_env_or("DATABASE_MAX_CONNECTIONS", 5)?,
            listen_addr: Self::get_env_or("LISTEN_ADDR", "127.0.0.1:3000".to_string())?,
            payment_rail: RailConfig {
                base_url: Self::get_env("PAYMENT_RAIL_BASE")?,
                api_key: Self::get_env("PAYMENT_RAIL_API_KEY")?,
                max_attempts: Self::get_env_or("RAIL_MAX_ATTEMPTS", 3)?,
            },
            document_store_base: Self::get_env("DOCUMENT_STORE_BASE")?,
            policy,
            sweep_interval_secs: Self::get_env_or("SWEEP_INTERVAL_SECS", 60)?,
        })
    }
}
