use std::env;

use thiserror::Error;
use tracing::Level;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Process settings, read from the environment (and `.env`, when present).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub bind_address: String,
    pub database_pool_size: u32,
    pub log_level: Level,
}

impl Settings {
    pub fn from_env() -> Result<Settings, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Settings, ConfigError> {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let bind_address = lookup("BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let database_pool_size = match lookup("DATABASE_POOL_SIZE") {
            Some(value) => match value.parse::<u32>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "DATABASE_POOL_SIZE",
                        value,
                    })
                }
            },
            None => 10,
        };
        let log_level = match lookup("LOG_LEVEL") {
            Some(value) => value.parse::<Level>().map_err(|_| ConfigError::Invalid {
                name: "LOG_LEVEL",
                value,
            })?,
            None => Level::INFO,
        };
        Ok(Settings {
            database_url,
            bind_address,
            database_pool_size,
            log_level,
        })
    }
}
