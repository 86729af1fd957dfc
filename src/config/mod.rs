//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::game::TickCadence;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Directory holding the client bundle
    pub static_dir: PathBuf,

    /// How the tick loop paces itself
    pub tick_cadence: TickCadence,
    /// Ticks a projectile lives before `endBullet`
    pub projectile_max_ticks: u32,
    /// Depth of the outbound broadcast channel, in batches
    pub outbound_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // PORT wins over SERVER_ADDR, as on most hosting platforms
        let server_addr = if let Some(port) = lookup("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string())
        };

        let tick_cadence = match lookup("TICK_MODE").as_deref() {
            None | Some("per_player") => TickCadence::PerPlayer {
                per_player: Duration::from_millis(parse_or(&lookup, "TICK_PER_PLAYER_MS", 10u64)?),
            },
            Some("fixed") => {
                let ticks_per_second: u32 = parse_or(&lookup, "TICK_RATE", 60)?;
                if ticks_per_second == 0 {
                    return Err(ConfigError::Invalid("TICK_RATE"));
                }
                TickCadence::Fixed { ticks_per_second }
            }
            Some(_) => return Err(ConfigError::Invalid("TICK_MODE")),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),

            tick_cadence,
            projectile_max_ticks: parse_or(&lookup, "PROJECTILE_MAX_TICKS", 300)?,
            outbound_capacity: parse_or(&lookup, "OUTBOUND_CAPACITY", 1024)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
