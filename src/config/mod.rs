//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::board::DEFAULT_GRAVITY_INTERVAL;
use crate::game::room::ROOM_CAPACITY;
use crate::game::RoomSettings;
use crate::util::time::DEFAULT_TICK_RATE_HZ;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma separated
    pub client_origin: String,

    /// Room simulation rate
    pub tick_rate_hz: u32,
    /// Time between forced gravity steps
    pub gravity_interval: Duration,
    /// Inbound WebSocket messages allowed per connection per second
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let tick_rate_hz = parse_or("TICK_RATE_HZ", DEFAULT_TICK_RATE_HZ)?;
        if tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("TICK_RATE_HZ"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),

            tick_rate_hz,
            gravity_interval: Duration::from_millis(parse_or(
                "GRAVITY_INTERVAL_MS",
                DEFAULT_GRAVITY_INTERVAL.as_millis() as u64,
            )?),
            input_rate_limit: parse_or("INPUT_RATE_LIMIT", 60)?,
        })
    }

    /// Settings handed to every new room
    pub fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            tick_rate_hz: self.tick_rate_hz,
            gravity_interval: self.gravity_interval,
            capacity: ROOM_CAPACITY,
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_settings_follow_config() {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().expect("valid addr"),
            log_level: "debug".to_string(),
            client_origin: "http://localhost:5173".to_string(),
            tick_rate_hz: 30,
            gravity_interval: Duration::from_millis(500),
            input_rate_limit: 20,
        };

        let settings = config.room_settings();

        assert_eq!(settings.tick_rate_hz, 30);
        assert_eq!(settings.gravity_interval, Duration::from_millis(500));
        assert_eq!(settings.capacity, ROOM_CAPACITY);
    }

    #[test]
    fn unparsable_value_is_reported_by_name() {
        env::set_var("BLOCK_DUEL_TEST_NUMBER", "sixty");
        let err = parse_or::<u32>("BLOCK_DUEL_TEST_NUMBER", 60).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("BLOCK_DUEL_TEST_NUMBER")));
        env::remove_var("BLOCK_DUEL_TEST_NUMBER");

        assert_eq!(parse_or::<u32>("BLOCK_DUEL_TEST_MISSING", 7).ok(), Some(7));
    }
}
