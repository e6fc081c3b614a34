use std::env;
use std::net::SocketAddr;

use chrono::Duration;

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub session_ttl: Duration,
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://todos.db".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            session_ttl: Duration::hours(336),
            secure_cookies: false,
        }
    }
}

impl Config {
    /// Reads settings from the environment, falling back to defaults for anything unset.
    pub fn new_from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let database_url = env::var("DATABASE_URL").unwrap_or(defaults.database_url);

        let bind_addr = match env::var("BIND_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| AppError::Config(format!("BIND_ADDR {:?}: {}", raw, e)))?,
            Err(_) => defaults.bind_addr,
        };

        let session_ttl = match env::var("SESSION_TTL_HOURS") {
            Ok(raw) => {
                let hours: i64 = raw
                    .parse()
                    .map_err(|e| AppError::Config(format!("SESSION_TTL_HOURS {:?}: {}", raw, e)))?;
                if hours <= 0 {
                    return Err(AppError::Config(
                        "SESSION_TTL_HOURS must be positive".to_string(),
                    ));
                }
                Duration::try_hours(hours)
                    .ok_or_else(|| AppError::Config("SESSION_TTL_HOURS out of range".to_string()))?
            }
            Err(_) => defaults.session_ttl,
        };

        let secure_cookies = match env::var("SESSION_COOKIE_SECURE") {
            Ok(raw) => parse_bool(&raw)
                .ok_or_else(|| AppError::Config(format!("SESSION_COOKIE_SECURE {:?}", raw)))?,
            Err(_) => defaults.secure_cookies,
        };

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl,
            secure_cookies,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
