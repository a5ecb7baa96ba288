//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// World name reported to clients
    pub world_name: String,
    /// Allowed client origins for CORS (comma-separated), any origin when unset
    pub client_origin: Option<String>,

    /// HS256 secret for session tokens; anonymous play only when unset
    pub jwt_secret: Option<String>,

    /// Supabase project URL for kill records
    pub supabase_url: Option<String>,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: Option<String>,

    /// Number of bots kept in the arena
    pub bot_count: usize,
    /// Let two sessions share a display name
    pub allow_duplicate_names: bool,
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

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            world_name: env::var("WORLD_NAME").unwrap_or_else(|_| "global".to_string()),
            client_origin: optional("CLIENT_ORIGIN"),

            jwt_secret: optional("JWT_SECRET"),

            supabase_url: optional("SUPABASE_URL"),
            supabase_service_role_key: optional("SUPABASE_SERVICE_ROLE_KEY"),

            bot_count: match optional("BOT_COUNT") {
                Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid("BOT_COUNT"))?,
                None => 3,
            },
            allow_duplicate_names: match optional("ALLOW_DUPLICATE_NAMES") {
                Some(raw) => parse_flag(&raw).ok_or(ConfigError::Invalid("ALLOW_DUPLICATE_NAMES"))?,
                None => false,
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            world_name: "global".to_string(),
            client_origin: None,
            jwt_secret: None,
            supabase_url: None,
            supabase_service_role_key: None,
            bot_count: 3,
            allow_duplicate_names: false,
        }
    }
}

/// Non-empty environment variable
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
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
