use std::net::SocketAddr;
use std::str::FromStr;
use std::{env, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    // Exact string holders must present in `aud`
    pub audience: String,
    // Request binding expected in the signed claims
    pub verify_method: String,
    pub verify_path: String,
    // Challenge validity window (seconds)
    pub nonce_ttl_seconds: u64,
    // Symmetric tolerance applied to nbf/exp (seconds)
    pub clock_skew_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let audience = env::var("AUDIENCE").map_err(|_| ConfigError::Missing("AUDIENCE"))?;
        if audience.is_empty() {
            return Err(ConfigError::Invalid("AUDIENCE"));
        }

        let verify_method = env::var("VERIFY_METHOD").unwrap_or_else(|_| "POST".to_string());
        let verify_path = env::var("VERIFY_PATH").unwrap_or_else(|_| "/verify".to_string());

        let nonce_ttl_seconds = env::var("NONCE_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120);
        let clock_skew_seconds = env::var("CLOCK_SKEW_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120);

        Ok(Config {
            addr,
            app_env,
            audience,
            verify_method,
            verify_path,
            nonce_ttl_seconds,
            clock_skew_seconds,
        })
    }
}
