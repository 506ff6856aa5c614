//! Configuration management for Zebra Server

use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// CORS origins; `*` allows any origin
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

/// Which records a pull returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    /// The owner's entire dataset, tombstones included
    Full,
    /// Only records updated since the device's previous cursor
    Delta,
}

impl std::str::FromStr for PullMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(PullMode::Full),
            "delta" => Ok(PullMode::Delta),
            _ => Err(ConfigError::Invalid {
                key: "SYNC_PULL_MODE",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub pull_mode: PullMode,
    /// Subtracted from the delta cursor to absorb clock skew between instances
    pub delta_skew: Duration,
    pub timeout: Duration,
    pub max_batch_records: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            pull_mode: PullMode::Full,
            delta_skew: Duration::from_millis(2000),
            timeout: Duration::from_secs(30),
            max_batch_records: 1000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env::var("SERVER_PORT")
            .or_else(|_| env::var("PORT"))
            .unwrap_or_else(|_| "8080".to_string());

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", &port)?,
                allowed_origins: parse_origins(
                    &env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()),
                ),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./zebra.db".to_string()),
                max_connections: parse_var(
                    "DATABASE_MAX_CONNECTIONS",
                    &env::var("DATABASE_MAX_CONNECTIONS").unwrap_or_else(|_| "5".to_string()),
                )?,
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .ok_or(ConfigError::Missing("JWT_SECRET"))?,
            },
            sync: SyncConfig {
                pull_mode: env::var("SYNC_PULL_MODE")
                    .unwrap_or_else(|_| "full".to_string())
                    .parse()?,
                delta_skew: Duration::from_millis(parse_var(
                    "SYNC_DELTA_SKEW_MS",
                    &env::var("SYNC_DELTA_SKEW_MS").unwrap_or_else(|_| "2000".to_string()),
                )?),
                timeout: Duration::from_secs(parse_var(
                    "SYNC_TIMEOUT_SECS",
                    &env::var("SYNC_TIMEOUT_SECS").unwrap_or_else(|_| "30".to_string()),
                )?),
                max_batch_records: parse_var(
                    "SYNC_MAX_BATCH_RECORDS",
                    &env::var("SYNC_MAX_BATCH_RECORDS").unwrap_or_else(|_| "1000".to_string()),
                )?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_mode_parsing() {
        assert_eq!("full".parse::<PullMode>().unwrap(), PullMode::Full);
        assert_eq!(" Delta ".parse::<PullMode>().unwrap(), PullMode::Delta);
        assert!("partial".parse::<PullMode>().is_err());
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("https://a.example, https://b.example,,"),
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(parse_origins("*"), vec!["*"]);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        let err = parse_var::<u16>("SERVER_PORT", "eighty").unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
        assert_eq!(parse_var::<u16>("SERVER_PORT", " 9000 ").unwrap(), 9000);
    }

    #[test]
    fn test_auth_config_debug_redacts_secret() {
        let auth = AuthConfig {
            jwt_secret: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", auth).contains("hunter2"));
    }
}
