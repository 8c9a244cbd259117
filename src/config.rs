//! Process configuration read from the environment at startup.

use std::env;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;
use tracing::warn;

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub project_name: String,
    pub bind_addr: String,
    pub api_prefix: String,
    pub secret_key: String,
    pub access_token_ttl: Duration,
    pub invite_ttl: Duration,
    pub invite_link_base: String,
    pub password_hash_rounds: u32,
    /// Empty means any origin is allowed.
    pub cors_origins: Vec<String>,
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_name: "Lunch Buddy".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            api_prefix: "/api/v1".to_string(),
            secret_key: DEV_SECRET.to_string(),
            access_token_ttl: Duration::minutes(30),
            invite_ttl: Duration::hours(24),
            invite_link_base: "lunchbuddy://group/join".to_string(),
            password_hash_rounds: 100_000,
            cors_origins: Vec::new(),
            mongodb_uri: None,
            mongodb_database: "OpenSplit".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let secret_key = match var("SECRET_KEY") {
            Some(secret) => secret,
            None if cfg!(debug_assertions) => {
                warn!("SECRET_KEY not set; using insecure dev default");
                defaults.secret_key
            }
            None => return Err(ConfigError::Missing { name: "SECRET_KEY" }),
        };

        Ok(Self {
            project_name: var("PROJECT_NAME").unwrap_or(defaults.project_name),
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            api_prefix: var("API_V1_STR").unwrap_or(defaults.api_prefix),
            secret_key,
            access_token_ttl: parsed::<i64>(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                var("ACCESS_TOKEN_EXPIRE_MINUTES"),
            )?
            .map_or(defaults.access_token_ttl, Duration::minutes),
            invite_ttl: parsed::<i64>("INVITE_EXPIRE_HOURS", var("INVITE_EXPIRE_HOURS"))?
                .map_or(defaults.invite_ttl, Duration::hours),
            invite_link_base: var("INVITE_LINK_BASE").unwrap_or(defaults.invite_link_base),
            password_hash_rounds: parsed("PASSWORD_HASH_ROUNDS", var("PASSWORD_HASH_ROUNDS"))?
                .unwrap_or(defaults.password_hash_rounds),
            cors_origins: match var("BACKEND_CORS_ORIGINS") {
                Some(raw) => parse_origins(&raw)?,
                None => defaults.cors_origins,
            },
            mongodb_uri: var("MONGODB_URI"),
            mongodb_database: var("MONGODB_DATABASE").unwrap_or(defaults.mongodb_database),
        })
    }
}

fn parsed<T: FromStr>(name: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value })
    })
    .transpose()
}

/// Accepts either `a,b,c` or a JSON array of strings.
fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str(raw).map_err(|_| ConfigError::Invalid {
            name: "BACKEND_CORS_ORIGINS",
            value: raw.to_string(),
        });
    }
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect())
}
