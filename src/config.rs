use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub cors_extra_origins: Vec<String>,

    /// Shared secret of the identity provider that issues access tokens.
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,

    pub invite_code_attempts: u32,
    pub feed_capacity: usize,
    pub join_rate_limit: u32,
    pub join_rate_window_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{} must be set", key));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host: or_default("HOST", "0.0.0.0"),
            port: parse_var("PORT", &or_default("PORT", "8080"))?,
            frontend_url: or_default("FRONTEND_URL", "http://localhost:3000"),
            cors_extra_origins: lookup("CORS_EXTRA_ORIGINS")
                .map(|extra| {
                    extra
                        .split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            jwt_secret: required("JWT_SECRET")?,
            jwt_audience: lookup("JWT_AUDIENCE").filter(|s| !s.is_empty()),

            invite_code_attempts: parse_var(
                "INVITE_CODE_ATTEMPTS",
                &or_default("INVITE_CODE_ATTEMPTS", "5"),
            )?,
            feed_capacity: parse_var("FEED_CAPACITY", &or_default("FEED_CAPACITY", "256"))?,
            join_rate_limit: parse_var("JOIN_RATE_LIMIT", &or_default("JOIN_RATE_LIMIT", "10"))?,
            join_rate_window_secs: parse_var(
                "JOIN_RATE_WINDOW_SECS",
                &or_default("JOIN_RATE_WINDOW_SECS", "600"),
            )?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{} must be a number, got '{}'", key, raw))
}
