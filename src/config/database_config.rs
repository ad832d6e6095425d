//! Marketplace database configuration parsing from environment variables.

use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct DatabaseEnvConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseEnvConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/farmcom.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseEnvConfig {
    pub fn from_env() -> Result<Self> {
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .context("Failed to parse DATABASE_MAX_CONNECTIONS")?;
        if max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }

        Ok(Self {
            url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/farmcom.db".to_string()),
            max_connections,
            busy_timeout_ms: env::var("DATABASE_BUSY_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse::<u64>()
                .context("Failed to parse DATABASE_BUSY_TIMEOUT_MS")?,
        })
    }
}
