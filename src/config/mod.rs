//! Configuration module for agrodata.
//!
//! Structured configuration loaded from environment variables, organized by
//! concern: model serving, marketplace database and training.

mod database_config;
mod model_config;
mod training_config;

pub use database_config::DatabaseEnvConfig;
pub use model_config::ModelEnvConfig;
pub use training_config::TrainingEnvConfig;

use anyhow::{Context, Result};

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub model: ModelEnvConfig,
    pub database: DatabaseEnvConfig,
    pub training: TrainingEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let model = ModelEnvConfig::from_env().context("Failed to load model config")?;
        let database = DatabaseEnvConfig::from_env().context("Failed to load database config")?;
        let training = TrainingEnvConfig::from_env().context("Failed to load training config")?;

        Ok(Self {
            model,
            database,
            training,
        })
    }
}
