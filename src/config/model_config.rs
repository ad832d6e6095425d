//! Model serving configuration parsing from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ModelEnvConfig {
    pub model_path: PathBuf,
    /// Crop recommender bundle, written when training on a categorical target.
    pub recommender_path: PathBuf,
    /// Abort startup when the bundle cannot be loaded. When false the
    /// prediction service starts unloaded and answers `ModelNotLoaded`.
    pub model_required: bool,
    /// Ensemble members consulted for confidence intervals (all when unset).
    pub confidence_ensemble_size: Option<usize>,
}

impl Default for ModelEnvConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yield_model.json"),
            recommender_path: PathBuf::from("models/crop_recommender.json"),
            model_required: true,
            confidence_ensemble_size: None,
        }
    }
}

impl ModelEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let confidence_ensemble_size = match env::var("CONFIDENCE_ENSEMBLE_SIZE") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse::<usize>()
                    .context("Failed to parse CONFIDENCE_ENSEMBLE_SIZE")?,
            ),
            _ => None,
        };

        Ok(Self {
            model_path: env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            recommender_path: env::var("RECOMMENDER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.recommender_path),
            model_required: env::var("MODEL_REQUIRED")
                .unwrap_or_else(|_| "true".to_string())
                .parse::<bool>()
                .unwrap_or(true),
            confidence_ensemble_size,
        })
    }
}
