//! Training configuration parsing from environment variables.
//!
//! Command-line flags of the training binary take precedence over these.

use crate::application::ml::regressor::{ForestParameters, ModelKind};
use crate::application::ml::trainer::TrainerConfig;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct TrainingEnvConfig {
    pub model_kind: ModelKind,
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub test_size: f64,
    pub random_seed: u64,
}

impl Default for TrainingEnvConfig {
    fn default() -> Self {
        Self {
            model_kind: ModelKind::RandomForest,
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            test_size: 0.2,
            random_seed: 42,
        }
    }
}

impl TrainingEnvConfig {
    pub fn from_env() -> Result<Self> {
        let model_kind_str = env::var("MODEL_KIND").unwrap_or_else(|_| "random_forest".to_string());
        let model_kind = ModelKind::from_str(&model_kind_str)?;

        let max_depth = match env::var("MAX_DEPTH") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(raw.trim().parse::<u16>().context("Failed to parse MAX_DEPTH")?)
            }
            _ => None,
        };

        let test_size = Self::parse_f64("TEST_SIZE", 0.2)?;
        if !(0.0..1.0).contains(&test_size) {
            anyhow::bail!("TEST_SIZE must be in [0, 1), got {}", test_size);
        }

        Ok(Self {
            model_kind,
            n_trees: Self::parse_usize("N_TREES", 100)?,
            max_depth,
            min_samples_split: Self::parse_usize("MIN_SAMPLES_SPLIT", 2)?,
            test_size,
            random_seed: env::var("RANDOM_SEED")
                .unwrap_or_else(|_| "42".to_string())
                .parse::<u64>()
                .context("Failed to parse RANDOM_SEED")?,
        })
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            model_kind: self.model_kind,
            forest: ForestParameters {
                n_trees: self.n_trees,
                max_depth: self.max_depth,
                min_samples_split: self.min_samples_split,
                seed: self.random_seed,
            },
            test_fraction: self.test_size,
            seed: self.random_seed,
        }
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {}", key))
    }
}
