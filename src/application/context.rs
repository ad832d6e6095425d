//! Application startup as a typestate.
//!
//! `AppContext<Uninitialized>` holds only configuration. Loading the model
//! yields `AppContext<ModelLoaded>`, connecting the marketplace database
//! yields `AppContext<Ready>`. Services are only reachable from the states
//! that own them, so nothing can predict before the model step ran or
//! trade before the schema exists.

use crate::application::marketplace::MarketplaceService;
use crate::application::ml::prediction_service::PredictionService;
use crate::application::ml::yield_predictor::YieldPredictor;
use crate::config::Config;
use crate::infrastructure::persistence::{Database, SqliteMarketplaceStore, load_bundle};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Uninitialized;

pub struct ModelLoaded {
    predictions: PredictionService,
}

pub struct Ready {
    predictions: PredictionService,
    marketplace: MarketplaceService,
    database: Database,
}

pub struct AppContext<S> {
    config: Config,
    state: S,
}

impl<S> AppContext<S> {
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl AppContext<Uninitialized> {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Uninitialized,
        }
    }

    /// Loads the bundle at `MODEL_PATH`. A failure aborts startup when
    /// `MODEL_REQUIRED` is set; otherwise predictions answer
    /// `ModelNotLoaded` until restart.
    pub fn load_model(self) -> Result<AppContext<ModelLoaded>> {
        let path = self.config.model.model_path.clone();
        let loaded = load_bundle(&path).and_then(YieldPredictor::new);

        let predictions = match loaded {
            Ok(predictor) => {
                info!(
                    "Model ready: {} with {} features",
                    predictor.bundle().model_kind(),
                    predictor.bundle().feature_names.len()
                );
                PredictionService::new(
                    Arc::new(predictor),
                    self.config.model.confidence_ensemble_size,
                )
            }
            Err(e) if self.config.model.model_required => {
                return Err(e).with_context(|| format!("Failed to load model from {:?}", path));
            }
            Err(e) => {
                warn!("Serving without a model: {}", e);
                PredictionService::unloaded()
            }
        };

        Ok(AppContext {
            config: self.config,
            state: ModelLoaded { predictions },
        })
    }

    /// Skips the model step for tools that only use the marketplace.
    pub fn without_model(self) -> AppContext<ModelLoaded> {
        AppContext {
            config: self.config,
            state: ModelLoaded {
                predictions: PredictionService::unloaded(),
            },
        }
    }
}

impl AppContext<ModelLoaded> {
    pub fn predictions(&self) -> &PredictionService {
        &self.state.predictions
    }

    pub async fn connect(self) -> Result<AppContext<Ready>> {
        info!("Initializing Database at {}", self.config.database.url);
        let database = Database::connect(&self.config.database)
            .await
            .context("Failed to initialize database")?;

        let store = Arc::new(SqliteMarketplaceStore::new(database.clone()));
        let marketplace = MarketplaceService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
        );

        Ok(AppContext {
            config: self.config,
            state: Ready {
                predictions: self.state.predictions,
                marketplace,
                database,
            },
        })
    }
}

impl AppContext<Ready> {
    pub fn predictions(&self) -> &PredictionService {
        &self.state.predictions
    }

    pub fn marketplace(&self) -> &MarketplaceService {
        &self.state.marketplace
    }

    pub fn database(&self) -> &Database {
        &self.state.database
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseEnvConfig, ModelEnvConfig, TrainingEnvConfig};
    use crate::domain::errors::PredictionError;
    use crate::domain::marketplace::ListingFilter;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path, model_required: bool) -> Config {
        Config {
            model: ModelEnvConfig {
                model_path: dir.join("missing.json"),
                recommender_path: dir.join("recommender.json"),
                model_required,
                confidence_ensemble_size: None,
            },
            database: DatabaseEnvConfig {
                url: format!("sqlite://{}", dir.join("farmcom.db").display()),
                ..Default::default()
            },
            training: TrainingEnvConfig::default(),
        }
    }

    #[test]
    fn test_missing_model_aborts_when_required() {
        let dir = tempdir().unwrap();
        let result = AppContext::new(config(dir.path(), true)).load_model();
        let err = result.err().expect("startup should fail");
        assert!(format!("{:#}", err).contains("not found"));
    }

    #[tokio::test]
    async fn test_optional_model_starts_degraded() {
        let dir = tempdir().unwrap();
        let ctx = AppContext::new(config(dir.path(), false)).load_model().unwrap();
        assert!(!ctx.predictions().is_loaded());

        let ctx = ctx.connect().await.unwrap();
        assert!(matches!(
            ctx.predictions().model_info(),
            Err(PredictionError::ModelNotLoaded)
        ));
        let listings = ctx
            .marketplace()
            .available_listings(&ListingFilter::default())
            .await
            .unwrap();
        assert!(listings.is_empty());
    }
}
