use rust_decimal::Decimal;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while saving or loading a model bundle
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Model bundle not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Incompatible model bundle at {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported bundle format v{found} (expected v{expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Incompatible bundle features: {reason}")]
    IncompatibleFeatures { reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize model bundle: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors returned by prediction calls
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Feature vector has {actual} values, model expects {expected}")]
    FeatureShape { expected: usize, actual: usize },

    #[error("Model failure: {0}")]
    Model(String),
}

impl PredictionError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors returned by the training pipeline
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("No usable rows left after cleaning ({original} rows loaded)")]
    NoUsableRows { original: usize },

    #[error("Column '{column}' is required but missing from the table")]
    MissingColumn { column: String },

    #[error("Target column '{column}' is not numeric; fit a classifier instead")]
    InvalidTarget { column: String },

    #[error("Target column '{column}' is categorical; fit a regressor instead")]
    NotCategorical { column: String },

    #[error("Target column '{column}' cannot also be a feature")]
    TargetIsFeature { column: String },

    #[error("Cross-validation needs at least 2 folds and {folds} rows, got {rows}")]
    NotEnoughRowsForFolds { folds: usize, rows: usize },

    #[error("Model fitting failed: {0}")]
    Model(String),
}

/// Errors related to marketplace listings, purchases and rentals
#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Item {item_id} not found")]
    ItemNotFound { item_id: i64 },

    #[error("Equipment {equipment_id} not found")]
    EquipmentNotFound { equipment_id: i64 },

    #[error("User {user_id} not found")]
    UserNotFound { user_id: i64 },

    #[error("User {user_id} does not own this listing")]
    NotOwner { user_id: i64 },

    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("Price {price} is not valid")]
    InvalidPrice { price: Decimal },

    #[error("Storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

impl MarketplaceError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }
}
