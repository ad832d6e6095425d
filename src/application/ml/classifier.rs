//! Classification model for categorical targets, used to recommend a crop
//! from the same encoded features the yield models read.
//!
//! Unlike the bagged regression trees, this is smartcore's own random
//! forest, including per-split feature subsampling. Targets are class codes
//! from a fitted [`LabelEncoder`](crate::domain::ml::encoder::LabelEncoder).

use super::regressor::{ForestParameters, check_shape, check_training_data, to_matrix};
use crate::domain::errors::{PredictionError, TrainingError};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

type Forest = RandomForestClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ForestClassifier {
    forest: Forest,
    n_features: usize,
    parameters: ForestParameters,
}

impl ForestClassifier {
    pub fn fit(x: &[Vec<f64>], y: &[u32], parameters: ForestParameters) -> Result<Self, TrainingError> {
        let n_features = check_training_data(x, y)?;
        if n_features == 0 {
            return Err(TrainingError::Model("no feature columns".to_string()));
        }
        let matrix = to_matrix(x).map_err(TrainingError::Model)?;

        let n_trees = u16::try_from(parameters.n_trees).unwrap_or(u16::MAX).max(1);
        let mut forest_params = RandomForestClassifierParameters::default()
            .with_n_trees(n_trees)
            .with_min_samples_split(parameters.min_samples_split)
            .with_seed(parameters.seed);
        if let Some(depth) = parameters.max_depth {
            forest_params = forest_params.with_max_depth(depth);
        }

        let forest = Forest::fit(&matrix, &y.to_vec(), forest_params)
            .map_err(|e| TrainingError::Model(format!("Training error: {}", e)))?;
        Ok(Self {
            forest,
            n_features,
            parameters,
        })
    }

    /// Majority-vote class code for each row.
    pub fn predict_codes(&self, rows: &[Vec<f64>]) -> Result<Vec<u32>, PredictionError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_shape(rows, self.n_features)?;
        let matrix = to_matrix(rows).map_err(PredictionError::Model)?;
        self.forest
            .predict(&matrix)
            .map_err(|e| PredictionError::Model(format!("Prediction failed: {}", e)))
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn parameters(&self) -> &ForestParameters {
        &self.parameters
    }

    pub fn name(&self) -> &str {
        "Random Forest Classifier"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    /// Share of rows whose predicted class matches, in `[0, 1]`.
    pub accuracy: f64,
    pub samples: usize,
}

impl ClassificationMetrics {
    /// `None` for empty or mismatched inputs.
    pub fn compute(actual: &[u32], predicted: &[u32]) -> Option<Self> {
        if actual.is_empty() || actual.len() != predicted.len() {
            return None;
        }
        let correct = actual.iter().zip(predicted).filter(|(a, p)| a == p).count();
        Some(Self {
            accuracy: correct as f64 / actual.len() as f64,
            samples: actual.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub train: Option<ClassificationMetrics>,
    pub test: Option<ClassificationMetrics>,
}
