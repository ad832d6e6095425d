//! Regression models behind a common prediction interface.
//!
//! Fitting is delegated to smartcore. The forest is a bootstrap aggregate of
//! smartcore regression trees kept as explicit members, so callers can read
//! the per-tree spread for confidence intervals.

use crate::domain::errors::{PredictionError, TrainingError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{LinearRegression, LinearRegressionParameters};
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use std::fmt;
use std::str::FromStr;

type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type Linear = LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Interface for fitted regression models
pub trait Regressor: Send + Sync {
    /// Predict one value per row. Every row must have `n_features()` values.
    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, PredictionError>;

    /// Per-member predictions for one row, using at most `limit` members.
    /// `None` for models that are not ensembles.
    fn member_predictions(
        &self,
        _row: &[f64],
        _limit: Option<usize>,
    ) -> Option<Result<Vec<f64>, PredictionError>> {
        None
    }

    fn ensemble_size(&self) -> Option<usize> {
        None
    }

    fn n_features(&self) -> usize;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    RandomForest,
    LinearRegression,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::RandomForest => write!(f, "random_forest"),
            ModelKind::LinearRegression => write!(f, "linear_regression"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "random_forest" | "rf" | "forest" => Ok(ModelKind::RandomForest),
            "linear_regression" | "linear" => Ok(ModelKind::LinearRegression),
            _ => anyhow::bail!(
                "Invalid model kind: {}. Must be 'random_forest' or 'linear_regression'",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParameters {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParameters {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

pub(super) fn to_matrix(rows: &[Vec<f64>]) -> Result<DenseMatrix<f64>, String> {
    if rows.is_empty() {
        return Err("cannot build a matrix from zero rows".to_string());
    }
    DenseMatrix::from_2d_vec(&rows.to_vec()).map_err(|e| format!("Matrix creation failed: {}", e))
}

pub(super) fn check_shape(rows: &[Vec<f64>], expected: usize) -> Result<(), PredictionError> {
    match rows.iter().find(|r| r.len() != expected) {
        Some(row) => Err(PredictionError::FeatureShape {
            expected,
            actual: row.len(),
        }),
        None => Ok(()),
    }
}

pub(super) fn check_training_data<T>(x: &[Vec<f64>], y: &[T]) -> Result<usize, TrainingError> {
    if x.is_empty() {
        return Err(TrainingError::Model("no training rows".to_string()));
    }
    if x.len() != y.len() {
        return Err(TrainingError::Model(format!(
            "{} feature rows but {} targets",
            x.len(),
            y.len()
        )));
    }
    let n_features = x[0].len();
    if x.iter().any(|r| r.len() != n_features) {
        return Err(TrainingError::Model("ragged feature rows".to_string()));
    }
    Ok(n_features)
}

/// Bootstrap-aggregated regression trees.
///
/// Each tree sees a bootstrap sample but every split considers all
/// features; there is no per-split feature subsampling as in a classic
/// random forest. The trees are kept as explicit members so their spread
/// can be read back, which smartcore's `RandomForestRegressor` does not
/// expose.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForestRegressor {
    trees: Vec<Tree>,
    n_features: usize,
    parameters: ForestParameters,
}

impl ForestRegressor {
    /// Fits `n_trees` trees in parallel. Tree `i` draws its bootstrap sample
    /// from a generator seeded with `seed + i`, so the result does not depend
    /// on thread scheduling.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        parameters: ForestParameters,
    ) -> Result<Self, TrainingError> {
        let n_features = check_training_data(x, y)?;
        let n = x.len();

        let trees = (0..parameters.n_trees.max(1))
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(parameters.seed.wrapping_add(i as u64));
                let (xs, ys): (Vec<Vec<f64>>, Vec<f64>) = (0..n)
                    .map(|_| {
                        let j = rng.random_range(0..n);
                        (x[j].clone(), y[j])
                    })
                    .unzip();

                let matrix = to_matrix(&xs)?;
                let mut tree_params = DecisionTreeRegressorParameters::default()
                    .with_min_samples_split(parameters.min_samples_split);
                if let Some(depth) = parameters.max_depth {
                    tree_params = tree_params.with_max_depth(depth);
                }
                Tree::fit(&matrix, &ys, tree_params).map_err(|e| format!("Tree {}: {}", i, e))
            })
            .collect::<Result<Vec<_>, String>>()
            .map_err(TrainingError::Model)?;

        Ok(Self {
            trees,
            n_features,
            parameters,
        })
    }

    pub fn parameters(&self) -> &ForestParameters {
        &self.parameters
    }
}

impl Regressor for ForestRegressor {
    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, PredictionError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_shape(rows, self.n_features)?;
        let matrix = to_matrix(rows).map_err(PredictionError::Model)?;

        let mut sums = vec![0.0; rows.len()];
        for tree in &self.trees {
            let predictions = tree
                .predict(&matrix)
                .map_err(|e| PredictionError::Model(format!("Prediction failed: {}", e)))?;
            for (sum, p) in sums.iter_mut().zip(predictions) {
                *sum += p;
            }
        }
        let n = self.trees.len() as f64;
        Ok(sums.into_iter().map(|s| s / n).collect())
    }

    fn member_predictions(
        &self,
        row: &[f64],
        limit: Option<usize>,
    ) -> Option<Result<Vec<f64>, PredictionError>> {
        let rows = vec![row.to_vec()];
        let result = check_shape(&rows, self.n_features).and_then(|_| {
            let matrix = to_matrix(&rows).map_err(PredictionError::Model)?;
            let take = limit
                .filter(|&l| l > 0)
                .unwrap_or(self.trees.len())
                .min(self.trees.len());
            self.trees[..take]
                .iter()
                .map(|tree| {
                    tree.predict(&matrix)
                        .map_err(|e| PredictionError::Model(format!("Prediction failed: {}", e)))
                        .and_then(|p| {
                            p.first().copied().ok_or_else(|| {
                                PredictionError::Model("No prediction returned".to_string())
                            })
                        })
                })
                .collect()
        });
        Some(result)
    }

    fn ensemble_size(&self) -> Option<usize> {
        Some(self.trees.len())
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn name(&self) -> &str {
        "Bagged Regression Trees"
    }
}

/// Ordinary least squares (SVD solver).
#[derive(Debug, Serialize, Deserialize)]
pub struct LinearModel {
    model: Linear,
    n_features: usize,
}

impl LinearModel {
    pub fn fit(x: &[Vec<f64>], y: &[f64]) -> Result<Self, TrainingError> {
        let n_features = check_training_data(x, y)?;
        let matrix = to_matrix(x).map_err(TrainingError::Model)?;
        let model = Linear::fit(&matrix, &y.to_vec(), LinearRegressionParameters::default())
            .map_err(|e| TrainingError::Model(format!("Training error: {}", e)))?;
        Ok(Self { model, n_features })
    }
}

impl Regressor for LinearModel {
    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, PredictionError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_shape(rows, self.n_features)?;
        let matrix = to_matrix(rows).map_err(PredictionError::Model)?;
        self.model
            .predict(&matrix)
            .map_err(|e| PredictionError::Model(format!("Prediction failed: {}", e)))
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn name(&self) -> &str {
        "Linear Regression"
    }
}

/// Every model a bundle can carry.
#[derive(Debug, Serialize, Deserialize)]
pub enum YieldModel {
    RandomForest(ForestRegressor),
    LinearRegression(LinearModel),
}

impl YieldModel {
    pub fn fit(
        kind: ModelKind,
        parameters: ForestParameters,
        x: &[Vec<f64>],
        y: &[f64],
    ) -> Result<Self, TrainingError> {
        match kind {
            ModelKind::RandomForest => ForestRegressor::fit(x, y, parameters).map(Self::RandomForest),
            ModelKind::LinearRegression => LinearModel::fit(x, y).map(Self::LinearRegression),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            YieldModel::RandomForest(_) => ModelKind::RandomForest,
            YieldModel::LinearRegression(_) => ModelKind::LinearRegression,
        }
    }

    fn inner(&self) -> &dyn Regressor {
        match self {
            YieldModel::RandomForest(m) => m,
            YieldModel::LinearRegression(m) => m,
        }
    }
}

impl Regressor for YieldModel {
    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, PredictionError> {
        self.inner().predict_rows(rows)
    }

    fn member_predictions(
        &self,
        row: &[f64],
        limit: Option<usize>,
    ) -> Option<Result<Vec<f64>, PredictionError>> {
        self.inner().member_predictions(row, limit)
    }

    fn ensemble_size(&self) -> Option<usize> {
        self.inner().ensemble_size()
    }

    fn n_features(&self) -> usize {
        self.inner().n_features()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}
