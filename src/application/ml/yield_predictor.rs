use super::bundle::ModelBundle;
use super::evaluation::EvaluationReport;
use super::regressor::{ModelKind, Regressor};
use super::stats::{mean, population_std_dev, quantile};
use crate::domain::errors::{BundleError, PredictionError};
use crate::domain::ml::dataset::{CropRecord, CropTable, FeatureSource};
use crate::domain::ml::encoder::FeatureVector;
use crate::domain::ml::feature_registry::Field;
use crate::domain::ml::prediction::{
    ConfidenceInterval, ConfidencePrediction, EncodingFallback, Prediction, PredictionRequest,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Serves predictions from a validated [`ModelBundle`].
///
/// Read-only once built; share it behind an `Arc`.
#[derive(Debug)]
pub struct YieldPredictor {
    bundle: ModelBundle,
    layout: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictedRow {
    pub record: CropRecord,
    pub prediction: Prediction,
}

/// Input rows with their predictions, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedTable {
    pub columns: Vec<String>,
    pub rows: Vec<PredictedRow>,
}

impl PredictedTable {
    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.prediction.value).collect()
    }

    pub fn fallback_count(&self) -> usize {
        self.rows.iter().map(|r| r.prediction.fallbacks.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_kind: ModelKind,
    pub model_name: String,
    pub feature_names: Vec<String>,
    pub n_features: usize,
    pub ensemble_size: Option<usize>,
    pub target: String,
    pub trained_at: DateTime<Utc>,
    pub metrics: Option<EvaluationReport>,
}

impl YieldPredictor {
    pub fn new(bundle: ModelBundle) -> Result<Self, BundleError> {
        let layout = bundle.feature_layout()?;
        Ok(Self { bundle, layout })
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    pub fn expects_season(&self) -> bool {
        self.layout.contains(&Field::Season)
    }

    pub fn predict(&self, request: &PredictionRequest) -> Result<Prediction, PredictionError> {
        let vector = self.vectorize(request, None)?;
        let value = self.predict_one(&vector.values)?;
        Ok(Prediction {
            value,
            fallbacks: vector.fallbacks,
        })
    }

    /// Predicts every row of `table`. Rows are vectorized in the bundle's
    /// feature order regardless of the table's header.
    pub fn predict_batch(&self, table: &CropTable) -> Result<PredictedTable, PredictionError> {
        let vectors = table
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| self.vectorize(record, Some(i + 1)))
            .collect::<Result<Vec<_>, _>>()?;

        let rows: Vec<Vec<f64>> = vectors.iter().map(|v| v.values.clone()).collect();
        let values = self.bundle.model.predict_rows(&rows)?;

        let rows = table
            .records
            .iter()
            .zip(vectors)
            .zip(values)
            .map(|((record, vector), value)| PredictedRow {
                record: record.clone(),
                prediction: Prediction {
                    value,
                    fallbacks: vector.fallbacks,
                },
            })
            .collect();
        debug!("Predicted {} rows", table.len());

        Ok(PredictedTable {
            columns: table.columns.clone(),
            rows,
        })
    }

    /// Prediction with an ensemble spread, using the first `ensemble_size`
    /// members (all when `None`). The interval spans the 2.5th and 97.5th
    /// percentiles of member predictions and always contains the mean.
    pub fn predict_with_confidence(
        &self,
        request: &PredictionRequest,
        ensemble_size: Option<usize>,
    ) -> Result<ConfidencePrediction, PredictionError> {
        let vector = self.vectorize(request, None)?;

        let Some(members) = self.bundle.model.member_predictions(&vector.values, ensemble_size) else {
            let prediction = self.predict_one(&vector.values)?;
            return Ok(ConfidencePrediction {
                prediction,
                point: prediction,
                std_dev: None,
                interval: None,
                members: 1,
                fallbacks: vector.fallbacks,
            });
        };
        let members = members?;

        let (Some(center), Some(std_dev), Some(lower), Some(upper)) = (
            mean(&members),
            population_std_dev(&members),
            quantile(&members, 0.025),
            quantile(&members, 0.975),
        ) else {
            return Err(PredictionError::Model("ensemble returned no predictions".to_string()));
        };
        let point = if Some(members.len()) == self.bundle.model.ensemble_size() {
            center
        } else {
            self.predict_one(&vector.values)?
        };

        Ok(ConfidencePrediction {
            prediction: center,
            point,
            std_dev: Some(std_dev),
            interval: Some(ConfidenceInterval {
                lower: lower.min(center),
                upper: upper.max(center),
            }),
            members: members.len(),
            fallbacks: vector.fallbacks,
        })
    }

    pub fn model_info(&self) -> ModelInfo {
        let model = &self.bundle.model;
        ModelInfo {
            model_kind: self.bundle.model_kind(),
            model_name: model.name().to_string(),
            feature_names: self.bundle.feature_names.clone(),
            n_features: model.n_features(),
            ensemble_size: model.ensemble_size(),
            target: self.bundle.target.clone(),
            trained_at: self.bundle.trained_at,
            metrics: self.bundle.metrics,
        }
    }

    fn vectorize<S>(&self, source: &S, row: Option<usize>) -> Result<FeatureVector, PredictionError>
    where
        S: FeatureSource + ?Sized,
    {
        let vector = self
            .bundle
            .encoder
            .vectorize(&self.layout, source)
            .map_err(|field| match row {
                Some(row) => PredictionError::invalid(field.column(), format!("missing value in row {}", row)),
                None => PredictionError::invalid(field.column(), "is required"),
            })?;
        log_fallbacks(&vector.fallbacks, row);
        Ok(vector)
    }

    fn predict_one(&self, values: &[f64]) -> Result<f64, PredictionError> {
        self.bundle
            .model
            .predict_rows(&[values.to_vec()])?
            .first()
            .copied()
            .ok_or_else(|| PredictionError::Model("No prediction returned".to_string()))
    }
}

fn log_fallbacks(fallbacks: &[EncodingFallback], row: Option<usize>) {
    for fallback in fallbacks {
        match row {
            Some(row) => warn!("Row {}: {}", row, fallback.describe()),
            None => warn!("{}", fallback.describe()),
        }
    }
}
