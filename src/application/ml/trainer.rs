//! Training pipeline: clean, encode, split, fit, evaluate, package.

use super::bundle::{ModelBundle, RecommenderBundle};
use super::classifier::{ClassificationMetrics, ClassificationReport, ForestClassifier};
use super::evaluation::{CrossValidationReport, EvaluationReport, RegressionMetrics};
use super::preprocessing::{CleaningSummary, clean_table};
use super::regressor::{ForestParameters, ModelKind, Regressor, YieldModel};
use super::stats::{mean, population_std_dev};
use crate::domain::errors::TrainingError;
use crate::domain::ml::dataset::{CropRecord, CropTable, FeatureSource};
use crate::domain::ml::encoder::{FeatureEncoder, LabelEncoder};
use crate::domain::ml::feature_registry::{CRITICAL_COLUMNS, Field, feature_names};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainerConfig {
    pub model_kind: ModelKind,
    pub forest: ForestParameters,
    /// Share of cleaned rows held out for evaluation, in `[0, 1)`.
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            model_kind: ModelKind::RandomForest,
            forest: ForestParameters::default(),
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug)]
pub struct TrainingOutcome {
    pub bundle: ModelBundle,
    pub report: EvaluationReport,
    pub cleaning: CleaningSummary,
    pub train_rows: usize,
    pub test_rows: usize,
}

#[derive(Debug)]
pub struct ClassifierOutcome {
    pub bundle: RecommenderBundle,
    pub report: ClassificationReport,
    pub cleaning: CleaningSummary,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Encoded design matrix for one training run.
struct Prepared<T> {
    encoder: FeatureEncoder,
    x: Vec<Vec<f64>>,
    y: Vec<T>,
    cleaning: CleaningSummary,
}

/// Cleaned rows that carry every requested feature.
struct Cleaned {
    records: Vec<CropRecord>,
    encoder: FeatureEncoder,
    cleaning: CleaningSummary,
}

pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Fits a model predicting `target` from `features` (in that order) and
    /// packages it with its encoders.
    pub fn fit(
        &self,
        table: &CropTable,
        target: Field,
        features: &[Field],
    ) -> Result<TrainingOutcome, TrainingError> {
        let prepared = self.prepare(table, target, features)?;
        let (train_idx, test_idx) = split_indices(prepared.x.len(), self.config.test_fraction, self.config.seed);
        info!(
            "Split {} rows into {} train / {} test (seed {})",
            prepared.x.len(),
            train_idx.len(),
            test_idx.len(),
            self.config.seed
        );

        let (x_train, y_train) = select(&prepared.x, &prepared.y, &train_idx);
        let (x_test, y_test) = select(&prepared.x, &prepared.y, &test_idx);

        info!(
            "Training {} on {} rows x {} features...",
            self.config.model_kind,
            x_train.len(),
            features.len()
        );
        let model = YieldModel::fit(self.config.model_kind, self.config.forest, &x_train, &y_train)?;

        let report = EvaluationReport {
            train: evaluate(&model, &x_train, &y_train)?,
            test: evaluate(&model, &x_test, &y_test)?,
        };
        match (&report.train, &report.test) {
            (Some(train), Some(test)) => info!(
                "Train R²={:.4} MAE={:.4} RMSE={:.4} | Test R²={:.4} MAE={:.4} RMSE={:.4}",
                train.r2, train.mae, train.rmse, test.r2, test.mae, test.rmse
            ),
            (Some(train), None) => info!(
                "Train R²={:.4} MAE={:.4} RMSE={:.4} | no test partition",
                train.r2, train.mae, train.rmse
            ),
            _ => warn!("No metrics available for this training run"),
        }

        let bundle = ModelBundle::new(model, prepared.encoder, feature_names(features), target)
            .with_metrics(report);

        Ok(TrainingOutcome {
            bundle,
            report,
            cleaning: prepared.cleaning,
            train_rows: train_idx.len(),
            test_rows: test_idx.len(),
        })
    }

    /// Fits a random forest classifier predicting the categorical `target`
    /// (typically `Crop`) from `features`. The target's labels are encoded
    /// in sorted order and stored in the bundle for decoding.
    pub fn fit_classifier(
        &self,
        table: &CropTable,
        target: Field,
        features: &[Field],
    ) -> Result<ClassifierOutcome, TrainingError> {
        let (prepared, classes) = self.prepare_labels(table, target, features)?;
        let (train_idx, test_idx) = split_indices(prepared.x.len(), self.config.test_fraction, self.config.seed);
        let (x_train, y_train) = select(&prepared.x, &prepared.y, &train_idx);
        let (x_test, y_test) = select(&prepared.x, &prepared.y, &test_idx);

        info!(
            "Training classifier for {} ({} classes) on {} rows x {} features...",
            target,
            classes.len(),
            x_train.len(),
            features.len()
        );
        let model = ForestClassifier::fit(&x_train, &y_train, self.config.forest)?;

        let report = ClassificationReport {
            train: evaluate_classifier(&model, &x_train, &y_train)?,
            test: evaluate_classifier(&model, &x_test, &y_test)?,
        };
        match (&report.train, &report.test) {
            (Some(train), Some(test)) => info!(
                "Train accuracy={:.4} | Test accuracy={:.4} ({} rows)",
                train.accuracy, test.accuracy, test.samples
            ),
            (Some(train), None) => {
                info!("Train accuracy={:.4} | no test partition", train.accuracy)
            }
            _ => warn!("No metrics available for this training run"),
        }

        let bundle = RecommenderBundle::new(
            model,
            prepared.encoder,
            classes,
            feature_names(features),
            target,
        )
        .with_metrics(report);

        Ok(ClassifierOutcome {
            bundle,
            report,
            cleaning: prepared.cleaning,
            train_rows: train_idx.len(),
            test_rows: test_idx.len(),
        })
    }

    /// K-fold cross-validation on contiguous folds of the cleaned table.
    /// Reports R² per fold with its mean and population standard deviation.
    pub fn cross_validate(
        &self,
        table: &CropTable,
        target: Field,
        features: &[Field],
        folds: usize,
    ) -> Result<CrossValidationReport, TrainingError> {
        let prepared = self.prepare(table, target, features)?;
        let n = prepared.x.len();
        if folds < 2 || n < folds {
            return Err(TrainingError::NotEnoughRowsForFolds { folds, rows: n });
        }

        let mut fold_scores = Vec::with_capacity(folds);
        for fold in 0..folds {
            let start = fold * n / folds;
            let end = (fold + 1) * n / folds;
            let test_idx: Vec<usize> = (start..end).collect();
            let train_idx: Vec<usize> = (0..start).chain(end..n).collect();

            let (x_train, y_train) = select(&prepared.x, &prepared.y, &train_idx);
            let (x_test, y_test) = select(&prepared.x, &prepared.y, &test_idx);
            let model = YieldModel::fit(self.config.model_kind, self.config.forest, &x_train, &y_train)?;
            let score = evaluate(&model, &x_test, &y_test)?
                .map(|m| m.r2)
                .unwrap_or(0.0);
            debug!("Fold {}/{}: R²={:.4}", fold + 1, folds, score);
            fold_scores.push(score);
        }

        let mean_r2 = mean(&fold_scores).unwrap_or(0.0);
        let std_r2 = population_std_dev(&fold_scores).unwrap_or(0.0);
        info!("Cross-validation R²: {:.4} (+/- {:.4}) over {} folds", mean_r2, std_r2, folds);

        Ok(CrossValidationReport {
            fold_scores,
            mean_r2,
            std_r2,
        })
    }

    fn prepare(
        &self,
        table: &CropTable,
        target: Field,
        features: &[Field],
    ) -> Result<Prepared<f64>, TrainingError> {
        if target.is_categorical() {
            return Err(TrainingError::InvalidTarget {
                column: target.column().to_string(),
            });
        }

        let mut critical = CRITICAL_COLUMNS.to_vec();
        if !critical.contains(&target) {
            critical.push(target);
        }
        let Cleaned {
            records,
            encoder,
            cleaning,
        } = clean_and_encode(table, &critical, features)?;

        let mut x = Vec::with_capacity(records.len());
        let mut y = Vec::with_capacity(records.len());
        for record in &records {
            let (Ok(vector), Some(value)) = (encoder.vectorize(features, record), record.numeric(target))
            else {
                continue;
            };
            x.push(vector.values);
            y.push(value);
        }

        Ok(Prepared {
            encoder,
            x,
            y,
            cleaning,
        })
    }

    /// Classification counterpart of `prepare`: only the target is
    /// critical, and its labels become class codes.
    fn prepare_labels(
        &self,
        table: &CropTable,
        target: Field,
        features: &[Field],
    ) -> Result<(Prepared<u32>, LabelEncoder), TrainingError> {
        if !target.is_categorical() {
            return Err(TrainingError::NotCategorical {
                column: target.column().to_string(),
            });
        }
        if features.contains(&target) {
            return Err(TrainingError::TargetIsFeature {
                column: target.column().to_string(),
            });
        }

        let Cleaned {
            records,
            encoder,
            cleaning,
        } = clean_and_encode(table, &[target], features)?;
        let classes = LabelEncoder::fit(records.iter().filter_map(|r| r.categorical(target)));

        let mut x = Vec::with_capacity(records.len());
        let mut y = Vec::with_capacity(records.len());
        for record in &records {
            let (Ok(vector), Some(label)) = (encoder.vectorize(features, record), record.categorical(target))
            else {
                continue;
            };
            x.push(vector.values);
            y.push(classes.encode(label).code());
        }

        Ok((
            Prepared {
                encoder,
                x,
                y,
                cleaning,
            },
            classes,
        ))
    }
}

fn clean_and_encode(
    table: &CropTable,
    critical: &[Field],
    features: &[Field],
) -> Result<Cleaned, TrainingError> {
    for field in critical.iter().chain(features) {
        if !table.has_field(*field) {
            return Err(TrainingError::MissingColumn {
                column: field.column().to_string(),
            });
        }
    }

    let (records, cleaning) = clean_table(table, critical);
    let records: Vec<CropRecord> = records
        .into_iter()
        .filter(|r| features.iter().all(|f| r.has_value(*f)))
        .collect();
    if records.is_empty() {
        return Err(TrainingError::NoUsableRows {
            original: table.len(),
        });
    }

    let encoder = FeatureEncoder::fit(features.iter().filter_map(|f| {
        f.category_set().map(|set| {
            let labels: Vec<&str> = records.iter().filter_map(|r| r.categorical(*f)).collect();
            (set, labels)
        })
    }));

    Ok(Cleaned {
        records,
        encoder,
        cleaning,
    })
}

/// Shuffled train/test indices. The test partition takes
/// `ceil(fraction * n)` rows but always leaves at least one for training.
pub fn split_indices(n: usize, fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
    let n_test = ((fraction * n as f64).ceil() as usize).min(n.saturating_sub(1));
    let train = indices.split_off(n_test);
    (train, indices)
}

fn select<T: Copy>(x: &[Vec<f64>], y: &[T], indices: &[usize]) -> (Vec<Vec<f64>>, Vec<T>) {
    indices.iter().map(|&i| (x[i].clone(), y[i])).unzip()
}

fn evaluate(
    model: &YieldModel,
    x: &[Vec<f64>],
    y: &[f64],
) -> Result<Option<RegressionMetrics>, TrainingError> {
    if x.is_empty() {
        return Ok(None);
    }
    let predicted = model
        .predict_rows(x)
        .map_err(|e| TrainingError::Model(e.to_string()))?;
    Ok(RegressionMetrics::compute(y, &predicted))
}

fn evaluate_classifier(
    model: &ForestClassifier,
    x: &[Vec<f64>],
    y: &[u32],
) -> Result<Option<ClassificationMetrics>, TrainingError> {
    if x.is_empty() {
        return Ok(None);
    }
    let predicted = model
        .predict_codes(x)
        .map_err(|e| TrainingError::Model(e.to_string()))?;
    Ok(ClassificationMetrics::compute(y, &predicted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::feature_registry::default_features;

    fn table(rows: usize) -> CropTable {
        let crops = ["Rice", "Wheat", "Maize"];
        let records = (0..rows)
            .map(|i| {
                let area = 10.0 + (i % 10) as f64;
                CropRecord {
                    crop: Some(crops[i % 3].to_string()),
                    state: Some(if i % 2 == 0 { "Assam" } else { "Punjab" }.to_string()),
                    area: Some(area),
                    production: Some(area * 3.0 + (i % 4) as f64),
                    annual_rainfall: Some(1000.0 + (i % 7) as f64 * 10.0),
                    fertilizer: Some(50.0 + (i % 5) as f64),
                    pesticide: Some(1.0 + (i % 4) as f64 * 0.1),
                    yield_value: Some(1.0 + (i % 3) as f64 * 0.5),
                    ..Default::default()
                }
            })
            .collect();
        CropTable::with_fields(
            &[
                Field::Crop,
                Field::State,
                Field::Area,
                Field::Production,
                Field::AnnualRainfall,
                Field::Fertilizer,
                Field::Pesticide,
                Field::Yield,
            ],
            records,
        )
    }

    fn quick_config() -> TrainerConfig {
        TrainerConfig {
            forest: ForestParameters {
                n_trees: 5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_split_is_deterministic_and_keeps_training_rows() {
        let (train_a, test_a) = split_indices(10, 0.25, 42);
        let (train_b, test_b) = split_indices(10, 0.25, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(test_a.len(), 3);
        assert_eq!(train_a.len(), 7);

        let (train, test) = split_indices(1, 0.5, 1);
        assert_eq!((train.len(), test.len()), (1, 0));
        let (train, test) = split_indices(4, 1.0, 1);
        assert_eq!((train.len(), test.len()), (1, 3));
    }

    #[test]
    fn test_fit_produces_bundle_in_feature_order() {
        let features = default_features(false);
        let outcome = Trainer::new(quick_config())
            .fit(&table(60), Field::Yield, &features)
            .unwrap();

        assert_eq!(outcome.bundle.feature_names, feature_names(&features));
        assert_eq!(outcome.bundle.feature_layout().unwrap(), features);
        assert_eq!(outcome.train_rows + outcome.test_rows, outcome.cleaning.cleaned_rows);
        assert!(outcome.report.train.is_some());
        assert!(outcome.report.test.is_some());
        assert_eq!(outcome.bundle.metrics, Some(outcome.report));
    }

    #[test]
    fn test_missing_requested_column_is_reported() {
        let features = default_features(true);
        let err = Trainer::new(quick_config())
            .fit(&table(10), Field::Yield, &features)
            .unwrap_err();
        assert!(matches!(err, TrainingError::MissingColumn { column } if column == "Season"));
    }

    #[test]
    fn test_regressor_rejects_categorical_target() {
        let err = Trainer::new(quick_config())
            .fit(&table(10), Field::Crop, &[Field::Area])
            .unwrap_err();
        assert!(matches!(err, TrainingError::InvalidTarget { .. }));

        let err = Trainer::new(quick_config())
            .fit_classifier(&table(10), Field::Yield, &[Field::Area])
            .unwrap_err();
        assert!(matches!(err, TrainingError::NotCategorical { column } if column == "Yield"));
    }

    #[test]
    fn test_classifier_decodes_crop_classes() {
        let features = [Field::State, Field::Area, Field::Production];
        let outcome = Trainer::new(quick_config())
            .fit_classifier(&table(60), Field::Crop, &features)
            .unwrap();

        assert_eq!(outcome.bundle.classes.classes(), ["Maize", "Rice", "Wheat"]);
        assert_eq!(outcome.bundle.target, "Crop");
        assert_eq!(outcome.bundle.feature_layout().unwrap(), features);
        assert!(outcome.bundle.encoder.encoder("crop").is_none());
        assert_eq!(outcome.train_rows + outcome.test_rows, outcome.cleaning.cleaned_rows);
        let train = outcome.report.train.unwrap();
        assert!((0.0..=1.0).contains(&train.accuracy));
        assert_eq!(outcome.bundle.metrics, Some(outcome.report));
    }

    #[test]
    fn test_classifier_target_cannot_be_a_feature() {
        let err = Trainer::new(quick_config())
            .fit_classifier(&table(20), Field::Crop, &[Field::Crop, Field::Area])
            .unwrap_err();
        assert!(matches!(err, TrainingError::TargetIsFeature { .. }));
    }

    #[test]
    fn test_no_rows_after_cleaning() {
        let mut t = table(5);
        for record in &mut t.records {
            record.state = None;
        }
        let err = Trainer::new(quick_config())
            .fit(&t, Field::Yield, &default_features(false))
            .unwrap_err();
        assert!(matches!(err, TrainingError::NoUsableRows { original: 5 }));
    }

    #[test]
    fn test_cross_validation_reports_each_fold() {
        let config = TrainerConfig {
            model_kind: ModelKind::LinearRegression,
            ..quick_config()
        };
        let report = Trainer::new(config)
            .cross_validate(&table(50), Field::Yield, &default_features(false), 5)
            .unwrap();
        assert_eq!(report.fold_scores.len(), 5);
        assert!(report.std_r2 >= 0.0);

        let err = Trainer::new(config)
            .cross_validate(&table(50), Field::Yield, &default_features(false), 1)
            .unwrap_err();
        assert!(matches!(err, TrainingError::NotEnoughRowsForFolds { folds: 1, .. }));
    }
}
