use super::classifier::{ClassificationReport, ForestClassifier};
use super::evaluation::EvaluationReport;
use super::regressor::{ModelKind, Regressor, YieldModel};
use crate::domain::errors::BundleError;
use crate::domain::ml::encoder::{FeatureEncoder, LabelEncoder};
use crate::domain::ml::feature_registry::Field;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Bumped whenever the serialized layout changes.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Fitted model, its encoders and the feature order it was fit with.
///
/// `feature_names` is the contract between training and serving: feature
/// vectors are always rebuilt in exactly this order.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: u32,
    pub model: YieldModel,
    pub encoder: FeatureEncoder,
    pub feature_names: Vec<String>,
    pub target: String,
    pub trained_at: DateTime<Utc>,
    #[serde(default)]
    pub metrics: Option<EvaluationReport>,
}

impl ModelBundle {
    pub fn new(
        model: YieldModel,
        encoder: FeatureEncoder,
        feature_names: Vec<String>,
        target: Field,
    ) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            model,
            encoder,
            feature_names,
            target: target.column().to_string(),
            trained_at: Utc::now(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: EvaluationReport) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn model_kind(&self) -> ModelKind {
        self.model.kind()
    }

    /// Resolves `feature_names` into fields, checking that serving code can
    /// rebuild every vector the model expects.
    pub fn feature_layout(&self) -> Result<Vec<Field>, BundleError> {
        resolve_layout(
            self.format_version,
            &self.feature_names,
            self.model.n_features(),
            &self.encoder,
        )
    }
}

/// Fitted crop classifier with its feature encoders and the encoder that
/// turns predicted class codes back into labels.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecommenderBundle {
    pub format_version: u32,
    pub model: ForestClassifier,
    pub encoder: FeatureEncoder,
    pub classes: LabelEncoder,
    pub feature_names: Vec<String>,
    pub target: String,
    pub trained_at: DateTime<Utc>,
    #[serde(default)]
    pub metrics: Option<ClassificationReport>,
}

impl RecommenderBundle {
    pub fn new(
        model: ForestClassifier,
        encoder: FeatureEncoder,
        classes: LabelEncoder,
        feature_names: Vec<String>,
        target: Field,
    ) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            model,
            encoder,
            classes,
            feature_names,
            target: target.column().to_string(),
            trained_at: Utc::now(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ClassificationReport) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Same checks as [`ModelBundle::feature_layout`], plus a usable class
    /// encoder for the target.
    pub fn feature_layout(&self) -> Result<Vec<Field>, BundleError> {
        let layout = resolve_layout(
            self.format_version,
            &self.feature_names,
            self.model.n_features(),
            &self.encoder,
        )?;
        if self.classes.is_empty() || !self.classes.is_well_formed() {
            return Err(BundleError::IncompatibleFeatures {
                reason: format!("class encoder for '{}' is empty or unsorted", self.target),
            });
        }
        Ok(layout)
    }
}

fn resolve_layout(
    format_version: u32,
    feature_names: &[String],
    n_features: usize,
    encoder: &FeatureEncoder,
) -> Result<Vec<Field>, BundleError> {
    if format_version != BUNDLE_FORMAT_VERSION {
        return Err(BundleError::UnsupportedVersion {
            found: format_version,
            expected: BUNDLE_FORMAT_VERSION,
        });
    }
    if feature_names.len() != n_features {
        return Err(BundleError::IncompatibleFeatures {
            reason: format!(
                "{} feature names for a model fit on {} features",
                feature_names.len(),
                n_features
            ),
        });
    }

    let mut seen = HashSet::new();
    let mut layout = Vec::with_capacity(feature_names.len());
    for name in feature_names {
        let field =
            Field::from_feature_name(name).ok_or_else(|| BundleError::IncompatibleFeatures {
                reason: format!("unknown feature '{}'", name),
            })?;
        if !seen.insert(field) {
            return Err(BundleError::IncompatibleFeatures {
                reason: format!("duplicate feature '{}'", name),
            });
        }
        if let Some(set) = field.category_set() {
            match encoder.encoder(set) {
                Some(e) if e.is_well_formed() => {}
                Some(_) => {
                    return Err(BundleError::IncompatibleFeatures {
                        reason: format!("encoder '{}' is not sorted", set),
                    });
                }
                None => {
                    return Err(BundleError::IncompatibleFeatures {
                        reason: format!("no encoder for feature '{}'", name),
                    });
                }
            }
        }
        layout.push(field);
    }
    Ok(layout)
}
