use super::bundle::RecommenderBundle;
use crate::domain::errors::{BundleError, PredictionError};
use crate::domain::ml::dataset::{CropTable, FeatureSource};
use crate::domain::ml::encoder::FeatureVector;
use crate::domain::ml::feature_registry::Field;
use crate::domain::ml::prediction::EncodingFallback;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Recommends a label for the bundle's target (usually a crop) from a
/// validated [`RecommenderBundle`]. Read-only once built.
#[derive(Debug)]
pub struct CropRecommender {
    bundle: RecommenderBundle,
    layout: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub label: String,
    pub fallbacks: Vec<EncodingFallback>,
}

impl CropRecommender {
    pub fn new(bundle: RecommenderBundle) -> Result<Self, BundleError> {
        let layout = bundle.feature_layout()?;
        Ok(Self { bundle, layout })
    }

    pub fn bundle(&self) -> &RecommenderBundle {
        &self.bundle
    }

    pub fn feature_layout(&self) -> &[Field] {
        &self.layout
    }

    /// Every label the model can return, in code order.
    pub fn classes(&self) -> &[String] {
        self.bundle.classes.classes()
    }

    pub fn recommend<S>(&self, source: &S) -> Result<Recommendation, PredictionError>
    where
        S: FeatureSource + ?Sized,
    {
        let vector = self.vectorize(source, None)?;
        let code = self
            .bundle
            .model
            .predict_codes(&[vector.values])?
            .first()
            .copied()
            .ok_or_else(|| PredictionError::Model("No prediction returned".to_string()))?;
        Ok(Recommendation {
            label: self.decode(code)?,
            fallbacks: vector.fallbacks,
        })
    }

    /// One recommendation per row of `table`, in input order.
    pub fn recommend_batch(&self, table: &CropTable) -> Result<Vec<Recommendation>, PredictionError> {
        let vectors = table
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| self.vectorize(record, Some(i + 1)))
            .collect::<Result<Vec<_>, _>>()?;

        let rows: Vec<Vec<f64>> = vectors.iter().map(|v| v.values.clone()).collect();
        let codes = self.bundle.model.predict_codes(&rows)?;
        debug!("Recommended {} for {} rows", self.bundle.target, table.len());

        vectors
            .into_iter()
            .zip(codes)
            .map(|(vector, code)| {
                Ok(Recommendation {
                    label: self.decode(code)?,
                    fallbacks: vector.fallbacks,
                })
            })
            .collect()
    }

    fn decode(&self, code: u32) -> Result<String, PredictionError> {
        self.bundle
            .classes
            .decode(code)
            .map(str::to_string)
            .ok_or_else(|| PredictionError::Model(format!("class code {} has no label", code)))
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
        for fallback in &vector.fallbacks {
            match row {
                Some(row) => warn!("Row {}: {}", row, fallback.describe()),
                None => warn!("{}", fallback.describe()),
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::classifier::ForestClassifier;
    use crate::application::ml::regressor::ForestParameters;
    use crate::domain::ml::dataset::CropRecord;
    use crate::domain::ml::encoder::{FeatureEncoder, LabelEncoder};
    use crate::domain::ml::feature_registry::feature_names;

    const LAYOUT: [Field; 2] = [Field::State, Field::AnnualRainfall];

    /// Wet rows grow rice, dry rows grow wheat.
    fn bundle() -> RecommenderBundle {
        let x: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let rainfall = if i % 2 == 0 { 2000.0 } else { 400.0 };
                vec![(i % 3 == 0) as u8 as f64, rainfall + (i % 5) as f64]
            })
            .collect();
        let y: Vec<u32> = (0..40).map(|i| (i % 2) as u32).collect();
        let params = ForestParameters {
            n_trees: 10,
            max_depth: Some(4),
            min_samples_split: 2,
            seed: 11,
        };
        RecommenderBundle::new(
            ForestClassifier::fit(&x, &y, params).unwrap(),
            FeatureEncoder::fit([("state", vec!["Assam", "Punjab"])]),
            LabelEncoder::fit(["Rice", "Wheat"]),
            feature_names(&LAYOUT),
            Field::Crop,
        )
    }

    fn record(state: Option<&str>, rainfall: Option<f64>) -> CropRecord {
        CropRecord {
            state: state.map(str::to_string),
            annual_rainfall: rainfall,
            ..Default::default()
        }
    }

    #[test]
    fn test_recommendation_is_decoded_to_label() {
        let recommender = CropRecommender::new(bundle()).unwrap();
        assert_eq!(recommender.classes(), ["Rice", "Wheat"]);
        assert_eq!(recommender.feature_layout(), LAYOUT);

        let wet = recommender.recommend(&record(Some("Assam"), Some(2001.0))).unwrap();
        assert_eq!(wet.label, "Rice");
        assert!(wet.fallbacks.is_empty());

        let dry = recommender.recommend(&record(Some("Punjab"), Some(402.0))).unwrap();
        assert_eq!(dry.label, "Wheat");
    }

    #[test]
    fn test_unseen_state_falls_back() {
        let recommender = CropRecommender::new(bundle()).unwrap();
        let result = recommender.recommend(&record(Some("Kerala"), Some(2002.0))).unwrap();
        assert_eq!(result.fallbacks.len(), 1);
        assert_eq!(result.fallbacks[0].field, "state");
    }

    #[test]
    fn test_batch_reports_row_with_missing_value() {
        let recommender = CropRecommender::new(bundle()).unwrap();
        let table = CropTable::with_fields(
            &LAYOUT,
            vec![record(Some("Assam"), Some(400.0)), record(Some("Assam"), None)],
        );
        match recommender.recommend_batch(&table).unwrap_err() {
            PredictionError::InvalidInput { field, reason } => {
                assert_eq!(field, "Annual_Rainfall");
                assert!(reason.contains("row 2"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let table = CropTable::with_fields(&LAYOUT, vec![record(Some("Assam"), Some(400.0))]);
        let labels: Vec<String> = recommender
            .recommend_batch(&table)
            .unwrap()
            .into_iter()
            .map(|r| r.label)
            .collect();
        assert_eq!(labels, ["Wheat"]);
    }

    #[test]
    fn test_bundle_without_classes_is_rejected() {
        let mut b = bundle();
        b.classes = LabelEncoder::fit(Vec::<String>::new());
        assert!(matches!(
            CropRecommender::new(b),
            Err(BundleError::IncompatibleFeatures { .. })
        ));
    }
}
