//! Categorical label encoding.
//!
//! A [`LabelEncoder`] only exists once it has been fit, so there is no
//! "unfitted" state to check at runtime. Labels are coded in sorted order.
//!
//! Unseen labels encode to [`Encoding::Unknown`], whose model-facing code is
//! the sentinel `0`. This is an accepted accuracy trade-off: `0` is also the
//! code of the first known label, so a prediction for an unseen category is
//! made as if it were that category. Callers that care can inspect
//! [`Encoding::is_fallback`].

use super::dataset::FeatureSource;
use super::feature_registry::Field;
use super::prediction::EncodingFallback;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Result of encoding one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Known(u32),
    Unknown,
}

impl Encoding {
    /// Code used in feature vectors for labels never seen during fit.
    pub const SENTINEL: u32 = 0;

    pub fn code(&self) -> u32 {
        match self {
            Encoding::Known(code) => *code,
            Encoding::Unknown => Self::SENTINEL,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Encoding::Unknown)
    }
}

/// Bidirectional mapping between the labels of one category set and `[0, k)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = labels
            .into_iter()
            .map(|l| l.as_ref().trim().to_string())
            .collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn encode(&self, label: &str) -> Encoding {
        match self
            .classes
            .binary_search_by(|c| c.as_str().cmp(label.trim()))
        {
            Ok(idx) => Encoding::Known(idx as u32),
            Err(_) => Encoding::Unknown,
        }
    }

    pub fn decode(&self, code: u32) -> Option<&str> {
        self.classes.get(code as usize).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Classes must be strictly increasing for lookups to work; a
    /// hand-edited artifact may break this.
    pub fn is_well_formed(&self) -> bool {
        self.classes.windows(2).all(|w| w[0] < w[1])
    }
}

/// Encoders for every categorical column, keyed by category set name
/// ("crop", "state", "season").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    encoders: BTreeMap<String, LabelEncoder>,
}

impl FeatureEncoder {
    pub fn fit<I, N, L, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (N, L)>,
        N: Into<String>,
        L: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let encoders = columns
            .into_iter()
            .map(|(name, labels)| (name.into(), LabelEncoder::fit(labels)))
            .collect();
        Self { encoders }
    }

    /// Encodes `label` within `category_set`. An unknown set behaves like an
    /// unknown label.
    pub fn encode(&self, category_set: &str, label: &str) -> Encoding {
        self.encoders
            .get(category_set)
            .map(|e| e.encode(label))
            .unwrap_or(Encoding::Unknown)
    }

    pub fn encoder(&self, category_set: &str) -> Option<&LabelEncoder> {
        self.encoders.get(category_set)
    }

    pub fn category_sets(&self) -> impl Iterator<Item = &str> {
        self.encoders.keys().map(String::as_str)
    }

    /// Builds a model-facing vector in `layout` order. Categorical values
    /// that are unseen or absent use the sentinel and are reported as
    /// fallbacks. A missing numeric value is returned as `Err(field)`.
    pub fn vectorize<S>(&self, layout: &[Field], source: &S) -> Result<FeatureVector, Field>
    where
        S: FeatureSource + ?Sized,
    {
        let mut values = Vec::with_capacity(layout.len());
        let mut fallbacks = Vec::new();
        for &field in layout {
            match field.category_set() {
                Some(set) => {
                    let label = source.categorical(field);
                    let encoding = label
                        .map(|l| self.encode(set, l))
                        .unwrap_or(Encoding::Unknown);
                    if encoding.is_fallback() {
                        fallbacks.push(EncodingFallback {
                            field: set.to_string(),
                            label: label.map(str::to_string),
                        });
                    }
                    values.push(encoding.code() as f64);
                }
                None => values.push(source.numeric(field).ok_or(field)?),
            }
        }
        Ok(FeatureVector { values, fallbacks })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    pub fallbacks: Vec<EncodingFallback>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_sorted_order() {
        let encoder = LabelEncoder::fit(["Wheat", "Rice", "Wheat", "Maize"]);
        assert_eq!(encoder.len(), 3);
        assert_eq!(encoder.encode("Maize"), Encoding::Known(0));
        assert_eq!(encoder.encode("Rice"), Encoding::Known(1));
        assert_eq!(encoder.encode("Wheat"), Encoding::Known(2));
        assert_eq!(encoder.decode(1), Some("Rice"));
        assert_eq!(encoder.decode(3), None);
    }

    #[test]
    fn test_encoding_is_stable_across_calls() {
        let encoder = LabelEncoder::fit(["Rice", "Wheat"]);
        let first = encoder.encode("Wheat");
        for _ in 0..10 {
            assert_eq!(encoder.encode("Wheat"), first);
        }
    }

    #[test]
    fn test_unseen_label_maps_to_sentinel() {
        let encoder = LabelEncoder::fit(["Rice", "Wheat"]);
        let encoded = encoder.encode("Maize");
        assert_eq!(encoded, Encoding::Unknown);
        assert!(encoded.is_fallback());
        assert_eq!(encoded.code(), 0);
        assert_eq!(encoder.encode(""), Encoding::Unknown);
    }

    #[test]
    fn test_labels_are_trimmed() {
        let encoder = LabelEncoder::fit(["Kharif     ", "Rabi"]);
        assert_eq!(encoder.encode("Kharif"), Encoding::Known(0));
        assert_eq!(encoder.encode(" Rabi "), Encoding::Known(1));
    }

    #[test]
    fn test_feature_encoder_per_category_set() {
        let encoder = FeatureEncoder::fit([
            ("crop", vec!["Rice", "Wheat"]),
            ("state", vec!["Assam", "Bihar", "Punjab"]),
        ]);

        assert_eq!(encoder.encode("crop", "Wheat"), Encoding::Known(1));
        assert_eq!(encoder.encode("state", "Punjab"), Encoding::Known(2));
        assert_eq!(encoder.encode("season", "Kharif"), Encoding::Unknown);
        assert_eq!(encoder.category_sets().collect::<Vec<_>>(), vec!["crop", "state"]);
    }

    #[test]
    fn test_well_formed_detects_unsorted_classes() {
        let good = LabelEncoder::fit(["b", "a"]);
        assert!(good.is_well_formed());

        let bad: LabelEncoder = serde_json::from_str(r#"{"classes":["b","a"]}"#).unwrap();
        assert!(!bad.is_well_formed());
    }

    #[test]
    fn test_vectorize_follows_layout_and_reports_fallbacks() {
        use crate::domain::ml::dataset::CropRecord;

        let encoder = FeatureEncoder::fit([("crop", vec!["Rice", "Wheat"]), ("season", vec!["Kharif"])]);
        let record = CropRecord {
            crop: Some("Maize".to_string()),
            area: Some(4.0),
            ..Default::default()
        };

        let vector = encoder
            .vectorize(&[Field::Area, Field::Crop, Field::Season], &record)
            .unwrap();
        assert_eq!(vector.values, vec![4.0, 0.0, 0.0]);
        assert_eq!(vector.fallbacks.len(), 2);
        assert_eq!(vector.fallbacks[0].label.as_deref(), Some("Maize"));
        assert_eq!(vector.fallbacks[1].label, None);

        let missing = encoder.vectorize(&[Field::Production], &record);
        assert_eq!(missing, Err(Field::Production));
    }
}
