use super::dataset::FeatureSource;
use super::feature_registry::Field;
use crate::domain::errors::PredictionError;
use serde::{Deserialize, Serialize};

/// A validated single-record prediction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub crop: String,
    pub state: String,
    pub area: f64,
    pub production: f64,
    pub rainfall: f64,
    pub fertilizer: f64,
    pub pesticide: f64,
    pub season: Option<String>,
}

impl PredictionRequest {
    /// Validates and normalises raw values: labels are trimmed, a blank
    /// season becomes `None`, area must be positive and every other amount
    /// non-negative.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        crop: &str,
        state: &str,
        area: f64,
        production: f64,
        rainfall: f64,
        fertilizer: f64,
        pesticide: f64,
        season: Option<&str>,
    ) -> Result<Self, PredictionError> {
        let crop = crop.trim();
        let state = state.trim();
        if crop.is_empty() {
            return Err(PredictionError::invalid("crop", "is required"));
        }
        if state.is_empty() {
            return Err(PredictionError::invalid("state", "is required"));
        }
        if !area.is_finite() || area <= 0.0 {
            return Err(PredictionError::invalid("area", "must be greater than 0"));
        }
        for (name, value) in [
            ("production", production),
            ("rainfall", rainfall),
            ("fertilizer", fertilizer),
            ("pesticide", pesticide),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PredictionError::invalid(name, "cannot be negative"));
            }
        }

        Ok(Self {
            crop: crop.to_string(),
            state: state.to_string(),
            area,
            production,
            rainfall,
            fertilizer,
            pesticide,
            season: season
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}

impl FeatureSource for PredictionRequest {
    fn categorical(&self, field: Field) -> Option<&str> {
        match field {
            Field::Crop => Some(&self.crop),
            Field::State => Some(&self.state),
            Field::Season => self.season.as_deref(),
            _ => None,
        }
    }

    fn numeric(&self, field: Field) -> Option<f64> {
        match field {
            Field::Area => Some(self.area),
            Field::Production => Some(self.production),
            Field::AnnualRainfall => Some(self.rainfall),
            Field::Fertilizer => Some(self.fertilizer),
            Field::Pesticide => Some(self.pesticide),
            _ => None,
        }
    }
}

/// Non-fatal: a categorical input had no code and the sentinel was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingFallback {
    pub field: String,
    /// `None` when the value was absent rather than unseen.
    pub label: Option<String>,
}

impl EncodingFallback {
    pub fn describe(&self) -> String {
        match &self.label {
            Some(label) => format!("Unknown {} '{}', using default encoding", self.field, label),
            None => format!("No {} given, using default encoding", self.field),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub value: f64,
    pub fallbacks: Vec<EncodingFallback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Point prediction plus ensemble spread. `interval` and `std_dev` are
/// `None` for models without ensemble members.
///
/// `prediction` is the mean of the members consulted; `point` is the
/// whole model's prediction. They differ only when the spread was taken
/// over part of the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidencePrediction {
    pub prediction: f64,
    pub point: f64,
    pub std_dev: Option<f64>,
    pub interval: Option<ConfidenceInterval>,
    pub members: usize,
    pub fallbacks: Vec<EncodingFallback>,
}
