//! Request boundary for yield predictions.
//!
//! Turns loosely-typed input (numbers may arrive as JSON numbers or numeric
//! strings) into a validated request and maps every failure to a structured
//! error response.

use super::yield_predictor::{ModelInfo, PredictedTable, YieldPredictor};
use crate::domain::errors::PredictionError;
use crate::domain::ml::dataset::CropTable;
use crate::domain::ml::prediction::PredictionRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Raw prediction input. Missing numeric values count as `0`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionInput {
    #[serde(default)]
    pub crop: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub area: Option<Value>,
    #[serde(default)]
    pub production: Option<Value>,
    #[serde(default)]
    pub rainfall: Option<Value>,
    #[serde(default)]
    pub fertilizer: Option<Value>,
    #[serde(default)]
    pub pesticide: Option<Value>,
    #[serde(default)]
    pub season: Option<String>,
}

impl PredictionInput {
    pub fn to_request(&self) -> Result<PredictionRequest, PredictionError> {
        PredictionRequest::new(
            self.crop.as_deref().unwrap_or_default(),
            self.state.as_deref().unwrap_or_default(),
            parse_number("area", self.area.as_ref())?,
            parse_number("production", self.production.as_ref())?,
            parse_number("rainfall", self.rainfall.as_ref())?,
            parse_number("fertilizer", self.fertilizer.as_ref())?,
            parse_number("pesticide", self.pesticide.as_ref())?,
            self.season.as_deref(),
        )
    }
}

fn parse_number(field: &str, value: Option<&Value>) -> Result<f64, PredictionError> {
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| PredictionError::invalid(field, "is not a valid number")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| PredictionError::invalid(field, format!("invalid number '{}': {}", s, e))),
        Some(other) => Err(PredictionError::invalid(
            field,
            format!("expected a number, got {}", other),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntervalBounds {
    pub lower_bound: f64,
    pub upper_bound: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResponse {
    pub status: &'static str,
    pub predicted_value: f64,
    /// Predicted value per unit of area.
    pub productivity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<IntervalBounds>,
    pub warnings: Vec<String>,
    pub inputs: PredictionRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ModelNotLoaded,
    InvalidInput,
    PredictionFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error: String,
    pub kind: ErrorKind,
}

impl ErrorResponse {
    /// HTTP-style status for callers that expose the service over a transport.
    pub fn status_code(&self) -> u16 {
        match self.kind {
            ErrorKind::InvalidInput => 400,
            ErrorKind::ModelNotLoaded | ErrorKind::PredictionFailed => 500,
        }
    }
}

impl From<&PredictionError> for ErrorResponse {
    fn from(err: &PredictionError) -> Self {
        let kind = match err {
            PredictionError::ModelNotLoaded => ErrorKind::ModelNotLoaded,
            PredictionError::InvalidInput { .. } => ErrorKind::InvalidInput,
            PredictionError::FeatureShape { .. } | PredictionError::Model(_) => {
                ErrorKind::PredictionFailed
            }
        };
        Self {
            status: "error",
            error: err.to_string(),
            kind,
        }
    }
}

/// Prediction entry point shared by every caller.
///
/// Built without a predictor only when the configuration allows serving in
/// degraded mode; every call then fails with `ModelNotLoaded`.
#[derive(Debug, Clone)]
pub struct PredictionService {
    predictor: Option<Arc<YieldPredictor>>,
    ensemble_size: Option<usize>,
}

impl PredictionService {
    pub fn new(predictor: Arc<YieldPredictor>, ensemble_size: Option<usize>) -> Self {
        Self {
            predictor: Some(predictor),
            ensemble_size,
        }
    }

    pub fn unloaded() -> Self {
        Self {
            predictor: None,
            ensemble_size: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.predictor.is_some()
    }

    fn predictor(&self) -> Result<&YieldPredictor, PredictionError> {
        self.predictor.as_deref().ok_or(PredictionError::ModelNotLoaded)
    }

    pub fn model_info(&self) -> Result<ModelInfo, PredictionError> {
        Ok(self.predictor()?.model_info())
    }

    pub fn predict(&self, input: &PredictionInput) -> Result<PredictionResponse, PredictionError> {
        let predictor = self.predictor()?;
        let request = input.to_request()?;

        let confidence = predictor.predict_with_confidence(&request, self.ensemble_size)?;
        let value = confidence.point;
        let confidence_interval = confidence.interval.map(|ci| IntervalBounds {
            lower_bound: ci.lower.min(value),
            upper_bound: ci.upper.max(value),
        });

        info!(
            "Predicted {:.4} for {} in {} ({} fallback(s))",
            value,
            request.crop,
            request.state,
            confidence.fallbacks.len()
        );

        Ok(PredictionResponse {
            status: "success",
            predicted_value: value,
            productivity: value / request.area,
            confidence_interval,
            warnings: confidence.fallbacks.iter().map(|f| f.describe()).collect(),
            inputs: request,
        })
    }

    pub fn predict_batch(&self, table: &CropTable) -> Result<PredictedTable, PredictionError> {
        let predicted = self.predictor()?.predict_batch(table)?;
        info!(
            "Predicted {} rows ({} fallback(s))",
            predicted.rows.len(),
            predicted.fallback_count()
        );
        Ok(predicted)
    }

    /// Same as [`predict`](Self::predict) with errors mapped to responses.
    pub fn handle(&self, input: &PredictionInput) -> Result<PredictionResponse, ErrorResponse> {
        self.predict(input).map_err(|e| {
            if !matches!(e, PredictionError::InvalidInput { .. }) {
                error!("Prediction failed: {}", e);
            }
            ErrorResponse::from(&e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(value: Value) -> PredictionInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_numbers_accept_strings_and_json_numbers() {
        let parsed = input(json!({
            "crop": "Rice",
            "state": "Assam",
            "area": "12.5",
            "production": 30,
            "rainfall": " 1100 ",
            "fertilizer": null,
            "season": "Kharif"
        }))
        .to_request()
        .unwrap();
        assert_eq!(parsed.area, 12.5);
        assert_eq!(parsed.production, 30.0);
        assert_eq!(parsed.rainfall, 1100.0);
        assert_eq!(parsed.fertilizer, 0.0);
        assert_eq!(parsed.pesticide, 0.0);
        assert_eq!(parsed.season.as_deref(), Some("Kharif"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = input(json!({"crop": "Rice", "state": "Assam", "area": "abc"}))
            .to_request()
            .unwrap_err();
        assert!(matches!(err, PredictionError::InvalidInput { ref field, .. } if field == "area"));

        let err = input(json!({"crop": "Rice", "state": "Assam"})).to_request().unwrap_err();
        assert!(matches!(err, PredictionError::InvalidInput { ref field, .. } if field == "area"));

        let err = input(json!({"crop": "Rice", "state": "Assam", "area": [1]}))
            .to_request()
            .unwrap_err();
        assert!(matches!(err, PredictionError::InvalidInput { .. }));
    }

    #[test]
    fn test_unloaded_service_reports_model_not_loaded() {
        let service = PredictionService::unloaded();
        assert!(!service.is_loaded());
        let response = service
            .handle(&input(json!({"crop": "Rice", "state": "Assam", "area": 1})))
            .unwrap_err();
        assert_eq!(response.kind, ErrorKind::ModelNotLoaded);
        assert_eq!(response.status_code(), 500);
        assert!(matches!(service.model_info(), Err(PredictionError::ModelNotLoaded)));
    }

    #[test]
    fn test_error_response_kinds() {
        let invalid = ErrorResponse::from(&PredictionError::invalid("area", "must be greater than 0"));
        assert_eq!(invalid.kind, ErrorKind::InvalidInput);
        assert_eq!(invalid.status_code(), 400);
        assert!(invalid.error.contains("area"));

        let shape = ErrorResponse::from(&PredictionError::FeatureShape {
            expected: 7,
            actual: 8,
        });
        assert_eq!(shape.kind, ErrorKind::PredictionFailed);
    }
}
