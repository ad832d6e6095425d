use agrodata::application::ml::preprocessing::clean_table;
use agrodata::application::ml::crop_recommender::CropRecommender;
use agrodata::application::ml::prediction_service::{PredictionInput, PredictionService};
use agrodata::application::ml::regressor::{ForestParameters, ModelKind};
use agrodata::application::ml::trainer::{Trainer, TrainerConfig};
use agrodata::application::ml::yield_predictor::YieldPredictor;
use agrodata::domain::errors::{PredictionError, TrainingError};
use agrodata::domain::ml::dataset::{CropRecord, CropTable};
use agrodata::domain::ml::encoder::Encoding;
use agrodata::domain::ml::feature_registry::{CRITICAL_COLUMNS, Field, default_features};
use agrodata::domain::ml::prediction::PredictionRequest;
use agrodata::infrastructure::dataset::{
    read_crop_table, write_predictions_to, write_recommendations_to,
};
use agrodata::infrastructure::persistence::{
    load_bundle, load_recommender, save_bundle, save_recommender,
};
use serde_json::json;
use std::sync::Arc;

const STATES: [&str; 3] = ["Assam", "Punjab", "Bihar"];
const SEASONS: [&str; 2] = ["Kharif", "Rabi"];

/// Synthetic crop table. Values are spread evenly so the IQR filter keeps
/// every row; `extra` rows are appended verbatim.
fn crop_csv(rows: usize, with_season: bool, extra: &[&str]) -> String {
    let mut csv = String::from(if with_season {
        "Crop,Crop_Year,Season,State,Area,Production,Annual_Rainfall,Fertilizer,Pesticide,Yield\n"
    } else {
        "Crop,Crop_Year,State,Area,Production,Annual_Rainfall,Fertilizer,Pesticide,Yield\n"
    });
    for i in 0..rows {
        let crop = if i % 2 == 0 { "Rice" } else { "Wheat" };
        let area = 100.0 + ((i * 37) % 60) as f64 * 5.0;
        let rainfall = 800.0 + ((i * 13) % 40) as f64 * 10.0;
        let fertilizer = area * 120.0 + (i % 5) as f64 * 10.0;
        let pesticide = area * 0.3 + (i % 7) as f64;
        let base = if crop == "Rice" { 2.0 } else { 3.0 };
        let yld = base + rainfall / 1000.0 + (i % 4) as f64 * 0.1;
        let production = yld * area;
        let year = 1997 + (i % 20);
        let state = STATES[i % 3];
        if with_season {
            let season = SEASONS[(i / 2) % 2];
            csv.push_str(&format!(
                "{crop},{year},{season},{state},{area},{production},{rainfall},{fertilizer},{pesticide},{yld}\n"
            ));
        } else {
            csv.push_str(&format!(
                "{crop},{year},{state},{area},{production},{rainfall},{fertilizer},{pesticide},{yld}\n"
            ));
        }
    }
    for line in extra {
        csv.push_str(line);
        csv.push('\n');
    }
    csv
}

fn table(rows: usize, with_season: bool) -> CropTable {
    read_crop_table(crop_csv(rows, with_season, &[]).as_bytes()).unwrap()
}

fn trainer(kind: ModelKind) -> Trainer {
    Trainer::new(TrainerConfig {
        model_kind: kind,
        forest: ForestParameters {
            n_trees: 12,
            max_depth: Some(6),
            min_samples_split: 2,
            seed: 7,
        },
        test_fraction: 0.2,
        seed: 7,
    })
}

fn predictor(kind: ModelKind, with_season: bool) -> YieldPredictor {
    let table = table(60, with_season);
    let features = default_features(with_season);
    let outcome = trainer(kind).fit(&table, Field::Yield, &features).unwrap();
    YieldPredictor::new(outcome.bundle).unwrap()
}

fn request(crop: &str, season: Option<&str>) -> PredictionRequest {
    PredictionRequest::new(crop, "Assam", 200.0, 700.0, 1000.0, 24000.0, 62.0, season).unwrap()
}

#[test]
fn test_rice_and_wheat_encode_in_sorted_order() {
    let predictor = predictor(ModelKind::RandomForest, true);
    let encoder = &predictor.bundle().encoder;

    assert_eq!(encoder.encode("crop", "Rice"), Encoding::Known(0));
    assert_eq!(encoder.encode("crop", "Wheat"), Encoding::Known(1));
    assert_eq!(encoder.encode("crop", "Maize"), Encoding::Unknown);
    assert_eq!(encoder.encode("crop", "Maize").code(), Encoding::SENTINEL);
}

#[test]
fn test_unseen_crop_predicts_with_fallback() {
    let predictor = predictor(ModelKind::RandomForest, true);

    let known = predictor.predict(&request("Rice", Some("Kharif"))).unwrap();
    assert!(known.fallbacks.is_empty());

    let unseen = predictor.predict(&request("Maize", Some("Kharif"))).unwrap();
    assert!(unseen.value.is_finite());
    assert_eq!(unseen.fallbacks.len(), 1);
    assert_eq!(unseen.fallbacks[0].field, "crop");
    assert_eq!(unseen.fallbacks[0].label.as_deref(), Some("Maize"));
    // Unseen crops share the sentinel code with the first known label
    assert_eq!(unseen.value, known.value);
}

#[test]
fn test_missing_season_is_a_fallback_not_an_error() {
    let predictor = predictor(ModelKind::RandomForest, true);
    assert!(predictor.expects_season());

    let prediction = predictor.predict(&request("Wheat", None)).unwrap();
    assert_eq!(prediction.fallbacks.len(), 1);
    assert_eq!(prediction.fallbacks[0].field, "season");
    assert_eq!(prediction.fallbacks[0].label, None);
}

#[test]
fn test_outlier_removal_only_shrinks_the_table() {
    let extreme = "Rice,2001,Kharif,Assam,10000000,30000000,1000,1200000000,3000000,3.0";
    let raw = read_crop_table(crop_csv(60, true, &[extreme]).as_bytes()).unwrap();
    let (records, summary) = clean_table(&raw, CRITICAL_COLUMNS);

    assert_eq!(summary.original_rows, 61);
    assert!(summary.cleaned_rows <= summary.after_missing);
    assert!(summary.after_missing <= summary.original_rows);
    assert_eq!(records.len(), summary.cleaned_rows);
    assert!(records.iter().all(|r| r.area.unwrap() < 1_000_000.0));
}

#[test]
fn test_missing_critical_values_are_dropped_before_training() {
    let broken = ["Rice,2001,Kharif,,300,900,1000,36000,90,3.0", "Wheat,2001,Rabi,Assam,,900,1000,36000,90,3.0"];
    let raw = read_crop_table(crop_csv(40, true, &broken).as_bytes()).unwrap();
    let (_, summary) = clean_table(&raw, CRITICAL_COLUMNS);
    assert_eq!(summary.original_rows, 42);
    assert_eq!(summary.after_missing, 40);
}

#[test]
fn test_batch_without_season_column() {
    let predictor = predictor(ModelKind::RandomForest, false);
    assert!(!predictor.expects_season());

    let input = table(10, false);
    let predicted = predictor.predict_batch(&input).unwrap();
    assert_eq!(predicted.rows.len(), 10);
    assert_eq!(predicted.fallback_count(), 0);
    assert!(predicted.values().iter().all(|v| v.is_finite()));

    let mut out = Vec::new();
    write_predictions_to(&mut out, &predicted).unwrap();
    let text = String::from_utf8(out).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.ends_with(",Predicted_Yield"));
    assert!(!header.contains("Season"));
    assert_eq!(text.lines().count(), 11);
}

#[test]
fn test_batch_reports_row_with_missing_numeric() {
    let predictor = predictor(ModelKind::RandomForest, false);
    let csv = "Crop,State,Area,Production,Annual_Rainfall,Fertilizer,Pesticide\n\
               Rice,Assam,200,700,1000,24000,62\n\
               Rice,Assam,200,,1000,24000,62\n";
    let input = read_crop_table(csv.as_bytes()).unwrap();

    let err = predictor.predict_batch(&input).unwrap_err();
    match err {
        PredictionError::InvalidInput { field, reason } => {
            assert_eq!(field, "Production");
            assert!(reason.contains("row 2"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_confidence_interval_contains_prediction() {
    let predictor = predictor(ModelKind::RandomForest, true);
    let req = request("Wheat", Some("Rabi"));

    let full = predictor.predict_with_confidence(&req, None).unwrap();
    let interval = full.interval.unwrap();
    assert_eq!(full.members, 12);
    assert!(interval.lower <= full.prediction && full.prediction <= interval.upper);
    assert!(full.std_dev.unwrap() >= 0.0);

    let partial = predictor.predict_with_confidence(&req, Some(3)).unwrap();
    assert_eq!(partial.members, 3);
    let interval = partial.interval.unwrap();
    assert!(interval.lower <= partial.prediction && partial.prediction <= interval.upper);
}

#[test]
fn test_linear_model_has_no_interval() {
    let predictor = predictor(ModelKind::LinearRegression, true);
    let confidence = predictor
        .predict_with_confidence(&request("Rice", Some("Kharif")), None)
        .unwrap();
    assert_eq!(confidence.interval, None);
    assert_eq!(confidence.std_dev, None);
    assert_eq!(confidence.members, 1);
    assert!(predictor.model_info().ensemble_size.is_none());
}

#[test]
fn test_saved_bundle_predicts_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models").join("yield.json");
    let features = default_features(true);
    let outcome = trainer(ModelKind::RandomForest)
        .fit(&table(60, true), Field::Yield, &features)
        .unwrap();

    let original = YieldPredictor::new(outcome.bundle).unwrap();
    save_bundle(original.bundle(), &path).unwrap();
    let reloaded = YieldPredictor::new(load_bundle(&path).unwrap()).unwrap();

    for crop in ["Rice", "Wheat", "Maize"] {
        let req = request(crop, Some("Rabi"));
        let a = original.predict(&req).unwrap();
        let b = reloaded.predict(&req).unwrap();
        assert_eq!(a.value.to_bits(), b.value.to_bits(), "crop {}", crop);
        assert_eq!(a.fallbacks, b.fallbacks);
    }

    let info = reloaded.model_info();
    assert_eq!(info.feature_names, original.bundle().feature_names);
    assert_eq!(info.ensemble_size, Some(12));
    assert!(info.metrics.is_some());
}

#[test]
fn test_training_fails_without_critical_column() {
    let csv = "Crop,State,Area,Yield\nRice,Assam,10,3\n";
    let raw = read_crop_table(csv.as_bytes()).unwrap();
    let err = trainer(ModelKind::RandomForest)
        .fit(&raw, Field::Yield, &default_features(false))
        .unwrap_err();
    assert!(matches!(err, TrainingError::MissingColumn { ref column } if column == "Production"));
}

#[test]
fn test_cross_validation_reports_each_fold() {
    let report = trainer(ModelKind::RandomForest)
        .cross_validate(&table(60, true), Field::Yield, &default_features(true), 5)
        .unwrap();
    assert_eq!(report.fold_scores.len(), 5);
    assert!(report.std_r2 >= 0.0);
}

#[test]
fn test_service_end_to_end() {
    let service = PredictionService::new(Arc::new(predictor(ModelKind::RandomForest, true)), Some(5));
    let input: PredictionInput = serde_json::from_value(json!({
        "crop": "Rice",
        "state": "Punjab",
        "season": "Kharif",
        "area": "250",
        "production": 800,
        "rainfall": "1100",
        "fertilizer": 30000,
        "pesticide": 75
    }))
    .unwrap();

    let response = service.handle(&input).unwrap();
    assert_eq!(response.status, "success");
    assert_eq!(response.productivity, response.predicted_value / 250.0);
    let interval = response.confidence_interval.unwrap();
    assert!(interval.lower_bound <= response.predicted_value);
    assert!(response.predicted_value <= interval.upper_bound);
    assert!(response.warnings.is_empty());

    let bad: PredictionInput = serde_json::from_value(json!({
        "crop": "Rice",
        "state": "Punjab",
        "area": "lots"
    }))
    .unwrap();
    let error = service.handle(&bad).unwrap_err();
    assert_eq!(error.status_code(), 400);
    assert!(error.error.contains("area"));
}

#[test]
fn test_service_reports_whole_model_prediction_once() {
    let predictor = Arc::new(predictor(ModelKind::RandomForest, true));
    let service = PredictionService::new(predictor.clone(), Some(3));
    let input: PredictionInput = serde_json::from_value(json!({
        "crop": "Maize",
        "state": "Assam",
        "season": "Rabi",
        "area": 200,
        "production": 700,
        "rainfall": 1000,
        "fertilizer": 24000,
        "pesticide": 62
    }))
    .unwrap();

    let response = service.handle(&input).unwrap();
    let direct = predictor.predict(&request("Maize", Some("Rabi"))).unwrap();
    assert_eq!(response.predicted_value.to_bits(), direct.value.to_bits());
    assert_eq!(response.warnings.len(), 1);
    let interval = response.confidence_interval.unwrap();
    assert!(interval.lower_bound <= response.predicted_value);
    assert!(response.predicted_value <= interval.upper_bound);
}

#[test]
fn test_batch_output_keeps_every_input_column() {
    let predictor = predictor(ModelKind::RandomForest, false);
    let csv = "District,Crop,State,Area,Production,Annual_Rainfall,Fertilizer,Pesticide,Yield,Remarks\n\
               Kamrup,Rice,Assam,200,700,1000,24000,62,3.5,irrigated\n\
               Ludhiana,Wheat,Punjab,250,900,900,30000,NA,NA,\n";
    let input = read_crop_table(csv.as_bytes()).unwrap();
    // Pesticide is a model feature, so the NA row cannot be predicted
    assert!(predictor.predict_batch(&input).is_err());

    let csv = csv.replace(",NA,NA,", ",70,NA,");
    let input = read_crop_table(csv.as_bytes()).unwrap();
    let predicted = predictor.predict_batch(&input).unwrap();

    let mut out = Vec::new();
    write_predictions_to(&mut out, &predicted).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "District,Crop,State,Area,Production,Annual_Rainfall,Fertilizer,Pesticide,Yield,Remarks,Predicted_Yield"
    );
    assert!(lines[1].starts_with("Kamrup,Rice,Assam,200,700,1000,24000,62,3.5,irrigated,"));
    assert!(lines[2].starts_with("Ludhiana,Wheat,Punjab,250,900,900,30000,70,NA,,"));
    assert_eq!(lines.len(), 3);
}

#[test]
fn test_crop_target_trains_a_recommender() {
    let table = table(60, true);
    let features = [Field::State, Field::Season, Field::Yield];

    // Yield models cannot predict a label
    assert!(matches!(
        trainer(ModelKind::RandomForest).fit(&table, Field::Crop, &features),
        Err(TrainingError::InvalidTarget { .. })
    ));

    let outcome = trainer(ModelKind::RandomForest)
        .fit_classifier(&table, Field::Crop, &features)
        .unwrap();
    assert_eq!(outcome.bundle.classes.classes(), ["Rice", "Wheat"]);
    assert!(outcome.report.train.unwrap().accuracy >= 0.9);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crops.json");
    save_recommender(&outcome.bundle, &path).unwrap();
    let recommender = CropRecommender::new(load_recommender(&path).unwrap()).unwrap();

    let field = |yld: f64| CropRecord {
        state: Some("Assam".to_string()),
        season: Some("Kharif".to_string()),
        yield_value: Some(yld),
        ..Default::default()
    };
    assert_eq!(recommender.recommend(&field(2.9)).unwrap().label, "Rice");
    assert_eq!(recommender.recommend(&field(4.3)).unwrap().label, "Wheat");

    let csv = "Plot,State,Season,Yield\nA1,Punjab,Rabi,4.1\nA2,Bihar,Kharif,3.0\n";
    let input = read_crop_table(csv.as_bytes()).unwrap();
    let recommendations = recommender.recommend_batch(&input).unwrap();
    let mut out = Vec::new();
    write_recommendations_to(&mut out, &input, "Crop", &recommendations).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text.lines().collect::<Vec<_>>(),
        [
            "Plot,State,Season,Yield,Recommended_Crop",
            "A1,Punjab,Rabi,4.1,Wheat",
            "A2,Bihar,Kharif,3.0,Rice",
        ]
    );
}
