pub mod bundle;
pub mod classifier;
pub mod crop_recommender;
pub mod evaluation;
pub mod prediction_service;
pub mod preprocessing;
pub mod regressor;
pub mod stats;
pub mod trainer;
pub mod yield_predictor;
