pub mod dataset;
pub mod encoder;
pub mod feature_registry;
pub mod prediction;
