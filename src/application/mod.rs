// Startup lifecycle
pub mod context;

// FarmCom marketplace services
pub mod marketplace;

// Yield model training and serving
pub mod ml;
