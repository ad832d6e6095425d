// Crop-yield model domain (encoding, tables, requests)
pub mod ml;

// FarmCom marketplace domain
pub mod marketplace;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
