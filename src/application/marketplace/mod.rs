pub mod marketplace_service;

pub use marketplace_service::{Dashboard, MarketplaceService, PurchaseInput, PurchaseResponse};
