pub mod dataset;
pub mod persistence;
pub mod repositories;

pub use persistence::SqliteMarketplaceStore;
pub use repositories::InMemoryLedger;
