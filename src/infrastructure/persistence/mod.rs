pub mod database;
pub mod model_store;
pub mod repositories;

pub use database::Database;
pub use model_store::{load_bundle, load_recommender, save_bundle, save_recommender};
pub use repositories::SqliteMarketplaceStore;
