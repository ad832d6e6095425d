//! Repository Pattern Abstractions
//!
//! Persistence seams for the FarmCom marketplace. Business logic in
//! `application::marketplace` only talks to these traits.
//!
//! # Implementations
//!
//! - `SqliteMarketplaceStore` (infrastructure::persistence) implements all of
//!   them on top of a single SQLite database.
//! - `InMemoryLedger` (infrastructure::repositories) implements
//!   `InventoryLedger` and `ListingRepository` behind one mutex, for tests
//!   and single-instance use.
//!
//! # Atomicity
//!
//! `InventoryLedger::purchase` is the one operation with a concurrency
//! contract: the stock check, the decrement and the transaction insert
//! happen as one unit, so concurrent buyers can never drive stock negative.

use crate::domain::errors::MarketplaceError;
use crate::domain::marketplace::{
    DashboardCounts, Equipment, InventoryItem, ListingDetails, ListingFilter, NewEquipment,
    NewUser, PurchaseRequest, RentalRequest, RentalTransaction, Transaction, User,
};
use async_trait::async_trait;

/// Stock-adjusting purchases and the transaction log they append to
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Buy `quantity` units. Succeeds only if `quantity <= quantity_available`;
    /// on rejection neither stock nor the transaction log changes.
    async fn purchase(&self, request: &PurchaseRequest) -> Result<Transaction, MarketplaceError>;

    async fn item(&self, item_id: i64) -> Result<Option<InventoryItem>, MarketplaceError>;

    async fn purchases_by_buyer(&self, buyer_id: i64)
    -> Result<Vec<Transaction>, MarketplaceError>;

    async fn sales_by_seller(&self, seller_id: i64) -> Result<Vec<Transaction>, MarketplaceError>;
}

/// Listing lifecycle. Edits and deletes are restricted to the seller.
#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn create_listing(
        &self,
        seller_id: i64,
        details: &ListingDetails,
    ) -> Result<InventoryItem, MarketplaceError>;

    async fn update_listing(
        &self,
        item_id: i64,
        seller_id: i64,
        details: &ListingDetails,
    ) -> Result<InventoryItem, MarketplaceError>;

    async fn delete_listing(&self, item_id: i64, seller_id: i64) -> Result<(), MarketplaceError>;

    /// Listings with stock left that pass `filter`, newest first
    async fn available_listings(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<InventoryItem>, MarketplaceError>;

    async fn seller_listings(&self, seller_id: i64) -> Result<Vec<InventoryItem>, MarketplaceError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn register_user(&self, user: &NewUser) -> Result<User, MarketplaceError>;

    async fn find_user(&self, user_id: i64) -> Result<Option<User>, MarketplaceError>;

    async fn dashboard_counts(&self, user_id: i64) -> Result<DashboardCounts, MarketplaceError>;
}

/// Equipment rental listings and requests
#[async_trait]
pub trait RentalRepository: Send + Sync {
    async fn register_equipment(
        &self,
        owner_id: i64,
        equipment: &NewEquipment,
    ) -> Result<Equipment, MarketplaceError>;

    /// Available equipment that passes `filter`, newest first
    async fn available_equipment(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<Equipment>, MarketplaceError>;

    /// Everything `owner_id` has listed, whatever its availability
    async fn equipment_by_owner(&self, owner_id: i64) -> Result<Vec<Equipment>, MarketplaceError>;

    async fn request_rental(
        &self,
        request: &RentalRequest,
    ) -> Result<RentalTransaction, MarketplaceError>;

    async fn rentals_by_renter(
        &self,
        renter_id: i64,
    ) -> Result<Vec<RentalTransaction>, MarketplaceError>;
}
