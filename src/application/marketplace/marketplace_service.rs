use crate::domain::errors::MarketplaceError;
use crate::domain::marketplace::{
    DashboardCounts, Equipment, InventoryItem, ListingDetails, ListingFilter, NewEquipment,
    NewUser, PurchaseRequest, RentalRequest, RentalTransaction, Transaction, User,
};
use crate::domain::repositories::{
    InventoryLedger, ListingRepository, RentalRepository, UserRepository,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Purchase request as it arrives from a form or JSON body
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseInput {
    pub item_id: i64,
    pub buyer_id: i64,
    pub quantity: i64,
    #[serde(default)]
    pub delivery_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PurchaseResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i64>,
}

impl PurchaseResponse {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            transaction_id: None,
        }
    }
}

/// Everything a signed-in user sees on their dashboard
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub user: User,
    pub counts: DashboardCounts,
    pub recent_purchases: Vec<Transaction>,
    pub recent_sales: Vec<Transaction>,
}

const RECENT_LIMIT: usize = 5;

/// Marketplace operations over the repository traits.
///
/// `purchase` is the request boundary: it never returns an error, only a
/// `PurchaseResponse` whose message is fit to show the buyer. The other
/// operations return `MarketplaceError` for the caller to present.
#[derive(Clone)]
pub struct MarketplaceService {
    users: Arc<dyn UserRepository>,
    ledger: Arc<dyn InventoryLedger>,
    listings: Arc<dyn ListingRepository>,
    rentals: Arc<dyn RentalRepository>,
}

impl MarketplaceService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        ledger: Arc<dyn InventoryLedger>,
        listings: Arc<dyn ListingRepository>,
        rentals: Arc<dyn RentalRepository>,
    ) -> Self {
        Self {
            users,
            ledger,
            listings,
            rentals,
        }
    }

    pub async fn register_user(&self, user: &NewUser) -> Result<User, MarketplaceError> {
        let user = self.users.register_user(user).await?;
        info!("Registered {} user '{}' ({})", user.user_type, user.username, user.id);
        Ok(user)
    }

    async fn require_user(&self, user_id: i64) -> Result<User, MarketplaceError> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or(MarketplaceError::UserNotFound { user_id })
    }

    pub async fn purchase(&self, input: &PurchaseInput) -> PurchaseResponse {
        match self.try_purchase(input).await {
            Ok((transaction, item_name)) => PurchaseResponse {
                success: true,
                message: format!(
                    "Successfully purchased {} units of {}",
                    transaction.quantity, item_name
                ),
                transaction_id: Some(transaction.id),
            },
            Err(MarketplaceError::InsufficientStock { .. }) => {
                PurchaseResponse::rejected("Insufficient quantity available")
            }
            Err(e) => {
                warn!("Purchase of item {} by {} failed: {}", input.item_id, input.buyer_id, e);
                PurchaseResponse::rejected(format!("Purchase failed: {}", e))
            }
        }
    }

    async fn try_purchase(
        &self,
        input: &PurchaseInput,
    ) -> Result<(Transaction, String), MarketplaceError> {
        self.require_user(input.buyer_id).await?;

        let request = PurchaseRequest {
            item_id: input.item_id,
            buyer_id: input.buyer_id,
            quantity: input.quantity,
            delivery_address: input
                .delivery_address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
        };
        let transaction = self.ledger.purchase(&request).await?;

        // The listing may have been deleted since; the sale still stands
        let item_name = match self.ledger.item(input.item_id).await {
            Ok(Some(item)) => item.item_name,
            _ => format!("item {}", input.item_id),
        };
        Ok((transaction, item_name))
    }

    pub async fn create_listing(
        &self,
        seller_id: i64,
        details: &ListingDetails,
    ) -> Result<InventoryItem, MarketplaceError> {
        self.require_user(seller_id).await?;
        let item = self.listings.create_listing(seller_id, details).await?;
        info!("User {} listed '{}' ({} {})", seller_id, item.item_name, item.quantity_available, item.unit);
        Ok(item)
    }

    pub async fn update_listing(
        &self,
        item_id: i64,
        seller_id: i64,
        details: &ListingDetails,
    ) -> Result<InventoryItem, MarketplaceError> {
        self.listings.update_listing(item_id, seller_id, details).await
    }

    pub async fn delete_listing(&self, item_id: i64, seller_id: i64) -> Result<(), MarketplaceError> {
        self.listings.delete_listing(item_id, seller_id).await?;
        info!("User {} deleted listing {}", seller_id, item_id);
        Ok(())
    }

    pub async fn listing(&self, item_id: i64) -> Result<InventoryItem, MarketplaceError> {
        self.ledger
            .item(item_id)
            .await?
            .ok_or(MarketplaceError::ItemNotFound { item_id })
    }

    pub async fn available_listings(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<InventoryItem>, MarketplaceError> {
        self.listings.available_listings(filter).await
    }

    pub async fn seller_listings(&self, seller_id: i64) -> Result<Vec<InventoryItem>, MarketplaceError> {
        self.listings.seller_listings(seller_id).await
    }

    pub async fn purchases_by_buyer(&self, buyer_id: i64) -> Result<Vec<Transaction>, MarketplaceError> {
        self.ledger.purchases_by_buyer(buyer_id).await
    }

    pub async fn sales_by_seller(&self, seller_id: i64) -> Result<Vec<Transaction>, MarketplaceError> {
        self.ledger.sales_by_seller(seller_id).await
    }

    pub async fn register_equipment(
        &self,
        owner_id: i64,
        equipment: &NewEquipment,
    ) -> Result<Equipment, MarketplaceError> {
        self.require_user(owner_id).await?;
        let equipment = self.rentals.register_equipment(owner_id, equipment).await?;
        info!("User {} listed equipment '{}'", owner_id, equipment.equipment_name);
        Ok(equipment)
    }

    pub async fn available_equipment(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<Equipment>, MarketplaceError> {
        self.rentals.available_equipment(filter).await
    }

    pub async fn equipment_by_owner(&self, owner_id: i64) -> Result<Vec<Equipment>, MarketplaceError> {
        self.rentals.equipment_by_owner(owner_id).await
    }

    pub async fn request_rental(
        &self,
        request: &RentalRequest,
    ) -> Result<RentalTransaction, MarketplaceError> {
        let rental = self.rentals.request_rental(request).await?;
        info!(
            "User {} rented equipment {} from {} to {} for {}",
            rental.renter_id, rental.equipment_id, rental.start_date, rental.end_date, rental.total_amount
        );
        Ok(rental)
    }

    pub async fn rentals_by_renter(
        &self,
        renter_id: i64,
    ) -> Result<Vec<RentalTransaction>, MarketplaceError> {
        self.rentals.rentals_by_renter(renter_id).await
    }

    pub async fn dashboard(&self, user_id: i64) -> Result<Dashboard, MarketplaceError> {
        let user = self.require_user(user_id).await?;
        let counts = self.users.dashboard_counts(user_id).await?;

        let mut recent_purchases = self.ledger.purchases_by_buyer(user_id).await?;
        recent_purchases.truncate(RECENT_LIMIT);
        let mut recent_sales = self.ledger.sales_by_seller(user_id).await?;
        recent_sales.truncate(RECENT_LIMIT);

        Ok(Dashboard {
            user,
            counts,
            recent_purchases,
            recent_sales,
        })
    }
}
