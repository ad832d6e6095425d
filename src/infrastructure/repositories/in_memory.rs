//! In-Memory Marketplace Ledger
//!
//! Implements `InventoryLedger` and `ListingRepository` on plain collections
//! guarded by one `tokio::sync::Mutex`. Every purchase runs its stock check,
//! decrement and log append under that lock, which gives the same
//! all-or-nothing behaviour as the SQLite store.
//!
//! # Limitations
//!
//! - Data is lost on application restart
//! - Users are not tracked, so seller and buyer ids are taken on trust

use crate::domain::errors::MarketplaceError;
use crate::domain::marketplace::{
    InventoryItem, ListingDetails, ListingFilter, PurchaseRequest, Transaction,
};
use crate::domain::repositories::{InventoryLedger, ListingRepository};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Default)]
struct LedgerState {
    items: BTreeMap<i64, InventoryItem>,
    transactions: Vec<Transaction>,
    next_item_id: i64,
    next_transaction_id: i64,
}

impl LedgerState {
    fn owned_item(&mut self, item_id: i64, seller_id: i64) -> Result<&mut InventoryItem, MarketplaceError> {
        let item = self
            .items
            .get_mut(&item_id)
            .ok_or(MarketplaceError::ItemNotFound { item_id })?;
        if item.seller_id != seller_id {
            return Err(MarketplaceError::NotOwner { user_id: seller_id });
        }
        Ok(item)
    }
}

/// In-memory ledger, cheap to clone (clones share state)
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

fn newest_first(mut items: Vec<InventoryItem>) -> Vec<InventoryItem> {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    items
}

#[async_trait]
impl InventoryLedger for InMemoryLedger {
    async fn purchase(&self, request: &PurchaseRequest) -> Result<Transaction, MarketplaceError> {
        request.validate()?;
        let mut state = self.state.lock().await;

        let item = state
            .items
            .get_mut(&request.item_id)
            .ok_or(MarketplaceError::ItemNotFound {
                item_id: request.item_id,
            })?;
        if item.seller_id == request.buyer_id {
            return Err(MarketplaceError::invalid("cannot buy your own listing"));
        }
        if item.quantity_available < request.quantity {
            return Err(MarketplaceError::InsufficientStock {
                item_id: request.item_id,
                requested: request.quantity,
                available: item.quantity_available,
            });
        }

        item.quantity_available -= request.quantity;
        let seller_id = item.seller_id;
        let total_amount = item.price * Decimal::from(request.quantity);

        state.next_transaction_id += 1;
        let transaction = Transaction {
            id: state.next_transaction_id,
            item_id: request.item_id,
            buyer_id: request.buyer_id,
            seller_id,
            quantity: request.quantity,
            total_amount,
            delivery_address: request.delivery_address.clone(),
            created_at: Utc::now(),
        };
        state.transactions.push(transaction.clone());

        info!(
            "Purchase {}: buyer {} bought {} of item {}",
            transaction.id, request.buyer_id, request.quantity, request.item_id
        );
        Ok(transaction)
    }

    async fn item(&self, item_id: i64) -> Result<Option<InventoryItem>, MarketplaceError> {
        Ok(self.state.lock().await.items.get(&item_id).cloned())
    }

    async fn purchases_by_buyer(
        &self,
        buyer_id: i64,
    ) -> Result<Vec<Transaction>, MarketplaceError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.buyer_id == buyer_id)
            .cloned()
            .collect())
    }

    async fn sales_by_seller(&self, seller_id: i64) -> Result<Vec<Transaction>, MarketplaceError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.seller_id == seller_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ListingRepository for InMemoryLedger {
    async fn create_listing(
        &self,
        seller_id: i64,
        details: &ListingDetails,
    ) -> Result<InventoryItem, MarketplaceError> {
        details.validate()?;
        let mut state = self.state.lock().await;
        state.next_item_id += 1;
        let item = InventoryItem {
            id: state.next_item_id,
            seller_id,
            item_name: details.item_name.trim().to_string(),
            description: details.description.clone(),
            category: details.category.clone(),
            price: details.price,
            quantity_available: details.quantity,
            unit: details.unit.clone(),
            location: details.location.clone(),
            created_at: Utc::now(),
        };
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_listing(
        &self,
        item_id: i64,
        seller_id: i64,
        details: &ListingDetails,
    ) -> Result<InventoryItem, MarketplaceError> {
        details.validate()?;
        let mut state = self.state.lock().await;
        let item = state.owned_item(item_id, seller_id)?;
        item.item_name = details.item_name.trim().to_string();
        item.description = details.description.clone();
        item.category = details.category.clone();
        item.price = details.price;
        item.quantity_available = details.quantity;
        item.unit = details.unit.clone();
        item.location = details.location.clone();
        Ok(item.clone())
    }

    async fn delete_listing(&self, item_id: i64, seller_id: i64) -> Result<(), MarketplaceError> {
        let mut state = self.state.lock().await;
        state.owned_item(item_id, seller_id)?;
        state.items.remove(&item_id);
        Ok(())
    }

    async fn available_listings(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<InventoryItem>, MarketplaceError> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .items
                .values()
                .filter(|i| i.quantity_available > 0)
                .filter(|i| filter.matches(&i.item_name, &i.description, &i.category, &i.location))
                .cloned()
                .collect(),
        ))
    }

    async fn seller_listings(&self, seller_id: i64) -> Result<Vec<InventoryItem>, MarketplaceError> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .items
                .values()
                .filter(|i| i.seller_id == seller_id)
                .cloned()
                .collect(),
        ))
    }
}
