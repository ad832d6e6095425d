use crate::domain::errors::MarketplaceError;
use crate::domain::marketplace::{
    Availability, DashboardCounts, Equipment, InventoryItem, ListingDetails, ListingFilter,
    NewEquipment, NewUser, PurchaseRequest, RentalRequest, RentalTransaction, Transaction, User,
};
use crate::domain::repositories::{
    InventoryLedger, ListingRepository, RentalRepository, UserRepository,
};
use crate::infrastructure::persistence::database::Database;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;
use tracing::{debug, info, warn};

const ITEM_COLUMNS: &str = "id, seller_id, item_name, description, category, price, \
     quantity_available, unit, location, created_at";
const TRANSACTION_COLUMNS: &str = "id, item_id, buyer_id, seller_id, quantity, total_amount, \
     delivery_address, created_at";
const EQUIPMENT_COLUMNS: &str = "id, owner_id, equipment_name, description, category, \
     rental_price_per_day, location, availability, created_at";
const RENTAL_COLUMNS: &str = "id, equipment_id, renter_id, owner_id, start_date, end_date, \
     total_amount, created_at";

/// SQLite-backed marketplace: users, listings, the purchase ledger and
/// equipment rentals.
#[derive(Clone)]
pub struct SqliteMarketplaceStore {
    database: Database,
}

impl SqliteMarketplaceStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    async fn require_user(
        conn: &mut SqliteConnection,
        user_id: i64,
    ) -> Result<(), MarketplaceError> {
        let exists = sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
        match exists {
            Some(_) => Ok(()),
            None => Err(MarketplaceError::UserNotFound { user_id }),
        }
    }

    /// Explains why a conditional write on `marketplace_items` touched no row.
    async fn listing_rejection(
        conn: &mut SqliteConnection,
        item_id: i64,
        user_id: i64,
    ) -> Result<MarketplaceError, MarketplaceError> {
        let owner = sqlx::query("SELECT seller_id FROM marketplace_items WHERE id = ?")
            .bind(item_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(match owner {
            None => MarketplaceError::ItemNotFound { item_id },
            Some(_) => MarketplaceError::NotOwner { user_id },
        })
    }
}

/// `%term%` for a `LIKE ... ESCAPE '\'` match, with the term's own
/// wildcards escaped.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let millis: i64 = row.try_get(column)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("invalid timestamp {}", millis).into(),
    })
}

fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn parsed<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = anyhow::Error>,
{
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

fn map_user(row: &SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        full_name: row.try_get("full_name")?,
        user_type: parsed(row, "user_type")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn map_item(row: &SqliteRow) -> Result<InventoryItem, sqlx::Error> {
    Ok(InventoryItem {
        id: row.try_get("id")?,
        seller_id: row.try_get("seller_id")?,
        item_name: row.try_get("item_name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        price: decimal(row, "price")?,
        quantity_available: row.try_get("quantity_available")?,
        unit: row.try_get("unit")?,
        location: row.try_get("location")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn map_transaction(row: &SqliteRow) -> Result<Transaction, sqlx::Error> {
    Ok(Transaction {
        id: row.try_get("id")?,
        item_id: row.try_get("item_id")?,
        buyer_id: row.try_get("buyer_id")?,
        seller_id: row.try_get("seller_id")?,
        quantity: row.try_get("quantity")?,
        total_amount: decimal(row, "total_amount")?,
        delivery_address: row.try_get("delivery_address")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn map_equipment(row: &SqliteRow) -> Result<Equipment, sqlx::Error> {
    Ok(Equipment {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        equipment_name: row.try_get("equipment_name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        rental_price_per_day: decimal(row, "rental_price_per_day")?,
        location: row.try_get("location")?,
        availability: parsed(row, "availability")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn map_rental(row: &SqliteRow) -> Result<RentalTransaction, sqlx::Error> {
    Ok(RentalTransaction {
        id: row.try_get("id")?,
        equipment_id: row.try_get("equipment_id")?,
        renter_id: row.try_get("renter_id")?,
        owner_id: row.try_get("owner_id")?,
        start_date: row.try_get::<NaiveDate, _>("start_date")?,
        end_date: row.try_get::<NaiveDate, _>("end_date")?,
        total_amount: decimal(row, "total_amount")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn map_all<T>(
    rows: Vec<SqliteRow>,
    map: fn(&SqliteRow) -> Result<T, sqlx::Error>,
) -> Result<Vec<T>, MarketplaceError> {
    rows.iter()
        .map(|row| map(row).map_err(MarketplaceError::from))
        .collect()
}

#[async_trait]
impl InventoryLedger for SqliteMarketplaceStore {
    async fn purchase(&self, request: &PurchaseRequest) -> Result<Transaction, MarketplaceError> {
        request.validate()?;
        let mut tx = self.database.pool.begin().await?;

        // Write first so the transaction takes the write lock up front and
        // concurrent buyers queue on the busy timeout.
        let updated = sqlx::query(
            r#"
            UPDATE marketplace_items
            SET quantity_available = quantity_available - ?
            WHERE id = ? AND quantity_available >= ? AND seller_id != ?
            RETURNING seller_id, price
            "#,
        )
        .bind(request.quantity)
        .bind(request.item_id)
        .bind(request.quantity)
        .bind(request.buyer_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            let current = sqlx::query(
                "SELECT seller_id, quantity_available FROM marketplace_items WHERE id = ?",
            )
            .bind(request.item_id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;

            let err = match current {
                None => MarketplaceError::ItemNotFound {
                    item_id: request.item_id,
                },
                Some(row) if row.try_get::<i64, _>("seller_id")? == request.buyer_id => {
                    MarketplaceError::invalid("cannot buy your own listing")
                }
                Some(row) => MarketplaceError::InsufficientStock {
                    item_id: request.item_id,
                    requested: request.quantity,
                    available: row.try_get("quantity_available")?,
                },
            };
            debug!("Purchase of item {} rejected: {}", request.item_id, err);
            return Err(err);
        };

        let seller_id: i64 = row.try_get("seller_id")?;
        let price = decimal(&row, "price")?;
        Self::require_user(&mut tx, request.buyer_id).await?;

        let total_amount = price * Decimal::from(request.quantity);
        let created_at = now_millis();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO purchase_transactions
                (item_id, buyer_id, seller_id, quantity, total_amount, delivery_address, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(request.item_id)
        .bind(request.buyer_id)
        .bind(seller_id)
        .bind(request.quantity)
        .bind(total_amount.to_string())
        .bind(&request.delivery_address)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            "Purchase {}: buyer {} bought {} of item {} for {}",
            id, request.buyer_id, request.quantity, request.item_id, total_amount
        );

        Ok(Transaction {
            id,
            item_id: request.item_id,
            buyer_id: request.buyer_id,
            seller_id,
            quantity: request.quantity,
            total_amount,
            delivery_address: request.delivery_address.clone(),
            created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
        })
    }

    async fn item(&self, item_id: i64) -> Result<Option<InventoryItem>, MarketplaceError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM marketplace_items WHERE id = ?",
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .fetch_optional(&self.database.pool)
        .await?;
        Ok(row.as_ref().map(map_item).transpose()?)
    }

    async fn purchases_by_buyer(
        &self,
        buyer_id: i64,
    ) -> Result<Vec<Transaction>, MarketplaceError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM purchase_transactions WHERE buyer_id = ? ORDER BY created_at DESC, id DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(buyer_id)
        .fetch_all(&self.database.pool)
        .await?;
        map_all(rows, map_transaction)
    }

    async fn sales_by_seller(&self, seller_id: i64) -> Result<Vec<Transaction>, MarketplaceError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM purchase_transactions WHERE seller_id = ? ORDER BY created_at DESC, id DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(seller_id)
        .fetch_all(&self.database.pool)
        .await?;
        map_all(rows, map_transaction)
    }
}

#[async_trait]
impl ListingRepository for SqliteMarketplaceStore {
    async fn create_listing(
        &self,
        seller_id: i64,
        details: &ListingDetails,
    ) -> Result<InventoryItem, MarketplaceError> {
        details.validate()?;
        let mut conn = self.database.pool.acquire().await?;
        Self::require_user(&mut conn, seller_id).await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO marketplace_items
                (seller_id, item_name, description, category, price, quantity_available, unit, location, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(seller_id)
        .bind(details.item_name.trim())
        .bind(&details.description)
        .bind(&details.category)
        .bind(details.price.to_string())
        .bind(details.quantity)
        .bind(&details.unit)
        .bind(&details.location)
        .bind(now_millis())
        .fetch_one(&mut *conn)
        .await?;

        let item = map_item(&row)?;
        info!("Seller {} listed item {} ({})", seller_id, item.id, item.item_name);
        Ok(item)
    }

    async fn update_listing(
        &self,
        item_id: i64,
        seller_id: i64,
        details: &ListingDetails,
    ) -> Result<InventoryItem, MarketplaceError> {
        details.validate()?;
        let mut conn = self.database.pool.acquire().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE marketplace_items
            SET item_name = ?, description = ?, category = ?, price = ?,
                quantity_available = ?, unit = ?, location = ?
            WHERE id = ? AND seller_id = ?
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(details.item_name.trim())
        .bind(&details.description)
        .bind(&details.category)
        .bind(details.price.to_string())
        .bind(details.quantity)
        .bind(&details.unit)
        .bind(&details.location)
        .bind(item_id)
        .bind(seller_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(map_item(&row)?),
            None => Err(Self::listing_rejection(&mut conn, item_id, seller_id).await?),
        }
    }

    async fn delete_listing(&self, item_id: i64, seller_id: i64) -> Result<(), MarketplaceError> {
        let mut conn = self.database.pool.acquire().await?;
        let result = sqlx::query("DELETE FROM marketplace_items WHERE id = ? AND seller_id = ?")
            .bind(item_id)
            .bind(seller_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            let err = Self::listing_rejection(&mut conn, item_id, seller_id).await?;
            warn!("Delete of item {} by user {} rejected: {}", item_id, seller_id, err);
            return Err(err);
        }
        info!("Seller {} deleted item {}", seller_id, item_id);
        Ok(())
    }

    async fn available_listings(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<InventoryItem>, MarketplaceError> {
        let search = filter.search().map(like_pattern);
        let category = filter.category();
        let location = filter.location().map(like_pattern);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM marketplace_items
            WHERE quantity_available > 0
              AND (? IS NULL OR item_name LIKE ? ESCAPE '\' OR description LIKE ? ESCAPE '\')
              AND (? IS NULL OR category = ? COLLATE NOCASE)
              AND (? IS NULL OR location LIKE ? ESCAPE '\')
            ORDER BY created_at DESC, id DESC
            "#,
            ITEM_COLUMNS
        ))
        .bind(search.as_deref())
        .bind(search.as_deref())
        .bind(search.as_deref())
        .bind(category)
        .bind(category)
        .bind(location.as_deref())
        .bind(location.as_deref())
        .fetch_all(&self.database.pool)
        .await?;
        map_all(rows, map_item)
    }

    async fn seller_listings(&self, seller_id: i64) -> Result<Vec<InventoryItem>, MarketplaceError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM marketplace_items WHERE seller_id = ? ORDER BY created_at DESC, id DESC",
            ITEM_COLUMNS
        ))
        .bind(seller_id)
        .fetch_all(&self.database.pool)
        .await?;
        map_all(rows, map_item)
    }
}

#[async_trait]
impl UserRepository for SqliteMarketplaceStore {
    async fn register_user(&self, user: &NewUser) -> Result<User, MarketplaceError> {
        let username = user.username.trim();
        if username.is_empty() {
            return Err(MarketplaceError::invalid("username is required"));
        }

        let row = sqlx::query(
            r#"
            INSERT INTO users (username, full_name, user_type, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, username, full_name, user_type, created_at
            "#,
        )
        .bind(username)
        .bind(user.full_name.trim())
        .bind(user.user_type.to_string())
        .bind(now_millis())
        .fetch_one(&self.database.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                MarketplaceError::invalid(format!("username '{}' is already taken", username))
            }
            other => MarketplaceError::Storage(other),
        })?;

        let user = map_user(&row)?;
        info!("Registered user {} ({})", user.id, user.username);
        Ok(user)
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<User>, MarketplaceError> {
        let row = sqlx::query(
            "SELECT id, username, full_name, user_type, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.database.pool)
        .await?;
        Ok(row.as_ref().map(map_user).transpose()?)
    }

    async fn dashboard_counts(&self, user_id: i64) -> Result<DashboardCounts, MarketplaceError> {
        let today = Utc::now().date_naive();
        let month_start = today
            .with_day(1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(0);

        let (listings, equipment, purchases, rentals) = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM marketplace_items WHERE seller_id = ?),
                (SELECT COUNT(*) FROM equipment_rentals WHERE owner_id = ?),
                (SELECT COUNT(*) FROM purchase_transactions WHERE buyer_id = ? AND created_at >= ?),
                (SELECT COUNT(*) FROM rental_transactions WHERE owner_id = ? AND end_date >= ?)
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(month_start)
        .bind(user_id)
        .bind(today)
        .fetch_one(&self.database.pool)
        .await?;

        Ok(DashboardCounts {
            listings,
            equipment,
            purchases,
            rentals,
        })
    }
}

#[async_trait]
impl RentalRepository for SqliteMarketplaceStore {
    async fn register_equipment(
        &self,
        owner_id: i64,
        equipment: &NewEquipment,
    ) -> Result<Equipment, MarketplaceError> {
        equipment.validate()?;
        let mut conn = self.database.pool.acquire().await?;
        Self::require_user(&mut conn, owner_id).await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO equipment_rentals
                (owner_id, equipment_name, description, category, rental_price_per_day, location,
                 availability, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            EQUIPMENT_COLUMNS
        ))
        .bind(owner_id)
        .bind(equipment.equipment_name.trim())
        .bind(&equipment.description)
        .bind(&equipment.category)
        .bind(equipment.rental_price_per_day.to_string())
        .bind(equipment.location.trim())
        .bind(Availability::Available.to_string())
        .bind(now_millis())
        .fetch_one(&mut *conn)
        .await?;

        let equipment = map_equipment(&row)?;
        info!("Owner {} registered equipment {}", owner_id, equipment.id);
        Ok(equipment)
    }

    async fn available_equipment(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<Equipment>, MarketplaceError> {
        let search = filter.search().map(like_pattern);
        let category = filter.category();
        let location = filter.location().map(like_pattern);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM equipment_rentals
            WHERE availability = ?
              AND (? IS NULL OR equipment_name LIKE ? ESCAPE '\' OR description LIKE ? ESCAPE '\')
              AND (? IS NULL OR category = ? COLLATE NOCASE)
              AND (? IS NULL OR location LIKE ? ESCAPE '\')
            ORDER BY created_at DESC, id DESC
            "#,
            EQUIPMENT_COLUMNS
        ))
        .bind(Availability::Available.to_string())
        .bind(search.as_deref())
        .bind(search.as_deref())
        .bind(search.as_deref())
        .bind(category)
        .bind(category)
        .bind(location.as_deref())
        .bind(location.as_deref())
        .fetch_all(&self.database.pool)
        .await?;
        map_all(rows, map_equipment)
    }

    async fn equipment_by_owner(&self, owner_id: i64) -> Result<Vec<Equipment>, MarketplaceError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM equipment_rentals WHERE owner_id = ? ORDER BY created_at DESC, id DESC",
            EQUIPMENT_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.database.pool)
        .await?;
        map_all(rows, map_equipment)
    }

    async fn request_rental(
        &self,
        request: &RentalRequest,
    ) -> Result<RentalTransaction, MarketplaceError> {
        let days = request.rental_days()?;
        let mut tx = self.database.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM equipment_rentals WHERE id = ?",
            EQUIPMENT_COLUMNS
        ))
        .bind(request.equipment_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(MarketplaceError::EquipmentNotFound {
                equipment_id: request.equipment_id,
            });
        };
        let equipment = map_equipment(&row)?;

        if equipment.owner_id == request.renter_id {
            return Err(MarketplaceError::invalid("cannot rent your own equipment"));
        }
        if equipment.availability != Availability::Available {
            return Err(MarketplaceError::invalid(format!(
                "equipment {} is not available",
                equipment.id
            )));
        }
        Self::require_user(&mut tx, request.renter_id).await?;

        let total_amount = equipment.rental_price_per_day * Decimal::from(days);
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO rental_transactions
                (equipment_id, renter_id, owner_id, start_date, end_date, total_amount, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            RENTAL_COLUMNS
        ))
        .bind(request.equipment_id)
        .bind(request.renter_id)
        .bind(equipment.owner_id)
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(total_amount.to_string())
        .bind(now_millis())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let rental = map_rental(&row)?;
        info!(
            "Rental {}: user {} rents equipment {} for {} day(s), total {}",
            rental.id, request.renter_id, request.equipment_id, days, total_amount
        );
        Ok(rental)
    }

    async fn rentals_by_renter(
        &self,
        renter_id: i64,
    ) -> Result<Vec<RentalTransaction>, MarketplaceError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM rental_transactions WHERE renter_id = ? ORDER BY created_at DESC, id DESC",
            RENTAL_COLUMNS
        ))
        .bind(renter_id)
        .fetch_all(&self.database.pool)
        .await?;
        map_all(rows, map_rental)
    }
}
