use crate::config::DatabaseEnvConfig;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// Marketplace database wrapper
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::connect(&DatabaseEnvConfig {
            url: db_url.to_string(),
            ..Default::default()
        })
        .await
    }

    pub async fn connect(config: &DatabaseEnvConfig) -> Result<Self> {
        let db_url = config.url.as_str();
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part.split('?').next().unwrap_or(path_part));
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                full_name TEXT NOT NULL,
                user_type TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create users table")?;

        // Stock never goes negative
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS marketplace_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                seller_id INTEGER NOT NULL REFERENCES users (id),
                item_name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                price TEXT NOT NULL,
                quantity_available INTEGER NOT NULL CHECK (quantity_available >= 0),
                unit TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_items_seller
            ON marketplace_items (seller_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create marketplace_items table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS purchase_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL,
                buyer_id INTEGER NOT NULL REFERENCES users (id),
                seller_id INTEGER NOT NULL REFERENCES users (id),
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                total_amount TEXT NOT NULL,
                delivery_address TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_purchases_buyer
            ON purchase_transactions (buyer_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_purchases_seller
            ON purchase_transactions (seller_id, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create purchase_transactions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS equipment_rentals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL REFERENCES users (id),
                equipment_name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                rental_price_per_day TEXT NOT NULL,
                location TEXT NOT NULL DEFAULT '',
                availability TEXT NOT NULL DEFAULT 'available',
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_equipment_owner
            ON equipment_rentals (owner_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create equipment_rentals table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rental_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                equipment_id INTEGER NOT NULL REFERENCES equipment_rentals (id),
                renter_id INTEGER NOT NULL REFERENCES users (id),
                owner_id INTEGER NOT NULL REFERENCES users (id),
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rentals_renter
            ON rental_transactions (renter_id, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create rental_transactions table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
