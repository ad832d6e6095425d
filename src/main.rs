//! FarmCom marketplace command line.
//!
//! # Usage
//! ```sh
//! cargo run -- user add --username asha --full-name "Asha Patil" --user-type farmer
//! cargo run -- sell --seller 1 --name Tomatoes --price 40 --quantity 10 --unit kg
//! cargo run -- list --search tomato --location pune
//! cargo run -- buy --buyer 2 --item 1 --quantity 3
//! ```
//!
//! # Environment Variables
//! - `DATABASE_URL` - SQLite database (default: sqlite://data/farmcom.db)
//! - `DATABASE_BUSY_TIMEOUT_MS` - How long a write waits for the lock (default: 5000)

use agrodata::application::context::AppContext;
use agrodata::application::marketplace::{MarketplaceService, PurchaseInput};
use agrodata::config::Config;
use agrodata::domain::marketplace::{
    Equipment, InventoryItem, ListingDetails, ListingFilter, NewEquipment, NewUser, RentalRequest,
    Transaction, UserType,
};
use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "farmcom", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// List produce for sale
    Sell(ListingArgs),
    /// Change one of your listings
    Update {
        #[arg(long)]
        item: i64,
        #[command(flatten)]
        listing: ListingArgs,
    },
    /// Remove one of your listings
    Unlist {
        #[arg(long)]
        seller: i64,
        #[arg(long)]
        item: i64,
    },
    /// Browse listings with stock left, or every listing of one seller
    List {
        #[arg(long)]
        seller: Option<i64>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Buy from a listing
    Buy {
        #[arg(long)]
        buyer: i64,
        #[arg(long)]
        item: i64,
        #[arg(long)]
        quantity: i64,
        #[arg(long)]
        address: Option<String>,
    },
    /// Purchases, sales and rentals of a user
    History {
        #[arg(long)]
        user: i64,
    },
    /// Manage rental equipment
    #[command(subcommand)]
    Equipment(EquipmentCommand),
    /// Rent equipment for a date range (inclusive)
    Rent {
        #[arg(long)]
        renter: i64,
        #[arg(long)]
        equipment: i64,
        /// YYYY-MM-DD
        #[arg(long)]
        start: NaiveDate,
        /// YYYY-MM-DD
        #[arg(long)]
        end: NaiveDate,
    },
    /// Summary counts and recent activity
    Dashboard {
        #[arg(long)]
        user: i64,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        full_name: String,
        /// farmer, buyer or both
        #[arg(long, default_value = "farmer")]
        user_type: String,
    },
}

#[derive(Subcommand, Debug)]
enum EquipmentCommand {
    Add {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        name: String,
        /// Price per day
        #[arg(long)]
        rate: Decimal,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        location: String,
    },
    /// Browse available equipment, or everything one owner has listed
    List {
        #[arg(long)]
        owner: Option<i64>,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Text to look for in the name or description
    #[arg(long)]
    search: Option<String>,
    /// Exact category ("all" for any)
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    location: Option<String>,
}

impl From<FilterArgs> for ListingFilter {
    fn from(args: FilterArgs) -> Self {
        ListingFilter {
            search: args.search,
            category: args.category,
            location: args.location,
        }
    }
}

#[derive(Args, Debug)]
struct ListingArgs {
    #[arg(long)]
    seller: i64,
    #[arg(long)]
    name: String,
    #[arg(long)]
    price: Decimal,
    #[arg(long)]
    quantity: i64,
    #[arg(long, default_value = "kg")]
    unit: String,
    #[arg(long, default_value = "")]
    category: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "")]
    location: String,
}

impl ListingArgs {
    fn details(&self) -> ListingDetails {
        ListingDetails {
            item_name: self.name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            price: self.price,
            quantity: self.quantity,
            unit: self.unit.clone(),
            location: self.location.clone(),
        }
    }
}

fn print_items(items: &[InventoryItem]) {
    if items.is_empty() {
        println!("No listings.");
        return;
    }
    println!(
        "{:>5}  {:<24} {:>10} {:>8} {:<6} {:>7}  {}",
        "ID", "ITEM", "PRICE", "STOCK", "UNIT", "SELLER", "LOCATION"
    );
    for item in items {
        println!(
            "{:>5}  {:<24} {:>10} {:>8} {:<6} {:>7}  {}",
            item.id,
            item.item_name,
            item.price,
            item.quantity_available,
            item.unit,
            item.seller_id,
            item.location
        );
    }
}

fn print_equipment(equipment: &[Equipment]) {
    if equipment.is_empty() {
        println!("No equipment available.");
        return;
    }
    for e in equipment {
        println!(
            "{:>5}  {:<24} {:>10}/day  {:<12} owner {}  {}",
            e.id, e.equipment_name, e.rental_price_per_day, e.availability, e.owner_id, e.location
        );
    }
}

fn print_transactions(title: &str, transactions: &[Transaction]) {
    println!("{} ({})", title, transactions.len());
    for t in transactions {
        println!(
            "  #{:<5} item {:<5} qty {:<5} total {:>10}  {}",
            t.id,
            t.item_id,
            t.quantity,
            t.total_amount,
            t.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}

async fn run(marketplace: &MarketplaceService, command: Command) -> Result<()> {
    match command {
        Command::User(UserCommand::Add {
            username,
            full_name,
            user_type,
        }) => {
            let user = marketplace
                .register_user(&NewUser {
                    username,
                    full_name,
                    user_type: UserType::from_str(&user_type)?,
                })
                .await?;
            println!("Registered user {} ({}) with id {}", user.username, user.user_type, user.id);
        }
        Command::Sell(listing) => {
            let item = marketplace.create_listing(listing.seller, &listing.details()).await?;
            println!("Item listed for sale with id {}", item.id);
        }
        Command::Update { item, listing } => {
            let item = marketplace
                .update_listing(item, listing.seller, &listing.details())
                .await?;
            println!("Listing {} updated", item.id);
        }
        Command::Unlist { seller, item } => {
            marketplace.delete_listing(item, seller).await?;
            println!("Listing {} deleted", item);
        }
        Command::List { seller, filter } => {
            let items = match seller {
                Some(seller) => marketplace.seller_listings(seller).await?,
                None => marketplace.available_listings(&filter.into()).await?,
            };
            print_items(&items);
        }
        Command::Buy {
            buyer,
            item,
            quantity,
            address,
        } => {
            let response = marketplace
                .purchase(&PurchaseInput {
                    item_id: item,
                    buyer_id: buyer,
                    quantity,
                    delivery_address: address,
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            anyhow::ensure!(response.success, "purchase rejected");
        }
        Command::History { user } => {
            print_transactions("Purchases", &marketplace.purchases_by_buyer(user).await?);
            print_transactions("Sales", &marketplace.sales_by_seller(user).await?);
            let rentals = marketplace.rentals_by_renter(user).await?;
            println!("Rentals ({})", rentals.len());
            for r in rentals {
                println!(
                    "  #{:<5} equipment {:<5} {} to {}  total {}",
                    r.id, r.equipment_id, r.start_date, r.end_date, r.total_amount
                );
            }
        }
        Command::Equipment(EquipmentCommand::Add {
            owner,
            name,
            rate,
            category,
            description,
            location,
        }) => {
            let equipment = marketplace
                .register_equipment(
                    owner,
                    &NewEquipment {
                        equipment_name: name,
                        description,
                        category,
                        rental_price_per_day: rate,
                        location,
                    },
                )
                .await?;
            println!("Equipment listed with id {}", equipment.id);
        }
        Command::Equipment(EquipmentCommand::List { owner, filter }) => {
            let equipment = match owner {
                Some(owner) => marketplace.equipment_by_owner(owner).await?,
                None => marketplace.available_equipment(&filter.into()).await?,
            };
            print_equipment(&equipment);
        }
        Command::Rent {
            renter,
            equipment,
            start,
            end,
        } => {
            let rental = marketplace
                .request_rental(&RentalRequest {
                    equipment_id: equipment,
                    renter_id: renter,
                    start_date: start,
                    end_date: end,
                })
                .await?;
            println!("Rental {} booked, total {}", rental.id, rental.total_amount);
        }
        Command::Dashboard { user } => {
            let dashboard = marketplace.dashboard(user).await?;
            println!("{}", serde_json::to_string_pretty(&dashboard)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::new(Config::from_env()?)
        .without_model()
        .connect()
        .await?;

    run(ctx.marketplace(), cli.command).await
}
