use crate::domain::errors::MarketplaceError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserType {
    Farmer,
    Buyer,
    Both,
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserType::Farmer => write!(f, "farmer"),
            UserType::Buyer => write!(f, "buyer"),
            UserType::Both => write!(f, "both"),
        }
    }
}

impl FromStr for UserType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "farmer" => Ok(UserType::Farmer),
            "buyer" => Ok(UserType::Buyer),
            "both" => Ok(UserType::Both),
            _ => anyhow::bail!("Invalid user type: {}. Must be 'farmer', 'buyer' or 'both'", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub user_type: UserType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub user_type: UserType,
}

/// A marketplace listing. `quantity_available` never goes below zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: i64,
    pub seller_id: i64,
    pub item_name: String,
    pub description: String,
    pub category: String,
    pub price: Decimal,
    pub quantity_available: i64,
    pub unit: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

/// Fields a seller controls when creating or editing a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDetails {
    pub item_name: String,
    pub description: String,
    pub category: String,
    pub price: Decimal,
    pub quantity: i64,
    pub unit: String,
    pub location: String,
}

impl ListingDetails {
    pub fn validate(&self) -> Result<(), MarketplaceError> {
        if self.item_name.trim().is_empty() {
            return Err(MarketplaceError::invalid("item name is required"));
        }
        if self.price < Decimal::ZERO {
            return Err(MarketplaceError::InvalidPrice { price: self.price });
        }
        if self.quantity < 0 {
            return Err(MarketplaceError::invalid("quantity cannot be negative"));
        }
        Ok(())
    }
}

/// Browse filters shared by produce listings and rental equipment.
///
/// `search` matches the name or description, `location` is a substring
/// match and `category` must match exactly. Matching ignores ASCII case.
/// Blank values, and the category `all`, do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

fn active(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ListingFilter {
    pub fn search(&self) -> Option<&str> {
        active(&self.search)
    }

    pub fn category(&self) -> Option<&str> {
        active(&self.category).filter(|c| !c.eq_ignore_ascii_case("all"))
    }

    pub fn location(&self) -> Option<&str> {
        active(&self.location)
    }

    pub fn matches(&self, name: &str, description: &str, category: &str, location: &str) -> bool {
        let contains = |haystack: &str, needle: &str| {
            haystack
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase())
        };
        self.search()
            .is_none_or(|s| contains(name, s) || contains(description, s))
            && self
                .category()
                .is_none_or(|c| category.eq_ignore_ascii_case(c))
            && self.location().is_none_or(|l| contains(location, l))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub item_id: i64,
    pub buyer_id: i64,
    pub quantity: i64,
    pub delivery_address: Option<String>,
}

impl PurchaseRequest {
    pub fn new(item_id: i64, buyer_id: i64, quantity: i64) -> Self {
        Self {
            item_id,
            buyer_id,
            quantity,
            delivery_address: None,
        }
    }

    pub fn validate(&self) -> Result<(), MarketplaceError> {
        if self.quantity <= 0 {
            return Err(MarketplaceError::invalid("quantity must be at least 1"));
        }
        Ok(())
    }
}

/// Append-only purchase record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub item_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub quantity: i64,
    pub total_amount: Decimal,
    pub delivery_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Available,
    Unavailable,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Available => write!(f, "available"),
            Availability::Unavailable => write!(f, "unavailable"),
        }
    }
}

impl FromStr for Availability {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(Availability::Available),
            "unavailable" => Ok(Availability::Unavailable),
            _ => anyhow::bail!("Invalid availability: {}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: i64,
    pub owner_id: i64,
    pub equipment_name: String,
    pub description: String,
    pub category: String,
    pub rental_price_per_day: Decimal,
    pub location: String,
    pub availability: Availability,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEquipment {
    pub equipment_name: String,
    pub description: String,
    pub category: String,
    pub rental_price_per_day: Decimal,
    pub location: String,
}

impl NewEquipment {
    pub fn validate(&self) -> Result<(), MarketplaceError> {
        if self.equipment_name.trim().is_empty() {
            return Err(MarketplaceError::invalid("equipment name is required"));
        }
        if self.rental_price_per_day < Decimal::ZERO {
            return Err(MarketplaceError::InvalidPrice {
                price: self.rental_price_per_day,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalRequest {
    pub equipment_id: i64,
    pub renter_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl RentalRequest {
    /// Inclusive day count; both the start and end day are billed.
    pub fn rental_days(&self) -> Result<i64, MarketplaceError> {
        let days = (self.end_date - self.start_date).num_days() + 1;
        if days < 1 {
            return Err(MarketplaceError::invalid("end date is before start date"));
        }
        Ok(days)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalTransaction {
    pub id: i64,
    pub equipment_id: i64,
    pub renter_id: i64,
    pub owner_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardCounts {
    pub listings: i64,
    pub equipment: i64,
    /// Purchases made during the current calendar month
    pub purchases: i64,
    /// Rentals of the user's equipment that have not ended yet
    pub rentals: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn listing(price: Decimal, quantity: i64) -> ListingDetails {
        ListingDetails {
            item_name: "Basmati".to_string(),
            description: String::new(),
            category: "Grain".to_string(),
            price,
            quantity,
            unit: "kg".to_string(),
            location: "Karnal".to_string(),
        }
    }

    #[test]
    fn test_listing_validation() {
        assert!(listing(dec!(0), 0).validate().is_ok());
        assert!(matches!(
            listing(dec!(-1), 5).validate(),
            Err(MarketplaceError::InvalidPrice { .. })
        ));
        assert!(listing(dec!(10), -1).validate().is_err());
    }

    #[test]
    fn test_purchase_quantity_must_be_positive() {
        assert!(PurchaseRequest::new(1, 2, 0).validate().is_err());
        assert!(PurchaseRequest::new(1, 2, 1).validate().is_ok());
    }

    #[test]
    fn test_rental_days_are_inclusive() {
        let request = RentalRequest {
            equipment_id: 1,
            renter_id: 2,
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        };
        assert_eq!(request.rental_days().unwrap(), 3);

        let reversed = RentalRequest {
            start_date: request.end_date,
            end_date: request.start_date,
            ..request
        };
        assert!(reversed.rental_days().is_err());
    }

    #[test]
    fn test_listing_filter_matching() {
        let any = ListingFilter::default();
        assert!(any.matches("Onions", "", "vegetables", "Nashik"));

        let filter = ListingFilter {
            search: Some("red".to_string()),
            category: Some("Vegetables".to_string()),
            location: Some("nash".to_string()),
        };
        assert!(filter.matches("Onions", "Red onions", "vegetables", "Nashik"));
        assert!(!filter.matches("Onions", "White onions", "vegetables", "Nashik"));
        assert!(!filter.matches("Red chilli", "", "spices", "Nashik"));
        assert!(!filter.matches("Red onions", "", "vegetables", "Pune"));

        let blank = ListingFilter {
            search: Some("  ".to_string()),
            category: Some("all".to_string()),
            location: None,
        };
        assert_eq!(blank.search(), None);
        assert_eq!(blank.category(), None);
        assert!(blank.matches("Wheat", "", "grain", "Karnal"));
    }

    #[test]
    fn test_user_type_parsing() {
        assert_eq!("Farmer".parse::<UserType>().unwrap(), UserType::Farmer);
        assert!("admin".parse::<UserType>().is_err());
        assert_eq!(UserType::Both.to_string(), "both");
    }
}
