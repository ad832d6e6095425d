pub mod types;

pub use types::{
    Availability, DashboardCounts, Equipment, InventoryItem, ListingDetails, ListingFilter,
    NewEquipment, NewUser, PurchaseRequest, RentalRequest, RentalTransaction, Transaction, User,
    UserType,
};
