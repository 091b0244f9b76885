pub mod auth;
pub mod checkout;
pub mod cleanup;
pub mod inventory;
pub mod payment;
pub mod pricing;
pub mod seat_map;
pub mod selection;
pub mod sessions;
pub mod ticketing;
