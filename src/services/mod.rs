// Storefront
pub mod cart;
pub mod catalog;
pub mod users;

// Ordering and payment
pub mod order_status;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod reconciliation;

// Back office
pub mod admin;
