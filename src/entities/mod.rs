//! Storage records. Each aggregate is a single row; line items and the
//! shopping cart are embedded as JSON columns.

pub mod order;
pub mod product;
pub mod user;
