//! Server-side order pricing.
//!
//! Totals are always computed from catalog prices. Client-supplied prices
//! are accepted on the wire for compatibility and discarded here.

use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::{order::OrderLine, product};
use crate::errors::ServiceError;

/// One requested line as the client sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedLine {
    pub product_id: Uuid,
    pub quantity: u32,
    pub weight: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    pub lines: Vec<OrderLine>,
    pub total_price: Decimal,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("No order items")]
    Empty,

    #[error("Quantity for product {0} must be positive")]
    NonPositiveQuantity(Uuid),

    #[error("Product not found: {0}")]
    UnknownProduct(Uuid),

    #[error("Order total is too large")]
    TotalOverflow,
}

impl From<PricingError> for ServiceError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::UnknownProduct(_) => ServiceError::NotFound(err.to_string()),
            _ => ServiceError::InvalidRequest(err.to_string()),
        }
    }
}

/// Distinct product ids referenced by the request, in first-seen order.
pub fn referenced_products(lines: &[RequestedLine]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = Vec::with_capacity(lines.len());
    for line in lines {
        if !ids.contains(&line.product_id) {
            ids.push(line.product_id);
        }
    }
    ids
}

/// Prices `lines` against a catalog snapshot.
///
/// Each output line carries the catalog title, image and `price_per_unit`;
/// the total is the sum of `price * quantity`. Discounts are not applied.
pub fn price_order(
    lines: &[RequestedLine],
    catalog: &[product::Model],
) -> Result<PricedOrder, PricingError> {
    if lines.is_empty() {
        return Err(PricingError::Empty);
    }

    let by_id: HashMap<Uuid, &product::Model> = catalog.iter().map(|p| (p.id, p)).collect();

    let mut priced = Vec::with_capacity(lines.len());
    let mut total = Decimal::ZERO;

    for line in lines {
        if line.quantity == 0 {
            return Err(PricingError::NonPositiveQuantity(line.product_id));
        }
        let product = by_id
            .get(&line.product_id)
            .ok_or(PricingError::UnknownProduct(line.product_id))?;

        total = product
            .price_per_unit
            .checked_mul(Decimal::from(line.quantity))
            .and_then(|line_total| total.checked_add(line_total))
            .ok_or(PricingError::TotalOverflow)?;
        priced.push(OrderLine {
            product_id: product.id,
            title: product.title.clone(),
            image: product.image.clone(),
            quantity: line.quantity,
            weight: line.weight.clone(),
            price: product.price_per_unit,
        });
    }

    Ok(PricedOrder {
        lines: priced,
        total_price: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::product::WeightOptions;
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn product(price: Decimal) -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            title: "Chicken curry cut".into(),
            description: "Skinless".into(),
            price_per_unit: price,
            discount: Some(dec!(10)),
            weights: WeightOptions(vec!["500g".into(), "1kg".into()]),
            image: "/img/chicken.jpg".into(),
            stock_quantity: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(product_id: Uuid, quantity: u32) -> RequestedLine {
        RequestedLine {
            product_id,
            quantity,
            weight: "500g".into(),
        }
    }

    #[test]
    fn uses_catalog_prices_and_ignores_discount() {
        let a = product(dec!(200));
        let b = product(dec!(50));
        let priced = price_order(&[line(a.id, 2), line(b.id, 1)], &[a.clone(), b.clone()]).unwrap();

        assert_eq!(priced.total_price, dec!(450));
        assert_eq!(priced.lines[0].price, dec!(200));
        assert_eq!(priced.lines[0].title, a.title);
        assert_eq!(priced.lines[1].quantity, 1);
    }

    #[test]
    fn rejects_empty_zero_and_unknown() {
        let a = product(dec!(200));
        assert_eq!(price_order(&[], &[a.clone()]), Err(PricingError::Empty));
        assert_eq!(
            price_order(&[line(a.id, 0)], &[a.clone()]),
            Err(PricingError::NonPositiveQuantity(a.id))
        );
        let missing = Uuid::new_v4();
        assert_eq!(
            price_order(&[line(a.id, 1), line(missing, 1)], &[a]),
            Err(PricingError::UnknownProduct(missing))
        );
    }

    #[test]
    fn overflowing_total_is_rejected() {
        let a = product(Decimal::MAX / dec!(2));
        assert_eq!(
            price_order(&[line(a.id, 3)], &[a.clone()]),
            Err(PricingError::TotalOverflow)
        );
        // Each line fits but the sum does not.
        assert_eq!(
            price_order(&[line(a.id, 1), line(a.id, 1), line(a.id, 1)], &[a]),
            Err(PricingError::TotalOverflow)
        );
        assert!(matches!(
            ServiceError::from(PricingError::TotalOverflow),
            ServiceError::InvalidRequest(_)
        ));
    }

    #[test]
    fn referenced_products_are_distinct() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            referenced_products(&[line(a, 1), line(b, 2), line(a, 3)]),
            vec![a, b]
        );
    }

    proptest! {
        #[test]
        fn total_is_sum_of_catalog_price_times_quantity(
            items in prop::collection::vec((1i64..1_000_000, 1u32..50), 1..8)
        ) {
            let catalog: Vec<product::Model> = items
                .iter()
                .map(|(cents, _)| product(Decimal::new(*cents, 2)))
                .collect();
            let lines: Vec<RequestedLine> = catalog
                .iter()
                .zip(items.iter())
                .map(|(p, (_, qty))| line(p.id, *qty))
                .collect();

            let priced = price_order(&lines, &catalog).unwrap();
            let expected: Decimal = catalog
                .iter()
                .zip(items.iter())
                .map(|(p, (_, qty))| p.price_per_unit * Decimal::from(*qty))
                .sum();

            prop_assert_eq!(priced.total_price, expected);
            prop_assert!(priced.lines.iter().zip(catalog.iter()).all(|(l, p)| l.price == p.price_per_unit));
        }
    }
}
