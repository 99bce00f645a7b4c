//! Outbound payment gateway integration.
//!
//! The engine talks to the gateway through [`PaymentGateway`] so tests and
//! alternative providers can stand in for the Cashfree client.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod cashfree;
pub mod signature;

pub use cashfree::CashfreeGateway;
pub use signature::{SignatureError, WebhookVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};

const GATEWAY_ORDER_PREFIX: &str = "order_";

/// Gateway-side order id for the first checkout attempt of an order.
///
/// The mapping is deterministic so webhooks can be traced back without a
/// lookup table.
pub fn gateway_order_id(order_id: Uuid) -> String {
    gateway_attempt_id(order_id, 1)
}

/// Gateway-side order id for a given checkout attempt. The gateway refuses
/// to create the same order id twice, so every retry gets a `_<attempt>`
/// suffix.
pub fn gateway_attempt_id(order_id: Uuid, attempt: u32) -> String {
    if attempt <= 1 {
        format!("{GATEWAY_ORDER_PREFIX}{}", order_id.simple())
    } else {
        format!("{GATEWAY_ORDER_PREFIX}{}_{attempt}", order_id.simple())
    }
}

/// Attempt number encoded in a gateway order id, 1 when unsuffixed.
pub fn gateway_attempt(value: &str) -> Option<u32> {
    let raw = value.trim();
    let rest = raw.strip_prefix(GATEWAY_ORDER_PREFIX).unwrap_or(raw);
    match rest.split_once('_') {
        Some((_, attempt)) => attempt.parse().ok(),
        None => Some(1),
    }
}

/// Inverse of [`gateway_attempt_id`]. A bare UUID is accepted too.
pub fn parse_gateway_order_id(value: &str) -> Option<Uuid> {
    let raw = value.trim();
    let rest = raw.strip_prefix(GATEWAY_ORDER_PREFIX).unwrap_or(raw);
    let candidate = rest.split_once('_').map_or(rest, |(id, _)| id);
    Uuid::parse_str(candidate).ok()
}

/// Fills `{app_order_id}` in the configured template, or appends it as a
/// query parameter. `{order_id}` is left for the gateway to substitute.
pub fn render_return_url(template: &str, app_order_id: Uuid) -> String {
    if template.contains("{app_order_id}") {
        return template.replace("{app_order_id}", &app_order_id.to_string());
    }
    let sep = if template.contains('?') { '&' } else { '?' };
    format!("{template}{sep}app_order_id={app_order_id}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buyer {
    pub customer_id: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub gateway_order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub buyer: Buyer,
    pub return_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub session_id: String,
    pub gateway_order_id: String,
}

/// Order state as the gateway reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GatewayOrderStatus {
    pub order_id: String,
    pub order_status: String,
    pub order_amount: Option<Decimal>,
    pub order_currency: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway transport failure: {0}")]
    Transport(String),

    #[error("gateway rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::MalformedResponse(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted checkout session for one order.
    async fn create_session(&self, request: &SessionRequest)
        -> Result<PaymentSession, GatewayError>;

    /// Looks up the gateway's view of an order.
    async fn fetch_order(&self, gateway_order_id: &str)
        -> Result<GatewayOrderStatus, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_order_id_round_trips() {
        let id = Uuid::new_v4();
        let gateway_id = gateway_order_id(id);
        assert!(gateway_id.starts_with("order_"));
        assert!(!gateway_id.contains('-'));
        assert_eq!(parse_gateway_order_id(&gateway_id), Some(id));
        assert_eq!(parse_gateway_order_id(&id.to_string()), Some(id));
        assert_eq!(parse_gateway_order_id("order_1712345678901"), None);
    }

    #[test]
    fn retry_attempts_get_distinct_ids() {
        let id = Uuid::new_v4();
        let first = gateway_attempt_id(id, 1);
        let third = gateway_attempt_id(id, 3);
        assert_eq!(first, gateway_order_id(id));
        assert_eq!(third, format!("{first}_3"));
        assert_eq!(parse_gateway_order_id(&third), Some(id));
        assert_eq!(gateway_attempt(&first), Some(1));
        assert_eq!(gateway_attempt(&third), Some(3));
        assert_eq!(parse_gateway_order_id(&format!("{first}_x")), Some(id));
        assert_eq!(gateway_attempt(&format!("{first}_x")), None);
    }

    #[test]
    fn return_url_carries_app_order_id() {
        let id = Uuid::nil();
        assert_eq!(
            render_return_url("https://shop.test/confirm?order_id={order_id}", id),
            format!("https://shop.test/confirm?order_id={{order_id}}&app_order_id={id}")
        );
        assert_eq!(
            render_return_url("https://shop.test/orders/{app_order_id}", id),
            format!("https://shop.test/orders/{id}")
        );
    }
}
