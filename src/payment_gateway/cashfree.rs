use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{GatewayError, GatewayOrderStatus, PaymentGateway, PaymentSession, SessionRequest};
use crate::config::PaymentGatewayConfig;

/// Cashfree PG REST client.
#[derive(Clone)]
pub struct CashfreeGateway {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    api_version: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    order_id: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    order_amount: Decimal,
    order_currency: &'a str,
    customer_details: CustomerDetails<'a>,
    order_meta: OrderMeta<'a>,
}

#[derive(Debug, Serialize)]
struct CustomerDetails<'a> {
    customer_id: &'a str,
    customer_email: &'a str,
    customer_phone: &'a str,
}

#[derive(Debug, Serialize)]
struct OrderMeta<'a> {
    return_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateOrderReply {
    order_id: Option<String>,
    payment_session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderReply {
    order_id: Option<String>,
    order_status: Option<String>,
    #[serde(default)]
    order_amount: Option<Decimal>,
    #[serde(default)]
    order_currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    message: Option<String>,
}

impl CashfreeGateway {
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            api_version: config.api_version.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("x-client-id", &self.client_id)
            .header("x-client-secret", &self.client_secret)
            .header("x-api-version", &self.api_version)
    }

    async fn ensure_success(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorReply>(&body)
            .ok()
            .and_then(|reply| reply.message)
            .unwrap_or(body);
        warn!(status = status.as_u16(), %message, "gateway rejected request");
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for CashfreeGateway {
    #[instrument(skip(self, request), fields(gateway_order_id = %request.gateway_order_id))]
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<PaymentSession, GatewayError> {
        let body = CreateOrderBody {
            order_id: &request.gateway_order_id,
            order_amount: request.amount,
            order_currency: &request.currency,
            customer_details: CustomerDetails {
                customer_id: &request.buyer.customer_id,
                customer_email: &request.buyer.email,
                customer_phone: &request.buyer.phone,
            },
            order_meta: OrderMeta {
                return_url: &request.return_url,
            },
        };

        let response = self
            .authorized(self.client.post(format!("{}/orders", self.base_url)))
            .json(&body)
            .send()
            .await?;
        let reply: CreateOrderReply = Self::ensure_success(response).await?.json().await?;

        let session_id = reply
            .payment_session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::MalformedResponse("missing payment_session_id".into()))?;

        info!("gateway payment session created");
        Ok(PaymentSession {
            session_id,
            gateway_order_id: reply
                .order_id
                .unwrap_or_else(|| request.gateway_order_id.clone()),
        })
    }

    #[instrument(skip(self))]
    async fn fetch_order(&self, gateway_order_id: &str) -> Result<GatewayOrderStatus, GatewayError> {
        let response = self
            .authorized(
                self.client
                    .get(format!("{}/orders/{}", self.base_url, gateway_order_id)),
            )
            .send()
            .await?;
        let reply: OrderReply = Self::ensure_success(response).await?.json().await?;

        let order_status = reply
            .order_status
            .ok_or_else(|| GatewayError::MalformedResponse("missing order_status".into()))?;

        Ok(GatewayOrderStatus {
            order_id: reply.order_id.unwrap_or_else(|| gateway_order_id.to_string()),
            order_status,
            order_amount: reply.order_amount,
            order_currency: reply.order_currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment_gateway::Buyer;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer, timeout_secs: u64) -> CashfreeGateway {
        let config = PaymentGatewayConfig {
            base_url: server.uri(),
            client_id: "cid".into(),
            client_secret: "csecret".into(),
            timeout_secs,
            ..Default::default()
        };
        CashfreeGateway::new(&config).unwrap()
    }

    fn session_request() -> SessionRequest {
        SessionRequest {
            gateway_order_id: "order_abc".into(),
            amount: dec!(450),
            currency: "INR".into(),
            buyer: Buyer {
                customer_id: "cust-1".into(),
                email: "buyer@example.com".into(),
                phone: "9999999999".into(),
            },
            return_url: "https://shop.test/confirm?order_id={order_id}".into(),
        }
    }

    #[tokio::test]
    async fn creates_session_with_credentials_and_numeric_amount() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header("x-client-id", "cid"))
            .and(header("x-client-secret", "csecret"))
            .and(header("x-api-version", "2023-08-01"))
            .and(body_partial_json(json!({
                "order_id": "order_abc",
                "order_amount": 450.0,
                "order_currency": "INR",
                "customer_details": { "customer_phone": "9999999999" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cf_order_id": "2149460581",
                "order_id": "order_abc",
                "order_status": "ACTIVE",
                "payment_session_id": "session_xyz"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = gateway_for(&server, 5)
            .create_session(&session_request())
            .await
            .unwrap();
        assert_eq!(session.session_id, "session_xyz");
        assert_eq!(session.gateway_order_id, "order_abc");
    }

    #[tokio::test]
    async fn rejection_carries_gateway_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "authentication Failed",
                "code": "request_failed",
                "type": "authentication_error"
            })))
            .mount(&server)
            .await;

        let err = gateway_for(&server, 5)
            .create_session(&session_request())
            .await
            .unwrap_err();
        assert_matches!(err, GatewayError::Rejected { status: 401, ref message } if message == "authentication Failed");
    }

    #[tokio::test]
    async fn missing_session_id_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "order_id": "order_abc" })))
            .mount(&server)
            .await;

        let err = gateway_for(&server, 5)
            .create_session(&session_request())
            .await
            .unwrap_err();
        assert_matches!(err, GatewayError::MalformedResponse(_));
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "payment_session_id": "late" }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = gateway_for(&server, 1)
            .create_session(&session_request())
            .await
            .unwrap_err();
        assert_matches!(err, GatewayError::Timeout);
    }

    #[tokio::test]
    async fn fetches_order_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/order_abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "order_id": "order_abc",
                "order_status": "PAID",
                "order_amount": 450.0,
                "order_currency": "INR"
            })))
            .mount(&server)
            .await;

        let status = gateway_for(&server, 5).fetch_order("order_abc").await.unwrap();
        assert_eq!(status.order_status, "PAID");
        assert_eq!(status.order_amount, Some(dec!(450)));
    }
}
