#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use meatshop_api::{
    build_router,
    config::AppConfig,
    db,
    entities::{order, product},
    payment_gateway::{
        GatewayError, GatewayOrderStatus, PaymentGateway, PaymentSession, SessionRequest,
        SIGNATURE_HEADER, TIMESTAMP_HEADER,
    },
    services::{
        catalog::ProductInput,
        users::{LoginRequest, RegisterRequest, UserProfile},
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const WEBHOOK_SECRET: &str = "whsec_test_signing_key_0123456789";

/// Gateway double that records every session request. Like Cashfree it
/// refuses to create the same gateway order id twice.
#[derive(Default)]
pub struct MockGateway {
    pub sessions: Mutex<Vec<SessionRequest>>,
    failing: AtomicBool,
    after_session: Mutex<Option<(Arc<DatabaseConnection>, String)>>,
}

impl MockGateway {
    pub fn fail_requests(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn last_session(&self) -> Option<SessionRequest> {
        self.sessions.lock().unwrap().last().cloned()
    }

    /// Runs `sql` once, right after the next session is opened.
    pub fn run_after_next_session(&self, db: Arc<DatabaseConnection>, sql: &str) {
        *self.after_session.lock().unwrap() = Some((db, sql.to_string()));
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<PaymentSession, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        {
            let mut sessions = self.sessions.lock().unwrap();
            if sessions
                .iter()
                .any(|s| s.gateway_order_id == request.gateway_order_id)
            {
                return Err(GatewayError::Rejected {
                    status: 409,
                    message: "order with same order_id already exists".into(),
                });
            }
            sessions.push(request.clone());
        }
        let hook = self.after_session.lock().unwrap().take();
        if let Some((db, sql)) = hook {
            db.execute_unprepared(&sql).await.expect("run post-session sql");
        }
        Ok(PaymentSession {
            session_id: format!("session_{}", request.gateway_order_id),
            gateway_order_id: request.gateway_order_id.clone(),
        })
    }

    async fn fetch_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<GatewayOrderStatus, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".into()));
        }
        Ok(GatewayOrderStatus {
            order_id: gateway_order_id.to_string(),
            order_status: "ACTIVE".to_string(),
            order_amount: None,
            order_currency: Some("INR".to_string()),
        })
    }
}

/// A registered account and a bearer token for it.
pub struct TestUser {
    pub profile: UserProfile,
    pub token: String,
}

impl TestUser {
    pub fn id(&self) -> Uuid {
        self.profile.id
    }
}

/// Application over a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "test".to_string(),
        );
        cfg.payment.client_id = "test-client".to_string();
        cfg.payment.client_secret = "test-client-secret".to_string();
        cfg.payment.webhook_secret = Some(WEBHOOK_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let gateway = Arc::new(MockGateway::default());
        let state = AppState::new(Arc::new(pool), gateway.clone(), cfg);
        let router = build_router(state.clone());

        Self {
            router,
            state,
            gateway,
        }
    }

    /// Registers a customer and returns a token that reflects the stored
    /// admin flag.
    pub async fn create_user(&self, email: &str, is_admin: bool) -> TestUser {
        let users = self.state.services.users.clone();
        users
            .register(RegisterRequest {
                first_name: "Test".into(),
                last_name: "Buyer".into(),
                email: email.into(),
                password: "password123".into(),
                phone: Some("9876543210".into()),
            })
            .await
            .expect("register test user");

        if is_admin {
            users
                .set_admin(email, true)
                .await
                .expect("promote test user");
        }

        let auth = users
            .login(LoginRequest {
                email: email.into(),
                password: "password123".into(),
            })
            .await
            .expect("login test user");

        TestUser {
            profile: auth.user,
            token: auth.token.access_token,
        }
    }

    pub async fn seed_product(&self, title: &str, price: Decimal) -> product::Model {
        self.state
            .services
            .catalog
            .create_product(ProductInput {
                title: title.to_string(),
                description: format!("{title} for integration tests"),
                price_per_unit: price,
                discount: None,
                weights: vec!["500g".into(), "1kg".into()],
                image: format!("/images/{}.jpg", title.to_lowercase().replace(' ', "-")),
                stock_quantity: 10,
            })
            .await
            .expect("seed product for tests")
    }

    pub async fn order(&self, id: Uuid) -> order::Model {
        order::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query order")
            .expect("order exists")
    }

    pub async fn exec(&self, sql: &str) {
        self.state
            .db
            .execute_unprepared(sql)
            .await
            .expect("execute test sql");
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Posts a webhook body signed with the configured key.
    pub async fn signed_webhook(&self, body: &Value) -> Response {
        let raw = serde_json::to_vec(body).expect("serialize webhook body");
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self
            .state
            .webhook_verifier
            .sign(&timestamp, &raw)
            .expect("sign webhook");
        self.raw_webhook(raw, &[
            (TIMESTAMP_HEADER, timestamp.as_str()),
            (SIGNATURE_HEADER, signature.as_str()),
        ])
        .await
    }

    /// Posts raw webhook bytes with exactly the given headers.
    pub async fn raw_webhook(&self, raw: Vec<u8>, headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/payment/webhook")
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(raw)).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Reads a decimal that may be serialized as a string or a number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("expected decimal, got {other}"),
    }
}

pub fn shipping_address() -> Value {
    serde_json::json!({
        "address": "12 Market Road",
        "city": "Bengaluru",
        "postalCode": "560001",
        "country": "India"
    })
}
