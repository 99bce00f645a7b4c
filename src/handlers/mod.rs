pub mod admin;
pub mod cart;
pub mod common;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod products;
pub mod users;

use crate::{
    auth::AuthService,
    config::AppConfig,
    db::DbPool,
    payment_gateway::PaymentGateway,
    services::{
        admin::AdminService, cart::CartService, catalog::CatalogService,
        order_status::OrderStatusService, orders::OrderService, payments::PaymentService,
        reconciliation::ReconciliationService, users::UserService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub payments: Arc<PaymentService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub admin: Arc<AdminService>,
    pub users: Arc<UserService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
        auth_service: Arc<AuthService>,
    ) -> Self {
        let payments = PaymentService::new(
            db_pool.clone(),
            gateway,
            Arc::new(config.payment.clone()),
            config.default_currency.clone(),
        );

        Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            cart: Arc::new(CartService::new(db_pool.clone())),
            orders: Arc::new(OrderService::new(db_pool.clone())),
            order_status: Arc::new(OrderStatusService::new(db_pool.clone())),
            payments: Arc::new(payments),
            reconciliation: Arc::new(ReconciliationService::new(db_pool.clone())),
            admin: Arc::new(AdminService::new(db_pool.clone())),
            users: Arc::new(UserService::new(db_pool, auth_service)),
        }
    }
}
