use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Meatshop API",
        version = "1.0.0",
        description = r#"
# Meatshop Storefront API

Catalog, cart, checkout and payment reconciliation for a fresh-meat shop.

## Authentication

Customer and admin endpoints expect a JWT issued by `/api/users/login`:

```
Authorization: Bearer <your-jwt-token>
```

The payment webhook is authenticated by its HMAC signature instead.

## Pricing

Order totals are always computed from the catalog. Client-supplied prices are
ignored, and payment sessions are only opened for the exact stored total.

## Error Handling

Errors share one body shape:

```json
{
  "error": "Bad Request",
  "message": "Invalid request: Order has no items",
  "request_id": "req-abc123",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Users", description = "Registration, login and profile"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Per-user cart"),
        (name = "Orders", description = "Order placement and fulfillment"),
        (name = "Payments", description = "Checkout sessions and gateway webhooks"),
        (name = "Admin", description = "Administrative endpoints")
    ),
    paths(
        crate::handlers::users::register,
        crate::handlers::users::login,
        crate::handlers::users::profile,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,
        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_to_cart,
        crate::handlers::cart::update_cart_item,
        crate::handlers::cart::remove_cart_item,
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::payments::create_payment_session,
        crate::handlers::payments::get_payment_status,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::admin::dashboard_stats,
    ),
    components(
        schemas(
            crate::entities::product::Model,
            crate::entities::order::Model,
            crate::entities::order::OrderStatus,
            crate::entities::order::ShippingAddress,
            crate::entities::user::CartLine,
            crate::services::catalog::ProductInput,
            crate::services::cart::AddToCartRequest,
            crate::services::cart::UpdateCartItemRequest,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderItemInput,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::services::payments::CreatePaymentSessionRequest,
            crate::services::payments::PaymentSessionResponse,
            crate::payment_gateway::GatewayOrderStatus,
            crate::handlers::payment_webhooks::WebhookAck,
            crate::services::users::RegisterRequest,
            crate::services::users::LoginRequest,
            crate::services::users::UserProfile,
            crate::services::users::AuthResponse,
            crate::services::admin::DashboardStats,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
