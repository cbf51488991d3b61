mod db;
mod pricing;
mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pricing::CartPricingEngine;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        pricing::handlers::calculate_cart,
        pricing::handlers::get_metrics,
    ),
    components(
        schemas(
            pricing::handlers::CalculateCartRequest,
            pricing::handlers::CartLineRequest,
            pricing::handlers::AddressRequest,
            pricing::CartCalculationResult,
            pricing::CartLineBreakdown,
            pricing::LineDiscountShare,
            pricing::AppliedDiscount,
            pricing::RejectedDiscount,
            pricing::LineAllocation,
            pricing::ShippingResolution,
            pricing::ShippingMethodOption,
            pricing::TaxBreakdownItem,
            pricing::ItemRef,
            pricing::DiscountKind,
            pricing::ShippingMethodKind,
            pricing::TaxDisplayMode,
            pricing::types::Address,
            pricing::metrics::MetricsSnapshot,
        )
    ),
    tags(
        (name = "cart", description = "Cart price calculation"),
        (name = "pricing", description = "Pricing engine operations")
    ),
    info(
        title = "Cart Pricing API",
        version = "1.0.0",
        description = "Deterministic cart price resolution: line pricing, taxes, shipping, and discount codes",
    )
)]
struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    engine: Arc<CartPricingEngine>,
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS middleware
fn create_router(engine: Arc<CartPricingEngine>) -> Router {
    use tower_http::cors::{Any, CorsLayer};

    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // API routes
        .route("/api/cart/calculate", post(pricing::handlers::calculate_cart))
        .route("/api/pricing/metrics", get(pricing::handlers::get_metrics))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Cart Pricing API - Starting...");

    // Get configuration from environment variables
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set in environment");
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&database_url)
        .await
        .expect("Failed to create database pool");

    // Run SQLx migrations on startup
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations completed successfully");

    // Build the pricing engine and pre-load its configuration cache
    let engine = Arc::new(CartPricingEngine::new(db_pool));
    if let Err(e) = engine.warm_cache().await {
        tracing::warn!("Failed to warm configuration cache: {}", e);
    }

    // Create the application router
    let app = create_router(engine);

    // Start the Axum server
    let addr = format!("{}:{}", host, port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Cart Pricing API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
