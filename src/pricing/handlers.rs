// HTTP handlers for the cart pricing endpoints

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::pricing::{
    metrics::MetricsSnapshot, types::Address, types::ItemRef, CalculationContext,
    CartCalculationResult, CartInput, CartLineInput, PricingError,
};

/// One cart line in the calculation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CartLineRequest {
    pub item: ItemRef,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

/// Address payload in the calculation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddressRequest {
    #[validate(custom = "crate::validation::validate_country_code")]
    pub country: String,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub city: Option<String>,
}

impl AddressRequest {
    fn into_address(self) -> Address {
        Address {
            country: self.country,
            state: self.state,
            postcode: self.postcode,
            city: self.city,
        }
    }
}

/// Request DTO for POST /api/cart/calculate
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CalculateCartRequest {
    #[validate]
    pub lines: Vec<CartLineRequest>,
    pub selected_shipping_method: Option<String>,
    #[serde(default)]
    #[validate(custom = "crate::validation::validate_discount_codes")]
    pub discount_codes: Vec<String>,
    #[validate]
    pub shipping_address: AddressRequest,
    #[validate]
    pub billing_address: Option<AddressRequest>,
    #[validate(email)]
    pub customer_email: Option<String>,
    /// Calculation instant for sale and expiry windows; defaults to now
    pub as_of: Option<DateTime<Utc>>,
}

/// Handler for POST /api/cart/calculate
/// Computes the full price breakdown for the submitted cart
#[utoipa::path(
    post,
    path = "/api/cart/calculate",
    request_body = CalculateCartRequest,
    responses(
        (status = 200, description = "Price breakdown calculated", body = CartCalculationResult),
        (status = 400, description = "Invalid cart input"),
        (status = 404, description = "Cart references an unknown catalog item"),
        (status = 502, description = "An upstream lookup failed; no result produced")
    ),
    tag = "cart"
)]
pub async fn calculate_cart(
    State(state): State<crate::AppState>,
    Json(request): Json<CalculateCartRequest>,
) -> Result<Json<CartCalculationResult>, PricingError> {
    tracing::debug!(
        "Calculating cart with {} lines and {} discount codes",
        request.lines.len(),
        request.discount_codes.len()
    );

    request.validate()?;

    // The engine never reads the clock; resolve "now" at the boundary
    let as_of = request.as_of.unwrap_or_else(Utc::now);

    let cart = CartInput {
        lines: request
            .lines
            .iter()
            .map(|l| CartLineInput {
                item: l.item,
                quantity: l.quantity,
            })
            .collect(),
        selected_shipping_method: request.selected_shipping_method,
        discount_codes: request.discount_codes,
    };

    let context = CalculationContext {
        shipping_address: request.shipping_address.into_address(),
        billing_address: request.billing_address.map(AddressRequest::into_address),
        customer_email: request.customer_email,
        as_of,
    };

    let result = state.engine.calculate(cart, context).await?;

    tracing::debug!(
        "Cart calculated: subtotal {}, grand total {}",
        result.subtotal,
        result.grand_total
    );
    Ok(Json(result))
}

/// Handler for GET /api/pricing/metrics
/// Reports engine performance counters
#[utoipa::path(
    get,
    path = "/api/pricing/metrics",
    responses(
        (status = 200, description = "Current engine metrics", body = MetricsSnapshot)
    ),
    tag = "pricing"
)]
pub async fn get_metrics(State(state): State<crate::AppState>) -> Json<MetricsSnapshot> {
    Json(state.engine.metrics().snapshot())
}
