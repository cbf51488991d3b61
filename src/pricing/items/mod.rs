// Line-Item Pricer
//
// Resolves the effective unit price for one cart line (regular price, active
// sale price, or quantity-tiered price) and produces the line subtotal.
// Pure: all pricing data arrives resolved from the catalog, the calculation
// instant arrives as an explicit `as_of`.

use crate::pricing::{
    config_store::CatalogEntry,
    error::{PricingError, PricingResult},
    types::ItemRef,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A cart line after unit-price resolution
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub item: ItemRef,
    pub name: String,
    pub quantity: u32,
    /// Resolved effective unit price
    pub unit_price: Decimal,
    pub regular_price: Decimal,
    /// Sale price when a sale window was active at `as_of`
    pub sale_price: Option<Decimal>,
    /// `unit_price * quantity`
    pub line_subtotal: Decimal,
    pub tax_class: String,
    pub shipping_class: Option<String>,
    /// Total shippable weight of the line
    pub weight: Option<Decimal>,
    pub category_ids: Vec<i32>,
}

/// Price one cart line against its catalog entry
///
/// A zero or negative quantity is rejected before any pricing happens.
pub fn price_line(
    entry: &CatalogEntry,
    quantity: u32,
    as_of: DateTime<Utc>,
) -> PricingResult<PricedLine> {
    if quantity == 0 {
        return Err(PricingError::ValidationError(format!(
            "Quantity for {} must be positive",
            entry.item
        )));
    }

    let active_sale = entry
        .sale
        .as_ref()
        .filter(|sale| sale.is_active(as_of))
        .map(|sale| sale.price);

    let unit_price = resolve_unit_price(entry, quantity, active_sale);
    let line_subtotal = unit_price * Decimal::from(quantity);

    Ok(PricedLine {
        item: entry.item,
        name: entry.name.clone(),
        quantity,
        unit_price,
        regular_price: entry.regular_price,
        sale_price: active_sale,
        line_subtotal,
        tax_class: entry.tax_class.clone(),
        shipping_class: entry.shipping_class.clone(),
        weight: entry.weight.map(|w| w * Decimal::from(quantity)),
        category_ids: entry.category_ids.clone(),
    })
}

/// Resolve the effective unit price for a quantity
///
/// An active sale overrides the regular price; a qualifying tier overrides
/// both. Among qualifying tiers the highest minimum-quantity threshold wins.
/// Tiers are applied as configured even when numerically above the regular
/// price.
fn resolve_unit_price(entry: &CatalogEntry, quantity: u32, active_sale: Option<Decimal>) -> Decimal {
    let base = active_sale.unwrap_or(entry.regular_price);

    entry
        .tier_prices
        .iter()
        .filter(|tier| tier.min_quantity <= quantity)
        .max_by_key(|tier| tier.min_quantity)
        .map(|tier| tier.unit_price)
        .unwrap_or(base)
}
