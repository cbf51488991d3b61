// Cart Pricing Engine
//
// Combines the resolver components into one deterministic price breakdown:
// line-item pricing, discount-code evaluation, shipping resolution, and tax
// resolution, assembled so the result always reconciles (line totals sum to
// the subtotal, discount shares sum to each discount, tax sums to the
// breakdown).
//
// The computation itself is pure and synchronous; all upstream lookups are
// fanned out before it starts and a failed lookup aborts the calculation
// with no partial result.

pub mod audit;
pub mod config_store;
pub mod discounts;
pub mod error;
pub mod handlers;
pub mod items;
pub mod metrics;
pub mod shipping;
pub mod tax;
pub mod types;

pub use config_store::{
    CatalogEntry, DiscountCodeRecord, PricingConfigStore, ShippingZone, TaxOptions, TaxRateEntry,
};
pub use discounts::{AppliedDiscount, DiscountOutcome, LineAllocation, RejectedDiscount};
pub use error::{PricingError, PricingResult};
pub use items::PricedLine;
pub use metrics::PerformanceMetrics;
pub use shipping::{CartShippingProfile, ShippingMethodOption, ShippingResolution};
pub use tax::{TaxBreakdownItem, TaxResolution};
pub use types::{
    Address, DiscountKind, FreeShippingCondition, ItemRef, ShippingMethodKind, TaxBasis,
    TaxDisplayMode,
};

use audit::AuditLogger;
use chrono::{DateTime, Utc};
use config_store::MethodConfig;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// One cart line as submitted by the caller
#[derive(Debug, Clone)]
pub struct CartLineInput {
    pub item: ItemRef,
    pub quantity: u32,
}

/// The cart as submitted: lines, selected shipping method, discount codes
#[derive(Debug, Clone, Default)]
pub struct CartInput {
    pub lines: Vec<CartLineInput>,
    pub selected_shipping_method: Option<String>,
    pub discount_codes: Vec<String>,
}

/// Caller-supplied context for one calculation
///
/// `as_of` parameterizes every time-window check (sale prices, discount
/// expiry); the engine never reads the system clock.
#[derive(Debug, Clone)]
pub struct CalculationContext {
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub customer_email: Option<String>,
    pub as_of: DateTime<Utc>,
}

/// Everything the pure computation consumes, fetched up front
#[derive(Debug)]
pub struct CalculationInputs {
    pub cart: CartInput,
    pub context: CalculationContext,
    pub catalog: HashMap<ItemRef, CatalogEntry>,
    pub discount_records: HashMap<String, DiscountCodeRecord>,
    pub tax_rates: Vec<TaxRateEntry>,
    pub tax_options: TaxOptions,
    pub shipping_zones: Vec<ShippingZone>,
    pub carrier_quotes: HashMap<String, Decimal>,
}

/// One discount code's share on a single line
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LineDiscountShare {
    pub code: String,
    pub amount: Decimal,
}

/// Per-line breakdown in the final result
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLineBreakdown {
    pub item: ItemRef,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub regular_price: Decimal,
    pub sale_price: Option<Decimal>,
    pub line_subtotal: Decimal,
    /// Allocated share of each applied discount
    pub discount_shares: Vec<LineDiscountShare>,
    /// `line_subtotal` minus the allocated discounts
    pub line_total: Decimal,
    /// Tax on `line_total`, rounded to the currency's minor unit
    pub line_tax: Decimal,
}

/// The terminal, immutable output of one calculation
///
/// Constructed once per `calculate` call; a new cart state requires a new
/// calculation. `currency` and `prices_include_tax` echo the configuration
/// used; they are informational only.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartCalculationResult {
    pub currency: String,
    pub prices_include_tax: bool,
    pub tax_display_mode: TaxDisplayMode,
    pub calculated_at: DateTime<Utc>,
    pub lines: Vec<CartLineBreakdown>,
    pub subtotal: Decimal,
    pub subtotal_after_discounts: Decimal,
    pub total_discount: Decimal,
    pub applied_discounts: Vec<AppliedDiscount>,
    pub rejected_discounts: Vec<RejectedDiscount>,
    pub shipping: ShippingResolution,
    pub shipping_total: Decimal,
    pub shipping_tax: Decimal,
    pub items_tax: Decimal,
    /// Per-rate totals across lines and shipping
    pub tax_breakdown: Vec<TaxBreakdownItem>,
    pub free_shipping_applied: bool,
    pub cannot_ship: bool,
    pub notes: Vec<String>,
    pub grand_total: Decimal,
}

/// Reject malformed input before any upstream fetch
fn validate_cart(cart: &CartInput) -> PricingResult<()> {
    for line in &cart.lines {
        if line.quantity == 0 {
            return Err(PricingError::ValidationError(format!(
                "Quantity for {} must be positive",
                line.item
            )));
        }
    }

    for (i, line) in cart.lines.iter().enumerate() {
        if cart.lines[..i].iter().any(|other| other.item == line.item) {
            return Err(PricingError::ValidationError(format!(
                "Cart contains more than one line for {}",
                line.item
            )));
        }
    }

    for (i, code) in cart.discount_codes.iter().enumerate() {
        if cart.discount_codes[..i].contains(code) {
            return Err(PricingError::DuplicateDiscountCode(code.clone()));
        }
    }

    Ok(())
}

/// Run the full pricing pipeline over already-fetched inputs
///
/// Pure and deterministic: identical inputs yield identical results. The
/// order is fixed: price lines, evaluate discounts, resolve shipping,
/// resolve tax on discounted lines and on the selected shipping cost, sum.
pub fn compute(
    inputs: &CalculationInputs,
    metrics: Option<&PerformanceMetrics>,
) -> PricingResult<CartCalculationResult> {
    validate_cart(&inputs.cart)?;

    // Price every line
    let mut priced_lines = Vec::with_capacity(inputs.cart.lines.len());
    for line in &inputs.cart.lines {
        let entry = inputs
            .catalog
            .get(&line.item)
            .ok_or_else(|| PricingError::ItemNotFound(line.item.to_string()))?;
        priced_lines.push(items::price_line(entry, line.quantity, inputs.context.as_of)?);
    }

    let subtotal: Decimal = priced_lines.iter().map(|l| l.line_subtotal).sum();

    // Evaluate discount codes against the priced lines
    let discount_outcome = {
        let _timer = metrics.map(|m| m.start_discount_evaluation());
        discounts::evaluate(
            &inputs.cart.discount_codes,
            &inputs.discount_records,
            &priced_lines,
            inputs.context.customer_email.as_deref(),
            inputs.context.as_of,
        )?
    };
    let subtotal_after_discounts = subtotal - discount_outcome.total_discount;

    // Resolve shipping candidates and selection
    let profile = CartShippingProfile::from_lines(&priced_lines);
    let shipping_resolution = {
        let _timer = metrics.map(|m| m.start_shipping_resolution());
        shipping::resolve(
            &inputs.shipping_zones,
            &shipping::ShippingContext {
                destination: &inputs.context.shipping_address,
                profile: &profile,
                subtotal_before_discount: subtotal,
                subtotal_after_discount: subtotal_after_discounts,
                coupon_grants_free_shipping: discount_outcome.free_shipping,
                selected_method_id: inputs.cart.selected_shipping_method.as_deref(),
                carrier_quotes: &inputs.carrier_quotes,
            },
        )
    };

    let selected = shipping_resolution.selected();
    let mut shipping_total = selected.map(|s| s.cost).unwrap_or(Decimal::ZERO);
    let selected_is_free = selected.map(|s| s.is_free_shipping).unwrap_or(false);

    // A free-shipping grant from any accepted code overrides the selected
    // method's own cost.
    let free_shipping_applied = discount_outcome.free_shipping || selected_is_free;
    if discount_outcome.free_shipping {
        shipping_total = Decimal::ZERO;
    }

    // Resolve tax per line on the discounted line total, then on shipping
    let _tax_timer = metrics.map(|m| m.start_tax_resolution());
    let tax_addr = tax::tax_address(
        &inputs.tax_options,
        &inputs.context.shipping_address,
        inputs.context.billing_address.as_ref(),
    );

    let mut lines = Vec::with_capacity(priced_lines.len());
    let mut merged_breakdown: Vec<TaxBreakdownItem> = Vec::new();
    let mut per_line_rounded_sum = Decimal::ZERO;

    for priced in &priced_lines {
        let shares: Vec<LineDiscountShare> = discount_outcome
            .applied
            .iter()
            .filter_map(|applied| {
                applied
                    .line_allocations
                    .iter()
                    .find(|a| a.item == priced.item)
                    .map(|a| LineDiscountShare {
                        code: applied.code.clone(),
                        amount: a.amount,
                    })
            })
            .collect();

        let line_discount: Decimal = shares.iter().map(|s| s.amount).sum();
        let line_total = priced.line_subtotal - line_discount;

        let rates = tax::applicable_rates(&inputs.tax_rates, &priced.tax_class, &tax_addr);
        let resolution = tax::resolve_tax(line_total, &rates, inputs.tax_options.prices_include_tax);

        let line_tax = tax::round_currency(resolution.total);
        per_line_rounded_sum += line_tax;
        merge_breakdown(&mut merged_breakdown, &resolution.breakdown);

        lines.push(CartLineBreakdown {
            item: priced.item,
            name: priced.name.clone(),
            quantity: priced.quantity,
            unit_price: priced.unit_price,
            regular_price: priced.regular_price,
            sale_price: priced.sale_price,
            line_subtotal: priced.line_subtotal,
            discount_shares: shares,
            line_total,
            line_tax,
        });
    }

    // Rounding policy: once on each per-rate aggregate, or per line. The two
    // may differ by one minor unit; the difference is expected and left
    // uncorrected.
    let items_tax = if inputs.tax_options.round_at_subtotal {
        merged_breakdown
            .iter()
            .map(|b| tax::round_currency(b.amount))
            .sum()
    } else {
        per_line_rounded_sum
    };

    let shipping_rates = tax::applicable_shipping_rates(&inputs.tax_rates, &tax_addr);
    let shipping_resolution_tax = tax::resolve_tax(shipping_total, &shipping_rates, false);
    let shipping_tax = tax::round_currency(shipping_resolution_tax.total);
    merge_breakdown(&mut merged_breakdown, &shipping_resolution_tax.breakdown);
    drop(_tax_timer);

    for item in &mut merged_breakdown {
        item.amount = tax::round_currency(item.amount);
    }

    // With tax-inclusive prices the item tax is already inside the subtotal
    let grand_total = if inputs.tax_options.prices_include_tax {
        subtotal_after_discounts + shipping_total + shipping_tax
    } else {
        subtotal_after_discounts + items_tax + shipping_total + shipping_tax
    };

    Ok(CartCalculationResult {
        currency: inputs.tax_options.currency.clone(),
        prices_include_tax: inputs.tax_options.prices_include_tax,
        tax_display_mode: inputs.tax_options.display_mode,
        calculated_at: inputs.context.as_of,
        lines,
        subtotal,
        subtotal_after_discounts,
        total_discount: discount_outcome.total_discount,
        applied_discounts: discount_outcome.applied,
        rejected_discounts: discount_outcome.rejected,
        cannot_ship: shipping_resolution.cannot_ship,
        notes: shipping_resolution.notes.clone(),
        shipping: shipping_resolution,
        shipping_total,
        shipping_tax,
        items_tax,
        tax_breakdown: merged_breakdown,
        free_shipping_applied,
        grand_total: tax::round_currency(grand_total),
    })
}

/// Accumulate per-rate amounts, preserving first-seen rate order
fn merge_breakdown(merged: &mut Vec<TaxBreakdownItem>, items: &[TaxBreakdownItem]) {
    for item in items {
        match merged.iter_mut().find(|m| m.rate_id == item.rate_id) {
            Some(existing) => existing.amount += item.amount,
            None => merged.push(item.clone()),
        }
    }
}

/// Cart Pricing Engine
///
/// Owns the configuration store, audit logger, and metrics; fans out the
/// upstream fetches and hands the pure computation its inputs.
pub struct CartPricingEngine {
    config_store: Arc<PricingConfigStore>,
    audit_logger: AuditLogger,
    metrics: Arc<PerformanceMetrics>,
}

impl CartPricingEngine {
    /// Create a new CartPricingEngine backed by the given pool
    pub fn new(pool: PgPool) -> Self {
        let metrics = Arc::new(PerformanceMetrics::new());
        let config_store = Arc::new(PricingConfigStore::with_metrics(
            pool.clone(),
            metrics.clone(),
        ));
        let audit_logger = AuditLogger::new(pool);

        Self {
            config_store,
            audit_logger,
            metrics,
        }
    }

    /// Get performance metrics
    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    /// Pre-load the read-mostly configuration to avoid cold-start latency
    pub async fn warm_cache(&self) -> PricingResult<()> {
        tracing::info!("Warming pricing configuration cache...");

        let _ = self.config_store.get_tax_rates().await?;
        let _ = self.config_store.get_tax_options().await?;
        let _ = self.config_store.get_shipping_zones().await?;

        tracing::info!("Pricing configuration cache warmed");
        Ok(())
    }

    /// Calculate the full price breakdown for one cart
    ///
    /// Fetches catalog entries, discount records, tax and shipping
    /// configuration concurrently, prefetches carrier quotes for the
    /// resolved zone, then runs the pure pipeline. Any failed fetch aborts
    /// with no partial result.
    pub async fn calculate(
        &self,
        cart: CartInput,
        context: CalculationContext,
    ) -> PricingResult<CartCalculationResult> {
        let _timer = self.metrics.start_calculation();

        validate_cart(&cart)?;

        let item_refs: Vec<ItemRef> = cart.lines.iter().map(|l| l.item).collect();

        let (catalog, discount_records, tax_rates, tax_options, shipping_zones) = tokio::try_join!(
            self.config_store.get_catalog_entries(&item_refs),
            self.config_store.get_discount_codes(&cart.discount_codes),
            self.config_store.get_tax_rates(),
            self.config_store.get_tax_options(),
            self.config_store.get_shipping_zones(),
        )?;

        let carrier_quotes = self
            .prefetch_carrier_quotes(&shipping_zones, &cart, &catalog, &context)
            .await?;

        let inputs = CalculationInputs {
            cart,
            context,
            catalog,
            discount_records,
            tax_rates,
            tax_options,
            shipping_zones,
            carrier_quotes,
        };

        let result = compute(&inputs, Some(self.metrics.as_ref()))?;

        self.audit(&result).await;

        Ok(result)
    }

    /// Prefetch carrier rate-table quotes for carrier methods in the
    /// destination's zone, keyed by method id
    async fn prefetch_carrier_quotes(
        &self,
        zones: &[ShippingZone],
        cart: &CartInput,
        catalog: &HashMap<ItemRef, CatalogEntry>,
        context: &CalculationContext,
    ) -> PricingResult<HashMap<String, Decimal>> {
        let mut quotes = HashMap::new();

        let Some(zone) = shipping::resolve_zone(zones, &context.shipping_address) else {
            return Ok(quotes);
        };

        let total_weight: Decimal = cart
            .lines
            .iter()
            .filter_map(|line| {
                catalog
                    .get(&line.item)
                    .and_then(|e| e.weight)
                    .map(|w| w * Decimal::from(line.quantity))
            })
            .sum();

        for method in &zone.methods {
            if let MethodConfig::Carrier(settings) = &method.config {
                if let Some(cost) = self
                    .config_store
                    .get_carrier_quote(&settings.carrier, &settings.service, total_weight)
                    .await?
                {
                    quotes.insert(method.method_id.clone(), cost);
                }
            }
        }

        Ok(quotes)
    }

    /// Record the calculation in the audit trail
    async fn audit(&self, result: &CartCalculationResult) {
        let calculation_id = Uuid::new_v4();

        for applied in &result.applied_discounts {
            self.audit_logger
                .log_discount_application(
                    calculation_id,
                    json!({
                        "code": applied.code,
                        "kind": applied.kind,
                        "amount": applied.amount,
                        "grants_free_shipping": applied.grants_free_shipping,
                    }),
                    &format!("Applied discount {}", applied.code),
                )
                .await;
        }

        self.audit_logger
            .log_calculation(
                calculation_id,
                json!({
                    "subtotal": result.subtotal,
                    "total_discount": result.total_discount,
                    "shipping_total": result.shipping_total,
                    "items_tax": result.items_tax,
                    "shipping_tax": result.shipping_tax,
                    "grand_total": result.grand_total,
                    "applied_codes": result.applied_discounts.len(),
                    "cannot_ship": result.cannot_ship,
                }),
                &format!(
                    "Calculated cart of {} lines, grand total {} {}",
                    result.lines.len(),
                    result.grand_total,
                    result.currency
                ),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_cart_rejects_zero_quantity() {
        let cart = CartInput {
            lines: vec![CartLineInput {
                item: ItemRef::Product(1),
                quantity: 0,
            }],
            ..Default::default()
        };
        assert!(matches!(
            validate_cart(&cart),
            Err(PricingError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_cart_rejects_duplicate_lines() {
        let cart = CartInput {
            lines: vec![
                CartLineInput {
                    item: ItemRef::Product(1),
                    quantity: 1,
                },
                CartLineInput {
                    item: ItemRef::Product(1),
                    quantity: 2,
                },
            ],
            ..Default::default()
        };
        assert!(matches!(
            validate_cart(&cart),
            Err(PricingError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_cart_rejects_duplicate_codes() {
        let cart = CartInput {
            lines: vec![],
            selected_shipping_method: None,
            discount_codes: vec!["A".to_string(), "A".to_string()],
        };
        assert!(matches!(
            validate_cart(&cart),
            Err(PricingError::DuplicateDiscountCode(_))
        ));
    }

    #[test]
    fn test_merge_breakdown_accumulates_by_rate() {
        let mut merged = Vec::new();
        let first = vec![TaxBreakdownItem {
            rate_id: 1,
            label: "VAT".to_string(),
            rate: dec!(20),
            compound: false,
            amount: dec!(2.00),
        }];
        let second = vec![TaxBreakdownItem {
            rate_id: 1,
            label: "VAT".to_string(),
            rate: dec!(20),
            compound: false,
            amount: dec!(3.00),
        }];

        merge_breakdown(&mut merged, &first);
        merge_breakdown(&mut merged, &second);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].amount, dec!(5.00));
    }
}
