// Pricing Configuration Store
//
// Loads, caches, and validates the reference data the pricing engine consumes:
// catalog entries, tax rates and options, shipping zones/methods, discount
// codes, and the carrier rate table. Read-mostly configuration (tax, shipping)
// sits behind a time-based cache with a 60-second TTL; per-cart lookups
// (catalog entries, discount codes) always hit the database.

use crate::pricing::{
    error::{PricingError, PricingResult},
    types::{DiscountKind, FreeShippingCondition, ItemRef, ShippingMethodKind, TaxBasis, TaxDisplayMode},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Time-to-live for cached configurations (60 seconds)
const CACHE_TTL: Duration = Duration::from_secs(60);

/// One quantity-tiered price entry
///
/// Stored as JSONB on the catalog row. Tiers are not clamped against the
/// regular price; authors own the sanity of their tier tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierPrice {
    pub min_quantity: u32,
    pub unit_price: Decimal,
}

/// Time-bounded sale price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleWindow {
    pub price: Decimal,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl SaleWindow {
    /// Whether the sale applies at the given instant
    pub fn is_active(&self, as_of: DateTime<Utc>) -> bool {
        if let Some(from) = self.from {
            if as_of < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if as_of > until {
                return false;
            }
        }
        true
    }
}

/// Everything the engine needs to know about one purchasable item
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub item: ItemRef,
    pub name: String,
    pub regular_price: Decimal,
    pub sale: Option<SaleWindow>,
    pub tier_prices: Vec<TierPrice>,
    pub tax_class: String,
    pub shipping_class: Option<String>,
    pub weight: Option<Decimal>,
    pub category_ids: Vec<i32>,
}

/// One configured tax rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxRateEntry {
    pub rate_id: i32,
    pub tax_class: String,
    pub country: String,
    pub state: Option<String>,
    pub label: String,
    /// Percentage, e.g. 20.0 for 20%
    pub rate: Decimal,
    pub applies_to_shipping: bool,
    pub compound: bool,
    pub sort_order: i32,
}

/// Global tax options
#[derive(Debug, Clone)]
pub struct TaxOptions {
    pub prices_include_tax: bool,
    pub tax_based_on: TaxBasis,
    pub round_at_subtotal: bool,
    pub display_mode: TaxDisplayMode,
    pub currency: String,
    pub store_country: String,
    pub store_state: Option<String>,
}

/// Geographic rule inside a shipping zone
#[derive(Debug, Clone)]
pub struct ZoneLocation {
    pub country: String,
    pub state: Option<String>,
    /// Optional postcode pattern; `*` acts as a wildcard
    pub postcode_pattern: Option<String>,
}

/// Per-shipping-class surcharge on a flat-rate method
///
/// `class: None` is the any-class fallback; an entry naming the class
/// exactly always wins over the fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassCost {
    pub class: Option<String>,
    pub cost: Decimal,
}

/// Settings payload for a flat-rate method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatRateSettings {
    pub base_cost: Decimal,
    #[serde(default)]
    pub class_costs: Vec<ClassCost>,
}

/// Settings payload for a free-shipping method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeShippingSettings {
    pub condition: FreeShippingCondition,
    pub min_amount: Option<Decimal>,
    /// When true, the minimum-amount comparison uses the subtotal after
    /// coupon deduction instead of the pre-discount subtotal.
    #[serde(default)]
    pub min_amount_after_discount: bool,
}

/// Settings payload for a local-pickup method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalPickupSettings {
    #[serde(default)]
    pub cost: Decimal,
}

/// Settings payload for a carrier-backed method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierSettings {
    pub carrier: String,
    pub service: String,
}

/// Kind-specific configuration of a shipping method
///
/// Stored as a kind column plus JSONB settings; parsed into exactly one
/// payload per kind at load time so an ambiguous record cannot exist in
/// memory.
#[derive(Debug, Clone)]
pub enum MethodConfig {
    FlatRate(FlatRateSettings),
    FreeShipping(FreeShippingSettings),
    LocalPickup(LocalPickupSettings),
    Carrier(CarrierSettings),
}

impl MethodConfig {
    pub fn kind(&self) -> ShippingMethodKind {
        match self {
            MethodConfig::FlatRate(_) => ShippingMethodKind::FlatRate,
            MethodConfig::FreeShipping(_) => ShippingMethodKind::FreeShipping,
            MethodConfig::LocalPickup(_) => ShippingMethodKind::LocalPickup,
            MethodConfig::Carrier(_) => ShippingMethodKind::Carrier,
        }
    }
}

/// One configured shipping method inside a zone
#[derive(Debug, Clone)]
pub struct ShippingMethod {
    pub method_id: String,
    pub title: String,
    pub config: MethodConfig,
}

/// A shipping zone: ordered geographic rules plus the methods offered there
#[derive(Debug, Clone)]
pub struct ShippingZone {
    pub zone_id: i32,
    pub name: String,
    pub locations: Vec<ZoneLocation>,
    pub methods: Vec<ShippingMethod>,
}

/// A discount code as consumed by the engine (read-only)
#[derive(Debug, Clone)]
pub struct DiscountCodeRecord {
    pub code: String,
    pub kind: DiscountKind,
    pub amount: Decimal,
    pub free_shipping: bool,
    pub min_spend: Option<Decimal>,
    pub max_spend: Option<Decimal>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub product_ids: Vec<i32>,
    pub excluded_product_ids: Vec<i32>,
    pub category_ids: Vec<i32>,
    pub excluded_category_ids: Vec<i32>,
    pub allowed_emails: Vec<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct CatalogRow {
    item_kind: String,
    item_id: i32,
    name: String,
    regular_price: Decimal,
    sale_price: Option<Decimal>,
    sale_from: Option<DateTime<Utc>>,
    sale_until: Option<DateTime<Utc>>,
    tier_prices: serde_json::Value,
    tax_class: String,
    shipping_class: Option<String>,
    weight: Option<Decimal>,
    category_ids: Vec<i32>,
}

#[derive(Debug, sqlx::FromRow)]
struct TaxRateRow {
    rate_id: i32,
    tax_class: String,
    country: String,
    state: Option<String>,
    label: String,
    rate: Decimal,
    applies_to_shipping: bool,
    compound: bool,
    sort_order: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct TaxOptionsRow {
    prices_include_tax: bool,
    tax_based_on: String,
    round_at_subtotal: bool,
    display_mode: String,
    currency: String,
    store_country: String,
    store_state: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ZoneRow {
    zone_id: i32,
    name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ZoneLocationRow {
    zone_id: i32,
    country: String,
    state: Option<String>,
    postcode_pattern: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct MethodRow {
    method_id: String,
    zone_id: i32,
    kind: String,
    title: String,
    settings: serde_json::Value,
}

#[derive(Debug, sqlx::FromRow)]
struct DiscountCodeRow {
    code: String,
    kind: String,
    amount: Decimal,
    free_shipping: bool,
    min_spend: Option<Decimal>,
    max_spend: Option<Decimal>,
    expires_at: Option<DateTime<Utc>>,
    usage_limit: Option<i32>,
    usage_count: i32,
    product_ids: Vec<i32>,
    excluded_product_ids: Vec<i32>,
    category_ids: Vec<i32>,
    excluded_category_ids: Vec<i32>,
    allowed_emails: Vec<String>,
}

/// In-memory cache for the read-mostly configuration
#[derive(Debug, Clone)]
struct ConfigCache {
    tax_rates: Vec<TaxRateEntry>,
    tax_options: Option<TaxOptions>,
    shipping_zones: Vec<ShippingZone>,
    last_updated: HashMap<String, Instant>,
}

impl ConfigCache {
    fn new() -> Self {
        Self {
            tax_rates: Vec::new(),
            tax_options: None,
            shipping_zones: Vec::new(),
            last_updated: HashMap::new(),
        }
    }

    fn is_stale(&self, section: &str, ttl: Duration) -> bool {
        match self.last_updated.get(section) {
            Some(last_update) => last_update.elapsed() > ttl,
            None => true,
        }
    }

    fn mark_updated(&mut self, section: &str) {
        self.last_updated.insert(section.to_string(), Instant::now());
    }
}

/// Pricing Configuration Store
///
/// Loads pricing reference data from PostgreSQL. Tax and shipping
/// configuration is cached with a TTL and a double-checked refresh so
/// concurrent calculations share one reload.
pub struct PricingConfigStore {
    pool: PgPool,
    cache: Arc<RwLock<ConfigCache>>,
    cache_ttl: Duration,
    metrics: Option<Arc<crate::pricing::metrics::PerformanceMetrics>>,
}

impl PricingConfigStore {
    /// Create a new PricingConfigStore
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Arc::new(RwLock::new(ConfigCache::new())),
            cache_ttl: CACHE_TTL,
            metrics: None,
        }
    }

    /// Create a new PricingConfigStore with metrics tracking
    pub fn with_metrics(
        pool: PgPool,
        metrics: Arc<crate::pricing::metrics::PerformanceMetrics>,
    ) -> Self {
        Self {
            pool,
            cache: Arc::new(RwLock::new(ConfigCache::new())),
            cache_ttl: CACHE_TTL,
            metrics: Some(metrics),
        }
    }

    fn record_cache_hit(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_cache_hit();
        }
    }

    fn record_cache_miss(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_cache_miss();
        }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fetch catalog entries for the given item references
    ///
    /// Always reads the database: cart contents are arbitrary and unit
    /// prices must be current. Missing items are a fatal error; pricing a
    /// cart against a partial catalog would corrupt the reconciliation.
    pub async fn get_catalog_entries(
        &self,
        items: &[ItemRef],
    ) -> PricingResult<HashMap<ItemRef, CatalogEntry>> {
        let mut entries = HashMap::new();

        let product_ids: Vec<i32> = items
            .iter()
            .filter_map(|i| match i {
                ItemRef::Product(id) => Some(*id),
                ItemRef::Variant(_) => None,
            })
            .collect();
        let variant_ids: Vec<i32> = items
            .iter()
            .filter_map(|i| match i {
                ItemRef::Variant(id) => Some(*id),
                ItemRef::Product(_) => None,
            })
            .collect();

        let rows = sqlx::query_as::<_, CatalogRow>(
            r#"
            SELECT item_kind, item_id, name, regular_price, sale_price,
                   sale_from, sale_until, tier_prices, tax_class,
                   shipping_class, weight, category_ids
            FROM catalog_entries
            WHERE (item_kind = 'product' AND item_id = ANY($1))
               OR (item_kind = 'variant' AND item_id = ANY($2))
            "#,
        )
        .bind(&product_ids)
        .bind(&variant_ids)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let entry = Self::catalog_entry_from_row(row)?;
            entries.insert(entry.item, entry);
        }

        for item in items {
            if !entries.contains_key(item) {
                return Err(PricingError::ItemNotFound(item.to_string()));
            }
        }

        Ok(entries)
    }

    fn catalog_entry_from_row(row: CatalogRow) -> PricingResult<CatalogEntry> {
        let item = match row.item_kind.as_str() {
            "product" => ItemRef::Product(row.item_id),
            "variant" => ItemRef::Variant(row.item_id),
            other => {
                return Err(PricingError::InvalidConfiguration(format!(
                    "Unknown catalog item kind: {}",
                    other
                )))
            }
        };

        let mut tier_prices: Vec<TierPrice> = serde_json::from_value(row.tier_prices)?;
        tier_prices.sort_by_key(|t| t.min_quantity);
        for tier in &tier_prices {
            if tier.unit_price < Decimal::ZERO {
                return Err(PricingError::InvalidConfiguration(format!(
                    "Negative tier price on {}",
                    item
                )));
            }
        }

        let sale = row.sale_price.map(|price| SaleWindow {
            price,
            from: row.sale_from,
            until: row.sale_until,
        });

        Ok(CatalogEntry {
            item,
            name: row.name,
            regular_price: row.regular_price,
            sale,
            tier_prices,
            tax_class: row.tax_class,
            shipping_class: row.shipping_class,
            weight: row.weight,
            category_ids: row.category_ids,
        })
    }

    /// Fetch discount code records for the submitted codes
    ///
    /// Codes with no record are simply absent from the map; the discount
    /// engine records them as rejections.
    pub async fn get_discount_codes(
        &self,
        codes: &[String],
    ) -> PricingResult<HashMap<String, DiscountCodeRecord>> {
        if codes.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, DiscountCodeRow>(
            r#"
            SELECT code, kind, amount, free_shipping, min_spend, max_spend,
                   expires_at, usage_limit, usage_count, product_ids,
                   excluded_product_ids, category_ids, excluded_category_ids,
                   allowed_emails
            FROM discount_codes
            WHERE code = ANY($1)
            "#,
        )
        .bind(codes)
        .fetch_all(&self.pool)
        .await?;

        let mut records = HashMap::new();
        for row in rows {
            let record = Self::discount_record_from_row(row)?;
            records.insert(record.code.clone(), record);
        }
        Ok(records)
    }

    fn discount_record_from_row(row: DiscountCodeRow) -> PricingResult<DiscountCodeRecord> {
        let kind = DiscountKind::from_str(&row.kind)
            .map_err(PricingError::InvalidConfiguration)?;

        if kind == DiscountKind::Percentage && row.amount > Decimal::ONE_HUNDRED {
            return Err(PricingError::InvalidConfiguration(format!(
                "Percentage discount {} exceeds 100%",
                row.code
            )));
        }
        if let (Some(min), Some(max)) = (row.min_spend, row.max_spend) {
            if min > max {
                return Err(PricingError::InvalidConfiguration(format!(
                    "Discount {} has min_spend above max_spend",
                    row.code
                )));
            }
        }

        Ok(DiscountCodeRecord {
            code: row.code,
            kind,
            amount: row.amount,
            free_shipping: row.free_shipping,
            min_spend: row.min_spend,
            max_spend: row.max_spend,
            expires_at: row.expires_at,
            usage_limit: row.usage_limit,
            usage_count: row.usage_count,
            product_ids: row.product_ids,
            excluded_product_ids: row.excluded_product_ids,
            category_ids: row.category_ids,
            excluded_category_ids: row.excluded_category_ids,
            allowed_emails: row.allowed_emails,
        })
    }

    /// Look up a carrier rate for the given service and cart weight
    ///
    /// Rate-table lookup: the cheapest bracket covering the weight wins.
    /// `None` means the table has no covering bracket; the method is then
    /// skipped as a candidate.
    pub async fn get_carrier_quote(
        &self,
        carrier: &str,
        service: &str,
        weight: Decimal,
    ) -> PricingResult<Option<Decimal>> {
        let cost: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT cost FROM carrier_rates
            WHERE carrier = $1 AND service = $2 AND max_weight >= $3
            ORDER BY cost ASC
            LIMIT 1
            "#,
        )
        .bind(carrier)
        .bind(service)
        .bind(weight)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cost)
    }

    /// Load all tax rates from the database
    async fn load_tax_rates(&self) -> PricingResult<Vec<TaxRateEntry>> {
        let rows = sqlx::query_as::<_, TaxRateRow>(
            r#"
            SELECT rate_id, tax_class, country, state, label, rate,
                   applies_to_shipping, compound, sort_order
            FROM tax_rates
            ORDER BY sort_order, rate_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TaxRateEntry {
                rate_id: r.rate_id,
                tax_class: r.tax_class,
                country: r.country,
                state: r.state,
                label: r.label,
                rate: r.rate,
                applies_to_shipping: r.applies_to_shipping,
                compound: r.compound,
                sort_order: r.sort_order,
            })
            .collect())
    }

    /// Load the singleton tax options row
    async fn load_tax_options(&self) -> PricingResult<TaxOptions> {
        let row = sqlx::query_as::<_, TaxOptionsRow>(
            r#"
            SELECT prices_include_tax, tax_based_on, round_at_subtotal,
                   display_mode, currency, store_country, store_state
            FROM tax_options
            WHERE options_id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| PricingError::ConfigurationNotFound("tax_options".to_string()))?;

        Ok(TaxOptions {
            prices_include_tax: row.prices_include_tax,
            tax_based_on: TaxBasis::from_str(&row.tax_based_on)
                .map_err(PricingError::InvalidConfiguration)?,
            round_at_subtotal: row.round_at_subtotal,
            display_mode: TaxDisplayMode::from_str(&row.display_mode)
                .map_err(PricingError::InvalidConfiguration)?,
            currency: row.currency,
            store_country: row.store_country,
            store_state: row.store_state,
        })
    }

    /// Load shipping zones with their locations and methods
    ///
    /// Zones come back in configured order; the resolver picks the first
    /// match and never disambiguates overlaps.
    async fn load_shipping_zones(&self) -> PricingResult<Vec<ShippingZone>> {
        let zone_rows = sqlx::query_as::<_, ZoneRow>(
            "SELECT zone_id, name FROM shipping_zones ORDER BY sort_order, zone_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let location_rows = sqlx::query_as::<_, ZoneLocationRow>(
            r#"
            SELECT zone_id, country, state, postcode_pattern
            FROM shipping_zone_locations
            ORDER BY location_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let method_rows = sqlx::query_as::<_, MethodRow>(
            r#"
            SELECT method_id, zone_id, kind, title, settings
            FROM shipping_methods
            ORDER BY sort_order, method_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut zones: Vec<ShippingZone> = zone_rows
            .into_iter()
            .map(|z| ShippingZone {
                zone_id: z.zone_id,
                name: z.name,
                locations: Vec::new(),
                methods: Vec::new(),
            })
            .collect();

        for loc in location_rows {
            if let Some(zone) = zones.iter_mut().find(|z| z.zone_id == loc.zone_id) {
                zone.locations.push(ZoneLocation {
                    country: loc.country,
                    state: loc.state,
                    postcode_pattern: loc.postcode_pattern,
                });
            }
        }

        for row in method_rows {
            let method = Self::method_from_row(&row)?;
            if let Some(zone) = zones.iter_mut().find(|z| z.zone_id == row.zone_id) {
                zone.methods.push(method);
            }
        }

        Ok(zones)
    }

    /// Parse one shipping method row into its tagged configuration
    fn method_from_row(row: &MethodRow) -> PricingResult<ShippingMethod> {
        let kind = ShippingMethodKind::from_str(&row.kind)
            .map_err(PricingError::InvalidConfiguration)?;

        let config = match kind {
            ShippingMethodKind::FlatRate => {
                let settings: FlatRateSettings = serde_json::from_value(row.settings.clone())?;
                if settings.base_cost < Decimal::ZERO
                    || settings.class_costs.iter().any(|c| c.cost < Decimal::ZERO)
                {
                    return Err(PricingError::InvalidConfiguration(format!(
                        "Negative cost on flat-rate method {}",
                        row.method_id
                    )));
                }
                MethodConfig::FlatRate(settings)
            }
            ShippingMethodKind::FreeShipping => {
                let settings: FreeShippingSettings = serde_json::from_value(row.settings.clone())?;
                let needs_min = matches!(
                    settings.condition,
                    FreeShippingCondition::MinAmount
                        | FreeShippingCondition::MinAmountOrCoupon
                        | FreeShippingCondition::MinAmountAndCoupon
                );
                if needs_min && settings.min_amount.is_none() {
                    return Err(PricingError::InvalidConfiguration(format!(
                        "Free-shipping method {} requires min_amount for its condition",
                        row.method_id
                    )));
                }
                MethodConfig::FreeShipping(settings)
            }
            ShippingMethodKind::LocalPickup => {
                let settings: LocalPickupSettings = serde_json::from_value(row.settings.clone())?;
                if settings.cost < Decimal::ZERO {
                    return Err(PricingError::InvalidConfiguration(format!(
                        "Negative cost on local-pickup method {}",
                        row.method_id
                    )));
                }
                MethodConfig::LocalPickup(settings)
            }
            ShippingMethodKind::Carrier => {
                let settings: CarrierSettings = serde_json::from_value(row.settings.clone())?;
                MethodConfig::Carrier(settings)
            }
        };

        Ok(ShippingMethod {
            method_id: row.method_id.clone(),
            title: row.title.clone(),
            config,
        })
    }

    /// Get tax rates with caching
    pub async fn get_tax_rates(&self) -> PricingResult<Vec<TaxRateEntry>> {
        self.refresh_if_stale("tax_rates").await?;

        let cache = self.cache.read().await;
        Ok(cache.tax_rates.clone())
    }

    /// Get tax options with caching
    pub async fn get_tax_options(&self) -> PricingResult<TaxOptions> {
        self.refresh_if_stale("tax_options").await?;

        let cache = self.cache.read().await;
        cache
            .tax_options
            .clone()
            .ok_or_else(|| PricingError::ConfigurationNotFound("tax_options".to_string()))
    }

    /// Get shipping zones with caching
    pub async fn get_shipping_zones(&self) -> PricingResult<Vec<ShippingZone>> {
        self.refresh_if_stale("shipping_zones").await?;

        let cache = self.cache.read().await;
        Ok(cache.shipping_zones.clone())
    }

    /// Refresh one cache section if its TTL has expired
    async fn refresh_if_stale(&self, section: &str) -> PricingResult<()> {
        {
            let cache = self.cache.read().await;
            if !cache.is_stale(section, self.cache_ttl) {
                self.record_cache_hit();
                return Ok(());
            }
        }

        self.record_cache_miss();

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the write lock
        if !cache.is_stale(section, self.cache_ttl) {
            return Ok(());
        }

        match section {
            "tax_rates" => {
                let rates = self.load_tax_rates().await?;
                cache.tax_rates = rates;
                cache.mark_updated("tax_rates");
            }
            "tax_options" => {
                let options = self.load_tax_options().await?;
                cache.tax_options = Some(options);
                cache.mark_updated("tax_options");
            }
            "shipping_zones" => {
                let zones = self.load_shipping_zones().await?;
                cache.shipping_zones = zones;
                cache.mark_updated("shipping_zones");
            }
            _ => {
                return Err(PricingError::InvalidConfiguration(format!(
                    "Unknown cache section: {}",
                    section
                )));
            }
        }

        Ok(())
    }

    /// Invalidate one cache section, forcing the next access to reload
    pub async fn invalidate_cache(&self, section: &str) {
        let mut cache = self.cache.write().await;
        cache.last_updated.remove(section);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sale_window_activity() {
        let sale = SaleWindow {
            price: dec!(8.00),
            from: Some("2026-01-01T00:00:00Z".parse().unwrap()),
            until: Some("2026-02-01T00:00:00Z".parse().unwrap()),
        };

        assert!(sale.is_active("2026-01-15T12:00:00Z".parse().unwrap()));
        assert!(!sale.is_active("2025-12-31T23:59:59Z".parse().unwrap()));
        assert!(!sale.is_active("2026-02-01T00:00:01Z".parse().unwrap()));
    }

    #[test]
    fn test_sale_window_unbounded() {
        let sale = SaleWindow {
            price: dec!(8.00),
            from: None,
            until: None,
        };
        assert!(sale.is_active("2026-06-01T00:00:00Z".parse().unwrap()));
    }

    #[test]
    fn test_method_from_row_flat_rate() {
        let row = MethodRow {
            method_id: "flat-us".to_string(),
            zone_id: 1,
            kind: "flat_rate".to_string(),
            title: "Flat rate".to_string(),
            settings: serde_json::json!({
                "base_cost": "5.00",
                "class_costs": [{"class": "bulky", "cost": "2.00"}]
            }),
        };

        let method = PricingConfigStore::method_from_row(&row).unwrap();
        match method.config {
            MethodConfig::FlatRate(settings) => {
                assert_eq!(settings.base_cost, dec!(5.00));
                assert_eq!(settings.class_costs.len(), 1);
                assert_eq!(settings.class_costs[0].class.as_deref(), Some("bulky"));
            }
            other => panic!("expected flat rate, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_method_from_row_rejects_negative_cost() {
        let row = MethodRow {
            method_id: "flat-bad".to_string(),
            zone_id: 1,
            kind: "flat_rate".to_string(),
            title: "Flat rate".to_string(),
            settings: serde_json::json!({"base_cost": "-1.00"}),
        };

        assert!(matches!(
            PricingConfigStore::method_from_row(&row),
            Err(PricingError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_method_from_row_free_shipping_requires_min_amount() {
        let row = MethodRow {
            method_id: "free-1".to_string(),
            zone_id: 1,
            kind: "free_shipping".to_string(),
            title: "Free shipping".to_string(),
            settings: serde_json::json!({"condition": "min_amount"}),
        };

        assert!(matches!(
            PricingConfigStore::method_from_row(&row),
            Err(PricingError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_discount_record_validation() {
        let row = DiscountCodeRow {
            code: "OVER".to_string(),
            kind: "percentage".to_string(),
            amount: dec!(150),
            free_shipping: false,
            min_spend: None,
            max_spend: None,
            expires_at: None,
            usage_limit: None,
            usage_count: 0,
            product_ids: vec![],
            excluded_product_ids: vec![],
            category_ids: vec![],
            excluded_category_ids: vec![],
            allowed_emails: vec![],
        };

        assert!(matches!(
            PricingConfigStore::discount_record_from_row(row),
            Err(PricingError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_catalog_entry_tiers_sorted() {
        let row = CatalogRow {
            item_kind: "product".to_string(),
            item_id: 1,
            name: "Widget".to_string(),
            regular_price: dec!(10.00),
            sale_price: None,
            sale_from: None,
            sale_until: None,
            tier_prices: serde_json::json!([
                {"min_quantity": 10, "unit_price": "8.00"},
                {"min_quantity": 3, "unit_price": "9.00"}
            ]),
            tax_class: "standard".to_string(),
            shipping_class: None,
            weight: None,
            category_ids: vec![],
        };

        let entry = PricingConfigStore::catalog_entry_from_row(row).unwrap();
        assert_eq!(entry.tier_prices[0].min_quantity, 3);
        assert_eq!(entry.tier_prices[1].min_quantity, 10);
    }
}
