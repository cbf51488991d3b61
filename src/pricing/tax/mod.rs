// Tax Resolver
//
// Given a taxable base, a tax classification, and a region, applies the
// configured rate entries: non-compound rates on the raw base, compound rates
// sequentially on the running taxed amount. Supports tax-inclusive catalogs
// by backing the tax portion out algebraically instead of adding it on top.

use crate::pricing::{
    config_store::{TaxOptions, TaxRateEntry},
    types::{Address, TaxBasis},
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;

/// Decimal places of the currency's minor unit
const CURRENCY_SCALE: u32 = 2;

/// One applied tax rate with its computed amount
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaxBreakdownItem {
    pub rate_id: i32,
    pub label: String,
    /// Percentage, e.g. 20.0 for 20%
    pub rate: Decimal,
    pub compound: bool,
    pub amount: Decimal,
}

/// Result of resolving tax for one base amount
///
/// Amounts are unrounded; rounding policy (per line or at subtotal level)
/// belongs to the aggregator.
#[derive(Debug, Clone, Default)]
pub struct TaxResolution {
    pub breakdown: Vec<TaxBreakdownItem>,
    pub total: Decimal,
}

/// Round an amount to the currency's minor unit
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Pick the address the region filter runs against
///
/// Billing falls back to the shipping address when absent; the store basis
/// synthesizes an address from the configured store region.
pub fn tax_address(
    options: &TaxOptions,
    shipping: &Address,
    billing: Option<&Address>,
) -> Address {
    match options.tax_based_on {
        TaxBasis::Shipping => shipping.clone(),
        TaxBasis::Billing => billing.cloned().unwrap_or_else(|| shipping.clone()),
        TaxBasis::Store => {
            let mut address = Address::new(&options.store_country);
            address.state = options.store_state.clone();
            address
        }
    }
}

/// Rates applicable to a classification in a region
///
/// Non-compound rates come first, compound rates after, preserving the
/// configured order within each group.
pub fn applicable_rates<'a>(
    rates: &'a [TaxRateEntry],
    tax_class: &str,
    address: &Address,
) -> Vec<&'a TaxRateEntry> {
    let mut matched: Vec<&TaxRateEntry> = rates
        .iter()
        .filter(|rate| rate.tax_class == tax_class && region_matches(rate, address))
        .collect();

    matched.sort_by_key(|rate| rate.compound);
    matched
}

/// Rates applicable to the selected shipping cost in a region
///
/// Shipping is taxed through the standard classification's entries that are
/// flagged as applying to shipping.
pub fn applicable_shipping_rates<'a>(
    rates: &'a [TaxRateEntry],
    address: &Address,
) -> Vec<&'a TaxRateEntry> {
    let mut matched: Vec<&TaxRateEntry> = rates
        .iter()
        .filter(|rate| {
            rate.applies_to_shipping && rate.tax_class == "standard" && region_matches(rate, address)
        })
        .collect();

    matched.sort_by_key(|rate| rate.compound);
    matched
}

fn region_matches(rate: &TaxRateEntry, address: &Address) -> bool {
    if !rate.country.eq_ignore_ascii_case(&address.country) {
        return false;
    }
    match (&rate.state, &address.state) {
        // A rate with no state applies to the whole country
        (None, _) => true,
        (Some(rate_state), Some(addr_state)) => rate_state.eq_ignore_ascii_case(addr_state),
        (Some(_), None) => false,
    }
}

/// Resolve tax for one base amount against pre-filtered, pre-ordered rates
///
/// With tax-inclusive prices the base already carries the tax; the net base
/// is recovered as `base / combined multiplier` and the per-rate amounts are
/// computed forward from that net, so the total equals
/// `base - base / (1 + total rate)`.
pub fn resolve_tax(base: Decimal, rates: &[&TaxRateEntry], prices_include_tax: bool) -> TaxResolution {
    if rates.is_empty() || base == Decimal::ZERO {
        // A classification with no configured rates is tax-exempt by
        // omission, not an error.
        return TaxResolution::default();
    }

    let net_base = if prices_include_tax {
        base / combined_multiplier(rates)
    } else {
        base
    };

    let mut breakdown = Vec::with_capacity(rates.len());
    let mut accumulated = Decimal::ZERO;

    for rate in rates {
        let fraction = rate.rate / Decimal::ONE_HUNDRED;
        let amount = if rate.compound {
            (net_base + accumulated) * fraction
        } else {
            net_base * fraction
        };
        accumulated += amount;

        breakdown.push(TaxBreakdownItem {
            rate_id: rate.rate_id,
            label: rate.label.clone(),
            rate: rate.rate,
            compound: rate.compound,
            amount,
        });
    }

    TaxResolution {
        breakdown,
        total: accumulated,
    }
}

/// Combined tax multiplier for a rate set
///
/// Non-compound rates add; each compound rate multiplies the running total.
fn combined_multiplier(rates: &[&TaxRateEntry]) -> Decimal {
    let non_compound_sum: Decimal = rates
        .iter()
        .filter(|r| !r.compound)
        .map(|r| r.rate / Decimal::ONE_HUNDRED)
        .sum();

    let mut multiplier = Decimal::ONE + non_compound_sum;
    for rate in rates.iter().filter(|r| r.compound) {
        multiplier *= Decimal::ONE + rate.rate / Decimal::ONE_HUNDRED;
    }
    multiplier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::types::TaxDisplayMode;
    use rust_decimal_macros::dec;

    fn rate(id: i32, pct: Decimal, compound: bool) -> TaxRateEntry {
        TaxRateEntry {
            rate_id: id,
            tax_class: "standard".to_string(),
            country: "CA".to_string(),
            state: None,
            label: format!("Rate {}", id),
            rate: pct,
            applies_to_shipping: true,
            compound,
            sort_order: id,
        }
    }

    #[test]
    fn test_single_rate_exclusive() {
        let r = rate(1, dec!(20), false);
        let resolution = resolve_tax(dec!(100.00), &[&r], false);
        assert_eq!(resolution.total, dec!(20.00));
        assert_eq!(resolution.breakdown.len(), 1);
        assert_eq!(resolution.breakdown[0].amount, dec!(20.00));
    }

    #[test]
    fn test_compound_rate_applies_on_running_total() {
        // 5% GST on 100 = 5; compound 7% PST on 105 = 7.35
        let gst = rate(1, dec!(5), false);
        let pst = rate(2, dec!(7), true);
        let resolution = resolve_tax(dec!(100.00), &[&gst, &pst], false);

        assert_eq!(resolution.breakdown[0].amount, dec!(5.00));
        assert_eq!(resolution.breakdown[1].amount, dec!(7.35));
        assert_eq!(resolution.total, dec!(12.35));
    }

    #[test]
    fn test_non_compound_rates_ignore_each_other() {
        let a = rate(1, dec!(10), false);
        let b = rate(2, dec!(5), false);
        let resolution = resolve_tax(dec!(200.00), &[&a, &b], false);

        assert_eq!(resolution.breakdown[0].amount, dec!(20.00));
        assert_eq!(resolution.breakdown[1].amount, dec!(10.00));
        assert_eq!(resolution.total, dec!(30.00));
    }

    #[test]
    fn test_inclusive_backs_out_tax() {
        // 120 including 20% -> net 100, tax 20
        let r = rate(1, dec!(20), false);
        let resolution = resolve_tax(dec!(120.00), &[&r], true);
        assert_eq!(round_currency(resolution.total), dec!(20.00));
    }

    #[test]
    fn test_inclusive_round_trip_with_compound() {
        let gst = rate(1, dec!(5), false);
        let pst = rate(2, dec!(7), true);
        let base = dec!(112.35);

        let resolution = resolve_tax(base, &[&gst, &pst], true);
        // Recovered net plus computed tax reproduces the inclusive base
        let net = base - resolution.total;
        assert_eq!(round_currency(net), dec!(100.00));
    }

    #[test]
    fn test_no_rates_is_zero_not_error() {
        let resolution = resolve_tax(dec!(50.00), &[], false);
        assert_eq!(resolution.total, Decimal::ZERO);
        assert!(resolution.breakdown.is_empty());
    }

    #[test]
    fn test_applicable_rates_orders_compound_last() {
        let rates = vec![
            rate(1, dec!(7), true),
            rate(2, dec!(5), false),
            rate(3, dec!(2), true),
        ];
        let address = Address::new("CA");
        let matched = applicable_rates(&rates, "standard", &address);

        assert_eq!(matched.len(), 3);
        assert!(!matched[0].compound);
        assert!(matched[1].compound && matched[1].rate_id == 1);
        assert!(matched[2].compound && matched[2].rate_id == 3);
    }

    #[test]
    fn test_region_filtering() {
        let mut ontario = rate(1, dec!(13), false);
        ontario.state = Some("ON".to_string());
        let country_wide = rate(2, dec!(5), false);

        let rates = vec![ontario, country_wide];

        let on = Address::new("CA").with_state("ON");
        assert_eq!(applicable_rates(&rates, "standard", &on).len(), 2);

        let bc = Address::new("CA").with_state("BC");
        let matched = applicable_rates(&rates, "standard", &bc);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].rate_id, 2);

        let us = Address::new("US");
        assert!(applicable_rates(&rates, "standard", &us).is_empty());
    }

    #[test]
    fn test_class_filtering() {
        let mut reduced = rate(1, dec!(9), false);
        reduced.tax_class = "reduced".to_string();
        let rates = vec![reduced, rate(2, dec!(20), false)];

        let address = Address::new("CA");
        let matched = applicable_rates(&rates, "reduced", &address);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].rate_id, 1);
    }

    #[test]
    fn test_shipping_rates_respect_flag() {
        let mut no_shipping = rate(1, dec!(20), false);
        no_shipping.applies_to_shipping = false;
        let rates = vec![no_shipping, rate(2, dec!(5), false)];

        let matched = applicable_shipping_rates(&rates, &Address::new("CA"));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].rate_id, 2);
    }

    #[test]
    fn test_tax_address_selection() {
        let options = TaxOptions {
            prices_include_tax: false,
            tax_based_on: TaxBasis::Billing,
            round_at_subtotal: false,
            display_mode: TaxDisplayMode::Excluding,
            currency: "USD".to_string(),
            store_country: "US".to_string(),
            store_state: Some("NY".to_string()),
        };

        let shipping = Address::new("CA");
        let billing = Address::new("FR");

        assert_eq!(tax_address(&options, &shipping, Some(&billing)).country, "FR");
        // Billing basis falls back to shipping when no billing address given
        assert_eq!(tax_address(&options, &shipping, None).country, "CA");

        let store_options = TaxOptions {
            tax_based_on: TaxBasis::Store,
            ..options
        };
        let store = tax_address(&store_options, &shipping, None);
        assert_eq!(store.country, "US");
        assert_eq!(store.state.as_deref(), Some("NY"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    /// Tax-inclusive resolution recovers a net base that reproduces the
    /// original inclusive amount within one minor currency unit.
    #[test]
    fn prop_inclusive_round_trip() {
        proptest!(|(
            base_cents in 100u32..=1_000_000u32,
            rate_bp in 1u32..=3000u32,
            compound in proptest::bool::ANY
        )| {
            let base = Decimal::from(base_cents) / Decimal::from(100);
            let entry = TaxRateEntry {
                rate_id: 1,
                tax_class: "standard".to_string(),
                country: "CA".to_string(),
                state: None,
                label: "Rate".to_string(),
                rate: Decimal::from(rate_bp) / Decimal::from(100),
                applies_to_shipping: true,
                compound,
                sort_order: 0,
            };

            let resolution = resolve_tax(base, &[&entry], true);
            let net = base - resolution.total;
            let rebuilt = net * (Decimal::ONE + entry.rate / Decimal::ONE_HUNDRED);

            let diff = (rebuilt - base).abs();
            prop_assert!(diff <= Decimal::new(1, 2), "diff {} too large", diff);
        });
    }

    /// Exclusive tax total equals the sum of the breakdown amounts.
    #[test]
    fn prop_breakdown_sums_to_total() {
        proptest!(|(
            base_cents in 0u32..=500_000u32,
            rates_bp in prop::collection::vec((1u32..=2500u32, proptest::bool::ANY), 1..=5)
        )| {
            let base = Decimal::from(base_cents) / Decimal::from(100);
            let entries: Vec<TaxRateEntry> = rates_bp
                .iter()
                .enumerate()
                .map(|(i, (bp, compound))| TaxRateEntry {
                    rate_id: i as i32,
                    tax_class: "standard".to_string(),
                    country: "CA".to_string(),
                    state: None,
                    label: format!("Rate {}", i),
                    rate: Decimal::from(*bp) / Decimal::from(100),
                    applies_to_shipping: true,
                    compound: *compound,
                    sort_order: i as i32,
                })
                .collect();

            let refs: Vec<&TaxRateEntry> = entries.iter().collect();
            let resolution = resolve_tax(base, &refs, false);
            let summed: Decimal = resolution.breakdown.iter().map(|b| b.amount).sum();
            prop_assert_eq!(summed, resolution.total);
            prop_assert!(resolution.total >= Decimal::ZERO);
        });
    }
}
