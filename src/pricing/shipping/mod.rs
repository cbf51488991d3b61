// Shipping Resolver
//
// Resolves the shipping zone for a destination address (first matching zone
// in configured order wins), evaluates each configured method into a costed
// candidate, and marks the selection. An address no zone covers is reported
// on the result, not thrown, so the rest of the cart still displays.

use crate::pricing::{
    config_store::{ClassCost, FlatRateSettings, FreeShippingSettings, MethodConfig, ShippingZone},
    items::PricedLine,
    types::{Address, FreeShippingCondition, ShippingMethodKind},
};
use regex::RegexBuilder;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

/// One costed shipping candidate
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShippingMethodOption {
    pub method_id: String,
    pub title: String,
    pub kind: ShippingMethodKind,
    pub cost: Decimal,
    pub is_free_shipping: bool,
    pub selected: bool,
}

/// Outcome of shipping resolution for one cart
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ShippingResolution {
    /// All eligible methods; exactly one is marked selected unless empty
    pub candidates: Vec<ShippingMethodOption>,
    /// No zone covers the destination
    pub cannot_ship: bool,
    pub notes: Vec<String>,
}

impl ShippingResolution {
    pub fn selected(&self) -> Option<&ShippingMethodOption> {
        self.candidates.iter().find(|c| c.selected)
    }
}

/// The shippable shape of a cart: distinct shipping classes and total weight
#[derive(Debug, Clone, Default)]
pub struct CartShippingProfile {
    pub classes: Vec<String>,
    pub total_weight: Decimal,
}

impl CartShippingProfile {
    /// Derive the profile from priced lines
    pub fn from_lines(lines: &[PricedLine]) -> Self {
        let mut classes: Vec<String> = Vec::new();
        let mut total_weight = Decimal::ZERO;

        for line in lines {
            if let Some(ref class) = line.shipping_class {
                if !classes.contains(class) {
                    classes.push(class.clone());
                }
            }
            if let Some(weight) = line.weight {
                total_weight += weight;
            }
        }

        Self {
            classes,
            total_weight,
        }
    }
}

/// Inputs the resolver needs beyond the zone configuration
#[derive(Debug)]
pub struct ShippingContext<'a> {
    pub destination: &'a Address,
    pub profile: &'a CartShippingProfile,
    /// Cart subtotal before discount codes were deducted
    pub subtotal_before_discount: Decimal,
    /// Cart subtotal after discount codes were deducted
    pub subtotal_after_discount: Decimal,
    /// An accepted discount code grants free shipping
    pub coupon_grants_free_shipping: bool,
    /// The cart's explicitly selected method, if any
    pub selected_method_id: Option<&'a str>,
    /// Prefetched carrier quotes keyed by method id
    pub carrier_quotes: &'a HashMap<String, Decimal>,
}

/// Resolve shipping for a cart
pub fn resolve(zones: &[ShippingZone], ctx: &ShippingContext<'_>) -> ShippingResolution {
    let Some(zone) = resolve_zone(zones, ctx.destination) else {
        return ShippingResolution {
            candidates: Vec::new(),
            cannot_ship: true,
            notes: vec![format!(
                "No shipping zone matches destination country {}",
                ctx.destination.country
            )],
        };
    };

    tracing::debug!("Resolved shipping zone '{}' for destination", zone.name);

    let mut notes = Vec::new();
    let mut candidates = Vec::new();

    for method in &zone.methods {
        match &method.config {
            MethodConfig::FlatRate(settings) => {
                candidates.push(ShippingMethodOption {
                    method_id: method.method_id.clone(),
                    title: method.title.clone(),
                    kind: ShippingMethodKind::FlatRate,
                    cost: flat_rate_cost(settings, &ctx.profile.classes),
                    is_free_shipping: false,
                    selected: false,
                });
            }
            MethodConfig::FreeShipping(settings) => {
                if free_shipping_eligible(settings, ctx) {
                    candidates.push(ShippingMethodOption {
                        method_id: method.method_id.clone(),
                        title: method.title.clone(),
                        kind: ShippingMethodKind::FreeShipping,
                        cost: Decimal::ZERO,
                        is_free_shipping: true,
                        selected: false,
                    });
                }
            }
            MethodConfig::LocalPickup(settings) => {
                candidates.push(ShippingMethodOption {
                    method_id: method.method_id.clone(),
                    title: method.title.clone(),
                    kind: ShippingMethodKind::LocalPickup,
                    cost: settings.cost,
                    is_free_shipping: false,
                    selected: false,
                });
            }
            MethodConfig::Carrier(settings) => {
                match ctx.carrier_quotes.get(&method.method_id) {
                    Some(cost) => candidates.push(ShippingMethodOption {
                        method_id: method.method_id.clone(),
                        title: method.title.clone(),
                        kind: ShippingMethodKind::Carrier,
                        cost: *cost,
                        is_free_shipping: false,
                        selected: false,
                    }),
                    None => {
                        notes.push(format!(
                            "No {} {} rate covers this cart; method {} skipped",
                            settings.carrier, settings.service, method.method_id
                        ));
                    }
                }
            }
        }
    }

    mark_selection(&mut candidates, ctx.selected_method_id);

    ShippingResolution {
        candidates,
        cannot_ship: false,
        notes,
    }
}

/// First zone whose geographic rules match the destination
///
/// Zones are assumed non-overlapping by configuration; ties are not
/// disambiguated here.
pub fn resolve_zone<'a>(zones: &'a [ShippingZone], destination: &Address) -> Option<&'a ShippingZone> {
    zones
        .iter()
        .find(|zone| zone.locations.iter().any(|loc| location_matches(loc, destination)))
}

fn location_matches(
    location: &crate::pricing::config_store::ZoneLocation,
    destination: &Address,
) -> bool {
    if !location.country.eq_ignore_ascii_case(&destination.country) {
        return false;
    }

    if let Some(ref state) = location.state {
        match destination.state {
            Some(ref addr_state) if state.eq_ignore_ascii_case(addr_state) => {}
            _ => return false,
        }
    }

    if let Some(ref pattern) = location.postcode_pattern {
        match destination.postcode {
            Some(ref postcode) => {
                if !postcode_matches(pattern, postcode) {
                    return false;
                }
            }
            None => return false,
        }
    }

    true
}

/// Match a postcode against a pattern where `*` is a wildcard
fn postcode_matches(pattern: &str, postcode: &str) -> bool {
    let anchored = format!(
        "^{}$",
        pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*")
    );

    match RegexBuilder::new(&anchored).case_insensitive(true).build() {
        Ok(re) => re.is_match(postcode.trim()),
        Err(e) => {
            tracing::warn!("Unusable postcode pattern '{}': {}", pattern, e);
            false
        }
    }
}

/// Flat-rate cost: base plus one surcharge per shipping class in the cart
///
/// An entry naming the class exactly wins over the any-class fallback; among
/// multiple exact entries the first in configured order is used.
fn flat_rate_cost(settings: &FlatRateSettings, classes: &[String]) -> Decimal {
    let mut cost = settings.base_cost;

    for class in classes {
        if let Some(surcharge) = class_surcharge(&settings.class_costs, class) {
            cost += surcharge;
        }
    }

    cost
}

fn class_surcharge(entries: &[ClassCost], class: &str) -> Option<Decimal> {
    let exact = entries
        .iter()
        .find(|e| e.class.as_deref() == Some(class))
        .map(|e| e.cost);

    exact.or_else(|| entries.iter().find(|e| e.class.is_none()).map(|e| e.cost))
}

/// Whether a free-shipping method's condition currently holds
fn free_shipping_eligible(settings: &FreeShippingSettings, ctx: &ShippingContext<'_>) -> bool {
    let min_reached = settings.min_amount.map(|min| {
        let basis = if settings.min_amount_after_discount {
            ctx.subtotal_after_discount
        } else {
            ctx.subtotal_before_discount
        };
        basis >= min
    });

    match settings.condition {
        FreeShippingCondition::Always => true,
        FreeShippingCondition::Coupon => ctx.coupon_grants_free_shipping,
        FreeShippingCondition::MinAmount => min_reached.unwrap_or(false),
        FreeShippingCondition::MinAmountOrCoupon => {
            min_reached.unwrap_or(false) || ctx.coupon_grants_free_shipping
        }
        FreeShippingCondition::MinAmountAndCoupon => {
            min_reached.unwrap_or(false) && ctx.coupon_grants_free_shipping
        }
    }
}

/// Mark the explicitly selected method, or default to the cheapest candidate
fn mark_selection(candidates: &mut [ShippingMethodOption], selected_method_id: Option<&str>) {
    if candidates.is_empty() {
        return;
    }

    let explicit = selected_method_id
        .and_then(|id| candidates.iter().position(|c| c.method_id == id));

    let index = explicit.unwrap_or_else(|| {
        let mut best = 0;
        for (i, candidate) in candidates.iter().enumerate() {
            if candidate.cost < candidates[best].cost {
                best = i;
            }
        }
        best
    });

    candidates[index].selected = true;
}
