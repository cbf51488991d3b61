// Domain type definitions for the pricing engine
// Shared enums and value types used across the resolver components

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Reference to a purchasable catalog item
///
/// A cart line points at either a standalone product or a specific variant.
/// Modeled as a tagged variant so that "both set" or "neither set" states
/// cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemRef {
    /// A product sold without variants
    Product(i32),

    /// A concrete variant of a variable product
    Variant(i32),
}

impl ItemRef {
    /// The raw catalog id, regardless of kind
    pub fn id(&self) -> i32 {
        match self {
            ItemRef::Product(id) | ItemRef::Variant(id) => *id,
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemRef::Product(id) => write!(f, "product:{}", id),
            ItemRef::Variant(id) => write!(f, "variant:{}", id),
        }
    }
}

/// How a discount code reduces the cart total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// Percentage of the matched line subtotals (e.g. 10 = 10% off)
    Percentage,

    /// Flat amount off the cart, capped at the matched base
    FixedCart,

    /// Flat amount per matching unit, capped at each line's subtotal
    FixedProduct,
}

impl fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountKind::Percentage => write!(f, "percentage"),
            DiscountKind::FixedCart => write!(f, "fixed_cart"),
            DiscountKind::FixedProduct => write!(f, "fixed_product"),
        }
    }
}

impl std::str::FromStr for DiscountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountKind::Percentage),
            "fixed_cart" => Ok(DiscountKind::FixedCart),
            "fixed_product" => Ok(DiscountKind::FixedProduct),
            _ => Err(format!("Invalid discount kind: {}", s)),
        }
    }
}

/// The four supported shipping method families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethodKind {
    FlatRate,
    FreeShipping,
    LocalPickup,
    Carrier,
}

impl fmt::Display for ShippingMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShippingMethodKind::FlatRate => write!(f, "flat_rate"),
            ShippingMethodKind::FreeShipping => write!(f, "free_shipping"),
            ShippingMethodKind::LocalPickup => write!(f, "local_pickup"),
            ShippingMethodKind::Carrier => write!(f, "carrier"),
        }
    }
}

impl std::str::FromStr for ShippingMethodKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat_rate" => Ok(ShippingMethodKind::FlatRate),
            "free_shipping" => Ok(ShippingMethodKind::FreeShipping),
            "local_pickup" => Ok(ShippingMethodKind::LocalPickup),
            "carrier" => Ok(ShippingMethodKind::Carrier),
            _ => Err(format!("Invalid shipping method kind: {}", s)),
        }
    }
}

/// Condition gating a free-shipping method's eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FreeShippingCondition {
    /// Always eligible
    Always,

    /// Eligible only when an accepted discount code grants free shipping
    Coupon,

    /// Eligible once the order subtotal reaches the configured minimum
    MinAmount,

    /// Either the minimum amount is reached or a coupon grants it
    MinAmountOrCoupon,

    /// Both the minimum amount and a granting coupon are required
    MinAmountAndCoupon,
}

impl fmt::Display for FreeShippingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreeShippingCondition::Always => write!(f, "always"),
            FreeShippingCondition::Coupon => write!(f, "coupon"),
            FreeShippingCondition::MinAmount => write!(f, "min_amount"),
            FreeShippingCondition::MinAmountOrCoupon => write!(f, "min_amount_or_coupon"),
            FreeShippingCondition::MinAmountAndCoupon => write!(f, "min_amount_and_coupon"),
        }
    }
}

/// Which address the tax resolver derives the region from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxBasis {
    /// Ship-to address (the default)
    Shipping,

    /// Bill-to address, falling back to ship-to when absent
    Billing,

    /// The store's own configured address
    Store,
}

impl std::str::FromStr for TaxBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shipping" => Ok(TaxBasis::Shipping),
            "billing" => Ok(TaxBasis::Billing),
            "store" => Ok(TaxBasis::Store),
            _ => Err(format!("Invalid tax basis: {}", s)),
        }
    }
}

/// How prices are presented to the shopper
///
/// Informational metadata echoed into the calculation result; it never
/// changes the arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxDisplayMode {
    Including,
    Excluding,
}

impl std::str::FromStr for TaxDisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "including" => Ok(TaxDisplayMode::Including),
            "excluding" => Ok(TaxDisplayMode::Excluding),
            _ => Err(format!("Invalid tax display mode: {}", s)),
        }
    }
}

/// A postal address as consumed by the tax and shipping resolvers
///
/// Only the fields that participate in region matching are modeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Address {
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub city: Option<String>,
}

impl Address {
    pub fn new(country: &str) -> Self {
        Self {
            country: country.to_string(),
            state: None,
            postcode: None,
            city: None,
        }
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.state = Some(state.to_string());
        self
    }

    pub fn with_postcode(mut self, postcode: &str) -> Self {
        self.postcode = Some(postcode.to_string());
        self
    }
}
