// Discount Engine
//
// Validates submitted discount codes, computes each accepted code's amount
// against the line subtotals it matches, and allocates every amount back
// onto the matched lines so per-line shares sum exactly to the code's total.
// Individual rejections are recorded with a reason and never abort the cart.

use crate::pricing::{
    config_store::DiscountCodeRecord,
    error::{PricingError, PricingResult},
    items::PricedLine,
    tax::round_currency,
    types::{DiscountKind, ItemRef},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

/// A code that did not apply, with the reason it was rejected
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RejectedDiscount {
    pub code: String,
    pub reason: String,
}

/// One line's share of an applied discount
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LineAllocation {
    pub item: ItemRef,
    pub amount: Decimal,
}

/// The resolved effect of one accepted discount code
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AppliedDiscount {
    pub code: String,
    pub kind: DiscountKind,
    /// Amount actually deducted from the cart
    pub amount: Decimal,
    pub grants_free_shipping: bool,
    /// Per-line shares; they sum exactly to `amount`
    pub line_allocations: Vec<LineAllocation>,
}

/// Outcome of evaluating all submitted codes
#[derive(Debug, Clone, Default)]
pub struct DiscountOutcome {
    pub applied: Vec<AppliedDiscount>,
    pub rejected: Vec<RejectedDiscount>,
    pub total_discount: Decimal,
    /// Any accepted code carried a free-shipping grant
    pub free_shipping: bool,
}

/// Evaluate submitted discount codes against the priced lines
///
/// Codes are processed in submission order and stack additively. Each code's
/// amount is computed against the un-discounted subtotals of the lines it
/// matches, then clamped to the capacity earlier codes left on those lines,
/// so the total discount can never exceed the cart subtotal.
pub fn evaluate(
    codes: &[String],
    records: &HashMap<String, DiscountCodeRecord>,
    lines: &[PricedLine],
    customer_email: Option<&str>,
    as_of: DateTime<Utc>,
) -> PricingResult<DiscountOutcome> {
    // Duplicates are a batch-level validation failure, checked before any
    // per-code evaluation.
    for (i, code) in codes.iter().enumerate() {
        if codes[..i].contains(code) {
            return Err(PricingError::DuplicateDiscountCode(code.clone()));
        }
    }

    let cart_subtotal: Decimal = lines.iter().map(|l| l.line_subtotal).sum();
    let mut remaining: Vec<Decimal> = lines.iter().map(|l| l.line_subtotal).collect();

    let mut outcome = DiscountOutcome::default();

    for code in codes {
        let Some(record) = records.get(code) else {
            outcome.rejected.push(RejectedDiscount {
                code: code.clone(),
                reason: "Discount code does not exist".to_string(),
            });
            continue;
        };

        if let Err(reason) = check_eligibility(record, cart_subtotal, customer_email, as_of) {
            tracing::debug!("Discount code {} rejected: {}", code, reason);
            outcome.rejected.push(RejectedDiscount {
                code: code.clone(),
                reason,
            });
            continue;
        }

        let matched: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line_matches(record, line))
            .map(|(i, _)| i)
            .collect();

        if matched.is_empty() {
            outcome.rejected.push(RejectedDiscount {
                code: code.clone(),
                reason: "No cart items match this discount".to_string(),
            });
            continue;
        }

        let allocations = match record.kind {
            DiscountKind::FixedProduct => fixed_product_allocations(record, lines, &matched, &mut remaining),
            DiscountKind::Percentage | DiscountKind::FixedCart => {
                let matched_base: Decimal = matched.iter().map(|&i| lines[i].line_subtotal).sum();
                let raw_amount = match record.kind {
                    DiscountKind::Percentage => {
                        round_currency(matched_base * record.amount / Decimal::ONE_HUNDRED)
                    }
                    _ => record.amount.min(matched_base),
                };
                let capacity: Decimal = matched.iter().map(|&i| remaining[i]).sum();
                let amount = raw_amount.min(capacity);
                allocate_proportional(amount, lines, &matched, &mut remaining)
            }
        };

        let amount: Decimal = allocations.iter().map(|a| a.amount).sum();
        if amount <= Decimal::ZERO {
            outcome.rejected.push(RejectedDiscount {
                code: code.clone(),
                reason: "No discountable amount remains on matching items".to_string(),
            });
            continue;
        }

        if record.free_shipping {
            outcome.free_shipping = true;
        }
        outcome.total_discount += amount;
        outcome.applied.push(AppliedDiscount {
            code: record.code.clone(),
            kind: record.kind,
            amount,
            grants_free_shipping: record.free_shipping,
            line_allocations: allocations,
        });
    }

    Ok(outcome)
}

/// Per-code eligibility checks, in the order the rejection reasons read best
fn check_eligibility(
    record: &DiscountCodeRecord,
    cart_subtotal: Decimal,
    customer_email: Option<&str>,
    as_of: DateTime<Utc>,
) -> Result<(), String> {
    if let Some(expires_at) = record.expires_at {
        if as_of > expires_at {
            return Err("Discount code has expired".to_string());
        }
    }

    if let Some(limit) = record.usage_limit {
        if record.usage_count >= limit {
            return Err("Discount code usage limit reached".to_string());
        }
    }

    if !record.allowed_emails.is_empty() {
        let allowed = customer_email
            .map(|email| {
                record
                    .allowed_emails
                    .iter()
                    .any(|a| a.eq_ignore_ascii_case(email))
            })
            .unwrap_or(false);
        if !allowed {
            return Err("Discount code is not available for this customer".to_string());
        }
    }

    if let Some(min_spend) = record.min_spend {
        if cart_subtotal < min_spend {
            return Err(format!("Cart subtotal is below the minimum spend of {}", min_spend));
        }
    }

    if let Some(max_spend) = record.max_spend {
        if cart_subtotal > max_spend {
            return Err(format!("Cart subtotal is above the maximum spend of {}", max_spend));
        }
    }

    Ok(())
}

/// Whether a line participates in a code's discount base
///
/// Exclusion sets take precedence over inclusion sets; empty inclusion sets
/// match every non-excluded line.
fn line_matches(record: &DiscountCodeRecord, line: &PricedLine) -> bool {
    let item_id = line.item.id();

    if record.excluded_product_ids.contains(&item_id) {
        return false;
    }
    if line
        .category_ids
        .iter()
        .any(|c| record.excluded_category_ids.contains(c))
    {
        return false;
    }

    let has_inclusion = !record.product_ids.is_empty() || !record.category_ids.is_empty();
    if !has_inclusion {
        return true;
    }

    record.product_ids.contains(&item_id)
        || line
            .category_ids
            .iter()
            .any(|c| record.category_ids.contains(c))
}

/// Fixed-per-product amounts: flat amount per matching unit, capped at each
/// line's subtotal and at the capacity left on the line
fn fixed_product_allocations(
    record: &DiscountCodeRecord,
    lines: &[PricedLine],
    matched: &[usize],
    remaining: &mut [Decimal],
) -> Vec<LineAllocation> {
    let mut allocations = Vec::new();

    for &i in matched {
        let line = &lines[i];
        let per_line = (record.amount * Decimal::from(line.quantity))
            .min(line.line_subtotal)
            .min(remaining[i]);
        let per_line = round_currency(per_line);
        if per_line > Decimal::ZERO {
            remaining[i] -= per_line;
            allocations.push(LineAllocation {
                item: line.item,
                amount: per_line,
            });
        }
    }

    allocations
}

/// Distribute an amount across matched lines proportionally to their
/// un-discounted subtotal share
///
/// Every line but the last gets its rounded proportional share; the last
/// matched line absorbs the rounding residue, so the shares sum exactly to
/// the amount. Shares never exceed the capacity earlier codes left on a
/// line; overflow is moved onto matched lines that still have room, in
/// iteration order.
fn allocate_proportional(
    amount: Decimal,
    lines: &[PricedLine],
    matched: &[usize],
    remaining: &mut [Decimal],
) -> Vec<LineAllocation> {
    if amount <= Decimal::ZERO || matched.is_empty() {
        return Vec::new();
    }

    let matched_base: Decimal = matched.iter().map(|&i| lines[i].line_subtotal).sum();
    if matched_base <= Decimal::ZERO {
        return Vec::new();
    }

    let mut shares: Vec<Decimal> = Vec::with_capacity(matched.len());
    let mut allocated = Decimal::ZERO;

    for (pos, &i) in matched.iter().enumerate() {
        let share = if pos + 1 == matched.len() {
            amount - allocated
        } else {
            round_currency(amount * lines[i].line_subtotal / matched_base)
        };
        allocated += share;
        shares.push(share);
    }

    // Rounding can leave the residue holder negative; pull the deficit back
    // from earlier shares.
    let last = shares.len() - 1;
    if shares[last] < Decimal::ZERO {
        let mut deficit = -shares[last];
        shares[last] = Decimal::ZERO;
        for pos in (0..last).rev() {
            if deficit <= Decimal::ZERO {
                break;
            }
            let take = shares[pos].min(deficit);
            shares[pos] -= take;
            deficit -= take;
        }
    }

    // Clamp to per-line capacity, then push the overflow onto lines with room
    let mut overflow = Decimal::ZERO;
    for (pos, &i) in matched.iter().enumerate() {
        if shares[pos] > remaining[i] {
            overflow += shares[pos] - remaining[i];
            shares[pos] = remaining[i];
        }
    }
    if overflow > Decimal::ZERO {
        for (pos, &i) in matched.iter().enumerate() {
            if overflow <= Decimal::ZERO {
                break;
            }
            let spare = remaining[i] - shares[pos];
            if spare > Decimal::ZERO {
                let take = spare.min(overflow);
                shares[pos] += take;
                overflow -= take;
            }
        }
    }

    let mut allocations = Vec::with_capacity(matched.len());
    for (pos, &i) in matched.iter().enumerate() {
        if shares[pos] > Decimal::ZERO {
            remaining[i] -= shares[pos];
            allocations.push(LineAllocation {
                item: lines[i].item,
                amount: shares[pos],
            });
        }
    }

    allocations
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn make_lines(subtotals_cents: &[u32]) -> Vec<PricedLine> {
        subtotals_cents
            .iter()
            .enumerate()
            .map(|(i, &cents)| {
                let price = Decimal::from(cents) / Decimal::from(100);
                PricedLine {
                    item: ItemRef::Product(i as i32 + 1),
                    name: format!("Item {}", i + 1),
                    quantity: 1,
                    unit_price: price,
                    regular_price: price,
                    sale_price: None,
                    line_subtotal: price,
                    tax_class: "standard".to_string(),
                    shipping_class: None,
                    weight: None,
                    category_ids: vec![],
                }
            })
            .collect()
    }

    /// Per-line allocation shares always sum exactly to the applied amount,
    /// with no leakage or duplication from rounding.
    #[test]
    fn prop_allocations_sum_exactly() {
        proptest!(|(
            subtotals in prop::collection::vec(100u32..=100_000u32, 1..=8),
            percent in 1u32..=100u32
        )| {
            let lines = make_lines(&subtotals);
            let record = DiscountCodeRecord {
                code: "P".to_string(),
                kind: DiscountKind::Percentage,
                amount: Decimal::from(percent),
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
            let records: HashMap<String, DiscountCodeRecord> =
                [("P".to_string(), record)].into_iter().collect();

            let outcome = evaluate(
                &["P".to_string()],
                &records,
                &lines,
                None,
                "2026-06-01T00:00:00Z".parse().unwrap(),
            )
            .unwrap();

            for applied in &outcome.applied {
                let share_sum: Decimal = applied.line_allocations.iter().map(|a| a.amount).sum();
                prop_assert_eq!(share_sum, applied.amount);
                for allocation in &applied.line_allocations {
                    prop_assert!(allocation.amount >= Decimal::ZERO);
                }
            }
        });
    }

    /// Stacked discounts never invert the cart: the accepted total stays
    /// within the pre-discount subtotal.
    #[test]
    fn prop_total_discount_bounded_by_subtotal() {
        proptest!(|(
            subtotals in prop::collection::vec(100u32..=50_000u32, 1..=5),
            amounts in prop::collection::vec(1u32..=20_000u32, 1..=4)
        )| {
            let lines = make_lines(&subtotals);
            let subtotal: Decimal = lines.iter().map(|l| l.line_subtotal).sum();

            let mut records = HashMap::new();
            let mut codes = Vec::new();
            for (i, &cents) in amounts.iter().enumerate() {
                let code = format!("C{}", i);
                records.insert(code.clone(), DiscountCodeRecord {
                    code: code.clone(),
                    kind: DiscountKind::FixedCart,
                    amount: Decimal::from(cents) / Decimal::from(100),
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
                });
                codes.push(code);
            }

            let outcome = evaluate(
                &codes,
                &records,
                &lines,
                None,
                "2026-06-01T00:00:00Z".parse().unwrap(),
            )
            .unwrap();

            prop_assert!(outcome.total_discount <= subtotal);
            prop_assert!(outcome.total_discount >= dec!(0));
        });
    }
}
