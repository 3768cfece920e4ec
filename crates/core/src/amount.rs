//! Exact decimal arithmetic for pool pricing and liquidation sizing.
//!
//! All reserves, prices and amounts are carried as [`Decimal`] so that
//! multi-hop pricing never goes through floating point. Amounts are only
//! rounded down to on-chain integers at the message boundary.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a chain amount string ("1000", "12.5").
///
/// Returns `None` for non-numeric or negative input.
#[inline]
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let value = Decimal::from_str(raw.trim()).ok()?;
    if value < Decimal::ZERO {
        return None;
    }
    Some(value)
}

/// Floor an amount to a whole number of base units, clamped at zero.
#[inline]
pub fn floor_amount(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO).floor()
}

/// Render an amount as the integer string used in chain messages.
///
/// Example: to_chain_amount(1984.73) = "1984"
#[inline]
pub fn to_chain_amount(value: Decimal) -> String {
    floor_amount(value).normalize().to_string()
}

/// Apply a fractional reduction (e.g. slippage).
/// Returns: value * (1 - fraction)
///
/// Example: apply_discount(1000, 0.025) = 975
///
/// Returns `None` when the product overflows.
#[inline]
pub fn apply_discount(value: Decimal, fraction: Decimal) -> Option<Decimal> {
    value.checked_mul(Decimal::ONE.checked_sub(fraction)?)
}

/// Apply a fractional increase (e.g. an undershoot buffer).
/// Returns: value * (1 + fraction)
///
/// Example: apply_premium(1000, 0.025) = 1025
///
/// Returns `None` when the product overflows.
#[inline]
pub fn apply_premium(value: Decimal, fraction: Decimal) -> Option<Decimal> {
    value.checked_mul(Decimal::ONE.checked_add(fraction)?)
}

/// Compute `a * b / c` without losing precision when the product fits.
///
/// Falls back to `a * (b / c)` when `a * b` would overflow the decimal
/// mantissa. Returns `None` when `c` is zero or both orderings overflow.
#[inline]
pub fn mul_div(a: Decimal, b: Decimal, c: Decimal) -> Option<Decimal> {
    if c.is_zero() {
        return None;
    }
    match a.checked_mul(b) {
        Some(product) => product.checked_div(c),
        None => a.checked_mul(b.checked_div(c)?),
    }
}

/// Value of `amount` units at `price` quote units each.
#[inline]
pub fn value_of(amount: Decimal, price: Decimal) -> Decimal {
    amount.checked_mul(price).unwrap_or(Decimal::MAX)
}
