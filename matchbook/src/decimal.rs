//! Decimal helpers shared by the matcher and the API boundary.
//!
//! Prices, quantities, fees and trade values are `rust_decimal::Decimal`
//! everywhere. Values enter the engine as decimal strings and leave it as
//! decimal strings; binary floats are never accepted on those paths.
//!
//! The engine carries at most [`PRECISION`] significant digits, rounding
//! toward zero. The cap is applied where digits can grow: on boundary input
//! and on every product. Sums and differences of capped values are kept
//! exact, so level totals always equal the sum of their queue.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Significant digits carried by engine decimals.
pub const PRECISION: u32 = 18;

/// Maker fee rate, -0.0002. Negative means the maker is paid a rebate.
pub const MAKER_FEE_RATE: Decimal = Decimal::from_parts(2, 0, 0, true, 4);

/// Taker fee rate, 0.0010.
pub const TAKER_FEE_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 4);

/// Parses a decimal string, normalizing trailing zeros so that equal prices
/// land on the same book level key. Input within [`PRECISION`] significant
/// digits is kept exact; anything beyond is truncated toward zero.
pub fn parse_decimal(s: &str) -> Result<Decimal, rust_decimal::Error> {
    Decimal::from_str(s.trim()).map(|d| truncate(d).normalize())
}

/// Product of two decimals, truncated toward zero at [`PRECISION`]
/// significant digits.
pub fn mul_truncated(a: Decimal, b: Decimal) -> Decimal {
    truncate(a * b)
}

/// Truncates toward zero to at most [`PRECISION`] significant digits.
fn truncate(d: Decimal) -> Decimal {
    let digits = mantissa_digits(d);
    if digits <= PRECISION {
        return d;
    }
    let excess = digits - PRECISION;
    if d.scale() >= excess {
        return d.round_dp_with_strategy(d.scale() - excess, RoundingStrategy::ToZero);
    }
    // more integer digits than the precision keeps; zero the low ones
    let step = Decimal::from_i128_with_scale(10i128.pow(excess - d.scale()), 0);
    let trimmed = d.round_dp_with_strategy(0, RoundingStrategy::ToZero);
    trimmed - trimmed % step
}

fn mantissa_digits(d: Decimal) -> u32 {
    let mut m = d.mantissa().unsigned_abs();
    let mut digits = 1;
    while m >= 10 {
        m /= 10;
        digits += 1;
    }
    digits
}
