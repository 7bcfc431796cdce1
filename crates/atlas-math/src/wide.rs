// 256-bit intermediates for scaled multiplication and division.
//
// The fast path stays in native 128-bit integers; only products that do not
// fit fall back to arbitrary precision. Both paths truncate identically, so
// the choice never changes a result.

use num_bigint::{BigInt, BigUint};

/// `floor(a * b / d)`, or `None` when the quotient does not fit in `u128`.
pub(crate) fn mul_div_floor(a: u128, b: u128, d: u128) -> Option<u128> {
    if d == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return Some(product / d);
    }
    let quotient = BigUint::from(a) * BigUint::from(b) / BigUint::from(d);
    u128::try_from(&quotient).ok()
}

/// `trunc(a * b / d)` toward zero, or `None` when the quotient does not fit in `i128`.
pub(crate) fn mul_div_trunc(a: i128, b: i128, d: i128) -> Option<i128> {
    if d == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return product.checked_div(d);
    }
    let quotient = BigInt::from(a) * BigInt::from(b) / BigInt::from(d);
    i128::try_from(&quotient).ok()
}

/// Exact product of two raw values.
pub(crate) fn wide_product(a: u128, b: u128) -> BigUint {
    BigUint::from(a) * BigUint::from(b)
}
