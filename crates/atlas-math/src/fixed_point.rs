// Scaled-integer decimal numbers
//
// SAFETY INVARIANTS:
// 1. Values are never constructed from floating point
// 2. Every operation is total over its domain and returns a typed error otherwise
// 3. Results truncate toward zero; a non-zero exact result that truncates to zero is an underflow
// 4. Equality and ordering compare the raw scaled integer only

use crate::error::{ArithmeticError, MathOp};
use crate::transcendental;
use crate::wide::{mul_div_floor, mul_div_trunc, wide_product};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of fractional decimal digits.
pub const DECIMALS: u32 = 18;

/// 10^DECIMALS: the raw value of one whole unit.
pub const SCALE: u128 = 1_000_000_000_000_000_000;

pub(crate) const SCALE_I: i128 = SCALE as i128;

/// Unsigned fixed-point value with 18 decimal places.
///
/// This is the type for every ledger quantity: balances, weights, fractions
/// and governance parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FixedPoint128 {
    raw: u128,
}

impl FixedPoint128 {
    pub const ZERO: FixedPoint128 = FixedPoint128 { raw: 0 };
    pub const ONE: FixedPoint128 = FixedPoint128 { raw: SCALE };
    pub const MAX: FixedPoint128 = FixedPoint128 { raw: u128::MAX };
    /// Smallest representable positive value (10^-18).
    pub const EPSILON: FixedPoint128 = FixedPoint128 { raw: 1 };

    pub const fn from_raw(raw: u128) -> Self {
        FixedPoint128 { raw }
    }

    pub const fn raw(self) -> u128 {
        self.raw
    }

    pub fn from_integer(value: u128) -> Result<Self, ArithmeticError> {
        value
            .checked_mul(SCALE)
            .map(FixedPoint128::from_raw)
            .ok_or_else(|| ArithmeticError::overflow(MathOp::Mul, &[value, SCALE]))
    }

    /// `numerator / denominator` for whole numbers.
    pub fn from_ratio(numerator: u128, denominator: u128) -> Result<Self, ArithmeticError> {
        FixedPoint128::from_integer(numerator)?
            .checked_div(FixedPoint128::from_integer(denominator)?)
    }

    pub fn is_zero(self) -> bool {
        self.raw == 0
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, ArithmeticError> {
        self.raw
            .checked_add(rhs.raw)
            .map(FixedPoint128::from_raw)
            .ok_or_else(|| ArithmeticError::overflow(MathOp::Add, &[self, rhs]))
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, ArithmeticError> {
        self.raw
            .checked_sub(rhs.raw)
            .map(FixedPoint128::from_raw)
            .ok_or_else(|| ArithmeticError::underflow(MathOp::Sub, &[self, rhs]))
    }

    pub fn checked_mul(self, rhs: Self) -> Result<Self, ArithmeticError> {
        if self.is_zero() || rhs.is_zero() {
            return Ok(FixedPoint128::ZERO);
        }
        let raw = mul_div_floor(self.raw, rhs.raw, SCALE)
            .ok_or_else(|| ArithmeticError::overflow(MathOp::Mul, &[self, rhs]))?;
        if raw == 0 {
            return Err(ArithmeticError::underflow(MathOp::Mul, &[self, rhs]));
        }
        Ok(FixedPoint128::from_raw(raw))
    }

    pub fn checked_div(self, rhs: Self) -> Result<Self, ArithmeticError> {
        if rhs.is_zero() {
            return Err(ArithmeticError::DivisionByZero {
                dividend: self.to_string(),
            });
        }
        if self.is_zero() {
            return Ok(FixedPoint128::ZERO);
        }
        let raw = mul_div_floor(self.raw, SCALE, rhs.raw)
            .ok_or_else(|| ArithmeticError::overflow(MathOp::Div, &[self, rhs]))?;
        if raw == 0 {
            return Err(ArithmeticError::underflow(MathOp::Div, &[self, rhs]));
        }
        Ok(FixedPoint128::from_raw(raw))
    }

    /// Floor square root, exact to the last decimal place.
    pub fn sqrt(self) -> Result<Self, ArithmeticError> {
        transcendental::sqrt(self)
    }

    pub fn ln(self) -> Result<SignedFixed, ArithmeticError> {
        transcendental::ln(self)
    }

    /// `numerator / denominator >= bound`, decided by exact cross-multiplication.
    pub fn ratio_at_least(
        numerator: Self,
        denominator: Self,
        bound: Self,
    ) -> Result<bool, ArithmeticError> {
        if denominator.is_zero() {
            return Err(ArithmeticError::DivisionByZero {
                dividend: numerator.to_string(),
            });
        }
        Ok(wide_product(numerator.raw, SCALE) >= wide_product(bound.raw, denominator.raw))
    }

    /// `numerator / denominator <= bound`, decided by exact cross-multiplication.
    pub fn ratio_at_most(
        numerator: Self,
        denominator: Self,
        bound: Self,
    ) -> Result<bool, ArithmeticError> {
        if denominator.is_zero() {
            return Err(ArithmeticError::DivisionByZero {
                dividend: numerator.to_string(),
            });
        }
        Ok(wide_product(numerator.raw, SCALE) <= wide_product(bound.raw, denominator.raw))
    }

    pub fn to_signed(self) -> Result<SignedFixed, ArithmeticError> {
        i128::try_from(self.raw)
            .map(SignedFixed::from_raw)
            .map_err(|_| ArithmeticError::Domain {
                op: MathOp::Sub,
                detail: format!("{} exceeds the signed range", self),
            })
    }
}

fn parse_magnitude(literal: &str, digits: &str) -> Result<u128, ArithmeticError> {
    let invalid = || ArithmeticError::Parse(literal.to_string());
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => {
            if frac_part.is_empty() {
                return Err(invalid());
            }
            (int_part, frac_part)
        }
        None => (digits, ""),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    // More than 18 fractional digits would need rounding; refuse instead.
    if frac_part.len() > DECIMALS as usize || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let whole: u128 = int_part.parse().map_err(|_| invalid())?;
    let mut fraction: u128 = 0;
    if !frac_part.is_empty() {
        fraction = frac_part.parse().map_err(|_| invalid())?;
        fraction *= 10u128.pow(DECIMALS - frac_part.len() as u32);
    }
    whole
        .checked_mul(SCALE)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(invalid)
}

impl FromStr for FixedPoint128 {
    type Err = ArithmeticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_magnitude(s, s).map(FixedPoint128::from_raw)
    }
}

impl fmt::Display for FixedPoint128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:018}", self.raw / SCALE, self.raw % SCALE)
    }
}

impl Serialize for FixedPoint128 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FixedPoint128 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FixedVisitor;

        impl<'de> Visitor<'de> for FixedVisitor {
            type Value = FixedPoint128;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative decimal string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                FixedPoint128::from_integer(u128::from(v)).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                let v = u64::try_from(v).map_err(|_| E::custom("negative fixed-point value"))?;
                self.visit_u64(v)
            }
        }

        deserializer.deserialize_any(FixedVisitor)
    }
}

/// Signed companion of [`FixedPoint128`] with the same scale.
///
/// Carries the arguments of `exp`/`sin`/`cos`/`erf` and the results of
/// `ln`/`sin`/`cos`/`erf`, which may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SignedFixed {
    raw: i128,
}

impl SignedFixed {
    pub const ZERO: SignedFixed = SignedFixed { raw: 0 };
    pub const ONE: SignedFixed = SignedFixed { raw: SCALE_I };
    pub const MINUS_ONE: SignedFixed = SignedFixed { raw: -SCALE_I };
    pub const MAX: SignedFixed = SignedFixed { raw: i128::MAX };
    pub const MIN: SignedFixed = SignedFixed { raw: i128::MIN };

    pub const fn from_raw(raw: i128) -> Self {
        SignedFixed { raw }
    }

    pub const fn raw(self) -> i128 {
        self.raw
    }

    pub fn from_integer(value: i128) -> Result<Self, ArithmeticError> {
        value
            .checked_mul(SCALE_I)
            .map(SignedFixed::from_raw)
            .ok_or_else(|| ArithmeticError::overflow(MathOp::Mul, &[value, SCALE_I]))
    }

    pub fn is_zero(self) -> bool {
        self.raw == 0
    }

    pub fn is_negative(self) -> bool {
        self.raw < 0
    }

    /// Magnitude as an unsigned value.
    pub fn abs(self) -> FixedPoint128 {
        FixedPoint128::from_raw(self.raw.unsigned_abs())
    }

    pub fn checked_neg(self) -> Result<Self, ArithmeticError> {
        self.raw
            .checked_neg()
            .map(SignedFixed::from_raw)
            .ok_or_else(|| ArithmeticError::overflow(MathOp::Sub, &[self]))
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, ArithmeticError> {
        self.raw
            .checked_add(rhs.raw)
            .map(SignedFixed::from_raw)
            .ok_or_else(|| ArithmeticError::overflow(MathOp::Add, &[self, rhs]))
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, ArithmeticError> {
        self.raw
            .checked_sub(rhs.raw)
            .map(SignedFixed::from_raw)
            .ok_or_else(|| ArithmeticError::overflow(MathOp::Sub, &[self, rhs]))
    }

    pub fn checked_mul(self, rhs: Self) -> Result<Self, ArithmeticError> {
        if self.is_zero() || rhs.is_zero() {
            return Ok(SignedFixed::ZERO);
        }
        let raw = mul_div_trunc(self.raw, rhs.raw, SCALE_I)
            .ok_or_else(|| ArithmeticError::overflow(MathOp::Mul, &[self, rhs]))?;
        if raw == 0 {
            return Err(ArithmeticError::underflow(MathOp::Mul, &[self, rhs]));
        }
        Ok(SignedFixed::from_raw(raw))
    }

    pub fn checked_div(self, rhs: Self) -> Result<Self, ArithmeticError> {
        if rhs.is_zero() {
            return Err(ArithmeticError::DivisionByZero {
                dividend: self.to_string(),
            });
        }
        if self.is_zero() {
            return Ok(SignedFixed::ZERO);
        }
        let raw = mul_div_trunc(self.raw, SCALE_I, rhs.raw)
            .ok_or_else(|| ArithmeticError::overflow(MathOp::Div, &[self, rhs]))?;
        if raw == 0 {
            return Err(ArithmeticError::underflow(MathOp::Div, &[self, rhs]));
        }
        Ok(SignedFixed::from_raw(raw))
    }

    pub fn exp(self) -> Result<FixedPoint128, ArithmeticError> {
        transcendental::exp(self)
    }

    pub fn sin(self) -> Result<SignedFixed, ArithmeticError> {
        transcendental::sin(self)
    }

    pub fn cos(self) -> Result<SignedFixed, ArithmeticError> {
        transcendental::cos(self)
    }

    pub fn erf(self) -> Result<SignedFixed, ArithmeticError> {
        transcendental::erf(self)
    }

    /// Non-negative values convert exactly; negative ones are a domain error.
    pub fn to_unsigned(self) -> Result<FixedPoint128, ArithmeticError> {
        u128::try_from(self.raw)
            .map(FixedPoint128::from_raw)
            .map_err(|_| ArithmeticError::Domain {
                op: MathOp::Sub,
                detail: format!("{} is negative", self),
            })
    }
}

impl FromStr for SignedFixed {
    type Err = ArithmeticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let magnitude = parse_magnitude(s, digits)?;
        let raw = if negative {
            0i128.checked_sub_unsigned(magnitude)
        } else {
            i128::try_from(magnitude).ok()
        };
        raw.map(SignedFixed::from_raw)
            .ok_or_else(|| ArithmeticError::Parse(s.to_string()))
    }
}

impl fmt::Display for SignedFixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.raw.unsigned_abs();
        let sign = if self.raw < 0 { "-" } else { "" };
        write!(f, "{}{}.{:018}", sign, magnitude / SCALE, magnitude % SCALE)
    }
}

impl Serialize for SignedFixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SignedFixed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SignedVisitor;

        impl<'de> Visitor<'de> for SignedVisitor {
            type Value = SignedFixed;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                SignedFixed::from_integer(i128::from(v)).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                SignedFixed::from_integer(i128::from(v)).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SignedVisitor)
    }
}
