// Fixed-iteration series kernels
//
// SAFETY INVARIANTS:
// 1. Iteration counts are constants, never convergence-dependent
// 2. Kernels run on arbitrary-precision integers at a 10^36 work scale and
//    truncate toward zero once, at the end, to the 10^18 value scale
// 3. Maximum error over the supported domain is 2 units in the last place
// 4. No floating point anywhere

use crate::error::{ArithmeticError, MathOp};
use crate::fixed_point::{FixedPoint128, SignedFixed, SCALE, SCALE_I};
use num_bigint::{BigInt, BigUint, Sign};

/// Taylor terms for `exp` after reduction to `[0, ln 2)`.
pub const EXP_TERMS: u32 = 32;
/// atanh-series terms for `ln` after reduction to `[1, 2)`.
pub const LN_TERMS: u32 = 40;
/// Taylor terms for `sin`/`cos` after reduction to `(-pi, pi]`.
pub const TRIG_TERMS: u32 = 24;
/// Maclaurin terms for `erf` below the saturation point.
pub const ERF_TERMS: u32 = 220;
/// Babylonian steps for `sqrt`; enough for the full 188-bit radicand.
pub const SQRT_ITERATIONS: u32 = 16;

const WORK_SCALE: i128 = 1_000_000_000_000_000_000_000_000_000_000_000_000;
const LN2_WORK: i128 = 693_147_180_559_945_309_417_232_121_458_176_568;
const PI_WORK: i128 = 3_141_592_653_589_793_238_462_643_383_279_502_884;
const TWO_PI_WORK: i128 = 6_283_185_307_179_586_476_925_286_766_559_005_768;
const TWO_OVER_SQRT_PI_WORK: i128 = 1_128_379_167_095_512_573_896_158_903_121_545_171;

/// |x| at and above which erf(x) is exactly +-1 at 18 decimals (1 - erf(6.5) < 4e-20).
const ERF_SATURATION_RAW: u128 = 6_500_000_000_000_000_000;

/// Beyond 2^128 every result overflows; beyond 2^-256 every result underflows.
const EXP_MAX_DOUBLINGS: i128 = 128;
const EXP_MAX_HALVINGS: i128 = 256;

fn big(value: i128) -> BigInt {
    BigInt::from(value)
}

/// Floor division for a positive divisor.
fn floor_div(a: &BigInt, b: &BigInt) -> BigInt {
    let quotient = a / b;
    if a.sign() == Sign::Minus && &quotient * b != *a {
        quotient - 1
    } else {
        quotient
    }
}

/// Euclidean remainder for a positive divisor, always in `[0, b)`.
fn rem_euclid(a: &BigInt, b: &BigInt) -> BigInt {
    a - floor_div(a, b) * b
}

/// Lift a raw 10^18 value to the 10^36 work scale.
fn to_work(raw: i128) -> BigInt {
    big(raw) * big(SCALE_I)
}

/// Truncate a work-scale value back to a signed raw value.
fn signed_from_work(
    work: &BigInt,
    op: MathOp,
    input: SignedFixed,
) -> Result<SignedFixed, ArithmeticError> {
    let raw = work / big(SCALE_I);
    i128::try_from(&raw)
        .map(SignedFixed::from_raw)
        .map_err(|_| ArithmeticError::overflow(op, &[input]))
}

/// e^x.
pub fn exp(x: SignedFixed) -> Result<FixedPoint128, ArithmeticError> {
    let ln2 = big(LN2_WORK);
    let w = big(WORK_SCALE);
    let xw = to_work(x.raw());
    let k = floor_div(&xw, &ln2);
    let r = &xw - &k * &ln2;

    let mut term = w.clone();
    let mut sum = w.clone();
    for i in 1..=EXP_TERMS {
        term = &term * &r / &w / BigInt::from(i);
        sum += &term;
    }

    let k = i128::try_from(&k).map_err(|_| ArithmeticError::overflow(MathOp::Exp, &[x]))?;
    let scaled = if k >= 0 {
        if k > EXP_MAX_DOUBLINGS {
            return Err(ArithmeticError::overflow(MathOp::Exp, &[x]));
        }
        sum << (k as usize)
    } else {
        if -k > EXP_MAX_HALVINGS {
            return Err(ArithmeticError::underflow(MathOp::Exp, &[x]));
        }
        sum >> ((-k) as usize)
    };

    let raw = scaled / big(SCALE_I);
    let raw = u128::try_from(&raw).map_err(|_| ArithmeticError::overflow(MathOp::Exp, &[x]))?;
    if raw == 0 {
        return Err(ArithmeticError::underflow(MathOp::Exp, &[x]));
    }
    Ok(FixedPoint128::from_raw(raw))
}

/// Natural logarithm; `ln 0` is a domain error.
pub fn ln(x: FixedPoint128) -> Result<SignedFixed, ArithmeticError> {
    if x.is_zero() {
        return Err(ArithmeticError::Domain {
            op: MathOp::Ln,
            detail: "ln(0) is undefined".to_string(),
        });
    }
    let w = big(WORK_SCALE);
    let two_w = &w << 1usize;

    // Reduce to m in [1, 2) with x = m * 2^k. Bounded by the bit length of x.
    let mut m = BigInt::from(x.raw()) * big(SCALE_I);
    let mut k: i128 = 0;
    while m >= two_w {
        m = m >> 1usize;
        k += 1;
    }
    while m < w {
        m = m << 1usize;
        k -= 1;
    }

    // ln(m) = 2 * atanh(z), z = (m - 1) / (m + 1) in [0, 1/3)
    let z = (&m - &w) * &w / (&m + &w);
    let z2 = &z * &z / &w;
    let mut term = z;
    let mut sum = BigInt::from(0);
    for n in 0..LN_TERMS {
        sum += &term / BigInt::from(2 * n + 1);
        term = term * &z2 / &w;
    }

    let result = BigInt::from(k) * big(LN2_WORK) + (sum << 1usize);
    let raw = result / big(SCALE_I);
    i128::try_from(&raw)
        .map(SignedFixed::from_raw)
        .map_err(|_| ArithmeticError::overflow(MathOp::Ln, &[x]))
}

/// Reduce an angle to `(-pi, pi]` at work scale.
fn reduce_angle(x: SignedFixed) -> BigInt {
    let two_pi = big(TWO_PI_WORK);
    let mut r = rem_euclid(&to_work(x.raw()), &two_pi);
    if r > big(PI_WORK) {
        r -= &two_pi;
    }
    r
}

pub fn sin(x: SignedFixed) -> Result<SignedFixed, ArithmeticError> {
    let w = big(WORK_SCALE);
    let r = reduce_angle(x);
    let r2 = &r * &r / &w;
    let mut term = r.clone();
    let mut sum = r;
    for i in 1..=TRIG_TERMS {
        let divisor = BigInt::from((2 * i) * (2 * i + 1));
        term = -(&term * &r2) / &w / divisor;
        sum += &term;
    }
    signed_from_work(&sum, MathOp::Sin, x)
}

pub fn cos(x: SignedFixed) -> Result<SignedFixed, ArithmeticError> {
    let w = big(WORK_SCALE);
    let r = reduce_angle(x);
    let r2 = &r * &r / &w;
    let mut term = w.clone();
    let mut sum = w.clone();
    for i in 1..=TRIG_TERMS {
        let divisor = BigInt::from((2 * i - 1) * (2 * i));
        term = -(&term * &r2) / &w / divisor;
        sum += &term;
    }
    signed_from_work(&sum, MathOp::Cos, x)
}

/// Gauss error function. Odd, so the series runs on |x| and the sign is restored.
pub fn erf(x: SignedFixed) -> Result<SignedFixed, ArithmeticError> {
    let negative = x.is_negative();
    let magnitude = x.raw().unsigned_abs();
    if magnitude >= ERF_SATURATION_RAW {
        return Ok(if negative { SignedFixed::MINUS_ONE } else { SignedFixed::ONE });
    }

    let w = big(WORK_SCALE);
    let aw = BigInt::from(magnitude) * big(SCALE_I);
    let x2 = &aw * &aw / &w;

    // erf(a) = 2/sqrt(pi) * sum (-1)^n a^(2n+1) / (n! (2n+1))
    let mut term = aw;
    let mut sum = BigInt::from(0);
    for n in 0..ERF_TERMS {
        let contribution = &term / BigInt::from(2 * n + 1);
        if n % 2 == 0 {
            sum += contribution;
        } else {
            sum -= contribution;
        }
        term = term * &x2 / &w / BigInt::from(n + 1);
    }

    let scaled = sum * big(TWO_OVER_SQRT_PI_WORK) / &w;
    let value = signed_from_work(&scaled, MathOp::Erf, x)?;
    if negative {
        value.checked_neg()
    } else {
        Ok(value)
    }
}

/// Babylonian square root with a fixed step count.
///
/// Starts at a power of two above the root and only ever accepts a step that
/// decreases the estimate, which lands on `floor(sqrt(raw * 10^18))`.
pub fn sqrt(x: FixedPoint128) -> Result<FixedPoint128, ArithmeticError> {
    let n = BigUint::from(x.raw()) * BigUint::from(SCALE);
    let bits = n.bits();
    if bits == 0 {
        return Ok(FixedPoint128::ZERO);
    }
    let mut y = BigUint::from(1u32) << (((bits + 1) / 2) as usize);
    for _ in 0..SQRT_ITERATIONS {
        let next = (&y + &n / &y) >> 1usize;
        if next < y {
            y = next;
        }
    }
    u128::try_from(&y)
        .map(FixedPoint128::from_raw)
        .map_err(|_| ArithmeticError::overflow(MathOp::Sqrt, &[x]))
}
