// Certified math: the only arithmetic entry point for consensus-affecting code
//
// SAFETY INVARIANTS:
// 1. Each call records exactly one log entry, including failed calls
// 2. Inputs are committed by hash, outputs in canonical decimal form
// 3. Results are identical to the uncertified FixedPoint128/SignedFixed operations

use crate::error::{ArithmeticError, MathOp};
use crate::fixed_point::{FixedPoint128, SignedFixed};
use crate::operation_log::{LoggedOutput, OperationLog};
use crate::transcendental::{ERF_TERMS, EXP_TERMS, LN_TERMS, SQRT_ITERATIONS, TRIG_TERMS};
use sha3::{Digest, Sha3_256};

/// A value that can be committed to the operation log as an input.
pub trait Operand {
    /// Type-tagged canonical text; `u:` for unsigned, `s:` for signed.
    fn canonical(&self) -> String;

    fn operand_hash(&self) -> String {
        hex::encode(Sha3_256::digest(self.canonical().as_bytes()))
    }
}

impl Operand for FixedPoint128 {
    fn canonical(&self) -> String {
        format!("u:{}", self)
    }
}

impl Operand for SignedFixed {
    fn canonical(&self) -> String {
        format!("s:{}", self)
    }
}

/// A value that can be recorded as an operation's output.
pub trait Loggable {
    fn logged(&self) -> LoggedOutput;
}

impl Loggable for FixedPoint128 {
    fn logged(&self) -> LoggedOutput {
        LoggedOutput::Value(self.to_string())
    }
}

impl Loggable for SignedFixed {
    fn logged(&self) -> LoggedOutput {
        LoggedOutput::Value(self.to_string())
    }
}

impl Loggable for bool {
    fn logged(&self) -> LoggedOutput {
        LoggedOutput::Flag(*self)
    }
}

fn certify<T: Loggable>(
    log: &mut OperationLog,
    op: MathOp,
    inputs: &[&dyn Operand],
    iterations: u32,
    result: Result<T, ArithmeticError>,
) -> Result<T, ArithmeticError> {
    let input_hashes = inputs.iter().map(|i| i.operand_hash()).collect();
    let output = match &result {
        Ok(value) => value.logged(),
        Err(e) => LoggedOutput::Error(e.code().to_string()),
    };
    log.record(op, input_hashes, output, iterations);
    result
}

/// Logged wrappers over every fixed-point operation.
pub struct CertifiedMath;

impl CertifiedMath {
    pub fn add(
        log: &mut OperationLog,
        a: FixedPoint128,
        b: FixedPoint128,
    ) -> Result<FixedPoint128, ArithmeticError> {
        certify(log, MathOp::Add, &[&a, &b], 1, a.checked_add(b))
    }

    pub fn sub(
        log: &mut OperationLog,
        a: FixedPoint128,
        b: FixedPoint128,
    ) -> Result<FixedPoint128, ArithmeticError> {
        certify(log, MathOp::Sub, &[&a, &b], 1, a.checked_sub(b))
    }

    pub fn mul(
        log: &mut OperationLog,
        a: FixedPoint128,
        b: FixedPoint128,
    ) -> Result<FixedPoint128, ArithmeticError> {
        certify(log, MathOp::Mul, &[&a, &b], 1, a.checked_mul(b))
    }

    pub fn div(
        log: &mut OperationLog,
        a: FixedPoint128,
        b: FixedPoint128,
    ) -> Result<FixedPoint128, ArithmeticError> {
        certify(log, MathOp::Div, &[&a, &b], 1, a.checked_div(b))
    }

    pub fn sqrt(
        log: &mut OperationLog,
        x: FixedPoint128,
    ) -> Result<FixedPoint128, ArithmeticError> {
        certify(log, MathOp::Sqrt, &[&x], SQRT_ITERATIONS, x.sqrt())
    }

    pub fn exp(log: &mut OperationLog, x: SignedFixed) -> Result<FixedPoint128, ArithmeticError> {
        certify(log, MathOp::Exp, &[&x], EXP_TERMS, x.exp())
    }

    pub fn ln(log: &mut OperationLog, x: FixedPoint128) -> Result<SignedFixed, ArithmeticError> {
        certify(log, MathOp::Ln, &[&x], LN_TERMS, x.ln())
    }

    pub fn sin(log: &mut OperationLog, x: SignedFixed) -> Result<SignedFixed, ArithmeticError> {
        certify(log, MathOp::Sin, &[&x], TRIG_TERMS, x.sin())
    }

    pub fn cos(log: &mut OperationLog, x: SignedFixed) -> Result<SignedFixed, ArithmeticError> {
        certify(log, MathOp::Cos, &[&x], TRIG_TERMS, x.cos())
    }

    pub fn erf(log: &mut OperationLog, x: SignedFixed) -> Result<SignedFixed, ArithmeticError> {
        certify(log, MathOp::Erf, &[&x], ERF_TERMS, x.erf())
    }

    /// `numerator / denominator >= bound` without rounding.
    pub fn ratio_at_least(
        log: &mut OperationLog,
        numerator: FixedPoint128,
        denominator: FixedPoint128,
        bound: FixedPoint128,
    ) -> Result<bool, ArithmeticError> {
        certify(
            log,
            MathOp::RatioAtLeast,
            &[&numerator, &denominator, &bound],
            1,
            FixedPoint128::ratio_at_least(numerator, denominator, bound),
        )
    }

    /// `numerator / denominator <= bound` without rounding.
    pub fn ratio_at_most(
        log: &mut OperationLog,
        numerator: FixedPoint128,
        denominator: FixedPoint128,
        bound: FixedPoint128,
    ) -> Result<bool, ArithmeticError> {
        certify(
            log,
            MathOp::RatioAtMost,
            &[&numerator, &denominator, &bound],
            1,
            FixedPoint128::ratio_at_most(numerator, denominator, bound),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> FixedPoint128 {
        s.parse().unwrap()
    }

    #[test]
    fn test_one_entry_per_call() {
        let mut log = OperationLog::new();
        let sum = CertifiedMath::add(&mut log, fp("1.5"), fp("2.25")).unwrap();
        assert_eq!(sum, fp("3.75"));
        let _ = CertifiedMath::sqrt(&mut log, fp("4")).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[1].operation, MathOp::Sqrt);
        assert_eq!(log.entries()[1].iterations, SQRT_ITERATIONS);
        assert_eq!(
            log.entries()[1].output,
            LoggedOutput::Value("2.000000000000000000".to_string())
        );
    }

    #[test]
    fn test_failed_call_is_logged_with_error_code() {
        let mut log = OperationLog::new();
        let err = CertifiedMath::div(&mut log, fp("1"), FixedPoint128::ZERO).unwrap_err();
        assert_eq!(err.code(), "DIVISION_BY_ZERO");
        assert_eq!(log.len(), 1);
        assert_eq!(
            log.entries()[0].output,
            LoggedOutput::Error("DIVISION_BY_ZERO".to_string())
        );
    }

    #[test]
    fn test_operand_hash_is_type_tagged() {
        let unsigned = FixedPoint128::ONE;
        let signed = SignedFixed::ONE;
        assert_eq!(unsigned.canonical(), "u:1.000000000000000000");
        assert_eq!(signed.canonical(), "s:1.000000000000000000");
        assert_ne!(unsigned.operand_hash(), signed.operand_hash());
    }

    #[test]
    fn test_ratio_records_flag() {
        let mut log = OperationLog::new();
        let met = CertifiedMath::ratio_at_least(&mut log, fp("30"), fp("100"), fp("0.3")).unwrap();
        assert!(met);
        assert_eq!(log.entries()[0].output, LoggedOutput::Flag(true));
        assert_eq!(log.entries()[0].input_hashes.len(), 3);
    }
}
