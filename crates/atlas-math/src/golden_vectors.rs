// Golden test vectors
//
// Reference outputs every conforming node must reproduce bit-for-bit.
// A node that fails any vector must not participate in consensus.

use crate::certified_math::CertifiedMath;
use crate::error::{ArithmeticError, MathOp};
use crate::fixed_point::{FixedPoint128, SignedFixed};
use crate::operation_log::OperationLog;
use log::{error, info};
use thiserror::Error;

/// One reference input and its expected 18-decimal output.
#[derive(Debug, Clone, Copy)]
pub struct GoldenVector {
    pub op: MathOp,
    pub input: &'static str,
    pub expected: &'static str,
}

const fn v(op: MathOp, input: &'static str, expected: &'static str) -> GoldenVector {
    GoldenVector { op, input, expected }
}

pub const GOLDEN_VECTORS: &[GoldenVector] = &[
    v(MathOp::Exp, "0", "1.000000000000000000"),
    v(MathOp::Exp, "1", "2.718281828459045235"),
    v(MathOp::Exp, "-1", "0.367879441171442321"),
    v(MathOp::Exp, "0.5", "1.648721270700128146"),
    v(MathOp::Exp, "2", "7.389056098930650227"),
    v(MathOp::Exp, "10", "22026.465794806716516957"),
    v(MathOp::Exp, "-40", "0.000000000000000004"),
    v(MathOp::Ln, "1", "0.000000000000000000"),
    v(MathOp::Ln, "2", "0.693147180559945309"),
    v(MathOp::Ln, "10", "2.302585092994045684"),
    v(MathOp::Ln, "0.5", "-0.693147180559945309"),
    v(MathOp::Ln, "123456789", "18.631401766168018033"),
    v(MathOp::Sin, "0", "0.000000000000000000"),
    v(MathOp::Sin, "1", "0.841470984807896506"),
    v(MathOp::Sin, "-1", "-0.841470984807896506"),
    v(MathOp::Sin, "3", "0.141120008059867222"),
    v(MathOp::Sin, "100", "-0.506365641109758793"),
    v(MathOp::Cos, "0", "1.000000000000000000"),
    v(MathOp::Cos, "1", "0.540302305868139717"),
    v(MathOp::Cos, "3", "-0.989992496600445457"),
    v(MathOp::Cos, "100", "0.862318872287683934"),
    v(MathOp::Erf, "0.5", "0.520499877813046537"),
    v(MathOp::Erf, "1", "0.842700792949714869"),
    v(MathOp::Erf, "-1", "-0.842700792949714869"),
    v(MathOp::Erf, "2", "0.995322265018952734"),
    v(MathOp::Erf, "3", "0.999977909503001414"),
    v(MathOp::Erf, "6", "0.999999999999999978"),
    v(MathOp::Erf, "6.4", "0.999999999999999999"),
    v(MathOp::Erf, "7", "1.000000000000000000"),
    v(MathOp::Sqrt, "0", "0.000000000000000000"),
    v(MathOp::Sqrt, "2", "1.414213562373095048"),
    v(MathOp::Sqrt, "4", "2.000000000000000000"),
    v(MathOp::Sqrt, "0.000000000000000001", "0.000000001000000000"),
];

#[derive(Debug, Error)]
pub enum SelfTestFailure {
    #[error("vector {index} ({op} {input}): expected {expected}, got {actual}")]
    Mismatch {
        index: usize,
        op: MathOp,
        input: &'static str,
        expected: &'static str,
        actual: String,
    },

    #[error("vector {index} ({op} {input}) failed: {source}")]
    Arithmetic {
        index: usize,
        op: MathOp,
        input: &'static str,
        #[source]
        source: ArithmeticError,
    },

    #[error("vector {index} uses unsupported operation {op}")]
    Unsupported { index: usize, op: MathOp },
}

fn evaluate(
    log: &mut OperationLog,
    vector: &GoldenVector,
) -> Result<Option<String>, ArithmeticError> {
    let out = match vector.op {
        MathOp::Exp => CertifiedMath::exp(log, vector.input.parse::<SignedFixed>()?)?.to_string(),
        MathOp::Ln => CertifiedMath::ln(log, vector.input.parse::<FixedPoint128>()?)?.to_string(),
        MathOp::Sin => CertifiedMath::sin(log, vector.input.parse::<SignedFixed>()?)?.to_string(),
        MathOp::Cos => CertifiedMath::cos(log, vector.input.parse::<SignedFixed>()?)?.to_string(),
        MathOp::Erf => CertifiedMath::erf(log, vector.input.parse::<SignedFixed>()?)?.to_string(),
        MathOp::Sqrt => {
            CertifiedMath::sqrt(log, vector.input.parse::<FixedPoint128>()?)?.to_string()
        }
        _ => return Ok(None),
    };
    Ok(Some(out))
}

/// Run every golden vector through the certified path.
///
/// Returns the resulting log on success so callers can publish its head hash.
pub fn run_self_test() -> Result<OperationLog, SelfTestFailure> {
    let mut log = OperationLog::new();
    for (index, vector) in GOLDEN_VECTORS.iter().enumerate() {
        let actual = match evaluate(&mut log, vector) {
            Ok(Some(actual)) => actual,
            Ok(None) => return Err(SelfTestFailure::Unsupported { index, op: vector.op }),
            Err(source) => {
                error!("math self-test vector {} failed: {}", index, source);
                return Err(SelfTestFailure::Arithmetic {
                    index,
                    op: vector.op,
                    input: vector.input,
                    source,
                });
            }
        };
        if actual != vector.expected {
            error!(
                "math self-test mismatch on {} {}: expected {}, got {}",
                vector.op, vector.input, vector.expected, actual
            );
            return Err(SelfTestFailure::Mismatch {
                index,
                op: vector.op,
                input: vector.input,
                expected: vector.expected,
                actual,
            });
        }
    }
    info!(
        "math self-test passed: {} vectors, log head {}",
        GOLDEN_VECTORS.len(),
        log.head_hash()
    );
    Ok(log)
}
