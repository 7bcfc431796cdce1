// Deterministic math layer: fixed-point numbers, series kernels and the certified log
pub mod error;
pub mod fixed_point;
pub mod transcendental;
pub mod operation_log;
pub mod certified_math;
pub mod golden_vectors;

mod wide;

pub use error::{ArithmeticError, MathOp};

pub use fixed_point::{FixedPoint128, SignedFixed, DECIMALS, SCALE};

pub use operation_log::{
    first_divergence, verify_chain, LogError, LoggedOutput, OperationLog,
    OperationLogEntry, GENESIS_HASH,
};

pub use certified_math::{CertifiedMath, Loggable, Operand};

pub use golden_vectors::{run_self_test, GoldenVector, SelfTestFailure, GOLDEN_VECTORS};
