use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Every arithmetic or transcendental operation the math layer exposes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Sqrt,
    Exp,
    Ln,
    Sin,
    Cos,
    Erf,
    RatioAtLeast,
    RatioAtMost,
}

impl MathOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MathOp::Add => "ADD",
            MathOp::Sub => "SUB",
            MathOp::Mul => "MUL",
            MathOp::Div => "DIV",
            MathOp::Sqrt => "SQRT",
            MathOp::Exp => "EXP",
            MathOp::Ln => "LN",
            MathOp::Sin => "SIN",
            MathOp::Cos => "COS",
            MathOp::Erf => "ERF",
            MathOp::RatioAtLeast => "RATIO_AT_LEAST",
            MathOp::RatioAtMost => "RATIO_AT_MOST",
        }
    }
}

impl fmt::Display for MathOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arithmetic failures. Always fatal to the single operation; never clamped.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("{op} overflow: operands [{}]", operands.join(", "))]
    Overflow { op: MathOp, operands: Vec<String> },

    #[error("{op} underflow: operands [{}]", operands.join(", "))]
    Underflow { op: MathOp, operands: Vec<String> },

    #[error("division by zero: dividend {dividend}")]
    DivisionByZero { dividend: String },

    #[error("{op} outside its domain: {detail}")]
    Domain { op: MathOp, detail: String },

    #[error("invalid fixed-point literal: {0}")]
    Parse(String),
}

impl ArithmeticError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ArithmeticError::Overflow { .. } => "OVERFLOW",
            ArithmeticError::Underflow { .. } => "UNDERFLOW",
            ArithmeticError::DivisionByZero { .. } => "DIVISION_BY_ZERO",
            ArithmeticError::Domain { .. } => "DOMAIN",
            ArithmeticError::Parse(_) => "PARSE",
        }
    }

    pub(crate) fn overflow<A: fmt::Display>(op: MathOp, operands: &[A]) -> Self {
        ArithmeticError::Overflow {
            op,
            operands: operands.iter().map(|o| o.to_string()).collect(),
        }
    }

    pub(crate) fn underflow<A: fmt::Display>(op: MathOp, operands: &[A]) -> Self {
        ArithmeticError::Underflow {
            op,
            operands: operands.iter().map(|o| o.to_string()).collect(),
        }
    }
}
