// Ledger invariants
//
// SAFETY INVARIANTS:
// 1. Non-transferability: no Transfer event is ever legitimate
// 2. Supply conservation: Σ balances + treasury reserve = total supply
// 3. Voting-power cap: no counted vote weighs more than cap × snapshot total
// Every failing invariant is reported, not only the first.

use crate::weight_ledger::{SupplyCheckpoint, TokenEvent};
use atlas_math::{ArithmeticError, FixedPoint128};
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("transfer of {amount} from {from} to {to} violates non-transferability")]
    NonTransferable {
        from: String,
        to: String,
        amount: FixedPoint128,
    },

    #[error(
        "supply not conserved: balances {balances_total} + reserve {treasury_reserve} \
         != {total_supply}"
    )]
    SupplyMismatch {
        balances_total: FixedPoint128,
        treasury_reserve: FixedPoint128,
        total_supply: FixedPoint128,
    },

    #[error("vote by {voter} weighs {weight} of {total_weight}, above cap {cap}")]
    VotingCapExceeded {
        voter: String,
        weight: FixedPoint128,
        total_weight: FixedPoint128,
        cap: FixedPoint128,
    },

    #[error("arithmetic failure during invariant check: {0}")]
    Arithmetic(ArithmeticError),
}

impl InvariantViolation {
    pub fn code(&self) -> &'static str {
        match self {
            InvariantViolation::NonTransferable { .. } => "NON_TRANSFERABLE",
            InvariantViolation::SupplyMismatch { .. } => "SUPPLY_MISMATCH",
            InvariantViolation::VotingCapExceeded { .. } => "VOTING_CAP_EXCEEDED",
            InvariantViolation::Arithmetic(_) => "ARITHMETIC",
        }
    }
}

/// All violations found by one check.
#[derive(Debug, Clone, Default, Error, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvariantReport {
    pub violations: Vec<InvariantViolation>,
}

impl fmt::Display for InvariantReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} invariant violation(s)", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "; {}", violation)?;
        }
        Ok(())
    }
}

impl InvariantReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.violations.iter().map(InvariantViolation::code).collect()
    }

    pub fn into_result(self) -> Result<(), InvariantReport> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

pub struct InvariantChecker;

impl InvariantChecker {
    pub fn check_non_transferability(events: &[TokenEvent]) -> Vec<InvariantViolation> {
        events
            .iter()
            .filter_map(|event| match event {
                TokenEvent::Transfer { from, to, amount } => {
                    Some(InvariantViolation::NonTransferable {
                        from: from.clone(),
                        to: to.clone(),
                        amount: *amount,
                    })
                }
                TokenEvent::Allocation { .. } => None,
            })
            .collect()
    }

    pub fn check_supply_conservation(checkpoint: &SupplyCheckpoint) -> Option<InvariantViolation> {
        let held = match checkpoint.balances_total.checked_add(checkpoint.treasury_reserve) {
            Ok(held) => held,
            Err(e) => return Some(InvariantViolation::Arithmetic(e)),
        };
        if held != checkpoint.total_supply {
            return Some(InvariantViolation::SupplyMismatch {
                balances_total: checkpoint.balances_total,
                treasury_reserve: checkpoint.treasury_reserve,
                total_supply: checkpoint.total_supply,
            });
        }
        None
    }

    /// Each vote weight against `cap × total_weight`, in voter order.
    pub fn check_voting_cap(
        vote_weights: &BTreeMap<String, FixedPoint128>,
        total_weight: FixedPoint128,
        cap: FixedPoint128,
    ) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        for (voter, weight) in vote_weights {
            match FixedPoint128::ratio_at_most(*weight, total_weight, cap) {
                Ok(true) => {}
                Ok(false) => violations.push(InvariantViolation::VotingCapExceeded {
                    voter: voter.clone(),
                    weight: *weight,
                    total_weight,
                    cap,
                }),
                Err(e) => violations.push(InvariantViolation::Arithmetic(e)),
            }
        }
        violations
    }

    /// Run every invariant and collect all failures.
    pub fn check_all(
        events: &[TokenEvent],
        checkpoint: &SupplyCheckpoint,
        vote_weights: &BTreeMap<String, FixedPoint128>,
        total_weight: FixedPoint128,
        cap: FixedPoint128,
    ) -> InvariantReport {
        let mut violations = Self::check_non_transferability(events);
        violations.extend(Self::check_supply_conservation(checkpoint));
        violations.extend(Self::check_voting_cap(vote_weights, total_weight, cap));
        let report = InvariantReport { violations };
        if !report.is_clean() {
            error!("{}", report);
        }
        report
    }
}
