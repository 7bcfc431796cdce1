// Non-transferable governance weight
//
// SAFETY INVARIANTS:
// 1. Weight only enters an account by allocation from the treasury reserve
// 2. Transfers between accounts are always rejected
// 3. Σ balances + treasury reserve = total supply after every operation

use atlas_math::{ArithmeticError, CertifiedMath, FixedPoint128, OperationLog};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Observable balance-changing events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenEvent {
    Allocation { account: String, amount: FixedPoint128 },
    Transfer { from: String, to: String, amount: FixedPoint128 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("governance weight is non-transferable ({from} -> {to})")]
    NonTransferable { from: String, to: String },

    #[error("treasury holds {available}, cannot allocate {requested}")]
    InsufficientTreasury {
        requested: FixedPoint128,
        available: FixedPoint128,
    },

    #[error("allocation amount must be positive")]
    ZeroAmount,

    #[error("ledger arithmetic failed: {0}")]
    Arithmetic(#[from] ArithmeticError),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NonTransferable { .. } => "NON_TRANSFERABLE",
            LedgerError::InsufficientTreasury { .. } => "INSUFFICIENT_TREASURY",
            LedgerError::ZeroAmount => "ZERO_AMOUNT",
            LedgerError::Arithmetic(_) => "ARITHMETIC",
        }
    }
}

/// Totals used for the supply-conservation check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupplyCheckpoint {
    pub balances_total: FixedPoint128,
    pub treasury_reserve: FixedPoint128,
    pub total_supply: FixedPoint128,
}

/// Voting weights frozen at a height.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeightSnapshot {
    pub height: u64,
    pub weights: BTreeMap<String, FixedPoint128>,
    pub total_weight: FixedPoint128,
}

impl WeightSnapshot {
    /// Zero weights are dropped; the total is their checked sum.
    pub fn from_weights(
        height: u64,
        weights: BTreeMap<String, FixedPoint128>,
    ) -> Result<Self, ArithmeticError> {
        let weights: BTreeMap<String, FixedPoint128> =
            weights.into_iter().filter(|(_, w)| !w.is_zero()).collect();
        let mut total_weight = FixedPoint128::ZERO;
        for weight in weights.values() {
            total_weight = total_weight.checked_add(*weight)?;
        }
        Ok(Self {
            height,
            weights,
            total_weight,
        })
    }

    pub fn weight_of(&self, account: &str) -> Option<FixedPoint128> {
        self.weights.get(account).copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GovernanceWeightLedger {
    total_supply: FixedPoint128,
    treasury_reserve: FixedPoint128,
    balances: BTreeMap<String, FixedPoint128>,
    events: Vec<TokenEvent>,
}

impl GovernanceWeightLedger {
    /// The whole supply starts in the treasury.
    pub fn new(total_supply: FixedPoint128) -> Self {
        Self {
            total_supply,
            treasury_reserve: total_supply,
            balances: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn allocate(
        &mut self,
        account: &str,
        amount: FixedPoint128,
        log: &mut OperationLog,
    ) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if amount > self.treasury_reserve {
            return Err(LedgerError::InsufficientTreasury {
                requested: amount,
                available: self.treasury_reserve,
            });
        }
        let current = self.balance_of(account);
        let reserve = CertifiedMath::sub(log, self.treasury_reserve, amount)?;
        let balance = CertifiedMath::add(log, current, amount)?;
        self.treasury_reserve = reserve;
        self.balances.insert(account.to_string(), balance);
        self.events.push(TokenEvent::Allocation {
            account: account.to_string(),
            amount,
        });
        info!("allocated {} governance weight to {}", amount, account);
        Ok(())
    }

    /// Always fails; the ledger is not modified.
    pub fn transfer(&self, from: &str, to: &str, amount: FixedPoint128) -> Result<(), LedgerError> {
        warn!("rejected transfer of {} from {} to {}", amount, from, to);
        Err(LedgerError::NonTransferable {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn balance_of(&self, account: &str) -> FixedPoint128 {
        self.balances.get(account).copied().unwrap_or(FixedPoint128::ZERO)
    }

    pub fn balances(&self) -> &BTreeMap<String, FixedPoint128> {
        &self.balances
    }

    pub fn treasury_reserve(&self) -> FixedPoint128 {
        self.treasury_reserve
    }

    pub fn total_supply(&self) -> FixedPoint128 {
        self.total_supply
    }

    pub fn events(&self) -> &[TokenEvent] {
        &self.events
    }

    pub fn checkpoint(&self) -> Result<SupplyCheckpoint, ArithmeticError> {
        let mut balances_total = FixedPoint128::ZERO;
        for balance in self.balances.values() {
            balances_total = balances_total.checked_add(*balance)?;
        }
        Ok(SupplyCheckpoint {
            balances_total,
            treasury_reserve: self.treasury_reserve,
            total_supply: self.total_supply,
        })
    }

    pub fn snapshot(&self, height: u64) -> Result<WeightSnapshot, ArithmeticError> {
        WeightSnapshot::from_weights(height, self.balances.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> FixedPoint128 {
        s.parse().unwrap()
    }

    #[test]
    fn test_allocation_moves_weight_from_treasury() {
        let mut log = OperationLog::new();
        let mut ledger = GovernanceWeightLedger::new(fp("1000"));
        ledger.allocate("v1", fp("150"), &mut log).unwrap();
        ledger.allocate("v1", fp("50"), &mut log).unwrap();
        assert_eq!(ledger.balance_of("v1"), fp("200"));
        assert_eq!(ledger.treasury_reserve(), fp("800"));
        assert_eq!(ledger.events().len(), 2);
        assert_eq!(log.len(), 4);

        let cp = ledger.checkpoint().unwrap();
        assert_eq!(cp.balances_total.checked_add(cp.treasury_reserve).unwrap(), cp.total_supply);
    }

    #[test]
    fn test_transfer_always_rejected() {
        let mut log = OperationLog::new();
        let mut ledger = GovernanceWeightLedger::new(fp("1000"));
        ledger.allocate("v1", fp("10"), &mut log).unwrap();
        let err = ledger.transfer("v1", "v2", fp("1")).unwrap_err();
        assert_eq!(err.code(), "NON_TRANSFERABLE");
        assert_eq!(ledger.balance_of("v1"), fp("10"));
        assert_eq!(ledger.balance_of("v2"), FixedPoint128::ZERO);
    }

    #[test]
    fn test_over_allocation_rejected() {
        let mut log = OperationLog::new();
        let mut ledger = GovernanceWeightLedger::new(fp("100"));
        let err = ledger.allocate("v1", fp("100.000000000000000001"), &mut log).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_TREASURY");
        assert_eq!(
            ledger.allocate("v1", FixedPoint128::ZERO, &mut log),
            Err(LedgerError::ZeroAmount)
        );
        assert!(log.is_empty());
    }

    #[test]
    fn test_snapshot_drops_zero_weights() {
        let mut weights = BTreeMap::new();
        weights.insert("a".to_string(), fp("3"));
        weights.insert("b".to_string(), FixedPoint128::ZERO);
        weights.insert("c".to_string(), fp("7"));
        let snap = WeightSnapshot::from_weights(12, weights).unwrap();
        assert_eq!(snap.total_weight, fp("10"));
        assert_eq!(snap.weight_of("b"), None);
        assert_eq!(snap.weights.len(), 2);
    }
}
