// Economics: constitutional guards, ledger invariants and governance weight
pub mod economics_guard;
pub mod invariant_checker;
pub mod weight_ledger;

pub use economics_guard::{
    validate_allocation, validate_cap, validate_parameter_value, validate_voting_power,
    AllocationRound, EconomicsGuard, FractionBounds, GuardViolation,
    MAX_ALLOCATION_FRACTION, MAX_VOTING_POWER_CAP, MIN_ALLOCATION_FRACTION, MIN_VOTING_POWER_CAP,
};

pub use invariant_checker::{InvariantChecker, InvariantReport, InvariantViolation};

pub use weight_ledger::{
    GovernanceWeightLedger, LedgerError, SupplyCheckpoint, TokenEvent, WeightSnapshot,
};
