/// CONSTITUTIONAL ECONOMICS GUARD
///
/// Hard bounds that governance can tune within but never override.
/// Every comparison is exact (wide-integer cross-multiplication); values
/// outside a bound are rejected, never clamped.
use atlas_core::{FailureReason, NodeVerifier};
use atlas_math::{ArithmeticError, CertifiedMath, FixedPoint128, OperationLog};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// 1%
pub const MIN_ALLOCATION_FRACTION: FixedPoint128 = FixedPoint128::from_raw(10_000_000_000_000_000);
/// 15%
pub const MAX_ALLOCATION_FRACTION: FixedPoint128 = FixedPoint128::from_raw(150_000_000_000_000_000);
/// 20%
pub const MIN_VOTING_POWER_CAP: FixedPoint128 = FixedPoint128::from_raw(200_000_000_000_000_000);
/// 25%
pub const MAX_VOTING_POWER_CAP: FixedPoint128 = FixedPoint128::from_raw(250_000_000_000_000_000);

/// Inclusive interval `[min, max]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FractionBounds {
    pub min: FixedPoint128,
    pub max: FixedPoint128,
}

impl FractionBounds {
    pub fn new(min: FixedPoint128, max: FixedPoint128) -> Result<Self, GuardViolation> {
        if min > max {
            return Err(GuardViolation::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: FixedPoint128) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn voting_cap_range() -> Self {
        Self {
            min: MIN_VOTING_POWER_CAP,
            max: MAX_VOTING_POWER_CAP,
        }
    }
}

impl Default for FractionBounds {
    fn default() -> Self {
        Self {
            min: MIN_ALLOCATION_FRACTION,
            max: MAX_ALLOCATION_FRACTION,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardViolation {
    #[error("allocation fraction {fraction} outside [{min}, {max}]")]
    AllocationOutOfBounds {
        fraction: FixedPoint128,
        min: FixedPoint128,
        max: FixedPoint128,
    },

    #[error("{entity} holds {weight} of {total_weight}, above cap {cap}")]
    VotingPowerExceeded {
        entity: String,
        weight: FixedPoint128,
        total_weight: FixedPoint128,
        cap: FixedPoint128,
    },

    #[error("voting power cap {cap} outside constitutional range [{min}, {max}]")]
    CapOutOfRange {
        cap: FixedPoint128,
        min: FixedPoint128,
        max: FixedPoint128,
    },

    #[error("parameter {key} value {value} outside [{min}, {max}]")]
    ParameterOutOfBounds {
        key: String,
        value: FixedPoint128,
        min: FixedPoint128,
        max: FixedPoint128,
    },

    #[error("round allocates {total_fraction} of the pool, more than 1")]
    AllocationExceedsPool { total_fraction: FixedPoint128 },

    #[error("total weight is zero")]
    EmptyTotalWeight,

    #[error("invalid bounds: min {min} > max {max}")]
    InvalidBounds { min: FixedPoint128, max: FixedPoint128 },

    #[error("arithmetic failure in guard: {0}")]
    Arithmetic(#[from] ArithmeticError),
}

impl GuardViolation {
    pub fn code(&self) -> &'static str {
        match self {
            GuardViolation::AllocationOutOfBounds { .. } => "ALLOCATION_OUT_OF_BOUNDS",
            GuardViolation::VotingPowerExceeded { .. } => "VOTING_POWER_EXCEEDED",
            GuardViolation::CapOutOfRange { .. } => "CAP_OUT_OF_RANGE",
            GuardViolation::ParameterOutOfBounds { .. } => "PARAMETER_OUT_OF_BOUNDS",
            GuardViolation::AllocationExceedsPool { .. } => "ALLOCATION_EXCEEDS_POOL",
            GuardViolation::EmptyTotalWeight => "EMPTY_TOTAL_WEIGHT",
            GuardViolation::InvalidBounds { .. } => "INVALID_BOUNDS",
            GuardViolation::Arithmetic(_) => "ARITHMETIC",
        }
    }
}

pub fn validate_allocation(
    fraction: FixedPoint128,
    bounds: &FractionBounds,
) -> Result<(), GuardViolation> {
    if !bounds.contains(fraction) {
        return Err(GuardViolation::AllocationOutOfBounds {
            fraction,
            min: bounds.min,
            max: bounds.max,
        });
    }
    Ok(())
}

/// Rejects `weight / total_weight > cap`; equality passes.
pub fn validate_voting_power(
    entity: &str,
    weight: FixedPoint128,
    total_weight: FixedPoint128,
    cap: FixedPoint128,
) -> Result<(), GuardViolation> {
    if total_weight.is_zero() {
        return Err(GuardViolation::EmptyTotalWeight);
    }
    if !FixedPoint128::ratio_at_most(weight, total_weight, cap)? {
        return Err(GuardViolation::VotingPowerExceeded {
            entity: entity.to_string(),
            weight,
            total_weight,
            cap,
        });
    }
    Ok(())
}

/// The cap itself must sit inside the constitutional 20%-25% range.
pub fn validate_cap(cap: FixedPoint128) -> Result<(), GuardViolation> {
    let range = FractionBounds::voting_cap_range();
    if !range.contains(cap) {
        return Err(GuardViolation::CapOutOfRange {
            cap,
            min: range.min,
            max: range.max,
        });
    }
    Ok(())
}

pub fn validate_parameter_value(
    key: &str,
    value: FixedPoint128,
    bounds: &FractionBounds,
) -> Result<(), GuardViolation> {
    if !bounds.contains(value) {
        return Err(GuardViolation::ParameterOutOfBounds {
            key: key.to_string(),
            value,
            min: bounds.min,
            max: bounds.max,
        });
    }
    Ok(())
}

/// Outcome of one allocation round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationRound {
    pub grants: BTreeMap<String, FixedPoint128>,
    pub excluded: BTreeMap<String, Vec<FailureReason>>,
    pub total_fraction: FixedPoint128,
    pub total_granted: FixedPoint128,
}

/// Guard configured with the allocation bounds in force.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EconomicsGuard {
    pub allocation_bounds: FractionBounds,
}

impl EconomicsGuard {
    pub fn new(allocation_bounds: FractionBounds) -> Self {
        Self { allocation_bounds }
    }

    pub fn validate_allocation(&self, fraction: FixedPoint128) -> Result<(), GuardViolation> {
        validate_allocation(fraction, &self.allocation_bounds)
    }

    /// Range-check the cap, then the holder against it.
    pub fn check_voting_power(
        &self,
        entity: &str,
        weight: FixedPoint128,
        total_weight: FixedPoint128,
        cap: FixedPoint128,
    ) -> Result<(), GuardViolation> {
        validate_cap(cap)?;
        validate_voting_power(entity, weight, total_weight, cap)
    }

    /// Allocate `pool` across the requesting nodes.
    ///
    /// Nodes that fail verification are left out with their reasons and do
    /// not affect the others. Any bound violation among eligible requests
    /// aborts the whole round.
    pub fn allocate_round(
        &self,
        pool: FixedPoint128,
        requests: &BTreeMap<String, FixedPoint128>,
        verifier: &NodeVerifier,
        log: &mut OperationLog,
    ) -> Result<AllocationRound, GuardViolation> {
        let node_ids: Vec<&str> = requests.keys().map(String::as_str).collect();
        let mut round = AllocationRound {
            grants: BTreeMap::new(),
            excluded: BTreeMap::new(),
            total_fraction: FixedPoint128::ZERO,
            total_granted: FixedPoint128::ZERO,
        };

        for result in verifier.verify_batch(&node_ids) {
            if !result.valid {
                warn!("excluding {} from allocation round", result.node_id);
                round.excluded.insert(result.node_id, result.reasons);
                continue;
            }
            let fraction = match requests.get(&result.node_id) {
                Some(fraction) => *fraction,
                None => continue,
            };
            self.validate_allocation(fraction)?;
            round.total_fraction = CertifiedMath::add(log, round.total_fraction, fraction)?;
            let amount = CertifiedMath::mul(log, pool, fraction)?;
            round.total_granted = CertifiedMath::add(log, round.total_granted, amount)?;
            round.grants.insert(result.node_id, amount);
        }

        if round.total_fraction > FixedPoint128::ONE {
            return Err(GuardViolation::AllocationExceedsPool {
                total_fraction: round.total_fraction,
            });
        }

        info!(
            "allocation round: {} granted, {} excluded, {} of pool",
            round.grants.len(),
            round.excluded.len(),
            round.total_fraction
        );
        Ok(round)
    }
}
