// Governance parameter registry - typed, hash-committed protocol parameters
//
// SAFETY INVARIANTS:
// 1. Mutability is fixed at registration; immutable keys have no override path
// 2. A value's type never changes after registration
// 3. Initial values satisfy their constitutional bounds
// 4. Iteration and the commitment hash use key order only

use atlas_crypto::canonical_sha3_512;
use atlas_economics::{validate_parameter_value, FractionBounds, GuardViolation};
use atlas_math::{ArithmeticError, FixedPoint128};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Well-known parameter keys.
pub mod keys {
    pub const CAP: &str = "CAP";
    pub const QUORUM_FRACTION: &str = "QUORUM_FRACTION";
    pub const SUPERMAJORITY_FRACTION: &str = "SUPERMAJORITY_FRACTION";
    pub const MAX_VOTING_POWER_FRACTION: &str = "MAX_VOTING_POWER_FRACTION";
    pub const VOTING_WINDOW: &str = "VOTING_WINDOW";
    pub const TREASURY_ALLOCATION_FRACTION: &str = "TREASURY_ALLOCATION_FRACTION";
    pub const TOTAL_SUPPLY: &str = "TOTAL_SUPPLY";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueKind {
    Fixed,
    Integer,
    Bool,
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Fixed => "FIXED",
            ValueKind::Integer => "INTEGER",
            ValueKind::Bool => "BOOL",
            ValueKind::Text => "TEXT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterValue {
    Fixed(FixedPoint128),
    Integer(u64),
    Bool(bool),
    Text(String),
}

impl ParameterValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ParameterValue::Fixed(_) => ValueKind::Fixed,
            ParameterValue::Integer(_) => ValueKind::Integer,
            ParameterValue::Bool(_) => ValueKind::Bool,
            ParameterValue::Text(_) => ValueKind::Text,
        }
    }

    /// Numeric view used for bound checks; `None` for booleans and text.
    pub fn as_fixed(&self) -> Option<Result<FixedPoint128, ArithmeticError>> {
        match self {
            ParameterValue::Fixed(v) => Some(Ok(*v)),
            ParameterValue::Integer(v) => Some(FixedPoint128::from_integer(u128::from(*v))),
            ParameterValue::Bool(_) | ParameterValue::Text(_) => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Fixed(v) => write!(f, "{}", v),
            ParameterValue::Integer(v) => write!(f, "{}", v),
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::Text(v) => write!(f, "{:?}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mutability {
    Mutable,
    Immutable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GovernanceParameter {
    pub key: String,
    pub value: ParameterValue,
    pub mutability: Mutability,
    /// Inclusive bounds enforced when a change is executed.
    pub bounds: Option<FractionBounds>,
    /// Incremented on every successful `set`.
    pub version: u32,
}

impl GovernanceParameter {
    pub fn is_mutable(&self) -> bool {
        self.mutability == Mutability::Mutable
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("parameter {key} is immutable")]
    ImmutableParameterViolation { key: String },

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("parameter {0} already registered")]
    DuplicateParameter(String),

    #[error("parameter {key} expects {expected}, got {found}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("bounds on {key} require a numeric value")]
    BoundsOnNonNumeric { key: String },

    #[error("initial value rejected: {0}")]
    Bounds(#[from] GuardViolation),

    #[error("parameter value not representable: {0}")]
    Arithmetic(#[from] ArithmeticError),

    #[error("registry serialization failed: {0}")]
    Serialization(String),
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::ImmutableParameterViolation { .. } => "IMMUTABLE_PARAMETER_VIOLATION",
            RegistryError::UnknownParameter(_) => "UNKNOWN_PARAMETER",
            RegistryError::DuplicateParameter(_) => "DUPLICATE_PARAMETER",
            RegistryError::TypeMismatch { .. } => "TYPE_MISMATCH",
            RegistryError::BoundsOnNonNumeric { .. } => "BOUNDS_ON_NON_NUMERIC",
            RegistryError::Bounds(_) => "PARAMETER_OUT_OF_BOUNDS",
            RegistryError::Arithmetic(_) => "ARITHMETIC",
            RegistryError::Serialization(_) => "SERIALIZATION",
        }
    }
}

/// One parameter in a genesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenesisParameter {
    pub key: String,
    pub value: ParameterValue,
    pub mutable: bool,
    #[serde(default)]
    pub bounds: Option<FractionBounds>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenesisConfig {
    pub parameters: Vec<GenesisParameter>,
}

fn fixed(raw: u128) -> ParameterValue {
    ParameterValue::Fixed(FixedPoint128::from_raw(raw))
}

fn param(
    key: &str,
    value: ParameterValue,
    mutable: bool,
    bounds: Option<FractionBounds>,
) -> GenesisParameter {
    GenesisParameter {
        key: key.to_string(),
        value,
        mutable,
        bounds,
    }
}

impl Default for GenesisConfig {
    fn default() -> Self {
        const E16: u128 = 10_000_000_000_000_000;
        let bounds = |min: u128, max: u128| {
            Some(FractionBounds {
                min: FixedPoint128::from_raw(min * E16),
                max: FixedPoint128::from_raw(max * E16),
            })
        };
        Self {
            parameters: vec![
                param(keys::CAP, ParameterValue::Integer(100), true, None),
                param(keys::QUORUM_FRACTION, fixed(30 * E16), false, None),
                param(keys::SUPERMAJORITY_FRACTION, fixed(66 * E16), false, None),
                param(keys::MAX_VOTING_POWER_FRACTION, fixed(20 * E16), false, bounds(20, 25)),
                param(keys::VOTING_WINDOW, ParameterValue::Integer(100), true, None),
                param(keys::TREASURY_ALLOCATION_FRACTION, fixed(5 * E16), true, bounds(1, 15)),
                param(
                    keys::TOTAL_SUPPLY,
                    fixed(1_000_000 * 100 * E16),
                    false,
                    None,
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterRegistry {
    parameters: BTreeMap<String, GovernanceParameter>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn genesis(config: &GenesisConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for p in &config.parameters {
            let mutability = if p.mutable {
                Mutability::Mutable
            } else {
                Mutability::Immutable
            };
            registry.register(&p.key, p.value.clone(), mutability, p.bounds)?;
        }
        info!(
            "genesis parameter registry created with {} parameters",
            registry.parameters.len()
        );
        Ok(registry)
    }

    pub fn register(
        &mut self,
        key: &str,
        value: ParameterValue,
        mutability: Mutability,
        bounds: Option<FractionBounds>,
    ) -> Result<(), RegistryError> {
        if self.parameters.contains_key(key) {
            return Err(RegistryError::DuplicateParameter(key.to_string()));
        }
        if let Some(bounds) = &bounds {
            let numeric = value
                .as_fixed()
                .ok_or_else(|| RegistryError::BoundsOnNonNumeric { key: key.to_string() })??;
            validate_parameter_value(key, numeric, bounds)?;
        }
        self.parameters.insert(
            key.to_string(),
            GovernanceParameter {
                key: key.to_string(),
                value,
                mutability,
                bounds,
                version: 0,
            },
        );
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&GovernanceParameter, RegistryError> {
        self.parameters
            .get(key)
            .ok_or_else(|| RegistryError::UnknownParameter(key.to_string()))
    }

    pub fn value(&self, key: &str) -> Result<&ParameterValue, RegistryError> {
        Ok(&self.get(key)?.value)
    }

    pub fn get_fixed(&self, key: &str) -> Result<FixedPoint128, RegistryError> {
        match self.value(key)? {
            ParameterValue::Fixed(v) => Ok(*v),
            other => Err(RegistryError::TypeMismatch {
                key: key.to_string(),
                expected: ValueKind::Fixed,
                found: other.kind(),
            }),
        }
    }

    pub fn get_integer(&self, key: &str) -> Result<u64, RegistryError> {
        match self.value(key)? {
            ParameterValue::Integer(v) => Ok(*v),
            other => Err(RegistryError::TypeMismatch {
                key: key.to_string(),
                expected: ValueKind::Integer,
                found: other.kind(),
            }),
        }
    }

    /// Reject values whose type differs from the registered one.
    pub fn check_type(&self, key: &str, value: &ParameterValue) -> Result<(), RegistryError> {
        let expected = self.get(key)?.value.kind();
        if expected != value.kind() {
            return Err(RegistryError::TypeMismatch {
                key: key.to_string(),
                expected,
                found: value.kind(),
            });
        }
        Ok(())
    }

    /// Replace a mutable value; returns the previous value.
    ///
    /// Immutability is checked before anything else, so an immutable key
    /// rejects every write whatever its type. Bounded values must stay inside
    /// their bounds.
    pub fn set(
        &mut self,
        key: &str,
        value: ParameterValue,
    ) -> Result<ParameterValue, RegistryError> {
        let parameter = self
            .parameters
            .get_mut(key)
            .ok_or_else(|| RegistryError::UnknownParameter(key.to_string()))?;
        if !parameter.is_mutable() {
            warn!("rejected write to immutable parameter {}", key);
            return Err(RegistryError::ImmutableParameterViolation { key: key.to_string() });
        }
        let expected = parameter.value.kind();
        if expected != value.kind() {
            return Err(RegistryError::TypeMismatch {
                key: key.to_string(),
                expected,
                found: value.kind(),
            });
        }
        if let Some(bounds) = &parameter.bounds {
            let numeric = value
                .as_fixed()
                .ok_or_else(|| RegistryError::BoundsOnNonNumeric { key: key.to_string() })??;
            validate_parameter_value(key, numeric, bounds)?;
        }
        let previous = std::mem::replace(&mut parameter.value, value);
        parameter.version += 1;
        info!("parameter {} changed {} -> {}", key, previous, parameter.value);
        Ok(previous)
    }

    /// Every parameter, sorted by key.
    pub fn get_all(&self) -> Vec<&GovernanceParameter> {
        self.parameters.values().collect()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// SHA3-512 of the canonical JSON of every parameter.
    pub fn commitment_hash(&self) -> Result<String, RegistryError> {
        canonical_sha3_512(&self.parameters)
            .map_err(|e| RegistryError::Serialization(e.to_string()))
    }
}
