// Circuit breaker (CIR): fail-closed halt records
//
// SAFETY INVARIANTS:
// 1. A halt never fails; it always yields a record
// 2. Records carry no timestamps: sequence counter + block height only
// 3. Context is a sorted map; record_hash commits to every body field
// 4. While a halt is open the breaker refuses further guarded work
//    until that exact halt sequence is acknowledged

use atlas_crypto::{Environment, Signature, SignatureBackend};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaltCode {
    GuardViolation,
    InvariantViolation,
    ArithmeticFailure,
    RegistryViolation,
    SnapshotInvalid,
    ProofFailure,
    TimeRegression,
}

impl HaltCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HaltCode::GuardViolation => "GUARD_VIOLATION",
            HaltCode::InvariantViolation => "INVARIANT_VIOLATION",
            HaltCode::ArithmeticFailure => "ARITHMETIC_FAILURE",
            HaltCode::RegistryViolation => "REGISTRY_VIOLATION",
            HaltCode::SnapshotInvalid => "SNAPSHOT_INVALID",
            HaltCode::ProofFailure => "PROOF_FAILURE",
            HaltCode::TimeRegression => "TIME_REGRESSION",
        }
    }
}

impl fmt::Display for HaltCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HaltRecord {
    pub sequence: u64,
    pub code: HaltCode,
    pub operation: String,
    pub height: u64,
    pub context: BTreeMap<String, String>,
    pub record_hash: String,
    pub signature: Option<Signature>,
}

impl HaltRecord {
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.code.as_str().as_bytes());
        hasher.update((self.operation.len() as u64).to_be_bytes());
        hasher.update(self.operation.as_bytes());
        hasher.update(self.height.to_be_bytes());
        for (key, value) in &self.context {
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(key.as_bytes());
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for HaltRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CIR halt #{} [{}] in {} at height {}",
            self.sequence, self.code, self.operation, self.height
        )?;
        for (key, value) in &self.context {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CircuitError {
    #[error("circuit open: halt #{sequence} ({code}) not acknowledged")]
    Open { sequence: u64, code: HaltCode },

    #[error("acknowledgement for halt #{given} does not match open halt {open:?}")]
    WrongAcknowledgement { given: u64, open: Option<u64> },
}

impl CircuitError {
    pub fn code(&self) -> &'static str {
        match self {
            CircuitError::Open { .. } => "CIRCUIT_OPEN",
            CircuitError::WrongAcknowledgement { .. } => "WRONG_ACKNOWLEDGEMENT",
        }
    }
}

/// Emits and retains halt records; optionally signs them.
pub struct HaltHandler {
    environment: Environment,
    signer: Option<Box<dyn SignatureBackend>>,
    records: Vec<HaltRecord>,
    open: Option<(u64, HaltCode)>,
}

impl HaltHandler {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            signer: None,
            records: Vec::new(),
            open: None,
        }
    }

    pub fn with_signer(environment: Environment, signer: Box<dyn SignatureBackend>) -> Self {
        Self {
            signer: Some(signer),
            ..Self::new(environment)
        }
    }

    pub fn halt(
        &mut self,
        code: HaltCode,
        operation: &str,
        height: u64,
        context: BTreeMap<String, String>,
    ) -> HaltRecord {
        let mut record = HaltRecord {
            sequence: self.records.len() as u64,
            code,
            operation: operation.to_string(),
            height,
            context,
            record_hash: String::new(),
            signature: None,
        };
        record.record_hash = record.compute_hash();

        if let Some(signer) = &self.signer {
            match signer.sign(&record.record_hash, self.environment) {
                Ok(signature) => record.signature = Some(signature),
                // The halt stands unsigned; verifiers see signature: None.
                Err(e) => error!("halt #{} left unsigned: {}", record.sequence, e),
            }
        }

        error!("{} hash={}", record, record.record_hash);
        self.open = Some((record.sequence, code));
        self.records.push(record.clone());
        record
    }

    /// Ok while no unacknowledged halt exists.
    pub fn ensure_closed(&self) -> Result<(), CircuitError> {
        match self.open {
            Some((sequence, code)) => {
                warn!("refusing guarded operation: halt #{} open", sequence);
                Err(CircuitError::Open { sequence, code })
            }
            None => Ok(()),
        }
    }

    /// Close the breaker after the open halt has been handled out of band.
    pub fn acknowledge(&mut self, sequence: u64) -> Result<(), CircuitError> {
        match self.open {
            Some((open, _)) if open == sequence => {
                info!("halt #{} acknowledged", sequence);
                self.open = None;
                Ok(())
            }
            other => Err(CircuitError::WrongAcknowledgement {
                given: sequence,
                open: other.map(|(s, _)| s),
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn records(&self) -> &[HaltRecord] {
        &self.records
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Recompute the hash and, when signed, check the signature.
    pub fn verify_record(&self, record: &HaltRecord) -> bool {
        if record.compute_hash() != record.record_hash {
            return false;
        }
        match (&record.signature, &self.signer) {
            (None, _) => true,
            (Some(sig), Some(signer)) => signer
                .verify(&record.record_hash, sig, self.environment)
                .is_ok(),
            (Some(_), None) => false,
        }
    }
}

/// Build a context map from key/value pairs.
pub fn halt_context<K: ToString, V: ToString>(pairs: &[(K, V)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
