// Hash-chained operation log
//
// SAFETY INVARIANTS:
// 1. Every certified operation appends exactly one entry, success or failure
// 2. entry_hash commits to every field of the entry, including previous_hash
// 3. The first entry chains from GENESIS_HASH
// 4. Two runs over identical inputs produce byte-identical exports

use crate::error::MathOp;
use log::debug;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

/// Chain anchor for the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// What an operation produced, in canonical decimal form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoggedOutput {
    Value(String),
    Flag(bool),
    /// Stable error code of a failed operation.
    Error(String),
}

impl LoggedOutput {
    fn canonical(&self) -> String {
        match self {
            LoggedOutput::Value(v) => format!("value:{}", v),
            LoggedOutput::Flag(b) => format!("flag:{}", b),
            LoggedOutput::Error(code) => format!("error:{}", code),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationLogEntry {
    pub sequence: u64,
    pub operation: MathOp,
    pub input_hashes: Vec<String>,
    pub output: LoggedOutput,
    pub iterations: u32,
    pub previous_hash: String,
    pub entry_hash: String,
}

impl OperationLogEntry {
    /// Recompute the hash this entry should carry.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.operation.as_str().as_bytes());
        hasher.update((self.input_hashes.len() as u64).to_be_bytes());
        for input in &self.input_hashes {
            hasher.update(input.as_bytes());
        }
        hasher.update(self.output.canonical().as_bytes());
        hasher.update(self.iterations.to_be_bytes());
        hasher.update(self.previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogError {
    #[error("chain broken at sequence {sequence}: {reason}")]
    BrokenChain { sequence: u64, reason: String },

    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("log serialization failed: {0}")]
    Serialization(String),
}

/// Append-only log of certified operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationLog {
    entries: Vec<OperationLogEntry>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append an entry and return its hash.
    pub fn record(
        &mut self,
        operation: MathOp,
        input_hashes: Vec<String>,
        output: LoggedOutput,
        iterations: u32,
    ) -> String {
        let mut entry = OperationLogEntry {
            sequence: self.entries.len() as u64,
            operation,
            input_hashes,
            output,
            iterations,
            previous_hash: self.head_hash(),
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash();
        debug!(
            "operation #{} {} -> {}",
            entry.sequence,
            entry.operation,
            entry.output.canonical()
        );
        let hash = entry.entry_hash.clone();
        self.entries.push(entry);
        hash
    }

    pub fn entries(&self) -> &[OperationLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hash of the latest entry, or the genesis anchor for an empty log.
    pub fn head_hash(&self) -> String {
        self.entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }

    /// Ordered copy of every entry.
    pub fn export(&self) -> Vec<OperationLogEntry> {
        self.entries.clone()
    }

    pub fn export_json(&self) -> Result<String, LogError> {
        serde_json::to_string(&self.entries).map_err(|e| LogError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, LogError> {
        let entries: Vec<OperationLogEntry> =
            serde_json::from_str(json).map_err(|e| LogError::Serialization(e.to_string()))?;
        verify_chain(&entries)?;
        Ok(Self { entries })
    }
}

/// Check sequence numbering, hash linkage and every entry hash.
pub fn verify_chain(entries: &[OperationLogEntry]) -> Result<(), LogError> {
    let mut previous = GENESIS_HASH.to_string();
    for (index, entry) in entries.iter().enumerate() {
        let expected = index as u64;
        if entry.sequence != expected {
            return Err(LogError::SequenceGap {
                expected,
                found: entry.sequence,
            });
        }
        if entry.previous_hash != previous {
            return Err(LogError::BrokenChain {
                sequence: entry.sequence,
                reason: "previous_hash does not match preceding entry".to_string(),
            });
        }
        if entry.compute_hash() != entry.entry_hash {
            return Err(LogError::BrokenChain {
                sequence: entry.sequence,
                reason: "entry_hash does not match contents".to_string(),
            });
        }
        previous = entry.entry_hash.clone();
    }
    Ok(())
}

/// Index of the first entry where two logs differ, if any.
///
/// A log that is a strict prefix of the other diverges at its length.
pub fn first_divergence(a: &[OperationLogEntry], b: &[OperationLogEntry]) -> Option<usize> {
    let shared = a.len().min(b.len());
    (0..shared)
        .find(|&i| a[i].entry_hash != b[i].entry_hash)
        .or(if a.len() != b.len() { Some(shared) } else { None })
}
