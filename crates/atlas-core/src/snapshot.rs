// Versioned, hash-sealed snapshots of externally supplied records
//
// SAFETY INVARIANTS:
// 1. Entries are a BTreeMap; iteration and serialization are ordered
// 2. snapshot_hash = SHA3-512(canonical JSON of entries)
// 3. A snapshot that fails validate() is never consulted

use atlas_crypto::canonical_sha3_512;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Highest snapshot schema this build understands.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot field {0} is missing or empty")]
    MissingField(&'static str),

    #[error("unsupported snapshot schema {found} (supported up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("snapshot hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch { declared: String, computed: String },

    #[error("snapshot serialization failed: {0}")]
    Serialization(String),
}

impl SnapshotError {
    pub fn code(&self) -> &'static str {
        match self {
            SnapshotError::MissingField(_) => "SNAPSHOT_MISSING_FIELD",
            SnapshotError::UnsupportedSchema { .. } => "SNAPSHOT_UNSUPPORTED_SCHEMA",
            SnapshotError::HashMismatch { .. } => "SNAPSHOT_HASH_MISMATCH",
            SnapshotError::Serialization(_) => "SNAPSHOT_SERIALIZATION",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot<T> {
    pub snapshot_version: String,
    pub block_height: u64,
    pub snapshot_hash: String,
    pub entries: BTreeMap<String, T>,
    pub schema_version: u32,
}

impl<T: Serialize> Snapshot<T> {
    /// Build a snapshot and compute its hash.
    pub fn seal(
        snapshot_version: impl Into<String>,
        block_height: u64,
        entries: BTreeMap<String, T>,
    ) -> Result<Self, SnapshotError> {
        let snapshot_hash = Self::compute_hash(&entries)?;
        Ok(Self {
            snapshot_version: snapshot_version.into(),
            block_height,
            snapshot_hash,
            entries,
            schema_version: SNAPSHOT_SCHEMA_VERSION,
        })
    }

    pub fn compute_hash(entries: &BTreeMap<String, T>) -> Result<String, SnapshotError> {
        canonical_sha3_512(entries).map_err(|e| SnapshotError::Serialization(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.snapshot_version.trim().is_empty() {
            return Err(SnapshotError::MissingField("snapshot_version"));
        }
        if self.snapshot_hash.is_empty() {
            return Err(SnapshotError::MissingField("snapshot_hash"));
        }
        if self.schema_version == 0 || self.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedSchema {
                found: self.schema_version,
                supported: SNAPSHOT_SCHEMA_VERSION,
            });
        }
        let computed = Self::compute_hash(&self.entries)?;
        if computed != self.snapshot_hash {
            return Err(SnapshotError::HashMismatch {
                declared: self.snapshot_hash.clone(),
                computed,
            });
        }
        Ok(())
    }
}

impl<T> Snapshot<T> {
    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
