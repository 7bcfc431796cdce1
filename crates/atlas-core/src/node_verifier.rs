// Node eligibility verification
//
// SAFETY INVARIANTS:
// 1. Checks run in a fixed order and every failing reason is recorded
// 2. A node is valid iff it has no failure reasons
// 3. Batches are sorted and de-duplicated before verification
// 4. Only validated snapshots are consulted

use crate::snapshot::{Snapshot, SnapshotError};
use atlas_crypto::sha3_256_hex;
use atlas_math::FixedPoint128;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Registry entry for a participating node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRecord {
    pub node_id: String,
    /// Hex-encoded public key.
    pub public_key: String,
    pub key_scheme: String,
    pub revoked: bool,
    pub registered_at: u64,
}

/// Telemetry report for a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub node_id: String,
    /// Fraction of the reporting window the node was reachable, in [0, 1].
    pub uptime: FixedPoint128,
    pub healthy: bool,
    pub telemetry_hash: String,
}

impl TelemetryRecord {
    pub fn new(node_id: impl Into<String>, uptime: FixedPoint128, healthy: bool) -> Self {
        let node_id = node_id.into();
        let telemetry_hash = Self::compute_hash(&node_id, uptime, healthy);
        Self {
            node_id,
            uptime,
            healthy,
            telemetry_hash,
        }
    }

    pub fn compute_hash(node_id: &str, uptime: FixedPoint128, healthy: bool) -> String {
        sha3_256_hex(format!("{}|{}|{}", node_id, uptime, healthy).as_bytes())
    }
}

/// Why a node is not eligible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    NotRegistered,
    /// The registry entry under this id names a different node.
    NodeIdMismatch { recorded: String },
    Revoked,
    MissingKey,
    MalformedKey,
    UnsupportedScheme { scheme: String },
    TelemetryMissing,
    TelemetryHashConflict { declared: String, computed: String },
    LowUptime { observed: FixedPoint128, minimum: FixedPoint128 },
    Unhealthy,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::NotRegistered => "NOT_REGISTERED",
            FailureReason::NodeIdMismatch { .. } => "NODE_ID_MISMATCH",
            FailureReason::Revoked => "REVOKED",
            FailureReason::MissingKey => "MISSING_KEY",
            FailureReason::MalformedKey => "MALFORMED_KEY",
            FailureReason::UnsupportedScheme { .. } => "UNSUPPORTED_SCHEME",
            FailureReason::TelemetryMissing => "TELEMETRY_MISSING",
            FailureReason::TelemetryHashConflict { .. } => "TELEMETRY_HASH_CONFLICT",
            FailureReason::LowUptime { .. } => "LOW_UPTIME",
            FailureReason::Unhealthy => "UNHEALTHY",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NodeIdMismatch { recorded } => {
                write!(f, "NODE_ID_MISMATCH({})", recorded)
            }
            FailureReason::UnsupportedScheme { scheme } => {
                write!(f, "UNSUPPORTED_SCHEME({})", scheme)
            }
            FailureReason::LowUptime { observed, minimum } => {
                write!(f, "LOW_UPTIME({} < {})", observed, minimum)
            }
            other => f.write_str(other.code()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationResult {
    pub node_id: String,
    pub valid: bool,
    pub reasons: Vec<FailureReason>,
}

impl VerificationResult {
    pub fn codes(&self) -> Vec<&'static str> {
        self.reasons.iter().map(FailureReason::code).collect()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("node {} not eligible: {}", result.node_id, describe(&result.reasons))]
pub struct NotEligibleError {
    pub result: VerificationResult,
}

fn describe(reasons: &[FailureReason]) -> String {
    reasons.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
}

/// Key schemes and uptime floor a node must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifierPolicy {
    pub supported_schemes: BTreeSet<String>,
    pub min_uptime: FixedPoint128,
}

impl Default for VerifierPolicy {
    fn default() -> Self {
        Self {
            supported_schemes: ["sphincs-shake-256f", "dilithium5", "mock-sha3"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            // 0.95
            min_uptime: FixedPoint128::from_raw(950_000_000_000_000_000),
        }
    }
}

pub struct NodeVerifier {
    registry: Snapshot<NodeRecord>,
    telemetry: Snapshot<TelemetryRecord>,
    policy: VerifierPolicy,
}

impl NodeVerifier {
    /// Refuses snapshots that fail validation.
    pub fn new(
        registry: Snapshot<NodeRecord>,
        telemetry: Snapshot<TelemetryRecord>,
        policy: VerifierPolicy,
    ) -> Result<Self, SnapshotError> {
        registry.validate()?;
        telemetry.validate()?;
        Ok(Self {
            registry,
            telemetry,
            policy,
        })
    }

    pub fn policy(&self) -> &VerifierPolicy {
        &self.policy
    }

    pub fn registry_height(&self) -> u64 {
        self.registry.block_height
    }

    pub fn verify(&self, node_id: &str) -> VerificationResult {
        let mut reasons = Vec::new();

        match self.registry.get(node_id) {
            None => reasons.push(FailureReason::NotRegistered),
            Some(record) => {
                if record.node_id != node_id {
                    reasons.push(FailureReason::NodeIdMismatch {
                        recorded: record.node_id.clone(),
                    });
                }
                if record.revoked {
                    reasons.push(FailureReason::Revoked);
                }
                if record.public_key.is_empty() {
                    reasons.push(FailureReason::MissingKey);
                } else if hex::decode(&record.public_key).is_err() {
                    reasons.push(FailureReason::MalformedKey);
                }
                if !self.policy.supported_schemes.contains(&record.key_scheme) {
                    reasons.push(FailureReason::UnsupportedScheme {
                        scheme: record.key_scheme.clone(),
                    });
                }
            }
        }

        match self.telemetry.get(node_id) {
            None => reasons.push(FailureReason::TelemetryMissing),
            Some(report) => {
                let computed =
                    TelemetryRecord::compute_hash(node_id, report.uptime, report.healthy);
                if report.node_id != node_id || computed != report.telemetry_hash {
                    reasons.push(FailureReason::TelemetryHashConflict {
                        declared: report.telemetry_hash.clone(),
                        computed,
                    });
                }
                if report.uptime < self.policy.min_uptime {
                    reasons.push(FailureReason::LowUptime {
                        observed: report.uptime,
                        minimum: self.policy.min_uptime,
                    });
                }
                if !report.healthy {
                    reasons.push(FailureReason::Unhealthy);
                }
            }
        }

        let valid = reasons.is_empty();
        if valid {
            debug!("node {} verified", node_id);
        } else {
            warn!("node {} failed verification: {}", node_id, describe(&reasons));
        }
        VerificationResult {
            node_id: node_id.to_string(),
            valid,
            reasons,
        }
    }

    /// Verify a set of nodes in sorted order, each id once.
    pub fn verify_batch<S: AsRef<str>>(&self, node_ids: &[S]) -> Vec<VerificationResult> {
        let unique: BTreeSet<&str> = node_ids.iter().map(|id| id.as_ref()).collect();
        unique.into_iter().map(|id| self.verify(id)).collect()
    }

    pub fn require_eligible(&self, node_id: &str) -> Result<(), NotEligibleError> {
        let result = self.verify(node_id);
        if result.valid {
            Ok(())
        } else {
            Err(NotEligibleError { result })
        }
    }
}
