/// EXECUTION PROOFS
///
/// One signed artifact per executed proposal. The content hash commits to
/// the proposal id, the parameter change and the execution height; the
/// signature covers the content hash under the execution environment.
use crate::parameter_registry::ParameterValue;
use atlas_crypto::{canonical_sha3_512, Environment, Signature, SignatureBackend, SigningError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionProof {
    pub proposal_id: String,
    pub parameter_key: String,
    pub previous_value: ParameterValue,
    pub new_value: ParameterValue,
    pub content_hash: String,
    pub signature: Signature,
    pub environment: Environment,
    pub block_height: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("content hash mismatch: recorded {recorded}, computed {computed}")]
    ContentHashMismatch { recorded: String, computed: String },

    #[error("proof signature rejected: {0}")]
    Signature(#[from] SigningError),

    #[error("proof serialization failed: {0}")]
    Serialization(String),
}

impl ProofError {
    pub fn code(&self) -> &'static str {
        match self {
            ProofError::ContentHashMismatch { .. } => "CONTENT_HASH_MISMATCH",
            ProofError::Signature(e) => e.code(),
            ProofError::Serialization(_) => "SERIALIZATION",
        }
    }
}

pub fn compute_content_hash(
    proposal_id: &str,
    parameter_key: &str,
    previous_value: &ParameterValue,
    new_value: &ParameterValue,
    environment: Environment,
    block_height: u64,
) -> Result<String, ProofError> {
    canonical_sha3_512(&json!({
        "proposal_id": proposal_id,
        "parameter_key": parameter_key,
        "previous_value": previous_value,
        "new_value": new_value,
        "environment": environment,
        "block_height": block_height,
    }))
    .map_err(|e| ProofError::Serialization(e.to_string()))
}

impl ExecutionProof {
    /// Hash the change and sign it.
    pub fn create(
        proposal_id: &str,
        parameter_key: &str,
        previous_value: ParameterValue,
        new_value: ParameterValue,
        block_height: u64,
        signer: &dyn SignatureBackend,
        environment: Environment,
    ) -> Result<Self, ProofError> {
        let content_hash = compute_content_hash(
            proposal_id,
            parameter_key,
            &previous_value,
            &new_value,
            environment,
            block_height,
        )?;
        let signature = signer.sign(&content_hash, environment)?;
        Ok(Self {
            proposal_id: proposal_id.to_string(),
            parameter_key: parameter_key.to_string(),
            previous_value,
            new_value,
            content_hash,
            signature,
            environment,
            block_height,
        })
    }

    pub fn recompute_hash(&self) -> Result<String, ProofError> {
        compute_content_hash(
            &self.proposal_id,
            &self.parameter_key,
            &self.previous_value,
            &self.new_value,
            self.environment,
            self.block_height,
        )
    }

    pub fn to_json(&self) -> Result<String, ProofError> {
        serde_json::to_string_pretty(self).map_err(|e| ProofError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ProofError> {
        serde_json::from_str(json).map_err(|e| ProofError::Serialization(e.to_string()))
    }
}

/// Recompute the content hash, then check the signature under `environment`.
pub fn verify_proof(
    proof: &ExecutionProof,
    verifier: &dyn SignatureBackend,
    environment: Environment,
) -> Result<(), ProofError> {
    let computed = proof.recompute_hash()?;
    if computed != proof.content_hash {
        return Err(ProofError::ContentHashMismatch {
            recorded: proof.content_hash.clone(),
            computed,
        });
    }
    verifier.verify(&proof.content_hash, &proof.signature, environment)?;
    Ok(())
}
