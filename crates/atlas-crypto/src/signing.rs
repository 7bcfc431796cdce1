// Signing abstraction
//
// SAFETY INVARIANTS:
// 1. Every signature is bound to the environment it was produced for
// 2. The mock backend never signs or verifies for Mainnet
// 3. Signing is deterministic for the mock backend: same key, payload and
//    environment give the same bytes

use log::warn;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_512};
use std::fmt;
use thiserror::Error;

/// Deployment environment; part of every signed message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    Dev,
    Beta,
    Mainnet,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "DEV",
            Environment::Beta => "BETA",
            Environment::Mainnet => "MAINNET",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detached signature over a payload hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signature {
    pub scheme: String,
    pub key_id: String,
    pub environment: Environment,
    /// Hex-encoded signature bytes.
    pub bytes: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SigningError {
    #[error("scheme {scheme} refuses environment {environment}")]
    EnvironmentRefused { scheme: String, environment: Environment },

    #[error("signature produced for {signed} cannot be verified in {expected}")]
    EnvironmentMismatch { expected: Environment, signed: Environment },

    #[error("signature scheme {found} does not match backend {expected}")]
    SchemeMismatch { expected: String, found: String },

    #[error("signature does not verify for key {key_id}")]
    InvalidSignature { key_id: String },

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("malformed signature encoding: {0}")]
    Encoding(String),
}

impl SigningError {
    pub fn code(&self) -> &'static str {
        match self {
            SigningError::EnvironmentRefused { .. } => "ENVIRONMENT_REFUSED",
            SigningError::EnvironmentMismatch { .. } => "ENVIRONMENT_MISMATCH",
            SigningError::SchemeMismatch { .. } => "SCHEME_MISMATCH",
            SigningError::InvalidSignature { .. } => "INVALID_SIGNATURE",
            SigningError::InvalidKey(_) => "INVALID_KEY",
            SigningError::Encoding(_) => "ENCODING",
        }
    }
}

/// Pluggable signer used for execution proofs and halt records.
pub trait SignatureBackend {
    /// Scheme identifier recorded in every signature.
    fn scheme(&self) -> &str;

    fn key_id(&self) -> &str;

    fn sign(&self, payload_hash: &str, environment: Environment) -> Result<Signature, SigningError>;

    fn verify(
        &self,
        payload_hash: &str,
        signature: &Signature,
        environment: Environment,
    ) -> Result<(), SigningError>;
}

/// Scheme and environment checks shared by every backend before the
/// scheme-specific verification runs.
pub fn check_envelope(
    backend: &dyn SignatureBackend,
    signature: &Signature,
    environment: Environment,
) -> Result<(), SigningError> {
    if signature.scheme != backend.scheme() {
        return Err(SigningError::SchemeMismatch {
            expected: backend.scheme().to_string(),
            found: signature.scheme.clone(),
        });
    }
    if signature.environment != environment {
        return Err(SigningError::EnvironmentMismatch {
            expected: environment,
            signed: signature.environment,
        });
    }
    Ok(())
}

/// Message actually signed: domain tag, environment and payload hash.
pub fn signing_message(domain: &str, environment: Environment, payload_hash: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(domain.len() + payload_hash.len() + 16);
    message.extend_from_slice(domain.as_bytes());
    message.push(0);
    message.extend_from_slice(environment.as_str().as_bytes());
    message.push(0);
    message.extend_from_slice(payload_hash.as_bytes());
    message
}

pub const MOCK_SCHEME: &str = "mock-sha3";
const MOCK_DOMAIN: &str = "ATLAS_MOCK_SIGNATURE_V1";

/// Keyed SHA3-512 stand-in for a real signature scheme.
///
/// Signer and verifier share the secret, so this provides integrity between
/// cooperating test nodes only.
#[derive(Clone)]
pub struct MockSigner {
    key_id: String,
    secret: Vec<u8>,
}

impl MockSigner {
    pub fn new(key_id: impl Into<String>, secret: &[u8]) -> Result<Self, SigningError> {
        if secret.is_empty() {
            return Err(SigningError::InvalidKey("mock secret must not be empty".to_string()));
        }
        Ok(Self {
            key_id: key_id.into(),
            secret: secret.to_vec(),
        })
    }

    fn refuse_mainnet(&self, environment: Environment) -> Result<(), SigningError> {
        if environment == Environment::Mainnet {
            warn!("mock signer {} asked to operate on mainnet", self.key_id);
            return Err(SigningError::EnvironmentRefused {
                scheme: MOCK_SCHEME.to_string(),
                environment,
            });
        }
        Ok(())
    }

    fn mac(&self, payload_hash: &str, environment: Environment) -> String {
        let mut hasher = Sha3_512::new();
        hasher.update((self.secret.len() as u64).to_be_bytes());
        hasher.update(&self.secret);
        hasher.update(signing_message(MOCK_DOMAIN, environment, payload_hash));
        hex::encode(hasher.finalize())
    }
}

impl fmt::Debug for MockSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl SignatureBackend for MockSigner {
    fn scheme(&self) -> &str {
        MOCK_SCHEME
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(
        &self,
        payload_hash: &str,
        environment: Environment,
    ) -> Result<Signature, SigningError> {
        self.refuse_mainnet(environment)?;
        Ok(Signature {
            scheme: MOCK_SCHEME.to_string(),
            key_id: self.key_id.clone(),
            environment,
            bytes: self.mac(payload_hash, environment),
        })
    }

    fn verify(
        &self,
        payload_hash: &str,
        signature: &Signature,
        environment: Environment,
    ) -> Result<(), SigningError> {
        self.refuse_mainnet(environment)?;
        check_envelope(self, signature, environment)?;
        if signature.key_id != self.key_id
            || signature.bytes != self.mac(payload_hash, environment)
        {
            return Err(SigningError::InvalidSignature {
                key_id: signature.key_id.clone(),
            });
        }
        Ok(())
    }
}
