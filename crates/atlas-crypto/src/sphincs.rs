/// SPHINCS+ backend
///
/// Stateless hash-based signatures (SHAKE-256, fast parameter set) from the
/// `pqcrypto-sphincsplus` reference bindings. Keys are held as raw bytes and
/// re-parsed per call so the signer stays `Clone`.
use crate::signing::{
    check_envelope, signing_message, Environment, Signature, SignatureBackend, SigningError,
};
use pqcrypto_sphincsplus::sphincsshake256fsimple;
use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _, SecretKey as _};

pub const SPHINCS_SCHEME: &str = "sphincs-shake-256f";
const SPHINCS_DOMAIN: &str = "ATLAS_SPHINCS_SIGNATURE_V1";

#[derive(Clone)]
pub struct SphincsSigner {
    key_id: String,
    public_key: Vec<u8>,
    secret_key: Option<Vec<u8>>,
}

impl SphincsSigner {
    /// Fresh keypair.
    pub fn generate(key_id: impl Into<String>) -> Self {
        let (pk, sk) = sphincsshake256fsimple::keypair();
        Self {
            key_id: key_id.into(),
            public_key: pk.as_bytes().to_vec(),
            secret_key: Some(sk.as_bytes().to_vec()),
        }
    }

    /// Verification-only handle around a published public key.
    pub fn verifier(key_id: impl Into<String>, public_key: &[u8]) -> Result<Self, SigningError> {
        sphincsshake256fsimple::PublicKey::from_bytes(public_key)
            .map_err(|e| SigningError::InvalidKey(format!("{:?}", e)))?;
        Ok(Self {
            key_id: key_id.into(),
            public_key: public_key.to_vec(),
            secret_key: None,
        })
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

impl std::fmt::Debug for SphincsSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SphincsSigner")
            .field("key_id", &self.key_id)
            .field("can_sign", &self.secret_key.is_some())
            .finish_non_exhaustive()
    }
}

impl SignatureBackend for SphincsSigner {
    fn scheme(&self) -> &str {
        SPHINCS_SCHEME
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(
        &self,
        payload_hash: &str,
        environment: Environment,
    ) -> Result<Signature, SigningError> {
        let secret = self
            .secret_key
            .as_ref()
            .ok_or_else(|| {
                SigningError::InvalidKey("verification-only key cannot sign".to_string())
            })?;
        let sk = sphincsshake256fsimple::SecretKey::from_bytes(secret)
            .map_err(|e| SigningError::InvalidKey(format!("{:?}", e)))?;
        let message = signing_message(SPHINCS_DOMAIN, environment, payload_hash);
        let sig = sphincsshake256fsimple::detached_sign(&message, &sk);
        Ok(Signature {
            scheme: SPHINCS_SCHEME.to_string(),
            key_id: self.key_id.clone(),
            environment,
            bytes: hex::encode(sig.as_bytes()),
        })
    }

    fn verify(
        &self,
        payload_hash: &str,
        signature: &Signature,
        environment: Environment,
    ) -> Result<(), SigningError> {
        check_envelope(self, signature, environment)?;
        let pk = sphincsshake256fsimple::PublicKey::from_bytes(&self.public_key)
            .map_err(|e| SigningError::InvalidKey(format!("{:?}", e)))?;
        let raw = hex::decode(&signature.bytes)
            .map_err(|e| SigningError::Encoding(format!("{:?}", e)))?;
        let sig = sphincsshake256fsimple::DetachedSignature::from_bytes(&raw)
            .map_err(|e| SigningError::Encoding(format!("{:?}", e)))?;
        let message = signing_message(SPHINCS_DOMAIN, environment, payload_hash);
        sphincsshake256fsimple::verify_detached_signature(&sig, &message, &pk).map_err(|_| {
            SigningError::InvalidSignature {
                key_id: signature.key_id.clone(),
            }
        })
    }
}
