// Cryptographic seams: canonical hashing and the signing abstraction
pub mod hashing;
pub mod signing;

#[cfg(feature = "quantum")]
pub mod sphincs;

pub use hashing::{
    canonical_json, canonical_sha3_256, canonical_sha3_512, sha3_256_hex, sha3_512_hex,
};

pub use signing::{
    Environment, MockSigner, Signature, SignatureBackend, SigningError, MOCK_SCHEME,
};

#[cfg(feature = "quantum")]
pub use sphincs::{SphincsSigner, SPHINCS_SCHEME};
