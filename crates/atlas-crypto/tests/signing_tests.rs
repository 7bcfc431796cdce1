// SIGNING ABSTRACTION INTEGRATION TESTS
//
// Test Coverage:
// 1. Backends are usable behind a trait object
// 2. Canonical hashes feed signatures deterministically
// 3. Any payload change invalidates the signature

use atlas_crypto::{canonical_sha3_512, Environment, MockSigner, SignatureBackend};
use proptest::prelude::*;
use serde_json::json;

fn backend() -> Box<dyn SignatureBackend> {
    Box::new(MockSigner::new("halt-signer", b"integration-secret").unwrap())
}

#[test]
fn test_01_trait_object_roundtrip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let signer = backend();
    let hash = canonical_sha3_512(&json!({"proposal": "p1", "value": "150"})).unwrap();
    let sig = signer.sign(&hash, Environment::Dev).unwrap();
    assert_eq!(sig.scheme, "mock-sha3");
    assert_eq!(sig.key_id, "halt-signer");
    assert!(signer.verify(&hash, &sig, Environment::Dev).is_ok());
}

#[test]
fn test_02_signature_serializes_as_json() {
    let signer = backend();
    let sig = signer.sign("00ff", Environment::Beta).unwrap();
    let encoded = serde_json::to_string(&sig).unwrap();
    assert!(encoded.contains("\"environment\":\"BETA\""));
    let decoded = serde_json::from_str(&encoded).unwrap();
    assert!(signer.verify("00ff", &decoded, Environment::Beta).is_ok());
}

proptest! {
    #[test]
    fn prop_payload_change_breaks_signature(a in "[0-9a-f]{16}", b in "[0-9a-f]{16}") {
        prop_assume!(a != b);
        let signer = backend();
        let sig = signer.sign(&a, Environment::Dev).unwrap();
        prop_assert!(signer.verify(&b, &sig, Environment::Dev).is_err());
    }
}
