//! Known-answer vectors.
//!
//! Pin the primitives to published values so a dependency bump that changed
//! behaviour would fail here first.

use crate::hash::hash;
use crate::signing::{verify_classical, AuthorityKey};

/// RFC 8032 section 7.1, TEST 1 secret key.
///
/// ⚠️ WARNING: DO NOT USE IN PRODUCTION ⚠️
///
/// This key is publicly known and exists only for reproducible tests.
pub const TEST_VECTOR_PRIVATE_KEY: [u8; 32] = [
    0x9d, 0x61, 0xb1, 0x9d, 0xef, 0xfd, 0x5a, 0x60, 0xba, 0x84, 0x4a, 0xf4, 0x92, 0xec, 0x2c, 0xc4,
    0x44, 0x49, 0xc5, 0x69, 0x7b, 0x32, 0x69, 0x19, 0x70, 0x3b, 0xac, 0x03, 0x1c, 0xae, 0x7f, 0x60,
];

const RFC8032_TEST1_PUBLIC_KEY_HEX: &str =
    "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

const RFC8032_TEST1_SIGNATURE_HEX: &str = "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e065224901555fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b";

const BLAKE3_EMPTY_HEX: &str = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262";

#[test]
fn test_rfc8032_public_key() {
    let key = AuthorityKey::from_bytes(&TEST_VECTOR_PRIVATE_KEY).unwrap();
    assert_eq!(hex::encode(key.public_key()), RFC8032_TEST1_PUBLIC_KEY_HEX);
}

#[test]
fn test_rfc8032_empty_message_signature() {
    let key = AuthorityKey::from_bytes(&TEST_VECTOR_PRIVATE_KEY).unwrap();
    let signature = key.sign(b"");
    assert_eq!(hex::encode(&signature), RFC8032_TEST1_SIGNATURE_HEX);

    let public_key = hex::decode(RFC8032_TEST1_PUBLIC_KEY_HEX).unwrap();
    assert_eq!(verify_classical(b"", &signature, &public_key), Ok(true));
}

#[test]
fn test_blake3_empty_input() {
    assert_eq!(hex::encode(hash(b"")), BLAKE3_EMPTY_HEX);
}
