use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// 32 random bytes, hex encoded. This is the value handed to the user.
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hex digest. Only digests are persisted.
pub fn hash_token_value(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

pub fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
