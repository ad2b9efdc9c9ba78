//! Hashing utilities using SHA-256.
//!
//! Provides the digests the key store builds on: plain and double SHA-256
//! over byte slices, and the label hash used to derive IVs for named
//! secrets.

use sha2::{Digest, Sha256};

/// Hash arbitrary data using SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash arbitrary data using SHA-256 twice (Bitcoin-style `Hash`).
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Double-SHA-256 of a string label, used as an IV seed for named secrets.
///
/// The empty string maps to the all-zero digest. Callers rely on this as a
/// stable contract, not as a property of SHA-256.
pub fn double_hash_of_str(s: &str) -> [u8; 32] {
    if s.is_empty() {
        return [0u8; 32];
    }
    double_sha256(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_deterministic() {
        let data = b"test";
        assert_eq!(sha256(data), sha256(data));
        assert_ne!(sha256(b"test"), sha256(b"Test"));
    }

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc") from FIPS 180-4
        let expected =
            hex::decode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
                .unwrap();
        assert_eq!(sha256(b"abc").as_slice(), expected.as_slice());
    }

    #[test]
    fn test_double_sha256_is_sha256_of_sha256() {
        let data = b"some payload";
        assert_eq!(double_sha256(data), sha256(&sha256(data)));
    }

    #[test]
    fn test_double_hash_of_str_empty_is_zero() {
        assert_eq!(double_hash_of_str(""), [0u8; 32]);
    }

    #[test]
    fn test_double_hash_of_str_nonempty() {
        assert_eq!(double_hash_of_str("paperkey"), double_sha256(b"paperkey"));
        assert_ne!(double_hash_of_str("paperkey"), double_hash_of_str("pincode"));
    }
}
