//! Secp256k1 wallet key types
//!
//! This module provides the key material the wallet stores:
//! - `Key`: a 32-byte secp256k1 scalar plus the compressed-serialization flag
//! - `PubKey`: a SEC1-encoded public key (33 or 65 bytes)
//! - `KeyId`: the 160-bit identifier a key is indexed under
//!
//! Uses the k256 crate for secp256k1 curve operations.

use crate::error::CryptoError;
use crate::hash::double_sha256;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey as K256SecretKey;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Secret key length in bytes (raw scalar)
pub const SECRET_KEY_SIZE: usize = 32;

/// Compressed SEC1 public key length
pub const COMPRESSED_PUB_KEY_SIZE: usize = 33;

/// Uncompressed SEC1 public key length
pub const UNCOMPRESSED_PUB_KEY_SIZE: usize = 65;

/// Key identifier length (160 bits)
pub const KEY_ID_SIZE: usize = 20;

/// Wallet private key: a secp256k1 scalar plus the flag recording whether
/// its public key serializes compressed.
#[derive(Clone)]
pub struct Key {
    secret: K256SecretKey,
    compressed: bool,
}

impl Key {
    /// Generate a new random key
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R, compressed: bool) -> Self {
        Self {
            secret: K256SecretKey::random(rng),
            compressed,
        }
    }

    /// Load from a raw 32-byte scalar
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_SIZE], compressed: bool) -> Result<Self, CryptoError> {
        K256SecretKey::from_slice(bytes)
            .map(|secret| Self { secret, compressed })
            .map_err(|_| CryptoError::InvalidSecretKey)
    }

    /// Serialize to the raw 32-byte scalar
    ///
    /// # Security
    ///
    /// The returned array holds live key material; callers must wipe it
    /// once it has served its purpose.
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.secret.to_bytes().into()
    }

    /// Whether the public key serializes in compressed form
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Derive the corresponding public key, serialized per the compressed flag
    pub fn pub_key(&self) -> PubKey {
        let point = self.secret.public_key().to_encoded_point(self.compressed);
        PubKey {
            bytes: point.as_bytes().to_vec(),
        }
    }

    /// Check that this key reproduces the given public key exactly
    /// (same point, same serialization form).
    pub fn verify_pub_key(&self, pub_key: &PubKey) -> bool {
        self.pub_key() == *pub_key
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("bytes", &"[REDACTED]")
            .field("compressed", &self.compressed)
            .finish()
    }
}

/// Wallet public key, stored as its SEC1 serialization (33 or 65 bytes)
#[derive(Clone, PartialEq, Eq)]
pub struct PubKey {
    bytes: Vec<u8>,
}

impl PubKey {
    /// Load from SEC1 bytes (compressed or uncompressed)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        k256::PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// The SEC1 serialization
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether this is the 33-byte compressed serialization
    pub fn is_compressed(&self) -> bool {
        self.bytes.len() == COMPRESSED_PUB_KEY_SIZE
    }

    /// The 160-bit identifier this key is indexed under: the first 20 bytes
    /// of the double-SHA-256 of the SEC1 serialization.
    pub fn key_id(&self) -> KeyId {
        let digest = double_sha256(&self.bytes);
        let mut id = [0u8; KEY_ID_SIZE];
        id.copy_from_slice(&digest[..KEY_ID_SIZE]);
        KeyId(id)
    }

    /// Double-SHA-256 of the SEC1 serialization, used as the IV seed when
    /// enveloping the matching private key.
    pub fn hash(&self) -> [u8; 32] {
        double_sha256(&self.bytes)
    }
}

impl std::fmt::Debug for PubKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PubKey({})", hex::encode(&self.bytes[..8.min(self.bytes.len())]))
    }
}

impl Serialize for PubKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(&self.bytes))
        } else {
            serializer.serialize_bytes(&self.bytes)
        }
    }
}

impl<'de> Deserialize<'de> for PubKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{SeqAccess, Visitor};

        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a SEC1 public key byte string")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(v)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(byte) = seq.next_element()? {
                    bytes.push(byte);
                }
                Ok(bytes)
            }
        }

        let bytes = if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            hex::decode(&s).map_err(serde::de::Error::custom)?
        } else {
            deserializer.deserialize_byte_buf(BytesVisitor)?
        };
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// 160-bit key identifier (hash of a public key)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId([u8; KEY_ID_SIZE]);

impl KeyId {
    /// Wrap raw identifier bytes
    pub fn from_bytes(bytes: [u8; KEY_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Load from a byte slice, checking the length
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_ID_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyIdLength {
                    expected: KEY_ID_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    /// The raw identifier bytes
    pub fn as_bytes(&self) -> &[u8; KEY_ID_SIZE] {
        &self.0
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyId({})", hex::encode(self.0))
    }
}

impl Serialize for KeyId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(self.0))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{SeqAccess, Visitor};

        struct IdVisitor;

        impl<'de> Visitor<'de> for IdVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("20 identifier bytes")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(v)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut bytes = Vec::with_capacity(KEY_ID_SIZE);
                while let Some(byte) = seq.next_element()? {
                    bytes.push(byte);
                }
                Ok(bytes)
            }
        }

        let bytes = if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            hex::decode(&s).map_err(serde::de::Error::custom)?
        } else {
            deserializer.deserialize_byte_buf(IdVisitor)?
        };
        Self::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}
