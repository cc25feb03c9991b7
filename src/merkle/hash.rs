// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fixed-width hash values and the pair-hashing rule shared by every tree operation.
//!
//! Leaves arrive from the persistence layer as hex strings (`0x`-prefixed or
//! bare). Internally they are always `[u8; 32]`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

use super::MerkleError;

/// A 32-byte hash: a leaf, an interior node, or a root.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    /// Root of an empty tree.
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, MerkleError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(digits).map_err(|e| MerkleError::InvalidHex {
            input: s.to_string(),
            reason: e.to_string(),
        })?;

        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| MerkleError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }

    /// Lowercase hex with a `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<Hash32> for [u8; 32] {
    fn from(hash: Hash32) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for Hash32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Hash32 {
    type Err = MerkleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps span fields readable
        write!(f, "Hash32(0x{}..)", hex::encode(&self.0[..6]))
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash32::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash function used to combine two nodes into their parent.
///
/// `hash_pair` orders its inputs byte-wise before hashing, so callers never
/// track left/right. Tree building, proof generation and verification all go
/// through this one method.
pub trait MerkleHasher: Send + Sync + 'static {
    /// Short name used in logs and config.
    const NAME: &'static str;

    fn digest(data: &[u8]) -> Hash32;

    fn hash_pair(a: &Hash32, b: &Hash32) -> Hash32 {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut combined = [0u8; 64];
        combined[..32].copy_from_slice(&lo.0);
        combined[32..].copy_from_slice(&hi.0);
        Self::digest(&combined)
    }
}

/// Keccak-256 (Ethereum variant, not NIST SHA3-256). Default for the registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak256Hasher;

impl MerkleHasher for Keccak256Hasher {
    const NAME: &'static str = "keccak256";

    fn digest(data: &[u8]) -> Hash32 {
        Hash32(Keccak256::digest(data).into())
    }
}

/// SHA-256 alternative for anchors that expect it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl MerkleHasher for Sha256Hasher {
    const NAME: &'static str = "sha256";

    fn digest(data: &[u8]) -> Hash32 {
        Hash32(Sha256::digest(data).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input_vector() {
        // keccak256("") as published by Ethereum tooling
        let expected = "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470";
        assert_eq!(Keccak256Hasher::digest(b"").to_hex(), expected);
    }

    #[test]
    fn test_sha256_empty_input_vector() {
        let expected = "0xe3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(Sha256Hasher::digest(b"").to_hex(), expected);
    }

    #[test]
    fn test_hash_pair_is_symmetric() {
        let a = Hash32([1u8; 32]);
        let b = Hash32([2u8; 32]);
        assert_eq!(
            Keccak256Hasher::hash_pair(&a, &b),
            Keccak256Hasher::hash_pair(&b, &a)
        );
    }

    #[test]
    fn test_hash_pair_sorts_smaller_first() {
        let a = Hash32([9u8; 32]);
        let b = Hash32([3u8; 32]);
        let mut manual = Vec::with_capacity(64);
        manual.extend_from_slice(&b.0);
        manual.extend_from_slice(&a.0);
        assert_eq!(Keccak256Hasher::hash_pair(&a, &b), Keccak256Hasher::digest(&manual));
    }

    #[test]
    fn test_hex_round_trip_with_and_without_prefix() {
        let hash = Hash32([0xabu8; 32]);
        let with_prefix = hash.to_hex();
        assert!(with_prefix.starts_with("0x"));
        assert_eq!(Hash32::from_hex(&with_prefix).unwrap(), hash);
        assert_eq!(Hash32::from_hex(&with_prefix[2..]).unwrap(), hash);
        assert_eq!(Hash32::from_hex(&with_prefix.to_uppercase().replace("0X", "0x")).unwrap(), hash);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(matches!(Hash32::from_hex("0xzz"), Err(MerkleError::InvalidHex { .. })));
        assert!(matches!(Hash32::from_hex("0xabcd"), Err(MerkleError::InvalidLength(2))));
        assert!(matches!(Hash32::from_hex(""), Err(MerkleError::InvalidLength(0))));
    }

    #[test]
    fn test_serde_uses_prefixed_hex() {
        let hash = Hash32([0x01u8; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "01".repeat(32)));
        let back: Hash32 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
