//! hash and domain-separation primitives
//!
//! every structured hash in SIAAC goes through [`hash_dom`] with an explicit
//! domain tag so that, e.g., a WOTS+ secret-key chunk and a Merkle node can
//! never collide even if the raw input bytes happen to coincide.

use rand::RngCore;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// fixed 32-byte output of every hash in this crate family.
pub type HashDigest = [u8; 32];

/// domain tags used across SIAAC components.
pub mod tags {
    pub const WOTS_SK: &str = "WOTS_SK";
    pub const WOTS_PK: &str = "WOTS_PK";
    pub const NODE: &str = "NODE";
    pub const LEAF: &str = "LEAF";
    pub const PEDERSEN_G: &str = "PEDERSEN_G";
    pub const PEDERSEN_H: &str = "PEDERSEN_H";
    pub const SIP_COMMITMENT: &str = "SIP_COMMITMENT";
    pub const RANGE_PROOF: &str = "RANGE_PROOF";
    pub const CHAIN_STEP: &str = "CHAIN_STEP";
    /// stealth address tweak, used inline as `H_dom("STEALTH_T", ...)`.
    pub const STEALTH_T: &str = "STEALTH_T";
    /// nullifier derivation; the data model requires nullifiers be "a
    /// deterministic function of (secret, commitment)" but names no tag.
    pub const NULLIFIER: &str = "NULLIFIER";
}

/// `H_dom(tag, m) = H(utf8(tag) || 0x00 || m)`, `m` given as a sequence of
/// parts that are hashed in order without being concatenated in memory.
pub fn hash_dom(tag: &str, parts: &[&[u8]]) -> HashDigest {
    let mut hasher = Sha256::new();
    hasher.update(tag.as_bytes());
    hasher.update([0x00]);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// plain `H(m)`, used only where an undomained digest is required (e.g.
/// hashing an already domain-tagged intermediate value again).
pub fn hash(parts: &[&[u8]]) -> HashDigest {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// big-endian encoding helpers used throughout the WOTS+ chain function.
pub fn be32(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

/// constant-time equality; MUST be used for anything comparing secret or
/// adversarially-influenced material (recovered public keys, commitments,
/// roots, MACs).
pub fn bytes_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// cryptographically secure RNG, backed by the OS entropy source. Use this
/// for all key generation and blinding factor draws; never share or reuse
/// an instance across logically distinct secrets.
pub fn csprng() -> rand::rngs::OsRng {
    rand::rngs::OsRng
}

/// deterministic RNG seeded from 32 bytes of caller-supplied material.
///
/// Permitted only for test fixtures and explicit HD (seed, index) key
/// derivation — never for anything the adversary could influence the
/// seed of.
pub fn seeded_rng(seed: [u8; 32]) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(seed)
}

/// fill a fixed-size array with cryptographically secure randomness.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    csprng().fill_bytes(&mut buf);
    buf
}

/// `serde(with = "...")` helpers realizing §6.5's wire-format rule ("all
/// hashes and keys transmitted as lowercase hex or base64") for the
/// fixed-size byte arrays used throughout the wire types, since plain
/// `#[derive(Serialize)]` on `[u8; 32]` emits a JSON array of numbers
/// instead.
#[cfg(feature = "serde")]
pub mod encoding {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::HashDigest;

    /// a single 32-byte digest as lowercase hex, e.g. intent hashes and
    /// Merkle roots.
    pub mod hex_digest {
        use super::*;

        pub fn serialize<S: Serializer>(bytes: &HashDigest, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&hex::encode(bytes))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<HashDigest, D::Error> {
            let s = String::deserialize(d)?;
            let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
            bytes.try_into().map_err(|_| serde::de::Error::custom("expected 32 bytes"))
        }
    }

    /// a list of 32-byte digests as a JSON array of lowercase hex strings,
    /// e.g. a Merkle proof's sibling path.
    pub mod hex_digest_vec {
        use super::*;

        pub fn serialize<S: Serializer>(values: &[HashDigest], s: S) -> Result<S::Ok, S::Error> {
            let hexed: Vec<String> = values.iter().map(hex::encode).collect();
            hexed.serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<HashDigest>, D::Error> {
            let hexed = Vec::<String>::deserialize(d)?;
            hexed
                .into_iter()
                .map(|s| {
                    let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
                    bytes.try_into().map_err(|_| serde::de::Error::custom("expected 32 bytes"))
                })
                .collect()
        }
    }

    /// a WOTS+ chain-value vector (signature or public key) as a single
    /// base64 string: every 32-byte chunk concatenated in order, then
    /// base64-encoded as one blob, matching `signatureBase64`/
    /// `publicKeyBase64` in §6.5.
    pub mod base64_chunks {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        use super::*;

        pub fn serialize<S: Serializer>(chunks: &[[u8; 32]], s: S) -> Result<S::Ok, S::Error> {
            let mut flat = Vec::with_capacity(chunks.len() * 32);
            for chunk in chunks {
                flat.extend_from_slice(chunk);
            }
            s.serialize_str(&STANDARD.encode(flat))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<[u8; 32]>, D::Error> {
            let s = String::deserialize(d)?;
            let flat = STANDARD.decode(s).map_err(serde::de::Error::custom)?;
            if flat.len() % 32 != 0 {
                return Err(serde::de::Error::custom("base64 chunk blob is not a multiple of 32 bytes"));
            }
            Ok(flat.chunks_exact(32).map(|c| c.try_into().expect("chunked to 32 bytes")).collect())
        }
    }
}
