//! authorization service error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// input error — caller's fault, safe to surface verbatim.
    #[error("no pool registered for merkle root {0}")]
    UnknownPool(String),

    #[error("pool with merkle root {0} is already registered")]
    DuplicatePool(String),

    #[error("key index {index} out of range (pool has {total} keys)")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("signed authorization intent hash does not match shielded intent commitment hash")]
    HashMismatch,

    /// crypto failure — possibly adversarial, message names the category
    /// only, never the offending material.
    #[error("WOTS+ signature verification failed")]
    BadSignature,

    #[error("merkle inclusion proof verification failed")]
    BadInclusionProof,

    #[error("range proof verification failed for a SHIELDED amount commitment")]
    BadRangeProof,

    /// replay / single-use violation — CRITICAL, never retried, always
    /// logged to the audit trail.
    #[error("key index {index} at pool {root} already used")]
    KeyReused { root: String, index: u32 },

    #[error("persisted state version {found} is incompatible (expected {expected})")]
    StateVersionMismatch { expected: u16, found: u16 },

    #[error(transparent)]
    Merkle(#[from] siaac_merkle::Error),

    #[error("serialization failed: {0}")]
    Serde(String),
}

impl Error {
    /// stable machine-readable code for the wire layer (§7: "replay
    /// violations are surfaced with a stable code"). Extended to every
    /// variant so callers can branch on category without string-matching
    /// `Display` output.
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnknownPool(_) => "UNKNOWN_POOL",
            Error::DuplicatePool(_) => "DUPLICATE_POOL",
            Error::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            Error::HashMismatch => "HASH_MISMATCH",
            Error::BadSignature => "BAD_SIGNATURE",
            Error::BadInclusionProof => "BAD_INCLUSION_PROOF",
            Error::BadRangeProof => "BAD_RANGE_PROOF",
            Error::KeyReused { .. } => "KEY_REUSED",
            Error::StateVersionMismatch { .. } => "STATE_VERSION_MISMATCH",
            Error::Merkle(_) => "MERKLE",
            Error::Serde(_) => "SERDE",
        }
    }
}
