//! anonymity pool error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// replay / single-use violation — CRITICAL, never retried.
    #[error("nullifier {0} already used")]
    NullifierAlreadyUsed(String),

    /// crypto failure — possibly adversarial.
    #[error("claimed root is not the current root or within the rolling window")]
    StaleRoot,

    #[error("merkle inclusion proof verification failed")]
    BadProof,

    /// resource error.
    #[error("anonymity pool at depth {depth} is full ({capacity} leaves)")]
    PoolFull { depth: usize, capacity: usize },

    #[error("persisted state version {found} is incompatible (expected {expected})")]
    StateVersionMismatch { expected: u16, found: u16 },

    #[error(transparent)]
    Merkle(#[from] siaac_merkle::Error),

    #[error("invalid hex in persisted state: {0}")]
    InvalidHex(String),
}

impl Error {
    /// stable machine-readable code for the wire layer, mirroring
    /// `siaac_auth::Error::code`.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NullifierAlreadyUsed(_) => "NULLIFIER_ALREADY_USED",
            Error::StaleRoot => "STALE_ROOT",
            Error::BadProof => "BAD_PROOF",
            Error::PoolFull { .. } => "POOL_FULL",
            Error::StateVersionMismatch { .. } => "STATE_VERSION_MISMATCH",
            Error::Merkle(_) => "MERKLE",
            Error::InvalidHex(_) => "INVALID_HEX",
        }
    }
}
