//! key pool error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Wots(#[from] siaac_wots::Error),

    #[error(transparent)]
    Merkle(#[from] siaac_merkle::Error),

    #[error("requested key count {requested} exceeds cap {cap}")]
    KeyCountTooLarge { requested: usize, cap: usize },

    #[error("index {index} out of range (pool has {total} keys)")]
    IndexOutOfRange { index: usize, total: usize },

    #[error("key at index {index} already used")]
    KeyAlreadyUsed { index: usize },

    #[error("no unused keys available from index {from} onward")]
    NoKeysAvailable { from: usize },
}
