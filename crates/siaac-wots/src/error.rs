//! WOTS+ error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("winternitz parameter w={0} is not a power of two")]
    InvalidW(u32),

    #[error("expected {expected} chunks, got {got}")]
    WrongChunkCount { expected: usize, got: usize },

    #[error("expected {expected} bytes, got {got}")]
    WrongByteLength { expected: usize, got: usize },
}
