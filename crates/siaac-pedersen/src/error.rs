//! Pedersen commitment error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("commitment point is not a valid Ristretto255 encoding")]
    InvalidPoint,

    #[error("blinding scalar canonical encoding check failed")]
    InvalidScalar,

    #[error("range proof bit width mismatch: commitment expects {expected}, proof carries {got}")]
    BitWidthMismatch { expected: u32, got: u32 },
}
