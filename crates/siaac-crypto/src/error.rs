//! intent encryption error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("recipient public key is not a valid Ristretto255 encoding")]
    InvalidPoint,

    #[error("decryption failed: authentication tag mismatch")]
    DecryptFailed,

    #[error("envelope has no compliance attachment")]
    NoComplianceAttachment,
}
