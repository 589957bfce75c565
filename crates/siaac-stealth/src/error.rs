//! stealth addressing error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("meta-address string does not match 'st:<chain>:<spendPubHex>:<viewPubHex>'")]
    MalformedMetaAddress,

    #[error("public key is not a valid Ristretto255 encoding")]
    InvalidPoint,

    #[error("hex decoding failed")]
    InvalidHex,
}
