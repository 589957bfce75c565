//! shielded intent wire-type error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("intent deadline {deadline} is not after current time {now}")]
    DeadlineExpired { deadline: u64, now: u64 },

    #[error("nullifier hex decoding failed")]
    InvalidNullifierHex,
}
