//! aggregator / batch builder error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] siaac_auth::Error),

    /// input error.
    #[error("intent deadline {deadline} is not after submission time {now}")]
    Expired { deadline: u64, now: u64 },

    /// resource error.
    #[error("queue for chain {chain} is full (capacity {capacity})")]
    QueueFull { chain: String, capacity: usize },

    /// external error categories.
    #[error("executor call for batch {batch_id} timed out")]
    ExecutorTimeout { batch_id: uuid::Uuid },

    #[error("executor rejected batch {batch_id} (retryable): {reason}")]
    ExecutorRetryable { batch_id: uuid::Uuid, reason: String },

    #[error("executor rejected batch {batch_id} (non-retryable): {reason}")]
    ExecutorNonRetryable { batch_id: uuid::Uuid, reason: String },

    /// internal invariant violation — never expected to occur; surfaced as
    /// an error rather than panicking only because a batch's settlement
    /// update path is driven by external, possibly-adversarial input.
    #[error("illegal settlement status transition for batch {batch_id}: {from:?} -> {to:?}")]
    IllegalStatusTransition { batch_id: uuid::Uuid, from: crate::SettlementStatus, to: crate::SettlementStatus },

    #[error("unknown chain {0}")]
    UnknownChain(String),

    #[error("unknown batch {0}")]
    UnknownBatch(uuid::Uuid),

    #[error(transparent)]
    Merkle(#[from] siaac_merkle::Error),
}

impl Error {
    /// stable machine-readable code for the wire layer, mirroring
    /// `siaac_auth::Error::code`. Delegates to the inner error for
    /// `Auth`, since that's where the replay/crypto-failure categories
    /// actually live.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Auth(inner) => inner.code(),
            Error::Expired { .. } => "EXPIRED",
            Error::QueueFull { .. } => "QUEUE_FULL",
            Error::ExecutorTimeout { .. } => "EXECUTOR_TIMEOUT",
            Error::ExecutorRetryable { .. } => "EXECUTOR_RETRYABLE",
            Error::ExecutorNonRetryable { .. } => "EXECUTOR_NON_RETRYABLE",
            Error::IllegalStatusTransition { .. } => "ILLEGAL_STATUS_TRANSITION",
            Error::UnknownChain(_) => "UNKNOWN_CHAIN",
            Error::UnknownBatch(_) => "UNKNOWN_BATCH",
            Error::Merkle(_) => "MERKLE",
        }
    }
}
