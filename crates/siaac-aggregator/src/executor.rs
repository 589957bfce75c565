//! executor interface consumed by the aggregator
//!
//! The aggregator owns its executor handle one-way; the executor never
//! holds a reference back. Asynchronous status updates flow back through
//! [`crate::Aggregator::on_settlement_update`], called by whatever
//! transport the executor uses (a channel, a webhook handler in
//! `siaac-node`), rather than through a callback the executor invokes
//! directly on the aggregator.

use crate::batch::{BatchCommitment, SettlementRecord};

#[derive(Clone, Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor rejected batch (retryable): {reason}")]
    Retryable { reason: String },

    #[error("executor rejected batch (non-retryable): {reason}")]
    NonRetryable { reason: String },

    #[error("executor call timed out")]
    Timeout,
}

/// downstream settlement executor. Implementations are external
/// collaborators — this
/// crate only defines the contract they must satisfy.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn submit(&self, batch: &BatchCommitment) -> Result<SettlementRecord, ExecutorError>;
}

/// in-memory executor for tests and local operation without a real chain
/// adapter wired up: always accepts, settles nothing on its own.
pub struct NullExecutor;

#[async_trait::async_trait]
impl Executor for NullExecutor {
    async fn submit(&self, batch: &BatchCommitment) -> Result<SettlementRecord, ExecutorError> {
        Ok(SettlementRecord::pending(batch.batch_id, batch.chain.clone()))
    }
}
