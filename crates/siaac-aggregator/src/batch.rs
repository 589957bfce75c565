//! batch and settlement entities

use serde::{Deserialize, Serialize};
use siaac_hash::HashDigest;
use siaac_merkle::MerkleProof;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchCommitment {
    pub batch_id: Uuid,
    pub chain: String,
    pub batch_root: HashDigest,
    pub commitments: Vec<HashDigest>,
    pub proofs: Vec<MerkleProof>,
    pub created_at: u64,
    pub count: usize,
}

/// monotonic settlement state machine:
/// `(none) -> Pending -> Submitted -> Confirmed -> Finalized`, with
/// `Pending -> Failed` and `Submitted -> Failed` as the only backward
/// exits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStatus {
    Pending,
    Submitted,
    Confirmed,
    Finalized,
    Failed,
}

impl SettlementStatus {
    /// is `self -> next` a legal transition in the settlement state machine?
    pub fn can_transition_to(self, next: SettlementStatus) -> bool {
        use SettlementStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Failed)
                | (Submitted, Confirmed)
                | (Submitted, Failed)
                | (Confirmed, Finalized)
                | (Confirmed, Failed)
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub batch_id: Uuid,
    pub chain: String,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub status: SettlementStatus,
    pub gas_used: Option<u64>,
    pub settled_at: Option<u64>,
}

impl SettlementRecord {
    pub fn pending(batch_id: Uuid, chain: String) -> Self {
        Self {
            batch_id,
            chain,
            tx_hash: None,
            block_number: None,
            status: SettlementStatus::Pending,
            gas_used: None,
            settled_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_happy_path_transitions() {
        assert!(SettlementStatus::Pending.can_transition_to(SettlementStatus::Submitted));
        assert!(SettlementStatus::Submitted.can_transition_to(SettlementStatus::Confirmed));
        assert!(SettlementStatus::Confirmed.can_transition_to(SettlementStatus::Finalized));
    }

    #[test]
    fn failure_exits_are_legal_from_pending_submitted_and_confirmed() {
        assert!(SettlementStatus::Pending.can_transition_to(SettlementStatus::Failed));
        assert!(SettlementStatus::Submitted.can_transition_to(SettlementStatus::Failed));
        assert!(SettlementStatus::Confirmed.can_transition_to(SettlementStatus::Failed));
    }

    #[test]
    fn finalized_and_failed_are_terminal() {
        assert!(!SettlementStatus::Finalized.can_transition_to(SettlementStatus::Submitted));
        assert!(!SettlementStatus::Failed.can_transition_to(SettlementStatus::Pending));
    }

    #[test]
    fn skipping_states_is_illegal() {
        assert!(!SettlementStatus::Pending.can_transition_to(SettlementStatus::Confirmed));
        assert!(!SettlementStatus::Submitted.can_transition_to(SettlementStatus::Finalized));
    }
}
