//! append-only anonymity pool with nullifier tracking
//!
//! Deposits are appended to a fixed-depth Merkle tree (default depth 20);
//! withdrawals prove membership against a recent root and burn a
//! nullifier. `nullifierSet` is authoritative for withdrawal replay — the
//! key pool's advisory `used` flags play no role here.
//!
//! Root validity is resolved in favor of a rolling window of
//! recently-valid roots: depositors and withdrawers are not
//! perfectly synchronized in practice, and accepting only the single
//! latest root would spuriously reject proofs generated a few deposits
//! ago. `root_window` (default 32) bounds how stale a proof may be.

mod error;

pub use error::{Error, Result};

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use siaac_hash::{hash_dom, tags, HashDigest};
use siaac_intent::Nullifier;
use siaac_merkle::{AppendOnlyMerkleTree, MerkleProof};

const STATE_VERSION: u16 = 1;

/// everything a depositor reveals to bind a future withdrawal to this note.
pub struct DepositNote<'a> {
    pub secret: [u8; 32],
    pub amount: u128,
    pub token: &'a str,
    pub chain: &'a str,
}

/// `H_dom("LEAF", secret || amount || token || chain)`.
pub fn commitment_for(note: &DepositNote<'_>) -> HashDigest {
    hash_dom(
        tags::LEAF,
        &[&note.secret, &note.amount.to_be_bytes(), note.token.as_bytes(), note.chain.as_bytes()],
    )
}

/// closed configuration record for one pool instance.
#[derive(Clone, Copy, Debug)]
pub struct AnonymityPoolConfig {
    pub depth: usize,
    pub root_window: usize,
}

impl Default for AnonymityPoolConfig {
    fn default() -> Self {
        Self { depth: 20, root_window: 32 }
    }
}

#[derive(Serialize, Deserialize)]
pub struct PersistedAnonymityPool {
    pub version: u16,
    pub depth: usize,
    pub root_window: usize,
    pub leaves_hex: Vec<String>,
    pub nullifier_hex_set: Vec<String>,
}

/// append-only deposit tree plus nullifier set. Callers are expected to
/// serialize `deposit`/`withdraw` under a single writer lock;
/// `root`/`proof_for_commitment` are read-only and safe to call from any
/// number of readers against a `&self`.
pub struct AnonymityPool {
    config: AnonymityPoolConfig,
    tree: AppendOnlyMerkleTree,
    recent_roots: VecDeque<HashDigest>,
    nullifiers: HashSet<Nullifier>,
}

impl AnonymityPool {
    pub fn new(config: AnonymityPoolConfig) -> Self {
        let tree = AppendOnlyMerkleTree::new(config.depth);
        let mut recent_roots = VecDeque::with_capacity(config.root_window);
        recent_roots.push_back(tree.current_root());
        Self { config, tree, recent_roots, nullifiers: HashSet::new() }
    }

    pub fn depth(&self) -> usize {
        self.config.depth
    }

    pub fn current_root(&self) -> HashDigest {
        self.tree.current_root()
    }

    pub fn num_deposits(&self) -> usize {
        self.tree.num_leaves()
    }

    /// size of the anonymity set a withdrawer enjoys right now:
    /// `|tree.leaves| - |usedNullifierSet|`.
    pub fn anonymity_set_size(&self) -> usize {
        self.tree.num_leaves().saturating_sub(self.nullifiers.len())
    }

    fn push_root(&mut self, root: HashDigest) {
        if self.recent_roots.len() >= self.config.root_window {
            self.recent_roots.pop_front();
        }
        self.recent_roots.push_back(root);
    }

    /// append a deposit commitment, returning its leaf index and the new
    /// root.
    pub fn deposit(&mut self, note: &DepositNote<'_>) -> Result<(usize, HashDigest)> {
        if self.tree.num_leaves() >= self.tree.capacity() {
            return Err(Error::PoolFull { depth: self.config.depth, capacity: self.tree.capacity() });
        }
        let commitment = commitment_for(note);
        let (index, root) = self.tree.append(commitment);
        self.push_root(root);
        tracing::debug!(index, "deposit appended to anonymity pool");
        Ok((index, root))
    }

    /// raw-commitment variant of [`Self::deposit`], for callers that
    /// already computed (or received over the wire) the leaf commitment.
    pub fn deposit_commitment(&mut self, commitment: HashDigest) -> Result<(usize, HashDigest)> {
        if self.tree.num_leaves() >= self.tree.capacity() {
            return Err(Error::PoolFull { depth: self.config.depth, capacity: self.tree.capacity() });
        }
        let (index, root) = self.tree.append(commitment);
        self.push_root(root);
        Ok((index, root))
    }

    pub fn proof_for_commitment(&self, commitment: &HashDigest) -> Result<MerkleProof> {
        Ok(self.tree.proof_for_leaf(commitment)?)
    }

    fn root_is_acceptable(&self, claimed_root: &HashDigest) -> bool {
        self.recent_roots.iter().any(|r| siaac_hash::bytes_equal(r, claimed_root))
    }

    /// admit a withdrawal: the nullifier must be unused, the claimed root
    /// must be current or within the rolling window, and the inclusion
    /// proof must verify against that root. Insertion is
    /// idempotent-rejecting: once a nullifier succeeds, every later call
    /// with it fails with `NullifierAlreadyUsed` even if the rest of the
    /// check would otherwise pass.
    pub fn withdraw(
        &mut self,
        nullifier: Nullifier,
        claimed_root: HashDigest,
        proof: &MerkleProof,
        commitment: &HashDigest,
    ) -> Result<()> {
        if self.nullifiers.contains(&nullifier) {
            tracing::error!(nullifier = %nullifier, "CRITICAL nullifier reuse attempt");
            return Err(Error::NullifierAlreadyUsed(nullifier.to_string()));
        }
        if !self.root_is_acceptable(&claimed_root) {
            return Err(Error::StaleRoot);
        }
        if !siaac_merkle::verify(proof, commitment, &claimed_root) {
            return Err(Error::BadProof);
        }

        self.nullifiers.insert(nullifier);
        tracing::debug!(nullifier = %nullifier, "nullifier spent");
        Ok(())
    }

    pub fn is_nullifier_used(&self, nullifier: &Nullifier) -> bool {
        self.nullifiers.contains(nullifier)
    }

    pub fn export_state(&self) -> PersistedAnonymityPool {
        PersistedAnonymityPool {
            version: STATE_VERSION,
            depth: self.config.depth,
            root_window: self.config.root_window,
            leaves_hex: self.tree.leaves().iter().map(hex::encode).collect(),
            nullifier_hex_set: self.nullifiers.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn from_state(state: PersistedAnonymityPool) -> Result<Self> {
        if state.version != STATE_VERSION {
            return Err(Error::StateVersionMismatch { expected: STATE_VERSION, found: state.version });
        }
        let config = AnonymityPoolConfig { depth: state.depth, root_window: state.root_window };
        let mut pool = Self::new(config);
        for leaf_hex in &state.leaves_hex {
            let bytes = hex::decode(leaf_hex).map_err(|e| Error::InvalidHex(e.to_string()))?;
            let leaf: HashDigest = bytes.try_into().map_err(|_| Error::InvalidHex("wrong leaf length".to_string()))?;
            pool.deposit_commitment(leaf)?;
        }
        for n_hex in &state.nullifier_hex_set {
            let nullifier: Nullifier = n_hex.parse().map_err(|_| Error::InvalidHex(n_hex.clone()))?;
            pool.nullifiers.insert(nullifier);
        }
        Ok(pool)
    }
}
