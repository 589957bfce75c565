//! off-chain authorization service
//!
//! Maintains the authoritative registry of key pools and their per-index
//! `usedBitset`. `KeyPool.used` (in `siaac-keypool`) is only the *local*,
//! advisory mirror of this — the service may see signatures whose
//! originating `KeyPool` it never owned (e.g. after a restart from
//! exported state, or a pool registered by a remote client).

mod error;

pub use error::{Error, Result};

use std::collections::HashMap;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use siaac_hash::HashDigest;
use siaac_intent::ShieldedIntent;
use siaac_keypool::SignedAuthorization;
use siaac_pedersen::RangeProofBackend;
use siaac_wots::WOTSParams;
use tokio::sync::{Mutex, RwLock};

const STATE_VERSION: u16 = 1;
/// bounded in-memory audit trail; oldest entries evicted first.
const AUDIT_LOG_CAPACITY: usize = 4096;

fn root_hex(root: &HashDigest) -> String {
    hex::encode(root)
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as u64
}

/// word-packed bitset over `total` key indices. Hand-rolled rather than a
/// dependency: it is a handful of `Vec<u64>` operations and nothing more.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bitset {
    words: Vec<u64>,
    len: u32,
}

impl Bitset {
    fn new(len: u32) -> Self {
        let word_count = (len as usize).div_ceil(64);
        Self { words: vec![0u64; word_count], len }
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_set(&self, index: u32) -> bool {
        if index >= self.len {
            return false;
        }
        let word = self.words[(index / 64) as usize];
        (word >> (index % 64)) & 1 == 1
    }

    fn set(&mut self, index: u32) {
        self.words[(index / 64) as usize] |= 1u64 << (index % 64);
    }

    pub fn popcount(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    fn to_base64(&self) -> String {
        let bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_le_bytes()).collect();
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
    }

    fn from_base64(s: &str, len: u32) -> Result<Self> {
        let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
            .map_err(|e| Error::Serde(e.to_string()))?;
        let words: Vec<u64> = bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().expect("chunks_exact(8)")))
            .collect();
        Ok(Self { words, len })
    }
}

/// a key pool registered with this service. `used_bitset` is the
/// authoritative replay guard.
pub struct RegisteredPool {
    pub merkle_root: HashDigest,
    pub params: WOTSParams,
    pub total_keys: u32,
    pub owner: Option<String>,
    pub registered_at: u64,
    used_bitset: Bitset,
}

impl RegisteredPool {
    pub fn used_keys(&self) -> u32 {
        self.used_bitset.popcount()
    }

    pub fn is_used(&self, index: u32) -> bool {
        self.used_bitset.is_set(index)
    }
}

/// severity of an audit-trail entry. Only [`AuditKind::Critical`] variants
/// are guaranteed to be replay/single-use violations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditSeverity {
    Info,
    Critical,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: u64,
    pub severity: AuditSeverity,
    pub detail: String,
}

/// an intent that has successfully cleared signature, inclusion-proof, and
/// single-use checks. Exists only as the return value of `authorize_intent`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthorizedIntent {
    pub shielded: ShieldedIntent,
    pub sig: SignedAuthorization,
    pub authorized_at: u64,
}

/// persisted state layout, restricted to this crate's slice of it
/// (pools + bitsets). The anonymity pool's slice lives in `siaac-pool`.
#[derive(Serialize, Deserialize)]
pub struct PersistedPool {
    pub merkle_root_hex: String,
    pub params: WOTSParams,
    pub total_keys: u32,
    pub owner: Option<String>,
    pub registered_at: u64,
    pub used_bitset_base64: String,
}

#[derive(Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u16,
    pub pools: Vec<PersistedPool>,
}

/// the off-chain authorization service. Each registered pool's bitset is
/// protected by its own `tokio::sync::Mutex`; the check-and-set in
/// `authorize_intent` runs inside that single critical section so two
/// concurrent submissions for the same `(root, index)` cannot both pass.
pub struct AuthorizationService {
    pools: RwLock<HashMap<String, Mutex<RegisteredPool>>>,
    audit_log: Mutex<VecDeque<AuditEvent>>,
}

impl Default for AuthorizationService {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationService {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            audit_log: Mutex::new(VecDeque::new()),
        }
    }

    async fn audit(&self, severity: AuditSeverity, detail: String) {
        if severity == AuditSeverity::Critical {
            tracing::error!(%detail, "CRITICAL audit event");
        } else {
            tracing::debug!(%detail, "audit event");
        }
        let mut log = self.audit_log.lock().await;
        if log.len() >= AUDIT_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(AuditEvent { ts: now_millis(), severity, detail });
    }

    pub async fn export_audit_log(&self) -> Vec<AuditEvent> {
        self.audit_log.lock().await.iter().cloned().collect()
    }

    /// register a new pool. Rejects a duplicate `merkle_root` outright
    /// rather than treating re-registration as idempotent.
    pub async fn register_pool(
        &self,
        merkle_root: HashDigest,
        params: WOTSParams,
        total_keys: u32,
        owner: Option<String>,
    ) -> Result<()> {
        let key = root_hex(&merkle_root);
        let mut pools = self.pools.write().await;
        if pools.contains_key(&key) {
            return Err(Error::DuplicatePool(key));
        }
        pools.insert(
            key,
            Mutex::new(RegisteredPool {
                merkle_root,
                params,
                total_keys,
                owner,
                registered_at: now_millis(),
                used_bitset: Bitset::new(total_keys),
            }),
        );
        tracing::info!(root = %root_hex(&merkle_root), total_keys, "pool registered");
        Ok(())
    }

    pub async fn pool_info(&self, merkle_root: &HashDigest) -> Result<(u32, u32)> {
        let pools = self.pools.read().await;
        let pool = pools
            .get(&root_hex(merkle_root))
            .ok_or_else(|| Error::UnknownPool(root_hex(merkle_root)))?
            .lock()
            .await;
        Ok((pool.total_keys, pool.used_keys()))
    }

    /// stateless signature + inclusion-proof verification; does not touch
    /// any pool's bitset. Used standalone by `batch_verify` and internally
    /// by `authorize_intent`.
    fn verify_signed_intent_stateless(pool: &RegisteredPool, sig: &SignedAuthorization) -> Result<()> {
        if sig.key_index >= pool.total_keys {
            return Err(Error::IndexOutOfRange { index: sig.key_index, total: pool.total_keys });
        }
        if !siaac_keypool::verify_signed_intent(sig, &pool.params, Some(pool.merkle_root)) {
            // keypool's verify_signed_intent runs WOTS verification first,
            // then the merkle proof; we can't distinguish which failed
            // without re-running each half, so re-check the signature
            // alone to report the right error category.
            if !siaac_wots::verify(&sig.signature, &sig.intent_hash, &sig.pubkey, &pool.params) {
                return Err(Error::BadSignature);
            }
            return Err(Error::BadInclusionProof);
        }
        Ok(())
    }

    /// verify `sig` against its declared pool, with no side effects.
    pub async fn verify_signed_intent(&self, sig: &SignedAuthorization) -> Result<()> {
        let pools = self.pools.read().await;
        let pool = pools
            .get(&root_hex(&sig.merkle_root))
            .ok_or_else(|| Error::UnknownPool(root_hex(&sig.merkle_root)))?
            .lock()
            .await;
        Self::verify_signed_intent_stateless(&pool, sig)
    }

    /// verify many signatures independently; no side effects regardless of
    /// outcome.
    pub async fn batch_verify(&self, sigs: &[SignedAuthorization]) -> Vec<Result<()>> {
        let mut results = Vec::with_capacity(sigs.len());
        for sig in sigs {
            results.push(self.verify_signed_intent(sig).await);
        }
        results
    }

    /// verify `shielded`/`sig` and, on success, atomically burn
    /// `sig.key_index` in the originating pool's bitset. On any failure the
    /// bitset is left untouched.
    pub async fn authorize_intent(
        &self,
        shielded: ShieldedIntent,
        sig: SignedAuthorization,
    ) -> Result<AuthorizedIntent> {
        if !siaac_hash::bytes_equal(&sig.intent_hash, &shielded.commitment_hash) {
            return Err(Error::HashMismatch);
        }

        if shielded.privacy_level == siaac_intent::PrivacyLevel::Shielded {
            let backend = siaac_pedersen::UnverifiedRangeProofBackend;
            let ok = shielded
                .range_proof
                .as_ref()
                .is_some_and(|proof| backend.verify_range(&shielded.amount_commitment, proof, siaac_pedersen::DEFAULT_RANGE_BITS));
            if !ok {
                return Err(Error::BadRangeProof);
            }
        }

        let root_key = root_hex(&sig.merkle_root);
        let pools = self.pools.read().await;
        let mut pool = pools
            .get(&root_key)
            .ok_or_else(|| Error::UnknownPool(root_key.clone()))?
            .lock()
            .await;

        // single critical section: check, verify, and set all under one
        // lock guard so no interleaving submission can observe the bit
        // unset twice.
        if pool.used_bitset.is_set(sig.key_index) {
            self.audit(
                AuditSeverity::Critical,
                format!("KeyReused root={root_key} index={}", sig.key_index),
            )
            .await;
            return Err(Error::KeyReused { root: root_key, index: sig.key_index });
        }

        Self::verify_signed_intent_stateless(&pool, &sig)?;

        pool.used_bitset.set(sig.key_index);
        drop(pool);

        tracing::debug!(root = %root_key, index = sig.key_index, "intent authorized");

        Ok(AuthorizedIntent {
            shielded,
            sig,
            authorized_at: now_millis(),
        })
    }

    /// versioned export of pool registry state. Private key
    /// material is never part of this service's state to begin with.
    pub async fn export_state(&self) -> PersistedState {
        let locked_pools = self.pools.read().await;
        let mut pools = Vec::with_capacity(locked_pools.len());
        for pool in locked_pools.values() {
            let pool = pool.lock().await;
            pools.push(PersistedPool {
                merkle_root_hex: root_hex(&pool.merkle_root),
                params: pool.params,
                total_keys: pool.total_keys,
                owner: pool.owner.clone(),
                registered_at: pool.registered_at,
                used_bitset_base64: pool.used_bitset.to_base64(),
            });
        }
        PersistedState { version: STATE_VERSION, pools }
    }

    pub fn from_state(state: PersistedState) -> Result<Self> {
        if state.version != STATE_VERSION {
            return Err(Error::StateVersionMismatch { expected: STATE_VERSION, found: state.version });
        }
        let mut pools = HashMap::with_capacity(state.pools.len());
        for p in state.pools {
            let bitset = Bitset::from_base64(&p.used_bitset_base64, p.total_keys)?;
            let mut root = [0u8; 32];
            let decoded = hex::decode(&p.merkle_root_hex).map_err(|e| Error::Serde(e.to_string()))?;
            if decoded.len() != 32 {
                return Err(Error::Serde("merkle root must be 32 bytes".to_string()));
            }
            root.copy_from_slice(&decoded);
            pools.insert(
                p.merkle_root_hex,
                Mutex::new(RegisteredPool {
                    merkle_root: root,
                    params: p.params,
                    total_keys: p.total_keys,
                    owner: p.owner,
                    registered_at: p.registered_at,
                    used_bitset: bitset,
                }),
            );
        }
        Ok(Self { pools: RwLock::new(pools), audit_log: Mutex::new(VecDeque::new()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::scalar::Scalar;
    use siaac_crypto::encrypt_intent;
    use siaac_keypool::KeyPool;
    use siaac_pedersen::{commit, RangeProofBackend, UnverifiedRangeProofBackend, DEFAULT_RANGE_BITS};

    fn shielded_for(
        commitment_hash: HashDigest,
        amount_commitment: siaac_pedersen::PedersenCommitment,
        amount: u128,
        blinding: Scalar,
    ) -> ShieldedIntent {
        let (_, recipient_pub) = {
            use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT as G;
            let sk = Scalar::random(&mut siaac_hash::csprng());
            (sk, (sk * G).compress().to_bytes())
        };
        let envelope = encrypt_intent(recipient_pub, b"payload", None).unwrap();
        let backend = UnverifiedRangeProofBackend;
        let range_proof = backend.prove_range(&amount_commitment, amount, &blinding, DEFAULT_RANGE_BITS);
        ShieldedIntent {
            encrypted_intent: envelope,
            ephemeral_pub: recipient_pub,
            commitment_hash,
            target_chain_hint: Some("eip155:1".to_string()),
            amount_commitment,
            range_proof: Some(range_proof),
            privacy_level: siaac_intent::PrivacyLevel::Shielded,
            deadline: now_millis() + 3_600_000,
        }
    }

    #[tokio::test]
    async fn register_then_authorize_happy_path() {
        let svc = AuthorizationService::new();
        let mut pool = KeyPool::create(4, 16, Some([1u8; 32])).unwrap();
        let info = pool.export_public_info();
        svc.register_pool(info.merkle_root, info.params, info.total_keys as u32, None).await.unwrap();

        let (commitment, blinding) = commit(1_000, None);
        let intent_hash: HashDigest = [9u8; 32];
        let sig = pool.sign_intent(&intent_hash).unwrap();
        let shielded = shielded_for(intent_hash, commitment, 1_000, blinding);

        let authorized = svc.authorize_intent(shielded, sig).await.unwrap();
        assert_eq!(authorized.sig.key_index, 0);

        let (total, used) = svc.pool_info(&info.merkle_root).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(used, 1);
    }

    #[tokio::test]
    async fn shielded_intent_with_no_range_proof_is_rejected() {
        let svc = AuthorizationService::new();
        let mut pool = KeyPool::create(4, 16, Some([10u8; 32])).unwrap();
        let info = pool.export_public_info();
        svc.register_pool(info.merkle_root, info.params, info.total_keys as u32, None).await.unwrap();

        let (commitment, _) = commit(1, None);
        let intent_hash: HashDigest = [11u8; 32];
        let sig = pool.sign_intent(&intent_hash).unwrap();
        let mut shielded = shielded_for(intent_hash, commitment, 1, Scalar::ZERO);
        shielded.range_proof = None;

        let err = svc.authorize_intent(shielded, sig).await.unwrap_err();
        assert_eq!(err, Error::BadRangeProof);

        let (_, used) = svc.pool_info(&info.merkle_root).await.unwrap();
        assert_eq!(used, 0);
    }

    #[tokio::test]
    async fn shielded_intent_with_wrong_width_range_proof_is_rejected() {
        let svc = AuthorizationService::new();
        let mut pool = KeyPool::create(4, 16, Some([11u8; 32])).unwrap();
        let info = pool.export_public_info();
        svc.register_pool(info.merkle_root, info.params, info.total_keys as u32, None).await.unwrap();

        let (commitment, blinding) = commit(1, None);
        let intent_hash: HashDigest = [12u8; 32];
        let sig = pool.sign_intent(&intent_hash).unwrap();
        let mut shielded = shielded_for(intent_hash, commitment, 1, blinding);
        shielded.range_proof = Some(siaac_pedersen::RangeProof::Unverified { bits: 32 });

        let err = svc.authorize_intent(shielded, sig).await.unwrap_err();
        assert_eq!(err, Error::BadRangeProof);
    }

    #[tokio::test]
    async fn replaying_the_same_signature_is_rejected_and_bitset_unchanged() {
        let svc = AuthorizationService::new();
        let mut pool = KeyPool::create(4, 16, Some([2u8; 32])).unwrap();
        let info = pool.export_public_info();
        svc.register_pool(info.merkle_root, info.params, info.total_keys as u32, None).await.unwrap();

        let (commitment, blinding) = commit(500, None);
        let intent_hash: HashDigest = [3u8; 32];
        let sig = pool.sign_intent(&intent_hash).unwrap();
        let shielded = shielded_for(intent_hash, commitment, 500, blinding);

        svc.authorize_intent(shielded.clone(), sig.clone()).await.unwrap();
        let err = svc.authorize_intent(shielded, sig).await.unwrap_err();
        assert!(matches!(err, Error::KeyReused { .. }));
        assert_eq!(err.code(), "KEY_REUSED");

        let (_, used) = svc.pool_info(&info.merkle_root).await.unwrap();
        assert_eq!(used, 1);
    }

    #[tokio::test]
    async fn hash_mismatch_between_signature_and_shielded_intent_is_rejected() {
        let svc = AuthorizationService::new();
        let mut pool = KeyPool::create(4, 16, Some([3u8; 32])).unwrap();
        let info = pool.export_public_info();
        svc.register_pool(info.merkle_root, info.params, info.total_keys as u32, None).await.unwrap();

        let (commitment, blinding) = commit(1, None);
        let sig = pool.sign_intent(&[1u8; 32]).unwrap();
        let shielded = shielded_for([2u8; 32], commitment, 1, blinding);

        let err = svc.authorize_intent(shielded, sig).await.unwrap_err();
        assert_eq!(err, Error::HashMismatch);
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected_as_bad_signature() {
        let svc = AuthorizationService::new();
        let mut pool = KeyPool::create(4, 16, Some([4u8; 32])).unwrap();
        let info = pool.export_public_info();
        svc.register_pool(info.merkle_root, info.params, info.total_keys as u32, None).await.unwrap();

        let (commitment, blinding) = commit(1, None);
        let intent_hash: HashDigest = [5u8; 32];
        let mut sig = pool.sign_intent(&intent_hash).unwrap();
        sig.signature.chunks[0][0] ^= 0x01;
        let shielded = shielded_for(intent_hash, commitment, 1, blinding);

        let err = svc.authorize_intent(shielded, sig).await.unwrap_err();
        assert_eq!(err, Error::BadSignature);
    }

    #[tokio::test]
    async fn signature_from_a_foreign_pool_root_fails_inclusion_proof() {
        let svc = AuthorizationService::new();
        let mut pool_a = KeyPool::create(4, 16, Some([5u8; 32])).unwrap();
        let mut pool_b = KeyPool::create(4, 16, Some([6u8; 32])).unwrap();
        let info_a = pool_a.export_public_info();
        svc.register_pool(info_a.merkle_root, info_a.params, info_a.total_keys as u32, None).await.unwrap();

        let intent_hash: HashDigest = [7u8; 32];
        let sig_from_b = pool_b.sign_intent(&intent_hash).unwrap();
        // claim it came from pool A's root while carrying B's proof
        let mut forged = sig_from_b;
        forged.merkle_root = info_a.merkle_root;

        let (commitment, blinding) = commit(1, None);
        let shielded = shielded_for(intent_hash, commitment, 1, blinding);

        let err = svc.authorize_intent(shielded, forged).await.unwrap_err();
        assert_eq!(err, Error::BadInclusionProof);
        let _ = pool_a.sign_intent(&[0u8; 32]); // silence unused-mut warnings in some configs
    }

    #[tokio::test]
    async fn duplicate_pool_registration_is_rejected() {
        let svc = AuthorizationService::new();
        let pool = KeyPool::create(4, 16, Some([7u8; 32])).unwrap();
        let info = pool.export_public_info();
        svc.register_pool(info.merkle_root, info.params, info.total_keys as u32, None).await.unwrap();
        let err = svc
            .register_pool(info.merkle_root, info.params, info.total_keys as u32, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicatePool(_)));
    }

    #[tokio::test]
    async fn state_export_import_round_trip_preserves_burn_state() {
        let svc = AuthorizationService::new();
        let mut pool = KeyPool::create(4, 16, Some([8u8; 32])).unwrap();
        let info = pool.export_public_info();
        svc.register_pool(info.merkle_root, info.params, info.total_keys as u32, None).await.unwrap();

        let (commitment, blinding) = commit(1, None);
        let intent_hash: HashDigest = [1u8; 32];
        let sig = pool.sign_intent(&intent_hash).unwrap();
        let shielded = shielded_for(intent_hash, commitment, 1, blinding);
        svc.authorize_intent(shielded, sig).await.unwrap();

        let state = svc.export_state().await;
        let restored = AuthorizationService::from_state(state).unwrap();
        let (total, used) = restored.pool_info(&info.merkle_root).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(used, 1);
    }

    #[tokio::test]
    async fn concurrent_authorize_on_the_same_index_only_one_succeeds() {
        use std::sync::Arc;

        let svc = AuthorizationService::new();
        let mut pool = KeyPool::create(4, 16, Some([9u8; 32])).unwrap();
        let info = pool.export_public_info();
        svc.register_pool(info.merkle_root, info.params, info.total_keys as u32, None).await.unwrap();

        let (commitment, blinding) = commit(1, None);
        let intent_hash: HashDigest = [2u8; 32];
        let sig = pool.sign_intent(&intent_hash).unwrap();
        let shielded = shielded_for(intent_hash, commitment, 1, blinding);

        let svc = Arc::new(svc);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = svc.clone();
            let sig = sig.clone();
            let shielded = shielded.clone();
            handles.push(tokio::spawn(async move { svc.authorize_intent(shielded, sig).await }));
        }

        let mut successes = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }
}
