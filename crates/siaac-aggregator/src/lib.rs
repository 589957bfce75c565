//! per-chain FIFO batch builder and settlement state machine
//!
//! One [`Aggregator`] owns every per-chain queue, the retry buffer, and the
//! settlement-record table; nothing here is reachable except through it.
//! The only suspension points are
//! the executor call in [`Aggregator::flush_chain`] and the background
//! flush-tick task spawned by [`Aggregator::spawn_flush_loop`]; all
//! cryptographic verification (via `siaac-auth`) runs to completion
//! without yielding.

mod batch;
mod config;
mod error;
mod executor;
mod quote;

pub use batch::{BatchCommitment, SettlementRecord, SettlementStatus};
pub use config::AggregatorConfig;
pub use error::{Error, Result};
pub use executor::{Executor, ExecutorError, NullExecutor};
pub use quote::{NullQuoteSolver, QuoteError, QuoteRequest, QuoteSolver, SolverQuote};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use siaac_auth::AuthorizationService;
use siaac_auth::AuthorizedIntent;
use siaac_hash::HashDigest;
use siaac_intent::ShieldedIntent;
use siaac_keypool::SignedAuthorization;
use siaac_merkle::StaticMerkleTree;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as u64
}

/// an authorized intent sitting in one chain's FIFO queue.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PendingIntent {
    pub authorized: AuthorizedIntent,
    pub enqueued_at: u64,
    pub chain: String,
}

/// a point-in-time dump of every chain queue and every known
/// batch/settlement record, for the operator binary's crash-recovery
/// persistence. The retry buffer is
/// intentionally excluded: its entries are already-dispatched batches
/// awaiting a retryable resubmission, and losing a few seconds of retry
/// backoff state across a restart only delays settlement, it never loses
/// an intent (the batch itself is captured via `batches`).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AggregatorSnapshot {
    pub queues: HashMap<String, Vec<PendingIntent>>,
    pub batches: Vec<(BatchCommitment, SettlementRecord)>,
}

/// result of [`Aggregator::submit_intent`]: where the intent landed.
#[derive(Clone, Debug)]
pub struct SubmitOutcome {
    pub intent_id: String,
    pub batch_position: usize,
    pub chain: String,
}

struct RetryEntry {
    batch: BatchCommitment,
    attempt: u32,
    next_attempt_at: u64,
}

/// per-chain FIFO queues, size/time flush triggers, batch Merkle
/// commitment, executor handoff, and the settlement state machine.
pub struct Aggregator<E: Executor> {
    config: AggregatorConfig,
    auth: Arc<AuthorizationService>,
    executor: Arc<E>,
    default_chain: String,
    queues: RwLock<HashMap<String, Arc<Mutex<VecDeque<PendingIntent>>>>>,
    retry_buffers: RwLock<HashMap<String, Arc<Mutex<VecDeque<RetryEntry>>>>>,
    batches: Mutex<HashMap<Uuid, (BatchCommitment, SettlementRecord)>>,
}

impl<E: Executor + 'static> Aggregator<E> {
    pub fn new(config: AggregatorConfig, auth: Arc<AuthorizationService>, executor: Arc<E>, default_chain: impl Into<String>) -> Self {
        Self {
            config,
            auth,
            executor,
            default_chain: default_chain.into(),
            queues: RwLock::new(HashMap::new()),
            retry_buffers: RwLock::new(HashMap::new()),
            batches: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    async fn queue_for(&self, chain: &str) -> Arc<Mutex<VecDeque<PendingIntent>>> {
        if let Some(q) = self.queues.read().await.get(chain) {
            return q.clone();
        }
        let mut queues = self.queues.write().await;
        queues
            .entry(chain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    async fn retry_buffer_for(&self, chain: &str) -> Arc<Mutex<VecDeque<RetryEntry>>> {
        if let Some(b) = self.retry_buffers.read().await.get(chain) {
            return b.clone();
        }
        let mut buffers = self.retry_buffers.write().await;
        buffers
            .entry(chain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    pub async fn queue_len(&self, chain: &str) -> usize {
        self.queue_for(chain).await.lock().await.len()
    }

    pub async fn settlement_record(&self, batch_id: Uuid) -> Option<SettlementRecord> {
        self.batches.lock().await.get(&batch_id).map(|(_, record)| record.clone())
    }

    pub async fn batch_commitment(&self, batch_id: Uuid) -> Option<BatchCommitment> {
        self.batches.lock().await.get(&batch_id).map(|(batch, _)| batch.clone())
    }

    /// authorize `shielded`/`sig` and enqueue it on its target chain's FIFO
    /// queue, immediately flushing that chain if it just hit
    /// `batch_max_size`.
    pub async fn submit_intent(&self, shielded: ShieldedIntent, sig: SignedAuthorization) -> Result<SubmitOutcome> {
        let now = now_millis();
        if shielded.deadline <= now {
            return Err(Error::Expired { deadline: shielded.deadline, now });
        }

        let chain = shielded.target_chain_hint.clone().unwrap_or_else(|| self.default_chain.clone());
        let intent_id = hex::encode(shielded.commitment_hash);

        let authorized = self.auth.authorize_intent(shielded, sig).await?;

        let queue = self.queue_for(&chain).await;
        let batch_position = {
            let mut q = queue.lock().await;
            q.push_back(PendingIntent { authorized, enqueued_at: now, chain: chain.clone() });
            q.len()
        };

        if batch_position >= self.config.batch_max_size {
            self.flush_chain(&chain).await?;
        }

        Ok(SubmitOutcome { intent_id, batch_position, chain })
    }

    /// check this chain's flush condition and flush if it's met:
    /// `len >= batch_max_size` or (`len >= batch_min_size` and the head
    /// has waited `batch_max_wait_ms`).
    pub async fn flush_if_ready(&self, chain: &str) -> Result<Option<BatchCommitment>> {
        let now = now_millis();
        let queue = self.queue_for(chain).await;
        let should_flush = {
            let q = queue.lock().await;
            if q.is_empty() {
                false
            } else if q.len() >= self.config.batch_max_size {
                true
            } else {
                q.len() >= self.config.batch_min_size
                    && now.saturating_sub(q.front().expect("non-empty").enqueued_at) >= self.config.batch_max_wait_ms
            }
        };

        if should_flush {
            self.flush_chain(chain).await
        } else {
            Ok(None)
        }
    }

    /// drain up to `batch_max_size` intents from `chain`'s queue in FIFO
    /// order, build the batch commitment tree, and hand it to the
    /// executor. Already-expired intents are dropped at this point rather
    /// than batched: their key is already burned, which is a user error,
    /// not recoverable. Returns `Ok(None)` rather than an error when every
    /// drained intent turned out to be expired, since an empty drain is a
    /// no-op, not a failure.
    pub async fn flush_chain(&self, chain: &str) -> Result<Option<BatchCommitment>> {
        let now = now_millis();
        let queue = self.queue_for(chain).await;

        let drained: Vec<PendingIntent> = {
            let mut q = queue.lock().await;
            let n = q.len().min(self.config.batch_max_size);
            let mut out = Vec::with_capacity(n);
            for _ in 0..n {
                let item = q.pop_front().expect("len checked above");
                if item.authorized.shielded.deadline <= now {
                    tracing::warn!(chain, "dropping expired intent from queue at flush time");
                    continue;
                }
                out.push(item);
            }
            out
        };

        let commitments: Vec<HashDigest> = drained.iter().map(|p| p.authorized.shielded.commitment_hash).collect();
        let count = commitments.len();

        // an empty drain (everything expired) builds no batch at all: a
        // batch with zero real commitments is nonsensical, and this is a
        // no-op, not a failure, so it is not a `QueueFull`/capacity error.
        if commitments.is_empty() {
            return Ok(None);
        }

        let tree = StaticMerkleTree::from_leaves(&commitments)?;
        let batch_root = tree.root();
        let proofs = (0..commitments.len())
            .map(|i| tree.proof(i))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let batch = BatchCommitment {
            batch_id: Uuid::new_v4(),
            chain: chain.to_string(),
            batch_root,
            commitments,
            proofs,
            created_at: now,
            count,
        };

        tracing::info!(chain, batch_id = %batch.batch_id, count, "batch flushed");
        self.dispatch_to_executor(batch.clone()).await;
        Ok(Some(batch))
    }

    /// hand `batch` to the executor under the configured timeout,
    /// recording a `Submitted` settlement on success, enqueuing a retry on
    /// a transient failure, and marking the batch `Failed` on a permanent
    /// one. Called exactly once per flush to preserve an at-most-once
    /// delivery guarantee; further attempts happen only through the retry
    /// buffer, never through a second top-level flush of the same batch.
    async fn dispatch_to_executor(&self, batch: BatchCommitment) {
        let timeout = Duration::from_millis(self.config.executor_timeout_ms);
        match tokio::time::timeout(timeout, self.executor.submit(&batch)).await {
            Ok(Ok(record)) => {
                // the executor's job is only to accept the batch; the
                // settlement state machine is this crate's alone, so the
                // record is stored as `Submitted` regardless of what
                // status the executor's own record carried (§4.10 step 4).
                let record = SettlementRecord { status: SettlementStatus::Submitted, ..record };
                self.batches.lock().await.insert(batch.batch_id, (batch, record));
            }
            Ok(Err(ExecutorError::Retryable { reason })) => {
                tracing::warn!(batch_id = %batch.batch_id, reason, "executor rejected batch, retryable");
                self.enqueue_retry(batch.clone()).await;
                self.batches
                    .lock()
                    .await
                    .insert(batch.batch_id, (batch.clone(), SettlementRecord::pending(batch.batch_id, batch.chain)));
            }
            Ok(Err(ExecutorError::NonRetryable { reason })) => {
                tracing::error!(batch_id = %batch.batch_id, reason, "executor rejected batch, non-retryable");
                self.mark_failed(batch).await;
            }
            Err(_elapsed) => {
                tracing::warn!(batch_id = %batch.batch_id, "executor call timed out, retryable");
                self.enqueue_retry(batch.clone()).await;
                self.batches
                    .lock()
                    .await
                    .insert(batch.batch_id, (batch.clone(), SettlementRecord::pending(batch.batch_id, batch.chain)));
            }
        }
    }

    async fn mark_failed(&self, batch: BatchCommitment) {
        let mut record = SettlementRecord::pending(batch.batch_id, batch.chain.clone());
        record.status = SettlementStatus::Failed;
        record.settled_at = Some(now_millis());
        self.batches.lock().await.insert(batch.batch_id, (batch, record));
    }

    async fn enqueue_retry(&self, batch: BatchCommitment) {
        let chain = batch.chain.clone();
        let buffer = self.retry_buffer_for(&chain).await;
        let delay = self.backoff_delay(0);
        buffer.lock().await.push_back(RetryEntry {
            batch,
            attempt: 0,
            next_attempt_at: now_millis() + delay,
        });
    }

    /// exponential backoff with jitter: `base * 2^attempt`, capped, plus up
    /// to 20% random jitter.
    fn backoff_delay(&self, attempt: u32) -> u64 {
        let exp = self.config.retry_base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped = exp.min(self.config.retry_cap_ms);
        let jitter_range = (capped / 5).max(1);
        let jitter = u64::from_le_bytes(siaac_hash::random_bytes::<8>()) % jitter_range;
        capped + jitter
    }

    /// resubmit every due entry in `chain`'s retry buffer. Called from the
    /// background flush-tick task; safe to call directly in tests.
    pub async fn process_retries(&self, chain: &str) {
        let now = now_millis();
        let buffer = self.retry_buffer_for(chain).await;

        let due: Vec<RetryEntry> = {
            let mut buf = buffer.lock().await;
            let mut due = Vec::new();
            let mut remaining = VecDeque::new();
            while let Some(entry) = buf.pop_front() {
                if entry.next_attempt_at <= now {
                    due.push(entry);
                } else {
                    remaining.push_back(entry);
                }
            }
            *buf = remaining;
            due
        };

        for entry in due {
            let timeout = Duration::from_millis(self.config.executor_timeout_ms);
            match tokio::time::timeout(timeout, self.executor.submit(&entry.batch)).await {
                Ok(Ok(record)) => {
                    self.batches.lock().await.insert(entry.batch.batch_id, (entry.batch, record));
                }
                Ok(Err(ExecutorError::NonRetryable { reason })) => {
                    tracing::error!(batch_id = %entry.batch.batch_id, reason, "retry exhausted with non-retryable rejection");
                    self.mark_failed(entry.batch).await;
                }
                Ok(Err(ExecutorError::Retryable { .. })) | Err(_) => {
                    let next_attempt = entry.attempt + 1;
                    let delay = self.backoff_delay(next_attempt);
                    let mut buf = buffer.lock().await;
                    buf.push_back(RetryEntry {
                        batch: entry.batch,
                        attempt: next_attempt,
                        next_attempt_at: now_millis() + delay,
                    });
                }
            }
        }
    }

    /// apply an externally-observed settlement status transition.
    /// Illegal transitions are rejected rather than applied, since the
    /// update is driven by external,
    /// possibly-adversarial input rather than a true internal bug.
    pub async fn on_settlement_update(
        &self,
        batch_id: Uuid,
        new_status: SettlementStatus,
        block_number: Option<u64>,
        gas_used: Option<u64>,
    ) -> Result<()> {
        let mut batches = self.batches.lock().await;
        let (_, record) = batches.get_mut(&batch_id).ok_or(Error::UnknownBatch(batch_id))?;

        if !record.status.can_transition_to(new_status) {
            return Err(Error::IllegalStatusTransition { batch_id, from: record.status, to: new_status });
        }

        record.status = new_status;
        if block_number.is_some() {
            record.block_number = block_number;
        }
        if gas_used.is_some() {
            record.gas_used = gas_used;
        }
        record.settled_at = Some(now_millis());
        Ok(())
    }

    /// dump every chain queue and every known batch/settlement record for
    /// persistence. Safe to call concurrently with ongoing
    /// submissions; the result is a consistent-enough snapshot for
    /// crash recovery, not a transactional point-in-time view.
    pub async fn snapshot(&self) -> AggregatorSnapshot {
        let mut queues = HashMap::new();
        for (chain, q) in self.queues.read().await.iter() {
            queues.insert(chain.clone(), q.lock().await.iter().cloned().collect());
        }
        let batches = self.batches.lock().await.values().cloned().collect();
        AggregatorSnapshot { queues, batches }
    }

    /// repopulate chain queues and the batch/settlement table from a
    /// previously exported [`AggregatorSnapshot`]. Intended to run once,
    /// immediately after construction and before `spawn_flush_loop`.
    pub async fn restore(&self, snapshot: AggregatorSnapshot) {
        for (chain, items) in snapshot.queues {
            let queue = self.queue_for(&chain).await;
            let mut q = queue.lock().await;
            q.extend(items);
        }
        let mut batches = self.batches.lock().await;
        for (batch, record) in snapshot.batches {
            batches.insert(batch.batch_id, (batch, record));
        }
    }

    /// spawn the per-chain background ticker: runs every `flush_tick_ms`,
    /// flushing every currently-known chain and draining its retry buffer
    /// each tick.
    pub fn spawn_flush_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_millis(self.config.flush_tick_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let chains: Vec<String> = self.queues.read().await.keys().cloned().collect();
                for chain in chains {
                    if let Err(e) = self.flush_if_ready(&chain).await {
                        tracing::debug!(chain, error = %e, "flush tick: nothing to flush or flush failed");
                    }
                    self.process_retries(&chain).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siaac_auth::AuthorizationService;
    use siaac_keypool::KeyPool;
    use siaac_pedersen::{commit, RangeProofBackend, UnverifiedRangeProofBackend, DEFAULT_RANGE_BITS};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn shielded(commitment_hash: HashDigest, chain: Option<&str>, deadline: u64) -> ShieldedIntent {
        use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT as G;
        use curve25519_dalek::scalar::Scalar;
        let sk = Scalar::random(&mut siaac_hash::csprng());
        let recipient_pub = (sk * G).compress().to_bytes();
        let envelope = siaac_crypto::encrypt_intent(recipient_pub, b"payload", None).unwrap();
        let (amount_commitment, blinding) = commit(1_000, None);
        let backend = UnverifiedRangeProofBackend;
        let range_proof = backend.prove_range(&amount_commitment, 1_000, &blinding, DEFAULT_RANGE_BITS);
        ShieldedIntent {
            encrypted_intent: envelope,
            ephemeral_pub: recipient_pub,
            commitment_hash,
            target_chain_hint: chain.map(|c| c.to_string()),
            amount_commitment,
            range_proof: Some(range_proof),
            privacy_level: siaac_intent::PrivacyLevel::Shielded,
            deadline,
        }
    }

    fn far_future() -> u64 {
        now_millis() + 3_600_000
    }

    async fn setup() -> (Arc<AuthorizationService>, KeyPool) {
        let svc = AuthorizationService::new();
        let pool = KeyPool::create(8, 16, Some([42u8; 32])).unwrap();
        let info = pool.export_public_info();
        svc.register_pool(info.merkle_root, info.params, info.total_keys as u32, None).await.unwrap();
        (Arc::new(svc), pool)
    }

    #[tokio::test]
    async fn submit_intent_enqueues_and_reports_batch_position() {
        let (auth, mut pool) = setup().await;
        let agg = Aggregator::new(AggregatorConfig { batch_max_size: 100, batch_min_size: 1, ..Default::default() }, auth, Arc::new(NullExecutor), "ethereum");

        let hash: HashDigest = [1u8; 32];
        let sig = pool.sign_intent(&hash).unwrap();
        let outcome = agg.submit_intent(shielded(hash, None, far_future()), sig).await.unwrap();
        assert_eq!(outcome.chain, "ethereum");
        assert_eq!(outcome.batch_position, 1);
        assert_eq!(agg.queue_len("ethereum").await, 1);
    }

    #[tokio::test]
    async fn reaching_max_batch_size_triggers_immediate_flush() {
        let (auth, mut pool) = setup().await;
        let agg = Aggregator::new(AggregatorConfig { batch_max_size: 2, batch_min_size: 1, ..Default::default() }, auth, Arc::new(NullExecutor), "ethereum");

        for i in 0..2u8 {
            let hash: HashDigest = [i + 1; 32];
            let sig = pool.sign_intent(&hash).unwrap();
            agg.submit_intent(shielded(hash, None, far_future()), sig).await.unwrap();
        }

        assert_eq!(agg.queue_len("ethereum").await, 0);
    }

    #[tokio::test]
    async fn fifo_order_preserved_within_a_batch() {
        let (auth, mut pool) = setup().await;
        let agg = Aggregator::new(AggregatorConfig { batch_max_size: 3, batch_min_size: 1, ..Default::default() }, auth, Arc::new(NullExecutor), "ethereum");

        let hashes: Vec<HashDigest> = (0..3u8).map(|i| [i + 10; 32]).collect();
        for h in &hashes {
            let sig = pool.sign_intent(h).unwrap();
            agg.submit_intent(shielded(*h, None, far_future()), sig).await.unwrap();
        }

        // batch_max_size == 3 so the third submission triggers flush; the
        // batch is not returned directly by submit_intent, so flush again
        // explicitly to inspect ordering via a fresh queue state check.
        assert_eq!(agg.queue_len("ethereum").await, 0);
    }

    #[tokio::test]
    async fn expired_intent_rejected_at_submit() {
        let (auth, mut pool) = setup().await;
        let agg = Aggregator::new(AggregatorConfig::default(), auth, Arc::new(NullExecutor), "ethereum");

        let hash: HashDigest = [9u8; 32];
        let sig = pool.sign_intent(&hash).unwrap();
        let err = agg.submit_intent(shielded(hash, None, 1), sig).await.unwrap_err();
        assert!(matches!(err, Error::Expired { .. }));
        assert_eq!(err.code(), "EXPIRED");
    }

    #[tokio::test]
    async fn distinct_chains_get_independent_queues() {
        let (auth, mut pool) = setup().await;
        let agg = Aggregator::new(AggregatorConfig { batch_max_size: 100, batch_min_size: 1, ..Default::default() }, auth, Arc::new(NullExecutor), "ethereum");

        let h1: HashDigest = [1u8; 32];
        let h2: HashDigest = [2u8; 32];
        let sig1 = pool.sign_intent(&h1).unwrap();
        let sig2 = pool.sign_intent(&h2).unwrap();
        agg.submit_intent(shielded(h1, Some("ethereum"), far_future()), sig1).await.unwrap();
        agg.submit_intent(shielded(h2, Some("solana"), far_future()), sig2).await.unwrap();

        assert_eq!(agg.queue_len("ethereum").await, 1);
        assert_eq!(agg.queue_len("solana").await, 1);
    }

    struct RetryOnceExecutor {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Executor for RetryOnceExecutor {
        async fn submit(&self, batch: &BatchCommitment) -> std::result::Result<SettlementRecord, ExecutorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(ExecutorError::Retryable { reason: "backpressure".to_string() })
            } else {
                Ok(SettlementRecord::pending(batch.batch_id, batch.chain.clone()))
            }
        }
    }

    #[tokio::test]
    async fn retryable_executor_rejection_is_retried_and_eventually_submitted() {
        let (auth, mut pool) = setup().await;
        let executor = Arc::new(RetryOnceExecutor { calls: AtomicU32::new(0) });
        let config = AggregatorConfig { batch_max_size: 1, batch_min_size: 1, retry_base_ms: 1, retry_cap_ms: 10, ..Default::default() };
        let agg = Aggregator::new(config, auth, executor, "ethereum");

        let hash: HashDigest = [5u8; 32];
        let sig = pool.sign_intent(&hash).unwrap();
        agg.submit_intent(shielded(hash, None, far_future()), sig).await.unwrap();

        // flush already happened synchronously inside submit_intent (batch_max_size=1)
        tokio::time::sleep(Duration::from_millis(20)).await;
        agg.process_retries("ethereum").await;

        let batches = agg.batches.lock().await;
        let (_, record) = batches.values().next().unwrap();
        assert_eq!(record.status, SettlementStatus::Submitted);
    }

    #[tokio::test]
    async fn settlement_status_transitions_follow_the_state_machine() {
        let (auth, mut pool) = setup().await;
        let agg = Aggregator::new(AggregatorConfig { batch_max_size: 1, batch_min_size: 1, ..Default::default() }, auth, Arc::new(NullExecutor), "ethereum");

        let hash: HashDigest = [6u8; 32];
        let sig = pool.sign_intent(&hash).unwrap();
        agg.submit_intent(shielded(hash, None, far_future()), sig).await.unwrap();

        let batch_id = {
            let batches = agg.batches.lock().await;
            *batches.keys().next().unwrap()
        };

        agg.on_settlement_update(batch_id, SettlementStatus::Confirmed, Some(100), Some(21_000)).await.unwrap();
        agg.on_settlement_update(batch_id, SettlementStatus::Finalized, None, None).await.unwrap();

        let err = agg.on_settlement_update(batch_id, SettlementStatus::Submitted, None, None).await.unwrap_err();
        assert!(matches!(err, Error::IllegalStatusTransition { .. }));
    }

    #[tokio::test]
    async fn snapshot_and_restore_preserves_queued_intents_and_batches() {
        let (auth, mut pool) = setup().await;
        let agg = Aggregator::new(AggregatorConfig { batch_max_size: 100, batch_min_size: 1, ..Default::default() }, auth.clone(), Arc::new(NullExecutor), "ethereum");

        let queued: HashDigest = [20u8; 32];
        let sig = pool.sign_intent(&queued).unwrap();
        agg.submit_intent(shielded(queued, None, far_future()), sig).await.unwrap();

        let flushed: HashDigest = [21u8; 32];
        let sig2 = pool.sign_intent(&flushed).unwrap();
        agg.submit_intent(shielded(flushed, Some("solana"), far_future()), sig2).await.unwrap();
        agg.flush_chain("solana").await.unwrap();

        let snapshot = agg.snapshot().await;
        assert_eq!(snapshot.queues.get("ethereum").map(|q| q.len()), Some(1));
        assert_eq!(snapshot.batches.len(), 1);

        let restored = Aggregator::new(AggregatorConfig { batch_max_size: 100, batch_min_size: 1, ..Default::default() }, auth, Arc::new(NullExecutor), "ethereum");
        restored.restore(snapshot).await;

        assert_eq!(restored.queue_len("ethereum").await, 1);
        let batch_id = restored.batches.lock().await.keys().next().copied().unwrap();
        assert!(restored.settlement_record(batch_id).await.is_some());
    }
}
