//! WOTS+ key pool and key manager
//!
//! Binds up to `2^k` one-time WOTS+ keys under one Merkle root, hands out
//! signatures one key at a time, and burns (zeroizes) each private key the
//! moment it signs. `RegisteredPool.usedBitset` on the authorization
//! service is the authoritative replay guard; the `used` flag here is a
//! local, advisory mirror of it.

mod error;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use siaac_hash::HashDigest;
use siaac_merkle::{MerkleProof, StaticMerkleTree};
use siaac_wots::{WOTSParams, WOTSPrivateKey, WOTSPublicKey, WOTSSignature};
use uuid::Uuid;

/// hard ceiling on pool size; `create` rejects anything that would round
/// up past this rather than silently truncating a caller's request.
pub const MAX_KEYS: usize = 1 << 20;

fn next_pow2_capped(n: usize) -> Result<usize> {
    let rounded = n.max(1).next_power_of_two();
    if rounded > MAX_KEYS {
        return Err(Error::KeyCountTooLarge { requested: n, cap: MAX_KEYS });
    }
    Ok(rounded)
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as u64
}

/// a one-time signature bound to its position in a key pool's Merkle tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAuthorization {
    #[serde(with = "siaac_hash::encoding::hex_digest")]
    pub intent_hash: HashDigest,
    pub key_index: u32,
    pub signature: WOTSSignature,
    pub pubkey: WOTSPublicKey,
    pub merkle_proof: MerkleProof,
    #[serde(with = "siaac_hash::encoding::hex_digest")]
    pub merkle_root: HashDigest,
}

/// public, burn-state view of one pool slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPoolEntry {
    pub index: u32,
    pub pubkey: WOTSPublicKey,
    #[serde(with = "siaac_hash::encoding::hex_digest")]
    pub pubkey_hash: HashDigest,
    pub used: bool,
    pub used_at: Option<u64>,
    #[serde(default, with = "hex_digest_option")]
    pub used_for: Option<HashDigest>,
}

/// `export_public_info()` result — safe to hand to anything that isn't the
/// pool's owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPoolPublicInfo {
    pub id: Uuid,
    #[serde(with = "siaac_hash::encoding::hex_digest")]
    pub merkle_root: HashDigest,
    pub total_keys: usize,
    pub used_keys: usize,
    pub params: WOTSParams,
}

mod hex_digest_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use siaac_hash::HashDigest;

    pub fn serialize<S: Serializer>(value: &Option<HashDigest>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<HashDigest>, D::Error> {
        let opt = Option::<String>::deserialize(d)?;
        opt.map(|s| {
            let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
            bytes.try_into().map_err(|_| serde::de::Error::custom("expected 32 bytes"))
        })
        .transpose()
    }
}

/// full pool serialization, private key material included. Callers own
/// protecting this at rest; it is never produced implicitly.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyPoolState {
    pub id: Uuid,
    pub params: WOTSParams,
    pub next_free_index_hint: usize,
    pub entries: Vec<KeyPoolEntry>,
    /// `None` at index `i` once that key has signed and been zeroized.
    pub private_keys: Vec<Option<WOTSPrivateKey>>,
}

/// binds up to `2^k` WOTS+ keys under one immutable Merkle root.
pub struct KeyPool {
    id: Uuid,
    params: WOTSParams,
    merkle_root: HashDigest,
    tree: StaticMerkleTree,
    next_free_index_hint: usize,
    used_keys: usize,
    entries: Vec<KeyPoolEntry>,
    private_keys: Vec<Option<WOTSPrivateKey>>,
}

impl KeyPool {
    /// `key_count` is rounded up to the next power of two (capped at
    /// [`MAX_KEYS`]). Keys are derived from `seed` (deterministic HD
    /// derivation) when given, otherwise drawn from the OS CSPRNG.
    pub fn create(key_count: usize, w: u32, seed: Option<[u8; 32]>) -> Result<Self> {
        let params = WOTSParams::new(w, 32)?;
        let total_keys = next_pow2_capped(key_count)?;

        let private_keys: Vec<WOTSPrivateKey> = (0..total_keys as u32)
            .map(|i| match seed {
                Some(seed) => siaac_wots::derive_private_key(&params, &seed, i),
                None => siaac_wots::generate_private_key(&params),
            })
            .collect();

        let pubkeys: Vec<WOTSPublicKey> = private_keys
            .iter()
            .map(|sk| siaac_wots::public_key(sk, &params))
            .collect();
        let pubkey_hashes: Vec<HashDigest> = pubkeys.iter().map(siaac_wots::hash_public_key).collect();

        let tree = StaticMerkleTree::from_leaves(&pubkey_hashes)?;
        let merkle_root = tree.root();

        let entries = pubkeys
            .iter()
            .zip(pubkey_hashes.iter())
            .enumerate()
            .map(|(i, (pubkey, pubkey_hash))| KeyPoolEntry {
                index: i as u32,
                pubkey: pubkey.clone(),
                pubkey_hash: *pubkey_hash,
                used: false,
                used_at: None,
                used_for: None,
            })
            .collect();

        tracing::info!(total_keys, w, "key pool created");

        Ok(Self {
            id: Uuid::new_v4(),
            params,
            merkle_root,
            tree,
            next_free_index_hint: 0,
            used_keys: 0,
            entries,
            private_keys: private_keys.into_iter().map(Some).collect(),
        })
    }

    pub fn total_keys(&self) -> usize {
        self.entries.len()
    }

    pub fn used_keys(&self) -> usize {
        self.used_keys
    }

    pub fn merkle_root(&self) -> HashDigest {
        self.merkle_root
    }

    pub fn params(&self) -> &WOTSParams {
        &self.params
    }

    pub fn entry(&self, index: usize) -> Option<&KeyPoolEntry> {
        self.entries.get(index)
    }

    /// sign with the smallest unused index at or after `next_free_index_hint`.
    pub fn sign_intent(&mut self, intent_hash: &HashDigest) -> Result<SignedAuthorization> {
        let index = (self.next_free_index_hint..self.entries.len())
            .find(|&i| !self.entries[i].used)
            .ok_or(Error::NoKeysAvailable { from: self.next_free_index_hint })?;

        let signed = self.burn_and_sign(index, intent_hash)?;
        self.next_free_index_hint = index + 1;
        Ok(signed)
    }

    /// sign with a caller-chosen index; rejects an already-used index
    /// regardless of `next_free_index_hint`.
    pub fn sign_with_key(&mut self, index: usize, intent_hash: &HashDigest) -> Result<SignedAuthorization> {
        self.burn_and_sign(index, intent_hash)
    }

    fn burn_and_sign(&mut self, index: usize, intent_hash: &HashDigest) -> Result<SignedAuthorization> {
        let total = self.entries.len();
        if index >= total {
            return Err(Error::IndexOutOfRange { index, total });
        }
        if self.entries[index].used {
            return Err(Error::KeyAlreadyUsed { index });
        }

        // taking the Option leaves None behind; the key drops (and zeroizes)
        // at the end of this call regardless of how sign() uses it.
        let sk = self.private_keys[index]
            .take()
            .ok_or(Error::KeyAlreadyUsed { index })?;
        let signature = siaac_wots::sign(&sk, intent_hash, &self.params);
        let proof = self.tree.proof(index)?;

        let entry = &mut self.entries[index];
        entry.used = true;
        entry.used_at = Some(now_millis());
        entry.used_for = Some(*intent_hash);
        self.used_keys += 1;

        tracing::debug!(index, "key burned");

        Ok(SignedAuthorization {
            intent_hash: *intent_hash,
            key_index: index as u32,
            signature,
            pubkey: entry.pubkey.clone(),
            merkle_proof: proof,
            merkle_root: self.merkle_root,
        })
    }

    /// verify `sig` against this pool's own root.
    pub fn verify_signed_intent(&self, sig: &SignedAuthorization) -> bool {
        verify_signed_intent(sig, &self.params, Some(self.merkle_root))
    }

    /// safe-to-share summary: no private key material.
    pub fn export_public_info(&self) -> KeyPoolPublicInfo {
        KeyPoolPublicInfo {
            id: self.id,
            merkle_root: self.merkle_root,
            total_keys: self.entries.len(),
            used_keys: self.used_keys,
            params: self.params,
        }
    }

    /// full state including any still-live private key material.
    pub fn export_state(&self) -> KeyPoolState {
        KeyPoolState {
            id: self.id,
            params: self.params,
            next_free_index_hint: self.next_free_index_hint,
            entries: self.entries.clone(),
            private_keys: self.private_keys.clone(),
        }
    }

    /// rebuild a pool from a previously exported state. The Merkle tree is
    /// recomputed from the entries' `pubkey_hash`, not trusted verbatim.
    pub fn from_state(state: KeyPoolState) -> Result<Self> {
        let pubkey_hashes: Vec<HashDigest> = state.entries.iter().map(|e| e.pubkey_hash).collect();
        let tree = StaticMerkleTree::from_leaves(&pubkey_hashes)?;
        let merkle_root = tree.root();
        let used_keys = state.entries.iter().filter(|e| e.used).count();

        Ok(Self {
            id: state.id,
            params: state.params,
            merkle_root,
            tree,
            next_free_index_hint: state.next_free_index_hint,
            used_keys,
            entries: state.entries,
            private_keys: state.private_keys,
        })
    }
}

/// verify `sig`'s WOTS+ signature and Merkle inclusion proof. Verification
/// is stateless: it never consults any pool's `used` bitset, which is the
/// authorization service's job.
pub fn verify_signed_intent(sig: &SignedAuthorization, params: &WOTSParams, expected_root: Option<HashDigest>) -> bool {
    let root = expected_root.unwrap_or(sig.merkle_root);
    if !siaac_wots::verify(&sig.signature, &sig.intent_hash, &sig.pubkey, params) {
        return false;
    }
    let leaf = siaac_wots::hash_public_key(&sig.pubkey);
    siaac_merkle::verify(&sig.merkle_proof, &leaf, &root)
}
