//! shielded intent wire types
//!
//! `RawIntent` lives only inside the sender; everything that crosses a
//! boundary is a `ShieldedIntent`, whose `encrypted_intent` envelope is the
//! only thing carrying the plaintext.

mod error;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use siaac_crypto::ShieldedEnvelope;
use siaac_hash::{hash_dom, tags, HashDigest};
use siaac_pedersen::{PedersenCommitment, RangeProof};
use std::fmt;
use std::str::FromStr;

/// how much of an intent's content is visible to observers other than the
/// sender, recipient, and (for `Compliant`) the configured auditor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrivacyLevel {
    Transparent,
    Shielded,
    Compliant,
}

/// the plaintext intent as it exists only inside the sender process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIntent {
    pub id: uuid::Uuid,
    pub action: String,
    pub src_chain: String,
    pub dst_chain: String,
    pub asset: String,
    pub amount: u128,
    pub recipient: String,
    #[serde(with = "siaac_hash::encoding::hex_digest")]
    pub sender_pool_root: HashDigest,
    pub deadline: u64,
    pub data: Option<Vec<u8>>,
}

impl RawIntent {
    /// `deadline` must be strictly after `now` (both unix millis) at the
    /// moment of submission.
    pub fn validate(&self, now: u64) -> Result<()> {
        if self.deadline <= now {
            return Err(Error::DeadlineExpired { deadline: self.deadline, now });
        }
        Ok(())
    }
}

/// `H_dom("SIP_COMMITMENT", sender || recipient || amountCommitment || nonce)`
pub fn commitment_hash(sender: &[u8], recipient: &[u8], amount_commitment: &PedersenCommitment, nonce: &[u8; 32]) -> HashDigest {
    hash_dom(
        tags::SIP_COMMITMENT,
        &[sender, recipient, &amount_commitment.to_bytes(), nonce],
    )
}

/// everything that leaves the sender: an encrypted payload, an amount
/// commitment, and the commitment hash binding them together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedIntent {
    pub encrypted_intent: ShieldedEnvelope,
    #[serde(with = "siaac_hash::encoding::hex_digest")]
    pub ephemeral_pub: [u8; 32],
    #[serde(with = "siaac_hash::encoding::hex_digest")]
    pub commitment_hash: HashDigest,
    pub target_chain_hint: Option<String>,
    pub amount_commitment: PedersenCommitment,
    /// §4.5: the range-proof interface MUST be called on every `Shielded`
    /// amount commitment. `None` is only legal for `Transparent` intents,
    /// whose amount is not hidden in the first place.
    pub range_proof: Option<RangeProof>,
    pub privacy_level: PrivacyLevel,
    /// unix millis after which the aggregator must reject this intent.
    /// Carried in the clear alongside the encrypted payload: the
    /// aggregator has to enforce deadlines without decrypting, and a
    /// deadline alone reveals nothing about amount, recipient, or asset.
    pub deadline: u64,
}

/// `H_dom("NULLIFIER", secret || commitment)` — a deterministic, single-use
/// tag for a spent anonymity-pool note.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nullifier(#[serde(with = "siaac_hash::encoding::hex_digest")] pub HashDigest);

impl Nullifier {
    pub fn derive(secret: &[u8; 32], commitment: &HashDigest) -> Self {
        Self(hash_dom(tags::NULLIFIER, &[secret, commitment]))
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Nullifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidNullifierHex)?;
        let digest: HashDigest = bytes.try_into().map_err(|_| Error::InvalidNullifierHex)?;
        Ok(Self(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(deadline: u64) -> RawIntent {
        RawIntent {
            id: uuid::Uuid::new_v4(),
            action: "transfer".to_string(),
            src_chain: "eip155:1".to_string(),
            dst_chain: "eip155:10".to_string(),
            asset: "USDC".to_string(),
            amount: 1_000_000,
            recipient: "0xabc".to_string(),
            sender_pool_root: [0u8; 32],
            deadline,
            data: None,
        }
    }

    #[test]
    fn deadline_strictly_after_now_accepted() {
        assert!(intent(1_000).validate(500).is_ok());
    }

    #[test]
    fn deadline_at_or_before_now_rejected() {
        assert_eq!(intent(500).validate(500), Err(Error::DeadlineExpired { deadline: 500, now: 500 }));
        assert_eq!(intent(400).validate(500), Err(Error::DeadlineExpired { deadline: 400, now: 500 }));
    }

    #[test]
    fn commitment_hash_is_deterministic_and_input_sensitive() {
        let (commitment, _) = siaac_pedersen::commit(42, None);
        let nonce = [1u8; 32];
        let a = commitment_hash(b"sender", b"recipient", &commitment, &nonce);
        let b = commitment_hash(b"sender", b"recipient", &commitment, &nonce);
        assert_eq!(a, b);

        let c = commitment_hash(b"sender2", b"recipient", &commitment, &nonce);
        assert_ne!(a, c);
    }

    #[test]
    fn nullifier_round_trips_through_hex() {
        let n = Nullifier::derive(&[1u8; 32], &[2u8; 32]);
        let decoded: Nullifier = n.to_string().parse().unwrap();
        assert_eq!(n, decoded);
    }

    #[test]
    fn nullifier_derivation_is_deterministic_and_input_sensitive() {
        let secret = [9u8; 32];
        let commitment = [8u8; 32];
        let n1 = Nullifier::derive(&secret, &commitment);
        let n2 = Nullifier::derive(&secret, &commitment);
        assert_eq!(n1, n2);

        let n3 = Nullifier::derive(&secret, &[7u8; 32]);
        assert_ne!(n1, n3);
    }

    #[test]
    fn malformed_nullifier_hex_rejected() {
        assert_eq!("not-hex".parse::<Nullifier>(), Err(Error::InvalidNullifierHex));
    }
}
