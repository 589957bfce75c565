//! WOTS+ one-time signature scheme
//!
//! Signing the same private key under two different messages leaks the
//! key; nothing in this crate prevents that — the key pool (`siaac-keypool`)
//! is responsible for burning a key after its first signature.

mod basew;
mod error;
mod params;

pub use error::{Error, Result};
pub use params::WOTSParams;

use siaac_hash::{be32, hash_dom, tags, HashDigest};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// secret chain-start values; zeroized on drop so a burned key's material
/// does not linger in memory.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WOTSPrivateKey {
    chunks: Vec<[u8; 32]>,
}

impl WOTSPrivateKey {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// chain-end values; safe to share and persist.
///
/// On the wire (`feature = "serde"`), `chunks` is a single base64 string —
/// every chunk concatenated then encoded as one blob — matching §6.5's
/// `publicKeyBase64`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WOTSPublicKey {
    #[cfg_attr(feature = "serde", serde(with = "siaac_hash::encoding::base64_chunks"))]
    pub chunks: Vec<[u8; 32]>,
}

/// a one-time signature over a single 32-byte message digest.
///
/// On the wire, `chunks` is a single base64 string, matching §6.5's
/// `signatureBase64`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WOTSSignature {
    #[cfg_attr(feature = "serde", serde(with = "siaac_hash::encoding::base64_chunks"))]
    pub chunks: Vec<[u8; 32]>,
}

/// apply the WOTS+ chain function `steps` times starting from position
/// `start`, hashing under chain index `chain_index` with the fixed
/// `CHAIN_STEP` domain tag.
pub fn chain(x: [u8; 32], start: u32, steps: u32, chain_index: u32) -> [u8; 32] {
    let mut current = x;
    for pos in start..start + steps {
        current = hash_dom(
            tags::CHAIN_STEP,
            &[&be32(chain_index), &be32(pos), &current],
        );
    }
    current
}

/// generate `params.len` uniformly random private-key chunks.
pub fn generate_private_key(params: &WOTSParams) -> WOTSPrivateKey {
    let chunks = (0..params.len).map(|_| siaac_hash::random_bytes::<32>()).collect();
    WOTSPrivateKey { chunks }
}

/// deterministically derive the private key for `index` from `seed`, per
/// `chunk_i = H_dom("WOTS_SK", seed || BE32(index) || BE32(i))`.
pub fn derive_private_key(params: &WOTSParams, seed: &[u8; 32], index: u32) -> WOTSPrivateKey {
    let chunks = (0..params.len as u32)
        .map(|i| hash_dom(tags::WOTS_SK, &[seed, &be32(index), &be32(i)]))
        .collect();
    WOTSPrivateKey { chunks }
}

/// derive the public key by running each chain to its end (`w-1` steps).
pub fn public_key(sk: &WOTSPrivateKey, params: &WOTSParams) -> WOTSPublicKey {
    let chunks = sk
        .chunks
        .iter()
        .enumerate()
        .map(|(i, x)| chain(*x, 0, params.w - 1, i as u32))
        .collect();
    WOTSPublicKey { chunks }
}

/// sign a 32-byte message digest, consuming the chain positions dictated
/// by the message's base-`w` digits plus checksum.
pub fn sign(sk: &WOTSPrivateKey, msg: &HashDigest, params: &WOTSParams) -> WOTSSignature {
    let digits = basew::message_digits(msg, params);
    debug_assert_eq!(digits.len(), sk.len());

    let chunks = sk
        .chunks
        .iter()
        .zip(digits.iter())
        .enumerate()
        .map(|(i, (x, &d))| chain(*x, 0, d as u32, i as u32))
        .collect();

    WOTSSignature { chunks }
}

/// recover the candidate public key implied by `sig` and `msg` by running
/// each chain forward from the signed position to `w-1`.
pub fn recover_public_key(sig: &WOTSSignature, msg: &HashDigest, params: &WOTSParams) -> WOTSPublicKey {
    let digits = basew::message_digits(msg, params);
    debug_assert_eq!(digits.len(), sig.chunks.len());

    let chunks = sig
        .chunks
        .iter()
        .zip(digits.iter())
        .enumerate()
        .map(|(i, (x, &d))| chain(*x, d as u32, params.w - 1 - d as u32, i as u32))
        .collect();

    WOTSPublicKey { chunks }
}

/// verify `sig` over `msg` against `expected_pk` in constant time.
pub fn verify(sig: &WOTSSignature, msg: &HashDigest, expected_pk: &WOTSPublicKey, params: &WOTSParams) -> bool {
    if sig.chunks.len() != params.len || expected_pk.chunks.len() != params.len {
        return false;
    }
    let recovered = recover_public_key(sig, msg, params);
    siaac_hash::bytes_equal(&recovered.to_bytes(), &expected_pk.to_bytes())
}

/// `H_dom("WOTS_PK", concat(pk chunks))`
pub fn hash_public_key(pk: &WOTSPublicKey) -> HashDigest {
    let bytes = pk.to_bytes();
    hash_dom(tags::WOTS_PK, &[&bytes])
}

impl WOTSPublicKey {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.chunks.iter().flatten().copied().collect()
    }

    pub fn from_bytes(bytes: &[u8], params: &WOTSParams) -> Result<Self> {
        let expected_len = params.len * params.n;
        if bytes.len() != expected_len {
            return Err(Error::WrongByteLength { expected: expected_len, got: bytes.len() });
        }
        let chunks = bytes
            .chunks_exact(params.n)
            .map(|c| {
                let mut buf = [0u8; 32];
                buf.copy_from_slice(c);
                buf
            })
            .collect();
        Ok(Self { chunks })
    }
}

impl WOTSSignature {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.chunks.iter().flatten().copied().collect()
    }

    pub fn from_bytes(bytes: &[u8], params: &WOTSParams) -> Result<Self> {
        let expected_len = params.len * params.n;
        if bytes.len() != expected_len {
            return Err(Error::WrongByteLength { expected: expected_len, got: bytes.len() });
        }
        let chunks = bytes
            .chunks_exact(params.n)
            .map(|c| {
                let mut buf = [0u8; 32];
                buf.copy_from_slice(c);
                buf
            })
            .collect();
        Ok(Self { chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(byte: u8) -> HashDigest {
        [byte; 32]
    }

    #[test]
    fn round_trip_sign_verify() {
        let params = WOTSParams::standard();
        let sk = generate_private_key(&params);
        let pk = public_key(&sk, &params);
        let m = msg(0x11);
        let sig = sign(&sk, &m, &params);
        assert!(verify(&sig, &m, &pk, &params));
    }

    #[test]
    fn corrupting_one_byte_breaks_recovery() {
        let params = WOTSParams::standard();
        let sk = generate_private_key(&params);
        let pk = public_key(&sk, &params);
        let m = msg(0x22);
        let mut sig = sign(&sk, &m, &params);
        sig.chunks[7][0] ^= 0x01;
        assert!(!verify(&sig, &m, &pk, &params));
    }

    #[test]
    fn signatures_over_distinct_messages_differ() {
        let params = WOTSParams::standard();
        let sk = generate_private_key(&params);
        let sig1 = sign(&sk, &msg(1), &params);
        let sig2 = sign(&sk, &msg(2), &params);
        assert_ne!(sig1.chunks, sig2.chunks);
    }

    #[test]
    fn derive_private_key_is_deterministic_and_distinct() {
        let params = WOTSParams::standard();
        let seed = [9u8; 32];
        let sk0a = derive_private_key(&params, &seed, 0);
        let sk0b = derive_private_key(&params, &seed, 0);
        assert_eq!(sk0a.chunks, sk0b.chunks);

        let sk1 = derive_private_key(&params, &seed, 1);
        assert_ne!(sk0a.chunks, sk1.chunks);
    }

    #[test]
    fn public_key_and_signature_serialize_round_trip() {
        let params = WOTSParams::standard();
        let sk = generate_private_key(&params);
        let pk = public_key(&sk, &params);
        let sig = sign(&sk, &msg(3), &params);

        let pk2 = WOTSPublicKey::from_bytes(&pk.to_bytes(), &params).unwrap();
        let sig2 = WOTSSignature::from_bytes(&sig.to_bytes(), &params).unwrap();
        assert_eq!(pk, pk2);
        assert_eq!(sig, sig2);
    }

    #[test]
    fn wrong_pubkey_caught() {
        let params = WOTSParams::standard();
        let sk_a = generate_private_key(&params);
        let sk_b = generate_private_key(&params);
        let pk_b = public_key(&sk_b, &params);
        let m = msg(4);
        let sig_a = sign(&sk_a, &m, &params);
        assert!(!verify(&sig_a, &m, &pk_b, &params));
    }

    #[test]
    fn hash_public_key_is_deterministic() {
        let params = WOTSParams::standard();
        let sk = generate_private_key(&params);
        let pk = public_key(&sk, &params);
        assert_eq!(hash_public_key(&pk), hash_public_key(&pk));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_msg() -> impl Strategy<Value = HashDigest> {
        any::<[u8; 32]>()
    }

    fn arb_seed() -> impl Strategy<Value = [u8; 32]> {
        any::<[u8; 32]>()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// §8 property 1: sign/verify round-trips to the exact public key.
        #[test]
        fn wots_round_trip(seed in arb_seed(), index in 0u32..1000, msg in arb_msg()) {
            let params = WOTSParams::standard();
            let sk = derive_private_key(&params, &seed, index);
            let pk = public_key(&sk, &params);
            let sig = sign(&sk, &msg, &params);
            prop_assert!(verify(&sig, &msg, &pk, &params));
        }

        /// §8 property 2: flipping any single byte of any chain chunk
        /// breaks recovery of the original public key.
        #[test]
        fn wots_corruption_detected(
            seed in arb_seed(),
            index in 0u32..1000,
            msg in arb_msg(),
            chunk_idx in 0usize..67,
            byte_idx in 0usize..32,
            mask in 1u8..=255u8,
        ) {
            let params = WOTSParams::standard();
            let sk = derive_private_key(&params, &seed, index);
            let pk = public_key(&sk, &params);
            let mut sig = sign(&sk, &msg, &params);
            let chunk_idx = chunk_idx % sig.chunks.len();
            sig.chunks[chunk_idx][byte_idx] ^= mask;
            prop_assert!(!verify(&sig, &msg, &pk, &params));
        }

        /// §8 property 3: signatures over distinct messages differ.
        #[test]
        fn wots_signature_uniqueness(seed in arb_seed(), index in 0u32..1000, msg_a in arb_msg(), msg_b in arb_msg()) {
            prop_assume!(msg_a != msg_b);
            let params = WOTSParams::standard();
            let sk = derive_private_key(&params, &seed, index);
            let sig_a = sign(&sk, &msg_a, &params);
            let sig_b = sign(&sk, &msg_b, &params);
            prop_assert_ne!(sig_a.chunks, sig_b.chunks);
        }

        /// §8 property 4: public key and signature survive a byte round-trip.
        #[test]
        fn wots_serialization_round_trip(seed in arb_seed(), index in 0u32..1000, msg in arb_msg()) {
            let params = WOTSParams::standard();
            let sk = derive_private_key(&params, &seed, index);
            let pk = public_key(&sk, &params);
            let sig = sign(&sk, &msg, &params);

            let pk2 = WOTSPublicKey::from_bytes(&pk.to_bytes(), &params).unwrap();
            let sig2 = WOTSSignature::from_bytes(&sig.to_bytes(), &params).unwrap();
            prop_assert_eq!(pk, pk2);
            prop_assert_eq!(sig, sig2);
        }

        /// §8 property 5: derivation is deterministic in `(seed, index)` and
        /// distinct across indices.
        #[test]
        fn wots_derivation_deterministic_and_distinct(seed in arb_seed(), index_a in 0u32..1000, index_b in 0u32..1000) {
            prop_assume!(index_a != index_b);
            let params = WOTSParams::standard();
            let sk_a1 = derive_private_key(&params, &seed, index_a);
            let sk_a2 = derive_private_key(&params, &seed, index_a);
            prop_assert_eq!(sk_a1.chunks, sk_a2.chunks);

            let sk_b = derive_private_key(&params, &seed, index_b);
            prop_assert_ne!(sk_a1.chunks, sk_b.chunks);
        }
    }
}
