//! Pedersen commitments and amount hiding
//!
//! `C = v*G + r*H` over Ristretto255. `G` is the curve basepoint; `H` is
//! derived by hashing a domain-tagged seed onto the curve (Elligator, via
//! `RistrettoPoint::hash_from_bytes`) rather than by scalar-multiplying `G`
//! by a hash output. The latter would make `log_G(H)` public and let anyone
//! open a commitment to an arbitrary alternate value, which breaks the
//! binding property this component exists to provide. The `PEDERSEN_G` tag
//! is reserved for a future alternate basis and unused here, since `G` is
//! fixed to the curve basepoint.

mod error;

pub use error::{Error, Result};

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use sha2::Sha512;
use siaac_hash::{hash_dom, tags};

/// default amount bit-width range proofs are expected to cover.
pub const DEFAULT_RANGE_BITS: u32 = 64;

fn generator_g() -> RistrettoPoint {
    RISTRETTO_BASEPOINT_POINT
}

fn generator_h() -> RistrettoPoint {
    let seed = hash_dom(tags::PEDERSEN_H, &[b"OBSCURA"]);
    RistrettoPoint::hash_from_bytes::<Sha512>(&seed)
}

fn amount_to_scalar(amount: u128) -> Scalar {
    let mut buf = [0u8; 32];
    buf[..16].copy_from_slice(&amount.to_le_bytes());
    Scalar::from_bytes_mod_order(buf)
}

/// a compressed Ristretto255 point committing to a hidden amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PedersenCommitment {
    bytes: [u8; 32],
}

/// on the wire this is lowercase hex, matching §6.5 ("all hashes and keys
/// transmitted as lowercase hex or base64"), and round-trips through
/// [`PedersenCommitment::from_bytes`] so a deserialized commitment is
/// never an unvalidated point.
#[cfg(feature = "serde")]
impl serde::Serialize for PedersenCommitment {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(self.bytes))
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for PedersenCommitment {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        use serde::Deserialize;
        let s = String::deserialize(d)?;
        let decoded = hex::decode(s).map_err(serde::de::Error::custom)?;
        let bytes: [u8; 32] = decoded.try_into().map_err(|_| serde::de::Error::custom("expected 32 bytes"))?;
        PedersenCommitment::from_bytes(bytes).map_err(serde::de::Error::custom)
    }
}

impl PedersenCommitment {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.bytes
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        CompressedRistretto(bytes)
            .decompress()
            .ok_or(Error::InvalidPoint)?;
        Ok(Self { bytes })
    }

    fn point(&self) -> RistrettoPoint {
        CompressedRistretto(self.bytes)
            .decompress()
            .expect("validated at construction")
    }
}

/// commit to `amount`, drawing a fresh blinding scalar unless one is given.
/// Returns the commitment and the blinding actually used — callers must
/// retain it to open or spend the commitment later.
pub fn commit(amount: u128, blinding: Option<Scalar>) -> (PedersenCommitment, Scalar) {
    let r = blinding.unwrap_or_else(|| Scalar::random(&mut siaac_hash::csprng()));
    let point = amount_to_scalar(amount) * generator_g() + r * generator_h();
    (
        PedersenCommitment {
            bytes: point.compress().to_bytes(),
        },
        r,
    )
}

/// check that `(amount, blinding)` opens `commitment`, in constant time.
pub fn verify_opening(commitment: &PedersenCommitment, amount: u128, blinding: &Scalar) -> bool {
    let recomputed = amount_to_scalar(amount) * generator_g() + blinding * generator_h();
    siaac_hash::bytes_equal(&recomputed.compress().to_bytes(), &commitment.bytes)
}

/// homomorphic sum: `commit(a, ra) + commit(b, rb) == commit(a + b, ra + rb)`.
pub fn add(a: &PedersenCommitment, b: &PedersenCommitment) -> PedersenCommitment {
    let sum = a.point() + b.point();
    PedersenCommitment {
        bytes: sum.compress().to_bytes(),
    }
}

/// blinding factor that opens the homomorphic sum of two commitments.
pub fn add_blindings(ra: &Scalar, rb: &Scalar) -> Scalar {
    ra + rb
}

/// range proofs are treated as an opaque producer/verifier interface; no
/// zero-knowledge circuit is implemented here.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RangeProof {
    Unverified { bits: u32 },
}

pub trait RangeProofBackend {
    fn prove_range(
        &self,
        commitment: &PedersenCommitment,
        amount: u128,
        blinding: &Scalar,
        bits: u32,
    ) -> RangeProof;

    fn verify_range(&self, commitment: &PedersenCommitment, proof: &RangeProof, bits: u32) -> bool;
}

/// stub backend with no real proving system behind it. It never silently
/// reports a commitment as cryptographically range-checked: every proof it
/// issues is tagged `Unverified` and every acceptance is logged as such, so
/// callers and auditors can tell the difference from a real backend.
pub struct UnverifiedRangeProofBackend;

impl RangeProofBackend for UnverifiedRangeProofBackend {
    fn prove_range(
        &self,
        _commitment: &PedersenCommitment,
        _amount: u128,
        _blinding: &Scalar,
        bits: u32,
    ) -> RangeProof {
        RangeProof::Unverified { bits }
    }

    fn verify_range(&self, _commitment: &PedersenCommitment, proof: &RangeProof, bits: u32) -> bool {
        let RangeProof::Unverified { bits: proof_bits } = proof;
        if *proof_bits != bits {
            return false;
        }
        tracing::warn!(bits, "accepting unverified range proof; no range-proof backend configured");
        true
    }
}
