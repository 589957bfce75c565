//! EIP-5564-style dual-key stealth addressing
//!
//! `encode_address` stands in for a concrete chain's address encoding
//! (EVM checksum, Solana base58, ...), which is an external collaborator
//! this component only produces an opaque address string for.

mod error;

pub use error::{Error, Result};

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT as G;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use siaac_hash::{hash_dom, tags};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

fn decompress(bytes: [u8; 32]) -> Result<RistrettoPoint> {
    CompressedRistretto(bytes).decompress().ok_or(Error::InvalidPoint)
}

fn scalar_from_shared_secret(shared_bytes: &[u8; 32]) -> Scalar {
    let t = hash_dom(tags::STEALTH_T, &[shared_bytes]);
    Scalar::from_bytes_mod_order(t)
}

fn encode_address(chain: &str, stealth_pub: &[u8; 32]) -> String {
    format!("{chain}:0x{}", hex::encode(stealth_pub))
}

/// spend/view scalar pair behind a published meta-address. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MetaAddressPrivate {
    pub spend_priv: Scalar,
    pub view_priv: Scalar,
}

/// a published `(chain, spendPub, viewPub)` meta-address.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StealthMetaAddress {
    pub chain: String,
    spend_pub: [u8; 32],
    view_pub: [u8; 32],
}

impl StealthMetaAddress {
    pub fn spend_pub(&self) -> Result<RistrettoPoint> {
        decompress(self.spend_pub)
    }

    pub fn view_pub(&self) -> Result<RistrettoPoint> {
        decompress(self.view_pub)
    }
}

impl fmt::Display for StealthMetaAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "st:{}:{}:{}",
            self.chain,
            hex::encode(self.spend_pub),
            hex::encode(self.view_pub)
        )
    }
}

impl FromStr for StealthMetaAddress {
    type Err = Error;

    // chain tags may themselves contain ':' (e.g. CAIP-2 "eip155:1"), so the
    // two hex fields are peeled off the right rather than splitting evenly.
    fn from_str(s: &str) -> Result<Self> {
        let mut rsplit = s.rsplitn(3, ':');
        let view_hex = rsplit.next().ok_or(Error::MalformedMetaAddress)?;
        let spend_hex = rsplit.next().ok_or(Error::MalformedMetaAddress)?;
        let rest = rsplit.next().ok_or(Error::MalformedMetaAddress)?;
        let chain = rest.strip_prefix("st:").ok_or(Error::MalformedMetaAddress)?;

        let spend_pub = decode_point_hex(spend_hex)?;
        let view_pub = decode_point_hex(view_hex)?;
        // both must decompress to valid curve points, not just be 32 bytes
        decompress(spend_pub)?;
        decompress(view_pub)?;

        Ok(Self {
            chain: chain.to_string(),
            spend_pub,
            view_pub,
        })
    }
}

fn decode_point_hex(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|_| Error::InvalidHex)?;
    bytes.try_into().map_err(|_| Error::InvalidHex)
}

/// draw a fresh spend/view key pair and publish the corresponding
/// meta-address for `chain`.
pub fn generate_meta_address(chain: &str) -> (MetaAddressPrivate, StealthMetaAddress) {
    let spend_priv = Scalar::random(&mut siaac_hash::csprng());
    let view_priv = Scalar::random(&mut siaac_hash::csprng());
    let spend_pub = (spend_priv * G).compress().to_bytes();
    let view_pub = (view_priv * G).compress().to_bytes();

    (
        MetaAddressPrivate { spend_priv, view_priv },
        StealthMetaAddress {
            chain: chain.to_string(),
            spend_pub,
            view_pub,
        },
    )
}

/// one-time stealth address derived for a single payment, plus everything
/// the recipient needs to scan for and later recover it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DerivedStealthAddress {
    pub stealth_pub: [u8; 32],
    pub stealth_addr: String,
    pub view_tag: u8,
    pub ephemeral_pub: [u8; 32],
}

/// sender side: derive a fresh one-time address for `meta`.
pub fn derive_stealth_address(meta: &StealthMetaAddress) -> Result<DerivedStealthAddress> {
    let spend_pub = meta.spend_pub()?;
    let view_pub = meta.view_pub()?;

    let r = Scalar::random(&mut siaac_hash::csprng());
    let big_r = r * G;
    let shared = (r * view_pub).compress().to_bytes();

    let t = scalar_from_shared_secret(&shared);
    let stealth_pub = (spend_pub + t * G).compress().to_bytes();
    let stealth_addr = encode_address(&meta.chain, &stealth_pub);

    Ok(DerivedStealthAddress {
        stealth_pub,
        stealth_addr,
        view_tag: shared[0],
        ephemeral_pub: big_r.compress().to_bytes(),
    })
}

/// recipient side: recompute the one-time private key for `ephemeral_pub`
/// (`R`) published alongside a payment to this meta-address.
pub fn recover_stealth_private_key(priv_keys: &MetaAddressPrivate, ephemeral_pub: [u8; 32]) -> Result<Scalar> {
    let big_r = decompress(ephemeral_pub)?;
    let shared = (priv_keys.view_priv * big_r).compress().to_bytes();
    let t = scalar_from_shared_secret(&shared);
    Ok(priv_keys.spend_priv + t)
}

/// shared secret as the recipient sees it, for view-tag scanning without
/// recomputing a full private key for every candidate payment.
pub fn recover_shared_secret(priv_keys: &MetaAddressPrivate, ephemeral_pub: [u8; 32]) -> Result<[u8; 32]> {
    let big_r = decompress(ephemeral_pub)?;
    Ok((priv_keys.view_priv * big_r).compress().to_bytes())
}
