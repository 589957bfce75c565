//! ECIES-style intent encryption
//!
//! Sender draws an ephemeral scalar `r`, computes `S = r · recipientPub`,
//! and derives a ChaCha20Poly1305 key from `S` via HKDF-SHA256. The same
//! construction is reused for the `COMPLIANT` privacy level's auxiliary
//! ciphertext to a regulator's viewing key.

mod error;

pub use error::{Error, Result};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT as G;
use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use hkdf::Hkdf;
use sha2::Sha256;

const KDF_INFO: &[u8] = b"OBSCURA_INTENT_ENC";

fn derive_symmetric_key(shared_secret: &[u8; 32]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut okm = [0u8; 32];
    hk.expand(KDF_INFO, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}

/// one ECIES ciphertext: ephemeral public key, nonce, and AEAD output.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EciesEnvelope {
    pub ephemeral_pub: [u8; 32],
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

fn encrypt_to(recipient_pub: [u8; 32], plaintext: &[u8]) -> Result<EciesEnvelope> {
    let recipient_point = CompressedRistretto(recipient_pub)
        .decompress()
        .ok_or(Error::InvalidPoint)?;

    let r = Scalar::random(&mut siaac_hash::csprng());
    let ephemeral_pub = (r * G).compress().to_bytes();
    let shared = (r * recipient_point).compress().to_bytes();
    let key = derive_symmetric_key(&shared);

    let nonce_bytes = siaac_hash::random_bytes::<12>();
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| Error::DecryptFailed)?;

    Ok(EciesEnvelope {
        ephemeral_pub,
        nonce: nonce_bytes,
        ciphertext,
    })
}

fn decrypt_from(recipient_priv: &Scalar, envelope: &EciesEnvelope) -> Result<Vec<u8>> {
    let ephemeral_point = CompressedRistretto(envelope.ephemeral_pub)
        .decompress()
        .ok_or(Error::InvalidPoint)?;
    let shared = (recipient_priv * ephemeral_point).compress().to_bytes();
    let key = derive_symmetric_key(&shared);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_ref())
        .map_err(|_| Error::DecryptFailed)
}

/// auxiliary ciphertext for `COMPLIANT` intents, addressed to a regulator's
/// viewing key but not decryptable without that key's private half.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComplianceAttachment {
    pub auditor_pub_id: String,
    pub envelope: EciesEnvelope,
}

/// the full encrypted intent: always a primary envelope to the recipient,
/// plus an optional compliance attachment for `COMPLIANT`-level intents.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShieldedEnvelope {
    pub primary: EciesEnvelope,
    pub compliance: Option<ComplianceAttachment>,
}

/// encrypt `plaintext` to `recipient_pub`. When `compliance` is supplied
/// (auditor public-key id, auditor public key, compliance metadata), an
/// additional attachment is produced addressed to the auditor.
pub fn encrypt_intent(
    recipient_pub: [u8; 32],
    plaintext: &[u8],
    compliance: Option<(&str, [u8; 32], &[u8])>,
) -> Result<ShieldedEnvelope> {
    let primary = encrypt_to(recipient_pub, plaintext)?;

    let compliance = compliance
        .map(|(auditor_pub_id, auditor_pub, metadata)| {
            encrypt_to(auditor_pub, metadata).map(|envelope| ComplianceAttachment {
                auditor_pub_id: auditor_pub_id.to_string(),
                envelope,
            })
        })
        .transpose()?;

    Ok(ShieldedEnvelope { primary, compliance })
}

/// recipient-side decryption of the primary payload.
pub fn decrypt_intent(recipient_priv: &Scalar, envelope: &ShieldedEnvelope) -> Result<Vec<u8>> {
    decrypt_from(recipient_priv, &envelope.primary)
}

/// auditor-side decryption of the compliance metadata, if present.
pub fn decrypt_compliance_metadata(auditor_priv: &Scalar, envelope: &ShieldedEnvelope) -> Result<Vec<u8>> {
    let attachment = envelope.compliance.as_ref().ok_or(Error::NoComplianceAttachment)?;
    decrypt_from(auditor_priv, &attachment.envelope)
}
