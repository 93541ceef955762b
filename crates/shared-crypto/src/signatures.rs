//! # Ed25519 Signatures
//!
//! Clients sign transaction hashes and oracle reporters sign event hashes
//! with Ed25519. Keys travel hex-encoded inside JSON payloads, so besides the
//! typed wrappers there is [`verify_signature`], which works on raw bytes.

use crate::CryptoError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroize;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// Compressed curve point identifying a client or reporter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ed25519PublicKey([u8; PUBLIC_KEY_LEN]);

impl Ed25519PublicKey {
    /// Fails unless `bytes` decompress to a point on the curve.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Result<Self, CryptoError> {
        decode_point(&bytes)?;
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        <[u8; PUBLIC_KEY_LEN]>::try_from(bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)
            .and_then(Self::from_bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Lowercase hex, the form stored in account records.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError> {
        decode_point(&self.0)?
            .verify(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

fn decode_point(bytes: &[u8; PUBLIC_KEY_LEN]) -> Result<VerifyingKey, CryptoError> {
    VerifyingKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ed25519Signature([u8; SIGNATURE_LEN]);

impl Ed25519Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        <[u8; SIGNATURE_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidSignatureFormat(bytes.len()))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

/// Signing identity held by a client or an oracle reporter.
///
/// The secret seed is wiped when the pair is dropped.
pub struct Ed25519KeyPair {
    secret: SigningKey,
}

impl Ed25519KeyPair {
    pub fn generate() -> Self {
        Self {
            secret: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Deterministic pair; tests and demo clusters derive identities this way.
    pub fn from_seed(seed: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self {
            secret: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.secret.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.secret.sign(message).to_bytes())
    }
}

impl Drop for Ed25519KeyPair {
    fn drop(&mut self) {
        self.secret.to_bytes().zeroize();
    }
}

/// Verify `signature` over `message` with a raw 32-byte public key.
pub fn verify_signature(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let key = Ed25519PublicKey::from_slice(public_key)?;
    key.verify(message, &Ed25519Signature::from_slice(signature)?)
}
