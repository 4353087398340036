//! Sealing capability for opaque state and code tokens.
//!
//! The flow never implements a cryptographic primitive itself. Hosts inject
//! a [`Sealer`] that wraps whatever AEAD or data-protection scheme they use;
//! the flow only frames payloads around it.
//!
//! [`AesGcmSealer`] adapts the `aes-gcm` crate for hosts that do not bring
//! their own scheme. Sealed output is `nonce (96 bits) || ciphertext || tag`.
//! Retired keys are accepted when opening so that tokens issued shortly
//! before a key rotation still redeem.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Key size for AES-256 (256 bits)
pub const KEY_SIZE: usize = 32;

/// Errors raised by a [`Sealer`].
#[derive(Debug, thiserror::Error)]
pub enum SealError {
    /// The payload could not be sealed.
    #[error("Failed to seal payload: {0}")]
    Seal(String),

    /// The sealed payload was rejected (tampered, truncated or sealed with an
    /// unknown key).
    #[error("Sealed payload rejected")]
    Rejected,

    /// The sealing key is malformed.
    #[error("Invalid sealing key: {0}")]
    InvalidKey(String),
}

/// Symmetric, tamper-evident sealing of opaque payloads.
pub trait Sealer: Send + Sync {
    /// Seals `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying primitive fails.
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SealError>;

    /// Opens a payload produced by [`Sealer::seal`].
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Rejected`] if the payload fails authentication.
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SealError>;
}

/// AES-256-GCM sealer with optional retired keys.
pub struct AesGcmSealer {
    primary: Aes256Gcm,
    retired: Vec<Aes256Gcm>,
}

impl AesGcmSealer {
    /// Creates a sealer from a raw 256-bit key.
    #[must_use]
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            primary: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            retired: Vec::new(),
        }
    }

    /// Creates a sealer from a hex or base64 encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::InvalidKey`] if the key does not decode to 32 bytes.
    pub fn from_encoded_key(key: &str) -> Result<Self, SealError> {
        Ok(Self::new(&parse_key(key)?))
    }

    /// Accepts tokens sealed with a previous key when opening.
    #[must_use]
    pub fn with_retired_key(mut self, key: &[u8; KEY_SIZE]) -> Self {
        self.retired.push(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)));
        self
    }

    /// Generates a fresh random key.
    #[must_use]
    pub fn generate_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }
}

impl Sealer for AesGcmSealer {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .primary
            .encrypt(nonce, plaintext)
            .map_err(|e| SealError::Seal(format!("Encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SealError> {
        if sealed.len() <= NONCE_SIZE {
            return Err(SealError::Rejected);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        std::iter::once(&self.primary)
            .chain(self.retired.iter())
            .find_map(|cipher| cipher.decrypt(nonce, ciphertext).ok())
            .ok_or(SealError::Rejected)
    }
}

/// Decodes a 256-bit key from a hex or base64 string.
///
/// # Errors
///
/// Returns [`SealError::InvalidKey`] if the key does not decode to 32 bytes.
pub fn parse_key(key_str: &str) -> Result<[u8; KEY_SIZE], SealError> {
    let key_str = key_str.trim();

    let bytes = if key_str.len() == KEY_SIZE * 2 {
        hex::decode(key_str).map_err(|e| SealError::InvalidKey(format!("Invalid hex key: {e}")))?
    } else {
        BASE64
            .decode(key_str)
            .map_err(|e| SealError::InvalidKey(format!("Invalid base64 key: {e}")))?
    };

    bytes.try_into().map_err(|bytes: Vec<u8>| {
        SealError::InvalidKey(format!(
            "Key must be {} bytes, got {}",
            KEY_SIZE,
            bytes.len()
        ))
    })
}
