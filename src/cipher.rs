//! Credential encryption.
//!
//! Tokens are stored as `base64(nonce || ciphertext)` under AES-256-GCM.
//! Two pipeline stages wrap the cipher: [`encode_credential`] runs before a
//! token is written, [`decode_credential`] runs right before a token is
//! used. Decoding never fails: rows written before encryption was
//! introduced hold plaintext, and those are used as stored.

use crate::error::{Error, Result};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

pub trait CredentialCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// AES-256-GCM with a fresh random nonce per encryption.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Build from a base64-encoded 32-byte key.
    pub fn from_base64_key(key: &SecretString) -> Result<Self> {
        let raw = BASE64
            .decode(key.expose_secret().trim())
            .map_err(|e| Error::Config(format!("cipher key is not valid base64: {e}")))?;
        Self::from_key_bytes(&raw)
    }

    pub fn from_key_bytes(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(Error::Config(format!(
                "cipher key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| Error::Config("cipher key rejected".to_string()))?;
        Ok(Self { cipher })
    }

    /// A new random key, base64-encoded, for `autolog keygen`.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }
}

impl CredentialCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| Error::Other("credential encryption failed".to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let payload = BASE64
            .decode(ciphertext.trim())
            .map_err(|e| Error::Decryption(format!("not base64: {e}")))?;
        if payload.len() <= NONCE_LEN {
            return Err(Error::Decryption("payload too short".to_string()));
        }
        let (nonce, body) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| Error::Decryption("authentication failed".to_string()))?;
        String::from_utf8(plaintext).map_err(|_| Error::Decryption("not utf-8".to_string()))
    }
}

/// Encode-before-write stage.
pub fn encode_credential(cipher: &dyn CredentialCipher, plaintext: &str) -> Result<String> {
    cipher.encrypt(plaintext)
}

/// Decode-after-read stage. Falls back to the stored value on failure.
pub fn decode_credential(cipher: &dyn CredentialCipher, stored: &str) -> SecretString {
    match cipher.decrypt(stored) {
        Ok(plaintext) => SecretString::from(plaintext),
        Err(e) => {
            warn!("stored credential is not encrypted, using it as-is: {e}");
            SecretString::from(stored.to_string())
        }
    }
}
