//! Transparent column encryption, as a composable storage boundary.
//!
//! # Contract
//! - [`EncryptionKey`] is loaded once, at the composition root, from a
//!   32-byte base64-encoded environment variable.
//! - [`Encrypted<T>`] is the only type that carries ciphertext; its
//!   [`Encrypted::seal`] and [`Encrypted::open`] are the only functions
//!   that ever touch the key. Every write path — including seed/import
//!   tooling — goes through `seal`; there is no raw-write bypass.
//! - `Debug` never prints plaintext or key material, mirroring the
//!   teacher's redacted-secret convention: values are shown only as a
//!   byte count.

use std::fmt;

use aes_gcm::aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub const ENV_ENCRYPTION_KEY: &str = "LOADHUB_ENCRYPTION_KEY";
const NONCE_LEN: usize = 12;

/// A 32-byte AES-256-GCM key. Never `Debug`-printed in full.
#[derive(Clone)]
pub struct EncryptionKey(Vec<u8>);

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &self.0.len())
            .finish()
    }
}

impl EncryptionKey {
    /// Load from the named environment variable (required, 32 bytes
    /// base64), defaulting to [`ENV_ENCRYPTION_KEY`].
    pub fn from_env() -> Result<Self> {
        Self::from_env_var(ENV_ENCRYPTION_KEY)
    }

    pub fn from_env_var(var_name: &str) -> Result<Self> {
        let raw = std::env::var(var_name)
            .with_context(|| format!("missing required env var {var_name}"))?;
        Self::from_base64(&raw)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .context("encryption key is not valid base64")?;
        if bytes.len() != 32 {
            bail!(
                "encryption key must decode to 32 bytes, got {}",
                bytes.len()
            );
        }
        Ok(Self(bytes))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(GenericArray::from_slice(&self.0))
    }
}

/// A value whose only on-the-wire/on-disk representation is ciphertext.
///
/// `seal`/`open` are the sole crossing points of the encryption boundary;
/// nothing else in this crate (or any caller) can construct a plaintext
/// `T` from stored bytes.
#[derive(Clone, Serialize, Deserialize)]
pub struct Encrypted<T> {
    ciphertext: Vec<u8>,
    #[serde(skip)]
    _marker: std::marker::PhantomData<T>,
}

impl<T> fmt::Debug for Encrypted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encrypted")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> Encrypted<T> {
    /// Encrypt `value` under `key`, producing `nonce || ciphertext`.
    pub fn seal(key: &EncryptionKey, value: &T) -> Result<Self> {
        let plaintext = serde_json::to_vec(value).context("serialize plaintext for sealing")?;
        let cipher = key.cipher();
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut ciphertext = cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| anyhow!("AES-GCM encryption failed: {e}"))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.append(&mut ciphertext);
        Ok(Self {
            ciphertext: out,
            _marker: std::marker::PhantomData,
        })
    }

    /// Decrypt and deserialize back to `T`.
    pub fn open(&self, key: &EncryptionKey) -> Result<T> {
        if self.ciphertext.len() < NONCE_LEN {
            bail!("ciphertext shorter than nonce, cannot decrypt");
        }
        let (nonce_bytes, body) = self.ciphertext.split_at(NONCE_LEN);
        let nonce = GenericArray::from_slice(nonce_bytes);
        let cipher = key.cipher();
        let plaintext = cipher
            .decrypt(nonce, body)
            .map_err(|e| anyhow!("AES-GCM decryption failed: {e}"))?;
        serde_json::from_slice(&plaintext).context("deserialize plaintext after opening")
    }

    /// Raw bytes as stored in the `bytea` column. Opaque — callers must not
    /// attempt to interpret them without `open`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            ciphertext: bytes,
            _marker: std::marker::PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> EncryptionKey {
        EncryptionKey(vec![7u8; 32])
    }

    #[test]
    fn seal_then_open_roundtrips() {
        let key = test_key();
        let sealed = Encrypted::<String>::seal(&key, &"select 1".to_string()).unwrap();
        let opened = sealed.open(&key).unwrap();
        assert_eq!(opened, "select 1");
    }

    #[test]
    fn ciphertext_does_not_contain_plaintext() {
        let key = test_key();
        let secret = "super-secret-password".to_string();
        let sealed = Encrypted::<String>::seal(&key, &secret).unwrap();
        let as_text = String::from_utf8_lossy(sealed.as_bytes());
        assert!(!as_text.contains("super-secret-password"));
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let key = test_key();
        let other = EncryptionKey(vec![9u8; 32]);
        let sealed = Encrypted::<String>::seal(&key, &"data".to_string()).unwrap();
        assert!(sealed.open(&other).is_err());
    }

    #[test]
    fn debug_never_prints_plaintext() {
        let key = test_key();
        let sealed = Encrypted::<String>::seal(&key, &"hunter2".to_string()).unwrap();
        let debug_str = format!("{sealed:?}");
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn rejects_malformed_base64_key() {
        assert!(EncryptionKey::from_base64("not-valid-base64!!").is_err());
    }

    #[test]
    fn rejects_wrong_length_key() {
        let short = STANDARD.encode([1u8; 16]);
        assert!(EncryptionKey::from_base64(&short).is_err());
    }
}
