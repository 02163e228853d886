//! Field-level encryption for personal data stored at rest.
//!
//! Values are sealed with AES-256-GCM under a single data key obtained at
//! startup. A stored token is `enc:v1:` followed by base64(nonce ‖ ciphertext).

use crate::{CoreError, KeyProvider};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const TOKEN_PREFIX: &str = "enc:v1:";

/// Shown in place of a field whose ciphertext cannot be reversed.
pub const UNAVAILABLE: &str = "[indisponível]";

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("cannot decrypt value: {0}")]
    DecryptionFailed(String),
    #[error("cannot encrypt value: {0}")]
    EncryptionFailed(String),
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
}

/// 256-bit data key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("key is not valid base64: {}", e)))?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Encrypts and decrypts individual string fields.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

impl FieldCipher {
    pub fn new(key: &EncryptionKey) -> Result<Self, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Fetches the data key once and builds the cipher. Callers treat a
    /// failure here as fatal.
    pub async fn from_provider(provider: &dyn KeyProvider) -> Result<Self, CoreError> {
        let key = provider.data_key().await?;
        Ok(Self::new(&key)?)
    }

    /// Seal a value. The empty string stays empty so absent fields remain absent.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", TOKEN_PREFIX, STANDARD.encode(sealed)))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        if token.is_empty() {
            return Ok(String::new());
        }
        let encoded = token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| CryptoError::DecryptionFailed("unrecognized token format".into()))?;
        let sealed = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed("token too short".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed("authentication failed".into()))?;
        String::from_utf8(plaintext).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }

    /// Seal a JSON value. Only strings can be encrypted.
    pub fn encrypt_value(&self, value: &Value) -> Result<Value, CryptoError> {
        match value {
            Value::String(s) => Ok(Value::String(self.encrypt(s)?)),
            other => Err(CryptoError::InvalidInput(format!(
                "only strings can be encrypted, got {}",
                json_kind(other)
            ))),
        }
    }

    /// Read path: a value that cannot be decrypted is replaced by
    /// [`UNAVAILABLE`] instead of failing the whole response.
    pub fn decrypt_for_display(&self, token: &str) -> String {
        match self.decrypt(token) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(error = %e, "substituting unreadable encrypted field");
                UNAVAILABLE.to_string()
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Key provider backed by key material from configuration.
#[derive(Clone, Debug)]
pub struct StaticKeyProvider {
    key: EncryptionKey,
}

impl StaticKeyProvider {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        Ok(Self::new(EncryptionKey::from_base64(encoded)?))
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn data_key(&self) -> Result<EncryptionKey, CoreError> {
        Ok(self.key.clone())
    }
}
