//! Field-level encryption for secrets stored in the database
//!
//! Values are sealed with ECIES (secp256k1 ECDH + AES-256-GCM). Each stored value
//! names the key it was sealed with, so keys can be rotated without a flag day:
//! old values keep decrypting with their previous key until they are rewritten.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use ecies::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Format version written into every payload
pub const ENCRYPTION_VERSION: &str = "1";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("No encryption key configured")]
    MissingKey,

    #[error("Unknown encryption key id '{0}'")]
    UnknownKeyId(String),

    #[error("Invalid encryption key '{key_id}': {reason}")]
    InvalidKey { key_id: String, reason: String },

    #[error("Malformed encrypted payload: {0}")]
    Malformed(String),

    #[error("Encryption failed for field '{0}'")]
    EncryptFailed(String),

    #[error("Decryption failed for field '{0}'")]
    DecryptFailed(String),
}

/// Sealed value as persisted in TEXT columns (serialized to JSON)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedData {
    pub data: String,
    pub key_id: String,
    pub version: String,
    pub encrypted_at: DateTime<Utc>,
}

struct KeyMaterial {
    secret: [u8; 32],
    public: [u8; 65],
}

impl KeyMaterial {
    fn from_hex(key_id: &str, key_hex: &str) -> Result<Self, CryptoError> {
        let invalid = |reason: &str| CryptoError::InvalidKey {
            key_id: key_id.to_string(),
            reason: reason.to_string(),
        };

        let bytes = hex::decode(key_hex.trim()).map_err(|_| invalid("not valid hex"))?;
        if bytes.len() != 32 {
            return Err(invalid("expected 32 bytes (64 hex characters)"));
        }

        let secret_key = SecretKey::parse_slice(&bytes).map_err(|_| invalid("not a valid secret scalar"))?;
        let public = PublicKey::from_secret_key(&secret_key).serialize();

        let mut secret = [0u8; 32];
        secret.copy_from_slice(&bytes);
        Ok(Self { secret, public })
    }
}

pub struct EncryptionService {
    active_key_id: String,
    keys: HashMap<String, KeyMaterial>,
}

impl fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.keys.keys().collect();
        ids.sort();
        f.debug_struct("EncryptionService")
            .field("active_key_id", &self.active_key_id)
            .field("key_ids", &ids)
            .finish()
    }
}

impl EncryptionService {
    pub fn new(
        active_key_id: &str,
        active_key_hex: &str,
        previous: &[(String, String)],
    ) -> Result<Self, CryptoError> {
        if active_key_hex.trim().is_empty() {
            return Err(CryptoError::MissingKey);
        }

        let mut keys = HashMap::new();
        keys.insert(
            active_key_id.to_string(),
            KeyMaterial::from_hex(active_key_id, active_key_hex)?,
        );

        for (key_id, key_hex) in previous {
            if keys.contains_key(key_id) {
                return Err(CryptoError::InvalidKey {
                    key_id: key_id.clone(),
                    reason: "duplicate key id".to_string(),
                });
            }
            keys.insert(key_id.clone(), KeyMaterial::from_hex(key_id, key_hex)?);
        }

        Ok(Self {
            active_key_id: active_key_id.to_string(),
            keys,
        })
    }

    pub fn from_config(keys: &crate::config::EncryptionKeys) -> Result<Self, CryptoError> {
        Self::new(&keys.active_key_id, &keys.active_key_hex, &keys.previous)
    }

    pub fn active_key_id(&self) -> &str {
        &self.active_key_id
    }

    pub fn encrypt_field(&self, field: &str, plaintext: &str) -> Result<EncryptedData, CryptoError> {
        let key = self
            .keys
            .get(&self.active_key_id)
            .ok_or(CryptoError::MissingKey)?;

        let sealed = ecies::encrypt(&key.public, plaintext.as_bytes()).map_err(|e| {
            log::error!("[CRYPTO] Failed to encrypt field '{}': {:?}", field, e);
            CryptoError::EncryptFailed(field.to_string())
        })?;

        Ok(EncryptedData {
            data: STANDARD.encode(sealed),
            key_id: self.active_key_id.clone(),
            version: ENCRYPTION_VERSION.to_string(),
            encrypted_at: Utc::now(),
        })
    }

    pub fn decrypt_field(&self, field: &str, encrypted: &EncryptedData) -> Result<String, CryptoError> {
        if encrypted.version != ENCRYPTION_VERSION {
            return Err(CryptoError::Malformed(format!(
                "unsupported version '{}'",
                encrypted.version
            )));
        }

        let key = self
            .keys
            .get(&encrypted.key_id)
            .ok_or_else(|| CryptoError::UnknownKeyId(encrypted.key_id.clone()))?;

        let sealed = STANDARD
            .decode(&encrypted.data)
            .map_err(|_| CryptoError::Malformed("data is not valid base64".to_string()))?;

        let plaintext = ecies::decrypt(&key.secret, &sealed).map_err(|_| {
            log::warn!(
                "[CRYPTO] Failed to decrypt field '{}' with key '{}'",
                field,
                encrypted.key_id
            );
            CryptoError::DecryptFailed(field.to_string())
        })?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Malformed("plaintext is not UTF-8".to_string()))
    }

    /// Encrypt and serialize for a TEXT column
    pub fn encrypt_to_string(&self, field: &str, plaintext: &str) -> Result<String, CryptoError> {
        let encrypted = self.encrypt_field(field, plaintext)?;
        serde_json::to_string(&encrypted).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    /// Decrypt a TEXT column value. Values that are not an encrypted payload are
    /// legacy plaintext and are returned unchanged.
    pub fn decrypt_from_string(&self, field: &str, stored: &str) -> Result<String, CryptoError> {
        match parse_encrypted(stored) {
            Some(encrypted) => self.decrypt_field(field, &encrypted),
            None => Ok(stored.to_string()),
        }
    }

    pub fn needs_rotation(&self, encrypted: &EncryptedData) -> bool {
        encrypted.key_id != self.active_key_id
    }

    /// Re-seal a stored value with the active key. Returns `None` when the value is
    /// already sealed with the active key.
    pub fn rotate(&self, field: &str, stored: &str) -> Result<Option<String>, CryptoError> {
        if let Some(encrypted) = parse_encrypted(stored) {
            if !self.needs_rotation(&encrypted) {
                return Ok(None);
            }
        }
        let plaintext = self.decrypt_from_string(field, stored)?;
        self.encrypt_to_string(field, &plaintext).map(Some)
    }
}

fn parse_encrypted(stored: &str) -> Option<EncryptedData> {
    if !stored.trim_start().starts_with('{') {
        return None;
    }
    serde_json::from_str(stored).ok()
}

/// Generate a fresh key suitable for TOKEN_ENCRYPTION_KEY
pub fn generate_key_hex() -> String {
    let (secret, _) = ecies::utils::generate_keypair();
    hex::encode(secret.serialize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "1111111111111111111111111111111111111111111111111111111111111111";
    const KEY_B: &str = "2222222222222222222222222222222222222222222222222222222222222222";

    #[test]
    fn test_encrypt_decrypt_field() {
        let service = EncryptionService::new("k1", KEY_A, &[]).unwrap();
        let encrypted = service.encrypt_field("access_token", "ghp_secret").unwrap();

        assert_eq!(encrypted.key_id, "k1");
        assert_eq!(encrypted.version, ENCRYPTION_VERSION);
        assert!(!encrypted.data.contains("ghp_secret"));
        assert_eq!(service.decrypt_field("access_token", &encrypted).unwrap(), "ghp_secret");
    }

    #[test]
    fn test_stored_string_uses_camel_case() {
        let service = EncryptionService::new("k1", KEY_A, &[]).unwrap();
        let stored = service.encrypt_to_string("swarm_api_key", "abc").unwrap();
        assert!(stored.contains("\"keyId\":\"k1\""));
        assert!(stored.contains("\"encryptedAt\""));
        assert_eq!(service.decrypt_from_string("swarm_api_key", &stored).unwrap(), "abc");
    }

    #[test]
    fn test_legacy_plaintext_passthrough() {
        let service = EncryptionService::new("k1", KEY_A, &[]).unwrap();
        assert_eq!(
            service.decrypt_from_string("access_token", "gho_plain").unwrap(),
            "gho_plain"
        );
    }

    #[test]
    fn test_rotation_with_previous_key() {
        let old = EncryptionService::new("old", KEY_A, &[]).unwrap();
        let stored = old.encrypt_to_string("access_token", "rotate-me").unwrap();

        let current =
            EncryptionService::new("new", KEY_B, &[("old".to_string(), KEY_A.to_string())]).unwrap();
        assert_eq!(current.decrypt_from_string("access_token", &stored).unwrap(), "rotate-me");

        let rotated = current.rotate("access_token", &stored).unwrap().unwrap();
        assert!(rotated.contains("\"keyId\":\"new\""));
        assert_eq!(current.decrypt_from_string("access_token", &rotated).unwrap(), "rotate-me");

        // Already on the active key
        assert!(current.rotate("access_token", &rotated).unwrap().is_none());
    }

    #[test]
    fn test_unknown_key_id() {
        let old = EncryptionService::new("old", KEY_A, &[]).unwrap();
        let encrypted = old.encrypt_field("access_token", "x").unwrap();

        let current = EncryptionService::new("new", KEY_B, &[]).unwrap();
        assert!(matches!(
            current.decrypt_field("access_token", &encrypted),
            Err(CryptoError::UnknownKeyId(id)) if id == "old"
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let service = EncryptionService::new("k1", KEY_A, &[]).unwrap();
        let mut encrypted = service.encrypt_field("access_token", "integrity").unwrap();

        let mut raw = STANDARD.decode(&encrypted.data).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        encrypted.data = STANDARD.encode(raw);

        assert!(matches!(
            service.decrypt_field("access_token", &encrypted),
            Err(CryptoError::DecryptFailed(_))
        ));
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(matches!(
            EncryptionService::new("k1", "", &[]),
            Err(CryptoError::MissingKey)
        ));
        assert!(matches!(
            EncryptionService::new("k1", "abcd", &[]),
            Err(CryptoError::InvalidKey { .. })
        ));
        assert!(matches!(
            EncryptionService::new("k1", &"zz".repeat(32), &[]),
            Err(CryptoError::InvalidKey { .. })
        ));
        // Zero is not a valid scalar
        assert!(matches!(
            EncryptionService::new("k1", &"00".repeat(32), &[]),
            Err(CryptoError::InvalidKey { .. })
        ));
        assert!(matches!(
            EncryptionService::new("k1", KEY_A, &[("k1".to_string(), KEY_B.to_string())]),
            Err(CryptoError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_generated_key_is_usable() {
        let key = generate_key_hex();
        assert_eq!(key.len(), 64);
        let service = EncryptionService::new("gen", &key, &[]).unwrap();
        let encrypted = service.encrypt_field("f", "v").unwrap();
        assert_eq!(service.decrypt_field("f", &encrypted).unwrap(), "v");
    }
}
