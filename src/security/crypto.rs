//! AES-256-GCM credential encryption
//!
//! Stored format: `enc:v1:` + base64(nonce ‖ ciphertext ‖ tag).
//! Values without the prefix are treated as legacy base64 blobs of the
//! same layout.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

use crate::errors::{EngineError, Result};

pub const ENCRYPTED_PREFIX: &str = "enc:v1:";

const KEY_LEN: usize = 32;

#[derive(Clone)]
pub struct CredentialCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// 从配置字符串构建：32 个原始字符，或解码后为 32 字节的 base64
    pub fn from_config_key(key: &str) -> Result<Self> {
        let bytes = parse_key(key)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, bytes).map_err(|_| {
            EngineError::crypto(format!(
                "encryption key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENCRYPTED_PREFIX)
    }

    /// 加密；已带前缀的输入原样返回
    pub fn encrypt(&self, plain: &str) -> Result<String> {
        if Self::is_encrypted(plain) {
            return Ok(plain.to_string());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| EngineError::crypto("failed to generate nonce"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plain.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| EngineError::crypto("encryption failed"))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + in_out.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&in_out);

        Ok(format!("{}{}", ENCRYPTED_PREFIX, STANDARD.encode(blob)))
    }

    pub fn decrypt(&self, value: &str) -> Result<String> {
        if value.is_empty() {
            return Ok(String::new());
        }

        let encoded = value.strip_prefix(ENCRYPTED_PREFIX).unwrap_or(value);
        let mut blob = STANDARD
            .decode(encoded.trim())
            .map_err(|e| EngineError::crypto(format!("decryption failed: invalid base64: {}", e)))?;

        if blob.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(EngineError::crypto("decryption failed: ciphertext too short"));
        }

        let mut ciphertext = blob.split_off(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(&blob)
            .map_err(|_| EngineError::crypto("decryption failed: invalid nonce"))?;

        let plain = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut ciphertext)
            .map_err(|_| EngineError::crypto("decryption failed: authentication error"))?;

        String::from_utf8(plain.to_vec())
            .map_err(|_| EngineError::crypto("decryption failed: invalid utf-8"))
    }

    /// 旧数据迁移用：能解密的按密文处理，否则视为明文
    pub fn reencrypt_legacy(&self, value: &str) -> Result<String> {
        let plain = match self.decrypt(value) {
            Ok(plain) => plain,
            Err(_) => value.to_string(),
        };
        self.encrypt(&plain)
    }
}

fn parse_key(key: &str) -> Result<Vec<u8>> {
    if key.len() == KEY_LEN {
        return Ok(key.as_bytes().to_vec());
    }

    if let Ok(decoded) = STANDARD.decode(key.trim())
        && decoded.len() == KEY_LEN
    {
        return Ok(decoded);
    }

    Err(EngineError::crypto(format!(
        "encryption key must be {} raw characters or base64 of {} bytes",
        KEY_LEN, KEY_LEN
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "12345678901234567890123456789012";

    fn cipher() -> CredentialCipher {
        CredentialCipher::from_config_key(TEST_KEY).unwrap()
    }

    #[test]
    fn test_encryption_cycle() {
        let c = cipher();
        let encrypted = c.encrypt("secret_password").unwrap();
        assert_ne!(encrypted, "secret_password");
        assert!(encrypted.starts_with(ENCRYPTED_PREFIX));
        assert_eq!(c.decrypt(&encrypted).unwrap(), "secret_password");
    }

    #[test]
    fn test_encrypt_is_idempotent() {
        let c = cipher();
        let once = c.encrypt("secret_data").unwrap();
        let twice = c.encrypt(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_nonce_is_random() {
        let c = cipher();
        assert_ne!(c.encrypt("same").unwrap(), c.encrypt("same").unwrap());
    }

    #[test]
    fn test_decrypt_legacy_unprefixed() {
        let c = cipher();
        let encrypted = c.encrypt("legacy_secret").unwrap();
        let legacy = encrypted.trim_start_matches(ENCRYPTED_PREFIX);
        assert_eq!(c.decrypt(legacy).unwrap(), "legacy_secret");
    }

    #[test]
    fn test_decrypt_empty() {
        assert_eq!(cipher().decrypt("").unwrap(), "");
    }

    #[test]
    fn test_decrypt_invalid_inputs() {
        let c = cipher();
        assert!(c.decrypt("plain_text_password").is_err());
        assert!(c.decrypt("enc:v0:somebase64").is_err());
        assert!(c.decrypt("enc:v1:not_base_64").is_err());
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let encrypted = cipher().encrypt("my_secret").unwrap();
        let other = CredentialCipher::from_config_key("00000000000000000000000000000000").unwrap();
        let err = other.decrypt(&encrypted).unwrap_err();
        assert!(err.to_string().contains("decryption failed"));
    }

    #[test]
    fn test_key_formats() {
        let b64 = STANDARD.encode([7u8; 32]);
        assert!(CredentialCipher::from_config_key(&b64).is_ok());
        assert!(CredentialCipher::from_config_key("short").is_err());
        assert!(CredentialCipher::from_config_key("").is_err());
    }

    #[test]
    fn test_reencrypt_legacy_plaintext() {
        let c = cipher();
        let migrated = c.reencrypt_legacy("{\"token\":\"abc\"}").unwrap();
        assert!(migrated.starts_with(ENCRYPTED_PREFIX));
        assert_eq!(c.decrypt(&migrated).unwrap(), "{\"token\":\"abc\"}");
    }
}
