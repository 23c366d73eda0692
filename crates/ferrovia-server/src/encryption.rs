//! Group password encryption
//!
//! Root passwords are stored encrypted with AES-256-GCM. The stored form is
//! base64 of `nonce || ciphertext`.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};

const NONCE_LEN: usize = 12;

/// Encrypts and decrypts stored secrets with one key
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretCipher { .. }")
    }
}

impl SecretCipher {
    /// Derive the key from a configured secret.
    ///
    /// A base64 value of at least 32 bytes is used as the key directly;
    /// anything else is treated as a passphrase and stretched to 32 bytes.
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(anyhow!("secret key is empty"));
        }

        let mut key = [0u8; 32];
        match general_purpose::STANDARD.decode(secret) {
            Ok(decoded) if decoded.len() >= 32 => key.copy_from_slice(&decoded[..32]),
            _ => {
                let mut stretched = secret.as_bytes().to_vec();
                while stretched.len() < 32 {
                    stretched.extend_from_slice(secret.as_bytes());
                }
                key.copy_from_slice(&stretched[..32]);
            }
        }

        let cipher = Aes256Gcm::new_from_slice(&key)?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(combined))
    }

    /// Decrypt a stored secret. An empty value decrypts to an empty string.
    pub fn decrypt(&self, encrypted: &str) -> Result<String> {
        if encrypted.is_empty() {
            return Ok(String::new());
        }

        let combined = general_purpose::STANDARD
            .decode(encrypted)
            .context("Base64 decode failed")?;
        if combined.len() < NONCE_LEN {
            return Err(anyhow!("Invalid encrypted data: too short"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| anyhow!("Decryption failed: {}", e))?;

        String::from_utf8(plaintext).context("UTF-8 conversion failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "test_secret_key_for_encryption_testing_32bytes";

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = SecretCipher::from_secret(KEY).unwrap();
        let encrypted = cipher.encrypt("VMware1!").unwrap();
        assert_ne!(encrypted, "VMware1!");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "VMware1!");
    }

    #[test]
    fn test_nonce_differs_per_encryption() {
        let cipher = SecretCipher::from_secret(KEY).unwrap();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), cipher.decrypt(&b).unwrap());
    }

    #[test]
    fn test_base64_key_used_directly() {
        let raw = general_purpose::STANDARD.encode([7u8; 32]);
        let cipher = SecretCipher::from_secret(&raw).unwrap();
        let encrypted = cipher.encrypt("secret").unwrap();

        let other = SecretCipher::from_secret("short").unwrap();
        assert!(other.decrypt(&encrypted).is_err());
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "secret");
    }

    #[test]
    fn test_empty_ciphertext_is_empty_password() {
        let cipher = SecretCipher::from_secret("short").unwrap();
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }

    #[test]
    fn test_decrypt_errors() {
        let cipher = SecretCipher::from_secret(KEY).unwrap();

        let err = cipher.decrypt("not-valid-base64!!!").unwrap_err();
        assert!(err.to_string().contains("Base64"));

        let err = cipher.decrypt("c2hvcnQ=").unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(SecretCipher::from_secret("").is_err());
    }
}
