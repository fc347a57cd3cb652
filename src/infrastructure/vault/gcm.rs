use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

use crate::domain::credentials::{CredentialVault, EncryptedSecret};
use crate::domain::DomainError;

const NONCE_LEN: usize = 12;

/// AES-256-GCM vault; ciphertext is `base64(nonce || ciphertext || tag)`
pub struct AesGcmVault {
    key: [u8; 32],
}

impl std::fmt::Debug for AesGcmVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmVault")
            .field("key", &"[hidden]")
            .finish()
    }
}

impl AesGcmVault {
    /// Derive the 256-bit key from a configured secret
    pub fn from_secret(secret: &str) -> Result<Self, DomainError> {
        if secret.is_empty() {
            return Err(DomainError::configuration("Vault secret key cannot be empty"));
        }

        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);

        Ok(Self { key })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }
}

impl CredentialVault for AesGcmVault {
    fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, DomainError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| DomainError::credential(format!("Encryption failed: {}", e)))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(EncryptedSecret::new(STANDARD.encode(combined)))
    }

    fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, DomainError> {
        let combined = STANDARD
            .decode(secret.as_str())
            .map_err(|e| DomainError::credential(format!("Invalid ciphertext encoding: {}", e)))?;

        if combined.len() <= NONCE_LEN {
            return Err(DomainError::credential("Ciphertext too short"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| DomainError::credential("Decryption failed"))?;

        String::from_utf8(plaintext)
            .map_err(|e| DomainError::credential(format!("Decrypted value is not UTF-8: {}", e)))
    }
}
