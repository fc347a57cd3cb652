//! Credentials at rest

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Opaque ciphertext of a credential as stored on an entity
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedSecret(String);

impl EncryptedSecret {
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self(ciphertext.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptedSecret([redacted])")
    }
}

/// Symmetric encryption boundary for bearer, refresh and session tokens
#[cfg_attr(test, mockall::automock)]
pub trait CredentialVault: Send + Sync + std::fmt::Debug {
    /// Encrypt a plaintext credential
    fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, DomainError>;

    /// Decrypt a stored credential
    fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, DomainError>;
}

/// Encrypt an optional credential, treating empty strings as absent
pub fn encrypt_optional(
    vault: &dyn CredentialVault,
    plaintext: Option<&str>,
) -> Result<Option<EncryptedSecret>, DomainError> {
    match plaintext {
        Some(value) if !value.is_empty() => vault.encrypt(value).map(Some),
        _ => Ok(None),
    }
}
