//! Credentials domain - encrypted storage of upstream tokens

mod vault;

pub use vault::{encrypt_optional, CredentialVault, EncryptedSecret};

#[cfg(test)]
pub use vault::MockCredentialVault;
