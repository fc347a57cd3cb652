//! Credential vault implementations

mod gcm;

pub use gcm::AesGcmVault;
