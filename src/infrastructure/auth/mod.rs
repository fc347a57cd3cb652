//! Authentication infrastructure module
//!
//! Reads expiry and identity claims from upstream bearer tokens.

mod token_claims;

pub use token_claims::{decode_claims, is_token_expired, token_email, TokenClaims};

#[cfg(test)]
pub(crate) use token_claims::fixtures;
