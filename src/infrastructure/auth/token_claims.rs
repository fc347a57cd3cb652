//! Claims carried by upstream bearer tokens
//!
//! Tokens are issued and signed upstream; only their payload is read here,
//! signatures are never verified.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    exp: Option<f64>,
    #[serde(default)]
    email: Option<String>,
    #[serde(rename = "https://api.openai.com/profile", default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    email: Option<String>,
}

/// Expiry and identity read from a bearer token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenClaims {
    pub expires_at: Option<DateTime<Utc>>,
    pub email: Option<String>,
}

impl TokenClaims {
    /// A token without a readable expiry counts as expired
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at <= now)
    }
}

/// Decode the payload of a bearer token without verifying its signature
pub fn decode_claims(token: &str) -> Result<TokenClaims, DomainError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<RawClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| DomainError::validation(format!("Malformed bearer token: {}", e)))?;
    let raw = data.claims;

    let expires_at = raw
        .exp
        .and_then(|exp| Utc.timestamp_opt(exp as i64, 0).single());

    let email = raw
        .profile
        .and_then(|p| p.email)
        .or(raw.email)
        .filter(|e| !e.is_empty());

    Ok(TokenClaims { expires_at, email })
}

/// Whether the token is unreadable or past its expiry
pub fn is_token_expired(token: &str, now: DateTime<Utc>) -> bool {
    decode_claims(token).map_or(true, |claims| claims.is_expired(now))
}

/// Email of the account the token was issued to
pub fn token_email(token: &str) -> Option<String> {
    decode_claims(token).ok().and_then(|claims| claims.email)
}
