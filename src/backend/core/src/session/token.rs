//! Access-token inspection.
//!
//! Only the claims are read. Signature verification is the backend's job;
//! here the token is inspected to decide whether it is worth presenting.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{ErrorCode, PortcullisError, Result};

/// Claims read from an access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiration (Unix timestamp, seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

/// State of a credential at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Present, decodable and not expired. `expires_at` is `None` when the
    /// token carries no `exp` claim.
    Valid { expires_at: Option<DateTime<Utc>> },
    Expired,
    Malformed,
    Missing,
}

impl TokenStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Decode the claims of `token` without verifying its signature.
pub fn decode_claims(token: &str) -> Result<TokenClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            PortcullisError::with_internal(
                ErrorCode::InvalidToken,
                "Access token could not be decoded",
                e.to_string(),
            )
        })
}

/// Classify `token` at `now`.
///
/// A token is expired once `exp - skew_secs <= now`. A token without `exp`
/// is treated as not expired; an undecodable token is malformed.
pub fn token_status(token: Option<&str>, skew_secs: i64, now: DateTime<Utc>) -> TokenStatus {
    let token = match token.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return TokenStatus::Missing,
    };

    match decode_claims(token) {
        Err(_) => TokenStatus::Malformed,
        Ok(claims) => match claims.exp {
            Some(exp) if exp.saturating_sub(skew_secs) <= now.timestamp() => TokenStatus::Expired,
            _ => TokenStatus::Valid {
                expires_at: claims.expires_at(),
            },
        },
    }
}

/// Whether `token` should be treated as unusable right now.
///
/// Missing and malformed tokens count as expired.
pub fn is_expired(token: Option<&str>, skew_secs: i64) -> bool {
    !token_status(token, skew_secs, Utc::now()).is_valid()
}
